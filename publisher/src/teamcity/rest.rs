use super::{DEFAULT_BRANCH, TeamCityClient, TeamCityError};
use reqwest::StatusCode;
use serde::Deserialize;
use tokio::time::sleep;

const MAX_RETRIES: u32 = 3;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct BuildResponse {
    number: Option<String>,
    branch_name: Option<String>,
    #[serde(default)]
    personal: bool,
    build_type: Option<BuildTypeResponse>,
}

#[derive(Deserialize)]
struct BuildTypeResponse {
    name: Option<String>,
}

/// Build metadata as reported by the TeamCity REST API.
#[derive(Clone, Debug, PartialEq)]
pub struct BuildDetails {
    pub number: Option<String>,
    pub branch_name: Option<String>,
    pub personal: bool,
    pub configuration_name: Option<String>,
}

impl TeamCityClient {
    pub async fn fetch_build_details(&self) -> Result<BuildDetails, TeamCityError> {
        const RETRIABLE_STATUS_CODES: &[StatusCode] = &[
            StatusCode::TOO_MANY_REQUESTS,     // 429
            StatusCode::INTERNAL_SERVER_ERROR, // 500
            StatusCode::BAD_GATEWAY,           // 502
            StatusCode::SERVICE_UNAVAILABLE,   // 503
            StatusCode::GATEWAY_TIMEOUT,       // 504
        ];

        let url = format!(
            "{}/app/rest/builds/id:{}",
            self.base_uri.as_str().trim_end_matches('/'),
            self.build_id
        );

        let mut retries = 0;
        let response = loop {
            let mut request = self
                .http
                .get(&url)
                .header(reqwest::header::ACCEPT, "application/json");
            if let Some((user, password)) = &self.credentials {
                request = request.basic_auth(user, Some(password));
            }

            let response = request.send().await?;
            let status = response.status();
            if status.is_success() {
                break response;
            }

            if !RETRIABLE_STATUS_CODES.contains(&status) {
                return Err(TeamCityError::UnexpectedStatus(status.as_u16()));
            }
            if retries < MAX_RETRIES {
                let delay = self.retry_base_delay * 2_u32.pow(retries);
                tracing::warn!(%status, retries, "TeamCity REST request failed, retrying");
                sleep(delay).await;
                retries += 1;
                continue;
            }
            return Err(TeamCityError::RetriesExceeded(status.as_u16()));
        };

        let build = response.json::<BuildResponse>().await?;
        Ok(BuildDetails {
            number: build.number,
            branch_name: build.branch_name,
            personal: build.personal,
            configuration_name: build.build_type.and_then(|t| t.name),
        })
    }

    /// Fills in values the properties file did not provide.
    pub async fn refresh_from_server(&mut self) -> Result<(), TeamCityError> {
        let details = self.fetch_build_details().await?;

        if self.configuration_name.is_none() {
            self.configuration_name = details.configuration_name;
        }
        if self.build_number.is_empty()
            && let Some(number) = details.number
        {
            self.build_number = number;
        }
        if self.branch_name == DEFAULT_BRANCH
            && let Some(branch) = details.branch_name
        {
            self.branch_name = branch;
        }
        self.is_personal_build |= details.personal;

        tracing::debug!(
            build_id = %self.build_id,
            build_number = %self.build_number,
            branch = %self.branch_name,
            "Refreshed build details from TeamCity"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TeamCityConfig;
    use crate::teamcity::{BuildProperties, local_build_properties};
    use std::time::Duration;
    use url::Url;

    fn client_for(server: &mockito::Server, properties: &BuildProperties) -> TeamCityClient {
        let config = TeamCityConfig {
            server_url: Some(Url::parse(&server.url()).unwrap()),
            ..Default::default()
        };
        TeamCityClient::from_properties(properties, &config, false)
            .unwrap()
            .with_retry_base_delay(Duration::from_millis(1))
    }

    #[tokio::test]
    async fn test_fetch_build_details() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/app/rest/builds/id:225659992")
            .match_header("accept", "application/json")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"id": 225659992, "number": "243.77", "branchName": "release/243",
                    "personal": true, "buildType": {"id": "bt1", "name": "Perf"}}"#,
            )
            .expect(2)
            .create_async()
            .await;

        let mut client = client_for(&server, &local_build_properties());
        let details = client.fetch_build_details().await.unwrap();
        assert_eq!(
            details,
            BuildDetails {
                number: Some("243.77".into()),
                branch_name: Some("release/243".into()),
                personal: true,
                configuration_name: Some("Perf".into()),
            }
        );

        client.refresh_from_server().await.unwrap();
        assert_eq!(client.build_number, "243.77");
        assert_eq!(client.branch_name, "release/243");
        assert_eq!(client.configuration_name.as_deref(), Some("Perf"));
        assert!(client.is_personal_build);

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_basic_auth() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/app/rest/builds/id:225659992")
            // user:secret
            .match_header("authorization", "Basic dXNlcjpzZWNyZXQ=")
            .with_status(200)
            .with_body("{}")
            .create_async()
            .await;

        let mut properties = local_build_properties();
        properties.set("teamcity.auth.userId", "user");
        properties.set("teamcity.auth.password", "secret");

        let client = client_for(&server, &properties);
        let details = client.fetch_build_details().await.unwrap();
        assert_eq!(details.number, None);
        assert!(!details.personal);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_retries() {
        let mut server = mockito::Server::new_async().await;
        let unavailable = server
            .mock("GET", "/app/rest/builds/id:225659992")
            .with_status(503)
            .expect(4)
            .create_async()
            .await;

        let client = client_for(&server, &local_build_properties());
        let err = client.fetch_build_details().await.unwrap_err();
        assert!(matches!(err, TeamCityError::RetriesExceeded(503)));
        unavailable.assert_async().await;

        let mut server = mockito::Server::new_async().await;
        let not_found = server
            .mock("GET", "/app/rest/builds/id:225659992")
            .with_status(404)
            .expect(1)
            .create_async()
            .await;

        let client = client_for(&server, &local_build_properties());
        let err = client.fetch_build_details().await.unwrap_err();
        assert!(matches!(err, TeamCityError::UnexpectedStatus(404)));
        not_found.assert_async().await;
    }
}
