//! Client for the TeamCity build the tests run in.
//!
//! Build metadata comes from the build properties file TeamCity writes for
//! every build (`TEAMCITY_BUILD_PROPERTIES_FILE`). Outside of TeamCity a fixed
//! set of local properties is used so the pipeline can be exercised locally.

mod artifacts;
mod properties;
mod rest;

pub use artifacts::{escape_service_message_value, publish_artifacts_message};
pub use properties::BuildProperties;
pub use rest::BuildDetails;

use crate::config::TeamCityConfig;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

const DEFAULT_SERVER_URL: &str = "https://buildserver.labs.intellij.net";
const DEFAULT_BRANCH: &str = "master";
const ARTIFACTS_DIR_NAME: &str = "teamcity-artifacts-for-publish";
const DEFAULT_RETRY_BASE_DELAY: Duration = Duration::from_millis(500);

const BUILD_ID: &str = "teamcity.build.id";
const BUILD_TYPE_ID: &str = "teamcity.buildType.id";
const BUILD_CONF_NAME: &str = "teamcity.buildConfName";
const BUILD_NUMBER: &str = "build.number";
const BUILD_BRANCH: &str = "teamcity.build.branch";
const SERVER_URL: &str = "teamcity.serverUrl";
const IS_PERSONAL: &str = "build.is.personal";
const AUTH_USER_ID: &str = "teamcity.auth.userId";
const AUTH_PASSWORD: &str = "teamcity.auth.password";

#[derive(thiserror::Error, Debug)]
pub enum TeamCityError {
    #[error("could not read properties file {}: {source}", path.display())]
    PropertiesFile {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("running under TeamCity but TEAMCITY_BUILD_PROPERTIES_FILE is not set")]
    MissingPropertiesFile,
    #[error("required build property `{0}` is missing")]
    MissingProperty(&'static str),
    #[error("invalid server URL: {0}")]
    InvalidUrl(String),
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("TeamCity REST API unavailable, last status {0}")]
    RetriesExceeded(u16),
    #[error("TeamCity REST API returned status {0}")]
    UnexpectedStatus(u16),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("directory walk failed: {0}")]
    Walk(#[from] walkdir::Error),
}

/// `TEAMCITY_VERSION` is exported to every process of a TeamCity build.
pub fn is_under_teamcity() -> bool {
    std::env::var_os("TEAMCITY_VERSION").is_some()
}

/// Properties used when running outside of TeamCity.
pub fn local_build_properties() -> BuildProperties {
    BuildProperties::from_pairs([
        (BUILD_ID, "225659992"),
        (BUILD_TYPE_ID, "bt3989238923"),
        ("teamcity.agent.jvm.os.name", "Linux"),
    ])
}

fn select_build_properties(
    config: &TeamCityConfig,
    under_teamcity: bool,
    build_properties_file: Option<&Path>,
) -> Result<BuildProperties, TeamCityError> {
    match (&config.properties_file, build_properties_file) {
        (Some(path), _) => BuildProperties::load(path),
        (None, Some(path)) if under_teamcity => BuildProperties::load(path),
        (None, None) if under_teamcity => Err(TeamCityError::MissingPropertiesFile),
        (None, _) => {
            tracing::info!("Not running under TeamCity, using local build properties");
            Ok(local_build_properties())
        }
    }
}

#[derive(Clone, Debug)]
pub struct TeamCityClient {
    pub build_id: String,
    pub build_type_id: String,
    pub configuration_name: Option<String>,
    pub build_number: String,
    pub branch_name: String,
    pub base_uri: Url,
    pub is_personal_build: bool,
    pub artifact_for_publishing_dir: PathBuf,
    under_teamcity: bool,
    credentials: Option<(String, String)>,
    http: reqwest::Client,
    retry_base_delay: Duration,
}

impl TeamCityClient {
    /// Picks the properties source from the environment: the configured file,
    /// TeamCity's build properties file, or the local defaults.
    pub fn from_env(config: &TeamCityConfig) -> Result<Self, TeamCityError> {
        let under_teamcity = is_under_teamcity();
        let build_properties_file =
            std::env::var_os("TEAMCITY_BUILD_PROPERTIES_FILE").map(PathBuf::from);

        let properties =
            select_build_properties(config, under_teamcity, build_properties_file.as_deref())?;
        Self::from_properties(&properties, config, under_teamcity)
    }

    pub fn from_properties(
        properties: &BuildProperties,
        config: &TeamCityConfig,
        under_teamcity: bool,
    ) -> Result<Self, TeamCityError> {
        let required = |key: &'static str| {
            properties
                .get(key)
                .map(String::from)
                .ok_or(TeamCityError::MissingProperty(key))
        };

        let base_uri = match &config.server_url {
            Some(url) => url.clone(),
            None => {
                let raw = properties.get(SERVER_URL).unwrap_or(DEFAULT_SERVER_URL);
                Url::parse(raw).map_err(|e| TeamCityError::InvalidUrl(format!("{raw}: {e}")))?
            }
        };

        let credentials = match (properties.get(AUTH_USER_ID), properties.get(AUTH_PASSWORD)) {
            (Some(user), Some(password)) => Some((user.to_string(), password.to_string())),
            _ => None,
        };

        let artifact_for_publishing_dir = config
            .artifacts_dir
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join(ARTIFACTS_DIR_NAME));

        Ok(TeamCityClient {
            build_id: required(BUILD_ID)?,
            build_type_id: required(BUILD_TYPE_ID)?,
            configuration_name: properties.get(BUILD_CONF_NAME).map(String::from),
            build_number: properties.get(BUILD_NUMBER).unwrap_or_default().to_string(),
            branch_name: properties
                .get(BUILD_BRANCH)
                .unwrap_or(DEFAULT_BRANCH)
                .to_string(),
            base_uri,
            is_personal_build: properties
                .get(IS_PERSONAL)
                .is_some_and(|v| v.eq_ignore_ascii_case("true")),
            artifact_for_publishing_dir,
            under_teamcity,
            credentials,
            http: reqwest::Client::new(),
            retry_base_delay: DEFAULT_RETRY_BASE_DELAY,
        })
    }

    pub fn with_retry_base_delay(mut self, delay: Duration) -> Self {
        self.retry_base_delay = delay;
        self
    }

    pub fn is_under_teamcity(&self) -> bool {
        self.under_teamcity
    }

    /// Link to the build results page.
    pub fn build_url(&self) -> String {
        format!(
            "{}/viewLog.html?buildId={}&buildTypeId={}",
            self.base_uri.as_str().trim_end_matches('/'),
            self.build_id,
            self.build_type_id
        )
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub fn local_client(artifacts_dir: &std::path::Path) -> TeamCityClient {
        let config = TeamCityConfig {
            artifacts_dir: Some(artifacts_dir.to_path_buf()),
            ..Default::default()
        };
        TeamCityClient::from_properties(&local_build_properties(), &config, false).unwrap()
    }

    #[test]
    fn test_from_properties() {
        let properties = BuildProperties::from_pairs([
            (BUILD_ID, "42"),
            (BUILD_TYPE_ID, "ijplatform_Perf"),
            (BUILD_CONF_NAME, "Perf tests"),
            (BUILD_NUMBER, "243.100"),
            (BUILD_BRANCH, "feature/spans"),
            (SERVER_URL, "https://teamcity.example.com/"),
            (IS_PERSONAL, "TRUE"),
            (AUTH_USER_ID, "user"),
            (AUTH_PASSWORD, "secret"),
        ]);
        let client =
            TeamCityClient::from_properties(&properties, &TeamCityConfig::default(), true)
                .unwrap();

        assert_eq!(client.build_id, "42");
        assert_eq!(client.configuration_name.as_deref(), Some("Perf tests"));
        assert_eq!(client.build_number, "243.100");
        assert_eq!(client.branch_name, "feature/spans");
        assert!(client.is_personal_build);
        assert!(client.is_under_teamcity());
        assert_eq!(
            client.credentials,
            Some(("user".to_string(), "secret".to_string()))
        );
        assert_eq!(
            client.build_url(),
            "https://teamcity.example.com/viewLog.html?buildId=42&buildTypeId=ijplatform_Perf"
        );
        assert!(client.artifact_for_publishing_dir.ends_with(ARTIFACTS_DIR_NAME));
    }

    #[test]
    fn test_local_defaults() {
        let client = TeamCityClient::from_properties(
            &local_build_properties(),
            &TeamCityConfig::default(),
            false,
        )
        .unwrap();

        assert_eq!(client.build_id, "225659992");
        assert_eq!(client.build_type_id, "bt3989238923");
        assert_eq!(client.configuration_name, None);
        assert_eq!(client.branch_name, DEFAULT_BRANCH);
        assert!(!client.is_personal_build);
        assert_eq!(client.base_uri.as_str(), "https://buildserver.labs.intellij.net/");
    }

    #[test]
    fn test_select_build_properties() {
        let dir = tempfile::tempdir().unwrap();
        let configured = dir.path().join("configured.properties");
        std::fs::write(&configured, "teamcity.build.id=1\nteamcity.buildType.id=bt1\n").unwrap();
        let agent = dir.path().join("agent.properties");
        std::fs::write(&agent, "teamcity.build.id=2\nteamcity.buildType.id=bt2\n").unwrap();

        let config = TeamCityConfig {
            properties_file: Some(configured.clone()),
            ..Default::default()
        };
        let properties = select_build_properties(&config, true, Some(&agent)).unwrap();
        assert_eq!(properties.get(BUILD_ID), Some("1"));
        let properties = select_build_properties(&config, false, None).unwrap();
        assert_eq!(properties.get(BUILD_ID), Some("1"));

        let config = TeamCityConfig::default();
        let properties = select_build_properties(&config, true, Some(&agent)).unwrap();
        assert_eq!(properties.get(BUILD_ID), Some("2"));

        let properties = select_build_properties(&config, false, Some(&agent)).unwrap();
        assert_eq!(properties.get(BUILD_ID), Some("225659992"));

        assert!(matches!(
            select_build_properties(&config, true, None),
            Err(TeamCityError::MissingPropertiesFile)
        ));

        let missing = TeamCityConfig {
            properties_file: Some(dir.path().join("missing.properties")),
            ..Default::default()
        };
        assert!(matches!(
            select_build_properties(&missing, false, None),
            Err(TeamCityError::PropertiesFile { .. })
        ));
    }

    #[test]
    fn test_from_env_with_configured_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("build.properties");
        std::fs::write(
            &path,
            "teamcity.build.id=77\nteamcity.buildType.id=Perf_Build\nbuild.number=243.5\n",
        )
        .unwrap();

        let config = TeamCityConfig {
            properties_file: Some(path),
            artifacts_dir: Some(dir.path().join("artifacts")),
            ..Default::default()
        };
        let client = TeamCityClient::from_env(&config).unwrap();
        assert_eq!(client.build_id, "77");
        assert_eq!(client.build_type_id, "Perf_Build");
        assert_eq!(client.build_number, "243.5");
    }

    #[test]
    fn test_config_overrides_and_errors() {
        let config = TeamCityConfig {
            server_url: Some(Url::parse("http://localhost:8111").unwrap()),
            ..Default::default()
        };
        let client =
            TeamCityClient::from_properties(&local_build_properties(), &config, false).unwrap();
        assert_eq!(
            client.build_url(),
            "http://localhost:8111/viewLog.html?buildId=225659992&buildTypeId=bt3989238923"
        );

        let missing = BuildProperties::from_pairs([(BUILD_ID, "1")]);
        assert!(matches!(
            TeamCityClient::from_properties(&missing, &TeamCityConfig::default(), false),
            Err(TeamCityError::MissingProperty(BUILD_TYPE_ID))
        ));

        let mut bad_url = local_build_properties();
        bad_url.set(SERVER_URL, "not a url");
        assert!(matches!(
            TeamCityClient::from_properties(&bad_url, &TeamCityConfig::default(), false),
            Err(TeamCityError::InvalidUrl(_))
        ));
    }
}
