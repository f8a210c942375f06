use crate::aggregation::TelemetryMeterCollector;
use crate::config::Config;
use crate::errors::Result;
use crate::metrics_defs::{PUBLISH_DURATION, REPORTS_PUBLISHED, REPORT_METRICS};
use crate::report::{BuildNumber, CiServerBuildInfo, PerformanceMetricsDto, local_timestamp};
use crate::teamcity::TeamCityClient;
use collector::{Metric, MetricsCollector, SpanFilter, SpanMetricsExtractor};
use shared::{counter, gauge, histogram};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

pub const REPORT_ARTIFACT_NAME: &str = "metrics.performance.json";

/// Collects the metrics of a finished test and publishes them, together with
/// the IDE logs, as TeamCity artifacts under the test identifier.
pub struct MetricsPublisher {
    config: Config,
    client: Arc<TeamCityClient>,
}

impl MetricsPublisher {
    pub fn new(config: Config, client: TeamCityClient) -> Self {
        MetricsPublisher {
            config,
            client: Arc::new(client),
        }
    }

    pub async fn publish(
        &self,
        test_id: &str,
        collectors: &[TelemetryMeterCollector],
    ) -> Result<PerformanceMetricsDto> {
        let started = Instant::now();
        let report = self.prepare_metrics_for_publishing(test_id, collectors).await?;

        let client = self.client.clone();
        let artifact_path = test_id.to_string();
        let to_publish = report.clone();
        tokio::task::spawn_blocking(move || -> Result<()> {
            let report_file = tempfile::Builder::new()
                .prefix("unit-perf-metric")
                .suffix(REPORT_ARTIFACT_NAME)
                .tempfile()?;
            to_publish.write_pretty(report_file.path())?;

            if !client.is_under_teamcity() {
                println!(
                    "Collected metrics: (can be found in {})",
                    client
                        .artifact_for_publishing_dir
                        .join(&artifact_path)
                        .display()
                );
                println!("{}", to_publish.metrics_table());
            }

            client.publish_artifacts(
                report_file.path(),
                &artifact_path,
                Some(REPORT_ARTIFACT_NAME),
                false,
            )?;
            Ok(())
        })
        .await??;

        counter!(REPORTS_PUBLISHED).increment(1);
        gauge!(REPORT_METRICS).set(report.metrics.len() as f64);
        histogram!(PUBLISH_DURATION).record(started.elapsed().as_secs_f64());
        tracing::info!(
            test_id,
            metrics = report.metrics.len(),
            "Published performance report"
        );

        Ok(report)
    }

    async fn prepare_metrics_for_publishing(
        &self,
        test_id: &str,
        collectors: &[TelemetryMeterCollector],
    ) -> Result<PerformanceMetricsDto> {
        let telemetry = &self.config.telemetry;
        let child_filter = if telemetry.ignored_spans.is_empty() {
            SpanFilter::any()
        } else {
            SpanFilter::not(SpanFilter::name_in_list(telemetry.ignored_spans.clone()))
        };

        let extractor = SpanMetricsExtractor::new(&telemetry.spans_file)
            .with_child_filter(child_filter)
            .with_poll_interval(Duration::from_millis(telemetry.poll_interval_millis))
            .with_timeout(Duration::from_secs(telemetry.wait_timeout_secs));
        let mut metrics: Vec<Metric> = extractor.wait_till_metrics_exported(test_id).await?;

        let log_dir = self.config.log_dir.clone();
        let test_log_file = self.config.test_log_file.clone();
        let collectors = collectors.to_vec();
        let client = self.client.clone();
        let artifact_path = test_id.to_string();

        let additional = tokio::task::spawn_blocking(move || -> Result<Vec<Metric>> {
            let mut additional = Vec::new();
            for collector in collectors {
                additional.extend(collector.into_complete_collector().collect(&log_dir)?);
            }

            client.publish_artifacts(&log_dir, &artifact_path, None, true)?;
            if let Some(test_log_file) = test_log_file {
                client.publish_artifacts(&test_log_file, &artifact_path, None, true)?;
            }
            Ok(additional)
        })
        .await??;

        tracing::debug!(
            span_metrics = metrics.len(),
            meter_metrics = additional.len(),
            "Merging metrics"
        );
        metrics.extend(additional);

        let build_info = self.build_info();
        let build_number = self
            .config
            .build_number
            .as_deref()
            .map(BuildNumber::parse)
            .unwrap_or_else(BuildNumber::snapshot);

        Ok(PerformanceMetricsDto::create(
            test_id,
            "",
            "",
            test_id,
            &build_number,
            &metrics,
            build_info,
        ))
    }

    fn build_info(&self) -> CiServerBuildInfo {
        let client = &self.client;
        CiServerBuildInfo {
            build_id: client.build_id.clone(),
            type_id: client.build_type_id.clone(),
            config_name: client.configuration_name.clone().unwrap_or_default(),
            build_number: client.build_number.clone(),
            branch_name: client.branch_name.clone(),
            url: client.build_url(),
            is_personal: client.is_personal_build,
            timestamp: local_timestamp(),
        }
    }

    /// Where the report of `test_id` is staged.
    pub fn report_path(&self, test_id: &str) -> PathBuf {
        self.client
            .artifact_for_publishing_dir
            .join(test_id)
            .join(REPORT_ARTIFACT_NAME)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregation::MetricsAggregation;
    use crate::config::{TeamCityConfig, TelemetryConfig};
    use crate::teamcity::tests::local_client;
    use std::fs;

    const SPANS: &str = r#"{"data": [{"spans": [
        {"spanID": "1", "operationName": "my-test", "duration": 90000},
        {"spanID": "2", "operationName": "open", "duration": 30000,
         "references": [{"refType": "CHILD_OF", "spanID": "1"}]},
        {"spanID": "3", "operationName": "gc", "duration": 5000,
         "references": [{"refType": "CHILD_OF", "spanID": "1"}]},
        {"spanID": "4", "operationName": "warm", "duration": 5000,
         "tags": [{"key": "warmup", "value": "true"}],
         "references": [{"refType": "CHILD_OF", "spanID": "1"}]},
        {"spanID": "5", "operationName": "warm.child", "duration": 2000,
         "references": [{"refType": "CHILD_OF", "spanID": "4"}]}
    ]}]}"#;

    struct Fixture {
        _logs: tempfile::TempDir,
        artifacts: tempfile::TempDir,
        config: Config,
    }

    fn fixture() -> Fixture {
        let logs = tempfile::tempdir().unwrap();
        let artifacts = tempfile::tempdir().unwrap();

        let spans_file = logs.path().join("opentelemetry.json");
        fs::write(&spans_file, SPANS).unwrap();
        fs::write(
            logs.path().join("open-telemetry-meters.csv"),
            "jvm.threads,0,1,10\njvm.threads,0,2,14\nvfs.files,0,1,99\n",
        )
        .unwrap();
        let test_log_file = logs.path().join("idea-test.log");
        fs::write(&test_log_file, "test log").unwrap();

        let config = Config {
            log_dir: logs.path().to_path_buf(),
            test_log_file: Some(test_log_file),
            build_number: Some("IU-243.1".into()),
            telemetry: TelemetryConfig {
                spans_file,
                wait_timeout_secs: 1,
                poll_interval_millis: 10,
                ignored_spans: vec!["gc".into()],
            },
            teamcity: TeamCityConfig {
                artifacts_dir: Some(artifacts.path().to_path_buf()),
                ..Default::default()
            },
            meters: vec![],
        };

        Fixture {
            _logs: logs,
            artifacts,
            config,
        }
    }

    #[tokio::test]
    async fn test_publish() {
        let fixture = fixture();
        let publisher =
            MetricsPublisher::new(fixture.config.clone(), local_client(fixture.artifacts.path()));

        let collectors = [TelemetryMeterCollector::with_name_prefix(
            MetricsAggregation::Latest,
            Some("jvm.".into()),
        )];
        let report = publisher.publish("my-test", &collectors).await.unwrap();

        let names: Vec<&str> = report.metrics.iter().map(|m| m.n.as_str()).collect();
        assert_eq!(names, vec!["my-test", "open", "jvm.threads"]);
        assert_eq!(report.metrics[0].d, Some(90));
        assert_eq!(report.metrics[2].c, Some(14));
        assert_eq!(report.project, "my-test");
        assert_eq!(report.product_code, "IU");
        assert_eq!(report.tc.build_id, "225659992");

        let staged = fixture.artifacts.path().join("my-test");
        assert!(staged.join("idea-test.log.tar.gz").is_file());
        assert!(
            staged
                .join(format!(
                    "{}.tar.gz",
                    fixture.config.log_dir.file_name().unwrap().to_string_lossy()
                ))
                .is_file()
        );

        let written: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(publisher.report_path("my-test")).unwrap())
                .unwrap();
        assert_eq!(written["methodName"], "my-test");
        assert_eq!(written["metrics"].as_array().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_publish_without_test_span() {
        let fixture = fixture();
        let publisher =
            MetricsPublisher::new(fixture.config.clone(), local_client(fixture.artifacts.path()));

        let err = publisher.publish("missing-test", &[]).await.unwrap_err();
        assert!(matches!(
            err,
            crate::PublisherError::Collector(collector::CollectorError::SpansNotExported { .. })
        ));
        assert!(!publisher.report_path("missing-test").exists());
    }
}
