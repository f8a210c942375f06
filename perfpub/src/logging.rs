use crate::config::{LoggingConfig, MetricsConfig};
use metrics_exporter_statsd::{StatsdBuilder, StatsdError};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

#[derive(thiserror::Error, Debug)]
pub enum MetricsInitError {
    #[error("could not build statsd recorder: {0}")]
    Statsd(#[from] StatsdError),
    #[error("a metrics recorder is already installed")]
    RecorderAlreadySet,
}

/// Installs the tracing subscriber. Logs go to stderr, stdout is reserved for
/// TeamCity service messages and the metrics table.
///
/// The returned guard flushes Sentry on drop and must live until exit.
pub fn init_logging(config: Option<&LoggingConfig>) -> Option<sentry::ClientInitGuard> {
    let level = config.map(|c| c.level.as_str()).unwrap_or("info");
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let fmt_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);
    let registry = tracing_subscriber::registry().with(filter).with(fmt_layer);

    match config.and_then(|c| c.sentry_dsn.as_deref()) {
        Some(dsn) => {
            let guard = sentry::init((
                dsn,
                sentry::ClientOptions {
                    release: sentry::release_name!(),
                    ..Default::default()
                },
            ));
            registry.with(sentry::integrations::tracing::layer()).init();
            Some(guard)
        }
        None => {
            registry.init();
            None
        }
    }
}

/// Sends the self-instrumentation metrics to StatsD.
pub fn init_metrics(config: &MetricsConfig) -> Result<(), MetricsInitError> {
    let recorder = StatsdBuilder::from(config.statsd_host.clone(), config.statsd_port)
        .build(Some(config.prefix.as_str()))?;
    metrics::set_global_recorder(recorder).map_err(|_| MetricsInitError::RecorderAlreadySet)?;

    for defs in [
        collector::metrics_defs::ALL_METRICS,
        publisher::metrics_defs::ALL_METRICS,
    ] {
        shared::metrics_defs::describe_all(defs);
    }

    tracing::info!(
        host = %config.statsd_host,
        port = config.statsd_port,
        "Sending metrics to statsd"
    );
    Ok(())
}
