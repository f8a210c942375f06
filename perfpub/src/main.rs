use clap::{Parser, Subcommand};
use collector::span_metrics::metrics_from_spans;
use collector::{MetricsCollector, SpanFilter, SpanParser};
use publisher::aggregation::{MetricsAggregation, TelemetryMeterCollector};
use std::path::PathBuf;
use std::process::ExitCode;

mod config;
mod logging;

use config::{Config, ConfigError};

#[derive(Parser)]
#[command(name = "perfpub", about = "Collects and publishes IDE performance metrics")]
struct Cli {
    /// YAML configuration file
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Subcommand)]
enum CliCommand {
    /// Collect the metrics of a finished test and publish them to TeamCity
    Publish {
        #[arg(long)]
        test_id: String,
    },
    /// Print the metrics of a span subtree from a telemetry export
    Spans {
        #[arg(long)]
        file: PathBuf,
        /// Name of the root span
        #[arg(long)]
        span: String,
        /// Child spans to drop together with their subtree
        #[arg(long)]
        ignore: Vec<String>,
    },
    /// Print meter metrics found in a log dir
    Meters {
        #[arg(long)]
        log_dir: PathBuf,
        #[arg(long, default_value = "latest")]
        aggregation: MetricsAggregation,
        /// Only meters starting with this prefix
        #[arg(long)]
        prefix: Option<String>,
    },
}

#[derive(thiserror::Error, Debug)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("the `publish` command needs a config file with a `publisher` section")]
    MissingPublisherConfig,
    #[error(transparent)]
    Metrics(#[from] logging::MetricsInitError),
    #[error(transparent)]
    Publisher(#[from] publisher::PublisherError),
    #[error(transparent)]
    Collector(#[from] collector::CollectorError),
    #[error("could not start runtime: {0}")]
    Runtime(std::io::Error),
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match cli.config.as_deref().map(Config::from_file).transpose() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };

    let _sentry = logging::init_logging(
        config
            .as_ref()
            .and_then(|c| c.common.logging.as_ref()),
    );

    match run(cli.command, config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "perfpub failed");
            ExitCode::FAILURE
        }
    }
}

fn run(command: CliCommand, config: Option<Config>) -> Result<(), CliError> {
    if let Some(metrics) = config.as_ref().and_then(|c| c.common.metrics.as_ref()) {
        logging::init_metrics(metrics)?;
    }

    match command {
        CliCommand::Publish { test_id } => {
            let publisher_config = config
                .and_then(|c| c.publisher)
                .ok_or(CliError::MissingPublisherConfig)?;

            let rt = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()
                .map_err(CliError::Runtime)?;
            rt.block_on(publisher::run(publisher_config, &test_id))?;
        }
        CliCommand::Spans { file, span, ignore } => {
            let child_filter = SpanFilter::not(SpanFilter::name_in_list(ignore));
            let parser = SpanParser::with_child_filter(SpanFilter::name_equals(span), child_filter);
            for metric in metrics_from_spans(&parser.parse_file(&file)?) {
                println!("{metric}");
            }
        }
        CliCommand::Meters {
            log_dir,
            aggregation,
            prefix,
        } => {
            let collector = TelemetryMeterCollector::with_name_prefix(aggregation, prefix)
                .into_complete_collector();
            for metric in collector.collect(&log_dir)? {
                println!("{metric}");
            }
        }
    }

    Ok(())
}
