use clap::Parser;
use scaleout::config::{Config, LoggingConfig, MetricsConfig};
use shared::metrics_defs::describe;
use std::error::Error;
use std::path::PathBuf;
use std::process;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "scaleout", about = "Routes registry requests to the cluster member owning them")]
struct Cli {
    /// Path to the YAML config file
    #[arg(long, short)]
    config: PathBuf,
}

fn init_logging(config: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn init_metrics(config: &MetricsConfig) -> Result<(), Box<dyn Error>> {
    let recorder = metrics_exporter_statsd::StatsdBuilder::from(
        config.statsd_host.clone(),
        config.statsd_port,
    )
    .build(Some("scaleout"))?;
    metrics::set_global_recorder(recorder).map_err(|_| "a metrics recorder is already installed")?;

    describe(cluster::metrics_defs::ALL_METRICS);
    describe(gql_proxy::metrics_defs::ALL_METRICS);
    Ok(())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match Config::from_file(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}: {e}", cli.config.display());
            process::exit(1);
        }
    };

    init_logging(&config.logging);

    if let Some(metrics) = &config.metrics {
        if let Err(e) = init_metrics(metrics) {
            tracing::error!(error = %e, "failed to set up metrics");
            process::exit(1);
        }
    }

    if let Err(e) = scaleout::run(config).await {
        tracing::error!(error = %e, "scaleout stopped");
        process::exit(1);
    }
}
