use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use esmetrics::duration::format_duration;
use esmetrics::{
    HealthFetcher, LineEncoder, MetricSink, Overrides, PollLoop, Settings, TickOutcome,
};

#[derive(Parser, Debug)]
#[command(name = "esmetrics", version)]
#[command(about = "Fetch Elasticsearch cluster health and store it into Graphite")]
struct Args {
    /// IP, FQDN or hostname of your Elasticsearch host
    #[arg(long = "elastic-host", visible_alias = "eh")]
    elastic_host: Option<String>,

    /// Elasticsearch HTTP port [default: 9200]
    #[arg(long = "elastic-port", visible_alias = "ep")]
    elastic_port: Option<u16>,

    /// IP, FQDN or hostname of your Carbon host
    #[arg(long = "graphite-host", visible_alias = "gh")]
    graphite_host: Option<String>,

    /// Carbon plaintext port [default: 2003]
    #[arg(long = "graphite-port", visible_alias = "gp")]
    graphite_port: Option<u16>,

    /// Graphite database name (metric prefix) [default: elasticsearch.cluster]
    #[arg(long = "graphite-db", visible_alias = "gd")]
    graphite_db: Option<String>,

    /// Metrics poll interval (e.g., "20s", "1m") [default: 20s]
    #[arg(long)]
    poll: Option<String>,

    /// Connection timeout (e.g., "5s") [default: 5s]
    #[arg(long)]
    timeout: Option<String>,

    /// Configuration file (TOML, YAML or JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Run a single poll and exit
    #[arg(long)]
    once: bool,
}

impl Args {
    fn overrides(&self) -> Overrides {
        Overrides {
            elastic_host: self.elastic_host.clone(),
            elastic_port: self.elastic_port,
            graphite_host: self.graphite_host.clone(),
            graphite_port: self.graphite_port,
            graphite_db: self.graphite_db.clone(),
            poll: self.poll.clone(),
            timeout: self.timeout.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();

    // Running unobserved is not an option
    init_logging()?;

    let settings = Settings::load(args.config.as_deref(), &args.overrides())
        .context("Invalid configuration")?;

    info!("ElasticSearch cluster health URL: {}", settings.elastic_url);
    info!("Poll period: {}", format_duration(settings.poll));

    let fetcher = HealthFetcher::builder()
        .url(settings.elastic_url.clone())
        .timeout(settings.timeout)
        .build()?;
    let sink = MetricSink::new(settings.graphite_addr.clone(), settings.timeout);

    let poller = PollLoop::new(
        Arc::new(fetcher),
        Arc::new(sink),
        LineEncoder::new(settings.graphite_db.clone()),
        settings.poll,
    );

    if args.once {
        // tick() has already logged any failure
        let outcome = poller.tick().await;
        if let TickOutcome::Sent { lines } = outcome {
            info!("Sent {} metrics to {}", lines, settings.graphite_addr);
        }
        return Ok(once_exit_code(&outcome));
    }

    let handle = poller.start();

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;

    info!("Interrupted, stopping poll loop");
    let _ = handle.stop().await;

    Ok(ExitCode::SUCCESS)
}

fn once_succeeded(outcome: &TickOutcome) -> bool {
    matches!(outcome, TickOutcome::Sent { .. } | TickOutcome::Empty)
}

fn once_exit_code(outcome: &TickOutcome) -> ExitCode {
    if once_succeeded(outcome) {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

fn init_logging() -> Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("esmetrics=info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init()
        .map_err(|e| anyhow!("Could not initialise logging: {}", e))
}
