//! CLI binary for cloud-boot-metadata crate.

use std::process::ExitCode;

use clap::Parser;
use cloud_boot_metadata::{
    default_base_url, CloudMetadata, CloudProvider, Metadata, MetadataError, RetryConfig,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "cloud-boot-metadata")]
#[command(
    author,
    version,
    about = "Fetch and normalize instance metadata at boot"
)]
struct Cli {
    /// Cloud provider to query (ec2, gce, openstack-metadata, digitalocean)
    #[arg(short, long, value_parser = parse_provider)]
    provider: CloudProvider,

    /// Override the metadata service base URL
    #[arg(long)]
    base_url: Option<String>,

    /// Attempts per request before giving up
    #[arg(long)]
    max_attempts: Option<u32>,

    /// Output format
    #[arg(short, long, default_value = "env")]
    format: OutputFormat,

    /// Increase log verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
enum OutputFormat {
    #[default]
    Env,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "env" => Ok(OutputFormat::Env),
            "json" => Ok(OutputFormat::Json),
            _ => Err(format!("unknown format: {}", s)),
        }
    }
}

fn parse_provider(s: &str) -> Result<CloudProvider, String> {
    s.parse().map_err(|_| {
        let names: Vec<&str> = CloudProvider::ALL.iter().map(|p| p.name()).collect();
        format!("unknown provider: {} (expected one of {})", s, names.join(", "))
    })
}

fn init_logging(verbosity: u8) {
    let level = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), MetadataError> {
    let base_url = cli
        .base_url
        .as_deref()
        .unwrap_or_else(|| default_base_url(cli.provider));
    let mut config = RetryConfig::default();
    if let Some(attempts) = cli.max_attempts {
        config = config.with_max_attempts(attempts);
    }

    let metadata = CloudMetadata::with_config(cli.provider, base_url, config)?
        .fetch_metadata()
        .await?;

    match cli.format {
        OutputFormat::Env => print_env(&metadata),
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(&metadata).map_err(|source| {
                MetadataError::Json {
                    key: "output".to_string(),
                    source,
                }
            })?;
            println!("{}", json);
        }
    }
    Ok(())
}

fn print_env(metadata: &Metadata) {
    for (key, value) in &metadata.attributes {
        println!("{}={}", key, value);
    }
}
