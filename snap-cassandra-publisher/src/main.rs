use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use snap_cassandra_core::JSON_CONTENT_TYPE;
use snap_cassandra_publisher::{
    config::{self, ConfigMap},
    Publisher,
};
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "snap-cassandra-publisher")]
#[command(about = "Publishes metric batches into Cassandra")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Publish batches read line by line from a file or stdin
    Publish {
        /// YAML file holding the publisher configuration
        #[arg(short, long)]
        config: PathBuf,

        /// Encoding of each batch
        #[arg(long, default_value = JSON_CONTENT_TYPE)]
        content_type: String,

        /// Input file, one batch per line; stdin when absent
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Print the publish counters in Prometheus text format when done
        #[arg(long)]
        print_metrics: bool,
    },
    /// Print the publisher metadata as JSON
    Meta,
    /// Print the accepted configuration keys as JSON
    Schema,
}

fn load_config(path: &Path) -> Result<ConfigMap> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    let config: ConfigMap = serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse config file {}", path.display()))?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Meta => {
            println!("{}", serde_json::to_string_pretty(&Publisher::metadata())?);
        }
        Commands::Schema => {
            println!("{}", serde_json::to_string_pretty(Publisher::config_schema().rules())?);
        }
        Commands::Publish {
            config: config_path,
            content_type,
            input,
            print_metrics,
        } => {
            let config = load_config(&config_path)?;
            let log = config::log_level(&config);
            tracing_subscriber::fmt()
                .with_max_level(log.level)
                .with_writer(std::io::stderr)
                .init();
            for problem in &log.problems {
                warn!("{}", problem);
            }

            let reader: Box<dyn BufRead> = match &input {
                Some(path) => Box::new(BufReader::new(
                    std::fs::File::open(path)
                        .with_context(|| format!("Failed to open input {}", path.display()))?,
                )),
                None => Box::new(BufReader::new(std::io::stdin())),
            };

            run_publish(reader, &content_type, &config, print_metrics).await?;
        }
    }

    Ok(())
}

async fn run_publish(
    reader: Box<dyn BufRead>,
    content_type: &str,
    config: &ConfigMap,
    print_metrics: bool,
) -> Result<()> {
    let publisher = Publisher::cassandra();
    let mut failed_batches = 0usize;

    for (index, line) in reader.lines().enumerate() {
        let line = line.context("Failed to read input")?;
        if line.trim().is_empty() {
            continue;
        }

        if let Err(e) = publisher.publish(content_type, line.as_bytes(), config).await {
            if e.is_fatal() {
                error!(error = %e, "Cannot continue without a Cassandra session");
                publisher.close().await;
                std::process::exit(1);
            }
            error!(batch = index + 1, error = %e, "Batch published with errors");
            failed_batches += 1;
        }
    }

    let stats = publisher.stats();
    info!(
        batches = stats.batches_total,
        rows = stats.rows_written_total,
        tag_rows = stats.tag_rows_written_total,
        failed_batches,
        "Publishing finished"
    );
    publisher.close().await;

    if print_metrics {
        print!("{}", publisher.prometheus_metrics());
    }

    if failed_batches > 0 {
        anyhow::bail!("{} batches failed", failed_batches);
    }
    Ok(())
}
