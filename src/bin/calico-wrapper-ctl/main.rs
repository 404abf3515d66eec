use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::fs;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use calico_wrapper::args::CniArgs;
use calico_wrapper::audit::{read_records, TransactionRecord};
use calico_wrapper::config::{NetConf, WrapperConfig};
use calico_wrapper::environment::{CNI_ARGS, CNI_COMMAND};
use calico_wrapper::k8s::{
    assigned_address, Connector, KubeConnector, PodLookup, IP_ADDRESS_ANNOTATION,
};

/// Inspect and troubleshoot the calico CNI wrapper
#[derive(Parser)]
#[clap(name = "calico-wrapper-ctl", author, version, about)]
struct Cli {
    /// Enable verbose output
    #[clap(short, long)]
    verbose: bool,

    /// Subcommand to execute
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Decode a CNI_ARGS string
    Args {
        /// Encoded arguments, e.g. "K8S_POD_NAMESPACE=default;K8S_POD_NAME=web"
        value: String,
    },

    /// Fetch a pod the way the wrapper does on ADD
    Lookup {
        /// Network configuration file handed to the wrapper on stdin
        #[clap(long)]
        config: PathBuf,

        /// Pod namespace
        #[clap(long, default_value = "default")]
        namespace: String,

        /// Pod name
        #[clap(long)]
        name: String,
    },

    /// Summarize audit log records
    Log {
        /// Audit log to read
        #[clap(long)]
        file: Option<PathBuf>,

        /// Only show the last N records
        #[clap(long)]
        tail: Option<usize>,

        /// Only show records with errors
        #[clap(long)]
        errors_only: bool,
    },
}

fn env_value<'a>(record: &'a TransactionRecord, key: &str) -> Option<&'a str> {
    record
        .environment
        .iter()
        .find_map(|line| line.strip_prefix(key)?.strip_prefix('='))
}

fn summarize(record: &TransactionRecord) -> String {
    let mut summary = format!(
        "command={} args={:?}",
        env_value(record, CNI_COMMAND).unwrap_or("-"),
        env_value(record, CNI_ARGS).unwrap_or(""),
    );

    if let Some(pod) = &record.pod {
        summary.push_str(&format!(
            " pod={}/{}",
            pod.metadata.namespace.as_deref().unwrap_or_default(),
            pod.metadata.name.as_deref().unwrap_or_default()
        ));
    }
    if !record.errors.is_empty() {
        summary.push_str(&format!(" errors={:?}", record.errors));
    }

    summary
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "warn" };
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::new(log_level))
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set default subscriber")?;

    match cli.command {
        Commands::Args { value } => {
            let args = CniArgs::parse(&value)?;
            let pairs: serde_json::Map<String, serde_json::Value> = args
                .iter()
                .map(|(k, v)| (k.to_string(), serde_json::Value::from(v)))
                .collect();
            println!("{}", serde_json::to_string_pretty(&pairs)?);
        }

        Commands::Lookup {
            config,
            namespace,
            name,
        } => {
            let bytes = fs::read(&config)
                .with_context(|| format!("Failed to read {}", config.display()))?;
            let conf = NetConf::parse(&bytes)?;

            let lookup = KubeConnector.connect(&conf)?;
            let pod = lookup.fetch_workload(&namespace, &name)?;
            info!("Fetched pod {}/{}", namespace, name);

            match assigned_address(&pod) {
                Some(address) => println!("{}", address),
                None => println!(
                    "Pod {}/{} has no {} annotation",
                    namespace, name, IP_ADDRESS_ANNOTATION
                ),
            }
        }

        Commands::Log {
            file,
            tail,
            errors_only,
        } => {
            let path = file.unwrap_or_else(|| WrapperConfig::default().log_path);
            let records = read_records(&path)
                .with_context(|| format!("Failed to read audit log {}", path.display()))?;

            let selected: Vec<_> = records
                .iter()
                .filter(|r| !errors_only || !r.errors.is_empty())
                .collect();
            let skip = tail.map_or(0, |n| selected.len().saturating_sub(n));

            for record in &selected[skip..] {
                println!("{}", summarize(record));
            }
        }
    }

    Ok(())
}
