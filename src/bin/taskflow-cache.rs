//! Operator tool for the TaskFlow cache: inspect entries and drop them by hand.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use anyhow::Result;
use clap::error::ErrorKind;
use clap::CommandFactory;
use clap::Parser;
use clap::Subcommand;
use comfy_table::CellAlignment;
use garde::Validate;
use taskflow_cache::prelude::*;
use taskflow_cache::taskflow::policy_table;

#[derive(Debug, Clone, Parser, Validate)]
#[clap(about, version, author, name = "taskflow-cache")]
struct Cli {
    /// Redis server URL.
    #[clap(long, env = "TASKFLOW_REDIS_URL", default_value = "redis://127.0.0.1:6379")]
    #[garde(custom(Self::redis_scheme))]
    redis_url: String,

    /// Timeout of a single Redis call, in milliseconds.
    #[clap(long, env = "TASKFLOW_STORE_TIMEOUT_MS", default_value_t = 2_000)]
    #[garde(range(min = 1, max = 60_000))]
    store_timeout_ms: u64,

    #[clap(subcommand)]
    #[garde(skip)]
    command: Command,
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Show which entries of an owner are cached.
    Status {
        #[clap(long)]
        owner:     OwnerId,
        /// Limit to a single namespace.
        #[clap(long)]
        namespace: Option<String>,
    },
    /// Drop entries of an owner: a namespace, a resource with all its variants, or a single variant.
    Invalidate {
        #[clap(long)]
        owner:     OwnerId,
        #[clap(long)]
        namespace: String,
        #[clap(long)]
        resource:  Option<String>,
        #[clap(long, requires = "resource")]
        variant:   Option<String>,
    },
    /// Dump a single entry by its key, e.g. `analytics:trends:42:30d`.
    Inspect { key: String },
}

impl Cli {
    fn redis_scheme(url: &String, _ctx: &()) -> garde::Result {
        if url.starts_with("redis://") || url.starts_with("rediss://") || url.starts_with("redis+unix://") {
            Ok(())
        }
        else {
            Err(garde::Error::new(format!("'{url}' is not a redis URL")))
        }
    }
}

fn setup_tracing() -> Result<()> {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init()?;

    Ok(())
}

fn status_table(entries: &[StatusEntry]) -> comfy_table::Table {
    let mut table = comfy_table::Table::new();
    table
        .load_preset(comfy_table::presets::ASCII_FULL_CONDENSED)
        .set_header(["Key", "Label", "Cached", "Size (bytes)"]);

    for entry in entries {
        table.add_row([
            entry.key.to_string(),
            entry.label(),
            if entry.exists { "yes" } else { "no" }.to_string(),
            entry.size_bytes.to_string(),
        ]);
    }

    if let Some(column) = table.column_mut(3) {
        column.set_cell_alignment(CellAlignment::Right);
    }

    table
}

fn report(outcome: &InvalidationReport) {
    for key in &outcome.deleted {
        println!("dropped  {key}");
    }
    for key in &outcome.failed {
        println!("FAILED   {key}");
    }
}

async fn inspect(store: &dyn KeyValueStore, policies: &PolicyTable, raw_key: &str) -> Result<()> {
    let key: CacheKey = raw_key.parse()?;
    let ttl = policies.ttl_of(&key)?;

    let mut table = comfy_table::Table::new();
    table.load_preset(comfy_table::presets::ASCII_FULL_CONDENSED);
    table.add_row(["Key".to_string(), key.to_string()]);
    table.add_row(["Policy TTL".to_string(), format!("{}s", ttl.as_secs())]);

    match store.get(&key.to_string()).await? {
        Some(bytes) => {
            table.add_row(["Size (bytes)".to_string(), bytes.len().to_string()]);
            let payload = match serde_json::from_slice::<serde_json::Value>(&bytes) {
                Ok(value) => serde_json::to_string_pretty(&value)?,
                Err(err) => format!("<not JSON: {err}>"),
            };
            println!("{table}");
            println!("{payload}");
        }
        None => {
            table.add_row(["Cached".to_string(), "no".to_string()]);
            println!("{table}");
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    if let Err(err) = cli.validate() {
        let mut cmd = Cli::command();
        cmd.error(ErrorKind::InvalidValue, err).exit();
    }

    setup_tracing()?;

    let store: Arc<dyn KeyValueStore> = Arc::new(
        RedisStore::connect(&cli.redis_url)
            .await
            .with_context(|| format!("connecting to {}", cli.redis_url))?,
    );
    let policies = Arc::new(policy_table()?);
    let cache = ResourceCache::builder()
        .store(store.clone())
        .policies(policies.clone())
        .store_timeout(Duration::from_millis(cli.store_timeout_ms))
        .build()?;

    match cli.command {
        Command::Status { owner, namespace } => {
            let namespaces = match namespace {
                Some(namespace) => vec![namespace],
                None => policies.namespaces().into_iter().map(str::to_string).collect(),
            };
            let mut entries = Vec::new();
            for namespace in namespaces {
                entries.extend(cache.namespace_status(&namespace, owner).await?);
            }
            println!("{}", status_table(&entries));
        }
        Command::Invalidate {
            owner,
            namespace,
            resource,
            variant,
        } => {
            let outcome = match (resource, variant) {
                (Some(resource), Some(variant)) => {
                    cache
                        .invalidate(&namespace, &resource, owner, Some(variant.as_str()))
                        .await
                }
                (Some(resource), None) => cache.invalidate_all(&namespace, &resource, owner).await,
                (None, _) => cache.invalidate_namespace(&namespace, owner).await,
            };
            match outcome {
                Ok(outcome) => report(&outcome),
                Err(CacheError::InvalidationFailed { keys }) => {
                    report(&InvalidationReport {
                        deleted: vec![],
                        failed:  keys,
                    });
                    anyhow::bail!("no entry could be dropped");
                }
                Err(err) => return Err(err.into()),
            }
        }
        Command::Inspect { key } => inspect(store.as_ref(), &policies, &key).await?,
    }

    Ok(())
}
