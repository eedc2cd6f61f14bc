//! Parse or execute JSON:API atomic operation documents against a schema.
#![cfg_attr(not(any(test, doctest)), deny(clippy::unwrap_used))]
#![cfg_attr(not(any(test, doctest)), deny(clippy::expect_used))]

use std::io::{self, Read};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use jsonapi_ops_bus::config::{load_schemas, BusConfig, LogConfig, LogFormat};
use jsonapi_ops_bus::telemetry::init_tracing;
use jsonapi_ops_bus::{Collaborators, CommandBus, InMemoryStore, Outcome, RequestContext};
use jsonapi_ops_core::{OperationParser, ATOMIC_OPERATIONS};
use serde_json::{json, Value};
use tokio::runtime::Builder;

#[derive(Debug, Parser)]
#[command(name = "jsonapi-ops", about = "Parse and run JSON:API atomic operations", version)]
struct CliArgs {
    /// JSON schema file describing the resource types.
    #[arg(long, value_name = "path", env = "JSONAPI_OPS_SCHEMA")]
    schema: PathBuf,
    /// Prefix stripped from `href` values, e.g. `/api/v1`.
    #[arg(long = "base-path", value_name = "prefix", default_value = "")]
    base_path: String,
    #[arg(long = "log-format", value_enum, default_value_t = LogFormat::Pretty)]
    log_format: LogFormat,
    /// Log filter used when `JSONAPI_OPS_LOG` is unset.
    #[arg(long = "log-level", default_value = "warn")]
    log_level: String,
    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Debug, Subcommand)]
enum CliCommand {
    /// Parse a document and print the operations it contains.
    Parse {
        /// Document to read; standard input when omitted.
        file: Option<PathBuf>,
    },
    /// Execute a document against an empty in-memory store.
    Run {
        file: Option<PathBuf>,
        /// Seed records, as a JSON array of resource objects.
        #[arg(long, value_name = "path")]
        seed: Option<PathBuf>,
    },
}

fn main() -> anyhow::Result<()> {
    let args = CliArgs::parse();
    let config = BusConfig {
        base_path: args.base_path.clone(),
        log: LogConfig {
            level: args.log_level.clone(),
            format: args.log_format,
        },
        ..BusConfig::default()
    };
    init_tracing(&config.log)?;

    let runtime = Builder::new_current_thread()
        .enable_all()
        .build()
        .context("create Tokio runtime")?;
    runtime.block_on(async_main(args, config))
}

async fn async_main(args: CliArgs, config: BusConfig) -> anyhow::Result<()> {
    let schemas = load_schemas(&args.schema)?;
    match args.command {
        CliCommand::Parse { file } => {
            let document = read_document(file.as_ref())?;
            let parser = OperationParser::new(&schemas).with_base_path(&config.base_path);
            let operations = if is_batch(&document) {
                parser.parse_batch(&document)?
            } else {
                vec![parser.parse(&document)?]
            };
            for operation in &operations {
                println!("{}\t{}", operation.kind(), serde_json::to_string(operation)?);
            }
        }
        CliCommand::Run { file, seed } => {
            let document = read_document(file.as_ref())?;
            let store = InMemoryStore::new();
            if let Some(seed) = seed {
                let records = read_document(Some(&seed))?;
                let count = store.seed(&records)?;
                tracing::info!(count, "store seeded");
            }
            let operations = OperationParser::new(&schemas)
                .with_base_path(&config.base_path)
                .parse_batch(&document)?;

            let collaborators = Collaborators::new(Arc::new(store), Arc::new(schemas)).with_config(config);
            let bus = CommandBus::new(&collaborators);
            let outcomes = bus
                .dispatch_batch(operations, Some(&RequestContext::new()))
                .await?;
            let rendered: Vec<Value> = outcomes.iter().map(render).collect::<Result<_, _>>()?;
            println!("{}", serde_json::to_string_pretty(&rendered)?);
        }
    }
    Ok(())
}

fn is_batch(document: &Value) -> bool {
    document.is_array() || document.get(ATOMIC_OPERATIONS).is_some()
}

fn read_document(path: Option<&PathBuf>) -> anyhow::Result<Value> {
    let raw = match path {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("read document '{}'", path.display()))?,
        None => {
            let mut raw = String::new();
            io::stdin()
                .read_to_string(&mut raw)
                .context("read document from stdin")?;
            raw
        }
    };
    serde_json::from_str(&raw).context("document is not valid JSON")
}

fn render(outcome: &Outcome) -> anyhow::Result<Value> {
    if let Some(errors) = outcome.errors() {
        return Ok(json!({"errors": errors}));
    }
    Ok(serde_json::to_value(outcome.payload()?)?)
}
