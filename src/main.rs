use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use querysource::config::{Config, StoreKind};
use querysource::export;
use querysource::query::Scope;
use querysource::source::cosmos::RequestOptions;
use querysource::store::ConnectionPolicy;
use querysource::{
    parse_request_with_fields, CancellationToken, CosmosDbDataSource, DataSource, Document, MemoryStore,
    MongoDbDataSource, QueryRequest, RavenDbDataSource,
};

/// Run AutoQuery-style requests against a JSON document set
#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// JSON file holding an array of documents
    #[arg(long)]
    data: PathBuf,

    /// Adapter to query through (overrides the config file)
    #[arg(long, value_enum)]
    store: Option<StoreArg>,

    /// Collection name
    #[arg(long)]
    collection: Option<String>,

    /// Items per page for paged stores
    #[arg(long = "page-size")]
    page_size: Option<usize>,

    #[arg(long, value_enum, default_value_t = Format::Table)]
    format: Format,

    /// Config file (default: <config dir>/querysource/config.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Request parameters, e.g. NumberGreaterThan=5 Take=5 "Include=SUM(Number) Total"
    #[arg(value_parser = parse_param)]
    params: Vec<(String, String)>,
}

#[derive(Clone, Copy, ValueEnum)]
enum StoreArg {
    Cosmos,
    Mongo,
    Raven,
}

impl From<StoreArg> for StoreKind {
    fn from(arg: StoreArg) -> Self {
        match arg {
            StoreArg::Cosmos => StoreKind::Cosmos,
            StoreArg::Mongo => StoreKind::Mongo,
            StoreArg::Raven => StoreKind::Raven,
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Format {
    Json,
    Table,
    Csv,
}

/// Documents are passed through untyped.
#[derive(Serialize, Deserialize)]
#[serde(transparent)]
struct Record(Value);

impl Document for Record {
    const COLLECTION: &'static str = "Documents";
    const PRIMARY_KEY: &'static str = "Id";
}

fn parse_param(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("expected KEY=VALUE, got '{}'", raw)),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("querysource=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(store) = cli.store {
        config.store = store.into();
    }
    if let Some(page_size) = cli.page_size {
        config.memory.page_size = page_size;
    }

    let content = std::fs::read_to_string(&cli.data)
        .with_context(|| format!("Failed to read {}", cli.data.display()))?;
    let documents: Vec<Value> = serde_json::from_str(&content)
        .with_context(|| format!("{} is not a JSON array of documents", cli.data.display()))?;

    let fields = field_names(&documents);
    let known: Vec<&str> = fields.iter().map(String::as_str).collect();
    let request = parse_request_with_fields(
        cli.params.iter().map(|(k, v)| (k.as_str(), v.as_str())),
        &known,
    )?;
    debug!(?request, "parsed request");

    let mut store = MemoryStore::new().with_page_size(config.memory.page_size);
    if let Some(field) = &config.memory.partition_field {
        store = store.with_partition_field(field.clone());
    }
    if let Some(ms) = config.memory.latency_ms {
        store = store.with_latency(Duration::from_millis(ms));
    }
    let store = Arc::new(store);

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, cancelling query");
            trigger.cancel();
        }
    });

    let rows = match config.store {
        StoreKind::Cosmos => {
            let settings = &config.cosmos;
            let collection = cli.collection.clone().or_else(|| settings.collection_id.clone());
            let source = CosmosDbDataSource::<Record, _>::new(
                store.clone(),
                &settings.database_id,
                collection,
                settings.partition_key.clone(),
            )?
            .with_connection_policy(ConnectionPolicy {
                connection_mode: settings.connection_mode,
                connection_protocol: settings.connection_protocol,
            })
            .with_request_options(RequestOptions {
                consistency_level: settings.consistency_level,
            });
            seed(&store, &source.scope(), documents).await;
            run(&source, &request, &cancel).await?
        }
        StoreKind::Mongo => {
            let settings = &config.mongo;
            let collection = cli.collection.clone().or_else(|| settings.collection_id.clone());
            let source =
                MongoDbDataSource::<Record, _>::new(store.clone(), &settings.database_id, collection)?;
            seed(&store, &source.scope(), documents).await;
            run(&source, &request, &cancel).await?
        }
        StoreKind::Raven => {
            let settings = &config.raven;
            let collection = cli.collection.clone().or_else(|| settings.collection_id.clone());
            let mut source = RavenDbDataSource::<Record, _>::new(store.clone(), collection);
            if let Some(index) = &settings.index_name {
                store.define_index(index.clone()).await;
                source = source.with_index(index.clone(), settings.is_map_reduce);
            }
            seed(&store, &source.scope(), documents).await;
            run(&source, &request, &cancel).await?
        }
    };

    let output = match cli.format {
        Format::Json => export::to_json(&rows) + "\n",
        Format::Table => export::to_table(&rows),
        Format::Csv => export::to_csv(&rows),
    };
    print!("{}", output);
    Ok(())
}

/// Top-level keys across all documents; these are never read as operator suffixes.
fn field_names(documents: &[Value]) -> BTreeSet<String> {
    documents
        .iter()
        .filter_map(Value::as_object)
        .flat_map(|doc| doc.keys().cloned())
        .collect()
}

async fn seed(store: &MemoryStore, scope: &Scope, documents: Vec<Value>) {
    store.insert(scope, documents).await;
    info!(
        collection = %scope.path(),
        documents = store.document_count(scope).await.unwrap_or(0),
        page_size = store.page_size(),
        "seeded store"
    );
}

/// Aggregates when the request includes any, otherwise the selected rows.
async fn run<S: DataSource>(
    source: &S,
    request: &QueryRequest,
    cancel: &CancellationToken,
) -> Result<Vec<Value>> {
    if request.aggregates.is_empty() && !request.include_total {
        return Ok(source.load_select::<Value>(&request.query, cancel).await?);
    }

    let mut results = Vec::new();
    for aggregate in &request.aggregates {
        let value = source
            .select_aggregate(&request.query, &aggregate.name, &aggregate.args, cancel)
            .await?;
        if value.is_none() && aggregate.aggregate().is_none() {
            warn!(aggregate = %aggregate.name, "not an aggregate, ignored");
            continue;
        }
        results.push((aggregate.label(), value));
    }
    if request.include_total {
        let total = source.count(&request.query, cancel).await?;
        results.push(("Total".to_string(), Some(Value::from(total))));
    }
    Ok(vec![export::aggregate_row(&results)])
}
