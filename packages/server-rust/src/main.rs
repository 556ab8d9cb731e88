//! `SchemAPI` server binary.
//!
//! Reads a JSON document of schema definitions and serves a REST collection
//! for each of them.
//!
//! Usage:
//!   schemapi --schemas schemas.json --port 8080 --environment development --dev-user alice

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use schemapi_core::{Principal, Schema};
use schemapi_server::network::{NetworkConfig, NetworkModule};
use schemapi_server::service::{Api, ApiConfig, Environment};
use schemapi_server::storage::MemoryStore;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormat {
    Pretty,
    Json,
}

#[derive(Parser, Debug)]
#[command(name = "schemapi")]
#[command(about = "Schema-driven REST collections with lifecycle hooks")]
struct Args {
    /// Bind address
    #[arg(long, env = "SCHEMAPI_HOST", default_value = "0.0.0.0")]
    host: String,

    /// Port to listen on (0 picks a free port)
    #[arg(short, long, env = "SCHEMAPI_PORT", default_value = "8080")]
    port: u16,

    /// JSON file mapping collection names to field definitions
    #[arg(short, long, env = "SCHEMAPI_SCHEMAS")]
    schemas: PathBuf,

    /// production or development; only development enables `clear` and `--dev-user`
    #[arg(long, env = "SCHEMAPI_ENV", default_value = "production")]
    environment: Environment,

    /// Per-emission listener timeout in milliseconds, 0 waits indefinitely
    #[arg(long, env = "SCHEMAPI_LISTENER_TIMEOUT_MS", default_value = "30000")]
    listener_timeout_ms: u64,

    /// Answer failed operations with matching HTTP status codes instead of 200
    #[arg(long, env = "SCHEMAPI_ERROR_STATUS_CODES")]
    error_status_codes: bool,

    /// Allowed CORS origin, repeatable
    #[arg(long = "cors-origin", env = "SCHEMAPI_CORS_ORIGINS", value_delimiter = ',', default_value = "*")]
    cors_origins: Vec<String>,

    /// Request timeout in seconds
    #[arg(long, env = "SCHEMAPI_REQUEST_TIMEOUT_SECS", default_value = "30")]
    request_timeout_secs: u64,

    /// Identity attached to unauthenticated requests (development only)
    #[arg(long, env = "SCHEMAPI_DEV_USER")]
    dev_user: Option<String>,

    /// Log output format
    #[arg(long, value_enum, env = "SCHEMAPI_LOG_FORMAT", default_value = "pretty")]
    log_format: LogFormat,
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(false);
    match format {
        LogFormat::Pretty => builder.compact().init(),
        LogFormat::Json => builder.json().init(),
    }
}

fn load_schemas(path: &Path) -> Result<Vec<Schema>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading schemas from {}", path.display()))?;
    let definitions: serde_json::Value =
        serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))?;
    Ok(Schema::parse_set(&definitions)?)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.log_format);

    let schemas = load_schemas(&args.schemas)?;
    info!(count = schemas.len(), environment = %args.environment, "schemas loaded");

    let api_config = ApiConfig {
        environment: args.environment,
        listener_timeout: (args.listener_timeout_ms > 0)
            .then(|| Duration::from_millis(args.listener_timeout_ms)),
    };
    let api = Api::from_schemas(schemas, Arc::new(MemoryStore::new()), api_config).await?;

    let network_config = NetworkConfig {
        host: args.host,
        port: args.port,
        cors_origins: args.cors_origins,
        request_timeout: Duration::from_secs(args.request_timeout_secs),
        error_status_codes: args.error_status_codes,
        dev_identity: args.dev_user.map(Principal::new),
    };

    let mut module = NetworkModule::new(network_config, Arc::new(api));
    let port = module.start().await?;
    info!(port, "SchemAPI listening");

    module
        .serve(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %err, "failed to listen for ctrl-c");
                std::future::pending::<()>().await;
            }
        })
        .await
}
