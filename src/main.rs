//! cachefill CLI
//!
//! Runs the batch loader against in-process endpoints and a synthetic backing
//! source, logging what each round served from cache and what it fetched.
//! Useful as a smoke test for the loader pipeline and for watching its logs.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use serde::{Deserialize, Serialize};
use tracing::{info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cachefill::reporting::report_error;
use cachefill::{
    BatchCacheLoader, CacheClient, EndpointConfig, InMemoryEndpoint, LoaderConfig,
    ReportContext, SplitCacheClient, TracingErrorReporter,
};

// =============================================================================
// CLI Arguments
// =============================================================================

/// cachefill - batched cache-aside loader
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Comma-separated logical keys to load
    #[arg(long, value_delimiter = ',', default_value = "alpha,beta,gamma")]
    keys: Vec<String>,

    /// Expiry for refilled entries, in seconds
    #[arg(long, env = "CACHEFILL_TTL_SECONDS", default_value = "300")]
    ttl_seconds: u64,

    /// Number of load rounds to run
    #[arg(long, env = "CACHEFILL_ROUNDS", default_value = "2")]
    rounds: usize,

    /// Name of the in-process primary (write) store; any `:port` suffix is ignored
    #[arg(long, env = "CACHEFILL_PRIMARY", default_value = "localhost")]
    primary: String,

    /// Name of the in-process reader (read) store; same name as the primary shares one store
    #[arg(long, env = "CACHEFILL_READER", default_value = "localhost")]
    reader: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,
}

/// Record produced by the synthetic backing source
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Record {
    key: String,
    length: usize,
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    init_logging(&args);

    let loader_config = LoaderConfig::with_ttl(args.ttl_seconds);
    loader_config.validate()?;

    let endpoints = EndpointConfig::new(args.primary.clone(), args.reader.clone());
    let primary_name = EndpointConfig::parse_host(&endpoints.primary)?;
    let reader_name = EndpointConfig::parse_host(&endpoints.reader)?;

    info!("Starting cachefill");
    info!("  Primary store: {}", primary_name);
    info!("  Reader store: {}", reader_name);
    info!("  TTL: {:?}", loader_config.ttl());
    info!("  Keys: {}", args.keys.join(","));

    // In-process stores do not replicate, so a split topology would never see
    // its own writes. Both roles share one store unless the names differ.
    let primary = Arc::new(InMemoryEndpoint::named(primary_name));
    let client = if endpoints.is_shared() {
        Arc::new(SplitCacheClient::single(primary))
    } else {
        let reader = Arc::new(InMemoryEndpoint::named(reader_name));
        Arc::new(SplitCacheClient::new(primary, reader))
    };

    let loader = BatchCacheLoader::with_config(client.clone(), loader_config);
    let reporter = TracingErrorReporter;
    let fetches = AtomicUsize::new(0);
    let fetched = &fetches;

    for round in 1..=args.rounds {
        let result = loader
            .load(
                &args.keys,
                &|key: &String| key.clone(),
                &|record: &Record| record.key.clone(),
                |missed| async move {
                    fetched.fetch_add(missed.len(), Ordering::Relaxed);
                    Ok::<_, cachefill::Error>(
                        missed
                            .into_iter()
                            .map(|key| Record {
                                length: key.len(),
                                key,
                            })
                            .collect::<Vec<_>>(),
                    )
                },
            )
            .await;

        match result {
            Ok(records) => {
                let resolved = records.iter().filter(|r| r.is_some()).count();
                info!(
                    round,
                    requested = records.len(),
                    resolved,
                    fetched_total = fetches.load(Ordering::Relaxed),
                    "Round complete"
                );
            }
            Err(e) => {
                let context = ReportContext::new()
                    .tag("kind", "load")
                    .extra("round", round.to_string())
                    .breadcrumb("cachefill > load");
                report_error(&reporter, &e, &context);
                return Err(e).context(format!("load round {} failed", round));
            }
        }
    }

    let stats = client.stats();
    info!(
        primary_ops = stats.primary_ops,
        reader_ops = stats.reader_ops,
        transactions = stats.transactions,
        "Routing stats"
    );

    client.close().await?;
    info!("cachefill shutdown complete");
    Ok(())
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(args: &Args) {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let filter = EnvFilter::from_default_env().add_directive(level.into());

    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true))
            .init();
    }
}
