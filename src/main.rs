//! tiercache - inspection and read-through CLI
//!
//! ```text
//! tiercache --config cache.yaml hash https://mirror.local/pool/a.deb
//! tiercache --config cache.yaml scan --json
//! tiercache --config cache.yaml get https://mirror.local/pool/a.deb > a.deb
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::{info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use tiercache::adapters::{HttpFetcher, PrometheusMetricsSink};
use tiercache::cache::CacheKey;
use tiercache::{Cache, CacheConfig, Lookup};

// =============================================================================
// CLI Arguments
// =============================================================================

/// Two-tier caching proxy store
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the YAML configuration
    #[arg(long, env = "TIERCACHE_CONFIG")]
    config: Option<PathBuf>,

    /// Cache folder (overrides the configuration)
    #[arg(long, env = "TIERCACHE_FOLDER")]
    cache_folder: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the normalized key and identifier of a URL
    Hash { key: String },

    /// List known entries
    Scan {
        /// Print entries as JSON
        #[arg(long)]
        json: bool,
    },

    /// Read a URL through the cache, filling it from the origin on a miss
    Get {
        url: String,

        /// Print Prometheus metrics to stderr afterwards
        #[arg(long)]
        print_metrics: bool,
    },
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    init_logging(&args);

    match &args.command {
        Command::Hash { key } => {
            let key = CacheKey::parse(key)?;
            println!("{}\t{}", key.normalized(), key.identifier());
        }
        Command::Scan { json } => {
            let (cache, _, _) = open_cache(&args)?;
            scan(&cache, *json).await?;
        }
        Command::Get { url, print_metrics } => {
            let (cache, fetcher, metrics) = open_cache(&args)?;
            get(&cache, &fetcher, url).await?;
            if *print_metrics {
                eprint!("{}", metrics.render()?);
            }
        }
    }

    Ok(())
}

fn open_cache(args: &Args) -> anyhow::Result<(Cache, Arc<HttpFetcher>, Arc<PrometheusMetricsSink>)> {
    let config = load_config(args)?;
    info!(
        folder = %config.cache_folder.display(),
        rules = config.ttl_rules.len(),
        default_ttl = ?config.default_ttl,
        "Opening cache"
    );

    let fetcher = Arc::new(HttpFetcher::new(&config.cache_folder)?);
    let metrics = Arc::new(PrometheusMetricsSink::new()?);
    let cache = Cache::create(&config, fetcher.clone(), metrics.clone())?;
    Ok((cache, fetcher, metrics))
}

fn load_config(args: &Args) -> anyhow::Result<CacheConfig> {
    let mut config = match &args.config {
        Some(path) => CacheConfig::load(path)
            .with_context(|| format!("loading configuration from {}", path.display()))?,
        None => CacheConfig::new("./cache"),
    };
    if let Some(folder) = &args.cache_folder {
        config.cache_folder = folder.clone();
    }
    Ok(config)
}

async fn scan(cache: &Cache, json: bool) -> anyhow::Result<()> {
    let entries = cache.entries().await;
    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    for entry in &entries {
        println!(
            "{}\t{}\t{}\t{}",
            entry.identifier,
            entry.tier,
            entry.size.map(|s| s.to_string()).unwrap_or_else(|| "-".into()),
            entry
                .modified
                .map(|m| m.to_rfc3339())
                .unwrap_or_else(|| "-".into()),
        );
    }
    info!(entries = entries.len(), "Scan complete");
    Ok(())
}

async fn get(cache: &Cache, fetcher: &HttpFetcher, url: &str) -> anyhow::Result<()> {
    if let Lookup::Fill(permit) = cache.has(url).await? {
        info!(url, "Cache miss, fetching from origin");
        let body = fetcher.download(url).await?;
        let length = body.len() as u64;
        cache.put(url, permit, &body[..], length).await?;
    }

    let mut reader = cache.get(url).await?;
    info!(url, tier = %reader.tier(), size = reader.size(), "Serving from cache");
    let mut stdout = tokio::io::stdout();
    tokio::io::copy(&mut reader, &mut stdout).await?;
    tokio::io::AsyncWriteExt::flush(&mut stdout).await?;
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

    let filter = EnvFilter::from_default_env()
        .add_directive(level.into())
        .add_directive("hyper=warn".parse().unwrap())
        .add_directive("reqwest=warn".parse().unwrap());

    // Logs go to stderr; stdout carries payloads
    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}
