use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use stockroom_cache::api::{ApiServer, ApiServerConfig, AppState};
use stockroom_cache::cache::spawn_expiry_sweeper;
use stockroom_cache::{
    CacheConfig, InMemoryDistributedStore, InvalidationEngine, MultiLayerCache, ShutdownMode,
    StaticCatalog, StrategyAdvisor, WarmupOrchestrator,
};

#[derive(Parser)]
#[command(name = "stockroom-cache")]
#[command(about = "Multi-layer cache for inventory and sales data", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the admin API server
    Serve {
        /// Host to bind to
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Port to bind to
        #[arg(short, long, default_value = "8080")]
        port: u16,

        /// JSON catalog used as the warmup data source
        #[arg(short, long)]
        catalog: Option<PathBuf>,

        /// Seconds to wait before the startup warmup
        #[arg(long, default_value = "0")]
        warmup_delay: u64,
    },

    /// Run one warmup pass and print the resulting status
    Warmup {
        /// JSON catalog used as the warmup data source
        #[arg(short, long)]
        catalog: PathBuf,
    },

    /// Load configuration from the environment and validate it
    CheckConfig,
}

fn build_cache(config: CacheConfig) -> Arc<MultiLayerCache> {
    Arc::new(
        MultiLayerCache::new(config, Arc::new(InMemoryDistributedStore::new()))
            .with_advisor(Arc::new(StrategyAdvisor::new())),
    )
}

fn load_catalog(path: Option<&PathBuf>) -> Result<Arc<StaticCatalog>> {
    let catalog = match path {
        Some(path) => StaticCatalog::load(path)?,
        None => StaticCatalog::default(),
    };
    Ok(Arc::new(catalog))
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "stockroom_cache=info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            host,
            port,
            catalog,
            warmup_delay,
        } => {
            let config = CacheConfig::from_env()?;
            let cache = build_cache(config.clone());
            let warmup = Arc::new(
                WarmupOrchestrator::builder(cache.clone())
                    .catalog(load_catalog(catalog.as_ref())?)
                    .build(),
            );
            let invalidation = Arc::new(InvalidationEngine::new(cache.clone()));

            let sweeper = config
                .enable_auto_cleanup
                .then(|| spawn_expiry_sweeper(cache.fast_layer().clone()));
            if config.warmup_on_startup {
                warmup.spawn_startup_warmup(Duration::from_secs(warmup_delay));
            }

            let state = Arc::new(AppState {
                cache,
                invalidation: invalidation.clone(),
                warmup,
            });
            let server = ApiServer::new(ApiServerConfig { host, port }, state);

            tokio::select! {
                result = server.start() => result?,
                _ = tokio::signal::ctrl_c() => info!("Shutdown requested"),
            }

            invalidation.shutdown(ShutdownMode::Drain).await;
            if let Some(sweeper) = sweeper {
                sweeper.abort();
            }
        }

        Commands::Warmup { catalog } => {
            let cache = build_cache(CacheConfig::from_env()?);
            let orchestrator = WarmupOrchestrator::builder(cache.clone())
                .catalog(load_catalog(Some(&catalog))?)
                .build();

            let status = orchestrator.warmup_all().await?;
            println!("{}", serde_json::to_string_pretty(&status)?);
            println!("{}", cache.statistics());
        }

        Commands::CheckConfig => {
            let config = CacheConfig::from_env()?;
            config.validate()?;
            println!("{}", serde_json::to_string_pretty(&config)?);
            println!("Configuration OK");
        }
    }

    Ok(())
}
