//! # Stockroom Cache (stockroom-cache)
//!
//! Caching subsystem for an inventory and sales application.
//!
//! ## Features
//!
//! - Fast in-process layer with TTL, LRU eviction and eviction callbacks
//! - Pluggable Shared (distributed) layer behind an async trait
//! - Tag index and entity-aware invalidation engine
//! - Warmup orchestrator with per-category failure isolation
//! - Strategy advisor for adaptive layer and expiration selection
//! - Administrative HTTP surface
//!
//! Steady-state cache operations never fail: errors are logged and turn into
//! misses or no-ops, so the application degrades to slower reads instead of
//! failing requests.
//!
//! ## Warmup
//!
//! ```no_run
//! use stockroom_cache::{CacheConfig, InMemoryDistributedStore, MultiLayerCache, StaticCatalog, WarmupOrchestrator};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let cache = Arc::new(MultiLayerCache::new(
//!         CacheConfig::from_env()?,
//!         Arc::new(InMemoryDistributedStore::new()),
//!     ));
//!
//!     let orchestrator = WarmupOrchestrator::builder(cache.clone())
//!         .catalog(Arc::new(StaticCatalog::load("catalog.json")?))
//!         .build();
//!
//!     let status = orchestrator.warmup_all().await?;
//!     println!("Warmed {}/{} categories", status.completed_items, status.total_items);
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod cache;
pub mod error;
pub mod schema;

// Re-export main types for convenience
pub use cache::{
    AccessPattern, CacheConfig, CacheConfigBuilder, CacheContext, CacheLayer, CachePriority,
    CacheStatistics, DistributedStore, InMemoryDistributedStore, InvalidationEngine,
    InvalidationStatistics, MultiLayerCache, ShutdownMode, StrategyAdvisor, WarmupCategory,
    WarmupOrchestrator, WarmupPhase, WarmupStatus,
};
pub use error::{CacheError, Result};
pub use schema::{ChangeOperation, InventoryEntity, StaticCatalog, TrackedEntity};
