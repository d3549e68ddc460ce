//! # Multi-Layer Cache
//!
//! Layered caching for inventory and sales data.
//!
//! ## Features
//!
//! - **Layered lookups**: in-process Fast layer, distributed Shared layer and
//!   a counted Persistent placeholder, with promotion on Shared hits
//! - **Tag-based invalidation**: bidirectional tag index for group removal
//! - **Entity-aware invalidation**: per-entity key lists, smart, delayed,
//!   conditional and batch invalidation with timing statistics
//! - **Warmup**: concurrent, failure-isolated preloading of hot datasets
//! - **Adaptive placement**: strategy advisor choosing layer and expiration
//!   from observed access patterns
//!
//! ## Example
//!
//! ```rust
//! use stockroom_cache::cache::{CacheConfig, CacheLayer, InMemoryDistributedStore, MultiLayerCache};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = CacheConfig::builder()
//!     .default_ttl(Duration::from_secs(3600))
//!     .max_entries(10_000)
//!     .build();
//!
//! let cache = MultiLayerCache::new(config, Arc::new(InMemoryDistributedStore::new()));
//!
//! cache.set("product_42", &"Widget", None, CacheLayer::Shared).await;
//! cache.set_tag("product_42", "products");
//!
//! if let Some(name) = cache.get::<String>("product_42").await {
//!     println!("Cache hit: {}", name);
//! }
//!
//! cache.remove_by_tag("products").await;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod distributed;
pub mod entry;
pub mod invalidation;
pub mod layered;
pub mod store;
pub mod strategy;
pub mod tag_index;
pub mod types;
pub mod warmup;

pub use config::{CacheConfig, CacheConfigBuilder};
pub use distributed::{DistributedStore, InMemoryDistributedStore};
pub use entry::CacheEntry;
pub use invalidation::{
    DelayedInvalidation, InvalidationEngine, InvalidationKind, InvalidationRecord,
    InvalidationStatistics, ShutdownMode,
};
pub use layered::MultiLayerCache;
pub use store::{spawn_expiry_sweeper, EvictionCause, MemoryStore};
pub use strategy::{AccessPattern, CacheContext, CachePriority, CacheRecommendation, StrategyAdvisor};
pub use tag_index::TagIndex;
pub use types::{AccessStatistics, CacheKey, CacheLayer, CacheStatistics, CacheValue, LayerStats};
pub use warmup::{
    WarmupCategory, WarmupOrchestrator, WarmupOrchestratorBuilder, WarmupPhase, WarmupStatus,
};
