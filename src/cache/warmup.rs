//! Warmup orchestrator
//!
//! Proactively loads the hot datasets into the cache before first demand.
//! A run covers five categories concurrently; each category fetches from its
//! own collaborator, writes its entries to the Shared layer (mirrored into
//! Fast), and tags them with the category tag so a single category can be
//! dropped and reloaded with [`WarmupOrchestrator::rewarmup`].
//!
//! Categories are isolated: a failing or timed-out collaborator only marks its
//! own category as failed.

use crate::cache::layered::MultiLayerCache;
use crate::cache::types::CacheLayer;
use crate::error::{CacheError, Result};
use crate::schema::{DashboardStatistics, InventoryLevel, Product, StaticCatalog, UserSummary};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Product catalog source
#[async_trait]
pub trait ProductService: Send + Sync {
    async fn all_products(&self) -> Result<Vec<Product>>;
    async fn categories(&self) -> Result<Vec<String>>;
}

/// Stock-level repository with generic filtering
#[async_trait]
pub trait InventoryRepository: Send + Sync {
    async fn find(
        &self,
        predicate: &(dyn for<'a> Fn(&'a InventoryLevel) -> bool + Send + Sync),
    ) -> Result<Vec<InventoryLevel>>;
}

#[async_trait]
pub trait StatisticsService: Send + Sync {
    async fn dashboard_statistics(&self) -> Result<DashboardStatistics>;
}

/// Application settings, rarely changing
#[async_trait]
pub trait SettingsProvider: Send + Sync {
    async fn settings(&self) -> Result<HashMap<String, serde_json::Value>>;
}

#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn active_users(&self) -> Result<Vec<UserSummary>>;
}

/// Warmup category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WarmupCategory {
    Products,
    Inventory,
    Statistics,
    Configuration,
    UserData,
}

impl WarmupCategory {
    pub const ALL: [WarmupCategory; 5] = [
        WarmupCategory::Products,
        WarmupCategory::Inventory,
        WarmupCategory::Statistics,
        WarmupCategory::Configuration,
        WarmupCategory::UserData,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            WarmupCategory::Products => "products",
            WarmupCategory::Inventory => "inventory",
            WarmupCategory::Statistics => "statistics",
            WarmupCategory::Configuration => "configuration",
            WarmupCategory::UserData => "user-data",
        }
    }

    /// Tag attached to every entry the category writes
    pub fn tag(&self) -> &'static str {
        match self {
            WarmupCategory::UserData => "users",
            other => other.name(),
        }
    }

    /// Entry expiration, from minutes for volatile stats to a day for settings
    pub fn expiration(&self) -> Duration {
        match self {
            WarmupCategory::Products => Duration::from_secs(60 * 60),
            WarmupCategory::Inventory => Duration::from_secs(15 * 60),
            WarmupCategory::Statistics => Duration::from_secs(5 * 60),
            WarmupCategory::Configuration => Duration::from_secs(24 * 60 * 60),
            WarmupCategory::UserData => Duration::from_secs(30 * 60),
        }
    }
}

impl fmt::Display for WarmupCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for WarmupCategory {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "products" | "product" => Ok(WarmupCategory::Products),
            "inventory" => Ok(WarmupCategory::Inventory),
            "statistics" | "stats" => Ok(WarmupCategory::Statistics),
            "configuration" | "config" | "settings" => Ok(WarmupCategory::Configuration),
            "user-data" | "userdata" | "users" => Ok(WarmupCategory::UserData),
            _ => Err(CacheError::UnknownCategory(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarmupPhase {
    NotStarted,
    Running,
    Completed,
    CompletedWithFailures,
}

/// Progress of the current (or last) warmup run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WarmupStatus {
    pub phase: WarmupPhase,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub total_items: usize,
    pub completed_items: usize,
    pub failed_items: usize,
    /// Human-readable summary of what is loading right now
    pub current_operation: String,
    pub last_error: Option<String>,
    pub failed_categories: Vec<WarmupCategory>,
    /// Categories still loading in the current run
    #[serde(default)]
    pub active_categories: Vec<WarmupCategory>,
    pub duration_ms: Option<i64>,
}

impl WarmupStatus {
    fn not_started() -> Self {
        Self {
            phase: WarmupPhase::NotStarted,
            start_time: None,
            end_time: None,
            total_items: WarmupCategory::ALL.len(),
            completed_items: 0,
            failed_items: 0,
            current_operation: "idle".to_string(),
            last_error: None,
            failed_categories: Vec::new(),
            active_categories: Vec::new(),
            duration_ms: None,
        }
    }

    fn started() -> Self {
        Self {
            phase: WarmupPhase::Running,
            start_time: Some(Utc::now()),
            current_operation: "starting".to_string(),
            ..Self::not_started()
        }
    }

    fn describe_active(&mut self) {
        self.current_operation = if self.active_categories.is_empty() {
            "finishing".to_string()
        } else {
            let names: Vec<&str> = self.active_categories.iter().map(|c| c.name()).collect();
            format!("warming {}", names.join(", "))
        };
    }

    pub fn progress_percentage(&self) -> f64 {
        if self.total_items == 0 {
            return 0.0;
        }
        self.completed_items as f64 / self.total_items as f64 * 100.0
    }

    pub fn is_running(&self) -> bool {
        self.phase == WarmupPhase::Running
    }
}

impl Default for WarmupStatus {
    fn default() -> Self {
        Self::not_started()
    }
}

/// Shared, thread-safe handle to the live status
pub type WarmupStatusHandle = Arc<RwLock<WarmupStatus>>;

/// Clears the in-progress flag when a run ends, including on early return
struct RunGuard<'a>(&'a AtomicBool);

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

pub struct WarmupOrchestrator {
    cache: Arc<MultiLayerCache>,
    products: Option<Arc<dyn ProductService>>,
    inventory: Option<Arc<dyn InventoryRepository>>,
    statistics: Option<Arc<dyn StatisticsService>>,
    settings: Option<Arc<dyn SettingsProvider>>,
    users: Option<Arc<dyn UserDirectory>>,
    category_timeout: Duration,
    status: WarmupStatusHandle,
    running: AtomicBool,
}

impl WarmupOrchestrator {
    pub fn builder(cache: Arc<MultiLayerCache>) -> WarmupOrchestratorBuilder {
        WarmupOrchestratorBuilder::new(cache)
    }

    /// Live status handle, for components that expose progress
    pub fn status_handle(&self) -> WarmupStatusHandle {
        self.status.clone()
    }

    /// Snapshot of the current status
    pub async fn get_warmup_status(&self) -> WarmupStatus {
        self.status.read().await.clone()
    }

    fn has_sources(&self) -> bool {
        self.products.is_some()
            || self.inventory.is_some()
            || self.statistics.is_some()
            || self.settings.is_some()
            || self.users.is_some()
    }

    /// Warm every category concurrently
    ///
    /// Fails only when the run cannot be set up at all: no collaborator is
    /// registered, or another run is in progress. Category failures are
    /// reported through the returned status.
    pub async fn warmup_all(&self) -> Result<WarmupStatus> {
        if !self.has_sources() {
            error!("Warmup aborted: no data sources registered");
            return Err(CacheError::Warmup("no warmup data sources registered".to_string()));
        }
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            warn!("Warmup requested while a run is in progress");
            return Err(CacheError::WarmupInProgress);
        }
        let _guard = RunGuard(&self.running);

        *self.status.write().await = WarmupStatus::started();
        info!("Starting cache warmup for {} categories", WarmupCategory::ALL.len());

        join_all(WarmupCategory::ALL.iter().map(|category| async move {
            self.mark_active(*category).await;
            let outcome = self.run_category(*category).await;
            self.record_outcome(*category, outcome).await;
        }))
        .await;

        let mut status = self.status.write().await;
        let end = Utc::now();
        status.end_time = Some(end);
        status.duration_ms = status.start_time.map(|start| (end - start).num_milliseconds());
        status.current_operation = "done".to_string();
        status.phase = if status.failed_items > 0 {
            WarmupPhase::CompletedWithFailures
        } else {
            WarmupPhase::Completed
        };

        info!(
            "Cache warmup finished: {}/{} categories, {} failed, {}ms",
            status.completed_items,
            status.total_items,
            status.failed_items,
            status.duration_ms.unwrap_or(0)
        );
        Ok(status.clone())
    }

    /// Warm a single category by name, returning the number of entries written
    pub async fn warmup_category(&self, name: &str) -> Result<usize> {
        let category: WarmupCategory = name.parse()?;
        self.run_category(category).await
    }

    /// Drop everything a category wrote, then load it again
    pub async fn rewarmup(&self, name: &str) -> Result<usize> {
        let category: WarmupCategory = name.parse()?;
        let dropped = self.cache.remove_by_tag(category.tag()).await;
        info!("Rewarming {}: dropped {} entries", category, dropped);
        self.run_category(category).await
    }

    /// Run `warmup_all` in the background after `delay`
    pub fn spawn_startup_warmup(self: &Arc<Self>, delay: Duration) -> JoinHandle<()> {
        let orchestrator = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Err(e) = orchestrator.warmup_all().await {
                error!("Startup warmup failed: {}", e);
            }
        })
    }

    async fn run_category(&self, category: WarmupCategory) -> Result<usize> {
        debug!("Warming category {}", category);
        match tokio::time::timeout(self.category_timeout, self.load_category(category)).await {
            Ok(result) => result,
            Err(_) => Err(CacheError::Timeout {
                seconds: self.category_timeout.as_secs(),
                context: format!("warmup of {}", category),
            }),
        }
    }

    async fn mark_active(&self, category: WarmupCategory) {
        let mut status = self.status.write().await;
        status.active_categories.push(category);
        status.describe_active();
    }

    async fn record_outcome(&self, category: WarmupCategory, outcome: Result<usize>) {
        let mut status = self.status.write().await;
        status.active_categories.retain(|active| *active != category);
        status.describe_active();
        match outcome {
            Ok(written) => {
                status.completed_items += 1;
                debug!("Warmed {} ({} entries)", category, written);
            }
            Err(e) => {
                warn!("Warmup of {} failed: {}", category, e);
                status.failed_items += 1;
                status.failed_categories.push(category);
                status.last_error = Some(format!("{}: {}", category, e));
            }
        }
    }

    async fn load_category(&self, category: WarmupCategory) -> Result<usize> {
        match category {
            WarmupCategory::Products => self.load_products().await,
            WarmupCategory::Inventory => self.load_inventory().await,
            WarmupCategory::Statistics => self.load_statistics().await,
            WarmupCategory::Configuration => self.load_configuration().await,
            WarmupCategory::UserData => self.load_users().await,
        }
    }

    async fn load_products(&self) -> Result<usize> {
        let category = WarmupCategory::Products;
        let source = require(&self.products, "product service")?;

        let products = source.all_products().await?;
        let categories = source.categories().await?;
        let active: Vec<&Product> = products.iter().filter(|p| p.active).collect();

        self.put(category, "all_products", &products).await?;
        self.put(category, "active_products", &active).await?;
        self.put(category, "product_categories", &categories).await?;
        for product in &products {
            self.put(category, &format!("product_{}", product.id), product).await?;
        }
        Ok(3 + products.len())
    }

    async fn load_inventory(&self) -> Result<usize> {
        let category = WarmupCategory::Inventory;
        let source = require(&self.inventory, "inventory repository")?;

        let levels = source.find(&|_: &InventoryLevel| true).await?;
        let low_stock = source.find(&|level: &InventoryLevel| level.is_low_stock()).await?;

        self.put(category, "all_inventory", &levels).await?;
        self.put(category, "low_stock_products", &low_stock).await?;
        for level in &levels {
            self.put(category, &format!("inventory_product_{}", level.product_id), level)
                .await?;
        }
        Ok(2 + levels.len())
    }

    async fn load_statistics(&self) -> Result<usize> {
        let source = require(&self.statistics, "statistics service")?;
        let stats = source.dashboard_statistics().await?;
        self.put(WarmupCategory::Statistics, "dashboard_statistics", &stats).await?;
        Ok(1)
    }

    async fn load_configuration(&self) -> Result<usize> {
        let category = WarmupCategory::Configuration;
        let source = require(&self.settings, "settings provider")?;

        let settings = source.settings().await?;
        self.put(category, "app_settings", &settings).await?;
        for (name, value) in &settings {
            self.put(category, &format!("setting_{}", name), value).await?;
        }
        Ok(1 + settings.len())
    }

    async fn load_users(&self) -> Result<usize> {
        let category = WarmupCategory::UserData;
        let source = require(&self.users, "user directory")?;

        let users = source.active_users().await?;
        self.put(category, "active_users", &users).await?;
        for user in &users {
            self.put(category, &format!("user_{}", user.id), user).await?;
        }
        Ok(1 + users.len())
    }

    async fn put<T: Serialize + ?Sized>(&self, category: WarmupCategory, key: &str, value: &T) -> Result<()> {
        if !self
            .cache
            .set(key, value, Some(category.expiration()), CacheLayer::Shared)
            .await
        {
            return Err(CacheError::Warmup(format!("could not cache {}", key)));
        }
        self.cache.set_tag(key, category.tag());
        Ok(())
    }
}

fn require<'a, T: ?Sized>(source: &'a Option<Arc<T>>, name: &str) -> Result<&'a Arc<T>> {
    source
        .as_ref()
        .ok_or_else(|| CacheError::collaborator(name, "not registered"))
}

/// Builder for [`WarmupOrchestrator`]
pub struct WarmupOrchestratorBuilder {
    cache: Arc<MultiLayerCache>,
    products: Option<Arc<dyn ProductService>>,
    inventory: Option<Arc<dyn InventoryRepository>>,
    statistics: Option<Arc<dyn StatisticsService>>,
    settings: Option<Arc<dyn SettingsProvider>>,
    users: Option<Arc<dyn UserDirectory>>,
    category_timeout: Duration,
}

impl WarmupOrchestratorBuilder {
    fn new(cache: Arc<MultiLayerCache>) -> Self {
        let category_timeout = cache.config().warmup_category_timeout;
        Self {
            cache,
            products: None,
            inventory: None,
            statistics: None,
            settings: None,
            users: None,
            category_timeout,
        }
    }

    pub fn product_service(mut self, source: Arc<dyn ProductService>) -> Self {
        self.products = Some(source);
        self
    }

    pub fn inventory_repository(mut self, source: Arc<dyn InventoryRepository>) -> Self {
        self.inventory = Some(source);
        self
    }

    pub fn statistics_service(mut self, source: Arc<dyn StatisticsService>) -> Self {
        self.statistics = Some(source);
        self
    }

    pub fn settings_provider(mut self, source: Arc<dyn SettingsProvider>) -> Self {
        self.settings = Some(source);
        self
    }

    pub fn user_directory(mut self, source: Arc<dyn UserDirectory>) -> Self {
        self.users = Some(source);
        self
    }

    /// Register one catalog as the source for every category
    pub fn catalog(self, catalog: Arc<StaticCatalog>) -> Self {
        self.product_service(catalog.clone())
            .inventory_repository(catalog.clone())
            .statistics_service(catalog.clone())
            .settings_provider(catalog.clone())
            .user_directory(catalog)
    }

    pub fn category_timeout(mut self, timeout: Duration) -> Self {
        self.category_timeout = timeout;
        self
    }

    pub fn build(self) -> WarmupOrchestrator {
        WarmupOrchestrator {
            cache: self.cache,
            products: self.products,
            inventory: self.inventory,
            statistics: self.statistics,
            settings: self.settings,
            users: self.users,
            category_timeout: self.category_timeout,
            status: Arc::new(RwLock::new(WarmupStatus::not_started())),
            running: AtomicBool::new(false),
        }
    }
}
