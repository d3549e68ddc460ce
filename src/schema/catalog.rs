//! Inventory domain models and a JSON-backed catalog
//!
//! [`StaticCatalog`] serves every warmup data source from a single document,
//! which is how the binary and the tests feed the warmup orchestrator without
//! a database.

use crate::cache::warmup::{
    InventoryRepository, ProductService, SettingsProvider, StatisticsService, UserDirectory,
};
use crate::error::{CacheError, Result};
use crate::schema::entity::{InventoryEntity, TrackedEntity};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: i64,
    pub sku: String,
    pub name: String,
    pub category: String,
    pub price: f64,
    #[serde(default = "default_true")]
    pub active: bool,
}

impl TrackedEntity for Product {
    fn as_inventory_entity(&self) -> InventoryEntity {
        InventoryEntity::Product {
            id: self.id,
            sku: self.sku.clone(),
        }
    }
}

/// Stock on hand for one product
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventoryLevel {
    pub product_id: i64,
    pub quantity: i64,
    #[serde(default)]
    pub reorder_level: i64,
    #[serde(default)]
    pub location: Option<String>,
}

impl InventoryLevel {
    pub fn is_low_stock(&self) -> bool {
        self.quantity <= self.reorder_level
    }
}

impl TrackedEntity for InventoryLevel {
    fn as_inventory_entity(&self) -> InventoryEntity {
        InventoryEntity::Inventory {
            product_id: self.product_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sale {
    pub id: i64,
    pub product_id: i64,
    pub quantity: i64,
    pub total: f64,
    pub sold_at: DateTime<Utc>,
}

impl TrackedEntity for Sale {
    fn as_inventory_entity(&self) -> InventoryEntity {
        InventoryEntity::Sale { id: self.id }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Purchase {
    pub id: i64,
    pub product_id: i64,
    pub quantity: i64,
    pub cost: f64,
}

impl TrackedEntity for Purchase {
    fn as_inventory_entity(&self) -> InventoryEntity {
        InventoryEntity::Purchase { id: self.id }
    }
}

/// Aggregates shown on the dashboard
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardStatistics {
    pub total_products: usize,
    pub active_products: usize,
    pub total_units: i64,
    pub stock_value: f64,
    pub low_stock_count: usize,
    pub generated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserSummary {
    pub id: i64,
    pub username: String,
    pub role: String,
    #[serde(default = "default_true")]
    pub active: bool,
}

fn default_true() -> bool {
    true
}

/// In-memory catalog loaded from a JSON document
///
/// ```json
/// {
///   "products": [{"id": 1, "sku": "A-1", "name": "Bolt", "category": "Hardware", "price": 0.25}],
///   "inventory": [{"product_id": 1, "quantity": 400, "reorder_level": 100}],
///   "settings": {"currency": "EUR"},
///   "users": [{"id": 1, "username": "admin", "role": "Admin"}]
/// }
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StaticCatalog {
    #[serde(default)]
    pub products: Vec<Product>,
    #[serde(default)]
    pub inventory: Vec<InventoryLevel>,
    #[serde(default)]
    pub settings: HashMap<String, serde_json::Value>,
    #[serde(default)]
    pub users: Vec<UserSummary>,
}

impl StaticCatalog {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load a catalog document from disk
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            CacheError::Config(format!("cannot read catalog {}: {}", path.display(), e))
        })?;
        Self::from_json(&json)
    }

    fn compute_statistics(&self) -> DashboardStatistics {
        let prices: HashMap<i64, f64> = self.products.iter().map(|p| (p.id, p.price)).collect();

        DashboardStatistics {
            total_products: self.products.len(),
            active_products: self.products.iter().filter(|p| p.active).count(),
            total_units: self.inventory.iter().map(|l| l.quantity).sum(),
            stock_value: self
                .inventory
                .iter()
                .map(|l| l.quantity as f64 * prices.get(&l.product_id).copied().unwrap_or(0.0))
                .sum(),
            low_stock_count: self.inventory.iter().filter(|l| l.is_low_stock()).count(),
            generated_at: Utc::now(),
        }
    }
}

#[async_trait]
impl ProductService for StaticCatalog {
    async fn all_products(&self) -> Result<Vec<Product>> {
        Ok(self.products.clone())
    }

    async fn categories(&self) -> Result<Vec<String>> {
        let categories: BTreeSet<String> =
            self.products.iter().map(|p| p.category.clone()).collect();
        Ok(categories.into_iter().collect())
    }
}

#[async_trait]
impl InventoryRepository for StaticCatalog {
    async fn find(
        &self,
        predicate: &(dyn for<'a> Fn(&'a InventoryLevel) -> bool + Send + Sync),
    ) -> Result<Vec<InventoryLevel>> {
        Ok(self.inventory.iter().filter(|l| predicate(l)).cloned().collect())
    }
}

#[async_trait]
impl StatisticsService for StaticCatalog {
    async fn dashboard_statistics(&self) -> Result<DashboardStatistics> {
        Ok(self.compute_statistics())
    }
}

#[async_trait]
impl SettingsProvider for StaticCatalog {
    async fn settings(&self) -> Result<HashMap<String, serde_json::Value>> {
        Ok(self.settings.clone())
    }
}

#[async_trait]
impl UserDirectory for StaticCatalog {
    async fn active_users(&self) -> Result<Vec<UserSummary>> {
        Ok(self.users.iter().filter(|u| u.active).cloned().collect())
    }
}
