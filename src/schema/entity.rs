//! Entity dispatch for invalidation
//!
//! Application types are mapped onto the closed [`InventoryEntity`] sum type,
//! which owns the fixed list of cache keys and tags each kind of change makes
//! stale.

use crate::cache::types::CacheKey;
use crate::error::CacheError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Kind of change applied to an entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeOperation {
    Create,
    Update,
    Delete,
}

impl fmt::Display for ChangeOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChangeOperation::Create => write!(f, "create"),
            ChangeOperation::Update => write!(f, "update"),
            ChangeOperation::Delete => write!(f, "delete"),
        }
    }
}

impl FromStr for ChangeOperation {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "create" | "insert" => Ok(ChangeOperation::Create),
            "update" => Ok(ChangeOperation::Update),
            "delete" | "remove" => Ok(ChangeOperation::Delete),
            other => Err(CacheError::Other(format!("unknown change operation: {}", other))),
        }
    }
}

/// Closed set of entity kinds the invalidation engine knows about
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum InventoryEntity {
    Product { id: i64, sku: String },
    Inventory { product_id: i64 },
    Sale { id: i64 },
    Purchase { id: i64 },
    Other { type_name: String },
}

impl InventoryEntity {
    pub fn type_name(&self) -> &str {
        match self {
            InventoryEntity::Product { .. } => "Product",
            InventoryEntity::Inventory { .. } => "Inventory",
            InventoryEntity::Sale { .. } => "Sale",
            InventoryEntity::Purchase { .. } => "Purchase",
            InventoryEntity::Other { type_name } => type_name,
        }
    }

    /// Keys made stale by a change to this entity
    pub fn cache_keys(&self) -> Vec<CacheKey> {
        match self {
            InventoryEntity::Product { id, sku } => vec![
                "all_products".to_string(),
                "active_products".to_string(),
                "product_categories".to_string(),
                format!("product_{}", id),
                format!("product_sku_{}", sku),
            ],
            InventoryEntity::Inventory { product_id } => vec![
                "all_inventory".to_string(),
                "low_stock_products".to_string(),
                format!("inventory_product_{}", product_id),
                format!("product_{}", product_id),
            ],
            InventoryEntity::Sale { id } => vec![
                "all_sales".to_string(),
                "recent_sales".to_string(),
                "sales_statistics".to_string(),
                "dashboard_statistics".to_string(),
                format!("sale_{}", id),
            ],
            InventoryEntity::Purchase { id } => vec![
                "all_purchases".to_string(),
                "purchase_statistics".to_string(),
                format!("purchase_{}", id),
            ],
            InventoryEntity::Other { .. } => Vec::new(),
        }
    }

    /// Tags whose whole group is made stale by a change to this entity
    ///
    /// Unknown types fall back to their lower-cased type name.
    pub fn tags(&self) -> Vec<String> {
        match self {
            InventoryEntity::Product { .. } => vec!["products".to_string()],
            InventoryEntity::Inventory { .. } => vec!["inventory".to_string()],
            // Sales and purchases move stock
            InventoryEntity::Sale { .. } => vec!["sales".to_string(), "inventory".to_string()],
            InventoryEntity::Purchase { .. } => {
                vec!["purchases".to_string(), "inventory".to_string()]
            }
            InventoryEntity::Other { type_name } => vec![type_name.to_lowercase()],
        }
    }
}

/// Maps an application type onto [`InventoryEntity`]
pub trait TrackedEntity {
    fn as_inventory_entity(&self) -> InventoryEntity;
}

impl TrackedEntity for InventoryEntity {
    fn as_inventory_entity(&self) -> InventoryEntity {
        self.clone()
    }
}
