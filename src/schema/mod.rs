//! Inventory domain types consumed and produced around the cache

pub mod catalog;
pub mod entity;

pub use catalog::{
    DashboardStatistics, InventoryLevel, Product, Purchase, Sale, StaticCatalog, UserSummary,
};
pub use entity::{ChangeOperation, InventoryEntity, TrackedEntity};
