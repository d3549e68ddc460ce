//! Administrative HTTP surface for the cache

pub mod routes;
pub mod server;

pub use routes::{AdminResponse, AppState};
pub use server::{build_router, ApiServer, ApiServerConfig};
