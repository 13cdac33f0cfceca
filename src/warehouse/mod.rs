//! Analytics warehouse: schema, row types and the store the loaders write to.

pub mod models;
pub mod schema;
pub mod store;
mod trait_def;

pub use models::*;
pub use schema::{PlayKey, WarehouseSchema};
pub use store::{SqliteWarehouseStore, StoreOptions};
pub use trait_def::WarehouseStore;
