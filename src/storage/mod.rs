pub mod database;
pub mod store;

pub use database::{Database, PoolConfig, SharedDatabase};
pub use store::{BoundParam, DataStore, ParamValue, Row, SharedStore, SqliteStore, StoreRows};
