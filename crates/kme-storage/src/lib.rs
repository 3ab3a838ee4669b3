//! Persistence for key records, the SAE registry, and audit trails.
//!
//! Schema management (migrations, the RDBMS engine itself) is the
//! administrator's concern; this crate assumes the tables described in
//! `models.rs` already exist and speaks to them with runtime-checked
//! `sqlx` queries rather than the `query!` macro, since no `DATABASE_URL`
//! is available wherever this crate is built.

pub mod audit;
pub mod error;
pub mod keys;
pub mod models;
pub mod pool;
pub mod saes;

pub use error::{StorageError, StorageResult};
pub use pool::{create_pool, DatabasePool};
