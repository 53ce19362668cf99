//! Database module: schema, constraints and the storage backends.
//!
//! Layout:
//! - `schema.rs`: declarative table definitions (MySQL-first)
//! - `constraints.rs`: foreign keys applied after the tables exist
//! - `storage.rs`: the `Storage` trait every migration runs against
//! - `mysql.rs`: sqlx-backed MySQL storage
//! - `memory.rs`: in-process storage engine
//! - `models.rs`: Rust structs mirroring portal rows

pub mod constraints;
pub mod memory;
pub mod models;
pub mod mysql;
pub mod schema;
pub mod storage;

pub use memory::MemoryStorage;
pub use mysql::{MySqlPool, MySqlStorage};
pub use schema::{PortalTable, TableNames};
pub use storage::{Row, Storage, SyncOutcome};
