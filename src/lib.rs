pub mod config;
pub mod db;
pub mod error;
pub mod service;
pub mod types;

pub use db::{MemoryStorage, MySqlStorage, Storage, TableNames};
pub use error::PortalError;
pub use service::{MigrationRunner, Portal, VersionGate};
pub use types::SchemaVersion;
