use crate::db::constraints::ResolvedForeignKey;
use crate::db::schema::TableSpec;
use crate::error::PortalError;
use async_trait::async_trait;
use serde_json::{Map, Value};

/// A row as column name → value.
pub type Row = Map<String, Value>;

/// What a table sync did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    Created,
    AddedColumns(Vec<String>),
    Unchanged,
}

/// Explicit storage context for migrations. Every migration component takes
/// one of these instead of reaching for a global handle.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Create the table if missing, otherwise add missing columns. Never drops
    /// or truncates, and ignores constraints.
    async fn sync_table(&self, spec: &TableSpec) -> Result<SyncOutcome, PortalError>;

    /// Whether a FOREIGN KEY constraint named `name` exists on `table`.
    async fn constraint_exists(&self, table: &str, name: &str) -> Result<bool, PortalError>;

    async fn add_foreign_key(&self, fk: &ResolvedForeignKey) -> Result<(), PortalError>;

    async fn get_option(&self, key: &str) -> Result<Option<String>, PortalError>;

    async fn set_option(&self, key: &str, value: &str) -> Result<(), PortalError>;

    /// Insert one row and return its generated id.
    async fn insert_row(&self, table: &str, row: &Row) -> Result<u64, PortalError>;

    /// Update the row whose `key` column equals `id`. Returns affected rows.
    async fn update_row(
        &self,
        table: &str,
        key: &str,
        id: u64,
        row: &Row,
    ) -> Result<u64, PortalError>;

    /// Delete the row whose `key` column equals `id`. Returns affected rows;
    /// cascades are the engine's business.
    async fn delete_row(&self, table: &str, key: &str, id: u64) -> Result<u64, PortalError>;
}
