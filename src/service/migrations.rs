use crate::db::constraints::FOREIGN_KEYS;
use crate::db::schema::TableNames;
use crate::db::storage::{Storage, SyncOutcome};
use crate::error::PortalError;
use tracing::{debug, error, info};

/// Per-table result of [`MigrationRunner::ensure_schema`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaReport {
    pub tables: Vec<(String, SyncOutcome)>,
}

impl SchemaReport {
    pub fn is_unchanged(&self) -> bool {
        self.tables
            .iter()
            .all(|(_, outcome)| *outcome == SyncOutcome::Unchanged)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConstraintFailure {
    pub name: String,
    pub message: String,
}

/// Result of one [`MigrationRunner::apply_foreign_keys`] pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ForeignKeyReport {
    pub added: Vec<String>,
    pub present: Vec<String>,
    pub failed: Vec<ConstraintFailure>,
}

/// Brings the portal tables and their foreign keys up to the current shape.
/// Both passes are safe to re-run.
pub struct MigrationRunner<'s, S: ?Sized> {
    storage: &'s S,
    names: TableNames,
}

impl<'s, S: Storage + ?Sized> MigrationRunner<'s, S> {
    pub fn new(storage: &'s S, names: TableNames) -> Self {
        Self { storage, names }
    }

    /// Sync every table definition, parents first. Existing data is never
    /// dropped; missing columns are added.
    pub async fn ensure_schema(&self) -> Result<SchemaReport, PortalError> {
        let mut tables = Vec::new();
        for spec in self.names.specs() {
            let outcome = self.storage.sync_table(&spec).await?;
            match &outcome {
                SyncOutcome::Created => info!(table = %spec.name, "created table"),
                SyncOutcome::AddedColumns(cols) => {
                    info!(table = %spec.name, columns = ?cols, "added missing columns")
                }
                SyncOutcome::Unchanged => debug!(table = %spec.name, "table already up to date"),
            }
            tables.push((spec.name, outcome));
        }
        Ok(SchemaReport { tables })
    }

    /// Add each foreign key that is not already present. A failure is logged
    /// and recorded, and the remaining constraints are still attempted.
    pub async fn apply_foreign_keys(&self) -> ForeignKeyReport {
        let mut report = ForeignKeyReport::default();
        for spec in FOREIGN_KEYS {
            let fk = spec.resolve(&self.names);
            let exists = self.constraint_exists(&fk.table, &fk.name).await;
            match exists {
                Ok(true) => {
                    debug!(constraint = %fk.name, table = %fk.table, "foreign key already present");
                    report.present.push(fk.name);
                    continue;
                }
                Ok(false) => {}
                Err(e) => {
                    error!(constraint = %fk.name, error = %e, "failed to look up foreign key");
                    report.failed.push(ConstraintFailure {
                        name: fk.name,
                        message: e.to_string(),
                    });
                    continue;
                }
            }

            let added = self.storage.add_foreign_key(&fk).await;
            match added {
                Ok(()) => {
                    info!(
                        constraint = %fk.name,
                        table = %fk.table,
                        references = %fk.ref_table,
                        on_delete = %fk.on_delete,
                        "added foreign key"
                    );
                    report.added.push(fk.name);
                }
                Err(e) => {
                    error!(constraint = %fk.name, error = %e, "error adding foreign key");
                    report.failed.push(ConstraintFailure {
                        name: fk.name,
                        message: e.to_string(),
                    });
                }
            }
        }
        report
    }

    pub async fn constraint_exists(&self, table: &str, name: &str) -> Result<bool, PortalError> {
        self.storage.constraint_exists(table, name).await
    }
}
