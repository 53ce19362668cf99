use crate::db::schema::TableNames;
use crate::db::storage::Storage;
use crate::error::PortalError;
use crate::service::migrations::{ForeignKeyReport, MigrationRunner, SchemaReport};
use crate::service::version_gate::{UpgradeReport, UpgradeStep, VersionGate};
use crate::types::SchemaVersion;
use futures::FutureExt;
use tracing::{info, warn};

/// Option holding the installed schema version.
pub const DB_VERSION_OPTION: &str = "wp_portal_db_version";

/// Version assumed when the option has never been written.
pub const BASELINE_VERSION: &str = "1.0.0";

/// Upgrade steps shipped with this release, ascending.
pub fn portal_steps<S>(names: &TableNames) -> Result<Vec<UpgradeStep<S>>, PortalError>
where
    S: Storage + ?Sized + 'static,
{
    let fk_names = names.clone();
    Ok(vec![
        UpgradeStep::noop("1.0.0")?,
        UpgradeStep::new("1.0.1", move |storage: &S| {
            let names = fk_names.clone();
            async move {
                let report = MigrationRunner::new(storage, names)
                    .apply_foreign_keys()
                    .await;
                info!(
                    added = report.added.len(),
                    present = report.present.len(),
                    failed = report.failed.len(),
                    "foreign key pass finished"
                );
                Ok(())
            }
            .boxed()
        })?,
        UpgradeStep::noop("1.0.2")?,
    ])
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivationReport {
    pub schema: SchemaReport,
    pub foreign_keys: ForeignKeyReport,
    pub upgrade: UpgradeReport,
}

/// Plugin lifecycle over an explicit storage context.
pub struct Portal<S> {
    storage: S,
    names: TableNames,
}

impl<S: Storage + 'static> Portal<S> {
    pub fn new(storage: S, names: TableNames) -> Self {
        Self { storage, names }
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn names(&self) -> &TableNames {
        &self.names
    }

    pub fn migrations(&self) -> MigrationRunner<'_, S> {
        MigrationRunner::new(&self.storage, self.names.clone())
    }

    pub fn version_gate(&self) -> Result<VersionGate<'_, S>, PortalError> {
        VersionGate::new(
            &self.storage,
            DB_VERSION_OPTION,
            BASELINE_VERSION,
            portal_steps(&self.names)?,
        )
    }

    /// Runs on plugin activation: sync tables, add any missing foreign keys,
    /// then any pending upgrades. The foreign key pass runs on every
    /// activation so a constraint that failed earlier is retried. Constraint
    /// failures are logged and reported, never returned.
    pub async fn activate(&self) -> Result<ActivationReport, PortalError> {
        let migrations = self.migrations();
        let schema = migrations.ensure_schema().await?;
        let foreign_keys = migrations.apply_foreign_keys().await;
        if !foreign_keys.failed.is_empty() {
            warn!(
                failed = foreign_keys.failed.len(),
                "some foreign keys could not be added; they will be retried on next activation"
            );
        }
        let upgrade = self.version_gate()?.upgrade().await?;
        info!(
            from = %upgrade.from,
            to = %upgrade.to,
            steps = upgrade.applied.len(),
            "activation complete"
        );
        Ok(ActivationReport {
            schema,
            foreign_keys,
            upgrade,
        })
    }

    /// Deactivation keeps every table and the stored version.
    pub async fn deactivate(&self) {
        info!("portal deactivated; schema and data left in place");
    }

    pub async fn installed_version(&self) -> Result<SchemaVersion, PortalError> {
        self.version_gate()?.installed_version().await
    }
}
