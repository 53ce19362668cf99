//! Foreign key constraints applied after table sync, since the sync step
//! cannot express constraint clauses.

use super::schema::{PortalTable, TableNames};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnDelete {
    Cascade,
    SetNull,
}

impl fmt::Display for OnDelete {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OnDelete::Cascade => f.write_str("CASCADE"),
            OnDelete::SetNull => f.write_str("SET NULL"),
        }
    }
}

/// Referenced side of a constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Parent {
    Portal(PortalTable),
    /// Host users table, keyed by `ID`.
    Users,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ForeignKeySpec {
    pub name: &'static str,
    pub table: PortalTable,
    pub column: &'static str,
    pub parent: Parent,
    pub on_delete: OnDelete,
}

/// Fixed application order: links to clients before links to projects, each
/// table's entity link before its user link. Each constraint is attempted
/// independently of the others' outcome.
pub const FOREIGN_KEYS: [ForeignKeySpec; 5] = [
    ForeignKeySpec {
        name: "fk_projects_clients",
        table: PortalTable::Projects,
        column: "client_id",
        parent: Parent::Portal(PortalTable::Clients),
        on_delete: OnDelete::Cascade,
    },
    ForeignKeySpec {
        name: "fk_projects_wp_users",
        table: PortalTable::Projects,
        column: "assigned_staff_user_id",
        parent: Parent::Users,
        on_delete: OnDelete::SetNull,
    },
    ForeignKeySpec {
        name: "fk_projects_credentials",
        table: PortalTable::Credentials,
        column: "project_id",
        parent: Parent::Portal(PortalTable::Projects),
        on_delete: OnDelete::Cascade,
    },
    ForeignKeySpec {
        name: "fk_projects_project",
        table: PortalTable::Updates,
        column: "project_id",
        parent: Parent::Portal(PortalTable::Projects),
        on_delete: OnDelete::Cascade,
    },
    ForeignKeySpec {
        name: "fk_projects_user",
        table: PortalTable::Updates,
        column: "user_id",
        parent: Parent::Users,
        on_delete: OnDelete::SetNull,
    },
];

/// A constraint with physical table names filled in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedForeignKey {
    pub name: String,
    pub table: String,
    pub column: String,
    pub ref_table: String,
    pub ref_column: String,
    pub on_delete: OnDelete,
}

impl ForeignKeySpec {
    pub fn resolve(&self, names: &TableNames) -> ResolvedForeignKey {
        let (ref_table, ref_column) = match self.parent {
            Parent::Portal(t) => (names.table(t), "id"),
            Parent::Users => (names.users().to_string(), "ID"),
        };
        ResolvedForeignKey {
            name: self.name.to_string(),
            table: names.table(self.table),
            column: self.column.to_string(),
            ref_table,
            ref_column: ref_column.to_string(),
            on_delete: self.on_delete,
        }
    }
}

impl ResolvedForeignKey {
    pub fn alter_sql(&self) -> String {
        format!(
            "ALTER TABLE `{}` ADD CONSTRAINT `{}` FOREIGN KEY (`{}`) REFERENCES `{}`(`{}`) ON DELETE {}",
            self.table, self.name, self.column, self.ref_table, self.ref_column, self.on_delete
        )
    }
}
