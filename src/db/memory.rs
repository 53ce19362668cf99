//! In-process storage engine.
//!
//! Models the parts of a MySQL engine the migrations care about: tables that
//! gain columns but never lose data, foreign keys that are checked when they
//! are added and enforced afterwards (CASCADE / SET NULL on delete), and the
//! options store. Every DDL statement and option write is recorded so callers
//! can assert on what a migration actually did.

use crate::db::constraints::{OnDelete, ResolvedForeignKey};
use crate::db::schema::{ColumnDefault, ColumnSpec, TableSpec};
use crate::db::storage::{Row, Storage, SyncOutcome};
use crate::error::PortalError;
use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Debug, Clone)]
struct MemColumn {
    name: String,
    nullable: bool,
    auto_increment: bool,
    default: Option<ColumnDefault>,
    on_update_timestamp: bool,
}

impl From<&ColumnSpec> for MemColumn {
    fn from(c: &ColumnSpec) -> Self {
        Self {
            name: c.name.to_string(),
            nullable: c.nullable,
            auto_increment: c.auto_increment,
            default: c.default,
            on_update_timestamp: c.on_update_timestamp,
        }
    }
}

impl MemColumn {
    fn initial_value(&self) -> Value {
        match self.default {
            Some(ColumnDefault::Literal(lit)) => Value::String(lit.to_string()),
            Some(ColumnDefault::CurrentTimestamp) => now(),
            None => Value::Null,
        }
    }
}

#[derive(Debug, Clone)]
struct MemTable {
    columns: Vec<MemColumn>,
    primary_key: String,
    rows: BTreeMap<u64, Row>,
    next_id: u64,
}

impl MemTable {
    fn column(&self, name: &str) -> Option<&MemColumn> {
        self.columns.iter().find(|c| c.name.eq_ignore_ascii_case(name))
    }

    fn has_key(&self, id: u64) -> bool {
        self.rows.contains_key(&id)
    }
}

#[derive(Debug, Default)]
struct Engine {
    tables: HashMap<String, MemTable>,
    constraints: Vec<ResolvedForeignKey>,
    options: HashMap<String, String>,
    ddl_log: Vec<String>,
    option_writes: Vec<(String, String)>,
}

fn now() -> Value {
    Value::String(Utc::now().format("%Y-%m-%d %H:%M:%S").to_string())
}

fn as_key(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

impl Engine {
    fn table(&self, name: &str) -> Result<&MemTable, PortalError> {
        self.tables
            .get(name)
            .ok_or_else(|| PortalError::UnknownTable(name.to_string()))
    }

    fn table_mut(&mut self, name: &str) -> Result<&mut MemTable, PortalError> {
        self.tables
            .get_mut(name)
            .ok_or_else(|| PortalError::UnknownTable(name.to_string()))
    }

    fn check_columns(&self, table: &str, row: &Row) -> Result<(), PortalError> {
        let t = self.table(table)?;
        match row.keys().find(|k| t.column(k).is_none()) {
            Some(unknown) => Err(PortalError::UnknownColumn {
                table: table.to_string(),
                column: unknown.clone(),
            }),
            None => Ok(()),
        }
    }

    /// Every constrained, non-null value in `row` must reference an existing
    /// parent row.
    fn check_references(&self, table: &str, row: &Row) -> Result<(), PortalError> {
        for fk in self.constraints.iter().filter(|fk| fk.table == table) {
            let Some(value) = row.get(&fk.column) else {
                continue;
            };
            if value.is_null() {
                continue;
            }
            let parent = self.table(&fk.ref_table)?;
            if !as_key(value).is_some_and(|id| parent.has_key(id)) {
                return Err(PortalError::ForeignKeyViolation {
                    table: table.to_string(),
                    constraint: fk.name.clone(),
                });
            }
        }
        Ok(())
    }

    fn check_not_null(&self, table: &str, row: &Row) -> Result<(), PortalError> {
        let t = self.table(table)?;
        for col in t.columns.iter().filter(|c| !c.nullable && !c.auto_increment) {
            if row.get(&col.name).is_none_or(Value::is_null) {
                return Err(PortalError::MissingValue {
                    table: table.to_string(),
                    column: col.name.clone(),
                });
            }
        }
        Ok(())
    }

    fn matching_keys(&self, table: &str, column: &str, id: u64) -> Result<Vec<u64>, PortalError> {
        let t = self.table(table)?;
        if t.column(column).is_none() {
            return Err(PortalError::UnknownColumn {
                table: table.to_string(),
                column: column.to_string(),
            });
        }
        Ok(t.rows
            .iter()
            .filter(|(_, row)| row.get(column).and_then(as_key) == Some(id))
            .map(|(pk, _)| *pk)
            .collect())
    }

    fn delete_cascading(&mut self, table: &str, pk: u64) -> Result<(), PortalError> {
        let children: Vec<ResolvedForeignKey> = self
            .constraints
            .iter()
            .filter(|fk| fk.ref_table == table)
            .cloned()
            .collect();
        for fk in children {
            let dependents = self.matching_keys(&fk.table, &fk.column, pk)?;
            match fk.on_delete {
                OnDelete::Cascade => {
                    for child in dependents {
                        self.delete_cascading(&fk.table, child)?;
                    }
                }
                OnDelete::SetNull => {
                    let child_table = self.table_mut(&fk.table)?;
                    for child in dependents {
                        if let Some(row) = child_table.rows.get_mut(&child) {
                            row.insert(fk.column.clone(), Value::Null);
                        }
                    }
                }
            }
        }
        self.table_mut(table)?.rows.remove(&pk);
        Ok(())
    }
}

/// [`Storage`] held entirely in memory.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    engine: Mutex<Engine>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a host-style users table keyed by `ID`.
    pub fn with_users_table(self, name: &str) -> Self {
        {
            let mut engine = self.engine();
            let columns = vec![
                MemColumn {
                    name: "ID".to_string(),
                    nullable: false,
                    auto_increment: true,
                    default: None,
                    on_update_timestamp: false,
                },
                MemColumn {
                    name: "user_login".to_string(),
                    nullable: true,
                    auto_increment: false,
                    default: None,
                    on_update_timestamp: false,
                },
            ];
            engine.tables.insert(
                name.to_string(),
                MemTable {
                    columns,
                    primary_key: "ID".to_string(),
                    rows: BTreeMap::new(),
                    next_id: 1,
                },
            );
        }
        self
    }

    fn engine(&self) -> MutexGuard<'_, Engine> {
        self.engine.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn table_exists(&self, table: &str) -> bool {
        self.engine().tables.contains_key(table)
    }

    /// Column names of `table` in definition order.
    pub fn columns(&self, table: &str) -> Vec<String> {
        self.engine()
            .tables
            .get(table)
            .map(|t| t.columns.iter().map(|c| c.name.clone()).collect())
            .unwrap_or_default()
    }

    pub fn rows(&self, table: &str) -> Vec<Row> {
        self.engine()
            .tables
            .get(table)
            .map(|t| t.rows.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn row(&self, table: &str, id: u64) -> Option<Row> {
        self.engine().tables.get(table)?.rows.get(&id).cloned()
    }

    pub fn constraints(&self) -> Vec<ResolvedForeignKey> {
        self.engine().constraints.clone()
    }

    /// Every DDL statement executed so far.
    pub fn ddl_log(&self) -> Vec<String> {
        self.engine().ddl_log.clone()
    }

    /// Number of `ALTER TABLE ... ADD CONSTRAINT` statements executed.
    pub fn constraint_statements(&self) -> usize {
        self.engine()
            .ddl_log
            .iter()
            .filter(|s| s.contains("ADD CONSTRAINT"))
            .count()
    }

    /// Every option write in order, as `(key, value)`.
    pub fn option_writes(&self) -> Vec<(String, String)> {
        self.engine().option_writes.clone()
    }

    /// Drop a column out-of-band, as a manual edit to the live schema would.
    pub fn drop_column(&self, table: &str, column: &str) -> Result<(), PortalError> {
        let mut engine = self.engine();
        let t = engine.table_mut(table)?;
        t.columns.retain(|c| !c.name.eq_ignore_ascii_case(column));
        for row in t.rows.values_mut() {
            row.remove(column);
        }
        engine
            .ddl_log
            .push(format!("ALTER TABLE `{table}` DROP COLUMN `{column}`"));
        Ok(())
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn sync_table(&self, spec: &TableSpec) -> Result<SyncOutcome, PortalError> {
        let mut guard = self.engine();
        let engine = &mut *guard;
        let Some(table) = engine.tables.get_mut(&spec.name) else {
            engine.tables.insert(
                spec.name.clone(),
                MemTable {
                    columns: spec.columns.iter().map(MemColumn::from).collect(),
                    primary_key: spec.primary_key.to_string(),
                    rows: BTreeMap::new(),
                    next_id: 1,
                },
            );
            engine.ddl_log.push(spec.create_sql());
            return Ok(SyncOutcome::Created);
        };

        let mut added = Vec::new();
        let mut statements = Vec::new();
        for column in spec.columns {
            if table.column(column.name).is_some() {
                continue;
            }
            let mem = MemColumn::from(column);
            for row in table.rows.values_mut() {
                row.insert(mem.name.clone(), mem.initial_value());
            }
            table.columns.push(mem);
            statements.push(format!(
                "ALTER TABLE `{}` ADD COLUMN {}",
                spec.name,
                column.definition_sql()
            ));
            added.push(column.name.to_string());
        }
        engine.ddl_log.extend(statements);

        if added.is_empty() {
            Ok(SyncOutcome::Unchanged)
        } else {
            Ok(SyncOutcome::AddedColumns(added))
        }
    }

    async fn constraint_exists(&self, table: &str, name: &str) -> Result<bool, PortalError> {
        Ok(self
            .engine()
            .constraints
            .iter()
            .any(|fk| fk.table == table && fk.name == name))
    }

    async fn add_foreign_key(&self, fk: &ResolvedForeignKey) -> Result<(), PortalError> {
        let mut engine = self.engine();
        // Constraint names are unique per database, not per table.
        if engine.constraints.iter().any(|c| c.name == fk.name) {
            return Err(PortalError::DuplicateConstraint(fk.name.clone()));
        }

        let parent = engine.table(&fk.ref_table)?;
        if parent.column(&fk.ref_column).is_none() {
            return Err(PortalError::UnknownColumn {
                table: fk.ref_table.clone(),
                column: fk.ref_column.clone(),
            });
        }
        let child = engine.table(&fk.table)?;
        if child.column(&fk.column).is_none() {
            return Err(PortalError::UnknownColumn {
                table: fk.table.clone(),
                column: fk.column.clone(),
            });
        }
        let orphaned = child
            .rows
            .values()
            .filter_map(|row| row.get(&fk.column))
            .filter(|v| !v.is_null())
            .any(|v| !as_key(v).is_some_and(|id| parent.has_key(id)));
        if orphaned {
            return Err(PortalError::ForeignKeyViolation {
                table: fk.table.clone(),
                constraint: fk.name.clone(),
            });
        }

        engine.constraints.push(fk.clone());
        engine.ddl_log.push(fk.alter_sql());
        Ok(())
    }

    async fn get_option(&self, key: &str) -> Result<Option<String>, PortalError> {
        Ok(self.engine().options.get(key).cloned())
    }

    async fn set_option(&self, key: &str, value: &str) -> Result<(), PortalError> {
        let mut engine = self.engine();
        engine.options.insert(key.to_string(), value.to_string());
        engine
            .option_writes
            .push((key.to_string(), value.to_string()));
        Ok(())
    }

    async fn insert_row(&self, table: &str, row: &Row) -> Result<u64, PortalError> {
        let mut engine = self.engine();
        engine.check_columns(table, row)?;

        let t = engine.table(table)?;
        let pk_column = t.primary_key.clone();
        let id = match row.get(&pk_column).and_then(as_key) {
            Some(explicit) => explicit,
            None => t.next_id,
        };
        if t.has_key(id) {
            return Err(PortalError::DuplicateKey {
                table: table.to_string(),
                id,
            });
        }

        let mut full = Row::new();
        for col in &t.columns {
            let value = match row.get(&col.name) {
                Some(v) => v.clone(),
                None if col.name == pk_column => Value::from(id),
                None => col.initial_value(),
            };
            full.insert(col.name.clone(), value);
        }
        engine.check_not_null(table, &full)?;
        engine.check_references(table, &full)?;

        let t = engine.table_mut(table)?;
        t.next_id = t.next_id.max(id + 1);
        t.rows.insert(id, full);
        Ok(id)
    }

    async fn update_row(
        &self,
        table: &str,
        key: &str,
        id: u64,
        row: &Row,
    ) -> Result<u64, PortalError> {
        let mut engine = self.engine();
        engine.check_columns(table, row)?;
        let targets = engine.matching_keys(table, key, id)?;

        let mut updated = Vec::with_capacity(targets.len());
        {
            let t = engine.table(table)?;
            for pk in &targets {
                let Some(current) = t.rows.get(pk) else {
                    continue;
                };
                let mut next = current.clone();
                for (k, v) in row {
                    next.insert(k.clone(), v.clone());
                }
                for col in t.columns.iter().filter(|c| c.on_update_timestamp) {
                    if !row.contains_key(&col.name) {
                        next.insert(col.name.clone(), now());
                    }
                }
                updated.push((*pk, next));
            }
        }
        for (_, next) in &updated {
            engine.check_not_null(table, next)?;
            engine.check_references(table, next)?;
        }

        let t = engine.table_mut(table)?;
        let count = updated.len() as u64;
        for (pk, next) in updated {
            t.rows.insert(pk, next);
        }
        Ok(count)
    }

    async fn delete_row(&self, table: &str, key: &str, id: u64) -> Result<u64, PortalError> {
        let mut engine = self.engine();
        let targets = engine.matching_keys(table, key, id)?;
        for pk in &targets {
            engine.delete_cascading(table, *pk)?;
        }
        Ok(targets.len() as u64)
    }
}
