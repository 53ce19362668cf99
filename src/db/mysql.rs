use crate::db::constraints::ResolvedForeignKey;
use crate::db::schema::{ColumnSpec, TableSpec, validate_identifier};
use crate::db::storage::{Row, Storage, SyncOutcome};
use crate::error::PortalError;
use async_trait::async_trait;
use serde_json::Value;
use sqlx::mysql::{MySqlArguments, MySqlPoolOptions};
use sqlx::query::Query;
use sqlx::{MySql, Pool};
use std::collections::HashSet;
use tracing::debug;

pub type MySqlPool = Pool<MySql>;

/// [`Storage`] backed by a MySQL/MariaDB pool.
#[derive(Clone)]
pub struct MySqlStorage {
    pool: MySqlPool,
    database: String,
    options_table: String,
}

impl MySqlStorage {
    /// Connect and remember the connection's default database, which scopes
    /// every `information_schema` lookup.
    pub async fn connect(
        database_url: &str,
        max_connections: u32,
        options_table: &str,
    ) -> Result<Self, PortalError> {
        let pool = MySqlPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Self::from_pool(pool, options_table).await
    }

    pub async fn from_pool(pool: MySqlPool, options_table: &str) -> Result<Self, PortalError> {
        validate_identifier(options_table)?;
        let database: Option<String> = sqlx::query_scalar("SELECT DATABASE()")
            .fetch_one(&pool)
            .await?;
        let database = database.ok_or(PortalError::NoDatabaseSelected)?;
        Ok(Self {
            pool,
            database,
            options_table: options_table.to_string(),
        })
    }

    pub fn pool(&self) -> &MySqlPool {
        &self.pool
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    /// Create the options table when running outside a host that already
    /// provides it. Shape matches the host's own options table.
    pub async fn init_options_table(&self) -> Result<(), PortalError> {
        let sql = format!(
            r#"CREATE TABLE IF NOT EXISTS `{}` (
    option_id BIGINT(20) UNSIGNED NOT NULL AUTO_INCREMENT,
    option_name VARCHAR(191) NOT NULL DEFAULT '',
    option_value LONGTEXT NOT NULL,
    autoload VARCHAR(20) NOT NULL DEFAULT 'yes',
    PRIMARY KEY (option_id),
    UNIQUE KEY option_name (option_name)
)"#,
            self.options_table
        );
        sqlx::query(&sql).execute(&self.pool).await?;
        Ok(())
    }

    async fn table_exists(&self, table: &str) -> Result<bool, PortalError> {
        let count: i64 = sqlx::query_scalar(
            r#"SELECT COUNT(*) FROM information_schema.TABLES
               WHERE TABLE_SCHEMA = ? AND TABLE_NAME = ?"#,
        )
        .bind(&self.database)
        .bind(table)
        .fetch_one(&self.pool)
        .await?;
        Ok(count > 0)
    }

    async fn existing_columns(&self, table: &str) -> Result<HashSet<String>, PortalError> {
        let cols: Vec<String> = sqlx::query_scalar(
            r#"SELECT COLUMN_NAME FROM information_schema.COLUMNS
               WHERE TABLE_SCHEMA = ? AND TABLE_NAME = ?"#,
        )
        .bind(&self.database)
        .bind(table)
        .fetch_all(&self.pool)
        .await?;
        Ok(cols.into_iter().map(|c| c.to_ascii_lowercase()).collect())
    }
}

fn bind_value<'q>(
    query: Query<'q, MySql, MySqlArguments>,
    value: &Value,
) -> Query<'q, MySql, MySqlArguments> {
    match value {
        Value::Null => query.bind(None::<String>),
        Value::Bool(b) => query.bind(*b),
        Value::Number(n) => {
            if let Some(u) = n.as_u64() {
                query.bind(u)
            } else if let Some(i) = n.as_i64() {
                query.bind(i)
            } else {
                query.bind(n.as_f64())
            }
        }
        Value::String(s) => query.bind(s.clone()),
        other => query.bind(other.to_string()),
    }
}

fn quoted_columns(row: &Row) -> Result<Vec<String>, PortalError> {
    row.keys()
        .map(|k| validate_identifier(k).map(|_| format!("`{k}`")))
        .collect()
}

fn add_column_sql(table: &str, column: &ColumnSpec) -> String {
    format!("ALTER TABLE `{table}` ADD COLUMN {}", column.definition_sql())
}

fn option_select_sql(options_table: &str) -> String {
    format!("SELECT option_value FROM `{options_table}` WHERE option_name = ? LIMIT 1")
}

fn option_upsert_sql(options_table: &str) -> String {
    format!(
        "INSERT INTO `{options_table}` (option_name, option_value, autoload) VALUES (?, ?, 'yes') \
         ON DUPLICATE KEY UPDATE option_value = VALUES(option_value)"
    )
}

/// Placeholders follow `row.values()` order.
fn insert_sql(table: &str, row: &Row) -> Result<String, PortalError> {
    validate_identifier(table)?;
    let columns = quoted_columns(row)?;
    let placeholders = vec!["?"; columns.len()].join(", ");
    Ok(format!(
        "INSERT INTO `{table}` ({}) VALUES ({placeholders})",
        columns.join(", ")
    ))
}

/// `None` when there is nothing to set. The key placeholder comes last.
fn update_sql(table: &str, key: &str, row: &Row) -> Result<Option<String>, PortalError> {
    validate_identifier(table)?;
    validate_identifier(key)?;
    if row.is_empty() {
        return Ok(None);
    }
    let assignments: Vec<String> = quoted_columns(row)?
        .into_iter()
        .map(|c| format!("{c} = ?"))
        .collect();
    Ok(Some(format!(
        "UPDATE `{table}` SET {} WHERE `{key}` = ?",
        assignments.join(", ")
    )))
}

fn delete_sql(table: &str, key: &str) -> Result<String, PortalError> {
    validate_identifier(table)?;
    validate_identifier(key)?;
    Ok(format!("DELETE FROM `{table}` WHERE `{key}` = ?"))
}

#[async_trait]
impl Storage for MySqlStorage {
    async fn sync_table(&self, spec: &TableSpec) -> Result<SyncOutcome, PortalError> {
        validate_identifier(&spec.name)?;
        if !self.table_exists(&spec.name).await? {
            sqlx::query(&spec.create_sql()).execute(&self.pool).await?;
            return Ok(SyncOutcome::Created);
        }

        let existing = self.existing_columns(&spec.name).await?;
        let mut added = Vec::new();
        for column in spec.columns {
            if existing.contains(&column.name.to_ascii_lowercase()) {
                continue;
            }
            let sql = add_column_sql(&spec.name, column);
            debug!(table = %spec.name, column = column.name, "adding missing column");
            sqlx::query(&sql).execute(&self.pool).await?;
            added.push(column.name.to_string());
        }

        if added.is_empty() {
            Ok(SyncOutcome::Unchanged)
        } else {
            Ok(SyncOutcome::AddedColumns(added))
        }
    }

    async fn constraint_exists(&self, table: &str, name: &str) -> Result<bool, PortalError> {
        let count: i64 = sqlx::query_scalar(
            r#"SELECT COUNT(*) FROM information_schema.TABLE_CONSTRAINTS
               WHERE CONSTRAINT_SCHEMA = ?
               AND TABLE_NAME = ?
               AND CONSTRAINT_NAME = ?
               AND CONSTRAINT_TYPE = 'FOREIGN KEY'"#,
        )
        .bind(&self.database)
        .bind(table)
        .bind(name)
        .fetch_one(&self.pool)
        .await?;
        Ok(count > 0)
    }

    async fn add_foreign_key(&self, fk: &ResolvedForeignKey) -> Result<(), PortalError> {
        for ident in [&fk.name, &fk.table, &fk.column, &fk.ref_table, &fk.ref_column] {
            validate_identifier(ident)?;
        }
        sqlx::query(&fk.alter_sql()).execute(&self.pool).await?;
        Ok(())
    }

    async fn get_option(&self, key: &str) -> Result<Option<String>, PortalError> {
        let sql = option_select_sql(&self.options_table);
        let value: Option<String> = sqlx::query_scalar(&sql)
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(value)
    }

    async fn set_option(&self, key: &str, value: &str) -> Result<(), PortalError> {
        let sql = option_upsert_sql(&self.options_table);
        sqlx::query(&sql)
            .bind(key)
            .bind(value)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn insert_row(&self, table: &str, row: &Row) -> Result<u64, PortalError> {
        let sql = insert_sql(table, row)?;
        let query = row
            .values()
            .fold(sqlx::query(&sql), |q, v| bind_value(q, v));
        let result = query.execute(&self.pool).await?;
        Ok(result.last_insert_id())
    }

    async fn update_row(
        &self,
        table: &str,
        key: &str,
        id: u64,
        row: &Row,
    ) -> Result<u64, PortalError> {
        let Some(sql) = update_sql(table, key, row)? else {
            return Ok(0);
        };
        let query = row
            .values()
            .fold(sqlx::query(&sql), |q, v| bind_value(q, v))
            .bind(id);
        let result = query.execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    async fn delete_row(&self, table: &str, key: &str, id: u64) -> Result<u64, PortalError> {
        let sql = delete_sql(table, key)?;
        let result = sqlx::query(&sql).bind(id).execute(&self.pool).await?;
        Ok(result.rows_affected())
    }
}
