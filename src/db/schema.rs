//! Declarative table definitions for the portal tables.
//! MySQL-first: columns carry their MySQL type text verbatim, and
//! [`TableSpec::create_sql`] renders the `CREATE TABLE IF NOT EXISTS` form.
//! Constraints are deliberately absent here; see `db::constraints`.

use crate::error::PortalError;

/// Column default value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnDefault {
    /// Quoted string literal, e.g. `''`.
    Literal(&'static str),
    CurrentTimestamp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnSpec {
    pub name: &'static str,
    pub sql_type: &'static str,
    pub nullable: bool,
    pub auto_increment: bool,
    pub default: Option<ColumnDefault>,
    pub on_update_timestamp: bool,
}

impl ColumnSpec {
    const fn new(name: &'static str, sql_type: &'static str) -> Self {
        Self {
            name,
            sql_type,
            nullable: true,
            auto_increment: false,
            default: None,
            on_update_timestamp: false,
        }
    }

    const fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    const fn auto_increment(mut self) -> Self {
        self.auto_increment = true;
        self
    }

    const fn default(mut self, default: ColumnDefault) -> Self {
        self.default = Some(default);
        self
    }

    const fn on_update_timestamp(mut self) -> Self {
        self.on_update_timestamp = true;
        self
    }

    /// Column definition as it appears inside `CREATE TABLE` or
    /// `ALTER TABLE ... ADD COLUMN`.
    pub fn definition_sql(&self) -> String {
        let mut sql = format!("`{}` {}", self.name, self.sql_type);
        if !self.nullable {
            sql.push_str(" NOT NULL");
        }
        if self.auto_increment {
            sql.push_str(" AUTO_INCREMENT");
        }
        match self.default {
            Some(ColumnDefault::Literal(lit)) => {
                sql.push_str(" DEFAULT '");
                sql.push_str(&lit.replace('\'', "''"));
                sql.push('\'');
            }
            Some(ColumnDefault::CurrentTimestamp) => sql.push_str(" DEFAULT CURRENT_TIMESTAMP"),
            None => {}
        }
        if self.on_update_timestamp {
            sql.push_str(" ON UPDATE CURRENT_TIMESTAMP");
        }
        sql
    }
}

/// Which portal entity a table stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PortalTable {
    Clients,
    Projects,
    Credentials,
    Updates,
}

impl PortalTable {
    /// Creation order; parents precede children.
    pub const ALL: [PortalTable; 4] = [
        PortalTable::Clients,
        PortalTable::Projects,
        PortalTable::Credentials,
        PortalTable::Updates,
    ];

    pub fn suffix(self) -> &'static str {
        match self {
            PortalTable::Clients => "portal_clients",
            PortalTable::Projects => "portal_projects",
            PortalTable::Credentials => "portal_credentials",
            PortalTable::Updates => "portal_updates",
        }
    }

    pub fn columns(self) -> &'static [ColumnSpec] {
        match self {
            PortalTable::Clients => CLIENT_COLUMNS,
            PortalTable::Projects => PROJECT_COLUMNS,
            PortalTable::Credentials => CREDENTIAL_COLUMNS,
            PortalTable::Updates => UPDATE_COLUMNS,
        }
    }
}

/// A table definition bound to its resolved (prefixed) name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSpec {
    pub name: String,
    pub columns: &'static [ColumnSpec],
    pub primary_key: &'static str,
    pub charset_collate: String,
}

impl TableSpec {
    pub fn column(&self, name: &str) -> Option<&ColumnSpec> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn create_sql(&self) -> String {
        let mut body: Vec<String> = self.columns.iter().map(|c| c.definition_sql()).collect();
        body.push(format!("PRIMARY KEY (`{}`)", self.primary_key));
        let mut sql = format!(
            "CREATE TABLE IF NOT EXISTS `{}` (\n    {}\n)",
            self.name,
            body.join(",\n    ")
        );
        if !self.charset_collate.is_empty() {
            sql.push(' ');
            sql.push_str(&self.charset_collate);
        }
        sql
    }
}

/// Resolved physical table names. The users table belongs to the host and is
/// resolved at runtime because installations may customise prefixes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableNames {
    prefix: String,
    users: String,
    charset_collate: String,
}

impl TableNames {
    pub fn new(prefix: &str, users_table: Option<&str>) -> Result<Self, PortalError> {
        let users = users_table
            .map(str::to_string)
            .unwrap_or_else(|| format!("{prefix}users"));
        validate_identifier(&format!("{prefix}x"))?;
        validate_identifier(&users)?;
        Ok(Self {
            prefix: prefix.to_string(),
            users,
            charset_collate: String::new(),
        })
    }

    pub fn with_charset_collate(mut self, charset_collate: impl Into<String>) -> Self {
        self.charset_collate = charset_collate.into();
        self
    }

    pub fn table(&self, table: PortalTable) -> String {
        format!("{}{}", self.prefix, table.suffix())
    }

    pub fn users(&self) -> &str {
        &self.users
    }

    pub fn options(&self) -> String {
        format!("{}options", self.prefix)
    }

    pub fn spec(&self, table: PortalTable) -> TableSpec {
        TableSpec {
            name: self.table(table),
            columns: table.columns(),
            primary_key: "id",
            charset_collate: self.charset_collate.clone(),
        }
    }

    /// All portal table specs in creation order.
    pub fn specs(&self) -> Vec<TableSpec> {
        PortalTable::ALL.iter().map(|t| self.spec(*t)).collect()
    }
}

/// Accepts `[A-Za-z0-9_]+`, which is all the portal ever needs to quote.
pub fn validate_identifier(ident: &str) -> Result<(), PortalError> {
    let ok = !ident.is_empty() && ident.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if ok {
        Ok(())
    } else {
        Err(PortalError::InvalidIdentifier(ident.to_string()))
    }
}

const ID: ColumnSpec = ColumnSpec::new("id", "BIGINT(20) UNSIGNED")
    .not_null()
    .auto_increment();
const CREATED_AT: ColumnSpec =
    ColumnSpec::new("created_at", "DATETIME").default(ColumnDefault::CurrentTimestamp);
const UPDATED_AT: ColumnSpec = ColumnSpec::new("updated_at", "DATETIME")
    .default(ColumnDefault::CurrentTimestamp)
    .on_update_timestamp();

const CLIENT_COLUMNS: &[ColumnSpec] = &[
    ID,
    ColumnSpec::new("company_name", "VARCHAR(255)").not_null(),
    ColumnSpec::new("contact_name", "VARCHAR(255)").not_null(),
    ColumnSpec::new("email", "VARCHAR(255)").not_null(),
    ColumnSpec::new("phone", "VARCHAR(50)").default(ColumnDefault::Literal("")),
    CREATED_AT,
    UPDATED_AT,
];

const PROJECT_COLUMNS: &[ColumnSpec] = &[
    ID,
    ColumnSpec::new("client_id", "BIGINT(20) UNSIGNED").not_null(),
    ColumnSpec::new("title", "VARCHAR(255)").not_null(),
    ColumnSpec::new("description", "TEXT"),
    ColumnSpec::new("status", "VARCHAR(50)").not_null(),
    ColumnSpec::new("due_date", "DATE"),
    ColumnSpec::new("assigned_staff_user_id", "BIGINT(20) UNSIGNED"),
    CREATED_AT,
    UPDATED_AT,
];

const CREDENTIAL_COLUMNS: &[ColumnSpec] = &[
    ID,
    ColumnSpec::new("project_id", "BIGINT(20) UNSIGNED"),
    ColumnSpec::new("label", "VARCHAR(255)").not_null(),
    ColumnSpec::new("username", "VARCHAR(255)").not_null(),
    ColumnSpec::new("password_enc", "TEXT"),
    ColumnSpec::new("encryption_iv", "VARCHAR(255)").not_null(),
    ColumnSpec::new("notes", "TEXT"),
    CREATED_AT,
    UPDATED_AT,
];

const UPDATE_COLUMNS: &[ColumnSpec] = &[
    ID,
    ColumnSpec::new("project_id", "BIGINT(20) UNSIGNED"),
    ColumnSpec::new("user_id", "BIGINT(20) UNSIGNED"),
    ColumnSpec::new("message", "TEXT"),
    ColumnSpec::new("type", "VARCHAR(50)"),
    CREATED_AT,
];
