use crate::db::schema::TableNames;
use crate::error::PortalError;
use figment::{
    Figment,
    providers::{Env, Serialized},
};
use serde::{Deserialize, Serialize};

/// Runtime configuration, read from `PORTAL_*` environment variables on top
/// of the defaults below.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub database_url: String,
    pub table_prefix: String,
    /// Host users table; `{table_prefix}users` when unset.
    pub users_table: Option<String>,
    pub charset_collate: String,
    pub loglevel: String,
    pub max_connections: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: "mysql://root@localhost/wordpress".to_string(),
            table_prefix: "wp_".to_string(),
            users_table: None,
            charset_collate: "DEFAULT CHARACTER SET utf8mb4 COLLATE utf8mb4_unicode_520_ci"
                .to_string(),
            loglevel: "info".to_string(),
            max_connections: 5,
        }
    }
}

impl Config {
    pub fn figment() -> Figment {
        Figment::from(Serialized::defaults(Config::default())).merge(Env::prefixed("PORTAL_"))
    }

    pub fn load() -> Result<Self, PortalError> {
        Ok(Self::figment().extract()?)
    }

    pub fn table_names(&self) -> Result<TableNames, PortalError> {
        Ok(
            TableNames::new(&self.table_prefix, self.users_table.as_deref())?
                .with_charset_collate(self.charset_collate.clone()),
        )
    }
}
