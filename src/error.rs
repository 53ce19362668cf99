use sqlx::Error as SqlxError;
use thiserror::Error as ThisError;

#[derive(Debug, ThisError)]
pub enum PortalError {
    #[error("Database error: {0}")]
    Database(#[from] SqlxError),

    #[error("Configuration error: {0}")]
    Config(#[from] figment::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("connection has no default database selected")]
    NoDatabaseSelected,

    #[error("invalid schema version: {0:?}")]
    InvalidVersion(String),

    #[error("upgrade steps must be strictly increasing: {previous} is followed by {next}")]
    UnorderedSteps { previous: String, next: String },

    #[error("invalid SQL identifier: {0:?}")]
    InvalidIdentifier(String),

    #[error("unknown table: {0}")]
    UnknownTable(String),

    #[error("unknown column {column} in table {table}")]
    UnknownColumn { table: String, column: String },

    #[error("missing value for NOT NULL column {column} in table {table}")]
    MissingValue { table: String, column: String },

    #[error("duplicate primary key {id} in table {table}")]
    DuplicateKey { table: String, id: u64 },

    #[error("foreign key constraint {constraint} fails on {table}")]
    ForeignKeyViolation { table: String, constraint: String },

    #[error("duplicate foreign key constraint name {0}")]
    DuplicateConstraint(String),

    #[error("upgrade step {version} failed: {source}")]
    UpgradeStep {
        version: String,
        #[source]
        source: Box<PortalError>,
    },
}
