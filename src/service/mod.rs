//! Migration services: table/constraint sync, the version gate, and the
//! activation lifecycle tying them together.

pub mod migrations;
pub mod portal;
pub mod version_gate;

pub use migrations::{ForeignKeyReport, MigrationRunner, SchemaReport};
pub use portal::{ActivationReport, Portal};
pub use version_gate::{UpgradeReport, UpgradeStep, VersionGate};
