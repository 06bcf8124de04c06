//! Schema migration
//!
//! Items carry the package version they were written under. On every read
//! they are brought up to the live metamodel by replaying the registered
//! migrations between the two versions.

mod element_move;
mod errors;
mod registry;
mod schema_migration;

pub use element_move::ModelElementMove;
pub use errors::{MigrationError, MigrationResult};
pub use registry::MigrationRegistry;
pub use schema_migration::SchemaMigration;
