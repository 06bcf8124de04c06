//! Migration registry and the per-read migration walk
//!
//! For an item stored under `package@v_old` with the metamodel at
//! `package@v_current`, every batch registered for `package` with a
//! destination version in `(v_old, v_current]` is applied in ascending
//! order. An entity move hands the item over to another package; the walk
//! then continues from the move's version in that package.

use std::collections::{BTreeMap, HashSet};

use super::errors::{MigrationError, MigrationResult};
use super::SchemaMigration;
use crate::item::{Item, ItemGraph};
use crate::metamodel::ModelRepository;
use crate::observability::{log_event_with_fields, trace_event_with_fields, Event};

/// Migrations keyed by (package, destination version).
#[derive(Debug, Clone, Default)]
pub struct MigrationRegistry {
    migrations: BTreeMap<(String, i64), SchemaMigration>,
}

impl MigrationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validates and registers a migration. One per (package, version).
    pub fn register(&mut self, migration: SchemaMigration) -> MigrationResult<()> {
        migration.validate()?;
        let key = (migration.package.clone(), migration.destination_version);
        if self.migrations.contains_key(&key) {
            return Err(MigrationError::DuplicateMigration {
                package: key.0,
                version: key.1,
            });
        }
        self.migrations.insert(key, migration);
        Ok(())
    }

    pub fn migration(&self, package: &str, version: i64) -> Option<&SchemaMigration> {
        self.migrations.get(&(package.to_string(), version))
    }

    pub fn len(&self) -> usize {
        self.migrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.migrations.is_empty()
    }

    /// Batches for `package` with destination in `(after, up_to]`, ascending.
    fn pending<'a>(
        &'a self,
        package: &str,
        after: i64,
        up_to: i64,
    ) -> impl Iterator<Item = &'a SchemaMigration> + 'a {
        let lower = (package.to_string(), after.saturating_add(1));
        let upper = (package.to_string(), up_to);
        self.migrations.range(lower..=upper).map(|(_, m)| m)
    }

    /// Brings `item` up to the live metamodel.
    pub fn migrate_item(&self, item: Item, model: &ModelRepository) -> MigrationResult<Item> {
        let origin = (item.package().to_string(), item.package_version());
        let result = self.walk(item, model);
        match &result {
            Ok(migrated) => {
                let target = (migrated.package(), migrated.package_version());
                if target != (origin.0.as_str(), origin.1) {
                    log_event_with_fields(
                        Event::MigrationApplied,
                        &[
                            ("uuid", &migrated.uuid().to_string()),
                            ("entity", migrated.entity()),
                            ("from", &format!("{}@{}", origin.0, origin.1)),
                            ("to", &format!("{}@{}", target.0, target.1)),
                        ],
                    );
                }
            }
            Err(err) => {
                log_event_with_fields(
                    Event::MigrationUnresolvable,
                    &[
                        ("from", &format!("{}@{}", origin.0, origin.1)),
                        ("error", &err.to_string()),
                    ],
                );
            }
        }
        result
    }

    fn walk(&self, mut item: Item, model: &ModelRepository) -> MigrationResult<Item> {
        let mut visited = HashSet::new();
        loop {
            let package = item.package().to_string();
            let stored = item.package_version();
            if !visited.insert((package.clone(), stored)) {
                return Err(MigrationError::Cycle {
                    package,
                    version: stored,
                });
            }
            let current = model
                .package_version(&package)
                .ok_or_else(|| MigrationError::UnknownPackage(package.clone()))?;
            if stored > current {
                return Err(MigrationError::VersionAhead {
                    package,
                    stored,
                    current,
                });
            }
            if stored == current {
                return Ok(item);
            }

            let mut handed_over = false;
            for migration in self.pending(&package, stored, current) {
                migration.apply(&mut item, model)?;
                trace_event_with_fields(
                    Event::MigrationApplied,
                    &[
                        ("uuid", &item.uuid().to_string()),
                        ("batch", &format!("{}@{}", package, migration.destination_version)),
                    ],
                );
                if item.package() != package {
                    handed_over = true;
                    break;
                }
                item.set_package_version(migration.destination_version);
            }
            if !handed_over {
                item.set_package_version(current);
                return Ok(item);
            }
        }
    }

    /// Migrates every item of a graph.
    pub fn migrate_graph(&self, graph: &ItemGraph, model: &ModelRepository) -> MigrationResult<ItemGraph> {
        let mut migrated = ItemGraph::new(graph.root());
        for item in graph.items() {
            migrated.insert_item(self.migrate_item(item.clone(), model)?);
        }
        Ok(migrated)
    }
}
