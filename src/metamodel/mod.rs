//! Metamodel
//!
//! Read-only description of entities, their properties and the packages
//! that declare them, plus the registry used to instantiate new objects.

mod errors;
mod factory;
mod repository;
mod types;

pub use errors::{MetamodelError, MetamodelResult};
pub use factory::{DefaultObjectFactory, FactoryRegistry, ObjectFactory};
pub use repository::ModelRepository;
pub use types::{EntityDescription, Multiplicity, PropertyDescription, PropertyType};
