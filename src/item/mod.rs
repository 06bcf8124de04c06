//! Item layer
//!
//! Items are the serialized form of objects. An [`ItemGraph`] is the full
//! state of one persistent root at one revision; an [`ItemGraphDelta`] is
//! what one revision changes.

mod errors;
mod graph;
#[allow(clippy::module_inception)]
mod item;
mod value;

pub use errors::{ItemGraphError, ItemGraphResult};
pub use graph::{ItemGraph, ItemGraphDelta};
pub use item::Item;
pub use value::{Value, ValueSet};
