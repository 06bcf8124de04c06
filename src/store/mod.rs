//! Versioned store
//!
//! The store owns the revision graph of every persistent root. It is
//! mutated only through [`StoreAction`]s grouped into all-or-nothing
//! [`StoreTransaction`]s, and persists through a [`Backend`](crate::backend::Backend).

mod action;
mod cache;
mod errors;
mod state;
#[allow(clippy::module_inception)]
mod store;
mod transaction;

pub use action::StoreAction;
pub use errors::{StoreError, StoreResult};
pub use store::Store;
pub use transaction::{StoreTransaction, TransactionReceipt};
