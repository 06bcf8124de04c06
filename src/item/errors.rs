//! Item graph consistency errors

use thiserror::Error;
use uuid::Uuid;

use crate::error::ErrorCategory;

/// Structural violations of an [`ItemGraph`](super::ItemGraph).
///
/// All of these are consistency violations: the graph is rejected before
/// any store I/O.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ItemGraphError {
    #[error("graph has items but no root item {root}")]
    MissingRoot { root: Uuid },

    #[error("item {uuid} is not reachable from root {root} through composite references")]
    Unreachable { uuid: Uuid, root: Uuid },

    #[error("composite reference cycle through item {uuid}")]
    CompositeCycle { uuid: Uuid },

    #[error("item {owner} owns {target}, which is not in the graph")]
    DanglingComposite { owner: Uuid, target: Uuid },

    #[error("item {uuid} has more than one composite parent")]
    MultipleParents { uuid: Uuid },

    #[error("delta root {delta_root} does not match graph root {graph_root}")]
    RootMismatch { graph_root: Uuid, delta_root: Uuid },
}

impl ItemGraphError {
    /// Always a consistency violation.
    pub fn category(&self) -> ErrorCategory {
        ErrorCategory::ConsistencyViolation
    }
}

/// Result type for item graph validation
pub type ItemGraphResult<T> = Result<T, ItemGraphError>;
