//! Editing contexts
//!
//! - Identity map of live object proxies, faulted in on demand
//! - Damage tracking per property
//! - Commit as one store transaction per persistent root
//! - Discard, reload, revert, branch switching
//! - Copy and cross-context import
//!
//! ```ignore
//! let mut ctx = EditingContext::new(store, model);
//! let doc = ctx.insert_object("Document")?;
//! ctx.set_value(doc, "title", Value::string("draft"))?;
//! ctx.commit_with_type("edit", "first draft", None)?;
//! ```

mod commit;
mod copy;
mod current;
mod editing_context;
mod errors;
mod object;
mod rollback;

pub use current::{current_context, install_current_context, CurrentContextGuard, SharedContext};
pub use editing_context::EditingContext;
pub use errors::{ContextError, ContextResult};
pub use object::{CoObject, ObjectMut, ObjectState};
