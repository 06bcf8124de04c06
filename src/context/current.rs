//! Process-wide current editing context
//!
//! An explicit, opt-in slot. Installing returns a guard; the slot is
//! cleared when the guard drops.

use std::sync::{Arc, Mutex, MutexGuard};

use super::errors::{ContextError, ContextResult};
use super::EditingContext;

/// Shared handle to a context.
pub type SharedContext = Arc<Mutex<EditingContext>>;

static CURRENT: Mutex<Option<SharedContext>> = Mutex::new(None);

fn slot() -> MutexGuard<'static, Option<SharedContext>> {
    CURRENT.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Keeps a context installed as current. Uninstalls on drop.
#[derive(Debug)]
#[must_use = "the context is uninstalled as soon as the guard is dropped"]
pub struct CurrentContextGuard {
    context: SharedContext,
}

impl CurrentContextGuard {
    pub fn context(&self) -> &SharedContext {
        &self.context
    }
}

impl Drop for CurrentContextGuard {
    fn drop(&mut self) {
        let mut slot = slot();
        if slot
            .as_ref()
            .is_some_and(|current| Arc::ptr_eq(current, &self.context))
        {
            *slot = None;
        }
    }
}

/// Installs `context` as the current context.
///
/// Fails if another context is already installed.
pub fn install_current_context(context: SharedContext) -> ContextResult<CurrentContextGuard> {
    let mut slot = slot();
    if slot.is_some() {
        return Err(ContextError::CurrentContextAlreadySet);
    }
    *slot = Some(Arc::clone(&context));
    Ok(CurrentContextGuard { context })
}

/// The installed context, if any.
pub fn current_context() -> Option<SharedContext> {
    slot().clone()
}
