//! Lifecycle hook registrants and their registry.
//!
//! Collaborators that own encrypted collections register here so the
//! controller can drive them through credential changes and full deletion.
//! The registry keys entries by [`HookHandle`] and holds registrants
//! weakly: a dropped registrant is skipped during iteration rather than
//! crashed on, though orderly teardown is still expected to unregister.

use std::sync::{Arc, Weak};
use tracing::debug;
use uuid::Uuid;

/// Re-encrypts a registrant's documents under the current session
/// credential. Invoked after a credential change persists, and again (with
/// the old credential restored) to revert a failed change.
pub trait ChangeCredentialHook: Send + Sync {
    fn on_change_credential(&self) -> anyhow::Result<()>;
}

/// Deletes everything a registrant owns.
pub trait DeleteEverythingHook: Send + Sync {
    fn on_delete_everything(&self) -> anyhow::Result<()>;
}

/// Stable handle identifying one registration.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct HookHandle(Uuid);

impl HookHandle {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

/// Ordered registry of weak registrant references.
pub(crate) struct HookRegistry<T: ?Sized> {
    entries: Vec<(HookHandle, Weak<T>)>,
}

impl<T: ?Sized> HookRegistry<T> {
    pub(crate) fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    pub(crate) fn register(&mut self, hook: &Arc<T>) -> HookHandle {
        let handle = HookHandle::new();
        self.entries.push((handle, Arc::downgrade(hook)));
        handle
    }

    /// Removes a registration. Unknown handles are ignored (the registrant
    /// may already have been dropped and pruned).
    pub(crate) fn unregister(&mut self, handle: HookHandle) {
        self.entries.retain(|(h, _)| *h != handle);
    }

    /// Live registrants in registration order; stale entries are skipped
    /// and pruned.
    pub(crate) fn live(&mut self) -> Vec<Arc<T>> {
        self.entries.retain(|(handle, weak)| {
            let alive = weak.strong_count() > 0;
            if !alive {
                debug!(?handle, "pruning dropped registrant");
            }
            alive
        });
        self.entries
            .iter()
            .filter_map(|(_, weak)| weak.upgrade())
            .collect()
    }
}
