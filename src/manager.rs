//! The module manager: atomic install/hot-swap and deferred reclamation
//! (spec.md §4.6).
//!
//! The active map and the pending-reclaim list are two independent mutexes.
//! When both must be touched, the order is always map-then-reclaim (spec.md
//! §5), matching the order `install` itself uses: remove-and-insert under
//! the map lock, then push the displaced module onto the reclaim list.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::module::Module;

/// Owns the active (name → Module) map and the pending-reclaim list.
///
/// Modules are held behind `Arc` so a handle returned by [`Self::get`]
/// stays valid for the caller's invocation even if a concurrent
/// [`Self::install`] displaces it from the map in the meantime (spec.md
/// §4.6 "Safety invariant").
#[derive(Default)]
pub struct ModuleManager {
    active: Mutex<indexmap::IndexMap<String, Arc<Module>>>,
    pending_reclaim: Mutex<Vec<Arc<Module>>>,
}

impl ModuleManager {
    /// An empty manager with nothing installed.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// An empty manager whose active-module map is pre-sized for `capacity`
    /// entries, avoiding rehashing during an embedder's initial bulk install
    /// (SPEC_FULL §4.8).
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            active: Mutex::new(indexmap::IndexMap::with_capacity(capacity)),
            pending_reclaim: Mutex::new(Vec::new()),
        }
    }

    /// Installs `module` under its name. If a module with that name is
    /// already active, it is displaced onto the pending-reclaim list
    /// rather than freed immediately (spec.md §4.6).
    pub fn install(&self, module: Module) {
        let module = Arc::new(module);
        let displaced = self.active.lock().insert(module.name().to_owned(), module);
        if let Some(displaced) = displaced {
            self.pending_reclaim.lock().push(displaced);
        }
    }

    /// The currently-installed module for `name`, if any.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<Module>> {
        self.active.lock().get(name).cloned()
    }

    /// Frees every pending-reclaim module whose `active_calls == 0`;
    /// modules with in-flight calls are retained for a later tick
    /// (spec.md §4.6). Intended to be called periodically by the host.
    pub fn tick_reclaim(&self) {
        let mut reclaim = self.pending_reclaim.lock();
        let (freed, retained): (Vec<_>, Vec<_>) = std::mem::take(&mut *reclaim).into_iter().partition(|m| m.is_quiescent());
        *reclaim = retained;
        drop(reclaim);
        for module in freed {
            log::debug!("reclaimed module '{}'", module.name());
            drop(module);
        }
    }

    /// The number of modules still awaiting reclamation. Exposed for tests
    /// and host diagnostics.
    #[must_use]
    pub fn pending_reclaim_count(&self) -> usize {
        self.pending_reclaim.lock().len()
    }
}
