//! The host bridge: a process-wide registry of native functions plus the
//! rule allocator (spec.md §4.4).
//!
//! Two independent `parking_lot` reader/writer locks guard the function
//! table and its manifest; the rule-id counter is lock-free. Lookups and
//! calls take the read lock and release it *before* invoking the callee, so
//! a host function that registers or unregisters another function never
//! deadlocks against itself (spec.md §4.4, §5).

use std::{
    fmt,
    sync::atomic::{AtomicU32, Ordering},
};

use indexmap::IndexSet;
use parking_lot::RwLock;

use crate::value::{Rule, Value};

/// A failure raised by a host function body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostError {
    pub message: String,
}

impl fmt::Display for HostError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for HostError {}

/// The erased contract every host function is invoked through (spec.md §9):
/// takes a slice of arguments, returns a value, may raise.
pub type HostFn = std::sync::Arc<dyn Fn(&[Value]) -> Result<Value, HostError> + Send + Sync>;

/// The process-wide host function registry and rule allocator.
///
/// All state lives behind interior mutability so a `HostBridge` can be
/// shared (typically via [`crate::runtime::Runtime::global`]) across every
/// thread dispatching handlers concurrently.
pub struct HostBridge {
    functions: RwLock<indexmap::IndexMap<String, HostFn>>,
    manifest: RwLock<IndexSet<String>>,
    next_rule_id: AtomicU32,
}

impl fmt::Debug for HostBridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostBridge")
            .field("registered_functions", &self.functions.read().len())
            .finish_non_exhaustive()
    }
}

impl Default for HostBridge {
    fn default() -> Self {
        Self::new()
    }
}

impl HostBridge {
    /// An empty bridge with no registered functions and a rule counter
    /// starting at `1` (spec.md §6.4).
    #[must_use]
    pub fn new() -> Self {
        Self {
            functions: RwLock::new(indexmap::IndexMap::new()),
            manifest: RwLock::new(IndexSet::new()),
            next_rule_id: AtomicU32::new(1),
        }
    }

    /// Mints a fresh [`Rule`] with `type_tag = 1` and a monotonically
    /// increasing id (spec.md §4.4, property P4). Lock-free.
    #[must_use]
    pub fn create_rule(&self, _kind: &str) -> Rule {
        let id = self.next_rule_id.fetch_add(1, Ordering::SeqCst);
        Rule::new(1, id)
    }

    /// Acknowledged no-op: real resource reclamation is deferred to a
    /// future revision (spec.md §4.4, §9 Open Questions).
    pub fn release_rule(&self, _rule: Rule) {}

    /// Resolves an unqualified global name. The minimal core has no
    /// globals table, so this always returns `Nil` and logs the miss
    /// (spec.md §4.5 "Globals"); embedders extend by overriding this
    /// behavior at a higher layer.
    #[must_use]
    pub fn resolve_global(&self, name: &str) -> Value {
        log::debug!("no global named '{name}'; returning nil");
        Value::Nil
    }

    /// Inserts or replaces a host function under `name` and records it in
    /// the manifest. Takes the write lock on both.
    pub fn register_function(&self, name: impl Into<String>, f: HostFn) {
        let name = name.into();
        self.functions.write().insert(name.clone(), f);
        self.manifest.write().insert(name);
    }

    /// Removes the function and its manifest entry. Returns whether
    /// anything was removed.
    pub fn unregister_function(&self, name: &str) -> bool {
        let removed = self.functions.write().shift_remove(name).is_some();
        self.manifest.write().shift_remove(name);
        removed
    }

    /// Whether a function is currently registered under `name`.
    #[must_use]
    pub fn has_function(&self, name: &str) -> bool {
        self.functions.read().contains_key(name)
    }

    /// Looks up and invokes `name` with `args`. Returns `None` if no
    /// function is registered under that name.
    ///
    /// The read lock is released before the call executes, so the callee
    /// may itself register or unregister functions without deadlocking
    /// (spec.md §4.4).
    ///
    /// # Errors
    /// Propagates whatever [`HostError`] the callee raises.
    pub fn call_function(&self, name: &str, args: &[Value]) -> Result<Option<Value>, HostError> {
        let f = self.functions.read().get(name).cloned();
        match f {
            Some(f) => f(args).map(Some),
            None => Ok(None),
        }
    }

    /// Registers `f` under `name` and returns a guard that unregisters it
    /// on drop (spec.md §4.4).
    pub fn register_scoped(&self, name: impl Into<String>, f: HostFn) -> RegisteredFunctionGuard<'_> {
        let name = name.into();
        self.register_function(name.clone(), f);
        RegisteredFunctionGuard {
            bridge: Some(self),
            name,
        }
    }

    /// The manifest of every currently-registered function name, in
    /// registration order.
    #[must_use]
    pub fn manifest(&self) -> Vec<String> {
        self.manifest.read().iter().cloned().collect()
    }
}

/// An owning handle that unregisters its function on destruction. Supports
/// move (the source becomes inert) and forbids copy (spec.md §4.4).
pub struct RegisteredFunctionGuard<'a> {
    bridge: Option<&'a HostBridge>,
    name: String,
}

impl Drop for RegisteredFunctionGuard<'_> {
    fn drop(&mut self) {
        if let Some(bridge) = self.bridge.take() {
            bridge.unregister_function(&self.name);
        }
    }
}
