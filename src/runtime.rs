//! The embedding surface: bundles one [`HostBridge`] with one
//! [`ModuleManager`] (spec.md §6.1, §9 "Global state").
//!
//! The spec treats the bridge and the manager as process-wide singletons
//! "by design." [`Runtime`] keeps that option available via
//! [`Runtime::global`] without forcing it: an embedder running more than
//! one isolated runtime in the same process (e.g. in tests) can construct
//! [`Runtime::new`] directly instead.

use std::sync::OnceLock;

use crate::{host::HostBridge, manager::ModuleManager, module::Module};

/// Construction-time knobs for a [`Runtime`] (SPEC_FULL §4.8).
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Pre-sizes the module manager's active map, avoiding rehashing during
    /// an embedder's initial bulk install. `None` uses the manager's
    /// default (empty) capacity.
    pub module_capacity_hint: Option<usize>,
    /// Whether [`Runtime::install`] should call `tick_reclaim` right after
    /// installing. Off by default: per spec.md §4.6, reclamation is
    /// normally driven by the host on its own schedule.
    pub auto_reclaim_after_install: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            module_capacity_hint: None,
            auto_reclaim_after_install: false,
        }
    }
}

impl RuntimeConfig {
    /// The default configuration: no capacity hint, reclamation left to the
    /// host's own `tick_reclaim` schedule.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

/// The embedder-facing handle bundling a host bridge and a module manager
/// (spec.md §6.1).
pub struct Runtime {
    bridge: HostBridge,
    modules: ModuleManager,
    auto_reclaim_after_install: bool,
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl Runtime {
    /// A fresh runtime with an empty host bridge and module manager.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(RuntimeConfig::new())
    }

    /// A fresh runtime built from an explicit [`RuntimeConfig`].
    #[must_use]
    pub fn with_config(config: RuntimeConfig) -> Self {
        Self {
            bridge: HostBridge::new(),
            modules: config.module_capacity_hint.map_or_else(ModuleManager::new, ModuleManager::with_capacity),
            auto_reclaim_after_install: config.auto_reclaim_after_install,
        }
    }

    /// The process-wide runtime (spec.md §9 "Global state"). Lazily
    /// initialized on first access.
    #[must_use]
    pub fn global() -> &'static Self {
        static GLOBAL: OnceLock<Runtime> = OnceLock::new();
        GLOBAL.get_or_init(Runtime::new)
    }

    #[must_use]
    pub fn bridge(&self) -> &HostBridge {
        &self.bridge
    }

    #[must_use]
    pub fn modules(&self) -> &ModuleManager {
        &self.modules
    }

    /// Installs `module`, then ticks reclamation if `RuntimeConfig` asked
    /// for that (SPEC_FULL §4.8). Equivalent to `self.modules().install`
    /// when `auto_reclaim_after_install` is off, which is the default.
    pub fn install(&self, module: Module) {
        self.modules.install(module);
        if self.auto_reclaim_after_install {
            self.modules.tick_reclaim();
        }
    }
}
