//! Flush hooks run when the process shuts down
//!
//! Rust has no `atexit`; the binary calls [`run_hooks`] on every exit path
//! and the "exit" broken-pipe policies call it right before exiting.

use once_cell::sync::Lazy;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::debug;

/// Something that can be flushed on a best-effort basis
pub trait Flushable: Send + Sync {
    fn flush_now(&self);
}

/// Identifies one registered hook
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HookId(u64);

#[derive(Default)]
struct Registry {
    next_id: u64,
    hooks: Vec<(HookId, Arc<dyn Flushable>)>,
}

/// A set of shutdown flush hooks
#[derive(Default)]
pub struct ShutdownHooks {
    registry: Mutex<Registry>,
}

static GLOBAL_HOOKS: Lazy<ShutdownHooks> = Lazy::new(ShutdownHooks::default);

fn same_target(a: &Arc<dyn Flushable>, b: &Arc<dyn Flushable>) -> bool {
    Arc::as_ptr(a) as *const () == Arc::as_ptr(b) as *const ()
}

impl ShutdownHooks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hooks shared by the whole process
    pub fn global() -> &'static ShutdownHooks {
        &GLOBAL_HOOKS
    }

    /// Register `hook`. Registering the same object twice returns the existing id.
    pub fn register(&self, hook: Arc<dyn Flushable>) -> HookId {
        let mut registry = self.registry.lock();
        if let Some((id, _)) = registry.hooks.iter().find(|(_, h)| same_target(h, &hook)) {
            return *id;
        }

        let id = HookId(registry.next_id);
        registry.next_id += 1;
        registry.hooks.push((id, hook));
        debug!("Registered shutdown hook {:?}", id);
        id
    }

    /// Remove a hook; returns false if it was not registered
    pub fn unregister(&self, id: HookId) -> bool {
        let mut registry = self.registry.lock();
        let before = registry.hooks.len();
        registry.hooks.retain(|(hook_id, _)| *hook_id != id);
        registry.hooks.len() != before
    }

    pub fn is_registered(&self, id: HookId) -> bool {
        self.registry.lock().hooks.iter().any(|(hook_id, _)| *hook_id == id)
    }

    pub fn len(&self) -> usize {
        self.registry.lock().hooks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Flush every registered hook, outside the registry lock
    pub fn run(&self) {
        let hooks: Vec<Arc<dyn Flushable>> = self
            .registry
            .lock()
            .hooks
            .iter()
            .map(|(_, hook)| Arc::clone(hook))
            .collect();

        debug!("Running {} shutdown hook(s)", hooks.len());
        for hook in hooks {
            hook.flush_now();
        }
    }
}

/// Register a hook with the process-wide set
pub fn register(hook: Arc<dyn Flushable>) -> HookId {
    ShutdownHooks::global().register(hook)
}

/// Unregister a hook from the process-wide set
pub fn unregister(id: HookId) -> bool {
    ShutdownHooks::global().unregister(id)
}

/// Run all process-wide hooks
pub fn run_hooks() {
    ShutdownHooks::global().run();
}
