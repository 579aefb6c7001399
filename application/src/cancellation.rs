//! Cancellation registry for one invocation.
//!
//! Every task of an invocation gets a child token of the registry's root
//! token. Cancelling a task token aborts that task only; cancelling the root
//! aborts everything. Tokens are removed from the registry when the guard
//! returned by [`CancellationRegistry::register`] is dropped, on every exit
//! path.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

/// Cloneable handle that cancels one task (or the whole invocation).
#[derive(Debug, Clone)]
pub struct CancelHandle {
    token: CancellationToken,
}

impl CancelHandle {
    pub fn new(token: CancellationToken) -> Self {
        Self { token }
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

#[derive(Debug)]
pub struct CancellationRegistry {
    root: CancellationToken,
    /// id → (registration generation, token)
    tasks: Mutex<HashMap<String, (u64, CancellationToken)>>,
    generation: AtomicU64,
}

impl Default for CancellationRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl CancellationRegistry {
    pub fn new() -> Self {
        Self::with_parent(&CancellationToken::new())
    }

    /// Registry whose root is a child of `parent` (e.g. a Ctrl-C token).
    pub fn with_parent(parent: &CancellationToken) -> Self {
        Self {
            root: parent.child_token(),
            tasks: Mutex::new(HashMap::new()),
            generation: AtomicU64::new(0),
        }
    }

    pub fn root_token(&self) -> &CancellationToken {
        &self.root
    }

    /// Handle for global cancellation.
    pub fn cancel_all_handle(&self) -> CancelHandle {
        CancelHandle::new(self.root.clone())
    }

    pub fn cancel_all(&self) {
        self.root.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.root.is_cancelled()
    }

    /// Register task `id` and return its scoped token.
    ///
    /// Registering an id twice replaces the previous token.
    pub fn register(self: &Arc<Self>, id: impl Into<String>) -> TaskCancellation {
        let id = id.into();
        let token = self.root.child_token();
        let generation = self.generation.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut tasks) = self.tasks.lock() {
            tasks.insert(id.clone(), (generation, token.clone()));
        }
        TaskCancellation {
            id,
            generation,
            token,
            registry: Arc::clone(self),
        }
    }

    /// Cancel task `id`. Returns false when no such task is registered.
    pub fn cancel(&self, id: &str) -> bool {
        match self.token_of(id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    pub fn handle(&self, id: &str) -> Option<CancelHandle> {
        self.token_of(id).map(CancelHandle::new)
    }

    /// Number of registered (not yet released) tasks.
    pub fn active(&self) -> usize {
        self.tasks.lock().map(|t| t.len()).unwrap_or(0)
    }

    fn token_of(&self, id: &str) -> Option<CancellationToken> {
        self.tasks
            .lock()
            .ok()
            .and_then(|t| t.get(id).map(|(_, token)| token.clone()))
    }

    fn release(&self, id: &str, generation: u64) {
        if let Ok(mut tasks) = self.tasks.lock() {
            // a later registration of the same id stays
            if tasks.get(id).is_some_and(|(g, _)| *g == generation) {
                tasks.remove(id);
            }
        }
    }
}

/// A task's token, released from the registry on drop.
#[derive(Debug)]
pub struct TaskCancellation {
    id: String,
    generation: u64,
    token: CancellationToken,
    registry: Arc<CancellationRegistry>,
}

impl TaskCancellation {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn handle(&self) -> CancelHandle {
        CancelHandle::new(self.token.clone())
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

impl Drop for TaskCancellation {
    fn drop(&mut self) {
        self.registry.release(&self.id, self.generation);
    }
}
