use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

/// A cooperative cancellation flag, checked at safe points rather
/// than forcibly interrupting in-flight work (spec.md 4.1, 5).
#[derive(Clone)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Registry of per-session cancellation tokens, with optional
/// parent→child cascading groups (not currently exercised by a single
/// session's own orchestrator loop, but kept for sub-session/worker
/// relationships — spec.md 4.9's worker owns one session, so cascading
/// is a forward-looking hook rather than dead weight).
pub struct CancelMap {
    tokens: RwLock<HashMap<String, CancelToken>>,
    groups: RwLock<HashMap<String, HashSet<String>>>,
}

impl CancelMap {
    pub fn new() -> Self {
        Self {
            tokens: RwLock::new(HashMap::new()),
            groups: RwLock::new(HashMap::new()),
        }
    }

    pub fn register(&self, id: &str) -> CancelToken {
        let token = CancelToken::new();
        self.tokens.write().insert(id.to_string(), token.clone());
        token
    }

    pub fn is_running(&self, id: &str) -> bool {
        self.tokens
            .read()
            .get(id)
            .map(|t| !t.is_cancelled())
            .unwrap_or(false)
    }

    /// Cancel `id` and cascade to any children registered via
    /// [`CancelMap::add_to_group`].
    pub fn cancel(&self, id: &str) {
        if let Some(token) = self.tokens.read().get(id) {
            token.cancel();
        }
        if let Some(children) = self.groups.read().get(id).cloned() {
            for child in children {
                self.cancel(&child);
            }
        }
    }

    pub fn remove(&self, id: &str) {
        self.tokens.write().remove(id);
        self.groups.write().remove(id);
        for children in self.groups.write().values_mut() {
            children.remove(id);
        }
    }

    pub fn add_to_group(&self, parent: &str, child: &str) {
        self.groups
            .write()
            .entry(parent.to_string())
            .or_default()
            .insert(child.to_string());
    }
}

impl Default for CancelMap {
    fn default() -> Self {
        Self::new()
    }
}
