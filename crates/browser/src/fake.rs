use std::collections::HashMap;

use parking_lot::Mutex;

use gf_domain::config::QuiescenceConfig;
use gf_domain::error::{Error, Result};

use crate::driver::{BrowserDriver, ElementHandle};

struct FakeState {
    url: String,
    labels: Vec<String>,
    dom: String,
    typed: HashMap<String, String>,
}

/// A deterministic in-memory driver used to exercise the Step Executor
/// and Orchestrator Loop in tests without a real browser (spec.md 1
/// explicitly scopes the real automation library out). Not shipped as
/// "the library" — just something concrete to drive.
pub struct FakeBrowserDriver {
    state: Mutex<FakeState>,
    /// (url, label) click -> new url. Absent entries leave the URL
    /// unchanged.
    transitions: HashMap<(String, String), String>,
}

impl FakeBrowserDriver {
    pub fn new(start_url: impl Into<String>, labels: Vec<String>) -> Self {
        Self {
            state: Mutex::new(FakeState {
                url: start_url.into(),
                labels,
                dom: "<html></html>".into(),
                typed: HashMap::new(),
            }),
            transitions: HashMap::new(),
        }
    }

    pub fn with_transition(
        mut self,
        url: impl Into<String>,
        label: impl Into<String>,
        new_url: impl Into<String>,
    ) -> Self {
        self.transitions
            .insert((url.into(), label.into()), new_url.into());
        self
    }

    pub fn set_labels(&self, labels: Vec<String>) {
        self.state.lock().labels = labels;
    }

    pub fn typed_value(&self, label: &str) -> Option<String> {
        self.state.lock().typed.get(label).cloned()
    }
}

#[async_trait::async_trait]
impl BrowserDriver for FakeBrowserDriver {
    async fn navigate(&self, url: &str) -> Result<()> {
        self.state.lock().url = url.to_string();
        Ok(())
    }

    async fn locate_by_label(&self, label: &str) -> Result<ElementHandle> {
        let state = self.state.lock();
        if state.labels.iter().any(|l| l == label) {
            Ok(ElementHandle(label.to_string()))
        } else {
            Err(Error::Execution {
                kind: gf_domain::error::ExecutionErrorKind::NotFound,
                message: format!("no element labeled '{label}'"),
            })
        }
    }

    async fn type_text(&self, target: &ElementHandle, value: &str) -> Result<()> {
        self.state
            .lock()
            .typed
            .insert(target.0.clone(), value.to_string());
        Ok(())
    }

    async fn click(&self, target: &ElementHandle) -> Result<()> {
        let mut state = self.state.lock();
        if let Some(new_url) = self.transitions.get(&(state.url.clone(), target.0.clone())) {
            state.url = new_url.clone();
        }
        Ok(())
    }

    async fn press_key(&self, _key: &str) -> Result<()> {
        Ok(())
    }

    async fn screenshot(&self) -> Result<Vec<u8>> {
        // 1x1 transparent PNG, small enough to exercise the "tiny
        // input forwarded verbatim" path in the image pipeline.
        Ok(vec![
            0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x0D,
        ])
    }

    async fn dom_snapshot(&self) -> Result<String> {
        Ok(self.state.lock().dom.clone())
    }

    async fn wait_quiescence(&self, _cfg: &QuiescenceConfig) -> Result<()> {
        Ok(())
    }

    async fn current_url(&self) -> Result<String> {
        Ok(self.state.lock().url.clone())
    }
}
