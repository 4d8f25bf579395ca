use gf_domain::config::QuiescenceConfig;
use gf_domain::error::Result;

/// An opaque handle to a located element. The real browser automation
/// library defines what this actually is; the executor only ever
/// threads it through `type_text`/`click`.
#[derive(Debug, Clone)]
pub struct ElementHandle(pub String);

/// The contract the Step Executor needs from a browser automation
/// library. Deliberately narrow: navigate, locate-by-label, type,
/// click, press-key, screenshot, DOM capture, wait-for-quiescence,
/// page-URL (spec.md 2, 4.5). The library itself is out of scope
/// (spec.md 1); this trait is the whole of what this crate specifies.
#[async_trait::async_trait]
pub trait BrowserDriver: Send + Sync {
    async fn navigate(&self, url: &str) -> Result<()>;
    async fn locate_by_label(&self, label: &str) -> Result<ElementHandle>;
    async fn type_text(&self, target: &ElementHandle, value: &str) -> Result<()>;
    async fn click(&self, target: &ElementHandle) -> Result<()>;
    async fn press_key(&self, key: &str) -> Result<()>;
    async fn screenshot(&self) -> Result<Vec<u8>>;
    async fn dom_snapshot(&self) -> Result<String>;
    async fn wait_quiescence(&self, cfg: &QuiescenceConfig) -> Result<()>;
    async fn current_url(&self) -> Result<String>;
}
