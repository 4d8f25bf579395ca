use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    Screenshot,
    DomSnapshot,
    Video,
    Markdown,
    EventLog,
}

/// An artifact on disk. Created during execution, never mutated after
/// close (spec.md 3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Artifact {
    pub kind: ArtifactKind,
    pub path: PathBuf,
}

/// A tenant workspace rooted inside the configured storage root
/// (spec.md 3: "root path is inside configured storage root and
/// inside the accountId subtree").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workspace {
    pub id: Uuid,
    pub account_id: String,
    pub root: PathBuf,
}

impl Workspace {
    /// Validate the invariant that `root` sits inside
    /// `<storage_root>/<account_id>/`.
    pub fn validate(&self, storage_root: &std::path::Path) -> crate::error::Result<()> {
        let expected_prefix = storage_root.join(&self.account_id);
        if !self.root.starts_with(&expected_prefix) {
            return Err(crate::error::Error::Config(format!(
                "workspace root {} is not inside {}",
                self.root.display(),
                expected_prefix.display()
            )));
        }
        Ok(())
    }
}
