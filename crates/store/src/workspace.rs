use std::path::{Path, PathBuf};

use uuid::Uuid;

use gf_domain::error::Result;

/// The filesystem layout rooted at `<storage>/<account>/<workspace>/`
/// (spec.md 2, 6). Produces paths only; creation is lazy (callers
/// create directories as they write into them).
pub struct WorkspaceLayout {
    root: PathBuf,
}

impl WorkspaceLayout {
    pub fn new(storage_root: &Path, account_id: &str, workspace_id: &str) -> Self {
        Self {
            root: storage_root.join(account_id).join(workspace_id),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn script_dir(&self, script_id: Uuid) -> PathBuf {
        self.root.join("generated-scripts").join(script_id.to_string())
    }

    pub fn script_markdown_path(&self, script_id: Uuid) -> PathBuf {
        self.script_dir(script_id).join("generated-guide.md")
    }

    pub fn session_dir(&self, session_id: Uuid) -> PathBuf {
        self.root.join("sessions").join(session_id.to_string())
    }

    pub fn events_path(&self, session_id: Uuid) -> PathBuf {
        self.session_dir(session_id).join("events.ndjson")
    }

    pub fn screenshot_path(&self, session_id: Uuid, step_index: u32) -> PathBuf {
        self.session_dir(session_id)
            .join("screenshots")
            .join(format!("step-{step_index}.png"))
    }

    pub fn dom_snapshot_path(&self, session_id: Uuid, step_index: u32) -> PathBuf {
        self.session_dir(session_id)
            .join("dom-snapshots")
            .join(format!("step-{step_index}.html"))
    }

    pub fn video_path(&self, session_id: Uuid) -> PathBuf {
        self.session_dir(session_id).join("videos").join("guide-video.mp4")
    }

    pub fn session_guide_path(&self, session_id: Uuid) -> PathBuf {
        self.session_dir(session_id).join("guides").join("generated-guide.md")
    }

    pub fn guide_log_path(&self, session_id: Uuid) -> PathBuf {
        self.session_dir(session_id).join("guide-log.json")
    }

    /// Ensure a directory exists, creating all parents.
    pub fn ensure_dir(path: &Path) -> Result<()> {
        std::fs::create_dir_all(path)?;
        Ok(())
    }
}
