//! Artifact Store (filesystem layout), Event Log Mirror (NDJSON
//! writer + tailer), and Script Import/Export (spec.md 4.2, 4.8, 6).

pub mod eventlog;
pub mod scripts;
pub mod workspace;

pub use eventlog::{EventLogWriter, Tailer};
pub use scripts::{export_script, import_script, ScriptExport};
pub use workspace::WorkspaceLayout;
