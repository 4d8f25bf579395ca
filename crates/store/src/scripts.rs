use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use gf_domain::error::{Error, Result};

/// The neutral JSON round-trip representation (spec.md 4.8).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptExport {
    pub script_id: Uuid,
    pub metadata: ScriptMetadata,
    pub config: serde_json::Value,
    pub body: String,
    pub exported_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptMetadata {
    pub title: String,
    pub base_url: String,
}

/// Splits a markdown-with-frontmatter document into (frontmatter YAML,
/// body).
fn split_frontmatter(markdown: &str) -> Result<(&str, &str)> {
    let rest = markdown
        .strip_prefix("---\n")
        .ok_or_else(|| Error::Other("missing YAML frontmatter delimiter".into()))?;
    let end = rest
        .find("\n---")
        .ok_or_else(|| Error::Other("missing closing frontmatter delimiter".into()))?;
    let frontmatter = &rest[..end];
    let after = &rest[end + 4..];
    let body = after.strip_prefix('\n').unwrap_or(after);
    Ok((frontmatter, body))
}

/// Export: read markdown, parse frontmatter into a neutral config
/// object, return `{scriptId, metadata, config, body, exportedAt}`
/// (spec.md 4.8).
pub fn export_script(markdown_path: &Path, script_id: Uuid) -> Result<ScriptExport> {
    let markdown = std::fs::read_to_string(markdown_path)?;
    let (frontmatter_yaml, body) = split_frontmatter(&markdown)?;
    let config: serde_json::Value = serde_yaml::from_str(frontmatter_yaml)
        .map_err(|e| Error::Other(format!("parsing frontmatter: {e}")))?;

    let title = config
        .get("title")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string();
    let base_url = config
        .get("baseUrl")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string();

    Ok(ScriptExport {
        script_id,
        metadata: ScriptMetadata { title, base_url },
        config,
        body: body.to_string(),
        exported_at: Utc::now(),
    })
}

/// A minimal script registry entry, tracking where a script's markdown
/// file lives.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptRegistryEntry {
    pub script_id: Uuid,
    pub path: std::path::PathBuf,
}

/// Import: write the markdown to
/// `<scriptsDir>/<scriptId>/generated-guide.md`, honoring the
/// overwrite flag (spec.md 4.8: "absent overwrite + existing id →
/// error"). Returns the written path.
pub fn import_script(
    scripts_dir: &Path,
    export: &ScriptExport,
    markdown: &str,
    overwrite: bool,
) -> Result<std::path::PathBuf> {
    let dir = scripts_dir.join(export.script_id.to_string());
    let path = dir.join("generated-guide.md");

    if path.exists() && !overwrite {
        return Err(Error::Other(format!(
            "script {} already exists and overwrite was not requested",
            export.script_id
        )));
    }

    std::fs::create_dir_all(&dir)?;
    std::fs::write(&path, markdown)?;
    Ok(path)
}

pub fn load_script_metadata(export: &ScriptExport) -> &ScriptMetadata {
    &export.metadata
}
