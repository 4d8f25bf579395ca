use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::step::Step;

/// A markdown guide, addressable by UUID (spec.md 3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Script {
    pub id: Uuid,
    pub title: String,
    pub base_url: String,
    pub steps: Vec<Step>,
    pub language: String,
    #[serde(default)]
    pub record_video: bool,
    #[serde(default)]
    pub tags: Vec<String>,
    pub path: std::path::PathBuf,
}

impl Script {
    /// The first executable step, skipping TTS markers (spec.md 4.7).
    pub fn first_executable_step(&self) -> Option<&Step> {
        self.steps.iter().find(|s| !s.is_tts_marker())
    }

    /// Every `tts_start(label)` has a later `tts_wait(label)`
    /// (spec.md 3 invariant).
    pub fn tts_pairs_are_closed(&self) -> bool {
        use std::collections::HashSet;
        let mut open: HashSet<&str> = HashSet::new();
        for step in &self.steps {
            match step {
                Step::TtsStart { label, .. } => {
                    open.insert(label.as_str());
                }
                Step::TtsWait { label } => {
                    open.remove(label.as_str());
                }
                _ => {}
            }
        }
        open.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_script(steps: Vec<Step>) -> Script {
        Script {
            id: Uuid::new_v4(),
            title: "t".into(),
            base_url: "https://example.com".into(),
            steps,
            language: "en".into(),
            record_video: false,
            tags: vec![],
            path: "/tmp/x.md".into(),
        }
    }

    #[test]
    fn first_executable_skips_tts_markers() {
        let s = sample_script(vec![
            Step::TtsStart { label: "intro".into(), text: "hi".into() },
            Step::Goto { url: "https://example.com".into() },
        ]);
        assert_eq!(s.first_executable_step(), Some(&Step::Goto { url: "https://example.com".into() }));
    }

    #[test]
    fn detects_unpaired_tts_start() {
        let s = sample_script(vec![Step::TtsStart { label: "intro".into(), text: "hi".into() }]);
        assert!(!s.tts_pairs_are_closed());
    }

    #[test]
    fn accepts_paired_tts() {
        let s = sample_script(vec![
            Step::TtsStart { label: "intro".into(), text: "hi".into() },
            Step::Click { label: "Next".into() },
            Step::TtsWait { label: "intro".into() },
        ]);
        assert!(s.tts_pairs_are_closed());
    }
}
