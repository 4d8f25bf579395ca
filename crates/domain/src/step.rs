use serde::{Deserialize, Serialize};

/// One atomic browser action or narration marker (spec.md 3, 6).
///
/// Tagged variants replace the source's dynamic dispatch over step
/// "types" (spec.md 9).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Step {
    Goto {
        url: String,
    },
    Click {
        label: String,
    },
    Type {
        label: String,
        /// Required by the Script data model once a guide is finalized
        /// (spec.md 3: "Type requires value, may be placeholder"), but
        /// `None` is accepted from a freshly planned step whose value
        /// is not yet known — the Placeholder Resolver injects the
        /// cached label→key mapping before execution in that case
        /// (spec.md 4.3).
        #[serde(default, skip_serializing_if = "Option::is_none")]
        value: Option<String>,
        #[serde(default, skip_serializing_if = "std::ops::Not::not")]
        sensitive: bool,
    },
    AssertPage {
        url: String,
    },
    Keypress {
        key: String,
    },
    TtsStart {
        label: String,
        text: String,
    },
    TtsWait {
        label: String,
    },
}

impl Step {
    /// Step kind discriminant, used for loop detection and retry keys
    /// (spec.md 4.6: "a step key (type + label/url/key)").
    pub fn kind_name(&self) -> &'static str {
        match self {
            Step::Goto { .. } => "goto",
            Step::Click { .. } => "click",
            Step::Type { .. } => "type",
            Step::AssertPage { .. } => "assert_page",
            Step::Keypress { .. } => "keypress",
            Step::TtsStart { .. } => "tts_start",
            Step::TtsWait { .. } => "tts_wait",
        }
    }

    /// Identity used for loop detection and retry accounting:
    /// (type, label/url/key).
    pub fn stable_key(&self) -> String {
        let discriminant = match self {
            Step::Goto { url } => url.as_str(),
            Step::Click { label } => label.as_str(),
            Step::Type { label, .. } => label.as_str(),
            Step::AssertPage { url } => url.as_str(),
            Step::Keypress { key } => key.as_str(),
            Step::TtsStart { label, .. } => label.as_str(),
            Step::TtsWait { label } => label.as_str(),
        };
        format!("{}:{}", self.kind_name(), discriminant)
    }

    /// True for steps that are narration markers rather than browser
    /// actions (spec.md 4.7: "the first executable step, ignoring TTS
    /// markers").
    pub fn is_tts_marker(&self) -> bool {
        matches!(self, Step::TtsStart { .. } | Step::TtsWait { .. })
    }

    pub fn is_sensitive(&self) -> bool {
        matches!(self, Step::Type { sensitive: true, .. })
    }
}
