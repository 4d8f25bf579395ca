use parking_lot::RwLock;
use std::collections::HashMap;

/// Per-URL label→key cache backing SecretMap/VarMap (spec.md 3: "built
/// lazily on first planning for a URL; memoized for session lifetime").
pub struct PlaceholderCache {
    inner: RwLock<HashMap<String, HashMap<String, String>>>,
}

impl PlaceholderCache {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
        }
    }

    pub fn get(&self, url: &str, label: &str) -> Option<String> {
        self.inner
            .read()
            .get(url)
            .and_then(|labels| labels.get(label))
            .cloned()
    }

    pub fn has_url(&self, url: &str) -> bool {
        self.inner.read().contains_key(url)
    }

    /// Replace the mapping for a URL (the resolver builds the whole
    /// mapping for a URL in one LLM call, so there is no incremental
    /// insert).
    pub fn put_url(&self, url: &str, mapping: HashMap<String, String>) {
        self.inner.write().insert(url.to_string(), mapping);
    }
}

impl Default for PlaceholderCache {
    fn default() -> Self {
        Self::new()
    }
}

/// A field-label token kind, used for the cross-type safety rule
/// (spec.md 4.3): username-shaped labels never bind to password-shaped
/// keys and vice versa.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LabelShape {
    UsernameLike,
    PasswordLike,
    Other,
}

/// Classify a label or key name by the exact token lists spec.md 4.3
/// gives: `email|username|login|user|mail|benutzername` vs.
/// `password|pwd|pw|passwort`.
pub fn classify_label(text: &str) -> LabelShape {
    let lower = text.to_lowercase();
    let username_re = regex_username();
    let password_re = regex_password();
    if password_re.is_match(&lower) {
        LabelShape::PasswordLike
    } else if username_re.is_match(&lower) {
        LabelShape::UsernameLike
    } else {
        LabelShape::Other
    }
}

fn regex_username() -> &'static regex::Regex {
    static RE: std::sync::OnceLock<regex::Regex> = std::sync::OnceLock::new();
    RE.get_or_init(|| regex::Regex::new(r"email|username|login|user|mail|benutzername").unwrap())
}

fn regex_password() -> &'static regex::Regex {
    static RE: std::sync::OnceLock<regex::Regex> = std::sync::OnceLock::new();
    RE.get_or_init(|| regex::Regex::new(r"password|pwd|pw|passwort").unwrap())
}

/// True if binding `label` to `key` would violate the cross-type
/// safety rule (spec.md 4.3, 8).
pub fn violates_cross_type_safety(label: &str, key: &str) -> bool {
    let label_shape = classify_label(label);
    let key_shape = classify_label(key);
    matches!(
        (label_shape, key_shape),
        (LabelShape::UsernameLike, LabelShape::PasswordLike)
            | (LabelShape::PasswordLike, LabelShape::UsernameLike)
    )
}
