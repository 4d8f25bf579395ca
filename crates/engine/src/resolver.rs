use std::collections::HashMap;
use std::sync::Arc;

use gf_domain::error::Result;
use gf_domain::placeholder::{violates_cross_type_safety, PlaceholderCache};
use gf_llm::client::{ChatRequest, LlmClient};
use gf_llm::json_recovery::recover_json_object;

fn resolver_system_prompt(sensitive: bool) -> String {
    let noun = if sensitive { "secret" } else { "variable" };
    format!(
        "You map visible web form field labels to {noun} keys. Return a \
         single JSON object whose keys are exactly the given field labels \
         and whose values are exactly one of the given {noun} keys. Omit a \
         label entirely if none of the given keys plausibly belongs to it. \
         Never invent a key that was not given to you."
    )
}

fn build_user_prompt(url: &str, labels: &[String], keys: &[String], hints: &HashMap<String, String>) -> String {
    let mut prompt = format!("URL: {url}\nField labels: {}\nKeys: {}\n", labels.join(", "), keys.join(", "));
    if !hints.is_empty() {
        prompt.push_str("Key hints:\n");
        for (key, hint) in hints {
            prompt.push_str(&format!("- {key}: {hint}\n"));
        }
    }
    prompt
}

/// Ask the LLM for a label→key mapping and apply the post-filters
/// from spec.md 4.3: only keys present in the provided set survive
/// (case-insensitive), cross-type-unsafe pairs are dropped, unmapped
/// labels are omitted.
async fn resolve_mapping(
    llm: &dyn LlmClient,
    url: &str,
    labels: &[String],
    keys: &[String],
    hints: &HashMap<String, String>,
    sensitive: bool,
) -> Result<HashMap<String, String>> {
    if labels.is_empty() || keys.is_empty() {
        return Ok(HashMap::new());
    }

    let request = ChatRequest {
        system: resolver_system_prompt(sensitive),
        user: build_user_prompt(url, labels, keys, hints),
        image_b64: None,
        json_mode: true,
    };
    let response = llm.complete(&request).await?;
    let raw_mapping = recover_json_object(&response.text)?;

    let raw_object = raw_mapping
        .as_object()
        .cloned()
        .unwrap_or_default();

    let key_lookup: HashMap<String, &String> =
        keys.iter().map(|k| (k.to_lowercase(), k)).collect();

    let mut mapping = HashMap::new();
    let mut dropped = 0usize;
    for (label, value) in raw_object {
        let Some(candidate_key_str) = value.as_str() else {
            continue;
        };
        let Some(&canonical_key) = key_lookup.get(&candidate_key_str.to_lowercase()) else {
            dropped += 1;
            continue;
        };
        if violates_cross_type_safety(&label, canonical_key) {
            tracing::warn!(label = %label, key = %canonical_key, "dropping cross-type-unsafe placeholder mapping");
            dropped += 1;
            continue;
        }
        mapping.insert(label, canonical_key.clone());
    }

    gf_domain::trace::TraceEvent::PlaceholderResolved {
        url: url.to_string(),
        label_count: labels.len(),
        mapped_count: mapping.len(),
        dropped_count: dropped,
    }
    .emit();

    Ok(mapping)
}

/// Per-session resolver for both secret and variable placeholders
/// (spec.md 4.3). Results are cached per URL for the session lifetime;
/// secret-level overrides dominate workspace-level on key collision is
/// honored by callers choosing which cache to consult first.
///
/// Holds two distinct things: the label→key cache (`secrets`/
/// `variables`, built by one-shot LLM calls per URL) used when a Type
/// step carries no value and only a label, and the actual key→value
/// maps (`secret_values`/`variable_values`, supplied by the caller from
/// the workspace's configured secrets/variables) used to turn a
/// resolved or literal `{{secret.KEY}}`/`{{var.KEY}}` token into the
/// concrete text the Step Executor types.
pub struct PlaceholderResolver {
    llm: Arc<dyn LlmClient>,
    secrets: PlaceholderCache,
    variables: PlaceholderCache,
    secret_values: HashMap<String, String>,
    variable_values: HashMap<String, String>,
}

impl PlaceholderResolver {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self::with_values(llm, HashMap::new(), HashMap::new())
    }

    pub fn with_values(
        llm: Arc<dyn LlmClient>,
        secret_values: HashMap<String, String>,
        variable_values: HashMap<String, String>,
    ) -> Self {
        Self {
            llm,
            secrets: PlaceholderCache::new(),
            variables: PlaceholderCache::new(),
            secret_values,
            variable_values,
        }
    }

    /// Looks up the concrete value bound to `key` in the matching
    /// workspace store (spec.md 3: "a `{{secret.KEY}}` or `{{var.KEY}}`
    /// token resolved to a concrete value at execute time").
    pub fn value_for(&self, key: &str, is_secret: bool) -> Option<String> {
        if is_secret {
            self.secret_values.get(key).cloned()
        } else {
            self.variable_values.get(key).cloned()
        }
    }

    pub async fn resolve_secrets(
        &self,
        url: &str,
        labels: &[String],
        keys: &[String],
        hints: &HashMap<String, String>,
    ) -> Result<()> {
        if self.secrets.has_url(url) {
            return Ok(());
        }
        let mapping = resolve_mapping(self.llm.as_ref(), url, labels, keys, hints, true).await?;
        self.secrets.put_url(url, mapping);
        Ok(())
    }

    pub async fn resolve_variables(
        &self,
        url: &str,
        labels: &[String],
        keys: &[String],
        hints: &HashMap<String, String>,
    ) -> Result<()> {
        if self.variables.has_url(url) {
            return Ok(());
        }
        let mapping = resolve_mapping(self.llm.as_ref(), url, labels, keys, hints, false).await?;
        self.variables.put_url(url, mapping);
        Ok(())
    }

    /// Secret-level overrides dominate workspace-level (variable) on
    /// key collision (spec.md 4.3).
    pub fn lookup(&self, url: &str, label: &str) -> Option<(String, bool)> {
        if let Some(key) = self.secrets.get(url, label) {
            return Some((key, true));
        }
        self.variables.get(url, label).map(|key| (key, false))
    }
}
