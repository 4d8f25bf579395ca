use std::sync::Arc;
use std::time::{Duration, Instant};

use gf_browser::driver::{BrowserDriver, ElementHandle};
use gf_domain::config::QuiescenceConfig;
use gf_domain::error::{Error, ExecutionErrorKind, Result};
use gf_domain::planning::UiChange;
use gf_domain::step::Step;

use crate::resolver::PlaceholderResolver;

/// Result of executing one step against the browser (spec.md 4.5).
pub struct ExecutionOutcome {
    pub success: bool,
    pub duration: Duration,
    pub screenshot: Option<Vec<u8>>,
    pub dom_snapshot: Option<String>,
    pub ui_change: UiChange,
}

/// Labels that heuristically signal navigation on Click, used as a
/// fallback when pre/post URLs are equal (spec.md 4.5).
const NAVIGATION_LABEL_HINTS: &[&str] = &["login", "submit", "continue", "next", "save", "create"];

fn heuristic_click_navigation(label: &str, post_url: &str) -> bool {
    let lower = label.to_lowercase();
    let label_hints = NAVIGATION_LABEL_HINTS.iter().any(|hint| lower.contains(hint));
    let url_has_query_or_hash = post_url.contains('?') || post_url.contains('#');
    label_hints || url_has_query_or_hash
}

/// Resolves placeholders, invokes the Browser Driver, waits for
/// quiescence, captures artifacts, and classifies errors (spec.md
/// 4.5). Does not persist artifacts to disk itself — it returns raw
/// bytes/strings for the orchestrator to hand to the Artifact Store.
pub struct StepExecutor {
    driver: Arc<dyn BrowserDriver>,
    quiescence: QuiescenceConfig,
}

impl StepExecutor {
    pub fn new(driver: Arc<dyn BrowserDriver>, quiescence: QuiescenceConfig) -> Self {
        Self { driver, quiescence }
    }

    /// Resolve a Type step's effective value: a literal placeholder
    /// token in `value`, a bare value, or (if absent) the Placeholder
    /// Resolver's cached mapping for `label` at `url` (spec.md 4.3).
    fn resolve_type_value(
        &self,
        url: &str,
        label: &str,
        value: &Option<String>,
        resolver: &PlaceholderResolver,
    ) -> Result<(String, bool)> {
        let token_key = value.as_ref().and_then(|raw| {
            raw.strip_prefix("{{secret.")
                .and_then(|s| s.strip_suffix("}}"))
                .map(|key| (key, true))
                .or_else(|| {
                    raw.strip_prefix("{{var.")
                        .and_then(|s| s.strip_suffix("}}"))
                        .map(|key| (key, false))
                })
        });

        match (value, token_key) {
            (_, Some((key, sensitive))) => resolver
                .value_for(key, sensitive)
                .map(|resolved| (resolved, sensitive))
                .ok_or_else(|| Error::Placeholder(format!("unknown key '{key}' for label '{label}'"))),
            (Some(raw), None) => Ok((raw.clone(), false)),
            (None, None) => {
                let (key, is_secret) = resolver
                    .lookup(url, label)
                    .ok_or_else(|| Error::Placeholder(format!("no placeholder mapping for label '{label}'")))?;
                resolver
                    .value_for(&key, is_secret)
                    .map(|resolved| (resolved, is_secret))
                    .ok_or_else(|| Error::Placeholder(format!("no value bound for resolved key '{key}'")))
            }
        }
    }

    pub async fn execute(
        &self,
        step: &Step,
        resolver: &PlaceholderResolver,
    ) -> Result<ExecutionOutcome> {
        let started = Instant::now();
        let pre_url = self.driver.current_url().await.unwrap_or_default();

        let result = self.dispatch(step, &pre_url, resolver).await;

        match result {
            Ok(mut outcome) => {
                outcome.duration = started.elapsed();
                Ok(outcome)
            }
            Err(e) => Err(e),
        }
    }

    async fn dispatch(
        &self,
        step: &Step,
        pre_url: &str,
        resolver: &PlaceholderResolver,
    ) -> Result<ExecutionOutcome> {
        match step {
            Step::Goto { url } => {
                self.driver.navigate(url).await.map_err(classify)?;
                self.wait_settled().await?;
                self.finish(pre_url, true).await
            }
            Step::Click { label } => {
                let handle = self.locate(label).await?;
                self.driver.click(&handle).await.map_err(classify)?;
                self.wait_settled().await?;
                // Extra short settle for dropdown overlays (spec.md 4.5).
                tokio::time::sleep(Duration::from_millis(self.quiescence.dom_quiescence_quiet_ms)).await;
                let mut outcome = self.finish(pre_url, false).await?;
                if !outcome.ui_change.navigation_occurred {
                    let post_url = self.driver.current_url().await.unwrap_or_default();
                    outcome.ui_change.navigation_occurred =
                        heuristic_click_navigation(label, &post_url);
                }
                Ok(outcome)
            }
            Step::Type { label, value, .. } => {
                let (resolved_value, _) = self.resolve_type_value(pre_url, label, value, resolver)?;
                let handle = self.locate(label).await?;
                self.driver
                    .type_text(&handle, &resolved_value)
                    .await
                    .map_err(|e| reclassify(e, ExecutionErrorKind::TypeMismatch))?;
                self.finish(pre_url, false).await
            }
            Step::AssertPage { url } => {
                let current = self.driver.current_url().await.map_err(classify)?;
                if &current != url {
                    return Err(Error::Execution {
                        kind: ExecutionErrorKind::NavigationFailed,
                        message: format!("expected page {url}, found {current}"),
                    });
                }
                self.finish(pre_url, false).await
            }
            Step::Keypress { key } => {
                self.driver.press_key(key).await.map_err(classify)?;
                self.finish(pre_url, false).await
            }
            Step::TtsStart { .. } | Step::TtsWait { .. } => {
                // Narration markers never touch the driver.
                Ok(ExecutionOutcome {
                    success: true,
                    duration: Duration::default(),
                    screenshot: None,
                    dom_snapshot: None,
                    ui_change: UiChange {
                        navigation_occurred: false,
                        elements_appeared: 0,
                        elements_disappeared: 0,
                    },
                })
            }
        }
    }

    async fn locate(&self, label: &str) -> Result<ElementHandle> {
        self.driver.locate_by_label(label).await
    }

    async fn wait_settled(&self) -> Result<()> {
        self.driver.wait_quiescence(&self.quiescence).await
    }

    /// Navigation detection: pre/post URL mismatch (spec.md 4.5).
    /// Captures the post-step screenshot/DOM for the next iteration's
    /// validation context.
    async fn finish(&self, pre_url: &str, is_goto: bool) -> Result<ExecutionOutcome> {
        let post_url = self.driver.current_url().await.unwrap_or_default();
        let navigation_occurred = is_goto || pre_url != post_url;

        let screenshot = self.driver.screenshot().await.ok();
        let dom_snapshot = self.driver.dom_snapshot().await.ok();

        Ok(ExecutionOutcome {
            success: true,
            duration: Duration::default(),
            screenshot,
            dom_snapshot,
            ui_change: UiChange {
                navigation_occurred,
                elements_appeared: 0,
                elements_disappeared: 0,
            },
        })
    }
}

fn classify(e: Error) -> Error {
    match e {
        Error::Execution { .. } => e,
        Error::Timeout(msg) => Error::Execution { kind: ExecutionErrorKind::Timeout, message: msg },
        other => Error::Execution { kind: ExecutionErrorKind::Other, message: other.to_string() },
    }
}

fn reclassify(e: Error, kind: ExecutionErrorKind) -> Error {
    match e {
        Error::Execution { kind: ExecutionErrorKind::NotFound, message } => {
            Error::Execution { kind: ExecutionErrorKind::NotFound, message }
        }
        Error::Execution { .. } => e,
        other => Error::Execution { kind, message: other.to_string() },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gf_browser::fake::FakeBrowserDriver;
    use gf_llm::openai_compat::StaticLlmClient;
    use std::sync::Arc;

    fn resolver_with(mapping: &[(&str, &str)]) -> PlaceholderResolver {
        let json = serde_json::to_string(
            &mapping.iter().cloned().collect::<std::collections::HashMap<_, _>>(),
        )
        .unwrap();
        let llm = Arc::new(StaticLlmClient::new(json));
        PlaceholderResolver::new(llm)
    }

    fn resolver_with_values(
        mapping: &[(&str, &str)],
        variable_values: &[(&str, &str)],
        secret_values: &[(&str, &str)],
    ) -> PlaceholderResolver {
        let json = serde_json::to_string(
            &mapping.iter().cloned().collect::<std::collections::HashMap<_, _>>(),
        )
        .unwrap();
        let llm = Arc::new(StaticLlmClient::new(json));
        PlaceholderResolver::with_values(
            llm,
            secret_values.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
            variable_values.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
        )
    }

    #[tokio::test]
    async fn goto_always_reports_navigation() {
        let driver = FakeBrowserDriver::new("https://example.com", vec![]);
        let executor = StepExecutor::new(Arc::new(driver), QuiescenceConfig::default());
        let resolver = resolver_with(&[]);
        let outcome = executor
            .execute(&Step::Goto { url: "https://example.com/next".into() }, &resolver)
            .await
            .unwrap();
        assert!(outcome.success);
        assert!(outcome.ui_change.navigation_occurred);
    }

    #[tokio::test]
    async fn click_heuristic_detects_navigation_by_label() {
        let driver = FakeBrowserDriver::new("https://example.com", vec!["Login".into()]);
        let executor = StepExecutor::new(Arc::new(driver), QuiescenceConfig::default());
        let resolver = resolver_with(&[]);
        let outcome = executor
            .execute(&Step::Click { label: "Login".into() }, &resolver)
            .await
            .unwrap();
        assert!(outcome.ui_change.navigation_occurred);
    }

    #[tokio::test]
    async fn click_on_unknown_label_is_not_found() {
        let driver = FakeBrowserDriver::new("https://example.com", vec![]);
        let executor = StepExecutor::new(Arc::new(driver), QuiescenceConfig::default());
        let resolver = resolver_with(&[]);
        let err = executor
            .execute(&Step::Click { label: "Ghost".into() }, &resolver)
            .await
            .unwrap_err();
        match err {
            Error::Execution { kind: ExecutionErrorKind::NotFound, .. } => {}
            other => panic!("expected NotFound, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn assert_page_fails_on_url_mismatch() {
        let driver = FakeBrowserDriver::new("https://example.com/home", vec![]);
        let executor = StepExecutor::new(Arc::new(driver), QuiescenceConfig::default());
        let resolver = resolver_with(&[]);
        let err = executor
            .execute(&Step::AssertPage { url: "https://example.com/dashboard".into() }, &resolver)
            .await
            .unwrap_err();
        match err {
            Error::Execution { kind: ExecutionErrorKind::NavigationFailed, .. } => {}
            other => panic!("expected NavigationFailed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn type_step_resolves_bare_value() {
        let driver = Arc::new(FakeBrowserDriver::new("https://example.com", vec!["Username".into()]));
        let executor = StepExecutor::new(driver.clone(), QuiescenceConfig::default());
        let resolver = resolver_with(&[]);
        executor
            .execute(
                &Step::Type { label: "Username".into(), value: Some("alice".into()), sensitive: false },
                &resolver,
            )
            .await
            .unwrap();
        assert_eq!(driver.typed_value("Username"), Some("alice".to_string()));
    }

    #[tokio::test]
    async fn type_step_without_value_uses_resolver_cache() {
        let driver = Arc::new(FakeBrowserDriver::new("https://example.com", vec!["Username".into()]));
        let executor = StepExecutor::new(driver.clone(), QuiescenceConfig::default());
        let resolver = resolver_with_values(&[("Username", "ADMIN_USERNAME")], &[("ADMIN_USERNAME", "alice")], &[]);
        resolver
            .resolve_variables("https://example.com", &["Username".into()], &["ADMIN_USERNAME".into()], &Default::default())
            .await
            .unwrap();
        executor
            .execute(&Step::Type { label: "Username".into(), value: None, sensitive: false }, &resolver)
            .await
            .unwrap();
        assert_eq!(driver.typed_value("Username"), Some("alice".to_string()));
    }

    #[tokio::test]
    async fn type_step_resolves_literal_secret_token() {
        let driver = Arc::new(FakeBrowserDriver::new("https://example.com", vec!["Password".into()]));
        let executor = StepExecutor::new(driver.clone(), QuiescenceConfig::default());
        let resolver = resolver_with_values(&[], &[], &[("ADMIN_PASSWORD", "hunter2")]);
        executor
            .execute(
                &Step::Type {
                    label: "Password".into(),
                    value: Some("{{secret.ADMIN_PASSWORD}}".into()),
                    sensitive: true,
                },
                &resolver,
            )
            .await
            .unwrap();
        assert_eq!(driver.typed_value("Password"), Some("hunter2".to_string()));
    }

    #[tokio::test]
    async fn type_step_with_unknown_literal_token_is_placeholder_error() {
        let driver = FakeBrowserDriver::new("https://example.com", vec!["Password".into()]);
        let executor = StepExecutor::new(Arc::new(driver), QuiescenceConfig::default());
        let resolver = resolver_with_values(&[], &[], &[]);
        let err = executor
            .execute(
                &Step::Type {
                    label: "Password".into(),
                    value: Some("{{secret.ADMIN_PASSWORD}}".into()),
                    sensitive: true,
                },
                &resolver,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Placeholder(_)));
    }

    #[tokio::test]
    async fn type_step_without_value_and_no_mapping_is_placeholder_error() {
        let driver = FakeBrowserDriver::new("https://example.com", vec!["Username".into()]);
        let executor = StepExecutor::new(Arc::new(driver), QuiescenceConfig::default());
        let resolver = resolver_with(&[]);
        let err = executor
            .execute(&Step::Type { label: "Username".into(), value: None, sensitive: false }, &resolver)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Placeholder(_)));
    }
}
