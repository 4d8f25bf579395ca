use serde::{Deserialize, Serialize};

fn d_30() -> u32 {
    30
}
fn d_6() -> usize {
    6
}
fn d_1000() -> u64 {
    1000
}
fn d_2() -> u32 {
    2
}
fn d_1024() -> usize {
    1024
}
fn d_350() -> u64 {
    350
}
fn d_1200() -> u64 {
    1200
}
fn d_60() -> u64 {
    60
}
fn d_800() -> u32 {
    800
}
fn d_600() -> u32 {
    600
}
fn d_82() -> u8 {
    82
}
fn d_lang() -> String {
    "en".into()
}
fn d_tail_interval_ms() -> u64 {
    100
}
fn d_tail_appear_timeout_ms() -> u64 {
    10_000
}
fn d_strategy() -> SecretsStrategy {
    SecretsStrategy::Hybrid
}

/// Orchestrator Loop knobs (spec.md 6, 4.6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    #[serde(default = "d_30")]
    pub max_steps_per_session: u32,
    #[serde(default = "d_6")]
    pub loop_detection_window: usize,
    #[serde(default = "d_1000")]
    pub iteration_pause_ms: u64,
    #[serde(default = "d_2")]
    pub max_refines_per_step: u32,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_steps_per_session: d_30(),
            loop_detection_window: d_6(),
            iteration_pause_ms: d_1000(),
            max_refines_per_step: d_2(),
        }
    }
}

/// Step Executor DOM-quiescence knobs (spec.md 4.5, 6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuiescenceConfig {
    #[serde(default = "d_350")]
    pub dom_quiescence_quiet_ms: u64,
    #[serde(default = "d_1200")]
    pub dom_quiescence_cap_ms: u64,
    #[serde(default = "d_60")]
    pub page_load_timeout_s: u64,
}

impl Default for QuiescenceConfig {
    fn default() -> Self {
        Self {
            dom_quiescence_quiet_ms: d_350(),
            dom_quiescence_cap_ms: d_1200(),
            page_load_timeout_s: d_60(),
        }
    }
}

/// Event Log Mirror knobs (spec.md 4.2, 5, 6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventLogConfig {
    #[serde(default = "d_1024")]
    pub event_buffer_size: usize,
    #[serde(default = "d_tail_interval_ms")]
    pub tail_poll_interval_ms: u64,
    #[serde(default = "d_tail_appear_timeout_ms")]
    pub tail_appear_timeout_ms: u64,
}

impl Default for EventLogConfig {
    fn default() -> Self {
        Self {
            event_buffer_size: d_1024(),
            tail_poll_interval_ms: d_tail_interval_ms(),
            tail_appear_timeout_ms: d_tail_appear_timeout_ms(),
        }
    }
}

/// Screenshot compression knobs for the LLM Planner (spec.md 4.4, 6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageConfig {
    #[serde(default = "d_800")]
    pub image_max_width: u32,
    #[serde(default = "d_600")]
    pub image_max_height: u32,
    #[serde(default = "d_82")]
    pub image_quality: u8,
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            image_max_width: d_800(),
            image_max_height: d_600(),
            image_quality: d_82(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecretsStrategy {
    Hybrid,
    Heuristic,
}

/// Placeholder Resolver + workspace language knobs (spec.md 4.3, 6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaceholderConfig {
    #[serde(default = "d_strategy")]
    pub secrets_strategy: SecretsStrategy,
}

impl Default for PlaceholderConfig {
    fn default() -> Self {
        Self {
            secrets_strategy: d_strategy(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceConfig {
    #[serde(default = "d_lang")]
    pub language: String,
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self { language: d_lang() }
    }
}

/// Top-level config, composed of nested `#[serde(default)]` sub-configs.
/// Mirrors the teacher's `sa_domain::config::Config` composition pattern.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
    #[serde(default)]
    pub quiescence: QuiescenceConfig,
    #[serde(default)]
    pub event_log: EventLogConfig,
    #[serde(default)]
    pub image: ImageConfig,
    #[serde(default)]
    pub placeholder: PlaceholderConfig,
    #[serde(default)]
    pub workspace: WorkspaceConfig,
}

impl Config {
    /// Load from a YAML config file, falling back to defaults for any
    /// field or section the file omits.
    pub fn load(path: &std::path::Path) -> crate::error::Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let cfg: Config = serde_yaml::from_str(&raw)
            .map_err(|e| crate::error::Error::Config(format!("parsing {}: {e}", path.display())))?;
        Ok(cfg)
    }
}
