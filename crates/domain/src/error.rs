use serde::Serialize;

/// Classification of a Step Executor failure (spec.md 4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionErrorKind {
    NotFound,
    NotVisible,
    Timeout,
    TypeMismatch,
    NavigationFailed,
    Other,
}

impl std::fmt::Display for ExecutionErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ExecutionErrorKind::NotFound => "not_found",
            ExecutionErrorKind::NotVisible => "not_visible",
            ExecutionErrorKind::Timeout => "timeout",
            ExecutionErrorKind::TypeMismatch => "type_mismatch",
            ExecutionErrorKind::NavigationFailed => "navigation_failed",
            ExecutionErrorKind::Other => "other",
        };
        write!(f, "{s}")
    }
}

/// Crate-wide error type. Nothing propagates past a session boundary
/// (spec.md 7): the orchestrator always converts one of these into a
/// terminal event rather than letting it escape.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("http error: {0}")]
    Http(String),

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("planning error: {0}")]
    Planning(String),

    #[error("execution error ({kind}): {message}")]
    Execution {
        kind: ExecutionErrorKind,
        message: String,
    },

    #[error("placeholder error: {0}")]
    Placeholder(String),

    #[error("stuck: {0}")]
    Stuck(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;
