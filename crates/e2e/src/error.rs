//! Error types for E2E testing

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum E2eError {
    #[error("Navigation to {url} failed: {reason}")]
    Navigation { url: String, reason: String },

    #[error("Element not found: {selector} (waited {waited_ms} ms)")]
    ElementNotFound { selector: String, waited_ms: u64 },

    #[error("Ambiguous selector: {selector} matched {count} elements, expected exactly one")]
    AmbiguousSelector { selector: String, count: usize },

    #[error("Element not interactable: {selector} is {state}")]
    ElementNotInteractable { selector: String, state: String },

    #[error("Assertion failed on {selector}: expected {expected}, got {actual}")]
    AssertionFailure {
        selector: String,
        expected: String,
        actual: String,
    },

    #[error("Timeout waiting for {what} after {waited_ms} ms")]
    Timeout { what: String, waited_ms: u64 },

    #[error("Browser error: {0}")]
    Browser(String),

    #[error("Server failed to start: {0}")]
    ServerStartup(String),

    #[error("Server health check failed after {0} attempts")]
    ServerHealthCheck(usize),

    #[error("Scenario spec error: {0}")]
    SpecParse(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

pub type E2eResult<T> = Result<T, E2eError>;

/// Report category of a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NavigationError,
    ElementNotFound,
    AmbiguousSelector,
    ElementNotInteractable,
    AssertionFailure,
    TimeoutError,
    /// Anything that is not a property of the page: browser crash, IO, bad spec.
    Infrastructure,
}

impl E2eError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            E2eError::Navigation { .. } => ErrorKind::NavigationError,
            E2eError::ElementNotFound { .. } => ErrorKind::ElementNotFound,
            E2eError::AmbiguousSelector { .. } => ErrorKind::AmbiguousSelector,
            E2eError::ElementNotInteractable { .. } => ErrorKind::ElementNotInteractable,
            E2eError::AssertionFailure { .. } => ErrorKind::AssertionFailure,
            E2eError::Timeout { .. } => ErrorKind::TimeoutError,
            _ => ErrorKind::Infrastructure,
        }
    }

    pub(crate) fn browser(err: impl std::fmt::Display) -> Self {
        E2eError::Browser(err.to_string())
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorKind::NavigationError => "NavigationError",
            ErrorKind::ElementNotFound => "ElementNotFound",
            ErrorKind::AmbiguousSelector => "AmbiguousSelector",
            ErrorKind::ElementNotInteractable => "ElementNotInteractable",
            ErrorKind::AssertionFailure => "AssertionFailure",
            ErrorKind::TimeoutError => "TimeoutError",
            ErrorKind::Infrastructure => "Infrastructure",
        };
        f.write_str(name)
    }
}
