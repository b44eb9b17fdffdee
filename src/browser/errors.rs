//! Browser error types

use thiserror::Error;

/// Browser-related errors
#[derive(Error, Debug)]
pub enum BrowserError {
    #[error("Failed to launch browser: {0}")]
    LaunchFailed(String),

    #[error("Navigation failed: {0}")]
    NavigationFailed(String),

    #[error("Blocked with status {0}")]
    Blocked(u16),

    #[error("JavaScript error: {0}")]
    JavaScriptError(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Element not found: {0}")]
    ElementNotFound(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl From<BrowserError> for String {
    fn from(err: BrowserError) -> String {
        err.to_string()
    }
}
