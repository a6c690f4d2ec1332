//! Unified error type definition

use serde::Serialize;
use thiserror::Error;

/// Core layer error type
#[derive(Error, Debug, Serialize)]
#[serde(tag = "code", content = "details")]
pub enum CoreError {
    /// Server not found in the server directory
    #[error("Server not found: {0}")]
    ServerNotFound(String),

    /// View not found in the registry
    #[error("View not found: {0}")]
    ViewNotFound(String),

    /// No live rendering surface for the view
    #[error("Surface not found for view: {0}")]
    SurfaceNotFound(String),

    /// Popout window not found
    #[error("Window not found for view: {0}")]
    WindowNotFound(String),

    /// The global open-view limit has been reached
    #[error("View limit reached ({limit})")]
    ViewLimitReached { limit: usize },

    /// Popout requests arrive faster than the configured rate limit
    #[error("Popout request rate limited")]
    RateLimited,

    /// A URL could not be parsed or resolved
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Native window host failure (window or surface creation)
    #[error("Native host error: {0}")]
    NativeHost(String),

    /// Validation error
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// The event loop is gone
    #[error("Orchestrator channel closed")]
    ChannelClosed,
}

impl CoreError {
    /// Whether it is expected behavior (user input, resource does not exist, etc.) is used for log classification.
    ///
    /// Level `warn` should be used when returning `true` and level `error` when returning `false`.
    /// **Please update this method simultaneously when new variants are added. **
    #[must_use]
    pub fn is_expected(&self) -> bool {
        match self {
            Self::ServerNotFound(_)
            | Self::ViewNotFound(_)
            | Self::SurfaceNotFound(_)
            | Self::WindowNotFound(_)
            | Self::ViewLimitReached { .. }
            | Self::RateLimited
            | Self::ValidationError(_) => true,
            Self::InvalidUrl(_) | Self::NativeHost(_) | Self::ChannelClosed => false,
        }
    }
}

impl From<url::ParseError> for CoreError {
    fn from(e: url::ParseError) -> Self {
        Self::InvalidUrl(e.to_string())
    }
}

/// Core layer Result type alias
pub type CoreResult<T> = std::result::Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limit_and_lookup_errors_are_expected() {
        assert!(CoreError::ViewLimitReached { limit: 15 }.is_expected());
        assert!(CoreError::ServerNotFound("s".to_string()).is_expected());
        assert!(!CoreError::NativeHost("boom".to_string()).is_expected());
    }

    #[test]
    fn serializes_with_code_tag() {
        let json = serde_json::to_value(CoreError::ViewLimitReached { limit: 3 }).unwrap();
        assert_eq!(json["code"], "ViewLimitReached");
        assert_eq!(json["details"]["limit"], 3);
    }
}
