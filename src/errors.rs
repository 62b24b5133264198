// SPDX-License-Identifier: MPL-2.0

//! Error types for the NV12 effect pipeline

use std::fmt;

/// Result type alias using FilterError
pub type FilterResult<T> = Result<T, FilterError>;

/// Errors surfaced by the frame filter and its render backends
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterError {
    /// Shader compile/link, pipeline or device creation failed.
    ///
    /// Fatal: the filter stays unusable until it is initialized again.
    ResourceCreation(String),
    /// The caller handed in something the pipeline cannot process
    /// (odd or zero dimensions, wrong buffer length, stale handle).
    ///
    /// Raised before any device call is issued.
    Precondition(String),
    /// A device call reported an error state.
    ///
    /// The current frame is left undefined; later frames may still succeed.
    DeviceState(String),
}

impl FilterError {
    /// Whether the error leaves the filter unusable until re-initialization
    pub fn is_fatal(&self) -> bool {
        matches!(self, FilterError::ResourceCreation(_))
    }
}

impl fmt::Display for FilterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterError::ResourceCreation(msg) => write!(f, "Resource creation failed: {}", msg),
            FilterError::Precondition(msg) => write!(f, "Precondition violated: {}", msg),
            FilterError::DeviceState(msg) => write!(f, "Device error: {}", msg),
        }
    }
}

impl std::error::Error for FilterError {}

/// Configuration loading errors
#[derive(Debug)]
pub enum ConfigError {
    /// Config file could not be read or written
    Io(std::io::Error),
    /// Config file contents are not valid
    Parse(serde_json::Error),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "Config I/O error: {}", e),
            ConfigError::Parse(e) => write!(f, "Config parse error: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io(e) => Some(e),
            ConfigError::Parse(e) => Some(e),
        }
    }
}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        ConfigError::Io(err)
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(err: serde_json::Error) -> Self {
        ConfigError::Parse(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_resource_creation_is_fatal() {
        assert!(FilterError::ResourceCreation("link".into()).is_fatal());
        assert!(!FilterError::Precondition("odd".into()).is_fatal());
        assert!(!FilterError::DeviceState("lost".into()).is_fatal());
    }

    #[test]
    fn test_display_includes_message() {
        let err = FilterError::Precondition("width 3 is odd".into());
        assert_eq!(err.to_string(), "Precondition violated: width 3 is odd");
    }
}
