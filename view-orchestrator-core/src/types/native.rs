//! Types exchanged with the native window host

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identity of an embedded content surface as assigned by the host.
///
/// Inbound signals from web content are addressed by this id, never by `ViewId`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NativeContentId(pub u64);

impl fmt::Display for NativeContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "content#{}", self.0)
    }
}

/// Identity of a native window as assigned by the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WindowId(pub u64);

impl fmt::Display for WindowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "window#{}", self.0)
    }
}

/// Rectangle in window coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Bounds {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Bounds {
    #[must_use]
    pub const fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }
}

/// Options for a new top-level window
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WindowOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub x: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub y: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    pub title: String,
}

/// Options for a new embedded content surface
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SurfaceOptions {
    /// Extra `key=value` arguments handed to the content preload
    pub additional_arguments: Vec<String>,
    pub spellcheck: bool,
}

/// Failure reported by the host for a load request.
///
/// `code` uses the Chromium net error names (`ERR_CERT_AUTHORITY_INVALID`,
/// `ERR_ABORTED`, `ERR_CONNECTION_REFUSED`, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadError {
    pub code: String,
    pub description: String,
}

impl LoadError {
    #[must_use]
    pub fn new(code: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            description: description.into(),
        }
    }
}

impl fmt::Display for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.description.is_empty() {
            f.write_str(&self.code)
        } else {
            write!(f, "{} ({})", self.description, self.code)
        }
    }
}

/// Failure class of a load attempt; decides retry behavior
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadFailureClass {
    /// TLS/certificate problem; needs an external trust decision
    Certificate,
    /// Superseded by a newer navigation; not an error
    Aborted,
    /// Anything else; retried
    Transient,
}

impl LoadFailureClass {
    #[must_use]
    pub fn classify(error: &LoadError) -> Self {
        if error.code.starts_with("ERR_CERT") {
            Self::Certificate
        } else if error.code.starts_with("ERR_ABORTED") {
            Self::Aborted
        } else {
            Self::Transient
        }
    }
}
