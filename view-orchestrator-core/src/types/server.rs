//! Server-side types: the externally owned server record and its remote info

use std::fmt;

use serde::{Deserialize, Serialize};
use url::Url;

/// Lowest server version whose web app speaks the desktop protocol we expect.
pub const MIN_SERVER_VERSION: &str = "9.4.0";

/// Server identifier (owned by the server directory, opaque to the core)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServerId(String);

impl ServerId {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ServerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ServerId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// A configured server as seen by the core
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Server {
    /// Server ID
    pub id: ServerId,
    /// Display name
    pub name: String,
    /// Base URL
    pub url: Url,
    /// URL to use for the first load when no initial path is given
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial_load_url: Option<Url>,
    /// Whether the web app reported a logged-in session
    #[serde(default)]
    pub is_logged_in: bool,
}

impl Server {
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>, url: Url) -> Self {
        Self {
            id: ServerId::new(id),
            name: name.into(),
            url,
            initial_load_url: None,
            is_logged_in: false,
        }
    }
}

/// Information reported by the remote server about itself
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteInfo {
    /// Server version string (semver)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_version: Option<String>,
    /// Site name, appended by the web app to page titles
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub site_name: Option<String>,
}

impl RemoteInfo {
    /// Whether the remote speaks a supported protocol version.
    ///
    /// An unknown or unparseable version is treated as compatible.
    #[must_use]
    pub fn is_compatible(&self) -> bool {
        let Some(raw) = self.server_version.as_deref() else {
            return true;
        };
        let Ok(minimum) = semver::Version::parse(MIN_SERVER_VERSION) else {
            return true;
        };
        match semver::Version::parse(raw.trim()) {
            Ok(version) => version >= minimum,
            Err(e) => {
                log::warn!("Unparseable server version {raw:?}, assuming compatible: {e}");
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(version: Option<&str>) -> RemoteInfo {
        RemoteInfo {
            server_version: version.map(str::to_string),
            site_name: None,
        }
    }

    #[test]
    fn unknown_version_is_compatible() {
        assert!(info(None).is_compatible());
        assert!(info(Some("not-a-version")).is_compatible());
    }

    #[test]
    fn version_threshold() {
        assert!(info(Some("9.4.0")).is_compatible());
        assert!(info(Some("10.1.2")).is_compatible());
        assert!(!info(Some("9.3.9")).is_compatible());
        assert!(!info(Some("5.37.0")).is_compatible());
    }

    #[test]
    fn server_deserializes_from_camel_case() {
        let server: Server = serde_json::from_str(
            r#"{"id":"s1","name":"Work","url":"https://chat.example.com/","isLoggedIn":true}"#,
        )
        .unwrap();
        assert_eq!(server.id.as_str(), "s1");
        assert!(server.is_logged_in);
        assert!(server.initial_load_url.is_none());
    }
}
