//! View types

use std::fmt;

use serde::{Deserialize, Serialize};
use url::Url;
use uuid::Uuid;

use crate::error::CoreResult;
use crate::types::{Server, ServerId};
use crate::utils::url::{is_internal_url, join_path};

/// View identifier, generated at creation and stable for the view's lifetime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ViewId(Uuid);

impl ViewId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ViewId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ViewId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Where a view lives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ViewKind {
    /// Tab inside the shared main window
    Embedded,
    /// Standalone popout window
    Window,
}

/// Structured view title; channel and team arrive later from page titles
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewTitle {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub team_name: Option<String>,
    pub server_name: String,
}

impl ViewTitle {
    #[must_use]
    pub fn new(server_name: impl Into<String>) -> Self {
        Self {
            channel_name: None,
            team_name: None,
            server_name: server_name.into(),
        }
    }

    /// Present parts joined with `" - "`: channel, team, server.
    #[must_use]
    pub fn display(&self) -> String {
        [
            self.channel_name.as_deref(),
            self.team_name.as_deref(),
            Some(self.server_name.as_str()),
        ]
        .into_iter()
        .flatten()
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" - ")
    }
}

/// Logical, addressable unit of content
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct View {
    pub id: ViewId,
    pub server_id: ServerId,
    pub kind: ViewKind,
    pub title: ViewTitle,
    /// Path appended to the server URL on first load
    #[serde(skip_serializing_if = "Option::is_none")]
    pub initial_path: Option<String>,
    /// Embedded view this popout was opened from
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_view_id: Option<ViewId>,
}

impl View {
    pub(crate) fn new(
        server: &Server,
        kind: ViewKind,
        initial_path: Option<String>,
        parent_view_id: Option<ViewId>,
    ) -> Self {
        Self {
            id: ViewId::new(),
            server_id: server.id.clone(),
            kind,
            title: ViewTitle::new(server.name.clone()),
            initial_path,
            parent_view_id,
        }
    }

    /// URL to load for this view on `server`.
    ///
    /// Paths that resolve outside the server fall back to the server URL.
    pub fn loading_url(&self, server: &Server) -> CoreResult<Url> {
        let Some(path) = self.initial_path.as_deref().filter(|p| !p.is_empty()) else {
            return Ok(server
                .initial_load_url
                .clone()
                .unwrap_or_else(|| server.url.clone()));
        };

        let url = join_path(&server.url, path)?;
        if is_internal_url(&url, &server.url) {
            Ok(url)
        } else {
            log::debug!("Initial path {path:?} leaves server {}, using base URL", server.id);
            Ok(server.url.clone())
        }
    }
}
