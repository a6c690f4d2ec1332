//! Signals crossing the core boundary
//!
//! - `ViewEvent`: outbound, published on the `EventBus`
//! - `InboundSignal`: from web content, addressed by `NativeContentId`
//! - `HostEvent`: from the native window host

use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

use crate::types::{NativeContentId, ServerId, ViewId, ViewKind, WindowId};

/// Outbound signal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ViewEvent {
    ViewCreated {
        view_id: ViewId,
        server_id: ServerId,
        kind: ViewKind,
    },
    ViewRemoved {
        view_id: ViewId,
        server_id: ServerId,
    },
    /// All views of a server removed in one transaction
    ServerViewsRemoved {
        server_id: ServerId,
        view_ids: Vec<ViewId>,
    },
    ViewKindChanged {
        view_id: ViewId,
        kind: ViewKind,
    },
    /// `view_id` is `None` once the server has no views left
    PrimaryChanged {
        server_id: ServerId,
        view_id: Option<ViewId>,
    },
    LoadSuccess {
        view_id: ViewId,
    },
    LoadRetry {
        view_id: ViewId,
        /// Epoch milliseconds of the next attempt, for countdown display
        next_attempt_ms: i64,
        error: String,
    },
    LoadFailed {
        view_id: ViewId,
        error: String,
        /// Remote protocol below the supported minimum
        incompatible: bool,
    },
    Ready {
        view_id: ViewId,
    },
    ReloadRequested {
        view_id: ViewId,
    },
    TitleUpdated {
        view_id: ViewId,
        channel_name: Option<String>,
        team_name: Option<String>,
    },
    TargetUrlChanged {
        view_id: ViewId,
        url: Option<Url>,
    },
    ServerUnreadsChanged {
        server_id: ServerId,
        is_unread: bool,
        mention_count: u32,
    },
    LoginStateChanged {
        server_id: ServerId,
        is_logged_in: bool,
    },
    SessionExpired {
        server_id: ServerId,
        is_expired: bool,
    },
}

impl ViewEvent {
    /// View this event is about, if any
    #[must_use]
    pub fn view_id(&self) -> Option<ViewId> {
        match self {
            Self::ViewCreated { view_id, .. }
            | Self::ViewRemoved { view_id, .. }
            | Self::ViewKindChanged { view_id, .. }
            | Self::LoadSuccess { view_id }
            | Self::LoadRetry { view_id, .. }
            | Self::LoadFailed { view_id, .. }
            | Self::Ready { view_id }
            | Self::ReloadRequested { view_id }
            | Self::TitleUpdated { view_id, .. }
            | Self::TargetUrlChanged { view_id, .. } => Some(*view_id),
            Self::PrimaryChanged { view_id, .. } => *view_id,
            Self::ServerViewsRemoved { .. }
            | Self::ServerUnreadsChanged { .. }
            | Self::LoginStateChanged { .. }
            | Self::SessionExpired { .. } => None,
        }
    }
}

/// Signal sent by embedded web content
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum InboundSignal {
    ApplicationReady {
        content_id: NativeContentId,
    },
    LoginStateChanged {
        content_id: NativeContentId,
        is_logged_in: bool,
    },
    UnreadMentionsChanged {
        content_id: NativeContentId,
        is_unread: bool,
        mention_count: u32,
    },
    SessionExpired {
        content_id: NativeContentId,
        is_expired: bool,
    },
    /// A popout forwards a message to the view it was opened from
    SendToParent {
        content_id: NativeContentId,
        channel: String,
        payload: Value,
    },
    /// A parent forwards a message to one of its popouts
    SendToPopout {
        view_id: ViewId,
        channel: String,
        payload: Value,
    },
    /// Content asks for `path` of its own server in a standalone window
    OpenPopout {
        content_id: NativeContentId,
        path: String,
    },
}

/// Notification raised by the native window host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum HostEvent {
    PageTitleChanged {
        content_id: NativeContentId,
        title: String,
    },
    NavigationTargetChanged {
        content_id: NativeContentId,
        url: String,
    },
    SurfaceFocused {
        content_id: NativeContentId,
    },
    SurfaceBlurred {
        content_id: NativeContentId,
    },
    /// First paint of a window's own chrome
    WindowReady {
        window_id: WindowId,
    },
    WindowResized {
        window_id: WindowId,
    },
    WindowFocused {
        window_id: WindowId,
    },
    WindowClosed {
        window_id: WindowId,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outbound_events_are_tagged() {
        let view_id = ViewId::new();
        let json = serde_json::to_value(ViewEvent::Ready { view_id }).unwrap();
        assert_eq!(json["type"], "ready");
        assert_eq!(
            ViewEvent::LoadFailed {
                view_id,
                error: "x".to_string(),
                incompatible: false
            }
            .view_id(),
            Some(view_id)
        );
    }

    #[test]
    fn inbound_signal_from_json() {
        let signal: InboundSignal = serde_json::from_str(
            r#"{"type":"unread-mentions-changed","content_id":7,"is_unread":true,"mention_count":2}"#,
        )
        .unwrap();
        assert_eq!(
            signal,
            InboundSignal::UnreadMentionsChanged {
                content_id: NativeContentId(7),
                is_unread: true,
                mention_count: 2
            }
        );
    }
}
