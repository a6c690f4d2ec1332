//! Native window host capability Traits
//!
//! Every handle exposes an explicit `is_alive()`/`close()` pair: the host may
//! invalidate a handle at any time, so the core checks liveness before use.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use url::Url;

use crate::error::CoreResult;
use crate::types::{
    Bounds, LoadError, NativeContentId, SurfaceOptions, WindowId, WindowOptions,
};

/// Embeddable content surface (one web page)
#[async_trait]
pub trait ContentSurface: Send + Sync {
    /// Host-assigned identity; inbound content signals are keyed by it
    fn native_id(&self) -> NativeContentId;

    /// Navigate to `url`, resolving once the page finished or failed loading
    async fn load(&self, url: &Url) -> Result<(), LoadError>;

    /// URL currently displayed
    fn current_url(&self) -> Option<Url>;

    fn focus(&self);

    fn bounds(&self) -> Bounds;

    fn set_bounds(&self, bounds: Bounds);

    /// Deliver a message to the page
    fn send(&self, channel: &str, payload: Value);

    /// Move through the navigation history
    fn go_to_offset(&self, offset: i32) -> Result<(), String>;

    fn is_alive(&self) -> bool;

    /// Release the native surface; further calls are no-ops
    fn close(&self);
}

/// Top-level native window
pub trait NativeWindow: Send + Sync {
    fn id(&self) -> WindowId;

    /// Area available to embedded surfaces
    fn content_bounds(&self) -> Bounds;

    /// Outer window rectangle
    fn bounds(&self) -> Bounds;

    /// Put `surface` into this window's content area
    fn add_surface(&self, surface: &dyn ContentSurface);

    /// Take `surface` out of this window's content area without closing it
    fn remove_surface(&self, surface: &dyn ContentSurface);

    fn set_title(&self, title: &str);

    fn show(&self);

    fn is_focused(&self) -> bool;

    /// Toggle the window's own loading indicator
    fn set_loading_screen(&self, visible: bool);

    fn is_alive(&self) -> bool;

    fn close(&self);
}

/// Window/surface factory provided by the platform layer
///
/// Platform implementation pushes `HostEvent`s for the handles it creates through
/// the orchestrator's `DispatchHandle`.
#[async_trait]
pub trait NativeHost: Send + Sync {
    /// The shared main window, if it exists
    fn main_window(&self) -> Option<Arc<dyn NativeWindow>>;

    /// Create a new top-level window
    async fn create_window(&self, options: WindowOptions) -> CoreResult<Arc<dyn NativeWindow>>;

    /// Create an embeddable content surface (not yet attached to any window)
    fn create_content_surface(&self, options: &SurfaceOptions)
        -> CoreResult<Arc<dyn ContentSurface>>;
}
