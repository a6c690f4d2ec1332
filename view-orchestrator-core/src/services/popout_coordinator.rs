//! Popout coordinator: one native window per WINDOW-kind view
//!
//! Window lifecycle: `Creating` → `Showing` (first paint) → `Closed`.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use serde_json::json;
use tokio::time::Instant;

use crate::error::{CoreError, CoreResult};
use crate::services::{ServiceContext, SurfaceManager, ViewRegistry};
use crate::traits::NativeWindow;
use crate::types::{HostEvent, View, ViewEvent, ViewId, WindowId, WindowOptions};

/// Vertical offset of a new popout relative to the main window
pub const TAB_BAR_HEIGHT: i32 = 40;

/// Channel the parent surface is told about a closed popout on
const POPOUT_CLOSED: &str = "popout-closed";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PopoutState {
    Creating,
    Showing,
    Closed,
}

/// Native window owned by one WINDOW-kind view
pub struct PopoutWindow {
    view_id: ViewId,
    window: Arc<dyn NativeWindow>,
    state: PopoutState,
    /// Surface taken out of the content area to let the window show its error view
    surface_detached: bool,
}

impl PopoutWindow {
    pub fn view_id(&self) -> ViewId {
        self.view_id
    }

    pub fn window(&self) -> &Arc<dyn NativeWindow> {
        &self.window
    }

    pub fn state(&self) -> PopoutState {
        self.state
    }

    fn close(&mut self) {
        self.state = PopoutState::Closed;
        if self.window.is_alive() {
            self.window.close();
        }
    }
}

pub struct PopoutCoordinator {
    ctx: Arc<ServiceContext>,
    windows: HashMap<ViewId, PopoutWindow>,
    by_window: HashMap<WindowId, ViewId>,
    last_popout_at: Option<Instant>,
}

impl PopoutCoordinator {
    #[must_use]
    pub fn new(ctx: Arc<ServiceContext>) -> Self {
        Self {
            ctx,
            windows: HashMap::new(),
            by_window: HashMap::new(),
            last_popout_at: None,
        }
    }

    // ===== Window lifecycle =====

    /// Open a window for `view` and attach a fresh surface to it
    pub async fn create_window_for(
        &mut self,
        view: &View,
        surfaces: &mut SurfaceManager,
    ) -> CoreResult<Arc<dyn NativeWindow>> {
        let window = self.open_window(view).await?;
        match surfaces.attach(view, Arc::clone(&window)).await {
            Ok(surface) => {
                window.set_loading_screen(surface.needs_loading_screen());
                Ok(window)
            }
            Err(e) => {
                self.discard(view.id);
                Err(e)
            }
        }
    }

    /// Move the live surface of an EMBEDDED view into a new window of its own
    pub async fn promote(
        &mut self,
        view: &View,
        surfaces: &mut SurfaceManager,
    ) -> CoreResult<Arc<dyn NativeWindow>> {
        let Some(from) = surfaces.get(view.id).map(|s| Arc::clone(s.host_window())) else {
            return self.create_window_for(view, surfaces).await;
        };
        let window = self.open_window(view).await?;
        self.reparent(view.id, &from, &window, surfaces);
        if let Some(surface) = surfaces.get(view.id) {
            window.set_loading_screen(surface.needs_loading_screen());
        }
        Ok(window)
    }

    /// Move the surface back into `main_window` and close the popout window
    pub fn demote(
        &mut self,
        view_id: ViewId,
        main_window: &Arc<dyn NativeWindow>,
        surfaces: &mut SurfaceManager,
    ) -> bool {
        let Some(popout) = self.windows.get(&view_id) else {
            return false;
        };
        let from = Arc::clone(&popout.window);
        self.reparent(view_id, &from, main_window, surfaces);
        self.close_window(view_id);
        true
    }

    /// Move a live surface between two windows, preserving its state
    ///
    /// Refused when the surface is not currently hosted by `from`.
    pub fn reparent(
        &mut self,
        view_id: ViewId,
        from: &Arc<dyn NativeWindow>,
        to: &Arc<dyn NativeWindow>,
        surfaces: &mut SurfaceManager,
    ) -> bool {
        let hosted_by_from = surfaces
            .get(view_id)
            .is_some_and(|surface| surface.host_window().id() == from.id());
        if !hosted_by_from {
            log::debug!("View {view_id} is not hosted by {}, not reparenting", from.id());
            return false;
        }
        log::debug!("Reparenting view {view_id} from {} to {}", from.id(), to.id());
        surfaces.reparent(view_id, Arc::clone(to))
    }

    /// Tear down a WINDOW view's window: detach surface, close window, drop routes
    pub fn remove_view(&mut self, view_id: ViewId, surfaces: &mut SurfaceManager) -> bool {
        if !self.windows.contains_key(&view_id) {
            return false;
        }
        surfaces.detach(view_id);
        self.close_window(view_id);
        true
    }

    /// Close every popout window (shutdown)
    pub fn close_all(&mut self, surfaces: &mut SurfaceManager) {
        let ids: Vec<ViewId> = self.windows.keys().copied().collect();
        for view_id in ids {
            self.remove_view(view_id, surfaces);
        }
    }

    // ===== Content-initiated popouts =====

    /// Enforce the minimum gap between two content-initiated popouts
    pub fn check_rate_limit(&self) -> CoreResult<()> {
        let limit = self.ctx.config().popout_rate_limit;
        match self.last_popout_at {
            Some(last) if last.elapsed() < limit => Err(CoreError::RateLimited),
            _ => Ok(()),
        }
    }

    /// Start the rate limit window; only opened popouts count
    pub fn record_popout(&mut self) {
        self.last_popout_at = Some(Instant::now());
    }

    /// Bring an existing popout to the front
    pub fn show(&self, view_id: ViewId, surfaces: &SurfaceManager) -> bool {
        let Some(popout) = self.windows.get(&view_id) else {
            return false;
        };
        if popout.window.is_alive() {
            popout.window.show();
            surfaces.focus(view_id);
        }
        true
    }

    // ===== Event handling =====

    /// React to a window-level host notification
    ///
    /// Returns the view to remove when one of our windows was closed by the user.
    pub fn handle_host_event(
        &mut self,
        event: &HostEvent,
        surfaces: &SurfaceManager,
        registry: &ViewRegistry,
    ) -> Option<ViewId> {
        let window_id = match event {
            HostEvent::WindowReady { window_id }
            | HostEvent::WindowResized { window_id }
            | HostEvent::WindowFocused { window_id }
            | HostEvent::WindowClosed { window_id } => *window_id,
            _ => return None,
        };
        let view_id = *self.by_window.get(&window_id)?;
        let popout = self.windows.get_mut(&view_id)?;

        match event {
            HostEvent::WindowReady { .. } => {
                if popout.state == PopoutState::Creating {
                    popout.state = PopoutState::Showing;
                    if let Some(title) = registry.display_title(view_id) {
                        popout.window.set_title(&title);
                    }
                    popout.window.show();
                }
                None
            }
            HostEvent::WindowResized { .. } => {
                if let Some(surface) = surfaces.get(view_id) {
                    surface.set_bounds(popout.window.content_bounds());
                }
                None
            }
            HostEvent::WindowFocused { .. } => {
                surfaces.focus(view_id);
                None
            }
            HostEvent::WindowClosed { .. } => {
                if popout.state == PopoutState::Closed {
                    return None;
                }
                popout.state = PopoutState::Closed;
                log::info!("Popout window {window_id} closed, removing view {view_id}");
                if let Some(parent) = registry.get(view_id).and_then(|v| v.parent_view_id) {
                    surfaces.send(parent, POPOUT_CLOSED, json!({ "viewId": view_id }));
                }
                Some(view_id)
            }
            _ => None,
        }
    }

    /// Keep window chrome in sync with surface lifecycle signals
    pub fn handle_view_event(
        &mut self,
        event: &ViewEvent,
        surfaces: &SurfaceManager,
        registry: &ViewRegistry,
    ) {
        let Some(view_id) = event.view_id() else {
            return;
        };
        let Some(popout) = self.windows.get_mut(&view_id) else {
            return;
        };
        if !popout.window.is_alive() {
            return;
        }

        match event {
            ViewEvent::Ready { .. } => popout.window.set_loading_screen(false),
            ViewEvent::LoadFailed { .. } => {
                popout.window.set_loading_screen(false);
                if let Some(surface) = surfaces.get(view_id) {
                    popout.window.remove_surface(surface.content());
                    popout.surface_detached = true;
                }
            }
            ViewEvent::ReloadRequested { .. } => {
                if popout.surface_detached {
                    if let Some(surface) = surfaces.get(view_id) {
                        popout.window.add_surface(surface.content());
                        surface.set_bounds(popout.window.content_bounds());
                    }
                    popout.surface_detached = false;
                }
                popout.window.set_loading_screen(true);
            }
            ViewEvent::TitleUpdated { .. } => {
                if let Some(title) = registry.display_title(view_id) {
                    popout.window.set_title(&title);
                }
            }
            _ => {}
        }
    }

    // ===== Lookup =====

    pub fn get(&self, view_id: ViewId) -> Option<&PopoutWindow> {
        self.windows.get(&view_id)
    }

    pub fn state(&self, view_id: ViewId) -> Option<PopoutState> {
        self.windows.get(&view_id).map(PopoutWindow::state)
    }

    pub fn view_for_window(&self, window_id: WindowId) -> Option<ViewId> {
        self.by_window.get(&window_id).copied()
    }

    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }

    async fn open_window(&mut self, view: &View) -> CoreResult<Arc<dyn NativeWindow>> {
        if self.windows.contains_key(&view.id) {
            return Err(CoreError::ValidationError(format!(
                "View {} already has a window",
                view.id
            )));
        }

        let mut options = WindowOptions {
            title: view.title.display(),
            ..WindowOptions::default()
        };
        if let Some(main) = self.ctx.native_host.main_window().filter(|w| w.is_alive()) {
            let bounds = main.bounds();
            options.x = Some(bounds.x + TAB_BAR_HEIGHT);
            options.y = Some(bounds.y + TAB_BAR_HEIGHT);
            options.width = Some(bounds.width);
            options.height = Some(bounds.height);
        }

        let window = self
            .ctx
            .native_host
            .create_window(options)
            .await
            .inspect_err(|e| log::error!("Failed to create popout window for view {}: {e}", view.id))?;
        log::info!("Popout window {} created for view {}", window.id(), view.id);

        self.by_window.insert(window.id(), view.id);
        self.windows.insert(
            view.id,
            PopoutWindow {
                view_id: view.id,
                window: Arc::clone(&window),
                state: PopoutState::Creating,
                surface_detached: false,
            },
        );
        Ok(window)
    }

    fn close_window(&mut self, view_id: ViewId) {
        if let Some(mut popout) = self.windows.remove(&view_id) {
            popout.close();
            self.by_window.remove(&popout.window.id());
        }
    }

    /// Drop a window whose surface could not be attached
    fn discard(&mut self, view_id: ViewId) {
        self.close_window(view_id);
    }
}
