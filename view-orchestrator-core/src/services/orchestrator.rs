//! View orchestrator: composition root and event loop of the core
//!
//! The orchestrator owns the registry, the surface manager and the popout coordinator.
//! All mutation goes through `&mut self`; spawned work only reports back through the
//! dispatch channel, which `step`/`run` drain one event at a time.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::broadcast::{self, error::TryRecvError};
use tokio::sync::mpsc;
use url::Url;

use crate::error::{CoreError, CoreResult};
use crate::services::dispatch::{self, CoreEvent, DispatchHandle};
use crate::services::{PopoutCoordinator, ServiceContext, SurfaceManager, ViewRegistry};
use crate::traits::NativeWindow;
use crate::types::{
    HostEvent, InboundSignal, NativeContentId, Server, ServerId, View, ViewEvent, ViewId,
    ViewKind,
};

pub struct ViewOrchestrator {
    ctx: Arc<ServiceContext>,
    dispatch: DispatchHandle,
    inbox: mpsc::UnboundedReceiver<CoreEvent>,
    /// Own subscription to the bus, used to route surface signals to popouts
    routed: broadcast::Receiver<ViewEvent>,
    registry: ViewRegistry,
    surfaces: SurfaceManager,
    popouts: PopoutCoordinator,
}

impl ViewOrchestrator {
    #[must_use]
    pub fn new(ctx: Arc<ServiceContext>) -> Self {
        let (dispatch, inbox) = dispatch::channel();
        Self {
            routed: ctx.events.subscribe(),
            registry: ViewRegistry::new(Arc::clone(&ctx)),
            surfaces: SurfaceManager::new(Arc::clone(&ctx), dispatch.clone()),
            popouts: PopoutCoordinator::new(Arc::clone(&ctx)),
            ctx,
            dispatch,
            inbox,
        }
    }

    // ===== Accessors =====

    pub fn context(&self) -> &Arc<ServiceContext> {
        &self.ctx
    }

    /// Handle for the platform layer to deliver host events and content signals
    pub fn dispatch_handle(&self) -> DispatchHandle {
        self.dispatch.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ViewEvent> {
        self.ctx.events.subscribe()
    }

    pub fn registry(&self) -> &ViewRegistry {
        &self.registry
    }

    pub fn surfaces(&self) -> &SurfaceManager {
        &self.surfaces
    }

    pub fn popouts(&self) -> &PopoutCoordinator {
        &self.popouts
    }

    pub fn resolve_by_native_id(&self, native_id: NativeContentId) -> Option<&View> {
        self.surfaces
            .resolve_by_native_id(native_id)
            .and_then(|view_id| self.registry.get(view_id))
    }

    pub fn is_primary(&self, view_id: ViewId) -> bool {
        self.registry.is_primary(view_id)
    }

    // ===== View lifecycle =====

    /// Create a view and open it in the main window or in its own popout window
    pub async fn create_view(
        &mut self,
        server_id: &ServerId,
        kind: ViewKind,
        initial_path: Option<String>,
    ) -> CoreResult<ViewId> {
        let server = self.server(server_id).await?;
        let result = self.open_view(&server, kind, initial_path, None).await;
        self.route_events();
        result
    }

    /// Remove a view and release its surface (and window); `false` if unknown
    pub fn remove_view(&mut self, view_id: ViewId) -> bool {
        let removed = self.remove_view_inner(view_id);
        self.route_events();
        removed
    }

    /// Remove every view of a server in one transaction
    pub fn remove_server(&mut self, server_id: &ServerId) -> Vec<ViewId> {
        let ids: Vec<ViewId> = self.registry.order(server_id).to_vec();
        for view_id in &ids {
            self.release_surface(*view_id);
        }
        self.registry.remove_server_views(server_id);
        self.route_events();
        ids
    }

    pub fn set_primary(&mut self, view_id: ViewId) -> bool {
        let changed = self.registry.set_primary(view_id);
        self.route_events();
        changed
    }

    pub fn reorder(&mut self, server_id: &ServerId, new_order: &[ViewId]) -> Vec<ViewId> {
        self.registry.reorder(server_id, new_order)
    }

    /// Promote an EMBEDDED view to its own window, or demote a WINDOW view back
    pub async fn set_view_kind(&mut self, view_id: ViewId, kind: ViewKind) -> CoreResult<()> {
        let view = self
            .registry
            .get(view_id)
            .cloned()
            .ok_or_else(|| CoreError::ViewNotFound(view_id.to_string()))?;
        if view.kind == kind {
            return Ok(());
        }

        match kind {
            ViewKind::Window => {
                self.popouts.promote(&view, &mut self.surfaces).await?;
            }
            ViewKind::Embedded => {
                let main = self.main_window()?;
                if !self.popouts.demote(view_id, &main, &mut self.surfaces) {
                    return Err(CoreError::WindowNotFound(view_id.to_string()));
                }
            }
        }
        self.registry.set_kind(view_id, kind);
        self.route_events();
        Ok(())
    }

    // ===== Surface commands =====

    pub fn reload(&mut self, view_id: ViewId) -> CoreResult<()> {
        if !self.surfaces.reload(view_id, None) {
            return Err(CoreError::SurfaceNotFound(view_id.to_string()));
        }
        self.route_events();
        Ok(())
    }

    pub fn go_to_offset(&mut self, view_id: ViewId, offset: i32) -> CoreResult<()> {
        if !self.surfaces.go_to_offset(view_id, offset) {
            return Err(CoreError::SurfaceNotFound(view_id.to_string()));
        }
        self.route_events();
        Ok(())
    }

    /// Reload every live surface of a server against its current URL
    pub async fn server_url_changed(&mut self, server_id: &ServerId) -> CoreResult<usize> {
        let server = self.server(server_id).await?;
        let targets: Vec<(ViewId, Url)> = self
            .registry
            .views_for_server(server_id)
            .into_iter()
            .filter_map(|view| match view.loading_url(&server) {
                Ok(url) => Some((view.id, url)),
                Err(e) => {
                    log::warn!("Skipping reload of view {}: {e}", view.id);
                    None
                }
            })
            .collect();

        let reloaded = targets
            .into_iter()
            .filter(|(view_id, url)| self.surfaces.reload(*view_id, Some(url.clone())))
            .count();
        log::info!("Server {server_id} URL changed, reloaded {reloaded} views");
        self.route_events();
        Ok(reloaded)
    }

    /// Open `path` of the origin view's server in a popout
    ///
    /// An existing popout on the same path is shown instead of creating another.
    pub async fn open_popout(&mut self, origin: ViewId, path: &str) -> CoreResult<ViewId> {
        let server_id = self
            .registry
            .get(origin)
            .map(|view| view.server_id.clone())
            .ok_or_else(|| CoreError::ViewNotFound(origin.to_string()))?;

        if let Some(existing) = self.registry.find_window_view(&server_id, path) {
            self.popouts.show(existing, &self.surfaces);
            return Ok(existing);
        }

        self.popouts.check_rate_limit()?;
        let server = self.server(&server_id).await?;
        let result = self
            .open_view(&server, ViewKind::Window, Some(path.to_string()), Some(origin))
            .await;
        if result.is_ok() {
            self.popouts.record_popout();
        }
        self.route_events();
        result
    }

    /// Deliver a message to every live surface
    pub fn broadcast(&self, channel: &str, payload: &Value) -> usize {
        self.surfaces.broadcast(channel, payload)
    }

    // ===== Event loop =====

    /// Process one core event
    pub async fn handle_event(&mut self, event: CoreEvent) {
        match event {
            CoreEvent::Surface(event) => self.surfaces.handle_surface_event(event).await,
            CoreEvent::Host(event) => self.handle_host_event(event).await,
            CoreEvent::Inbound(InboundSignal::OpenPopout { content_id, path }) => {
                let Some(origin) = self.surfaces.resolve_by_native_id(content_id) else {
                    log::debug!("Dropping popout request from unknown content {content_id}");
                    return;
                };
                if let Err(e) = self.open_popout(origin, &path).await {
                    if e.is_expected() {
                        log::warn!("Popout request for {path} refused: {e}");
                    } else {
                        log::error!("Popout request for {path} failed: {e}");
                    }
                }
            }
            CoreEvent::Inbound(signal) => {
                self.surfaces.handle_inbound(signal, &mut self.registry).await;
            }
        }
        self.route_events();
    }

    /// Wait for and process the next event; `false` once the channel is closed
    pub async fn step(&mut self) -> bool {
        match self.inbox.recv().await {
            Some(event) => {
                self.handle_event(event).await;
                true
            }
            None => false,
        }
    }

    /// Wait for the next event without processing it
    pub async fn next_event(&mut self) -> Option<CoreEvent> {
        self.inbox.recv().await
    }

    /// Process events forever
    pub async fn run(&mut self) {
        while self.step().await {}
    }

    /// Release every surface and window
    pub fn shutdown(&mut self) {
        self.popouts.close_all(&mut self.surfaces);
        let detached = self.surfaces.detach_all();
        log::info!("Orchestrator shut down, {detached} surfaces released");
    }

    // ===== Internals =====

    async fn open_view(
        &mut self,
        server: &Server,
        kind: ViewKind,
        initial_path: Option<String>,
        parent: Option<ViewId>,
    ) -> CoreResult<ViewId> {
        let main = match kind {
            ViewKind::Embedded => Some(self.main_window()?),
            ViewKind::Window => None,
        };

        let view_id = self
            .registry
            .create_view(server, kind, initial_path, parent)
            .inspect_err(|e| log::warn!("Cannot create view for {}: {e}", server.id))?;
        let view = self
            .registry
            .get(view_id)
            .cloned()
            .ok_or_else(|| CoreError::ViewNotFound(view_id.to_string()))?;

        let opened = match main {
            Some(main) => self.surfaces.attach(&view, main).await.map(|_| ()),
            None => self
                .popouts
                .create_window_for(&view, &mut self.surfaces)
                .await
                .map(|_| ()),
        };
        if let Err(e) = opened {
            log::warn!("Rolling back view {view_id}: {e}");
            self.registry.remove_view(view_id);
            return Err(e);
        }
        Ok(view_id)
    }

    async fn handle_host_event(&mut self, event: HostEvent) {
        match event {
            HostEvent::WindowReady { .. }
            | HostEvent::WindowResized { .. }
            | HostEvent::WindowFocused { .. }
            | HostEvent::WindowClosed { .. } => {
                let closed =
                    self.popouts
                        .handle_host_event(&event, &self.surfaces, &self.registry);
                if let Some(view_id) = closed {
                    self.remove_view_inner(view_id);
                }
            }
            other => {
                self.surfaces
                    .handle_host_event(other, &mut self.registry)
                    .await;
            }
        }
    }

    fn remove_view_inner(&mut self, view_id: ViewId) -> bool {
        if !self.registry.contains(view_id) {
            return false;
        }
        self.release_surface(view_id);
        self.registry.remove_view(view_id).is_some()
    }

    fn release_surface(&mut self, view_id: ViewId) {
        if !self.popouts.remove_view(view_id, &mut self.surfaces) {
            self.surfaces.detach(view_id);
        }
    }

    /// Drain our own bus subscription and react to what components emitted
    fn route_events(&mut self) {
        loop {
            match self.routed.try_recv() {
                Ok(event) => self.route(&event),
                Err(TryRecvError::Lagged(skipped)) => {
                    log::warn!("Orchestrator lagged behind its own bus by {skipped} events");
                }
                Err(TryRecvError::Empty | TryRecvError::Closed) => break,
            }
        }
    }

    fn route(&mut self, event: &ViewEvent) {
        match event {
            ViewEvent::Ready { .. }
            | ViewEvent::LoadFailed { .. }
            | ViewEvent::ReloadRequested { .. }
            | ViewEvent::TitleUpdated { .. } => {
                self.popouts
                    .handle_view_event(event, &self.surfaces, &self.registry);
            }
            ViewEvent::LoginStateChanged {
                server_id,
                is_logged_in: false,
            } => {
                for view_id in self.registry.window_views_for_server(server_id) {
                    log::info!("Closing popout {view_id} after logout of {server_id}");
                    self.remove_view_inner(view_id);
                }
            }
            _ => {}
        }
    }

    async fn server(&self, server_id: &ServerId) -> CoreResult<Server> {
        self.ctx
            .server_directory
            .get_server(server_id)
            .await
            .ok_or_else(|| CoreError::ServerNotFound(server_id.to_string()))
    }

    fn main_window(&self) -> CoreResult<Arc<dyn NativeWindow>> {
        self.ctx
            .native_host
            .main_window()
            .filter(|window| window.is_alive())
            .ok_or_else(|| CoreError::WindowNotFound("main".to_string()))
    }
}

impl Drop for ViewOrchestrator {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::SurfaceStatus;
    use crate::test_utils::{create_test_context, drain_events, test_server, TestContext};
    use crate::types::{LoadError, OrchestratorConfig};
    use serde_json::json;
    use std::time::Duration;

    async fn orchestrator() -> (ViewOrchestrator, TestContext) {
        let test = create_test_context(OrchestratorConfig::default());
        test.directory.upsert(test_server("s1")).await;
        (ViewOrchestrator::new(Arc::clone(&test.ctx)), test)
    }

    async fn steps(orch: &mut ViewOrchestrator, n: usize) {
        for _ in 0..n {
            assert!(orch.step().await);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn embedded_view_loads_into_main_window_and_becomes_ready() {
        let (mut orch, test) = orchestrator().await;
        let view_id = orch
            .create_view(&ServerId::from("s1"), ViewKind::Embedded, None)
            .await
            .unwrap();
        assert!(orch.is_primary(view_id));
        assert_eq!(test.host.main().surface_ids().len(), 1);

        // load finished, ready timeout
        steps(&mut orch, 2).await;
        assert_eq!(orch.surfaces().get(view_id).unwrap().status(), SurfaceStatus::Ready);
    }

    #[tokio::test(start_paused = true)]
    async fn embedded_surface_failure_rolls_back_the_view() {
        let test = create_test_context(OrchestratorConfig {
            view_limit: 1,
            ..OrchestratorConfig::default()
        });
        test.directory.upsert(test_server("s1")).await;
        let mut orch = ViewOrchestrator::new(Arc::clone(&test.ctx));
        let server_id = ServerId::from("s1");

        test.host.fail_surface_creation(true);
        let err = orch
            .create_view(&server_id, ViewKind::Embedded, None)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::NativeHost(_)));
        assert!(orch.registry().is_empty());
        assert!(orch.surfaces().is_empty());
        assert_eq!(orch.registry().primary_for(&server_id), None);

        // The slot is free again
        test.host.fail_surface_creation(false);
        let view_id = orch
            .create_view(&server_id, ViewKind::Embedded, None)
            .await
            .unwrap();
        assert!(orch.is_primary(view_id));
        assert!(orch.reload(view_id).is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn failed_popout_does_not_start_rate_limit() {
        let (mut orch, test) = orchestrator().await;
        let origin = orch
            .create_view(&ServerId::from("s1"), ViewKind::Embedded, None)
            .await
            .unwrap();

        test.host.fail_window_creation(true);
        assert!(matches!(
            orch.open_popout(origin, "/team/pl/abc").await,
            Err(CoreError::NativeHost(_))
        ));
        assert_eq!(orch.registry().len(), 1);

        test.host.fail_window_creation(false);
        let popout = orch.open_popout(origin, "/team/pl/abc").await.unwrap();
        assert_eq!(orch.registry().get(popout).unwrap().parent_view_id, Some(origin));
    }

    #[tokio::test]
    async fn create_view_for_unknown_server_fails() {
        let (mut orch, _test) = orchestrator().await;
        let err = orch
            .create_view(&ServerId::from("nope"), ViewKind::Embedded, None)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::ServerNotFound(_)));
        assert!(orch.registry().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn reload_cancels_pending_retry() {
        let (mut orch, test) = orchestrator().await;
        test.host
            .push_load_results([Err(LoadError::new("ERR_CONNECTION_RESET", "reset"))]);
        let view_id = orch
            .create_view(&ServerId::from("s1"), ViewKind::Embedded, None)
            .await
            .unwrap();
        steps(&mut orch, 1).await;
        assert_eq!(orch.surfaces().get(view_id).unwrap().retry_policy().remaining, 2);

        orch.reload(view_id).unwrap();
        // Only the reload's load result and ready timeout arrive; the retry timer is gone
        steps(&mut orch, 2).await;
        let surface = orch.surfaces().get(view_id).unwrap();
        assert_eq!(surface.status(), SurfaceStatus::Ready);
        assert!(!surface.has_pending_work());
        assert_eq!(test.host.last_surface().loaded_urls().len(), 2);

        let waited = tokio::time::timeout(Duration::from_secs(3600), orch.next_event()).await;
        assert!(waited.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn content_popout_request_dedupes_and_rate_limits() {
        let (mut orch, test) = orchestrator().await;
        let origin = orch
            .create_view(&ServerId::from("s1"), ViewKind::Embedded, None)
            .await
            .unwrap();
        let content_id = test.host.last_surface().native_id_value();

        orch.handle_event(CoreEvent::Inbound(InboundSignal::OpenPopout {
            content_id,
            path: "/team/pl/abc".into(),
        }))
        .await;
        let popout = orch
            .registry()
            .find_window_view(&ServerId::from("s1"), "/team/pl/abc")
            .unwrap();
        assert_eq!(orch.registry().get(popout).unwrap().parent_view_id, Some(origin));

        // Same path: existing window is reused
        assert_eq!(orch.open_popout(origin, "/team/pl/abc").await.unwrap(), popout);
        // Different path inside the rate limit window
        assert!(matches!(
            orch.open_popout(origin, "/team/pl/def").await,
            Err(CoreError::RateLimited)
        ));
        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(orch.open_popout(origin, "/team/pl/def").await.is_ok());
        assert_eq!(orch.popouts().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn logout_closes_server_popouts() {
        let (mut orch, test) = orchestrator().await;
        let tab = orch
            .create_view(&ServerId::from("s1"), ViewKind::Embedded, None)
            .await
            .unwrap();
        let content_id = test.host.last_surface().native_id_value();
        let popout = orch
            .create_view(&ServerId::from("s1"), ViewKind::Window, Some("/x".into()))
            .await
            .unwrap();
        let window = test.host.last_window();

        orch.handle_event(CoreEvent::Inbound(InboundSignal::LoginStateChanged {
            content_id,
            is_logged_in: false,
        }))
        .await;

        assert!(!orch.registry().contains(popout));
        assert!(orch.registry().contains(tab));
        assert_eq!(window.close_count(), 1);
        assert!(orch.popouts().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn remove_server_releases_everything() {
        let (mut orch, test) = orchestrator().await;
        let mut events = orch.subscribe();
        orch.create_view(&ServerId::from("s1"), ViewKind::Embedded, None)
            .await
            .unwrap();
        orch.create_view(&ServerId::from("s1"), ViewKind::Window, Some("/x".into()))
            .await
            .unwrap();
        drain_events(&mut events);

        let removed = orch.remove_server(&ServerId::from("s1"));
        assert_eq!(removed.len(), 2);
        assert!(orch.surfaces().is_empty());
        assert!(orch.popouts().is_empty());
        assert_eq!(test.host.closed_surface_count(), 2);
        assert_eq!(
            drain_events(&mut events),
            vec![ViewEvent::ServerViewsRemoved {
                server_id: ServerId::from("s1"),
                view_ids: removed
            }]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn server_url_change_reloads_against_new_url() {
        let (mut orch, test) = orchestrator().await;
        let view_id = orch
            .create_view(&ServerId::from("s1"), ViewKind::Embedded, None)
            .await
            .unwrap();
        steps(&mut orch, 2).await;

        let mut moved = test_server("s1");
        moved.url = Url::parse("https://chat.example.org/").unwrap();
        test.directory.upsert(moved).await;

        assert_eq!(orch.server_url_changed(&ServerId::from("s1")).await.unwrap(), 1);
        assert_eq!(
            orch.surfaces().get(view_id).unwrap().status(),
            SurfaceStatus::Loading
        );
        assert_eq!(
            orch.surfaces().get(view_id).unwrap().last_url().unwrap().as_str(),
            "https://chat.example.org/"
        );

        steps(&mut orch, 1).await;
        assert_eq!(
            test.host.last_surface().loaded_urls().last().unwrap().as_str(),
            "https://chat.example.org/"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn failed_history_navigation_reloads() {
        let (mut orch, test) = orchestrator().await;
        let mut events = orch.subscribe();
        let view_id = orch
            .create_view(&ServerId::from("s1"), ViewKind::Embedded, None)
            .await
            .unwrap();
        steps(&mut orch, 2).await;
        drain_events(&mut events);

        test.host.last_surface().fail_history("no entry");
        orch.go_to_offset(view_id, -1).unwrap();

        assert!(drain_events(&mut events).contains(&ViewEvent::ReloadRequested { view_id }));
        assert_eq!(
            orch.surfaces().get(view_id).unwrap().status(),
            SurfaceStatus::Loading
        );
        assert_eq!(orch.broadcast("ping", &json!(1)), 1);
    }
}
