//! Surface manager: views ↔ rendering surfaces, plus cross-cutting signal routing

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{json, Value};
use url::Url;

use crate::error::{CoreError, CoreResult};
use crate::services::dispatch::{DispatchHandle, SurfaceEvent, SurfaceTask};
use crate::services::{RenderingSurface, ServiceContext, ViewRegistry};
use crate::traits::NativeWindow;
use crate::types::{
    HostEvent, InboundSignal, NativeContentId, ServerId, SurfaceOptions, View, ViewEvent, ViewId,
};
use crate::utils::url::is_internal_url;

/// Channel a parent surface receives popout messages on
pub const MESSAGE_FROM_POPOUT: &str = "message-from-popout";
/// Channel a popout surface receives parent messages on
pub const MESSAGE_FROM_PARENT: &str = "message-from-parent";

/// Owns every live rendering surface
///
/// Surfaces are indexed by view id and by native content id; both entries are always
/// inserted and removed together.
pub struct SurfaceManager {
    ctx: Arc<ServiceContext>,
    dispatch: DispatchHandle,
    surfaces: HashMap<ViewId, RenderingSurface>,
    by_native_id: HashMap<NativeContentId, ViewId>,
    next_instance: u64,
    focused: Option<ViewId>,
}

impl SurfaceManager {
    #[must_use]
    pub fn new(ctx: Arc<ServiceContext>, dispatch: DispatchHandle) -> Self {
        Self {
            ctx,
            dispatch,
            surfaces: HashMap::new(),
            by_native_id: HashMap::new(),
            next_instance: 0,
            focused: None,
        }
    }

    // ===== Lifecycle =====

    /// Create a surface for `view` inside `window` and start loading it
    ///
    /// Fails (and logs) when the server is gone, its URL cannot be resolved or the host
    /// cannot create the surface. An existing surface for the same view is destroyed first.
    pub async fn attach(
        &mut self,
        view: &View,
        window: Arc<dyn NativeWindow>,
    ) -> CoreResult<&RenderingSurface> {
        let Some(server) = self.ctx.server_directory.get_server(&view.server_id).await else {
            log::warn!(
                "Cannot attach view {}: server {} no longer exists",
                view.id,
                view.server_id
            );
            return Err(CoreError::ServerNotFound(view.server_id.to_string()));
        };
        let url = view
            .loading_url(&server)
            .inspect_err(|e| log::error!("Cannot resolve URL for view {}: {e}", view.id))?;

        self.detach(view.id);

        let content = self
            .ctx
            .native_host
            .create_content_surface(&SurfaceOptions::default())
            .inspect_err(|e| {
                log::error!("Failed to create content surface for view {}: {e}", view.id);
            })?;
        window.add_surface(content.as_ref());
        if window.is_alive() {
            content.set_bounds(window.content_bounds());
        }

        self.next_instance += 1;
        let mut surface = RenderingSurface::new(
            view,
            self.next_instance,
            content,
            window,
            &self.ctx.config(),
            self.dispatch.clone(),
        );
        surface.load(url);

        self.by_native_id.insert(surface.native_id(), view.id);
        self.surfaces.insert(view.id, surface);
        self.surfaces
            .get(&view.id)
            .ok_or_else(|| CoreError::SurfaceNotFound(view.id.to_string()))
    }

    /// Destroy the surface of `view_id`; `false` if there was none
    pub fn detach(&mut self, view_id: ViewId) -> bool {
        let Some(mut surface) = self.surfaces.remove(&view_id) else {
            return false;
        };
        self.by_native_id.remove(&surface.native_id());
        if self.focused == Some(view_id) {
            self.focused = None;
        }
        surface.destroy();
        true
    }

    /// Destroy every surface
    pub fn detach_all(&mut self) -> usize {
        let ids: Vec<ViewId> = self.surfaces.keys().copied().collect();
        ids.into_iter().filter(|id| self.detach(*id)).count()
    }

    // ===== Lookup =====

    pub fn get(&self, view_id: ViewId) -> Option<&RenderingSurface> {
        self.surfaces.get(&view_id)
    }

    pub fn contains(&self, view_id: ViewId) -> bool {
        self.surfaces.contains_key(&view_id)
    }

    /// View whose surface has the given native identity
    pub fn resolve_by_native_id(&self, native_id: NativeContentId) -> Option<ViewId> {
        self.by_native_id.get(&native_id).copied()
    }

    /// Last surface the host reported focused
    pub fn focused_view(&self) -> Option<ViewId> {
        self.focused
    }

    pub fn view_ids(&self) -> Vec<ViewId> {
        self.surfaces.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.surfaces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.surfaces.is_empty()
    }

    // ===== Commands =====

    /// Explicit reload; `None` reloads the last URL
    pub fn reload(&mut self, view_id: ViewId, url: Option<Url>) -> bool {
        self.with_surface(view_id, |surface| surface.reload(url))
    }

    pub fn go_to_offset(&mut self, view_id: ViewId, offset: i32) -> bool {
        self.with_surface(view_id, |surface| surface.go_to_offset(offset))
    }

    /// Move a live surface to `window` without recreating it
    pub fn reparent(&mut self, view_id: ViewId, window: Arc<dyn NativeWindow>) -> bool {
        self.with_surface(view_id, |surface| surface.set_host_window(window))
    }

    pub fn focus(&self, view_id: ViewId) {
        if let Some(surface) = self.surfaces.get(&view_id) {
            surface.focus();
        }
    }

    /// Message one surface; `false` if it is missing or dead
    pub fn send(&self, view_id: ViewId, channel: &str, payload: Value) -> bool {
        self.surfaces
            .get(&view_id)
            .is_some_and(|surface| surface.send(channel, payload))
    }

    /// Deliver a message to every live surface, skipping torn-down ones
    pub fn broadcast(&self, channel: &str, payload: &Value) -> usize {
        self.surfaces
            .values()
            .filter(|surface| surface.send(channel, payload.clone()))
            .count()
    }

    // ===== Event handling =====

    /// Feed a completed load, timer or probe back into its surface
    pub async fn handle_surface_event(&mut self, event: SurfaceEvent) {
        let SurfaceEvent {
            view_id,
            ticket,
            task,
        } = event;
        let Some(surface) = self.surfaces.get(&view_id) else {
            log::debug!("Dropping surface event for removed view {view_id}");
            return;
        };
        if !surface.accepts(ticket) {
            log::debug!("Dropping stale surface event for view {view_id}");
            return;
        }
        let server_id = surface.server_id().clone();

        match task {
            SurfaceTask::LoadFinished { url, result } => {
                let remote = if result.is_ok() {
                    self.ctx.server_directory.get_remote_info(&server_id).await
                } else {
                    None
                };
                self.with_surface(view_id, |surface| {
                    surface.on_load_finished(url, result, remote.as_ref());
                });
            }
            SurfaceTask::RetryDue { url } => {
                self.with_surface(view_id, |surface| surface.on_retry_due(url));
            }
            SurfaceTask::ProbeDue { url } => {
                let server = self.ctx.server_directory.get_server(&server_id).await;
                let probe = Arc::clone(&self.ctx.server_probe);
                self.with_surface(view_id, |surface| surface.on_probe_due(url, server, probe));
            }
            SurfaceTask::ProbeFinished { url, result } => {
                self.with_surface(view_id, |surface| surface.on_probe_finished(url, result));
            }
            SurfaceTask::ReadyTimeout => {
                self.with_surface(view_id, RenderingSurface::on_ready_timeout);
            }
        }
    }

    /// Act on a signal from web content
    ///
    /// `OpenPopout` needs the popout coordinator and is not handled here.
    pub async fn handle_inbound(&mut self, signal: InboundSignal, registry: &mut ViewRegistry) {
        match signal {
            InboundSignal::ApplicationReady { content_id } => {
                let Some(view_id) = self.resolve_or_log(content_id) else {
                    return;
                };
                self.with_surface(view_id, |surface| {
                    surface.on_app_ready();
                });
            }
            InboundSignal::LoginStateChanged {
                content_id,
                is_logged_in,
            } => {
                if let Some(server_id) = self.server_of(content_id) {
                    self.set_login_state(&server_id, is_logged_in, registry).await;
                }
            }
            InboundSignal::SessionExpired {
                content_id,
                is_expired,
            } => {
                let Some(server_id) = self.server_of(content_id) else {
                    return;
                };
                self.ctx.emit(ViewEvent::SessionExpired {
                    server_id: server_id.clone(),
                    is_expired,
                });
                if is_expired {
                    self.set_login_state(&server_id, false, registry).await;
                }
            }
            InboundSignal::UnreadMentionsChanged {
                content_id,
                is_unread,
                mention_count,
            } => {
                let Some(view_id) = self.resolve_or_log(content_id) else {
                    return;
                };
                if !registry.is_primary(view_id) {
                    log::trace!("Ignoring unreads from secondary view {view_id}");
                    return;
                }
                let Some(view) = registry.get(view_id) else {
                    return;
                };
                self.ctx.emit(ViewEvent::ServerUnreadsChanged {
                    server_id: view.server_id.clone(),
                    is_unread,
                    mention_count,
                });
            }
            InboundSignal::SendToParent {
                content_id,
                channel,
                payload,
            } => {
                let Some(view_id) = self.resolve_or_log(content_id) else {
                    return;
                };
                let Some(parent) = registry.get(view_id).and_then(|view| view.parent_view_id)
                else {
                    log::debug!("View {view_id} has no parent to message");
                    return;
                };
                let message = json!({ "viewId": view_id, "channel": channel, "payload": payload });
                if !self.send(parent, MESSAGE_FROM_POPOUT, message) {
                    log::debug!("Parent view {parent} of {view_id} is gone");
                }
            }
            InboundSignal::SendToPopout {
                view_id,
                channel,
                payload,
            } => {
                let message = json!({ "channel": channel, "payload": payload });
                if !self.send(view_id, MESSAGE_FROM_PARENT, message) {
                    log::debug!("Popout {view_id} is gone, dropping message");
                }
            }
            InboundSignal::OpenPopout { content_id, .. } => {
                log::debug!("Popout request from {content_id} must go through the orchestrator");
            }
        }
    }

    /// Act on a surface-level host notification; window events are ignored here
    pub async fn handle_host_event(&mut self, event: HostEvent, registry: &mut ViewRegistry) {
        match event {
            HostEvent::PageTitleChanged { content_id, title } => {
                let Some(view_id) = self.resolve_or_log(content_id) else {
                    return;
                };
                let Some(surface) = self.surfaces.get(&view_id) else {
                    return;
                };
                let server_id = surface.server_id().clone();
                let logged_in = self
                    .ctx
                    .server_directory
                    .get_server(&server_id)
                    .await
                    .is_some_and(|server| server.is_logged_in);
                let remote = self.ctx.server_directory.get_remote_info(&server_id).await;

                let parsed = self
                    .surfaces
                    .get(&view_id)
                    .and_then(|surface| surface.on_page_title(&title, remote.as_ref(), logged_in));
                if let Some(parsed) = parsed {
                    registry.update_title(view_id, Some(parsed.channel_name), parsed.team_name);
                }
            }
            HostEvent::NavigationTargetChanged { content_id, url } => {
                let Some(view_id) = self.resolve_or_log(content_id) else {
                    return;
                };
                let Some(server_id) = self.surfaces.get(&view_id).map(|s| s.server_id().clone())
                else {
                    return;
                };
                let server = self.ctx.server_directory.get_server(&server_id).await;
                let target = Url::parse(&url).ok().filter(|target| {
                    server
                        .as_ref()
                        .is_none_or(|server| !is_internal_url(target, &server.url))
                });
                self.ctx.emit(ViewEvent::TargetUrlChanged {
                    view_id,
                    url: target,
                });
            }
            HostEvent::SurfaceFocused { content_id } => {
                self.focused = self.resolve_by_native_id(content_id);
            }
            HostEvent::SurfaceBlurred { content_id } => {
                if self.focused.is_some() && self.focused == self.resolve_by_native_id(content_id) {
                    self.focused = None;
                }
            }
            HostEvent::WindowReady { .. }
            | HostEvent::WindowResized { .. }
            | HostEvent::WindowFocused { .. }
            | HostEvent::WindowClosed { .. } => {}
        }
    }

    async fn set_login_state(
        &mut self,
        server_id: &ServerId,
        is_logged_in: bool,
        registry: &mut ViewRegistry,
    ) {
        self.ctx
            .server_directory
            .set_logged_in(server_id, is_logged_in)
            .await;
        if !is_logged_in {
            if let Some(primary) = registry.primary_for(server_id) {
                registry.update_title(primary, None, None);
            }
        }
        log::info!("Server {server_id} logged in: {is_logged_in}");
        self.ctx.emit(ViewEvent::LoginStateChanged {
            server_id: server_id.clone(),
            is_logged_in,
        });
    }

    fn resolve_or_log(&self, content_id: NativeContentId) -> Option<ViewId> {
        let view_id = self.resolve_by_native_id(content_id);
        if view_id.is_none() {
            log::debug!("Dropping signal from unknown content {content_id}");
        }
        view_id
    }

    fn server_of(&self, content_id: NativeContentId) -> Option<ServerId> {
        let view_id = self.resolve_or_log(content_id)?;
        self.surfaces
            .get(&view_id)
            .map(|surface| surface.server_id().clone())
    }

    /// Run `f` on a surface and publish whatever it emitted
    fn with_surface<F>(&mut self, view_id: ViewId, f: F) -> bool
    where
        F: FnOnce(&mut RenderingSurface),
    {
        let Some(surface) = self.surfaces.get_mut(&view_id) else {
            return false;
        };
        f(surface);
        for event in surface.take_events() {
            self.ctx.emit(event);
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::dispatch::{self, CoreEvent};
    use crate::services::SurfaceStatus;
    use crate::test_utils::{create_test_context, drain_events, test_server, TestContext};
    use crate::traits::ServerDirectory;
    use crate::types::{LoadError, OrchestratorConfig, RemoteInfo, ViewKind};
    use tokio::sync::mpsc::UnboundedReceiver;

    struct Fixture {
        test: TestContext,
        manager: SurfaceManager,
        registry: ViewRegistry,
        rx: UnboundedReceiver<CoreEvent>,
    }

    impl Fixture {
        async fn new() -> Self {
            let test = create_test_context(OrchestratorConfig::default());
            test.directory.upsert(test_server("s1")).await;
            let (handle, rx) = dispatch::channel();
            Self {
                manager: SurfaceManager::new(Arc::clone(&test.ctx), handle),
                registry: ViewRegistry::new(Arc::clone(&test.ctx)),
                test,
                rx,
            }
        }

        async fn open(&mut self) -> ViewId {
            let server = test_server("s1");
            let view_id = self
                .registry
                .create_view(&server, ViewKind::Embedded, None, None)
                .unwrap();
            let view = self.registry.get(view_id).unwrap().clone();
            let window = self.test.host.main_window_handle();
            assert!(self.manager.attach(&view, window).await.is_ok());
            view_id
        }

        /// Process exactly one queued core event
        async fn step(&mut self) {
            match self.rx.recv().await.unwrap() {
                CoreEvent::Surface(event) => self.manager.handle_surface_event(event).await,
                other => panic!("unexpected event {other:?}"),
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn attach_indexes_by_native_id() {
        let mut fx = Fixture::new().await;
        let view_id = fx.open().await;
        let surface = fx.test.host.last_surface();
        assert_eq!(fx.manager.resolve_by_native_id(surface.native_id_value()), Some(view_id));

        // The load runs on its own task and reports back once finished
        fx.step().await;
        assert_eq!(surface.loaded_urls(), vec![Url::parse("https://s1.example.com/").unwrap()]);
        assert_eq!(fx.test.host.main().surface_ids(), vec![surface.native_id_value()]);

        assert!(fx.manager.detach(view_id));
        assert!(!fx.manager.detach(view_id));
        assert_eq!(fx.manager.resolve_by_native_id(surface.native_id_value()), None);
        assert!(surface.is_closed());
        assert!(fx.test.host.main().surface_ids().is_empty());
    }

    #[tokio::test]
    async fn attach_for_missing_server_fails() {
        let mut fx = Fixture::new().await;
        let ghost = test_server("ghost");
        let view_id = fx
            .registry
            .create_view(&ghost, ViewKind::Embedded, None, None)
            .unwrap();
        let view = fx.registry.get(view_id).unwrap().clone();

        let window = fx.test.host.main_window_handle();
        let result = fx.manager.attach(&view, window).await;
        assert!(matches!(result, Err(CoreError::ServerNotFound(_))));
        assert!(fx.manager.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn application_ready_resolves_through_native_id() {
        let mut fx = Fixture::new().await;
        let view_id = fx.open().await;
        fx.step().await;
        assert_eq!(
            fx.manager.get(view_id).unwrap().status(),
            SurfaceStatus::WaitingForAppSignal
        );

        let content_id = fx.test.host.last_surface().native_id_value();
        fx.manager
            .handle_inbound(InboundSignal::ApplicationReady { content_id }, &mut fx.registry)
            .await;
        assert_eq!(fx.manager.get(view_id).unwrap().status(), SurfaceStatus::Ready);

        // Unknown content is dropped silently
        fx.manager
            .handle_inbound(
                InboundSignal::ApplicationReady {
                    content_id: NativeContentId(9999),
                },
                &mut fx.registry,
            )
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn only_primary_forwards_unreads() {
        let mut fx = Fixture::new().await;
        let mut events = fx.test.ctx.events.subscribe();
        let _primary = fx.open().await;
        let primary_content = fx.test.host.last_surface().native_id_value();
        let _secondary = fx.open().await;
        let secondary_content = fx.test.host.last_surface().native_id_value();
        drain_events(&mut events);

        for content_id in [secondary_content, primary_content] {
            fx.manager
                .handle_inbound(
                    InboundSignal::UnreadMentionsChanged {
                        content_id,
                        is_unread: true,
                        mention_count: 2,
                    },
                    &mut fx.registry,
                )
                .await;
        }

        assert_eq!(
            drain_events(&mut events),
            vec![ViewEvent::ServerUnreadsChanged {
                server_id: ServerId::from("s1"),
                is_unread: true,
                mention_count: 2
            }]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn page_title_applies_only_when_logged_in() {
        let mut fx = Fixture::new().await;
        fx.test
            .directory
            .set_remote_info(
                &ServerId::from("s1"),
                RemoteInfo {
                    server_version: Some("10.0.0".into()),
                    site_name: Some("Acme Chat".into()),
                },
            )
            .await;
        let view_id = fx.open().await;
        let content_id = fx.test.host.last_surface().native_id_value();
        let title = HostEvent::PageTitleChanged {
            content_id,
            title: "(3) Town Square - Engineering Acme Chat".into(),
        };

        fx.manager.handle_host_event(title.clone(), &mut fx.registry).await;
        assert_eq!(fx.registry.get(view_id).unwrap().title.channel_name, None);

        fx.manager
            .handle_inbound(
                InboundSignal::LoginStateChanged {
                    content_id,
                    is_logged_in: true,
                },
                &mut fx.registry,
            )
            .await;
        fx.manager.handle_host_event(title, &mut fx.registry).await;
        let view = fx.registry.get(view_id).unwrap();
        assert_eq!(view.title.channel_name.as_deref(), Some("Town Square"));
        assert_eq!(view.title.team_name.as_deref(), Some("Engineering"));

        // Logging out clears the primary's title
        fx.manager
            .handle_inbound(
                InboundSignal::SessionExpired {
                    content_id,
                    is_expired: true,
                },
                &mut fx.registry,
            )
            .await;
        assert_eq!(fx.registry.get(view_id).unwrap().title.channel_name, None);
        let server = fx.test.directory.get_server(&ServerId::from("s1")).await.unwrap();
        assert!(!server.is_logged_in);
    }

    #[tokio::test(start_paused = true)]
    async fn navigation_target_hides_internal_urls() {
        let mut fx = Fixture::new().await;
        let mut events = fx.test.ctx.events.subscribe();
        let view_id = fx.open().await;
        let content_id = fx.test.host.last_surface().native_id_value();
        drain_events(&mut events);

        for url in ["https://s1.example.com/team/channels/x", "https://elsewhere.org/a"] {
            fx.manager
                .handle_host_event(
                    HostEvent::NavigationTargetChanged {
                        content_id,
                        url: url.into(),
                    },
                    &mut fx.registry,
                )
                .await;
        }

        assert_eq!(
            drain_events(&mut events),
            vec![
                ViewEvent::TargetUrlChanged { view_id, url: None },
                ViewEvent::TargetUrlChanged {
                    view_id,
                    url: Some(Url::parse("https://elsewhere.org/a").unwrap())
                },
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn focus_tracking_and_broadcast_skip_dead_surfaces() {
        let mut fx = Fixture::new().await;
        let a = fx.open().await;
        let a_surface = fx.test.host.last_surface();
        let _b = fx.open().await;
        let b_surface = fx.test.host.last_surface();

        fx.manager
            .handle_host_event(
                HostEvent::SurfaceFocused {
                    content_id: a_surface.native_id_value(),
                },
                &mut fx.registry,
            )
            .await;
        assert_eq!(fx.manager.focused_view(), Some(a));
        fx.manager
            .handle_host_event(
                HostEvent::SurfaceBlurred {
                    content_id: a_surface.native_id_value(),
                },
                &mut fx.registry,
            )
            .await;
        assert_eq!(fx.manager.focused_view(), None);

        // Host tore down one surface behind our back
        b_surface.kill();
        let delivered = fx.manager.broadcast("dark-mode", &json!(true));
        assert_eq!(delivered, 1);
        assert_eq!(a_surface.sent_messages(), vec![("dark-mode".to_string(), json!(true))]);
        assert!(b_surface.sent_messages().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn popout_messages_reach_parent() {
        let mut fx = Fixture::new().await;
        let parent = fx.open().await;
        let parent_surface = fx.test.host.last_surface();
        let popout = fx
            .registry
            .create_view(&test_server("s1"), ViewKind::Window, Some("/x".into()), Some(parent))
            .unwrap();
        let view = fx.registry.get(popout).unwrap().clone();
        fx.manager
            .attach(&view, fx.test.host.main_window_handle())
            .await
            .unwrap();
        let popout_surface = fx.test.host.last_surface();

        fx.manager
            .handle_inbound(
                InboundSignal::SendToParent {
                    content_id: popout_surface.native_id_value(),
                    channel: "thread".into(),
                    payload: json!({"id": 1}),
                },
                &mut fx.registry,
            )
            .await;
        fx.manager
            .handle_inbound(
                InboundSignal::SendToPopout {
                    view_id: popout,
                    channel: "reply".into(),
                    payload: json!("ok"),
                },
                &mut fx.registry,
            )
            .await;

        let to_parent = parent_surface.sent_messages();
        assert_eq!(to_parent.len(), 1);
        assert_eq!(to_parent[0].0, MESSAGE_FROM_POPOUT);
        assert_eq!(to_parent[0].1["channel"], "thread");
        let to_popout = popout_surface.sent_messages();
        assert_eq!(to_popout[0].0, MESSAGE_FROM_PARENT);
        assert_eq!(to_popout[0].1["payload"], "ok");
    }

    #[tokio::test(start_paused = true)]
    async fn stale_events_after_detach_are_dropped() {
        let mut fx = Fixture::new().await;
        fx.test.host.push_load_results([Err(LoadError::new("ERR_CONNECTION_REFUSED", ""))]);
        let view_id = fx.open().await;
        fx.step().await;
        assert!(fx.manager.get(view_id).unwrap().has_pending_work());

        fx.manager.detach(view_id);
        let waited =
            tokio::time::timeout(std::time::Duration::from_secs(3600), fx.rx.recv()).await;
        assert!(waited.is_err(), "no retry may fire after detach");
        assert_eq!(fx.test.host.last_surface().loaded_urls().len(), 1);
    }
}
