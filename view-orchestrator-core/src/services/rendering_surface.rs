//! 渲染表面：单个视图的加载 / 重试状态机
//!
//! ```text
//! LOADING --ok, compatible--> WAITING_FOR_APP_SIGNAL --app ready | timeout--> READY
//! LOADING --ok, incompatible--> ERROR (terminal until reload)
//! LOADING --certificate error--> ERROR (terminal until reload)
//! LOADING --aborted--> LOADING (ignored)
//! LOADING --transient error--> LOADING (foreground retry) ... budget spent --> ERROR
//! ERROR (transient) --probe ok--> LOADING
//! ```
//!
//! All deferred work (the load request, retry/probe timers, the ready timeout) lives
//! in a single `pending` slot, so two competing timers can never coexist.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use url::Url;

use crate::services::dispatch::{DispatchHandle, SurfaceTask, SurfaceTicket};
use crate::services::scheduled_task::ScheduledTask;
use crate::traits::{ContentSurface, NativeWindow, ServerProbe};
use crate::types::{
    Bounds, LoadError, LoadFailureClass, NativeContentId, OrchestratorConfig, PageTitle, RemoteInfo,
    Server, ServerId, View, ViewEvent, ViewId,
};

/// Load status of a rendering surface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SurfaceStatus {
    Loading,
    Ready,
    WaitingForAppSignal,
    Error,
}

/// Which retry loop is active
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RetryMode {
    /// Bounded, user-visible countdown retries
    Foreground,
    /// Unbounded reachability probing after the budget is spent
    Background,
}

/// Retry budget carried alongside the surface state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub remaining: u32,
    #[serde(rename = "intervalMs", serialize_with = "crate::utils::duration_ms::serialize")]
    pub interval: Duration,
    pub mode: RetryMode,
}

impl RetryPolicy {
    #[must_use]
    pub fn new(max_retries: u32, interval: Duration) -> Self {
        Self {
            max_retries,
            remaining: max_retries,
            interval,
            mode: RetryMode::Foreground,
        }
    }

    fn reset(&mut self) {
        self.remaining = self.max_retries;
        self.mode = RetryMode::Foreground;
    }

    /// Spend one attempt; `true` while budget is left for another foreground retry
    fn consume(&mut self) -> bool {
        self.remaining = self.remaining.saturating_sub(1);
        self.remaining > 0
    }
}

/// Runtime counterpart of one open view
pub struct RenderingSurface {
    view_id: ViewId,
    server_id: ServerId,
    instance: u64,
    epoch: u64,
    content: Arc<dyn ContentSurface>,
    host_window: Arc<dyn NativeWindow>,
    status: SurfaceStatus,
    retry: RetryPolicy,
    ready_timeout: Duration,
    last_url: Option<Url>,
    pending: Option<ScheduledTask>,
    destroyed: bool,
    dispatch: DispatchHandle,
    outbox: Vec<ViewEvent>,
}

impl RenderingSurface {
    pub(crate) fn new(
        view: &View,
        instance: u64,
        content: Arc<dyn ContentSurface>,
        host_window: Arc<dyn NativeWindow>,
        config: &OrchestratorConfig,
        dispatch: DispatchHandle,
    ) -> Self {
        log::debug!("Surface created for view {} ({})", view.id, view.title.server_name);
        Self {
            view_id: view.id,
            server_id: view.server_id.clone(),
            instance,
            epoch: 0,
            content,
            host_window,
            status: SurfaceStatus::Loading,
            retry: RetryPolicy::new(config.max_server_retries, config.reload_interval),
            ready_timeout: config.ready_timeout,
            last_url: None,
            pending: None,
            destroyed: false,
            dispatch,
            outbox: Vec::new(),
        }
    }

    pub fn view_id(&self) -> ViewId {
        self.view_id
    }

    pub fn server_id(&self) -> &ServerId {
        &self.server_id
    }

    pub fn native_id(&self) -> NativeContentId {
        self.content.native_id()
    }

    pub fn status(&self) -> SurfaceStatus {
        self.status
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    pub fn last_url(&self) -> Option<&Url> {
        self.last_url.as_ref()
    }

    pub fn host_window(&self) -> &Arc<dyn NativeWindow> {
        &self.host_window
    }

    pub fn is_ready(&self) -> bool {
        self.status == SurfaceStatus::Ready
    }

    pub fn is_errored(&self) -> bool {
        self.status == SurfaceStatus::Error
    }

    /// Whether a timer, probe or load request is outstanding
    pub fn has_pending_work(&self) -> bool {
        self.pending.is_some()
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    /// Live and not torn down
    pub fn is_alive(&self) -> bool {
        !self.destroyed && self.content.is_alive()
    }

    pub fn needs_loading_screen(&self) -> bool {
        !matches!(self.status, SurfaceStatus::Ready | SurfaceStatus::Error)
    }

    pub(crate) fn content(&self) -> &dyn ContentSurface {
        self.content.as_ref()
    }

    pub(crate) fn accepts(&self, ticket: SurfaceTicket) -> bool {
        !self.destroyed && ticket.instance == self.instance && ticket.epoch == self.epoch
    }

    pub(crate) fn take_events(&mut self) -> Vec<ViewEvent> {
        std::mem::take(&mut self.outbox)
    }

    /// Start loading `url`, superseding anything in flight
    pub(crate) fn load(&mut self, url: Url) {
        if self.destroyed {
            return;
        }
        log::debug!("Loading {url} for view {}", self.view_id);
        self.last_url = Some(url.clone());

        let ticket = self.next_ticket();
        let content = Arc::clone(&self.content);
        let dispatch = self.dispatch.clone();
        let view_id = self.view_id;
        self.pending = Some(ScheduledTask::spawn(async move {
            let result = content.load(&url).await;
            dispatch.surface(view_id, ticket, SurfaceTask::LoadFinished { url, result });
        }));
    }

    /// Explicit reload, valid from any state
    ///
    /// Outside `LOADING` this resets the retry budget; inside it only restarts the request.
    /// Any pending retry or probe timer is cancelled first.
    pub(crate) fn reload(&mut self, url: Option<Url>) {
        if self.destroyed {
            return;
        }
        let Some(url) = url.or_else(|| self.last_url.clone()) else {
            log::warn!("Reload requested for view {} before any load", self.view_id);
            return;
        };

        self.cancel_pending();
        if self.status != SurfaceStatus::Loading {
            self.status = SurfaceStatus::Loading;
            self.retry.reset();
        }
        self.outbox.push(ViewEvent::ReloadRequested {
            view_id: self.view_id,
        });
        self.load(url);
    }

    pub(crate) fn on_load_finished(
        &mut self,
        url: Url,
        result: Result<(), LoadError>,
        remote: Option<&RemoteInfo>,
    ) {
        self.pending = None;
        if self.status != SurfaceStatus::Loading {
            log::debug!(
                "Ignoring load result for view {} in {:?}",
                self.view_id,
                self.status
            );
            return;
        }

        match result {
            Ok(()) => self.on_load_success(&url, remote),
            Err(err) => match LoadFailureClass::classify(&err) {
                LoadFailureClass::Certificate => {
                    log::info!(
                        "Invalid certificate, stop retrying until the user decides what to do: {err}"
                    );
                    self.fail(err.to_string(), false);
                }
                LoadFailureClass::Aborted => {
                    log::debug!("Load of {url} aborted for view {}", self.view_id);
                }
                LoadFailureClass::Transient => self.on_transient_failure(url, &err),
            },
        }
    }

    fn on_load_success(&mut self, url: &Url, remote: Option<&RemoteInfo>) {
        if remote.is_some_and(|info| !info.is_compatible()) {
            log::warn!("Server for view {} runs an incompatible version", self.view_id);
            self.fail("Incompatible server version".to_string(), true);
            return;
        }

        log::debug!("Finished loading {url}");
        self.retry.reset();
        self.status = SurfaceStatus::WaitingForAppSignal;
        if self.host_window.is_alive() {
            self.content.set_bounds(self.host_window.content_bounds());
        }
        self.outbox.push(ViewEvent::LoadSuccess {
            view_id: self.view_id,
        });

        let ticket = self.ticket();
        let dispatch = self.dispatch.clone();
        let view_id = self.view_id;
        self.pending = Some(ScheduledTask::after(self.ready_timeout, move || {
            dispatch.surface(view_id, ticket, SurfaceTask::ReadyTimeout);
        }));
    }

    fn on_transient_failure(&mut self, url: Url, err: &LoadError) {
        if self.retry.consume() {
            let interval = self.retry.interval;
            let next_attempt_ms = Utc::now()
                .timestamp_millis()
                .saturating_add(i64::try_from(interval.as_millis()).unwrap_or(i64::MAX));
            log::info!(
                "Failed loading {url}: {err}, retrying in {} seconds",
                interval.as_secs()
            );
            self.outbox.push(ViewEvent::LoadRetry {
                view_id: self.view_id,
                next_attempt_ms,
                error: err.to_string(),
            });
            self.schedule(interval, SurfaceTask::RetryDue { url });
            return;
        }

        log::info!(
            "Couldn't establish a connection with {url}, will continue to retry in the background: {err}"
        );
        self.fail(err.to_string(), false);
        self.retry.mode = RetryMode::Background;
        self.schedule(self.retry.interval, SurfaceTask::ProbeDue { url });
    }

    pub(crate) fn on_retry_due(&mut self, url: Url) {
        self.pending = None;
        if self.status == SurfaceStatus::Loading {
            self.load(url);
        }
    }

    /// Background loop tick: probe reachability without touching visible state
    pub(crate) fn on_probe_due(
        &mut self,
        url: Url,
        server: Option<Server>,
        probe: Arc<dyn ServerProbe>,
    ) {
        self.pending = None;
        if self.retry.mode != RetryMode::Background {
            return;
        }
        let Some(server) = server else {
            log::debug!(
                "Server for view {} is gone, stopping background retries",
                self.view_id
            );
            return;
        };

        let ticket = self.ticket();
        let dispatch = self.dispatch.clone();
        let view_id = self.view_id;
        self.pending = Some(ScheduledTask::spawn(async move {
            let result = probe.probe(&server, &url).await;
            dispatch.surface(view_id, ticket, SurfaceTask::ProbeFinished { url, result });
        }));
    }

    pub(crate) fn on_probe_finished(&mut self, url: Url, result: Result<(), String>) {
        self.pending = None;
        if self.retry.mode != RetryMode::Background {
            return;
        }
        match result {
            Ok(()) => {
                log::info!("Server for view {} reachable again, reloading", self.view_id);
                self.reload(Some(url));
            }
            Err(reason) => {
                log::debug!("Cannot reach server: {reason}");
                self.schedule(self.retry.interval, SurfaceTask::ProbeDue { url });
            }
        }
    }

    pub(crate) fn on_ready_timeout(&mut self) {
        self.pending = None;
        if self.status == SurfaceStatus::WaitingForAppSignal {
            log::debug!("Ready timeout expired for view {}, showing it", self.view_id);
            self.mark_ready();
        }
    }

    /// Web app reported it finished initializing; returns whether the state changed
    pub(crate) fn on_app_ready(&mut self) -> bool {
        if self.status != SurfaceStatus::WaitingForAppSignal {
            return false;
        }
        self.cancel_pending();
        self.mark_ready();
        true
    }

    /// Derive channel/team from a page title while the server session is live
    pub(crate) fn on_page_title(
        &self,
        raw: &str,
        remote: Option<&RemoteInfo>,
        logged_in: bool,
    ) -> Option<PageTitle> {
        if !logged_in {
            return None;
        }
        let site_name = remote.and_then(|r| r.site_name.as_deref());
        Some(PageTitle::parse(raw, site_name))
    }

    /// History navigation; a failing native call triggers a reload
    pub(crate) fn go_to_offset(&mut self, offset: i32) {
        if !self.is_alive() {
            return;
        }
        if let Err(e) = self.content.go_to_offset(offset) {
            log::error!("History navigation failed for view {}: {e}", self.view_id);
            self.reload(None);
        }
    }

    /// Move to another window; state and pending work are untouched
    pub(crate) fn set_host_window(&mut self, window: Arc<dyn NativeWindow>) {
        if self.host_window.id() == window.id() {
            return;
        }
        if self.host_window.is_alive() {
            self.host_window.remove_surface(self.content.as_ref());
        }
        window.add_surface(self.content.as_ref());
        if window.is_alive() {
            self.content.set_bounds(window.content_bounds());
        }
        self.host_window = window;
    }

    pub fn focus(&self) {
        if self.is_alive() && self.host_window.is_focused() {
            self.content.focus();
        }
    }

    pub fn set_bounds(&self, bounds: Bounds) {
        if self.is_alive() {
            self.content.set_bounds(bounds);
        }
    }

    /// Deliver a message to the page; returns `false` if the surface is gone
    pub fn send(&self, channel: &str, payload: serde_json::Value) -> bool {
        if !self.is_alive() {
            return false;
        }
        self.content.send(channel, payload);
        true
    }

    /// Cancel everything and release the native surface. Idempotent.
    pub(crate) fn destroy(&mut self) {
        if self.destroyed {
            return;
        }
        self.destroyed = true;
        self.cancel_pending();
        if self.host_window.is_alive() {
            self.host_window.remove_surface(self.content.as_ref());
        }
        if self.content.is_alive() {
            self.content.close();
        }
        log::debug!("Surface destroyed for view {}", self.view_id);
    }

    fn mark_ready(&mut self) {
        self.status = SurfaceStatus::Ready;
        self.outbox.push(ViewEvent::Ready {
            view_id: self.view_id,
        });
    }

    fn fail(&mut self, error: String, incompatible: bool) {
        self.status = SurfaceStatus::Error;
        self.outbox.push(ViewEvent::LoadFailed {
            view_id: self.view_id,
            error,
            incompatible,
        });
    }

    fn schedule(&mut self, delay: Duration, task: SurfaceTask) {
        let ticket = self.ticket();
        let dispatch = self.dispatch.clone();
        let view_id = self.view_id;
        self.pending = Some(ScheduledTask::after(delay, move || {
            dispatch.surface(view_id, ticket, task);
        }));
    }

    /// Drop pending work and invalidate any result already queued for it
    fn cancel_pending(&mut self) {
        self.pending = None;
        self.epoch += 1;
    }

    fn ticket(&self) -> SurfaceTicket {
        SurfaceTicket {
            instance: self.instance,
            epoch: self.epoch,
        }
    }

    fn next_ticket(&mut self) -> SurfaceTicket {
        self.cancel_pending();
        self.ticket()
    }
}

impl Drop for RenderingSurface {
    fn drop(&mut self) {
        self.destroy();
    }
}
