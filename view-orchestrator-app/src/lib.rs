//! Platform-agnostic application bootstrap for the view orchestrator.
//!
//! Provides `AppState` (orchestrator container), `AppStateBuilder` (adapter injection),
//! and `AppHandle` (command channel into the running event loop).

pub mod adapters;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use view_orchestrator_core::error::{CoreError, CoreResult};
use view_orchestrator_core::services::{DispatchHandle, ServiceContext, ViewOrchestrator};
use view_orchestrator_core::traits::{
    ConfigSource, NativeHost, ServerDirectory, ServerProbe, StaticConfig,
};
use view_orchestrator_core::types::{ServerId, ViewEvent, ViewId, ViewKind};

const COMMAND_BUFFER: usize = 64;

/// Startup replay results
#[derive(Debug, Clone, Default)]
pub struct StartupResult {
    /// Views opened, in server order
    pub opened: Vec<ViewId>,
    /// Servers whose view could not be opened
    pub failed: Vec<(ServerId, String)>,
}

/// Platform-agnostic application state.
///
/// Holds the `ServiceContext` and the orchestrator. Every frontend constructs this
/// once at startup via `AppStateBuilder`, replays the configured servers, then hands
/// the orchestrator to its event loop with `start`.
pub struct AppState {
    /// Service context (holds all collaborator adapters)
    pub ctx: Arc<ServiceContext>,
    /// The orchestrator, owned by the event loop once started
    pub orchestrator: ViewOrchestrator,
    /// Whether the startup replay has completed
    pub startup_completed: AtomicBool,
}

impl AppState {
    /// Open one EMBEDDED view per configured server, in server order.
    ///
    /// Failures are logged and collected; they never abort the replay.
    pub async fn run_startup(&mut self) -> StartupResult {
        let mut result = StartupResult::default();
        for server in self.ctx.server_directory.list_servers().await {
            match self
                .orchestrator
                .create_view(&server.id, ViewKind::Embedded, None)
                .await
            {
                Ok(view_id) => result.opened.push(view_id),
                Err(e) => {
                    if e.is_expected() {
                        log::warn!("Skipping server {} at startup: {e}", server.id);
                    } else {
                        log::error!("Failed to open server {} at startup: {e}", server.id);
                    }
                    result.failed.push((server.id, e.to_string()));
                }
            }
        }

        log::info!(
            "Startup replay complete: {} opened, {} failed",
            result.opened.len(),
            result.failed.len()
        );
        self.startup_completed.store(true, Ordering::SeqCst);
        result
    }

    /// Move the orchestrator into its event loop task
    pub fn start(self) -> (AppHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(COMMAND_BUFFER);
        let handle = AppHandle {
            commands: tx,
            dispatch: self.orchestrator.dispatch_handle(),
            ctx: Arc::clone(&self.ctx),
        };
        let task = tokio::spawn(run_event_loop(self.orchestrator, rx));
        (handle, task)
    }
}

/// Builder for constructing `AppState` with platform-specific adapters.
///
/// # Required adapters
/// - `native_host`: how windows and content surfaces are created
/// - `server_directory`: where the configured servers come from
///
/// # Optional
/// - `server_probe`: defaults to `HttpServerProbe` (or `NoopServerProbe` without
///   the `http-probe` feature)
/// - `config`: defaults to `StaticConfig` with default values
pub struct AppStateBuilder {
    native_host: Option<Arc<dyn NativeHost>>,
    server_directory: Option<Arc<dyn ServerDirectory>>,
    server_probe: Option<Arc<dyn ServerProbe>>,
    config: Option<Arc<dyn ConfigSource>>,
}

impl AppStateBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            native_host: None,
            server_directory: None,
            server_probe: None,
            config: None,
        }
    }

    #[must_use]
    pub fn native_host(mut self, host: Arc<dyn NativeHost>) -> Self {
        self.native_host = Some(host);
        self
    }

    #[must_use]
    pub fn server_directory(mut self, directory: Arc<dyn ServerDirectory>) -> Self {
        self.server_directory = Some(directory);
        self
    }

    #[must_use]
    pub fn server_probe(mut self, probe: Arc<dyn ServerProbe>) -> Self {
        self.server_probe = Some(probe);
        self
    }

    #[must_use]
    pub fn config(mut self, config: Arc<dyn ConfigSource>) -> Self {
        self.config = Some(config);
        self
    }

    /// Build the `AppState`.
    ///
    /// # Errors
    /// Returns `CoreError::ValidationError` if required adapters are missing.
    pub fn build(self) -> CoreResult<AppState> {
        let native_host = self
            .native_host
            .ok_or_else(|| CoreError::ValidationError("native_host is required".to_string()))?;
        let server_directory = self.server_directory.ok_or_else(|| {
            CoreError::ValidationError("server_directory is required".to_string())
        })?;
        let server_probe = match self.server_probe {
            Some(probe) => probe,
            None => default_probe()?,
        };
        let config = self
            .config
            .unwrap_or_else(|| Arc::new(StaticConfig::default()));

        let ctx = Arc::new(ServiceContext::new(
            server_directory,
            native_host,
            server_probe,
            config,
        ));
        let orchestrator = ViewOrchestrator::new(Arc::clone(&ctx));

        Ok(AppState {
            ctx,
            orchestrator,
            startup_completed: AtomicBool::new(false),
        })
    }
}

#[cfg(feature = "http-probe")]
fn default_probe() -> CoreResult<Arc<dyn ServerProbe>> {
    Ok(Arc::new(adapters::HttpServerProbe::new()?))
}

#[cfg(not(feature = "http-probe"))]
fn default_probe() -> CoreResult<Arc<dyn ServerProbe>> {
    Ok(Arc::new(view_orchestrator_core::traits::NoopServerProbe))
}

impl Default for AppStateBuilder {
    fn default() -> Self {
        Self::new()
    }
}

// ===== Command channel =====

enum Command {
    CreateView {
        server_id: ServerId,
        kind: ViewKind,
        initial_path: Option<String>,
        reply: oneshot::Sender<CoreResult<ViewId>>,
    },
    RemoveView {
        view_id: ViewId,
        reply: oneshot::Sender<bool>,
    },
    RemoveServer {
        server_id: ServerId,
        reply: oneshot::Sender<Vec<ViewId>>,
    },
    SetPrimary {
        view_id: ViewId,
        reply: oneshot::Sender<bool>,
    },
    Reorder {
        server_id: ServerId,
        order: Vec<ViewId>,
        reply: oneshot::Sender<Vec<ViewId>>,
    },
    SetViewKind {
        view_id: ViewId,
        kind: ViewKind,
        reply: oneshot::Sender<CoreResult<()>>,
    },
    Reload {
        view_id: ViewId,
        reply: oneshot::Sender<CoreResult<()>>,
    },
    GoToOffset {
        view_id: ViewId,
        offset: i32,
        reply: oneshot::Sender<CoreResult<()>>,
    },
    ServerUrlChanged {
        server_id: ServerId,
        reply: oneshot::Sender<CoreResult<usize>>,
    },
    OpenPopout {
        origin: ViewId,
        path: String,
        reply: oneshot::Sender<CoreResult<ViewId>>,
    },
    Broadcast {
        channel: String,
        payload: Value,
        reply: oneshot::Sender<usize>,
    },
    Shutdown,
}

/// Cloneable handle to a running orchestrator
#[derive(Clone)]
pub struct AppHandle {
    commands: mpsc::Sender<Command>,
    dispatch: DispatchHandle,
    ctx: Arc<ServiceContext>,
}

impl AppHandle {
    /// Channel for the platform layer's host events and content signals
    pub fn dispatch(&self) -> &DispatchHandle {
        &self.dispatch
    }

    /// Subscribe to outbound view signals
    pub fn subscribe(&self) -> broadcast::Receiver<ViewEvent> {
        self.ctx.events.subscribe()
    }

    pub async fn create_view(
        &self,
        server_id: ServerId,
        kind: ViewKind,
        initial_path: Option<String>,
    ) -> CoreResult<ViewId> {
        self.request(|reply| Command::CreateView {
            server_id,
            kind,
            initial_path,
            reply,
        })
        .await?
    }

    pub async fn remove_view(&self, view_id: ViewId) -> CoreResult<bool> {
        self.request(|reply| Command::RemoveView { view_id, reply })
            .await
    }

    pub async fn remove_server(&self, server_id: ServerId) -> CoreResult<Vec<ViewId>> {
        self.request(|reply| Command::RemoveServer { server_id, reply })
            .await
    }

    pub async fn set_primary(&self, view_id: ViewId) -> CoreResult<bool> {
        self.request(|reply| Command::SetPrimary { view_id, reply })
            .await
    }

    pub async fn reorder(&self, server_id: ServerId, order: Vec<ViewId>) -> CoreResult<Vec<ViewId>> {
        self.request(|reply| Command::Reorder {
            server_id,
            order,
            reply,
        })
        .await
    }

    pub async fn set_view_kind(&self, view_id: ViewId, kind: ViewKind) -> CoreResult<()> {
        self.request(|reply| Command::SetViewKind {
            view_id,
            kind,
            reply,
        })
        .await?
    }

    pub async fn reload(&self, view_id: ViewId) -> CoreResult<()> {
        self.request(|reply| Command::Reload { view_id, reply })
            .await?
    }

    pub async fn go_to_offset(&self, view_id: ViewId, offset: i32) -> CoreResult<()> {
        self.request(|reply| Command::GoToOffset {
            view_id,
            offset,
            reply,
        })
        .await?
    }

    pub async fn server_url_changed(&self, server_id: ServerId) -> CoreResult<usize> {
        self.request(|reply| Command::ServerUrlChanged { server_id, reply })
            .await?
    }

    /// Open `path` of the origin view's server in a popout, reusing an existing one
    pub async fn open_popout(&self, origin: ViewId, path: impl Into<String>) -> CoreResult<ViewId> {
        let path = path.into();
        self.request(|reply| Command::OpenPopout {
            origin,
            path,
            reply,
        })
        .await?
    }

    pub async fn broadcast(&self, channel: impl Into<String>, payload: Value) -> CoreResult<usize> {
        let channel = channel.into();
        self.request(|reply| Command::Broadcast {
            channel,
            payload,
            reply,
        })
        .await
    }

    /// Stop the event loop; all surfaces and windows are released
    pub async fn shutdown(&self) -> CoreResult<()> {
        self.commands
            .send(Command::Shutdown)
            .await
            .map_err(|_| CoreError::ChannelClosed)
    }

    async fn request<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> Command) -> CoreResult<T> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(make(reply))
            .await
            .map_err(|_| CoreError::ChannelClosed)?;
        rx.await.map_err(|_| CoreError::ChannelClosed)
    }
}

async fn run_event_loop(mut orchestrator: ViewOrchestrator, mut commands: mpsc::Receiver<Command>) {
    log::info!("Orchestrator event loop started");
    loop {
        tokio::select! {
            command = commands.recv() => match command {
                Some(Command::Shutdown) | None => break,
                Some(command) => execute(&mut orchestrator, command).await,
            },
            Some(event) = orchestrator.next_event() => {
                orchestrator.handle_event(event).await;
            }
        }
    }
    orchestrator.shutdown();
    log::info!("Orchestrator event loop stopped");
}

async fn execute(orchestrator: &mut ViewOrchestrator, command: Command) {
    // A dropped reply receiver only means the caller stopped waiting
    match command {
        Command::CreateView {
            server_id,
            kind,
            initial_path,
            reply,
        } => {
            let _ = reply.send(orchestrator.create_view(&server_id, kind, initial_path).await);
        }
        Command::RemoveView { view_id, reply } => {
            let _ = reply.send(orchestrator.remove_view(view_id));
        }
        Command::RemoveServer { server_id, reply } => {
            let _ = reply.send(orchestrator.remove_server(&server_id));
        }
        Command::SetPrimary { view_id, reply } => {
            let _ = reply.send(orchestrator.set_primary(view_id));
        }
        Command::Reorder {
            server_id,
            order,
            reply,
        } => {
            let _ = reply.send(orchestrator.reorder(&server_id, &order));
        }
        Command::SetViewKind {
            view_id,
            kind,
            reply,
        } => {
            let _ = reply.send(orchestrator.set_view_kind(view_id, kind).await);
        }
        Command::Reload { view_id, reply } => {
            let _ = reply.send(orchestrator.reload(view_id));
        }
        Command::GoToOffset {
            view_id,
            offset,
            reply,
        } => {
            let _ = reply.send(orchestrator.go_to_offset(view_id, offset));
        }
        Command::ServerUrlChanged { server_id, reply } => {
            let _ = reply.send(orchestrator.server_url_changed(&server_id).await);
        }
        Command::OpenPopout {
            origin,
            path,
            reply,
        } => {
            let _ = reply.send(orchestrator.open_popout(origin, &path).await);
        }
        Command::Broadcast {
            channel,
            payload,
            reply,
        } => {
            let _ = reply.send(orchestrator.broadcast(&channel, &payload));
        }
        Command::Shutdown => {}
    }
}
