//! Event loop plumbing: everything asynchronous reports back through one channel

use tokio::sync::mpsc;
use url::Url;

use crate::types::{HostEvent, InboundSignal, LoadError, ViewId};

/// Identifies which incarnation of a surface, and which step of its state machine,
/// an asynchronous result belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct SurfaceTicket {
    pub instance: u64,
    pub epoch: u64,
}

#[derive(Debug)]
pub(crate) enum SurfaceTask {
    LoadFinished {
        url: Url,
        result: Result<(), LoadError>,
    },
    RetryDue {
        url: Url,
    },
    ProbeDue {
        url: Url,
    },
    ProbeFinished {
        url: Url,
        result: Result<(), String>,
    },
    ReadyTimeout,
}

/// Completion of a load, timer or probe started by a rendering surface
#[derive(Debug)]
pub struct SurfaceEvent {
    pub(crate) view_id: ViewId,
    pub(crate) ticket: SurfaceTicket,
    pub(crate) task: SurfaceTask,
}

impl SurfaceEvent {
    /// View whose surface produced this event
    #[must_use]
    pub fn view_id(&self) -> ViewId {
        self.view_id
    }
}

/// Everything the orchestrator's event loop consumes
#[derive(Debug)]
pub enum CoreEvent {
    Surface(SurfaceEvent),
    Host(HostEvent),
    Inbound(InboundSignal),
}

/// Sending half of the event loop channel
///
/// Cloned into every spawned task and handed to the platform layer so the host can
/// deliver `HostEvent`s and content `InboundSignal`s.
#[derive(Debug, Clone)]
pub struct DispatchHandle {
    tx: mpsc::UnboundedSender<CoreEvent>,
}

impl DispatchHandle {
    /// Queue an event; returns `false` once the event loop is gone
    pub fn send(&self, event: CoreEvent) -> bool {
        self.tx.send(event).is_ok()
    }

    pub fn host_event(&self, event: HostEvent) -> bool {
        self.send(CoreEvent::Host(event))
    }

    pub fn inbound(&self, signal: InboundSignal) -> bool {
        self.send(CoreEvent::Inbound(signal))
    }

    pub(crate) fn surface(&self, view_id: ViewId, ticket: SurfaceTicket, task: SurfaceTask) {
        if !self.send(CoreEvent::Surface(SurfaceEvent {
            view_id,
            ticket,
            task,
        })) {
            log::debug!("Event loop closed, dropping surface event for {view_id}");
        }
    }
}

/// Create the event loop channel
pub(crate) fn channel() -> (DispatchHandle, mpsc::UnboundedReceiver<CoreEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (DispatchHandle { tx }, rx)
}
