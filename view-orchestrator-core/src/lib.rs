//! View Orchestrator Core Library
//!
//! Lifecycle core of a desktop shell that embeds remote web applications ("servers")
//! in native windows:
//! - View registry (views, per-server order and primary view, global view limit)
//! - Rendering surfaces (load / retry / background probe state machine)
//! - Surface manager (surface ownership, native-id resolution, signal routing)
//! - Popout coordinator (one native window per WINDOW-kind view)
//!
//! This library is platform-independent: the window host, server directory,
//! reachability probe and configuration are injected through traits.

pub mod error;
pub mod services;
pub mod traits;
pub mod types;
pub mod utils;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

// Re-export common types
pub use error::{CoreError, CoreResult};
pub use services::{CoreEvent, DispatchHandle, EventBus, ServiceContext, ViewOrchestrator};
pub use traits::{ConfigSource, ContentSurface, NativeHost, NativeWindow, ServerDirectory, ServerProbe};
