//! 类型定义模块

mod config;
mod events;
mod native;
mod server;
mod title;
mod view;

pub use config::OrchestratorConfig;
pub use events::{HostEvent, InboundSignal, ViewEvent};
pub use native::{
    Bounds, LoadError, LoadFailureClass, NativeContentId, SurfaceOptions, WindowId, WindowOptions,
};
pub use server::{RemoteInfo, Server, ServerId, MIN_SERVER_VERSION};
pub use title::PageTitle;
pub use view::{View, ViewId, ViewKind, ViewTitle};
