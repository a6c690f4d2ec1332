//! 编排服务层

mod dispatch;
mod event_bus;
mod orchestrator;
mod popout_coordinator;
mod rendering_surface;
mod scheduled_task;
mod surface_manager;
mod view_registry;

pub use dispatch::{CoreEvent, DispatchHandle, SurfaceEvent};
pub use event_bus::EventBus;
pub use orchestrator::ViewOrchestrator;
pub use popout_coordinator::{PopoutCoordinator, PopoutState, PopoutWindow, TAB_BAR_HEIGHT};
pub use rendering_surface::{RenderingSurface, RetryMode, RetryPolicy, SurfaceStatus};
pub use surface_manager::{SurfaceManager, MESSAGE_FROM_PARENT, MESSAGE_FROM_POPOUT};
pub use view_registry::ViewRegistry;

use std::sync::Arc;

use crate::traits::{ConfigSource, NativeHost, ServerDirectory, ServerProbe};
use crate::types::{OrchestratorConfig, ViewEvent};

/// 服务上下文 - 持有所有依赖
///
/// 平台层在进程启动时创建一次，并注入平台特定的实现。
pub struct ServiceContext {
    /// 服务器目录
    pub server_directory: Arc<dyn ServerDirectory>,
    /// 原生窗口宿主
    pub native_host: Arc<dyn NativeHost>,
    /// 后台重试使用的可达性探测
    pub server_probe: Arc<dyn ServerProbe>,
    /// 只读配置
    pub config: Arc<dyn ConfigSource>,
    /// 对外信号总线
    pub events: EventBus,
}

impl ServiceContext {
    /// 创建服务上下文
    #[must_use]
    pub fn new(
        server_directory: Arc<dyn ServerDirectory>,
        native_host: Arc<dyn NativeHost>,
        server_probe: Arc<dyn ServerProbe>,
        config: Arc<dyn ConfigSource>,
    ) -> Self {
        Self {
            server_directory,
            native_host,
            server_probe,
            config,
            events: EventBus::default(),
        }
    }

    /// 当前生效配置
    pub fn config(&self) -> OrchestratorConfig {
        self.config.current()
    }

    /// 发布对外信号
    pub fn emit(&self, event: ViewEvent) {
        self.events.emit(event);
    }
}
