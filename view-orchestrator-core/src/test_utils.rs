//! 测试辅助模块
//!
//! 提供 mock 实现和便捷的测试工厂方法。

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::broadcast;
use url::Url;

use crate::error::{CoreError, CoreResult};
use crate::services::ServiceContext;
use crate::traits::{
    ContentSurface, InMemoryServerDirectory, NativeHost, NativeWindow, ServerProbe, StaticConfig,
};
use crate::types::{
    Bounds, LoadError, NativeContentId, OrchestratorConfig, Server, SurfaceOptions, ViewEvent,
    WindowId, WindowOptions,
};

type LoadScript = Arc<Mutex<VecDeque<Result<(), LoadError>>>>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ===== MockContentSurface =====

pub struct MockContentSurface {
    id: NativeContentId,
    /// 与宿主共享的加载结果脚本；为空时加载成功
    script: LoadScript,
    loads: Mutex<Vec<Url>>,
    sent: Mutex<Vec<(String, Value)>>,
    bounds: Mutex<Bounds>,
    history_error: Mutex<Option<String>>,
    alive: AtomicBool,
    closed: AtomicBool,
    focus_count: AtomicUsize,
}

impl MockContentSurface {
    fn new(id: u64, script: LoadScript) -> Self {
        Self {
            id: NativeContentId(id),
            script,
            loads: Mutex::new(Vec::new()),
            sent: Mutex::new(Vec::new()),
            bounds: Mutex::new(Bounds::default()),
            history_error: Mutex::new(None),
            alive: AtomicBool::new(true),
            closed: AtomicBool::new(false),
            focus_count: AtomicUsize::new(0),
        }
    }

    pub fn native_id_value(&self) -> NativeContentId {
        self.id
    }

    pub fn loaded_urls(&self) -> Vec<Url> {
        lock(&self.loads).clone()
    }

    pub fn sent_messages(&self) -> Vec<(String, Value)> {
        lock(&self.sent).clone()
    }

    pub fn bounds_value(&self) -> Bounds {
        *lock(&self.bounds)
    }

    pub fn focus_count(&self) -> usize {
        self.focus_count.load(Ordering::SeqCst)
    }

    /// 关闭是否由 core 发起
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// 模拟宿主在 core 不知情时销毁了 surface
    pub fn kill(&self) {
        self.alive.store(false, Ordering::SeqCst);
    }

    /// 让后续的历史导航失败
    pub fn fail_history(&self, reason: &str) {
        *lock(&self.history_error) = Some(reason.to_string());
    }
}

#[async_trait]
impl ContentSurface for MockContentSurface {
    fn native_id(&self) -> NativeContentId {
        self.id
    }

    async fn load(&self, url: &Url) -> Result<(), LoadError> {
        lock(&self.loads).push(url.clone());
        lock(&self.script).pop_front().unwrap_or(Ok(()))
    }

    fn current_url(&self) -> Option<Url> {
        lock(&self.loads).last().cloned()
    }

    fn focus(&self) {
        self.focus_count.fetch_add(1, Ordering::SeqCst);
    }

    fn bounds(&self) -> Bounds {
        self.bounds_value()
    }

    fn set_bounds(&self, bounds: Bounds) {
        *lock(&self.bounds) = bounds;
    }

    fn send(&self, channel: &str, payload: Value) {
        lock(&self.sent).push((channel.to_string(), payload));
    }

    fn go_to_offset(&self, _offset: i32) -> Result<(), String> {
        match lock(&self.history_error).clone() {
            Some(reason) => Err(reason),
            None => Ok(()),
        }
    }

    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    fn close(&self) {
        self.alive.store(false, Ordering::SeqCst);
        self.closed.store(true, Ordering::SeqCst);
    }
}

// ===== MockWindow =====

pub struct MockWindow {
    id: WindowId,
    options: WindowOptions,
    bounds: Bounds,
    content_bounds: Mutex<Bounds>,
    surfaces: Mutex<Vec<NativeContentId>>,
    title: Mutex<String>,
    loading_screen: Mutex<Option<bool>>,
    alive: AtomicBool,
    focused: AtomicBool,
    show_count: AtomicUsize,
    close_count: AtomicUsize,
}

impl MockWindow {
    fn new(id: u64, options: WindowOptions) -> Self {
        let bounds = Bounds::new(
            options.x.unwrap_or(0),
            options.y.unwrap_or(0),
            options.width.unwrap_or(1000),
            options.height.unwrap_or(700),
        );
        Self {
            id: WindowId(id),
            title: Mutex::new(options.title.clone()),
            options,
            bounds,
            content_bounds: Mutex::new(Bounds::new(0, 0, bounds.width, bounds.height)),
            surfaces: Mutex::new(Vec::new()),
            loading_screen: Mutex::new(None),
            alive: AtomicBool::new(true),
            focused: AtomicBool::new(false),
            show_count: AtomicUsize::new(0),
            close_count: AtomicUsize::new(0),
        }
    }

    pub fn id_value(&self) -> WindowId {
        self.id
    }

    pub fn options(&self) -> WindowOptions {
        self.options.clone()
    }

    pub fn bounds_value(&self) -> Bounds {
        self.bounds
    }

    pub fn set_content_bounds(&self, bounds: Bounds) {
        *lock(&self.content_bounds) = bounds;
    }

    pub fn surface_ids(&self) -> Vec<NativeContentId> {
        lock(&self.surfaces).clone()
    }

    pub fn title(&self) -> String {
        lock(&self.title).clone()
    }

    pub fn loading_screen(&self) -> Option<bool> {
        *lock(&self.loading_screen)
    }

    pub fn set_focused(&self, focused: bool) {
        self.focused.store(focused, Ordering::SeqCst);
    }

    pub fn show_count(&self) -> usize {
        self.show_count.load(Ordering::SeqCst)
    }

    pub fn close_count(&self) -> usize {
        self.close_count.load(Ordering::SeqCst)
    }
}

impl NativeWindow for MockWindow {
    fn id(&self) -> WindowId {
        self.id
    }

    fn content_bounds(&self) -> Bounds {
        *lock(&self.content_bounds)
    }

    fn bounds(&self) -> Bounds {
        self.bounds
    }

    fn add_surface(&self, surface: &dyn ContentSurface) {
        let mut surfaces = lock(&self.surfaces);
        if !surfaces.contains(&surface.native_id()) {
            surfaces.push(surface.native_id());
        }
    }

    fn remove_surface(&self, surface: &dyn ContentSurface) {
        lock(&self.surfaces).retain(|id| *id != surface.native_id());
    }

    fn set_title(&self, title: &str) {
        *lock(&self.title) = title.to_string();
    }

    fn show(&self) {
        self.show_count.fetch_add(1, Ordering::SeqCst);
    }

    fn is_focused(&self) -> bool {
        self.focused.load(Ordering::SeqCst)
    }

    fn set_loading_screen(&self, visible: bool) {
        *lock(&self.loading_screen) = Some(visible);
    }

    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    fn close(&self) {
        self.alive.store(false, Ordering::SeqCst);
        self.close_count.fetch_add(1, Ordering::SeqCst);
    }
}

// ===== MockNativeHost =====

pub struct MockNativeHost {
    main: Arc<MockWindow>,
    windows: Mutex<Vec<Arc<MockWindow>>>,
    surfaces: Mutex<Vec<Arc<MockContentSurface>>>,
    script: LoadScript,
    next_id: AtomicU64,
    fail_windows: AtomicBool,
    fail_surfaces: AtomicBool,
}

impl MockNativeHost {
    pub fn new() -> Self {
        Self {
            main: Arc::new(MockWindow::new(
                1,
                WindowOptions {
                    x: Some(100),
                    y: Some(50),
                    width: Some(1200),
                    height: Some(800),
                    title: "Main".to_string(),
                },
            )),
            windows: Mutex::new(Vec::new()),
            surfaces: Mutex::new(Vec::new()),
            script: Arc::new(Mutex::new(VecDeque::new())),
            next_id: AtomicU64::new(100),
            fail_windows: AtomicBool::new(false),
            fail_surfaces: AtomicBool::new(false),
        }
    }

    /// 追加后续加载请求的结果（按顺序消费，跨所有 surface 共享）
    pub fn push_load_results<I>(&self, results: I)
    where
        I: IntoIterator<Item = Result<(), LoadError>>,
    {
        lock(&self.script).extend(results);
    }

    pub fn fail_window_creation(&self, fail: bool) {
        self.fail_windows.store(fail, Ordering::SeqCst);
    }

    pub fn fail_surface_creation(&self, fail: bool) {
        self.fail_surfaces.store(fail, Ordering::SeqCst);
    }

    pub fn main(&self) -> Arc<MockWindow> {
        Arc::clone(&self.main)
    }

    pub fn main_window_handle(&self) -> Arc<dyn NativeWindow> {
        self.main()
    }

    pub fn last_window(&self) -> Arc<MockWindow> {
        lock(&self.windows)
            .last()
            .cloned()
            .unwrap_or_else(|| panic!("no window created"))
    }

    pub fn window_count(&self) -> usize {
        lock(&self.windows).len()
    }

    pub fn last_surface(&self) -> Arc<MockContentSurface> {
        lock(&self.surfaces)
            .last()
            .cloned()
            .unwrap_or_else(|| panic!("no surface created"))
    }

    pub fn surface_count(&self) -> usize {
        lock(&self.surfaces).len()
    }

    pub fn closed_surface_count(&self) -> usize {
        lock(&self.surfaces).iter().filter(|s| s.is_closed()).count()
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }
}

#[async_trait]
impl NativeHost for MockNativeHost {
    fn main_window(&self) -> Option<Arc<dyn NativeWindow>> {
        Some(self.main_window_handle())
    }

    async fn create_window(&self, options: WindowOptions) -> CoreResult<Arc<dyn NativeWindow>> {
        if self.fail_windows.load(Ordering::SeqCst) {
            return Err(CoreError::NativeHost("window creation failed".to_string()));
        }
        let window = Arc::new(MockWindow::new(self.next_id(), options));
        lock(&self.windows).push(Arc::clone(&window));
        Ok(window)
    }

    fn create_content_surface(
        &self,
        _options: &SurfaceOptions,
    ) -> CoreResult<Arc<dyn ContentSurface>> {
        if self.fail_surfaces.load(Ordering::SeqCst) {
            return Err(CoreError::NativeHost("surface creation failed".to_string()));
        }
        let surface = Arc::new(MockContentSurface::new(
            self.next_id(),
            Arc::clone(&self.script),
        ));
        lock(&self.surfaces).push(Arc::clone(&surface));
        Ok(surface)
    }
}

impl Default for MockNativeHost {
    fn default() -> Self {
        Self::new()
    }
}

// ===== MockServerProbe =====

pub struct MockServerProbe {
    results: Mutex<VecDeque<Result<(), String>>>,
    calls: AtomicUsize,
}

impl MockServerProbe {
    pub fn new() -> Self {
        Self {
            results: Mutex::new(VecDeque::new()),
            calls: AtomicUsize::new(0),
        }
    }

    /// 追加后续探测结果；为空时探测成功
    pub fn push_results<I>(&self, results: I)
    where
        I: IntoIterator<Item = Result<(), String>>,
    {
        lock(&self.results).extend(results);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ServerProbe for MockServerProbe {
    async fn probe(&self, _server: &Server, _url: &Url) -> Result<(), String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        lock(&self.results).pop_front().unwrap_or(Ok(()))
    }
}

impl Default for MockServerProbe {
    fn default() -> Self {
        Self::new()
    }
}

// ===== 工厂方法 =====

pub struct TestContext {
    pub ctx: Arc<ServiceContext>,
    pub host: Arc<MockNativeHost>,
    pub directory: InMemoryServerDirectory,
    pub probe: Arc<MockServerProbe>,
}

/// 创建测试用 `ServiceContext`
pub fn create_test_context(config: OrchestratorConfig) -> TestContext {
    let host = Arc::new(MockNativeHost::new());
    let directory = InMemoryServerDirectory::new();
    let probe = Arc::new(MockServerProbe::new());

    let ctx = Arc::new(ServiceContext::new(
        Arc::new(directory.clone()),
        host.clone(),
        probe.clone(),
        Arc::new(StaticConfig::new(config)),
    ));

    TestContext {
        ctx,
        host,
        directory,
        probe,
    }
}

/// 创建一个用于测试的服务器，URL 为 `https://{id}.example.com/`
pub fn test_server(id: &str) -> Server {
    let url = Url::parse(&format!("https://{id}.example.com/"))
        .unwrap_or_else(|e| panic!("bad test url: {e}"));
    Server::new(id, format!("Server {id}"), url)
}

/// 取出接收端中已到达的全部信号
pub fn drain_events(rx: &mut broadcast::Receiver<ViewEvent>) -> Vec<ViewEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}
