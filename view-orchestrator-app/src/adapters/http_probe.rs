//! HTTP reachability probe
//!
//! Pings the server's system API; any HTTP answer with a success status and an `OK`
//! body counts as reachable.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use url::Url;
use view_orchestrator_core::error::{CoreError, CoreResult};
use view_orchestrator_core::traits::ServerProbe;
use view_orchestrator_core::types::Server;

const PING_PATH: &str = "api/v4/system/ping";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Deserialize)]
struct PingResponse {
    status: String,
}

/// `ServerProbe` backed by `reqwest`
#[derive(Debug, Clone)]
pub struct HttpServerProbe {
    client: reqwest::Client,
}

impl HttpServerProbe {
    /// Create a probe with the default request timeout
    pub fn new() -> CoreResult<Self> {
        Self::with_timeout(DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> CoreResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CoreError::ValidationError(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }

    /// Ping endpoint below the server base URL, respecting a subpath install
    pub fn ping_url(server: &Server) -> CoreResult<Url> {
        let mut base = server.url.clone();
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        Ok(base.join(PING_PATH)?)
    }
}

#[async_trait]
impl ServerProbe for HttpServerProbe {
    async fn probe(&self, server: &Server, _url: &Url) -> Result<(), String> {
        let ping = Self::ping_url(server).map_err(|e| e.to_string())?;
        log::debug!("[probe] GET {ping}");

        let response = self
            .client
            .get(ping)
            .send()
            .await
            .map_err(|e| e.to_string())?;
        let status = response.status();
        if !status.is_success() {
            return Err(format!("Ping returned HTTP {}", status.as_u16()));
        }

        let body: PingResponse = response.json().await.map_err(|e| e.to_string())?;
        if body.status.eq_ignore_ascii_case("ok") {
            Ok(())
        } else {
            Err(format!("Server reported status {}", body.status))
        }
    }
}
