//! Server reachability probe abstract Trait

use async_trait::async_trait;
use url::Url;

use crate::types::Server;

/// Reachability probe used by the background retry loop
///
/// Implementations typically ping the server API and refresh its remote info
/// before reporting success.
#[async_trait]
pub trait ServerProbe: Send + Sync {
    /// Probe `url` on `server`
    ///
    /// # Returns
    /// `Err` with a human-readable reason when the server cannot be reached.
    async fn probe(&self, server: &Server, url: &Url) -> Result<(), String>;
}

/// Probe that always reports the server reachable
///
/// The background loop then simply reloads at every interval.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopServerProbe;

#[async_trait]
impl ServerProbe for NoopServerProbe {
    async fn probe(&self, _server: &Server, _url: &Url) -> Result<(), String> {
        Ok(())
    }
}
