//! Platform-agnostic collaborator adapters.

#[cfg(feature = "http-probe")]
mod http_probe;

#[cfg(feature = "http-probe")]
pub use http_probe::HttpServerProbe;
