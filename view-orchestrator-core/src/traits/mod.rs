//! Collaborator abstraction trait definitions

mod config_source;
mod native_host;
mod server_directory;
mod server_probe;

pub use config_source::{ConfigSource, StaticConfig};
pub use native_host::{ContentSurface, NativeHost, NativeWindow};
pub use server_directory::{InMemoryServerDirectory, ServerDirectory};
pub use server_probe::{NoopServerProbe, ServerProbe};
