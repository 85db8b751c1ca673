//! Server configuration from the environment.

use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;

use tracing::warn;

/// Port used when `PORT` is unset or invalid.
pub const DEFAULT_PORT: u16 = 3000;

/// Directory served for every path that is not an API route.
pub const DEFAULT_STATIC_DIR: &str = "public";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Listen address.
    pub addr: SocketAddr,
    /// Static client files.
    pub static_dir: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from((Ipv4Addr::UNSPECIFIED, DEFAULT_PORT)),
            static_dir: PathBuf::from(DEFAULT_STATIC_DIR),
        }
    }
}

impl ServerConfig {
    /// Read `PORT` and `INKBOARD_STATIC_DIR`.
    pub fn from_env() -> Self {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    fn from_vars(var: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(port) = var("PORT") {
            match port.trim().parse::<u16>() {
                Ok(port) => config.addr.set_port(port),
                Err(e) => warn!("Ignoring invalid PORT {:?}: {}", port, e),
            }
        }
        if let Some(dir) = var("INKBOARD_STATIC_DIR").filter(|d| !d.is_empty()) {
            config.static_dir = PathBuf::from(dir);
        }

        config
    }
}
