use std::net::{SocketAddr, ToSocketAddrs};

use serde::{Deserialize, Serialize};

use crate::error::{ServerError, ServerResult};

/// Largest body accepted by `POST /contents/`.
pub const DEFAULT_MAX_CONTENT_SIZE: u64 = 5 * 1024 * 1024;

/// Largest multipart payload accepted by the journal endpoints.
pub const DEFAULT_MAX_JOURNAL_SIZE: u64 = 10 * 1024 * 1024;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    pub max_content_size: u64,
    pub max_journal_size: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
            max_content_size: DEFAULT_MAX_CONTENT_SIZE,
            max_journal_size: DEFAULT_MAX_JOURNAL_SIZE,
        }
    }
}

impl ServerConfig {
    /// Parse a TOML document; missing keys keep their defaults.
    pub fn from_toml(text: &str) -> ServerResult<Self> {
        toml::from_str(text).map_err(|e| ServerError::Config(e.to_string()))
    }

    /// Set the bind address from a `tcp://host:port` listen URL.
    pub fn with_api(mut self, api: &str) -> ServerResult<Self> {
        self.bind_addr = parse_api(api)?;
        Ok(self)
    }
}

/// Resolve a `tcp://host:port` listen URL. The scheme may be omitted.
pub fn parse_api(api: &str) -> ServerResult<SocketAddr> {
    let authority = match api.split_once("://") {
        Some(("tcp", rest)) => rest,
        Some((scheme, _)) => {
            return Err(ServerError::Config(format!(
                "unsupported listen scheme {scheme:?}"
            )))
        }
        None => api,
    };
    authority
        .trim_end_matches('/')
        .to_socket_addrs()
        .map_err(|e| ServerError::Config(format!("invalid listen address {api:?}: {e}")))?
        .next()
        .ok_or_else(|| ServerError::Config(format!("{api:?} resolved to no address")))
}
