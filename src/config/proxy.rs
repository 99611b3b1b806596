// src/config/proxy.rs
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{RelayError, Result};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProxyKind {
    #[default]
    Socks5,
    Http,
}

/// Egress proxy for media downloads. An empty `host` disables it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyConfig {
    #[serde(default)]
    pub kind: ProxyKind,
    #[serde(default)]
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

impl ProxyConfig {
    pub fn is_enabled(&self) -> bool {
        !self.host.trim().is_empty()
    }

    /// Proxy URL understood by reqwest. Credentials are percent-encoded into the userinfo.
    pub fn url(&self) -> Result<String> {
        let scheme = match self.kind {
            ProxyKind::Socks5 => "socks5h",
            ProxyKind::Http => "http",
        };
        let raw = format!("{scheme}://{}:{}", self.host.trim(), self.port);
        let mut url = Url::parse(&raw)
            .map_err(|e| RelayError::Config(format!("invalid proxy address {raw}: {e}")))?;
        if let Some(user) = self.user.as_deref().filter(|u| !u.is_empty()) {
            url.set_username(user)
                .map_err(|_| RelayError::Config(format!("proxy {raw} cannot carry a user")))?;
            url.set_password(self.password.as_deref())
                .map_err(|_| RelayError::Config(format!("proxy {raw} cannot carry a password")))?;
        }
        Ok(url.into())
    }
}
