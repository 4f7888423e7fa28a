//! Configuration module

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::fs;

/// Default port the tunnel listener binds and agents dial.
pub const DEFAULT_TUNNEL_PORT: u16 = 62322;

/// Default maximum concurrent endpoints per tunnel.
pub const DEFAULT_MAX_CONNS: usize = 10;

/// Gateway-side configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct GatewayConfig {
    /// Public bind address
    pub bind_address: String,

    /// Public HTTP port
    pub bind_port: u16,

    /// Port the tunnel listener accepts agent dial-ins on
    pub tunnel_port: u16,

    /// Base domain for subdomain routing; path routing when absent
    pub base_domain: Option<String>,

    /// Advertise https URLs in descriptors (TLS terminates upstream)
    pub secure: bool,

    /// Require API keys for allocation and tokens for agent dial-ins
    pub auth_enabled: bool,

    /// Where `GET /` without `?new` redirects
    pub landing_url: String,

    /// Maximum concurrent endpoints per tunnel
    pub max_conns_per_tunnel: usize,

    /// Seconds of inactivity before the janitor retires a tunnel
    pub inactive_secs: u64,

    /// Seconds between janitor sweeps
    pub sweep_secs: u64,

    /// Deadline for the id/token handshake lines on the tunnel port
    pub handshake_timeout_secs: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        GatewayConfig {
            bind_address: "0.0.0.0".to_string(),
            bind_port: 8080,
            tunnel_port: DEFAULT_TUNNEL_PORT,
            base_domain: None,
            secure: false,
            auth_enabled: false,
            landing_url: "https://github.com".to_string(),
            max_conns_per_tunnel: DEFAULT_MAX_CONNS,
            inactive_secs: 3600,
            sweep_secs: 300,
            handshake_timeout_secs: 5,
        }
    }
}

impl GatewayConfig {
    /// Load configuration from file (synchronous)
    pub fn load(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: GatewayConfig = serde_yaml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from file (async)
    pub async fn load_async<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path).await?;
        let config: GatewayConfig = serde_yaml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from string
    pub fn from_str(content: &str) -> Result<Self> {
        let config: GatewayConfig = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.bind_port != 0 && self.bind_port == self.tunnel_port {
            return Err(Error::config(
                "public port and tunnel port must differ",
            ));
        }
        if let Some(domain) = &self.base_domain {
            if domain.is_empty() || domain.starts_with('.') {
                return Err(Error::config(format!("invalid base domain: {}", domain)));
            }
        }
        if self.max_conns_per_tunnel == 0 {
            return Err(Error::config("max-conns-per-tunnel must be at least 1"));
        }
        Ok(())
    }

    /// URL scheme advertised in descriptors
    pub fn scheme(&self) -> &'static str {
        if self.secure {
            "https"
        } else {
            "http"
        }
    }

    /// Public URL for a tunnel id; empty without a base domain
    pub fn public_url(&self, id: &str) -> String {
        match &self.base_domain {
            Some(domain) => format!("{}://{}.{}", self.scheme(), id, domain),
            None => String::new(),
        }
    }
}

/// Agent-side configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct AgentConfig {
    /// Gateway host to dial
    pub gateway_host: String,

    /// Gateway tunnel port
    pub tunnel_port: u16,

    /// Loopback port the tunnelled service listens on
    pub local_port: u16,

    /// Tunnel id; a random one is requested when absent
    pub id: Option<String>,

    /// Bearer token bound to the tunnel id (auth-enabled gateways)
    pub token: Option<String>,

    /// Number of persistent endpoints to maintain
    pub pool_size: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        AgentConfig {
            gateway_host: "127.0.0.1".to_string(),
            tunnel_port: DEFAULT_TUNNEL_PORT,
            local_port: 8000,
            id: None,
            token: None,
            pool_size: DEFAULT_MAX_CONNS,
        }
    }
}

impl AgentConfig {
    pub fn from_str(content: &str) -> Result<Self> {
        let config: AgentConfig = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.gateway_host.is_empty() {
            return Err(Error::config("gateway-host must be set"));
        }
        if self.pool_size == 0 {
            return Err(Error::config("pool-size must be at least 1"));
        }
        Ok(())
    }
}
