//! Burrow - reverse-tunnel gateway
//!
//! Exposes HTTP(S)/WebSocket services running behind NAT. A publicly
//! reachable gateway pools long-lived TCP connections dialled out by an
//! agent and answers public requests over them:
//!
//! ```text
//!                 +----------------+
//!                 |  public mux    |  /api/status, /?new, proxy, upgrade
//!                 +-------+--------+
//!                         |
//!        +----------------+----------------+
//!        |                |                |
//! +------v------+  +------v------+  +------v------+
//! |  registry   |  |   proxies   |  |   tunnel    |
//! | (janitor)   |  | (req / ws)  |  |  listener   |
//! +------+------+  +-------------+  +------+------+
//!        |                                 |
//! +------v------+                   +------v------+
//! |    pools    | <---------------- |  endpoints  |  agent dial-ins
//! +-------------+                   +-------------+
//! ```
//!
//! The agent side ([`agent::Supervisor`]) maintains N endpoints, serving one
//! framed HTTP exchange at a time per endpoint and splicing raw bytes after
//! a 101 upgrade.

pub mod agent;
pub mod auth;
pub mod common;
pub mod config;
pub mod gateway;
pub mod registry;

pub use common::error::{Error, Result};
pub use config::{AgentConfig, GatewayConfig};

use auth::{AuthProvider, NoAuth};
use gateway::{AdminHandler, NoAdmin, PublicMux, TunnelListener};
use registry::TunnelRegistry;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Burrow version
pub const VERSION: &str = "0.3.0";

/// Gateway process: registry, both listeners, and the janitor as one
/// long-lived unit.
pub struct Server {
    config: GatewayConfig,
    registry: Arc<TunnelRegistry>,
    admin: Arc<dyn AdminHandler>,
}

impl Server {
    /// A gateway with no authentication and no admin surface.
    pub fn new(config: GatewayConfig) -> Result<Self> {
        Server::with_collaborators(config, Arc::new(NoAuth), Arc::new(NoAdmin))
    }

    /// A gateway with externally provided collaborators.
    pub fn with_collaborators(
        config: GatewayConfig,
        auth: Arc<dyn AuthProvider>,
        admin: Arc<dyn AdminHandler>,
    ) -> Result<Self> {
        config.validate()?;
        if config.auth_enabled && !auth.enabled() {
            return Err(Error::config(
                "auth-enabled is set but no authentication provider is wired in",
            ));
        }
        let registry = Arc::new(TunnelRegistry::new(
            auth,
            config.max_conns_per_tunnel,
            Duration::from_secs(config.inactive_secs),
        ));
        Ok(Server {
            config,
            registry,
            admin,
        })
    }

    pub fn registry(&self) -> &Arc<TunnelRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Bind both listeners and spawn the serving tasks plus the janitor.
    pub async fn start(&self) -> Result<RunningServer> {
        let public = TcpListener::bind((self.config.bind_address.as_str(), self.config.bind_port))
            .await?;
        let tunnel =
            TcpListener::bind((self.config.bind_address.as_str(), self.config.tunnel_port))
                .await?;
        let public_addr = public.local_addr()?;
        let tunnel_addr = tunnel.local_addr()?;

        let mux = Arc::new(PublicMux::new(
            self.registry.clone(),
            self.config.clone(),
            self.admin.clone(),
        ));
        let tunnel_listener = Arc::new(TunnelListener::new(
            self.registry.clone(),
            Duration::from_secs(self.config.handshake_timeout_secs),
        ));

        let mut handles = Vec::new();
        handles.push(tokio::spawn(async move {
            if let Err(e) = mux.serve(public).await {
                warn!("public listener error: {}", e);
            }
        }));
        handles.push(tokio::spawn(async move {
            if let Err(e) = tunnel_listener.serve(tunnel).await {
                warn!("tunnel listener error: {}", e);
            }
        }));
        handles.push(
            self.registry
                .start_janitor(Duration::from_secs(self.config.sweep_secs)),
        );

        info!(
            "gateway up: public {} tunnel {}",
            public_addr, tunnel_addr
        );
        Ok(RunningServer {
            public_addr,
            tunnel_addr,
            handles,
            registry: self.registry.clone(),
        })
    }

    /// Run until ctrl-c, then tear down: listeners aborted, janitor
    /// cancelled, every tunnel retired.
    pub async fn run(&self) -> Result<()> {
        let running = self.start().await?;
        tokio::signal::ctrl_c().await?;
        info!("received shutdown signal");
        running.shutdown().await;
        info!("gateway stopped");
        Ok(())
    }
}

/// Handles of a started gateway; dropping without [`shutdown`] leaves the
/// tasks running.
///
/// [`shutdown`]: RunningServer::shutdown
pub struct RunningServer {
    pub public_addr: SocketAddr,
    pub tunnel_addr: SocketAddr,
    handles: Vec<JoinHandle<()>>,
    registry: Arc<TunnelRegistry>,
}

impl RunningServer {
    pub async fn shutdown(self) {
        for handle in &self.handles {
            handle.abort();
        }
        self.registry.retire_all().await;
    }
}
