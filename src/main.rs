//! Burrow CLI entry point
//!
//! `burrow serve` runs the gateway; `burrow agent` exposes a loopback
//! service through a gateway. All behaviour lives in the library; this
//! binary only parses flags, layers them over an optional YAML config, and
//! wires the runtime.

// Use mimalloc as global allocator for better p99 latency
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use burrow::agent::{request_descriptor, Supervisor};
use burrow::{AgentConfig, GatewayConfig, Server, VERSION};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "burrow")]
#[command(version = VERSION)]
#[command(about = "Reverse-tunnel gateway for services behind NAT")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the public gateway
    Serve {
        /// Path to a YAML configuration file
        #[arg(short = 'c', long = "config")]
        config: Option<PathBuf>,

        /// Public bind address
        #[arg(long)]
        bind: Option<String>,

        /// Public HTTP port
        #[arg(short = 'p', long)]
        port: Option<u16>,

        /// Tunnel port agents dial into
        #[arg(long = "tunnel-port")]
        tunnel_port: Option<u16>,

        /// Base domain for subdomain routing (path routing when omitted)
        #[arg(long)]
        domain: Option<String>,

        /// Advertise https URLs in descriptors
        #[arg(long)]
        secure: bool,

        /// Require API keys and tunnel tokens
        #[arg(long)]
        auth: bool,

        /// Redirect target for GET / without ?new
        #[arg(long)]
        landing: Option<String>,

        /// Maximum endpoints per tunnel
        #[arg(long = "max-conns")]
        max_conns: Option<usize>,
    },
    /// Expose a loopback service through a gateway
    Agent {
        /// Gateway host to dial for tunnels
        #[arg(short = 'g', long)]
        gateway: String,

        /// Gateway tunnel port
        #[arg(long = "tunnel-port", default_value_t = burrow::config::DEFAULT_TUNNEL_PORT)]
        tunnel_port: u16,

        /// Loopback port of the local service
        #[arg(short = 'l', long = "local-port")]
        local_port: u16,

        /// Requested tunnel id (random when omitted)
        #[arg(long)]
        id: Option<String>,

        /// Tunnel token from a previous allocation; skips allocation
        #[arg(long)]
        token: Option<String>,

        /// Endpoints to keep dialled in
        #[arg(long, default_value_t = 10)]
        pool: usize,

        /// Public gateway address for allocation, host:port
        /// (defaults to <gateway>:8080)
        #[arg(long)]
        public: Option<String>,

        /// API key for auth-enabled gateways
        #[arg(long = "api-key")]
        api_key: Option<String>,
    },
}

fn main() -> anyhow::Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(num_cpus::get().max(2))
        .enable_all()
        .thread_name("burrow-worker")
        .build()?;

    runtime.block_on(async_main())
}

async fn async_main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("burrow=info".parse()?),
        )
        .init();

    let cli = Cli::parse();
    info!("burrow v{}", VERSION);

    match cli.command {
        Command::Serve {
            config,
            bind,
            port,
            tunnel_port,
            domain,
            secure,
            auth,
            landing,
            max_conns,
        } => {
            let mut gateway_config = match config {
                Some(path) => GatewayConfig::load_async(&path).await?,
                None => GatewayConfig::default(),
            };
            if let Some(bind) = bind {
                gateway_config.bind_address = bind;
            }
            if let Some(port) = port {
                gateway_config.bind_port = port;
            }
            if let Some(tunnel_port) = tunnel_port {
                gateway_config.tunnel_port = tunnel_port;
            }
            if let Some(domain) = domain {
                gateway_config.base_domain = Some(domain);
            }
            if secure {
                gateway_config.secure = true;
            }
            if auth {
                gateway_config.auth_enabled = true;
            }
            if let Some(landing) = landing {
                gateway_config.landing_url = landing;
            }
            if let Some(max_conns) = max_conns {
                gateway_config.max_conns_per_tunnel = max_conns;
            }

            let server = Server::new(gateway_config)?;
            server.run().await?;
        }
        Command::Agent {
            gateway,
            tunnel_port,
            local_port,
            id,
            token,
            pool,
            public,
            api_key,
        } => {
            let config = AgentConfig {
                gateway_host: gateway.clone(),
                tunnel_port,
                local_port,
                id: id.clone(),
                token: token.clone(),
                pool_size: pool,
            };

            let supervisor = if token.is_some() && id.is_some() {
                Supervisor::new(config)?
            } else {
                let public_addr = public.unwrap_or_else(|| format!("{}:8080", gateway));
                let descriptor =
                    request_descriptor(&public_addr, id.as_deref(), api_key.as_deref()).await?;
                if descriptor.url.is_empty() {
                    info!("tunnel {} allocated", descriptor.id);
                } else {
                    info!("tunnel {} allocated at {}", descriptor.id, descriptor.url);
                }
                Supervisor::from_descriptor(config, &descriptor)?
            };

            supervisor.run().await?;
        }
    }

    Ok(())
}
