//! Gateway side: tunnel-port listener, public multiplexer, proxies, and the
//! JSON status surfaces

pub mod api;
pub mod listener;
pub mod mux;
pub mod proxy;

pub use api::{AdminHandler, NoAdmin, TunnelDescriptor};
pub use listener::TunnelListener;
pub use mux::PublicMux;
pub use proxy::ProxyOutcome;
