//! socksfwd
//!
//! Forwards TCP connections accepted on a set of local ports to fixed
//! destinations through one shared upstream SOCKS5 proxy. Byte-transparent:
//! no payload inspection, no framing.

pub mod config;
pub mod forward;
pub mod health;

pub use config::{Config, PortMapping};
pub use forward::{
    connect_with_retry, ForwarderConfig, ForwarderStats, ForwardError, ForwardingSession,
    PortForwarder, ProxyDial, RetryPolicy, SessionConfig, SessionOutcome, Socks5Dialer,
};
