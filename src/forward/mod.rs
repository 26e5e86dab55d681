//! SOCKS5 port forwarding.
//!
//! This module provides:
//! - Per-port TCP listeners (one supervisor per configured port)
//! - Upstream dialing through a shared SOCKS5 proxy with retry/backoff
//! - Per-connection forwarding sessions with half-close-aware teardown
//! - Best-effort TCP keep-alive on both legs
//!
//! ## Architecture
//!
//! ```text
//! Client -> PortForwarder -> ForwardingSession -> ProxyDial (SOCKS5) -> Destination
//!                                  |
//!                     two copy directions, joined teardown
//! ```
//!
//! ## Usage
//!
//! ```ignore
//! use socksfwd::forward::{ForwarderConfig, PortForwarder, Socks5Dialer};
//!
//! let dialer = Arc::new(Socks5Dialer::new("localhost:1055".to_string()));
//! let config = ForwarderConfig::new("0.0.0.0:5432".parse()?, "db.internal:5432".to_string());
//! let forwarder = Arc::new(PortForwarder::bind(config, dialer).await?);
//! forwarder.run().await?;
//! ```

mod backoff;
mod dialer;
mod error;
mod keepalive;
mod listener;
mod session;

pub use backoff::{RetryPolicy, DEFAULT_BASE_DELAY, DEFAULT_MAX_ATTEMPTS};
pub use dialer::{connect_with_retry, ProxyDial, Socks5Dialer};
pub use error::ForwardError;
pub use keepalive::{configure_keepalive, enable_keepalive, DEFAULT_KEEPALIVE_PERIOD};
pub use listener::{ForwarderConfig, ForwarderStats, PortForwarder, DEFAULT_MAX_SESSIONS};
pub use session::{ForwardingSession, SessionConfig, SessionOutcome};
