//! Error types for the forwarding subsystem.

use std::io;
use std::net::SocketAddr;

use thiserror::Error;

/// Errors that cross a session or listener boundary.
///
/// Keep-alive setup failures and copy errors deliberately have no variant
/// here: they are logged where they occur and never escape the affected
/// session.
#[derive(Debug, Error)]
pub enum ForwardError {
    /// The upstream destination stayed unreachable through the whole retry
    /// budget. The affected session is abandoned; others are untouched.
    #[error("upstream dial to {destination} exhausted after {attempts} attempts: {source}")]
    DialExhausted {
        destination: String,
        attempts: u32,
        #[source]
        source: io::Error,
    },

    /// Binding a listening socket failed. Fatal to that port's supervisor
    /// only.
    #[error("failed to bind listener on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },
}
