//! TCP keep-alive configuration.
//!
//! Keep-alive is a liveness aid for detecting dead peers during long idle
//! periods (e.g. while the network path to the proxy changes), not a
//! correctness requirement. Failure to enable it leaves the connection
//! unprotected but otherwise functional.

use std::io;
use std::time::Duration;

use socket2::{SockRef, TcpKeepalive};
use tokio::net::TcpStream;
use tracing::warn;

/// Default keep-alive probe period for both legs.
pub const DEFAULT_KEEPALIVE_PERIOD: Duration = Duration::from_secs(30);

/// Enable periodic keep-alive probing on a connection.
pub fn enable_keepalive(stream: &TcpStream, period: Duration) -> io::Result<()> {
    let keepalive = TcpKeepalive::new().with_time(period).with_interval(period);
    SockRef::from(stream).set_tcp_keepalive(&keepalive)
}

/// Best-effort variant: a failure is logged and the connection proceeds
/// without keep-alive protection.
pub fn configure_keepalive(stream: &TcpStream, period: Duration, leg: &'static str) {
    if let Err(e) = enable_keepalive(stream, period) {
        warn!(leg, error = %e, "failed to enable TCP keep-alive");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_enable_keepalive_on_connected_socket() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).await.unwrap();
        let _server = listener.accept().await.unwrap();

        enable_keepalive(&client, Duration::from_secs(10)).unwrap();
        assert!(SockRef::from(&client).keepalive().unwrap());
    }
}
