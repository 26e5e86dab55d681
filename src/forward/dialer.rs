//! Upstream dialing through the SOCKS5 proxy.
//!
//! The proxy client is an opaque capability behind [`ProxyDial`]: it performs
//! the SOCKS5 handshake itself and either yields a connected stream or fails.
//! [`connect_with_retry`] wraps any dialer in the retry/backoff schedule.

use std::io;

use async_trait::async_trait;
use tokio::net::TcpStream;
use tokio_socks::tcp::Socks5Stream;
use tracing::{debug, warn};

use super::backoff::RetryPolicy;
use super::error::ForwardError;

/// Capability to open a TCP connection to a destination address.
///
/// Implementations must be safe for concurrent use: a single dialer is shared
/// across every session in the process.
#[async_trait]
pub trait ProxyDial: Send + Sync {
    /// Open a connection to `destination` (`host:port`).
    async fn dial(&self, destination: &str) -> io::Result<TcpStream>;
}

/// Dialer that reaches destinations through an upstream SOCKS5 proxy.
#[derive(Debug, Clone)]
pub struct Socks5Dialer {
    proxy_addr: String,
}

impl Socks5Dialer {
    /// Create a dialer that connects via the proxy at `proxy_addr`.
    pub fn new(proxy_addr: String) -> Self {
        Self { proxy_addr }
    }
}

#[async_trait]
impl ProxyDial for Socks5Dialer {
    async fn dial(&self, destination: &str) -> io::Result<TcpStream> {
        let stream = Socks5Stream::connect(self.proxy_addr.as_str(), destination.to_string())
            .await
            .map_err(io::Error::other)?;
        Ok(stream.into_inner())
    }
}

/// Dial `destination`, retrying per `policy` with exponential backoff.
///
/// Any dial error is retried; the loop does not discriminate by error class.
/// The first success short-circuits remaining attempts. Exhausting the budget
/// yields [`ForwardError::DialExhausted`] carrying the last underlying error.
pub async fn connect_with_retry(
    dialer: &dyn ProxyDial,
    destination: &str,
    policy: &RetryPolicy,
) -> Result<TcpStream, ForwardError> {
    let mut last_err = None;

    for attempt in 0..policy.max_attempts {
        match dialer.dial(destination).await {
            Ok(stream) => {
                debug!(
                    destination,
                    attempt = attempt + 1,
                    "upstream dial succeeded"
                );
                return Ok(stream);
            }
            Err(e) => {
                if attempt + 1 < policy.max_attempts {
                    let delay = policy.delay(attempt);
                    warn!(
                        destination,
                        attempt = attempt + 1,
                        max_attempts = policy.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "upstream dial failed, retrying"
                    );
                    last_err = Some(e);
                    tokio::time::sleep(delay).await;
                } else {
                    warn!(
                        destination,
                        attempt = attempt + 1,
                        max_attempts = policy.max_attempts,
                        error = %e,
                        "upstream dial failed, budget exhausted"
                    );
                    last_err = Some(e);
                }
            }
        }
    }

    Err(ForwardError::DialExhausted {
        destination: destination.to_string(),
        attempts: policy.max_attempts,
        source: last_err.unwrap_or_else(|| io::Error::other("no dial attempts made")),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;
    use tokio::net::TcpListener;

    /// Fails the first `failures` attempts, then connects directly to a
    /// local target.
    struct FlakyDialer {
        target: SocketAddr,
        failures: u32,
        attempts: AtomicU32,
    }

    impl FlakyDialer {
        fn new(target: SocketAddr, failures: u32) -> Self {
            Self {
                target,
                failures,
                attempts: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl ProxyDial for FlakyDialer {
        async fn dial(&self, _destination: &str) -> io::Result<TcpStream> {
            let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
            if attempt < self.failures {
                return Err(io::Error::new(
                    io::ErrorKind::ConnectionRefused,
                    "connection refused",
                ));
            }
            TcpStream::connect(self.target).await
        }
    }

    async fn spawn_accepting_listener() -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            loop {
                let _ = listener.accept().await;
            }
        });
        addr
    }

    #[tokio::test]
    async fn test_first_attempt_success_short_circuits() {
        let target = spawn_accepting_listener().await;
        let dialer = FlakyDialer::new(target, 0);
        let policy = RetryPolicy::new(3, Duration::from_millis(10));

        let stream = connect_with_retry(&dialer, "upstream:80", &policy).await;
        assert!(stream.is_ok());
        assert_eq!(dialer.attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_failure_waits_base_delay() {
        let target = spawn_accepting_listener().await;
        let dialer = FlakyDialer::new(target, 1);
        let policy = RetryPolicy::new(3, Duration::from_millis(100));

        let start = tokio::time::Instant::now();
        let stream = connect_with_retry(&dialer, "upstream:80", &policy).await;
        let elapsed = start.elapsed();

        assert!(stream.is_ok());
        assert_eq!(dialer.attempts.load(Ordering::SeqCst), 2);
        // Exactly one backoff delay of the base duration elapsed.
        assert!(elapsed >= Duration::from_millis(100));
        assert!(elapsed < Duration::from_millis(200));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_after_max_attempts() {
        let target = spawn_accepting_listener().await;
        let dialer = FlakyDialer::new(target, u32::MAX);
        let policy = RetryPolicy::new(3, Duration::from_millis(10));

        let start = tokio::time::Instant::now();
        let err = connect_with_retry(&dialer, "upstream:80", &policy)
            .await
            .unwrap_err();
        let elapsed = start.elapsed();

        assert_eq!(dialer.attempts.load(Ordering::SeqCst), 3);
        // Delays of 10ms and 20ms before attempts 2 and 3; none after the last.
        assert!(elapsed >= Duration::from_millis(30));
        assert!(elapsed < Duration::from_millis(70));

        match err {
            ForwardError::DialExhausted {
                destination,
                attempts,
                ..
            } => {
                assert_eq!(destination, "upstream:80");
                assert_eq!(attempts, 3);
            }
            other => panic!("expected DialExhausted, got {other:?}"),
        }
    }
}
