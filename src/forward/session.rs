//! Per-connection forwarding session.
//!
//! A session owns one accepted client connection and, once the dial
//! succeeds, the matching upstream connection. It moves through
//! `Dialing -> Forwarding -> Draining -> Closed`, with `DialFailed` as the
//! alternate terminal when the retry budget runs out before any bytes are
//! exchanged.
//!
//! The copy directions coordinate teardown with a half-close protocol:
//!
//! - client->upstream finishes (client EOF or error): shut down the upstream
//!   write half so the upstream sees end-of-stream, then signal cancellation.
//! - upstream->client finishes (upstream EOF or error): shut down the client
//!   write half so the client sees end-of-stream, signal cancellation, and
//!   the cancellation aborts a client->upstream read still in flight.
//!
//! The second rule is what guarantees the session reaches `Closed` in finite
//! time: without it, a client that never closes its side would pin the
//! client->upstream direction on a blocked read forever after the upstream
//! leg has already finished.
//!
//! There is no idle-read deadline. Long-lived idle tunnels are legitimate;
//! dead peers are detected by keep-alive probing instead.

use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::Notify;
use tracing::{debug, info, warn};

use super::backoff::RetryPolicy;
use super::dialer::{connect_with_retry, ProxyDial};
use super::keepalive::{configure_keepalive, DEFAULT_KEEPALIVE_PERIOD};

const COPY_BUF_SIZE: usize = 8192;

/// How a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    /// Both directions drained and both connections are closed.
    Closed,
    /// The upstream dial exhausted its retry budget; no bytes were exchanged.
    DialFailed,
    /// A copy direction hit an I/O error other than end-of-stream.
    CopyError,
}

/// Per-session parameters, shared by every session of one listener.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Destination address (`host:port`) to dial through the proxy.
    pub destination: String,
    /// Retry schedule for the upstream dial.
    pub retry: RetryPolicy,
    /// Keep-alive probe period applied to both legs.
    pub keepalive_period: Duration,
}

impl SessionConfig {
    /// Create a config with default retry and keep-alive settings.
    pub fn new(destination: String) -> Self {
        Self {
            destination,
            retry: RetryPolicy::default(),
            keepalive_period: DEFAULT_KEEPALIVE_PERIOD,
        }
    }
}

/// One accepted client connection being forwarded upstream.
pub struct ForwardingSession {
    client: TcpStream,
    config: SessionConfig,
    dialer: Arc<dyn ProxyDial>,
}

impl ForwardingSession {
    /// Create a session for an accepted client connection.
    pub fn new(client: TcpStream, config: SessionConfig, dialer: Arc<dyn ProxyDial>) -> Self {
        Self {
            client,
            config,
            dialer,
        }
    }

    /// Drive the session to a terminal state.
    ///
    /// Both connection handles are closed by the time this returns,
    /// whichever direction finished first.
    pub async fn run(mut self) -> SessionOutcome {
        configure_keepalive(&self.client, self.config.keepalive_period, "client");

        let mut upstream = match connect_with_retry(
            self.dialer.as_ref(),
            &self.config.destination,
            &self.config.retry,
        )
        .await
        {
            Ok(stream) => stream,
            Err(e) => {
                warn!(
                    destination = %self.config.destination,
                    error = %e,
                    "abandoning session: upstream unreachable"
                );
                return SessionOutcome::DialFailed;
            }
        };

        configure_keepalive(&upstream, self.config.keepalive_period, "upstream");

        let (bytes_to_upstream, bytes_to_client, outcome) =
            forward(&mut self.client, &mut upstream, &self.config.destination).await;

        info!(
            destination = %self.config.destination,
            bytes_to_upstream,
            bytes_to_client,
            outcome = ?outcome,
            "session closed"
        );

        outcome
    }
}

/// Run both copy directions until each has terminated.
///
/// Returns (bytes client->upstream, bytes upstream->client, outcome).
async fn forward(
    client: &mut TcpStream,
    upstream: &mut TcpStream,
    destination: &str,
) -> (u64, u64, SessionOutcome) {
    let (mut client_read, mut client_write) = client.split();
    let (mut upstream_read, mut upstream_write) = upstream.split();

    let cancel = Notify::new();
    let bytes_to_upstream = AtomicU64::new(0);
    let bytes_to_client = AtomicU64::new(0);

    let client_to_upstream = async {
        let result = tokio::select! {
            r = copy_stream(&mut client_read, &mut upstream_write, &bytes_to_upstream) => r,
            // Forced close: the downstream direction finished and the
            // upstream leg is gone, so a read still blocked here can never
            // deliver anything.
            _ = cancel.notified() => Ok(()),
        };
        let _ = upstream_write.shutdown().await;
        cancel.notify_one();
        result
    };

    let upstream_to_client = async {
        let result = copy_stream(&mut upstream_read, &mut client_write, &bytes_to_client).await;
        let _ = client_write.shutdown().await;
        cancel.notify_one();
        result
    };

    let (up_result, down_result) = tokio::join!(client_to_upstream, upstream_to_client);

    if let Err(e) = &up_result {
        warn!(destination, direction = "client->upstream", error = %e, "copy failed");
    }
    if let Err(e) = &down_result {
        warn!(destination, direction = "upstream->client", error = %e, "copy failed");
    }

    let outcome = if up_result.is_ok() && down_result.is_ok() {
        SessionOutcome::Closed
    } else {
        SessionOutcome::CopyError
    };

    debug!(destination, "both copy directions terminated");

    (
        bytes_to_upstream.load(Ordering::Relaxed),
        bytes_to_client.load(Ordering::Relaxed),
        outcome,
    )
}

/// Copy bytes until the reader signals end-of-input or either side errors.
async fn copy_stream<R, W>(reader: &mut R, writer: &mut W, copied: &AtomicU64) -> io::Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; COPY_BUF_SIZE];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) => return Ok(()),
            Ok(n) => {
                writer.write_all(&buf[..n]).await?;
                copied.fetch_add(n as u64, Ordering::Relaxed);
            }
            Err(e) => return Err(e),
        }
    }
}
