//! Per-port session supervisor.
//!
//! One supervisor per configured port: bind, accept in a loop, spawn a
//! forwarding session per connection. Accept failures never terminate the
//! loop; a bind failure is fatal to this port only.

use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::Semaphore;
use tracing::{error, info, warn, Instrument};

use super::backoff::RetryPolicy;
use super::dialer::ProxyDial;
use super::error::ForwardError;
use super::keepalive::DEFAULT_KEEPALIVE_PERIOD;
use super::session::{ForwardingSession, SessionConfig, SessionOutcome};

/// Default cap on concurrent sessions per listener.
pub const DEFAULT_MAX_SESSIONS: usize = 10_000;

/// Configuration for one port's supervisor.
#[derive(Debug, Clone)]
pub struct ForwarderConfig {
    /// Address to bind to.
    pub bind_addr: SocketAddr,
    /// Destination every accepted connection is forwarded to.
    pub destination: String,
    /// Retry schedule for upstream dials.
    pub retry: RetryPolicy,
    /// Keep-alive probe period for both legs of each session.
    pub keepalive_period: Duration,
    /// Maximum concurrent sessions.
    pub max_sessions: usize,
}

impl ForwarderConfig {
    /// Create a configuration with default retry, keep-alive and session cap.
    pub fn new(bind_addr: SocketAddr, destination: String) -> Self {
        Self {
            bind_addr,
            destination,
            retry: RetryPolicy::default(),
            keepalive_period: DEFAULT_KEEPALIVE_PERIOD,
            max_sessions: DEFAULT_MAX_SESSIONS,
        }
    }

    fn session_config(&self) -> SessionConfig {
        SessionConfig {
            destination: self.destination.clone(),
            retry: self.retry,
            keepalive_period: self.keepalive_period,
        }
    }
}

/// Counters for one listener.
#[derive(Debug, Default)]
pub struct ForwarderStats {
    /// Total connections accepted.
    pub sessions_accepted: AtomicU64,
    /// Sessions currently running.
    pub sessions_active: AtomicU64,
    /// Sessions that reached a terminal state.
    pub sessions_closed: AtomicU64,
    /// Connections dropped because the session cap was reached.
    pub sessions_rejected: AtomicU64,
    /// Sessions that ended in DialFailed.
    pub dial_failures: AtomicU64,
    /// Sessions that ended in CopyError.
    pub copy_errors: AtomicU64,
}

/// Supervisor for one listening port.
pub struct PortForwarder {
    config: ForwarderConfig,
    listener: TcpListener,
    dialer: Arc<dyn ProxyDial>,
    session_permits: Arc<Semaphore>,
    stats: Arc<ForwarderStats>,
}

impl std::fmt::Debug for PortForwarder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PortForwarder")
            .field("config", &self.config)
            .field("listener", &self.listener)
            .field("session_permits", &self.session_permits)
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

impl PortForwarder {
    /// Bind the listening socket. Failure here is fatal to this port only.
    pub async fn bind(
        config: ForwarderConfig,
        dialer: Arc<dyn ProxyDial>,
    ) -> Result<Self, ForwardError> {
        let listener = TcpListener::bind(config.bind_addr)
            .await
            .map_err(|source| ForwardError::Bind {
                addr: config.bind_addr,
                source,
            })?;

        info!(
            listen_addr = %config.bind_addr,
            destination = %config.destination,
            "listener bound"
        );

        Ok(Self {
            session_permits: Arc::new(Semaphore::new(config.max_sessions)),
            listener,
            config,
            dialer,
            stats: Arc::new(ForwarderStats::default()),
        })
    }

    /// Address the listener actually bound to.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Listener counters.
    pub fn stats(&self) -> Arc<ForwarderStats> {
        Arc::clone(&self.stats)
    }

    /// Accept connections forever, dispatching each to its own session task.
    pub async fn run(self: Arc<Self>) -> io::Result<()> {
        let local_addr = self.listener.local_addr()?;
        info!(
            listen_addr = %local_addr,
            destination = %self.config.destination,
            "forwarding started"
        );

        loop {
            match self.listener.accept().await {
                Ok((client, peer_addr)) => {
                    let permit = match self.session_permits.clone().try_acquire_owned() {
                        Ok(permit) => permit,
                        Err(_) => {
                            self.stats.sessions_rejected.fetch_add(1, Ordering::Relaxed);
                            warn!(peer_addr = %peer_addr, "connection rejected: session cap reached");
                            continue;
                        }
                    };

                    self.stats.sessions_accepted.fetch_add(1, Ordering::Relaxed);
                    self.stats.sessions_active.fetch_add(1, Ordering::Relaxed);

                    let session = ForwardingSession::new(
                        client,
                        self.config.session_config(),
                        Arc::clone(&self.dialer),
                    );
                    let stats = Arc::clone(&self.stats);

                    tokio::spawn(
                        async move {
                            match session.run().await {
                                SessionOutcome::Closed => {}
                                SessionOutcome::DialFailed => {
                                    stats.dial_failures.fetch_add(1, Ordering::Relaxed);
                                }
                                SessionOutcome::CopyError => {
                                    stats.copy_errors.fetch_add(1, Ordering::Relaxed);
                                }
                            }
                            stats.sessions_active.fetch_sub(1, Ordering::Relaxed);
                            stats.sessions_closed.fetch_add(1, Ordering::Relaxed);
                            drop(permit);
                        }
                        .instrument(tracing::info_span!("session", peer = %peer_addr)),
                    );
                }
                Err(e) => {
                    error!(error = %e, "accept error");
                    // Brief sleep to avoid a tight loop on persistent errors.
                    tokio::time::sleep(Duration::from_millis(100)).await;
                }
            }
        }
    }
}
