//! socksfwd
//!
//! Tunnel a set of local TCP ports to fixed destinations through one shared
//! SOCKS5 proxy.
//!
//! This binary:
//! - Loads the port-to-destination mapping from a TOML file
//! - Binds one listener per configured port
//! - Forwards each accepted connection through the proxy
//! - Serves liveness/readiness endpoints for orchestration

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use socksfwd::config::Config;
use socksfwd::forward::{ForwarderConfig, PortForwarder, ProxyDial, Socks5Dialer};
use socksfwd::health;

#[derive(Debug, Parser)]
#[command(name = "socksfwd", version, about = "SOCKS5 port forwarder")]
struct Cli {
    /// Path to the forwarding configuration file.
    #[arg(long, env = "FWD_CONFIG", default_value = "config.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load(&cli.config)?;

    // Initialize tracing (prefer RUST_LOG, fallback to the configured level)
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| config.log_level.clone().into()))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("starting socksfwd");
    info!(
        proxy_addr = %config.proxy_addr,
        mapping_count = config.forwards.len(),
        health_port = config.health_port,
        "configuration loaded"
    );

    if config.forwards.is_empty() {
        warn!("no forward entries configured; only health endpoints will be served");
    }

    let dialer: Arc<dyn ProxyDial> = Arc::new(Socks5Dialer::new(config.proxy_addr.clone()));
    let retry = config.retry_policy();
    let keepalive_period = config.keepalive_period();

    let mut handles = Vec::new();
    let mut bound = 0usize;

    for mapping in &config.forwards {
        let bind_addr = SocketAddr::from(([0, 0, 0, 0], mapping.port));
        let mut forwarder_config = ForwarderConfig::new(bind_addr, mapping.destination.clone());
        forwarder_config.retry = retry;
        forwarder_config.keepalive_period = keepalive_period;

        match PortForwarder::bind(forwarder_config, Arc::clone(&dialer)).await {
            Ok(forwarder) => {
                info!(
                    listen_addr = %bind_addr,
                    destination = %mapping.destination,
                    proxy_addr = %config.proxy_addr,
                    "forwarding port"
                );
                bound += 1;
                let forwarder = Arc::new(forwarder);
                handles.push(tokio::spawn(async move {
                    if let Err(e) = forwarder.run().await {
                        error!(error = %e, "listener error");
                    }
                }));
            }
            // Fatal to this port only; the remaining ports keep going.
            Err(e) => {
                error!(listen_addr = %bind_addr, error = %e, "failed to bind listener");
            }
        }
    }

    if bound == 0 && !config.forwards.is_empty() {
        anyhow::bail!("all listeners failed to bind");
    }

    let health_port = config.health_port;
    handles.push(tokio::spawn(async move {
        if let Err(e) = health::serve(health_port).await {
            error!(error = %e, "health server failed");
        }
    }));

    for handle in handles {
        let _ = handle.await;
    }

    Ok(())
}
