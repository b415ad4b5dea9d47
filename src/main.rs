//! TF sniffer (default binary).
//!
//! Listens on the configured ports, relays each client to the game server and
//! logs decoded game events. Type `c <packet>` / `s <packet>` on stdin to
//! inject toward the server / client, `quit` to stop.

use anyhow::Result;

use tf_sniffer::proxy::{Proxy, ProxyConfig};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = ProxyConfig::from_env()?;
    tracing::info!(
        listen = %config.listen_host,
        upstream = %config.upstream_host,
        ports = ?config.ports,
        "starting proxy"
    );

    let proxy = Proxy::new(config)?;
    proxy.check_ports()?;

    let result = tokio::select! {
        result = proxy.run() => result,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("interrupted");
            Ok(())
        }
    };

    if let Err(e) = &result {
        tracing::error!(error = %format!("{e:#}"), "proxy stopped");
    }
    // A pending stdin read cannot be cancelled, so leave without waiting for
    // the runtime to wind down.
    std::process::exit(if result.is_ok() { 0 } else { 1 });
}
