//! Connection bridge.
//!
//! Accepts one game client at a time on the listen address, opens the matching
//! upstream connection and runs two pumps between them (client -> upstream and
//! upstream -> client). The next client is accepted only after both pumps of
//! the current pair have finished.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;

use crate::dispatch::Dispatcher;
use crate::inject::{injection_queue, InjectionQueue, Injector};
use crate::pump::{Pump, PumpExit};
use crate::types::Direction;

/// Pause after a failed `accept` (e.g. out of file descriptors).
pub const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(100);

/// One proxied endpoint. Immutable once the bridge starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeConfig {
    pub listen_host: String,
    pub listen_port: u16,
    pub upstream_host: String,
    pub upstream_port: u16,
}

impl BridgeConfig {
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.listen_host, self.listen_port)
    }

    pub fn upstream_addr(&self) -> String {
        format!("{}:{}", self.upstream_host, self.upstream_port)
    }
}

#[derive(Debug, thiserror::Error)]
#[error("cannot reach upstream {addr}: {source}")]
pub struct UpstreamConnectError {
    pub addr: String,
    #[source]
    pub source: std::io::Error,
}

/// Producer ends of a bridge's two injection queues.
#[derive(Debug, Clone)]
pub struct BridgeHandles {
    /// Packets written to the upstream server (client -> upstream direction).
    pub to_server: Injector,
    /// Packets written to the game client (upstream -> client direction).
    pub to_client: Injector,
}

/// Statistics for one finished client/upstream pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionStats {
    pub client_bytes: u64,
    pub server_bytes: u64,
    pub client_packets: u64,
    pub server_packets: u64,
}

pub struct Bridge {
    config: BridgeConfig,
    dispatcher: Arc<Dispatcher>,
    to_server: InjectionQueue,
    to_client: InjectionQueue,
}

impl Bridge {
    pub fn new(config: BridgeConfig, dispatcher: Arc<Dispatcher>) -> (Self, BridgeHandles) {
        let (to_server_tx, to_server) = injection_queue();
        let (to_client_tx, to_client) = injection_queue();
        let bridge = Self {
            config,
            dispatcher,
            to_server,
            to_client,
        };
        let handles = BridgeHandles {
            to_server: to_server_tx,
            to_client: to_client_tx,
        };
        (bridge, handles)
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Bind and serve forever.
    ///
    /// Returns only on a listener failure or if a pump task panics. `ready`
    /// receives the bound address once the listener is up.
    pub async fn run(self, ready: Option<oneshot::Sender<SocketAddr>>) -> anyhow::Result<()> {
        let Bridge {
            config,
            dispatcher,
            mut to_server,
            mut to_client,
        } = self;

        let listener = TcpListener::bind(config.listen_addr())
            .await
            .with_context(|| format!("failed to bind {}", config.listen_addr()))?;
        let bound = listener.local_addr()?;
        tracing::info!(listen = %bound, upstream = %config.upstream_addr(), "proxy listening");
        if let Some(tx) = ready {
            let _ = tx.send(bound);
        }

        loop {
            tracing::info!(port = bound.port(), "waiting for client");
            let (client, peer) = accept_retrying(|| listener.accept(), ACCEPT_RETRY_DELAY).await;

            let upstream = match connect_upstream(&config).await {
                Ok(stream) => stream,
                Err(e) => {
                    tracing::warn!(client = %peer, error = %e, "dropping client");
                    continue;
                }
            };
            tracing::info!(client = %peer, upstream = %config.upstream_addr(), "connection established");

            let (client_read, client_write) = client.into_split();
            let (upstream_read, upstream_write) = upstream.into_split();

            let outbound = Pump::new(
                Direction::FromClient,
                client_read,
                upstream_write,
                to_server,
                Arc::clone(&dispatcher),
            );
            let inbound = Pump::new(
                Direction::FromServer,
                upstream_read,
                client_write,
                to_client,
                Arc::clone(&dispatcher),
            );

            let outbound = tokio::spawn(outbound.run());
            let inbound = tokio::spawn(inbound.run());
            let (outbound, inbound) = tokio::join!(outbound, inbound);
            let outbound: PumpExit = outbound.context("client pump panicked")?;
            let inbound: PumpExit = inbound.context("server pump panicked")?;

            let stats = SessionStats {
                client_bytes: outbound.bytes_forwarded,
                server_bytes: inbound.bytes_forwarded,
                client_packets: outbound.packets,
                server_packets: inbound.packets,
            };
            tracing::info!(client = %peer, ?stats, "connection closed");

            to_server = outbound.queue;
            to_client = inbound.queue;
        }
    }
}

/// Call `accept` until it succeeds, sleeping `delay` after each failure.
async fn accept_retrying<F, Fut, T>(mut accept: F, delay: Duration) -> T
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::io::Result<T>>,
{
    loop {
        match accept().await {
            Ok(accepted) => return accepted,
            Err(e) => {
                tracing::warn!(error = %e, retry_ms = delay.as_millis() as u64, "accept failed");
                tokio::time::sleep(delay).await;
            }
        }
    }
}

async fn connect_upstream(config: &BridgeConfig) -> Result<TcpStream, UpstreamConnectError> {
    let addr = config.upstream_addr();
    let stream = TcpStream::connect(&addr)
        .await
        .map_err(|source| UpstreamConnectError {
            addr: addr.clone(),
            source,
        })?;
    // Game packets are small and latency sensitive.
    let _ = stream.set_nodelay(true);
    Ok(stream)
}
