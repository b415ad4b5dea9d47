//! Proxy runtime.
//!
//! Wires one shared session, rule set and dispatcher into a bridge per
//! configured port, then serves until a bridge fails or the operator quits.

use std::sync::Arc;

use anyhow::Context;
use tokio::io::{AsyncBufRead, BufReader};
use tokio::task::JoinSet;

use crate::bridge::{Bridge, BridgeHandles};
use crate::config::{check_tcp_listen_available, ProxyConfig};
use crate::console::{run_console, ConsoleExit};
use crate::core::{FumenExporter, ReplayExporter, SessionState};
use crate::diagnostics::{DiagnosticSink, TracingSink};
use crate::dispatch::Dispatcher;
use crate::rules::RuleSet;

/// A configured, not yet running proxy.
pub struct Proxy {
    config: ProxyConfig,
    dispatcher: Arc<Dispatcher>,
    bridges: Vec<Bridge>,
    handles: Vec<BridgeHandles>,
}

impl Proxy {
    /// Build with the default exporter and a `tracing` diagnostic sink.
    pub fn new(config: ProxyConfig) -> anyhow::Result<Self> {
        Self::with_collaborators(config, Arc::new(FumenExporter), Arc::new(TracingSink))
    }

    pub fn with_collaborators(
        config: ProxyConfig,
        exporter: Arc<dyn ReplayExporter>,
        sink: Arc<dyn DiagnosticSink>,
    ) -> anyhow::Result<Self> {
        let rules = match &config.rules_path {
            Some(path) => RuleSet::from_path(path)
                .with_context(|| format!("loading dispatch rules from {}", path.display()))?,
            None => RuleSet::default(),
        };
        let dispatcher = Arc::new(Dispatcher::new(
            Arc::new(SessionState::new()),
            Arc::new(rules),
            exporter,
            sink,
        ));

        let (bridges, handles): (Vec<_>, Vec<_>) = config
            .bridges()
            .into_iter()
            .map(|bridge| Bridge::new(bridge, Arc::clone(&dispatcher)))
            .unzip();

        Ok(Self {
            config,
            dispatcher,
            bridges,
            handles,
        })
    }

    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }

    pub fn session(&self) -> &Arc<SessionState> {
        self.dispatcher.session()
    }

    /// Injection handles, one per bridge in port order.
    pub fn handles(&self) -> &[BridgeHandles] {
        &self.handles
    }

    /// Fail if any listen port is already taken.
    pub fn check_ports(&self) -> anyhow::Result<()> {
        for bridge in &self.bridges {
            let config = bridge.config();
            check_tcp_listen_available(&config.listen_host, config.listen_port).with_context(
                || format!("listen address {} is not available", config.listen_addr()),
            )?;
        }
        Ok(())
    }

    /// Serve with the operator console on stdin (unless disabled).
    pub async fn run(self) -> anyhow::Result<()> {
        let input = self
            .config
            .console
            .then(|| BufReader::new(tokio::io::stdin()));
        self.run_with_input(input).await
    }

    /// Serve, reading operator commands from `input` when given.
    ///
    /// Returns `Ok(())` when the operator quits and an error when any bridge
    /// stops.
    pub async fn run_with_input<R>(self, input: Option<R>) -> anyhow::Result<()>
    where
        R: AsyncBufRead + Unpin + Send + 'static,
    {
        let Proxy {
            dispatcher,
            bridges,
            handles,
            ..
        } = self;

        let mut tasks = JoinSet::new();
        for bridge in bridges {
            tasks.spawn(bridge.run(None));
        }

        let console = match (input, handles.into_iter().next()) {
            (Some(input), Some(first)) => {
                let rules = Arc::clone(dispatcher.rules());
                Some(tokio::spawn(run_console(input, first, rules)))
            }
            _ => None,
        };

        let wait_console = async {
            match console {
                Some(task) => task.await,
                None => std::future::pending().await,
            }
        };
        tokio::pin!(wait_console);
        let mut console_open = true;

        loop {
            tokio::select! {
                exit = &mut wait_console, if console_open => {
                    match exit.context("console task panicked")? {
                        Ok(ConsoleExit::Quit) => return Ok(()),
                        Ok(ConsoleExit::InputClosed) => {
                            tracing::info!("console input closed, proxy keeps running");
                        }
                        Err(e) => tracing::warn!(error = %e, "console stopped"),
                    }
                    console_open = false;
                }
                joined = tasks.join_next() => {
                    let result = match joined {
                        Some(result) => result,
                        None => anyhow::bail!("no bridges configured"),
                    };
                    result.context("bridge task panicked")??;
                    anyhow::bail!("bridge stopped unexpectedly");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loopback_config() -> ProxyConfig {
        ProxyConfig {
            listen_host: "127.0.0.1".into(),
            upstream_host: "127.0.0.1".into(),
            ports: vec![0],
            rules_path: None,
            console: false,
        }
    }

    #[test]
    fn one_handle_per_port() {
        let mut config = loopback_config();
        config.ports = vec![0, 1];
        let proxy = Proxy::new(config).unwrap();
        assert_eq!(proxy.handles().len(), 2);
        assert!(!proxy.session().is_active());
    }

    #[test]
    fn missing_rules_file_fails_startup() {
        let mut config = loopback_config();
        config.rules_path = Some("/nonexistent/tf-rules.json".into());
        assert!(Proxy::new(config).is_err());
    }

    #[tokio::test]
    async fn quit_stops_the_proxy() {
        let proxy = Proxy::new(loopback_config()).unwrap();
        let input: &'static [u8] = b"c %xt%hello%\nquit\n";
        tokio::time::timeout(
            std::time::Duration::from_secs(2),
            proxy.run_with_input(Some(input)),
        )
        .await
        .expect("proxy did not stop")
        .unwrap();
    }
}
