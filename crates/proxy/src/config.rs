//! Proxy configuration from environment variables.

use std::path::PathBuf;

use crate::bridge::BridgeConfig;

pub const DEFAULT_LISTEN_HOST: &str = "0.0.0.0";
pub const DEFAULT_UPSTREAM_HOST: &str = "50.56.1.203";
pub const DEFAULT_PORT: u16 = 9339;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid port {value:?} in TF_PROXY_PORTS")]
    InvalidPort { value: String },
    #[error("TF_PROXY_PORTS lists no ports")]
    NoPorts,
    #[error("port {0} listed twice in TF_PROXY_PORTS")]
    DuplicatePort(u16),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyConfig {
    pub listen_host: String,
    pub upstream_host: String,
    /// Each port is listened on locally and connected to upstream.
    pub ports: Vec<u16>,
    pub rules_path: Option<PathBuf>,
    pub console: bool,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            listen_host: DEFAULT_LISTEN_HOST.to_string(),
            upstream_host: DEFAULT_UPSTREAM_HOST.to_string(),
            ports: vec![DEFAULT_PORT],
            rules_path: None,
            console: true,
        }
    }
}

impl ProxyConfig {
    /// Create from `TF_PROXY_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| {
            lookup(key)
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
        };

        let listen_host =
            non_empty("TF_PROXY_LISTEN_HOST").unwrap_or_else(|| DEFAULT_LISTEN_HOST.to_string());
        let upstream_host = non_empty("TF_PROXY_UPSTREAM_HOST")
            .unwrap_or_else(|| DEFAULT_UPSTREAM_HOST.to_string());
        let ports = match non_empty("TF_PROXY_PORTS") {
            Some(list) => parse_ports(&list)?,
            None => vec![DEFAULT_PORT],
        };
        let rules_path = non_empty("TF_PROXY_RULES").map(PathBuf::from);
        let console = !non_empty("TF_PROXY_DISABLE_CONSOLE")
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        Ok(Self {
            listen_host,
            upstream_host,
            ports,
            rules_path,
            console,
        })
    }

    /// One bridge per configured port.
    pub fn bridges(&self) -> Vec<BridgeConfig> {
        self.ports
            .iter()
            .map(|&port| BridgeConfig {
                listen_host: self.listen_host.clone(),
                listen_port: port,
                upstream_host: self.upstream_host.clone(),
                upstream_port: port,
            })
            .collect()
    }
}

fn parse_ports(list: &str) -> Result<Vec<u16>, ConfigError> {
    let mut ports = Vec::new();
    for item in list.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let port: u16 = item.parse().map_err(|_| ConfigError::InvalidPort {
            value: item.to_string(),
        })?;
        if ports.contains(&port) {
            return Err(ConfigError::DuplicatePort(port));
        }
        ports.push(port);
    }
    if ports.is_empty() {
        return Err(ConfigError::NoPorts);
    }
    Ok(ports)
}

/// Fail fast if `host:port` cannot be bound right now.
pub fn check_tcp_listen_available(host: &str, port: u16) -> std::io::Result<()> {
    let listener = std::net::TcpListener::bind((host, port))?;
    drop(listener);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_when_unset() {
        let config = ProxyConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, ProxyConfig::default());
        let bridges = config.bridges();
        assert_eq!(bridges.len(), 1);
        assert_eq!(bridges[0].upstream_addr(), "50.56.1.203:9339");
    }

    #[test]
    fn reads_every_variable() {
        let config = ProxyConfig::from_lookup(lookup(&[
            ("TF_PROXY_LISTEN_HOST", "127.0.0.1"),
            ("TF_PROXY_UPSTREAM_HOST", "example.test"),
            ("TF_PROXY_PORTS", "9339, 9340"),
            ("TF_PROXY_RULES", "rules.json"),
            ("TF_PROXY_DISABLE_CONSOLE", "TRUE"),
        ]))
        .unwrap();
        assert_eq!(config.listen_host, "127.0.0.1");
        assert_eq!(config.ports, vec![9339, 9340]);
        assert_eq!(config.rules_path, Some(PathBuf::from("rules.json")));
        assert!(!config.console);

        let bridges = config.bridges();
        assert_eq!(bridges[1].listen_addr(), "127.0.0.1:9340");
        assert_eq!(bridges[1].upstream_addr(), "example.test:9340");
    }

    #[test]
    fn blank_values_fall_back() {
        let config = ProxyConfig::from_lookup(lookup(&[
            ("TF_PROXY_LISTEN_HOST", "  "),
            ("TF_PROXY_RULES", ""),
        ]))
        .unwrap();
        assert_eq!(config.listen_host, DEFAULT_LISTEN_HOST);
        assert!(config.rules_path.is_none());
    }

    #[test]
    fn rejects_bad_port_lists() {
        assert_eq!(
            ProxyConfig::from_lookup(lookup(&[("TF_PROXY_PORTS", "9339,http")])),
            Err(ConfigError::InvalidPort {
                value: "http".into()
            })
        );
        assert_eq!(
            ProxyConfig::from_lookup(lookup(&[("TF_PROXY_PORTS", ",,")])),
            Err(ConfigError::NoPorts)
        );
        assert_eq!(
            ProxyConfig::from_lookup(lookup(&[("TF_PROXY_PORTS", "1,1")])),
            Err(ConfigError::DuplicatePort(1))
        );
    }
}
