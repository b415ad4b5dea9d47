//! Proxy module - transparent relay with live protocol decoding
//!
//! This crate sits between the game client and the game server. Every byte
//! is relayed unmodified in both directions while a copy of the stream is
//! framed and classified so game events can be tracked.
//!
//! # Data Flow
//!
//! ```text
//! client ──► Pump(FromClient) ──► upstream
//!               │ frame + dispatch
//!               ▼
//!           Dispatcher ──► SessionState / DiagnosticSink / ReplayExporter
//!               ▲
//!               │ frame + dispatch
//! client ◄── Pump(FromServer) ◄── upstream
//! ```
//!
//! # Wire Format
//!
//! Each application packet ends with a single NUL byte. Two dialects share
//! the stream:
//!
//! - **delimited**: `%xt%command%field%...%`, split on `%`
//! - **markup**: `<msg t="sys"><body action="joinOK" r="1">...</body></msg>`
//!
//! | Packet                  | Effect                                             |
//! |-------------------------|----------------------------------------------------|
//! | `%xt%snapShot%r%p%blob%`| decode, activate session if idle, append a frame   |
//! | `%xt%results%`          | export every player's frames, clear, go idle       |
//! | `%xt%zoneUserCount%...` | users online / games played report                 |
//! | known benign commands   | ignored (see [`rules::DispatchRules`])             |
//! | anything else           | reported to the [`DiagnosticSink`]                 |
//!
//! # Environment Variables
//!
//! - `TF_PROXY_LISTEN_HOST`: bind address (default: "0.0.0.0")
//! - `TF_PROXY_UPSTREAM_HOST`: game server (default: "50.56.1.203")
//! - `TF_PROXY_PORTS`: comma separated ports to proxy (default: 9339)
//! - `TF_PROXY_RULES`: optional JSON dispatch rules file
//! - `TF_PROXY_DISABLE_CONSOLE`: set to "1" or "true" to skip the stdin console
//!
//! # Implementation
//!
//! - Uses **tokio** for async networking, one task per direction
//! - Session mutations happen under one lock; rules are swapped atomically
//! - See [`bridge`] for the accept loop and [`pump`] for the relay loop

pub mod bridge;
pub mod config;
pub mod console;
pub mod diagnostics;
pub mod dispatch;
pub mod framing;
pub mod inject;
pub mod markup;
pub mod pump;
pub mod rules;
pub mod runtime;

pub use tf_sniffer_core as core;
pub use tf_sniffer_types as types;

pub use bridge::{Bridge, BridgeConfig, BridgeHandles, UpstreamConnectError};
pub use config::{check_tcp_listen_available, ConfigError, ProxyConfig};
pub use console::{run_console, ConsoleExit, OperatorCommand};
pub use diagnostics::{Diagnostic, DiagnosticSink, MemorySink, TracingSink};
pub use dispatch::{Dispatched, Dispatcher, ParseError};
pub use framing::FrameBuffer;
pub use inject::{injection_queue, InjectionQueue, Injector};
pub use pump::{Pump, PumpExit};
pub use rules::{DispatchRules, RuleSet, RulesError};
pub use runtime::Proxy;
