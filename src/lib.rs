//! TF sniffer (workspace facade crate).
//!
//! Exposes `tf_sniffer::{core,proxy,types}` while the implementation lives in
//! dedicated crates under `crates/`.

pub use tf_sniffer_core as core;
pub use tf_sniffer_proxy as proxy;
pub use tf_sniffer_types as types;
