//! Operator console.
//!
//! Line-oriented commands read from stdin (or any `AsyncBufRead`):
//!
//! | Input        | Effect                                         |
//! |--------------|------------------------------------------------|
//! | `c <text>`   | inject `<text>\0` toward the server            |
//! | `s <text>`   | inject `<text>\0` toward the client            |
//! | `reload`     | re-read the dispatch rules file                |
//! | `quit`/`exit`| stop the proxy                                 |
//!
//! Packets injected while no client is connected wait in the queue and go
//! out first once the next pair is bridged.

use std::sync::Arc;

use tokio::io::{AsyncBufRead, AsyncBufReadExt};

use crate::bridge::BridgeHandles;
use crate::rules::RuleSet;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperatorCommand {
    ToServer(String),
    ToClient(String),
    Reload,
    Quit,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConsoleError {
    #[error("unknown command {0:?} (expected c, s, reload, quit)")]
    Unknown(String),
    #[error("`{0}` needs packet text")]
    MissingPayload(&'static str),
}

impl OperatorCommand {
    /// Parse one input line. Blank lines yield `Ok(None)`.
    pub fn parse(line: &str) -> Result<Option<Self>, ConsoleError> {
        let line = line.trim_end_matches(['\r', '\n']);
        let trimmed = line.trim_start();
        if trimmed.trim_end().is_empty() {
            return Ok(None);
        }

        let (head, rest) = match trimmed.split_once(char::is_whitespace) {
            Some((head, rest)) => (head, rest),
            None => (trimmed, ""),
        };

        let command = match head {
            "c" => Self::ToServer(payload("c", rest)?),
            "s" => Self::ToClient(payload("s", rest)?),
            "reload" => Self::Reload,
            "quit" | "exit" => Self::Quit,
            other => return Err(ConsoleError::Unknown(other.to_string())),
        };
        Ok(Some(command))
    }
}

fn payload(command: &'static str, rest: &str) -> Result<String, ConsoleError> {
    if rest.trim().is_empty() {
        return Err(ConsoleError::MissingPayload(command));
    }
    Ok(rest.to_string())
}

/// Why the console loop returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleExit {
    Quit,
    InputClosed,
}

/// Read operator commands until `quit` or end of input.
pub async fn run_console<R>(
    input: R,
    handles: BridgeHandles,
    rules: Arc<RuleSet>,
) -> std::io::Result<ConsoleExit>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = input.lines();
    while let Some(line) = lines.next_line().await? {
        let command = match OperatorCommand::parse(&line) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(e) => {
                tracing::warn!("{e}");
                continue;
            }
        };

        match command {
            OperatorCommand::ToServer(text) => {
                if let Err(e) = handles.to_server.inject(text) {
                    tracing::warn!(error = %e, "injection toward server failed");
                }
            }
            OperatorCommand::ToClient(text) => {
                if let Err(e) = handles.to_client.inject(text) {
                    tracing::warn!(error = %e, "injection toward client failed");
                }
            }
            OperatorCommand::Reload => match rules.reload() {
                Ok(_) => {}
                Err(e) => tracing::warn!(error = %e, "rules reload failed, keeping current rules"),
            },
            OperatorCommand::Quit => {
                tracing::info!("operator requested shutdown");
                return Ok(ConsoleExit::Quit);
            }
        }
    }
    Ok(ConsoleExit::InputClosed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inject::injection_queue;

    #[test]
    fn parses_commands() {
        assert_eq!(
            OperatorCommand::parse("c %xt%chat%hi%"),
            Ok(Some(OperatorCommand::ToServer("%xt%chat%hi%".into())))
        );
        assert_eq!(
            OperatorCommand::parse("s <msg t='sys'/>\r\n"),
            Ok(Some(OperatorCommand::ToClient("<msg t='sys'/>".into())))
        );
        assert_eq!(OperatorCommand::parse("reload"), Ok(Some(OperatorCommand::Reload)));
        assert_eq!(OperatorCommand::parse("quit"), Ok(Some(OperatorCommand::Quit)));
        assert_eq!(OperatorCommand::parse("exit  "), Ok(Some(OperatorCommand::Quit)));
        assert_eq!(OperatorCommand::parse("   "), Ok(None));
    }

    #[test]
    fn payload_keeps_inner_spaces() {
        assert_eq!(
            OperatorCommand::parse("c  two  spaces"),
            Ok(Some(OperatorCommand::ToServer(" two  spaces".into())))
        );
    }

    #[test]
    fn rejects_unknown_and_empty() {
        assert_eq!(
            OperatorCommand::parse("x hello"),
            Err(ConsoleError::Unknown("x".into()))
        );
        assert_eq!(OperatorCommand::parse("c"), Err(ConsoleError::MissingPayload("c")));
        assert_eq!(OperatorCommand::parse("s   "), Err(ConsoleError::MissingPayload("s")));
    }

    #[tokio::test]
    async fn console_routes_to_queues() {
        let (to_server, mut server_queue) = injection_queue();
        let (to_client, mut client_queue) = injection_queue();
        let handles = BridgeHandles {
            to_server,
            to_client,
        };
        let input: &[u8] = b"c one\nbogus\ns two\nc three\nquit\nc never\n";

        let exit = run_console(input, handles, Arc::new(RuleSet::default()))
            .await
            .unwrap();
        assert_eq!(exit, ConsoleExit::Quit);

        assert_eq!(server_queue.try_pop().as_deref(), Some(&b"one\0"[..]));
        assert_eq!(server_queue.try_pop().as_deref(), Some(&b"three\0"[..]));
        assert!(server_queue.try_pop().is_none());
        assert_eq!(client_queue.try_pop().as_deref(), Some(&b"two\0"[..]));
        assert!(client_queue.try_pop().is_none());
    }

    #[tokio::test]
    async fn console_ends_with_input() {
        let (to_server, _server_queue) = injection_queue();
        let (to_client, _client_queue) = injection_queue();
        let handles = BridgeHandles {
            to_server,
            to_client,
        };
        let exit = run_console(&b"reload\n"[..], handles, Arc::new(RuleSet::default()))
            .await
            .unwrap();
        assert_eq!(exit, ConsoleExit::InputClosed);
    }
}
