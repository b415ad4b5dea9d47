//! Protocol dispatcher.
//!
//! Classifies one framed packet and routes it. Two dialects share the wire:
//!
//! - **Delimited**: `%xt%<command>%arg%...%`, fields separated by `%`.
//! - **Markup**: XML such as `<msg t="sys"><body action="joinOK" .../></msg>`.
//!
//! Dispatch only observes. Its outcome never influences what is relayed, and
//! every failure is reported to the diagnostic sink and swallowed by
//! [`Dispatcher::handle`].

use std::sync::Arc;

use arrayvec::ArrayVec;

use crate::core::{decode_snapshot, ReplayExporter, SessionState};
use crate::diagnostics::{Diagnostic, DiagnosticSink};
use crate::markup::dump_element;
use crate::rules::{DispatchRules, RuleSet};
use crate::types::Direction;

/// Maximum number of `%` fields accepted in one packet.
pub const MAX_FIELDS: usize = 32;

/// Bytes of an offending packet kept in parse-failure reports.
pub const PREFIX_LEN: usize = 80;

const DELIMITED_MARKER: char = '%';
const FIELD_DELIMITER: char = '%';
const EXTENSION_MARKER: &str = "xt";

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("packet is not valid UTF-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),
    #[error("delimited packet has no command field")]
    MissingCommand,
    #[error("delimited packet has more than {max} fields")]
    TooManyFields { max: usize },
    #[error("`{command}` expects {expected} fields, got {got}")]
    FieldCount {
        command: &'static str,
        expected: usize,
        got: usize,
    },
    #[error("malformed markup: {0}")]
    Markup(#[from] roxmltree::Error),
    #[error("<{tag}> is missing attribute `{attribute}`")]
    MissingAttribute { tag: String, attribute: &'static str },
    #[error("<{tag}> has no body element")]
    MissingBody { tag: String },
}

/// What dispatch did with a packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatched {
    /// Zero-length packet (adjacent delimiters).
    Empty,
    /// Known traffic with no tracked effect.
    Ignored,
    FrameRecorded {
        player: String,
        label: String,
        activated: bool,
    },
    FrameDropped {
        player: String,
    },
    GameEnded {
        players: usize,
        frames: usize,
    },
    /// `results` while no game was active.
    GameEndIgnored,
    UserCount {
        online: String,
        games: String,
    },
    /// Handed to the diagnostic sink as unrecognized.
    Diagnosed,
    /// Could not be parsed; reported to the sink.
    Rejected,
}

/// Routes packets into the session tracker and the diagnostic sink.
pub struct Dispatcher {
    session: Arc<SessionState>,
    rules: Arc<RuleSet>,
    exporter: Arc<dyn ReplayExporter>,
    sink: Arc<dyn DiagnosticSink>,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("session", &self.session)
            .field("rules", &self.rules)
            .finish_non_exhaustive()
    }
}

impl Dispatcher {
    pub fn new(
        session: Arc<SessionState>,
        rules: Arc<RuleSet>,
        exporter: Arc<dyn ReplayExporter>,
        sink: Arc<dyn DiagnosticSink>,
    ) -> Self {
        Self {
            session,
            rules,
            exporter,
            sink,
        }
    }

    pub fn session(&self) -> &Arc<SessionState> {
        &self.session
    }

    pub fn rules(&self) -> &Arc<RuleSet> {
        &self.rules
    }

    /// Dispatch a packet, reporting any parse error to the sink. Never fails.
    pub fn handle(&self, origin: Direction, packet: &[u8]) -> Dispatched {
        match self.dispatch(origin, packet) {
            Ok(outcome) => outcome,
            Err(e) => {
                let prefix = String::from_utf8_lossy(&packet[..packet.len().min(PREFIX_LEN)]);
                self.sink.report(
                    origin,
                    Diagnostic::ParseFailure {
                        error: e.to_string(),
                        prefix: prefix.into_owned(),
                    },
                );
                Dispatched::Rejected
            }
        }
    }

    /// Dispatch a packet, surfacing parse errors to the caller.
    pub fn dispatch(&self, origin: Direction, packet: &[u8]) -> Result<Dispatched, ParseError> {
        if packet.is_empty() {
            return Ok(Dispatched::Empty);
        }
        let text = std::str::from_utf8(packet)?;
        let rules = self.rules.snapshot();

        if text.starts_with(DELIMITED_MARKER) {
            self.dispatch_delimited(origin, text, &rules)
        } else {
            self.dispatch_markup(origin, text, &rules)
        }
    }

    fn dispatch_delimited(
        &self,
        origin: Direction,
        text: &str,
        rules: &DispatchRules,
    ) -> Result<Dispatched, ParseError> {
        let fields = split_fields(text)?;

        if fields[0] != EXTENSION_MARKER {
            self.sink.report(
                origin,
                Diagnostic::UnknownPacket {
                    raw: text.to_string(),
                },
            );
            return Ok(Dispatched::Diagnosed);
        }
        let command = *fields.get(1).ok_or(ParseError::MissingCommand)?;

        match command {
            "snapShot" => self.on_snapshot(origin, &fields[2..]),
            "results" => Ok(self.on_results(origin)),
            "zoneUserCount" => self.on_user_count(origin, &fields),
            _ if rules.ignores_command(command) => Ok(Dispatched::Ignored),
            _ => {
                self.sink.report(
                    origin,
                    Diagnostic::UnknownCommand {
                        fields: fields[1..].iter().map(|f| f.to_string()).collect(),
                    },
                );
                Ok(Dispatched::Diagnosed)
            }
        }
    }

    fn on_snapshot(&self, origin: Direction, args: &[&str]) -> Result<Dispatched, ParseError> {
        let [_room, player, blob] = args else {
            return Err(ParseError::FieldCount {
                command: "snapShot",
                expected: 3,
                got: args.len(),
            });
        };

        match decode_snapshot(blob) {
            Ok(snapshot) => {
                let recorded = self.session.record_frame(player, snapshot.grid);
                if recorded.activated {
                    tracing::info!("game started");
                }
                tracing::debug!(
                    player = *player,
                    label = %recorded.label,
                    frames = recorded.player_frames,
                    "added frame"
                );
                Ok(Dispatched::FrameRecorded {
                    player: player.to_string(),
                    label: recorded.label,
                    activated: recorded.activated,
                })
            }
            Err(e) => {
                self.sink.report(
                    origin,
                    Diagnostic::FrameDropped {
                        player: player.to_string(),
                        error: e.to_string(),
                    },
                );
                Ok(Dispatched::FrameDropped {
                    player: player.to_string(),
                })
            }
        }
    }

    fn on_results(&self, origin: Direction) -> Dispatched {
        let summary = self.session.end_game(|player, frames| {
            tracing::info!(player, frames = frames.len(), "encoding replay");
            let replay = self.exporter.export(player, frames);
            self.sink.report(
                origin,
                Diagnostic::Replay {
                    player: player.to_string(),
                    frames: frames.len(),
                    replay,
                },
            );
        });

        match summary {
            Some(summary) => {
                tracing::info!(
                    players = summary.players,
                    frames = summary.frames,
                    secs = summary.duration.as_secs(),
                    "game ended"
                );
                Dispatched::GameEnded {
                    players: summary.players,
                    frames: summary.frames,
                }
            }
            None => Dispatched::GameEndIgnored,
        }
    }

    fn on_user_count(&self, origin: Direction, fields: &[&str]) -> Result<Dispatched, ParseError> {
        // xt, zoneUserCount, <zone>, <online>, <unused>, <games played>
        let (Some(online), Some(games)) = (fields.get(3), fields.get(5)) else {
            return Err(ParseError::FieldCount {
                command: "zoneUserCount",
                expected: 6,
                got: fields.len(),
            });
        };
        self.sink.report(
            origin,
            Diagnostic::UserCount {
                online: online.to_string(),
                games: games.to_string(),
            },
        );
        Ok(Dispatched::UserCount {
            online: online.to_string(),
            games: games.to_string(),
        })
    }

    fn dispatch_markup(
        &self,
        origin: Direction,
        text: &str,
        rules: &DispatchRules,
    ) -> Result<Dispatched, ParseError> {
        // Flash policy documents carry a DOCTYPE.
        let options = roxmltree::ParsingOptions {
            allow_dtd: true,
            ..roxmltree::ParsingOptions::default()
        };
        let doc = roxmltree::Document::parse_with_options(text, options)?;
        let root = doc.root_element();
        let tag = root.tag_name().name();

        if tag == "msg" {
            let kind = root.attribute("t").ok_or_else(|| ParseError::MissingAttribute {
                tag: tag.to_string(),
                attribute: "t",
            })?;
            match kind {
                "sys" => {
                    let body = root.children().find(|n| n.is_element()).ok_or_else(|| {
                        ParseError::MissingBody {
                            tag: tag.to_string(),
                        }
                    })?;
                    return self.on_sys(origin, body, rules);
                }
                // Extension traffic travels in the delimited dialect in practice.
                "xt" => return Ok(Dispatched::Ignored),
                _ => {}
            }
        } else if rules.ignores_tag(tag) {
            return Ok(Dispatched::Ignored);
        }

        self.sink.report(
            origin,
            Diagnostic::UnknownTag {
                tag: tag.to_string(),
                dump: dump_element(root, rules.dump_depth, rules.dump_children),
            },
        );
        Ok(Dispatched::Diagnosed)
    }

    fn on_sys(
        &self,
        origin: Direction,
        body: roxmltree::Node<'_, '_>,
        rules: &DispatchRules,
    ) -> Result<Dispatched, ParseError> {
        let action = body
            .attribute("action")
            .ok_or_else(|| ParseError::MissingAttribute {
                tag: body.tag_name().name().to_string(),
                attribute: "action",
            })?;

        if rules.ignores_sys_action(action) {
            return Ok(Dispatched::Ignored);
        }

        self.sink.report(
            origin,
            Diagnostic::UnknownSysAction {
                action: action.to_string(),
                dump: dump_element(body, rules.dump_depth, rules.dump_children),
            },
        );
        Ok(Dispatched::Diagnosed)
    }
}

/// Strip every leading and trailing `%` and split on the rest.
fn split_fields(text: &str) -> Result<ArrayVec<&str, MAX_FIELDS>, ParseError> {
    let mut fields = ArrayVec::new();
    for field in text.trim_matches(FIELD_DELIMITER).split(FIELD_DELIMITER) {
        fields
            .try_push(field)
            .map_err(|_| ParseError::TooManyFields { max: MAX_FIELDS })?;
    }
    Ok(fields)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{encode_snapshot, FumenExporter};
    use crate::diagnostics::MemorySink;
    use crate::types::Grid;

    fn dispatcher() -> (Dispatcher, Arc<MemorySink>) {
        let sink = Arc::new(MemorySink::new());
        let d = Dispatcher::new(
            Arc::new(SessionState::new()),
            Arc::new(RuleSet::default()),
            Arc::new(FumenExporter),
            sink.clone(),
        );
        (d, sink)
    }

    #[test]
    fn split_fields_trims_all_outer_delimiters() {
        let f = split_fields("%%xt%a%%b%%").unwrap();
        assert_eq!(f.as_slice(), &["xt", "a", "", "b"]);
        let f = split_fields("%xt%").unwrap();
        assert_eq!(f.as_slice(), &["xt"]);
    }

    #[test]
    fn split_fields_rejects_overflow() {
        let text = format!("%{}%", vec!["x"; MAX_FIELDS + 1].join("%"));
        assert!(matches!(
            split_fields(&text),
            Err(ParseError::TooManyFields { max: MAX_FIELDS })
        ));
    }

    #[test]
    fn ignored_commands_have_no_effect() {
        let (d, sink) = dispatcher();
        for cmd in ["livePiece", "resultsDone", "TetrisLive", "topOut"] {
            let pkt = format!("%xt%{}%1%2%", cmd);
            assert_eq!(
                d.dispatch(Direction::FromServer, pkt.as_bytes()).unwrap(),
                Dispatched::Ignored
            );
        }
        assert!(sink.is_empty());
        assert!(!d.session().is_active());
    }

    #[test]
    fn unknown_command_goes_to_sink_with_remaining_fields() {
        let (d, sink) = dispatcher();
        let out = d.dispatch(Direction::FromClient, b"%xt%chat%1%hello%").unwrap();
        assert_eq!(out, Dispatched::Diagnosed);
        assert_eq!(
            sink.take(),
            vec![(
                Direction::FromClient,
                Diagnostic::UnknownCommand {
                    fields: vec!["chat".into(), "1".into(), "hello".into()]
                }
            )]
        );
    }

    #[test]
    fn non_xt_delimited_packet_is_diagnosed() {
        let (d, sink) = dispatcher();
        assert_eq!(
            d.dispatch(Direction::FromServer, b"%zz%1%").unwrap(),
            Dispatched::Diagnosed
        );
        assert!(matches!(
            &sink.take()[0].1,
            Diagnostic::UnknownPacket { raw } if raw == "%zz%1%"
        ));
    }

    #[test]
    fn missing_command_is_a_parse_error() {
        let (d, sink) = dispatcher();
        assert!(matches!(
            d.dispatch(Direction::FromServer, b"%xt%"),
            Err(ParseError::MissingCommand)
        ));
        assert_eq!(d.handle(Direction::FromServer, b"%xt%"), Dispatched::Rejected);
        let entries = sink.take();
        assert_eq!(entries.len(), 1);
        match &entries[0].1 {
            Diagnostic::ParseFailure { prefix, .. } => assert_eq!(prefix, "%xt%"),
            other => panic!("unexpected diagnostic {:?}", other),
        }
    }

    #[test]
    fn snapshot_with_wrong_arity_is_rejected() {
        let (d, _sink) = dispatcher();
        assert!(matches!(
            d.dispatch(Direction::FromServer, b"%xt%snapShot%room%player%"),
            Err(ParseError::FieldCount { command: "snapShot", expected: 3, got: 2 })
        ));
        assert!(!d.session().is_active());
    }

    #[test]
    fn undecodable_snapshot_drops_only_that_frame() {
        let (d, sink) = dispatcher();
        let out = d
            .dispatch(Direction::FromServer, b"%xt%snapShot%r%p1%@@notbase64@@%")
            .unwrap();
        assert_eq!(out, Dispatched::FrameDropped { player: "p1".into() });
        assert!(!d.session().is_active());
        assert!(matches!(&sink.take()[0].1, Diagnostic::FrameDropped { .. }));

        let blob = encode_snapshot(0, &Grid::empty()).unwrap();
        let pkt = format!("%xt%snapShot%r%p1%{}%", blob);
        assert!(matches!(
            d.dispatch(Direction::FromServer, pkt.as_bytes()).unwrap(),
            Dispatched::FrameRecorded { activated: true, .. }
        ));
        assert_eq!(d.session().frame_count("p1"), 1);
    }

    #[test]
    fn user_count_extracts_fields() {
        let (d, sink) = dispatcher();
        let out = d
            .dispatch(Direction::FromServer, b"%xt%zoneUserCount%1%243%%467315657%")
            .unwrap();
        assert_eq!(
            out,
            Dispatched::UserCount {
                online: "243".into(),
                games: "467315657".into()
            }
        );
        assert_eq!(sink.len(), 1);
        assert!(d
            .dispatch(Direction::FromServer, b"%xt%zoneUserCount%1%")
            .is_err());
    }

    #[test]
    fn sys_actions() {
        let (d, sink) = dispatcher();
        let ok = br#"<msg t="sys"><body action="joinOK" r="1"><pid id="0"/></body></msg>"#;
        assert_eq!(d.dispatch(Direction::FromServer, ok).unwrap(), Dispatched::Ignored);
        assert!(sink.is_empty());

        let unknown = br#"<msg t="sys"><body action="logout" r="0"><a/><b/><c/><d/></body></msg>"#;
        assert_eq!(
            d.dispatch(Direction::FromServer, unknown).unwrap(),
            Dispatched::Diagnosed
        );
        match &sink.take()[0].1 {
            Diagnostic::UnknownSysAction { action, dump } => {
                assert_eq!(action, "logout");
                assert!(dump[0].contains("<body>"));
                assert_eq!(dump.last().unwrap(), "  … 1 more children hidden");
            }
            other => panic!("unexpected diagnostic {:?}", other),
        }
    }

    #[test]
    fn markup_edge_cases() {
        let (d, sink) = dispatcher();
        assert_eq!(
            d.dispatch(Direction::FromClient, b"<policy-file-request/>").unwrap(),
            Dispatched::Ignored
        );
        assert_eq!(
            d.dispatch(Direction::FromClient, br#"<msg t="xt"><body/></msg>"#).unwrap(),
            Dispatched::Ignored
        );
        let policy = concat!(
            r#"<?xml version="1.0"?>"#,
            r#"<!DOCTYPE cross-domain-policy SYSTEM "http://www.adobe.com/xml/dtds/cross-domain-policy.dtd">"#,
            r#"<cross-domain-policy><allow-access-from domain="*" to-ports="9339"/></cross-domain-policy>"#,
        );
        assert_eq!(
            d.handle(Direction::FromServer, policy.as_bytes()),
            Dispatched::Ignored
        );
        assert!(sink.is_empty());

        assert!(matches!(
            d.dispatch(Direction::FromClient, br#"<msg t="sys"/>"#),
            Err(ParseError::MissingBody { .. })
        ));
        assert!(matches!(
            d.dispatch(Direction::FromClient, br#"<msg t="sys"><body/></msg>"#),
            Err(ParseError::MissingAttribute { attribute: "action", .. })
        ));
        assert!(matches!(
            d.dispatch(Direction::FromClient, b"<msg"),
            Err(ParseError::Markup(_))
        ));
        assert!(matches!(
            d.dispatch(Direction::FromClient, b"plain text"),
            Err(ParseError::Markup(_))
        ));
        assert!(matches!(
            d.dispatch(Direction::FromClient, &[0xff, 0xfe]),
            Err(ParseError::Utf8(_))
        ));

        assert_eq!(
            d.dispatch(Direction::FromServer, br#"<hello v="1"/>"#).unwrap(),
            Dispatched::Diagnosed
        );
        assert!(matches!(
            &sink.take()[0].1,
            Diagnostic::UnknownTag { tag, .. } if tag == "hello"
        ));
    }

    #[test]
    fn replaced_rules_apply_to_next_packet() {
        let (d, sink) = dispatcher();
        assert_eq!(
            d.dispatch(Direction::FromClient, b"%xt%chat%hi%").unwrap(),
            Dispatched::Diagnosed
        );
        let mut rules = DispatchRules::default();
        rules.ignored_commands.push("chat".into());
        d.rules().replace(rules);
        assert_eq!(
            d.dispatch(Direction::FromClient, b"%xt%chat%hi%").unwrap(),
            Dispatched::Ignored
        );
        assert_eq!(sink.len(), 1);
    }

    #[test]
    fn empty_packet() {
        let (d, sink) = dispatcher();
        assert_eq!(d.handle(Direction::FromServer, b""), Dispatched::Empty);
        assert!(sink.is_empty());
    }
}
