//! Dispatch rules.
//!
//! The classification tables the dispatcher consults (which commands, system
//! actions and markup tags are benign, and how much of an unknown element to
//! dump) live in [`DispatchRules`]. A [`RuleSet`] holds the current table and
//! swaps it atomically, so rules can be updated without touching live
//! connections. Every packet is classified against one consistent snapshot.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum RulesError {
    #[error("failed to read rules file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid rules: {0}")]
    Json(#[from] serde_json::Error),
    #[error("rule set has no backing file to reload from")]
    NoSource,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchRules {
    /// `%xt%` commands with no tracked effect.
    pub ignored_commands: Vec<String>,
    /// `<msg t="sys">` actions with no tracked effect.
    pub ignored_sys_actions: Vec<String>,
    /// Markup root tags that are dropped silently.
    pub ignored_tags: Vec<String>,
    /// Depth limit when dumping unknown elements.
    pub dump_depth: usize,
    /// Children shown per element when dumping unknown elements.
    pub dump_children: usize,
}

impl Default for DispatchRules {
    fn default() -> Self {
        fn owned(items: &[&str]) -> Vec<String> {
            items.iter().map(|s| s.to_string()).collect()
        }

        Self {
            // livePiece: piece placement. resultsDone/TetrisLive: next game
            // starting. topOut: a player died.
            ignored_commands: owned(&["livePiece", "resultsDone", "TetrisLive", "topOut"]),
            ignored_sys_actions: owned(&[
                "uCount",
                "uER",
                "uVarsUpdate",
                "roomAdd",
                "roomDel",
                "rmList",
                "joinOK",
                "setUvars",
                "verChk",
                "apiOK",
                "login",
                "autoJoin",
            ]),
            ignored_tags: owned(&["policy-file-request", "cross-domain-policy"]),
            dump_depth: 2,
            dump_children: 3,
        }
    }
}

impl DispatchRules {
    pub fn from_json(text: &str) -> Result<Self, RulesError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, RulesError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| RulesError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&text)
    }

    pub fn ignores_command(&self, command: &str) -> bool {
        self.ignored_commands.iter().any(|c| c == command)
    }

    pub fn ignores_sys_action(&self, action: &str) -> bool {
        self.ignored_sys_actions.iter().any(|a| a == action)
    }

    pub fn ignores_tag(&self, tag: &str) -> bool {
        self.ignored_tags.iter().any(|t| t == tag)
    }
}

/// Atomically replaceable rule table.
#[derive(Debug)]
pub struct RuleSet {
    current: RwLock<Arc<DispatchRules>>,
    source: Option<PathBuf>,
}

impl Default for RuleSet {
    fn default() -> Self {
        Self::new(DispatchRules::default())
    }
}

impl RuleSet {
    pub fn new(rules: DispatchRules) -> Self {
        Self {
            current: RwLock::new(Arc::new(rules)),
            source: None,
        }
    }

    /// Load rules from a JSON file and remember the path for [`reload`](Self::reload).
    pub fn from_path(path: impl Into<PathBuf>) -> Result<Self, RulesError> {
        let path = path.into();
        let rules = DispatchRules::load(&path)?;
        Ok(Self {
            current: RwLock::new(Arc::new(rules)),
            source: Some(path),
        })
    }

    /// The rules in force right now.
    pub fn snapshot(&self) -> Arc<DispatchRules> {
        Arc::clone(&self.current.read())
    }

    /// Swap in a new table, returning the old one.
    pub fn replace(&self, rules: DispatchRules) -> Arc<DispatchRules> {
        std::mem::replace(&mut *self.current.write(), Arc::new(rules))
    }

    /// Re-read the backing file. On error the current rules stay in force.
    pub fn reload(&self) -> Result<Arc<DispatchRules>, RulesError> {
        let path = self.source.as_ref().ok_or(RulesError::NoSource)?;
        let rules = Arc::new(DispatchRules::load(path)?);
        *self.current.write() = Arc::clone(&rules);
        tracing::info!(path = %path.display(), "dispatch rules reloaded");
        Ok(rules)
    }

    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }
}
