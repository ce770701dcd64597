//! Rule compilation and matching for the reference engine.
//!
//! # Design Decisions
//! - Patterns compile once at startup; a bad pattern fails the load
//! - Rules keep declaration order inside their phase; first match wins

use regex::Regex;

use crate::config::schema::{RuleConfig, RulePhase, RuleTarget};
use crate::engine::{Action, EngineError, Interruption};

/// A rule ready for evaluation.
#[derive(Debug, Clone)]
pub struct Rule {
    pub id: u32,
    pub phase: RulePhase,
    pub target: RuleTarget,
    pattern: Regex,
    pub status: u16,
    pub action: Action,
    pub msg: String,
}

impl Rule {
    pub fn compile(config: &RuleConfig) -> Result<Self, EngineError> {
        let pattern = Regex::new(&config.pattern).map_err(|e| EngineError::InvalidRule {
            id: config.id,
            reason: e.to_string(),
        })?;

        Ok(Self {
            id: config.id,
            phase: config.phase,
            target: config.target,
            pattern,
            status: config.status,
            action: config.action,
            msg: config.msg.clone(),
        })
    }

    pub fn is_match(&self, input: &str) -> bool {
        self.pattern.is_match(input)
    }

    /// The verdict this rule produces, with the matched input as data.
    pub fn interruption(&self, matched: &str) -> Interruption {
        let data = if self.msg.is_empty() {
            format!("matched {:?}", truncate(matched, 64))
        } else {
            self.msg.clone()
        };

        Interruption {
            rule_id: self.id,
            status: self.status,
            action: self.action,
            data,
        }
    }
}

/// Rules bucketed by the phase they run in.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    rules: Vec<Rule>,
}

impl RuleSet {
    pub fn compile(configs: &[RuleConfig]) -> Result<Self, EngineError> {
        let rules = configs
            .iter()
            .map(Rule::compile)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { rules })
    }

    pub fn for_phase(&self, phase: RulePhase) -> impl Iterator<Item = &Rule> {
        self.rules.iter().filter(move |r| r.phase == phase)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

fn truncate(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}
