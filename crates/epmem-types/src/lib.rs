use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// An identifier symbol in the agent's belief state (e.g. `S1`, `I4`).
///
/// Identifiers carry no content of their own; they exist to hang further
/// facts off.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SymbolId(pub u64);

/// Handle of a single live fact owned by the belief state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FactId(pub u64);

/// Marker handed to `BeliefState::facts_under` so a single walk expands every
/// identifier at most once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VisitToken(pub u64);

/// The typed value of a fact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum Value {
    /// Points at another identifier; the fact is structural.
    Identifier(SymbolId),
    /// A string constant.
    #[serde(rename = "string")]
    Str(String),
    /// An integer constant.
    #[serde(rename = "integer")]
    Int(i64),
    /// A floating-point constant.
    Float(f64),
}

impl Value {
    /// Returns the identifier if this value is structural.
    pub fn as_identifier(&self) -> Option<SymbolId> {
        match self {
            Value::Identifier(id) => Some(*id),
            _ => None,
        }
    }

    /// `true` for string, integer and float values.
    pub fn is_constant(&self) -> bool {
        !matches!(self, Value::Identifier(_))
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Identifier(id) => write!(f, "<{}>", id.0),
            Value::Str(s) => write!(f, "{s}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x:?}"),
        }
    }
}

/// One `(identifier, attribute, value)` triple of the live belief state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fact {
    pub id: FactId,
    /// The identifier this fact hangs off.
    pub ident: SymbolId,
    pub attr: String,
    pub value: Value,
}

// ─────────────────────────────────────────────────────────────────────────────
// Tunables
// ─────────────────────────────────────────────────────────────────────────────

/// Which signal decides that the current moment is worth recording.
///
/// The two policies are mutually exclusive; exactly one is active per engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordPolicy {
    /// Record whenever new facts appear on the output link.
    #[default]
    OutputActivity,
    /// Record whenever the set of most-activated facts changes enough.
    ActivationChange,
}

impl fmt::Display for RecordPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordPolicy::OutputActivity => write!(f, "output_activity"),
            RecordPolicy::ActivationChange => write!(f, "activation_change"),
        }
    }
}

impl std::str::FromStr for RecordPolicy {
    type Err = EpmemError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "output_activity" | "output" => Ok(RecordPolicy::OutputActivity),
            "activation_change" | "activation" => Ok(RecordPolicy::ActivationChange),
            other => Err(EpmemError::InvalidConfig {
                field: "record_policy".to_string(),
                reason: format!("unknown policy '{other}'"),
            }),
        }
    }
}

/// Engine tunables. Every field has a default so partial TOML tables load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EpmemConfig {
    /// Number of stored episodes required before any cue is matched.
    pub min_store_size: usize,
    /// Reference fraction above which a trie node turns ubiquitous.
    pub ubiquity_fraction: f64,
    /// Store size that must be exceeded before ubiquity can trigger.
    pub ubiquity_floor: usize,
    /// Episodes kept out of reach of sequential `next` navigation at the end
    /// of the store.
    pub next_margin: usize,
    /// Size of the top-activation set watched by
    /// [`RecordPolicy::ActivationChange`].
    pub activation_set_size: usize,
    /// How many members of that set must change before recording.
    pub activation_change_threshold: usize,
    pub record_policy: RecordPolicy,
    /// Goal levels walked by the recorder; `1` records the top level only.
    pub goal_levels: usize,
    /// Top-level attributes that are never recorded.
    pub excluded_attributes: Vec<String>,
}

impl Default for EpmemConfig {
    fn default() -> Self {
        Self {
            min_store_size: 1,
            ubiquity_fraction: 0.9,
            ubiquity_floor: 100,
            next_margin: 0,
            activation_set_size: 10,
            activation_change_threshold: 3,
            record_policy: RecordPolicy::default(),
            goal_levels: 1,
            excluded_attributes: vec!["epmem".to_string()],
        }
    }
}

impl EpmemConfig {
    /// Reject tunables that would make the engine misbehave.
    pub fn validate(&self) -> Result<(), EpmemError> {
        if !(self.ubiquity_fraction > 0.0 && self.ubiquity_fraction <= 1.0) {
            return Err(EpmemError::InvalidConfig {
                field: "ubiquity_fraction".to_string(),
                reason: format!("{} is outside (0, 1]", self.ubiquity_fraction),
            });
        }
        if self.goal_levels == 0 {
            return Err(EpmemError::InvalidConfig {
                field: "goal_levels".to_string(),
                reason: "at least the top goal level must be recorded".to_string(),
            });
        }
        if self.activation_set_size == 0 {
            return Err(EpmemError::InvalidConfig {
                field: "activation_set_size".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

/// Global error type for the episodic-memory engine and its collaborators.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EpmemError {
    #[error("Unknown identifier: {0:?}")]
    UnknownSymbol(SymbolId),

    #[error("Unknown fact: {0:?}")]
    UnknownFact(FactId),

    #[error("Invalid configuration for {field}: {reason}")]
    InvalidConfig { field: String, reason: String },

    #[error("Unsupported command: {0}")]
    UnsupportedCommand(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn value_serialization_roundtrip() {
        let v = Value::Str("red".to_string());
        let json = serde_json::to_string(&v).unwrap();
        assert!(json.contains("string"));
        let back: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(v, back);
    }

    #[test]
    fn identifier_values_are_not_constants() {
        assert!(!Value::Identifier(SymbolId(3)).is_constant());
        assert_eq!(Value::Identifier(SymbolId(3)).as_identifier(), Some(SymbolId(3)));
        assert!(Value::Int(7).is_constant());
        assert!(Value::Float(0.5).as_identifier().is_none());
    }

    #[test]
    fn default_config_is_valid() {
        assert!(EpmemConfig::default().validate().is_ok());
    }

    #[test]
    fn config_rejects_out_of_range_fraction() {
        let cfg = EpmemConfig {
            ubiquity_fraction: 1.5,
            ..Default::default()
        };
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("ubiquity_fraction"));
    }

    #[test]
    fn config_rejects_zero_goal_levels() {
        let cfg = EpmemConfig {
            goal_levels: 0,
            ..Default::default()
        };
        assert!(matches!(
            cfg.validate(),
            Err(EpmemError::InvalidConfig { ref field, .. }) if field == "goal_levels"
        ));
    }

    #[test]
    fn partial_config_fills_defaults() {
        let cfg: EpmemConfig = serde_json::from_str(r#"{"min_store_size": 5}"#).unwrap();
        assert_eq!(cfg.min_store_size, 5);
        assert_eq!(cfg.goal_levels, 1);
        assert_eq!(cfg.record_policy, RecordPolicy::OutputActivity);
    }

    #[test]
    fn record_policy_parses_both_spellings() {
        assert_eq!("activation".parse::<RecordPolicy>().unwrap(), RecordPolicy::ActivationChange);
        assert_eq!(
            "output_activity".parse::<RecordPolicy>().unwrap(),
            RecordPolicy::OutputActivity
        );
        assert!("sometimes".parse::<RecordPolicy>().is_err());
    }

    #[test]
    fn epmem_error_display() {
        let err = EpmemError::UnknownSymbol(SymbolId(9));
        assert!(err.to_string().contains("Unknown identifier"));
        let err = EpmemError::UnsupportedCommand("rewind".to_string());
        assert!(err.to_string().contains("rewind"));
    }
}
