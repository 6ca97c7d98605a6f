//! [`EpmemLink`] – the attribute-path protocol between the engine and the
//! agent program.
//!
//! Mounted once under the top state:
//!
//! ```text
//! S1 ^epmem E1
//!    E1 ^query Q1              cue subtree, written by the agent
//!    E1 ^retrieved R1          reconstruction, written by the engine
//!    E1 ^command next          navigation, written by the agent
//!    E1 ^retrieval-count 3     written by the engine
//! ```

use std::collections::VecDeque;

use epmem_memory::BeliefState;
use epmem_types::{EpmemError, FactId, SymbolId, Value};

pub const LINK_ATTR: &str = "epmem";
pub const QUERY_ATTR: &str = "query";
pub const RETRIEVED_ATTR: &str = "retrieved";
pub const COMMAND_ATTR: &str = "command";
pub const RETRIEVAL_COUNT_ATTR: &str = "retrieval-count";

/// Navigation commands understood on `^command`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavCommand {
    Next,
}

impl NavCommand {
    pub fn parse(value: &Value) -> Result<Self, EpmemError> {
        match value {
            Value::Str(s) if s == "next" => Ok(NavCommand::Next),
            other => Err(EpmemError::UnsupportedCommand(other.to_string())),
        }
    }
}

/// Handles to the mounted link, plus the engine-owned `retrieval-count`.
#[derive(Debug)]
pub struct EpmemLink {
    root: SymbolId,
    query: SymbolId,
    retrieved: SymbolId,
    count: Option<(FactId, i64)>,
}

impl EpmemLink {
    /// Create `^epmem`, `^query` and `^retrieved` under `top_state`.
    pub fn mount<B: BeliefState>(belief: &mut B, top_state: SymbolId) -> Result<Self, EpmemError> {
        let root = belief.new_identifier('E');
        belief.add_fact(top_state, LINK_ATTR, Value::Identifier(root))?;
        let query = belief.new_identifier('Q');
        belief.add_fact(root, QUERY_ATTR, Value::Identifier(query))?;
        let retrieved = belief.new_identifier('R');
        belief.add_fact(root, RETRIEVED_ATTR, Value::Identifier(retrieved))?;
        Ok(Self {
            root,
            query,
            retrieved,
            count: None,
        })
    }

    pub fn root(&self) -> SymbolId {
        self.root
    }

    pub fn query(&self) -> SymbolId {
        self.query
    }

    pub fn retrieved(&self) -> SymbolId {
        self.retrieved
    }

    /// The first `^command` fact on the link, if any.
    pub fn command<B: BeliefState>(&self, belief: &mut B) -> Option<(FactId, Value)> {
        let visit = belief.new_visit_token();
        belief
            .facts_under(self.root, visit)
            .into_iter()
            .find(|f| f.attr == COMMAND_ATTR)
            .map(|f| (f.id, f.value))
    }

    /// Sorted ids of every fact in the cue subtree.  Changes whenever the
    /// agent edits the cue.
    pub fn cue_signature<B: BeliefState>(&self, belief: &mut B) -> Vec<FactId> {
        let visit = belief.new_visit_token();
        let mut ids = Vec::new();
        let mut queue = VecDeque::from([self.query]);
        while let Some(id) = queue.pop_front() {
            for fact in belief.facts_under(id, visit) {
                ids.push(fact.id);
                if let Value::Identifier(next) = fact.value {
                    queue.push_back(next);
                }
            }
        }
        ids.sort();
        ids
    }

    pub fn retrieval_count(&self) -> Option<i64> {
        self.count.map(|(_, n)| n)
    }

    /// Replace `^retrieval-count` with `n`.
    pub fn set_retrieval_count<B: BeliefState>(&mut self, belief: &mut B, n: i64) -> Result<(), EpmemError> {
        self.clear_retrieval_count(belief);
        let fact = belief.add_fact(self.root, RETRIEVAL_COUNT_ATTR, Value::Int(n))?;
        self.count = Some((fact, n));
        Ok(())
    }

    /// Remove `^retrieval-count` if present.
    pub fn clear_retrieval_count<B: BeliefState>(&mut self, belief: &mut B) {
        if let Some((fact, _)) = self.count.take()
            && let Err(e) = belief.remove_fact(fact)
        {
            tracing::warn!(error = %e, "retrieval-count fact already gone");
        }
    }
}
