//! The belief-state collaborator.
//!
//! The engine never owns live facts.  Everything it reads from, or writes
//! into, the agent's current belief state goes through the [`BeliefState`]
//! trait.  [`WorkingMemory`] is a complete in-process implementation used by
//! the test-suite and by the `epmem` shell; a host runtime plugs in its own.
//!
//! # Visit tokens
//!
//! [`BeliefState::facts_under`] enumerates an identifier's facts only the
//! first time that identifier is asked for under a given [`VisitToken`];
//! later requests under the same token return nothing.  A walk obtains one
//! token up front and passes it to every call.
//!
//! # Example
//!
//! ```rust
//! use epmem_memory::belief::{BeliefState, WorkingMemory};
//! use epmem_types::Value;
//!
//! let mut wm = WorkingMemory::new();
//! let s1 = wm.top_state();
//! let fact = wm.add_fact(s1, "color", Value::Str("red".into())).unwrap();
//!
//! let visit = wm.new_visit_token();
//! assert_eq!(wm.facts_under(s1, visit).len(), 1);
//! // Already expanded under this token.
//! assert!(wm.facts_under(s1, visit).is_empty());
//! assert_eq!(wm.activation(fact), Some(1));
//! ```

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt::Write as _;

use epmem_types::{EpmemError, Fact, FactId, SymbolId, Value, VisitToken};

// ─────────────────────────────────────────────────────────────────────────────
// BeliefState trait
// ─────────────────────────────────────────────────────────────────────────────

/// Everything the engine needs from the agent's live belief state.
pub trait BeliefState {
    /// Allocate a fresh token for one walk.
    fn new_visit_token(&mut self) -> VisitToken;

    /// Facts hanging off `id`, or nothing if `id` was already expanded under
    /// `visit`.
    fn facts_under(&mut self, id: SymbolId, visit: VisitToken) -> Vec<Fact>;

    /// Activation of `fact`; `None` when the fact is not tracked.
    fn activation(&self, fact: FactId) -> Option<i64>;

    /// Create a new fact `(id ^attr value)`.
    fn add_fact(&mut self, id: SymbolId, attr: &str, value: Value) -> Result<FactId, EpmemError>;

    /// Remove a live fact.
    fn remove_fact(&mut self, fact: FactId) -> Result<(), EpmemError>;

    /// Take a strong reference on `fact`.
    fn add_ref(&mut self, fact: FactId);

    /// Drop a reference taken with [`add_ref`][BeliefState::add_ref].
    fn release_ref(&mut self, fact: FactId);

    /// Intern a fresh identifier whose name starts with `letter`.
    fn new_identifier(&mut self, letter: char) -> SymbolId;
}

// ─────────────────────────────────────────────────────────────────────────────
// WorkingMemory
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug)]
struct FactRecord {
    fact: Fact,
    activation: Option<i64>,
    refs: u32,
    removed: bool,
}

/// In-process belief state: named identifiers, typed facts, per-fact
/// activation and reference counts.
///
/// Construction interns the top state `S1`.  New facts start with
/// activation `Some(1)`; use [`WorkingMemory::set_activation`] to change or
/// untrack it.
#[derive(Debug)]
pub struct WorkingMemory {
    top_state: SymbolId,
    next_symbol: u64,
    next_fact: u64,
    next_visit: u64,
    letter_counters: HashMap<char, u64>,
    names: HashMap<SymbolId, String>,
    by_name: HashMap<String, SymbolId>,
    facts: BTreeMap<FactId, FactRecord>,
    by_ident: HashMap<SymbolId, Vec<FactId>>,
    visited: HashMap<SymbolId, VisitToken>,
    expansions: u64,
}

impl Default for WorkingMemory {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkingMemory {
    /// Create a belief state holding only the top state.
    pub fn new() -> Self {
        let mut wm = Self {
            top_state: SymbolId(0),
            next_symbol: 0,
            next_fact: 0,
            next_visit: 0,
            letter_counters: HashMap::new(),
            names: HashMap::new(),
            by_name: HashMap::new(),
            facts: BTreeMap::new(),
            by_ident: HashMap::new(),
            visited: HashMap::new(),
            expansions: 0,
        };
        wm.top_state = wm.new_identifier('S');
        wm
    }

    /// The root identifier of the belief state (`S1`).
    pub fn top_state(&self) -> SymbolId {
        self.top_state
    }

    /// Printable name of `id` (e.g. `"I3"`).
    pub fn name_of(&self, id: SymbolId) -> Option<&str> {
        self.names.get(&id).map(String::as_str)
    }

    /// Look an identifier up by its printable name.
    pub fn lookup(&self, name: &str) -> Option<SymbolId> {
        self.by_name.get(&name.to_ascii_uppercase()).copied()
    }

    /// The live fact with handle `fact`.
    pub fn fact(&self, fact: FactId) -> Option<&Fact> {
        self.facts
            .get(&fact)
            .filter(|r| !r.removed)
            .map(|r| &r.fact)
    }

    /// Live facts of `id` in insertion order, without touching visit marks.
    pub fn facts_of(&self, id: SymbolId) -> Vec<&Fact> {
        self.by_ident
            .get(&id)
            .map(|ids| ids.iter().filter_map(|f| self.fact(*f)).collect())
            .unwrap_or_default()
    }

    /// First live fact `(id ^attr *)`.
    pub fn find(&self, id: SymbolId, attr: &str) -> Option<&Fact> {
        self.facts_of(id).into_iter().find(|f| f.attr == attr)
    }

    /// Number of live facts.
    pub fn len(&self) -> usize {
        self.facts.values().filter(|r| !r.removed).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Current strong-reference count on `fact` (0 for unknown facts).
    pub fn ref_count(&self, fact: FactId) -> u32 {
        self.facts.get(&fact).map(|r| r.refs).unwrap_or(0)
    }

    /// Number of identifiers actually expanded by [`BeliefState::facts_under`].
    pub fn expansions(&self) -> u64 {
        self.expansions
    }

    /// Set or untrack the activation of a live fact.
    pub fn set_activation(&mut self, fact: FactId, activation: Option<i64>) -> Result<(), EpmemError> {
        match self.facts.get_mut(&fact) {
            Some(record) if !record.removed => {
                record.activation = activation;
                Ok(())
            }
            _ => Err(EpmemError::UnknownFact(fact)),
        }
    }

    /// Remove every live fact of `id`.
    pub fn clear_children(&mut self, id: SymbolId) -> Result<(), EpmemError> {
        let ids: Vec<FactId> = self.facts_of(id).iter().map(|f| f.id).collect();
        for fact in ids {
            self.remove_fact(fact)?;
        }
        Ok(())
    }

    /// Render the subtree under `id` as indented `^attr value` lines.
    pub fn render(&self, id: SymbolId) -> String {
        let mut out = String::new();
        let mut seen = HashSet::new();
        let _ = writeln!(out, "{}", self.display_symbol(id));
        self.render_into(id, 1, &mut seen, &mut out);
        out
    }

    fn render_into(&self, id: SymbolId, indent: usize, seen: &mut HashSet<SymbolId>, out: &mut String) {
        if !seen.insert(id) {
            return;
        }
        for fact in self.facts_of(id) {
            let act = match self.activation(fact.id) {
                Some(a) => format!(" [{a}]"),
                None => String::new(),
            };
            let _ = writeln!(
                out,
                "{}^{} {}  #{}{}",
                "  ".repeat(indent),
                fact.attr,
                self.display_value(&fact.value),
                fact.id.0,
                act
            );
            if let Value::Identifier(child) = fact.value {
                self.render_into(child, indent + 1, seen, out);
            }
        }
    }

    fn display_symbol(&self, id: SymbolId) -> String {
        self.name_of(id)
            .map(str::to_string)
            .unwrap_or_else(|| format!("<{}>", id.0))
    }

    /// Format a value, resolving identifiers to their names.
    pub fn display_value(&self, value: &Value) -> String {
        match value {
            Value::Identifier(id) => self.display_symbol(*id),
            other => other.to_string(),
        }
    }

    fn drop_if_unreferenced(&mut self, fact: FactId) {
        if let Some(record) = self.facts.get(&fact)
            && record.removed
            && record.refs == 0
        {
            self.facts.remove(&fact);
        }
    }
}

impl BeliefState for WorkingMemory {
    fn new_visit_token(&mut self) -> VisitToken {
        self.next_visit += 1;
        VisitToken(self.next_visit)
    }

    fn facts_under(&mut self, id: SymbolId, visit: VisitToken) -> Vec<Fact> {
        if self.visited.get(&id) == Some(&visit) {
            return Vec::new();
        }
        self.visited.insert(id, visit);
        self.expansions += 1;
        self.facts_of(id).into_iter().cloned().collect()
    }

    fn activation(&self, fact: FactId) -> Option<i64> {
        self.facts
            .get(&fact)
            .filter(|r| !r.removed)
            .and_then(|r| r.activation)
    }

    fn add_fact(&mut self, id: SymbolId, attr: &str, value: Value) -> Result<FactId, EpmemError> {
        if !self.names.contains_key(&id) {
            return Err(EpmemError::UnknownSymbol(id));
        }
        if let Value::Identifier(target) = value
            && !self.names.contains_key(&target)
        {
            return Err(EpmemError::UnknownSymbol(target));
        }
        self.next_fact += 1;
        let fact_id = FactId(self.next_fact);
        let fact = Fact {
            id: fact_id,
            ident: id,
            attr: attr.to_string(),
            value,
        };
        self.facts.insert(
            fact_id,
            FactRecord {
                fact,
                activation: Some(1),
                refs: 0,
                removed: false,
            },
        );
        self.by_ident.entry(id).or_default().push(fact_id);
        Ok(fact_id)
    }

    fn remove_fact(&mut self, fact: FactId) -> Result<(), EpmemError> {
        let ident = match self.facts.get_mut(&fact) {
            Some(record) if !record.removed => {
                record.removed = true;
                record.fact.ident
            }
            _ => return Err(EpmemError::UnknownFact(fact)),
        };
        if let Some(list) = self.by_ident.get_mut(&ident) {
            list.retain(|f| *f != fact);
        }
        self.drop_if_unreferenced(fact);
        Ok(())
    }

    fn add_ref(&mut self, fact: FactId) {
        if let Some(record) = self.facts.get_mut(&fact) {
            record.refs += 1;
        }
    }

    fn release_ref(&mut self, fact: FactId) {
        if let Some(record) = self.facts.get_mut(&fact) {
            record.refs = record.refs.saturating_sub(1);
        }
        self.drop_if_unreferenced(fact);
    }

    fn new_identifier(&mut self, letter: char) -> SymbolId {
        let letter = letter.to_ascii_uppercase();
        let counter = self.letter_counters.entry(letter).or_insert(0);
        *counter += 1;
        let name = format!("{letter}{counter}");
        self.next_symbol += 1;
        let id = SymbolId(self.next_symbol);
        self.names.insert(id, name.clone());
        self.by_name.insert(name, id);
        id
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn top_state_is_named_s1() {
        let wm = WorkingMemory::new();
        assert_eq!(wm.name_of(wm.top_state()), Some("S1"));
        assert_eq!(wm.lookup("s1"), Some(wm.top_state()));
    }

    #[test]
    fn identifiers_are_numbered_per_letter() {
        let mut wm = WorkingMemory::new();
        let i1 = wm.new_identifier('i');
        let i2 = wm.new_identifier('I');
        let r1 = wm.new_identifier('R');
        assert_eq!(wm.name_of(i1), Some("I1"));
        assert_eq!(wm.name_of(i2), Some("I2"));
        assert_eq!(wm.name_of(r1), Some("R1"));
    }

    #[test]
    fn add_fact_under_unknown_identifier_fails() {
        let mut wm = WorkingMemory::new();
        let err = wm.add_fact(SymbolId(999), "a", Value::Int(1)).unwrap_err();
        assert_eq!(err, EpmemError::UnknownSymbol(SymbolId(999)));
    }

    #[test]
    fn visit_token_expands_each_identifier_once() {
        let mut wm = WorkingMemory::new();
        let s1 = wm.top_state();
        wm.add_fact(s1, "a", Value::Int(1)).unwrap();
        let t1 = wm.new_visit_token();
        assert_eq!(wm.facts_under(s1, t1).len(), 1);
        assert!(wm.facts_under(s1, t1).is_empty());
        let t2 = wm.new_visit_token();
        assert_eq!(wm.facts_under(s1, t2).len(), 1);
        assert_eq!(wm.expansions(), 2);
    }

    #[test]
    fn removed_fact_survives_while_referenced() {
        let mut wm = WorkingMemory::new();
        let s1 = wm.top_state();
        let f = wm.add_fact(s1, "a", Value::Int(1)).unwrap();
        wm.add_ref(f);
        wm.remove_fact(f).unwrap();
        assert!(wm.fact(f).is_none());
        assert_eq!(wm.ref_count(f), 1);
        wm.release_ref(f);
        assert_eq!(wm.ref_count(f), 0);
    }

    #[test]
    fn removing_twice_reports_unknown_fact() {
        let mut wm = WorkingMemory::new();
        let s1 = wm.top_state();
        let f = wm.add_fact(s1, "a", Value::Int(1)).unwrap();
        wm.remove_fact(f).unwrap();
        assert_eq!(wm.remove_fact(f), Err(EpmemError::UnknownFact(f)));
    }

    #[test]
    fn untracked_activation_reads_as_none() {
        let mut wm = WorkingMemory::new();
        let s1 = wm.top_state();
        let f = wm.add_fact(s1, "a", Value::Int(1)).unwrap();
        wm.set_activation(f, None).unwrap();
        assert_eq!(wm.activation(f), None);
        wm.set_activation(f, Some(7)).unwrap();
        assert_eq!(wm.activation(f), Some(7));
    }

    #[test]
    fn render_survives_cycles() {
        let mut wm = WorkingMemory::new();
        let s1 = wm.top_state();
        let x = wm.new_identifier('X');
        wm.add_fact(s1, "child", Value::Identifier(x)).unwrap();
        wm.add_fact(x, "back", Value::Identifier(s1)).unwrap();
        let text = wm.render(s1);
        assert!(text.contains("^child X1"));
        assert!(text.contains("^back S1"));
    }
}
