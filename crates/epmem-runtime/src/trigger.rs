//! Record triggers – decide, once per cycle, whether to take a snapshot.
//!
//! Two interchangeable policies implement [`RecordTrigger`]:
//!
//! - [`OutputActivityTrigger`] fires when a fact appears on the output link
//!   that was not there on the previous cycle.
//! - [`ActivationChangeTrigger`] keeps the set of the `N` most activated
//!   facts in the belief state and fires when at least `threshold` members
//!   of that set changed since the previous cycle.
//!
//! Exactly one trigger is active per scheduler; [`trigger_for`] builds it
//! from [`EpmemConfig::record_policy`].

use std::collections::{HashSet, VecDeque};

use tracing::debug;

use epmem_memory::BeliefState;
use epmem_types::{EpmemConfig, FactId, RecordPolicy, SymbolId, Value};

/// What a trigger may look at besides the belief state itself.
#[derive(Debug, Clone, Copy)]
pub struct TriggerContext<'a> {
    pub top_state: SymbolId,
    pub output_link: Option<SymbolId>,
    /// Top-level attributes that are not part of the agent's own state.
    pub excluded: &'a [String],
}

/// A record policy.
pub trait RecordTrigger: Send {
    fn name(&self) -> &str;

    /// Called once per cycle.  `true` means record this cycle.
    fn should_record(&mut self, belief: &mut dyn BeliefState, ctx: &TriggerContext<'_>) -> bool;
}

/// Build the trigger selected by `config.record_policy`.
pub fn trigger_for(config: &EpmemConfig) -> Box<dyn RecordTrigger> {
    match config.record_policy {
        RecordPolicy::OutputActivity => Box::new(OutputActivityTrigger::default()),
        RecordPolicy::ActivationChange => Box::new(ActivationChangeTrigger::new(
            config.activation_set_size,
            config.activation_change_threshold,
        )),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Output activity
// ─────────────────────────────────────────────────────────────────────────────

/// Fires when a new fact shows up directly under the output link.
#[derive(Debug, Default)]
pub struct OutputActivityTrigger {
    seen: HashSet<FactId>,
}

impl RecordTrigger for OutputActivityTrigger {
    fn name(&self) -> &str {
        "output_activity"
    }

    fn should_record(&mut self, belief: &mut dyn BeliefState, ctx: &TriggerContext<'_>) -> bool {
        let Some(output) = ctx.output_link else {
            return false;
        };
        let visit = belief.new_visit_token();
        let current: HashSet<FactId> = belief.facts_under(output, visit).iter().map(|f| f.id).collect();
        let fired = current.iter().any(|id| !self.seen.contains(id));
        self.seen = current;
        if fired {
            debug!(trigger = self.name(), "new output activity");
        }
        fired
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Activation change
// ─────────────────────────────────────────────────────────────────────────────

/// Fires when the top-activation set moved by at least `threshold` members.
///
/// Belief states with fewer than `set_size` tracked facts never fire.
#[derive(Debug)]
pub struct ActivationChangeTrigger {
    set_size: usize,
    threshold: usize,
    previous: HashSet<FactId>,
}

impl ActivationChangeTrigger {
    pub fn new(set_size: usize, threshold: usize) -> Self {
        Self {
            set_size,
            threshold,
            previous: HashSet::new(),
        }
    }

    /// The `set_size` most activated facts, ties broken by fact id.  `None`
    /// when fewer than `set_size` facts are tracked.
    fn top_set(&self, belief: &mut dyn BeliefState, ctx: &TriggerContext<'_>) -> Option<HashSet<FactId>> {
        let visit = belief.new_visit_token();
        let mut tracked: Vec<(i64, FactId)> = Vec::new();
        let mut queue = VecDeque::from([(ctx.top_state, true)]);

        while let Some((id, at_top)) = queue.pop_front() {
            for fact in belief.facts_under(id, visit) {
                if at_top && ctx.excluded.iter().any(|a| *a == fact.attr) {
                    continue;
                }
                if let Some(activation) = belief.activation(fact.id) {
                    tracked.push((activation, fact.id));
                }
                if let Value::Identifier(next) = fact.value {
                    queue.push_back((next, false));
                }
            }
        }

        if tracked.len() < self.set_size {
            return None;
        }
        tracked.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));
        Some(tracked.into_iter().take(self.set_size).map(|(_, id)| id).collect())
    }
}

impl RecordTrigger for ActivationChangeTrigger {
    fn name(&self) -> &str {
        "activation_change"
    }

    fn should_record(&mut self, belief: &mut dyn BeliefState, ctx: &TriggerContext<'_>) -> bool {
        let Some(current) = self.top_set(belief, ctx) else {
            return false;
        };
        let changed = current.difference(&self.previous).count();
        self.previous = current;
        let fired = changed >= self.threshold;
        if fired {
            debug!(trigger = self.name(), changed, "top-activation set changed");
        }
        fired
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
