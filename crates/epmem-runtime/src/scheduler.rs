//! [`EpisodicMemory`] – the per-cycle driver.
//!
//! The host calls [`EpisodicMemory::on_cycle`] once per decision cycle.
//! Each call:
//!
//! 1. **Record** – asks the active [`RecordTrigger`] whether to snapshot the
//!    belief state, and records an episode if so.
//! 2. **Navigate** – if a `^command` fact appeared since the previous cycle,
//!    executes it (`next` is the only command understood).
//! 3. **Retrieve** – otherwise, if the cue under `^query` changed since the
//!    previous cycle, retrieves the best match into `^retrieved`.  A cue
//!    that was just emptied installs the "no retrieval" sentinel.
//!
//! Successful retrievals set `^retrieval-count` to 1 and each successful
//! `next` increments it.  A failed retrieval or navigation removes it.
//!
//! Every phase is timed against the injected [`Clock`].
//!
//! # Example
//!
//! ```rust
//! use epmem_memory::{BeliefState, WorkingMemory};
//! use epmem_runtime::scheduler::{CycleAction, EpisodicMemory};
//! use epmem_types::{EpmemConfig, Value};
//!
//! let mut wm = WorkingMemory::new();
//! let s1 = wm.top_state();
//! let mut epmem = EpisodicMemory::new(EpmemConfig::default(), &mut wm, s1, None).unwrap();
//!
//! wm.add_fact(s1, "room", Value::Str("kitchen".into())).unwrap();
//! epmem.record_now(&mut wm);
//!
//! let query = epmem.link().query();
//! wm.add_fact(query, "room", Value::Str("kitchen".into())).unwrap();
//! let report = epmem.on_cycle(&mut wm).unwrap();
//! assert!(matches!(report.action, CycleAction::Retrieved(_)));
//! assert_eq!(epmem.link().retrieval_count(), Some(1));
//! ```

use std::time::Duration;

use serde::Serialize;
use tracing::{debug, warn};

use epmem_memory::{BeliefState, EpisodeId, EpisodicEngine, RecordOutcome, Retrieval};
use epmem_types::{EpmemConfig, EpmemError, FactId, SymbolId};

use crate::clock::{Clock, CycleTimers, Phase, SystemClock, TimerStat};
use crate::link::{EpmemLink, NavCommand};
use crate::trigger::{self, RecordTrigger, TriggerContext};

// ─────────────────────────────────────────────────────────────────────────────
// Reports
// ─────────────────────────────────────────────────────────────────────────────

/// What the retrieval half of a cycle did.
#[derive(Debug, Clone, PartialEq)]
pub enum CycleAction {
    /// No new command and no changed cue.
    Idle,
    /// The cue was matched.
    Retrieved(Retrieval),
    /// A `next` command ran; `None` means the end of the store was reached.
    Navigated(Option<EpisodeId>),
    /// A command that is not understood.  The value is echoed back.
    IgnoredCommand(String),
}

/// Result of one [`EpisodicMemory::on_cycle`] call.
#[derive(Debug, Clone, PartialEq)]
pub struct CycleReport {
    pub cycle: u64,
    pub recorded: Option<RecordOutcome>,
    pub action: CycleAction,
}

/// Engine statistics.
#[derive(Debug, Clone, Serialize)]
pub struct EpmemStats {
    pub cycles: u64,
    pub episodes: usize,
    pub trie_nodes: usize,
    pub ubiquitous_nodes: usize,
    pub queries: u64,
    pub current: Option<EpisodeId>,
    pub trigger: String,
    pub timers: Vec<(&'static str, TimerStat)>,
}

// ─────────────────────────────────────────────────────────────────────────────
// EpisodicMemory
// ─────────────────────────────────────────────────────────────────────────────

/// Engine, link, trigger and timers for one agent.
pub struct EpisodicMemory {
    engine: EpisodicEngine,
    link: EpmemLink,
    top_state: SymbolId,
    output_link: Option<SymbolId>,
    trigger: Box<dyn RecordTrigger>,
    clock: Box<dyn Clock>,
    timers: CycleTimers,
    cycle: u64,
    last_cue: Vec<FactId>,
    last_command: Option<FactId>,
}

impl EpisodicMemory {
    /// Validate `config`, mount the link under `top_state` and pick the
    /// trigger named by `config.record_policy`.
    ///
    /// `output_link` is the identifier the output-activity trigger watches.
    pub fn new<B: BeliefState>(
        config: EpmemConfig,
        belief: &mut B,
        top_state: SymbolId,
        output_link: Option<SymbolId>,
    ) -> Result<Self, EpmemError> {
        let trigger = trigger::trigger_for(&config);
        let engine = EpisodicEngine::new(config)?;
        let link = EpmemLink::mount(belief, top_state)?;
        debug!(trigger = trigger.name(), "episodic memory mounted");
        Ok(Self {
            engine,
            link,
            top_state,
            output_link,
            trigger,
            clock: Box::new(SystemClock::default()),
            timers: CycleTimers::default(),
            cycle: 0,
            last_cue: Vec::new(),
            last_command: None,
        })
    }

    /// Replace the time source.
    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    /// Replace the record trigger.
    pub fn with_trigger(mut self, trigger: Box<dyn RecordTrigger>) -> Self {
        self.trigger = trigger;
        self
    }

    pub fn engine(&self) -> &EpisodicEngine {
        &self.engine
    }

    pub fn link(&self) -> &EpmemLink {
        &self.link
    }

    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    pub fn timers(&self) -> &CycleTimers {
        &self.timers
    }

    /// Run one decision cycle.
    pub fn on_cycle<B: BeliefState>(&mut self, belief: &mut B) -> Result<CycleReport, EpmemError> {
        let started = self.clock.now();
        self.cycle += 1;

        let ctx = TriggerContext {
            top_state: self.top_state,
            output_link: self.output_link,
            excluded: &self.engine.config().excluded_attributes,
        };
        let recorded = if self.trigger.should_record(belief, &ctx) {
            Some(self.record_now(belief))
        } else {
            None
        };

        let action = match self.link.command(belief) {
            Some((fact, value)) if self.last_command != Some(fact) => {
                self.last_command = Some(fact);
                match NavCommand::parse(&value) {
                    Ok(NavCommand::Next) => CycleAction::Navigated(self.navigate(belief)?),
                    Err(e) => {
                        warn!(error = %e, "ignoring episodic memory command");
                        CycleAction::IgnoredCommand(value.to_string())
                    }
                }
            }
            lingering => {
                self.last_command = lingering.map(|(fact, _)| fact);
                let cue = self.link.cue_signature(belief);
                if cue == self.last_cue {
                    self.last_cue = cue;
                    CycleAction::Idle
                } else {
                    self.last_cue = cue;
                    CycleAction::Retrieved(self.query(belief)?)
                }
            }
        };

        let elapsed = self.elapsed_since(started);
        self.timers.add(Phase::Cycle, elapsed);
        debug!(
            cycle = self.cycle,
            recorded = recorded.is_some(),
            action = ?action,
            elapsed_us = elapsed.as_micros() as u64,
            "epmem cycle"
        );
        Ok(CycleReport {
            cycle: self.cycle,
            recorded,
            action,
        })
    }

    /// Record an episode now, regardless of the trigger.
    pub fn record_now<B: BeliefState>(&mut self, belief: &mut B) -> RecordOutcome {
        let started = self.clock.now();
        let outcome = self.engine.record(belief, self.top_state, self.cycle);
        let elapsed = self.elapsed_since(started);
        self.timers.add(Phase::Record, elapsed);
        outcome
    }

    pub fn stats(&self) -> EpmemStats {
        EpmemStats {
            cycles: self.cycle,
            episodes: self.engine.store().len(),
            trie_nodes: self.engine.trie().len(),
            ubiquitous_nodes: self.engine.trie().ubiquitous_count(),
            queries: self.engine.queries(),
            current: self.engine.store().current(),
            trigger: self.trigger.name().to_string(),
            timers: self.timers.snapshot(),
        }
    }

    fn query<B: BeliefState>(&mut self, belief: &mut B) -> Result<Retrieval, EpmemError> {
        let started = self.clock.now();
        let result = self
            .engine
            .retrieve_into(belief, self.link.query(), self.link.retrieved())?;
        match result {
            Retrieval::Episode { .. } => self.link.set_retrieval_count(belief, 1)?,
            Retrieval::NoMemory(_) => self.link.clear_retrieval_count(belief),
        }
        let elapsed = self.elapsed_since(started);
        self.timers.add(Phase::Retrieve, elapsed);
        Ok(result)
    }

    fn navigate<B: BeliefState>(&mut self, belief: &mut B) -> Result<Option<EpisodeId>, EpmemError> {
        let started = self.clock.now();
        let next = self.engine.next(belief, self.link.retrieved())?;
        match next {
            Some(_) => {
                let count = self.link.retrieval_count().unwrap_or(0) + 1;
                self.link.set_retrieval_count(belief, count)?;
            }
            None => self.link.clear_retrieval_count(belief),
        }
        let elapsed = self.elapsed_since(started);
        self.timers.add(Phase::Navigate, elapsed);
        Ok(next)
    }

    fn elapsed_since(&self, started: Duration) -> Duration {
        self.clock.now().saturating_sub(started)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
