//! [`EpisodicEngine`] – the single state object behind episodic memory.
//!
//! Owns the fact trie, the episode store, the matcher's query epoch and the
//! record of what is currently installed.  One engine is created per agent
//! and dropped with it; there is no global instance.
//!
//! # Example
//!
//! ```rust
//! use epmem_memory::belief::{BeliefState, WorkingMemory};
//! use epmem_memory::engine::EpisodicEngine;
//! use epmem_types::{EpmemConfig, Value};
//!
//! let mut wm = WorkingMemory::new();
//! let s1 = wm.top_state();
//! let query = wm.new_identifier('Q');
//! let result = wm.new_identifier('R');
//!
//! let mut engine = EpisodicEngine::new(EpmemConfig::default()).unwrap();
//!
//! wm.add_fact(s1, "room", Value::Str("kitchen".into())).unwrap();
//! let first = engine.record(&mut wm, s1, 1).episode;
//! wm.clear_children(s1).unwrap();
//! wm.add_fact(s1, "room", Value::Str("garage".into())).unwrap();
//! engine.record(&mut wm, s1, 2);
//!
//! wm.add_fact(query, "room", Value::Str("kitchen".into())).unwrap();
//! let found = engine.retrieve_into(&mut wm, query, result).unwrap();
//! assert_eq!(found.episode(), Some(first));
//! assert_eq!(wm.find(result, "room").unwrap().value, Value::Str("kitchen".into()));
//! ```

use tracing::{debug, info};

use epmem_types::{EpmemConfig, EpmemError, SymbolId};

use crate::belief::BeliefState;
use crate::episode::{EpisodeId, EpisodeStore, EpisodeSummary};
use crate::installer::{self, Installed};
use crate::recorder::{self, RecordOutcome};
use crate::retrieval::{self, Matcher, Retrieval};
use crate::trie::FactTrie;

/// Trie, store and installation state for one agent.
#[derive(Debug)]
pub struct EpisodicEngine {
    config: EpmemConfig,
    trie: FactTrie,
    store: EpisodeStore,
    matcher: Matcher,
    installed: Installed,
}

impl EpisodicEngine {
    /// Create an empty engine.  Fails if `config` does not validate.
    pub fn new(config: EpmemConfig) -> Result<Self, EpmemError> {
        config.validate()?;
        Ok(Self {
            config,
            trie: FactTrie::new(),
            store: EpisodeStore::new(),
            matcher: Matcher::new(),
            installed: Installed::Nothing,
        })
    }

    pub fn config(&self) -> &EpmemConfig {
        &self.config
    }

    pub fn trie(&self) -> &FactTrie {
        &self.trie
    }

    pub fn store(&self) -> &EpisodeStore {
        &self.store
    }

    pub fn installed(&self) -> Installed {
        self.installed
    }

    /// Number of cues actually scored so far.
    pub fn queries(&self) -> u64 {
        self.matcher.epoch()
    }

    /// Record the belief state under `root` as a new episode.
    pub fn record<B: BeliefState>(&mut self, belief: &mut B, root: SymbolId, cycle: u64) -> RecordOutcome {
        recorder::record(&mut self.trie, &mut self.store, belief, root, cycle, &self.config)
    }

    /// Match the cue under `query_root` without touching the installation.
    pub fn retrieve<B: BeliefState>(&mut self, belief: &mut B, query_root: SymbolId) -> Retrieval {
        let cue = retrieval::project_cue(&mut self.trie, belief, query_root);
        self.matcher
            .best_match(&mut self.trie, &mut self.store, &cue, self.config.min_store_size)
    }

    /// Match the cue under `query_root` and install the result (or the
    /// sentinel) under `result_root`, replacing the previous installation.
    pub fn retrieve_into<B: BeliefState>(
        &mut self,
        belief: &mut B,
        query_root: SymbolId,
        result_root: SymbolId,
    ) -> Result<Retrieval, EpmemError> {
        self.clear_installation(belief);
        let result = self.retrieve(belief, query_root);
        match result {
            Retrieval::Episode { id, score } => {
                info!(episode = id.0, score, "retrieved episode");
                self.install_episode(belief, id, result_root)?;
            }
            Retrieval::NoMemory(reason) => {
                debug!(?reason, "no episode retrieved");
                self.install_sentinel(belief, result_root)?;
            }
        }
        Ok(result)
    }

    /// Install the episode after the current one.  At the end of the store
    /// (allowing for `next_margin`), or with no current episode, the sentinel
    /// is installed and `None` returned.
    pub fn next<B: BeliefState>(
        &mut self,
        belief: &mut B,
        result_root: SymbolId,
    ) -> Result<Option<EpisodeId>, EpmemError> {
        self.clear_installation(belief);
        let following = self
            .store
            .current()
            .map(|EpisodeId(k)| k + 1)
            .filter(|&k| k + self.config.next_margin < self.store.len());
        match following {
            Some(k) => {
                let id = EpisodeId(k);
                self.install_episode(belief, id, result_root)?;
                debug!(episode = k, "advanced to next episode");
                Ok(Some(id))
            }
            None => {
                self.install_sentinel(belief, result_root)?;
                Ok(None)
            }
        }
    }

    /// Remove whatever is currently installed.
    pub fn clear_installation<B: BeliefState>(&mut self, belief: &mut B) {
        installer::clear(&mut self.trie, &self.store, self.installed, belief);
        self.installed = Installed::Nothing;
    }

    /// Serialisable view of episode `id`.
    pub fn summary(&self, id: EpisodeId) -> Option<EpisodeSummary> {
        self.store
            .get(id)
            .map(|episode| EpisodeSummary::build(&self.trie, episode))
    }

    fn install_episode<B: BeliefState>(
        &mut self,
        belief: &mut B,
        id: EpisodeId,
        result_root: SymbolId,
    ) -> Result<(), EpmemError> {
        if let Some(episode) = self.store.get(id) {
            installer::install_episode(&mut self.trie, episode, belief, result_root)?;
            self.installed = Installed::Episode(id);
            self.store.set_current(Some(id));
        }
        Ok(())
    }

    fn install_sentinel<B: BeliefState>(&mut self, belief: &mut B, result_root: SymbolId) -> Result<(), EpmemError> {
        installer::install_sentinel(&mut self.trie, belief, result_root)?;
        self.installed = Installed::Sentinel;
        self.store.set_current(None);
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::belief::WorkingMemory;
    use crate::installer::NO_RETRIEVAL_ATTR;
    use crate::retrieval::NoMemory;
    use epmem_types::Value;

    fn s(v: &str) -> Value {
        Value::Str(v.to_string())
    }

    struct Agent {
        wm: WorkingMemory,
        engine: EpisodicEngine,
        query: SymbolId,
        result: SymbolId,
        cycle: u64,
    }

    impl Agent {
        fn new(config: EpmemConfig) -> Self {
            let mut wm = WorkingMemory::new();
            let query = wm.new_identifier('Q');
            let result = wm.new_identifier('R');
            Self {
                wm,
                engine: EpisodicEngine::new(config).unwrap(),
                query,
                result,
                cycle: 0,
            }
        }

        fn record(&mut self, facts: &[(&str, Value)]) -> EpisodeId {
            let s1 = self.wm.top_state();
            self.wm.clear_children(s1).unwrap();
            for (attr, value) in facts {
                self.wm.add_fact(s1, attr, value.clone()).unwrap();
            }
            self.cycle += 1;
            self.engine.record(&mut self.wm, s1, self.cycle).episode
        }

        fn cue(&mut self, facts: &[(&str, Value)]) -> Retrieval {
            self.wm.clear_children(self.query).unwrap();
            for (attr, value) in facts {
                self.wm.add_fact(self.query, attr, value.clone()).unwrap();
            }
            self.engine
                .retrieve_into(&mut self.wm, self.query, self.result)
                .unwrap()
        }

        fn retrieved(&self, attr: &str) -> Option<Value> {
            self.wm.find(self.result, attr).map(|f| f.value.clone())
        }
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = EpmemConfig {
            ubiquity_fraction: 0.0,
            ..Default::default()
        };
        assert!(EpisodicEngine::new(config).is_err());
    }

    #[test]
    fn empty_store_installs_the_sentinel() {
        let mut agent = Agent::new(EpmemConfig::default());
        let result = agent.cue(&[("a", s("x"))]);
        assert!(matches!(result, Retrieval::NoMemory(NoMemory::ColdStore { .. })));
        assert_eq!(agent.retrieved(NO_RETRIEVAL_ATTR), Some(s("true")));
        assert_eq!(agent.engine.installed(), Installed::Sentinel);
    }

    #[test]
    fn cue_installs_the_matching_episode() {
        let mut agent = Agent::new(EpmemConfig::default());
        let e1 = agent.record(&[("a", s("x"))]);
        agent.record(&[("a", s("y"))]);
        assert_eq!(agent.cue(&[("a", s("x"))]).episode(), Some(e1));
        assert_eq!(agent.retrieved("a"), Some(s("x")));
        assert_eq!(agent.engine.store().current(), Some(e1));
    }

    #[test]
    fn new_retrieval_replaces_the_previous_installation() {
        let mut agent = Agent::new(EpmemConfig::default());
        agent.record(&[("a", s("x"))]);
        agent.record(&[("b", s("y"))]);
        agent.cue(&[("a", s("x"))]);
        agent.cue(&[("b", s("y"))]);
        assert_eq!(agent.retrieved("a"), None);
        assert_eq!(agent.retrieved("b"), Some(s("y")));
        assert_eq!(agent.wm.facts_of(agent.result).len(), 1);
    }

    #[test]
    fn sentinel_is_cleared_by_a_successful_retrieval() {
        let mut agent = Agent::new(EpmemConfig::default());
        agent.cue(&[("a", s("x"))]);
        agent.record(&[("a", s("x"))]);
        agent.cue(&[("a", s("x"))]);
        assert_eq!(agent.retrieved(NO_RETRIEVAL_ATTR), None);
        assert_eq!(agent.retrieved("a"), Some(s("x")));
    }

    #[test]
    fn cold_start_floor_is_respected() {
        let mut agent = Agent::new(EpmemConfig {
            min_store_size: 3,
            ..Default::default()
        });
        agent.record(&[("a", s("x"))]);
        agent.record(&[("a", s("x"))]);
        assert_eq!(
            agent.cue(&[("a", s("x"))]),
            Retrieval::NoMemory(NoMemory::ColdStore { stored: 2, required: 3 })
        );
        agent.record(&[("a", s("x"))]);
        assert_eq!(agent.cue(&[("a", s("x"))]).episode(), Some(EpisodeId(0)));
    }

    #[test]
    fn next_walks_forward_then_hits_the_sentinel() {
        let mut agent = Agent::new(EpmemConfig::default());
        let e0 = agent.record(&[("step", Value::Int(0))]);
        let e1 = agent.record(&[("step", Value::Int(1))]);
        assert_eq!(agent.cue(&[("step", Value::Int(0))]).episode(), Some(e0));

        assert_eq!(agent.engine.next(&mut agent.wm, agent.result).unwrap(), Some(e1));
        assert_eq!(agent.retrieved("step"), Some(Value::Int(1)));

        assert_eq!(agent.engine.next(&mut agent.wm, agent.result).unwrap(), None);
        assert_eq!(agent.retrieved("step"), None);
        assert_eq!(agent.retrieved(NO_RETRIEVAL_ATTR), Some(s("true")));
        assert_eq!(agent.engine.store().current(), None);
    }

    #[test]
    fn next_respects_the_look_ahead_margin() {
        let mut agent = Agent::new(EpmemConfig {
            next_margin: 1,
            ..Default::default()
        });
        let e0 = agent.record(&[("step", Value::Int(0))]);
        agent.record(&[("step", Value::Int(1))]);
        agent.cue(&[("step", Value::Int(0))]);
        assert_eq!(agent.engine.store().current(), Some(e0));
        assert_eq!(agent.engine.next(&mut agent.wm, agent.result).unwrap(), None);
    }

    #[test]
    fn next_without_a_current_episode_fails() {
        let mut agent = Agent::new(EpmemConfig::default());
        agent.record(&[("a", s("x"))]);
        assert_eq!(agent.engine.next(&mut agent.wm, agent.result).unwrap(), None);
        assert_eq!(agent.engine.installed(), Installed::Sentinel);
    }

    #[test]
    fn ubiquitous_cue_stops_matching_for_good() {
        let mut agent = Agent::new(EpmemConfig {
            ubiquity_fraction: 0.5,
            ubiquity_floor: 2,
            ..Default::default()
        });
        for i in 0..5 {
            agent.record(&[("always", s("here")), ("step", Value::Int(i))]);
        }
        assert_eq!(agent.engine.trie().ubiquitous_count(), 1);
        for _ in 0..3 {
            assert_eq!(
                agent.cue(&[("always", s("here"))]),
                Retrieval::NoMemory(NoMemory::NoMatch)
            );
        }
        // A real episode still co-occurs with the node; matching on the
        // other leaf still works.
        assert_eq!(agent.cue(&[("step", Value::Int(0))]).episode(), Some(EpisodeId(0)));
    }

    #[test]
    fn summary_describes_the_episode() {
        let mut agent = Agent::new(EpmemConfig::default());
        let id = agent.record(&[("a", s("x"))]);
        let summary = agent.engine.summary(id).unwrap();
        assert_eq!(summary.cycle, 1);
        assert_eq!(summary.entries[0].path, "a");
        assert!(agent.engine.summary(EpisodeId(9)).is_none());
    }
}
