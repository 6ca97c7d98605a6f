//! Retrieval – activation-weighted approximate matching.
//!
//! # Algorithm
//!
//! 1. **Project** the cue subtree onto the trie with the same find-or-create
//!    walk the recorder uses.  Cue patterns never seen before create fresh
//!    nodes with no references, which simply cannot match.
//! 2. An empty projection, or a store below `min_store_size`, is answered
//!    with [`NoMemory`] straight away.
//! 3. A new query epoch is opened.  For every projected leaf, every episode
//!    in the node's reference list is scored: the first touch in this epoch
//!    resets the episode's score to the cue weight, later touches add to it.
//!    Only touched episodes are ever reset.
//! 4. The highest score wins; ties go to the earliest-recorded episode.  A
//!    best score that is not positive is [`NoMemory::NoMatch`].
//!
//! Cue weights are the cue facts' activations.  Untracked cue facts weigh
//! [`UNTRACKED_CUE_WEIGHT`].

use std::collections::VecDeque;

use tracing::debug;

use epmem_types::{SymbolId, Value};

use crate::belief::BeliefState;
use crate::episode::{EpisodeId, EpisodeStore};
use crate::trie::{FactTrie, NodeId};

/// Weight of a cue leaf whose fact carries no activation.
pub const UNTRACKED_CUE_WEIGHT: i64 = 1;

/// One projected cue leaf.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CueEntry {
    pub node: NodeId,
    pub weight: i64,
}

/// Why a retrieval produced no episode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoMemory {
    /// The cue held no constant-valued facts.
    EmptyCue,
    /// Fewer episodes are stored than matching requires.
    ColdStore { stored: usize, required: usize },
    /// Nothing scored above zero.
    NoMatch,
}

/// Result of matching a cue against the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Retrieval {
    Episode { id: EpisodeId, score: i64 },
    NoMemory(NoMemory),
}

impl Retrieval {
    pub fn episode(&self) -> Option<EpisodeId> {
        match self {
            Retrieval::Episode { id, .. } => Some(*id),
            Retrieval::NoMemory(_) => None,
        }
    }
}

/// Map the cue subtree under `query_root` onto trie leaves.
pub fn project_cue<B: BeliefState>(trie: &mut FactTrie, belief: &mut B, query_root: SymbolId) -> Vec<CueEntry> {
    let visit = belief.new_visit_token();
    let mut cue = Vec::new();
    let mut queue: VecDeque<(NodeId, SymbolId)> = VecDeque::new();
    queue.push_back((trie.root(), query_root));

    while let Some((node, id)) = queue.pop_front() {
        for fact in belief.facts_under(id, visit) {
            let child = trie.find_or_create(node, &fact.attr, &fact.value);
            match fact.value {
                Value::Identifier(next) => queue.push_back((child, next)),
                _ => cue.push(CueEntry {
                    node: child,
                    weight: belief.activation(fact.id).unwrap_or(UNTRACKED_CUE_WEIGHT),
                }),
            }
        }
    }
    cue
}

/// Scores episodes against projected cues.  Owns the query epoch counter.
#[derive(Debug, Default)]
pub struct Matcher {
    epoch: u64,
    touched: Vec<EpisodeId>,
}

impl Matcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of scoring passes run so far.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Find the stored episode that best overlaps `cue`.
    pub fn best_match(
        &mut self,
        trie: &mut FactTrie,
        store: &mut EpisodeStore,
        cue: &[CueEntry],
        min_store_size: usize,
    ) -> Retrieval {
        if cue.is_empty() {
            return Retrieval::NoMemory(NoMemory::EmptyCue);
        }
        if store.len() < min_store_size {
            return Retrieval::NoMemory(NoMemory::ColdStore {
                stored: store.len(),
                required: min_store_size,
            });
        }

        self.epoch += 1;
        let epoch = self.epoch;
        self.touched.clear();

        for entry in cue {
            trie.node_mut(entry.node).touch_query();
            for &id in trie.node(entry.node).episodes() {
                let Some(episode) = store.get_mut(id) else {
                    continue;
                };
                if episode.last_query != epoch {
                    episode.last_query = epoch;
                    episode.score = entry.weight;
                    self.touched.push(id);
                } else {
                    episode.score += entry.weight;
                }
            }
        }

        let mut best: Option<(EpisodeId, i64)> = None;
        for &id in &self.touched {
            let Some(episode) = store.get(id) else {
                continue;
            };
            let better = match best {
                None => true,
                Some((best_id, best_score)) => {
                    episode.score > best_score || (episode.score == best_score && id < best_id)
                }
            };
            if better {
                best = Some((id, episode.score));
            }
        }

        debug!(epoch, cue = cue.len(), touched = self.touched.len(), best = ?best, "scored cue");
        match best {
            Some((id, score)) if score > 0 => Retrieval::Episode { id, score },
            _ => Retrieval::NoMemory(NoMemory::NoMatch),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
