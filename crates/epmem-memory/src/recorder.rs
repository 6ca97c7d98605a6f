//! Recorder – turns the live belief state into a new episode.
//!
//! # Algorithm
//!
//! A breadth-first walk over `(trie node, live identifier)` pairs, starting
//! at `(root, top state)`:
//!
//! 1. Every fact under the current identifier is mapped to its child trie
//!    node (created on first sight).
//! 2. Identifier-valued facts are queued for expansion and added to the
//!    episode's structural scaffold.
//! 3. Constant-valued facts are leaves.  A leaf is stored with its current
//!    activation unless its node is ubiquitous or the fact is untracked.
//!    Each stored leaf adds a reference to its node, which may flip the node
//!    to ubiquitous.
//! 4. Facts named `superstate` are never expanded in place.  Identifier
//!    superstates are captured and, if the configured number of goal levels
//!    allows, walked as a further goal level nested under a `superstate`
//!    edge.
//!
//! The whole walk, every goal level included, uses a single visit token
//! obtained up front.  Cycle protection is therefore exactly as strong as
//! the collaborator's handling of that token.

use std::collections::VecDeque;

use tracing::{debug, info};

use epmem_types::{EpmemConfig, SymbolId, Value};

use crate::belief::BeliefState;
use crate::episode::{EpisodeEntry, EpisodeId, EpisodeStore};
use crate::trie::{FactTrie, NodeId, UbiquityPolicy};

/// Attribute that links a goal to the goal above it.
pub const SUPERSTATE_ATTR: &str = "superstate";

/// What a call to [`record`] produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordOutcome {
    pub episode: EpisodeId,
    /// Leaf entries stored in the episode.
    pub leaves: usize,
    /// Trie nodes created by this walk.
    pub new_nodes: usize,
    /// Nodes that turned ubiquitous during this walk.
    pub newly_ubiquitous: usize,
    /// Superstate identifiers found, with the goal level they belong to.
    /// Includes levels that were not walked.
    pub superstates: Vec<(usize, SymbolId)>,
}

/// Walk the belief state under `root` and append a new episode to `store`.
pub fn record<B: BeliefState>(
    trie: &mut FactTrie,
    store: &mut EpisodeStore,
    belief: &mut B,
    root: SymbolId,
    cycle: u64,
    config: &EpmemConfig,
) -> RecordOutcome {
    let nodes_before = trie.len();
    let episode = store.next_id();
    let store_len = store.len();
    let policy = UbiquityPolicy {
        fraction: config.ubiquity_fraction,
        floor: config.ubiquity_floor,
    };

    let visit = belief.new_visit_token();
    let mut entries: Vec<EpisodeEntry> = Vec::new();
    let mut superstates = Vec::new();
    let mut newly_ubiquitous = 0;

    let mut goals: VecDeque<(usize, NodeId, SymbolId)> = VecDeque::new();
    goals.push_back((0, trie.root(), root));

    while let Some((level, anchor, goal)) = goals.pop_front() {
        let mut queue: VecDeque<(NodeId, SymbolId)> = VecDeque::new();
        queue.push_back((anchor, goal));

        while let Some((node, id)) = queue.pop_front() {
            let at_goal_root = node == anchor && id == goal;
            for fact in belief.facts_under(id, visit) {
                if at_goal_root && config.excluded_attributes.iter().any(|a| *a == fact.attr) {
                    continue;
                }

                if fact.attr == SUPERSTATE_ATTR {
                    if let Value::Identifier(sup) = fact.value {
                        superstates.push((level + 1, sup));
                        if level + 1 < config.goal_levels {
                            let edge = trie.find_or_create(node, SUPERSTATE_ATTR, &fact.value);
                            entries.push(EpisodeEntry {
                                node: edge,
                                activation: belief.activation(fact.id),
                                leaf: false,
                            });
                            goals.push_back((level + 1, edge, sup));
                        }
                    }
                    continue;
                }

                let child = trie.find_or_create(node, &fact.attr, &fact.value);
                let activation = belief.activation(fact.id);

                if let Value::Identifier(next) = fact.value {
                    entries.push(EpisodeEntry {
                        node: child,
                        activation,
                        leaf: false,
                    });
                    queue.push_back((child, next));
                    continue;
                }

                if trie.node(child).is_ubiquitous() {
                    continue;
                }
                let Some(activation) = activation else {
                    continue;
                };
                entries.push(EpisodeEntry {
                    node: child,
                    activation: Some(activation),
                    leaf: true,
                });
                if trie.add_reference(child, episode, store_len, policy) {
                    newly_ubiquitous += 1;
                    debug!(node = child.index(), attr = %fact.attr, "trie node became ubiquitous");
                }
            }
        }
    }

    let leaves = entries.iter().filter(|e| e.leaf).count();
    let id = store.append(trie, entries, cycle);
    let new_nodes = trie.len() - nodes_before;
    info!(
        episode = id.0,
        cycle,
        leaves,
        new_nodes,
        newly_ubiquitous,
        "recorded episode"
    );

    RecordOutcome {
        episode: id,
        leaves,
        new_nodes,
        newly_ubiquitous,
        superstates,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
