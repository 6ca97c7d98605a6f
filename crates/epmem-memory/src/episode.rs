//! Episode Store.
//!
//! An [`Episode`] is one recorded snapshot of the belief state: a
//! depth-sorted list of [`EpisodeEntry`] values, each pointing at a shared
//! [`TrieNode`][crate::trie::TrieNode].  The [`EpisodeStore`] is an
//! append-only log of episodes plus the "current episode" cursor used by
//! sequential navigation.
//!
//! The log is never compacted.  Episode ids are positions in the log, so a
//! lower id always means an earlier recording.
//!
//! Each episode also carries two scratch fields (`last_query`, `score`)
//! that only the matcher touches.  They are reset lazily, per query epoch,
//! so a query costs time proportional to the episodes it touches rather than
//! to the size of the log.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use epmem_types::Value;

use crate::grow_list::GrowList;
use crate::trie::{FactTrie, NodeId};

// ─────────────────────────────────────────────────────────────────────────────
// Episode
// ─────────────────────────────────────────────────────────────────────────────

/// Position of an episode in the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EpisodeId(pub usize);

/// One `(node, activation)` pair of an episode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EpisodeEntry {
    pub node: NodeId,
    /// Activation of the live fact at record time.  Always `Some` for leaves.
    pub activation: Option<i64>,
    /// `false` for the structural scaffold, which is only used to rebuild
    /// intermediate identifiers on installation and is never scored.
    pub leaf: bool,
}

/// A recorded snapshot.
#[derive(Debug, Clone)]
pub struct Episode {
    id: EpisodeId,
    entries: Vec<EpisodeEntry>,
    cycle: u64,
    recorded_at: DateTime<Utc>,
    pub(crate) last_query: u64,
    pub(crate) score: i64,
}

impl Episode {
    pub fn id(&self) -> EpisodeId {
        self.id
    }

    /// Entries sorted by `(depth, node)`.
    pub fn entries(&self) -> &[EpisodeEntry] {
        &self.entries
    }

    /// Only the matchable entries.
    pub fn leaves(&self) -> impl Iterator<Item = &EpisodeEntry> {
        self.entries.iter().filter(|e| e.leaf)
    }

    /// Agent cycle on which the episode was recorded.
    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    pub fn recorded_at(&self) -> DateTime<Utc> {
        self.recorded_at
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// EpisodeStore
// ─────────────────────────────────────────────────────────────────────────────

/// Append-only log of episodes plus the current-episode cursor.
#[derive(Debug, Default)]
pub struct EpisodeStore {
    episodes: GrowList<Episode>,
    current: Option<EpisodeId>,
}

impl EpisodeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.episodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.episodes.is_empty()
    }

    /// The id the next appended episode will receive.
    pub fn next_id(&self) -> EpisodeId {
        EpisodeId(self.episodes.len())
    }

    /// Sort `entries` by `(depth, node)` and append them as a new episode.
    pub(crate) fn append(&mut self, trie: &FactTrie, mut entries: Vec<EpisodeEntry>, cycle: u64) -> EpisodeId {
        entries.sort_by_key(|e| (trie.node(e.node).depth(), e.node));
        let id = self.next_id();
        self.episodes.push(Episode {
            id,
            entries,
            cycle,
            recorded_at: Utc::now(),
            last_query: 0,
            score: 0,
        });
        id
    }

    pub fn get(&self, id: EpisodeId) -> Option<&Episode> {
        self.episodes.get(id.0)
    }

    pub(crate) fn get_mut(&mut self, id: EpisodeId) -> Option<&mut Episode> {
        self.episodes.get_mut(id.0)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Episode> {
        self.episodes.iter()
    }

    /// The most recently installed episode, if any.
    pub fn current(&self) -> Option<EpisodeId> {
        self.current
    }

    pub(crate) fn set_current(&mut self, id: Option<EpisodeId>) {
        self.current = id;
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Summaries
// ─────────────────────────────────────────────────────────────────────────────

/// Serialisable view of one entry, with its full attribute path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntrySummary {
    /// Dotted attribute path from the root, e.g. `"item.color"`.
    pub path: String,
    /// `None` for structural entries.
    pub value: Option<Value>,
    pub activation: Option<i64>,
}

/// Serialisable view of an episode.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpisodeSummary {
    pub id: EpisodeId,
    pub cycle: u64,
    pub recorded_at: DateTime<Utc>,
    pub leaves: usize,
    pub entries: Vec<EntrySummary>,
}

impl EpisodeSummary {
    pub fn build(trie: &FactTrie, episode: &Episode) -> Self {
        let entries = episode
            .entries()
            .iter()
            .map(|e| EntrySummary {
                path: path_of(trie, e.node),
                value: trie.node(e.node).value().constant(),
                activation: e.activation,
            })
            .collect();
        Self {
            id: episode.id(),
            cycle: episode.cycle(),
            recorded_at: episode.recorded_at(),
            leaves: episode.leaves().count(),
            entries,
        }
    }
}

/// Dotted attribute path of `node`.
pub fn path_of(trie: &FactTrie, node: NodeId) -> String {
    let mut attrs = Vec::new();
    let mut cursor = Some(node);
    while let Some(id) = cursor {
        let n = trie.node(id);
        if n.parent().is_none() {
            break;
        }
        attrs.push(n.attr());
        cursor = n.parent();
    }
    attrs.reverse();
    attrs.join(".")
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
