//! `epmem-memory` – The Episodic Store.
//!
//! Records snapshots of the agent's belief state over time and retrieves the
//! stored snapshot that best overlaps a partial cue, reinstalling it into
//! the live belief state.  Everything is held in memory for the lifetime of
//! the agent.
//!
//! # Modules
//!
//! - [`grow_list`] – [`GrowList`][grow_list::GrowList]: the append-only
//!   array used for the episode log and node reference lists.
//! - [`trie`] – [`FactTrie`][trie::FactTrie]: the arena of canonical
//!   `(attribute, value)` edges shared by every episode, including the
//!   ubiquity pruning policy.
//! - [`episode`] – [`EpisodeStore`][episode::EpisodeStore]: the append-only
//!   episode log and the current-episode cursor.
//! - [`recorder`] – walks the live belief state into a new episode.
//! - [`retrieval`] – projects a cue onto the trie and scores episodes by
//!   activation-weighted overlap.
//! - [`installer`] – mirrors an episode (or the `no-retrieval` sentinel)
//!   back into the belief state, and tears it down again.
//! - [`engine`] – [`EpisodicEngine`][engine::EpisodicEngine]: the single
//!   state object owning all of the above.
//! - [`belief`] – the [`BeliefState`][belief::BeliefState] collaborator
//!   trait and the in-process [`WorkingMemory`][belief::WorkingMemory].

pub mod belief;
pub mod engine;
pub mod episode;
pub mod grow_list;
pub mod installer;
pub mod recorder;
pub mod retrieval;
pub mod trie;

pub use belief::{BeliefState, WorkingMemory};
pub use engine::EpisodicEngine;
pub use episode::{Episode, EpisodeId, EpisodeStore, EpisodeSummary};
pub use installer::{Installed, NO_RETRIEVAL_ATTR};
pub use recorder::RecordOutcome;
pub use retrieval::{NoMemory, Retrieval};
pub use trie::{FactTrie, NodeId};
