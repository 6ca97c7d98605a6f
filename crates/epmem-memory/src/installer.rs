//! Installer – mirrors a stored episode back into the live belief state.
//!
//! Entries are installed in the episode's `(depth, node)` order, so every
//! parent edge is materialised before its children.  An entry whose parent
//! is not currently mirrored is skipped, as is an entry whose node is
//! already mirrored (several live facts that collapsed onto one structural
//! node during recording come back as one).
//!
//! Clearing walks the same entries in reverse, children before parents,
//! removing each mirrored fact and releasing the reference taken on it.
//!
//! The "no retrieval" sentinel is mirrored on the trie root itself; it is
//! the only fact the root ever mirrors.

use tracing::{debug, warn};

use epmem_types::{EpmemError, SymbolId, Value};

use crate::belief::BeliefState;
use crate::episode::{Episode, EpisodeId, EpisodeStore};
use crate::trie::{FactTrie, Mirror, NodeId};

/// Attribute of the sentinel fact placed under the result root.
pub const NO_RETRIEVAL_ATTR: &str = "no-retrieval";

/// What is currently mirrored under the result root.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Installed {
    #[default]
    Nothing,
    Episode(EpisodeId),
    Sentinel,
}

/// Materialise `episode` under `result_root`.  Returns the number of facts
/// created.
///
/// If the belief state rejects a fact part way through, every fact created
/// by this call is removed again and its node unmirrored before the error is
/// returned, so a failed install leaves nothing behind.
pub fn install_episode<B: BeliefState>(
    trie: &mut FactTrie,
    episode: &Episode,
    belief: &mut B,
    result_root: SymbolId,
) -> Result<usize, EpmemError> {
    let root = trie.root();
    let mut created: Vec<NodeId> = Vec::new();

    for entry in episode.entries() {
        let node = trie.node(entry.node);
        if node.is_mirrored() {
            debug!(node = entry.node.index(), "node already mirrored; skipping duplicate entry");
            continue;
        }
        let Some(parent) = node.parent() else {
            continue;
        };
        let parent_symbol = if parent == root {
            result_root
        } else {
            match trie.node(parent).mirror().and_then(|m| m.symbol) {
                Some(symbol) => symbol,
                None => continue,
            }
        };

        let attr = node.attr().to_string();
        let (value, symbol) = match node.value().constant() {
            Some(constant) => (constant, None),
            None => {
                let fresh = belief.new_identifier(identifier_letter(&attr));
                (Value::Identifier(fresh), Some(fresh))
            }
        };

        let fact = match belief.add_fact(parent_symbol, &attr, value) {
            Ok(fact) => fact,
            Err(e) => {
                warn!(episode = episode.id().0, error = %e, rolled_back = created.len(), "install failed");
                for &node in created.iter().rev() {
                    release(trie, node, belief);
                }
                return Err(e);
            }
        };
        belief.add_ref(fact);
        trie.node_mut(entry.node).set_mirror(Mirror { fact, symbol });
        created.push(entry.node);
    }

    debug!(episode = episode.id().0, created = created.len(), "installed episode");
    Ok(created.len())
}

/// Place the `no-retrieval` sentinel under `result_root`.
pub fn install_sentinel<B: BeliefState>(
    trie: &mut FactTrie,
    belief: &mut B,
    result_root: SymbolId,
) -> Result<(), EpmemError> {
    let root = trie.root();
    if trie.node(root).is_mirrored() {
        return Ok(());
    }
    let fact = belief.add_fact(result_root, NO_RETRIEVAL_ATTR, Value::Str("true".to_string()))?;
    belief.add_ref(fact);
    trie.node_mut(root).set_mirror(Mirror { fact, symbol: None });
    Ok(())
}

/// Tear down whatever `installed` describes.
pub fn clear<B: BeliefState>(trie: &mut FactTrie, store: &EpisodeStore, installed: Installed, belief: &mut B) {
    match installed {
        Installed::Nothing => {}
        Installed::Sentinel => {
            let root = trie.root();
            release(trie, root, belief);
        }
        Installed::Episode(id) => {
            let Some(episode) = store.get(id) else {
                warn!(episode = id.0, "installed episode not found in store");
                return;
            };
            for entry in episode.entries().iter().rev() {
                release(trie, entry.node, belief);
            }
        }
    }
}

fn release<B: BeliefState>(trie: &mut FactTrie, node: NodeId, belief: &mut B) {
    let Some(mirror) = trie.node_mut(node).take_mirror() else {
        debug!(node = node.index(), "entry was not mirrored; nothing to clear");
        return;
    };
    if let Err(e) = belief.remove_fact(mirror.fact) {
        warn!(node = node.index(), error = %e, "expected mirrored fact is missing");
    }
    belief.release_ref(mirror.fact);
}

/// First letter of `attr`, upper-cased, used to name fabricated identifiers.
fn identifier_letter(attr: &str) -> char {
    attr.chars()
        .find(|c| c.is_ascii_alphabetic())
        .map(|c| c.to_ascii_uppercase())
        .unwrap_or('M')
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::belief::WorkingMemory;
    use crate::recorder::record;
    use epmem_types::EpmemConfig;

    fn s(v: &str) -> Value {
        Value::Str(v.to_string())
    }

    /// `S1 ^item I1`, `I1 ^color red`, `I1 ^size 3`, `S1 ^mood calm`.
    fn recorded() -> (WorkingMemory, FactTrie, EpisodeStore, EpisodeId, SymbolId) {
        let mut wm = WorkingMemory::new();
        let s1 = wm.top_state();
        let item = wm.new_identifier('I');
        wm.add_fact(s1, "item", Value::Identifier(item)).unwrap();
        wm.add_fact(item, "color", s("red")).unwrap();
        wm.add_fact(item, "size", Value::Int(3)).unwrap();
        wm.add_fact(s1, "mood", s("calm")).unwrap();
        let mut trie = FactTrie::new();
        let mut store = EpisodeStore::new();
        let id = record(&mut trie, &mut store, &mut wm, s1, 0, &EpmemConfig::default()).episode;
        let result_root = wm.new_identifier('R');
        (wm, trie, store, id, result_root)
    }

    #[test]
    fn install_rebuilds_the_subtree_parent_first() {
        let (mut wm, mut trie, store, id, result_root) = recorded();
        let created = install_episode(&mut trie, store.get(id).unwrap(), &mut wm, result_root).unwrap();
        assert_eq!(created, 4);

        let item = wm.find(result_root, "item").unwrap().value.as_identifier().unwrap();
        assert_ne!(Some(item), wm.lookup("I1"));
        assert_eq!(wm.find(item, "color").unwrap().value, s("red"));
        assert_eq!(wm.find(item, "size").unwrap().value, Value::Int(3));
        assert_eq!(wm.find(result_root, "mood").unwrap().value, s("calm"));
    }

    #[test]
    fn installed_facts_hold_a_reference() {
        let (mut wm, mut trie, store, id, result_root) = recorded();
        install_episode(&mut trie, store.get(id).unwrap(), &mut wm, result_root).unwrap();
        let mood = wm.find(result_root, "mood").unwrap().id;
        assert_eq!(wm.ref_count(mood), 1);
    }

    #[test]
    fn clear_removes_everything_and_unmirrors() {
        let (mut wm, mut trie, store, id, result_root) = recorded();
        install_episode(&mut trie, store.get(id).unwrap(), &mut wm, result_root).unwrap();
        clear(&mut trie, &store, Installed::Episode(id), &mut wm);
        assert!(wm.facts_of(result_root).is_empty());
        assert!(trie.nodes().all(|(_, n)| !n.is_mirrored()));
    }

    #[test]
    fn entries_with_unmirrored_parents_are_skipped() {
        let (mut wm, mut trie, store, id, result_root) = recorded();
        // Pretend the `item` scaffold is already mirrored elsewhere with no
        // identifier to attach children to.
        let item = trie.find(trie.root(), "item", &Value::Identifier(SymbolId(0))).unwrap();
        let fake = wm.add_fact(result_root, "decoy", Value::Int(0)).unwrap();
        trie.node_mut(item).set_mirror(Mirror { fact: fake, symbol: None });

        let created = install_episode(&mut trie, store.get(id).unwrap(), &mut wm, result_root).unwrap();
        // Only `mood` could be placed.
        assert_eq!(created, 1);
        assert!(wm.find(result_root, "item").is_none());
    }

    #[test]
    fn missing_mirrored_fact_is_tolerated_on_clear() {
        let (mut wm, mut trie, store, id, result_root) = recorded();
        install_episode(&mut trie, store.get(id).unwrap(), &mut wm, result_root).unwrap();
        // The agent removed one reconstructed fact itself.
        let mood = wm.find(result_root, "mood").unwrap().id;
        wm.remove_fact(mood).unwrap();

        clear(&mut trie, &store, Installed::Episode(id), &mut wm);
        assert!(wm.facts_of(result_root).is_empty());
        assert!(trie.nodes().all(|(_, n)| !n.is_mirrored()));
    }

    /// Working memory that rejects every `add_fact` after the first `allowed`.
    struct Flaky {
        wm: WorkingMemory,
        allowed: usize,
    }

    impl BeliefState for Flaky {
        fn new_visit_token(&mut self) -> epmem_types::VisitToken {
            self.wm.new_visit_token()
        }
        fn facts_under(&mut self, id: SymbolId, visit: epmem_types::VisitToken) -> Vec<epmem_types::Fact> {
            self.wm.facts_under(id, visit)
        }
        fn activation(&self, fact: epmem_types::FactId) -> Option<i64> {
            self.wm.activation(fact)
        }
        fn add_fact(&mut self, id: SymbolId, attr: &str, value: Value) -> Result<epmem_types::FactId, EpmemError> {
            if self.allowed == 0 {
                return Err(EpmemError::UnknownSymbol(id));
            }
            self.allowed -= 1;
            self.wm.add_fact(id, attr, value)
        }
        fn remove_fact(&mut self, fact: epmem_types::FactId) -> Result<(), EpmemError> {
            self.wm.remove_fact(fact)
        }
        fn add_ref(&mut self, fact: epmem_types::FactId) {
            self.wm.add_ref(fact)
        }
        fn release_ref(&mut self, fact: epmem_types::FactId) {
            self.wm.release_ref(fact)
        }
        fn new_identifier(&mut self, letter: char) -> SymbolId {
            self.wm.new_identifier(letter)
        }
    }

    #[test]
    fn failed_install_rolls_back_what_it_created() {
        let (wm, mut trie, store, id, result_root) = recorded();
        let mut flaky = Flaky { wm, allowed: 2 };
        assert!(install_episode(&mut trie, store.get(id).unwrap(), &mut flaky, result_root).is_err());
        assert!(flaky.wm.facts_of(result_root).is_empty());
        assert!(trie.nodes().all(|(_, n)| !n.is_mirrored()));

        // A later install into working memory starts from a clean slate.
        flaky.allowed = usize::MAX;
        let created = install_episode(&mut trie, store.get(id).unwrap(), &mut flaky, result_root).unwrap();
        assert_eq!(created, 4);
        assert_eq!(flaky.wm.facts_of(result_root).len(), 2);
    }

    #[test]
    fn sentinel_is_owned_by_the_root() {
        let (mut wm, mut trie, store, _, result_root) = recorded();
        install_sentinel(&mut trie, &mut wm, result_root).unwrap();
        install_sentinel(&mut trie, &mut wm, result_root).unwrap();
        assert_eq!(wm.facts_of(result_root).len(), 1);
        assert!(trie.node(trie.root()).is_mirrored());
        assert_eq!(wm.find(result_root, NO_RETRIEVAL_ATTR).unwrap().value, s("true"));

        clear(&mut trie, &store, Installed::Sentinel, &mut wm);
        assert!(wm.facts_of(result_root).is_empty());
        assert!(!trie.node(trie.root()).is_mirrored());
    }

    #[test]
    fn collapsed_multi_valued_attributes_install_once() {
        let mut wm = WorkingMemory::new();
        let s1 = wm.top_state();
        let a = wm.new_identifier('I');
        let b = wm.new_identifier('I');
        wm.add_fact(s1, "item", Value::Identifier(a)).unwrap();
        wm.add_fact(s1, "item", Value::Identifier(b)).unwrap();
        wm.add_fact(a, "color", s("red")).unwrap();
        wm.add_fact(b, "color", s("red")).unwrap();
        let mut trie = FactTrie::new();
        let mut store = EpisodeStore::new();
        let id = record(&mut trie, &mut store, &mut wm, s1, 0, &EpmemConfig::default()).episode;
        assert_eq!(store.get(id).unwrap().entries().len(), 4);

        let result_root = wm.new_identifier('R');
        let created = install_episode(&mut trie, store.get(id).unwrap(), &mut wm, result_root).unwrap();
        assert_eq!(created, 2);
        clear(&mut trie, &store, Installed::Episode(id), &mut wm);
        assert!(wm.facts_of(result_root).is_empty());
    }

    #[test]
    fn identifier_letters_follow_the_attribute() {
        assert_eq!(identifier_letter("item"), 'I');
        assert_eq!(identifier_letter("_x"), 'X');
        assert_eq!(identifier_letter("42"), 'M');
    }
}
