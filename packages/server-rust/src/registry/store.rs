//! In-memory registry of known backend nodes.
//!
//! The node set lives behind an `ArcSwap<Vec<Node>>`: readers take a
//! lock-free snapshot and never observe a half-applied mutation, writers
//! publish a whole new vector. `remove` is a read-modify-write and goes
//! through `rcu`, so it composes with a concurrent `replace` without locks.

use std::collections::HashSet;
use std::sync::Arc;

use arc_swap::ArcSwap;
use balance_core::{normalize, ChangeSummary, Node};
use tracing::{debug, warn};

/// Process-wide set of backend nodes, rebuilt from the discovery source.
///
/// Never mutated by the proxy path; all mutations come from the refresher.
pub struct RegistryStore {
    nodes: ArcSwap<Vec<Node>>,
}

impl std::fmt::Debug for RegistryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistryStore")
            .field("nodes", &self.nodes.load().len())
            .finish()
    }
}

impl RegistryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            nodes: ArcSwap::from_pointee(Vec::new()),
        }
    }

    /// Atomically swaps in a new node set and summarizes the difference.
    ///
    /// Records repeating an earlier record's normalized name are dropped so
    /// names stay unique; the first occurrence wins.
    pub fn replace(&self, nodes: Vec<Node>) -> ChangeSummary {
        let mut seen = HashSet::with_capacity(nodes.len());
        let mut unique = Vec::with_capacity(nodes.len());
        for node in nodes {
            if seen.insert(node.normalized_name()) {
                unique.push(node);
            } else {
                warn!(node = %node.name, "Dropping duplicate node name from discovery response");
            }
        }

        let servers = Arc::new(unique);
        let previous = self.nodes.swap(Arc::clone(&servers));

        let known: HashSet<String> = previous.iter().map(Node::normalized_name).collect();
        let added: Vec<Node> = servers
            .iter()
            .filter(|n| !known.contains(&n.normalized_name()))
            .cloned()
            .collect();
        let changed = previous.len() != servers.len() || !added.is_empty();

        debug!(
            before = previous.len(),
            after = servers.len(),
            added = added.len(),
            changed,
            "Registry replaced"
        );

        ChangeSummary {
            added,
            changed,
            servers,
        }
    }

    /// Removes the first node whose normalized address matches `address`.
    ///
    /// Returns whether a node was removed. An unknown address is not an
    /// error: a concurrent refresh may already have dropped it.
    pub fn remove(&self, address: &str) -> bool {
        let target = normalize(address);
        let mut removed = false;

        self.nodes.rcu(|current| {
            removed = false;
            let mut next = Vec::clone(current);
            if let Some(idx) = next.iter().position(|n| n.normalized_address() == target) {
                next.remove(idx);
                removed = true;
            }
            next
        });

        removed
    }

    /// Returns a copy of the nodes matching `node_type`.
    ///
    /// An empty filter returns every node. Matching is a normalized, exact
    /// comparison on the type tag.
    #[must_use]
    pub fn list(&self, node_type: &str) -> Vec<Node> {
        self.nodes
            .load()
            .iter()
            .filter(|n| n.is_type(node_type))
            .cloned()
            .collect()
    }

    /// Returns the current immutable snapshot without copying.
    #[must_use]
    pub fn snapshot(&self) -> Arc<Vec<Node>> {
        self.nodes.load_full()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.load().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.load().is_empty()
    }
}

impl Default for RegistryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn api(name: &str, address: &str) -> Node {
        Node::new(name, "api", address)
    }

    #[test]
    fn new_store_is_empty() {
        let store = RegistryStore::new();
        assert!(store.is_empty());
        assert!(store.list("").is_empty());
    }

    #[test]
    fn first_replace_reports_everything_added() {
        let store = RegistryStore::new();
        let summary = store.replace(vec![api("a", "10.0.0.1"), api("b", "10.0.0.2")]);

        assert!(summary.changed);
        assert_eq!(summary.added.len(), 2);
        assert_eq!(summary.servers.len(), 2);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn identical_replace_is_unchanged() {
        let store = RegistryStore::new();
        store.replace(vec![api("a", "10.0.0.1")]);

        let summary = store.replace(vec![api("a", "10.0.0.1")]);
        assert!(!summary.changed);
        assert!(summary.added.is_empty());
    }

    #[test]
    fn identity_uses_normalized_name() {
        let store = RegistryStore::new();
        store.replace(vec![api("API-1", "10.0.0.1")]);

        let summary = store.replace(vec![api("  api-1 ", "10.0.0.1")]);
        assert!(summary.added.is_empty());
        assert!(!summary.changed);
    }

    #[test]
    fn shrinking_set_is_a_change_without_additions() {
        let store = RegistryStore::new();
        store.replace(vec![api("a", "10.0.0.1"), api("b", "10.0.0.2")]);

        let summary = store.replace(vec![api("a", "10.0.0.1")]);
        assert!(summary.changed);
        assert!(summary.added.is_empty());
    }

    #[test]
    fn address_move_with_same_count_is_not_a_change() {
        let store = RegistryStore::new();
        store.replace(vec![api("a", "10.0.0.1")]);

        let summary = store.replace(vec![api("a", "10.0.0.9")]);
        assert!(!summary.changed);
        // The new address is still applied.
        assert_eq!(store.list("")[0].address, "10.0.0.9");
    }

    #[test]
    fn rename_with_same_count_reports_addition() {
        let store = RegistryStore::new();
        store.replace(vec![api("a", "10.0.0.1")]);

        let summary = store.replace(vec![api("b", "10.0.0.1")]);
        assert!(summary.changed);
        assert_eq!(summary.added, vec![api("b", "10.0.0.1")]);
    }

    #[test]
    fn duplicate_names_keep_first_occurrence() {
        let store = RegistryStore::new();
        let summary = store.replace(vec![api("a", "10.0.0.1"), api(" A ", "10.0.0.2")]);

        assert_eq!(summary.servers.len(), 1);
        assert_eq!(store.list("")[0].address, "10.0.0.1");
    }

    #[test]
    fn remove_matches_normalized_address() {
        let store = RegistryStore::new();
        store.replace(vec![api("a", "Host-A.internal"), api("b", "10.0.0.2")]);

        assert!(store.remove("  host-a.INTERNAL "));
        assert_eq!(store.list(""), vec![api("b", "10.0.0.2")]);
    }

    #[test]
    fn remove_unknown_address_is_noop() {
        let store = RegistryStore::new();
        store.replace(vec![api("a", "10.0.0.1")]);

        assert!(!store.remove("10.9.9.9"));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn remove_twice_second_is_noop() {
        let store = RegistryStore::new();
        store.replace(vec![api("a", "10.0.0.1")]);

        assert!(store.remove("10.0.0.1"));
        assert!(!store.remove("10.0.0.1"));
        assert!(store.is_empty());
    }

    #[test]
    fn remove_only_drops_first_match() {
        let store = RegistryStore::new();
        store.replace(vec![api("a", "10.0.0.1"), api("b", "10.0.0.1")]);

        assert!(store.remove("10.0.0.1"));
        assert_eq!(store.list(""), vec![api("b", "10.0.0.1")]);
    }

    #[test]
    fn list_filters_by_normalized_type() {
        let store = RegistryStore::new();
        store.replace(vec![
            api("a", "10.0.0.1"),
            Node::new("d", " DB ", "10.0.0.2"),
        ]);

        assert_eq!(store.list("api").len(), 1);
        assert_eq!(store.list("db").len(), 1);
        assert_eq!(store.list(" Db").len(), 1);
        assert_eq!(store.list("").len(), 2);
        assert!(store.list("cache").is_empty());
    }

    #[test]
    fn list_is_stable_between_replaces() {
        let store = RegistryStore::new();
        store.replace(vec![api("a", "10.0.0.1"), api("b", "10.0.0.2")]);

        let first = store.list("");
        for _ in 0..10 {
            assert_eq!(store.list(""), first);
        }
    }

    #[test]
    fn snapshot_is_unaffected_by_later_mutation() {
        let store = RegistryStore::new();
        store.replace(vec![api("a", "10.0.0.1")]);

        let snapshot = store.snapshot();
        store.remove("10.0.0.1");

        assert_eq!(snapshot.len(), 1);
        assert!(store.is_empty());
    }

    #[test]
    fn concurrent_remove_and_replace_never_tear() {
        let store = Arc::new(RegistryStore::new());
        let nodes: Vec<Node> = (0..32)
            .map(|i| api(&format!("n{i}"), &format!("10.0.0.{i}")))
            .collect();
        store.replace(nodes.clone());

        let writers: Vec<_> = (0..4)
            .map(|t| {
                let store = Arc::clone(&store);
                let nodes = nodes.clone();
                std::thread::spawn(move || {
                    for i in 0..200 {
                        if i % 10 == 0 {
                            store.replace(nodes.clone());
                        } else {
                            store.remove(&format!("10.0.0.{}", (i + t) % 32));
                        }
                    }
                })
            })
            .collect();

        for _ in 0..200 {
            let snapshot = store.snapshot();
            let names: HashSet<_> = snapshot.iter().map(Node::normalized_name).collect();
            assert_eq!(names.len(), snapshot.len());
        }

        for w in writers {
            w.join().unwrap();
        }
    }

    fn node_list() -> impl Strategy<Value = Vec<Node>> {
        // Small alphabets so duplicates and overlaps are common.
        prop::collection::vec(
            ("[aAbBc ]{1,2}", "(api|db|API)", "10\\.0\\.0\\.[1-4]")
                .prop_map(|(name, kind, address)| Node::new(name, kind, address)),
            0..8,
        )
    }

    proptest! {
        #[test]
        fn replace_keeps_names_unique_and_reports_new_names(
            before in node_list(),
            after in node_list(),
        ) {
            let store = RegistryStore::new();
            store.replace(before);
            let previous: HashSet<String> =
                store.list("").iter().map(Node::normalized_name).collect();

            let summary = store.replace(after.clone());
            let listed = store.list("");

            let names: Vec<String> = listed.iter().map(Node::normalized_name).collect();
            let unique: HashSet<&String> = names.iter().collect();
            prop_assert_eq!(unique.len(), names.len());

            let mut expected_names = HashSet::new();
            let expected: Vec<&Node> = after
                .iter()
                .filter(|n| expected_names.insert(n.normalized_name()))
                .collect();
            prop_assert_eq!(listed.iter().collect::<Vec<_>>(), expected);

            let added: HashSet<String> = summary.added.iter().map(Node::normalized_name).collect();
            let missing: HashSet<String> = names
                .iter()
                .filter(|n| !previous.contains(*n))
                .cloned()
                .collect();
            prop_assert_eq!(&added, &missing);
            prop_assert_eq!(added.len(), summary.added.len());
            prop_assert_eq!(summary.changed, previous.len() != listed.len() || !added.is_empty());

            prop_assert_eq!(store.list(""), listed);
        }
    }
}
