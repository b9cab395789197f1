use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// What the catalog knows about one file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    /// Content-addressed stored name.
    pub file: String,
    /// Size in bytes.
    pub size: u64,
    /// Replication-priority rank; lower is more important.
    pub kn: u32,
    /// `host:port` of every node currently holding a copy.
    pub nodes: Vec<String>,
}

/// Capability interface over the file catalog.
///
/// The backend is chosen at configuration time and injected; the replicator
/// treats selection policy as a black box.
pub trait FileCatalog: Send + Sync {
    /// The next file `host` should hold a copy of, with its donors, or
    /// `None` when the node is caught up.
    fn select_file_to_replicate(&self, host: &str) -> Option<FileRecord>;

    /// Files resident on `host`, ordered by descending `kn` (least important
    /// first); this is the eviction scan order.
    fn files_by_descending_kn(&self, host: &str) -> Vec<String>;

    fn kn_of(&self, file: &str) -> Option<u32>;

    /// Notes that `host` now holds a copy of `file`.
    fn record_replica(&self, file: &str, host: &str);

    /// Notes that `host` no longer holds a copy of `file`.
    fn drop_replica(&self, file: &str, host: &str);
}

#[derive(Debug, Clone)]
struct CatalogEntry {
    size: u64,
    kn: u32,
    nodes: HashSet<String>,
}

/// In-memory catalog backend, used by tests and the demo node wiring.
///
/// Selection policy: the most important (lowest `kn`) file the node does not
/// yet hold and some other node can donate.
#[derive(Default)]
pub struct MemoryCatalog {
    entries: DashMap<String, CatalogEntry>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, file: &str, size: u64, kn: u32, nodes: &[&str]) {
        self.entries.insert(
            file.to_string(),
            CatalogEntry {
                size,
                kn,
                nodes: nodes.iter().map(|node| node.to_string()).collect(),
            },
        );
    }

    pub fn nodes_of(&self, file: &str) -> Vec<String> {
        self.entries
            .get(file)
            .map(|entry| entry.nodes.iter().cloned().collect())
            .unwrap_or_default()
    }
}

impl FileCatalog for MemoryCatalog {
    fn select_file_to_replicate(&self, host: &str) -> Option<FileRecord> {
        self.entries
            .iter()
            .filter(|entry| {
                !entry.value().nodes.contains(host) && !entry.value().nodes.is_empty()
            })
            .min_by_key(|entry| (entry.value().kn, entry.key().clone()))
            .map(|entry| FileRecord {
                file: entry.key().clone(),
                size: entry.value().size,
                kn: entry.value().kn,
                nodes: entry.value().nodes.iter().cloned().collect(),
            })
    }

    fn files_by_descending_kn(&self, host: &str) -> Vec<String> {
        let mut resident: Vec<(u32, String)> = self
            .entries
            .iter()
            .filter(|entry| entry.value().nodes.contains(host))
            .map(|entry| (entry.value().kn, entry.key().clone()))
            .collect();
        resident.sort_by(|a, b| b.cmp(a));
        resident.into_iter().map(|(_, file)| file).collect()
    }

    fn kn_of(&self, file: &str) -> Option<u32> {
        self.entries.get(file).map(|entry| entry.kn)
    }

    fn record_replica(&self, file: &str, host: &str) {
        if let Some(mut entry) = self.entries.get_mut(file) {
            entry.nodes.insert(host.to_string());
        }
    }

    fn drop_replica(&self, file: &str, host: &str) {
        if let Some(mut entry) = self.entries.get_mut(file) {
            entry.nodes.remove(host);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_selection_prefers_the_most_important_file() {
        let catalog = MemoryCatalog::new();
        catalog.insert("low", 10, 9, &["donor:1"]);
        catalog.insert("high", 10, 2, &["donor:1"]);
        catalog.insert("held", 10, 1, &["me:1"]);

        let record = catalog.select_file_to_replicate("me:1").unwrap();
        assert_eq!(record.file, "high");
    }

    #[test]
    fn test_selection_skips_files_without_donors() {
        let catalog = MemoryCatalog::new();
        catalog.insert("orphan", 10, 1, &[]);
        assert_eq!(catalog.select_file_to_replicate("me:1"), None);
    }

    #[test]
    fn test_eviction_scan_order_is_descending_kn() {
        let catalog = MemoryCatalog::new();
        catalog.insert("a", 10, 3, &["me:1"]);
        catalog.insert("b", 10, 9, &["me:1"]);
        catalog.insert("c", 10, 5, &["me:1"]);
        catalog.insert("other", 10, 7, &["elsewhere:1"]);

        assert_eq!(
            catalog.files_by_descending_kn("me:1"),
            vec!["b".to_string(), "c".to_string(), "a".to_string()]
        );
    }

    #[test]
    fn test_replica_bookkeeping() {
        let catalog = MemoryCatalog::new();
        catalog.insert("f", 10, 1, &["donor:1"]);

        catalog.record_replica("f", "me:1");
        assert!(catalog.nodes_of("f").contains(&"me:1".to_string()));

        catalog.drop_replica("f", "me:1");
        assert!(!catalog.nodes_of("f").contains(&"me:1".to_string()));
    }
}
