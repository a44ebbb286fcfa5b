//! Conflict resolution and the merge map
//!
//! Sources are processed strictly in the order given; the first-listed
//! source has priority. The policy is asymmetric by entry kind: files keep
//! the first winner and record the collision, directories merge silently,
//! and a mixed collision resolves to the directory with no conflict record.

use std::collections::BTreeMap;

use tracing::debug;

use crate::loader::{Entry, EntryKind};
use crate::paths;

/// An entry placed in the merge map, tagged with its source index
#[derive(Debug, Clone)]
pub struct PlacedEntry {
    pub source: usize,
    pub entry: Entry,
}

/// Canonical path → winner, plus the file/file collision report
#[derive(Debug, Default)]
pub struct MergeMap {
    pub winners: BTreeMap<String, PlacedEntry>,
    /// Only file-vs-file collisions; consulted later to decide which paths
    /// need document merging instead of copy-through
    pub conflicts: BTreeMap<String, Vec<PlacedEntry>>,
}

impl MergeMap {
    pub fn file_conflict_count(&self) -> usize {
        self.conflicts.values().map(Vec::len).sum()
    }
}

/// Build the merge map. `include` gates file entries (directories are
/// structural and always pass); entries of expanded nested packs are skipped
/// because their contents already flow through as child entries.
pub fn resolve<F>(sources: &[(usize, &[Entry])], mut include: F) -> MergeMap
where
    F: FnMut(&Entry, &str) -> bool,
{
    let mut map = MergeMap::default();

    for (source, entries) in sources {
        for entry in *entries {
            if entry.expanded {
                continue;
            }
            let canonical = paths::normalize(&entry.path);
            if canonical.is_empty() {
                continue;
            }
            if entry.kind == EntryKind::File && !include(entry, &canonical) {
                debug!(source, path = %canonical, "excluded by inclusion predicate");
                continue;
            }

            let placed = PlacedEntry {
                source: *source,
                entry: entry.clone(),
            };

            match map.winners.get_mut(&canonical) {
                None => {
                    map.winners.insert(canonical, placed);
                }
                Some(existing) => match (existing.entry.kind, placed.entry.kind) {
                    // already structurally merged
                    (EntryKind::Directory, EntryKind::Directory) => {}
                    (EntryKind::File, EntryKind::File) => {
                        debug!(
                            path = %canonical,
                            winner = existing.source,
                            loser = placed.source,
                            "file collision, keeping first source"
                        );
                        map.conflicts.entry(canonical).or_default().push(placed);
                    }
                    // directories take precedence over files, no conflict record
                    (EntryKind::File, EntryKind::Directory) => {
                        *existing = placed;
                    }
                    (EntryKind::Directory, EntryKind::File) => {}
                },
            }
        }
    }

    map
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(path: &str, size: u64) -> Entry {
        Entry {
            path: path.to_string(),
            kind: EntryKind::File,
            depth: 0,
            size,
            container: None,
            expanded: false,
        }
    }

    fn dir(path: &str) -> Entry {
        Entry {
            path: path.to_string(),
            kind: EntryKind::Directory,
            depth: 0,
            size: 0,
            container: None,
            expanded: false,
        }
    }

    fn resolve_all(sources: &[(usize, &[Entry])]) -> MergeMap {
        resolve(sources, |_, _| true)
    }

    #[test]
    fn test_first_source_wins_file_conflict() {
        let a = vec![file("data/handling.meta", 500)];
        let b = vec![file("data/handling.meta", 700)];

        let map = resolve_all(&[(0, &a), (1, &b)]);
        let winner = &map.winners["data/handling.meta"];
        assert_eq!(winner.source, 0);
        assert_eq!(winner.entry.size, 500);

        let conflicts = &map.conflicts["data/handling.meta"];
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].source, 1);
    }

    #[test]
    fn test_priority_flips_with_source_order() {
        let a = vec![file("data/handling.meta", 500)];
        let b = vec![file("data/handling.meta", 700)];

        let map = resolve_all(&[(0, &b), (1, &a)]);
        assert_eq!(map.winners["data/handling.meta"].entry.size, 700);
    }

    #[test]
    fn test_directories_never_conflict() {
        let a = vec![dir("common/data")];
        let b = vec![dir("common/data")];

        let map = resolve_all(&[(0, &a), (1, &b)]);
        assert!(map.conflicts.is_empty());
        assert_eq!(map.winners["common/data"].source, 0);
    }

    #[test]
    fn test_directory_overwrites_file_without_record() {
        let a = vec![file("models", 10)];
        let b = vec![dir("models")];

        let map = resolve_all(&[(0, &a), (1, &b)]);
        assert_eq!(map.winners["models"].entry.kind, EntryKind::Directory);
        assert!(map.conflicts.is_empty());

        // and in the other arrival order the directory still wins
        let map = resolve_all(&[(0, &b), (1, &a)]);
        assert_eq!(map.winners["models"].entry.kind, EntryKind::Directory);
        assert!(map.conflicts.is_empty());
    }

    #[test]
    fn test_normalization_merges_container_variants() {
        let a = vec![file("vehicles.rpf/adder.yft", 10)];
        let b = vec![file("cars.rpf/adder.yft", 20)];

        let map = resolve_all(&[(0, &a), (1, &b)]);
        assert_eq!(map.winners.len(), 1);
        assert_eq!(map.winners["adder.yft"].source, 0);
        assert_eq!(map.conflicts["adder.yft"].len(), 1);
    }

    #[test]
    fn test_include_predicate_gates_files_only() {
        let a = vec![file("data/skip.meta", 1), dir("data")];

        let map = resolve(&[(0, &a)], |_, canonical| !canonical.ends_with("skip.meta"));
        assert!(!map.winners.contains_key("data/skip.meta"));
        assert!(map.winners.contains_key("data"));
    }

    #[test]
    fn test_expanded_pack_entries_skipped() {
        let mut packed = file("x64/vehicles.rpf", 1000);
        packed.expanded = true;
        let a = vec![packed, file("x64/vehicles.rpf/adder.yft", 10)];

        let map = resolve_all(&[(0, &a)]);
        assert!(!map.winners.contains_key("vehicles.rpf"));
        assert!(map.winners.contains_key("adder.yft"));
    }

    #[test]
    fn test_scenario_two_sources() {
        // source A: one colliding file; source B: same path plus a directory
        let a = vec![file("data/handling.meta", 500)];
        let b = vec![file("data/handling.meta", 700), dir("models")];

        let map = resolve_all(&[(0, &a), (1, &b)]);

        assert_eq!(map.winners["data/handling.meta"].entry.size, 500);
        assert_eq!(map.file_conflict_count(), 1);
        assert!(map.winners.contains_key("models"));
        assert!(!map.conflicts.contains_key("models"));
    }
}
