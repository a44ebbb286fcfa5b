//! Source pack loading and entry flattening
//!
//! A source pack is opened once and its nested packs are expanded into one
//! flat entry list. Nested packs are extracted into a scratch buffer, opened
//! in memory, and the opened readers are cached by their full nested path so
//! later byte reads resolve without re-extraction.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::archive::{is_archive_name, PackReader};
use crate::error::MergeError;
use crate::paths;

/// Nested packs are expanded up to this depth; a pack at the cap is listed
/// as a leaf and its contents stay invisible
pub const DEFAULT_NESTED_DEPTH: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Directory,
}

/// One flattened entry. `path` carries the nested prefix; bytes are fetched
/// lazily through [`SourcePack::read`].
#[derive(Debug, Clone)]
pub struct Entry {
    pub path: String,
    pub kind: EntryKind,
    /// Nesting depth: 0 for entries of the source pack itself
    pub depth: usize,
    pub size: u64,
    /// Bare name of the innermost enclosing nested pack, if any
    pub container: Option<String>,
    /// True for nested-pack entries whose contents were flattened; their
    /// blobs are not carried into the merge
    pub expanded: bool,
}

impl Entry {
    pub fn file_name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }
}

/// An opened source pack with its flattened entry list
pub struct SourcePack {
    pub id: String,
    pub path: PathBuf,
    pub entries: Vec<Entry>,
    reader: PackReader,
    nested: HashMap<String, PackReader>,
}

impl SourcePack {
    pub fn open(path: &Path, max_depth: usize) -> Result<Self, MergeError> {
        let mut reader = PackReader::open(path)?;
        let mut nested = HashMap::new();
        let mut entries = Vec::new();
        flatten_into(&mut reader, "", 0, max_depth, &mut nested, &mut entries);

        let id = source_id_from_path(path);
        debug!(source = %id, entries = entries.len(), "flattened source pack");
        Ok(SourcePack {
            id,
            path: path.to_path_buf(),
            entries,
            reader,
            nested,
        })
    }

    /// Extract an entry's bytes, resolving through the nested-reader cache
    /// by longest matching pack prefix
    pub fn read(&mut self, entry_path: &str) -> std::io::Result<Vec<u8>> {
        let mut best: Option<String> = None;
        for key in self.nested.keys() {
            let is_prefix = entry_path.len() > key.len()
                && entry_path.starts_with(key.as_str())
                && entry_path.as_bytes()[key.len()] == b'/';
            if is_prefix && best.as_ref().map_or(true, |b| key.len() > b.len()) {
                best = Some(key.clone());
            }
        }

        match best {
            Some(key) => {
                let remainder = entry_path[key.len() + 1..].to_string();
                match self.nested.get_mut(&key) {
                    Some(inner) => inner.read(&remainder),
                    None => Err(std::io::Error::new(
                        std::io::ErrorKind::NotFound,
                        format!("nested pack {} not cached", key),
                    )),
                }
            }
            None => self.reader.read(entry_path),
        }
    }
}

fn flatten_into(
    reader: &mut PackReader,
    prefix: &str,
    depth: usize,
    max_depth: usize,
    nested: &mut HashMap<String, PackReader>,
    out: &mut Vec<Entry>,
) {
    let container = container_of(prefix);

    for raw in reader.raw_entries() {
        let name = raw.name.trim_end_matches('/').to_string();
        if name.is_empty() {
            continue;
        }
        let full = if prefix.is_empty() {
            name.clone()
        } else {
            format!("{}/{}", prefix, name)
        };
        let kind = if raw.is_dir {
            EntryKind::Directory
        } else {
            EntryKind::File
        };

        let mut entry = Entry {
            path: full.clone(),
            kind,
            depth,
            size: raw.size,
            container: container.clone(),
            expanded: false,
        };

        if kind == EntryKind::File && is_archive_name(entry.file_name()) && depth < max_depth {
            if nested.contains_key(&full) {
                debug!(pack = %full, "nested pack already expanded, reusing cached listing");
                entry.expanded = true;
                out.push(entry);
                continue;
            }
            if let Some(mut inner) = open_nested(reader, &name, &full) {
                entry.expanded = true;
                out.push(entry);
                flatten_into(&mut inner, &full, depth + 1, max_depth, nested, out);
                nested.insert(full, inner);
                continue;
            }
            // fell through: the entry stays listed as an opaque file
        }

        out.push(entry);
    }
}

/// Extract and open a nested pack. Any failure is logged and the entry is
/// kept opaque rather than aborting the run.
fn open_nested(reader: &mut PackReader, name: &str, full: &str) -> Option<PackReader> {
    let bytes = match reader.read(name) {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!(pack = %full, error = %e, "failed to extract nested pack");
            return None;
        }
    };
    match PackReader::from_bytes(bytes) {
        Ok(inner) => Some(inner),
        Err(e) => {
            warn!(pack = %full, error = %e, "nested pack unreadable, keeping as opaque file");
            None
        }
    }
}

fn container_of(prefix: &str) -> Option<String> {
    if prefix.is_empty() {
        None
    } else {
        Some(paths::bare_name(prefix))
    }
}

/// Derive a source identifier from the pack's file stem: lowercase, with
/// anything outside `[a-z0-9]` mapped to `_`
pub fn source_id_from_path(path: &Path) -> String {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("pack");
    let id: String = stem
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect();
    if id.is_empty() {
        "pack".to_string()
    } else {
        id
    }
}
