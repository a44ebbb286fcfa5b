//! The merge run
//!
//! A [`MergeSession`] owns every piece of run-scoped state: the opened
//! source packs (with their nested-reader caches), the options, and the
//! accumulated statistics. Everything is built in source-list order by a
//! single logical pass; there is no state shared across runs.

use std::collections::BTreeMap;
use std::path::Path;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::analyze::DependencySet;
use crate::archive::{is_archive_name, PackWriter};
use crate::error::MergeError;
use crate::loader::{EntryKind, SourcePack, DEFAULT_NESTED_DEPTH};
use crate::manifest;
use crate::merge::{self, MergedDocument};
use crate::paths;
use crate::resolve::{self, MergeMap};
use crate::schema::{self, CONTENT_MANIFEST, PRIMARY_DOCUMENT, SETUP_MANIFEST};
use crate::xml::Element;

#[derive(Debug, Clone)]
pub struct MergeOptions {
    /// Name of the merged pack; drives device and change-set naming
    pub pack_name: String,
    /// Nested-pack expansion cap; 0 treats nested packs as opaque files
    pub max_depth: usize,
    /// Bypass the dependency predicate and include everything
    pub merge_all: bool,
    /// Run the full merge but skip writing the output pack
    pub dry_run: bool,
    /// Allow overwriting an existing output pack
    pub force: bool,
    /// Print each source's flattened entry tree
    pub show_structure: bool,
}

impl Default for MergeOptions {
    fn default() -> Self {
        MergeOptions {
            pack_name: "merged".to_string(),
            max_depth: DEFAULT_NESTED_DEPTH,
            merge_all: false,
            dry_run: false,
            force: false,
            show_structure: false,
        }
    }
}

#[derive(Debug, Default, Serialize)]
pub struct MergeStats {
    pub sources: usize,
    pub entries: usize,
    pub file_conflicts: usize,
    pub documents_merged: usize,
    pub duplicate_items_skipped: usize,
    pub files_written: usize,
}

/// One file/file collision, reported by source identity
#[derive(Debug, Serialize)]
pub struct ConflictRecord {
    pub path: String,
    pub winner: String,
    pub losers: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct MergeOutcome {
    pub stats: MergeStats,
    pub conflicts: Vec<ConflictRecord>,
}

/// A recognized document to merge: every copy across sources and paths,
/// in source-priority order
struct DocumentGroup {
    doc_type: &'static str,
    output_path: String,
    /// (source index, entry path within that source)
    copies: Vec<(usize, String)>,
}

/// What lands at one output path
enum PlannedFile {
    /// Extracted lazily from a source at write time
    Copy { source: usize, entry_path: String },
    /// Already-assembled bytes (merged documents, manifests)
    Bytes(Vec<u8>),
}

pub struct MergeSession {
    options: MergeOptions,
    sources: Vec<SourcePack>,
}

impl MergeSession {
    pub fn new(options: MergeOptions) -> Self {
        MergeSession {
            options,
            sources: Vec::new(),
        }
    }

    /// Open a source pack. Unreadable packs are logged and skipped; the
    /// two-source minimum is enforced when the run starts.
    pub fn add_source(&mut self, path: &Path) {
        match SourcePack::open(path, self.options.max_depth) {
            Ok(pack) => {
                info!(
                    source = %pack.id,
                    path = %path.display(),
                    entries = pack.entries.len(),
                    "loaded source pack"
                );
                self.sources.push(pack);
            }
            Err(e) => warn!(path = %path.display(), error = %e, "skipping unreadable source pack"),
        }
    }

    pub fn source_count(&self) -> usize {
        self.sources.len()
    }

    pub fn run(&mut self, output: &Path) -> Result<MergeOutcome, MergeError> {
        // fail fast, before any extraction or writing
        if output.exists() && !self.options.force && !self.options.dry_run {
            return Err(MergeError::OutputExists(output.to_path_buf()));
        }
        if self.sources.len() < 2 {
            return Err(MergeError::InsufficientSources(self.sources.len()));
        }

        let deps = self.analyze_dependencies();
        if self.options.show_structure {
            self.print_structure();
        }

        let map = self.build_merge_map(&deps);

        let mut stats = MergeStats {
            sources: self.sources.len(),
            entries: self.sources.iter().map(|s| s.entries.len()).sum(),
            file_conflicts: map.file_conflict_count(),
            ..MergeStats::default()
        };

        let mut planned: BTreeMap<String, PlannedFile> = BTreeMap::new();
        let mut directories: Vec<String> = Vec::new();
        // container name -> (inner path, source, entry path)
        let mut containers: BTreeMap<String, Vec<(String, usize, String)>> = BTreeMap::new();
        let mut manifest_containers: Vec<String> = Vec::new();

        for (canonical, placed) in &map.winners {
            if placed.entry.kind == EntryKind::Directory {
                directories.push(canonical.clone());
                continue;
            }
            let name = paths::file_name(canonical);
            if name == CONTENT_MANIFEST || name == SETUP_MANIFEST {
                // replaced by the synthesized manifests
                continue;
            }
            if schema::is_per_source_unique(name) || schema::document_type(name).is_some() {
                // handled through the document paths below
                continue;
            }
            if let Some(container) = &placed.entry.container {
                containers.entry(container.clone()).or_default().push((
                    canonical.clone(),
                    placed.source,
                    placed.entry.path.clone(),
                ));
                continue;
            }
            if is_archive_name(name) {
                // unexpanded nested pack carried as an opaque sub-archive
                manifest_containers.push(canonical.clone());
            }
            planned.insert(
                canonical.clone(),
                PlannedFile::Copy {
                    source: placed.source,
                    entry_path: placed.entry.path.clone(),
                },
            );
        }
        manifest_containers.extend(containers.keys().cloned());

        // merge recognized documents, winner plus conflicting copies
        for group in self.collect_document_groups(&map) {
            let copies = self.read_copies(&group.copies);
            if copies.is_empty() {
                warn!(doc = group.doc_type, "no readable copies, dropping document");
                continue;
            }
            let merged = match merge::merge_documents(group.doc_type, &copies) {
                Ok(merged) => merged,
                Err(e) => {
                    warn!(
                        doc = group.doc_type,
                        error = %e,
                        "document merge failed, keeping highest-priority copy"
                    );
                    MergedDocument::passthrough(copies[0].1.clone())
                }
            };
            stats.documents_merged += 1;
            stats.duplicate_items_skipped += merged.duplicates_skipped;
            if !self.options.merge_all {
                self.check_reference_integrity(group.doc_type, &merged.bytes, &deps);
            }
            planned.insert(group.output_path, PlannedFile::Bytes(merged.bytes));
        }

        // per-source-unique text registrations, disambiguated by source id
        for (output_path, source, entry_path) in self.collect_per_source_unique(&map) {
            planned.insert(output_path, PlannedFile::Copy { source, entry_path });
        }

        // index documents are synthesized from the final file set
        let data_files: Vec<String> = planned
            .keys()
            .filter(|path| schema::data_file_type(paths::file_name(path)).is_some())
            .cloned()
            .collect();
        let content = manifest::synthesize_content(
            &self.options.pack_name,
            &data_files,
            &manifest_containers,
        );
        planned.insert(
            CONTENT_MANIFEST.to_string(),
            PlannedFile::Bytes(content.to_bytes()?),
        );
        let source_setup = self.first_source_setup();
        let setup = manifest::synthesize_setup(&self.options.pack_name, source_setup.as_ref());
        planned.insert(
            SETUP_MANIFEST.to_string(),
            PlannedFile::Bytes(setup.to_bytes()?),
        );

        let conflicts = self.conflict_records(&map);

        if self.options.dry_run {
            info!("dry run, skipping output pack");
            stats.files_written = 0;
        } else {
            stats.files_written = self.write_output(output, &directories, planned, containers)?;
            info!(output = %output.display(), files = stats.files_written, "wrote merged pack");
        }

        Ok(MergeOutcome { stats, conflicts })
    }

    /// Collect every source's copy of the primary document and derive the
    /// dependency set from all of them
    fn analyze_dependencies(&mut self) -> DependencySet {
        if self.options.merge_all {
            info!("merge-all mode, dependency analysis bypassed");
            return DependencySet::everything();
        }

        let mut copies: Vec<(String, Vec<u8>)> = Vec::new();
        for index in 0..self.sources.len() {
            let entry_paths: Vec<String> = self.sources[index]
                .entries
                .iter()
                .filter(|e| {
                    e.kind == EntryKind::File
                        && paths::file_name(&paths::normalize(&e.path)) == PRIMARY_DOCUMENT
                })
                .map(|e| e.path.clone())
                .collect();
            for entry_path in entry_paths {
                let id = self.sources[index].id.clone();
                match self.sources[index].read(&entry_path) {
                    Ok(bytes) => copies.push((id, bytes)),
                    Err(e) => warn!(
                        source = %id,
                        path = %entry_path,
                        error = %e,
                        "failed to extract vehicle definitions"
                    ),
                }
            }
        }
        DependencySet::analyze(&copies)
    }

    fn build_merge_map(&self, deps: &DependencySet) -> MergeMap {
        let slices: Vec<(usize, &[crate::loader::Entry])> = self
            .sources
            .iter()
            .enumerate()
            .map(|(index, pack)| (index, pack.entries.as_slice()))
            .collect();
        resolve::resolve(&slices, |_, canonical| {
            deps.should_include(canonical, paths::file_name(canonical))
        })
    }

    /// Group recognized documents by type: the winner plus its conflicting
    /// copies, across every canonical path the type appears at, sorted into
    /// source-priority order
    fn collect_document_groups(&self, map: &MergeMap) -> Vec<DocumentGroup> {
        let mut groups: BTreeMap<&'static str, DocumentGroup> = BTreeMap::new();

        for (canonical, placed) in &map.winners {
            if placed.entry.kind != EntryKind::File {
                continue;
            }
            let name = paths::file_name(canonical);
            let Some(doc_type) = schema::document_type(name) else {
                continue;
            };

            let group = groups.entry(doc_type).or_insert_with(|| DocumentGroup {
                doc_type,
                // variants collapse onto the canonical name at the first
                // path's directory
                output_path: join_path(paths::parent(canonical), doc_type),
                copies: Vec::new(),
            });
            group.copies.push((placed.source, placed.entry.path.clone()));
            if let Some(conflicting) = map.conflicts.get(canonical) {
                for loser in conflicting {
                    group.copies.push((loser.source, loser.entry.path.clone()));
                }
            }
        }

        let mut groups: Vec<DocumentGroup> = groups.into_values().collect();
        for group in &mut groups {
            group.copies.sort_by_key(|(source, _)| *source);
        }
        groups
    }

    /// Text registration documents: one per source, renamed with the source
    /// id. Identical derived names would collide; that gap is documented,
    /// not resolved.
    fn collect_per_source_unique(&self, map: &MergeMap) -> Vec<(String, usize, String)> {
        let mut out = Vec::new();
        for (canonical, placed) in &map.winners {
            let name = paths::file_name(canonical);
            if placed.entry.kind != EntryKind::File || !schema::is_per_source_unique(name) {
                continue;
            }
            let mut copies = vec![(placed.source, placed.entry.path.clone())];
            if let Some(conflicting) = map.conflicts.get(canonical) {
                for loser in conflicting {
                    copies.push((loser.source, loser.entry.path.clone()));
                }
            }
            let stem = name.rsplit_once('.').map(|(s, _)| s).unwrap_or(name);
            let parent = paths::parent(canonical);
            for (source, entry_path) in copies {
                let renamed = format!("{}_{}.meta", stem, self.sources[source].id);
                out.push((join_path(parent, &renamed), source, entry_path));
            }
        }
        out
    }

    fn read_copies(&mut self, copies: &[(usize, String)]) -> Vec<(String, Vec<u8>)> {
        let mut out = Vec::new();
        for (source, entry_path) in copies {
            let id = self.sources[*source].id.clone();
            match self.sources[*source].read(entry_path) {
                Ok(bytes) => out.push((id, bytes)),
                Err(e) => warn!(
                    source = %id,
                    path = %entry_path,
                    error = %e,
                    "failed to extract document copy"
                ),
            }
        }
        out
    }

    fn first_source_setup(&mut self) -> Option<Element> {
        for index in 0..self.sources.len() {
            let entry_paths: Vec<String> = self.sources[index]
                .entries
                .iter()
                .filter(|e| {
                    e.kind == EntryKind::File
                        && paths::file_name(&paths::normalize(&e.path)) == SETUP_MANIFEST
                })
                .map(|e| e.path.clone())
                .collect();
            for entry_path in entry_paths {
                let id = self.sources[index].id.clone();
                match self.sources[index].read(&entry_path) {
                    Ok(bytes) => match Element::parse(&bytes) {
                        Ok(doc) => return Some(doc),
                        Err(e) => warn!(source = %id, error = %e, "unparseable order document"),
                    },
                    Err(e) => warn!(source = %id, error = %e, "failed to extract order document"),
                }
            }
        }
        None
    }

    /// Warn when a merged secondary document names an entity absent from the
    /// vehicle definitions. Logged only, never corrected or fatal.
    fn check_reference_integrity(&self, doc_type: &str, bytes: &[u8], deps: &DependencySet) {
        let (container, key_field) = match doc_type {
            "carvariations.meta" => ("variationData", "modelName"),
            "handling.meta" => ("HandlingData", "handlingName"),
            _ => return,
        };
        if deps.entity_names.is_empty() {
            return;
        }
        let doc = match Element::parse(bytes) {
            Ok(doc) => doc,
            Err(_) => return,
        };
        let Some(container) = doc.find(container) else {
            return;
        };
        for item in container.children_named(schema::ITEM_TAG) {
            if let Some(name) = schema::item_identity(item, key_field) {
                if !deps.entity_names.contains(&name) {
                    warn!(
                        doc = doc_type,
                        entity = %name,
                        "references an entity absent from the vehicle definitions"
                    );
                }
            }
        }
    }

    fn conflict_records(&self, map: &MergeMap) -> Vec<ConflictRecord> {
        map.conflicts
            .iter()
            .map(|(path, losers)| ConflictRecord {
                path: path.clone(),
                winner: map
                    .winners
                    .get(path)
                    .map(|w| self.sources[w.source].id.clone())
                    .unwrap_or_default(),
                losers: losers
                    .iter()
                    .map(|l| self.sources[l.source].id.clone())
                    .collect(),
            })
            .collect()
    }

    fn write_output(
        &mut self,
        output: &Path,
        directories: &[String],
        planned: BTreeMap<String, PlannedFile>,
        containers: BTreeMap<String, Vec<(String, usize, String)>>,
    ) -> Result<usize, MergeError> {
        let mut writer = PackWriter::create(output)?;
        let mut written = 0;

        for dir in directories {
            writer.add_directory(dir)?;
        }

        for (path, plan) in planned {
            match plan {
                PlannedFile::Bytes(bytes) => {
                    writer.add_file(&path, &bytes)?;
                    written += 1;
                }
                PlannedFile::Copy { source, entry_path } => {
                    match self.sources[source].read(&entry_path) {
                        Ok(bytes) => {
                            writer.add_file(&path, &bytes)?;
                            written += 1;
                        }
                        // a corrupt entry is omitted, never fatal
                        Err(e) => warn!(
                            source = %self.sources[source].id,
                            path = %entry_path,
                            error = %e,
                            "failed to extract entry, omitting from output"
                        ),
                    }
                }
            }
        }

        // re-pack containered assets into embedded sub-archives
        for (container, members) in containers {
            let mut inner = PackWriter::memory();
            let mut any = false;
            for (inner_path, source, entry_path) in members {
                match self.sources[source].read(&entry_path) {
                    Ok(bytes) => {
                        inner.add_file(&inner_path, &bytes)?;
                        any = true;
                    }
                    Err(e) => warn!(
                        source = %self.sources[source].id,
                        path = %entry_path,
                        error = %e,
                        "failed to extract entry, omitting from output"
                    ),
                }
            }
            if any {
                writer.add_file(&container, &inner.into_bytes()?)?;
                written += 1;
            } else {
                debug!(container = %container, "no readable members, dropping sub-archive");
            }
        }

        writer.finish()?;
        Ok(written)
    }

    fn print_structure(&self) {
        for pack in &self.sources {
            println!("{} ({})", pack.id, pack.path.display());
            for entry in &pack.entries {
                let marker = match entry.kind {
                    EntryKind::Directory => "/",
                    EntryKind::File => "",
                };
                println!("{}{}{}", "  ".repeat(entry.depth + 1), entry.path, marker);
            }
        }
    }
}

fn join_path(parent: &str, name: &str) -> String {
    if parent.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", parent, name)
    }
}
