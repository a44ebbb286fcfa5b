//! Dependency analysis over the primary entity document
//!
//! Every source's copy of the vehicle definition document is scanned, even
//! though only one canonical copy survives the merge, so that entities
//! contributed by every source gate the inclusion of secondary documents.

use std::collections::HashSet;

use tracing::{debug, warn};

use crate::archive::is_archive_name;
use crate::schema::{
    self, CONTENT_MANIFEST, EXPLOSION_DEFAULT, ITEM_TAG, PRIMARY_DOCUMENT, SETUP_MANIFEST,
    WEAPON_LAYOUT_MARKER,
};
use crate::xml::Element;

#[derive(Debug, Default)]
pub struct DependencySet {
    /// Model and texture-group names contributed by any source
    pub entity_names: HashSet<String>,
    pub needs_weapon_data: bool,
    pub needs_custom_explosion: bool,
    /// Documents explicitly registered as required during analysis
    required_files: HashSet<String>,
    include_everything: bool,
}

impl DependencySet {
    /// Merge-all mode: the predicate passes unconditionally
    pub fn everything() -> Self {
        DependencySet {
            include_everything: true,
            ..DependencySet::default()
        }
    }

    /// Analyze all sources' copies of the primary document. Copies that fail
    /// to parse are skipped with a warning; they never abort the run.
    pub fn analyze(copies: &[(String, Vec<u8>)]) -> Self {
        let mut deps = DependencySet::default();
        for (source, bytes) in copies {
            match Element::parse(bytes) {
                Ok(doc) => deps.scan_document(source, &doc),
                Err(e) => warn!(
                    source = %source,
                    error = %e,
                    "unparseable vehicle definition document, skipping its contribution"
                ),
            }
        }
        deps
    }

    fn scan_document(&mut self, source: &str, doc: &Element) {
        let init = match doc.find("InitDatas") {
            Some(init) => init,
            None => {
                warn!(source = %source, "vehicle definition document has no InitDatas container");
                return;
            }
        };

        for item in init.children_named(ITEM_TAG) {
            for field in ["modelName", "txdName"] {
                if let Some(name) = item.child_text(field) {
                    if !name.is_empty() {
                        self.entity_names.insert(name.to_ascii_lowercase());
                    }
                }
            }

            if let Some(layout) = item.child_text("layout") {
                if layout.to_ascii_lowercase().contains(WEAPON_LAYOUT_MARKER) {
                    self.needs_weapon_data = true;
                    self.require_file("weaponarchetypes.meta");
                }
            }

            if let Some(explosion) = item.child_text("explosionInfo") {
                if !explosion.is_empty() && explosion.to_ascii_lowercase() != EXPLOSION_DEFAULT {
                    self.needs_custom_explosion = true;
                    self.require_file("explosion.meta");
                }
            }
        }

        debug!(
            source = %source,
            entities = self.entity_names.len(),
            weapon = self.needs_weapon_data,
            explosion = self.needs_custom_explosion,
            "scanned vehicle definitions"
        );
    }

    /// Register a document as required regardless of its conditional flag
    pub fn require_file(&mut self, name: &str) {
        self.required_files.insert(name.to_ascii_lowercase());
    }

    /// The selective-inclusion predicate. Governs which file entries survive
    /// into the merge map and which documents enter the merge collection.
    pub fn should_include(&self, canonical_path: &str, file_name: &str) -> bool {
        if self.include_everything {
            return true;
        }
        let name = file_name.to_ascii_lowercase();

        if name == PRIMARY_DOCUMENT || name == CONTENT_MANIFEST || name == SETUP_MANIFEST {
            return true;
        }
        // per-source text registrations always ship with their pack
        if schema::is_per_source_unique(&name) {
            return true;
        }
        if let Some(doc_type) = schema::document_type(&name) {
            if schema::ALWAYS_ESSENTIAL.contains(&doc_type) {
                return true;
            }
            if schema::CONDITIONALLY_SKIPPABLE.contains(&doc_type) {
                return self.conditional_included(&name, doc_type);
            }
            return true;
        }
        if schema::is_core_asset(&name) || is_archive_name(&name) {
            return true;
        }

        debug!(path = %canonical_path, "not required by any merged entity");
        false
    }

    fn conditional_included(&self, name: &str, doc_type: &str) -> bool {
        let flag = match doc_type {
            "weaponarchetypes.meta" => self.needs_weapon_data,
            "explosion.meta" => self.needs_custom_explosion,
            _ => false,
        };
        flag
            || self.required_files.contains(name)
            || self.required_files.contains(doc_type)
            || self.names_entity(name)
    }

    /// True when a file's base name references a merged entity
    pub fn names_entity(&self, file_name: &str) -> bool {
        let stem = file_name
            .rsplit_once('.')
            .map(|(stem, _)| stem)
            .unwrap_or(file_name)
            .to_ascii_lowercase();
        self.entity_names.iter().any(|n| stem.contains(n.as_str()))
    }
}
