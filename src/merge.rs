//! Template-driven document merging
//!
//! Combines every source's copy of one document type into a single document
//! whose structure matches the type's registered schema. The output is
//! always assembled from the canonical skeleton, never by mutating an input
//! copy, and items are de-duplicated by identity key with the first
//! occurrence winning.

use std::collections::HashSet;

use tracing::{debug, warn};

use crate::error::MergeError;
use crate::schema::{self, ITEM_TAG};
use crate::xml::{ensure_declaration, Element};

#[derive(Debug)]
pub struct MergedDocument {
    pub bytes: Vec<u8>,
    pub duplicates_skipped: usize,
}

impl MergedDocument {
    /// Pass a single copy through, ensuring the standard declaration
    pub fn passthrough(bytes: Vec<u8>) -> Self {
        MergedDocument {
            bytes: ensure_declaration(bytes),
            duplicates_skipped: 0,
        }
    }
}

/// Merge all copies of one document type, in source-priority order.
///
/// A copy that fails to parse is skipped with a warning; if every copy
/// fails, the first raw blob is passed through unchanged. A type without a
/// registered schema keeps its highest-priority parseable copy. None of
/// these conditions abort the run.
pub fn merge_documents(
    doc_type: &str,
    copies: &[(String, Vec<u8>)],
) -> Result<MergedDocument, MergeError> {
    let first = copies.first().ok_or_else(|| MergeError::Parse {
        name: doc_type.to_string(),
        reason: "no copies to merge".to_string(),
    })?;

    if copies.len() == 1 {
        return Ok(MergedDocument::passthrough(first.1.clone()));
    }

    let mut parsed: Vec<(&str, Element)> = Vec::new();
    let mut first_parsed_raw: Option<&[u8]> = None;
    for (source, bytes) in copies {
        match Element::parse(bytes) {
            Ok(doc) => {
                if first_parsed_raw.is_none() {
                    first_parsed_raw = Some(bytes);
                }
                parsed.push((source.as_str(), doc));
            }
            Err(e) => warn!(
                source = %source,
                doc = %doc_type,
                error = %e,
                "skipping unparseable document copy"
            ),
        }
    }

    if parsed.is_empty() {
        warn!(doc = %doc_type, "all copies failed to parse, passing first through unchanged");
        return Ok(MergedDocument {
            bytes: first.1.clone(),
            duplicates_skipped: 0,
        });
    }

    let schema = match schema::schema_for(doc_type) {
        Some(schema) => schema,
        None => {
            warn!(doc = %doc_type, "no container schema registered, keeping highest-priority copy");
            let raw = first_parsed_raw.unwrap_or(&first.1);
            return Ok(MergedDocument::passthrough(raw.to_vec()));
        }
    };

    // the output document comes from the schema's canonical skeleton,
    // never from any input copy
    let mut output = schema::canonical_skeleton(schema);
    let mut duplicates = 0;

    for container in schema.containers {
        let mut seen: HashSet<String> = HashSet::new();
        let mut items: Vec<Element> = Vec::new();

        for (source, doc) in &parsed {
            let found = if doc.name.eq_ignore_ascii_case(container.name) {
                Some(doc)
            } else {
                doc.find(container.name)
            };
            let found = match found {
                Some(found) => found,
                None => {
                    debug!(source = %source, container = container.name, "container absent");
                    continue;
                }
            };

            for item in found.children_named(ITEM_TAG) {
                match schema::item_identity(item, container.key_field) {
                    Some(key) => {
                        if seen.contains(&key) {
                            duplicates += 1;
                            debug!(
                                source = %source,
                                container = container.name,
                                id = %key,
                                "skipping duplicate item"
                            );
                            continue;
                        }
                        seen.insert(key);
                        items.push(item.clone());
                    }
                    // items without a derivable key are carried as-is
                    None => items.push(item.clone()),
                }
            }
        }

        if let Some(target) = output.child_mut(container.name) {
            for item in items {
                target.push(item);
            }
        }
    }

    Ok(MergedDocument {
        bytes: output.to_bytes()?,
        duplicates_skipped: duplicates,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handling_doc(names: &[&str]) -> Vec<u8> {
        let items: String = names
            .iter()
            .map(|n| format!("<Item><handlingName>{n}</handlingName><fMass value=\"1500\"/></Item>"))
            .collect();
        format!("<CHandlingDataMgr><HandlingData>{items}</HandlingData></CHandlingDataMgr>")
            .into_bytes()
    }

    fn copy(source: &str, bytes: Vec<u8>) -> (String, Vec<u8>) {
        (source.to_string(), bytes)
    }

    #[test]
    fn test_single_copy_passthrough_gets_declaration() {
        let merged =
            merge_documents("handling.meta", &[copy("a", handling_doc(&["adder"]))]).unwrap();
        assert!(merged.bytes.starts_with(b"<?xml"));
        assert_eq!(merged.duplicates_skipped, 0);

        let doc = Element::parse(&merged.bytes).unwrap();
        assert_eq!(doc.name, "CHandlingDataMgr");
    }

    #[test]
    fn test_union_of_items_across_sources() {
        let merged = merge_documents(
            "handling.meta",
            &[
                copy("a", handling_doc(&["adder"])),
                copy("b", handling_doc(&["zentorno"])),
            ],
        )
        .unwrap();

        let doc = Element::parse(&merged.bytes).unwrap();
        let container = doc.child("HandlingData").unwrap();
        let names: Vec<String> = container
            .children_named("Item")
            .filter_map(|i| i.child_text("handlingName"))
            .collect();
        assert_eq!(names, vec!["adder", "zentorno"]);
    }

    #[test]
    fn test_duplicate_identity_first_occurrence_wins() {
        let a = "<CHandlingDataMgr><HandlingData>\
                 <Item><handlingName>adder</handlingName><fMass value=\"1500\"/></Item>\
                 </HandlingData></CHandlingDataMgr>";
        let b = "<CHandlingDataMgr><HandlingData>\
                 <Item><handlingName>ADDER</handlingName><fMass value=\"9999\"/></Item>\
                 </HandlingData></CHandlingDataMgr>";

        let merged = merge_documents(
            "handling.meta",
            &[copy("a", a.as_bytes().to_vec()), copy("b", b.as_bytes().to_vec())],
        )
        .unwrap();

        assert_eq!(merged.duplicates_skipped, 1);
        let doc = Element::parse(&merged.bytes).unwrap();
        let container = doc.child("HandlingData").unwrap();
        assert_eq!(container.children_named("Item").count(), 1);
        let item = container.child("Item").unwrap();
        assert_eq!(item.child("fMass").unwrap().attr("value"), Some("1500"));
    }

    #[test]
    fn test_output_built_from_skeleton_not_inputs() {
        // inputs carry extra root-level clutter that must not survive
        let a = "<CHandlingDataMgr><junk>x</junk><HandlingData>\
                 <Item><handlingName>adder</handlingName></Item>\
                 </HandlingData></CHandlingDataMgr>";
        let merged = merge_documents(
            "handling.meta",
            &[
                copy("a", a.as_bytes().to_vec()),
                copy("b", handling_doc(&["zentorno"])),
            ],
        )
        .unwrap();

        let doc = Element::parse(&merged.bytes).unwrap();
        assert!(doc.child("junk").is_none());
        assert!(doc.child("HandlingData").is_some());
    }

    #[test]
    fn test_container_found_as_nested_descendant() {
        // container buried one level down still contributes its items
        let a = "<CHandlingDataMgr><wrapper><HandlingData>\
                 <Item><handlingName>adder</handlingName></Item>\
                 </HandlingData></wrapper></CHandlingDataMgr>";
        let merged = merge_documents(
            "handling.meta",
            &[
                copy("a", a.as_bytes().to_vec()),
                copy("b", handling_doc(&["zentorno"])),
            ],
        )
        .unwrap();

        let doc = Element::parse(&merged.bytes).unwrap();
        let container = doc.child("HandlingData").unwrap();
        assert_eq!(container.children_named("Item").count(), 2);
    }

    #[test]
    fn test_multi_container_schema() {
        let a = "<CVehicleModelInfoVarGlobal>\
                 <Kits><Item><kitName>adder_kit</kitName></Item></Kits>\
                 <Lights><Item><id value=\"1\"/></Item></Lights>\
                 </CVehicleModelInfoVarGlobal>";
        let b = "<CVehicleModelInfoVarGlobal>\
                 <Kits><Item><kitName>zentorno_kit</kitName></Item></Kits>\
                 <Lights><Item><id value=\"1\"/></Item></Lights>\
                 </CVehicleModelInfoVarGlobal>";

        let merged = merge_documents(
            "carcols.meta",
            &[copy("a", a.as_bytes().to_vec()), copy("b", b.as_bytes().to_vec())],
        )
        .unwrap();

        let doc = Element::parse(&merged.bytes).unwrap();
        assert_eq!(doc.child("Kits").unwrap().children_named("Item").count(), 2);
        // duplicate light id dropped
        assert_eq!(doc.child("Lights").unwrap().children_named("Item").count(), 1);
        assert_eq!(merged.duplicates_skipped, 1);
    }

    #[test]
    fn test_unparseable_copy_skipped() {
        let merged = merge_documents(
            "handling.meta",
            &[
                copy("bad", b"<broken".to_vec()),
                copy("good", handling_doc(&["adder"])),
            ],
        )
        .unwrap();

        let doc = Element::parse(&merged.bytes).unwrap();
        let container = doc.child("HandlingData").unwrap();
        assert_eq!(container.children_named("Item").count(), 1);
    }

    #[test]
    fn test_all_copies_unparseable_falls_back_to_first_raw() {
        let merged = merge_documents(
            "handling.meta",
            &[copy("a", b"<broken".to_vec()), copy("b", b"also broken".to_vec())],
        )
        .unwrap();
        assert_eq!(merged.bytes, b"<broken");
    }

    #[test]
    fn test_unregistered_type_keeps_first_parseable_copy() {
        let a = b"<CExplosionInfoManager><x/></CExplosionInfoManager>".to_vec();
        let merged = merge_documents(
            "explosion.meta",
            &[copy("bad", b"<broken".to_vec()), copy("a", a.clone())],
        )
        .unwrap();
        assert!(merged.bytes.ends_with(&a[..]));
    }
}
