//! Document-type schemas and fixed name lookups
//!
//! Every mergeable document type is described by a static schema: the
//! canonical root tag plus the ordered containers under it and the field
//! used as each container's identity key. The registry is the single place
//! that knows document shapes; the merger resolves a schema once per type
//! and never inspects documents structurally beyond it.

use crate::xml::Element;

/// The primary entity definition document; drives dependency analysis
pub const PRIMARY_DOCUMENT: &str = "vehicles.meta";

/// Package index document, synthesized fresh for the merged pack
pub const CONTENT_MANIFEST: &str = "content.xml";

/// Package order document, synthesized fresh for the merged pack
pub const SETUP_MANIFEST: &str = "setup2.xml";

/// Repeated-entry tag used by every container
pub const ITEM_TAG: &str = "Item";

/// Sentinel meaning "no explosion override" (compared lowercased)
pub const EXPLOSION_DEFAULT: &str = "explosion_info_default";

/// Marker inside a layout string that pulls in the weapon subsystem
pub const WEAPON_LAYOUT_MARKER: &str = "weapon";

/// A container under a document root holding repeated `Item` children
pub struct ContainerSpec {
    pub name: &'static str,
    /// Child field whose text (or `value` attribute) identifies an item
    pub key_field: &'static str,
}

pub struct DocumentSchema {
    /// Canonical file name for the type
    pub doc_type: &'static str,
    pub root: &'static str,
    pub containers: &'static [ContainerSpec],
}

pub static SCHEMAS: &[DocumentSchema] = &[
    DocumentSchema {
        doc_type: "vehicles.meta",
        root: "CVehicleModelInfo__InitDataList",
        containers: &[
            ContainerSpec {
                name: "InitDatas",
                key_field: "modelName",
            },
            ContainerSpec {
                name: "txdRelationships",
                key_field: "parent",
            },
        ],
    },
    DocumentSchema {
        doc_type: "handling.meta",
        root: "CHandlingDataMgr",
        containers: &[ContainerSpec {
            name: "HandlingData",
            key_field: "handlingName",
        }],
    },
    DocumentSchema {
        doc_type: "carcols.meta",
        root: "CVehicleModelInfoVarGlobal",
        containers: &[
            ContainerSpec {
                name: "Kits",
                key_field: "kitName",
            },
            ContainerSpec {
                name: "Lights",
                key_field: "id",
            },
        ],
    },
    DocumentSchema {
        doc_type: "carvariations.meta",
        root: "CVehicleModelInfoVariation",
        containers: &[ContainerSpec {
            name: "variationData",
            key_field: "modelName",
        }],
    },
    DocumentSchema {
        doc_type: "vehiclelayouts.meta",
        root: "CVehicleMetadataMgr",
        containers: &[
            ContainerSpec {
                name: "VehicleLayoutInfos",
                key_field: "Name",
            },
            ContainerSpec {
                name: "VehicleEntryPointInfos",
                key_field: "Name",
            },
            ContainerSpec {
                name: "VehicleEntryPointAnimInfos",
                key_field: "Name",
            },
            ContainerSpec {
                name: "VehicleSeatInfos",
                key_field: "Name",
            },
            ContainerSpec {
                name: "VehicleSeatAnimInfos",
                key_field: "Name",
            },
        ],
    },
    DocumentSchema {
        doc_type: "weaponarchetypes.meta",
        root: "CWeaponModelInfo__InitDataList",
        containers: &[ContainerSpec {
            name: "InitDatas",
            key_field: "modelName",
        }],
    },
];

/// Merged regardless of what the dependency analysis found
pub const ALWAYS_ESSENTIAL: &[&str] = &[
    "handling.meta",
    "carcols.meta",
    "carvariations.meta",
    "vehiclelayouts.meta",
];

/// Included only when a conditional flag is set, the file was registered as
/// required, or its name references a merged entity
pub const CONDITIONALLY_SKIPPABLE: &[&str] = &["weaponarchetypes.meta", "explosion.meta"];

pub fn schema_for(doc_type: &str) -> Option<&'static DocumentSchema> {
    SCHEMAS
        .iter()
        .find(|s| s.doc_type.eq_ignore_ascii_case(doc_type))
}

/// Resolve a file name to its canonical document type.
///
/// Differently-named variants of one subtype collapse to a single type
/// (`vehiclelayouts_adder.meta` merges into `vehiclelayouts.meta`); the
/// conditionally-skippable types accept the same suffixed variants.
/// Per-source-unique documents are deliberately not document types: they
/// never enter the union-merge path.
pub fn document_type(file_name: &str) -> Option<&'static str> {
    let lower = file_name.to_ascii_lowercase();
    if is_per_source_unique(&lower) {
        return None;
    }
    for schema in SCHEMAS {
        if lower == schema.doc_type {
            return Some(schema.doc_type);
        }
    }
    if !lower.ends_with(".meta") {
        return None;
    }
    if lower.starts_with("vehiclelayouts") {
        return Some("vehiclelayouts.meta");
    }
    if lower.starts_with("weaponarchetypes") {
        return Some("weaponarchetypes.meta");
    }
    if lower.starts_with("explosion") {
        // recognized but carries no container schema; the merger falls back
        // to the highest-priority parseable copy
        return Some("explosion.meta");
    }
    None
}

/// Text-registration documents are kept one-per-source under a
/// disambiguated name instead of being merged
pub fn is_per_source_unique(file_name: &str) -> bool {
    let lower = file_name.to_ascii_lowercase();
    lower.starts_with("dlctext") && lower.ends_with(".meta")
}

/// Suffix classification of the core binary asset kinds
pub fn is_core_asset(file_name: &str) -> bool {
    const ASSET_EXTENSIONS: &[&str] = &["yft", "ytd", "ydd", "ydr", "ycd"];
    match file_name.rsplit_once('.') {
        Some((_, ext)) => ASSET_EXTENSIONS.iter().any(|e| ext.eq_ignore_ascii_case(e)),
        None => false,
    }
}

/// `fileType` tag for the index document, by file name. Wire values are
/// fixed by the consuming runtime.
pub fn data_file_type(file_name: &str) -> Option<&'static str> {
    let lower = file_name.to_ascii_lowercase();
    if is_per_source_unique(&lower) {
        return Some("TEXTFILE_METAFILE");
    }
    match document_type(&lower)? {
        "vehicles.meta" => Some("VEHICLE_METADATA_FILE"),
        "handling.meta" => Some("HANDLING_FILE"),
        "carcols.meta" => Some("CARCOLS_FILE"),
        "carvariations.meta" => Some("VEHICLE_VARIATION_FILE"),
        "vehiclelayouts.meta" => Some("VEHICLE_LAYOUTS_FILE"),
        "weaponarchetypes.meta" => Some("WEAPONINFO_FILE"),
        "explosion.meta" => Some("EXPLOSION_INFO_FILE"),
        _ => None,
    }
}

/// Build the fresh output document for a schema: canonical root with its
/// containers, empty and in schema order
pub fn canonical_skeleton(schema: &DocumentSchema) -> Element {
    let mut root = Element::new(schema.root);
    for container in schema.containers {
        root.push(Element::new(container.name));
    }
    root
}

/// Identity key of an item within a container: the key child's text, or its
/// `value` attribute for attribute-carried fields. Lowercased so keys match
/// the way the runtime resolves names.
pub fn item_identity(item: &Element, key_field: &str) -> Option<String> {
    let child = item.child(key_field)?;
    let text = child.text();
    if !text.is_empty() {
        return Some(text.to_ascii_lowercase());
    }
    child.attr("value").map(|v| v.to_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_type_canonical_names() {
        assert_eq!(document_type("vehicles.meta"), Some("vehicles.meta"));
        assert_eq!(document_type("HANDLING.META"), Some("handling.meta"));
        assert_eq!(document_type("carcols.meta"), Some("carcols.meta"));
        assert_eq!(document_type("readme.txt"), None);
        assert_eq!(document_type("adder.yft"), None);
    }

    #[test]
    fn test_document_type_variant_normalization() {
        assert_eq!(
            document_type("vehiclelayouts_adder.meta"),
            Some("vehiclelayouts.meta")
        );
        assert_eq!(
            document_type("weaponarchetypes_zentorno.meta"),
            Some("weaponarchetypes.meta")
        );
        assert_eq!(document_type("explosion_adder.meta"), Some("explosion.meta"));
    }

    #[test]
    fn test_per_source_unique_excluded_from_types() {
        assert!(is_per_source_unique("dlctext.meta"));
        assert!(is_per_source_unique("dlctext_sports.meta"));
        assert!(!is_per_source_unique("handling.meta"));
        assert_eq!(document_type("dlctext.meta"), None);
    }

    #[test]
    fn test_schema_lookup() {
        let schema = schema_for("vehicles.meta").unwrap();
        assert_eq!(schema.root, "CVehicleModelInfo__InitDataList");
        assert_eq!(schema.containers[0].name, "InitDatas");
        assert!(schema_for("explosion.meta").is_none());
    }

    #[test]
    fn test_canonical_skeleton_orders_containers() {
        let schema = schema_for("carcols.meta").unwrap();
        let skeleton = canonical_skeleton(schema);
        assert_eq!(skeleton.name, "CVehicleModelInfoVarGlobal");
        let names: Vec<&str> = skeleton.elements().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["Kits", "Lights"]);
    }

    #[test]
    fn test_item_identity_from_text_and_attr() {
        let item = Element::parse(b"<Item><modelName>Adder</modelName></Item>").unwrap();
        assert_eq!(item_identity(&item, "modelName").as_deref(), Some("adder"));

        let light = Element::parse(b"<Item><id value=\"7\"/></Item>").unwrap();
        assert_eq!(item_identity(&light, "id").as_deref(), Some("7"));

        let missing = Element::parse(b"<Item><other>x</other></Item>").unwrap();
        assert_eq!(item_identity(&missing, "modelName"), None);
    }

    #[test]
    fn test_data_file_type_lookup() {
        assert_eq!(data_file_type("handling.meta"), Some("HANDLING_FILE"));
        assert_eq!(data_file_type("vehicles.meta"), Some("VEHICLE_METADATA_FILE"));
        assert_eq!(
            data_file_type("vehiclelayouts_adder.meta"),
            Some("VEHICLE_LAYOUTS_FILE")
        );
        assert_eq!(data_file_type("dlctext_sports.meta"), Some("TEXTFILE_METAFILE"));
        assert_eq!(data_file_type("adder.yft"), None);
    }

    #[test]
    fn test_is_core_asset() {
        assert!(is_core_asset("adder.yft"));
        assert!(is_core_asset("adder_hi.YFT"));
        assert!(is_core_asset("adder.ytd"));
        assert!(!is_core_asset("handling.meta"));
        assert!(!is_core_asset("adder"));
    }
}
