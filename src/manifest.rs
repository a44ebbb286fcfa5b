//! Manifest synthesis for the merged pack
//!
//! Both package-level index documents are regenerated from the final file
//! set, never copied and edited from a source. Tag names and nesting are
//! fixed by the consuming runtime.

use chrono::Utc;

use crate::schema;
use crate::xml::Element;

/// Change-set group every generated change set is registered under
pub const STARTUP_GROUP: &str = "GROUP_STARTUP";

const DEFAULT_PACK_TYPE: &str = "EXTRACONTENT_COMPAT_PACK";
const DEFAULT_ORDER: &str = "20";
const DEFAULT_MINOR_ORDER: &str = "0";

pub fn device_name(pack_name: &str) -> String {
    format!("dlc_{}", pack_name)
}

/// Change-set name, derived deterministically from the pack name
pub fn change_set_name(pack_name: &str) -> String {
    format!("{}_AUTOGEN", pack_name.to_ascii_uppercase())
}

fn device_path(pack_name: &str, path: &str) -> String {
    format!("{}:/{}", device_name(pack_name), path.replace('\\', "/"))
}

/// Build the index document: one dataFiles item per final data file, one
/// RPF item per embedded sub-archive, and a single change set enabling all
/// of them
pub fn synthesize_content(pack_name: &str, data_files: &[String], containers: &[String]) -> Element {
    let mut files = data_files.to_vec();
    files.sort();
    files.dedup();
    let mut packs = containers.to_vec();
    packs.sort();
    packs.dedup();

    let mut root = Element::new("CDataFileMgr__ContentsOfDataFileXml");
    root.push(Element::new("disabledFiles"));
    root.push(Element::new("includedXmlFiles"));
    root.push(Element::new("includedDataFiles"));

    let mut data = Element::new("dataFiles");
    for path in &files {
        if let Some(file_type) = schema::data_file_type(crate::paths::file_name(path)) {
            data.push(data_file_item(&device_path(pack_name, path), file_type));
        }
    }
    for container in &packs {
        data.push(data_file_item(&device_path(pack_name, container), "RPF_FILE"));
    }
    root.push(data);

    let mut change_sets = Element::new("contentChangeSets");
    let mut set = Element::new("Item");
    set.push(Element::with_text("changeSetName", change_set_name(pack_name)));
    let mut enable = Element::new("filesToEnable");
    for path in &files {
        enable.push(Element::with_text("Item", device_path(pack_name, path)));
    }
    for container in &packs {
        enable.push(Element::with_text("Item", device_path(pack_name, container)));
    }
    set.push(enable);
    change_sets.push(set);
    root.push(change_sets);

    root.push(Element::new("patchFiles"));
    root
}

fn data_file_item(filename: &str, file_type: &str) -> Element {
    let mut item = Element::new("Item");
    item.push(Element::with_text("filename", filename));
    item.push(Element::with_text("fileType", file_type));
    item.push(Element::new("overlay").with_attr("value", "false"));
    item.push(Element::new("disabled").with_attr("value", "true"));
    item.push(Element::new("persistent").with_attr("value", "false"));
    item
}

/// Build the order document. Only the numeric load-order and pack-type
/// fields carry over from the first available source's order document;
/// everything else is regenerated for the new pack name.
pub fn synthesize_setup(pack_name: &str, source_setup: Option<&Element>) -> Element {
    let carried_text = |field: &str, default: &str| -> String {
        source_setup
            .and_then(|s| s.child_text(field))
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| default.to_string())
    };
    let carried_value = |field: &str, default: &str| -> String {
        source_setup
            .and_then(|s| s.child(field))
            .and_then(|e| e.attr("value"))
            .map(str::to_string)
            .unwrap_or_else(|| default.to_string())
    };

    let mut root = Element::new("SSetupData");
    root.push(Element::with_text("deviceName", device_name(pack_name)));
    root.push(Element::with_text("datFile", schema::CONTENT_MANIFEST));
    root.push(Element::with_text(
        "timeStamp",
        Utc::now().format("%d/%m/%Y %H:%M:%S").to_string(),
    ));
    root.push(Element::with_text("nameHash", pack_name));
    root.push(Element::new("contentChangeSets"));

    let mut groups = Element::new("contentChangeSetGroups");
    let mut group = Element::new("Item");
    group.push(Element::with_text("NameHash", STARTUP_GROUP));
    let mut sets = Element::new("ContentChangeSets");
    sets.push(Element::with_text("Item", change_set_name(pack_name)));
    group.push(sets);
    groups.push(group);
    root.push(groups);

    root.push(Element::with_text("type", carried_text("type", DEFAULT_PACK_TYPE)));
    root.push(Element::new("order").with_attr("value", carried_value("order", DEFAULT_ORDER)));
    root.push(
        Element::new("minorOrder")
            .with_attr("value", carried_value("minorOrder", DEFAULT_MINOR_ORDER)),
    );
    root
}
