//! Canonical path normalization
//!
//! Maps a source-specific entry path to the merge key used by the conflict
//! resolver. The same logical asset nested under different pack names in
//! different sources must normalize to the same key, so archive-container
//! segments are discarded and a small set of fixed prefixes collapse away.

use crate::archive::is_archive_name;

/// Well-known intermediate directories that differ between packs without
/// changing the logical location
const PREFIX_REWRITES: &[(&str, &str)] = &[("x64/", ""), ("update/", "")];

/// Normalize an entry path into its canonical merge key.
///
/// Total and deterministic: never fails, and the result depends only on the
/// input path. Segments are split on either separator, archive-container
/// names are dropped, everything is lowercased (the consuming runtime treats
/// paths case-insensitively), and the fixed prefix rewrites are applied.
/// A path that is empty after normalization falls back to its bare name.
pub fn normalize(path: &str) -> String {
    let segments: Vec<String> = path
        .split(['/', '\\'])
        .filter(|s| !s.is_empty())
        .filter(|s| !is_archive_name(s))
        .map(|s| s.to_ascii_lowercase())
        .collect();

    let mut key = segments.join("/");
    for (from, to) in PREFIX_REWRITES {
        if let Some(rest) = key.strip_prefix(from) {
            key = format!("{}{}", to, rest);
            break;
        }
    }

    if key.is_empty() {
        bare_name(path)
    } else {
        key
    }
}

/// Last non-empty segment of a raw path, lowercased
pub fn bare_name(path: &str) -> String {
    path.rsplit(['/', '\\'])
        .find(|s| !s.is_empty())
        .unwrap_or("")
        .to_ascii_lowercase()
}

/// File-name component of an already-canonical path
pub fn file_name(canonical: &str) -> &str {
    canonical.rsplit('/').next().unwrap_or(canonical)
}

/// Directory component of an already-canonical path, without a trailing
/// separator; empty for top-level entries
pub fn parent(canonical: &str) -> &str {
    match canonical.rsplit_once('/') {
        Some((dir, _)) => dir,
        None => "",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_archive_segments_dropped() {
        assert_eq!(normalize("vehicles.rpf/adder.yft"), "adder.yft");
        assert_eq!(
            normalize("dlc.rpf/common/data/handling.meta"),
            "common/data/handling.meta"
        );
        // differently-named containers converge on the same key
        assert_eq!(
            normalize("cars.rpf/adder.yft"),
            normalize("vehicles.rpf/adder.yft")
        );
    }

    #[test]
    fn test_prefix_rewrites() {
        assert_eq!(normalize("x64/data/vehicles.meta"), "data/vehicles.meta");
        assert_eq!(normalize("update/data/vehicles.meta"), "data/vehicles.meta");
        // only one rewrite applies; the remainder is untouched
        assert_eq!(normalize("x64/update/a.meta"), "update/a.meta");
        // non-prefix occurrences are kept
        assert_eq!(normalize("data/x64/a.meta"), "data/x64/a.meta");
    }

    #[test]
    fn test_lowercasing_and_separators() {
        assert_eq!(normalize("Common\\Data\\Handling.meta"), "common/data/handling.meta");
        assert_eq!(normalize("common//data/"), "common/data");
    }

    #[test]
    fn test_bare_name_fallback() {
        // a path that is nothing but an archive name keeps its bare name
        assert_eq!(normalize("vehicles.rpf"), "vehicles.rpf");
        assert_eq!(normalize("x64/vehicles.rpf"), "vehicles.rpf");
    }

    #[test]
    fn test_total_on_odd_inputs() {
        assert_eq!(normalize(""), "");
        assert_eq!(normalize("///"), "");
        assert_eq!(normalize("a"), "a");
    }

    #[test]
    fn test_deterministic() {
        let path = "X64/Vehicles.rpf/ADDER.yft";
        assert_eq!(normalize(path), normalize(path));
        assert_eq!(normalize(path), "adder.yft");
    }

    #[test]
    fn test_file_name_and_parent() {
        assert_eq!(file_name("common/data/handling.meta"), "handling.meta");
        assert_eq!(file_name("handling.meta"), "handling.meta");
        assert_eq!(parent("common/data/handling.meta"), "common/data");
        assert_eq!(parent("handling.meta"), "");
    }
}
