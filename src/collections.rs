//! Collection detection and three-source reconciliation.
//!
//! The capture step reports collections from up to three independent
//! detectors, each with its own JSON shape: the `ansible-galaxy` listing, a
//! filesystem scan of `ansible_collections` roots, and a mapping derived
//! from `ansible-collection-*` RPM names. The sources are merged with fixed
//! precedence: galaxy > filesystem > rpm-derived.

use serde_json::Value;
use std::collections::BTreeMap;

use crate::document::SimplePackage;

/// Separates the three JSON chunks inside the collection section, in the
/// fixed order galaxy, filesystem, rpm-derived.
pub const COLL_SEP: &str = "===COLL SEP===";

/// Candidate map from one source: fully-qualified collection name
/// (`namespace.name`) to version string.
pub type CandidateMap = BTreeMap<String, String>;

/// The recognized JSON shapes a collection chunk can take.
///
/// Each variant carries the chunk normalized down to a [`CandidateMap`];
/// `Unrecognized` covers malformed or unknown shapes and normalizes to an
/// empty map rather than failing the image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CollectionDoc {
    /// `{"collections": {"ns.coll": {"version": "x"}, ...}}`
    Galaxy(CandidateMap),
    /// `{"ns.coll": {"version": "x"}, ...}` with dotted keys.
    DirectMap(CandidateMap),
    /// `[{"namespace": "ns", "name": "coll", "version": "x"}, ...]`
    List(CandidateMap),
    Unrecognized,
}

impl CollectionDoc {
    pub fn into_map(self) -> CandidateMap {
        match self {
            CollectionDoc::Galaxy(map)
            | CollectionDoc::DirectMap(map)
            | CollectionDoc::List(map) => map,
            CollectionDoc::Unrecognized => CandidateMap::new(),
        }
    }
}

/// Classify one parsed JSON document into a [`CollectionDoc`].
pub fn detect_shape(value: &Value) -> CollectionDoc {
    match value {
        Value::Object(obj) => match obj.get("collections") {
            Some(Value::Object(inner)) => CollectionDoc::Galaxy(qualified_versions(inner)),
            _ => CollectionDoc::DirectMap(qualified_versions(obj)),
        },
        Value::Array(entries) => {
            let map = entries
                .iter()
                .filter_map(|entry| {
                    let obj = entry.as_object()?;
                    let namespace = obj.get("namespace")?.as_str()?;
                    let name = obj.get("name")?.as_str()?;
                    let version = obj.get("version")?;
                    Some((format!("{}.{}", namespace, name), version_string(version)))
                })
                .collect();
            CollectionDoc::List(map)
        }
        _ => CollectionDoc::Unrecognized,
    }
}

/// Pull `name -> version` pairs out of a JSON object, keeping only dotted
/// (fully-qualified) keys whose value is an object with a `version` field.
fn qualified_versions(obj: &serde_json::Map<String, Value>) -> CandidateMap {
    obj.iter()
        .filter_map(|(key, value)| {
            if !key.contains('.') {
                return None;
            }
            let version = value.as_object()?.get("version")?;
            Some((key.clone(), version_string(version)))
        })
        .collect()
}

fn version_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Merge the three candidate maps, ascending precedence: rpm-derived first,
/// then filesystem, then galaxy, later sources overwriting earlier entries.
pub fn merge_sources(
    galaxy: CandidateMap,
    filesystem: CandidateMap,
    rpm_derived: CandidateMap,
) -> CandidateMap {
    let mut merged = CandidateMap::new();
    for source in [rpm_derived, filesystem, galaxy] {
        merged.extend(source);
    }
    merged
}

/// Parse the full collection section (up to three JSON chunks separated by
/// [`COLL_SEP`] in the fixed order galaxy, filesystem, rpm-derived) and
/// reconcile them into one list sorted case-insensitively by name.
///
/// Fewer than three chunks leaves the absent sources empty; more than three
/// are clipped to the first three. A chunk that is not valid JSON, or whose
/// shape is not recognized, contributes nothing.
pub fn parse_collections_merged(text: &str) -> Vec<SimplePackage> {
    let mut chunks: Vec<&str> = text.split(COLL_SEP).map(str::trim).collect();
    chunks.truncate(3);

    let mut maps: Vec<CandidateMap> = chunks
        .iter()
        .map(|chunk| {
            if chunk.is_empty() {
                return CandidateMap::new();
            }
            match serde_json::from_str::<Value>(chunk) {
                Ok(value) => detect_shape(&value).into_map(),
                Err(_) => CandidateMap::new(),
            }
        })
        .collect();
    maps.resize_with(3, CandidateMap::new);

    let rpm_derived = maps.pop().unwrap_or_default();
    let filesystem = maps.pop().unwrap_or_default();
    let galaxy = maps.pop().unwrap_or_default();

    let mut items: Vec<SimplePackage> = merge_sources(galaxy, filesystem, rpm_derived)
        .into_iter()
        .map(|(name, version)| SimplePackage { name, version })
        .collect();
    items.sort_by_key(|item| item.name.to_lowercase());
    items
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn map(entries: &[(&str, &str)]) -> CandidateMap {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_detect_galaxy_shape() {
        let value = json!({"collections": {"community.general": {"version": "7.0.0"}}});
        assert_eq!(
            detect_shape(&value),
            CollectionDoc::Galaxy(map(&[("community.general", "7.0.0")]))
        );
    }

    #[test]
    fn test_detect_direct_map_shape_requires_dotted_keys() {
        let value = json!({
            "community.general": {"version": "7.0.0"},
            "nodot": {"version": "1.0"},
            "missing.version": {"something": "else"}
        });
        assert_eq!(
            detect_shape(&value),
            CollectionDoc::DirectMap(map(&[("community.general", "7.0.0")]))
        );
    }

    #[test]
    fn test_detect_list_shape() {
        let value = json!([
            {"namespace": "ansible", "name": "posix", "version": "1.5.0"},
            {"namespace": "broken", "version": "0.1"}
        ]);
        assert_eq!(
            detect_shape(&value),
            CollectionDoc::List(map(&[("ansible.posix", "1.5.0")]))
        );
    }

    #[test]
    fn test_detect_unrecognized_shape() {
        assert_eq!(detect_shape(&json!("a string")), CollectionDoc::Unrecognized);
        assert_eq!(detect_shape(&json!(42)), CollectionDoc::Unrecognized);
        assert_eq!(detect_shape(&json!(null)), CollectionDoc::Unrecognized);
    }

    #[test]
    fn test_numeric_versions_stringify() {
        let value = json!({"community.general": {"version": 7}});
        assert_eq!(
            detect_shape(&value),
            CollectionDoc::DirectMap(map(&[("community.general", "7")]))
        );
    }

    #[test]
    fn test_merge_precedence_galaxy_wins() {
        let merged = merge_sources(
            map(&[("community.general", "7.0.0")]),
            CandidateMap::new(),
            map(&[("community.general", "6.0.0"), ("ansible.posix", "1.5.0")]),
        );
        assert_eq!(
            merged,
            map(&[("ansible.posix", "1.5.0"), ("community.general", "7.0.0")])
        );
    }

    #[test]
    fn test_merge_filesystem_only_key_survives() {
        let merged = merge_sources(
            CandidateMap::new(),
            map(&[("fs.only", "2.0")]),
            CandidateMap::new(),
        );
        assert_eq!(merged, map(&[("fs.only", "2.0")]));
    }

    #[test]
    fn test_parse_collections_merged_scenario() {
        let text = concat!(
            "{\"community.general\": {\"version\": \"7.0.0\"}}\n",
            "===COLL SEP===\n",
            "{}\n",
            "===COLL SEP===\n",
            "{\"community.general\": {\"version\": \"6.0.0\"}, \"ansible.posix\": {\"version\": \"1.5.0\"}}"
        );
        let items = parse_collections_merged(text);
        assert_eq!(
            items,
            vec![
                SimplePackage {
                    name: "ansible.posix".to_string(),
                    version: "1.5.0".to_string()
                },
                SimplePackage {
                    name: "community.general".to_string(),
                    version: "7.0.0".to_string()
                },
            ]
        );
    }

    #[test]
    fn test_parse_collections_merged_tolerates_missing_chunks() {
        // One chunk only: it is the galaxy source.
        let items =
            parse_collections_merged("{\"collections\": {\"community.crypto\": {\"version\": \"2.0\"}}}");
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].name, "community.crypto");

        assert!(parse_collections_merged("").is_empty());
    }

    #[test]
    fn test_parse_collections_merged_clips_extra_chunks() {
        let text = concat!(
            "{}\n===COLL SEP===\n",
            "{}\n===COLL SEP===\n",
            "{\"from.rpm\": {\"version\": \"1\"}}\n===COLL SEP===\n",
            "{\"ignored.extra\": {\"version\": \"9\"}}"
        );
        let items = parse_collections_merged(text);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].name, "from.rpm");
    }

    #[test]
    fn test_parse_collections_merged_drops_malformed_chunk() {
        let text = concat!(
            "this is not json\n===COLL SEP===\n",
            "{\"fs.coll\": {\"version\": \"3.1\"}}\n===COLL SEP===\n",
            "{}"
        );
        let items = parse_collections_merged(text);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].name, "fs.coll");
        assert_eq!(items[0].version, "3.1");
    }

    #[test]
    fn test_case_insensitive_output_order() {
        let text = "{\"Zeta.coll\": {\"version\": \"1\"}, \"alpha.coll\": {\"version\": \"2\"}}";
        let items = parse_collections_merged(text);
        let names: Vec<&str> = items.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["alpha.coll", "Zeta.coll"]);
    }
}
