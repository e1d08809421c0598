//! Normalized view of the appliance's OpenAPI description.
//!
//! Raw path keys are kept as-is; each is filed under the first `v<digits>`
//! segment found in it, so `/v3/hosts/{sn}` lands under `v3`.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::endpoint::{HttpMethod, VersionCandidate};

/// method (lower case) -> operation metadata
pub type MethodMap = BTreeMap<String, Value>;
/// version segment -> methods
pub type VersionMap = BTreeMap<VersionCandidate, MethodMap>;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SchemaDocument {
    pub paths: BTreeMap<String, VersionMap>,
    /// Entries a later group tried to contribute for a key already present.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub conflicts: Vec<SchemaConflict>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SchemaConflict {
    pub path: String,
    pub version: VersionCandidate,
    pub method: String,
    pub rejected_from: String,
    pub rejected: Value,
}

/// Locations of the consolidated and per-group API documents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaLocations {
    pub consolidated: String,
    /// Must contain `{group}`.
    pub group_pattern: String,
    pub groups: Vec<String>,
}

pub const DEFAULT_GROUPS: &[&str] = &[
    "cluster",
    "host",
    "system",
    "lcm",
    "certificate",
    "network",
    "support",
    "callhome",
    "security",
    "telemetry",
    "storage",
    "request",
];

impl Default for SchemaLocations {
    fn default() -> Self {
        Self {
            consolidated: "/rest/vxm/api-doc.json".to_string(),
            group_pattern: "/rest/vxm/api-doc-{group}.json".to_string(),
            groups: DEFAULT_GROUPS.iter().map(|g| g.to_string()).collect(),
        }
    }
}

impl SchemaLocations {
    pub fn group_path(&self, group: &str) -> String {
        self.group_pattern.replace("{group}", group)
    }
}

impl SchemaDocument {
    /// Normalizes a raw OpenAPI document; `None` when it has no `paths` object.
    pub fn from_openapi(raw: &Value) -> Option<Self> {
        let raw_paths = raw.get("paths")?.as_object()?;
        let mut doc = SchemaDocument::default();
        for (path, item) in raw_paths {
            let Some(version) = version_segment(path) else {
                debug!(path = %path, "skipping unversioned schema path");
                continue;
            };
            let Some(item) = item.as_object() else {
                continue;
            };
            let methods: MethodMap = item
                .iter()
                .filter(|(key, _)| is_method_key(key))
                .map(|(key, meta)| (key.to_ascii_lowercase(), meta.clone()))
                .collect();
            if methods.is_empty() {
                continue;
            }
            doc.paths
                .entry(path.clone())
                .or_default()
                .entry(version)
                .or_default()
                .extend(methods);
        }
        Some(doc)
    }

    /// Merges `other` (fetched from group `other_group`) into `self`.
    /// Existing entries win; displaced ones go to `conflicts`.
    pub fn merge(&mut self, other: SchemaDocument, other_group: &str) {
        self.conflicts.extend(other.conflicts);
        for (path, versions) in other.paths {
            let existing_versions = self.paths.entry(path.clone()).or_default();
            for (version, methods) in versions {
                let existing_methods = existing_versions.entry(version.clone()).or_default();
                for (method, meta) in methods {
                    if existing_methods.contains_key(&method) {
                        warn!(
                            path = %path,
                            version = %version,
                            method = %method,
                            group = other_group,
                            "duplicate schema entry across api groups"
                        );
                        self.conflicts.push(SchemaConflict {
                            path: path.clone(),
                            version: version.clone(),
                            method,
                            rejected_from: other_group.to_string(),
                            rejected: meta,
                        });
                    } else {
                        existing_methods.insert(method, meta);
                    }
                }
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

/// First path segment of the form `v<digits>`.
pub fn version_segment(path: &str) -> Option<VersionCandidate> {
    path.split('/').find_map(VersionCandidate::parse)
}

fn is_method_key(key: &str) -> bool {
    HttpMethod::ALL
        .iter()
        .any(|m| m.schema_key().eq_ignore_ascii_case(key))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(raw: Value) -> SchemaDocument {
        SchemaDocument::from_openapi(&raw).unwrap()
    }

    #[test]
    fn normalizes_paths_under_their_version_segment() {
        let d = doc(json!({
            "paths": {
                "/v3/hosts/{sn}": {"get": {"operationId": "getHost"}, "parameters": []},
                "/rest/vxm/v10/system": {"GET": {}, "patch": {}},
                "/health": {"get": {}}
            }
        }));
        assert_eq!(d.paths.len(), 2);
        let host = &d.paths["/v3/hosts/{sn}"];
        assert_eq!(host.keys().next().unwrap().to_string(), "v3");
        assert_eq!(host.values().next().unwrap().len(), 1);
        let system = &d.paths["/rest/vxm/v10/system"][&VersionCandidate::new(10)];
        assert!(system.contains_key("get") && system.contains_key("patch"));
    }

    #[test]
    fn missing_paths_object_is_not_a_schema() {
        assert!(SchemaDocument::from_openapi(&json!({"swagger": "2.0"})).is_none());
    }

    #[test]
    fn merge_of_disjoint_groups_is_order_independent() {
        let a = doc(json!({"paths": {"/v1/cluster": {"get": {}}}}));
        let b = doc(json!({"paths": {"/v2/cluster": {"get": {}}, "/v1/hosts": {"get": {}}}}));
        let c = doc(json!({"paths": {"/v1/cluster": {"post": {}}}}));

        let mut left = a.clone();
        left.merge(b.clone(), "b");
        left.merge(c.clone(), "c");

        let mut right = c;
        right.merge(b, "b");
        right.merge(a, "a");

        assert_eq!(left, right);
        assert!(left.conflicts.is_empty());
    }

    #[test]
    fn merge_keeps_earlier_entry_and_records_conflict() {
        let mut first = doc(json!({"paths": {"/v1/hosts": {"get": {"summary": "first"}}}}));
        let second = doc(json!({
            "paths": {"/v1/hosts": {"get": {"summary": "second"}, "post": {}}}
        }));
        first.merge(second, "cluster");

        let methods = &first.paths["/v1/hosts"][&VersionCandidate::new(1)];
        assert_eq!(methods["get"]["summary"], "first");
        assert!(methods.contains_key("post"));
        assert_eq!(first.conflicts.len(), 1);
        let conflict = &first.conflicts[0];
        assert_eq!(conflict.rejected["summary"], "second");
        assert_eq!(conflict.rejected_from, "cluster");
    }

    #[test]
    fn group_path_substitutes_group_name() {
        let locations = SchemaLocations::default();
        assert_eq!(locations.group_path("lcm"), "/rest/vxm/api-doc-lcm.json");
    }
}
