use std::collections::BTreeSet;

use crate::endpoint::{EndpointDescriptor, VersionCandidate};
use crate::error::{Error, Result};
use crate::schema::SchemaDocument;

/// Picks the version to call for `descriptor`: `requested` if the schema
/// exposes it, otherwise the numerically highest available.
pub fn resolve(
    schema: &SchemaDocument,
    descriptor: &EndpointDescriptor,
    requested: Option<u32>,
) -> Result<VersionCandidate> {
    resolve_with(schema, descriptor, requested, PathMatch::Suffix)
}

/// [`resolve`] with an explicit path matching rule.
pub fn resolve_with(
    schema: &SchemaDocument,
    descriptor: &EndpointDescriptor,
    requested: Option<u32>,
    matching: PathMatch,
) -> Result<VersionCandidate> {
    let available = available_versions_with(schema, descriptor, matching);
    let not_found = || Error::VersionNotFound {
        path: descriptor.path_template().to_string(),
        method: descriptor.http_method().map(|m| m.as_str().to_string()),
        version: requested,
    };
    match requested {
        Some(number) => {
            let candidate = VersionCandidate::new(number);
            if available.contains(&candidate) {
                Ok(candidate)
            } else {
                Err(not_found())
            }
        }
        None => available.into_iter().next_back().ok_or_else(not_found),
    }
}

/// How a schema path is compared with a descriptor's path template.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PathMatch {
    /// The schema path ends with the template, so `/shutdown` matches
    /// `/v1/cluster/shutdown`.
    #[default]
    Suffix,
    /// The schema path is the template, or the template preceded by a
    /// prefix whose last segment is a version (`/rest/vxm/v4` + `/hosts`).
    /// `/hosts` then no longer matches `/v5/cluster/hosts`.
    VersionBoundary,
}

impl PathMatch {
    fn matches(self, schema_path: &str, template: &str) -> bool {
        match self {
            PathMatch::Suffix => schema_path.ends_with(template),
            PathMatch::VersionBoundary => {
                if schema_path == template {
                    return true;
                }
                let Some(prefix) = schema_path.strip_suffix(template) else {
                    return false;
                };
                prefix
                    .rsplit('/')
                    .next()
                    .and_then(VersionCandidate::parse)
                    .is_some()
            }
        }
    }
}

/// Every version exposing `descriptor`, ascending.
pub fn available_versions(
    schema: &SchemaDocument,
    descriptor: &EndpointDescriptor,
) -> BTreeSet<VersionCandidate> {
    available_versions_with(schema, descriptor, PathMatch::Suffix)
}

pub fn available_versions_with(
    schema: &SchemaDocument,
    descriptor: &EndpointDescriptor,
    matching: PathMatch,
) -> BTreeSet<VersionCandidate> {
    let template = descriptor.path_template();
    let method = descriptor.http_method();
    schema
        .paths
        .iter()
        .filter(|(path, _)| matching.matches(path, template))
        .flat_map(|(_, versions)| versions.iter())
        .filter(|(_, methods)| match method {
            Some(m) => methods.keys().any(|k| k.eq_ignore_ascii_case(m.schema_key())),
            None => !methods.is_empty(),
        })
        .map(|(version, _)| version.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint::HttpMethod;
    use serde_json::json;

    fn schema(raw: serde_json::Value) -> SchemaDocument {
        SchemaDocument::from_openapi(&raw).unwrap()
    }

    #[test]
    fn highest_is_numeric_not_lexicographic() {
        let paths: serde_json::Map<String, serde_json::Value> = (1..=10)
            .map(|n| (format!("/v{}/hosts", n), json!({"get": {}})))
            .collect();
        let s = schema(json!({ "paths": paths }));
        let v = resolve(&s, &EndpointDescriptor::get("/hosts"), None).unwrap();
        assert_eq!(v.to_string(), "v10");
    }

    #[test]
    fn suffix_match_tolerates_version_prefix() {
        let s = schema(json!({"paths": {"/v3/hosts/{sn}": {"get": {}}}}));
        let d = EndpointDescriptor::new("/hosts/{sn}", None);
        assert_eq!(resolve(&s, &d, None).unwrap().to_string(), "v3");
    }

    #[test]
    fn suffix_match_spans_intermediate_segments() {
        let s = schema(json!({"paths": {
            "/v1/cluster/shutdown": {"post": {}},
            "/v2/system/shutdown": {"post": {}}
        }}));
        let d = EndpointDescriptor::new("/shutdown", Some(HttpMethod::Post));
        let all: Vec<String> = available_versions(&s, &d).iter().map(|v| v.to_string()).collect();
        assert_eq!(all, ["v1", "v2"]);
    }

    #[test]
    fn version_boundary_matching_is_opt_in() {
        let s = schema(json!({"paths": {
            "/v5/cluster/hosts": {"get": {}},
            "/rest/vxm/v2/hosts": {"get": {}}
        }}));
        let d = EndpointDescriptor::get("/hosts");
        assert_eq!(resolve(&s, &d, None).unwrap().to_string(), "v5");
        let strict = resolve_with(&s, &d, None, PathMatch::VersionBoundary).unwrap();
        assert_eq!(strict.to_string(), "v2");
        assert!(resolve_with(&s, &d, Some(5), PathMatch::VersionBoundary).is_err());
    }

    #[test]
    fn method_filter_excludes_versions_without_method() {
        let s = schema(json!({"paths": {
            "/v1/cluster/shutdown": {"post": {}},
            "/v2/cluster/shutdown": {"POST": {}},
            "/v3/cluster/shutdown": {"get": {}}
        }}));
        let d = EndpointDescriptor::new("/cluster/shutdown", Some(HttpMethod::Post));
        assert_eq!(resolve(&s, &d, None).unwrap().to_string(), "v2");
        assert!(resolve(&s, &d, Some(3)).is_err());
        let any = EndpointDescriptor::new("/cluster/shutdown", None);
        assert_eq!(resolve(&s, &any, None).unwrap().to_string(), "v3");
    }

    #[test]
    fn requested_version_must_exist() {
        let s = schema(json!({"paths": {"/v1/system": {"get": {}}, "/v2/system": {"get": {}}}}));
        let d = EndpointDescriptor::get("/system");
        assert_eq!(resolve(&s, &d, Some(1)).unwrap().to_string(), "v1");
        match resolve(&s, &d, Some(9)) {
            Err(Error::VersionNotFound { path, version, .. }) => {
                assert_eq!(path, "/system");
                assert_eq!(version, Some(9));
            }
            other => panic!("expected VersionNotFound, got {:?}", other),
        }
    }

    #[test]
    fn unknown_path_is_version_not_found() {
        let s = schema(json!({"paths": {"/v1/system": {"get": {}}}}));
        assert!(matches!(
            resolve(&s, &EndpointDescriptor::get("/lcm/upgrade"), None),
            Err(Error::VersionNotFound { version: None, .. })
        ));
    }

    #[test]
    fn selection_is_deterministic() {
        let s = schema(json!({"paths": {
            "/v2/hosts": {"get": {}},
            "/rest/vxm/v4/hosts": {"get": {}},
            "/v4/hosts": {"get": {}}
        }}));
        let d = EndpointDescriptor::get("/hosts");
        let first = resolve(&s, &d, None).unwrap();
        for _ in 0..5 {
            assert_eq!(resolve(&s, &d, None).unwrap(), first);
        }
        assert_eq!(first.number(), 4);
    }
}
