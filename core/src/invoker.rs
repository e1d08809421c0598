use std::collections::BTreeMap;

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::client::{ApiResponse, ApplianceClient};
use crate::endpoint::{operation_id, HttpMethod, VersionCandidate};
use crate::error::OperationError;

const PATH_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Concrete HTTP call registered for one `(version, operation)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RestBinding {
    pub method: HttpMethod,
    /// Full request path with `{name}` placeholders, e.g. `/rest/vxm/v1/requests/{id}`.
    pub path: String,
}

/// Explicit operation id → binding map, built once at startup.
#[derive(Debug, Clone, Default)]
pub struct OperationRegistry {
    bindings: BTreeMap<String, RestBinding>,
}

impl OperationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, version: &VersionCandidate, suffix: &str, binding: RestBinding) {
        self.bindings.insert(operation_id(version, suffix), binding);
    }

    pub fn lookup(&self, operation_id: &str) -> Option<&RestBinding> {
        self.bindings.get(operation_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &RestBinding)> {
        self.bindings.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

/// Caller-supplied input for a single invocation.
#[derive(Debug, Clone, Default)]
pub struct Payload {
    pub path_params: BTreeMap<String, String>,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl Payload {
    pub fn json(body: Value) -> Self {
        Self {
            body: Some(body),
            ..Self::default()
        }
    }

    pub fn path_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.path_params.insert(name.into(), value.into());
        self
    }
}

pub struct OperationInvoker<'a> {
    client: &'a ApplianceClient,
    registry: &'a OperationRegistry,
}

impl<'a> OperationInvoker<'a> {
    pub fn new(client: &'a ApplianceClient, registry: &'a OperationRegistry) -> Self {
        Self { client, registry }
    }

    pub async fn invoke(
        &self,
        version: &VersionCandidate,
        suffix: &str,
        payload: &Payload,
    ) -> Result<ApiResponse, OperationError> {
        let operation_id = operation_id(version, suffix);
        let binding = self.registry.lookup(&operation_id).ok_or_else(|| {
            OperationError::NotImplementedForVersion {
                operation_id: operation_id.clone(),
            }
        })?;
        let path = expand_path(&binding.path, &payload.path_params)?;
        debug!(
            operation_id = %operation_id,
            method = %binding.method,
            path = %path,
            "invoking operation"
        );
        self.client
            .send(binding.method, &path, &payload.query, payload.body.as_ref())
            .await
    }
}

/// Substitutes `{name}` placeholders with percent-encoded values.
pub fn expand_path(
    template: &str,
    params: &BTreeMap<String, String>,
) -> Result<String, OperationError> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        let end = after.find('}').ok_or_else(|| {
            OperationError::InvalidRequest(format!("unclosed placeholder in '{}'", template))
        })?;
        let name = &after[..end];
        let value = params.get(name).ok_or_else(|| {
            OperationError::InvalidRequest(format!(
                "missing value for path parameter '{}' in '{}'",
                name, template
            ))
        })?;
        out.extend(utf8_percent_encode(value, PATH_SEGMENT));
        rest = &after[end + 1..];
    }
    out.push_str(rest);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn expands_and_encodes_placeholders() {
        assert_eq!(
            expand_path("/rest/vxm/v1/hosts/{sn}", &params(&[("sn", "V0 12/3")])).unwrap(),
            "/rest/vxm/v1/hosts/V0%2012%2F3"
        );
        assert_eq!(
            expand_path("/rest/vxm/v1/requests/{id}", &params(&[("id", "SHUTDOWN_CLUSTER-1.a")]))
                .unwrap(),
            "/rest/vxm/v1/requests/SHUTDOWN_CLUSTER-1.a"
        );
    }

    #[test]
    fn missing_placeholder_value_is_invalid_request() {
        let err = expand_path("/hosts/{sn}", &BTreeMap::new()).unwrap_err();
        assert!(matches!(err, OperationError::InvalidRequest(_)));
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn unregistered_operation_is_not_implemented_for_version() {
        let client = ApplianceClient::new(crate::client::ClientConfig::new("127.0.0.1:9")).unwrap();
        let registry = OperationRegistry::new();
        let invoker = OperationInvoker::new(&client, &registry);
        let err = invoker
            .invoke(&VersionCandidate::new(7), "hosts_get", &Payload::default())
            .await
            .unwrap_err();
        match err {
            OperationError::NotImplementedForVersion { operation_id } => {
                assert_eq!(operation_id, "v7_hosts_get")
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
