use serde_json::Value;
use tracing::{debug, info};

use crate::client::ApplianceClient;
use crate::error::{Error, OperationError, Result};
use crate::schema::{SchemaDocument, SchemaLocations};

/// Fetches and normalizes the API description. Every call hits the network.
pub async fn fetch_schema(
    client: &ApplianceClient,
    locations: &SchemaLocations,
) -> Result<SchemaDocument> {
    debug!(url = %client.url(&locations.consolidated), "fetching consolidated api schema");
    match client.get(&locations.consolidated).await {
        Ok(resp) => {
            let raw: Value = resp.json().map_err(unavailable)?;
            SchemaDocument::from_openapi(&raw).ok_or_else(|| Error::SchemaUnavailable {
                reason: format!("{} has no paths object", resp.url),
                source: None,
            })
        }
        Err(err) if err.status() == Some(404) => {
            info!("consolidated api schema not found, fetching per-group documents");
            fetch_groups(client, locations).await
        }
        Err(err) => Err(unavailable(err)),
    }
}

async fn fetch_groups(
    client: &ApplianceClient,
    locations: &SchemaLocations,
) -> Result<SchemaDocument> {
    let mut merged: Option<SchemaDocument> = None;
    for group in &locations.groups {
        let path = locations.group_path(group);
        debug!(group = %group, url = %client.url(&path), "fetching api schema group");
        let resp = match client.get(&path).await {
            Ok(resp) => resp,
            Err(err) if err.status() == Some(404) => {
                debug!(group = %group, "api schema group not present");
                continue;
            }
            Err(err) => return Err(unavailable(err)),
        };
        let raw: Value = resp.json().map_err(unavailable)?;
        let Some(doc) = SchemaDocument::from_openapi(&raw) else {
            debug!(group = %group, "api schema group has no paths");
            continue;
        };
        match merged.as_mut() {
            Some(acc) => acc.merge(doc, group),
            None => merged = Some(doc),
        }
    }
    match merged {
        Some(doc) => Ok(doc),
        None => Err(Error::SchemaUnavailable {
            reason: format!(
                "no api schema groups available under {}",
                client.url(&locations.group_pattern)
            ),
            source: None,
        }),
    }
}

fn unavailable(err: OperationError) -> Error {
    Error::SchemaUnavailable {
        reason: err.to_string(),
        source: Some(err),
    }
}
