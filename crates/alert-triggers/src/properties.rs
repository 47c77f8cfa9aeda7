//! Resolution of the entities named by providers' events.
//!
//! A provider evaluating a trigger only knows the ids carried by events
//! (`api`, `application`, `plan`). Before notifying, it asks us for the
//! metadata of those entities. Entities which can't be found are described
//! by a placeholder, so that notifications still render.

use std::collections::HashMap;

use serde_json::Value;

use crate::references::{EntityKind, Metadata, ReferenceResolver};

/// Id reported by gateways for requests which matched no API, or no
/// application (keyless plans).
pub const UNKNOWN_ID: &str = "1";

/// Resolves every property naming a known entity kind to that entity's
/// metadata. Other properties are ignored.
pub async fn resolve(
    references: &dyn ReferenceResolver,
    properties: &HashMap<String, String>,
) -> HashMap<String, Metadata> {
    let lookups = properties.iter().filter_map(|(property, id)| {
        let kind = EntityKind::from_property(property)?;
        Some(async move { (property.clone(), describe(references, kind, id).await) })
    });
    futures::future::join_all(lookups).await.into_iter().collect()
}

async fn describe(references: &dyn ReferenceResolver, kind: EntityKind, id: &str) -> Metadata {
    if id == UNKNOWN_ID {
        match kind {
            EntityKind::Api => return placeholder("Unknown API (not found)", "unknown"),
            EntityKind::Application => {
                return placeholder("Unknown application (keyless)", "unknown")
            }
            EntityKind::Plan => {}
        }
    }

    match references.find_metadata(kind, id).await {
        Ok(Some(metadata)) => metadata,
        Ok(None) => {
            let name = match kind {
                EntityKind::Api => "Deleted API",
                EntityKind::Application => "Deleted application",
                EntityKind::Plan => "Deleted plan",
            };
            placeholder(name, "deleted")
        }
        Err(error) => {
            tracing::error!(?kind, %id, ?error, "failed to retrieve entity metadata");
            Metadata::new()
        }
    }
}

fn placeholder(name: &str, flag: &str) -> Metadata {
    let mut metadata = Metadata::new();
    metadata.insert("name".to_string(), Value::from(name));
    metadata.insert(flag.to_string(), Value::from("true"));
    metadata
}
