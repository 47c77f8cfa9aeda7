use alert_models::{ReferenceType, Scope};

/// Entity metadata, as handed to providers to enrich their notifications.
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// Kinds of entities whose metadata providers may ask for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EntityKind {
    Api,
    Application,
    Plan,
}

impl EntityKind {
    /// Returns the kind named by a provider's property key, if any.
    pub fn from_property(property: &str) -> Option<EntityKind> {
        match property {
            "api" => Some(EntityKind::Api),
            "application" => Some(EntityKind::Application),
            "plan" => Some(EntityKind::Plan),
            _ => None,
        }
    }
}

/// Enumerates the entities that templates may be expanded onto, and
/// describes entities to providers.
#[async_trait::async_trait]
pub trait ReferenceResolver: Send + Sync {
    /// Returns the ids of all entities of `reference_type` which live within `scope`.
    async fn search_ids(
        &self,
        reference_type: ReferenceType,
        scope: &Scope,
    ) -> anyhow::Result<Vec<String>>;

    /// Returns the metadata of an entity, or None if it doesn't exist.
    async fn find_metadata(&self, kind: EntityKind, id: &str) -> anyhow::Result<Option<Metadata>>;
}
