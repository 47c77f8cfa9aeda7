use alert_models::{
    AlertEvent, EventCriteria, Page, Pageable, ReferenceType, TriggerDefinition,
};

/// Error of a store call. A `Conflict` is returned when an insert would
/// violate a uniqueness constraint, notably the one-concrete-trigger-per
/// `(template_id, reference_id)` pair.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("conflicting record: {0}")]
    Conflict(String),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Durable keyed storage of trigger definitions.
#[async_trait::async_trait]
pub trait TriggerStore: Send + Sync {
    async fn find_by_id(&self, id: &str) -> Result<Option<TriggerDefinition>, StoreError>;

    async fn find_all(&self) -> Result<Vec<TriggerDefinition>, StoreError>;

    async fn find_by_reference(
        &self,
        reference_type: ReferenceType,
        reference_id: &str,
    ) -> Result<Vec<TriggerDefinition>, StoreError>;

    async fn find_by_references(
        &self,
        reference_type: ReferenceType,
        reference_ids: &[String],
    ) -> Result<Vec<TriggerDefinition>, StoreError> {
        let mut out = Vec::new();
        for reference_id in reference_ids {
            out.extend(self.find_by_reference(reference_type, reference_id).await?);
        }
        Ok(out)
    }

    /// Inserts a new trigger. Implementations must reject a concrete trigger
    /// whose `(template_id, reference_id)` pair already exists with `StoreError::Conflict`.
    async fn create(&self, trigger: TriggerDefinition) -> Result<TriggerDefinition, StoreError>;

    async fn update(&self, trigger: TriggerDefinition) -> Result<TriggerDefinition, StoreError>;

    async fn delete(&self, id: &str) -> Result<(), StoreError>;
}

/// Storage of the events emitted by triggers.
#[async_trait::async_trait]
pub trait EventStore: Send + Sync {
    async fn create(&self, event: AlertEvent) -> Result<AlertEvent, StoreError>;

    /// Deletes every event of the given trigger.
    async fn delete_all(&self, trigger_id: &str) -> Result<(), StoreError>;

    /// Returns a page of matching events, most recent first.
    async fn search(
        &self,
        criteria: &EventCriteria,
        page: Pageable,
    ) -> Result<Page<AlertEvent>, StoreError>;

    async fn count(&self, criteria: &EventCriteria) -> Result<u64, StoreError>;
}
