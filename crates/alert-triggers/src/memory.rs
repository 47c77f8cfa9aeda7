//! In-memory implementations of the engine's collaborators.
//!
//! These back the engine's tests, and are usable by embedders which don't
//! need durable storage. Their locks recover from poisoning. Each
//! implementation records the calls made to it and can be made to fail, so
//! that callers can observe how the engine drives its collaborators.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use alert_models::{
    AlertEvent, EventCriteria, Page, Pageable, ReferenceType, Scope, TriggerDefinition,
};

use crate::config::EngineConfig;
use crate::parameters::{Key, ParameterScope, ParameterSource};
use crate::providers::{Broadcast, ProviderRegistry, TriggerProvider};
use crate::references::{EntityKind, Metadata, ReferenceResolver};
use crate::store::{EventStore, StoreError, TriggerStore};
use crate::Services;

// Locks `mutex`, recovering its state if another thread panicked while
// holding it. Every critical section leaves the state consistent.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Store operations which may be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum StoreOp {
    Find,
    Create,
    Update,
    Delete,
}

#[derive(Debug, Default)]
struct Calls {
    creates: usize,
    updates: usize,
    deletes: Vec<String>,
}

#[derive(Debug, Default)]
pub struct MemoryTriggerStore {
    triggers: Mutex<BTreeMap<String, TriggerDefinition>>,
    calls: Mutex<Calls>,
    failing: Mutex<BTreeSet<StoreOp>>,
}

impl MemoryTriggerStore {
    /// Inserts a trigger directly, bypassing call accounting and constraints.
    pub fn insert(&self, trigger: TriggerDefinition) {
        lock(&self.triggers).insert(trigger.id.clone(), trigger);
    }

    pub fn get(&self, id: &str) -> Option<TriggerDefinition> {
        lock(&self.triggers).get(id).cloned()
    }

    pub fn all(&self) -> Vec<TriggerDefinition> {
        lock(&self.triggers).values().cloned().collect()
    }

    pub fn create_calls(&self) -> usize {
        lock(&self.calls).creates
    }

    pub fn update_calls(&self) -> usize {
        lock(&self.calls).updates
    }

    pub fn delete_calls(&self) -> Vec<String> {
        lock(&self.calls).deletes.clone()
    }

    pub fn fail(&self, op: StoreOp) {
        lock(&self.failing).insert(op);
    }

    pub fn recover(&self, op: StoreOp) {
        lock(&self.failing).remove(&op);
    }

    fn check(&self, op: StoreOp) -> Result<(), StoreError> {
        if lock(&self.failing).contains(&op) {
            Err(StoreError::Other(anyhow::anyhow!(
                "trigger store {op:?} is unavailable"
            )))
        } else {
            Ok(())
        }
    }
}

#[async_trait::async_trait]
impl TriggerStore for MemoryTriggerStore {
    async fn find_by_id(&self, id: &str) -> Result<Option<TriggerDefinition>, StoreError> {
        self.check(StoreOp::Find)?;
        Ok(self.get(id))
    }

    async fn find_all(&self) -> Result<Vec<TriggerDefinition>, StoreError> {
        self.check(StoreOp::Find)?;
        Ok(self.all())
    }

    async fn find_by_reference(
        &self,
        reference_type: ReferenceType,
        reference_id: &str,
    ) -> Result<Vec<TriggerDefinition>, StoreError> {
        self.check(StoreOp::Find)?;
        Ok(lock(&self.triggers)
            .values()
            .filter(|t| t.reference_type == reference_type && t.reference_id == reference_id)
            .cloned()
            .collect())
    }

    async fn create(&self, trigger: TriggerDefinition) -> Result<TriggerDefinition, StoreError> {
        lock(&self.calls).creates += 1;
        self.check(StoreOp::Create)?;

        let mut triggers = lock(&self.triggers);
        if triggers.contains_key(&trigger.id) {
            return Err(StoreError::Conflict(format!("trigger {}", trigger.id)));
        }
        if let Some(template_id) = &trigger.template_id {
            if triggers.values().any(|t| {
                t.template_id.as_ref() == Some(template_id) && t.reference_id == trigger.reference_id
            }) {
                return Err(StoreError::Conflict(format!(
                    "template {template_id} is already applied to {}",
                    trigger.reference_id
                )));
            }
        }
        triggers.insert(trigger.id.clone(), trigger.clone());
        Ok(trigger)
    }

    async fn update(&self, trigger: TriggerDefinition) -> Result<TriggerDefinition, StoreError> {
        lock(&self.calls).updates += 1;
        self.check(StoreOp::Update)?;

        let mut triggers = lock(&self.triggers);
        let Some(current) = triggers.get_mut(&trigger.id) else {
            return Err(StoreError::Other(anyhow::anyhow!(
                "trigger {} does not exist",
                trigger.id
            )));
        };
        *current = trigger.clone();
        Ok(trigger)
    }

    async fn delete(&self, id: &str) -> Result<(), StoreError> {
        lock(&self.calls).deletes.push(id.to_string());
        self.check(StoreOp::Delete)?;
        lock(&self.triggers).remove(id);
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct MemoryEventStore {
    events: Mutex<Vec<AlertEvent>>,
    delete_all_calls: Mutex<Vec<String>>,
    failing: Mutex<bool>,
}

impl MemoryEventStore {
    pub fn insert(&self, event: AlertEvent) {
        lock(&self.events).push(event);
    }

    pub fn events_of(&self, trigger_id: &str) -> Vec<AlertEvent> {
        lock(&self.events)
            .iter()
            .filter(|e| e.trigger_id == trigger_id)
            .cloned()
            .collect()
    }

    pub fn delete_all_calls(&self) -> Vec<String> {
        lock(&self.delete_all_calls).clone()
    }

    pub fn set_failing(&self, failing: bool) {
        *lock(&self.failing) = failing;
    }

    fn check(&self) -> Result<(), StoreError> {
        if *lock(&self.failing) {
            Err(StoreError::Other(anyhow::anyhow!("event store is unavailable")))
        } else {
            Ok(())
        }
    }

    fn matching(&self, criteria: &EventCriteria) -> Vec<AlertEvent> {
        let mut matched: Vec<_> = lock(&self.events)
            .iter()
            .filter(|e| criteria.matches(e))
            .cloned()
            .collect();
        matched.sort_by(|l, r| r.created_at.cmp(&l.created_at));
        matched
    }
}

#[async_trait::async_trait]
impl EventStore for MemoryEventStore {
    async fn create(&self, event: AlertEvent) -> Result<AlertEvent, StoreError> {
        self.check()?;
        self.insert(event.clone());
        Ok(event)
    }

    async fn delete_all(&self, trigger_id: &str) -> Result<(), StoreError> {
        lock(&self.delete_all_calls)
            .push(trigger_id.to_string());
        self.check()?;
        lock(&self.events)
            .retain(|e| e.trigger_id != trigger_id);
        Ok(())
    }

    async fn search(
        &self,
        criteria: &EventCriteria,
        page: Pageable,
    ) -> Result<Page<AlertEvent>, StoreError> {
        self.check()?;
        let matched = self.matching(criteria);
        let total_elements = matched.len() as u64;
        let content: Vec<_> = matched
            .into_iter()
            .skip(page.page_number as usize * page.page_size as usize)
            .take(page.page_size as usize)
            .collect();

        Ok(Page {
            page_number: page.page_number,
            page_elements: content.len() as u32,
            total_elements,
            content,
        })
    }

    async fn count(&self, criteria: &EventCriteria) -> Result<u64, StoreError> {
        self.check()?;
        Ok(self.matching(criteria).len() as u64)
    }
}

/// A provider which records every call made to it.
#[derive(Debug)]
pub struct RecordingProvider {
    name: String,
    failing: bool,
    calls: Mutex<Vec<(Broadcast, TriggerDefinition)>>,
}

impl RecordingProvider {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            failing: false,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// A provider whose calls are recorded, and then fail.
    pub fn failing(name: impl Into<String>) -> Self {
        Self {
            failing: true,
            ..Self::new(name)
        }
    }

    fn calls_of(&self, action: Broadcast) -> Vec<String> {
        lock(&self.calls)
            .iter()
            .filter(|(a, _)| *a == action)
            .map(|(_, t)| t.id.clone())
            .collect()
    }

    /// Ids of the triggers passed to `register`, in call order.
    pub fn register_calls(&self) -> Vec<String> {
        self.calls_of(Broadcast::Register)
    }

    /// Ids of the triggers passed to `unregister`, in call order.
    pub fn unregister_calls(&self) -> Vec<String> {
        self.calls_of(Broadcast::Unregister)
    }

    /// All calls, in order.
    pub fn calls(&self) -> Vec<(Broadcast, String)> {
        lock(&self.calls)
            .iter()
            .map(|(a, t)| (*a, t.id.clone()))
            .collect()
    }

    /// The definition most recently registered under `id`.
    pub fn last_registered(&self, id: &str) -> Option<TriggerDefinition> {
        lock(&self.calls)
            .iter()
            .rev()
            .find(|(a, t)| *a == Broadcast::Register && t.id == id)
            .map(|(_, t)| t.clone())
    }

    fn record(&self, action: Broadcast, trigger: &TriggerDefinition) -> anyhow::Result<()> {
        lock(&self.calls).push((action, trigger.clone()));
        if self.failing {
            anyhow::bail!("provider {} refused to {action} trigger {}", self.name, trigger.id);
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl TriggerProvider for RecordingProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn register(&self, trigger: &TriggerDefinition) -> anyhow::Result<()> {
        self.record(Broadcast::Register, trigger)
    }

    async fn unregister(&self, trigger: &TriggerDefinition) -> anyhow::Result<()> {
        self.record(Broadcast::Unregister, trigger)
    }
}

/// A registry of providers which connect and disconnect at runtime.
#[derive(Default)]
pub struct MemoryProviders {
    connected: Mutex<Vec<Arc<dyn TriggerProvider>>>,
}

impl MemoryProviders {
    pub fn connect(&self, provider: Arc<dyn TriggerProvider>) {
        tracing::info!(provider = provider.name(), "alert provider connected");
        lock(&self.connected).push(provider);
    }

    pub fn disconnect(&self, name: &str) {
        lock(&self.connected).retain(|p| p.name() != name);
        tracing::info!(provider = name, "alert provider disconnected");
    }
}

impl ProviderRegistry for MemoryProviders {
    fn find_all(&self) -> Vec<Arc<dyn TriggerProvider>> {
        lock(&self.connected).clone()
    }
}

#[derive(Debug, Default)]
pub struct MemoryParameters {
    values: Mutex<BTreeMap<(Key, ParameterScope), String>>,
    failure: Mutex<Option<String>>,
}

impl MemoryParameters {
    pub fn set(&self, key: Key, scope: ParameterScope, value: impl Into<String>) {
        lock(&self.values)
            .insert((key, scope), value.into());
    }

    /// Makes every subsequent lookup fail with `message`.
    pub fn fail_with(&self, message: impl Into<String>) {
        *lock(&self.failure) = Some(message.into());
    }
}

#[async_trait::async_trait]
impl ParameterSource for MemoryParameters {
    async fn find(&self, key: Key, scope: &ParameterScope) -> anyhow::Result<Option<String>> {
        if let Some(message) = lock(&self.failure).as_ref() {
            anyhow::bail!("{message}");
        }
        Ok(lock(&self.values)
            .get(&(key, scope.clone()))
            .cloned())
    }
}

#[derive(Debug, Clone)]
struct Entity {
    reference_type: ReferenceType,
    id: String,
    organization_id: String,
    environment_id: String,
}

/// Entities which templates may be expanded onto, and their metadata.
#[derive(Debug, Default)]
pub struct MemoryReferences {
    entities: Mutex<Vec<Entity>>,
    searches: Mutex<usize>,
    metadata: Mutex<BTreeMap<(EntityKind, String), Metadata>>,
    failing_lookups: Mutex<bool>,
}

impl MemoryReferences {
    pub fn add(
        &self,
        reference_type: ReferenceType,
        id: impl Into<String>,
        organization_id: impl Into<String>,
        environment_id: impl Into<String>,
    ) {
        lock(&self.entities).push(Entity {
            reference_type,
            id: id.into(),
            organization_id: organization_id.into(),
            environment_id: environment_id.into(),
        });
    }

    /// Sets the metadata of an entity. Non-object values describe it as empty.
    pub fn describe(&self, kind: EntityKind, id: impl Into<String>, metadata: serde_json::Value) {
        let metadata = match metadata {
            serde_json::Value::Object(metadata) => metadata,
            _ => Metadata::new(),
        };
        lock(&self.metadata).insert((kind, id.into()), metadata);
    }

    pub fn fail_lookups(&self, failing: bool) {
        *lock(&self.failing_lookups) = failing;
    }

    pub fn searches(&self) -> usize {
        *lock(&self.searches)
    }
}

#[async_trait::async_trait]
impl ReferenceResolver for MemoryReferences {
    async fn search_ids(
        &self,
        reference_type: ReferenceType,
        scope: &Scope,
    ) -> anyhow::Result<Vec<String>> {
        *lock(&self.searches) += 1;
        Ok(lock(&self.entities)
            .iter()
            .filter(|e| e.reference_type == reference_type)
            .filter(|e| scope.covers(&e.organization_id, Some(&e.environment_id)))
            .map(|e| e.id.clone())
            .collect())
    }

    async fn find_metadata(&self, kind: EntityKind, id: &str) -> anyhow::Result<Option<Metadata>> {
        if *lock(&self.failing_lookups) {
            anyhow::bail!("metadata of {kind:?} {id} is unavailable");
        }
        Ok(lock(&self.metadata).get(&(kind, id.to_string())).cloned())
    }
}

/// A complete set of in-memory collaborators.
#[derive(Clone, Default)]
pub struct InMemory {
    pub triggers: Arc<MemoryTriggerStore>,
    pub events: Arc<MemoryEventStore>,
    pub providers: Arc<MemoryProviders>,
    pub parameters: Arc<MemoryParameters>,
    pub references: Arc<MemoryReferences>,
}

impl InMemory {
    pub fn services(&self, config: EngineConfig) -> Arc<Services> {
        Arc::new(Services {
            triggers: self.triggers.clone(),
            events: self.events.clone(),
            providers: self.providers.clone(),
            parameters: self.parameters.clone(),
            references: self.references.clone(),
            config: Arc::new(config),
        })
    }

    /// Connects `count` recording providers named `provider-0`, `provider-1`, ...
    pub fn add_providers(&self, count: usize) -> Vec<Arc<RecordingProvider>> {
        let offset = self.providers.find_all().len();
        (offset..offset + count)
            .map(|i| {
                let provider = Arc::new(RecordingProvider::new(format!("provider-{i}")));
                self.providers.connect(provider.clone());
                provider
            })
            .collect()
    }

    pub fn set_alerting(&self, organization_id: &str, enabled: bool) {
        self.parameters.set(
            Key::AlertEnabled,
            ParameterScope::Organization(organization_id.to_string()),
            enabled.to_string(),
        );
    }
}
