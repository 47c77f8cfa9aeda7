//! Alert trigger lifecycle and provider synchronization.
//!
//! The trigger store is the singular source of truth for alert trigger
//! definitions. Every write to it is followed by a broadcast to each of the
//! alerting providers connected at that moment, which evaluate the triggers
//! at runtime. Providers may come and go, so they're re-enumerated for every
//! broadcast, and a provider which fails a broadcast never undoes the store
//! write which preceded it: its state is reconciled later by
//! `LifecycleManager::synchronize`, which is run whenever a provider
//! (re)connects.
//!
//! There are two kinds of triggers:
//!
//! - Concrete triggers monitor a single entity (an API, an application, an
//!   environment) and are registered with providers while enabled.
//! - Templates are never registered. They're expanded into concrete triggers,
//!   one per entity within their scope, either on demand for all existing
//!   entities (`TemplateResolver::apply_defaults`), or when a new entity is
//!   created (`TemplateResolver::create_defaults`). A concrete trigger derived
//!   from a template points back to it through `template_id`, and there is at
//!   most one per `(template_id, reference_id)` pair. The store enforces that
//!   pair as a uniqueness constraint, so that concurrent expansions for the
//!   same entity can't produce duplicates.
//!
//! Providers also call back into the engine: to record the events of fired
//! triggers (`LifecycleManager::record_notification`), and to resolve the
//! entities named by those events (`LifecycleManager::resolve_properties`).
//!
//! Alerting is switched on and off per organization by the `alert.enabled`
//! parameter. `StatusAggregator` owns the single guard which every entry
//! point consults. Creating or updating a trigger additionally requires at
//! least one connected provider.
mod error;

pub mod config;
pub mod decorate;
pub mod lifecycle;
pub mod memory;
pub mod parameters;
pub mod properties;
pub mod providers;
pub mod references;
pub mod status;
pub mod store;
pub mod templates;

#[cfg(test)]
mod test_util;

use std::sync::Arc;

pub use error::{Error, Result};
pub use lifecycle::{LifecycleManager, NotificationCommand};
pub use status::StatusAggregator;
pub use templates::TemplateResolver;

/// The organization and environment on whose behalf an operation is performed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionContext {
    pub organization_id: String,
    pub environment_id: Option<String>,
}

impl ExecutionContext {
    pub fn new(organization_id: impl Into<String>, environment_id: Option<&str>) -> Self {
        Self {
            organization_id: organization_id.into(),
            environment_id: environment_id.map(str::to_string),
        }
    }

    /// The narrowest scope of this context.
    pub fn scope(&self) -> alert_models::Scope {
        match &self.environment_id {
            Some(env) => alert_models::Scope::Environment(env.clone()),
            None => alert_models::Scope::Organization(self.organization_id.clone()),
        }
    }
}

/// Collaborators of the engine.
#[derive(Clone)]
pub struct Services {
    pub triggers: Arc<dyn store::TriggerStore>,
    pub events: Arc<dyn store::EventStore>,
    pub providers: Arc<dyn providers::ProviderRegistry>,
    pub parameters: Arc<dyn parameters::ParameterSource>,
    pub references: Arc<dyn references::ReferenceResolver>,
    pub config: Arc<config::EngineConfig>,
}

/// Engine bundles the lifecycle manager, template resolver, and status
/// aggregator over one set of collaborators.
#[derive(Clone)]
pub struct Engine {
    pub lifecycle: LifecycleManager,
    pub templates: TemplateResolver,
    pub status: StatusAggregator,
}

impl Engine {
    pub fn new(services: Arc<Services>) -> Self {
        let status = StatusAggregator::new(services.clone());
        let lifecycle = LifecycleManager::new(services, status.clone());
        let templates = TemplateResolver::new(lifecycle.clone());
        Self {
            lifecycle,
            templates,
            status,
        }
    }
}
