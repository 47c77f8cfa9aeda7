use std::sync::Arc;

use alert_models::{EventRule, ReferenceType, Severity, TriggerDefinition};
use chrono::{DateTime, Utc};

use crate::config::EngineConfig;
use crate::memory::{InMemory, RecordingProvider};
use crate::{Engine, ExecutionContext, Services};

pub const ORG: &str = "acme";
pub const ENV: &str = "dev";

pub fn epoch() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2024-01-01T00:00:00Z")
        .unwrap()
        .with_timezone(&Utc)
}

pub fn concrete_trigger(id: &str, api_id: &str) -> TriggerDefinition {
    TriggerDefinition {
        id: id.to_string(),
        name: format!("trigger {id}"),
        description: None,
        reference_type: ReferenceType::Api,
        reference_id: api_id.to_string(),
        environment_id: Some(ENV.to_string()),
        organization_id: Some(ORG.to_string()),
        source: "REQUEST".to_string(),
        severity: Severity::Warning,
        enabled: true,
        template: false,
        template_id: None,
        event_rules: Vec::new(),
        conditions: serde_json::json!([{"type": "THRESHOLD", "property": "response.status", "threshold": 500}]),
        filters: Vec::new(),
        notifications: Vec::new(),
        created_at: epoch(),
        updated_at: epoch(),
    }
}

/// A template scoped to environment `env`, expanded onto created APIs.
pub fn api_template(id: &str, env: &str) -> TriggerDefinition {
    TriggerDefinition {
        name: format!("template {id}"),
        reference_type: ReferenceType::Environment,
        reference_id: env.to_string(),
        environment_id: Some(env.to_string()),
        enabled: false,
        template: true,
        event_rules: vec![EventRule::ApiCreate],
        ..concrete_trigger(id, env)
    }
}

pub struct Fixture {
    pub mem: InMemory,
    pub providers: Arc<crate::memory::MemoryProviders>,
    pub parameters: Arc<crate::memory::MemoryParameters>,
    pub ctx: ExecutionContext,
}

impl Fixture {
    pub fn new() -> Self {
        let mem = InMemory::default();
        Self {
            providers: mem.providers.clone(),
            parameters: mem.parameters.clone(),
            mem,
            ctx: ExecutionContext::new(ORG, Some(ENV)),
        }
    }

    pub fn services(&self) -> Arc<Services> {
        self.mem.services(EngineConfig::default())
    }

    pub fn engine(&self) -> Engine {
        Engine::new(self.services())
    }

    pub fn add_providers(&self, count: usize) -> Vec<Arc<RecordingProvider>> {
        self.mem.add_providers(count)
    }

    pub fn set_alerting(&self, enabled: bool) {
        self.mem.set_alerting(ORG, enabled);
    }
}
