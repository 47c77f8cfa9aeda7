#![allow(dead_code)]

use alert_models::{EventRule, NewTrigger, ReferenceType, Severity};
use alert_triggers::config::EngineConfig;
use alert_triggers::memory::InMemory;
use alert_triggers::{Engine, ExecutionContext};

pub const ORG: &str = "acme";
pub const ENV: &str = "dev";

pub fn init() -> tracing::subscriber::DefaultGuard {
    let subscriber = tracing_subscriber::FmtSubscriber::builder()
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(tracing::level_filters::LevelFilter::DEBUG.into())
                .from_env_lossy(),
        )
        .with_test_writer()
        .finish();

    tracing::subscriber::set_default(subscriber)
}

pub struct Harness {
    pub mem: InMemory,
    pub engine: Engine,
    pub ctx: ExecutionContext,
}

impl Harness {
    pub fn new(config: EngineConfig) -> Self {
        let mem = InMemory::default();
        let engine = Engine::new(mem.services(config));
        Self {
            mem,
            engine,
            ctx: ExecutionContext::new(ORG, Some(ENV)),
        }
    }

    pub fn with_alerting(self, enabled: bool) -> Self {
        self.mem.set_alerting(ORG, enabled);
        self
    }

    pub fn add_api(&self, id: &str) {
        self.mem.references.add(ReferenceType::Api, id, ORG, ENV);
    }
}

impl Default for Harness {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

/// A template of the current environment, expanded onto every created API.
pub fn api_template(name: &str) -> NewTrigger {
    NewTrigger {
        name: name.to_string(),
        description: None,
        reference_type: ReferenceType::Environment,
        reference_id: ENV.to_string(),
        source: "REQUEST".to_string(),
        severity: Severity::Warning,
        enabled: true,
        template: true,
        event_rules: vec![EventRule::ApiCreate],
        conditions: serde_json::json!([{"type": "THRESHOLD", "property": "response.response-time", "threshold": 1500}]),
        filters: Vec::new(),
        notifications: Vec::new(),
    }
}

pub fn api_trigger(name: &str, api_id: &str) -> NewTrigger {
    NewTrigger {
        reference_type: ReferenceType::Api,
        reference_id: api_id.to_string(),
        template: false,
        event_rules: Vec::new(),
        ..api_template(name)
    }
}
