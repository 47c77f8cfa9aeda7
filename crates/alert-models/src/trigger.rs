use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{EventRule, ReferenceType, Scope};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    #[default]
    Info,
    Warning,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FilterOperator {
    Equals,
    Matches,
}

/// A provider-side filter restricting the events a trigger is evaluated against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Filter {
    pub property: String,
    pub operator: FilterOperator,
    pub pattern: String,
}

impl Filter {
    pub fn equals(property: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            property: property.into(),
            operator: FilterOperator::Equals,
            pattern: value.into(),
        }
    }

    pub fn matches(property: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self {
            property: property.into(),
            operator: FilterOperator::Matches,
            pattern: pattern.into(),
        }
    }
}

/// A notification attached to a trigger. The `configuration` is opaque to
/// the engine, except for the default e-mail notifier which is expanded
/// before registration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    #[serde(rename = "type")]
    pub notifier: String,
    #[serde(default)]
    pub configuration: serde_json::Value,
}

/// TriggerDefinition is the persisted unit of the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerDefinition {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub reference_type: ReferenceType,
    pub reference_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization_id: Option<String>,
    /// Event source evaluated by the provider (e.g. "REQUEST", "NODE_HEARTBEAT").
    pub source: String,
    #[serde(default)]
    pub severity: Severity,
    pub enabled: bool,
    /// Templates are never registered with providers, only expanded.
    #[serde(default)]
    pub template: bool,
    /// For a trigger derived from a template, the id of that template.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub event_rules: Vec<EventRule>,
    /// Conditions payload, interpreted only by providers.
    #[serde(default)]
    pub conditions: serde_json::Value,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub filters: Vec<Filter>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub notifications: Vec<Notification>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TriggerDefinition {
    /// Returns true if this trigger must be registered with providers
    /// whenever it's written: it's concrete and enabled.
    pub fn is_registrable(&self) -> bool {
        !self.template && self.enabled
    }

    /// Returns true if this template expands onto entities of `reference_type`.
    /// A template with event rules reacts to the creation events it names,
    /// while a template without any rules targets its own reference type.
    pub fn targets(&self, reference_type: ReferenceType) -> bool {
        if self.event_rules.is_empty() {
            self.reference_type == reference_type
        } else {
            self.event_rules
                .iter()
                .any(|rule| rule.creates() == reference_type)
        }
    }

    /// The scope within which this template is expanded, if one can be
    /// determined.
    pub fn scope(&self) -> Option<Scope> {
        match self.reference_type {
            ReferenceType::Environment => Some(Scope::Environment(self.reference_id.clone())),
            ReferenceType::Organization => Some(Scope::Organization(self.reference_id.clone())),
            _ => match (&self.environment_id, &self.organization_id) {
                (Some(env), _) => Some(Scope::Environment(env.clone())),
                (None, Some(org)) => Some(Scope::Organization(org.clone())),
                (None, None) => None,
            },
        }
    }

    /// Derives a concrete, enabled trigger for the given entity from this template.
    pub fn instantiate(
        &self,
        id: String,
        reference_type: ReferenceType,
        reference_id: &str,
        now: DateTime<Utc>,
    ) -> TriggerDefinition {
        TriggerDefinition {
            id,
            reference_type,
            reference_id: reference_id.to_string(),
            enabled: true,
            template: false,
            template_id: Some(self.id.clone()),
            event_rules: Vec::new(),
            created_at: now,
            updated_at: now,
            ..self.clone()
        }
    }

    /// Merges the mutable fields of `patch` into this trigger.
    pub fn apply(&mut self, patch: TriggerPatch, now: DateTime<Utc>) {
        let TriggerPatch {
            name,
            description,
            enabled,
            severity,
            conditions,
            filters,
            notifications,
            event_rules,
        } = patch;

        if let Some(name) = name {
            self.name = name;
        }
        if let Some(description) = description {
            self.description = description;
        }
        if let Some(enabled) = enabled {
            self.enabled = enabled;
        }
        if let Some(severity) = severity {
            self.severity = severity;
        }
        if let Some(conditions) = conditions {
            self.conditions = conditions;
        }
        if let Some(filters) = filters {
            self.filters = filters;
        }
        if let Some(notifications) = notifications {
            self.notifications = notifications;
        }
        if let Some(event_rules) = event_rules {
            self.event_rules = event_rules;
        }
        self.updated_at = now;
    }
}

/// A trigger to be created. The id, timestamps, and scope are assigned by the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewTrigger {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub reference_type: ReferenceType,
    pub reference_id: String,
    pub source: String,
    #[serde(default)]
    pub severity: Severity,
    pub enabled: bool,
    #[serde(default)]
    pub template: bool,
    #[serde(default)]
    pub event_rules: Vec<EventRule>,
    #[serde(default)]
    pub conditions: serde_json::Value,
    #[serde(default)]
    pub filters: Vec<Filter>,
    #[serde(default)]
    pub notifications: Vec<Notification>,
}

/// Partial update of a trigger's mutable fields. Absent fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TriggerPatch {
    pub name: Option<String>,
    /// `Some(None)` (an explicit `null`) clears the description.
    #[serde(
        deserialize_with = "deserialize_some",
        skip_serializing_if = "Option::is_none"
    )]
    pub description: Option<Option<String>>,
    pub enabled: Option<bool>,
    pub severity: Option<Severity>,
    pub conditions: Option<serde_json::Value>,
    pub filters: Option<Vec<Filter>>,
    pub notifications: Option<Vec<Notification>>,
    pub event_rules: Option<Vec<EventRule>>,
}

// Distinguishes an explicit `null` (`Some(None)`) from an absent field (`None`).
fn deserialize_some<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Deserialize<'de>,
{
    T::deserialize(deserializer).map(Some)
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    fn template() -> TriggerDefinition {
        let now = DateTime::parse_from_rfc3339("2024-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        TriggerDefinition {
            id: "tpl-1".to_string(),
            name: "High error rate".to_string(),
            description: None,
            reference_type: ReferenceType::Environment,
            reference_id: "dev".to_string(),
            environment_id: Some("dev".to_string()),
            organization_id: Some("acme".to_string()),
            source: "REQUEST".to_string(),
            severity: Severity::Warning,
            enabled: false,
            template: true,
            template_id: None,
            event_rules: vec![EventRule::ApiCreate],
            conditions: serde_json::json!([{"type": "THRESHOLD", "threshold": 5}]),
            filters: Vec::new(),
            notifications: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_targets_and_scope() {
        let mut tpl = template();
        assert!(tpl.targets(ReferenceType::Api));
        assert!(!tpl.targets(ReferenceType::Application));
        assert_eq!(Some(Scope::Environment("dev".to_string())), tpl.scope());

        tpl.event_rules.clear();
        tpl.reference_type = ReferenceType::Api;
        tpl.reference_id = "ignored".to_string();
        assert!(tpl.targets(ReferenceType::Api));
        assert_eq!(Some(Scope::Environment("dev".to_string())), tpl.scope());

        tpl.environment_id = None;
        assert_eq!(Some(Scope::Organization("acme".to_string())), tpl.scope());
        tpl.organization_id = None;
        assert_eq!(None, tpl.scope());
    }

    #[test]
    fn test_instantiate_copies_template_config() {
        let tpl = template();
        let now = tpl.created_at + chrono::Duration::hours(1);
        let concrete = tpl.instantiate("t-1".to_string(), ReferenceType::Api, "api-42", now);

        assert_eq!("t-1", concrete.id);
        assert_eq!(Some("tpl-1".to_string()), concrete.template_id);
        assert_eq!(ReferenceType::Api, concrete.reference_type);
        assert_eq!("api-42", concrete.reference_id);
        assert!(concrete.enabled);
        assert!(!concrete.template);
        assert!(concrete.event_rules.is_empty());
        assert!(concrete.is_registrable());
        assert_eq!(tpl.conditions, concrete.conditions);
        assert_eq!(tpl.severity, concrete.severity);
        assert_eq!(now, concrete.created_at);
    }

    #[test]
    fn test_apply_patch_leaves_absent_fields() {
        let mut trigger = template();
        let before = trigger.clone();
        let now = before.updated_at + chrono::Duration::minutes(5);

        trigger.apply(
            TriggerPatch {
                name: Some("Renamed".to_string()),
                enabled: Some(true),
                ..Default::default()
            },
            now,
        );

        assert_eq!("Renamed", trigger.name);
        assert!(trigger.enabled);
        assert_eq!(before.conditions, trigger.conditions);
        assert_eq!(before.reference_id, trigger.reference_id);
        assert_eq!(before.created_at, trigger.created_at);
        assert_eq!(now, trigger.updated_at);
    }

    #[test]
    fn test_patch_description_can_be_cleared() {
        let mut trigger = template();
        let now = trigger.updated_at;

        let patch: TriggerPatch =
            serde_json::from_str(r#"{"description": "Checks 5xx"}"#).unwrap();
        assert_eq!(Some(Some("Checks 5xx".to_string())), patch.description);
        trigger.apply(patch, now);
        assert_eq!(Some("Checks 5xx"), trigger.description.as_deref());

        // An absent description is left unchanged.
        let patch: TriggerPatch = serde_json::from_str(r#"{"name": "Renamed"}"#).unwrap();
        assert_eq!(None, patch.description);
        trigger.apply(patch, now);
        assert_eq!(Some("Checks 5xx"), trigger.description.as_deref());

        let patch: TriggerPatch = serde_json::from_str(r#"{"description": null}"#).unwrap();
        assert_eq!(Some(None), patch.description);
        trigger.apply(patch, now);
        assert_eq!(None, trigger.description);
    }
}
