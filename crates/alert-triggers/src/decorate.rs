//! Preparation of trigger definitions for provider registration.
//!
//! Providers evaluate events from the whole installation, so a concrete
//! trigger must carry filters restricting it to the entity it monitors.
//! Notifications using the default e-mail notifier are expanded into a full
//! e-mail notifier configuration. Decoration applies to the copy sent to
//! providers only, and is never persisted.

use alert_models::{Filter, Notification, ReferenceType, TriggerDefinition};
use anyhow::Context;
use serde::Serialize;

use crate::config::{EmailSettings, EngineConfig};
use crate::parameters::{Key, ParameterScope, ParameterSource};

pub const DEFAULT_EMAIL_NOTIFIER: &str = "default-email";
pub const EMAIL_NOTIFIER: &str = "email-notifier";

/// Returns a copy of `trigger` ready to be registered with providers.
pub async fn for_registration(
    trigger: &TriggerDefinition,
    config: &EngineConfig,
    parameters: &dyn ParameterSource,
) -> TriggerDefinition {
    let mut decorated = trigger.clone();
    decorated.filters.extend(reference_filters(trigger));

    if decorated
        .notifications
        .iter()
        .any(|n| n.notifier.eq_ignore_ascii_case(DEFAULT_EMAIL_NOTIFIER))
    {
        let smtp = match config.smtp() {
            Some(smtp) => smtp.clone(),
            None => smtp_from_parameters(trigger, parameters).await,
        };
        for notification in decorated.notifications.iter_mut() {
            if notification.notifier.eq_ignore_ascii_case(DEFAULT_EMAIL_NOTIFIER) {
                if let Err(error) = expand_default_email(notification, &smtp, config) {
                    tracing::error!(trigger_id = %trigger.id, ?error, "failed to expand default e-mail notification");
                }
            }
        }
    }
    decorated
}

/// Filters which restrict a trigger to the entity it references.
pub fn reference_filters(trigger: &TriggerDefinition) -> Vec<Filter> {
    match trigger.reference_type {
        ReferenceType::Api | ReferenceType::Application => vec![Filter::equals(
            trigger.reference_type.name().to_lowercase(),
            trigger.reference_id.as_str(),
        )],
        ReferenceType::Environment => {
            let mut filters = vec![Filter::matches(
                "environment",
                list_member_pattern(&trigger.reference_id),
            )];
            if let Some(org) = &trigger.organization_id {
                filters.push(Filter::matches("organization", list_member_pattern(org)));
            }
            filters
        }
        ReferenceType::Organization | ReferenceType::Tenant => Vec::new(),
    }
}

// Matches `value` as a member of a comma-separated list, or the `*` wildcard.
fn list_member_pattern(value: &str) -> String {
    format!("(?:.*,|^){}(?:,.*|$)|\\*", regex::escape(value))
}

async fn smtp_from_parameters(
    trigger: &TriggerDefinition,
    parameters: &dyn ParameterSource,
) -> EmailSettings {
    let Some(org) = &trigger.organization_id else {
        return EmailSettings::default();
    };
    let scope = ParameterScope::Organization(org.clone());

    let find = |key: Key| {
        let scope = &scope;
        async move {
            match parameters.find(key, scope).await {
                Ok(value) => value,
                Err(error) => {
                    tracing::warn!(%key, ?error, "failed to read e-mail parameter");
                    None
                }
            }
        }
    };

    let port = find(Key::EmailPort).await.and_then(|port| match port.parse::<u16>() {
        Ok(port) => Some(port),
        Err(error) => {
            tracing::warn!(%port, ?error, "ignoring invalid e-mail port parameter");
            None
        }
    });
    let starttls_enabled = find(Key::EmailStartTlsEnabled)
        .await
        .is_some_and(|v| v.trim().eq_ignore_ascii_case("true"));

    EmailSettings {
        host: find(Key::EmailHost).await,
        port,
        username: find(Key::EmailUsername).await,
        password: find(Key::EmailPassword).await,
        starttls_enabled,
        ..Default::default()
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct EmailNotifierConfiguration<'a> {
    #[serde(flatten)]
    smtp: &'a EmailSettings,
    from: String,
    to: String,
    subject: String,
    body: String,
}

fn expand_default_email(
    notification: &mut Notification,
    smtp: &EmailSettings,
    config: &EngineConfig,
) -> anyhow::Result<()> {
    // Configurations may be stored either as a JSON object, or as a string of JSON.
    let email = match &notification.configuration {
        serde_json::Value::String(raw) => {
            serde_json::from_str(raw).context("parsing notification configuration")?
        }
        other => other.clone(),
    };
    let field = |name: &str| {
        email
            .get(name)
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string()
    };

    let expanded = EmailNotifierConfiguration {
        smtp,
        from: field("from"),
        to: field("to"),
        subject: config.format_subject(&field("subject")),
        body: field("body"),
    };
    notification.configuration =
        serde_json::to_value(&expanded).context("serializing e-mail notifier configuration")?;
    notification.notifier = EMAIL_NOTIFIER.to_string();
    Ok(())
}
