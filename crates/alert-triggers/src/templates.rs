use std::collections::HashSet;

use alert_models::{ReferenceType, TriggerDefinition};
use chrono::Utc;

use crate::lifecycle::{new_id, LifecycleManager};
use crate::store::StoreError;
use crate::{Error, ExecutionContext, Result};

// (template_id, reference_id) pairs which are already expanded.
type Expanded = HashSet<(String, String)>;

/// TemplateResolver expands templates into concrete triggers, at most one
/// per template and entity.
#[derive(Clone)]
pub struct TemplateResolver {
    lifecycle: LifecycleManager,
}

impl TemplateResolver {
    pub fn new(lifecycle: LifecycleManager) -> Self {
        Self { lifecycle }
    }

    /// Expands template `template_id` onto every entity of `reference_type`
    /// within the template's scope which doesn't have a trigger derived from
    /// it yet. Returns the created triggers.
    ///
    /// Failing to create the trigger of one entity is logged and doesn't
    /// prevent the others from being created.
    #[tracing::instrument(skip_all, fields(%template_id, %reference_type))]
    pub async fn apply_defaults(
        &self,
        ctx: &ExecutionContext,
        template_id: &str,
        reference_type: ReferenceType,
    ) -> Result<Vec<TriggerDefinition>> {
        self.lifecycle.status().ensure_enabled(ctx).await?;

        let template = self.lifecycle.find_by_id(template_id).await?;
        if !template.template {
            tracing::warn!("alert trigger is not a template");
            return Err(Error::not_found(template_id));
        }

        let scope = template.scope().unwrap_or_else(|| ctx.scope());
        let services = self.lifecycle.services();
        let reference_ids = services
            .references
            .search_ids(reference_type, &scope)
            .await
            .map_err(|err| {
                Error::technical(format!("failed to search {reference_type} ids of {scope:?}"), err)
            })?;

        let expanded: Expanded = self
            .lifecycle
            .find_by_references(reference_type, &reference_ids)
            .await?
            .into_iter()
            .filter_map(|t| t.template_id.map(|template_id| (template_id, t.reference_id)))
            .collect();

        let mut created = Vec::new();
        for reference_id in &reference_ids {
            if let Some(trigger) = self
                .expand(&template, reference_type, reference_id, &expanded)
                .await
            {
                created.push(trigger);
            }
        }

        tracing::info!(
            candidates = reference_ids.len(),
            created = created.len(),
            "applied alert template"
        );
        Ok(created)
    }

    /// Expands every template which applies to a newly created entity.
    /// Does nothing if alerting is disabled for the organization.
    #[tracing::instrument(skip_all, fields(%reference_type, %reference_id))]
    pub async fn create_defaults(
        &self,
        ctx: &ExecutionContext,
        reference_type: ReferenceType,
        reference_id: &str,
    ) -> Result<Vec<TriggerDefinition>> {
        if !self.lifecycle.status().is_enabled(ctx).await? {
            tracing::debug!("alerting is disabled, not creating default alert triggers");
            return Ok(Vec::new());
        }

        let templates: Vec<TriggerDefinition> = self
            .lifecycle
            .find_all()
            .await?
            .into_iter()
            .filter(|t| t.template && t.targets(reference_type))
            .filter(|t| {
                t.scope().is_some_and(|scope| {
                    scope.covers(&ctx.organization_id, ctx.environment_id.as_deref())
                })
            })
            .collect();

        if templates.is_empty() {
            return Ok(Vec::new());
        }

        let expanded: Expanded = self
            .lifecycle
            .find_by_reference(reference_type, reference_id)
            .await?
            .into_iter()
            .filter_map(|t| t.template_id.map(|template_id| (template_id, t.reference_id)))
            .collect();

        let mut created = Vec::new();
        for template in &templates {
            if let Some(trigger) = self
                .expand(template, reference_type, reference_id, &expanded)
                .await
            {
                created.push(trigger);
            }
        }

        tracing::info!(
            templates = templates.len(),
            created = created.len(),
            "created default alert triggers"
        );
        Ok(created)
    }

    // Derives the trigger of `template` for one entity, unless it already exists.
    async fn expand(
        &self,
        template: &TriggerDefinition,
        reference_type: ReferenceType,
        reference_id: &str,
        expanded: &Expanded,
    ) -> Option<TriggerDefinition> {
        if expanded.contains(&(template.id.clone(), reference_id.to_string())) {
            tracing::debug!(template_id = %template.id, %reference_id, "alert template already applied");
            return None;
        }

        let trigger = template.instantiate(new_id(), reference_type, reference_id, Utc::now());
        match self.lifecycle.persist_and_register(trigger).await {
            Ok(created) => Some(created),
            Err(StoreError::Conflict(conflict)) => {
                tracing::debug!(template_id = %template.id, %reference_id, %conflict, "alert template applied concurrently");
                None
            }
            Err(StoreError::Other(error)) => {
                tracing::error!(template_id = %template.id, %reference_id, ?error, "failed to apply alert template");
                None
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::memory::{RecordingProvider, StoreOp};
    use crate::test_util::{api_template, concrete_trigger, Fixture, ENV, ORG};
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    fn add_apis(fixture: &Fixture, ids: &[&str]) {
        for id in ids {
            fixture.mem.references.add(ReferenceType::Api, *id, ORG, ENV);
        }
    }

    #[tokio::test]
    async fn test_apply_defaults_is_idempotent() {
        let fixture = Fixture::new();
        fixture.set_alerting(true);
        let providers = fixture.add_providers(1);
        fixture.mem.triggers.insert(api_template("tpl-1", ENV));
        add_apis(&fixture, &["api-1", "api-2"]);
        // An API of another environment is out of the template's scope.
        fixture.mem.references.add(ReferenceType::Api, "api-9", ORG, "prod");
        let engine = fixture.engine();

        let created = engine
            .templates
            .apply_defaults(&fixture.ctx, "tpl-1", ReferenceType::Api)
            .await
            .unwrap();

        let mut references: Vec<_> = created.iter().map(|t| t.reference_id.as_str()).collect();
        references.sort();
        assert_eq!(vec!["api-1", "api-2"], references);
        for trigger in &created {
            assert_eq!(Some("tpl-1".to_string()), trigger.template_id);
            assert_eq!(ReferenceType::Api, trigger.reference_type);
            assert!(trigger.enabled && !trigger.template);
        }
        assert_eq!(2, providers[0].register_calls().len());

        let again = engine
            .templates
            .apply_defaults(&fixture.ctx, "tpl-1", ReferenceType::Api)
            .await
            .unwrap();
        assert!(again.is_empty());
        assert_eq!(2, fixture.mem.triggers.create_calls());
        assert_eq!(3, fixture.mem.triggers.all().len());
        assert_eq!(2, providers[0].register_calls().len());
    }

    #[tokio::test]
    async fn test_apply_defaults_errors() {
        let fixture = Fixture::new();
        fixture.mem.triggers.insert(api_template("tpl-1", ENV));
        fixture.mem.triggers.insert(concrete_trigger("t-1", "api-1"));
        add_apis(&fixture, &["api-1"]);
        let engine = fixture.engine();

        let err = engine
            .templates
            .apply_defaults(&fixture.ctx, "tpl-1", ReferenceType::Api)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Unavailable), "{err:?}");

        fixture.set_alerting(true);
        for id in ["missing", "t-1"] {
            let err = engine
                .templates
                .apply_defaults(&fixture.ctx, id, ReferenceType::Api)
                .await
                .unwrap_err();
            assert!(err.is_not_found(), "{err:?}");
        }
        assert_eq!(0, fixture.mem.references.searches());
        assert_eq!(0, fixture.mem.triggers.create_calls());
    }

    #[tokio::test]
    async fn test_apply_defaults_continues_past_store_failure() {
        let fixture = Fixture::new();
        fixture.set_alerting(true);
        fixture.mem.triggers.insert(api_template("tpl-1", ENV));
        add_apis(&fixture, &["api-1", "api-2"]);
        fixture.mem.triggers.fail(StoreOp::Create);
        let engine = fixture.engine();

        let created = engine
            .templates
            .apply_defaults(&fixture.ctx, "tpl-1", ReferenceType::Api)
            .await
            .unwrap();

        assert!(created.is_empty());
        // Both entities were attempted.
        assert_eq!(2, fixture.mem.triggers.create_calls());
    }

    #[tokio::test]
    async fn test_create_defaults_when_alerting_disabled() {
        let fixture = Fixture::new();
        let providers = fixture.add_providers(2);
        fixture.mem.triggers.insert(api_template("tpl-1", ENV));
        let engine = fixture.engine();

        let created = engine
            .templates
            .create_defaults(&fixture.ctx, ReferenceType::Api, "api-42")
            .await
            .unwrap();

        assert!(created.is_empty());
        assert_eq!(0, fixture.mem.triggers.create_calls());
        for provider in &providers {
            assert!(provider.calls().is_empty());
        }
    }

    #[tokio::test]
    async fn test_create_defaults_one_per_applicable_template() {
        let fixture = Fixture::new();
        fixture.set_alerting(true);
        let providers = fixture.add_providers(1);
        for id in ["tpl-1", "tpl-2", "tpl-3"] {
            fixture.mem.triggers.insert(api_template(id, ENV));
        }
        // Not applicable: another environment, another target, or not a template.
        fixture.mem.triggers.insert(api_template("tpl-prod", "prod"));
        let mut applications = api_template("tpl-app", ENV);
        applications.event_rules = vec![alert_models::EventRule::ApplicationCreate];
        fixture.mem.triggers.insert(applications);
        fixture.mem.triggers.insert(concrete_trigger("t-1", "api-1"));
        let engine = fixture.engine();

        let created = engine
            .templates
            .create_defaults(&fixture.ctx, ReferenceType::Api, "api-42")
            .await
            .unwrap();

        let mut template_ids: Vec<_> = created
            .iter()
            .map(|t| t.template_id.clone().unwrap())
            .collect();
        template_ids.sort();
        assert_eq!(vec!["tpl-1", "tpl-2", "tpl-3"], template_ids);
        assert!(created.iter().all(|t| t.reference_id == "api-42"));
        assert_eq!(3, providers[0].register_calls().len());
    }

    #[tokio::test]
    async fn test_create_defaults_tolerates_provider_failure() {
        let fixture = Fixture::new();
        fixture.set_alerting(true);
        let broken = Arc::new(RecordingProvider::failing("broken"));
        fixture.providers.connect(broken.clone());
        fixture.mem.triggers.insert(api_template("tpl-1", ENV));
        let engine = fixture.engine();

        let created = engine
            .templates
            .create_defaults(&fixture.ctx, ReferenceType::Api, "api-42")
            .await
            .unwrap();

        assert_eq!(1, created.len());
        assert_eq!(vec![created[0].id.clone()], broken.register_calls());
        // The trigger is kept even though registration failed.
        assert!(fixture.mem.triggers.get(&created[0].id).is_some());
    }

    #[tokio::test]
    async fn test_expansion_treats_conflict_as_applied() {
        let fixture = Fixture::new();
        fixture.set_alerting(true);
        let template = api_template("tpl-1", ENV);
        fixture.mem.triggers.insert(template.clone());
        let engine = fixture.engine();

        // Another expansion won the race after the index was built.
        let raced = template.instantiate("raced".to_string(), ReferenceType::Api, "api-42", Utc::now());
        fixture.mem.triggers.insert(raced);

        let created = engine
            .templates
            .expand(&template, ReferenceType::Api, "api-42", &Expanded::new())
            .await;
        assert_eq!(None, created);
        assert_eq!(1, fixture.mem.triggers.create_calls());
        assert_eq!(2, fixture.mem.triggers.all().len());
    }
}
