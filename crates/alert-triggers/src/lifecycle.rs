use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use alert_models::{
    AlertEvent, EventCriteria, EventQuery, NewTrigger, Page, Pageable, ReferenceType,
    TriggerDefinition, TriggerPatch, TriggerWithCounters,
};
use chrono::{DateTime, TimeZone, Utc};

use crate::decorate;
use crate::properties;
use crate::providers::{broadcast, Broadcast, BroadcastReport};
use crate::references::Metadata;
use crate::store::StoreError;
use crate::{Error, ExecutionContext, Result, Services, StatusAggregator};

/// Command sent by a provider when one of our triggers fired.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationCommand {
    pub trigger_id: String,
    /// Time of the occurrence, in milliseconds since the Unix epoch.
    pub timestamp: i64,
    pub message: String,
}

/// LifecycleManager creates, reads, updates, and deletes concrete triggers,
/// and keeps providers in sync with every write.
#[derive(Clone)]
pub struct LifecycleManager {
    services: Arc<Services>,
    status: StatusAggregator,
}

impl LifecycleManager {
    pub fn new(services: Arc<Services>, status: StatusAggregator) -> Self {
        Self { services, status }
    }

    pub(crate) fn services(&self) -> &Services {
        &self.services
    }

    pub(crate) fn status(&self) -> &StatusAggregator {
        &self.status
    }

    pub async fn find_by_id(&self, id: &str) -> Result<TriggerDefinition> {
        self.services
            .triggers
            .find_by_id(id)
            .await
            .map_err(|err| Error::technical(format!("failed to find alert trigger {id}"), err))?
            .ok_or_else(|| Error::not_found(id))
    }

    pub async fn find_all(&self) -> Result<Vec<TriggerDefinition>> {
        self.services
            .triggers
            .find_all()
            .await
            .map_err(|err| Error::technical("failed to list all alert triggers", err))
    }

    pub async fn find_by_reference(
        &self,
        reference_type: ReferenceType,
        reference_id: &str,
    ) -> Result<Vec<TriggerDefinition>> {
        self.services
            .triggers
            .find_by_reference(reference_type, reference_id)
            .await
            .map_err(|err| {
                Error::technical(
                    format!("failed to list alert triggers of {reference_type}/{reference_id}"),
                    err,
                )
            })
    }

    pub async fn find_by_references(
        &self,
        reference_type: ReferenceType,
        reference_ids: &[String],
    ) -> Result<Vec<TriggerDefinition>> {
        self.services
            .triggers
            .find_by_references(reference_type, reference_ids)
            .await
            .map_err(|err| {
                Error::technical(
                    format!("failed to list alert triggers of {reference_type}/{reference_ids:?}"),
                    err,
                )
            })
    }

    /// Lists the triggers of a reference, each annotated with its latest event
    /// and its event counts over the configured windows ending at `now`.
    /// Triggers are ordered by name.
    pub async fn find_by_reference_with_event_counts(
        &self,
        reference_type: ReferenceType,
        reference_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<TriggerWithCounters>> {
        let triggers = self.find_by_reference(reference_type, reference_id).await?;

        let mut out = Vec::with_capacity(triggers.len());
        for trigger in triggers {
            out.push(self.with_counters(trigger, now).await?);
        }
        out.sort_by(|l, r| l.trigger.name.cmp(&r.trigger.name));
        Ok(out)
    }

    async fn with_counters(
        &self,
        trigger: TriggerDefinition,
        now: DateTime<Utc>,
    ) -> Result<TriggerWithCounters> {
        let events = &self.services.events;
        let technical = |err: StoreError| {
            Error::technical(format!("failed to count events of alert trigger {}", trigger.id), err)
        };

        let last = events
            .search(
                &EventCriteria {
                    trigger_id: trigger.id.clone(),
                    from: None,
                    to: None,
                },
                Pageable {
                    page_number: 0,
                    page_size: 1,
                },
            )
            .await
            .map_err(technical)?
            .content
            .into_iter()
            .next();

        // Windows are counted concurrently.
        let counts = self.services.config.counter_windows.iter().map(|window| {
            let criteria = EventCriteria {
                trigger_id: trigger.id.clone(),
                from: chrono::Duration::from_std(window.period)
                    .ok()
                    .and_then(|period| now.checked_sub_signed(period)),
                to: Some(now),
            };
            async move {
                let count = events.count(&criteria).await?;
                Ok::<_, StoreError>((window.label.clone(), count))
            }
        });
        let counters: BTreeMap<String, u64> = futures::future::try_join_all(counts)
            .await
            .map_err(technical)?
            .into_iter()
            .collect();

        Ok(TriggerWithCounters {
            last_alert_at: last.as_ref().map(|e| e.created_at),
            last_alert_message: last.map(|e| e.message),
            counters,
            trigger,
        })
    }

    /// Creates a trigger in the caller's scope. An enabled, concrete trigger
    /// is registered with every available provider.
    #[tracing::instrument(skip_all, fields(name = %new.name, reference_type = %new.reference_type, reference_id = %new.reference_id))]
    pub async fn create(&self, ctx: &ExecutionContext, new: NewTrigger) -> Result<TriggerDefinition> {
        self.status.ensure_available(ctx).await?;

        let NewTrigger {
            name,
            description,
            reference_type,
            reference_id,
            source,
            severity,
            enabled,
            template,
            event_rules,
            conditions,
            filters,
            notifications,
        } = new;
        let now = Utc::now();

        let trigger = TriggerDefinition {
            id: new_id(),
            name,
            description,
            reference_type,
            reference_id,
            environment_id: ctx.environment_id.clone(),
            organization_id: Some(ctx.organization_id.clone()),
            source,
            severity,
            enabled,
            template,
            template_id: None,
            event_rules,
            conditions,
            filters,
            notifications,
            created_at: now,
            updated_at: now,
        };

        let created = self
            .persist_and_register(trigger)
            .await
            .map_err(|err| Error::technical("failed to create alert trigger", err))?;
        tracing::info!(id = %created.id, template = created.template, "created alert trigger");
        Ok(created)
    }

    /// Persists a new trigger, and then registers it with providers if it's
    /// registrable. The store error is returned as-is, so that callers can
    /// distinguish conflicts.
    pub(crate) async fn persist_and_register(
        &self,
        trigger: TriggerDefinition,
    ) -> std::result::Result<TriggerDefinition, StoreError> {
        let created = self.services.triggers.create(trigger).await?;

        if created.is_registrable() {
            self.register(&created).await;
        }
        Ok(created)
    }

    /// Updates the mutable fields of a trigger owned by `expected_reference_id`.
    /// Providers which held the previous definition are told to drop it before
    /// being handed the new one.
    ///
    /// A trigger owned by another reference is reported as not found.
    #[tracing::instrument(skip_all, fields(%id, %expected_reference_id))]
    pub async fn update(
        &self,
        ctx: &ExecutionContext,
        id: &str,
        expected_reference_id: &str,
        patch: TriggerPatch,
    ) -> Result<TriggerDefinition> {
        self.status.ensure_available(ctx).await?;

        let current = self.find_by_id(id).await?;
        if current.reference_id != expected_reference_id {
            tracing::warn!(actual = %current.reference_id, "alert trigger reference mismatch");
            return Err(Error::not_found(id));
        }

        let mut next = current.clone();
        next.apply(patch, Utc::now());

        let updated = self
            .services
            .triggers
            .update(next)
            .await
            .map_err(|err| Error::technical(format!("failed to update alert trigger {id}"), err))?;

        if current.is_registrable() {
            self.unregister(&current).await;
        }
        if updated.is_registrable() {
            self.register(&updated).await;
        }
        tracing::info!(enabled = updated.enabled, "updated alert trigger");
        Ok(updated)
    }

    /// Deletes a trigger owned by `expected_reference_id`, along with all of
    /// its events, and unregisters it from every provider.
    ///
    /// A trigger owned by another reference is reported as not found, and
    /// left untouched.
    #[tracing::instrument(skip_all, fields(%id, %expected_reference_id))]
    pub async fn delete(&self, id: &str, expected_reference_id: &str) -> Result<()> {
        let found = self
            .services
            .triggers
            .find_by_id(id)
            .await
            .map_err(|err| Error::technical(format!("failed to find alert trigger {id}"), err))?;

        let Some(mut trigger) = found.filter(|t| t.reference_id == expected_reference_id) else {
            return Err(Error::not_found(id));
        };

        self.services.events.delete_all(id).await.map_err(|err| {
            Error::technical(format!("failed to delete the events of alert trigger {id}"), err)
        })?;

        if let Err(err) = self.services.triggers.delete(id).await {
            return Err(Error::technical(
                format!(
                    "deleted the events of alert trigger {id}, but failed to delete the trigger itself"
                ),
                err,
            ));
        }

        trigger.enabled = false;
        let report = self.unregister(&trigger).await;
        tracing::info!(?report, "deleted alert trigger");
        Ok(())
    }

    /// Returns a page of the events of a trigger, most recent first.
    pub async fn find_events(&self, trigger_id: &str, query: EventQuery) -> Result<Page<AlertEvent>> {
        let page = self
            .services
            .events
            .search(
                &EventCriteria {
                    trigger_id: trigger_id.to_string(),
                    from: query.from,
                    to: query.to,
                },
                Pageable {
                    page_number: query.page_number,
                    page_size: query.page_size,
                },
            )
            .await
            .map_err(|err| {
                Error::technical(format!("failed to search events of alert trigger {trigger_id}"), err)
            })?;

        if page.page_elements == 0 {
            return Ok(Page::empty());
        }
        Ok(page)
    }

    /// Pushes every concrete trigger to the current providers: enabled
    /// triggers are registered and disabled ones unregistered. Run when a
    /// provider (re)connects, or by a periodic reconciliation.
    /// Returns the number of triggers pushed.
    #[tracing::instrument(skip_all)]
    pub async fn synchronize(&self) -> Result<usize> {
        tracing::info!("synchronizing alert triggers with alerting providers");

        let mut pushed = 0;
        for trigger in self.find_all().await? {
            if trigger.template {
                continue;
            }
            if trigger.enabled {
                self.register(&trigger).await;
            } else {
                self.unregister(&trigger).await;
            }
            pushed += 1;
        }

        tracing::info!(%pushed, "alert triggers synchronized with alerting providers");
        Ok(pushed)
    }

    /// Records the event of a trigger which a provider reported as fired.
    #[tracing::instrument(skip_all, fields(trigger_id = %command.trigger_id))]
    pub async fn record_notification(&self, command: NotificationCommand) -> Result<AlertEvent> {
        let NotificationCommand {
            trigger_id,
            timestamp,
            message,
        } = command;

        let created_at = match Utc.timestamp_millis_opt(timestamp).single() {
            Some(ts) => ts,
            None => {
                tracing::warn!(%timestamp, "invalid notification timestamp, using the current time");
                Utc::now()
            }
        };
        let event = AlertEvent {
            id: new_id(),
            trigger_id,
            message,
            created_at,
        };

        self.services.events.create(event).await.map_err(|err| {
            Error::technical("failed to create an alert event from a notification", err)
        })
    }

    /// Answers a provider's request for the metadata of the entities named
    /// by its `properties` (`api`, `application`, `plan` ids).
    #[tracing::instrument(skip_all, fields(properties = properties.len()))]
    pub async fn resolve_properties(
        &self,
        properties: &HashMap<String, String>,
    ) -> HashMap<String, Metadata> {
        properties::resolve(self.services.references.as_ref(), properties).await
    }

    async fn register(&self, trigger: &TriggerDefinition) -> BroadcastReport {
        let decorated = decorate::for_registration(
            trigger,
            &self.services.config,
            self.services.parameters.as_ref(),
        )
        .await;
        broadcast(
            self.services.providers.as_ref(),
            Broadcast::Register,
            &decorated,
        )
        .await
    }

    async fn unregister(&self, trigger: &TriggerDefinition) -> BroadcastReport {
        broadcast(
            self.services.providers.as_ref(),
            Broadcast::Unregister,
            trigger,
        )
        .await
    }
}

pub(crate) fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
