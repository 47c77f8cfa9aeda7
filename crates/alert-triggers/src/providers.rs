use std::sync::Arc;

use alert_models::TriggerDefinition;

/// A live connection to an alerting engine which evaluates registered triggers.
#[async_trait::async_trait]
pub trait TriggerProvider: Send + Sync {
    /// Name of the provider, used only for logging.
    fn name(&self) -> &str;

    /// Registers the trigger, replacing any prior registration of the same id.
    async fn register(&self, trigger: &TriggerDefinition) -> anyhow::Result<()>;

    async fn unregister(&self, trigger: &TriggerDefinition) -> anyhow::Result<()>;
}

/// Supplies the currently available provider connections. Connections come
/// and go at runtime, so callers must re-enumerate them for every broadcast.
pub trait ProviderRegistry: Send + Sync {
    fn find_all(&self) -> Vec<Arc<dyn TriggerProvider>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Broadcast {
    Register,
    Unregister,
}

impl std::fmt::Display for Broadcast {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Broadcast::Register => f.write_str("register"),
            Broadcast::Unregister => f.write_str("unregister"),
        }
    }
}

/// Outcome of a broadcast to all providers.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BroadcastReport {
    pub attempted: usize,
    pub failed: usize,
}

impl BroadcastReport {
    pub fn succeeded(&self) -> usize {
        self.attempted - self.failed
    }
}

/// Sends `action` for `trigger` to every provider of the registry, concurrently.
/// Each provider is called independently: a failure is logged and doesn't
/// prevent or fail the calls to the others.
pub async fn broadcast(
    registry: &dyn ProviderRegistry,
    action: Broadcast,
    trigger: &TriggerDefinition,
) -> BroadcastReport {
    let providers = registry.find_all();
    if providers.is_empty() {
        tracing::debug!(trigger_id = %trigger.id, %action, "no alert providers available, skipping broadcast");
        return BroadcastReport::default();
    }

    let calls = providers.iter().map(|provider| async move {
        let result = match action {
            Broadcast::Register => provider.register(trigger).await,
            Broadcast::Unregister => provider.unregister(trigger).await,
        };
        if let Err(error) = &result {
            tracing::warn!(
                provider = provider.name(),
                trigger_id = %trigger.id,
                %action,
                error = ?error,
                "alert provider call failed"
            );
        }
        result.is_ok()
    });
    let results = futures::future::join_all(calls).await;

    let report = BroadcastReport {
        attempted: results.len(),
        failed: results.iter().filter(|ok| !**ok).count(),
    };
    tracing::debug!(trigger_id = %trigger.id, %action, ?report, "broadcast to alert providers");
    report
}
