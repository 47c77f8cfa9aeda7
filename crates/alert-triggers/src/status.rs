use std::sync::Arc;

use alert_models::AlertStatus;

use crate::parameters::{Key, ParameterScope};
use crate::{Error, ExecutionContext, Result, Services};

/// Reports whether alerting is enabled, and guards the entry points which
/// require it to be.
#[derive(Clone)]
pub struct StatusAggregator {
    services: Arc<Services>,
}

impl StatusAggregator {
    pub fn new(services: Arc<Services>) -> Self {
        Self { services }
    }

    /// Returns the organization's alerting flag along with the number of
    /// providers available right now. The provider count is independent
    /// of the flag.
    pub async fn get_status(&self, ctx: &ExecutionContext) -> Result<AlertStatus> {
        let enabled = self.is_enabled(ctx).await?;
        let plugins = self.services.providers.find_all().len();
        Ok(AlertStatus { enabled, plugins })
    }

    pub async fn is_enabled(&self, ctx: &ExecutionContext) -> Result<bool> {
        let scope = ParameterScope::Organization(ctx.organization_id.clone());
        self.services
            .parameters
            .find_as_boolean(Key::AlertEnabled, &scope)
            .await
            .map_err(|err| {
                Error::technical(
                    format!(
                        "An error occurs while trying to read {} of organization {}",
                        Key::AlertEnabled,
                        ctx.organization_id
                    ),
                    err,
                )
            })
    }

    /// Fails with `Error::Unavailable` unless alerting is enabled for the organization.
    pub async fn ensure_enabled(&self, ctx: &ExecutionContext) -> Result<()> {
        if self.is_enabled(ctx).await? {
            Ok(())
        } else {
            tracing::debug!(organization_id = %ctx.organization_id, "alerting is disabled");
            Err(Error::Unavailable)
        }
    }

    /// Fails with `Error::Unavailable` unless alerting is enabled for the
    /// organization and at least one provider is connected to receive writes.
    pub async fn ensure_available(&self, ctx: &ExecutionContext) -> Result<()> {
        self.ensure_enabled(ctx).await?;

        if self.services.providers.find_all().is_empty() {
            tracing::warn!(organization_id = %ctx.organization_id, "no alert provider is connected");
            return Err(Error::Unavailable);
        }
        Ok(())
    }
}
