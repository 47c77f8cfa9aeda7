use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::TriggerDefinition;

/// Whether alerting is enabled, and how many providers are currently reachable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertStatus {
    pub enabled: bool,
    pub plugins: usize,
}

/// A trigger annotated with its most recent event and with event counts
/// over recent time windows, keyed by window label (e.g. "5m", "1d").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerWithCounters {
    #[serde(flatten)]
    pub trigger: TriggerDefinition,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_alert_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_alert_message: Option<String>,
    pub counters: BTreeMap<String, u64>,
}
