use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An occurrence of a trigger, recorded when a provider notifies us that
/// the trigger fired. Events are never updated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertEvent {
    pub id: String,
    pub trigger_id: String,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

/// Criteria for searching and counting the events of one trigger.
/// Unset bounds are unbounded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventCriteria {
    pub trigger_id: String,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

impl EventCriteria {
    pub fn matches(&self, event: &AlertEvent) -> bool {
        event.trigger_id == self.trigger_id
            && self.from.map_or(true, |from| event.created_at >= from)
            && self.to.map_or(true, |to| event.created_at <= to)
    }
}

/// Zero-based page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pageable {
    pub page_number: u32,
    pub page_size: u32,
}

/// A caller's query over the events of a trigger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventQuery {
    #[serde(default)]
    pub from: Option<DateTime<Utc>>,
    #[serde(default)]
    pub to: Option<DateTime<Utc>>,
    #[serde(default)]
    pub page_number: u32,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

fn default_page_size() -> u32 {
    10
}

impl Default for EventQuery {
    fn default() -> Self {
        Self {
            from: None,
            to: None,
            page_number: 0,
            page_size: default_page_size(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page<T> {
    pub content: Vec<T>,
    pub page_number: u32,
    pub page_elements: u32,
    pub total_elements: u64,
}

impl<T> Page<T> {
    pub fn empty() -> Self {
        Self {
            content: Vec::new(),
            page_number: 1,
            page_elements: 0,
            total_elements: 0,
        }
    }

    pub fn map<U, F: FnMut(T) -> U>(self, f: F) -> Page<U> {
        Page {
            content: self.content.into_iter().map(f).collect(),
            page_number: self.page_number,
            page_elements: self.page_elements,
            total_elements: self.total_elements,
        }
    }
}
