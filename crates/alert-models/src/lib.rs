//! Data types of the alert trigger catalog: trigger definitions and
//! templates, the events they emit, and status reporting.

mod events;
mod reference;
mod status;
mod trigger;

pub use events::{AlertEvent, EventCriteria, EventQuery, Page, Pageable};
pub use reference::{EventRule, ReferenceType, Scope};
pub use status::{AlertStatus, TriggerWithCounters};
pub use trigger::{
    Filter, FilterOperator, NewTrigger, Notification, Severity, TriggerDefinition, TriggerPatch,
};
