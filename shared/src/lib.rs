//! Types shared between the notifier service and anything that talks to the
//! calendar server: wire formats, parsed events and notification payloads.

pub mod api;
pub mod models;

pub use models::{
    parse_events, CalendarEvent, EventParseError, Notification, NotificationPriority, WireEvent,
};
