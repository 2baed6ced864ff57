use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Title shown when the server sends an event without one
pub const FALLBACK_TITLE: &str = "Upcoming Event";

/// Context line shown when an event has no description
pub const FALLBACK_CONTEXT: &str = "Calendar reminder";

// ============================================================================
// Calendar Events
// ============================================================================

/// Event as served by `GET /api/events`.
///
/// Every field is optional here so that one sloppy entry can be rejected on
/// its own instead of failing the whole list.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireEvent {
    #[serde(default)]
    pub id: Option<Value>,
    #[serde(default)]
    pub title: Option<Value>,
    #[serde(default)]
    pub start_date: Option<String>,
    #[serde(default)]
    pub description: Option<Value>,
}

/// Why a wire event was rejected
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EventParseError {
    #[error("event has no usable id")]
    MissingId,

    #[error("event {0} has no startDate")]
    MissingStart(String),

    #[error("event {id} has unparseable startDate {value:?}")]
    InvalidStart { id: String, value: String },
}

/// A validated calendar event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarEvent {
    pub id: String,
    pub title: String,
    pub start: DateTime<Utc>,
    pub description: Option<String>,
}

impl CalendarEvent {
    /// Description to show under the reminder, falling back to a generic line.
    pub fn context_message(&self) -> &str {
        self.description
            .as_deref()
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .unwrap_or(FALLBACK_CONTEXT)
    }
}

impl TryFrom<WireEvent> for CalendarEvent {
    type Error = EventParseError;

    fn try_from(wire: WireEvent) -> Result<Self, Self::Error> {
        let id = match wire.id {
            Some(Value::String(s)) if !s.trim().is_empty() => s.trim().to_string(),
            Some(Value::Number(n)) => n.to_string(),
            _ => return Err(EventParseError::MissingId),
        };

        let raw_start = wire
            .start_date
            .ok_or_else(|| EventParseError::MissingStart(id.clone()))?;
        let start = parse_start_date(&raw_start).ok_or_else(|| EventParseError::InvalidStart {
            id: id.clone(),
            value: raw_start.clone(),
        })?;

        let title = text_field(wire.title)
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| FALLBACK_TITLE.to_string());

        Ok(Self {
            id,
            title,
            start,
            description: text_field(wire.description),
        })
    }
}

/// Free-text fields fall back to their defaults when they are not strings.
fn text_field(value: Option<Value>) -> Option<String> {
    match value {
        Some(Value::String(s)) => Some(s),
        _ => None,
    }
}

/// Parse an ISO-8601 start timestamp.
///
/// Accepts RFC 3339 with an offset, a naive date-time (read as local time) and
/// a bare date (read as UTC midnight).
pub fn parse_start_date(input: &str) -> Option<DateTime<Utc>> {
    let input = input.trim();
    if input.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(input) {
        return Some(dt.with_timezone(&Utc));
    }

    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(input, format) {
            return Local
                .from_local_datetime(&naive)
                .earliest()
                .map(|dt| dt.with_timezone(&Utc));
        }
    }

    NaiveDate::parse_from_str(input, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Turn an events response body into validated events.
///
/// A body that is not a JSON array yields no events. Entries that fail to
/// decode or validate are logged and skipped.
pub fn parse_events(body: &Value) -> Vec<CalendarEvent> {
    let Some(items) = body.as_array() else {
        tracing::warn!("Events response is not an array, treating as empty");
        return Vec::new();
    };

    let mut events = Vec::with_capacity(items.len());
    for (index, item) in items.iter().enumerate() {
        let wire: WireEvent = match serde_json::from_value(item.clone()) {
            Ok(wire) => wire,
            Err(e) => {
                tracing::warn!("Skipping event #{}: {}", index, e);
                continue;
            }
        };

        match CalendarEvent::try_from(wire) {
            Ok(event) => events.push(event),
            Err(e) => tracing::warn!("Skipping event #{}: {}", index, e),
        }
    }

    events
}

// ============================================================================
// Notifications
// ============================================================================

/// Urgency tier for a reminder, serialized as the host's integer priority
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum NotificationPriority {
    Low,
    Normal,
    High,
}

impl NotificationPriority {
    pub fn as_int(self) -> i32 {
        match self {
            NotificationPriority::Low => 0,
            NotificationPriority::Normal => 1,
            NotificationPriority::High => 2,
        }
    }
}

impl Serialize for NotificationPriority {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i32(self.as_int())
    }
}

/// A reminder ready to be handed to the desktop
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: String,
    pub title: String,
    pub message: String,
    pub context_message: String,
    pub priority: NotificationPriority,
    pub require_interaction: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn test_parse_rfc3339_start() {
        let parsed = parse_start_date("2024-05-01T09:30:00+02:00").expect("should parse");
        assert_eq!(parsed, Utc.with_ymd_and_hms(2024, 5, 1, 7, 30, 0).unwrap());

        let zulu = parse_start_date("2024-05-01T09:30:00.250Z").expect("should parse");
        assert_eq!(zulu.timestamp_millis() % 1000, 250);
    }

    #[test]
    fn test_parse_date_only_is_utc_midnight() {
        let parsed = parse_start_date("2024-05-01").expect("should parse");
        assert_eq!(parsed, Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_parse_naive_datetime_is_accepted() {
        assert!(parse_start_date("2024-05-01T09:30:00").is_some());
        assert!(parse_start_date("2024-05-01T09:30").is_some());
    }

    #[test]
    fn test_parse_garbage_start_rejected() {
        assert!(parse_start_date("next tuesday").is_none());
        assert!(parse_start_date("").is_none());
        assert!(parse_start_date("2024-13-45").is_none());
    }

    #[test]
    fn test_numeric_id_and_missing_title() {
        let wire = WireEvent {
            id: Some(json!(42)),
            title: None,
            start_date: Some("2024-05-01T10:00:00Z".to_string()),
            description: None,
        };

        let event = CalendarEvent::try_from(wire).expect("should validate");
        assert_eq!(event.id, "42");
        assert_eq!(event.title, FALLBACK_TITLE);
        assert_eq!(event.context_message(), FALLBACK_CONTEXT);
    }

    #[test]
    fn test_missing_id_rejected() {
        let wire = WireEvent {
            id: Some(json!("  ")),
            title: Some(json!("Standup")),
            start_date: Some("2024-05-01T10:00:00Z".to_string()),
            description: None,
        };

        assert_eq!(
            CalendarEvent::try_from(wire),
            Err(EventParseError::MissingId)
        );
    }

    #[test]
    fn test_parse_events_skips_bad_entries() {
        let body = json!([
            {"id": "a", "title": "Good", "startDate": "2024-05-01T10:00:00Z"},
            {"id": "b", "title": "Bad date", "startDate": "soon"},
            {"title": "No id", "startDate": "2024-05-01T10:00:00Z"},
            {"id": "c", "title": 17, "startDate": "2024-05-01T10:00:00Z"},
            "not an object",
            {
                "id": "d",
                "title": "Also good",
                "startDate": "2024-05-01T11:00:00Z",
                "description": "Room 4"
            }
        ]);

        let events = parse_events(&body);
        let ids: Vec<&str> = events.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "c", "d"]);
        assert_eq!(events[1].title, FALLBACK_TITLE);
        assert_eq!(events[2].context_message(), "Room 4");
    }

    #[test]
    fn test_non_string_text_fields_fall_back() {
        let body = json!([
            {"id": "n", "title": 17, "startDate": "2024-05-01T10:00:00Z", "description": ["x"]},
            {"id": "o", "title": {"en": "Standup"}, "startDate": "2024-05-01T10:00:00Z"},
            {"id": "p", "title": null, "startDate": "2024-05-01T10:00:00Z", "description": false}
        ]);

        let events = parse_events(&body);
        assert_eq!(events.len(), 3);
        for event in &events {
            assert_eq!(event.title, FALLBACK_TITLE);
            assert_eq!(event.description, None);
            assert_eq!(event.context_message(), FALLBACK_CONTEXT);
        }
    }

    #[test]
    fn test_parse_events_non_array_is_empty() {
        assert!(parse_events(&json!({"events": []})).is_empty());
        assert!(parse_events(&json!(null)).is_empty());
    }

    #[test]
    fn test_notification_priority_serializes_as_int() {
        let notification = Notification {
            id: "event-a-15".to_string(),
            title: "Standup".to_string(),
            message: "Starting in 15 minutes".to_string(),
            context_message: FALLBACK_CONTEXT.to_string(),
            priority: NotificationPriority::High,
            require_interaction: true,
        };

        let value = serde_json::to_value(&notification).expect("should serialize");
        assert_eq!(value["priority"], json!(2));
        assert_eq!(value["requireInteraction"], json!(true));
        assert_eq!(value["contextMessage"], json!(FALLBACK_CONTEXT));
    }
}
