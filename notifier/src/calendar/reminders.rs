//! Deciding which reminders are due and what they say.
//!
//! Everything here is a pure function of its inputs except [`SentLedger`],
//! which the poller owns and carries between polls.

use chrono::{DateTime, Utc};
use shared::{CalendarEvent, Notification, NotificationPriority};
use std::collections::{HashMap, HashSet};
use std::time::Duration;

use crate::config::WindowMatch;

/// One reminder that should fire for an event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DueReminder {
    pub event: CalendarEvent,
    pub window: u32,
    pub minutes_until: i64,
}

impl DueReminder {
    pub fn key(&self) -> (String, u32) {
        (self.event.id.clone(), self.window)
    }
}

const MINUTE_MS: i64 = 60_000;

/// Extra lower-bound width in range mode, so a late tick cannot jump a window
const RANGE_SLACK_MS: i64 = MINUTE_MS;

/// How reminder windows are matched, plus the poll length needed for ranges
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Matching {
    pub mode: WindowMatch,
    pub poll_ms: i64,
}

impl Matching {
    pub fn exact() -> Self {
        Self {
            mode: WindowMatch::Exact,
            poll_ms: 0,
        }
    }

    pub fn range(poll: Duration) -> Self {
        let poll_ms = i64::try_from(poll.as_millis()).unwrap_or(i64::MAX);
        Self {
            mode: WindowMatch::Range,
            poll_ms: poll_ms.max(1),
        }
    }

    /// `ms_until` is the exact distance to the event start.
    ///
    /// Range mode accepts `w - poll - 1min < ms_until <= w`, measured in
    /// milliseconds. Windows may overlap consecutive polls; the ledger keeps
    /// them from firing twice.
    fn matches(&self, ms_until: i64, window: u32) -> bool {
        let window_ms = i64::from(window) * MINUTE_MS;
        match self.mode {
            WindowMatch::Exact => ms_until.div_euclid(MINUTE_MS) == i64::from(window),
            WindowMatch::Range => {
                let lower = window_ms
                    .saturating_sub(self.poll_ms)
                    .saturating_sub(RANGE_SLACK_MS);
                lower < ms_until && ms_until <= window_ms
            }
        }
    }
}

/// Whole minutes from `now` until `start`, rounded down.
pub fn minutes_until(start: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    (start - now).num_milliseconds().div_euclid(MINUTE_MS)
}

/// Compute the reminders due at `now`.
///
/// Each `(event id, window)` pair appears at most once even when the input
/// repeats an event.
pub fn due_reminders(
    events: &[CalendarEvent],
    now: DateTime<Utc>,
    windows: &[u32],
    matching: Matching,
) -> Vec<DueReminder> {
    let mut seen: HashSet<(&str, u32)> = HashSet::new();
    let mut due = Vec::new();

    for event in events {
        let ms_until = (event.start - now).num_milliseconds();
        let minutes = ms_until.div_euclid(MINUTE_MS);

        for &window in windows {
            if !matching.matches(ms_until, window) {
                continue;
            }
            if !seen.insert((event.id.as_str(), window)) {
                tracing::debug!("Duplicate reminder {}/{} dropped", event.id, window);
                continue;
            }
            due.push(DueReminder {
                event: event.clone(),
                window,
                minutes_until: minutes,
            });
        }
    }

    due
}

/// Body line for a reminder window
pub fn reminder_message(window: u32) -> String {
    if window == 60 {
        "Starting in 1 hour".to_string()
    } else {
        format!("Starting in {} minutes", window)
    }
}

pub fn priority_for_window(window: u32) -> NotificationPriority {
    match window {
        0..=15 => NotificationPriority::High,
        16..=30 => NotificationPriority::Normal,
        _ => NotificationPriority::Low,
    }
}

/// Notification id, stable for a given event and window
pub fn notification_id(event_id: &str, window: u32) -> String {
    format!("event-{}-{}", event_id, window)
}

pub fn build_notification(reminder: &DueReminder) -> Notification {
    let priority = priority_for_window(reminder.window);

    Notification {
        id: notification_id(&reminder.event.id, reminder.window),
        title: reminder.event.title.clone(),
        message: reminder_message(reminder.window),
        context_message: reminder.event.context_message().to_string(),
        priority,
        require_interaction: priority == NotificationPriority::High,
    }
}

/// Reminders already emitted in earlier polls.
///
/// Entries remember the event start so they can be dropped once the event
/// has begun. A rescheduled event gets a fresh start and fires again.
#[derive(Debug, Default)]
pub struct SentLedger {
    sent: HashMap<(String, u32), DateTime<Utc>>,
}

impl SentLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, reminder: &DueReminder) -> bool {
        self.sent.get(&reminder.key()) == Some(&reminder.event.start)
    }

    pub fn record(&mut self, reminder: &DueReminder) {
        self.sent.insert(reminder.key(), reminder.event.start);
    }

    /// Forget reminders for events that have already started.
    pub fn prune(&mut self, now: DateTime<Utc>) {
        self.sent.retain(|_, start| *start > now);
    }

    pub fn len(&self) -> usize {
        self.sent.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sent.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use std::time::Duration as StdDuration;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 4, 9, 0, 0).unwrap()
    }

    fn event(id: &str, starts_in: Duration) -> CalendarEvent {
        CalendarEvent {
            id: id.to_string(),
            title: format!("Event {}", id),
            start: now() + starts_in,
            description: None,
        }
    }

    const WINDOWS: [u32; 3] = [15, 30, 60];

    #[test]
    fn test_minutes_until_floors() {
        assert_eq!(minutes_until(now() + Duration::seconds(15 * 60 + 59), now()), 15);
        assert_eq!(minutes_until(now() + Duration::seconds(15 * 60), now()), 15);
        assert_eq!(minutes_until(now() + Duration::seconds(14 * 60 + 59), now()), 14);
        assert_eq!(minutes_until(now() - Duration::seconds(1), now()), -1);
    }

    #[test]
    fn test_exact_window_match() {
        let events = vec![
            event("exact", Duration::minutes(15)),
            event("early", Duration::minutes(16)),
            event("late", Duration::minutes(14)),
        ];

        let due = due_reminders(&events, now(), &WINDOWS, Matching::exact());
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].event.id, "exact");
        assert_eq!(due[0].window, 15);

        let notification = build_notification(&due[0]);
        assert_eq!(notification.message, "Starting in 15 minutes");
        assert_eq!(notification.id, "event-exact-15");
    }

    #[test]
    fn test_duplicate_events_emit_once_per_window() {
        let events = vec![
            event("dup", Duration::minutes(30)),
            event("dup", Duration::minutes(30)),
            event("other", Duration::minutes(60)),
        ];

        let due = due_reminders(&events, now(), &WINDOWS, Matching::exact());
        let keys: Vec<(String, u32)> = due.iter().map(DueReminder::key).collect();
        assert_eq!(
            keys,
            vec![("dup".to_string(), 30), ("other".to_string(), 60)]
        );
    }

    #[test]
    fn test_due_reminders_is_idempotent() {
        let events = vec![
            event("a", Duration::minutes(15)),
            event("b", Duration::minutes(60)),
            event("c", Duration::minutes(45)),
        ];

        let first = due_reminders(&events, now(), &WINDOWS, Matching::exact());
        let second = due_reminders(&events, now(), &WINDOWS, Matching::exact());
        assert_eq!(first, second);
        assert_eq!(first.len(), 2);
    }

    #[test]
    fn test_range_match_covers_poll_interval() {
        let matching = Matching::range(StdDuration::from_secs(300));
        let hits: Vec<i64> = (8..=20)
            .filter(|m| {
                !due_reminders(
                    &[event("r", Duration::minutes(*m))],
                    now(),
                    &[15],
                    matching,
                )
                .is_empty()
            })
            .collect();
        assert_eq!(hits, vec![10, 11, 12, 13, 14, 15]);
    }

    #[test]
    fn test_range_window_survives_late_tick() {
        // Starts 16m00.1s after the first poll; the second tick runs 200ms late.
        let start = Duration::minutes(16) + Duration::milliseconds(100);
        let events = vec![event("late-tick", start)];
        let matching = Matching::range(StdDuration::from_secs(300));
        let polls = [
            now(),
            now() + Duration::minutes(5) + Duration::milliseconds(200),
            now() + Duration::minutes(10),
        ];

        let mut ledger = SentLedger::new();
        let mut fired = Vec::new();
        for poll in polls {
            ledger.prune(poll);
            for reminder in due_reminders(&events, poll, &[15], matching) {
                if !ledger.contains(&reminder) {
                    ledger.record(&reminder);
                    fired.push((reminder.window, reminder.minutes_until));
                }
            }
        }

        assert_eq!(fired, vec![(15, 10)]);
    }

    #[test]
    fn test_range_window_fires_once_with_drifting_polls() {
        let events = vec![event("drift", Duration::minutes(31))];
        let matching = Matching::range(StdDuration::from_secs(300));

        let mut ledger = SentLedger::new();
        let mut fired = Vec::new();
        let mut poll = now();
        for jitter_ms in [0, 350, 120, 900, 40, 600, 10] {
            poll = poll + Duration::minutes(5) + Duration::milliseconds(jitter_ms);
            ledger.prune(poll);
            for reminder in due_reminders(&events, poll, &WINDOWS, matching) {
                if !ledger.contains(&reminder) {
                    ledger.record(&reminder);
                    fired.push(reminder.window);
                }
            }
        }

        assert_eq!(fired, vec![30, 15]);
    }

    #[test]
    fn test_messages_and_priorities() {
        assert_eq!(reminder_message(60), "Starting in 1 hour");
        assert_eq!(reminder_message(30), "Starting in 30 minutes");

        let low = build_notification(&DueReminder {
            event: event("x", Duration::minutes(60)),
            window: 60,
            minutes_until: 60,
        });
        assert_eq!(low.priority, NotificationPriority::Low);
        assert!(!low.require_interaction);
        assert_eq!(low.context_message, shared::models::FALLBACK_CONTEXT);

        let normal = build_notification(&DueReminder {
            event: event("x", Duration::minutes(30)),
            window: 30,
            minutes_until: 30,
        });
        assert_eq!(normal.priority, NotificationPriority::Normal);

        let mut urgent_event = event("x", Duration::minutes(5));
        urgent_event.description = Some("Bring slides".to_string());
        let high = build_notification(&DueReminder {
            event: urgent_event,
            window: 5,
            minutes_until: 5,
        });
        assert_eq!(high.priority, NotificationPriority::High);
        assert!(high.require_interaction);
        assert_eq!(high.context_message, "Bring slides");
    }

    #[test]
    fn test_ledger_tracks_and_prunes() {
        let reminder = DueReminder {
            event: event("l", Duration::minutes(15)),
            window: 15,
            minutes_until: 15,
        };

        let mut ledger = SentLedger::new();
        assert!(!ledger.contains(&reminder));
        ledger.record(&reminder);
        assert!(ledger.contains(&reminder));

        let mut moved = reminder.clone();
        moved.event.start = moved.event.start + Duration::hours(1);
        assert!(!ledger.contains(&moved));

        ledger.prune(now() + Duration::minutes(10));
        assert_eq!(ledger.len(), 1);
        ledger.prune(now() + Duration::minutes(15));
        assert!(ledger.is_empty());
    }
}
