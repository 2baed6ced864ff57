use anyhow::Result;
use chrono::{DateTime, Utc};
use shared::CalendarEvent;
use std::fmt;
use std::sync::{Arc, RwLock};

use super::client::{CalendarClient, EventsResponse};
use super::reminders::{build_notification, due_reminders, Matching, SentLedger};
use crate::config::{NotifierConfig, WindowMatch};
use crate::error::FetchError;
use crate::host::NotificationHost;
use crate::locator::ServerLocator;

/// The calendar server currently in use, shared with whoever needs to read it.
///
/// Only the notifier writes to it.
#[derive(Debug, Clone, Default)]
pub struct ActiveEndpoint {
    inner: Arc<RwLock<Option<String>>>,
}

impl ActiveEndpoint {
    pub fn get(&self) -> Option<String> {
        match self.inner.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn set(&self, base: String) {
        match self.inner.write() {
            Ok(mut guard) => *guard = Some(base),
            Err(poisoned) => *poisoned.into_inner() = Some(base),
        }
    }

    pub fn clear(&self) {
        match self.inner.write() {
            Ok(mut guard) => *guard = None,
            Err(poisoned) => *poisoned.into_inner() = None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleState {
    Idle,
    Discovering,
    Fetching,
    Processing,
}

impl fmt::Display for CycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CycleState::Idle => "idle",
            CycleState::Discovering => "discovering",
            CycleState::Fetching => "fetching",
            CycleState::Processing => "processing",
        };
        f.write_str(name)
    }
}

/// What a single processing pass ended with
#[derive(Debug)]
pub enum CycleOutcome {
    /// No candidate answered; nothing was fetched
    NoEndpoint,
    /// Server wants a login; endpoint kept
    Unauthenticated,
    /// Endpoint dropped, next pass rediscovers
    EndpointLost(FetchError),
    /// Request failed but the endpoint is still considered good
    Failed(FetchError),
    Processed { events: usize, emitted: usize },
}

/// Polls the calendar server and turns upcoming events into reminders.
pub struct EventNotifier {
    config: NotifierConfig,
    locator: ServerLocator,
    client: CalendarClient,
    host: Arc<dyn NotificationHost>,
    endpoint: ActiveEndpoint,
    state: CycleState,
    ledger: SentLedger,
}

impl EventNotifier {
    pub fn new(config: NotifierConfig, host: Arc<dyn NotificationHost>) -> Result<Self> {
        let client = CalendarClient::new(config.fetch_timeout)?;
        Ok(Self::with_client(config, client, host))
    }

    pub fn with_client(
        config: NotifierConfig,
        client: CalendarClient,
        host: Arc<dyn NotificationHost>,
    ) -> Self {
        let locator = ServerLocator::new(client.clone(), config.probe_timeout);
        Self {
            config,
            locator,
            client,
            host,
            endpoint: ActiveEndpoint::default(),
            state: CycleState::Idle,
            ledger: SentLedger::new(),
        }
    }

    /// Use an endpoint handle created elsewhere, e.g. one already shared with
    /// a click handler.
    pub fn with_endpoint(mut self, endpoint: ActiveEndpoint) -> Self {
        self.endpoint = endpoint;
        self
    }

    /// Handle to the active endpoint, for readers outside the poll loop
    pub fn active_endpoint(&self) -> ActiveEndpoint {
        self.endpoint.clone()
    }

    pub fn state(&self) -> CycleState {
        self.state
    }

    pub fn config(&self) -> &NotifierConfig {
        &self.config
    }

    fn transition(&mut self, next: CycleState) {
        tracing::debug!("Notifier {} -> {}", self.state, next);
        self.state = next;
    }

    /// Return the active endpoint, running discovery first if there is none.
    pub async fn ensure_endpoint(&mut self) -> Option<String> {
        if let Some(base) = self.endpoint.get() {
            return Some(base);
        }

        self.transition(CycleState::Discovering);
        let found = self.locator.discover(&self.config.server_urls).await;
        if let Some(base) = &found {
            self.endpoint.set(base.clone());
        }
        found
    }

    /// Run one processing pass: discover, fetch, filter, notify.
    pub async fn run_cycle(&mut self, now: DateTime<Utc>) -> CycleOutcome {
        let outcome = self.cycle(now).await;
        self.transition(CycleState::Idle);
        outcome
    }

    async fn cycle(&mut self, now: DateTime<Utc>) -> CycleOutcome {
        let Some(base) = self.ensure_endpoint().await else {
            tracing::warn!("No calendar server available, skipping this cycle");
            return CycleOutcome::NoEndpoint;
        };

        self.transition(CycleState::Fetching);
        match self.client.fetch_events(&base).await {
            Ok(EventsResponse::Unauthenticated) => {
                tracing::info!("Not signed in to {}, nothing to do", base);
                CycleOutcome::Unauthenticated
            }
            Ok(EventsResponse::Events(events)) => {
                self.transition(CycleState::Processing);
                let emitted = self.process(&events, now).await;
                tracing::debug!(
                    "Processed {} events from {}, {} reminders sent",
                    events.len(),
                    base,
                    emitted
                );
                CycleOutcome::Processed {
                    events: events.len(),
                    emitted,
                }
            }
            Err(e) if e.drops_endpoint() => {
                tracing::warn!("Lost calendar server {}: {}", base, e);
                self.endpoint.clear();
                CycleOutcome::EndpointLost(e)
            }
            Err(e) => {
                tracing::warn!("Fetching events failed: {}", e);
                CycleOutcome::Failed(e)
            }
        }
    }

    async fn process(&mut self, events: &[CalendarEvent], now: DateTime<Utc>) -> usize {
        let matching = match self.config.window_match {
            WindowMatch::Exact => Matching::exact(),
            WindowMatch::Range => Matching::range(self.config.poll_interval),
        };
        let use_ledger = matching.mode == WindowMatch::Range;
        if use_ledger {
            self.ledger.prune(now);
        }

        let mut emitted = 0;
        for reminder in due_reminders(events, now, &self.config.windows, matching) {
            if use_ledger && self.ledger.contains(&reminder) {
                tracing::debug!(
                    "Reminder {}/{} already sent",
                    reminder.event.id,
                    reminder.window
                );
                continue;
            }

            let notification = build_notification(&reminder);
            match self.host.create(&notification.id, &notification).await {
                Ok(()) => {
                    tracing::info!(
                        "Reminder sent: {:?} ({}-minute window, starts in {} minutes)",
                        reminder.event.title,
                        reminder.window,
                        reminder.minutes_until
                    );
                    emitted += 1;
                    if use_ledger {
                        self.ledger.record(&reminder);
                    }
                }
                Err(e) => {
                    tracing::error!("Reminder {} not shown: {}", notification.id, e);
                }
            }
        }

        emitted
    }
}
