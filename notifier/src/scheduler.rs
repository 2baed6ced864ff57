use chrono::Utc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{self, Instant, MissedTickBehavior};

use crate::calendar::{CycleOutcome, EventNotifier};
use crate::config::NotifierConfig;

pub const REMINDER_ALARM: &str = "calendar-reminders";

/// A named recurring timer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alarm {
    pub name: &'static str,
    pub initial_delay: Duration,
    pub period: Duration,
}

impl Alarm {
    pub fn reminders(config: &NotifierConfig) -> Self {
        Self {
            name: REMINDER_ALARM,
            initial_delay: config.initial_delay,
            period: config.poll_interval,
        }
    }
}

/// Drives the notifier from an alarm until shutdown is signalled.
pub struct PollingScheduler {
    notifier: EventNotifier,
    alarm: Alarm,
}

impl PollingScheduler {
    pub fn new(notifier: EventNotifier) -> Self {
        let alarm = Alarm::reminders(notifier.config());
        Self { notifier, alarm }
    }

    pub fn with_alarm(notifier: EventNotifier, alarm: Alarm) -> Self {
        Self { notifier, alarm }
    }

    /// Run cycles on every tick. A cycle always finishes before the next tick
    /// is taken, so passes never overlap.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> EventNotifier {
        let start = Instant::now() + self.alarm.initial_delay;
        let mut ticker = time::interval_at(start, self.alarm.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(
            "Alarm {:?} armed (first in {:?}, every {:?})",
            self.alarm.name,
            self.alarm.initial_delay,
            self.alarm.period
        );

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    tracing::debug!("Alarm {:?} fired", self.alarm.name);
                    let outcome = self.notifier.run_cycle(Utc::now()).await;
                    log_outcome(&outcome);
                }
            }
        }

        tracing::info!("Alarm {:?} cleared", self.alarm.name);
        self.notifier
    }
}

pub fn log_outcome(outcome: &CycleOutcome) {
    match outcome {
        CycleOutcome::Processed { events, emitted } => {
            tracing::debug!("Poll cycle done: {} events, {} reminders", events, emitted);
        }
        CycleOutcome::NoEndpoint => tracing::debug!("Poll cycle done: no server"),
        CycleOutcome::Unauthenticated => tracing::debug!("Poll cycle done: not signed in"),
        CycleOutcome::EndpointLost(e) | CycleOutcome::Failed(e) => {
            tracing::debug!("Poll cycle done with error: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HostError;
    use crate::host::NotificationHost;
    use async_trait::async_trait;
    use shared::Notification;
    use std::sync::Arc;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct NullHost;

    #[async_trait]
    impl NotificationHost for NullHost {
        async fn create(&self, _id: &str, _notification: &Notification) -> Result<(), HostError> {
            Ok(())
        }
    }

    #[test]
    fn test_alarm_from_config() {
        let alarm = Alarm::reminders(&NotifierConfig::default());
        assert_eq!(alarm.name, REMINDER_ALARM);
        assert_eq!(alarm.initial_delay, Duration::from_secs(60));
        assert_eq!(alarm.period, Duration::from_secs(300));
    }

    #[tokio::test]
    async fn test_scheduler_polls_until_shutdown() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/auth/me"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/events"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
            .expect(2..)
            .mount(&server)
            .await;

        let config = NotifierConfig {
            server_urls: vec![server.uri()],
            ..NotifierConfig::default()
        };
        let notifier =
            EventNotifier::new(config, Arc::new(NullHost)).expect("should build notifier");
        let alarm = Alarm {
            name: "test",
            initial_delay: Duration::ZERO,
            period: Duration::from_millis(50),
        };

        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(PollingScheduler::with_alarm(notifier, alarm).run(rx));

        tokio::time::sleep(Duration::from_millis(180)).await;
        tx.send(true).expect("scheduler should be listening");

        let notifier = handle.await.expect("scheduler task should finish");
        assert_eq!(notifier.active_endpoint().get(), Some(server.uri()));
    }
}
