//! Desktop reminders for a remotely hosted calendar.
//!
//! The [`locator`] finds a reachable server, the [`calendar`] poller fetches
//! events from it and the [`host`] adapters put reminders on screen. The
//! [`scheduler`] ties them together on a recurring alarm.

pub mod calendar;
pub mod config;
pub mod error;
pub mod host;
pub mod locator;
pub mod scheduler;

pub use calendar::{ActiveEndpoint, CycleOutcome, CycleState, EventNotifier};
pub use config::{NotifierConfig, WindowMatch};
pub use error::{FetchError, HostError};
pub use locator::ServerLocator;
pub use scheduler::{Alarm, PollingScheduler};
