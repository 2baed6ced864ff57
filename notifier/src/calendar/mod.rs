pub mod client;
pub mod poller;
pub mod reminders;

pub use poller::{ActiveEndpoint, CycleOutcome, CycleState, EventNotifier};
