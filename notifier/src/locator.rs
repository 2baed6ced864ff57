//! Finds a reachable calendar server among the configured candidates.

use std::time::Duration;

use crate::calendar::client::CalendarClient;

/// Probes candidate base URLs in order and picks the first one that answers.
///
/// A candidate counts as reachable when it responds with any status below
/// 500. A 401 means the server is there and simply wants a login.
#[derive(Clone)]
pub struct ServerLocator {
    client: CalendarClient,
    probe_timeout: Duration,
}

impl ServerLocator {
    pub fn new(client: CalendarClient, probe_timeout: Duration) -> Self {
        Self {
            client,
            probe_timeout,
        }
    }

    /// Run one discovery pass. Each candidate is tried at most once.
    pub async fn discover(&self, candidates: &[String]) -> Option<String> {
        for base in candidates {
            match self.client.probe(base, self.probe_timeout).await {
                Ok(status) if status.as_u16() < 500 => {
                    tracing::info!("Calendar server found at {} (HTTP {})", base, status);
                    return Some(base.clone());
                }
                Ok(status) => {
                    tracing::warn!("Candidate {} answered HTTP {}, skipping", base, status);
                }
                Err(e) => {
                    tracing::warn!("Candidate {} unreachable: {}", base, e);
                }
            }
        }

        tracing::warn!("No reachable calendar server among {} candidates", candidates.len());
        None
    }
}
