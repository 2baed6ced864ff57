//! Adapters for the desktop: notification centre and web browser.

use async_trait::async_trait;
use shared::{Notification, NotificationPriority};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use crate::calendar::poller::ActiveEndpoint;
use crate::error::HostError;

const APP_NAME: &str = "Calendar Notifier";
const DEFAULT_ICON: &str = "x-office-calendar";

/// Somewhere reminders can be shown
#[async_trait]
pub trait NotificationHost: Send + Sync {
    async fn create(&self, id: &str, notification: &Notification) -> Result<(), HostError>;
}

/// Something that can open a URL in a new top-level view
#[async_trait]
pub trait TabOpener: Send + Sync {
    async fn open(&self, url: &str) -> Result<(), HostError>;
}

/// Opens URLs in the user's default browser
#[derive(Debug, Clone, Copy, Default)]
pub struct BrowserOpener;

#[async_trait]
impl TabOpener for BrowserOpener {
    async fn open(&self, url: &str) -> Result<(), HostError> {
        let target = url.to_string();
        tokio::task::spawn_blocking(move || open::that(&target))
            .await?
            .map_err(|e| HostError::Open {
                url: url.to_string(),
                reason: e.to_string(),
            })
    }
}

/// Opens the calendar web app: the active endpoint if there is one, else the
/// first configured server.
#[derive(Clone)]
pub struct CalendarLauncher {
    endpoint: ActiveEndpoint,
    fallback: Option<String>,
    opener: Arc<dyn TabOpener>,
}

impl CalendarLauncher {
    pub fn new(
        endpoint: ActiveEndpoint,
        fallback: Option<String>,
        opener: Arc<dyn TabOpener>,
    ) -> Self {
        Self {
            endpoint,
            fallback,
            opener,
        }
    }

    pub fn target(&self) -> Option<String> {
        self.endpoint.get().or_else(|| self.fallback.clone())
    }

    pub async fn open_calendar(&self) -> Result<(), HostError> {
        let Some(url) = self.target() else {
            tracing::warn!("No calendar URL to open");
            return Ok(());
        };

        tracing::info!("Opening {}", url);
        self.opener.open(&url).await
    }
}

/// Notification ids that already have a thread waiting for a click.
///
/// The daemon replaces a notification re-sent under the same id without
/// closing it, so the first waiter keeps receiving its clicks.
#[derive(Debug, Clone, Default)]
struct PendingClicks {
    ids: Arc<Mutex<HashSet<String>>>,
}

impl PendingClicks {
    /// True if the caller should start a waiter for `id`.
    fn claim(&self, id: &str) -> bool {
        match self.ids.lock() {
            Ok(mut ids) => ids.insert(id.to_string()),
            Err(poisoned) => poisoned.into_inner().insert(id.to_string()),
        }
    }

    fn release(&self, id: &str) {
        match self.ids.lock() {
            Ok(mut ids) => ids.remove(id),
            Err(poisoned) => poisoned.into_inner().remove(id),
        };
    }
}

/// Shows reminders as native desktop notifications.
///
/// On freedesktop systems a click on the notification opens the calendar.
pub struct DesktopNotifier {
    icon: Option<String>,
    launcher: Option<CalendarLauncher>,
    pending: PendingClicks,
}

impl DesktopNotifier {
    pub fn new(icon: Option<String>) -> Self {
        Self {
            icon,
            launcher: None,
            pending: PendingClicks::default(),
        }
    }

    pub fn with_launcher(mut self, launcher: CalendarLauncher) -> Self {
        self.launcher = Some(launcher);
        self
    }
}

#[async_trait]
impl NotificationHost for DesktopNotifier {
    async fn create(&self, id: &str, notification: &Notification) -> Result<(), HostError> {
        let toast = build_toast(id, notification, self.icon.as_deref());
        let launcher = self
            .launcher
            .clone()
            .filter(|_| self.pending.claim(id));
        let pending = self.pending.clone();
        let key = id.to_string();
        let runtime = tokio::runtime::Handle::current();
        let (tx, rx) = tokio::sync::oneshot::channel();

        // The handle may block until the user reacts, so it gets its own thread.
        std::thread::spawn(move || match toast.show() {
            Ok(handle) => {
                let _ = tx.send(Ok(()));
                if let Some(launcher) = launcher {
                    wait_for_click(handle, &launcher, &runtime);
                    pending.release(&key);
                }
            }
            Err(e) => {
                if launcher.is_some() {
                    pending.release(&key);
                }
                let _ = tx.send(Err(e.to_string()));
            }
        });

        match rx.await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(reason)) => Err(HostError::Notification {
                id: id.to_string(),
                reason,
            }),
            Err(_) => Err(HostError::Notification {
                id: id.to_string(),
                reason: "notification thread exited".to_string(),
            }),
        }
    }
}

fn build_toast(
    id: &str,
    notification: &Notification,
    icon: Option<&str>,
) -> notify_rust::Notification {
    let mut toast = notify_rust::Notification::new();
    toast
        .appname(APP_NAME)
        .summary(&notification.title)
        .body(&format!(
            "{}\n{}",
            notification.message, notification.context_message
        ))
        .icon(icon.unwrap_or(DEFAULT_ICON));

    #[cfg(all(unix, not(target_os = "macos")))]
    {
        use notify_rust::{Timeout, Urgency};

        toast
            .id(stable_id(id))
            .action("default", "Open calendar")
            .urgency(match notification.priority {
                NotificationPriority::Low => Urgency::Low,
                NotificationPriority::Normal => Urgency::Normal,
                NotificationPriority::High => Urgency::Critical,
            });
        if notification.require_interaction {
            toast.timeout(Timeout::Never);
        }
    }

    #[cfg(not(all(unix, not(target_os = "macos"))))]
    {
        let _ = id;
        if notification.priority == NotificationPriority::High {
            toast.sound_name("default");
        }
    }

    toast
}

/// Same id for the same reminder so the notification daemon replaces rather
/// than stacks repeats.
#[cfg(all(unix, not(target_os = "macos")))]
fn stable_id(id: &str) -> u32 {
    use std::hash::{Hash, Hasher};

    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    id.hash(&mut hasher);
    (hasher.finish() as u32).max(1)
}

#[cfg(all(unix, not(target_os = "macos")))]
fn wait_for_click(
    handle: notify_rust::NotificationHandle,
    launcher: &CalendarLauncher,
    runtime: &tokio::runtime::Handle,
) {
    handle.wait_for_action(|action| {
        if action == "default" {
            if let Err(e) = runtime.block_on(launcher.open_calendar()) {
                tracing::warn!("Notification click: {}", e);
            }
        }
    });
}

#[cfg(not(all(unix, not(target_os = "macos"))))]
fn wait_for_click<H>(_handle: H, _launcher: &CalendarLauncher, _runtime: &tokio::runtime::Handle) {}
