//! Notification worker: turns access records into desktop notifications.
//!
//! Runs as a tokio task. Every notification and permission dialog runs on the
//! blocking pool, so a slow D-Bus server or a user who leaves the dialog
//! open only ever delays this task.

use crate::desktop::{Notifier, PermissionPrompt};
use clipboard_watcher_core::AccessRecord;
use clipboard_watcher_core::config::NotificationConfig;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::Receiver;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// How the worker treats each record.
#[derive(Debug, Clone)]
pub struct NotifySettings {
    /// Show notifications at all.
    pub enabled: bool,
    /// Ask the user before each notification.
    pub require_permission: bool,
    /// Time allowed for records still queued at shutdown.
    pub drain_timeout: Duration,
}

impl NotifySettings {
    pub fn from_config(config: &NotificationConfig) -> Self {
        Self {
            enabled: config.enabled,
            require_permission: config.require_permission,
            drain_timeout: Duration::from_secs(5),
        }
    }
}

impl Default for NotifySettings {
    fn default() -> Self {
        Self::from_config(&NotificationConfig::default())
    }
}

/// Per-outcome counters, returned when the worker stops.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct NotifyStats {
    pub delivered: usize,
    pub declined: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl NotifyStats {
    pub fn handled(&self) -> usize {
        self.delivered + self.declined + self.failed + self.skipped
    }
}

enum Outcome {
    Delivered,
    Declined,
    Failed,
    Skipped,
}

pub struct NotifyWorker {
    notifier: Arc<dyn Notifier>,
    prompt: Arc<dyn PermissionPrompt>,
    settings: NotifySettings,
}

impl NotifyWorker {
    pub fn new(
        notifier: Arc<dyn Notifier>,
        prompt: Arc<dyn PermissionPrompt>,
        settings: NotifySettings,
    ) -> Self {
        Self {
            notifier,
            prompt,
            settings,
        }
    }

    /// Consume records until the channel closes or `cancel` fires.
    ///
    /// On cancellation the records already queued are still handled, for at
    /// most `drain_timeout`.
    pub async fn run(self, mut rx: Receiver<AccessRecord>, cancel: CancellationToken) -> NotifyStats {
        info!(
            "Notification worker started (enabled: {}, permission: {})",
            self.settings.enabled, self.settings.require_permission
        );
        let mut stats = NotifyStats::default();

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    self.drain(&mut rx, &mut stats).await;
                    break;
                }
                record = rx.recv() => match record {
                    Some(record) => self.handle(record, &mut stats).await,
                    None => {
                        debug!("Access channel closed");
                        break;
                    }
                },
            }
        }

        info!(
            "Notification worker stopped: {} delivered, {} declined, {} failed, {} skipped",
            stats.delivered, stats.declined, stats.failed, stats.skipped
        );
        stats
    }

    async fn drain(&self, rx: &mut Receiver<AccessRecord>, stats: &mut NotifyStats) {
        rx.close();
        let before = stats.handled();
        let drained = tokio::time::timeout(self.settings.drain_timeout, async {
            while let Some(record) = rx.recv().await {
                self.handle(record, stats).await;
            }
        })
        .await;

        match drained {
            Ok(()) => debug!("Drained {} queued record(s)", stats.handled() - before),
            Err(_) => warn!(
                "Drain timed out after {:?}, remaining records dropped",
                self.settings.drain_timeout
            ),
        }
    }

    async fn handle(&self, record: AccessRecord, stats: &mut NotifyStats) {
        if let Ok(json) = serde_json::to_string(&record) {
            debug!("Access record: {}", json);
        }
        match self.deliver(record).await {
            Outcome::Delivered => stats.delivered += 1,
            Outcome::Declined => stats.declined += 1,
            Outcome::Failed => stats.failed += 1,
            Outcome::Skipped => stats.skipped += 1,
        }
    }

    async fn deliver(&self, record: AccessRecord) -> Outcome {
        if !self.settings.enabled {
            return Outcome::Skipped;
        }

        if self.settings.require_permission {
            let prompt = Arc::clone(&self.prompt);
            let question = record.permission_prompt();
            match tokio::task::spawn_blocking(move || prompt.confirm(&question)).await {
                Ok(Ok(true)) => debug!("Access by {} allowed", record.requestor),
                Ok(Ok(false)) => {
                    info!(
                        "Access to {} by {} declined, notification suppressed",
                        record.slot,
                        record.requestor_name.as_deref().unwrap_or("unnamed")
                    );
                    return Outcome::Declined;
                }
                // Still report the access when no answer could be obtained
                Ok(Err(e)) => warn!("{}", e),
                Err(e) => error!("Permission prompt task panicked: {}", e),
            }
        }

        let notifier = Arc::clone(&self.notifier);
        let title = record.title();
        let body = record.body();
        match tokio::task::spawn_blocking(move || notifier.notify(&title, &body)).await {
            Ok(Ok(())) => Outcome::Delivered,
            Ok(Err(e)) => {
                warn!("{}", e);
                Outcome::Failed
            }
            Err(e) => {
                error!("Notification task panicked: {}", e);
                Outcome::Failed
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::desktop::NotifyError;
    use clipboard_watcher_core::Slot;
    use clipboard_watcher_core::attribution::Attribution;
    use std::sync::Mutex;
    use tokio::sync::mpsc;
    use tracing_test::traced_test;

    #[derive(Default)]
    struct Shown(Mutex<Vec<String>>);

    impl Notifier for Shown {
        fn notify(&self, title: &str, _body: &str) -> Result<(), NotifyError> {
            self.0.lock().unwrap().push(title.to_string());
            Ok(())
        }
    }

    struct Deny;

    impl PermissionPrompt for Deny {
        fn confirm(&self, _question: &str) -> Result<bool, NotifyError> {
            Ok(false)
        }
    }

    fn record() -> AccessRecord {
        AccessRecord::new(
            Attribution {
                window: 42,
                name: Some("xclip".to_string()),
                pid: Some(7),
                process: None,
            },
            Slot::Primary,
            "STRING",
        )
    }

    #[tokio::test]
    #[traced_test]
    async fn test_decline_is_logged_and_suppressed() {
        let shown = Arc::new(Shown::default());
        let settings = NotifySettings {
            require_permission: true,
            ..NotifySettings::default()
        };
        let worker = NotifyWorker::new(shown.clone(), Arc::new(Deny), settings);
        let (tx, rx) = mpsc::channel(4);
        tx.send(record()).await.unwrap();
        drop(tx);

        let stats = worker.run(rx, CancellationToken::new()).await;

        assert_eq!(stats.declined, 1);
        assert!(shown.0.lock().unwrap().is_empty());
        assert!(logs_contain("declined, notification suppressed"));
    }
}
