//! Desktop integration: notifications and the permission dialog.
//!
//! Both calls block (D-Bus round trips, a modal dialog waiting for the
//! user), so the notification worker always runs them on the blocking pool.

use std::process::Command;
use thiserror::Error;
use tracing::debug;

/// Failure to reach the user.
#[derive(Debug, Error)]
pub enum NotifyError {
    /// The notification server rejected or never received the notification.
    #[error("notification delivery failed: {message}")]
    Delivery {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The confirmation dialog could not be shown.
    #[error("permission prompt failed: {message}")]
    Prompt {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

/// Shows a notification to the user.
pub trait Notifier: Send + Sync {
    fn notify(&self, title: &str, body: &str) -> Result<(), NotifyError>;
}

/// Asks the user a yes/no question.
pub trait PermissionPrompt: Send + Sync {
    /// `Ok(true)` when the user allowed the access.
    fn confirm(&self, question: &str) -> Result<bool, NotifyError>;
}

/// [`Notifier`] backed by the freedesktop notification service.
#[derive(Debug, Clone)]
pub struct DesktopNotifier {
    app_name: String,
}

impl DesktopNotifier {
    pub fn new(app_name: impl Into<String>) -> Self {
        Self {
            app_name: app_name.into(),
        }
    }
}

impl Notifier for DesktopNotifier {
    fn notify(&self, title: &str, body: &str) -> Result<(), NotifyError> {
        notify_rust::Notification::new()
            .appname(&self.app_name)
            .summary(title)
            .body(body)
            .icon("dialog-warning")
            .show()
            .map_err(|e| NotifyError::Delivery {
                message: e.to_string(),
                source: None,
            })?;
        debug!("Notification shown: {}", title);
        Ok(())
    }
}

/// [`PermissionPrompt`] that runs `zenity --question`.
#[derive(Debug, Clone)]
pub struct ZenityPrompt {
    program: String,
    title: String,
}

impl ZenityPrompt {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            program: "zenity".to_string(),
            title: title.into(),
        }
    }

    /// Run `program` instead of `zenity`. It receives the same arguments.
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }
}

impl PermissionPrompt for ZenityPrompt {
    fn confirm(&self, question: &str) -> Result<bool, NotifyError> {
        let status = Command::new(&self.program)
            .arg("--question")
            .arg("--title")
            .arg(&self.title)
            .arg("--text")
            .arg(question)
            .status()
            .map_err(|e| NotifyError::Prompt {
                message: format!("could not run {}: {e}", self.program),
                source: Some(Box::new(e)),
            })?;

        // zenity: 0 = yes, 1 = no / closed, anything else is a failure
        match status.code() {
            Some(0) => Ok(true),
            Some(1) => Ok(false),
            other => Err(NotifyError::Prompt {
                message: format!("{} exited with {:?}", self.program, other),
                source: None,
            }),
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_exit_codes() {
        assert!(ZenityPrompt::new("t").with_program("true").confirm("?").unwrap());
        assert!(!ZenityPrompt::new("t").with_program("false").confirm("?").unwrap());
    }

    #[test]
    fn test_missing_prompt_program_is_an_error() {
        let err = ZenityPrompt::new("t")
            .with_program("/nonexistent/clipboard-watcher-prompt")
            .confirm("?")
            .unwrap_err();
        assert!(matches!(err, NotifyError::Prompt { .. }));
    }
}
