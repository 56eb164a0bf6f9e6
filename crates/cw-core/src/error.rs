//! Error types for the selection protocol engine

use crate::selection::Slot;
use thiserror::Error;

/// Errors raised by a [`crate::connection::SelectionConnection`].
#[derive(Error, Debug)]
pub enum ConnectionError {
    /// The connection to the display server is gone.
    #[error("display connection lost: {message}")]
    Lost {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The display server answered a single request with an error.
    #[error("{request} failed: {message}")]
    Request {
        request: &'static str,
        message: String,
    },

    /// No further events will arrive.
    #[error("event stream closed")]
    Closed,
}

impl ConnectionError {
    /// Build a [`ConnectionError::Request`] from any displayable error.
    pub fn request(request: &'static str, err: impl std::fmt::Display) -> Self {
        ConnectionError::Request {
            request,
            message: err.to_string(),
        }
    }

    /// Errors after which the connection cannot be used any more.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ConnectionError::Lost { .. } | ConnectionError::Closed)
    }
}

/// Conditions that abort startup.
#[derive(Error, Debug)]
pub enum StartupError {
    /// Could not open the display connection or create our window.
    #[error("failed to connect to display server: {message}")]
    Connect {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Could not become the owner of a selection.
    #[error("failed to take ownership of {slot}")]
    Ownership { slot: Slot },

    /// The display server failed while taking initial ownership.
    #[error("initial selection refresh failed: {0}")]
    Protocol(#[from] ConnectionError),
}
