//! Access records handed from the protocol thread to the notifier.

use crate::attribution::Attribution;
use crate::connection::Window;
use crate::process::ProcessInfo;
use crate::selection::Slot;
use serde::Serialize;

/// One observed read of a selection by another client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccessRecord {
    pub requestor: Window,
    pub requestor_name: Option<String>,
    pub pid: Option<u32>,
    pub process: Option<ProcessInfo>,
    /// Format the requestor asked for.
    pub target: String,
    #[serde(serialize_with = "serialize_slot")]
    pub slot: Slot,
}

fn serialize_slot<S: serde::Serializer>(slot: &Slot, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(slot.atom_name())
}

impl AccessRecord {
    pub fn new(attribution: Attribution, slot: Slot, target: impl Into<String>) -> Self {
        Self {
            requestor: attribution.window,
            requestor_name: attribution.name,
            pid: attribution.pid,
            process: attribution.process,
            target: target.into(),
            slot,
        }
    }

    /// Notification title.
    pub fn title(&self) -> String {
        format!("Access to Clipboard ({}) detected.", self.slot)
    }

    /// Notification body: window and process lines.
    pub fn body(&self) -> String {
        format!("{}\n{}", self.window_line(), self.process_line())
    }

    pub fn window_line(&self) -> String {
        format!(
            "Window info: {} (id: {})",
            self.requestor_name.as_deref().unwrap_or("unnamed"),
            self.requestor
        )
    }

    pub fn process_line(&self) -> String {
        match (&self.process, self.pid) {
            (Some(process), _) => format!("Process info: {process}"),
            (None, Some(pid)) => format!("Process info: exited (pid: {pid})"),
            (None, None) => "Process info: Unknown".to_string(),
        }
    }

    /// Question put to the user in permission mode.
    pub fn permission_prompt(&self) -> String {
        let who = match (&self.process, self.pid) {
            (Some(process), _) => process.to_string(),
            (None, Some(pid)) => format!("pid {pid}"),
            (None, None) => "an unknown process".to_string(),
        };
        format!(
            "The process {} with the window named '{}' wants to access your clipboard data ({} as {}).",
            who,
            self.requestor_name.as_deref().unwrap_or("unnamed"),
            self.slot,
            self.target
        )
    }
}
