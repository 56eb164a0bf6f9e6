//! Process identity lookup for requestor pids.

use chrono::{DateTime, Local};
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System, UpdateKind, Users};

/// What is known about the process behind a requestor window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProcessInfo {
    pub pid: u32,
    pub name: Option<String>,
    pub path: Option<PathBuf>,
    pub parent_pid: Option<u32>,
    pub user: Option<String>,
    pub started_at: Option<DateTime<Local>>,
}

impl ProcessInfo {
    /// Info carrying nothing but the pid.
    pub fn bare(pid: u32) -> Self {
        Self {
            pid,
            name: None,
            path: None,
            parent_pid: None,
            user: None,
            started_at: None,
        }
    }

    /// Executable path if known, otherwise the process name.
    pub fn display_path(&self) -> String {
        match (&self.path, &self.name) {
            (Some(path), _) => path.display().to_string(),
            (None, Some(name)) => name.clone(),
            (None, None) => "unknown".to_string(),
        }
    }
}

impl fmt::Display for ProcessInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (pid: {})", self.display_path(), self.pid)
    }
}

/// Maps a pid to process details.
pub trait ProcessLookup {
    /// Details for `pid`, or `None` if the process is gone or unreadable.
    fn lookup(&mut self, pid: u32) -> Option<ProcessInfo>;
}

/// [`ProcessLookup`] backed by `sysinfo`.
pub struct SysinfoLookup {
    system: System,
    users: Users,
}

impl SysinfoLookup {
    pub fn new() -> Self {
        Self {
            system: System::new(),
            users: Users::new_with_refreshed_list(),
        }
    }
}

impl Default for SysinfoLookup {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessLookup for SysinfoLookup {
    fn lookup(&mut self, pid: u32) -> Option<ProcessInfo> {
        let sys_pid = Pid::from_u32(pid);
        self.system.refresh_processes_specifics(
            ProcessesToUpdate::Some(&[sys_pid]),
            ProcessRefreshKind::new()
                .with_exe(UpdateKind::OnlyIfNotSet)
                .with_user(UpdateKind::OnlyIfNotSet),
        );
        let process = self.system.process(sys_pid)?;

        let user = process.user_id().and_then(|uid| {
            if self.users.get_user_by_id(uid).is_none() {
                self.users.refresh_list();
            }
            self.users.get_user_by_id(uid).map(|u| u.name().to_string())
        });

        let started_at = i64::try_from(process.start_time())
            .ok()
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
            .map(|utc| utc.with_timezone(&Local));

        Some(ProcessInfo {
            pid,
            name: Some(process.name().to_string_lossy().into_owned()),
            path: process.exe().map(PathBuf::from),
            parent_pid: process.parent().map(|p| p.as_u32()),
            user,
            started_at,
        })
    }
}
