//! Attribution: who is asking for the selection.
//!
//! Must run before the request is acknowledged. A requestor commonly exits
//! right after it receives its data, and after that its pid and window
//! properties are gone.

use crate::connection::{SelectionConnection, Window};
use crate::error::ConnectionError;
use crate::process::{ProcessInfo, ProcessLookup};
use crate::session::Session;
use tracing::debug;

/// Identity of a requestor as far as it could be established.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribution {
    pub window: Window,
    pub name: Option<String>,
    pub pid: Option<u32>,
    pub process: Option<ProcessInfo>,
}

/// Resolves requestor windows to processes.
pub struct AttributionResolver<P> {
    lookup: P,
}

impl<P: ProcessLookup> AttributionResolver<P> {
    pub fn new(lookup: P) -> Self {
        Self { lookup }
    }

    pub fn lookup(&self) -> &P {
        &self.lookup
    }

    /// Resolve everything we can about `requestor`.
    ///
    /// Only a broken connection is an error; anything the server cannot
    /// tell us ends up as `None`.
    pub fn resolve<C: SelectionConnection>(
        &mut self,
        session: &mut Session<C>,
        requestor: Window,
    ) -> Result<Attribution, ConnectionError> {
        let name = window_name(session, requestor)?;
        let pid = requestor_pid(session, requestor)?;
        let process = match pid {
            Some(pid) => {
                let info = self.lookup.lookup(pid);
                if info.is_none() {
                    debug!("No process info for pid {}", pid);
                }
                info
            }
            None => None,
        };

        Ok(Attribution {
            window: requestor,
            name,
            pid,
            process,
        })
    }
}

fn soft<T>(result: Result<Option<T>, ConnectionError>) -> Result<Option<T>, ConnectionError> {
    match result {
        Err(e) if !e.is_fatal() => {
            debug!("Ignoring failed identity query: {}", e);
            Ok(None)
        }
        other => other,
    }
}

/// `_NET_WM_NAME`, falling back to `WM_NAME`.
fn window_name<C: SelectionConnection>(
    session: &mut Session<C>,
    window: Window,
) -> Result<Option<String>, ConnectionError> {
    let atoms = session.atoms().clone();
    for property in [atoms.net_wm_name, atoms.wm_name] {
        let value = soft(session.conn_mut().read_property(window, property))?;
        if let Some(value) = value.filter(|v| !v.bytes.is_empty()) {
            return Ok(Some(String::from_utf8_lossy(&value.bytes).into_owned()));
        }
    }
    Ok(None)
}

/// Pid from the X-Resource extension, falling back to `_NET_WM_PID`.
fn requestor_pid<C: SelectionConnection>(
    session: &mut Session<C>,
    window: Window,
) -> Result<Option<u32>, ConnectionError> {
    if let Some(pid) = soft(session.conn_mut().client_pid(window))? {
        return Ok(Some(pid));
    }

    let property = session.atoms().net_wm_pid;
    let cardinal = session.atoms().cardinal;
    let value = soft(session.conn_mut().read_property(window, property))?;
    Ok(value
        .filter(|v| v.type_atom == cardinal)
        .and_then(|v| v.as_u32s())
        .and_then(|units| units.first().copied())
        .filter(|pid| *pid != 0))
}
