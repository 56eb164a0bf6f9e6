//! [`SelectionConnection`] over a live X11 display, using `x11rb`.

use clipboard_watcher_core::connection::{
    Atom, CURRENT_TIME, Event, SelectionConnection, SelectionNotify, SelectionRequest, Window,
};
use clipboard_watcher_core::selection::{PropFormat, Value};
use clipboard_watcher_core::{ConnectionError, StartupError};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use x11rb::connection::{Connection, RequestConnection};
use x11rb::errors::{ConnectionError as X11ConnectionError, ReplyError};
use x11rb::protocol::Event as X11Event;
use x11rb::protocol::res::{self, ClientIdMask, ClientIdSpec, ConnectionExt as _};
use x11rb::protocol::xproto::{
    AtomEnum, ConnectionExt as _, CreateWindowAux, EventMask, PropMode, Property,
    SELECTION_NOTIFY_EVENT, SelectionNotifyEvent, WindowClass,
};
use x11rb::rust_connection::RustConnection;

const NONE: u32 = x11rb::NONE;

fn lost(e: X11ConnectionError) -> ConnectionError {
    ConnectionError::Lost {
        message: e.to_string(),
        source: Some(Box::new(e)),
    }
}

fn reply_error(request: &'static str, e: ReplyError) -> ConnectionError {
    match e {
        ReplyError::ConnectionError(e) => lost(e),
        ReplyError::X11Error(e) => ConnectionError::request(request, format!("{:?}", e.error_kind)),
    }
}

fn connect_error(e: impl std::error::Error + Send + Sync + 'static) -> StartupError {
    StartupError::Connect {
        message: e.to_string(),
        source: Some(Box::new(e)),
    }
}

fn optional(atom: Atom) -> Option<Atom> {
    (atom != NONE).then_some(atom)
}

/// A display connection plus the invisible window we own selections with.
pub struct X11Connection {
    conn: RustConnection,
    window: Window,
    has_res: bool,
}

impl X11Connection {
    /// Connect to `display` (or `$DISPLAY`) and create our window.
    pub fn connect(display: Option<&str>) -> Result<Self, StartupError> {
        let (conn, screen_num) = x11rb::connect(display).map_err(connect_error)?;
        let screen = conn
            .setup()
            .roots
            .get(screen_num)
            .ok_or_else(|| StartupError::Connect {
                message: format!("screen {screen_num} does not exist"),
                source: None,
            })?;
        let root = screen.root;
        let visual = screen.root_visual;

        let window = conn.generate_id().map_err(connect_error)?;
        conn.create_window(
            x11rb::COPY_DEPTH_FROM_PARENT,
            window,
            root,
            0,
            0,
            1,
            1,
            0,
            WindowClass::INPUT_OUTPUT,
            visual,
            &CreateWindowAux::new().event_mask(EventMask::PROPERTY_CHANGE),
        )
        .map_err(connect_error)?
        .check()
        .map_err(connect_error)?;

        let has_res = conn
            .extension_information(res::X11_EXTENSION_NAME)
            .map_err(connect_error)?
            .is_some();
        if !has_res {
            warn!("X-Resource extension not available, falling back to _NET_WM_PID");
        }

        info!("Connected to X display, window {}", window);
        Ok(Self {
            conn,
            window,
            has_res,
        })
    }

    fn translate(&self, event: X11Event) -> Event {
        match event {
            X11Event::SelectionRequest(e) => Event::SelectionRequest(SelectionRequest {
                time: e.time,
                owner: e.owner,
                requestor: e.requestor,
                selection: e.selection,
                target: e.target,
                property: optional(e.property),
            }),
            X11Event::SelectionClear(e) => Event::SelectionClear {
                time: e.time,
                owner: e.owner,
                selection: e.selection,
            },
            X11Event::SelectionNotify(e) => Event::SelectionNotify(SelectionNotify {
                time: e.time,
                requestor: e.requestor,
                selection: e.selection,
                target: e.target,
                property: optional(e.property),
            }),
            X11Event::PropertyNotify(e) if e.state == Property::NEW_VALUE => {
                Event::PropertyNewValue {
                    window: e.window,
                    atom: e.atom,
                }
            }
            X11Event::PropertyNotify(e) => Event::PropertyDeleted {
                window: e.window,
                atom: e.atom,
            },
            X11Event::Error(e) => {
                // Typically BadWindow from a requestor that already exited
                debug!("Asynchronous X error: {:?}", e.error_kind);
                Event::Other
            }
            _ => Event::Other,
        }
    }

    #[cfg(unix)]
    fn wait_readable(&self, timeout: Duration) -> Result<(), ConnectionError> {
        use std::os::fd::AsRawFd;

        let mut fd = libc::pollfd {
            fd: self.conn.stream().as_raw_fd(),
            events: libc::POLLIN,
            revents: 0,
        };
        let millis = libc::c_int::try_from(timeout.as_millis()).unwrap_or(libc::c_int::MAX);
        let rc = unsafe { libc::poll(&mut fd, 1, millis) };
        if rc < 0 {
            let err = std::io::Error::last_os_error();
            if err.kind() != std::io::ErrorKind::Interrupted {
                return Err(lost(X11ConnectionError::IoError(err)));
            }
        }
        Ok(())
    }

    #[cfg(not(unix))]
    fn wait_readable(&self, timeout: Duration) -> Result<(), ConnectionError> {
        std::thread::sleep(timeout.min(Duration::from_millis(10)));
        Ok(())
    }
}

impl SelectionConnection for X11Connection {
    fn window(&self) -> Window {
        self.window
    }

    fn intern(&mut self, name: &str) -> Result<Atom, ConnectionError> {
        Ok(self
            .conn
            .intern_atom(false, name.as_bytes())
            .map_err(lost)?
            .reply()
            .map_err(|e| reply_error("InternAtom", e))?
            .atom)
    }

    fn atom_name(&mut self, atom: Atom) -> Result<String, ConnectionError> {
        let reply = self
            .conn
            .get_atom_name(atom)
            .map_err(lost)?
            .reply()
            .map_err(|e| reply_error("GetAtomName", e))?;
        Ok(String::from_utf8_lossy(&reply.name).into_owned())
    }

    fn selection_owner(&mut self, selection: Atom) -> Result<Option<Window>, ConnectionError> {
        let reply = self
            .conn
            .get_selection_owner(selection)
            .map_err(lost)?
            .reply()
            .map_err(|e| reply_error("GetSelectionOwner", e))?;
        Ok(optional(reply.owner))
    }

    fn set_selection_owner(&mut self, selection: Atom) -> Result<(), ConnectionError> {
        self.conn
            .set_selection_owner(self.window, selection, CURRENT_TIME)
            .map_err(lost)?
            .check()
            .map_err(|e| reply_error("SetSelectionOwner", e))
    }

    fn convert_selection(
        &mut self,
        selection: Atom,
        target: Atom,
        property: Atom,
    ) -> Result<(), ConnectionError> {
        self.conn
            .convert_selection(self.window, selection, target, property, CURRENT_TIME)
            .map_err(lost)?;
        self.conn.flush().map_err(lost)
    }

    fn read_property(
        &mut self,
        window: Window,
        property: Atom,
    ) -> Result<Option<Value>, ConnectionError> {
        let reply = self
            .conn
            .get_property(false, window, property, AtomEnum::ANY, 0, u32::MAX / 4)
            .map_err(lost)?
            .reply()
            .map_err(|e| reply_error("GetProperty", e))?;

        if reply.type_ == NONE {
            return Ok(None);
        }
        let Some(format) = PropFormat::from_bits(reply.format) else {
            return Err(ConnectionError::request(
                "GetProperty",
                format!("unsupported property format {}", reply.format),
            ));
        };
        Ok(Some(Value::new(reply.value, format, reply.type_)))
    }

    fn write_property(
        &mut self,
        window: Window,
        property: Atom,
        value: &Value,
    ) -> Result<(), ConnectionError> {
        let units = u32::try_from(value.unit_count())
            .map_err(|_| ConnectionError::request("ChangeProperty", "value too large"))?;
        self.conn
            .change_property(
                PropMode::REPLACE,
                window,
                property,
                value.type_atom,
                value.format.bits(),
                units,
                &value.bytes,
            )
            .map_err(lost)?
            .check()
            .map_err(|e| reply_error("ChangeProperty", e))
    }

    fn delete_property(&mut self, window: Window, property: Atom) -> Result<(), ConnectionError> {
        self.conn
            .delete_property(window, property)
            .map_err(lost)?;
        self.conn.flush().map_err(lost)
    }

    fn send_notify(&mut self, notify: &SelectionNotify) -> Result<(), ConnectionError> {
        let event = SelectionNotifyEvent {
            response_type: SELECTION_NOTIFY_EVENT,
            sequence: 0,
            time: notify.time,
            requestor: notify.requestor,
            selection: notify.selection,
            target: notify.target,
            property: notify.property.unwrap_or(NONE),
        };
        self.conn
            .send_event(false, notify.requestor, EventMask::NO_EVENT, event)
            .map_err(lost)?;
        self.conn.flush().map_err(lost)
    }

    fn next_event(&mut self) -> Result<Event, ConnectionError> {
        self.conn.flush().map_err(lost)?;
        let event = self.conn.wait_for_event().map_err(lost)?;
        Ok(self.translate(event))
    }

    fn poll_event(&mut self, timeout: Duration) -> Result<Option<Event>, ConnectionError> {
        self.conn.flush().map_err(lost)?;
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(event) = self.conn.poll_for_event().map_err(lost)? {
                return Ok(Some(self.translate(event)));
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(None);
            }
            self.wait_readable(remaining)?;
        }
    }

    fn client_pid(&mut self, window: Window) -> Result<Option<u32>, ConnectionError> {
        if !self.has_res {
            return Ok(None);
        }
        let spec = ClientIdSpec {
            client: window,
            mask: ClientIdMask::LOCAL_CLIENT_PID.into(),
        };
        let reply = self
            .conn
            .res_query_client_ids(&[spec])
            .map_err(lost)?
            .reply()
            .map_err(|e| reply_error("ResQueryClientIds", e))?;

        let wanted = u32::from(ClientIdMask::LOCAL_CLIENT_PID);
        Ok(reply
            .ids
            .iter()
            .filter(|id| u32::from(id.spec.mask) & wanted != 0)
            .find_map(|id| id.value.first().copied()))
    }
}
