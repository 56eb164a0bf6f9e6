//! Display-server primitives consumed by the protocol engine.
//!
//! The engine never talks to X11 directly. It drives an implementation of
//! [`SelectionConnection`], which the daemon provides on top of `x11rb` and
//! the tests provide with [`crate::testing::FakeConnection`].
//!
//! Atoms and windows are plain `u32` ids, as on the wire. `0` is never a
//! valid atom or window, so "no property" and "no owner" are modelled with
//! `Option`.

use crate::error::ConnectionError;
use crate::selection::Value;
use std::time::Duration;

pub type Atom = u32;
pub type Window = u32;

/// Server timestamp carried by selection events.
pub type Timestamp = u32;

/// `CurrentTime`.
pub const CURRENT_TIME: Timestamp = 0;

/// Another client asks the selection owner to convert its content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionRequest {
    pub time: Timestamp,
    pub owner: Window,
    pub requestor: Window,
    pub selection: Atom,
    pub target: Atom,
    /// `None` for obsolete (pre-ICCCM) clients.
    pub property: Option<Atom>,
}

/// Completion of a conversion, sent by the owner to the requestor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionNotify {
    pub time: Timestamp,
    pub requestor: Window,
    pub selection: Atom,
    pub target: Atom,
    /// `None` means the conversion was refused.
    pub property: Option<Atom>,
}

/// Events the engine distinguishes. Everything else arrives as
/// [`Event::Other`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    SelectionRequest(SelectionRequest),
    /// Our ownership of `selection` was superseded.
    SelectionClear {
        time: Timestamp,
        owner: Window,
        selection: Atom,
    },
    SelectionNotify(SelectionNotify),
    /// A property on `window` received a new value.
    PropertyNewValue { window: Window, atom: Atom },
    /// A property on `window` was deleted.
    PropertyDeleted { window: Window, atom: Atom },
    Other,
}

/// Connection primitives for one client of the display server.
///
/// Implementations are used from a single thread; replies are correlated by
/// the caller, so no two calls are ever in flight at once.
pub trait SelectionConnection {
    /// Our own window, used as requestor and as selection owner.
    fn window(&self) -> Window;

    /// Intern `name`, creating the atom if needed.
    fn intern(&mut self, name: &str) -> Result<Atom, ConnectionError>;

    /// Textual name of `atom`.
    fn atom_name(&mut self, atom: Atom) -> Result<String, ConnectionError>;

    /// Current owner of `selection`, if any.
    fn selection_owner(&mut self, selection: Atom) -> Result<Option<Window>, ConnectionError>;

    /// Make our window the owner of `selection`.
    fn set_selection_owner(&mut self, selection: Atom) -> Result<(), ConnectionError>;

    /// Ask the owner of `selection` to convert it to `target` and store the
    /// result in `property` on our window.
    fn convert_selection(
        &mut self,
        selection: Atom,
        target: Atom,
        property: Atom,
    ) -> Result<(), ConnectionError>;

    /// Read (without deleting) `property` of `window`. `Ok(None)` when the
    /// property does not exist.
    fn read_property(
        &mut self,
        window: Window,
        property: Atom,
    ) -> Result<Option<Value>, ConnectionError>;

    /// Replace `property` of `window` with `value`.
    fn write_property(
        &mut self,
        window: Window,
        property: Atom,
        value: &Value,
    ) -> Result<(), ConnectionError>;

    fn delete_property(&mut self, window: Window, property: Atom) -> Result<(), ConnectionError>;

    /// Send a `SelectionNotify` event to `notify.requestor`.
    fn send_notify(&mut self, notify: &SelectionNotify) -> Result<(), ConnectionError>;

    /// Block until the next event arrives.
    fn next_event(&mut self) -> Result<Event, ConnectionError>;

    /// Wait at most `timeout` for the next event.
    fn poll_event(&mut self, timeout: Duration) -> Result<Option<Event>, ConnectionError>;

    /// Local process id of the client owning `window`, via the X-Resource
    /// extension. `Ok(None)` when the extension is missing or the server
    /// cannot tell.
    fn client_pid(&mut self, window: Window) -> Result<Option<u32>, ConnectionError>;
}
