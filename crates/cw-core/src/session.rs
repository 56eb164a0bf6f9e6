//! Protocol session: a connection plus the atoms and buffers the engine
//! needs around it.

use crate::connection::{Atom, Event, SelectionConnection, Window};
use crate::error::ConnectionError;
use crate::events::EventQueue;
use crate::selection::{INCR, SAVE_TARGETS, Slot, TARGETS};
use std::collections::HashMap;
use std::time::Duration;

/// Tunables for conversions made by this client.
#[derive(Debug, Clone)]
pub struct ProtocolOptions {
    /// Property on our window that owners deliver conversions into.
    pub delivery_property: String,
    /// How long to wait for an owner's `SelectionNotify`.
    pub reply_timeout: Duration,
    /// How long to wait for each chunk of an INCR transfer.
    pub chunk_timeout: Duration,
}

impl Default for ProtocolOptions {
    fn default() -> Self {
        Self {
            delivery_property: "SEL_DATA".to_string(),
            reply_timeout: Duration::from_secs(5),
            chunk_timeout: Duration::from_secs(5),
        }
    }
}

/// Atoms interned once per connection.
#[derive(Debug, Clone)]
pub struct Atoms {
    pub primary: Atom,
    pub clipboard: Atom,
    pub targets: Atom,
    pub save_targets: Atom,
    pub incr: Atom,
    pub atom: Atom,
    pub cardinal: Atom,
    pub utf8_string: Atom,
    pub net_wm_name: Atom,
    pub net_wm_pid: Atom,
    pub wm_name: Atom,
    pub delivery: Atom,
}

impl Atoms {
    fn intern<C: SelectionConnection>(
        conn: &mut C,
        delivery_property: &str,
    ) -> Result<Self, ConnectionError> {
        Ok(Self {
            primary: conn.intern(Slot::Primary.atom_name())?,
            clipboard: conn.intern(Slot::Clipboard.atom_name())?,
            targets: conn.intern(TARGETS)?,
            save_targets: conn.intern(SAVE_TARGETS)?,
            incr: conn.intern(INCR)?,
            atom: conn.intern("ATOM")?,
            cardinal: conn.intern("CARDINAL")?,
            utf8_string: conn.intern("UTF8_STRING")?,
            net_wm_name: conn.intern("_NET_WM_NAME")?,
            net_wm_pid: conn.intern("_NET_WM_PID")?,
            wm_name: conn.intern("WM_NAME")?,
            delivery: conn.intern(delivery_property)?,
        })
    }
}

/// Everything the protocol thread owns about the display connection.
pub struct Session<C> {
    conn: C,
    atoms: Atoms,
    options: ProtocolOptions,
    events: EventQueue,
    names: HashMap<Atom, String>,
}

impl<C: SelectionConnection> Session<C> {
    /// Intern the well-known atoms and wrap `conn`.
    pub fn new(mut conn: C, options: ProtocolOptions) -> Result<Self, ConnectionError> {
        let atoms = Atoms::intern(&mut conn, &options.delivery_property)?;
        Ok(Self {
            conn,
            atoms,
            options,
            events: EventQueue::new(),
            names: HashMap::new(),
        })
    }

    pub fn atoms(&self) -> &Atoms {
        &self.atoms
    }

    pub fn options(&self) -> &ProtocolOptions {
        &self.options
    }

    pub fn window(&self) -> Window {
        self.conn.window()
    }

    pub fn conn(&self) -> &C {
        &self.conn
    }

    pub fn conn_mut(&mut self) -> &mut C {
        &mut self.conn
    }

    /// Atom of the selection backing `slot`.
    pub fn slot_atom(&self, slot: Slot) -> Atom {
        match slot {
            Slot::Primary => self.atoms.primary,
            Slot::Clipboard => self.atoms.clipboard,
        }
    }

    /// Slot backed by `selection`, if it is one we manage.
    pub fn slot_for(&self, selection: Atom) -> Option<Slot> {
        Slot::ALL
            .into_iter()
            .find(|slot| self.slot_atom(*slot) == selection)
    }

    /// Intern `name`, going through the connection every time.
    pub fn intern(&mut self, name: &str) -> Result<Atom, ConnectionError> {
        let atom = self.conn.intern(name)?;
        self.names.entry(atom).or_insert_with(|| name.to_string());
        Ok(atom)
    }

    /// Name of `atom`, cached after the first lookup.
    pub fn atom_name(&mut self, atom: Atom) -> Result<String, ConnectionError> {
        if let Some(name) = self.names.get(&atom) {
            return Ok(name.clone());
        }
        let name = self.conn.atom_name(atom)?;
        self.names.insert(atom, name.clone());
        Ok(name)
    }

    /// Name of `atom` for log output; never fails.
    pub fn describe_atom(&mut self, atom: Atom) -> String {
        self.atom_name(atom)
            .unwrap_or_else(|_| format!("<atom {atom}>"))
    }

    /// Next event to dispatch, replaying deferred events first.
    pub fn next_event(&mut self) -> Result<Event, ConnectionError> {
        self.events.next(&mut self.conn)
    }

    /// Wait up to `timeout` for an event accepted by `matches`, deferring
    /// requests and clears that arrive meanwhile.
    pub fn wait_for<F>(
        &mut self,
        timeout: Duration,
        matches: F,
    ) -> Result<Option<Event>, ConnectionError>
    where
        F: FnMut(&Event) -> bool,
    {
        self.events.wait_for(&mut self.conn, timeout, matches)
    }

    /// Number of deferred events waiting to be replayed.
    pub fn deferred_len(&self) -> usize {
        self.events.deferred_len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeConnection;

    #[test]
    fn test_slot_lookup_by_atom() {
        let session = Session::new(FakeConnection::new(), ProtocolOptions::default()).unwrap();
        let clipboard = session.slot_atom(Slot::Clipboard);
        assert_eq!(session.slot_for(clipboard), Some(Slot::Clipboard));
        assert_eq!(session.slot_for(session.atoms().targets), None);
    }

    #[test]
    fn test_atom_names_round_trip_through_cache() {
        let mut session = Session::new(FakeConnection::new(), ProtocolOptions::default()).unwrap();
        let atom = session.intern("text/plain").unwrap();
        assert_eq!(session.atom_name(atom).unwrap(), "text/plain");
        assert_eq!(session.describe_atom(9999), "<atom 9999>");
    }

    #[test]
    fn test_custom_delivery_property_is_interned() {
        let options = ProtocolOptions {
            delivery_property: "WATCHER_DATA".to_string(),
            ..ProtocolOptions::default()
        };
        let mut session = Session::new(FakeConnection::new(), options).unwrap();
        let delivery = session.atoms().delivery;
        assert_eq!(session.atom_name(delivery).unwrap(), "WATCHER_DATA");
    }
}
