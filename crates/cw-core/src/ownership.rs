//! Ownership manager: keeps this process the owner of every slot.
//!
//! Whenever another client takes a selection, we copy its content into the
//! [`SelectionStore`] and take the selection back. From the user's point of
//! view the clipboard keeps working; every later read goes through us.

use crate::connection::SelectionConnection;
use crate::error::{ConnectionError, StartupError};
use crate::fetcher;
use crate::selection::{Slot, is_synthetic_format};
use crate::session::Session;
use crate::store::{FormatMap, SelectionStore};
use tracing::{debug, info, warn};

/// Per-slot ownership flags.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct OwnershipState {
    owned: [bool; 2],
}

impl OwnershipState {
    fn is_owned(&self, slot: Slot) -> bool {
        self.owned[slot.index()]
    }

    fn set(&mut self, slot: Slot, owned: bool) {
        self.owned[slot.index()] = owned;
    }
}

/// Owns the selection store and the ownership flags.
///
/// The store for a slot is only replaced while that slot is not owned.
#[derive(Debug, Default)]
pub struct OwnershipManager {
    store: SelectionStore,
    state: OwnershipState,
}

impl OwnershipManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn store(&self) -> &SelectionStore {
        &self.store
    }

    pub fn is_owned(&self, slot: Slot) -> bool {
        self.state.is_owned(slot)
    }

    /// Take ownership of `slot` without touching its snapshot.
    ///
    /// Returns `true` if the server confirms us as the owner afterwards.
    pub fn claim<C: SelectionConnection>(
        &mut self,
        session: &mut Session<C>,
        slot: Slot,
    ) -> Result<bool, ConnectionError> {
        let selection = session.slot_atom(slot);
        let window = session.window();
        session.conn_mut().set_selection_owner(selection)?;

        let owner = session.conn_mut().selection_owner(selection)?;
        let owned = owner == Some(window);
        if !owned {
            warn!("Claim of {} did not stick (owner: {:?})", slot, owner);
        }
        self.state.set(slot, owned);
        Ok(owned)
    }

    /// Copy the current content of `slot` from its owner, then claim it.
    ///
    /// Formats the owner cannot deliver are left out of the snapshot. Only
    /// fatal connection errors are returned.
    pub fn refresh<C: SelectionConnection>(
        &mut self,
        session: &mut Session<C>,
        slot: Slot,
    ) -> Result<bool, ConnectionError> {
        let selection = session.slot_atom(slot);
        let owner = soft(session.conn_mut().selection_owner(selection), || {
            format!("Could not query the owner of {slot}")
        })?;
        if owner.flatten() == Some(session.window()) {
            debug!("Already the owner of {}, keeping current snapshot", slot);
            return self.claim(session, slot);
        }

        self.state.set(slot, false);

        let targets = soft(fetcher::list_formats(session, slot), || {
            format!("Could not list the formats of {slot}")
        })?
        .unwrap_or_default();
        debug!("Got {:?} for selection {}", targets, slot);

        let mut formats = FormatMap::new();
        for target in targets {
            if is_synthetic_format(&target) || formats.contains_key(&target) {
                continue;
            }
            let value = soft(fetcher::fetch(session, slot, &target), || {
                format!("Could not fetch {target} from {slot}")
            })?;
            if let Some(value) = value.flatten() {
                formats.insert(target, value);
            }
        }

        info!("Stored {} format(s) for {}", formats.len(), slot);
        self.store.replace(slot, formats);
        self.claim(session, slot)
    }

    /// Refresh every slot; used once at startup.
    pub fn refresh_all<C: SelectionConnection>(
        &mut self,
        session: &mut Session<C>,
    ) -> Result<(), StartupError> {
        for slot in Slot::ALL {
            if !self.refresh(session, slot)? {
                return Err(StartupError::Ownership { slot });
            }
        }
        Ok(())
    }

    /// React to losing `slot` to another client.
    pub fn handle_loss<C: SelectionConnection>(
        &mut self,
        session: &mut Session<C>,
        slot: Slot,
    ) -> Result<(), ConnectionError> {
        warn!("New content on {}, assuming ownership", slot);
        self.state.set(slot, false);

        match self.refresh(session, slot) {
            Ok(true) => warn!("Owner of {} again", slot),
            Ok(false) => warn!("Could not reclaim {}; requests for it will be refused", slot),
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => warn!("Could not reclaim {}: {}", slot, e),
        }
        Ok(())
    }
}

/// Turn a non-fatal request error into `None`, logging `context`.
fn soft<T>(
    result: Result<T, ConnectionError>,
    context: impl FnOnce() -> String,
) -> Result<Option<T>, ConnectionError> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(e) if e.is_fatal() => Err(e),
        Err(e) => {
            warn!("{}: {}", context(), e);
            Ok(None)
        }
    }
}
