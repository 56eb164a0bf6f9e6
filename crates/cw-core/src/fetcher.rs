//! Content fetcher: pulls a selection's content from its current owner.
//!
//! Conversions are written by the owner into the delivery property on our
//! window. Large payloads arrive as an INCR transfer: the owner first writes
//! a property of type `INCR`, then one chunk each time we delete the
//! property, and finally a zero-length chunk.

use crate::connection::{Event, SelectionConnection};
use crate::error::ConnectionError;
use crate::selection::{Slot, TARGETS, Value};
use crate::session::Session;
use tracing::{debug, info, warn};

/// Fetch the content of `slot` converted to `format`.
///
/// Returns `Ok(None)` when nobody owns the slot, when the owner refuses the
/// conversion, or when the owner stops answering. Only connection failures
/// are returned as errors.
pub fn fetch<C: SelectionConnection>(
    session: &mut Session<C>,
    slot: Slot,
    format: &str,
) -> Result<Option<Value>, ConnectionError> {
    let selection = session.slot_atom(slot);
    let target = session.intern(format)?;
    let delivery = session.atoms().delivery;
    let window = session.window();

    let Some(owner) = session.conn_mut().selection_owner(selection)? else {
        info!("No owner for selection {}", slot);
        return Ok(None);
    };
    if owner == window {
        debug!("We already own {}, nothing to fetch for {}", slot, format);
        return Ok(None);
    }

    session
        .conn_mut()
        .convert_selection(selection, target, delivery)?;

    let timeout = session.options().reply_timeout;
    let reply = session.wait_for(timeout, |event| match event {
        Event::SelectionNotify(n) if n.requestor == window => {
            let ours = n.selection == selection && n.target == target;
            if !ours {
                info!(
                    "Ignoring SelectionNotify that does not match our request for {} {}: {:?}",
                    slot, format, n
                );
            }
            ours
        }
        _ => false,
    })?;
    let Some(Event::SelectionNotify(notify)) = reply else {
        warn!(
            "Owner {} of {} did not answer conversion to {} within {:?}",
            owner, slot, format, timeout
        );
        return Ok(None);
    };

    let Some(property) = notify.property else {
        info!("Selection {} lost or conversion to {} failed", slot, format);
        return Ok(None);
    };
    if property != delivery {
        info!(
            "SelectionNotify names property {} instead of {}, reading it anyway",
            property, delivery
        );
    }

    let Some(first) = session.conn_mut().read_property(window, property)? else {
        debug!("Conversion of {} to {} left no property", slot, format);
        return Ok(None);
    };

    let value = if first.type_atom == session.atoms().incr {
        let announced = first.as_u32s().and_then(|v| v.first().copied());
        info!(
            "Reading {} {} incrementally: at least {} bytes",
            slot,
            format,
            announced.unwrap_or(0)
        );
        let Some(value) = read_incremental(session, property)? else {
            return Ok(None);
        };
        value
    } else {
        first
    };

    // Tell the owner we're done
    session.conn_mut().delete_property(window, property)?;
    Ok(Some(value))
}

/// Reassemble an INCR transfer delivered into `property`.
fn read_incremental<C: SelectionConnection>(
    session: &mut Session<C>,
    property: u32,
) -> Result<Option<Value>, ConnectionError> {
    let window = session.window();
    let timeout = session.options().chunk_timeout;
    let mut assembled: Option<Value> = None;

    loop {
        // Deleting the property asks the owner for the next chunk
        session.conn_mut().delete_property(window, property)?;

        let update = session.wait_for(timeout, |event| {
            matches!(
                event,
                Event::PropertyNewValue { window: w, atom } if *w == window && *atom == property
            )
        })?;
        if update.is_none() {
            warn!(
                "INCR transfer stalled after {} bytes, abandoning it",
                assembled.as_ref().map_or(0, |v| v.bytes.len())
            );
            return Ok(None);
        }

        let Some(chunk) = session.conn_mut().read_property(window, property)? else {
            warn!("INCR chunk property vanished before it could be read");
            return Ok(None);
        };

        if chunk.bytes.is_empty() {
            let value = assembled.unwrap_or(chunk);
            debug!("INCR transfer complete: {} bytes", value.bytes.len());
            return Ok(Some(value));
        }

        match assembled.as_mut() {
            Some(value) => value.bytes.extend_from_slice(&chunk.bytes),
            None => assembled = Some(chunk),
        }
    }
}

/// Ask the owner of `slot` which formats it can provide.
///
/// Returns an empty list when there is no owner or the answer is not a
/// list of atoms.
pub fn list_formats<C: SelectionConnection>(
    session: &mut Session<C>,
    slot: Slot,
) -> Result<Vec<String>, ConnectionError> {
    let Some(reply) = fetch(session, slot, TARGETS)? else {
        return Ok(Vec::new());
    };
    if reply.type_atom != session.atoms().atom {
        info!("TARGETS reply for {} is not an atom list", slot);
        return Ok(Vec::new());
    }
    let Some(atoms) = reply.as_u32s() else {
        info!("TARGETS reply for {} is not 32-bit", slot);
        return Ok(Vec::new());
    };

    let mut names = Vec::with_capacity(atoms.len());
    for atom in atoms {
        match session.atom_name(atom) {
            Ok(name) => names.push(name),
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => warn!("Skipping unnamed target atom {}: {}", atom, e),
        }
    }
    Ok(names)
}
