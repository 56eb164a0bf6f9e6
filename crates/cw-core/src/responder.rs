//! Request responder: answers conversions asked of us as selection owner.
//!
//! Every request gets exactly one `SelectionNotify`, whether it could be
//! served or not. A requestor that never hears back waits forever, and with
//! it the user's paste.

use crate::connection::{Atom, SelectionConnection, SelectionNotify, SelectionRequest};
use crate::error::ConnectionError;
use crate::selection::{TARGETS, Value};
use crate::session::Session;
use crate::store::SelectionStore;
use tracing::{debug, info, warn};

/// How a request was answered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The TARGETS list was written.
    Targets { count: usize },
    /// A stored value was written.
    Served { bytes: usize },
    /// Nothing was written; the acknowledgement carried no property.
    Refused(RefusalReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefusalReason {
    /// The selection is not one of ours.
    UnknownSelection,
    /// We hold the selection but not in the requested format.
    UnknownTarget,
    /// We hold the selection's slot but are not currently its owner.
    NotOwned,
    /// The requestor's property could not be written.
    WriteFailed,
    /// The TARGETS list could not be built.
    TargetsUnavailable,
}

/// Result of answering one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub target_name: String,
    pub outcome: Outcome,
    /// The acknowledgement that was sent.
    pub notify: SelectionNotify,
}

/// Answer `request` from `store` and send the acknowledgement.
///
/// `owned` tells whether the request's slot is currently held by us; a
/// request for a slot we do not hold is refused.
pub fn respond<C: SelectionConnection>(
    session: &mut Session<C>,
    store: &SelectionStore,
    request: &SelectionRequest,
    owned: bool,
) -> Result<Reply, ConnectionError> {
    let target_name = session.describe_atom(request.target);

    let property = match request.property {
        Some(property) => property,
        None => {
            info!("Request from obsolete client {}", request.requestor);
            request.target
        }
    };

    let value = match session.slot_for(request.selection) {
        None => {
            info!("Received selection request for other selection");
            Err(RefusalReason::UnknownSelection)
        }
        Some(slot) if !owned => {
            info!("Received request for {} while not owning it", slot);
            Err(RefusalReason::NotOwned)
        }
        Some(slot) if target_name == TARGETS => match targets_value(session, store, slot) {
            Ok(value) => Ok(value),
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                warn!("Could not build TARGETS for {}: {}", slot, e);
                Err(RefusalReason::TargetsUnavailable)
            }
        },
        Some(slot) => match store.get(slot, &target_name) {
            Some(value) => Ok(value.clone()),
            None => {
                info!("Received selection request for invalid target {}", target_name);
                Err(RefusalReason::UnknownTarget)
            }
        },
    };

    let outcome = match value {
        Ok(value) => write_reply(session, request.requestor, property, &target_name, &value),
        Err(reason) => Outcome::Refused(reason),
    };

    let notify = SelectionNotify {
        time: request.time,
        requestor: request.requestor,
        selection: request.selection,
        target: request.target,
        property: match outcome {
            Outcome::Refused(_) => None,
            _ => Some(property),
        },
    };
    session.conn_mut().send_notify(&notify)?;

    debug!(
        "Answered {} request from {}: {:?}",
        target_name, request.requestor, outcome
    );
    Ok(Reply {
        target_name,
        outcome,
        notify,
    })
}

fn targets_value<C: SelectionConnection>(
    session: &mut Session<C>,
    store: &SelectionStore,
    slot: crate::selection::Slot,
) -> Result<Value, ConnectionError> {
    let mut atoms: Vec<Atom> = vec![session.atoms().targets];
    for name in store.formats(slot) {
        atoms.push(session.intern(name)?);
    }
    Ok(Value::from_atoms(&atoms, session.atoms().atom))
}

fn write_reply<C: SelectionConnection>(
    session: &mut Session<C>,
    requestor: u32,
    property: Atom,
    target_name: &str,
    value: &Value,
) -> Outcome {
    if let Err(e) = session.conn_mut().write_property(requestor, property, value) {
        warn!(
            "Could not write {} for requestor {}: {}",
            target_name, requestor, e
        );
        return Outcome::Refused(RefusalReason::WriteFailed);
    }
    if target_name == TARGETS {
        Outcome::Targets {
            count: value.unit_count(),
        }
    } else {
        Outcome::Served {
            bytes: value.bytes.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::selection::{PropFormat, Slot};
    use crate::session::ProtocolOptions;
    use crate::store::FormatMap;
    use crate::testing::FakeConnection;

    const REQUESTOR: u32 = 500;

    fn setup() -> (Session<FakeConnection>, SelectionStore) {
        let mut session = Session::new(FakeConnection::new(), ProtocolOptions::default()).unwrap();
        let utf8 = session.atoms().utf8_string;
        let mut store = SelectionStore::new();
        let mut map = FormatMap::new();
        map.insert(
            "UTF8_STRING".to_string(),
            Value::new(b"secret".to_vec(), PropFormat::Bits8, utf8),
        );
        store.replace(Slot::Clipboard, map);
        let _ = session.intern("PROP").unwrap();
        (session, store)
    }

    fn request(session: &mut Session<FakeConnection>, selection: &str, target: &str) -> SelectionRequest {
        SelectionRequest {
            time: 42,
            owner: session.window(),
            requestor: REQUESTOR,
            selection: session.intern(selection).unwrap(),
            target: session.intern(target).unwrap(),
            property: Some(session.intern("PROP").unwrap()),
        }
    }

    #[test]
    fn test_serves_stored_value_verbatim() {
        let (mut session, store) = setup();
        let req = request(&mut session, "CLIPBOARD", "UTF8_STRING");

        let reply = respond(&mut session, &store, &req, true).unwrap();

        assert_eq!(reply.outcome, Outcome::Served { bytes: 6 });
        assert_eq!(reply.notify.property, req.property);
        assert_eq!(reply.notify.time, 42);
        let written = session
            .conn()
            .property(REQUESTOR, req.property.unwrap())
            .unwrap();
        assert_eq!(&written, store.get(Slot::Clipboard, "UTF8_STRING").unwrap());
        assert_eq!(session.conn().sent_notifies(), &[reply.notify]);
    }

    #[test]
    fn test_targets_always_answerable() {
        let (mut session, _) = setup();
        let empty = SelectionStore::new();
        let req = request(&mut session, "PRIMARY", "TARGETS");

        let reply = respond(&mut session, &empty, &req, true).unwrap();

        assert_eq!(reply.outcome, Outcome::Targets { count: 1 });
        let written = session
            .conn()
            .property(REQUESTOR, req.property.unwrap())
            .unwrap();
        assert_eq!(written.type_atom, session.atoms().atom);
        assert_eq!(written.as_u32s().unwrap(), vec![session.atoms().targets]);
    }

    #[test]
    fn test_targets_lists_stored_formats() {
        let (mut session, store) = setup();
        let req = request(&mut session, "CLIPBOARD", "TARGETS");

        respond(&mut session, &store, &req, true).unwrap();

        let written = session
            .conn()
            .property(REQUESTOR, req.property.unwrap())
            .unwrap();
        let names: Vec<String> = written
            .as_u32s()
            .unwrap()
            .into_iter()
            .map(|a| session.atom_name(a).unwrap())
            .collect();
        assert_eq!(names, vec!["TARGETS", "UTF8_STRING"]);
    }

    #[test]
    fn test_unknown_target_is_refused_but_acknowledged() {
        let (mut session, store) = setup();
        let req = request(&mut session, "CLIPBOARD", "image/png");

        let reply = respond(&mut session, &store, &req, true).unwrap();

        assert_eq!(reply.outcome, Outcome::Refused(RefusalReason::UnknownTarget));
        assert_eq!(reply.notify.property, None);
        assert_eq!(session.conn().sent_notifies().len(), 1);
        assert!(session.conn().property(REQUESTOR, req.property.unwrap()).is_none());
    }

    #[test]
    fn test_unknown_selection_is_refused_but_acknowledged() {
        let (mut session, store) = setup();
        let req = request(&mut session, "SECONDARY", "UTF8_STRING");

        let reply = respond(&mut session, &store, &req, true).unwrap();

        assert_eq!(
            reply.outcome,
            Outcome::Refused(RefusalReason::UnknownSelection)
        );
        assert_eq!(session.conn().sent_notifies().len(), 1);
    }

    #[test]
    fn test_not_owned_slot_is_refused() {
        let (mut session, store) = setup();
        let req = request(&mut session, "CLIPBOARD", "UTF8_STRING");

        let reply = respond(&mut session, &store, &req, false).unwrap();

        assert_eq!(reply.outcome, Outcome::Refused(RefusalReason::NotOwned));
        assert_eq!(session.conn().sent_notifies().len(), 1);
    }

    #[test]
    fn test_obsolete_client_gets_target_as_property() {
        let (mut session, store) = setup();
        let mut req = request(&mut session, "CLIPBOARD", "UTF8_STRING");
        req.property = None;

        let reply = respond(&mut session, &store, &req, true).unwrap();

        assert_eq!(reply.notify.property, Some(req.target));
        assert!(session.conn().property(REQUESTOR, req.target).is_some());
    }

    #[test]
    fn test_failed_write_is_refused() {
        let (mut session, store) = setup();
        session.conn_mut().fail_writes_to(REQUESTOR);
        let req = request(&mut session, "CLIPBOARD", "UTF8_STRING");

        let reply = respond(&mut session, &store, &req, true).unwrap();

        assert_eq!(reply.outcome, Outcome::Refused(RefusalReason::WriteFailed));
        assert_eq!(reply.notify.property, None);
        assert_eq!(session.conn().sent_notifies().len(), 1);
    }

    #[test]
    fn test_unbuildable_targets_is_refused_but_acknowledged() {
        let (mut session, store) = setup();
        let req = request(&mut session, "CLIPBOARD", "TARGETS");
        session.conn_mut().fail_intern_of("UTF8_STRING");

        let reply = respond(&mut session, &store, &req, true).unwrap();

        assert_eq!(
            reply.outcome,
            Outcome::Refused(RefusalReason::TargetsUnavailable)
        );
        assert_eq!(reply.notify.property, None);
        assert_eq!(session.conn().sent_notifies().len(), 1);
    }
}
