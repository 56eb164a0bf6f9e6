//! Event dispatcher: the protocol thread's main loop.
//!
//! The dispatcher owns the session, the ownership manager and the
//! attribution resolver. It reads one event at a time and routes it:
//!
//! ```text
//! SelectionRequest ──► attribution ──► responder ──► access channel
//! SelectionClear   ──► ownership manager (refresh + reclaim)
//! anything else    ──► ignored
//! ```
//!
//! Access records go out through a bounded channel with `try_send`; a full
//! channel drops the record instead of stalling the protocol thread.

use crate::attribution::{Attribution, AttributionResolver};
use crate::connection::{Event, SelectionConnection, SelectionRequest};
use crate::error::{ConnectionError, StartupError};
use crate::ownership::OwnershipManager;
use crate::process::ProcessLookup;
use crate::record::AccessRecord;
use crate::responder::{self, Reply};
use crate::selection::{Slot, TARGETS};
use crate::session::Session;
use tokio::sync::mpsc::{Sender, error::TrySendError};
use tracing::{debug, info, trace, warn};

/// What handling one event amounted to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatched {
    /// A request addressed to us was answered.
    Answered { reply: Reply, recorded: bool },
    /// A slot was lost and refreshed.
    Reclaimed { slot: Slot, owned: bool },
    /// Not for us, or not an event we act on.
    Ignored,
}

pub struct Dispatcher<C, P> {
    session: Session<C>,
    ownership: OwnershipManager,
    resolver: AttributionResolver<P>,
    access_tx: Sender<AccessRecord>,
}

impl<C: SelectionConnection, P: ProcessLookup> Dispatcher<C, P> {
    pub fn new(session: Session<C>, lookup: P, access_tx: Sender<AccessRecord>) -> Self {
        Self {
            session,
            ownership: OwnershipManager::new(),
            resolver: AttributionResolver::new(lookup),
            access_tx,
        }
    }

    /// Take initial ownership of every slot.
    pub fn start(&mut self) -> Result<(), StartupError> {
        debug!("Getting selection data");
        self.ownership.refresh_all(&mut self.session)?;
        debug!("Taken ownership of all selections");
        Ok(())
    }

    /// Dispatch events until the connection fails.
    pub fn run(&mut self) -> Result<(), ConnectionError> {
        loop {
            let event = self.session.next_event()?;
            match self.handle_event(event) {
                Ok(_) => {}
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => warn!("Event handling failed: {}", e),
            }
        }
    }

    /// Route a single event.
    pub fn handle_event(&mut self, event: Event) -> Result<Dispatched, ConnectionError> {
        match event {
            Event::SelectionRequest(request) if request.owner == self.session.window() => {
                self.handle_request(&request)
            }
            Event::SelectionClear {
                owner, selection, ..
            } if owner == self.session.window() => match self.session.slot_for(selection) {
                Some(slot) => {
                    self.ownership.handle_loss(&mut self.session, slot)?;
                    Ok(Dispatched::Reclaimed {
                        slot,
                        owned: self.ownership.is_owned(slot),
                    })
                }
                None => {
                    debug!("Lost unmanaged selection {}", selection);
                    Ok(Dispatched::Ignored)
                }
            },
            other => {
                trace!("Ignoring {:?}", other);
                Ok(Dispatched::Ignored)
            }
        }
    }

    fn handle_request(&mut self, request: &SelectionRequest) -> Result<Dispatched, ConnectionError> {
        let slot = self.session.slot_for(request.selection);
        let owned = slot.is_some_and(|s| self.ownership.is_owned(s));

        // Identity first: the requestor may exit as soon as it is answered
        let attribution = match slot {
            Some(_) if owned => Some(self.resolver.resolve(&mut self.session, request.requestor)?),
            _ => None,
        };

        let reply = responder::respond(&mut self.session, self.ownership.store(), request, owned)?;

        let recorded = match (slot, attribution) {
            (Some(slot), Some(attribution)) => {
                self.log_reply(slot, &reply, &attribution);
                reply.target_name != TARGETS
                    && self.enqueue(AccessRecord::new(attribution, slot, &reply.target_name))
            }
            _ => false,
        };

        Ok(Dispatched::Answered { reply, recorded })
    }

    fn log_reply(&self, slot: Slot, reply: &Reply, attribution: &Attribution) {
        let who = attribution.name.as_deref().unwrap_or("unnamed");
        if reply.target_name == TARGETS {
            info!(
                "Sent {} targets to {} ({})",
                slot, who, attribution.window
            );
        } else {
            warn!(
                "Sent {} (target: {}) selection to {} ({})",
                slot, reply.target_name, who, attribution.window
            );
        }
    }

    fn enqueue(&self, record: AccessRecord) -> bool {
        match self.access_tx.try_send(record) {
            Ok(()) => true,
            Err(TrySendError::Full(record)) => {
                warn!(
                    "Access queue full, dropping record for {} ({})",
                    record.requestor, record.target
                );
                false
            }
            Err(TrySendError::Closed(_)) => {
                warn!("Access queue closed, record dropped");
                false
            }
        }
    }

    pub fn session(&self) -> &Session<C> {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut Session<C> {
        &mut self.session
    }

    pub fn ownership(&self) -> &OwnershipManager {
        &self.ownership
    }

    pub fn resolver(&self) -> &AttributionResolver<P> {
        &self.resolver
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::responder::{Outcome, RefusalReason};
    use crate::session::ProtocolOptions;
    use crate::testing::{ExternalOwner, FakeConnection, RecordingLookup};
    use std::time::Duration;
    use tokio::sync::mpsc;

    type TestDispatcher = Dispatcher<FakeConnection, RecordingLookup>;

    fn dispatcher(capacity: usize) -> (TestDispatcher, mpsc::Receiver<AccessRecord>) {
        dispatcher_with(FakeConnection::new(), RecordingLookup::new(), capacity)
    }

    fn dispatcher_with(
        conn: FakeConnection,
        lookup: RecordingLookup,
        capacity: usize,
    ) -> (TestDispatcher, mpsc::Receiver<AccessRecord>) {
        let options = ProtocolOptions {
            reply_timeout: Duration::from_millis(50),
            chunk_timeout: Duration::from_millis(50),
            ..ProtocolOptions::default()
        };
        let session = Session::new(conn, options).unwrap();
        let (tx, rx) = mpsc::channel(capacity);
        let mut dispatcher = Dispatcher::new(session, lookup, tx);
        dispatcher.start().unwrap();
        (dispatcher, rx)
    }

    fn request(d: &mut TestDispatcher, selection: &str, target: &str, requestor: u32) -> Event {
        let session = d.session_mut();
        Event::SelectionRequest(SelectionRequest {
            time: 7,
            owner: session.window(),
            requestor,
            selection: session.intern(selection).unwrap(),
            target: session.intern(target).unwrap(),
            property: Some(session.intern("XSEL_DATA").unwrap()),
        })
    }

    fn load_clipboard(d: &mut TestDispatcher, text: &str) {
        d.session_mut().conn_mut().set_external_owner(
            Slot::Clipboard,
            ExternalOwner::new(900).with_text("UTF8_STRING", text),
        );
        let clipboard = d.session().slot_atom(Slot::Clipboard);
        let window = d.session().window();
        d.handle_event(Event::SelectionClear {
            time: 0,
            owner: window,
            selection: clipboard,
        })
        .unwrap();
    }

    #[test]
    fn test_request_is_answered_and_recorded() {
        let (mut d, mut rx) = dispatcher(8);
        load_clipboard(&mut d, "hello");
        d.session_mut().conn_mut().set_client_pid(600, 4242);

        let event = request(&mut d, "CLIPBOARD", "UTF8_STRING", 600);
        let result = d.handle_event(event).unwrap();

        let Dispatched::Answered { reply, recorded } = result else {
            panic!("expected an answer");
        };
        assert_eq!(reply.outcome, Outcome::Served { bytes: 5 });
        assert!(recorded);

        let record = rx.try_recv().unwrap();
        assert_eq!(record.requestor, 600);
        assert_eq!(record.pid, Some(4242));
        assert_eq!(record.slot, Slot::Clipboard);
        assert_eq!(record.target, "UTF8_STRING");
    }

    #[test]
    fn test_targets_request_is_not_recorded() {
        let (mut d, mut rx) = dispatcher(8);
        let event = request(&mut d, "PRIMARY", "TARGETS", 600);

        let result = d.handle_event(event).unwrap();

        assert!(matches!(
            result,
            Dispatched::Answered {
                recorded: false,
                ..
            }
        ));
        assert!(rx.try_recv().is_err());
        assert_eq!(d.session().conn().sent_notifies().len(), 1);
    }

    #[test]
    fn test_exactly_one_acknowledgement_per_request() {
        let (mut d, _rx) = dispatcher(8);
        load_clipboard(&mut d, "hello");

        let events = vec![
            request(&mut d, "CLIPBOARD", "UTF8_STRING", 601),
            request(&mut d, "CLIPBOARD", "image/png", 602),
            request(&mut d, "SECONDARY", "UTF8_STRING", 603),
            request(&mut d, "PRIMARY", "TARGETS", 604),
        ];
        for event in events {
            d.handle_event(event).unwrap();
        }

        let sent = d.session().conn().sent_notifies();
        let requestors: Vec<u32> = sent.iter().map(|n| n.requestor).collect();
        assert_eq!(requestors, vec![601, 602, 603, 604]);
        assert!(sent[0].property.is_some());
        assert!(sent[1].property.is_none());
        assert!(sent[2].property.is_none());
        assert!(sent[3].property.is_some());
    }

    #[test]
    fn test_unrecognized_slot_is_acknowledged_not_recorded() {
        let (mut d, mut rx) = dispatcher(8);
        let event = request(&mut d, "SECONDARY", "UTF8_STRING", 610);

        let result = d.handle_event(event).unwrap();

        let Dispatched::Answered { reply, recorded } = result else {
            panic!("expected an answer");
        };
        assert_eq!(
            reply.outcome,
            Outcome::Refused(RefusalReason::UnknownSelection)
        );
        assert!(!recorded);
        assert!(rx.try_recv().is_err());
        assert!(d.resolver().lookup().calls().is_empty());
    }

    #[test]
    fn test_request_for_other_owner_is_ignored() {
        let (mut d, _rx) = dispatcher(8);
        let Event::SelectionRequest(mut req) = request(&mut d, "CLIPBOARD", "UTF8_STRING", 620)
        else {
            unreachable!()
        };
        req.owner = 12345;

        let result = d.handle_event(Event::SelectionRequest(req)).unwrap();

        assert_eq!(result, Dispatched::Ignored);
        assert!(d.session().conn().sent_notifies().is_empty());
    }

    #[test]
    fn test_loss_then_reclaim_through_dispatcher() {
        let (mut d, _rx) = dispatcher(8);

        load_clipboard(&mut d, "hello");

        let store = d.ownership().store();
        assert_eq!(store.formats(Slot::Clipboard), vec!["UTF8_STRING"]);
        assert_eq!(
            store.get(Slot::Clipboard, "UTF8_STRING").unwrap().bytes,
            b"hello"
        );
        assert!(d.ownership().is_owned(Slot::Clipboard));
    }

    #[test]
    fn test_attribution_happens_before_acknowledgement() {
        let conn = FakeConnection::new();
        let journal = conn.journal();
        let lookup = RecordingLookup::with_journal(journal.clone());
        let (mut d, _rx) = dispatcher_with(conn, lookup, 8);
        load_clipboard(&mut d, "hello");
        d.session_mut().conn_mut().set_client_pid(630, 77);
        journal.lock().unwrap().clear();

        let event = request(&mut d, "CLIPBOARD", "UTF8_STRING", 630);
        d.handle_event(event).unwrap();

        let entries = journal.lock().unwrap().clone();
        let lookup = entries.iter().position(|e| e == "lookup:77").unwrap();
        let ack = entries.iter().position(|e| e == "send_notify:630").unwrap();
        assert!(lookup < ack, "journal: {entries:?}");
    }

    #[test]
    fn test_full_queue_drops_without_blocking() {
        let (mut d, mut rx) = dispatcher(1);
        load_clipboard(&mut d, "hello");

        let first = request(&mut d, "CLIPBOARD", "UTF8_STRING", 640);
        let second = request(&mut d, "CLIPBOARD", "UTF8_STRING", 641);
        let r1 = d.handle_event(first).unwrap();
        let r2 = d.handle_event(second).unwrap();

        assert!(matches!(r1, Dispatched::Answered { recorded: true, .. }));
        assert!(matches!(r2, Dispatched::Answered { recorded: false, .. }));
        assert_eq!(d.session().conn().sent_notifies().len(), 2);
        assert_eq!(rx.try_recv().unwrap().requestor, 640);
    }

    #[test]
    fn test_requests_during_refresh_are_replayed() {
        let (mut d, _rx) = dispatcher(8);
        let early = request(&mut d, "PRIMARY", "TARGETS", 650);
        d.session_mut().conn_mut().set_external_owner(
            Slot::Clipboard,
            ExternalOwner::new(900).with_text("UTF8_STRING", "hello"),
        );
        d.session_mut().conn_mut().queue_before_reply(early);
        let clipboard = d.session().slot_atom(Slot::Clipboard);
        let window = d.session().window();
        d.session_mut().conn_mut().push_event(Event::SelectionClear {
            time: 0,
            owner: window,
            selection: clipboard,
        });

        // The clear triggers the refresh; the request arrives mid-refresh
        let clear = d.session_mut().next_event().unwrap();
        d.handle_event(clear).unwrap();
        assert!(d.session().conn().sent_notifies().is_empty());

        let replayed = d.session_mut().next_event().unwrap();
        d.handle_event(replayed).unwrap();
        let sent = d.session().conn().sent_notifies();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].requestor, 650);
    }

    #[test]
    fn test_run_stops_on_closed_stream() {
        let (mut d, _rx) = dispatcher(8);
        let event = request(&mut d, "PRIMARY", "TARGETS", 660);
        d.session_mut().conn_mut().push_event(event);

        let err = d.run().unwrap_err();

        assert!(matches!(err, ConnectionError::Closed));
        assert_eq!(d.session().conn().sent_notifies().len(), 1);
    }
}
