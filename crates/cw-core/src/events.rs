//! Correlated waits over the single event stream.
//!
//! While the engine waits for a specific reply (a `SelectionNotify`, or the
//! next INCR chunk), unrelated events keep arriving on the same connection.
//! Requests and ownership-loss notifications among them are deferred and
//! replayed, in arrival order, before any new event is read. Other
//! non-matching events only ever matter to the transfer that was in flight
//! and are dropped.

use crate::connection::{Event, SelectionConnection};
use crate::error::ConnectionError;
use std::collections::VecDeque;
use std::time::{Duration, Instant};
use tracing::trace;

/// Deferred-event buffer for one connection.
#[derive(Debug, Default)]
pub struct EventQueue {
    deferred: VecDeque<Event>,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Next event to dispatch: deferred events first, then the connection.
    pub fn next<C: SelectionConnection>(&mut self, conn: &mut C) -> Result<Event, ConnectionError> {
        if let Some(event) = self.deferred.pop_front() {
            return Ok(event);
        }
        conn.next_event()
    }

    #[cfg(test)]
    fn pop_deferred(&mut self) -> Option<Event> {
        self.deferred.pop_front()
    }

    /// Wait up to `timeout` for an event accepted by `matches`.
    ///
    /// Returns `Ok(None)` on timeout. Deferred events are not consulted:
    /// they were already rejected by an earlier wait or predate the request
    /// being awaited.
    pub fn wait_for<C, F>(
        &mut self,
        conn: &mut C,
        timeout: Duration,
        mut matches: F,
    ) -> Result<Option<Event>, ConnectionError>
    where
        C: SelectionConnection,
        F: FnMut(&Event) -> bool,
    {
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(None);
            }
            let Some(event) = conn.poll_event(remaining)? else {
                return Ok(None);
            };
            if matches(&event) {
                return Ok(Some(event));
            }
            self.defer(event);
        }
    }

    fn defer(&mut self, event: Event) {
        match event {
            Event::SelectionRequest(_) | Event::SelectionClear { .. } => {
                trace!("Deferring {:?} until the current wait completes", event);
                self.deferred.push_back(event);
            }
            other => trace!("Dropping {:?} received during a wait", other),
        }
    }

    /// Number of events waiting to be replayed.
    pub fn deferred_len(&self) -> usize {
        self.deferred.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::SelectionRequest;
    use crate::testing::FakeConnection;

    fn request(requestor: u32) -> Event {
        Event::SelectionRequest(SelectionRequest {
            time: 0,
            owner: 1,
            requestor,
            selection: 1,
            target: 2,
            property: Some(3),
        })
    }

    #[test]
    fn test_wait_defers_requests_and_returns_match() {
        let mut conn = FakeConnection::new();
        conn.push_event(request(50));
        conn.push_event(Event::Other);
        conn.push_event(Event::PropertyNewValue { window: 1, atom: 9 });

        let mut queue = EventQueue::new();
        let found = queue
            .wait_for(&mut conn, Duration::from_secs(1), |e| {
                matches!(e, Event::PropertyNewValue { .. })
            })
            .unwrap();

        assert_eq!(found, Some(Event::PropertyNewValue { window: 1, atom: 9 }));
        assert_eq!(queue.deferred_len(), 1);
        assert_eq!(queue.next(&mut conn).unwrap(), request(50));
    }

    #[test]
    fn test_wait_times_out_when_stream_is_idle() {
        let mut conn = FakeConnection::new();
        let mut queue = EventQueue::new();
        let found = queue
            .wait_for(&mut conn, Duration::from_millis(10), |_| true)
            .unwrap();
        assert!(found.is_none());
    }

    #[test]
    fn test_deferred_events_replay_in_order() {
        let mut conn = FakeConnection::new();
        conn.push_event(request(1));
        conn.push_event(Event::SelectionClear {
            time: 0,
            owner: 1,
            selection: 5,
        });
        conn.push_event(request(2));

        let mut queue = EventQueue::new();
        let found = queue
            .wait_for(&mut conn, Duration::from_millis(10), |_| false)
            .unwrap();
        assert!(found.is_none());
        assert_eq!(queue.deferred_len(), 3);

        assert_eq!(queue.pop_deferred(), Some(request(1)));
        assert!(matches!(
            queue.pop_deferred(),
            Some(Event::SelectionClear { .. })
        ));
        assert_eq!(queue.pop_deferred(), Some(request(2)));
    }
}
