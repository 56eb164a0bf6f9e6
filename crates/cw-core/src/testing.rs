//! In-memory display server for tests.
//!
//! [`FakeConnection`] implements [`SelectionConnection`] over plain maps and
//! a scripted event queue. Other clients are simulated with
//! [`ExternalOwner`]: when the engine converts a selection they own, the
//! fake writes the answer into our window's property and queues the events
//! a real server would deliver, including INCR chunking.
//!
//! Every externally visible call is appended to a shared journal so tests
//! can assert on ordering.

use crate::connection::{Atom, Event, SelectionConnection, SelectionNotify, Window};
use crate::error::ConnectionError;
use crate::process::{ProcessInfo, ProcessLookup};
use crate::selection::{PropFormat, Slot, TARGETS, Value};
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Ordered log of calls, shared between fakes.
pub type Journal = Arc<Mutex<Vec<String>>>;

#[derive(Debug, Clone)]
enum Content {
    Plain(Vec<u8>),
    Chunked(Vec<Vec<u8>>),
    /// Listed in TARGETS, refused on conversion.
    Advertised,
}

/// A simulated client owning a selection.
#[derive(Debug, Clone)]
pub struct ExternalOwner {
    window: Window,
    formats: Vec<(String, Content)>,
    raw_targets: Option<Vec<u8>>,
    silent: bool,
    stall_after: Option<usize>,
}

impl ExternalOwner {
    pub fn new(window: Window) -> Self {
        Self {
            window,
            formats: Vec::new(),
            raw_targets: None,
            silent: false,
            stall_after: None,
        }
    }

    /// Offer `format` with an 8-bit payload of type `format`.
    pub fn with_text(mut self, format: &str, text: &str) -> Self {
        self.formats
            .push((format.to_string(), Content::Plain(text.as_bytes().to_vec())));
        self
    }

    /// Offer `format` through an INCR transfer of `chunks`; the terminating
    /// zero-length chunk is added automatically.
    pub fn with_chunks(mut self, format: &str, chunks: &[&str]) -> Self {
        let chunks = chunks.iter().map(|c| c.as_bytes().to_vec()).collect();
        self.formats
            .push((format.to_string(), Content::Chunked(chunks)));
        self
    }

    /// List `format` in TARGETS but refuse to convert to it.
    pub fn advertise(mut self, format: &str) -> Self {
        self.formats.push((format.to_string(), Content::Advertised));
        self
    }

    /// Answer TARGETS with an 8-bit `STRING` payload instead of atoms.
    pub fn with_raw_targets(mut self, bytes: Vec<u8>) -> Self {
        self.raw_targets = Some(bytes);
        self
    }

    /// Never answer conversions.
    pub fn silent(mut self) -> Self {
        self.silent = true;
        self
    }

    /// Stop sending INCR chunks after `n` of them.
    pub fn stall_after_chunks(mut self, n: usize) -> Self {
        self.stall_after = Some(n);
        self
    }
}

#[derive(Debug)]
struct IncrTransfer {
    property: Atom,
    type_atom: Atom,
    chunks: VecDeque<Vec<u8>>,
    sent: usize,
    stall_after: Option<usize>,
}

/// Scripted stand-in for an X11 connection.
pub struct FakeConnection {
    window: Window,
    atoms: HashMap<String, Atom>,
    names: HashMap<Atom, String>,
    next_atom: Atom,
    properties: HashMap<(Window, Atom), Value>,
    owners: HashMap<Atom, Window>,
    external: HashMap<Window, ExternalOwner>,
    transfer: Option<IncrTransfer>,
    events: VecDeque<Event>,
    before_reply: Vec<Event>,
    sent: Vec<SelectionNotify>,
    client_pids: HashMap<Window, u32>,
    rejected: HashSet<Atom>,
    failing_writes: HashSet<Window>,
    failing_reads: HashSet<usize>,
    failing_interns: HashSet<String>,
    reads: usize,
    conversions: usize,
    journal: Journal,
}

impl FakeConnection {
    /// Window id of the engine's own window.
    pub const WINDOW: Window = 0x0060_0001;

    pub fn new() -> Self {
        let mut conn = Self {
            window: Self::WINDOW,
            atoms: HashMap::new(),
            names: HashMap::new(),
            next_atom: 69,
            properties: HashMap::new(),
            owners: HashMap::new(),
            external: HashMap::new(),
            transfer: None,
            events: VecDeque::new(),
            before_reply: Vec::new(),
            sent: Vec::new(),
            client_pids: HashMap::new(),
            rejected: HashSet::new(),
            failing_writes: HashSet::new(),
            failing_reads: HashSet::new(),
            failing_interns: HashSet::new(),
            reads: 0,
            conversions: 0,
            journal: Arc::new(Mutex::new(Vec::new())),
        };
        // Same ids as the core protocol's predefined atoms
        for (name, atom) in [
            ("PRIMARY", 1),
            ("SECONDARY", 2),
            ("ATOM", 4),
            ("CARDINAL", 6),
            ("STRING", 31),
            ("WM_NAME", 39),
        ] {
            conn.atoms.insert(name.to_string(), atom);
            conn.names.insert(atom, name.to_string());
        }
        conn
    }

    fn log(&self, entry: String) {
        if let Ok(mut journal) = self.journal.lock() {
            journal.push(entry);
        }
    }

    fn atom(&mut self, name: &str) -> Atom {
        if let Some(atom) = self.atoms.get(name) {
            return *atom;
        }
        let atom = self.next_atom;
        self.next_atom += 1;
        self.atoms.insert(name.to_string(), atom);
        self.names.insert(atom, name.to_string());
        atom
    }

    // ── Scripting ───────────────────────────────────────────────────────────

    /// Hand `slot` to a simulated client.
    pub fn set_external_owner(&mut self, slot: Slot, owner: ExternalOwner) {
        let selection = self.atom(slot.atom_name());
        self.owners.insert(selection, owner.window);
        self.external.insert(owner.window, owner);
    }

    /// Queue an event for the engine to read.
    pub fn push_event(&mut self, event: Event) {
        self.events.push_back(event);
    }

    /// Queue `event` ahead of the reply to the next conversion.
    pub fn queue_before_reply(&mut self, event: Event) {
        self.before_reply.push(event);
    }

    pub fn set_property(&mut self, window: Window, property: Atom, value: Value) {
        self.properties.insert((window, property), value);
    }

    /// Pid the X-Resource query reports for `window`.
    pub fn set_client_pid(&mut self, window: Window, pid: u32) {
        self.client_pids.insert(window, pid);
    }

    /// Ignore ownership claims for `slot`.
    pub fn reject_claims(&mut self, slot: Slot) {
        let selection = self.atom(slot.atom_name());
        self.rejected.insert(selection);
    }

    /// Fail every property write to `window`.
    pub fn fail_writes_to(&mut self, window: Window) {
        self.failing_writes.insert(window);
    }

    /// Fail the `n`th property read (counting from 1) with a request error.
    pub fn fail_read(&mut self, n: usize) {
        self.failing_reads.insert(n);
    }

    /// Fail every later `InternAtom` for `name`.
    pub fn fail_intern_of(&mut self, name: &str) {
        self.failing_interns.insert(name.to_string());
    }

    // ── Inspection ──────────────────────────────────────────────────────────

    pub fn property(&self, window: Window, property: Atom) -> Option<Value> {
        self.properties.get(&(window, property)).cloned()
    }

    pub fn owner_of(&self, selection: Atom) -> Option<Window> {
        self.owners.get(&selection).copied()
    }

    pub fn sent_notifies(&self) -> &[SelectionNotify] {
        &self.sent
    }

    /// Number of conversions requested so far.
    pub fn conversions(&self) -> usize {
        self.conversions
    }

    pub fn journal(&self) -> Journal {
        Arc::clone(&self.journal)
    }

    // ── Simulated owners ────────────────────────────────────────────────────

    fn answer_conversion(&mut self, owner: &ExternalOwner, selection: Atom, target: Atom, property: Atom) {
        let target_name = self.names.get(&target).cloned().unwrap_or_default();
        let mut notify = SelectionNotify {
            time: 0,
            requestor: self.window,
            selection,
            target,
            property: Some(property),
        };

        if target_name == TARGETS {
            let value = match &owner.raw_targets {
                Some(bytes) => {
                    let string = self.atom("STRING");
                    Value::new(bytes.clone(), PropFormat::Bits8, string)
                }
                None => {
                    let mut atoms = vec![self.atom(TARGETS)];
                    for (name, _) in &owner.formats {
                        atoms.push(self.atom(name));
                    }
                    let atom_type = self.atom("ATOM");
                    Value::from_atoms(&atoms, atom_type)
                }
            };
            self.deliver(property, value);
        } else {
            let content = owner
                .formats
                .iter()
                .find(|(name, _)| *name == target_name)
                .map(|(_, content)| content.clone());
            match content {
                Some(Content::Plain(bytes)) => {
                    self.deliver(property, Value::new(bytes, PropFormat::Bits8, target));
                }
                Some(Content::Chunked(chunks)) => {
                    let total: usize = chunks.iter().map(Vec::len).sum();
                    let incr = self.atom("INCR");
                    let announced = u32::try_from(total).unwrap_or(u32::MAX);
                    self.deliver(property, Value::from_atoms(&[announced], incr));
                    let mut queue: VecDeque<Vec<u8>> = chunks.into();
                    queue.push_back(Vec::new());
                    self.transfer = Some(IncrTransfer {
                        property,
                        type_atom: target,
                        chunks: queue,
                        sent: 0,
                        stall_after: owner.stall_after,
                    });
                }
                Some(Content::Advertised) | None => notify.property = None,
            }
        }

        self.events.push_back(Event::SelectionNotify(notify));
    }

    fn deliver(&mut self, property: Atom, value: Value) {
        let window = self.window;
        self.properties.insert((window, property), value);
        self.events.push_back(Event::PropertyNewValue {
            window,
            atom: property,
        });
    }

    fn next_chunk(&mut self, property: Atom) {
        let Some(transfer) = self.transfer.as_mut() else {
            return;
        };
        if transfer.property != property {
            return;
        }
        if transfer.stall_after.is_some_and(|n| transfer.sent >= n) {
            return;
        }
        let Some(chunk) = transfer.chunks.pop_front() else {
            self.transfer = None;
            return;
        };
        transfer.sent += 1;
        let type_atom = transfer.type_atom;
        let finished = chunk.is_empty();
        if finished {
            self.transfer = None;
        }
        self.deliver(property, Value::new(chunk, PropFormat::Bits8, type_atom));
    }
}

impl Default for FakeConnection {
    fn default() -> Self {
        Self::new()
    }
}

impl SelectionConnection for FakeConnection {
    fn window(&self) -> Window {
        self.window
    }

    fn intern(&mut self, name: &str) -> Result<Atom, ConnectionError> {
        if self.failing_interns.contains(name) {
            return Err(ConnectionError::request("InternAtom", "BadAlloc"));
        }
        Ok(self.atom(name))
    }

    fn atom_name(&mut self, atom: Atom) -> Result<String, ConnectionError> {
        self.names
            .get(&atom)
            .cloned()
            .ok_or_else(|| ConnectionError::request("GetAtomName", format!("BadAtom {atom}")))
    }

    fn selection_owner(&mut self, selection: Atom) -> Result<Option<Window>, ConnectionError> {
        Ok(self.owners.get(&selection).copied())
    }

    fn set_selection_owner(&mut self, selection: Atom) -> Result<(), ConnectionError> {
        self.log(format!("claim:{selection}"));
        if !self.rejected.contains(&selection) {
            self.owners.insert(selection, self.window);
        }
        Ok(())
    }

    fn convert_selection(
        &mut self,
        selection: Atom,
        target: Atom,
        property: Atom,
    ) -> Result<(), ConnectionError> {
        self.conversions += 1;
        self.log(format!("convert:{target}"));
        let early: Vec<Event> = self.before_reply.drain(..).collect();
        self.events.extend(early);

        let owner = self
            .owners
            .get(&selection)
            .and_then(|w| self.external.get(w))
            .cloned();
        match owner {
            Some(owner) if owner.silent => {}
            Some(owner) => self.answer_conversion(&owner, selection, target, property),
            None => self.events.push_back(Event::SelectionNotify(SelectionNotify {
                time: 0,
                requestor: self.window,
                selection,
                target,
                property: None,
            })),
        }
        Ok(())
    }

    fn read_property(
        &mut self,
        window: Window,
        property: Atom,
    ) -> Result<Option<Value>, ConnectionError> {
        self.reads += 1;
        if self.failing_reads.contains(&self.reads) {
            return Err(ConnectionError::request("GetProperty", "BadAlloc"));
        }
        Ok(self.properties.get(&(window, property)).cloned())
    }

    fn write_property(
        &mut self,
        window: Window,
        property: Atom,
        value: &Value,
    ) -> Result<(), ConnectionError> {
        if self.failing_writes.contains(&window) {
            return Err(ConnectionError::request("ChangeProperty", "BadAlloc"));
        }
        self.log(format!("write_property:{window}"));
        self.properties.insert((window, property), value.clone());
        Ok(())
    }

    fn delete_property(&mut self, window: Window, property: Atom) -> Result<(), ConnectionError> {
        if self.properties.remove(&(window, property)).is_some() && window == self.window {
            self.events
                .push_back(Event::PropertyDeleted { window, atom: property });
            self.next_chunk(property);
        }
        Ok(())
    }

    fn send_notify(&mut self, notify: &SelectionNotify) -> Result<(), ConnectionError> {
        self.log(format!("send_notify:{}", notify.requestor));
        self.sent.push(notify.clone());
        Ok(())
    }

    fn next_event(&mut self) -> Result<Event, ConnectionError> {
        self.events.pop_front().ok_or(ConnectionError::Closed)
    }

    fn poll_event(&mut self, _timeout: Duration) -> Result<Option<Event>, ConnectionError> {
        Ok(self.events.pop_front())
    }

    fn client_pid(&mut self, window: Window) -> Result<Option<u32>, ConnectionError> {
        self.log(format!("client_pid:{window}"));
        Ok(self.client_pids.get(&window).copied())
    }
}

/// [`ProcessLookup`] returning synthetic process info and recording calls.
#[derive(Debug, Clone, Default)]
pub struct RecordingLookup {
    calls: Arc<Mutex<Vec<u32>>>,
    missing: HashSet<u32>,
    journal: Option<Journal>,
}

impl RecordingLookup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Also log each lookup as `lookup:<pid>` into `journal`.
    pub fn with_journal(journal: Journal) -> Self {
        Self {
            journal: Some(journal),
            ..Self::default()
        }
    }

    /// Treat `pid` as an exited process.
    pub fn with_missing(mut self, pid: u32) -> Self {
        self.missing.insert(pid);
        self
    }

    /// Pids looked up so far.
    pub fn calls(&self) -> Vec<u32> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

impl ProcessLookup for RecordingLookup {
    fn lookup(&mut self, pid: u32) -> Option<ProcessInfo> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(pid);
        }
        if let Some(journal) = &self.journal
            && let Ok(mut journal) = journal.lock()
        {
            journal.push(format!("lookup:{pid}"));
        }
        if self.missing.contains(&pid) {
            return None;
        }
        let name = format!("proc-{pid}");
        Some(ProcessInfo {
            pid,
            path: Some(PathBuf::from("/usr/bin").join(&name)),
            name: Some(name),
            parent_pid: Some(1),
            user: Some("tester".to_string()),
            started_at: None,
        })
    }
}
