//! Core protocol engine for clipboard-watcher
//!
//! This crate keeps ownership of the X11 `PRIMARY` and `CLIPBOARD`
//! selections, answers every content request made against them, and records
//! which process performed each read.
//!
//! Everything that talks to the display server goes through the
//! [`connection::SelectionConnection`] trait, so the engine can be driven by
//! a live X11 connection or by the in-memory server in [`testing`].
//!
//! All engine state (connection, selection store, ownership flags) belongs to
//! a single thread. Other threads only ever see [`record::AccessRecord`]
//! values pushed onto the access channel.

pub mod attribution;
pub mod config;
pub mod connection;
pub mod dispatcher;
pub mod error;
pub mod events;
pub mod fetcher;
pub mod home;
pub mod logging;
pub mod ownership;
pub mod process;
pub mod record;
pub mod responder;
pub mod selection;
pub mod session;
pub mod store;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use connection::{Event, SelectionConnection, SelectionNotify, SelectionRequest};
pub use dispatcher::Dispatcher;
pub use error::{ConnectionError, StartupError};
pub use process::{ProcessInfo, ProcessLookup, SysinfoLookup};
pub use record::AccessRecord;
pub use selection::{PropFormat, Slot, Value};
pub use store::SelectionStore;
