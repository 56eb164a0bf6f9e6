//! Clipboard watcher daemon
//!
//! Wires the selection protocol engine from `clipboard-watcher-core` to a
//! live X11 display ([`x11`]), desktop notifications ([`desktop`]) and the
//! async runtime ([`daemon`]).

pub mod cli;
pub mod daemon;
pub mod desktop;
pub mod x11;
