pub mod event_loop;
pub mod notify_task;
pub mod protocol;

pub use event_loop::{DaemonOptions, run};
pub use notify_task::{NotifySettings, NotifyStats, NotifyWorker};
pub use protocol::{ProtocolThread, spawn_protocol_thread};
