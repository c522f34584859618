//! `visitorlog` - An append-only, capped log of page visitors
//!
//! Records are captured by a [`Recorder`], stored either in the shared
//! server-side log behind an HTTP API or in a private local cache, and read
//! back through a [`Viewer`] that can search, summarize, export and clear them.

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

pub mod api;
pub mod cli;
pub mod config;
pub mod error;
pub mod logging;
pub mod record;
pub mod recorder;
pub mod server;
pub mod storage;
pub mod useragent;
pub mod viewer;

pub use config::Config;
pub use error::{Error, Result};
pub use logging::init_logging;
pub use record::{Reason, Record, RecordDraft};
pub use recorder::{ClientEnvironment, Position, Recorder};
pub use storage::{LocalCache, RecordStore, RemoteStore, Source, Storage, StoreResolver};
pub use viewer::Viewer;
