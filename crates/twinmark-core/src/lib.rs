#![forbid(unsafe_code)]

//! Session core for `twinmark`: one document, two editing representations,
//! and a file on disk that can change underneath both.
//!
//! The [`Editor`] owns the [`Session`] and orchestrates loads and saves
//! through a [`Storage`] and a [`ContentEngine`]. Change checks from the
//! filesystem watch and from focus/visibility signals flow through the
//! [`EventLoop`] into [`Editor::check_and_reconcile`].

pub mod blocks;
pub mod config;
mod disk_io;
pub mod doc_type;
pub mod editor;
pub mod engine;
pub mod error;
pub mod event_loop;
pub mod frontmatter;
pub mod markdown;
pub mod reconcile;
pub mod session;
pub mod storage;
pub mod text_buffer;
mod watcher;

pub use config::Config;
pub use doc_type::{Language, Mode};
pub use editor::{Editor, LoadOutcome, SaveOutcome};
pub use engine::{Content, ContentEngine, Engines, PlainTextEngine, StructuredEngine};
pub use error::{EngineError, Error, Result};
pub use event_loop::{Event, EventLoop, Notice};
pub use frontmatter::{Frontmatter, ParsedContent};
pub use reconcile::{Reconciliation, Resolution, Resolved};
pub use session::Session;
pub use storage::{DiskStorage, MemoryStorage, Snapshot, Storage, Subscription};

/// Hard cap on file sizes we will load into memory.
pub const MAX_FILE_BYTES: u64 = 64 * 1024 * 1024;
