//! Virtual staging namespace for webwii
//!
//! Validated buffers wait here, under virtual paths, until a confirmed
//! operation commits them to an emulator engine or persistent store.

pub mod roots;
pub mod staging;

pub use roots::{normalize_path, VirtualRoot};
pub use staging::{default_path_for, StagedEntry, StagingNamespace};
