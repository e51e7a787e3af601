//! Media save overlay library.
//!
//! Finds post images and videos in a live, continuously re-rendered page,
//! attaches exactly one save control per media element, and drives saves to a
//! storage backend, keeping every control's state in step with the result.

// Allow raw string hashes for safety - they're harmless and prevent issues if content changes
#![allow(clippy::needless_raw_string_hashes)]

pub mod backend;
pub mod config;
pub mod constants;
pub mod controls;
pub mod discovery;
pub mod dom;
pub mod media;
pub mod notify;
pub mod report;
pub mod runtime;
pub mod save;
pub mod saver;
pub mod scan;

pub use saver::{ClickOutcome, MediaSaver};
pub use scan::{ScanOutcome, ScanReport};
