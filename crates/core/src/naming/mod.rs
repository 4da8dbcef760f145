//! Library naming convention.
//!
//! Turns a classification (plus an optional episode title) into the path
//! the primary file should end up at. Pure and deterministic.

mod format;

pub use format::{format_target, sanitize_segment, LibraryRoots};
