//! Placer module for moving finished downloads into the library.
//!
//! # Features
//!
//! - Rename when source and destination share a filesystem
//! - Otherwise copy to `<dest>.partial`, verify, rename into place, delete the source
//! - Idempotent: re-placing a file that already arrived is a no-op
//! - Automatic parent directory creation, undone on failure
//!
//! # Example
//!
//! ```ignore
//! use shelfie_core::placer::{FilePlacement, FsPlacer, Placer};
//!
//! let placer = FsPlacer::with_defaults();
//! let placed = placer
//!     .place(&FilePlacement::new(
//!         "/staging/abc/Great.Movie.2021.mkv",
//!         "/media/Movies/Great Movie (2021)/Great Movie (2021).mkv",
//!     ))
//!     .await?;
//! println!("{} ({})", placed.destination.display(), placed.outcome.as_str());
//! ```

mod config;
mod error;
mod fs_placer;
mod traits;
mod types;

pub use config::PlacerConfig;
pub use error::PlacerError;
pub use fs_placer::FsPlacer;
pub use traits::Placer;
pub use types::{ChecksumType, FilePlacement, PlaceOutcome, PlacedFile};
