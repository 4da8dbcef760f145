//! Trait definitions for the placer module.

use async_trait::async_trait;

use super::error::PlacerError;
use super::types::{FilePlacement, PlacedFile};

/// A placer that can move files to their final destinations.
#[async_trait]
pub trait Placer: Send + Sync {
    /// Returns the name of this placer implementation.
    fn name(&self) -> &str;

    /// Moves one file into place.
    ///
    /// Must be idempotent: placing a file that is already at its destination
    /// succeeds with `PlaceOutcome::AlreadyPlaced` and leaves the destination
    /// untouched. A destination holding different data is an error.
    async fn place(&self, placement: &FilePlacement) -> Result<PlacedFile, PlacerError>;
}
