//! Configuration for the placer module.

use serde::{Deserialize, Serialize};

use super::types::ChecksumType;

/// Configuration for the file system placer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlacerConfig {
    /// Buffer size for file copies in bytes.
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,

    /// Whether to try a rename before falling back to copy.
    #[serde(default = "default_true")]
    pub prefer_atomic_moves: bool,

    /// Whether to verify the copied file against the source checksum.
    #[serde(default = "default_true")]
    pub verify_checksums: bool,

    /// Algorithm used for verification.
    #[serde(default)]
    pub checksum: ChecksumType,
}

fn default_buffer_size() -> usize {
    8 * 1024 * 1024 // 8 MB
}

fn default_true() -> bool {
    true
}

impl Default for PlacerConfig {
    fn default() -> Self {
        Self {
            buffer_size: default_buffer_size(),
            prefer_atomic_moves: true,
            verify_checksums: true,
            checksum: ChecksumType::default(),
        }
    }
}

impl PlacerConfig {
    /// Enables or disables the rename fast path.
    pub fn with_atomic_moves(mut self, enabled: bool) -> Self {
        self.prefer_atomic_moves = enabled;
        self
    }

    /// Enables checksum verification.
    pub fn with_checksum_verification(mut self, enabled: bool) -> Self {
        self.verify_checksums = enabled;
        self
    }

    /// Sets the verification algorithm.
    pub fn with_checksum(mut self, checksum: ChecksumType) -> Self {
        self.checksum = checksum;
        self
    }

    /// Sets the buffer size for copies.
    pub fn with_buffer_size(mut self, size: usize) -> Self {
        self.buffer_size = size;
        self
    }
}
