//! File system placer implementation.

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tokio::fs::{self, File};
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader, BufWriter};
use tracing::{debug, warn};

use super::config::PlacerConfig;
use super::error::PlacerError;
use super::traits::Placer;
use super::types::{ChecksumType, FilePlacement, PlaceOutcome, PlacedFile};

/// File system based placer implementation.
pub struct FsPlacer {
    config: PlacerConfig,
}

/// Streaming hasher over the configured algorithm.
enum Hasher {
    Sha256(Sha256),
    Md5(md5::Context),
}

impl Hasher {
    fn new(checksum_type: ChecksumType) -> Self {
        match checksum_type {
            ChecksumType::Sha256 => Hasher::Sha256(Sha256::new()),
            ChecksumType::Md5 => Hasher::Md5(md5::Context::new()),
        }
    }

    fn update(&mut self, data: &[u8]) {
        match self {
            Hasher::Sha256(h) => h.update(data),
            Hasher::Md5(c) => c.consume(data),
        }
    }

    fn finalize(self) -> String {
        match self {
            Hasher::Sha256(h) => format!("{:x}", h.finalize()),
            Hasher::Md5(c) => format!("{:x}", c.compute()),
        }
    }
}

impl FsPlacer {
    /// Creates a new file system placer with the given configuration.
    pub fn new(config: PlacerConfig) -> Self {
        Self { config }
    }

    /// Creates a placer with default configuration.
    pub fn with_defaults() -> Self {
        Self::new(PlacerConfig::default())
    }

    /// Attempts to move a file atomically (rename).
    async fn try_atomic_move(source: &Path, destination: &Path) -> Result<bool, std::io::Error> {
        match fs::rename(source, destination).await {
            Ok(()) => Ok(true),
            Err(e) => {
                // Cross-filesystem moves fail with EXDEV (18 on Linux)
                if e.kind() == std::io::ErrorKind::CrossesDevices || e.raw_os_error() == Some(18) {
                    Ok(false)
                } else {
                    Err(e)
                }
            }
        }
    }

    /// Copies a file, hashing the source bytes as they stream through.
    async fn copy_file(
        &self,
        source: &Path,
        destination: &Path,
    ) -> Result<(u64, String), PlacerError> {
        let source_file = File::open(source).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                PlacerError::SourceNotFound {
                    path: source.to_path_buf(),
                }
            } else {
                PlacerError::Io(e)
            }
        })?;

        let dest_file = File::create(destination).await.map_err(|e| {
            PlacerError::copy_failed(source.to_path_buf(), destination.to_path_buf(), e)
        })?;

        let mut reader = BufReader::with_capacity(self.config.buffer_size, source_file);
        let mut writer = BufWriter::with_capacity(self.config.buffer_size, dest_file);
        let mut hasher = Hasher::new(self.config.checksum);

        let mut total_bytes = 0u64;
        let mut buffer = vec![0u8; self.config.buffer_size];

        loop {
            let bytes_read = reader.read(&mut buffer).await.map_err(|e| {
                PlacerError::copy_failed(source.to_path_buf(), destination.to_path_buf(), e)
            })?;

            if bytes_read == 0 {
                break;
            }

            hasher.update(&buffer[..bytes_read]);

            writer.write_all(&buffer[..bytes_read]).await.map_err(|e| {
                PlacerError::copy_failed(source.to_path_buf(), destination.to_path_buf(), e)
            })?;

            total_bytes += bytes_read as u64;
        }

        writer.flush().await.map_err(|e| {
            PlacerError::copy_failed(source.to_path_buf(), destination.to_path_buf(), e)
        })?;
        writer.get_ref().sync_all().await.map_err(|e| {
            PlacerError::copy_failed(source.to_path_buf(), destination.to_path_buf(), e)
        })?;

        Ok((total_bytes, hasher.finalize()))
    }

    /// Calculates the checksum of a file using the configured algorithm.
    async fn calculate_checksum(&self, path: &Path) -> Result<String, PlacerError> {
        let file = File::open(path)
            .await
            .map_err(|e| PlacerError::ChecksumCalculationFailed {
                path: path.to_path_buf(),
                source: e,
            })?;

        let mut reader = BufReader::with_capacity(self.config.buffer_size, file);
        let mut buffer = vec![0u8; self.config.buffer_size];
        let mut hasher = Hasher::new(self.config.checksum);

        loop {
            let bytes_read = reader.read(&mut buffer).await.map_err(|e| {
                PlacerError::ChecksumCalculationFailed {
                    path: path.to_path_buf(),
                    source: e,
                }
            })?;
            if bytes_read == 0 {
                break;
            }
            hasher.update(&buffer[..bytes_read]);
        }

        Ok(hasher.finalize())
    }

    /// Creates parent directories, returning the ones that did not exist (outermost first).
    async fn ensure_parent_dirs(&self, path: &Path) -> Result<Vec<PathBuf>, PlacerError> {
        let mut created = Vec::new();

        if let Some(parent) = path.parent() {
            let mut current = parent;
            while !current.as_os_str().is_empty()
                && !fs::try_exists(current).await.unwrap_or(false)
            {
                created.push(current.to_path_buf());
                current = match current.parent() {
                    Some(p) => p,
                    None => break,
                };
            }

            if !created.is_empty() {
                fs::create_dir_all(parent).await.map_err(|e| {
                    PlacerError::DirectoryCreationFailed {
                        path: parent.to_path_buf(),
                        source: e,
                    }
                })?;
            }
        }

        created.reverse();
        Ok(created)
    }

    /// Removes the partial file and any directories this placement created, if empty.
    async fn rollback(partial: Option<&Path>, created_dirs: &[PathBuf]) {
        if let Some(partial) = partial {
            if let Err(e) = fs::remove_file(partial).await {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!(path = %partial.display(), error = %e, "Failed to remove partial file");
                }
            }
        }

        // Child first; remove_dir refuses non-empty directories.
        for dir in created_dirs.iter().rev() {
            let _ = fs::remove_dir(dir).await;
        }
    }

    /// Handles a destination that already exists.
    async fn reconcile_existing(
        &self,
        placement: &FilePlacement,
    ) -> Result<PlacedFile, PlacerError> {
        let destination = &placement.destination;
        let dest_meta = fs::metadata(destination).await?;

        if !fs::try_exists(&placement.source).await? {
            debug!(destination = %destination.display(), "File already placed");
            return Ok(PlacedFile {
                destination: destination.clone(),
                size_bytes: dest_meta.len(),
                checksum: None,
                outcome: PlaceOutcome::AlreadyPlaced,
            });
        }

        let source_meta = fs::metadata(&placement.source).await?;
        if source_meta.len() == dest_meta.len() {
            let source_sum = self.calculate_checksum(&placement.source).await?;
            let dest_sum = self.calculate_checksum(destination).await?;
            if source_sum == dest_sum {
                debug!(
                    destination = %destination.display(),
                    "Destination matches source, dropping staged copy"
                );
                Self::remove_source(&placement.source).await;
                return Ok(PlacedFile {
                    destination: destination.clone(),
                    size_bytes: dest_meta.len(),
                    checksum: Some(dest_sum),
                    outcome: PlaceOutcome::AlreadyPlaced,
                });
            }
        }

        Err(PlacerError::DestinationExists {
            path: destination.clone(),
        })
    }

    async fn remove_source(source: &Path) {
        if let Err(e) = fs::remove_file(source).await {
            // The file is in the library already
            warn!(path = %source.display(), error = %e, "Failed to remove source file");
        }
    }

    /// Copy to `<dest>.partial`, verify, then rename into place.
    async fn copy_into_place(&self, placement: &FilePlacement) -> Result<PlacedFile, PlacerError> {
        let partial = partial_path(&placement.destination);

        let (size_bytes, source_sum) = self.copy_file(&placement.source, &partial).await?;

        if self.config.verify_checksums {
            let copied_sum = self.calculate_checksum(&partial).await?;
            if copied_sum != source_sum {
                return Err(PlacerError::ChecksumMismatch {
                    path: partial,
                    expected: source_sum,
                    actual: copied_sum,
                });
            }
        }

        fs::rename(&partial, &placement.destination)
            .await
            .map_err(|e| {
                PlacerError::move_failed(partial.clone(), placement.destination.clone(), e)
            })?;

        Self::remove_source(&placement.source).await;

        Ok(PlacedFile {
            destination: placement.destination.clone(),
            size_bytes,
            checksum: Some(source_sum),
            outcome: PlaceOutcome::Copied,
        })
    }
}

/// `<dest>.partial` next to the destination.
fn partial_path(destination: &Path) -> PathBuf {
    let mut name = destination
        .file_name()
        .map(OsString::from)
        .unwrap_or_default();
    name.push(".partial");
    destination.with_file_name(name)
}

#[async_trait]
impl Placer for FsPlacer {
    fn name(&self) -> &str {
        "fs"
    }

    async fn place(&self, placement: &FilePlacement) -> Result<PlacedFile, PlacerError> {
        if fs::try_exists(&placement.destination).await? {
            return self.reconcile_existing(placement).await;
        }

        if !fs::try_exists(&placement.source).await? {
            return Err(PlacerError::SourceNotFound {
                path: placement.source.clone(),
            });
        }

        let created_dirs = self.ensure_parent_dirs(&placement.destination).await?;

        if self.config.prefer_atomic_moves {
            match Self::try_atomic_move(&placement.source, &placement.destination).await {
                Ok(true) => {
                    let meta = fs::metadata(&placement.destination).await?;
                    return Ok(PlacedFile {
                        destination: placement.destination.clone(),
                        size_bytes: meta.len(),
                        checksum: None,
                        outcome: PlaceOutcome::Moved,
                    });
                }
                Ok(false) => {
                    debug!(
                        source = %placement.source.display(),
                        "Cross-device move, falling back to copy"
                    );
                }
                Err(e) => {
                    Self::rollback(None, &created_dirs).await;
                    return Err(PlacerError::move_failed(
                        placement.source.clone(),
                        placement.destination.clone(),
                        e,
                    ));
                }
            }
        }

        match self.copy_into_place(placement).await {
            Ok(placed) => Ok(placed),
            Err(e) => {
                Self::rollback(Some(&partial_path(&placement.destination)), &created_dirs).await;
                Err(e)
            }
        }
    }
}
