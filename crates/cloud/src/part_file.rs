//! Write-then-rename download target.
//!
//! Bytes are streamed into `<dest>.part`; only [`PartFile::commit`]
//! moves the file to its final name. A failed transfer calls
//! [`PartFile::abort`], so a truncated file never appears at `dest`.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use tokio::fs::File;
use tokio::io::AsyncWriteExt;

use crate::error::TransferError;

pub struct PartFile {
    part_path: PathBuf,
    final_path: PathBuf,
    file: File,
    written: u64,
}

impl PartFile {
    /// Create `<dest>.part`, creating parent directories as needed.
    pub async fn create(dest: &Path) -> Result<Self, TransferError> {
        let file_name = dest.file_name().ok_or_else(|| {
            TransferError::io(
                dest,
                std::io::Error::new(std::io::ErrorKind::InvalidInput, "destination has no file name"),
            )
        })?;

        if let Some(parent) = dest.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| TransferError::io(parent, e))?;
        }

        let mut part_name = OsString::from(file_name);
        part_name.push(".part");
        let part_path = dest.with_file_name(part_name);

        let file = File::create(&part_path)
            .await
            .map_err(|e| TransferError::io(&part_path, e))?;

        Ok(Self {
            part_path,
            final_path: dest.to_path_buf(),
            file,
            written: 0,
        })
    }

    pub async fn write(&mut self, chunk: &[u8]) -> Result<(), TransferError> {
        self.file
            .write_all(chunk)
            .await
            .map_err(|e| TransferError::io(&self.part_path, e))?;
        self.written += chunk.len() as u64;
        Ok(())
    }

    /// Flush to disk and move the file to its final name.
    pub async fn commit(mut self) -> Result<u64, TransferError> {
        let synced = async {
            self.file.flush().await?;
            self.file.sync_all().await
        }
        .await;

        if let Err(e) = synced {
            let err = TransferError::io(&self.part_path, e);
            self.abort().await;
            return Err(err);
        }

        if let Err(e) = tokio::fs::rename(&self.part_path, &self.final_path).await {
            let err = TransferError::io(&self.final_path, e);
            self.abort().await;
            return Err(err);
        }

        Ok(self.written)
    }

    /// Discard the partial file.
    pub async fn abort(self) {
        drop(self.file);
        if let Err(e) = tokio::fs::remove_file(&self.part_path).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(
                    path = %self.part_path.display(),
                    error = %e,
                    "Failed to remove partial download",
                );
            }
        }
    }

    /// Check the received length against an advertised one.
    pub fn check_length(&self, source_uri: &str, expected: Option<u64>) -> Result<(), TransferError> {
        match expected {
            Some(expected) if expected != self.written => Err(TransferError::Truncated {
                source_uri: source_uri.to_string(),
                expected,
                received: self.written,
            }),
            _ => Ok(()),
        }
    }
}
