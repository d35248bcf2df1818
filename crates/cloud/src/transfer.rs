//! The transfer seam used by the job processor.

use std::path::Path;
use std::time::Instant;

use async_trait::async_trait;

use crate::error::TransferError;
use crate::http::HttpFetcher;
use crate::locator::Locator;
use crate::s3::S3Store;

/// Moves bytes between locators and local files.
///
/// Implementations must not retry; a failed call is reported once and
/// the caller decides what happens to the job.
#[async_trait]
pub trait Transfer: Send + Sync {
    /// Fetch `source` into the local file `dest`.
    async fn fetch(&self, source: &str, dest: &Path) -> Result<(), TransferError>;

    /// Publish the local file `src` to `destination`.
    async fn publish(&self, src: &Path, destination: &str) -> Result<(), TransferError>;
}

/// Production [`Transfer`]: S3 for `s3://`, reqwest for `http(s)://`.
#[derive(Clone)]
pub struct CloudTransfer {
    s3: S3Store,
    http: HttpFetcher,
}

impl CloudTransfer {
    pub fn new(s3: S3Store, http: HttpFetcher) -> Self {
        Self { s3, http }
    }
}

#[async_trait]
impl Transfer for CloudTransfer {
    async fn fetch(&self, source: &str, dest: &Path) -> Result<(), TransferError> {
        let locator = Locator::parse(source)?;
        let start = Instant::now();

        let bytes = match &locator {
            Locator::S3 { bucket, key } => self.s3.download(bucket, key, dest).await?,
            Locator::Http(url) => self.http.download(url, dest).await?,
        };

        tracing::info!(
            source = %locator,
            dest = %dest.display(),
            bytes,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Fetched input",
        );
        Ok(())
    }

    async fn publish(&self, src: &Path, destination: &str) -> Result<(), TransferError> {
        let locator = Locator::parse(destination)?;
        let Locator::S3 { bucket, key } = &locator else {
            return Err(TransferError::UnsupportedScheme {
                scheme: locator.scheme().to_string(),
                locator: destination.to_string(),
            });
        };

        let start = Instant::now();
        tracing::info!(src = %src.display(), dest = %locator, "Uploading artifact");
        self.s3.upload(src, bucket, key).await?;
        tracing::info!(
            dest = %locator,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Upload successful",
        );
        Ok(())
    }
}
