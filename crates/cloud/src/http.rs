//! Generic HTTP(S) fetch.

use std::path::Path;
use std::time::Duration;

use reqwest::Url;

use crate::error::TransferError;
use crate::part_file::PartFile;

/// Downloads public URLs with [`reqwest`].
#[derive(Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    /// * `connect_timeout` - Limit on establishing the connection.
    /// * `read_timeout` - Limit on each read, headers and body alike; it
    ///   resets after every chunk so large files are not cut off.
    pub fn new(connect_timeout: Duration, read_timeout: Duration) -> Result<Self, TransferError> {
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .read_timeout(read_timeout)
            .build()?;
        Ok(Self { client })
    }

    /// Stream `url` into `dest`. Returns the number of bytes written.
    pub async fn download(&self, url: &Url, dest: &Path) -> Result<u64, TransferError> {
        let mut response = self.client.get(url.clone()).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransferError::HttpStatus {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        let expected = response.content_length();
        let mut part = PartFile::create(dest).await?;

        let streamed = async {
            while let Some(chunk) = response.chunk().await? {
                part.write(&chunk).await?;
            }
            part.check_length(url.as_str(), expected)
        }
        .await;

        match streamed {
            Ok(()) => part.commit().await,
            Err(e) => {
                part.abort().await;
                Err(e)
            }
        }
    }
}
