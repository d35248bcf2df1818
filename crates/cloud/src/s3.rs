//! S3 object store access via `aws-sdk-s3`.

use std::path::Path;

use aws_sdk_s3::config::{BehaviorVersion, Region};
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;

use crate::error::TransferError;
use crate::part_file::PartFile;

/// Fallback content type for unknown extensions.
const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Thin wrapper around an S3 client for whole-object download/upload.
#[derive(Clone)]
pub struct S3Store {
    client: Client,
}

impl S3Store {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Build a client from the default AWS credential chain.
    ///
    /// When `endpoint_url` is set (MinIO, LocalStack, ...) path-style
    /// addressing is forced, since those stores rarely serve
    /// virtual-hosted buckets.
    pub async fn from_env(region: &str, endpoint_url: Option<&str>) -> Self {
        let sdk_config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(region.to_string()))
            .load()
            .await;

        let mut builder = aws_sdk_s3::config::Builder::from(&sdk_config);
        if let Some(endpoint) = endpoint_url.filter(|e| !e.is_empty()) {
            builder = builder.endpoint_url(endpoint).force_path_style(true);
        }

        tracing::info!(region, endpoint = ?endpoint_url, "S3 client initialized");

        Self::new(Client::from_conf(builder.build()))
    }

    /// Stream `s3://bucket/key` into `dest`. Returns the number of bytes written.
    pub async fn download(&self, bucket: &str, key: &str, dest: &Path) -> Result<u64, TransferError> {
        let uri = format!("s3://{bucket}/{key}");

        let response = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| TransferError::S3 {
                operation: "GetObject",
                uri: uri.clone(),
                message: DisplayErrorContext(&e).to_string(),
            })?;

        let expected = response
            .content_length()
            .and_then(|len| u64::try_from(len).ok());
        let mut body = response.body;
        let mut part = PartFile::create(dest).await?;

        let streamed = async {
            while let Some(chunk) = body.try_next().await.map_err(|e| TransferError::S3 {
                operation: "GetObject",
                uri: uri.clone(),
                message: e.to_string(),
            })? {
                part.write(&chunk).await?;
            }
            part.check_length(&uri, expected)
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

    /// Upload the file at `src` to `s3://bucket/key`.
    pub async fn upload(&self, src: &Path, bucket: &str, key: &str) -> Result<(), TransferError> {
        let uri = format!("s3://{bucket}/{key}");

        let body = ByteStream::from_path(src)
            .await
            .map_err(|e| TransferError::io(src, std::io::Error::other(e)))?;

        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .content_type(content_type_for(src))
            .body(body)
            .send()
            .await
            .map_err(|e| TransferError::S3 {
                operation: "PutObject",
                uri,
                message: DisplayErrorContext(&e).to_string(),
            })?;

        Ok(())
    }
}

/// Guess a MIME type from the file extension.
pub fn content_type_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);

    match ext.as_deref() {
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("webp") => "image/webp",
        Some("gif") => "image/gif",
        Some("mp4") => "video/mp4",
        Some("webm") => "video/webm",
        Some("json") => "application/json",
        _ => DEFAULT_CONTENT_TYPE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_types_by_extension() {
        assert_eq!(content_type_for(Path::new("/tmp/outputs/a.png")), "image/png");
        assert_eq!(content_type_for(Path::new("a.JPEG")), "image/jpeg");
        assert_eq!(content_type_for(Path::new("clip.mp4")), "video/mp4");
        assert_eq!(content_type_for(Path::new("noext")), DEFAULT_CONTENT_TYPE);
        assert_eq!(content_type_for(Path::new("x.bin")), DEFAULT_CONTENT_TYPE);
    }
}
