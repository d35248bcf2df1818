//! Source and destination locators.

use std::fmt;

use reqwest::Url;

use crate::error::TransferError;

/// A parsed transfer locator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Locator {
    /// `s3://bucket/key`
    S3 { bucket: String, key: String },
    /// `http://...` or `https://...`
    Http(Url),
}

impl Locator {
    /// Parse a locator string, dispatching on its scheme.
    ///
    /// Only `s3`, `http` and `https` are accepted; anything else is
    /// [`TransferError::UnsupportedScheme`].
    pub fn parse(raw: &str) -> Result<Self, TransferError> {
        let raw = raw.trim();
        let scheme = raw
            .split_once("://")
            .map(|(scheme, _)| scheme.to_ascii_lowercase())
            .unwrap_or_default();

        match scheme.as_str() {
            "s3" => Self::parse_s3(raw),
            "http" | "https" => Url::parse(raw).map(Self::Http).map_err(|e| {
                TransferError::InvalidLocator {
                    locator: raw.to_string(),
                    reason: e.to_string(),
                }
            }),
            _ => Err(TransferError::UnsupportedScheme {
                scheme,
                locator: raw.to_string(),
            }),
        }
    }

    fn parse_s3(raw: &str) -> Result<Self, TransferError> {
        let invalid = |reason: &str| TransferError::InvalidLocator {
            locator: raw.to_string(),
            reason: reason.to_string(),
        };

        // Scheme is already known to be 5 ASCII bytes: "s3://".
        let rest = &raw[5..];
        let (bucket, key) = rest
            .split_once('/')
            .ok_or_else(|| invalid("missing object key"))?;

        if bucket.is_empty() {
            return Err(invalid("missing bucket"));
        }
        if key.is_empty() {
            return Err(invalid("missing object key"));
        }

        Ok(Self::S3 {
            bucket: bucket.to_string(),
            key: key.to_string(),
        })
    }

    pub fn scheme(&self) -> &str {
        match self {
            Self::S3 { .. } => "s3",
            Self::Http(url) => url.scheme(),
        }
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::S3 { bucket, key } => write!(f, "s3://{bucket}/{key}"),
            Self::Http(url) => write!(f, "{url}"),
        }
    }
}
