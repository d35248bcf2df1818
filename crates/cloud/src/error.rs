use std::path::PathBuf;

use trikot_core::JobError;

/// Errors from fetching or publishing bytes.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    /// The locator scheme is not one the adapter can dispatch on.
    #[error("Unsupported scheme '{scheme}' in locator '{locator}'")]
    UnsupportedScheme { scheme: String, locator: String },

    /// The scheme is known but the rest of the locator is unusable.
    #[error("Invalid locator '{locator}': {reason}")]
    InvalidLocator { locator: String, reason: String },

    /// The HTTP request itself failed (network, DNS, TLS, body read).
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The server answered with a non-2xx status.
    #[error("HTTP {status} fetching {url}")]
    HttpStatus { status: u16, url: String },

    /// An S3 API call failed.
    #[error("S3 {operation} failed for {uri}: {message}")]
    S3 {
        operation: &'static str,
        uri: String,
        message: String,
    },

    /// The body ended before the advertised length was received.
    #[error("Truncated transfer from {source_uri}: expected {expected} bytes, got {received}")]
    Truncated {
        source_uri: String,
        expected: u64,
        received: u64,
    },

    /// Reading or writing the local file failed.
    #[error("I/O error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl TransferError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

impl From<TransferError> for JobError {
    fn from(err: TransferError) -> Self {
        match &err {
            TransferError::UnsupportedScheme { .. } => JobError::UnsupportedScheme(err.to_string()),
            _ => JobError::Transfer(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn unsupported_scheme_keeps_identity() {
        let err = TransferError::UnsupportedScheme {
            scheme: "ftp".into(),
            locator: "ftp://host/file".into(),
        };
        assert_matches!(JobError::from(err), JobError::UnsupportedScheme(msg) if msg.contains("ftp"));
    }

    #[test]
    fn other_errors_become_transfer_failures() {
        let err = TransferError::HttpStatus {
            status: 404,
            url: "https://example.com/a.png".into(),
        };
        assert_matches!(JobError::from(err), JobError::Transfer(msg) if msg.contains("404"));
    }
}
