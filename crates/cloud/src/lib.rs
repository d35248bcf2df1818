//! Byte transfer between the worker and the outside world.
//!
//! Inputs are fetched from S3 (`s3://bucket/key`) or any HTTP(S) URL;
//! finished artifacts are published to S3. [`Transfer`] is the seam the
//! job processor talks to; [`CloudTransfer`] is the production
//! implementation that dispatches on the [`Locator`] scheme.

pub mod error;
pub mod http;
pub mod locator;
pub mod part_file;
pub mod s3;
pub mod transfer;

pub use error::TransferError;
pub use locator::Locator;
pub use transfer::{CloudTransfer, Transfer};
