//! Object store capability and its backends.
//!
//! The scanner and analyzer only see the [`ObjectStore`] trait. Backends
//! return one listing page per call; following continuation tokens is the
//! caller's job.

pub mod local;
pub mod resilient;
pub mod s3;

pub use local::LocalStore;
pub use resilient::{ResilientStore, RetryPolicy};
pub use s3::S3Store;

use crate::error::AuditError;
use async_trait::async_trait;

/// One page of a prefix listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListPage {
    pub keys: Vec<String>,
    /// Token for the next page; `None` once the listing is exhausted.
    pub next_continuation: Option<String>,
}

/// Read access to a bucket of submission objects.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// List one page of keys starting with `prefix`.
    async fn list_page(
        &self,
        prefix: &str,
        continuation: Option<&str>,
    ) -> Result<ListPage, AuditError>;

    /// Fetch the full body of one object.
    async fn get_object(&self, key: &str) -> Result<Vec<u8>, AuditError>;
}
