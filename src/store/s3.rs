//! S3 backend on the AWS SDK.
//!
//! Credentials and region come from the default provider chain
//! (environment, shared profile, web identity, instance metadata), so
//! private buckets work the same way as with the AWS CLI. `--endpoint`
//! points the client at an S3-compatible service using path-style URLs.

use super::{ListPage, ObjectStore};
use crate::error::AuditError;
use async_trait::async_trait;
use aws_config::retry::RetryConfig;
use aws_config::timeout::TimeoutConfig;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_s3::config::http::HttpResponse;
use aws_sdk_s3::error::{DisplayErrorContext, SdkError};
use aws_sdk_s3::Client;
use std::time::Duration;
use tracing::debug;

/// S3 client bound to a single bucket.
#[derive(Debug, Clone)]
pub struct S3Store {
    client: Client,
    bucket: String,
    page_size: i32,
}

impl S3Store {
    /// Load the shared AWS config and build a client for `bucket`.
    ///
    /// The SDK's own retries are disabled; [`super::ResilientStore`] owns
    /// retry and backoff.
    pub async fn connect(
        bucket: &str,
        region: &str,
        endpoint: Option<&str>,
        page_size: usize,
        timeout: Duration,
    ) -> Result<Self, AuditError> {
        if bucket.trim().is_empty() {
            return Err(AuditError::Config("bucket name is empty".to_string()));
        }

        let mut loader = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(region.to_string()))
            .retry_config(RetryConfig::disabled())
            .timeout_config(
                TimeoutConfig::builder()
                    .operation_attempt_timeout(timeout)
                    .build(),
            );
        if let Some(endpoint) = endpoint {
            loader = loader.endpoint_url(endpoint);
        }
        let shared = loader.load().await;

        let s3_config = aws_sdk_s3::config::Builder::from(&shared)
            .force_path_style(endpoint.is_some())
            .build();

        Ok(Self {
            client: Client::from_conf(s3_config),
            bucket: bucket.to_string(),
            page_size: page_size_param(page_size),
        })
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn list_page(
        &self,
        prefix: &str,
        continuation: Option<&str>,
    ) -> Result<ListPage, AuditError> {
        debug!("ListObjectsV2 prefix={} continuation={:?}", prefix, continuation);

        let output = self
            .client
            .list_objects_v2()
            .bucket(&self.bucket)
            .prefix(prefix)
            .max_keys(self.page_size)
            .set_continuation_token(continuation.map(str::to_string))
            .send()
            .await
            .map_err(|e| classify_sdk_error(prefix, e))?;

        let keys = output
            .contents()
            .iter()
            .filter_map(|object| object.key().map(str::to_string))
            .collect();

        page_from_listing(
            keys,
            output.is_truncated().unwrap_or(false),
            output.next_continuation_token(),
        )
        .map_err(|reason| AuditError::permanent(prefix, reason))
    }

    async fn get_object(&self, key: &str) -> Result<Vec<u8>, AuditError> {
        let output = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| classify_sdk_error(key, e))?;

        let body = output
            .body
            .collect()
            .await
            .map_err(|e| AuditError::transient(key, format!("failed to read body: {}", e)))?;
        Ok(body.into_bytes().to_vec())
    }
}

/// `max-keys` accepts 1..=1000.
fn page_size_param(page_size: usize) -> i32 {
    page_size.clamp(1, 1000) as i32
}

/// Turn one listing response into a page, insisting on a token when truncated.
fn page_from_listing(
    keys: Vec<String>,
    truncated: bool,
    token: Option<&str>,
) -> Result<ListPage, String> {
    let next_continuation = match (truncated, token) {
        (false, _) => None,
        (true, Some(token)) if !token.is_empty() => Some(token.to_string()),
        (true, _) => return Err("truncated listing without NextContinuationToken".to_string()),
    };

    Ok(ListPage {
        keys,
        next_continuation,
    })
}

fn classify_sdk_error<E>(target: &str, err: SdkError<E, HttpResponse>) -> AuditError
where
    E: std::error::Error + Send + Sync + 'static,
{
    let reason = DisplayErrorContext(&err).to_string();
    match &err {
        SdkError::TimeoutError(_) | SdkError::DispatchFailure(_) | SdkError::ResponseError(_) => {
            AuditError::transient(target, reason)
        }
        SdkError::ServiceError(service) if is_transient_status(service.raw().status().as_u16()) => {
            AuditError::transient(target, reason)
        }
        _ => AuditError::permanent(target, reason),
    }
}

fn is_transient_status(status: u16) -> bool {
    status == 429 || (500..600).contains(&status)
}
