// src/s3_ops.rs
//
// Copyright, 2025. Signal65 / Futurum Group.
//
//! Object operations used by the downloader (HEAD and ranged GET).
//!
//! [`ObjectBackend`] is the seam between the downloader and the wire: the
//! SDK client implements it for real sessions, tests plug in in-memory
//! stores.

use async_trait::async_trait;
use aws_sdk_s3::Client;
use aws_sdk_s3::error::{DisplayErrorContext, SdkError};
use bytes::Bytes;
use std::fmt::Debug;
use tracing::trace;

use crate::error::FetchError;

/// Metadata returned by a HEAD request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectHead {
    /// Seconds since the Unix epoch.
    pub last_modified_secs: Option<i64>,
    pub content_length: Option<i64>,
    pub etag: Option<String>,
}

/// Body of one ranged GET plus the object size from its `Content-Range`.
#[derive(Debug, Clone, Default)]
pub struct RangeBody {
    pub data: Bytes,
    pub total_size: Option<u64>,
}

#[async_trait]
pub trait ObjectBackend: Send + Sync + 'static {
    /// STAT (Metadata) of an object.
    async fn head_object(&self, bucket: &str, key: &str) -> Result<ObjectHead, FetchError>;

    /// GET `length` bytes starting at `offset`. With `if_match` set, the
    /// request fails unless the object still carries that ETag.
    async fn get_range(
        &self,
        bucket: &str,
        key: &str,
        offset: u64,
        length: u64,
        if_match: Option<&str>,
    ) -> Result<RangeBody, FetchError>;
}

/// Service-reported errors are flattened to one line, everything else
/// (dispatch, timeout, response parsing) is passed through as is.
pub fn map_sdk_error<E, R>(err: SdkError<E, R>) -> FetchError
where
    E: std::error::Error + Send + Sync + 'static,
    R: Debug + Send + Sync + 'static,
{
    let message = DisplayErrorContext(&err).to_string();
    match err {
        SdkError::ServiceError(_) => FetchError::remote(message),
        _ => FetchError::Transport(message),
    }
}

/// HTTP `Range` header for `length` bytes at `offset` (inclusive end).
pub fn range_header(offset: u64, length: u64) -> String {
    format!("bytes={}-{}", offset, offset + length.saturating_sub(1))
}

/// Complete length from a `Content-Range` value (`bytes 0-3/12`).
/// `None` when the length is unknown (`*`) or the value is malformed.
pub fn content_range_total(header: &str) -> Option<u64> {
    let (_, total) = header.rsplit_once('/')?;
    total.trim().parse().ok()
}

#[async_trait]
impl ObjectBackend for Client {
    async fn head_object(&self, bucket: &str, key: &str) -> Result<ObjectHead, FetchError> {
        let resp = self
            .head_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(map_sdk_error)?;

        Ok(ObjectHead {
            last_modified_secs: resp.last_modified().map(|t| t.secs()),
            content_length: resp.content_length(),
            etag: resp.e_tag().map(str::to_string),
        })
    }

    async fn get_range(
        &self,
        bucket: &str,
        key: &str,
        offset: u64,
        length: u64,
        if_match: Option<&str>,
    ) -> Result<RangeBody, FetchError> {
        let range = range_header(offset, length);
        trace!("GET s3://{}/{} {} if-match={:?}", bucket, key, range, if_match);

        let output = self
            .get_object()
            .bucket(bucket)
            .key(key)
            .range(range)
            .set_if_match(if_match.map(str::to_string))
            .send()
            .await
            .map_err(map_sdk_error)?;

        let total_size = output.content_range().and_then(content_range_total);
        let data = output
            .body
            .collect()
            .await
            .map_err(|e| FetchError::Transport(DisplayErrorContext(&e).to_string()))?
            .into_bytes();
        Ok(RangeBody { data, total_size })
    }
}
