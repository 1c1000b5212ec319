// src/uri_utils.rs
//! Object reference parsing.
//!
//! References look like `s3://<bucket>/<key...>`. The scheme prefix is
//! stripped without checking that it was there; region is never taken from
//! the reference.

use crate::constants::S3_SCHEME_PREFIX;

/// Bucket, key and default local filename of one object reference.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct S3Uri {
    pub bucket: String,
    pub key: String,
    /// Last path segment of `key`, used when the caller gives no local path.
    pub filename: String,
}

impl S3Uri {
    /// True for the all-empty result of a reference without a key.
    pub fn is_empty(&self) -> bool {
        self.bucket.is_empty() && self.key.is_empty() && self.filename.is_empty()
    }
}

/// Split `s3://bucket/key` → `S3Uri`.
///
/// A reference with no `/` after the bucket yields an all-empty `S3Uri`
/// rather than an error; callers check [`S3Uri::is_empty`].
///
/// ```
/// use apt_s3::uri_utils::parse_s3_uri;
///
/// let uri = parse_s3_uri("s3://repo/pool/main/h/hello.deb");
/// assert_eq!(uri.bucket, "repo");
/// assert_eq!(uri.key, "pool/main/h/hello.deb");
/// assert_eq!(uri.filename, "hello.deb");
/// ```
pub fn parse_s3_uri(uri: &str) -> S3Uri {
    let trimmed = uri.strip_prefix(S3_SCHEME_PREFIX).unwrap_or(uri);
    let Some((bucket, key)) = trimmed.split_once('/') else {
        return S3Uri::default();
    };

    let filename = key.rsplit('/').next().unwrap_or(key);
    S3Uri {
        bucket: bucket.to_owned(),
        key: key.to_owned(),
        filename: filename.to_owned(),
    }
}
