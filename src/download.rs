// src/download.rs
//
// Copyright, 2025.  Signal65 / Futurum Group.
//
//! Object attribute lookup and file downloads for the fetch method.
//!
//! A [`Downloader`] owns one [`SessionCache`]. Every operation asks the cache
//! for a session in the requested region first, then talks to the object
//! store through that session.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::fs::{self, File};
use tracing::{debug, info, warn};

use crate::config::ResolverConfig;
use crate::constants::{ENV_DEFAULT_REGION, LAST_MODIFIED_FORMAT};
use crate::credentials::{CredentialResolver, FileCredentialResolver};
use crate::error::FetchError;
use crate::range_engine_generic::{RangeDownloadStats, RangeEngine, RangeEngineConfig};
use crate::s3_client::{run_on_global_rt, S3Connector};
use crate::s3_ops::ObjectBackend;
use crate::session::{SessionCache, SessionConnector};
use crate::uri_utils::{parse_s3_uri, S3Uri};

/// Last-modified time and size of one object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectAttributes {
    /// `YYYY-MM-DDTHH:MM:SS+00:00`
    pub last_modified: String,
    pub size: i64,
}

/// Format epoch seconds the way the fetch protocol expects.
pub fn format_last_modified(secs: i64) -> Option<String> {
    chrono::DateTime::from_timestamp(secs, 0).map(|t| t.format(LAST_MODIFIED_FORMAT).to_string())
}

/// The default downloader: credentials file resolver and SDK sessions.
pub type S3Downloader = Downloader<FileCredentialResolver, S3Connector>;

pub struct Downloader<R, C: SessionConnector> {
    sessions: Arc<SessionCache<R, C>>,
    engine: RangeEngine,
    default_region: String,
    pinned_region: Option<String>,
}

impl<R, C: SessionConnector> Clone for Downloader<R, C> {
    fn clone(&self) -> Self {
        Self {
            sessions: Arc::clone(&self.sessions),
            engine: self.engine.clone(),
            default_region: self.default_region.clone(),
            pinned_region: self.pinned_region.clone(),
        }
    }
}

impl S3Downloader {
    pub fn new(config: ResolverConfig) -> Self {
        let default_region = config.default_region.clone();
        Downloader::with_parts(FileCredentialResolver::new(config), S3Connector, default_region)
    }
}

impl Default for S3Downloader {
    fn default() -> Self {
        Self::new(ResolverConfig::default())
    }
}

impl<R, C> Downloader<R, C>
where
    R: CredentialResolver,
    C: SessionConnector,
{
    pub fn with_parts(resolver: R, connector: C, default_region: impl Into<String>) -> Self {
        Self {
            sessions: Arc::new(SessionCache::new(resolver, connector)),
            engine: RangeEngine::with_defaults(),
            default_region: default_region.into(),
            pinned_region: None,
        }
    }

    /// Always request `region`, ignoring `AWS_DEFAULT_REGION`.
    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.pinned_region = Some(region.into());
        self
    }

    pub fn with_range_config(mut self, config: RangeEngineConfig) -> Self {
        self.engine = RangeEngine::new(config);
        self
    }

    pub fn sessions(&self) -> &SessionCache<R, C> {
        &self.sessions
    }

    /// Region handed to the session cache: the pinned region, else
    /// `AWS_DEFAULT_REGION` (read on every call), else the configured default.
    pub fn requested_region(&self) -> String {
        if let Some(region) = &self.pinned_region {
            return region.clone();
        }
        std::env::var(ENV_DEFAULT_REGION)
            .ok()
            .filter(|r| !r.is_empty())
            .unwrap_or_else(|| self.default_region.clone())
    }

    fn parse(uri: &str) -> Result<S3Uri, FetchError> {
        let s3_uri = parse_s3_uri(uri);
        if s3_uri.is_empty() {
            return Err(FetchError::MalformedReference(uri.to_string()));
        }
        Ok(s3_uri)
    }

    /// Last-modified time and size of the object at `uri`.
    pub async fn get_file_attributes_async(&self, uri: &str) -> Result<ObjectAttributes, FetchError> {
        let s3_uri = Self::parse(uri)?;
        let session = self.sessions.ensure_session(&self.requested_region()).await?;

        let head = session.head_object(&s3_uri.bucket, &s3_uri.key).await?;
        let last_modified = head
            .last_modified_secs
            .and_then(format_last_modified)
            .ok_or_else(|| FetchError::Transport(format!("{uri}: response has no valid Last-Modified")))?;
        let size = head
            .content_length
            .ok_or_else(|| FetchError::Transport(format!("{uri}: response has no Content-Length")))?;

        debug!("STAT {} -> {} bytes, modified {}", uri, size, last_modified);
        Ok(ObjectAttributes { last_modified, size })
    }

    /// Download `uri` into `path`, or into the key's last segment when
    /// `path` is empty. Returns the local filename.
    ///
    /// The file either holds the whole object or does not exist afterwards.
    pub async fn download_file_async(&self, uri: &str, path: &str) -> Result<String, FetchError> {
        let s3_uri = Self::parse(uri)?;
        let filename = if path.is_empty() { s3_uri.filename.clone() } else { path.to_string() };

        let session = self.sessions.ensure_session(&self.requested_region()).await?;

        let file = File::create(&filename).await.map_err(|source| FetchError::LocalIo {
            path: PathBuf::from(&filename),
            source,
        })?;

        match self.transfer(session, &s3_uri, file).await {
            Ok(stats) => {
                info!(
                    "Downloaded {} to {} ({} bytes, {} ranges, {:.2} MB/s)",
                    uri, filename, stats.bytes_downloaded, stats.ranges_processed, stats.throughput_mbps()
                );
                Ok(filename)
            }
            Err(e) => {
                if let Err(rm) = fs::remove_file(&filename).await {
                    warn!("Failed to remove partial download {}: {}", filename, rm);
                }
                Err(FetchError::PartialTransfer { path: PathBuf::from(&filename), source: Box::new(e) })
            }
        }
    }

    /// Stream the object into `file`; the handle is closed on return.
    async fn transfer(
        &self,
        session: Arc<C::Session>,
        s3_uri: &S3Uri,
        mut file: File,
    ) -> Result<RangeDownloadStats, FetchError> {
        let head = session.head_object(&s3_uri.bucket, &s3_uri.key).await?;
        let size = head
            .content_length
            .and_then(|len| u64::try_from(len).ok())
            .ok_or_else(|| FetchError::Transport("response has no valid Content-Length".into()))?;

        // Every range is pinned to the version the HEAD saw. Stores that
        // ignore If-Match are still caught by the Content-Range total.
        let get_range = {
            let bucket = s3_uri.bucket.clone();
            let key = s3_uri.key.clone();
            let etag = head.etag.clone();
            move |offset: u64, length: u64| {
                let session = Arc::clone(&session);
                let bucket = bucket.clone();
                let key = key.clone();
                let etag = etag.clone();
                async move {
                    let body = session.get_range(&bucket, &key, offset, length, etag.as_deref()).await?;
                    match body.total_size {
                        Some(total) if total != size => Err(FetchError::Transport(format!(
                            "s3://{bucket}/{key} changed during download: size {size} became {total}"
                        ))),
                        _ => Ok(body.data),
                    }
                }
            }
        };

        self.engine.download_to(size, get_range, &mut file).await
    }
}

impl<R, C> Downloader<R, C>
where
    R: CredentialResolver,
    C: SessionConnector,
{
    /// Blocking form of [`Downloader::get_file_attributes_async`], returning
    /// `(last_modified, size)`.
    pub fn get_file_attributes(&self, uri: &str) -> Result<(String, i64), FetchError> {
        let this = self.clone();
        let uri = uri.to_string();
        let attrs = run_on_global_rt(async move { this.get_file_attributes_async(&uri).await })?;
        Ok((attrs.last_modified, attrs.size))
    }

    /// Blocking form of [`Downloader::download_file_async`].
    pub fn download_file(&self, uri: &str, path: &str) -> Result<String, FetchError> {
        let this = self.clone();
        let uri = uri.to_string();
        let path = path.to_string();
        run_on_global_rt(async move { this.download_file_async(&uri, &path).await })
    }
}
