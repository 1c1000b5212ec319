// Integration tests for the downloader against in-memory object stores.
// Tests the public API as the fetch method driver would use it.

use apt_s3::{
    AuthMode, CredentialResolver, Downloader, FetchError, FileCredentialResolver, ObjectBackend,
    ObjectHead, RangeBody, RangeEngineConfig, ResolverConfig, SessionConnector, SessionSettings,
};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::fs;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

// -----------------------------------------------------------------------------
// Test doubles
// -----------------------------------------------------------------------------

#[derive(Clone)]
struct StoredObject {
    data: Bytes,
    last_modified_secs: i64,
    etag: String,
}

impl StoredObject {
    fn new(data: Vec<u8>, secs: i64) -> Self {
        let etag = format!("\"{:x}-{}\"", data.len(), secs);
        Self { data: Bytes::from(data), last_modified_secs: secs, etag }
    }
}

#[derive(Default)]
struct MemoryStore {
    objects: HashMap<(String, String), StoredObject>,
    /// Ranges starting at or beyond this offset fail with a service error.
    fail_from_offset: Option<u64>,
    /// Served to GETs in place of the stored object, as if it had been
    /// overwritten right after the HEAD.
    replacement: Option<StoredObject>,
    /// Serve GETs without checking If-Match.
    ignore_if_match: bool,
}

impl MemoryStore {
    fn with_object(mut self, bucket: &str, key: &str, data: Vec<u8>, secs: i64) -> Self {
        self.objects.insert((bucket.to_string(), key.to_string()), StoredObject::new(data, secs));
        self
    }

    fn lookup(&self, bucket: &str, key: &str) -> Result<&StoredObject, FetchError> {
        self.objects
            .get(&(bucket.to_string(), key.to_string()))
            .ok_or_else(|| FetchError::remote(format!("NotFound: Not Found\n\tstatus code: 404, key: {key}")))
    }
}

#[async_trait]
impl ObjectBackend for MemoryStore {
    async fn head_object(&self, bucket: &str, key: &str) -> Result<ObjectHead, FetchError> {
        let obj = self.lookup(bucket, key)?;
        Ok(ObjectHead {
            last_modified_secs: Some(obj.last_modified_secs),
            content_length: Some(obj.data.len() as i64),
            etag: Some(obj.etag.clone()),
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
        if self.fail_from_offset.is_some_and(|limit| offset >= limit) {
            return Err(FetchError::remote("InternalError: We encountered an internal error.\nPlease try again."));
        }
        let obj = match &self.replacement {
            Some(obj) => obj,
            None => self.lookup(bucket, key)?,
        };
        if !self.ignore_if_match && if_match.is_some_and(|etag| etag != obj.etag) {
            return Err(FetchError::remote(
                "PreconditionFailed: At least one of the pre-conditions you specified did not hold\n\tstatus code: 412",
            ));
        }
        let len = obj.data.len() as u64;
        let start = offset.min(len) as usize;
        let end = (offset + length).min(len) as usize;
        Ok(RangeBody { data: obj.data.slice(start..end), total_size: Some(len) })
    }
}

/// Session handle sharing one store across every (re)created session.
struct SharedStore(Arc<MemoryStore>);

#[async_trait]
impl ObjectBackend for SharedStore {
    async fn head_object(&self, bucket: &str, key: &str) -> Result<ObjectHead, FetchError> {
        self.0.head_object(bucket, key).await
    }

    async fn get_range(
        &self,
        bucket: &str,
        key: &str,
        offset: u64,
        length: u64,
        if_match: Option<&str>,
    ) -> Result<RangeBody, FetchError> {
        self.0.get_range(bucket, key, offset, length, if_match).await
    }
}

/// Hands out the same store for every session and records the settings it was asked for.
struct MemoryConnector {
    store: Arc<MemoryStore>,
    seen: Arc<Mutex<Vec<SessionSettings>>>,
}

#[async_trait]
impl SessionConnector for MemoryConnector {
    type Session = SharedStore;

    async fn connect(&self, settings: SessionSettings) -> Result<SharedStore, FetchError> {
        self.seen.lock().unwrap().push(settings);
        Ok(SharedStore(Arc::clone(&self.store)))
    }
}

struct CountingResolver {
    calls: Arc<AtomicUsize>,
}

impl CredentialResolver for CountingResolver {
    fn resolve(&self, requested_region: &str) -> Result<SessionSettings, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(SessionSettings {
            auth: AuthMode::Anonymous,
            region: requested_region.to_string(),
            endpoint: None,
            use_tls: true,
        })
    }
}

struct Fixture {
    downloader: Downloader<CountingResolver, MemoryConnector>,
    calls: Arc<AtomicUsize>,
    dir: TempDir,
}

fn fixture(store: MemoryStore, region: &str) -> Fixture {
    let calls = Arc::new(AtomicUsize::new(0));
    let connector = MemoryConnector {
        store: Arc::new(store),
        seen: Arc::new(Mutex::new(Vec::new())),
    };
    let downloader = Downloader::with_parts(CountingResolver { calls: Arc::clone(&calls) }, connector, "us-east-1")
        .with_region(region)
        .with_range_config(RangeEngineConfig {
            chunk_size: 1024,
            max_concurrent_ranges: 3,
            min_split_size: 2048,
        });
    Fixture { downloader, calls, dir: TempDir::new().unwrap() }
}

fn patterned(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 253) as u8).collect()
}

// -----------------------------------------------------------------------------
// Attributes
// -----------------------------------------------------------------------------

#[tokio::test]
async fn test_attributes_timestamp_and_size() {
    let store = MemoryStore::default().with_object("repo", "dists/stable/Release", vec![1; 4242], 1_700_000_000);
    let fx = fixture(store, "us-east-1");

    let attrs = fx.downloader.get_file_attributes_async("s3://repo/dists/stable/Release").await.unwrap();
    assert_eq!(attrs.last_modified, "2023-11-14T22:13:20+00:00");
    assert_eq!(attrs.size, 4242);
}

#[tokio::test]
async fn test_attributes_remote_error_is_single_line() {
    let fx = fixture(MemoryStore::default(), "us-east-1");

    let err = fx.downloader.get_file_attributes_async("s3://repo/missing.deb").await.unwrap_err();
    assert!(matches!(err, FetchError::RemoteService(_)));
    let msg = err.to_string();
    assert!(!msg.contains('\n'), "message should be flattened: {msg:?}");
    assert_eq!(msg, "NotFound: Not Found \tstatus code: 404, key: missing.deb");
}

// -----------------------------------------------------------------------------
// Downloads
// -----------------------------------------------------------------------------

#[tokio::test]
async fn test_download_multi_range_to_explicit_path() {
    let data = patterned(10 * 1024 + 17);
    let store = MemoryStore::default().with_object("repo", "pool/main/h/hello.deb", data.clone(), 0);
    let fx = fixture(store, "us-east-1");
    let target = fx.dir.path().join("hello.deb");
    let target_str = target.to_str().unwrap();

    let filename = fx
        .downloader
        .download_file_async("s3://repo/pool/main/h/hello.deb", target_str)
        .await
        .unwrap();

    assert_eq!(filename, target_str);
    assert_eq!(fs::read(&target).unwrap(), data);
}

#[tokio::test]
async fn test_download_truncates_existing_file() {
    let store = MemoryStore::default().with_object("repo", "small", b"new".to_vec(), 0);
    let fx = fixture(store, "us-east-1");
    let target = fx.dir.path().join("small");
    fs::write(&target, b"much longer old contents").unwrap();

    fx.downloader.download_file_async("s3://repo/small", target.to_str().unwrap()).await.unwrap();
    assert_eq!(fs::read(&target).unwrap(), b"new");
}

#[tokio::test]
async fn test_download_empty_object() {
    let store = MemoryStore::default().with_object("repo", "empty", Vec::new(), 0);
    let fx = fixture(store, "us-east-1");
    let target = fx.dir.path().join("empty");

    fx.downloader.download_file_async("s3://repo/empty", target.to_str().unwrap()).await.unwrap();
    assert_eq!(fs::metadata(&target).unwrap().len(), 0);
}

#[tokio::test]
async fn test_failed_transfer_removes_partial_file() {
    let mut store = MemoryStore::default().with_object("repo", "big.deb", patterned(8 * 1024), 0);
    store.fail_from_offset = Some(5 * 1024);
    let fx = fixture(store, "us-east-1");
    let target = fx.dir.path().join("big.deb");

    let err = fx
        .downloader
        .download_file_async("s3://repo/big.deb", target.to_str().unwrap())
        .await
        .unwrap_err();

    match &err {
        FetchError::PartialTransfer { path, source } => {
            assert_eq!(path, &target);
            assert!(matches!(**source, FetchError::RemoteService(_)));
        }
        other => panic!("expected PartialTransfer, got {other:?}"),
    }
    assert!(!err.to_string().contains('\n'));
    assert!(!target.exists(), "partial file must be removed");
}

#[tokio::test]
async fn test_object_replaced_after_head_fails_precondition() {
    let mut store = MemoryStore::default().with_object("repo", "dists/Packages", b"OLD!".to_vec(), 100);
    store.replacement = Some(StoredObject::new(b"NEW-CONTENTS".to_vec(), 200));
    let fx = fixture(store, "us-east-1");
    let target = fx.dir.path().join("Packages");

    let err = fx
        .downloader
        .download_file_async("s3://repo/dists/Packages", target.to_str().unwrap())
        .await
        .unwrap_err();

    match &err {
        FetchError::PartialTransfer { source, .. } => {
            assert!(matches!(**source, FetchError::RemoteService(ref m) if m.contains("412")));
        }
        other => panic!("expected PartialTransfer, got {other:?}"),
    }
    assert!(!target.exists(), "no truncated copy may be left behind");
}

#[tokio::test]
async fn test_object_replaced_after_head_caught_by_content_range() {
    let mut store = MemoryStore::default().with_object("repo", "dists/Packages", b"OLD!".to_vec(), 100);
    store.replacement = Some(StoredObject::new(b"NEW-CONTENTS".to_vec(), 200));
    store.ignore_if_match = true;
    let fx = fixture(store, "us-east-1");
    let target = fx.dir.path().join("Packages");

    let err = fx
        .downloader
        .download_file_async("s3://repo/dists/Packages", target.to_str().unwrap())
        .await
        .unwrap_err();

    match &err {
        FetchError::PartialTransfer { source, .. } => {
            assert!(matches!(**source, FetchError::Transport(ref m) if m.contains("size 4 became 12")));
        }
        other => panic!("expected PartialTransfer, got {other:?}"),
    }
    assert!(!target.exists());
}

#[tokio::test]
async fn test_missing_object_removes_created_file() {
    let fx = fixture(MemoryStore::default(), "us-east-1");
    let target = fx.dir.path().join("nothing");

    let err = fx
        .downloader
        .download_file_async("s3://repo/nothing", target.to_str().unwrap())
        .await
        .unwrap_err();
    assert!(matches!(err, FetchError::PartialTransfer { .. }));
    assert!(!target.exists());
}

#[tokio::test]
async fn test_uncreatable_target_is_local_io() {
    let store = MemoryStore::default().with_object("repo", "key", vec![1, 2, 3], 0);
    let fx = fixture(store, "us-east-1");
    let target = fx.dir.path().join("no/such/dir/key");

    let err = fx
        .downloader
        .download_file_async("s3://repo/key", target.to_str().unwrap())
        .await
        .unwrap_err();
    assert!(matches!(err, FetchError::LocalIo { .. }));
}

#[tokio::test]
async fn test_malformed_reference() {
    let fx = fixture(MemoryStore::default(), "us-east-1");
    let err = fx.downloader.download_file_async("s3://bucket", "").await.unwrap_err();
    assert!(matches!(err, FetchError::MalformedReference(_)));
    assert_eq!(fx.calls.load(Ordering::SeqCst), 0);
}

// -----------------------------------------------------------------------------
// Session reuse
// -----------------------------------------------------------------------------

#[tokio::test]
async fn test_session_reused_within_region() {
    let store = MemoryStore::default().with_object("repo", "a", vec![1; 10], 0);
    let fx = fixture(store, "us-east-1");

    fx.downloader.get_file_attributes_async("s3://repo/a").await.unwrap();
    let target = fx.dir.path().join("a");
    fx.downloader.download_file_async("s3://repo/a", target.to_str().unwrap()).await.unwrap();
    assert_eq!(fx.calls.load(Ordering::SeqCst), 1);

    // Same cache, different requested region
    let moved = fx.downloader.clone().with_region("eu-west-1");
    moved.get_file_attributes_async("s3://repo/a").await.unwrap();
    assert_eq!(fx.calls.load(Ordering::SeqCst), 2);
    assert_eq!(fx.downloader.sessions().active_region().await.as_deref(), Some("eu-west-1"));
}

// -----------------------------------------------------------------------------
// Blocking API
// -----------------------------------------------------------------------------

#[test]
fn test_blocking_api() {
    let data = patterned(3000);
    let store = MemoryStore::default().with_object("repo", "pkg.deb", data.clone(), 86_400);
    let fx = fixture(store, "us-east-1");
    let target = fx.dir.path().join("pkg.deb");

    let (modified, size) = fx.downloader.get_file_attributes("s3://repo/pkg.deb").unwrap();
    assert_eq!(modified, "1970-01-02T00:00:00+00:00");
    assert_eq!(size, 3000);

    let filename = fx.downloader.download_file("s3://repo/pkg.deb", target.to_str().unwrap()).unwrap();
    assert_eq!(fs::read(filename).unwrap(), data);
    assert_eq!(fx.calls.load(Ordering::SeqCst), 1);
}

// -----------------------------------------------------------------------------
// Credentials file flowing into session settings
// -----------------------------------------------------------------------------

#[tokio::test]
async fn test_credentials_file_settings_reach_connector() {
    let dir = TempDir::new().unwrap();
    let creds_path = dir.path().join("s3creds");
    fs::write(
        &creds_path,
        "aws_access_key_id = A\naws_secret_access_key = B\naws_session_token = C\nregion = R\n",
    )
    .unwrap();

    let seen = Arc::new(Mutex::new(Vec::new()));
    let store = MemoryStore::default().with_object("repo", "a", vec![0; 4], 0);
    let connector = MemoryConnector { store: Arc::new(store), seen: Arc::clone(&seen) };
    let resolver = FileCredentialResolver::new(ResolverConfig::default().with_credentials_path(&creds_path));
    let downloader = Downloader::with_parts(resolver, connector, "us-east-1").with_region("us-east-1");

    downloader.get_file_attributes_async("s3://repo/a").await.unwrap();

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(
        seen[0].auth,
        AuthMode::Static { access_key: "A".into(), secret_key: "B".into(), session_token: Some("C".into()) }
    );
    assert_eq!(seen[0].region, "R");
    assert!(!seen[0].force_path_style());
}

#[tokio::test]
async fn test_missing_credentials_file_is_anonymous() {
    let dir = TempDir::new().unwrap();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let store = MemoryStore::default().with_object("repo", "a", vec![0; 4], 0);
    let connector = MemoryConnector { store: Arc::new(store), seen: Arc::clone(&seen) };
    let resolver = FileCredentialResolver::new(
        ResolverConfig::default().with_credentials_path(dir.path().join("absent")),
    );
    let downloader = Downloader::with_parts(resolver, connector, "us-east-1").with_region("ca-central-1");

    downloader.get_file_attributes_async("s3://repo/a").await.unwrap();

    let seen = seen.lock().unwrap();
    assert_eq!(seen[0].auth, AuthMode::Anonymous);
    assert_eq!(seen[0].region, "ca-central-1");
    assert_eq!(seen[0].endpoint, None);
}
