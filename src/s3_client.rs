// src/s3_client.rs
// 
// Copyright, 2025.  Signal65 / Futurum Group.
//
//! Blocking bridge onto a global multi-thread Tokio runtime, and construction
//! of region-scoped S3 clients from resolved credentials.
//!

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::{Credentials, Region};
use aws_sdk_s3::Client;
use std::thread;
use tokio::runtime::{Builder as TokioBuilder, Handle};
use tokio::sync::oneshot;
use std::sync::mpsc;
use tracing::debug;

use crate::constants::ENV_RT_THREADS;
use crate::credentials::{AuthMode, SessionSettings};
use crate::error::FetchError;
use crate::session::SessionConnector;


// -----------------------------------------------------------------------------
// Global runtime (lazy, thread-safe)
// -----------------------------------------------------------------------------
static RT_HANDLE: once_cell::sync::OnceCell<Handle> = once_cell::sync::OnceCell::new();


// Create (once) a background multi-thread Tokio runtime and return its Handle.
fn global_rt_handle() -> &'static Handle {
    RT_HANDLE.get_or_init(|| {
        let (tx, rx) = mpsc::sync_channel(1);
        thread::Builder::new()
            .name("apt-s3-rt".to_string())
            .spawn(move || {
                let threads = get_runtime_threads();
                debug!("Creating Tokio runtime with {} worker threads", threads);

                let rt = TokioBuilder::new_multi_thread()
                    .enable_io()
                    .enable_time()
                    .worker_threads(threads)
                    .thread_name("apt-s3-rt-worker")
                    .build()
                    .expect("failed to build global tokio runtime");

                // Send a Handle clone back to the creator, then park the runtime forever.
                let handle = rt.handle().clone();
                tx.send(handle).expect("send runtime handle");
                rt.block_on(async { std::future::pending::<()>().await });
            })
            .expect("failed to spawn apt-s3 runtime thread");

        rx.recv().expect("receive runtime handle")
    })
}

/// Worker threads for the global runtime. One download at a time only needs a few.
fn get_runtime_threads() -> usize {
    runtime_threads_from(std::env::var(ENV_RT_THREADS).ok().as_deref())
}

/// Zero or unparsable values fall back to the CPU-derived default.
fn runtime_threads_from(value: Option<&str>) -> usize {
    value
        .and_then(|s| s.trim().parse().ok())
        .filter(|&n: &usize| n > 0)
        .unwrap_or_else(|| num_cpus::get().clamp(2, 8))
}


/// Run an async `fut` on the global runtime and block the **current** thread
/// until it completes. Handles both runtime and non-runtime contexts.
pub fn run_on_global_rt<F, T>(fut: F) -> Result<T, FetchError>
where
    F: std::future::Future<Output = Result<T, FetchError>> + Send + 'static,
    T: Send + 'static,
{
    let handle = global_rt_handle().clone();
    match Handle::try_current() {
        Ok(_) => {
            // Inside some runtime: oneshot::blocking_recv would panic here
            let (tx, rx) = mpsc::channel();
            handle.spawn(async move {
                let _ = tx.send(fut.await);
            });
            rx.recv()
                .map_err(|e| FetchError::Runtime(e.to_string()))?
        }
        Err(_) => {
            let (tx, rx) = oneshot::channel();
            handle.spawn(async move {
                let _ = tx.send(fut.await);
            });
            // Block this plain OS thread until the async result arrives.
            rx.blocking_recv()
                .map_err(|e| FetchError::Runtime(e.to_string()))?
        }
    }
}


// -----------------------------------------------------------------------------
// Session construction
// -----------------------------------------------------------------------------

/// Builds `aws_sdk_s3::Client` sessions.
#[derive(Debug, Clone, Copy, Default)]
pub struct S3Connector;

/// Reject settings the SDK would only fail on at request time.
fn validate_settings(settings: &SessionSettings) -> Result<(), FetchError> {
    if settings.region.trim().is_empty() {
        return Err(FetchError::SessionCreation("empty region".into()));
    }
    if let Some(url) = settings.endpoint_url() {
        let host = url.split_once("://").map(|(_, rest)| rest).unwrap_or_default();
        if host.is_empty() || host.starts_with('/') || url.chars().any(char::is_whitespace) {
            return Err(FetchError::SessionCreation(format!("invalid endpoint URL: {url}")));
        }
    }
    if let AuthMode::Static { access_key, secret_key, .. } = &settings.auth {
        if access_key.is_empty() || secret_key.is_empty() {
            return Err(FetchError::SessionCreation(
                "credentials file is missing aws_access_key_id or aws_secret_access_key".into(),
            ));
        }
    }
    Ok(())
}

/// Async S3 client for one region and credential set.
pub async fn build_s3_client(settings: SessionSettings) -> Result<Client, FetchError> {
    validate_settings(&settings)?;

    let mut loader = aws_config::defaults(BehaviorVersion::latest())
        .region(Region::new(settings.region.clone()));

    loader = match &settings.auth {
        AuthMode::Static { access_key, secret_key, session_token } => loader.credentials_provider(
            Credentials::new(access_key, secret_key, session_token.clone(), None, "apt-s3"),
        ),
        AuthMode::Anonymous => loader.no_credentials(),
        AuthMode::AmbientDefault => loader,
    };

    let endpoint = settings.endpoint_url();
    if let Some(url) = &endpoint {
        loader = loader.endpoint_url(url);
    }

    let cfg = loader.load().await;

    // Custom endpoints (MinIO, Ceph, ...) only work with path-style addressing
    let s3_config = aws_sdk_s3::config::Builder::from(&cfg)
        .force_path_style(settings.force_path_style())
        .build();

    debug!(
        "Built S3 client: region={}, endpoint={:?}, path_style={}",
        settings.region,
        endpoint,
        settings.force_path_style()
    );
    Ok(Client::from_conf(s3_config))
}

#[async_trait]
impl SessionConnector for S3Connector {
    type Session = Client;

    async fn connect(&self, settings: SessionSettings) -> Result<Client, FetchError> {
        build_s3_client(settings).await
    }
}
