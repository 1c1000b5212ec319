// src/error.rs
//
// Copyright, 2025.  Signal65 / Futurum Group.
//
//! Error type shared by every fetch operation.
//!
//! Nothing here is retried. Each variant is terminal for the call that
//! produced it and the policy for what to do next belongs to the caller.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FetchError {
    /// The reference had no `/` after the bucket.
    #[error("malformed object reference: {0}")]
    MalformedReference(String),

    /// The credentials file exists but could not be opened or scanned.
    #[error("failed to read credentials file {}: {source}", path.display())]
    CredentialFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("failed to create S3 session: {0}")]
    SessionCreation(String),

    /// The storage service rejected the request. Always a single line.
    #[error("{0}")]
    RemoteService(String),

    /// Dispatch, timeout or response errors that did not come from the service.
    #[error("{0}")]
    Transport(String),

    #[error("failed to create {}: {source}", path.display())]
    LocalIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The transfer failed after the target file was created. The file has
    /// already been removed when this is returned.
    #[error("download into {} failed: {source}", path.display())]
    PartialTransfer {
        path: PathBuf,
        #[source]
        source: Box<FetchError>,
    },

    #[error("global runtime task crashed: {0}")]
    Runtime(String),
}

impl FetchError {
    /// Build a [`FetchError::RemoteService`] from service-reported text.
    pub fn remote(message: impl AsRef<str>) -> Self {
        FetchError::RemoteService(flatten_error_message(message.as_ref()))
    }
}

/// Join a possibly multi-line message into one line; the fetch protocol
/// cannot carry embedded newlines.
pub fn flatten_error_message(message: &str) -> String {
    message.split('\n').collect::<Vec<_>>().join(" ")
}
