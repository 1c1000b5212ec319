// src/lib.rs
//
// Copyright, 2025.  Signal65 / Futurum Group.
//
// Crate root — S3 transport backend for the APT fetch method.

pub mod constants;
pub mod config;
pub mod credentials;
pub mod download;
pub mod error;
pub mod range_engine_generic;
pub mod s3_client;
pub mod s3_ops;
pub mod session;
pub mod uri_utils;

// ===== Re-exports used by src/bin/cli.rs and the integration tests =====
pub use crate::config::{CredentialFallback, CredentialSource, KeyMatching, ResolverConfig};
pub use crate::credentials::{
    AuthMode, CredentialResolver, Credentials, FileCredentialResolver, SessionSettings,
};
pub use crate::download::{Downloader, ObjectAttributes, S3Downloader};
pub use crate::error::FetchError;
pub use crate::range_engine_generic::{RangeEngine, RangeEngineConfig};
pub use crate::s3_client::S3Connector;
pub use crate::s3_ops::{ObjectBackend, ObjectHead, RangeBody};
pub use crate::session::{SessionCache, SessionConnector};
pub use crate::uri_utils::{parse_s3_uri, S3Uri};
