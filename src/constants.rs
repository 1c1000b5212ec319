// src/constants.rs
//
// Copyright, 2025.  Signal65 / Futurum Group.
//
// Centralized constants for apt-s3 to avoid hardcoded values throughout the codebase

/// Scheme prefix of every object reference handed to the fetch method
pub const S3_SCHEME_PREFIX: &str = "s3://";

/// Region used when neither the caller, the environment nor the credentials file names one
pub const DEFAULT_REGION: &str = "us-east-1";

/// Well-known location of the static credentials file
pub const DEFAULT_CREDENTIALS_PATH: &str = "/etc/apt/s3creds";

/// Separator between directive name and value in the credentials file
pub const CREDENTIALS_SEPARATOR: &str = " = ";

// ============================================================================
// Environment variables
// ============================================================================

/// Overrides the credentials file location
pub const ENV_CREDENTIALS_PATH: &str = "APT_S3_CREDENTIALS";

/// `file` or `environment`, see [`crate::config::CredentialSource`]
pub const ENV_CREDENTIAL_SOURCE: &str = "APT_S3_CREDENTIAL_SOURCE";

/// `anonymous` or `ambient`, see [`crate::config::CredentialFallback`]
pub const ENV_CREDENTIAL_FALLBACK: &str = "APT_S3_CREDENTIAL_FALLBACK";

/// Custom endpoint, only read by the environment credential source
pub const ENV_S3_ENDPOINT: &str = "S3_ENDPOINT";

/// Any value other than the literal `false` keeps TLS enabled
pub const ENV_S3_USE_SSL: &str = "S3_USE_SSL";

/// Requested region for every call when set
pub const ENV_DEFAULT_REGION: &str = "AWS_DEFAULT_REGION";

/// Worker thread override for the global runtime
pub const ENV_RT_THREADS: &str = "APT_S3_RT_THREADS";

// ============================================================================
// RangeEngine Configuration Constants
// ============================================================================
//
// Objects at or above the split threshold are fetched as concurrent byte
// ranges and written to the target file in order. Smaller objects are
// fetched with a single request.

/// Default chunk size for concurrent range downloads (5 MiB)
pub const DEFAULT_RANGE_ENGINE_CHUNK_SIZE: usize = 5 * 1024 * 1024;

/// Default maximum concurrent ranges per object
pub const DEFAULT_RANGE_ENGINE_MAX_CONCURRENT: usize = 5;

/// Minimum object size that triggers range splitting (one chunk)
pub const DEFAULT_RANGE_ENGINE_THRESHOLD: u64 = DEFAULT_RANGE_ENGINE_CHUNK_SIZE as u64;

/// Timestamp layout handed to the fetch protocol, always UTC
pub const LAST_MODIFIED_FORMAT: &str = "%Y-%m-%dT%H:%M:%S+00:00";
