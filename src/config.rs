// src/config.rs
//
// Copyright, 2025.  Signal65 / Futurum Group.
//
//! Credential resolver configuration.

use clap::ValueEnum;
use std::env;
use std::path::PathBuf;

use crate::constants::{
    DEFAULT_CREDENTIALS_PATH, DEFAULT_REGION, ENV_CREDENTIAL_FALLBACK, ENV_CREDENTIAL_SOURCE,
    ENV_CREDENTIALS_PATH, ENV_S3_ENDPOINT, ENV_S3_USE_SSL,
};
use crate::error::FetchError;

/// Where endpoint, TLS and region overrides come from.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum CredentialSource {
    /// Keys, endpoint and region are all read from the credentials file.
    #[default]
    File,
    /// Keys from the credentials file, endpoint and TLS from `S3_ENDPOINT` / `S3_USE_SSL`.
    Environment,
}

/// What to do when the credentials file does not exist.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum CredentialFallback {
    /// Unsigned requests, for publicly readable buckets.
    #[default]
    Anonymous,
    /// The SDK default chain (environment, profile, instance metadata, ...).
    #[value(name = "ambient")]
    AmbientDefault,
}

/// How a credentials file line is matched against a directive name.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum KeyMatching {
    /// Text before the first ` = ` must equal the directive name.
    #[default]
    Exact,
    /// Any line containing the directive name matches it.
    Substring,
}

#[derive(Debug, Clone)]
pub struct ResolverConfig {
    pub source: CredentialSource,
    pub fallback: CredentialFallback,
    pub key_matching: KeyMatching,
    pub credentials_path: PathBuf,
    /// Requested region when the caller does not pin one and `AWS_DEFAULT_REGION` is unset.
    pub default_region: String,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            source: CredentialSource::default(),
            fallback: CredentialFallback::default(),
            key_matching: KeyMatching::default(),
            credentials_path: PathBuf::from(DEFAULT_CREDENTIALS_PATH),
            default_region: DEFAULT_REGION.to_string(),
        }
    }
}

impl ResolverConfig {
    /// Defaults, overridden by `APT_S3_CREDENTIALS`, `APT_S3_CREDENTIAL_SOURCE`
    /// and `APT_S3_CREDENTIAL_FALLBACK` when they are set.
    pub fn from_env() -> Result<Self, FetchError> {
        let mut config = Self::default();

        if let Some(path) = non_empty_var(ENV_CREDENTIALS_PATH) {
            config.credentials_path = PathBuf::from(path);
        }
        if let Some(source) = non_empty_var(ENV_CREDENTIAL_SOURCE) {
            config.source = parse_value_enum(ENV_CREDENTIAL_SOURCE, &source)?;
        }
        if let Some(fallback) = non_empty_var(ENV_CREDENTIAL_FALLBACK) {
            config.fallback = parse_value_enum(ENV_CREDENTIAL_FALLBACK, &fallback)?;
        }
        Ok(config)
    }

    pub fn with_credentials_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.credentials_path = path.into();
        self
    }

    pub fn with_source(mut self, source: CredentialSource) -> Self {
        self.source = source;
        self
    }

    pub fn with_fallback(mut self, fallback: CredentialFallback) -> Self {
        self.fallback = fallback;
        self
    }

    pub fn with_key_matching(mut self, key_matching: KeyMatching) -> Self {
        self.key_matching = key_matching;
        self
    }
}

/// Snapshot of the environment variables read by [`CredentialSource::Environment`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvOverrides {
    pub endpoint: Option<String>,
    pub use_tls: bool,
}

impl Default for EnvOverrides {
    fn default() -> Self {
        Self { endpoint: None, use_tls: true }
    }
}

impl EnvOverrides {
    pub fn from_env() -> Self {
        Self {
            endpoint: non_empty_var(ENV_S3_ENDPOINT),
            use_tls: use_tls_from(env::var(ENV_S3_USE_SSL).ok().as_deref()),
        }
    }
}

/// Only the literal `false` turns TLS off.
pub fn use_tls_from(value: Option<&str>) -> bool {
    value != Some("false")
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.is_empty())
}

fn parse_value_enum<T: ValueEnum>(name: &str, value: &str) -> Result<T, FetchError> {
    T::from_str(value, true).map_err(|e| FetchError::Config(format!("{name}={value}: {e}")))
}
