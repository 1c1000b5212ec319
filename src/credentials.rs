// src/credentials.rs
//
// Copyright, 2025.  Signal65 / Futurum Group.
//
//! Credential resolution for new S3 sessions.
//!
//! The static credentials file holds one `<directive> = <value>` pair per
//! line:
//!
//! ```text
//! aws_access_key_id = AKIA...
//! aws_secret_access_key = ...
//! aws_session_token = ...
//! endpoint = https://minio.internal:9000
//! region = eu-central-1
//! ```
//!
//! The value is everything after the *last* ` = `. Unrecognised lines are
//! ignored. Nothing here is cached: every call to
//! [`CredentialResolver::resolve`] reads the file again.

use std::fmt;
use std::fs::{self, File};
use std::io::{self, BufRead, BufReader};
use std::path::Path;

use tracing::debug;

use crate::config::{
    CredentialFallback, CredentialSource, EnvOverrides, KeyMatching, ResolverConfig,
};
use crate::constants::CREDENTIALS_SEPARATOR;
use crate::error::FetchError;

/// Values read from the credentials file.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub access_key: String,
    pub secret_key: String,
    pub session_token: String,
    pub endpoint: Option<String>,
    pub region: Option<String>,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key", &self.access_key)
            .field("secret_key", &"<redacted>")
            .field("session_token", &(!self.session_token.is_empty()))
            .field("endpoint", &self.endpoint)
            .field("region", &self.region)
            .finish()
    }
}

/// Recognised credentials file directives, in matching order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Directive {
    AccessKeyId,
    SecretAccessKey,
    SessionToken,
    Endpoint,
    Region,
}

impl Directive {
    pub const ALL: [Directive; 5] = [
        Directive::AccessKeyId,
        Directive::SecretAccessKey,
        Directive::SessionToken,
        Directive::Endpoint,
        Directive::Region,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Directive::AccessKeyId => "aws_access_key_id",
            Directive::SecretAccessKey => "aws_secret_access_key",
            Directive::SessionToken => "aws_session_token",
            Directive::Endpoint => "endpoint",
            Directive::Region => "region",
        }
    }

    /// First directive `line` matches, if any.
    pub fn match_line(line: &str, matching: KeyMatching) -> Option<Directive> {
        match matching {
            KeyMatching::Exact => {
                let (key, _) = line.split_once(CREDENTIALS_SEPARATOR)?;
                let key = key.trim();
                Self::ALL.into_iter().find(|d| d.name() == key)
            }
            // NOTE: "s3_endpoint_backup = x" matches `endpoint` here.
            KeyMatching::Substring => Self::ALL.into_iter().find(|d| line.contains(d.name())),
        }
    }
}

/// Everything after the last separator, or the whole line when there is none.
pub fn directive_value(line: &str) -> &str {
    line.rsplit(CREDENTIALS_SEPARATOR).next().unwrap_or(line)
}

/// Scan credentials from any line source.
pub fn parse_credentials<R: BufRead>(reader: R, matching: KeyMatching) -> io::Result<Credentials> {
    let mut creds = Credentials::default();

    for line in reader.lines() {
        let line = line?;
        let Some(directive) = Directive::match_line(&line, matching) else {
            continue;
        };
        let value = directive_value(&line).to_string();
        match directive {
            Directive::AccessKeyId => creds.access_key = value,
            Directive::SecretAccessKey => creds.secret_key = value,
            Directive::SessionToken => creds.session_token = value,
            Directive::Endpoint => creds.endpoint = Some(value).filter(|v| !v.is_empty()),
            Directive::Region => creds.region = Some(value).filter(|v| !v.is_empty()),
        }
    }
    Ok(creds)
}

/// Open and scan the credentials file at `path`.
pub fn read_credentials_file(path: &Path, matching: KeyMatching) -> Result<Credentials, FetchError> {
    let to_err = |source| FetchError::CredentialFile { path: path.to_path_buf(), source };
    let file = File::open(path).map_err(to_err)?;
    parse_credentials(BufReader::new(file), matching).map_err(to_err)
}

/// How requests of a session are authenticated.
#[derive(Clone, PartialEq, Eq)]
pub enum AuthMode {
    Static {
        access_key: String,
        secret_key: String,
        session_token: Option<String>,
    },
    Anonymous,
    AmbientDefault,
}

impl fmt::Debug for AuthMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthMode::Static { access_key, .. } => write!(f, "Static({access_key})"),
            AuthMode::Anonymous => f.write_str("Anonymous"),
            AuthMode::AmbientDefault => f.write_str("AmbientDefault"),
        }
    }
}

impl From<&Credentials> for AuthMode {
    fn from(creds: &Credentials) -> Self {
        AuthMode::Static {
            access_key: creds.access_key.clone(),
            secret_key: creds.secret_key.clone(),
            session_token: Some(creds.session_token.clone()).filter(|t| !t.is_empty()),
        }
    }
}

/// Everything needed to build one session. Dropped once the session exists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSettings {
    pub auth: AuthMode,
    pub region: String,
    pub endpoint: Option<String>,
    pub use_tls: bool,
}

impl SessionSettings {
    /// Settings for `fallback` in `region` with no endpoint override.
    pub fn fallback(fallback: CredentialFallback, region: &str) -> Self {
        let auth = match fallback {
            CredentialFallback::Anonymous => AuthMode::Anonymous,
            CredentialFallback::AmbientDefault => AuthMode::AmbientDefault,
        };
        Self { auth, region: region.to_string(), endpoint: None, use_tls: true }
    }

    /// Endpoint with a scheme, `https://` unless TLS is disabled.
    pub fn endpoint_url(&self) -> Option<String> {
        let endpoint = self.endpoint.as_deref()?;
        if endpoint.contains("://") {
            return Some(endpoint.to_string());
        }
        let scheme = if self.use_tls { "https" } else { "http" };
        Some(format!("{scheme}://{endpoint}"))
    }

    /// Custom endpoints are addressed path-style (`endpoint/bucket/key`).
    pub fn force_path_style(&self) -> bool {
        self.endpoint.is_some()
    }
}

/// Produces session settings whenever the session cache needs a new session.
pub trait CredentialResolver: Send + Sync + 'static {
    fn resolve(&self, requested_region: &str) -> Result<SessionSettings, FetchError>;
}

/// Resolver backed by the static credentials file and, for the environment
/// source, the `S3_ENDPOINT` / `S3_USE_SSL` variables.
#[derive(Debug, Clone, Default)]
pub struct FileCredentialResolver {
    config: ResolverConfig,
}

impl FileCredentialResolver {
    pub fn new(config: ResolverConfig) -> Self {
        Self { config }
    }

    /// Resolve against an explicit environment snapshot.
    pub fn resolve_with(
        &self,
        requested_region: &str,
        env: &EnvOverrides,
    ) -> Result<SessionSettings, FetchError> {
        let path = self.config.credentials_path.as_path();
        let file_creds = match fs::metadata(path) {
            Ok(_) => Some(read_credentials_file(path, self.config.key_matching)?),
            Err(e) if e.kind() == io::ErrorKind::NotFound => None,
            Err(source) => {
                return Err(FetchError::CredentialFile { path: path.to_path_buf(), source });
            }
        };

        let settings = match (self.config.source, file_creds) {
            (CredentialSource::File, Some(creds)) => SessionSettings {
                auth: AuthMode::from(&creds),
                region: creds.region.clone().unwrap_or_else(|| requested_region.to_string()),
                endpoint: creds.endpoint.clone(),
                use_tls: true,
            },
            (CredentialSource::File, None) => {
                SessionSettings::fallback(self.config.fallback, requested_region)
            }
            (CredentialSource::Environment, creds) => {
                let auth = match creds {
                    Some(creds) => AuthMode::from(&creds),
                    None => SessionSettings::fallback(self.config.fallback, requested_region).auth,
                };
                SessionSettings {
                    auth,
                    region: requested_region.to_string(),
                    endpoint: env.endpoint.clone(),
                    use_tls: env.use_tls,
                }
            }
        };

        debug!(
            "Resolved credentials from {}: auth={:?}, region={}, endpoint={:?}",
            path.display(),
            settings.auth,
            settings.region,
            settings.endpoint
        );
        Ok(settings)
    }
}

impl CredentialResolver for FileCredentialResolver {
    fn resolve(&self, requested_region: &str) -> Result<SessionSettings, FetchError> {
        let env = match self.config.source {
            CredentialSource::Environment => EnvOverrides::from_env(),
            CredentialSource::File => EnvOverrides::default(),
        };
        self.resolve_with(requested_region, &env)
    }
}
