// src/session.rs
//
// Copyright, 2025.  Signal65 / Futurum Group.
//
//! Single-slot session cache keyed by region.
//!
//! At most one session is live. It is rebuilt only when a request asks for
//! a different region than the one it was built for, or when none exists.
//! A rebuild resolves credentials again; reusing a session does not, so
//! changes to the credentials file are only picked up on a region change.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

use crate::credentials::{CredentialResolver, SessionSettings};
use crate::error::FetchError;
use crate::s3_ops::ObjectBackend;

/// Builds a session from resolved settings.
#[async_trait]
pub trait SessionConnector: Send + Sync + 'static {
    type Session: ObjectBackend;

    async fn connect(&self, settings: SessionSettings) -> Result<Self::Session, FetchError>;
}

/// The live session, keyed by the requested region. `session_region` is
/// the region it was actually built for, which differs when the credentials
/// file overrides it.
struct BoundSession<S> {
    region: String,
    session_region: String,
    session: Arc<S>,
}

pub struct SessionCache<R, C: SessionConnector> {
    resolver: R,
    connector: C,
    slot: Mutex<Option<BoundSession<C::Session>>>,
}

impl<R, C> SessionCache<R, C>
where
    R: CredentialResolver,
    C: SessionConnector,
{
    pub fn new(resolver: R, connector: C) -> Self {
        Self { resolver, connector, slot: Mutex::new(None) }
    }

    /// Session for `region`, building a new one if the bound region differs.
    ///
    /// On failure the slot is left empty; the previous session, if any, has
    /// already been dropped.
    pub async fn ensure_session(&self, region: &str) -> Result<Arc<C::Session>, FetchError> {
        let mut slot = self.slot.lock().await;

        if let Some(bound) = slot.as_ref() {
            if bound.region == region {
                return Ok(Arc::clone(&bound.session));
            }
            debug!("Region changed from {} to {}, replacing S3 session", bound.region, region);
        }

        *slot = None;
        let settings = self.resolver.resolve(region)?;
        let session_region = settings.region.clone();
        let session = Arc::new(self.connector.connect(settings).await?);
        debug!("Created S3 session for region {} (requested {})", session_region, region);

        *slot = Some(BoundSession {
            region: region.to_string(),
            session_region,
            session: Arc::clone(&session),
        });
        Ok(session)
    }

    /// Region the live session was built for, if any.
    pub async fn active_region(&self) -> Option<String> {
        self.slot.lock().await.as_ref().map(|b| b.session_region.clone())
    }
}
