//! Refresh decisions for the current session snapshot
//!
//! The last-attempt instant is the only state shared between callers that
//! decides whether a login happens; it is checked and set under one short
//! lock, so two concurrent callers can never both pass the cooldown. The
//! snapshot itself sits behind a `RwLock` and is replaced wholesale.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use browser::BoxFuture;
use site_auth::{CredentialFingerprint, SessionSnapshot};
use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;
use tracing::{info, warn};

use crate::error::{Error, Result};

/// Produces a fresh snapshot by logging in again.
///
/// `current` lets implementations keep the strategy already in use.
pub trait Relogin: Send + Sync {
    fn relogin<'a>(
        &'a self,
        current: &'a SessionSnapshot,
    ) -> BoxFuture<'a, site_auth::Result<SessionSnapshot>>;
}

/// What `refresh_if_warranted` did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// Inside the cooldown; no login was attempted
    NotAttempted,
    /// Logged in again but the credentials are identical
    NoChange,
    /// New credentials adopted and persisted
    Refreshed,
}

impl RefreshOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            RefreshOutcome::NotAttempted => "not_attempted",
            RefreshOutcome::NoChange => "no_change",
            RefreshOutcome::Refreshed => "refreshed",
        }
    }

    /// `NoChange` means retrying the failed request cannot succeed.
    pub fn ensure_recoverable(self) -> Result<Self> {
        match self {
            RefreshOutcome::NoChange => Err(Error::ReauthSuppressed),
            other => Ok(other),
        }
    }
}

struct Current {
    snapshot: SessionSnapshot,
    fingerprint: CredentialFingerprint,
}

/// Owns the current session snapshot and its refresh policy.
pub struct LifecycleManager {
    current: RwLock<Current>,
    last_attempt: Mutex<Option<Instant>>,
    cooldown: Duration,
    relogin: Arc<dyn Relogin>,
    artifact_path: Option<PathBuf>,
}

impl LifecycleManager {
    pub fn new(snapshot: SessionSnapshot, cooldown: Duration, relogin: Arc<dyn Relogin>) -> Self {
        let fingerprint = snapshot.fingerprint();
        info!(
            instance = %snapshot.instance_url,
            strategy = %snapshot.strategy,
            cooldown_secs = cooldown.as_secs(),
            "session lifecycle initialized"
        );
        Self {
            current: RwLock::new(Current {
                snapshot,
                fingerprint,
            }),
            last_attempt: Mutex::new(None),
            cooldown,
            relogin,
            artifact_path: None,
        }
    }

    /// Persist adopted snapshots to `path`.
    pub fn with_artifact_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.artifact_path = Some(path.into());
        self
    }

    pub async fn snapshot(&self) -> SessionSnapshot {
        self.current.read().await.snapshot.clone()
    }

    pub async fn fingerprint(&self) -> CredentialFingerprint {
        self.current.read().await.fingerprint.clone()
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    /// Time since the last refresh attempt, if there was one.
    pub async fn since_last_attempt(&self) -> Option<Duration> {
        let last = *self.last_attempt.lock().await;
        last.map(|at| at.elapsed())
    }

    /// Claim the attempt slot. False while the previous attempt is within
    /// the cooldown.
    async fn claim_attempt(&self) -> bool {
        let mut last = self.last_attempt.lock().await;
        if let Some(at) = *last {
            if at.elapsed() < self.cooldown {
                return false;
            }
        }
        *last = Some(Instant::now());
        true
    }

    /// Refresh the session if the cooldown allows it.
    ///
    /// A failed relogin still consumes the attempt.
    pub async fn refresh_if_warranted(&self) -> Result<RefreshOutcome> {
        if !self.claim_attempt().await {
            info!(outcome = "not_attempted", "refresh skipped, inside cooldown");
            metrics::counter!("session_refresh_total", "outcome" => "not_attempted").increment(1);
            return Ok(RefreshOutcome::NotAttempted);
        }

        let current = self.snapshot().await;
        info!(instance = %current.instance_url, "session refresh attempt");
        let fresh = match self.relogin.relogin(&current).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(error = %e, "relogin failed");
                metrics::counter!("session_refresh_total", "outcome" => "error").increment(1);
                return Err(Error::Relogin(e.to_string()));
            }
        };
        let fingerprint = fresh.fingerprint();

        {
            let mut guard = self.current.write().await;
            if guard.fingerprint == fingerprint {
                warn!(
                    fingerprint = %fingerprint,
                    "relogin produced identical credentials, keeping current session"
                );
                metrics::counter!("session_refresh_total", "outcome" => "no_change").increment(1);
                return Ok(RefreshOutcome::NoChange);
            }
            *guard = Current {
                snapshot: fresh.clone(),
                fingerprint,
            };
        }

        if let Some(path) = &self.artifact_path {
            fresh
                .write(path)
                .await
                .map_err(|e| Error::Persist(e.to_string()))?;
        }
        info!(
            strategy = %fresh.strategy,
            cookies = fresh.cookie_count,
            "session refreshed"
        );
        metrics::counter!("session_refresh_total", "outcome" => "refreshed").increment(1);
        Ok(RefreshOutcome::Refreshed)
    }
}
