//! Browser-backed `Relogin` for the lifecycle manager
//!
//! Each refresh launches a fresh Chrome, resolves credentials again (a
//! rotated password is picked up without a restart), and logs in with the
//! interceptor attached so tokens seen during login are captured. No crawl.
//!
//! The fresh snapshot is only marked verified when a probe accepted it. With
//! probing off or nothing to replay, the current strategy is kept unverified
//! if the new material can still serve it, and downgraded to
//! `cookie_context` otherwise.

use std::sync::Arc;
use std::time::Duration;

use browser::{BoxFuture, BrowserSession};
use session_lifecycle::Relogin;
use site_auth::{
    LoginCredentials, ProbeResult, ProbeTransport, ReqwestTransport, SessionSnapshot,
};
use tracing::{info, warn};

use crate::chrome::{ChromeSession, LaunchOptions};
use crate::config::Config;
use crate::discovery::{authenticate, resolve_credentials};

pub struct ChromeRelogin {
    config: Arc<Config>,
}

impl ChromeRelogin {
    pub fn new(config: Arc<Config>) -> Self {
        Self { config }
    }
}

impl Relogin for ChromeRelogin {
    fn relogin<'a>(
        &'a self,
        current: &'a SessionSnapshot,
    ) -> BoxFuture<'a, site_auth::Result<SessionSnapshot>> {
        Box::pin(async move {
            let credentials = resolve_credentials(&self.config)?;
            let transport = if self.config.probe.enabled {
                Some(ReqwestTransport::new(Duration::from_secs(
                    self.config.probe.timeout_secs,
                ))?)
            } else {
                None
            };
            let session = ChromeSession::launch(&LaunchOptions::from(&self.config.browser)).await?;
            let result = relogin_on(
                &self.config,
                &session,
                &credentials,
                current,
                transport.as_ref().map(|t| t as &dyn ProbeTransport),
            )
            .await;
            session.close().await;
            result
        })
    }
}

/// Log in on `session` and build a snapshot from the fresh material.
pub async fn relogin_on(
    config: &Config,
    session: &dyn BrowserSession,
    credentials: &LoginCredentials,
    current: &SessionSnapshot,
    transport: Option<&dyn ProbeTransport>,
) -> site_auth::Result<SessionSnapshot> {
    let pass = authenticate(config, session, credentials, &[]).await?;
    let probe_path = pass
        .store
        .latest_successful_get()
        .map(|call| call.path_and_query());

    let chosen = match (transport, probe_path.as_deref()) {
        (Some(transport), Some(path)) => site_auth::probe(&pass.material, Some(path), transport).await,
        _ if pass.material.supports(current.strategy) => ProbeResult {
            strategy: current.strategy,
            verified: false,
            status: None,
        },
        _ => {
            warn!(
                warning = "unverified_strategy",
                previous = %current.strategy,
                "relogin captured no bearer, falling back to cookie_context"
            );
            ProbeResult::unverified()
        }
    };

    let snapshot = SessionSnapshot::new(&pass.material, chosen.strategy, chosen.verified);
    info!(
        steps = pass.login.steps,
        strategy = %snapshot.strategy,
        verified = snapshot.verified,
        cookies = snapshot.cookie_count,
        "relogin captured session"
    );
    Ok(snapshot)
}
