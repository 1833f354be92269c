//! Discovery run
//!
//! Credentials are resolved before the browser starts, so a missing secret
//! never opens a page. The interceptor subscribes before the first navigation
//! and therefore also sees the login flow's own API traffic. Artifacts are
//! only written once every fatal step has succeeded; a failed run leaves at
//! most the login failure screenshot behind.

use std::path::PathBuf;
use std::time::Duration;

use browser::BrowserSession;
use capture::{CaptureFilter, CaptureStore, Interceptor};
use site_auth::{
    AuthStrategy, LoginCredentials, LoginDriver, LoginReport, LoginRules, ProbeResult,
    ProbeTransport, ReqwestTransport, SessionMaterial, SessionSnapshot,
};
use tracing::{info, instrument, warn};

use crate::chrome::{ChromeSession, LaunchOptions};
use crate::config::Config;
use crate::crawl::crawl;
use crate::error::{Error, Result};

/// Summary of a finished discovery run.
#[derive(Debug, Clone)]
pub struct DiscoveryReport {
    pub endpoints: usize,
    pub calls: usize,
    pub gaps: u64,
    pub strategy: AuthStrategy,
    pub verified: bool,
    pub catalog_path: PathBuf,
    pub session_path: PathBuf,
}

/// What one authenticated browser pass yields.
pub struct AuthenticatedPass {
    pub login: LoginReport,
    pub store: CaptureStore,
    pub material: SessionMaterial,
}

/// Resolve the configured credentials.
pub fn resolve_credentials(config: &Config) -> site_auth::Result<LoginCredentials> {
    let resolver = config.credentials.resolver();
    site_auth::credentials::resolve(&config.credentials.spec(), &resolver)
}

/// Log in on `session` with the interceptor attached, optionally crawl, and
/// collect the session material.
pub async fn authenticate(
    config: &Config,
    session: &dyn BrowserSession,
    credentials: &LoginCredentials,
    crawl_paths: &[String],
) -> site_auth::Result<AuthenticatedPass> {
    let filter = CaptureFilter::new(config.target.host())
        .with_extra_patterns(&config.capture.exclude_patterns)?;
    let interceptor = Interceptor::new(filter).spawn(session.network_events().await?);

    let rules = LoginRules {
        target_host: config.target.host().to_string(),
        max_steps: config.login.max_steps,
        settle: config.login.settle(),
        mfa_available: credentials.mfa_available(),
    };
    let driver = LoginDriver::new(
        session,
        credentials,
        rules,
        config.target.login_url().as_str(),
        config.output.failure_screenshot_path(),
    );
    let login = match driver.run().await {
        Ok(report) => report,
        Err(e) => {
            let _ = interceptor.finish().await;
            return Err(e);
        }
    };

    // Landing pages fire their own API calls; give them time to complete.
    tokio::time::sleep(config.crawl.settle()).await;
    crawl(session, &config.target.url, crawl_paths, config.crawl.settle()).await;

    let store = interceptor.finish().await?;
    let material = SessionMaterial::collect(session, &store, &config.target.url).await?;
    Ok(AuthenticatedPass {
        login,
        store,
        material,
    })
}

/// Full discovery against a live Chrome.
#[instrument(skip_all, fields(run_id = %uuid::Uuid::new_v4(), instance = %config.target.url))]
pub async fn discover(config: &Config) -> Result<DiscoveryReport> {
    let result = launch_and_run(config).await;
    match &result {
        Ok(report) => crate::metrics::record_discovery("success", report.endpoints),
        Err(e) => crate::metrics::record_discovery(failure_outcome(e), 0),
    }
    result
}

async fn launch_and_run(config: &Config) -> Result<DiscoveryReport> {
    let credentials = resolve_credentials(config)?;
    let transport = if config.probe.enabled {
        Some(ReqwestTransport::new(Duration::from_secs(config.probe.timeout_secs))?)
    } else {
        None
    };

    let session = ChromeSession::launch(&LaunchOptions::from(&config.browser)).await?;
    let result = run(
        config,
        &session,
        &credentials,
        transport.as_ref().map(|t| t as &dyn ProbeTransport),
    )
    .await;
    session.close().await;
    result
}

fn failure_outcome(error: &Error) -> &'static str {
    match error {
        Error::Auth(site_auth::Error::CredentialMissing(_)) => "credential_missing",
        Error::Auth(site_auth::Error::LoginTimeout { .. }) => "login_timeout",
        _ => "error",
    }
}

/// Discovery against an already-open session. `transport: None` skips
/// probing and adopts the cookie strategy unverified.
pub async fn run(
    config: &Config,
    session: &dyn BrowserSession,
    credentials: &LoginCredentials,
    transport: Option<&dyn ProbeTransport>,
) -> Result<DiscoveryReport> {
    let pass = authenticate(config, session, credentials, &config.crawl.paths).await?;
    info!(
        steps = pass.login.steps,
        url = %pass.login.final_url,
        calls = pass.store.len(),
        routes = pass.store.route_count(),
        "capture complete"
    );

    let probe_path = pass
        .store
        .latest_successful_get()
        .map(|call| call.path_and_query());
    let chosen = match transport {
        Some(transport) => site_auth::probe(&pass.material, probe_path.as_deref(), transport).await,
        None => {
            warn!(
                warning = "unverified_strategy",
                "probing disabled, adopting cookie_context unverified"
            );
            ProbeResult::unverified()
        }
    };
    let snapshot = SessionSnapshot::new(&pass.material, chosen.strategy, chosen.verified);

    let catalog = catalog::synthesize(&pass.store);
    let catalog_path = config.output.catalog_path();
    let session_path = config.output.session_path();
    catalog.write(&catalog_path).await?;
    snapshot.write(&session_path).await?;

    let report = DiscoveryReport {
        endpoints: catalog.len(),
        calls: pass.store.len(),
        gaps: pass.store.gaps(),
        strategy: snapshot.strategy,
        verified: snapshot.verified,
        catalog_path,
        session_path,
    };
    info!(
        endpoints = report.endpoints,
        calls = report.calls,
        gaps = report.gaps,
        strategy = %report.strategy,
        verified = report.verified,
        "discovery complete"
    );
    Ok(report)
}
