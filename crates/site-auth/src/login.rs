//! Login state machine
//!
//! `handle_observation` is pure: it receives what the page currently shows
//! and returns `(new_state, action)`. `LoginDriver` owns the I/O: it observes
//! the page, calls the transition function, and performs the action. Guards
//! are evaluated in a fixed priority on every iteration, so an SSO flow that
//! bounces between providers or skips steps still converges:
//!
//! 1. landed on the target host with no login field visible -> `Finish`
//! 2. step budget exhausted -> `CaptureFailure`
//! 3. email field empty -> `FillEmail`
//! 4. password field empty -> `FillPassword`
//! 5. MFA field empty (and a code source exists) -> `FillMfaCode`
//! 6. consent control visible -> `ClickConsent`
//! 7. otherwise -> `Wait`

use std::path::PathBuf;
use std::time::Duration;

use browser::{BrowserSession, FieldState};
use tracing::{debug, info, warn};

use crate::constants::{CONSENT_LABELS, EMAIL_SELECTORS, MFA_SELECTORS, PASSWORD_SELECTORS};
use crate::credentials::LoginCredentials;
use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginState {
    Init,
    AwaitingEmail,
    AwaitingPassword,
    AwaitingMfaCode,
    AwaitingConsent,
    /// Nothing actionable on the page this iteration
    Waiting,
    Landed,
    Failed,
}

impl LoginState {
    pub fn is_terminal(self) -> bool {
        matches!(self, LoginState::Landed | LoginState::Failed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginAction {
    Finish,
    CaptureFailure,
    FillEmail,
    FillPassword,
    FillMfaCode,
    ClickConsent,
    Wait(Duration),
}

/// What the driver saw on the page at the start of an iteration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Observation {
    pub url: String,
    pub email: FieldState,
    pub password: FieldState,
    pub mfa: FieldState,
    pub consent_visible: bool,
    /// Iterations already performed
    pub step: u32,
}

impl Observation {
    fn login_field_visible(&self) -> bool {
        self.email.is_visible() || self.password.is_visible() || self.mfa.is_visible()
    }
}

/// Fixed parameters of one login run.
#[derive(Debug, Clone)]
pub struct LoginRules {
    /// Host the session must land on (subdomains count)
    pub target_host: String,
    pub max_steps: u32,
    pub settle: Duration,
    /// Whether a TOTP secret or fixed code is available for MFA fields
    pub mfa_available: bool,
}

impl LoginRules {
    pub fn is_target(&self, url: &str) -> bool {
        let Ok(parsed) = url::Url::parse(url) else {
            return false;
        };
        let Some(host) = parsed.host_str() else {
            return false;
        };
        let host = host.to_ascii_lowercase();
        let target = self.target_host.to_ascii_lowercase();
        host == target || host.ends_with(&format!(".{target}"))
    }
}

/// Transition function. Pure: no I/O.
pub fn handle_observation(
    state: LoginState,
    obs: &Observation,
    rules: &LoginRules,
) -> (LoginState, LoginAction) {
    match state {
        LoginState::Landed => return (state, LoginAction::Finish),
        LoginState::Failed => return (state, LoginAction::CaptureFailure),
        _ => {}
    }

    if rules.is_target(&obs.url) && !obs.login_field_visible() {
        return (LoginState::Landed, LoginAction::Finish);
    }
    if obs.step >= rules.max_steps {
        return (LoginState::Failed, LoginAction::CaptureFailure);
    }
    if obs.email.is_empty_and_visible() {
        return (LoginState::AwaitingEmail, LoginAction::FillEmail);
    }
    if obs.password.is_empty_and_visible() {
        return (LoginState::AwaitingPassword, LoginAction::FillPassword);
    }
    if rules.mfa_available && obs.mfa.is_empty_and_visible() {
        return (LoginState::AwaitingMfaCode, LoginAction::FillMfaCode);
    }
    if obs.consent_visible {
        return (LoginState::AwaitingConsent, LoginAction::ClickConsent);
    }
    (LoginState::Waiting, LoginAction::Wait(rules.settle))
}

/// Result of a successful login.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginReport {
    pub steps: u32,
    pub final_url: String,
}

/// Drives a browser session through a login flow.
pub struct LoginDriver<'a> {
    session: &'a dyn BrowserSession,
    credentials: &'a LoginCredentials,
    rules: LoginRules,
    login_url: String,
    failure_screenshot: PathBuf,
}

impl<'a> LoginDriver<'a> {
    pub fn new(
        session: &'a dyn BrowserSession,
        credentials: &'a LoginCredentials,
        rules: LoginRules,
        login_url: impl Into<String>,
        failure_screenshot: impl Into<PathBuf>,
    ) -> Self {
        Self {
            session,
            credentials,
            rules,
            login_url: login_url.into(),
            failure_screenshot: failure_screenshot.into(),
        }
    }

    /// Run until landed or out of steps.
    pub async fn run(&self) -> Result<LoginReport> {
        info!(
            backend = self.session.id(),
            url = %self.login_url,
            target_host = %self.rules.target_host,
            max_steps = self.rules.max_steps,
            "starting login"
        );
        self.session.navigate(&self.login_url).await?;

        let mut state = LoginState::Init;
        let mut step = 0u32;
        loop {
            let obs = self.observe(step).await?;
            let (next, action) = handle_observation(state, &obs, &self.rules);
            if next != state {
                debug!(from = ?state, to = ?next, step, url = %obs.url, "login transition");
            }
            state = next;

            match action {
                LoginAction::Finish => {
                    info!(steps = step, url = %obs.url, "login landed");
                    metrics::counter!("login_attempts_total", "outcome" => "landed").increment(1);
                    return Ok(LoginReport {
                        steps: step,
                        final_url: obs.url,
                    });
                }
                LoginAction::CaptureFailure => {
                    metrics::counter!("login_attempts_total", "outcome" => "timeout").increment(1);
                    return Err(self.fail(step, &obs.url).await);
                }
                LoginAction::FillEmail => {
                    self.fill(EMAIL_SELECTORS, self.credentials.username.expose(), "email")
                        .await?;
                }
                LoginAction::FillPassword => {
                    self.fill(PASSWORD_SELECTORS, self.credentials.password.expose(), "password")
                        .await?;
                }
                LoginAction::FillMfaCode => match self.credentials.mfa_code()? {
                    Some(code) => self.fill(MFA_SELECTORS, code.expose(), "mfa").await?,
                    None => tokio::time::sleep(self.rules.settle).await,
                },
                LoginAction::ClickConsent => {
                    if !self.session.click_control(CONSENT_LABELS).await? {
                        debug!(step, "consent control vanished before click");
                    }
                    tokio::time::sleep(self.rules.settle).await;
                }
                LoginAction::Wait(delay) => tokio::time::sleep(delay).await,
            }
            step += 1;
        }
    }

    async fn observe(&self, step: u32) -> Result<Observation> {
        Ok(Observation {
            url: self.session.current_url().await?,
            email: self.session.field_state(EMAIL_SELECTORS).await?,
            password: self.session.field_state(PASSWORD_SELECTORS).await?,
            mfa: self.session.field_state(MFA_SELECTORS).await?,
            consent_visible: self.session.control_visible(CONSENT_LABELS).await?,
            step,
        })
    }

    async fn fill(&self, selectors: &[&str], value: &str, field: &str) -> Result<()> {
        if self.session.fill_and_submit(selectors, value).await? {
            debug!(field, "filled and submitted");
        } else {
            debug!(field, "field vanished before fill");
        }
        tokio::time::sleep(self.rules.settle).await;
        Ok(())
    }

    /// Capture the failure screenshot and build the timeout error. A failed
    /// screenshot is logged; the timeout is still the error reported.
    async fn fail(&self, steps: u32, url: &str) -> Error {
        if let Err(e) = self.session.screenshot(&self.failure_screenshot).await {
            warn!(error = %e, path = %self.failure_screenshot.display(), "failure screenshot not written");
        }
        warn!(
            steps,
            url,
            screenshot = %self.failure_screenshot.display(),
            "login step budget exhausted"
        );
        Error::LoginTimeout {
            steps,
            screenshot: self.failure_screenshot.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::MfaSource;
    use crate::testing::{ScriptedPage, Stage};
    use common::Secret;

    fn rules() -> LoginRules {
        LoginRules {
            target_host: "app.example.com".into(),
            max_steps: 25,
            settle: Duration::from_millis(500),
            mfa_available: true,
        }
    }

    fn obs(url: &str) -> Observation {
        Observation {
            url: url.into(),
            email: FieldState::Absent,
            password: FieldState::Absent,
            mfa: FieldState::Absent,
            consent_visible: false,
            step: 0,
        }
    }

    const IDP: &str = "https://login.idp.example.net/authorize";
    const IDP2: &str = "https://sso.corp.example.org/saml";
    const APP: &str = "https://app.example.com/dashboard";

    #[test]
    fn awaiting_states_recur_after_a_federation_hop() {
        let mut o = obs(IDP2);
        o.email = FieldState::Empty;
        let (s, a) = handle_observation(LoginState::AwaitingConsent, &o, &rules());
        assert_eq!((s, a), (LoginState::AwaitingEmail, LoginAction::FillEmail));

        let mut o = obs(IDP2);
        o.password = FieldState::Empty;
        let (s, a) = handle_observation(LoginState::AwaitingMfaCode, &o, &rules());
        assert_eq!((s, a), (LoginState::AwaitingPassword, LoginAction::FillPassword));
    }

    #[test]
    fn landed_requires_target_host_and_no_login_fields() {
        let (s, a) = handle_observation(LoginState::Init, &obs(APP), &rules());
        assert_eq!((s, a), (LoginState::Landed, LoginAction::Finish));

        let mut o = obs(APP);
        o.password = FieldState::Empty;
        let (s, a) = handle_observation(LoginState::Init, &o, &rules());
        assert_eq!((s, a), (LoginState::AwaitingPassword, LoginAction::FillPassword));
    }

    #[test]
    fn subdomain_of_target_counts_as_landed() {
        let (s, _) = handle_observation(
            LoginState::Waiting,
            &obs("https://eu.app.example.com/home"),
            &rules(),
        );
        assert_eq!(s, LoginState::Landed);
        let (s, _) = handle_observation(LoginState::Waiting, &obs("https://notapp.example.com/"), &rules());
        assert_eq!(s, LoginState::Waiting);
    }

    #[test]
    fn landing_beats_exhausted_budget() {
        let mut o = obs(APP);
        o.step = 99;
        assert_eq!(handle_observation(LoginState::Waiting, &o, &rules()).0, LoginState::Landed);
    }

    #[test]
    fn budget_beats_fillable_fields() {
        let mut o = obs(IDP);
        o.email = FieldState::Empty;
        o.step = 25;
        assert_eq!(
            handle_observation(LoginState::AwaitingEmail, &o, &rules()),
            (LoginState::Failed, LoginAction::CaptureFailure)
        );
    }

    #[test]
    fn guards_follow_priority_order() {
        let mut o = obs(IDP);
        o.email = FieldState::Empty;
        o.password = FieldState::Empty;
        o.mfa = FieldState::Empty;
        o.consent_visible = true;
        assert_eq!(handle_observation(LoginState::Init, &o, &rules()).1, LoginAction::FillEmail);

        o.email = FieldState::Filled;
        assert_eq!(handle_observation(LoginState::Init, &o, &rules()).1, LoginAction::FillPassword);

        o.password = FieldState::Absent;
        assert_eq!(handle_observation(LoginState::Init, &o, &rules()).1, LoginAction::FillMfaCode);

        o.mfa = FieldState::Filled;
        assert_eq!(handle_observation(LoginState::Init, &o, &rules()).1, LoginAction::ClickConsent);

        o.consent_visible = false;
        assert_eq!(
            handle_observation(LoginState::Init, &o, &rules()),
            (LoginState::Waiting, LoginAction::Wait(Duration::from_millis(500)))
        );
    }

    #[test]
    fn mfa_left_alone_without_code_source() {
        let mut r = rules();
        r.mfa_available = false;
        let mut o = obs(IDP);
        o.mfa = FieldState::Empty;
        assert_eq!(handle_observation(LoginState::Init, &o, &r).0, LoginState::Waiting);
    }

    #[test]
    fn terminal_states_are_sticky() {
        let o = obs(IDP);
        assert_eq!(
            handle_observation(LoginState::Landed, &o, &rules()),
            (LoginState::Landed, LoginAction::Finish)
        );
        assert_eq!(
            handle_observation(LoginState::Failed, &obs(APP), &rules()),
            (LoginState::Failed, LoginAction::CaptureFailure)
        );
    }

    fn creds() -> LoginCredentials {
        LoginCredentials::new("user@example.com", "hunter2")
            .with_mfa(MfaSource::Code(Secret::new("123456".into())))
    }

    #[tokio::test(start_paused = true)]
    async fn driver_walks_multi_page_sso_flow() {
        let page = ScriptedPage::new(vec![
            Stage::at(IDP).email(FieldState::Empty),
            Stage::at(IDP).password(FieldState::Empty),
            Stage::at(IDP).mfa(FieldState::Empty),
            Stage::at(IDP).consent(),
            Stage::at(IDP2).email(FieldState::Empty),
            Stage::at(IDP2).password(FieldState::Empty),
            Stage::at(APP),
        ]);
        let creds = creds();
        let driver = LoginDriver::new(&page, &creds, rules(), IDP, "/tmp/unused.png");

        let report = driver.run().await.unwrap();
        assert_eq!(report.final_url, APP);
        assert_eq!(report.steps, 6);
        assert_eq!(
            page.typed(),
            vec![
                ("email".to_string(), "user@example.com".to_string()),
                ("password".to_string(), "hunter2".to_string()),
                ("mfa".to_string(), "123456".to_string()),
                ("email".to_string(), "user@example.com".to_string()),
                ("password".to_string(), "hunter2".to_string()),
            ]
        );
        assert_eq!(page.clicks(), 1);
        assert_eq!(page.navigations(), vec![IDP.to_string()]);
        assert!(page.screenshots().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn stuck_page_times_out_with_screenshot() {
        let page = ScriptedPage::new(vec![Stage::at(IDP)]);
        let creds = creds();
        let dir = tempfile::tempdir().unwrap();
        let shot = dir.path().join("login-failure.png");
        let mut r = rules();
        r.max_steps = 3;
        let driver = LoginDriver::new(&page, &creds, r, IDP, &shot);

        let err = driver.run().await.unwrap_err();
        match err {
            Error::LoginTimeout { steps, screenshot } => {
                assert_eq!(steps, 3);
                assert_eq!(screenshot, shot);
            }
            other => panic!("expected LoginTimeout, got {other:?}"),
        }
        assert_eq!(page.screenshots(), vec![shot]);
    }

    #[tokio::test(start_paused = true)]
    async fn already_authenticated_session_lands_immediately() {
        let page = ScriptedPage::new(vec![Stage::at(APP)]);
        let creds = creds();
        let driver = LoginDriver::new(&page, &creds, rules(), APP, "/tmp/unused.png");
        let report = driver.run().await.unwrap();
        assert_eq!(report.steps, 0);
        assert!(page.typed().is_empty());
    }
}
