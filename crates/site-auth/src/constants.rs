//! Login page heuristics and limits
//!
//! Selector groups are tried in order; the first visible match wins. They
//! cover the common hosted identity providers (Okta, Entra ID, Google,
//! Auth0, Keycloak, Ping) as well as plain application login forms.

use std::time::Duration;

/// Username / email inputs.
pub const EMAIL_SELECTORS: &[&str] = &[
    "input[type='email']",
    "input[name='email']",
    "input[name='username']",
    "input[name='loginfmt']",
    "input[name='identifier']",
    "input[id='username']",
    "input[autocomplete='username']",
];

/// Password inputs.
pub const PASSWORD_SELECTORS: &[&str] = &[
    "input[type='password']",
    "input[name='password']",
    "input[name='passwd']",
    "input[autocomplete='current-password']",
];

/// One-time code inputs.
pub const MFA_SELECTORS: &[&str] = &[
    "input[autocomplete='one-time-code']",
    "input[name='otp']",
    "input[name='totp']",
    "input[name='code']",
    "input[name='otc']",
    "input[name='answer']",
    "input[id='totpPin']",
];

/// Visible labels of consent / interstitial buttons, matched case-insensitively.
pub const CONSENT_LABELS: &[&str] = &[
    "accept",
    "allow",
    "authorize",
    "continue",
    "yes",
    "stay signed in",
    "i agree",
    "approve",
];

/// Default login step budget.
pub const MAX_LOGIN_STEPS: u32 = 25;

/// Default wait between observations when nothing on the page is actionable.
pub const DEFAULT_SETTLE: Duration = Duration::from_millis(1500);

/// File name of the failure screenshot.
pub const FAILURE_SCREENSHOT: &str = "login-failure.png";

/// File name of the session artifact.
pub const SESSION_ARTIFACT: &str = "session.json";
