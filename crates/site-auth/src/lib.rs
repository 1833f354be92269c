//! Site authentication for API discovery
//!
//! Establishes and captures an authenticated browser session against an
//! arbitrary single-sign-on flow. This crate has no dependency on the binary
//! or on any concrete browser backend; everything runs against
//! `browser::BrowserSession`.
//!
//! Flow:
//! 1. `credentials::resolve` turns explicit values and secret labels into
//!    `LoginCredentials` (fails with `CredentialMissing` before any navigation)
//! 2. `login::LoginDriver` walks the login pages until the session lands on the
//!    target host or the step budget runs out (`LoginTimeout` + screenshot)
//! 3. `snapshot::SessionMaterial::collect` gathers cookies and captured tokens
//! 4. `probe::probe` picks the header strategy that actually works
//! 5. `SessionSnapshot` is persisted as the `session.json` artifact

pub mod constants;
pub mod credentials;
pub mod error;
pub mod login;
pub mod probe;
pub mod snapshot;
pub mod totp;

#[cfg(test)]
mod testing;

pub use constants::*;
pub use credentials::{
    ChainResolver, CredentialSource, CredentialSpec, DirResolver, EnvResolver, LoginCredentials,
    MfaSource, SecretResolver,
};
pub use error::{Error, Result};
pub use login::{LoginAction, LoginDriver, LoginReport, LoginRules, LoginState, Observation, handle_observation};
pub use probe::{ProbeResult, ProbeTransport, ReqwestTransport, probe};
pub use snapshot::{AuthStrategy, CredentialFingerprint, SessionArtifact, SessionMaterial, SessionSnapshot};
pub use totp::Totp;
