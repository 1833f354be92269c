//! Login credential resolution
//!
//! Each credential is either given explicitly (config file or environment
//! overlay) or named by a label that a `SecretResolver` looks up. Explicit
//! values always win. Resolution happens once, before the browser navigates
//! anywhere, so a missing secret never leaves a half-driven login behind.

use std::path::{Component, Path, PathBuf};

use common::Secret;
use tracing::debug;

use crate::error::{Error, Result};
use crate::totp::Totp;

/// Looks up a secret by label.
///
/// Implementations return `None` for "not here" and never log the value.
pub trait SecretResolver: Send + Sync {
    /// Resolver name for logging (e.g. "env", "dir")
    fn name(&self) -> &str;

    fn resolve(&self, label: &str) -> Option<Secret<String>>;
}

/// Resolves `label` from the environment variable `PREFIX` + `LABEL`, with
/// every non-alphanumeric character mapped to `_`.
///
/// `EnvResolver::new("CARTOGRAPHER_SECRET_")` resolves `okta/password` from
/// `CARTOGRAPHER_SECRET_OKTA_PASSWORD`.
#[derive(Debug, Clone)]
pub struct EnvResolver {
    prefix: String,
}

impl EnvResolver {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn var_name(&self, label: &str) -> String {
        let suffix: String = label
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() {
                    c.to_ascii_uppercase()
                } else {
                    '_'
                }
            })
            .collect();
        format!("{}{suffix}", self.prefix)
    }
}

impl SecretResolver for EnvResolver {
    fn name(&self) -> &str {
        "env"
    }

    fn resolve(&self, label: &str) -> Option<Secret<String>> {
        let value = std::env::var(self.var_name(label)).ok()?;
        let secret = Secret::new(value);
        (!secret.is_blank()).then_some(secret)
    }
}

/// Resolves `label` from the file `<dir>/<label>`, trimmed. Labels may
/// contain `/` to address subdirectories but never escape `dir`.
#[derive(Debug, Clone)]
pub struct DirResolver {
    dir: PathBuf,
}

impl DirResolver {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, label: &str) -> Option<PathBuf> {
        let relative = Path::new(label);
        let safe = relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
        safe.then(|| self.dir.join(relative))
    }
}

impl SecretResolver for DirResolver {
    fn name(&self) -> &str {
        "dir"
    }

    fn resolve(&self, label: &str) -> Option<Secret<String>> {
        let path = self.path_for(label)?;
        let mut raw = std::fs::read_to_string(path).ok()?;
        let value = raw.trim().to_string();
        zeroize_string(&mut raw);
        let secret = Secret::new(value);
        (!secret.is_blank()).then_some(secret)
    }
}

fn zeroize_string(s: &mut String) {
    drop(Secret::new(std::mem::take(s)));
}

/// Tries each resolver in order; first hit wins.
#[derive(Default)]
pub struct ChainResolver {
    resolvers: Vec<Box<dyn SecretResolver>>,
}

impl ChainResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, resolver: impl SecretResolver + 'static) -> Self {
        self.resolvers.push(Box::new(resolver));
        self
    }

    pub fn len(&self) -> usize {
        self.resolvers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resolvers.is_empty()
    }
}

impl SecretResolver for ChainResolver {
    fn name(&self) -> &str {
        "chain"
    }

    fn resolve(&self, label: &str) -> Option<Secret<String>> {
        self.resolvers.iter().find_map(|r| {
            let found = r.resolve(label);
            if found.is_some() {
                debug!(label, resolver = r.name(), "secret resolved");
            }
            found
        })
    }
}

/// Where one credential comes from.
#[derive(Debug, Clone, Default)]
pub struct CredentialSource {
    /// Explicit value; wins over the label when non-blank
    pub value: Option<Secret<String>>,
    /// Label passed to the secret resolver
    pub label: Option<String>,
}

impl CredentialSource {
    pub fn literal(value: impl Into<String>) -> Self {
        Self {
            value: Some(Secret::new(value.into())),
            label: None,
        }
    }

    pub fn label(label: impl Into<String>) -> Self {
        Self {
            value: None,
            label: Some(label.into()),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.value.as_ref().is_some_and(|v| !v.is_blank()) || self.label.is_some()
    }

    /// Explicit value, else resolver lookup. `Ok(None)` only when nothing is
    /// configured at all.
    fn resolve(&self, field: &str, resolver: &dyn SecretResolver) -> Result<Option<Secret<String>>> {
        if let Some(value) = self.value.as_ref().filter(|v| !v.is_blank()) {
            debug!(field, source = "explicit", "credential resolved");
            return Ok(Some(value.clone()));
        }
        let Some(label) = &self.label else {
            return Ok(None);
        };
        match resolver.resolve(label) {
            Some(secret) => {
                debug!(field, label = %label, source = resolver.name(), "credential resolved");
                Ok(Some(secret))
            }
            None => Err(Error::CredentialMissing(label.clone())),
        }
    }
}

/// Configured sources for every login credential.
#[derive(Debug, Clone, Default)]
pub struct CredentialSpec {
    pub username: CredentialSource,
    pub password: CredentialSource,
    /// Base32 TOTP shared secret
    pub totp_secret: CredentialSource,
    /// Fixed one-time code, used when no TOTP secret is configured
    pub mfa_code: Option<Secret<String>>,
}

/// How the MFA step gets its code.
#[derive(Debug, Clone)]
pub enum MfaSource {
    Totp(Totp),
    Code(Secret<String>),
}

/// Resolved credentials for one login.
#[derive(Debug, Clone)]
pub struct LoginCredentials {
    pub username: Secret<String>,
    pub password: Secret<String>,
    pub mfa: Option<MfaSource>,
}

impl LoginCredentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: Secret::new(username.into()),
            password: Secret::new(password.into()),
            mfa: None,
        }
    }

    pub fn with_mfa(mut self, mfa: MfaSource) -> Self {
        self.mfa = Some(mfa);
        self
    }

    /// Whether the login machine may fill MFA fields.
    pub fn mfa_available(&self) -> bool {
        self.mfa.is_some()
    }

    /// Current one-time code, if any MFA source is configured.
    pub fn mfa_code(&self) -> Result<Option<Secret<String>>> {
        match &self.mfa {
            Some(MfaSource::Totp(totp)) => Ok(Some(Secret::new(totp.now()?))),
            Some(MfaSource::Code(code)) => Ok(Some(code.clone())),
            None => Ok(None),
        }
    }
}

/// Resolve every credential in `spec`.
///
/// Username and password are required; a missing one fails with
/// `CredentialMissing` naming its label (or the field when no label is
/// configured). A configured TOTP secret must resolve and decode.
pub fn resolve(spec: &CredentialSpec, resolver: &dyn SecretResolver) -> Result<LoginCredentials> {
    let required = |field: &str, source: &CredentialSource| -> Result<Secret<String>> {
        source
            .resolve(field, resolver)?
            .ok_or_else(|| Error::CredentialMissing(field.to_string()))
    };

    let username = required("username", &spec.username)?;
    let password = required("password", &spec.password)?;

    let mfa = match spec.totp_secret.resolve("totp_secret", resolver)? {
        Some(secret) => Some(MfaSource::Totp(Totp::from_base32(secret.expose())?)),
        None => spec
            .mfa_code
            .as_ref()
            .filter(|c| !c.is_blank())
            .cloned()
            .map(MfaSource::Code),
    };

    Ok(LoginCredentials {
        username,
        password,
        mfa,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    struct MapResolver(HashMap<&'static str, &'static str>);

    impl SecretResolver for MapResolver {
        fn name(&self) -> &str {
            "map"
        }

        fn resolve(&self, label: &str) -> Option<Secret<String>> {
            self.0.get(label).map(|v| Secret::new(v.to_string()))
        }
    }

    fn resolver(entries: &[(&'static str, &'static str)]) -> MapResolver {
        MapResolver(entries.iter().copied().collect())
    }

    #[test]
    fn explicit_values_win_over_labels() {
        let spec = CredentialSpec {
            username: CredentialSource {
                value: Some(Secret::new("explicit@example.com".into())),
                label: Some("user".into()),
            },
            password: CredentialSource::label("pass"),
            ..Default::default()
        };
        let creds = resolve(&spec, &resolver(&[("user", "labelled"), ("pass", "pw")])).unwrap();
        assert_eq!(creds.username.expose(), "explicit@example.com");
        assert_eq!(creds.password.expose(), "pw");
        assert!(!creds.mfa_available());
    }

    #[test]
    fn blank_explicit_value_falls_back_to_label() {
        let spec = CredentialSpec {
            username: CredentialSource {
                value: Some(Secret::new("  ".into())),
                label: Some("user".into()),
            },
            password: CredentialSource::literal("pw"),
            ..Default::default()
        };
        let creds = resolve(&spec, &resolver(&[("user", "from-label")])).unwrap();
        assert_eq!(creds.username.expose(), "from-label");
    }

    #[test]
    fn unresolvable_label_is_credential_missing() {
        let spec = CredentialSpec {
            username: CredentialSource::literal("u"),
            password: CredentialSource::label("okta/password"),
            ..Default::default()
        };
        let err = resolve(&spec, &resolver(&[])).unwrap_err();
        assert!(matches!(err, Error::CredentialMissing(ref l) if l == "okta/password"));
    }

    #[test]
    fn unconfigured_required_field_names_the_field() {
        let spec = CredentialSpec {
            password: CredentialSource::literal("pw"),
            ..Default::default()
        };
        let err = resolve(&spec, &resolver(&[])).unwrap_err();
        assert!(matches!(err, Error::CredentialMissing(ref l) if l == "username"));
    }

    #[test]
    fn totp_secret_resolves_to_generator() {
        let spec = CredentialSpec {
            username: CredentialSource::literal("u"),
            password: CredentialSource::literal("p"),
            totp_secret: CredentialSource::label("totp"),
            mfa_code: Some(Secret::new("000000".into())),
        };
        let creds =
            resolve(&spec, &resolver(&[("totp", "GEZDGNBVGY3TQOJQGEZDGNBVGY3TQOJQ")])).unwrap();
        assert!(matches!(creds.mfa, Some(MfaSource::Totp(_))));
        let code = creds.mfa_code().unwrap().unwrap();
        assert_eq!(code.expose().len(), 6);
    }

    #[test]
    fn invalid_totp_secret_fails_at_resolution() {
        let spec = CredentialSpec {
            username: CredentialSource::literal("u"),
            password: CredentialSource::literal("p"),
            totp_secret: CredentialSource::literal("!!!"),
            mfa_code: None,
        };
        let err = resolve(&spec, &resolver(&[])).unwrap_err();
        assert!(matches!(err, Error::InvalidTotpSecret(_)));
    }

    #[test]
    fn fixed_code_used_without_totp() {
        let spec = CredentialSpec {
            username: CredentialSource::literal("u"),
            password: CredentialSource::literal("p"),
            totp_secret: CredentialSource::default(),
            mfa_code: Some(Secret::new("123456".into())),
        };
        let creds = resolve(&spec, &resolver(&[])).unwrap();
        assert_eq!(creds.mfa_code().unwrap().unwrap().expose(), "123456");
    }

    #[test]
    fn env_resolver_maps_label_to_variable() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let env = EnvResolver::new("SITE_AUTH_TEST_");
        assert_eq!(env.var_name("okta/pass-word"), "SITE_AUTH_TEST_OKTA_PASS_WORD");

        // SAFETY: serialized by ENV_MUTEX; the variable is unique to this test.
        unsafe { std::env::set_var("SITE_AUTH_TEST_OKTA_PASS_WORD", "s3cret") };
        assert_eq!(env.resolve("okta/pass-word").unwrap().expose(), "s3cret");
        unsafe { std::env::remove_var("SITE_AUTH_TEST_OKTA_PASS_WORD") };
        assert!(env.resolve("okta/pass-word").is_none());
    }

    #[test]
    fn dir_resolver_reads_trimmed_files_and_refuses_escapes() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("okta")).unwrap();
        std::fs::write(dir.path().join("okta/password"), "hunter2\n").unwrap();

        let resolver = DirResolver::new(dir.path());
        assert_eq!(resolver.resolve("okta/password").unwrap().expose(), "hunter2");
        assert!(resolver.resolve("okta/missing").is_none());
        assert!(resolver.resolve("../etc/passwd").is_none());
        assert!(resolver.resolve("/etc/passwd").is_none());
    }

    #[test]
    fn chain_returns_first_hit() {
        let chain = ChainResolver::new()
            .with(resolver(&[("a", "first")]))
            .with(resolver(&[("a", "second"), ("b", "only-second")]));
        assert_eq!(chain.len(), 2);
        assert_eq!(chain.resolve("a").unwrap().expose(), "first");
        assert_eq!(chain.resolve("b").unwrap().expose(), "only-second");
        assert!(chain.resolve("c").is_none());
    }
}
