//! Configuration types and loading
//!
//! Config precedence: CLI args > env vars > config file > defaults.
//! Credential values never live in the TOML; the file names labels for the
//! secret resolvers, and `CARTOGRAPHER_USERNAME` / `CARTOGRAPHER_PASSWORD` /
//! `CARTOGRAPHER_TOTP_SECRET` / `CARTOGRAPHER_MFA_CODE` supply explicit values.

use common::Secret;
use serde::Deserialize;
use site_auth::{ChainResolver, CredentialSource, CredentialSpec, DirResolver, EnvResolver};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

/// Root configuration
#[derive(Debug, Deserialize)]
pub struct Config {
    pub target: TargetConfig,
    #[serde(default)]
    pub credentials: CredentialsConfig,
    #[serde(default)]
    pub browser: BrowserConfig,
    #[serde(default)]
    pub login: LoginConfig,
    #[serde(default)]
    pub capture: CaptureConfig,
    #[serde(default)]
    pub crawl: CrawlConfig,
    #[serde(default)]
    pub probe: ProbeConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub lifecycle: LifecycleConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

/// The application being mapped
#[derive(Debug, Deserialize)]
pub struct TargetConfig {
    /// Instance URL; its host is the capture and login target
    pub url: Url,
    /// Where the login flow starts (defaults to `url`)
    #[serde(default)]
    pub login_url: Option<Url>,
}

impl TargetConfig {
    pub fn host(&self) -> &str {
        self.url.host_str().unwrap_or_default()
    }

    pub fn login_url(&self) -> &Url {
        self.login_url.as_ref().unwrap_or(&self.url)
    }
}

/// Labels and resolver settings for login credentials
#[derive(Debug, Deserialize)]
pub struct CredentialsConfig {
    #[serde(default)]
    pub username_label: Option<String>,
    #[serde(default)]
    pub password_label: Option<String>,
    #[serde(default)]
    pub totp_label: Option<String>,
    /// Prefix for the environment resolver (`<prefix><LABEL>`)
    #[serde(default = "default_env_prefix")]
    pub env_prefix: String,
    /// Directory resolver root; `CARTOGRAPHER_SECRETS_DIR` overrides
    #[serde(default)]
    pub secrets_dir: Option<PathBuf>,
    #[serde(skip)]
    pub username: Option<Secret<String>>,
    #[serde(skip)]
    pub password: Option<Secret<String>>,
    #[serde(skip)]
    pub totp_secret: Option<Secret<String>>,
    #[serde(skip)]
    pub mfa_code: Option<Secret<String>>,
}

impl Default for CredentialsConfig {
    fn default() -> Self {
        Self {
            username_label: None,
            password_label: None,
            totp_label: None,
            env_prefix: default_env_prefix(),
            secrets_dir: None,
            username: None,
            password: None,
            totp_secret: None,
            mfa_code: None,
        }
    }
}

impl CredentialsConfig {
    /// Sources for each credential: explicit value first, label second.
    pub fn spec(&self) -> CredentialSpec {
        let source = |value: &Option<Secret<String>>, label: &Option<String>| CredentialSource {
            value: value.clone(),
            label: label.clone(),
        };
        CredentialSpec {
            username: source(&self.username, &self.username_label),
            password: source(&self.password, &self.password_label),
            totp_secret: source(&self.totp_secret, &self.totp_label),
            mfa_code: self.mfa_code.clone(),
        }
    }

    /// Environment lookup, then the secrets directory when one is set.
    pub fn resolver(&self) -> ChainResolver {
        let chain = ChainResolver::new().with(EnvResolver::new(self.env_prefix.clone()));
        match &self.secrets_dir {
            Some(dir) => chain.with(DirResolver::new(dir.clone())),
            None => chain,
        }
    }
}

/// Chrome launch settings
#[derive(Debug, Deserialize)]
pub struct BrowserConfig {
    #[serde(default = "default_true")]
    pub headless: bool,
    /// Chrome/Chromium binary; auto-detected when unset
    #[serde(default)]
    pub executable: Option<PathBuf>,
    #[serde(default = "default_navigation_timeout")]
    pub navigation_timeout_secs: u64,
    #[serde(default = "default_viewport_width")]
    pub viewport_width: u32,
    #[serde(default = "default_viewport_height")]
    pub viewport_height: u32,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            headless: true,
            executable: None,
            navigation_timeout_secs: default_navigation_timeout(),
            viewport_width: default_viewport_width(),
            viewport_height: default_viewport_height(),
        }
    }
}

impl BrowserConfig {
    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_secs(self.navigation_timeout_secs)
    }
}

/// Login loop budget
#[derive(Debug, Deserialize)]
pub struct LoginConfig {
    #[serde(default = "default_max_steps")]
    pub max_steps: u32,
    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,
}

impl Default for LoginConfig {
    fn default() -> Self {
        Self {
            max_steps: default_max_steps(),
            settle_ms: default_settle_ms(),
        }
    }
}

impl LoginConfig {
    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }
}

/// Extra capture exclusions
#[derive(Debug, Default, Deserialize)]
pub struct CaptureConfig {
    /// Regexes matched against request paths, on top of the built-in
    /// telemetry and static-asset rules
    #[serde(default)]
    pub exclude_patterns: Vec<String>,
}

/// Pages visited after login to trigger more API traffic
#[derive(Debug, Deserialize)]
pub struct CrawlConfig {
    #[serde(default)]
    pub paths: Vec<String>,
    #[serde(default = "default_crawl_settle_ms")]
    pub settle_ms: u64,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            paths: Vec::new(),
            settle_ms: default_crawl_settle_ms(),
        }
    }
}

impl CrawlConfig {
    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }
}

/// Auth strategy probing
#[derive(Debug, Deserialize)]
pub struct ProbeConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_probe_timeout")]
    pub timeout_secs: u64,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            timeout_secs: default_probe_timeout(),
        }
    }
}

/// Artifact locations
#[derive(Debug, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_output_dir")]
    pub dir: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: default_output_dir(),
        }
    }
}

impl OutputConfig {
    pub fn catalog_path(&self) -> PathBuf {
        self.dir.join(catalog::CATALOG_ARTIFACT)
    }

    pub fn session_path(&self) -> PathBuf {
        self.dir.join(site_auth::SESSION_ARTIFACT)
    }

    pub fn failure_screenshot_path(&self) -> PathBuf {
        self.dir.join(site_auth::FAILURE_SCREENSHOT)
    }
}

/// Refresh policy
#[derive(Debug, Deserialize)]
pub struct LifecycleConfig {
    #[serde(default = "default_cooldown")]
    pub cooldown_secs: u64,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            cooldown_secs: default_cooldown(),
        }
    }
}

impl LifecycleConfig {
    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }
}

/// Lifecycle service listener
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_env_prefix() -> String {
    "CARTOGRAPHER_SECRET_".into()
}

fn default_navigation_timeout() -> u64 {
    30
}

fn default_viewport_width() -> u32 {
    1280
}

fn default_viewport_height() -> u32 {
    800
}

fn default_max_steps() -> u32 {
    site_auth::MAX_LOGIN_STEPS
}

fn default_settle_ms() -> u64 {
    site_auth::DEFAULT_SETTLE.as_millis() as u64
}

fn default_crawl_settle_ms() -> u64 {
    2000
}

fn default_probe_timeout() -> u64 {
    10
}

fn default_output_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_cooldown() -> u64 {
    60
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8790))
}

fn check_web_url(name: &str, url: &Url) -> common::Result<()> {
    if !matches!(url.scheme(), "http" | "https") {
        return Err(common::Error::Config(format!(
            "{name} must start with http:// or https://, got: {url}"
        )));
    }
    if url.host_str().is_none() {
        return Err(common::Error::Config(format!("{name} has no host: {url}")));
    }
    Ok(())
}

fn env_secret(key: &str) -> Option<Secret<String>> {
    std::env::var(key)
        .ok()
        .map(Secret::new)
        .filter(|s| !s.is_blank())
}

impl Config {
    /// Load configuration from a TOML file, validate it, then overlay
    /// environment variables.
    pub fn load(path: &Path) -> common::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&contents)?;
        config.validate()?;

        let creds = &mut config.credentials;
        creds.username = env_secret("CARTOGRAPHER_USERNAME");
        creds.password = env_secret("CARTOGRAPHER_PASSWORD");
        creds.totp_secret = env_secret("CARTOGRAPHER_TOTP_SECRET");
        creds.mfa_code = env_secret("CARTOGRAPHER_MFA_CODE");
        if let Ok(dir) = std::env::var("CARTOGRAPHER_SECRETS_DIR") {
            if !dir.trim().is_empty() {
                creds.secrets_dir = Some(PathBuf::from(dir));
            }
        }

        Ok(config)
    }

    fn validate(&self) -> common::Result<()> {
        check_web_url("target.url", &self.target.url)?;
        if let Some(login_url) = &self.target.login_url {
            check_web_url("target.login_url", login_url)?;
        }

        if self.browser.navigation_timeout_secs == 0 {
            return Err(common::Error::Config(
                "browser.navigation_timeout_secs must be greater than 0".into(),
            ));
        }
        if self.login.max_steps == 0 {
            return Err(common::Error::Config(
                "login.max_steps must be greater than 0".into(),
            ));
        }
        if self.probe.timeout_secs == 0 {
            return Err(common::Error::Config(
                "probe.timeout_secs must be greater than 0".into(),
            ));
        }
        if self.lifecycle.cooldown_secs == 0 {
            return Err(common::Error::Config(
                "lifecycle.cooldown_secs must be greater than 0".into(),
            ));
        }

        if let Some(path) = self.crawl.paths.iter().find(|p| !p.starts_with('/')) {
            return Err(common::Error::Config(format!(
                "crawl.paths entries must start with '/', got: {path}"
            )));
        }

        capture::CaptureFilter::new(self.target.host())
            .with_extra_patterns(&self.capture.exclude_patterns)
            .map_err(|e| common::Error::Config(format!("capture.exclude_patterns: {e}")))?;

        Ok(())
    }

    /// Resolve config file path from CLI arg or CONFIG_PATH env var.
    pub fn resolve_path(cli_path: Option<&str>) -> PathBuf {
        if let Some(p) = cli_path {
            return PathBuf::from(p);
        }
        if let Ok(p) = std::env::var("CONFIG_PATH") {
            return PathBuf::from(p);
        }
        PathBuf::from("cartographer.toml")
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Serializes tests that touch the process environment.
    pub(crate) static ENV_MUTEX: Mutex<()> = Mutex::new(());

    const OVERLAY_VARS: [&str; 5] = [
        "CARTOGRAPHER_USERNAME",
        "CARTOGRAPHER_PASSWORD",
        "CARTOGRAPHER_TOTP_SECRET",
        "CARTOGRAPHER_MFA_CODE",
        "CARTOGRAPHER_SECRETS_DIR",
    ];

    /// SAFETY: Callers must hold ENV_MUTEX to prevent concurrent env mutation.
    unsafe fn set_env(key: &str, val: &str) {
        unsafe { std::env::set_var(key, val) };
    }

    unsafe fn remove_env(key: &str) {
        unsafe { std::env::remove_var(key) };
    }

    pub(crate) unsafe fn clear_overlays() {
        for key in OVERLAY_VARS {
            unsafe { remove_env(key) };
        }
    }

    fn minimal_toml() -> &'static str {
        r#"
[target]
url = "https://app.example.com"
"#
    }

    fn write_config(dir: &tempfile::TempDir, contents: &str) -> PathBuf {
        let path = dir.path().join("cartographer.toml");
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn minimal_config_gets_defaults() {
        let _lock = ENV_MUTEX.lock().unwrap();
        unsafe { clear_overlays() };
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(&write_config(&dir, minimal_toml())).unwrap();

        assert_eq!(config.target.host(), "app.example.com");
        assert_eq!(config.target.login_url().as_str(), "https://app.example.com/");
        assert!(config.browser.headless);
        assert_eq!(config.browser.navigation_timeout(), Duration::from_secs(30));
        assert_eq!(config.login.max_steps, 25);
        assert_eq!(config.login.settle(), Duration::from_millis(1500));
        assert!(config.probe.enabled);
        assert_eq!(config.lifecycle.cooldown(), Duration::from_secs(60));
        assert_eq!(config.server.listen_addr.port(), 8790);
        assert_eq!(config.credentials.env_prefix, "CARTOGRAPHER_SECRET_");
        assert!(config.credentials.username.is_none());
        assert_eq!(config.output.session_path(), PathBuf::from("./session.json"));
        assert_eq!(config.output.catalog_path(), PathBuf::from("./catalog.json"));
    }

    #[test]
    fn full_config_parses_every_section() {
        let _lock = ENV_MUTEX.lock().unwrap();
        unsafe { clear_overlays() };
        let dir = tempfile::tempdir().unwrap();
        let toml = r#"
[target]
url = "https://app.example.com"
login_url = "https://sso.example.com/login"

[credentials]
username_label = "app/username"
password_label = "app/password"
totp_label = "app/totp"
secrets_dir = "/run/secrets"

[browser]
headless = false
executable = "/usr/bin/chromium"
viewport_width = 1920

[login]
max_steps = 40
settle_ms = 500

[capture]
exclude_patterns = ["^/api/heartbeat"]

[crawl]
paths = ["/dashboard", "/settings"]
settle_ms = 250

[probe]
enabled = false

[output]
dir = "/var/lib/cartographer"

[lifecycle]
cooldown_secs = 120

[server]
listen_addr = "0.0.0.0:9000"
"#;
        let config = Config::load(&write_config(&dir, toml)).unwrap();

        assert_eq!(config.target.login_url().host_str(), Some("sso.example.com"));
        assert_eq!(config.target.host(), "app.example.com");
        assert!(!config.browser.headless);
        assert_eq!(config.browser.viewport_width, 1920);
        assert_eq!(config.browser.viewport_height, 800);
        assert_eq!(config.login.max_steps, 40);
        assert_eq!(config.crawl.paths, vec!["/dashboard", "/settings"]);
        assert!(!config.probe.enabled);
        assert_eq!(
            config.output.failure_screenshot_path(),
            PathBuf::from("/var/lib/cartographer/login-failure.png")
        );
        assert_eq!(config.lifecycle.cooldown_secs, 120);
        assert_eq!(config.server.listen_addr.port(), 9000);

        let spec = config.credentials.spec();
        assert_eq!(spec.username.label.as_deref(), Some("app/username"));
        assert_eq!(spec.totp_secret.label.as_deref(), Some("app/totp"));
        assert!(spec.username.value.is_none());
        assert_eq!(config.credentials.resolver().len(), 2);
    }

    #[test]
    fn env_overlays_supply_explicit_values() {
        let _lock = ENV_MUTEX.lock().unwrap();
        unsafe { clear_overlays() };
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(&dir, minimal_toml());

        unsafe {
            set_env("CARTOGRAPHER_USERNAME", "ada@example.com");
            set_env("CARTOGRAPHER_PASSWORD", "hunter2");
            set_env("CARTOGRAPHER_TOTP_SECRET", "   ");
            set_env("CARTOGRAPHER_SECRETS_DIR", "/env/secrets");
        }
        let config = Config::load(&path).unwrap();
        unsafe { clear_overlays() };

        let creds = &config.credentials;
        assert_eq!(creds.username.as_ref().unwrap().expose(), "ada@example.com");
        assert_eq!(creds.password.as_ref().unwrap().expose(), "hunter2");
        assert!(creds.totp_secret.is_none(), "blank overlay must be ignored");
        assert_eq!(creds.secrets_dir, Some(PathBuf::from("/env/secrets")));
        assert_eq!(creds.resolver().len(), 2);

        let spec = creds.spec();
        assert!(spec.username.is_configured());
        assert!(!spec.totp_secret.is_configured());
    }

    #[test]
    fn without_secrets_dir_only_env_resolver_is_chained() {
        let config = CredentialsConfig::default();
        assert_eq!(config.resolver().len(), 1);
    }

    #[test]
    fn load_missing_file() {
        let result = Config::load(Path::new("/nonexistent/path/cartographer.toml"));
        assert!(matches!(result, Err(common::Error::Io(_))));
    }

    #[test]
    fn load_invalid_toml() {
        let dir = tempfile::tempdir().unwrap();
        let result = Config::load(&write_config(&dir, "not valid {{{{ toml"));
        assert!(matches!(result, Err(common::Error::Toml(_))));
    }

    #[test]
    fn missing_target_section_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let result = Config::load(&write_config(&dir, "[login]\nmax_steps = 3\n"));
        assert!(result.is_err());
    }

    fn assert_config_error(toml: &str, expected: &str) {
        let _lock = ENV_MUTEX.lock().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let err = Config::load(&write_config(&dir, toml)).unwrap_err();
        assert!(
            matches!(err, common::Error::Config(_)),
            "expected a config error, got: {err:?}"
        );
        assert!(
            err.to_string().contains(expected),
            "error should mention {expected:?}, got: {err}"
        );
    }

    #[test]
    fn non_web_target_url_rejected() {
        assert_config_error(
            "[target]\nurl = \"ftp://files.example.com\"\n",
            "target.url must start with http",
        );
    }

    #[test]
    fn non_web_login_url_rejected() {
        assert_config_error(
            "[target]\nurl = \"https://app.example.com\"\nlogin_url = \"file:///tmp/login.html\"\n",
            "target.login_url",
        );
    }

    #[test]
    fn zero_budgets_rejected() {
        let base = "[target]\nurl = \"https://app.example.com\"\n";
        assert_config_error(
            &format!("{base}[login]\nmax_steps = 0\n"),
            "login.max_steps",
        );
        assert_config_error(
            &format!("{base}[browser]\nnavigation_timeout_secs = 0\n"),
            "navigation_timeout_secs",
        );
        assert_config_error(
            &format!("{base}[probe]\ntimeout_secs = 0\n"),
            "probe.timeout_secs",
        );
        assert_config_error(
            &format!("{base}[lifecycle]\ncooldown_secs = 0\n"),
            "cooldown_secs",
        );
    }

    #[test]
    fn relative_crawl_path_rejected() {
        assert_config_error(
            "[target]\nurl = \"https://app.example.com\"\n[crawl]\npaths = [\"dashboard\"]\n",
            "crawl.paths",
        );
    }

    #[test]
    fn uncompilable_exclude_pattern_rejected() {
        assert_config_error(
            "[target]\nurl = \"https://app.example.com\"\n[capture]\nexclude_patterns = [\"(unclosed\"]\n",
            "capture.exclude_patterns",
        );
    }

    #[test]
    fn resolve_path_cli_arg() {
        let path = Config::resolve_path(Some("/custom/path.toml"));
        assert_eq!(path, PathBuf::from("/custom/path.toml"));
    }

    #[test]
    fn resolve_path_env_var() {
        let _lock = ENV_MUTEX.lock().unwrap();
        unsafe { set_env("CONFIG_PATH", "/env/path.toml") };
        let path = Config::resolve_path(None);
        assert_eq!(path, PathBuf::from("/env/path.toml"));
        unsafe { remove_env("CONFIG_PATH") };
    }

    #[test]
    fn resolve_path_default() {
        let _lock = ENV_MUTEX.lock().unwrap();
        unsafe { remove_env("CONFIG_PATH") };
        let path = Config::resolve_path(None);
        assert_eq!(path, PathBuf::from("cartographer.toml"));
    }

    #[test]
    fn resolve_path_cli_overrides_env() {
        let _lock = ENV_MUTEX.lock().unwrap();
        unsafe { set_env("CONFIG_PATH", "/env/should-lose.toml") };
        let path = Config::resolve_path(Some("/cli/wins.toml"));
        assert_eq!(
            path,
            PathBuf::from("/cli/wins.toml"),
            "CLI arg must take precedence over CONFIG_PATH env var"
        );
        unsafe { remove_env("CONFIG_PATH") };
    }
}
