//! Scripted in-memory browser session for tests

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use browser::{BoxFuture, BrowserCookie, BrowserSession, FieldState, NetworkEvents, Result};

use crate::constants::{EMAIL_SELECTORS, MFA_SELECTORS, PASSWORD_SELECTORS};

/// One page of a scripted login flow.
#[derive(Debug, Clone)]
pub struct Stage {
    url: String,
    email: FieldState,
    password: FieldState,
    mfa: FieldState,
    consent: bool,
}

impl Stage {
    pub fn at(url: &str) -> Self {
        Self {
            url: url.into(),
            email: FieldState::Absent,
            password: FieldState::Absent,
            mfa: FieldState::Absent,
            consent: false,
        }
    }

    pub fn email(mut self, state: FieldState) -> Self {
        self.email = state;
        self
    }

    pub fn password(mut self, state: FieldState) -> Self {
        self.password = state;
        self
    }

    pub fn mfa(mut self, state: FieldState) -> Self {
        self.mfa = state;
        self
    }

    pub fn consent(mut self) -> Self {
        self.consent = true;
        self
    }
}

#[derive(Default)]
struct Log {
    stage: usize,
    typed: Vec<(String, String)>,
    clicks: usize,
    navigations: Vec<String>,
    screenshots: Vec<PathBuf>,
}

/// Walks through its stages: every successful fill or click advances one
/// stage, the last stage repeats forever.
pub struct ScriptedPage {
    stages: Vec<Stage>,
    cookies: Vec<BrowserCookie>,
    log: Mutex<Log>,
}

impl ScriptedPage {
    pub fn new(stages: Vec<Stage>) -> Self {
        Self {
            stages,
            cookies: Vec::new(),
            log: Mutex::new(Log::default()),
        }
    }

    pub fn with_cookies(mut self, cookies: Vec<BrowserCookie>) -> Self {
        self.cookies = cookies;
        self
    }

    fn current(&self) -> Stage {
        let log = self.log.lock().unwrap();
        self.stages[log.stage.min(self.stages.len() - 1)].clone()
    }

    fn advance(&self) {
        self.log.lock().unwrap().stage += 1;
    }

    pub fn typed(&self) -> Vec<(String, String)> {
        self.log.lock().unwrap().typed.clone()
    }

    pub fn clicks(&self) -> usize {
        self.log.lock().unwrap().clicks
    }

    pub fn navigations(&self) -> Vec<String> {
        self.log.lock().unwrap().navigations.clone()
    }

    pub fn screenshots(&self) -> Vec<PathBuf> {
        self.log.lock().unwrap().screenshots.clone()
    }

    fn field(&self, selectors: &[&str]) -> (&'static str, FieldState) {
        let stage = self.current();
        if selectors == EMAIL_SELECTORS {
            ("email", stage.email)
        } else if selectors == PASSWORD_SELECTORS {
            ("password", stage.password)
        } else if selectors == MFA_SELECTORS {
            ("mfa", stage.mfa)
        } else {
            ("unknown", FieldState::Absent)
        }
    }
}

impl BrowserSession for ScriptedPage {
    fn id(&self) -> &str {
        "scripted"
    }

    fn navigate<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            self.log.lock().unwrap().navigations.push(url.to_string());
            Ok(())
        })
    }

    fn current_url(&self) -> BoxFuture<'_, Result<String>> {
        Box::pin(async move { Ok(self.current().url) })
    }

    fn field_state<'a>(&'a self, selectors: &'a [&'a str]) -> BoxFuture<'a, Result<FieldState>> {
        Box::pin(async move { Ok(self.field(selectors).1) })
    }

    fn fill_and_submit<'a>(
        &'a self,
        selectors: &'a [&'a str],
        value: &'a str,
    ) -> BoxFuture<'a, Result<bool>> {
        Box::pin(async move {
            let (name, state) = self.field(selectors);
            if !state.is_empty_and_visible() {
                return Ok(false);
            }
            self.log
                .lock()
                .unwrap()
                .typed
                .push((name.to_string(), value.to_string()));
            self.advance();
            Ok(true)
        })
    }

    fn control_visible<'a>(&'a self, _labels: &'a [&'a str]) -> BoxFuture<'a, Result<bool>> {
        Box::pin(async move { Ok(self.current().consent) })
    }

    fn click_control<'a>(&'a self, _labels: &'a [&'a str]) -> BoxFuture<'a, Result<bool>> {
        Box::pin(async move {
            if !self.current().consent {
                return Ok(false);
            }
            self.log.lock().unwrap().clicks += 1;
            self.advance();
            Ok(true)
        })
    }

    fn cookies(&self) -> BoxFuture<'_, Result<Vec<BrowserCookie>>> {
        Box::pin(async move { Ok(self.cookies.clone()) })
    }

    fn screenshot<'a>(&'a self, path: &'a Path) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            self.log.lock().unwrap().screenshots.push(path.to_path_buf());
            Ok(())
        })
    }

    fn network_events(&self) -> BoxFuture<'_, Result<NetworkEvents>> {
        Box::pin(async move {
            let (_tx, rx) = tokio::sync::mpsc::unbounded_channel();
            Ok(rx)
        })
    }
}
