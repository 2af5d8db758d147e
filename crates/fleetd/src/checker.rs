//! Account checker: validates `email:password` lists against the
//! authentication service, one account at a time.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use fleet_core::Credentials;
use fleet_protocol::{AuthError, Authenticator};
use tokio::time::{sleep, timeout};
use tracing::{debug, info};

/// Written by [`CheckReport::write_files`] when non-empty.
pub const VALID_ACCOUNTS_FILE: &str = "valid_accounts.txt";
pub const INVALID_ACCOUNTS_FILE: &str = "invalid_accounts.txt";

/// Pause between two validations.
pub const DEFAULT_CHECK_PAUSE: Duration = Duration::from_secs(1);

/// Longest a single validation may take before it counts as failed.
pub const DEFAULT_CHECK_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CheckReport {
    pub working: Vec<Credentials>,
    pub failed: Vec<Credentials>,
    /// Raw lines that are not `email:password`.
    pub invalid_format: Vec<String>,
}

impl CheckReport {
    pub fn total(&self) -> usize {
        self.working.len() + self.failed.len() + self.invalid_format.len()
    }

    /// Writes working and failed lists as `email:password` lines into `dir`.
    ///
    /// Empty lists produce no file. Returns the paths written.
    pub async fn write_files(&self, dir: &Path) -> std::io::Result<Vec<PathBuf>> {
        let mut written = Vec::new();
        for (name, list) in [
            (VALID_ACCOUNTS_FILE, &self.working),
            (INVALID_ACCOUNTS_FILE, &self.failed),
        ] {
            if list.is_empty() {
                continue;
            }
            let path = dir.join(name);
            let body: Vec<String> = list.iter().map(Credentials::to_line).collect();
            tokio::fs::write(&path, body.join("\n")).await?;
            written.push(path);
        }
        Ok(written)
    }
}

pub struct AccountChecker {
    auth: Arc<dyn Authenticator>,
    pause: Duration,
    timeout: Duration,
}

impl AccountChecker {
    pub fn new(auth: Arc<dyn Authenticator>) -> Self {
        Self {
            auth,
            pause: DEFAULT_CHECK_PAUSE,
            timeout: DEFAULT_CHECK_TIMEOUT,
        }
    }

    pub fn with_pause(mut self, pause: Duration) -> Self {
        self.pause = pause;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Splits a list file into credentials and malformed lines.
    ///
    /// Blank lines and lines starting with `#` are ignored.
    pub fn parse_lines(text: &str) -> (Vec<Credentials>, Vec<String>) {
        let mut valid = Vec::new();
        let mut invalid = Vec::new();

        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            match Credentials::parse_line(line) {
                Ok(creds) => valid.push(creds),
                Err(_) => invalid.push(line.to_string()),
            }
        }
        (valid, invalid)
    }

    /// Parses and checks a whole list file.
    pub async fn check_text(&self, text: &str) -> CheckReport {
        let (accounts, invalid_format) = Self::parse_lines(text);
        let mut report = self.check(accounts).await;
        report.invalid_format = invalid_format;
        report
    }

    /// Validates each account in order, pausing between checks.
    pub async fn check(&self, accounts: Vec<Credentials>) -> CheckReport {
        let mut report = CheckReport::default();
        let total = accounts.len();

        for (i, creds) in accounts.into_iter().enumerate() {
            debug!(account = %creds.id, index = i + 1, total, "Validating account");
            match timeout(self.timeout, self.auth.validate(&creds)).await {
                Ok(Ok(())) => {
                    info!(account = %creds.id, "Account valid");
                    report.working.push(creds);
                }
                Ok(Err(AuthError::InvalidCredentials)) => {
                    info!(account = %creds.id, "Account rejected");
                    report.failed.push(creds);
                }
                Ok(Err(e)) => {
                    info!(account = %creds.id, error = %e, "Account check failed");
                    report.failed.push(creds);
                }
                Err(_) => {
                    info!(
                        account = %creds.id,
                        timeout_secs = self.timeout.as_secs(),
                        "Account check timed out"
                    );
                    report.failed.push(creds);
                }
            }

            if i + 1 < total {
                sleep(self.pause).await;
            }
        }

        info!(
            working = report.working.len(),
            failed = report.failed.len(),
            "Account check finished"
        );
        report
    }
}
