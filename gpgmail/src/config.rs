//! The JSON configuration file.
//!
//! Every field is optional.  Values given on the command line take
//! precedence over the ones found here.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use serde::Deserialize;

use crate::errors::Error;

/// Key store used if neither `--env` nor `gpg_home` are given.
pub const DEFAULT_GPG_HOME: &str = "./gpgenv";

/// Subject used if neither `--subject` nor `subject` are given.
pub const DEFAULT_SUBJECT: &str = "No subject";

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub gpg_home: Option<PathBuf>,
    pub from: Option<String>,
    pub signer: Option<String>,
    pub subject: Option<String>,
    pub smtp: Option<SmtpConfig>,
}

impl FileConfig {
    /// Loads the configuration from `path`.
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let data = fs::read_to_string(path)
            .map_err(|e| anyhow::Error::from(Error::BadConfig).context(e))
            .with_context(|| format!("Failed to read config file {:?}", path))?;
        Self::from_json(&data)
            .with_context(|| format!("Failed to parse config file {:?}", path))
    }

    pub fn from_json(data: &str) -> anyhow::Result<Self> {
        let config: FileConfig = serde_json::from_str(data)
            .map_err(|e| anyhow::Error::from(Error::BadConfig).context(e))?;
        if let Some(smtp) = config.smtp.as_ref() {
            smtp.check()?;
        }
        Ok(config)
    }
}

/// How the connection to the SMTP server is secured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Security {
    /// Plain connection upgraded with STARTTLS.
    Starttls,
    /// TLS from the first byte.
    Tls,
    /// No encryption at all.
    None,
}

impl Default for Security {
    fn default() -> Self {
        Security::Starttls
    }
}

impl Security {
    pub fn default_port(&self) -> u16 {
        match self {
            Security::Starttls => 587,
            Security::Tls => 465,
            Security::None => 25,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SmtpConfig {
    pub host: String,
    pub port: Option<u16>,
    #[serde(default)]
    pub security: Security,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Connection timeout in seconds.
    pub timeout: Option<u64>,
}

impl SmtpConfig {
    pub fn port(&self) -> u16 {
        self.port.unwrap_or_else(|| self.security.default_port())
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout.map(Duration::from_secs)
    }

    /// Returns the credentials, if any.
    pub fn credentials(&self) -> Option<(&str, &str)> {
        match (&self.username, &self.password) {
            (Some(u), Some(p)) => Some((u, p)),
            _ => None,
        }
    }

    fn check(&self) -> anyhow::Result<()> {
        if self.host.trim().is_empty() {
            return Err(anyhow::Error::from(Error::BadConfig))
                .context("smtp.host must not be empty");
        }
        if self.username.is_some() != self.password.is_some() {
            return Err(anyhow::Error::from(Error::BadConfig))
                .context("smtp.username and smtp.password go together");
        }
        Ok(())
    }
}
