// config.rs - Project layout and `notaria.toml` settings.
//
// `NotariaConfig::for_project()` derives every on-disk location from the
// project root. Settings come from `<root>/.notaria/notaria.toml`; every key
// is optional and falls back to the defaults below.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use nt_feed::{DocumentFeed, HttpFeed, JsonFileFeed};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::notifier::{LogNotifier, Notifier, SmtpNotifier, SmtpOptions, WebhookNotifier};

/// Environment variable overriding `[smtp] username`.
pub const SMTP_USERNAME_ENV: &str = "NOTARIA_SMTP_USERNAME";
/// Environment variable overriding `[smtp] password`.
pub const SMTP_PASSWORD_ENV: &str = "NOTARIA_SMTP_PASSWORD";

/// Resolved locations plus the loaded settings.
#[derive(Debug, Clone)]
pub struct NotariaConfig {
    pub project_root: PathBuf,
    /// `<root>/.notaria`
    pub data_dir: PathBuf,
    /// One JSON file per case.
    pub cases_dir: PathBuf,
    pub protocolists_file: PathBuf,
    /// JSONL log of every broadcast event.
    pub events_log: PathBuf,
    pub config_file: PathBuf,
    /// Feed file used when `[feed] source` is not set.
    pub default_feed_file: PathBuf,
    pub settings: Settings,
}

impl NotariaConfig {
    /// Layout under `<root>/.notaria/` with default settings.
    pub fn for_project(project_root: impl AsRef<Path>) -> Self {
        let root = project_root.as_ref().to_path_buf();
        let data_dir = root.join(".notaria");
        Self {
            cases_dir: data_dir.join("cases"),
            protocolists_file: data_dir.join("protocolists.json"),
            events_log: data_dir.join("events.jsonl"),
            config_file: data_dir.join("notaria.toml"),
            default_feed_file: data_dir.join("feed.json"),
            data_dir,
            project_root: root,
            settings: Settings::default(),
        }
    }

    /// Layout plus settings read from `notaria.toml`, if it exists.
    pub fn load(project_root: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let mut config = Self::for_project(project_root);
        if config.config_file.exists() {
            config.settings = Settings::load(&config.config_file)?;
        }
        Ok(config)
    }

    /// Build the document feed `[feed] source` points at.
    ///
    /// `http://` and `https://` sources are fetched over HTTP. Anything else
    /// is a file path, relative paths resolved against the project root.
    pub fn build_feed(&self) -> Result<Arc<dyn DocumentFeed>, ConfigError> {
        let feed = &self.settings.feed;
        match feed.source.as_deref().map(str::trim) {
            Some(url) if url.starts_with("http://") || url.starts_with("https://") => {
                let http = HttpFeed::new(url, feed.request_timeout())
                    .map_err(|e| invalid("feed", e.to_string()))?;
                Ok(Arc::new(http))
            }
            Some("") | None => Ok(Arc::new(JsonFileFeed::new(&self.default_feed_file))),
            Some(path) => Ok(Arc::new(JsonFileFeed::new(self.project_root.join(path)))),
        }
    }

    /// Build the notification channel `[dispatch] channel` selects.
    pub fn build_notifier(&self) -> Result<Arc<dyn Notifier>, ConfigError> {
        match self.settings.dispatch.channel {
            ChannelKind::Log => Ok(Arc::new(LogNotifier)),
            ChannelKind::Smtp => {
                let smtp = &self.settings.smtp;
                let from = smtp
                    .from
                    .clone()
                    .or_else(|| smtp.username())
                    .ok_or_else(|| invalid("smtp", "no sender: set `from` or a username"))?;
                let notifier = SmtpNotifier::new(SmtpOptions {
                    host: smtp.host.clone(),
                    port: smtp.port,
                    from,
                    subject_prefix: smtp.subject_prefix.clone(),
                    credentials: smtp.credentials(),
                })
                .map_err(|e| invalid("smtp", e.to_string()))?;
                Ok(Arc::new(notifier))
            }
            ChannelKind::Webhook => {
                let url = self
                    .settings
                    .webhook
                    .url
                    .clone()
                    .ok_or_else(|| invalid("webhook", "`url` is required"))?;
                let notifier = WebhookNotifier::new(url, self.settings.dispatch.timeout())
                    .map_err(|e| invalid("webhook", e.to_string()))?;
                Ok(Arc::new(notifier))
            }
        }
    }
}

fn invalid(section: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        section,
        reason: reason.into(),
    }
}

/// Contents of `notaria.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub feed: FeedSettings,
    #[serde(default)]
    pub dispatch: DispatchSettings,
    #[serde(default)]
    pub smtp: SmtpSettings,
    #[serde(default)]
    pub webhook: WebhookSettings,
}

impl Settings {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::IoError {
            path: path.display().to_string(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    /// Settings from `path`, or the defaults if it is missing or unreadable.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(settings) => settings,
            Err(ConfigError::IoError { .. }) => Self::default(),
            Err(e) => {
                tracing::warn!("{}; using default settings", e);
                Self::default()
            }
        }
    }
}

/// `[feed]`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedSettings {
    /// File path or http(s) URL of the extracted-document list.
    #[serde(default)]
    pub source: Option<String>,

    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl FeedSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }
}

impl Default for FeedSettings {
    fn default() -> Self {
        Self {
            source: None,
            poll_interval_secs: default_poll_interval_secs(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

/// Which notification channel dispatch uses.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    Smtp,
    Webhook,
    /// Log only; nothing leaves the machine.
    #[default]
    Log,
}

/// `[dispatch]`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchSettings {
    /// Upper bound on one notification send.
    #[serde(default = "default_dispatch_timeout_secs")]
    pub timeout_secs: u64,

    /// Recorded as `enviado_por` when the caller does not name anyone.
    #[serde(default = "default_sent_by")]
    pub sent_by: String,

    #[serde(default)]
    pub channel: ChannelKind,
}

impl DispatchSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            timeout_secs: default_dispatch_timeout_secs(),
            sent_by: default_sent_by(),
            channel: ChannelKind::default(),
        }
    }
}

/// `[smtp]`
#[derive(Clone, Serialize, Deserialize)]
pub struct SmtpSettings {
    #[serde(default = "default_smtp_host")]
    pub host: String,

    #[serde(default = "default_smtp_port")]
    pub port: u16,

    #[serde(default)]
    pub username: Option<String>,

    #[serde(default, skip_serializing)]
    pub password: Option<String>,

    /// Sender mailbox; defaults to the username.
    #[serde(default)]
    pub from: Option<String>,

    #[serde(default)]
    pub subject_prefix: String,
}

impl SmtpSettings {
    /// Username from the environment, else from the file.
    pub fn username(&self) -> Option<String> {
        env_or(SMTP_USERNAME_ENV, self.username.as_ref())
    }

    /// Login pair, present only when both parts are known.
    pub fn credentials(&self) -> Option<(String, String)> {
        let password = env_or(SMTP_PASSWORD_ENV, self.password.as_ref())?;
        Some((self.username()?, password))
    }
}

fn env_or(var: &str, fallback: Option<&String>) -> Option<String> {
    std::env::var(var)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .or_else(|| fallback.cloned())
}

// Hand-written so the password never reaches a log line.
impl fmt::Debug for SmtpSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SmtpSettings")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("from", &self.from)
            .field("subject_prefix", &self.subject_prefix)
            .finish()
    }
}

impl Default for SmtpSettings {
    fn default() -> Self {
        Self {
            host: default_smtp_host(),
            port: default_smtp_port(),
            username: None,
            password: None,
            from: None,
            subject_prefix: String::new(),
        }
    }
}

/// `[webhook]`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WebhookSettings {
    #[serde(default)]
    pub url: Option<String>,
}

// Serde default functions
fn default_poll_interval_secs() -> u64 {
    10
}

fn default_request_timeout_secs() -> u64 {
    15
}

fn default_dispatch_timeout_secs() -> u64 {
    30
}

fn default_sent_by() -> String {
    "notaria".to_string()
}

fn default_smtp_host() -> String {
    "smtp-mail.outlook.com".to_string()
}

fn default_smtp_port() -> u16 {
    587
}
