//! # nt-lifecycle
//!
//! The case lifecycle for the notaria case tracker: who may change a case,
//! when a case is dispatched, and what moves it between Pending and Finished.
//!
//! A case moves Pending → Finished only as the direct result of a delivered
//! notification, and Finished → Pending only by an explicit return. Every
//! committed change is broadcast as a `CaseEvent`.
//!
//! ## Key components
//!
//! - [`LifecycleManager`]: validated writes plus their broadcasts
//! - [`NotificationDispatcher`]: dispatch one case or every ready case concurrently
//! - [`Notifier`]: delivery channel ([`SmtpNotifier`], [`WebhookNotifier`], [`LogNotifier`])
//! - [`Engine`]: manager, dispatcher and feed poller with one shutdown
//! - [`NotariaConfig`]: `.notaria/` layout and `notaria.toml`

pub mod config;
pub mod dispatcher;
pub mod engine;
pub mod error;
pub mod manager;
pub mod notifier;

pub use config::{
    ChannelKind, DispatchSettings, FeedSettings, NotariaConfig, Settings, SmtpSettings,
    WebhookSettings, SMTP_PASSWORD_ENV, SMTP_USERNAME_ENV,
};
pub use dispatcher::{
    DispatchFailure, DispatchReport, DispatchSummary, FailureSummary, NotificationDispatcher,
    DEFAULT_DISPATCH_TIMEOUT,
};
pub use engine::{Engine, EngineOptions};
pub use error::{ConfigError, DispatchError, NotifyError};
pub use manager::LifecycleManager;
pub use notifier::{
    LogNotifier, NotificationRequest, Notifier, SmtpNotifier, SmtpOptions, WebhookNotifier,
};
