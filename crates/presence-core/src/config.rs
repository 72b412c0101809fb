//! Account and client configuration
//!
//! Configuration is plain serde data so it can be loaded from a TOML file or
//! built in code with the `with_*` helpers.
//!
//! ```rust
//! use sipim_presence_core::config::PresenceClientConfig;
//!
//! let config = PresenceClientConfig::from_toml_str(r#"
//!     default_account = "alice@example.com"
//!
//!     [[accounts]]
//!     id = "alice@example.com"
//!     password = "secret"
//!
//!     [sip]
//!     transports = ["tls", "tcp"]
//! "#).unwrap();
//!
//! let account = config.select_account(None).unwrap();
//! assert_eq!(account.id, "alice@example.com");
//! assert_eq!(account.subscribe_interval, 600);
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{PresenceError, PresenceResult};
use crate::route::TransportProtocol;

/// Outbound proxy that replaces the subscription target for route lookup
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundProxy {
    pub host: String,
    #[serde(default = "default_sip_port")]
    pub port: u16,
    #[serde(default = "default_proxy_transport")]
    pub transport: TransportProtocol,
}

fn default_sip_port() -> u16 {
    5060
}

fn default_proxy_transport() -> TransportProtocol {
    TransportProtocol::Udp
}

fn default_true() -> bool {
    true
}

fn default_subscribe_interval() -> u32 {
    600
}

/// A SIP account usable for presence subscriptions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountConfig {
    /// Address of record as `user@domain`
    pub id: String,

    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default)]
    pub password: Option<String>,

    #[serde(default)]
    pub outbound_proxy: Option<OutboundProxy>,

    /// Expires value of each SUBSCRIBE, in seconds
    #[serde(default = "default_subscribe_interval")]
    pub subscribe_interval: u32,
}

impl AccountConfig {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            enabled: true,
            password: None,
            outbound_proxy: None,
            subscribe_interval: default_subscribe_interval(),
        }
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn with_outbound_proxy(mut self, proxy: OutboundProxy) -> Self {
        self.outbound_proxy = Some(proxy);
        self
    }

    pub fn with_subscribe_interval(mut self, seconds: u32) -> Self {
        self.subscribe_interval = seconds;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Username part of the account id
    pub fn username(&self) -> &str {
        self.id.split_once('@').map(|(user, _)| user).unwrap_or(&self.id)
    }

    /// Domain part of the account id (empty if the id has none)
    pub fn domain(&self) -> &str {
        self.id.split_once('@').map(|(_, domain)| domain).unwrap_or("")
    }
}

/// SIP-level settings shared by all accounts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SipSettings {
    /// Transports offered to the resolver, in preference order
    pub transports: Vec<TransportProtocol>,
}

impl Default for SipSettings {
    fn default() -> Self {
        Self {
            transports: vec![TransportProtocol::Tls, TransportProtocol::Tcp, TransportProtocol::Udp],
        }
    }
}

/// Timing of resubscription attempts, all values in seconds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    /// Backoff base after a successful transition
    pub initial_wait: f64,
    /// Cap applied to the doubled backoff base
    pub max_wait: f64,
    /// How long a resolution -> subscribe attempt may take before retries back off
    pub attempt_window: f64,
    pub resolution_retry_min: f64,
    pub resolution_retry_max: f64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            initial_wait: 0.5,
            max_wait: 30.0,
            attempt_window: 30.0,
            resolution_retry_min: 1.0,
            resolution_retry_max: 2.0,
        }
    }
}

impl RetrySettings {
    pub fn attempt_window(&self) -> Duration {
        Duration::from_secs_f64(self.attempt_window)
    }

    pub fn validate(&self) -> PresenceResult<()> {
        if self.initial_wait <= 0.0 {
            return Err(PresenceError::configuration("retry.initial_wait", "must be positive"));
        }
        if self.max_wait < self.initial_wait {
            return Err(PresenceError::configuration(
                "retry.max_wait",
                "must not be smaller than initial_wait",
            ));
        }
        if self.resolution_retry_max < self.resolution_retry_min {
            return Err(PresenceError::configuration(
                "retry.resolution_retry_max",
                "must not be smaller than resolution_retry_min",
            ));
        }
        Ok(())
    }
}

/// How log output is rendered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// The `[logging]` section, consumed by [`crate::logging::setup_logging`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    /// Level for the presence and MSRP crates
    pub level: String,
    /// Level for everything else
    pub other_level: String,
    pub format: LogFormat,
    /// Include source file and line
    pub file_info: bool,
    /// Extra `target=level` directives, applied after the levels above
    pub directives: Vec<String>,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            other_level: "warn".to_string(),
            format: LogFormat::Text,
            file_info: false,
            directives: Vec::new(),
        }
    }
}

impl LogSettings {
    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.level = level.into();
        self
    }

    pub fn with_json(mut self) -> Self {
        self.format = LogFormat::Json;
        self
    }

    pub fn with_directive(mut self, directive: impl Into<String>) -> Self {
        self.directives.push(directive.into());
        self
    }

    pub fn validate(&self) -> PresenceResult<()> {
        crate::logging::filter_directives(self, None).map(|_| ())
    }
}

/// Top-level presence client configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PresenceClientConfig {
    #[serde(default)]
    pub accounts: Vec<AccountConfig>,

    /// Account used when none is named explicitly
    #[serde(default)]
    pub default_account: Option<String>,

    #[serde(default)]
    pub sip: SipSettings,

    #[serde(default)]
    pub retry: RetrySettings,

    #[serde(default)]
    pub logging: LogSettings,
}

impl PresenceClientConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_toml_str(text: &str) -> PresenceResult<Self> {
        let config: Self = toml::from_str(text)
            .map_err(|e| PresenceError::configuration("toml", e.to_string()))?;
        config.retry.validate()?;
        config.logging.validate()?;
        Ok(config)
    }

    pub fn with_account(mut self, account: AccountConfig) -> Self {
        if self.default_account.is_none() {
            self.default_account = Some(account.id.clone());
        }
        self.accounts.push(account);
        self
    }

    pub fn with_transports(mut self, transports: Vec<TransportProtocol>) -> Self {
        self.sip.transports = transports;
        self
    }

    pub fn with_retry(mut self, retry: RetrySettings) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_logging(mut self, logging: LogSettings) -> Self {
        self.logging = logging;
        self
    }

    /// Pick the account to subscribe with.
    ///
    /// `None` selects the default account. Unknown and disabled accounts are
    /// configuration errors that abort startup.
    pub fn select_account(&self, name: Option<&str>) -> PresenceResult<&AccountConfig> {
        let wanted = name.or(self.default_account.as_deref());
        let found = match wanted {
            Some(wanted) => self.accounts.iter().find(|a| a.id == wanted),
            None => self.accounts.first(),
        };

        let account = found.ok_or_else(|| PresenceError::UnknownAccount {
            name: wanted.unwrap_or("<default>").to_string(),
            available: self
                .accounts
                .iter()
                .map(|a| a.id.as_str())
                .collect::<Vec<_>>()
                .join(", "),
        })?;

        if !account.enabled {
            return Err(PresenceError::AccountDisabled { name: account.id.clone() });
        }
        Ok(account)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_account_id_parts() {
        let account = AccountConfig::new("alice@example.com");
        assert_eq!(account.username(), "alice");
        assert_eq!(account.domain(), "example.com");
    }

    #[test]
    fn test_unknown_account_lists_available() {
        let config = PresenceClientConfig::new()
            .with_account(AccountConfig::new("alice@example.com"))
            .with_account(AccountConfig::new("bob@example.com"));

        let err = config.select_account(Some("carol@example.com")).unwrap_err();
        assert_eq!(
            err.to_string(),
            "unknown account carol@example.com. Available accounts: alice@example.com, bob@example.com"
        );
    }

    #[test]
    fn test_disabled_account_is_rejected() {
        let config = PresenceClientConfig::new()
            .with_account(AccountConfig::new("alice@example.com").disabled());
        assert!(matches!(
            config.select_account(None),
            Err(PresenceError::AccountDisabled { .. })
        ));
    }

    #[test]
    fn test_default_account_selected() {
        let config = PresenceClientConfig::new()
            .with_account(AccountConfig::new("alice@example.com"))
            .with_account(AccountConfig::new("bob@example.com"));
        assert_eq!(config.select_account(None).unwrap().id, "alice@example.com");
        assert_eq!(config.select_account(Some("bob@example.com")).unwrap().id, "bob@example.com");
    }

    #[test]
    fn test_toml_outbound_proxy_and_retry() {
        let config = PresenceClientConfig::from_toml_str(
            r#"
            [[accounts]]
            id = "alice@example.com"
            subscribe_interval = 300

            [accounts.outbound_proxy]
            host = "proxy.example.com"
            transport = "tcp"

            [retry]
            max_wait = 60.0
            "#,
        )
        .unwrap();

        let account = config.select_account(None).unwrap();
        let proxy = account.outbound_proxy.as_ref().unwrap();
        assert_eq!(proxy.port, 5060);
        assert_eq!(proxy.transport, TransportProtocol::Tcp);
        assert_eq!(account.subscribe_interval, 300);
        assert_eq!(config.retry.max_wait, 60.0);
        assert_eq!(config.retry.initial_wait, 0.5);
        assert_eq!(config.sip.transports.len(), 3);
    }

    #[test]
    fn test_toml_logging_section() {
        let config = PresenceClientConfig::from_toml_str(
            r#"
            [logging]
            level = "debug"
            format = "json"
            directives = ["hyper=error"]
            "#,
        )
        .unwrap();
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.other_level, "warn");
        assert_eq!(config.logging.format, LogFormat::Json);
        assert_eq!(config.logging.directives, vec!["hyper=error".to_string()]);

        let err = PresenceClientConfig::from_toml_str(
            r#"
            [logging]
            level = "loud"
            "#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("logging.level"));
    }

    #[test]
    fn test_invalid_retry_settings_rejected() {
        let err = PresenceClientConfig::from_toml_str(
            r#"
            [retry]
            initial_wait = 0.0
            "#,
        )
        .unwrap_err();
        assert_eq!(err.category(), "configuration");
    }
}
