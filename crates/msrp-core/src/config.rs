//! Account and stream settings used during MSRP negotiation
//!
//! ```rust
//! use sipim_msrp_core::config::{MsrpClientConfig, MsrpTransportKind};
//!
//! let config = MsrpClientConfig::from_toml_str(r#"
//!     [account]
//!     identity = "alice@example.com"
//!     use_relay_for_outbound = true
//!
//!     [account.relay]
//!     host = "relay.example.com"
//!
//!     [msrp]
//!     transport = "tls"
//! "#).unwrap();
//!
//! assert_eq!(config.account.relay.as_ref().unwrap().port, 2855);
//! assert_eq!(config.msrp.transport, MsrpTransportKind::Tls);
//! assert_eq!(config.chat.accept_types, vec!["message/cpim", "text/*"]);
//! ```

use std::fmt;
use std::net::{IpAddr, Ipv4Addr};

use serde::{Deserialize, Serialize};

use crate::error::{MsrpError, MsrpResult};

/// Transport an MSRP endpoint listens or connects on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MsrpTransportKind {
    #[default]
    Tcp,
    Tls,
}

impl MsrpTransportKind {
    pub fn is_tls(&self) -> bool {
        matches!(self, MsrpTransportKind::Tls)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MsrpTransportKind::Tcp => "tcp",
            MsrpTransportKind::Tls => "tls",
        }
    }
}

impl fmt::Display for MsrpTransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn default_relay_port() -> u16 {
    2855
}

fn default_relay_transport() -> MsrpTransportKind {
    MsrpTransportKind::Tls
}

fn default_true() -> bool {
    true
}

/// Explicitly configured MSRP relay
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayConfig {
    pub host: String,
    #[serde(default = "default_relay_port")]
    pub port: u16,
    #[serde(default = "default_relay_transport")]
    pub transport: MsrpTransportKind,
}

/// Account the stream negotiates on behalf of
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsrpAccount {
    /// `user@domain`
    pub identity: String,

    #[serde(default)]
    pub password: Option<String>,

    #[serde(default)]
    pub use_relay_for_outbound: bool,

    #[serde(default = "default_true")]
    pub use_relay_for_inbound: bool,

    #[serde(default)]
    pub relay: Option<RelayConfig>,
}

impl MsrpAccount {
    pub fn new(identity: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            password: None,
            use_relay_for_outbound: false,
            use_relay_for_inbound: false,
            relay: None,
        }
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn with_relay_for_outbound(mut self, enabled: bool) -> Self {
        self.use_relay_for_outbound = enabled;
        self
    }

    pub fn with_relay_for_inbound(mut self, enabled: bool) -> Self {
        self.use_relay_for_inbound = enabled;
        self
    }

    pub fn with_relay(mut self, relay: RelayConfig) -> Self {
        self.relay = Some(relay);
        self
    }

    pub fn username(&self) -> &str {
        self.identity.split_once('@').map(|(user, _)| user).unwrap_or(&self.identity)
    }

    pub fn domain(&self) -> &str {
        self.identity.split_once('@').map(|(_, domain)| domain).unwrap_or("")
    }

    /// SIP URI used as the CPIM `From`
    pub fn uri(&self) -> String {
        format!("sip:{}", self.identity)
    }
}

fn default_accept_types() -> Vec<String> {
    vec!["message/cpim".to_string(), "text/*".to_string()]
}

fn default_accept_wrapped_types() -> Vec<String> {
    vec!["*".to_string()]
}

/// Content types advertised for chat streams
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatSettings {
    #[serde(default = "default_accept_types")]
    pub accept_types: Vec<String>,
    #[serde(default = "default_accept_wrapped_types")]
    pub accept_wrapped_types: Vec<String>,
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self {
            accept_types: default_accept_types(),
            accept_wrapped_types: default_accept_wrapped_types(),
        }
    }
}

/// Local MSRP endpoint settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MsrpSettings {
    /// Transport used when no relay is involved
    pub transport: MsrpTransportKind,
    pub local_ip: IpAddr,
    /// 0 lets the transport pick a port
    pub local_port: u16,
}

impl Default for MsrpSettings {
    fn default() -> Self {
        Self {
            transport: MsrpTransportKind::Tcp,
            local_ip: IpAddr::V4(Ipv4Addr::LOCALHOST),
            local_port: 0,
        }
    }
}

/// Everything a stream needs from configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsrpClientConfig {
    pub account: MsrpAccount,
    #[serde(default)]
    pub chat: ChatSettings,
    #[serde(default)]
    pub msrp: MsrpSettings,
}

impl MsrpClientConfig {
    pub fn new(account: MsrpAccount) -> Self {
        Self {
            account,
            chat: ChatSettings::default(),
            msrp: MsrpSettings::default(),
        }
    }

    pub fn with_chat(mut self, chat: ChatSettings) -> Self {
        self.chat = chat;
        self
    }

    pub fn with_msrp(mut self, msrp: MsrpSettings) -> Self {
        self.msrp = msrp;
        self
    }

    pub fn from_toml_str(text: &str) -> MsrpResult<Self> {
        let config: Self = toml::from_str(text)
            .map_err(|e| MsrpError::configuration(e.to_string()))?;
        if config.chat.accept_types.is_empty() {
            return Err(MsrpError::configuration("chat.accept_types is empty"));
        }
        Ok(config)
    }
}
