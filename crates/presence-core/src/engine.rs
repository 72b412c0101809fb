//! Interfaces consumed from the SIP engine and the route resolver
//!
//! The subscription layer never talks to sockets itself. It asks a
//! [`Resolver`] for routes and an [`Engine`] for SUBSCRIBE dialogs; both
//! report back asynchronously. Dialog state changes are pushed into the
//! [`DialogEventSender`] handed over at dialog creation, tagged with the
//! dialog's [`DialogId`] so stale events from a superseded dialog can be
//! recognized and dropped.

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::error::{PresenceError, PresenceResult, ResolutionError};
use crate::route::{Route, TransportProtocol};
use crate::subscription::SubscriptionInput;

/// Minimal SIP URI: `sip[s]:[user@]host[:port][;param[=value]]*`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SipUri {
    pub secure: bool,
    pub user: Option<String>,
    pub host: String,
    pub port: Option<u16>,
    pub parameters: Vec<(String, Option<String>)>,
}

impl SipUri {
    pub fn new(user: Option<String>, host: impl Into<String>) -> Self {
        Self {
            secure: false,
            user,
            host: host.into(),
            port: None,
            parameters: Vec::new(),
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn with_parameter(mut self, name: impl Into<String>, value: Option<String>) -> Self {
        self.parameters.push((name.into(), value));
        self
    }

    pub fn parameter(&self, name: &str) -> Option<&str> {
        self.parameters
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .and_then(|(_, v)| v.as_deref())
    }
}

impl fmt::Display for SipUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(if self.secure { "sips:" } else { "sip:" })?;
        if let Some(user) = &self.user {
            write!(f, "{}@", user)?;
        }
        f.write_str(&self.host)?;
        if let Some(port) = self.port {
            write!(f, ":{}", port)?;
        }
        for (name, value) in &self.parameters {
            match value {
                Some(value) => write!(f, ";{}={}", name, value)?,
                None => write!(f, ";{}", name)?,
            }
        }
        Ok(())
    }
}

impl FromStr for SipUri {
    type Err = PresenceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || PresenceError::malformed_uri(s);

        let (secure, rest) = if let Some(rest) = s.strip_prefix("sips:") {
            (true, rest)
        } else if let Some(rest) = s.strip_prefix("sip:") {
            (false, rest)
        } else {
            return Err(malformed());
        };

        let mut pieces = rest.split(';');
        let address = pieces.next().ok_or_else(malformed)?;
        let parameters = pieces
            .filter(|p| !p.is_empty())
            .map(|p| match p.split_once('=') {
                Some((name, value)) => (name.to_string(), Some(value.to_string())),
                None => (p.to_string(), None),
            })
            .collect();

        let (user, hostport) = match address.rsplit_once('@') {
            Some((user, hostport)) if !user.is_empty() => (Some(user.to_string()), hostport),
            Some(_) => return Err(malformed()),
            None => (None, address),
        };

        let port_split = if hostport.starts_with('[') {
            hostport.find("]:").map(|idx| (&hostport[..=idx], &hostport[idx + 2..]))
        } else {
            hostport.rsplit_once(':')
        };
        let (host, port) = match port_split {
            Some((host, port)) => {
                let port = port.parse::<u16>().map_err(|_| malformed())?;
                (host, Some(port))
            }
            None => (hostport, None),
        };

        let invalid = |part: &str| part.contains(|c: char| c.is_whitespace() || c == '@');
        if host.is_empty() || invalid(host) || user.as_deref().map_or(false, invalid) {
            return Err(malformed());
        }

        Ok(SipUri {
            secure,
            user,
            host: host.to_string(),
            port,
            parameters,
        })
    }
}

/// Identifier the session assigns to every dialog it creates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DialogId(pub Uuid);

impl DialogId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for DialogId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Subscription state reported by the engine for one dialog
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DialogState {
    Pending,
    /// `active` or `accepted`
    Active,
    Terminated,
}

impl FromStr for DialogState {
    type Err = PresenceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pending" => Ok(DialogState::Pending),
            "active" | "accepted" => Ok(DialogState::Active),
            "terminated" => Ok(DialogState::Terminated),
            other => Err(PresenceError::dialog(format!("unknown dialog state '{}'", other))),
        }
    }
}

/// What happened on a dialog
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DialogEventKind {
    StateChanged {
        state: DialogState,
        code: Option<u16>,
        reason: Option<String>,
    },
    Notify {
        content_type: String,
        body: String,
    },
}

/// Event emitted by the engine for a dialog created through [`Engine::create_subscription`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DialogEvent {
    pub dialog_id: DialogId,
    pub kind: DialogEventKind,
}

impl DialogEvent {
    pub fn state(dialog_id: DialogId, state: DialogState) -> Self {
        Self {
            dialog_id,
            kind: DialogEventKind::StateChanged { state, code: None, reason: None },
        }
    }

    pub fn terminated(dialog_id: DialogId, code: Option<u16>, reason: Option<String>) -> Self {
        Self {
            dialog_id,
            kind: DialogEventKind::StateChanged {
                state: DialogState::Terminated,
                code,
                reason,
            },
        }
    }

    pub fn notify(dialog_id: DialogId, content_type: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            dialog_id,
            kind: DialogEventKind::Notify {
                content_type: content_type.into(),
                body: body.into(),
            },
        }
    }
}

/// Channel the engine uses to report dialog events back to the session.
///
/// Events are posted into the session's input queue, so they are handled on
/// the same serialized path as every other transition.
#[derive(Debug, Clone)]
pub struct DialogEventSender {
    inputs: mpsc::UnboundedSender<SubscriptionInput>,
}

impl DialogEventSender {
    pub(crate) fn new(inputs: mpsc::UnboundedSender<SubscriptionInput>) -> Self {
        Self { inputs }
    }

    /// Report an event; returns `false` once the session is gone
    pub fn send(&self, event: DialogEvent) -> bool {
        self.inputs.send(SubscriptionInput::Dialog(event)).is_ok()
    }
}

/// Everything the engine needs to build one SUBSCRIBE dialog
#[derive(Debug, Clone)]
pub struct SubscribeRequest {
    pub dialog_id: DialogId,
    /// Subscriber identity (the account's address of record)
    pub from: SipUri,
    pub password: Option<String>,
    pub target: SipUri,
    pub event: String,
    pub route: Route,
    pub expires: u32,
    pub accept: Vec<String>,
    pub extra_headers: Vec<(String, String)>,
}

/// Route lookup collaborator
#[async_trait]
pub trait Resolver: Send + Sync {
    /// Resolve `target` (subscription target or outbound proxy) into candidate routes
    async fn lookup_routes(
        &self,
        target: &SipUri,
        transports: &[TransportProtocol],
    ) -> Result<Vec<Route>, ResolutionError>;
}

/// A SUBSCRIBE dialog owned by the engine
#[async_trait]
pub trait SubscriptionDialog: Send + Sync {
    fn id(&self) -> DialogId;

    fn route(&self) -> &Route;

    /// Send the initial SUBSCRIBE; the outcome arrives as dialog events
    async fn subscribe(&self) -> PresenceResult<()>;

    /// Send SUBSCRIBE with `Expires: 0`; a terminated event follows
    async fn unsubscribe(&self) -> PresenceResult<()>;
}

/// SIP engine collaborator
#[async_trait]
pub trait Engine: Send + Sync {
    fn create_subscription(
        &self,
        request: SubscribeRequest,
        events: DialogEventSender,
    ) -> PresenceResult<Box<dyn SubscriptionDialog>>;

    fn parse_sip_uri(&self, uri: &str) -> PresenceResult<SipUri> {
        uri.parse()
    }
}
