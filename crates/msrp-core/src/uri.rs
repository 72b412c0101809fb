//! MSRP URIs (RFC 4975 section 9)
//!
//! `msrp[s]://[user@]host[:port][/session-id];tcp`
//!
//! Relay URIs carry no session id, endpoint URIs always do.

use std::fmt;
use std::str::FromStr;

use rand::distributions::Alphanumeric;
use rand::Rng;

use crate::error::MsrpError;

const SESSION_ID_LEN: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MsrpUri {
    pub use_tls: bool,
    pub user: Option<String>,
    pub host: String,
    pub port: Option<u16>,
    pub session_id: Option<String>,
    /// Transport parameter, `tcp` in practice
    pub transport: String,
}

impl MsrpUri {
    pub fn new(host: impl Into<String>, port: Option<u16>, use_tls: bool) -> Self {
        Self {
            use_tls,
            user: None,
            host: host.into(),
            port,
            session_id: None,
            transport: "tcp".to_string(),
        }
    }

    /// Local endpoint URI with a fresh random session id
    pub fn local(host: impl Into<String>, port: u16, use_tls: bool) -> Self {
        let session_id: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(SESSION_ID_LEN)
            .map(char::from)
            .collect();
        Self::new(host, (port != 0).then_some(port), use_tls).with_session_id(session_id)
    }

    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    /// Port for the SDP media line; `None` when unset or zero
    pub fn media_port(&self) -> Option<u16> {
        self.port.filter(|p| *p != 0)
    }
}

impl fmt::Display for MsrpUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(if self.use_tls { "msrps://" } else { "msrp://" })?;
        if let Some(user) = &self.user {
            write!(f, "{}@", user)?;
        }
        f.write_str(&self.host)?;
        if let Some(port) = self.port {
            write!(f, ":{}", port)?;
        }
        if let Some(session_id) = &self.session_id {
            write!(f, "/{}", session_id)?;
        }
        write!(f, ";{}", self.transport)
    }
}

impl FromStr for MsrpUri {
    type Err = MsrpError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || MsrpError::InvalidUri { uri: s.to_string() };

        let (use_tls, rest) = if let Some(rest) = s.strip_prefix("msrps://") {
            (true, rest)
        } else if let Some(rest) = s.strip_prefix("msrp://") {
            (false, rest)
        } else {
            return Err(invalid());
        };

        let (rest, transport) = rest.rsplit_once(';').ok_or_else(invalid)?;
        if transport.is_empty() {
            return Err(invalid());
        }

        let (authority, session_id) = match rest.split_once('/') {
            Some((_, "")) => return Err(invalid()),
            Some((authority, session_id)) => (authority, Some(session_id.to_string())),
            None => (rest, None),
        };

        let (user, hostport) = match authority.rsplit_once('@') {
            Some(("", _)) => return Err(invalid()),
            Some((user, hostport)) => (Some(user.to_string()), hostport),
            None => (None, authority),
        };

        let port_split = if hostport.starts_with('[') {
            hostport.find("]:").map(|idx| (&hostport[..=idx], &hostport[idx + 2..]))
        } else {
            hostport.rsplit_once(':')
        };
        let (host, port) = match port_split {
            Some((host, port)) => {
                let port = port.parse::<u16>().map_err(|_| invalid())?;
                (host, Some(port))
            }
            None => (hostport, None),
        };
        if host.is_empty() || host.contains(char::is_whitespace) {
            return Err(invalid());
        }

        Ok(MsrpUri {
            use_tls,
            user,
            host: host.to_string(),
            port,
            session_id,
            transport: transport.to_ascii_lowercase(),
        })
    }
}

/// Parse a space separated `path` attribute
pub fn parse_path(value: &str) -> Result<Vec<MsrpUri>, MsrpError> {
    value.split_whitespace().map(str::parse).collect()
}

/// Render a path the way the `path` attribute carries it
pub fn format_path(path: &[MsrpUri]) -> String {
    path.iter().map(ToString::to_string).collect::<Vec<_>>().join(" ")
}
