//! Candidate network routes produced by resolution
//!
//! A [`RouteSet`] is the ordered queue of routes returned by one lookup.
//! Each connection attempt pops the next route; a failed attempt never puts
//! its route back.

use std::collections::VecDeque;
use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::PresenceError;

/// SIP transport protocol of a route
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportProtocol {
    Udp,
    Tcp,
    Tls,
}

impl TransportProtocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransportProtocol::Udp => "udp",
            TransportProtocol::Tcp => "tcp",
            TransportProtocol::Tls => "tls",
        }
    }
}

impl fmt::Display for TransportProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransportProtocol {
    type Err = PresenceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "udp" => Ok(TransportProtocol::Udp),
            "tcp" => Ok(TransportProtocol::Tcp),
            "tls" => Ok(TransportProtocol::Tls),
            other => Err(PresenceError::configuration(
                "transport",
                format!("unsupported transport '{}'", other),
            )),
        }
    }
}

/// A resolved destination for a SUBSCRIBE dialog
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Route {
    pub address: IpAddr,
    pub port: u16,
    pub transport: TransportProtocol,
}

impl Route {
    pub fn new(address: IpAddr, port: u16, transport: TransportProtocol) -> Self {
        Self { address, port, transport }
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{};transport={}", self.address, self.port, self.transport)
    }
}

/// Ordered queue of routes left to try in the current attempt window
#[derive(Debug, Default)]
pub struct RouteSet {
    routes: VecDeque<Route>,
}

impl RouteSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the next route to try, removing it from the set
    pub fn pop_next(&mut self) -> Option<Route> {
        self.routes.pop_front()
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    pub fn clear(&mut self) {
        self.routes.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = &Route> {
        self.routes.iter()
    }
}

impl From<Vec<Route>> for RouteSet {
    fn from(routes: Vec<Route>) -> Self {
        Self { routes: routes.into() }
    }
}
