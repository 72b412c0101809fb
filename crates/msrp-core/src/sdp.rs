//! The SDP media description of an MSRP stream
//!
//! Only the pieces exchanged with the peer live here: the `m=` line and the
//! attributes `path`, `accept-types`, `accept-wrapped-types`,
//! `file-selector` and the direction tokens. Parsing whole SDP bodies is the
//! SIP engine's job.

use std::fmt;
use std::str::FromStr;

use crate::error::MsrpError;

/// Media port advertised when the local path carries none
pub const DEFAULT_MEDIA_PORT: u16 = 12345;

pub const ATTR_PATH: &str = "path";
pub const ATTR_ACCEPT_TYPES: &str = "accept-types";
pub const ATTR_ACCEPT_WRAPPED_TYPES: &str = "accept-wrapped-types";
pub const ATTR_FILE_SELECTOR: &str = "file-selector";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SdpAttribute {
    pub name: String,
    pub value: String,
}

impl SdpAttribute {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }

    /// Attribute without a value, e.g. `a=sendonly`
    pub fn flag(name: impl Into<String>) -> Self {
        Self::new(name, "")
    }
}

impl fmt::Display for SdpAttribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.value.is_empty() {
            write!(f, "a={}", self.name)
        } else {
            write!(f, "a={}:{}", self.name, self.value)
        }
    }
}

/// Media direction as carried by the `sendrecv`/`sendonly`/`recvonly`/`inactive` tokens
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum StreamDirection {
    #[default]
    SendRecv,
    SendOnly,
    RecvOnly,
    Inactive,
}

impl StreamDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            StreamDirection::SendRecv => "sendrecv",
            StreamDirection::SendOnly => "sendonly",
            StreamDirection::RecvOnly => "recvonly",
            StreamDirection::Inactive => "inactive",
        }
    }

    /// The direction seen from the other end
    pub fn reverse(&self) -> Self {
        match self {
            StreamDirection::SendOnly => StreamDirection::RecvOnly,
            StreamDirection::RecvOnly => StreamDirection::SendOnly,
            other => *other,
        }
    }

    pub fn can_send(&self) -> bool {
        matches!(self, StreamDirection::SendRecv | StreamDirection::SendOnly)
    }

    pub fn can_receive(&self) -> bool {
        matches!(self, StreamDirection::SendRecv | StreamDirection::RecvOnly)
    }
}

impl fmt::Display for StreamDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StreamDirection {
    type Err = MsrpError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sendrecv" => Ok(StreamDirection::SendRecv),
            "sendonly" => Ok(StreamDirection::SendOnly),
            "recvonly" => Ok(StreamDirection::RecvOnly),
            "inactive" => Ok(StreamDirection::Inactive),
            other => Err(MsrpError::negotiation(format!("unknown direction '{}'", other))),
        }
    }
}

/// One `m=` section
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaDescription {
    pub media: String,
    pub port: u16,
    pub transport: String,
    pub formats: Vec<String>,
    pub attributes: Vec<SdpAttribute>,
}

impl MediaDescription {
    pub fn new(media: impl Into<String>, port: u16, transport: impl Into<String>) -> Self {
        Self {
            media: media.into(),
            port,
            transport: transport.into(),
            formats: Vec::new(),
            attributes: Vec::new(),
        }
    }

    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.formats.push(format.into());
        self
    }

    pub fn with_attribute(mut self, attribute: SdpAttribute) -> Self {
        self.attributes.push(attribute);
        self
    }

    /// Value of the first attribute called `name`
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.name == name)
            .map(|a| a.value.as_str())
    }

    pub fn has_attribute(&self, name: &str) -> bool {
        self.attributes.iter().any(|a| a.name == name)
    }

    /// Direction announced by the attributes, `sendrecv` when none is present
    pub fn direction(&self) -> StreamDirection {
        self.attributes
            .iter()
            .find_map(|a| a.name.parse::<StreamDirection>().ok())
            .unwrap_or_default()
    }

    pub fn m_line(&self) -> String {
        format!(
            "m={} {} {} {}",
            self.media,
            self.port,
            self.transport,
            self.formats.join(" ")
        )
    }
}

impl fmt::Display for MediaDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.m_line())?;
        for attribute in &self.attributes {
            write!(f, "\r\n{}", attribute)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direction_from_attributes() {
        let media = MediaDescription::new("message", 2855, "TCP/MSRP")
            .with_attribute(SdpAttribute::new(ATTR_PATH, "msrp://a/b;tcp"))
            .with_attribute(SdpAttribute::flag("sendonly"));
        assert_eq!(media.direction(), StreamDirection::SendOnly);
        assert_eq!(media.direction().reverse(), StreamDirection::RecvOnly);

        let plain = MediaDescription::new("message", 2855, "TCP/MSRP");
        assert_eq!(plain.direction(), StreamDirection::SendRecv);
    }

    #[test]
    fn test_render() {
        let media = MediaDescription::new("message", 7777, "TCP/TLS/MSRP")
            .with_format("*")
            .with_attribute(SdpAttribute::new(ATTR_ACCEPT_TYPES, "message/cpim text/*"))
            .with_attribute(SdpAttribute::flag("recvonly"));
        assert_eq!(
            media.to_string(),
            "m=message 7777 TCP/TLS/MSRP *\r\na=accept-types:message/cpim text/*\r\na=recvonly"
        );
    }
}
