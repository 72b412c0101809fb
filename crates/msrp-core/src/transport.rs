//! Interfaces consumed from the MSRP transport library
//!
//! Chunk framing, sockets, TLS and relay authentication all live behind
//! these traits. A stream only sees:
//!
//! - an [`MsrpConnector`] (outgoing calls) or acceptor (incoming calls) that
//!   turns a local URI into a full local path and, once the remote path is
//!   known, into an [`MsrpConnection`]
//! - an [`MsrpTransportSession`] over that connection which sends chunks and
//!   files and delivers inbound chunks into an mpsc channel

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;

use crate::error::TransportError;
use crate::uri::MsrpUri;

pub const HEADER_FAILURE_REPORT: &str = "Failure-Report";
pub const HEADER_SUCCESS_REPORT: &str = "Success-Report";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChunkMethod {
    Send,
    Report,
}

impl fmt::Display for ChunkMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ChunkMethod::Send => "SEND",
            ChunkMethod::Report => "REPORT",
        })
    }
}

/// `Status` header of a REPORT
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MsrpStatus {
    pub code: u16,
    pub comment: String,
}

/// One unit of MSRP traffic
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MsrpChunk {
    pub method: ChunkMethod,
    pub message_id: String,
    pub content_type: Option<String>,
    pub data: Bytes,
    pub headers: Vec<(String, String)>,
    pub status: Option<MsrpStatus>,
}

impl MsrpChunk {
    pub fn send(message_id: impl Into<String>, content_type: impl Into<String>, data: Bytes) -> Self {
        Self {
            method: ChunkMethod::Send,
            message_id: message_id.into(),
            content_type: Some(content_type.into()),
            data,
            headers: Vec::new(),
            status: None,
        }
    }

    pub fn report(message_id: impl Into<String>, code: u16, comment: impl Into<String>) -> Self {
        Self {
            method: ChunkMethod::Report,
            message_id: message_id.into(),
            content_type: None,
            data: Bytes::new(),
            headers: Vec::new(),
            status: Some(MsrpStatus {
                code,
                comment: comment.into(),
            }),
        }
    }

    pub fn add_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.headers.push((name.into(), value.into()));
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Hop-by-hop transaction response to a sent chunk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionResponse {
    pub code: u16,
    pub comment: String,
}

impl TransactionResponse {
    pub fn new(code: u16, comment: impl Into<String>) -> Self {
        Self {
            code,
            comment: comment.into(),
        }
    }
}

/// Called once with the transaction response of a sent chunk
pub type ResponseCallback = Box<dyn FnOnce(TransactionResponse) + Send + 'static>;

/// What the transport delivers for inbound traffic
pub type IncomingChunk = Result<MsrpChunk, TransportError>;

/// Relay the connector should go through
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelaySettings {
    pub domain: String,
    pub username: String,
    pub password: Option<String>,
    /// Explicit relay host; discovered from `domain` when absent
    pub host: Option<String>,
    pub port: Option<u16>,
    pub use_tls: bool,
}

/// A whole file handed to the transport in one go
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingFile {
    /// Id the transport must use for the file's chunks; assigned by the
    /// session when not set
    pub message_id: Option<String>,
    pub data: Bytes,
    pub size: u64,
    pub content_type: String,
    pub headers: Vec<(String, String)>,
}

impl OutgoingFile {
    pub fn new(data: Bytes, content_type: impl Into<String>) -> Self {
        Self {
            message_id: None,
            size: data.len() as u64,
            data,
            content_type: content_type.into(),
            headers: Vec::new(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_message_id(mut self, message_id: impl Into<String>) -> Self {
        self.message_id = Some(message_id.into());
        self
    }

    /// Value of header `name`, ignoring case
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Connection bootstrap object (connector or acceptor)
#[async_trait]
pub trait MsrpConnector: Send + Sync {
    /// Bind or reserve the local endpoint; returns the full local path,
    /// relays first, local URI last
    async fn prepare(&self, local_uri: MsrpUri) -> Result<Vec<MsrpUri>, TransportError>;

    /// Connect to (or accept from) the remote path
    async fn complete(
        &self,
        remote_path: Vec<MsrpUri>,
    ) -> Result<Box<dyn MsrpConnection>, TransportError>;

    /// Release whatever `prepare` reserved
    async fn cleanup(&self) -> Result<(), TransportError>;
}

/// An established MSRP connection
pub trait MsrpConnection: Send + Sync {
    fn local_path(&self) -> &[MsrpUri];

    fn remote_path(&self) -> &[MsrpUri];
}

/// Session layer over a ready connection
#[async_trait]
pub trait MsrpTransportSession: Send + Sync {
    /// Build a SEND chunk carrying `data`
    fn make_message(&self, data: Bytes, content_type: &str, message_id: &str) -> MsrpChunk {
        MsrpChunk::send(message_id, content_type, data)
    }

    /// Queue `chunk`; `on_response` runs once when its transaction completes
    fn send_chunk(&self, chunk: MsrpChunk, on_response: ResponseCallback) -> Result<(), TransportError>;

    fn send_file(&self, file: OutgoingFile) -> Result<(), TransportError>;

    async fn shutdown(&self) -> Result<(), TransportError>;
}

/// Factory side of the MSRP library
pub trait MsrpTransport: Send + Sync {
    fn connector(&self, relay: Option<RelaySettings>) -> Box<dyn MsrpConnector>;

    fn acceptor(&self, relay: Option<RelaySettings>) -> Box<dyn MsrpConnector>;

    /// Start a session over `connection`; inbound chunks and read errors are
    /// posted into `incoming`
    fn open_session(
        &self,
        connection: Box<dyn MsrpConnection>,
        accept_types: &[String],
        incoming: mpsc::UnboundedSender<IncomingChunk>,
    ) -> Result<Arc<dyn MsrpTransportSession>, TransportError>;
}
