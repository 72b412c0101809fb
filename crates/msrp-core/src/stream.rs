//! Media stream contract and the chat stream
//!
//! A stream goes through `initialize` (local SDP), `validate_incoming` (for
//! offers we answer), `start` (remote SDP known) and `end`. Progress is
//! reported on the stream's [`EventEmitter`].

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tracing::debug;

use crate::config::MsrpClientConfig;
use crate::error::{MsrpError, MsrpResult};
use crate::events::{EventEmitter, FailureContext};
use crate::file_selector::FileSelector;
use crate::negotiator::{CallDirection, StreamDescriptor, StreamNegotiator};
use crate::sdp::{MediaDescription, StreamDirection};
use crate::session::{
    FailureReport, MessageSession, MessageSessionConfig, MessageSessionState, SuccessReport,
};
use crate::transport::{MsrpTransport, OutgoingFile};

/// Default capacity of a stream's event channel
pub const DEFAULT_EVENT_CAPACITY: usize = 1000;

/// The call a stream belongs to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallContext {
    pub direction: CallDirection,
    /// SIP URI of the peer, the default message recipient
    pub remote_uri: String,
}

impl CallContext {
    pub fn outgoing(remote_uri: impl Into<String>) -> Self {
        Self {
            direction: CallDirection::Outgoing,
            remote_uri: remote_uri.into(),
        }
    }

    pub fn incoming(remote_uri: impl Into<String>) -> Self {
        Self {
            direction: CallDirection::Incoming,
            remote_uri: remote_uri.into(),
        }
    }
}

/// A media stream negotiated through SDP offer/answer
#[async_trait]
pub trait MediaStream: Send + Sync {
    fn events(&self) -> &EventEmitter;

    /// Prepare the local endpoint and return the local media description
    async fn initialize(&self, call: &CallContext) -> MsrpResult<MediaDescription>;

    /// Media description produced by the last successful `initialize`
    fn local_media(&self) -> Option<MediaDescription>;

    /// Whether an offered media section can be answered by this stream
    fn validate_incoming(&self, remote: &MediaDescription) -> MsrpResult<bool>;

    /// Connect using the remote media description
    async fn start(&self, remote: &MediaDescription) -> MsrpResult<()>;

    async fn end(&self) -> MsrpResult<()>;
}

/// Bidirectional (by default) MSRP chat
pub struct ChatStream {
    negotiator: StreamNegotiator,
    session: MessageSession,
    transport: Arc<dyn MsrpTransport>,
    file_selector: Mutex<Option<FileSelector>>,
    local: Mutex<Option<StreamDescriptor>>,
}

impl ChatStream {
    pub fn new(config: MsrpClientConfig, transport: Arc<dyn MsrpTransport>) -> Self {
        Self::with_direction(config, StreamDirection::SendRecv, transport)
    }

    pub fn with_direction(
        config: MsrpClientConfig,
        direction: StreamDirection,
        transport: Arc<dyn MsrpTransport>,
    ) -> Self {
        let events = EventEmitter::new(DEFAULT_EVENT_CAPACITY);
        let session = MessageSession::new(
            MessageSessionConfig {
                direction,
                local_identity: config.account.uri(),
                accept_types: config.chat.accept_types.clone(),
            },
            events.clone(),
        );
        let negotiator = StreamNegotiator::new(config, direction, Arc::clone(&transport), events);
        Self {
            negotiator,
            session,
            transport,
            file_selector: Mutex::new(None),
            local: Mutex::new(None),
        }
    }

    pub fn direction(&self) -> StreamDirection {
        self.negotiator.direction()
    }

    pub fn session(&self) -> &MessageSession {
        &self.session
    }

    pub fn negotiator(&self) -> &StreamNegotiator {
        &self.negotiator
    }

    /// Local descriptor from the last successful `initialize`
    pub fn descriptor(&self) -> Option<StreamDescriptor> {
        self.local.lock().clone()
    }

    pub fn file_selector(&self) -> Option<FileSelector> {
        self.file_selector.lock().clone()
    }

    /// Selector advertised by the next `initialize`
    pub fn set_file_selector(&self, selector: Option<FileSelector>) {
        *self.file_selector.lock() = selector;
    }

    pub fn send_message(
        &self,
        content: impl Into<String>,
        content_type: &str,
        recipient: Option<&str>,
        timestamp: Option<DateTime<Utc>>,
    ) -> MsrpResult<String> {
        self.session.send_message(content, content_type, recipient, timestamp)
    }

    pub fn send_raw_message(
        &self,
        body: impl Into<bytes::Bytes>,
        content_type: &str,
        failure_report: Option<FailureReport>,
        success_report: Option<SuccessReport>,
    ) -> MsrpResult<String> {
        self.session
            .send_raw_message(body, content_type, failure_report, success_report)
    }

    /// Returns the message id the file's delivery reports will carry
    pub fn send_file(&self, file: OutgoingFile) -> MsrpResult<String> {
        self.session.send_file(file)
    }

    /// Announce a start-phase failure
    pub(crate) fn fail_start(&self, error: MsrpError) -> MsrpError {
        self.negotiator.fail(FailureContext::Start, error)
    }
}

#[async_trait]
impl MediaStream for ChatStream {
    fn events(&self) -> &EventEmitter {
        self.session.events()
    }

    async fn initialize(&self, call: &CallContext) -> MsrpResult<MediaDescription> {
        let prepared = self
            .negotiator
            .prepare_local(call.direction, self.file_selector())
            .await?;
        self.session.set_remote_identity(call.remote_uri.clone());
        self.session.attach_connector(prepared.connector);
        let media = prepared.descriptor.to_media_description();
        *self.local.lock() = Some(prepared.descriptor);
        Ok(media)
    }

    fn local_media(&self) -> Option<MediaDescription> {
        self.local.lock().as_ref().map(StreamDescriptor::to_media_description)
    }

    fn validate_incoming(&self, remote: &MediaDescription) -> MsrpResult<bool> {
        Ok(self.negotiator.validate_incoming(remote))
    }

    async fn start(&self, remote: &MediaDescription) -> MsrpResult<()> {
        // The reservation stays with the session so `end` can release it
        // while the connection is still being completed
        let connector = self
            .session
            .connector()
            .ok_or_else(|| MsrpError::invalid_state("stream is not initialized"))?;
        let negotiated = self
            .negotiator
            .complete_negotiation(connector.as_ref(), remote)
            .await?;
        drop(connector);

        if let Err(e) = self.session.start(self.transport.as_ref(), negotiated).await {
            if self.session.state() == MessageSessionState::Ended {
                debug!("Chat stream ended before it started");
                return Err(e);
            }
            return Err(self.fail_start(e));
        }
        debug!("Chat stream started");
        Ok(())
    }

    async fn end(&self) -> MsrpResult<()> {
        self.session.end().await
    }
}
