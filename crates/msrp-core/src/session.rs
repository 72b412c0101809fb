//! Message session: queueing, CPIM wrapping and delivery tracking
//!
//! A [`MessageSession`] is created with the stream and is usable right away.
//! Messages submitted before the connection is up are queued and flushed in
//! submission order once [`MessageSession::start`] runs; after that they are
//! dispatched immediately. Transport callbacks only hold a weak reference, so
//! they become no-ops once the stream is dropped.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Weak};

use bytes::Bytes;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::cpim::{self, CpimMessage, CPIM_CONTENT_TYPE};
use crate::error::{MsrpError, MsrpResult};
use crate::events::{EventEmitter, FailureContext, StreamEvent};
use crate::mime::contains_mime_type;
use crate::negotiator::NegotiatedConnection;
use crate::sdp::StreamDirection;
use crate::transport::{
    ChunkMethod, IncomingChunk, MsrpChunk, MsrpConnector, MsrpTransport, MsrpTransportSession,
    OutgoingFile, TransactionResponse, HEADER_FAILURE_REPORT, HEADER_SUCCESS_REPORT,
};

/// `Failure-Report` header value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureReport {
    Yes,
    No,
    Partial,
}

impl FailureReport {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureReport::Yes => "yes",
            FailureReport::No => "no",
            FailureReport::Partial => "partial",
        }
    }

    pub fn from_header(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "yes" => Some(FailureReport::Yes),
            "no" => Some(FailureReport::No),
            "partial" => Some(FailureReport::Partial),
            _ => None,
        }
    }
}

/// `Success-Report` header value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuccessReport {
    Yes,
    No,
}

impl SuccessReport {
    pub fn as_str(&self) -> &'static str {
        match self {
            SuccessReport::Yes => "yes",
            SuccessReport::No => "no",
        }
    }

    pub fn from_header(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "yes" => Some(SuccessReport::Yes),
            "no" => Some(SuccessReport::No),
            _ => None,
        }
    }
}

/// Reports a sent message may still receive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ReportPolicy {
    failure: FailureReport,
    success: SuccessReport,
}

impl ReportPolicy {
    /// Absent headers mean `Failure-Report: yes` and `Success-Report: no`
    fn new(failure: Option<FailureReport>, success: Option<SuccessReport>) -> Self {
        Self {
            failure: failure.unwrap_or(FailureReport::Yes),
            success: success.unwrap_or(SuccessReport::No),
        }
    }

    /// Whether a 200 transaction response is the last word on the message
    fn settled_by_success_response(&self) -> bool {
        self.success == SuccessReport::No
            && matches!(self.failure, FailureReport::No | FailureReport::Partial)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageSessionState {
    /// Submissions are queued
    Uninitialized,
    /// Submissions go straight to the transport
    Ready,
    Ended,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MessageKind {
    /// Sent exactly as given
    Raw,
    /// Wrapped in CPIM at dispatch time when the session negotiated it
    Chat,
}

/// A message waiting for the connection
#[derive(Debug, Clone)]
pub struct PendingMessage {
    pub message_id: String,
    pub body: Bytes,
    pub content_type: String,
    pub failure_report: Option<FailureReport>,
    pub success_report: Option<SuccessReport>,
    pub recipient: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
    kind: MessageKind,
}

/// Settings fixed at stream creation
#[derive(Debug, Clone)]
pub struct MessageSessionConfig {
    pub direction: StreamDirection,
    /// Our SIP URI, used as the CPIM `From`
    pub local_identity: String,
    pub accept_types: Vec<String>,
}

struct Inner {
    state: MessageSessionState,
    remote_identity: Option<String>,
    queue: VecDeque<PendingMessage>,
    cpim_enabled: Option<bool>,
    session: Option<Arc<dyn MsrpTransportSession>>,
    /// Stays attached until the session is up so `end` can always release it
    connector: Option<Arc<dyn MsrpConnector>>,
    /// Sent messages that may still get a REPORT or a failed response
    in_flight: HashMap<String, ReportPolicy>,
    pump: Option<JoinHandle<()>>,
}

struct Shared {
    config: MessageSessionConfig,
    events: EventEmitter,
    inner: Mutex<Inner>,
}

/// Cloneable handle to the per-stream message state
#[derive(Clone)]
pub struct MessageSession {
    shared: Arc<Shared>,
}

fn new_message_id() -> String {
    format!("{:x}", rand::random::<u64>())
}

impl MessageSession {
    pub fn new(config: MessageSessionConfig, events: EventEmitter) -> Self {
        Self {
            shared: Arc::new(Shared {
                config,
                events,
                inner: Mutex::new(Inner {
                    state: MessageSessionState::Uninitialized,
                    remote_identity: None,
                    queue: VecDeque::new(),
                    cpim_enabled: None,
                    session: None,
                    connector: None,
                    in_flight: HashMap::new(),
                    pump: None,
                }),
            }),
        }
    }

    fn from_shared(shared: Arc<Shared>) -> Self {
        Self { shared }
    }

    fn downgrade(&self) -> Weak<Shared> {
        Arc::downgrade(&self.shared)
    }

    pub fn direction(&self) -> StreamDirection {
        self.shared.config.direction
    }

    pub fn events(&self) -> &EventEmitter {
        &self.shared.events
    }

    pub fn state(&self) -> MessageSessionState {
        self.shared.inner.lock().state
    }

    /// `None` until the session starts
    pub fn cpim_enabled(&self) -> Option<bool> {
        self.shared.inner.lock().cpim_enabled
    }

    pub fn queued(&self) -> usize {
        self.shared.inner.lock().queue.len()
    }

    pub fn in_flight(&self) -> usize {
        self.shared.inner.lock().in_flight.len()
    }

    pub fn remote_identity(&self) -> Option<String> {
        self.shared.inner.lock().remote_identity.clone()
    }

    /// Default recipient, the peer of the call
    pub fn set_remote_identity(&self, identity: impl Into<String>) {
        self.shared.inner.lock().remote_identity = Some(identity.into());
    }

    pub(crate) fn attach_connector(&self, connector: Box<dyn MsrpConnector>) {
        self.shared.inner.lock().connector = Some(Arc::from(connector));
    }

    /// Connector reserved by `initialize`, left attached
    pub(crate) fn connector(&self) -> Option<Arc<dyn MsrpConnector>> {
        self.shared.inner.lock().connector.clone()
    }

    fn check_startable(inner: &Inner) -> MsrpResult<()> {
        if inner.state == MessageSessionState::Ended {
            return Err(MsrpError::invalid_state("stream has ended"));
        }
        if inner.session.is_some() {
            return Err(MsrpError::invalid_state("session already started"));
        }
        Ok(())
    }

    /// Open the transport session over a completed connection and flush the queue.
    ///
    /// If the stream was ended meanwhile, the new session is shut down again
    /// and an `InvalidState` error is returned.
    pub async fn start(
        &self,
        transport: &dyn MsrpTransport,
        negotiated: NegotiatedConnection,
    ) -> MsrpResult<()> {
        Self::check_startable(&self.shared.inner.lock())?;

        let (incoming_tx, incoming_rx) = mpsc::unbounded_channel();
        let session = transport.open_session(
            negotiated.connection,
            &self.shared.config.accept_types,
            incoming_tx,
        )?;

        let cpim = contains_mime_type(&self.shared.config.accept_types, CPIM_CONTENT_TYPE)
            && contains_mime_type(&negotiated.remote_accept_types, CPIM_CONTENT_TYPE);
        let pump = self.spawn_incoming_pump(incoming_rx);
        let installed = {
            let mut inner = self.shared.inner.lock();
            let startable = Self::check_startable(&inner);
            if startable.is_ok() {
                inner.session = Some(Arc::clone(&session));
                inner.cpim_enabled = Some(cpim);
                inner.pump = Some(pump);
                // The connection owns the endpoint from here on
                inner.connector = None;
            } else {
                pump.abort();
            }
            startable
        };
        if let Err(e) = installed {
            debug!(error = %e, "Stream changed while starting, closing the new session");
            if let Err(e) = session.shutdown().await {
                debug!(error = %e, "Shutdown of unused session");
            }
            return Err(e);
        }

        info!(cpim, queued = self.queued(), "MSRP session started");
        self.shared.events.emit(StreamEvent::Started);
        self.drain_queue();
        Ok(())
    }

    fn spawn_incoming_pump(&self, mut incoming: mpsc::UnboundedReceiver<IncomingChunk>) -> JoinHandle<()> {
        let weak = self.downgrade();
        tokio::spawn(async move {
            while let Some(item) = incoming.recv().await {
                let Some(shared) = weak.upgrade() else {
                    break;
                };
                MessageSession::from_shared(shared).handle_incoming(item).await;
            }
        })
    }

    /// Flush queued messages in order, then switch to direct dispatch
    fn drain_queue(&self) {
        loop {
            let next = {
                let mut inner = self.shared.inner.lock();
                let next = inner.queue.pop_front();
                if next.is_none()
                    && inner.session.is_some()
                    && inner.state == MessageSessionState::Uninitialized
                {
                    inner.state = MessageSessionState::Ready;
                }
                next
            };
            let Some(message) = next else {
                break;
            };

            let message_id = message.message_id.clone();
            if let Err(e) = self.dispatch_pending(message) {
                warn!(message_id = %message_id, error = %e, "Queued message could not be sent");
                self.shared.events.emit(StreamEvent::MessageNotDelivered {
                    message_id,
                    code: e.delivery_status(),
                    reason: e.to_string(),
                });
            }
        }
    }

    fn check_can_send(&self) -> MsrpResult<()> {
        if self.direction().can_send() {
            Ok(())
        } else {
            Err(MsrpError::protocol(format!(
                "Cannot send message on {} stream",
                self.direction()
            )))
        }
    }

    fn check_content_type(&self, content_type: &str) -> MsrpResult<()> {
        if contains_mime_type(&self.shared.config.accept_types, content_type) {
            Ok(())
        } else {
            Err(MsrpError::protocol(format!(
                "Invalid content_type for outgoing message: {}",
                content_type
            )))
        }
    }

    /// Queue the message, or hand it back when it can go out right away
    fn enqueue_or_take(&self, message: PendingMessage) -> MsrpResult<Option<PendingMessage>> {
        let mut inner = self.shared.inner.lock();
        match inner.state {
            MessageSessionState::Ended => Err(MsrpError::invalid_state("stream has ended")),
            MessageSessionState::Ready => Ok(Some(message)),
            MessageSessionState::Uninitialized => {
                debug!(message_id = %message.message_id, "Queueing message until the session starts");
                inner.queue.push_back(message);
                Ok(None)
            }
        }
    }

    /// Send `body` as-is; returns the message id
    pub fn send_raw_message(
        &self,
        body: impl Into<Bytes>,
        content_type: &str,
        failure_report: Option<FailureReport>,
        success_report: Option<SuccessReport>,
    ) -> MsrpResult<String> {
        self.check_can_send()?;
        self.check_content_type(content_type)?;

        let message = PendingMessage {
            message_id: new_message_id(),
            body: body.into(),
            content_type: content_type.to_string(),
            failure_report,
            success_report,
            recipient: None,
            timestamp: None,
            kind: MessageKind::Raw,
        };
        let message_id = message.message_id.clone();
        if let Some(message) = self.enqueue_or_take(message)? {
            self.dispatch_pending(message)?;
        }
        Ok(message_id)
    }

    /// Send a chat message, wrapped in CPIM when the session uses it.
    ///
    /// `recipient` other than the peer is only possible with CPIM.
    pub fn send_message(
        &self,
        content: impl Into<String>,
        content_type: &str,
        recipient: Option<&str>,
        timestamp: Option<DateTime<Utc>>,
    ) -> MsrpResult<String> {
        self.check_can_send()?;
        if let Some(recipient) = recipient {
            let local_cpim = contains_mime_type(&self.shared.config.accept_types, CPIM_CONTENT_TYPE);
            let (cpim, remote) = {
                let inner = self.shared.inner.lock();
                (inner.cpim_enabled, inner.remote_identity.clone())
            };
            let private = remote.as_deref() != Some(recipient);
            if private && (!local_cpim || cpim == Some(false)) {
                return Err(private_messages_unavailable());
            }
        }

        let message = PendingMessage {
            message_id: new_message_id(),
            body: Bytes::from(content.into()),
            content_type: content_type.to_string(),
            failure_report: None,
            success_report: None,
            recipient: recipient.map(str::to_string),
            timestamp,
            kind: MessageKind::Chat,
        };
        let message_id = message.message_id.clone();
        if let Some(message) = self.enqueue_or_take(message)? {
            self.dispatch_pending(message)?;
        }
        Ok(message_id)
    }

    /// Hand a file to the transport; the stream must be started.
    ///
    /// Returns the message id its delivery reports will carry.
    pub fn send_file(&self, mut file: OutgoingFile) -> MsrpResult<String> {
        self.check_can_send()?;
        let session = self.current_session()?;

        let message_id = file.message_id.clone().unwrap_or_else(new_message_id);
        file.message_id = Some(message_id.clone());
        let policy = ReportPolicy::new(
            file.header(HEADER_FAILURE_REPORT).and_then(FailureReport::from_header),
            file.header(HEADER_SUCCESS_REPORT).and_then(SuccessReport::from_header),
        );
        self.shared
            .inner
            .lock()
            .in_flight
            .insert(message_id.clone(), policy);

        debug!(message_id = %message_id, size = file.size, content_type = %file.content_type, "Sending file");
        if let Err(e) = session.send_file(file) {
            self.shared.inner.lock().in_flight.remove(&message_id);
            return Err(e.into());
        }
        Ok(message_id)
    }

    fn current_session(&self) -> MsrpResult<Arc<dyn MsrpTransportSession>> {
        let inner = self.shared.inner.lock();
        match (&inner.session, inner.state) {
            (_, MessageSessionState::Ended) => Err(MsrpError::invalid_state("stream has ended")),
            (Some(session), _) => Ok(Arc::clone(session)),
            (None, _) => Err(MsrpError::invalid_state("stream is not started")),
        }
    }

    fn dispatch_pending(&self, message: PendingMessage) -> MsrpResult<()> {
        match message.kind {
            MessageKind::Raw => self.dispatch(
                message.message_id,
                message.body,
                &message.content_type,
                message.failure_report,
                message.success_report,
            ),
            MessageKind::Chat => self.dispatch_chat(message),
        }
    }

    fn dispatch_chat(&self, message: PendingMessage) -> MsrpResult<()> {
        let (cpim, remote) = {
            let inner = self.shared.inner.lock();
            (inner.cpim_enabled.unwrap_or(false), inner.remote_identity.clone())
        };

        if cpim {
            let to = message
                .recipient
                .or(remote)
                .ok_or_else(|| MsrpError::invalid_state("remote identity is unknown"))?;
            let envelope = CpimMessage::new(
                String::from_utf8_lossy(&message.body),
                &message.content_type,
                &self.shared.config.local_identity,
                to,
                message.timestamp.unwrap_or_else(Utc::now),
            );
            return self.dispatch(
                message.message_id,
                Bytes::from(envelope.to_string()),
                CPIM_CONTENT_TYPE,
                Some(FailureReport::Partial),
                Some(SuccessReport::Yes),
            );
        }

        if let Some(recipient) = &message.recipient {
            if remote.as_deref() != Some(recipient.as_str()) {
                return Err(private_messages_unavailable());
            }
        }
        self.check_content_type(&message.content_type)?;
        self.dispatch(message.message_id, message.body, &message.content_type, None, None)
    }

    fn dispatch(
        &self,
        message_id: String,
        body: Bytes,
        content_type: &str,
        failure_report: Option<FailureReport>,
        success_report: Option<SuccessReport>,
    ) -> MsrpResult<()> {
        let session = self.current_session()?;
        let mut chunk = session.make_message(body, content_type, &message_id);
        if let Some(report) = failure_report {
            chunk.add_header(HEADER_FAILURE_REPORT, report.as_str());
        }
        if let Some(report) = success_report {
            chunk.add_header(HEADER_SUCCESS_REPORT, report.as_str());
        }

        // Tracked before sending since the callback may run synchronously
        self.shared
            .inner
            .lock()
            .in_flight
            .insert(message_id.clone(), ReportPolicy::new(failure_report, success_report));

        let weak = self.downgrade();
        let response_id = message_id.clone();
        let sent = session.send_chunk(
            chunk,
            Box::new(move |response| {
                if let Some(shared) = weak.upgrade() {
                    MessageSession::from_shared(shared).on_transaction_response(&response_id, response);
                }
            }),
        );
        if let Err(e) = sent {
            self.shared.inner.lock().in_flight.remove(&message_id);
            return Err(e.into());
        }

        debug!(message_id = %message_id, content_type, "Message sent");
        Ok(())
    }

    fn on_transaction_response(&self, message_id: &str, response: TransactionResponse) {
        let tracked = {
            let mut inner = self.shared.inner.lock();
            match inner.in_flight.get(message_id).copied() {
                None => false,
                Some(policy) => {
                    if response.code != 200 || policy.settled_by_success_response() {
                        inner.in_flight.remove(message_id);
                    }
                    true
                }
            }
        };
        if !tracked {
            debug!(message_id, code = response.code, "Transaction response for unknown message");
            return;
        }
        if response.code != 200 {
            warn!(message_id, code = response.code, comment = %response.comment, "Message rejected");
            self.shared.events.emit(StreamEvent::MessageNotDelivered {
                message_id: message_id.to_string(),
                code: response.code,
                reason: response.comment,
            });
        }
    }

    /// React to one item from the transport's inbound queue
    pub async fn handle_incoming(&self, item: IncomingChunk) {
        match item {
            Err(e) if e.is_clean_disconnect() => {
                info!("MSRP connection closed by peer");
                if let Err(e) = self.close(false).await {
                    debug!(error = %e, "Teardown after peer disconnect");
                }
            }
            Err(e) => {
                warn!(error = %e, "MSRP read error");
                self.shared.events.emit(StreamEvent::Failed {
                    context: FailureContext::Reading,
                    reason: e.to_string(),
                });
            }
            Ok(chunk) => match chunk.method {
                ChunkMethod::Report => self.on_report(chunk),
                ChunkMethod::Send => self.on_send(chunk),
            },
        }
    }

    fn on_report(&self, chunk: MsrpChunk) {
        let Some(status) = chunk.status else {
            debug!(message_id = %chunk.message_id, "REPORT without status");
            return;
        };
        if self.shared.inner.lock().in_flight.remove(&chunk.message_id).is_none() {
            debug!(message_id = %chunk.message_id, "REPORT for unknown message");
            return;
        }

        let event = if status.code == 200 {
            StreamEvent::MessageDelivered {
                message_id: chunk.message_id,
            }
        } else {
            StreamEvent::MessageNotDelivered {
                message_id: chunk.message_id,
                code: status.code,
                reason: status.comment,
            }
        };
        self.shared.events.emit(event);
    }

    fn on_send(&self, chunk: MsrpChunk) {
        if self.direction() == StreamDirection::SendOnly {
            debug!(message_id = %chunk.message_id, "Discarding incoming message on sendonly stream");
            return;
        }

        let content_type = chunk.content_type.unwrap_or_else(|| "text/plain".to_string());
        let event = if content_type.eq_ignore_ascii_case(CPIM_CONTENT_TYPE) {
            match cpim::parse(&chunk.data) {
                Ok(parsed) => StreamEvent::MessageReceived {
                    content: Bytes::from(parsed.content),
                    content_type: parsed.content_type,
                    headers: parsed.headers,
                },
                Err(e) => {
                    warn!(message_id = %chunk.message_id, error = %e, "Dropping malformed CPIM message");
                    return;
                }
            }
        } else {
            StreamEvent::MessageReceived {
                content: chunk.data,
                content_type,
                headers: Vec::new(),
            }
        };
        self.shared.events.emit(event);
    }

    /// Tear the session down; calling it again is a no-op
    pub async fn end(&self) -> MsrpResult<()> {
        self.close(true).await
    }

    async fn close(&self, announce: bool) -> MsrpResult<()> {
        let (session, connector, pump) = {
            let mut inner = self.shared.inner.lock();
            if inner.session.is_none() && inner.connector.is_none() {
                return Ok(());
            }
            inner.state = MessageSessionState::Ended;
            inner.queue.clear();
            inner.in_flight.clear();
            (inner.session.take(), inner.connector.take(), inner.pump.take())
        };

        if announce {
            info!("Ending MSRP stream");
            self.shared.events.emit(StreamEvent::WillEnd);
        }

        let mut result = Ok(());
        if let Some(session) = session {
            if let Err(e) = session.shutdown().await {
                warn!(error = %e, "MSRP session shutdown failed");
                result = Err(e.into());
            }
        }
        if let Some(connector) = connector {
            if let Err(e) = connector.cleanup().await {
                warn!(error = %e, "MSRP connector cleanup failed");
                if result.is_ok() {
                    result = Err(e.into());
                }
            }
        }
        if let Some(pump) = pump {
            pump.abort();
        }

        self.shared.events.emit(StreamEvent::Ended);
        result
    }
}

fn private_messages_unavailable() -> MsrpError {
    MsrpError::protocol("Private messages are not available, because CPIM wrapper is not used")
}

impl Drop for Shared {
    fn drop(&mut self) {
        if let Some(pump) = self.inner.get_mut().pump.take() {
            pump.abort();
        }
    }
}
