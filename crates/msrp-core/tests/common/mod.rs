//! Mock MSRP transport shared by the stream integration tests

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{broadcast, mpsc};

use sipim_msrp_core::sdp::{MediaDescription, SdpAttribute, ATTR_ACCEPT_TYPES, ATTR_PATH};
use sipim_msrp_core::transport::{
    IncomingChunk, MsrpChunk, MsrpConnection, MsrpConnector, MsrpTransport, MsrpTransportSession,
    OutgoingFile, RelaySettings, ResponseCallback, TransactionResponse,
};
use sipim_msrp_core::{
    MsrpAccount, MsrpClientConfig, MsrpUri, StreamEvent, TransportError,
};

/// Port the mock binds local endpoints to
pub const BOUND_PORT: u16 = 7654;

/// Which factory produced a connector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectorKind {
    Connector,
    Acceptor,
}

/// Failures and replies the mock transport produces on its own
#[derive(Debug, Clone, Default)]
pub struct TransportBehavior {
    pub prepare_error: Option<TransportError>,
    pub complete_error: Option<TransportError>,
    /// How long connecting to the remote path takes
    pub complete_delay: Option<Duration>,
    pub open_error: Option<TransportError>,
    pub send_error: Option<TransportError>,
    pub shutdown_error: Option<TransportError>,
    /// Answer every chunk right away with this code; otherwise the test answers
    pub auto_response: Option<u16>,
}

#[derive(Default)]
pub struct TransportLog {
    pub connectors: Vec<(ConnectorKind, Option<RelaySettings>)>,
    pub prepared: Vec<MsrpUri>,
    pub completed: Vec<Vec<MsrpUri>>,
    pub session_accept_types: Vec<Vec<String>>,
    pub chunks: Vec<MsrpChunk>,
    pub files: Vec<OutgoingFile>,
    pub pending_responses: Vec<(String, ResponseCallback)>,
    pub incoming: Option<mpsc::UnboundedSender<IncomingChunk>>,
    pub shutdowns: usize,
    pub cleanups: usize,
}

#[derive(Clone, Default)]
pub struct MockTransport {
    behavior: TransportBehavior,
    log: Arc<Mutex<TransportLog>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_behavior(behavior: TransportBehavior) -> Self {
        Self {
            behavior,
            log: Arc::default(),
        }
    }

    pub fn connectors(&self) -> Vec<(ConnectorKind, Option<RelaySettings>)> {
        self.log.lock().unwrap().connectors.clone()
    }

    pub fn completed(&self) -> Vec<Vec<MsrpUri>> {
        self.log.lock().unwrap().completed.clone()
    }

    pub fn session_accept_types(&self) -> Vec<Vec<String>> {
        self.log.lock().unwrap().session_accept_types.clone()
    }

    pub fn chunks(&self) -> Vec<MsrpChunk> {
        self.log.lock().unwrap().chunks.clone()
    }

    pub fn files(&self) -> Vec<OutgoingFile> {
        self.log.lock().unwrap().files.clone()
    }

    pub fn shutdowns(&self) -> usize {
        self.log.lock().unwrap().shutdowns
    }

    pub fn cleanups(&self) -> usize {
        self.log.lock().unwrap().cleanups
    }

    /// Complete the transaction of a sent chunk
    pub fn respond(&self, message_id: &str, code: u16, comment: &str) {
        let callback = {
            let mut log = self.log.lock().unwrap();
            let index = log
                .pending_responses
                .iter()
                .position(|(id, _)| id == message_id)
                .expect("no pending transaction for message");
            log.pending_responses.remove(index).1
        };
        callback(TransactionResponse::new(code, comment));
    }

    /// Deliver an item as if it came from the peer
    pub fn deliver(&self, item: IncomingChunk) {
        let log = self.log.lock().unwrap();
        let incoming = log.incoming.as_ref().expect("session not opened");
        incoming.send(item).expect("incoming pump gone");
    }
}

impl MsrpTransport for MockTransport {
    fn connector(&self, relay: Option<RelaySettings>) -> Box<dyn MsrpConnector> {
        self.make_connector(ConnectorKind::Connector, relay)
    }

    fn acceptor(&self, relay: Option<RelaySettings>) -> Box<dyn MsrpConnector> {
        self.make_connector(ConnectorKind::Acceptor, relay)
    }

    fn open_session(
        &self,
        _connection: Box<dyn MsrpConnection>,
        accept_types: &[String],
        incoming: mpsc::UnboundedSender<IncomingChunk>,
    ) -> Result<Arc<dyn MsrpTransportSession>, TransportError> {
        if let Some(error) = &self.behavior.open_error {
            return Err(error.clone());
        }
        let mut log = self.log.lock().unwrap();
        log.session_accept_types.push(accept_types.to_vec());
        log.incoming = Some(incoming);
        Ok(Arc::new(MockSession {
            behavior: self.behavior.clone(),
            log: Arc::clone(&self.log),
        }))
    }
}

impl MockTransport {
    fn make_connector(&self, kind: ConnectorKind, relay: Option<RelaySettings>) -> Box<dyn MsrpConnector> {
        self.log.lock().unwrap().connectors.push((kind, relay.clone()));
        Box::new(MockConnector {
            relay,
            behavior: self.behavior.clone(),
            log: Arc::clone(&self.log),
            local_path: Mutex::new(Vec::new()),
        })
    }
}

struct MockConnector {
    relay: Option<RelaySettings>,
    behavior: TransportBehavior,
    log: Arc<Mutex<TransportLog>>,
    local_path: Mutex<Vec<MsrpUri>>,
}

#[async_trait]
impl MsrpConnector for MockConnector {
    async fn prepare(&self, local_uri: MsrpUri) -> Result<Vec<MsrpUri>, TransportError> {
        self.log.lock().unwrap().prepared.push(local_uri.clone());
        if let Some(error) = &self.behavior.prepare_error {
            return Err(error.clone());
        }

        let mut path = Vec::new();
        if let Some(relay) = &self.relay {
            let host = relay.host.clone().unwrap_or_else(|| format!("msrp.{}", relay.domain));
            path.push(MsrpUri::new(host, relay.port.or(Some(2855)), true).with_session_id("r3l4y"));
        }
        path.push(MsrpUri {
            port: Some(BOUND_PORT),
            ..local_uri
        });
        *self.local_path.lock().unwrap() = path.clone();
        Ok(path)
    }

    async fn complete(&self, remote_path: Vec<MsrpUri>) -> Result<Box<dyn MsrpConnection>, TransportError> {
        self.log.lock().unwrap().completed.push(remote_path.clone());
        if let Some(delay) = self.behavior.complete_delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(error) = &self.behavior.complete_error {
            return Err(error.clone());
        }
        Ok(Box::new(MockConnection {
            local: self.local_path.lock().unwrap().clone(),
            remote: remote_path,
        }))
    }

    async fn cleanup(&self) -> Result<(), TransportError> {
        self.log.lock().unwrap().cleanups += 1;
        Ok(())
    }
}

struct MockConnection {
    local: Vec<MsrpUri>,
    remote: Vec<MsrpUri>,
}

impl MsrpConnection for MockConnection {
    fn local_path(&self) -> &[MsrpUri] {
        &self.local
    }

    fn remote_path(&self) -> &[MsrpUri] {
        &self.remote
    }
}

struct MockSession {
    behavior: TransportBehavior,
    log: Arc<Mutex<TransportLog>>,
}

#[async_trait]
impl MsrpTransportSession for MockSession {
    fn send_chunk(&self, chunk: MsrpChunk, on_response: ResponseCallback) -> Result<(), TransportError> {
        if let Some(error) = &self.behavior.send_error {
            return Err(error.clone());
        }
        let message_id = chunk.message_id.clone();
        {
            let mut log = self.log.lock().unwrap();
            log.chunks.push(chunk);
            if self.behavior.auto_response.is_none() {
                log.pending_responses.push((message_id, on_response));
                return Ok(());
            }
        }
        if let Some(code) = self.behavior.auto_response {
            on_response(TransactionResponse::new(code, "auto"));
        }
        Ok(())
    }

    fn send_file(&self, file: OutgoingFile) -> Result<(), TransportError> {
        if let Some(error) = &self.behavior.send_error {
            return Err(error.clone());
        }
        self.log.lock().unwrap().files.push(file);
        Ok(())
    }

    async fn shutdown(&self) -> Result<(), TransportError> {
        self.log.lock().unwrap().shutdowns += 1;
        match &self.behavior.shutdown_error {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }
}

pub fn config() -> MsrpClientConfig {
    MsrpClientConfig::new(MsrpAccount::new("alice@example.com").with_password("secret"))
}

pub const BOB: &str = "sip:bob@example.com";

/// Remote `m=message` section as a peer would answer
pub fn remote_media(accept_types: &str, direction: Option<&str>) -> MediaDescription {
    let mut media = MediaDescription::new("message", 9876, "TCP/MSRP")
        .with_format("*")
        .with_attribute(SdpAttribute::new(ATTR_PATH, "msrp://192.0.2.20:9876/bobsession;tcp"))
        .with_attribute(SdpAttribute::new(ATTR_ACCEPT_TYPES, accept_types));
    if let Some(direction) = direction {
        media = media.with_attribute(SdpAttribute::flag(direction));
    }
    media
}

/// Everything emitted so far
pub fn drain(events: &mut broadcast::Receiver<StreamEvent>) -> Vec<StreamEvent> {
    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push(event);
    }
    seen
}

pub fn kinds(events: &[StreamEvent]) -> Vec<&'static str> {
    events.iter().map(StreamEvent::kind).collect()
}

/// Wait for the next event, failing the test after a second
pub async fn next_event(events: &mut broadcast::Receiver<StreamEvent>) -> StreamEvent {
    tokio::time::timeout(Duration::from_secs(1), events.recv())
        .await
        .expect("no event within a second")
        .expect("event channel closed")
}
