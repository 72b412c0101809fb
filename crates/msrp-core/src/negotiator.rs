//! SDP offer/answer handling for MSRP streams
//!
//! The negotiator decides whether a relay is used, reserves the local
//! endpoint, renders the local media description and, once the remote
//! description is known, completes the connection. Failures are announced as
//! [`StreamEvent::Failed`] with the phase they happened in and then returned
//! to the caller, which is expected to abort the call.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::config::{MsrpClientConfig, MsrpTransportKind};
use crate::error::{MsrpError, MsrpResult};
use crate::events::{EventEmitter, FailureContext, StreamEvent};
use crate::file_selector::FileSelector;
use crate::mime::parse_type_list;
use crate::sdp::{
    MediaDescription, SdpAttribute, StreamDirection, ATTR_ACCEPT_TYPES, ATTR_ACCEPT_WRAPPED_TYPES,
    ATTR_FILE_SELECTOR, ATTR_PATH, DEFAULT_MEDIA_PORT,
};
use crate::transport::{MsrpConnection, MsrpConnector, MsrpTransport, RelaySettings};
use crate::uri::{format_path, parse_path, MsrpUri};

/// Which side of the call this stream is on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallDirection {
    Outgoing,
    Incoming,
}

/// Local view of a negotiated stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamDescriptor {
    pub accept_types: Vec<String>,
    pub accept_wrapped_types: Vec<String>,
    /// Full local path, local endpoint last
    pub path: Vec<MsrpUri>,
    pub use_relay: bool,
    pub direction: StreamDirection,
    pub file_selector: Option<FileSelector>,
}

impl StreamDescriptor {
    /// The `m=message` section advertised to the peer
    pub fn to_media_description(&self) -> MediaDescription {
        let endpoint = self.path.last();
        let port = endpoint
            .and_then(MsrpUri::media_port)
            .unwrap_or(DEFAULT_MEDIA_PORT);
        let protocol = if endpoint.map_or(false, |uri| uri.use_tls) {
            "TCP/TLS/MSRP"
        } else {
            "TCP/MSRP"
        };

        let mut media = MediaDescription::new("message", port, protocol)
            .with_format("*")
            .with_attribute(SdpAttribute::new(ATTR_PATH, format_path(&self.path)));
        if self.direction != StreamDirection::SendRecv {
            media = media.with_attribute(SdpAttribute::flag(self.direction.as_str()));
        }
        media = media
            .with_attribute(SdpAttribute::new(ATTR_ACCEPT_TYPES, self.accept_types.join(" ")))
            .with_attribute(SdpAttribute::new(
                ATTR_ACCEPT_WRAPPED_TYPES,
                self.accept_wrapped_types.join(" "),
            ));
        if let Some(selector) = &self.file_selector {
            media = media.with_attribute(SdpAttribute::new(ATTR_FILE_SELECTOR, selector.format_sdp()));
        }
        media
    }
}

/// Result of [`StreamNegotiator::prepare_local`]
pub struct PreparedStream {
    pub descriptor: StreamDescriptor,
    /// Keeps the reserved endpoint until the connection completes or the stream ends
    pub connector: Box<dyn MsrpConnector>,
}

/// Result of [`StreamNegotiator::complete_negotiation`]
pub struct NegotiatedConnection {
    pub connection: Box<dyn MsrpConnection>,
    pub remote_path: Vec<MsrpUri>,
    pub remote_accept_types: Vec<String>,
    pub remote_accept_wrapped_types: Vec<String>,
}

pub struct StreamNegotiator {
    config: MsrpClientConfig,
    direction: StreamDirection,
    transport: Arc<dyn MsrpTransport>,
    events: EventEmitter,
}

impl StreamNegotiator {
    pub fn new(
        config: MsrpClientConfig,
        direction: StreamDirection,
        transport: Arc<dyn MsrpTransport>,
        events: EventEmitter,
    ) -> Self {
        Self {
            config,
            direction,
            transport,
            events,
        }
    }

    pub fn direction(&self) -> StreamDirection {
        self.direction
    }

    pub fn config(&self) -> &MsrpClientConfig {
        &self.config
    }

    /// Relay to use for a call in `call` direction and the resulting local transport.
    ///
    /// Without an explicit relay the relay is discovered from the account
    /// domain and TLS is forced.
    pub fn relay_for(&self, call: CallDirection) -> (Option<RelaySettings>, MsrpTransportKind) {
        let account = &self.config.account;
        let use_relay = match call {
            CallDirection::Outgoing => account.use_relay_for_outbound,
            CallDirection::Incoming => account.use_relay_for_inbound,
        };
        if !use_relay {
            return (None, self.config.msrp.transport);
        }

        let mut relay = RelaySettings {
            domain: account.domain().to_string(),
            username: account.username().to_string(),
            password: account.password.clone(),
            host: None,
            port: None,
            use_tls: true,
        };
        match &account.relay {
            None => (Some(relay), MsrpTransportKind::Tls),
            Some(explicit) => {
                relay.host = Some(explicit.host.clone());
                relay.port = Some(explicit.port);
                relay.use_tls = explicit.transport.is_tls();
                (Some(relay), explicit.transport)
            }
        }
    }

    /// Reserve the local endpoint and build the local description
    pub async fn prepare_local(
        &self,
        call: CallDirection,
        file_selector: Option<FileSelector>,
    ) -> MsrpResult<PreparedStream> {
        match self.try_prepare(call, file_selector).await {
            Ok(prepared) => {
                info!(
                    path = %format_path(&prepared.descriptor.path),
                    relay = prepared.descriptor.use_relay,
                    "MSRP stream initialized"
                );
                self.events.emit(StreamEvent::Initialized);
                Ok(prepared)
            }
            Err(e) => {
                warn!(error = %e, "MSRP stream initialization failed");
                self.events.emit(StreamEvent::Failed {
                    context: FailureContext::Initialize,
                    reason: e.to_string(),
                });
                Err(e)
            }
        }
    }

    async fn try_prepare(
        &self,
        call: CallDirection,
        file_selector: Option<FileSelector>,
    ) -> MsrpResult<PreparedStream> {
        let (relay, transport) = self.relay_for(call);
        let use_relay = relay.is_some();
        let connector = match call {
            CallDirection::Outgoing => self.transport.connector(relay),
            CallDirection::Incoming => self.transport.acceptor(relay),
        };

        let settings = &self.config.msrp;
        let local_uri = MsrpUri::local(settings.local_ip.to_string(), settings.local_port, transport.is_tls());
        debug!(local_uri = %local_uri, ?call, "Preparing local MSRP endpoint");

        let path = match connector.prepare(local_uri).await {
            Ok(path) if !path.is_empty() => path,
            outcome => {
                if let Err(e) = connector.cleanup().await {
                    debug!(error = %e, "Connector cleanup after failed prepare");
                }
                return Err(match outcome {
                    Err(e) => e.into(),
                    Ok(_) => MsrpError::negotiation("transport returned an empty local path"),
                });
            }
        };

        let descriptor = StreamDescriptor {
            accept_types: self.config.chat.accept_types.clone(),
            accept_wrapped_types: self.config.chat.accept_wrapped_types.clone(),
            path,
            use_relay,
            direction: self.direction,
            file_selector,
        };
        Ok(PreparedStream { descriptor, connector })
    }

    /// Whether an offered stream fits the local direction.
    ///
    /// The offer is written from the peer's side, so it is compared with our
    /// direction reversed rather than as-is: a `sendonly` offer is what a
    /// `recvonly` stream answers. Chat streams are `sendrecv` on both sides,
    /// where the two readings agree; only file transfers tell them apart.
    pub fn validate_incoming(&self, remote: &MediaDescription) -> bool {
        let offered = remote.direction();
        let acceptable = offered.reverse() == self.direction;
        if !acceptable {
            debug!(offered = %offered, local = %self.direction, "Rejecting offered MSRP stream");
        }
        acceptable
    }

    /// Read the remote description and connect to its path
    pub async fn complete_negotiation(
        &self,
        connector: &dyn MsrpConnector,
        remote: &MediaDescription,
    ) -> MsrpResult<NegotiatedConnection> {
        let (remote_path, remote_accept_types, remote_accept_wrapped_types) =
            match Self::read_remote(remote) {
                Ok(parts) => parts,
                Err(e) => return Err(self.fail(FailureContext::SdpNegotiation, e)),
            };

        debug!(remote_path = %format_path(&remote_path), "Completing MSRP connection");
        match connector.complete(remote_path.clone()).await {
            Ok(connection) => Ok(NegotiatedConnection {
                connection,
                remote_path,
                remote_accept_types,
                remote_accept_wrapped_types,
            }),
            Err(e) => Err(self.fail(FailureContext::Start, e.into())),
        }
    }

    fn read_remote(
        remote: &MediaDescription,
    ) -> MsrpResult<(Vec<MsrpUri>, Vec<String>, Vec<String>)> {
        let path = remote
            .attribute(ATTR_PATH)
            .ok_or_else(|| MsrpError::negotiation("remote SDP media does not have 'path' attribute"))?;
        let path = parse_path(path)
            .map_err(|e| MsrpError::negotiation(format!("invalid remote path: {}", e)))?;
        if path.is_empty() {
            return Err(MsrpError::negotiation("remote 'path' attribute is empty"));
        }

        let accept_types = remote
            .attribute(ATTR_ACCEPT_TYPES)
            .map(parse_type_list)
            .unwrap_or_default();
        let accept_wrapped_types = remote
            .attribute(ATTR_ACCEPT_WRAPPED_TYPES)
            .map(parse_type_list)
            .unwrap_or_default();
        Ok((path, accept_types, accept_wrapped_types))
    }

    /// Announce a failure and hand the error back
    pub(crate) fn fail(&self, context: FailureContext, error: MsrpError) -> MsrpError {
        warn!(context = %context, error = %error, "MSRP stream failed");
        self.events.emit(StreamEvent::Failed {
            context,
            reason: error.to_string(),
        });
        error
    }
}
