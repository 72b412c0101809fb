//! SDP negotiation: relay selection, local media and failure reporting

mod common;

use std::sync::Arc;

use sipim_msrp_core::config::{MsrpSettings, MsrpTransportKind, RelayConfig};
use sipim_msrp_core::sdp::{MediaDescription, SdpAttribute, ATTR_ACCEPT_TYPES, ATTR_PATH};
use sipim_msrp_core::{
    CallContext, CallDirection, ChatStream, FailureContext, MediaStream, MsrpAccount,
    MsrpClientConfig, MsrpError, StreamDirection, StreamEvent, TransportError,
};

use common::*;

fn relay_account() -> MsrpAccount {
    MsrpAccount::new("alice@example.com")
        .with_password("secret")
        .with_relay_for_outbound(true)
}

#[tokio::test]
async fn test_direct_connection_media_line() {
    let transport = MockTransport::new();
    let stream = ChatStream::new(config(), Arc::new(transport.clone()));
    let mut events = stream.events().receiver();

    let media = stream.initialize(&CallContext::outgoing(BOB)).await.unwrap();

    assert_eq!(media.m_line(), format!("m=message {} TCP/MSRP *", BOUND_PORT));
    assert_eq!(media.attribute(ATTR_ACCEPT_TYPES), Some("message/cpim text/*"));
    assert_eq!(media.attribute("accept-wrapped-types"), Some("*"));
    assert!(media.attribute(ATTR_PATH).unwrap().starts_with("msrp://127.0.0.1:7654/"));
    assert_eq!(media.direction(), StreamDirection::SendRecv);
    assert!(!media.has_attribute("file-selector"));
    assert_eq!(stream.local_media(), Some(media));

    let connectors = transport.connectors();
    assert_eq!(connectors.len(), 1);
    assert_eq!(connectors[0], (ConnectorKind::Connector, None));
    assert_eq!(kinds(&drain(&mut events)), vec!["initialized"]);

    let descriptor = stream.descriptor().unwrap();
    assert!(!descriptor.use_relay);
    assert_eq!(descriptor.path.len(), 1);
}

#[tokio::test]
async fn test_discovered_relay_forces_tls() {
    let transport = MockTransport::new();
    let config = MsrpClientConfig::new(relay_account());
    let stream = ChatStream::new(config, Arc::new(transport.clone()));

    let media = stream.initialize(&CallContext::outgoing(BOB)).await.unwrap();

    let (kind, relay) = transport.connectors().pop().unwrap();
    assert_eq!(kind, ConnectorKind::Connector);
    let relay = relay.unwrap();
    assert_eq!(relay.domain, "example.com");
    assert_eq!(relay.username, "alice");
    assert_eq!(relay.password.as_deref(), Some("secret"));
    assert_eq!(relay.host, None);
    assert!(relay.use_tls);

    assert_eq!(media.m_line(), format!("m=message {} TCP/TLS/MSRP *", BOUND_PORT));
    let path = media.attribute(ATTR_PATH).unwrap();
    assert!(path.starts_with("msrps://msrp.example.com:2855/r3l4y;tcp msrps://127.0.0.1:7654/"));
    assert!(stream.descriptor().unwrap().use_relay);
}

#[tokio::test]
async fn test_explicit_relay_keeps_its_transport() {
    let transport = MockTransport::new();
    let account = relay_account().with_relay(RelayConfig {
        host: "relay.example.net".to_string(),
        port: 2856,
        transport: MsrpTransportKind::Tcp,
    });
    let stream = ChatStream::new(MsrpClientConfig::new(account), Arc::new(transport.clone()));

    let media = stream.initialize(&CallContext::outgoing(BOB)).await.unwrap();

    let relay = transport.connectors().pop().unwrap().1.unwrap();
    assert_eq!(relay.host.as_deref(), Some("relay.example.net"));
    assert_eq!(relay.port, Some(2856));
    assert!(!relay.use_tls);
    assert_eq!(media.m_line(), format!("m=message {} TCP/MSRP *", BOUND_PORT));
}

#[tokio::test]
async fn test_incoming_call_uses_acceptor_and_inbound_relay_flag() {
    let transport = MockTransport::new();
    let account = MsrpAccount::new("alice@example.com").with_relay_for_inbound(true);
    let stream = ChatStream::new(MsrpClientConfig::new(account), Arc::new(transport.clone()));

    stream.initialize(&CallContext::incoming(BOB)).await.unwrap();

    let (kind, relay) = transport.connectors().pop().unwrap();
    assert_eq!(kind, ConnectorKind::Acceptor);
    assert!(relay.is_some());
}

#[test]
fn test_relay_flags_follow_call_direction() {
    let stream = ChatStream::new(MsrpClientConfig::new(relay_account()), Arc::new(MockTransport::new()));
    let negotiator = stream.negotiator();

    let (outbound, _) = negotiator.relay_for(CallDirection::Outgoing);
    assert!(outbound.is_some());
    let (inbound, transport) = negotiator.relay_for(CallDirection::Incoming);
    assert!(inbound.is_none());
    assert_eq!(transport, MsrpTransportKind::Tcp);
}

#[tokio::test]
async fn test_tls_without_relay() {
    let transport = MockTransport::new();
    let config = config().with_msrp(MsrpSettings {
        transport: MsrpTransportKind::Tls,
        ..Default::default()
    });
    let stream = ChatStream::new(config, Arc::new(transport));

    let media = stream.initialize(&CallContext::outgoing(BOB)).await.unwrap();
    assert_eq!(media.m_line(), format!("m=message {} TCP/TLS/MSRP *", BOUND_PORT));
}

#[tokio::test]
async fn test_prepare_failure_reports_initialize() {
    let transport = MockTransport::with_behavior(TransportBehavior {
        prepare_error: Some(TransportError::io("address in use")),
        ..Default::default()
    });
    let stream = ChatStream::new(config(), Arc::new(transport.clone()));
    let mut events = stream.events().receiver();

    let err = stream.initialize(&CallContext::outgoing(BOB)).await.unwrap_err();
    assert!(matches!(err, MsrpError::Transport(_)));
    assert_eq!(
        drain(&mut events),
        vec![StreamEvent::Failed {
            context: FailureContext::Initialize,
            reason: "Transport error: I/O error: address in use".to_string(),
        }]
    );
    assert_eq!(transport.cleanups(), 1);
    assert_eq!(stream.local_media(), None);
}

#[tokio::test]
async fn test_remote_without_path_fails_negotiation() {
    let transport = MockTransport::new();
    let stream = ChatStream::new(config(), Arc::new(transport.clone()));
    stream.initialize(&CallContext::outgoing(BOB)).await.unwrap();
    let mut events = stream.events().receiver();

    let remote = MediaDescription::new("message", 9876, "TCP/MSRP")
        .with_format("*")
        .with_attribute(SdpAttribute::new(ATTR_ACCEPT_TYPES, "text/plain"));
    let err = stream.start(&remote).await.unwrap_err();

    assert!(matches!(err, MsrpError::Negotiation { .. }));
    match drain(&mut events).as_slice() {
        [StreamEvent::Failed { context, reason }] => {
            assert_eq!(*context, FailureContext::SdpNegotiation);
            assert!(reason.contains("does not have 'path' attribute"));
        }
        other => panic!("unexpected events {:?}", other),
    }
    assert!(transport.completed().is_empty());

    // The reservation is still released on end
    stream.end().await.unwrap();
    assert_eq!(transport.cleanups(), 1);
}

#[tokio::test]
async fn test_connect_failure_reports_start() {
    let transport = MockTransport::with_behavior(TransportBehavior {
        complete_error: Some(TransportError::io("connection refused")),
        ..Default::default()
    });
    let stream = ChatStream::new(config(), Arc::new(transport.clone()));
    stream.initialize(&CallContext::outgoing(BOB)).await.unwrap();
    let mut events = stream.events().receiver();

    assert!(stream.start(&remote_media("text/plain", None)).await.is_err());
    assert_eq!(
        drain(&mut events).pop().map(|e| e.kind()),
        Some("failed")
    );
    let completed = transport.completed();
    assert_eq!(completed.len(), 1);
    assert_eq!(completed[0][0].to_string(), "msrp://192.0.2.20:9876/bobsession;tcp");
}

#[tokio::test]
async fn test_session_open_failure_reports_start() {
    let transport = MockTransport::with_behavior(TransportBehavior {
        open_error: Some(TransportError::Closed),
        ..Default::default()
    });
    let stream = ChatStream::new(config(), Arc::new(transport.clone()));
    stream.initialize(&CallContext::outgoing(BOB)).await.unwrap();
    let mut events = stream.events().receiver();

    assert!(stream.start(&remote_media("text/plain", None)).await.is_err());
    match drain(&mut events).as_slice() {
        [StreamEvent::Failed { context, .. }] => assert_eq!(*context, FailureContext::Start),
        other => panic!("unexpected events {:?}", other),
    }

    stream.end().await.unwrap();
    assert_eq!(transport.cleanups(), 1);
}

#[tokio::test]
async fn test_start_before_initialize_is_rejected() {
    let stream = ChatStream::new(config(), Arc::new(MockTransport::new()));
    let err = stream.start(&remote_media("text/plain", None)).await.unwrap_err();
    assert!(matches!(err, MsrpError::InvalidState { .. }));
}

#[test]
fn test_validate_incoming_direction() {
    let transport: Arc<MockTransport> = Arc::new(MockTransport::new());
    let chat = ChatStream::new(config(), transport.clone());
    assert!(chat.validate_incoming(&remote_media("*", None)).unwrap());
    assert!(chat.validate_incoming(&remote_media("*", Some("sendrecv"))).unwrap());
    assert!(!chat.validate_incoming(&remote_media("*", Some("sendonly"))).unwrap());

    let receiver = ChatStream::with_direction(config(), StreamDirection::RecvOnly, transport);
    assert!(receiver.validate_incoming(&remote_media("*", Some("sendonly"))).unwrap());
    assert!(!receiver.validate_incoming(&remote_media("*", None)).unwrap());
}

#[test]
fn test_config_from_toml_defaults_inbound_relay() {
    let config = MsrpClientConfig::from_toml_str(
        r#"
        [account]
        identity = "alice@example.com"
        "#,
    )
    .unwrap();
    assert!(config.account.use_relay_for_inbound);
    assert!(!config.account.use_relay_for_outbound);
}
