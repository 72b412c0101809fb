//! # MSRP Core - chat and file transfer media streams
//!
//! This crate implements the MSRP media streams of a SIP session:
//! - **Negotiation**: the local `m=message` description, relay selection and
//!   validation of offered streams ([`StreamNegotiator`])
//! - **Chat**: queued, optionally CPIM-wrapped messages with delivery
//!   reports ([`ChatStream`], [`MessageSession`])
//! - **File transfer**: `sendonly`/`recvonly` streams described by a
//!   `file-selector` ([`OutgoingFileStream`], [`IncomingFileStream`])
//!
//! The MSRP wire protocol is left to an [`MsrpTransport`] implementation.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use sipim_msrp_core::{
//!     CallContext, ChatStream, MediaDescription, MediaStream, MsrpClientConfig, MsrpTransport,
//!     StreamEvent,
//! };
//!
//! async fn chat(
//!     config: MsrpClientConfig,
//!     transport: Arc<dyn MsrpTransport>,
//!     answer: MediaDescription,
//! ) -> Result<(), Box<dyn std::error::Error>> {
//!     let stream = ChatStream::new(config, transport);
//!     let mut events = stream.events().subscribe_simple();
//!
//!     let offer = stream.initialize(&CallContext::outgoing("sip:bob@example.com")).await?;
//!     println!("{}", offer);
//!
//!     stream.send_message("Hello Bob", "text/plain", None, None)?;
//!     stream.start(&answer).await?;
//!
//!     while let Some(event) = events.next().await {
//!         if let StreamEvent::MessageReceived { content, .. } = event {
//!             println!("{}", String::from_utf8_lossy(&content));
//!             break;
//!         }
//!     }
//!     stream.end().await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod cpim;
pub mod error;
pub mod events;
pub mod file_selector;
pub mod file_transfer;
pub mod mime;
pub mod negotiator;
pub mod sdp;
pub mod session;
pub mod stream;
pub mod transport;
pub mod uri;

// Re-export main types
pub use config::{ChatSettings, MsrpAccount, MsrpClientConfig, MsrpSettings, MsrpTransportKind, RelayConfig};
pub use cpim::{CpimMessage, ParsedCpim, CPIM_CONTENT_TYPE};
pub use error::{MsrpError, MsrpResult, TransportError};
pub use events::{EventEmitter, EventIterator, EventStream, FailureContext, StreamEvent};
pub use file_selector::FileSelector;
pub use file_transfer::{IncomingFileStream, OutgoingFileStream};
pub use mime::contains_mime_type;
pub use negotiator::{
    CallDirection, NegotiatedConnection, PreparedStream, StreamDescriptor, StreamNegotiator,
};
pub use sdp::{MediaDescription, SdpAttribute, StreamDirection};
pub use session::{
    FailureReport, MessageSession, MessageSessionConfig, MessageSessionState, PendingMessage,
    SuccessReport,
};
pub use stream::{CallContext, ChatStream, MediaStream};
pub use transport::{
    ChunkMethod, IncomingChunk, MsrpChunk, MsrpConnection, MsrpConnector, MsrpStatus, MsrpTransport,
    MsrpTransportSession, OutgoingFile, RelaySettings, ResponseCallback, TransactionResponse,
};
pub use uri::MsrpUri;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
