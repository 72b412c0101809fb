//! Event system for MSRP media streams

use std::fmt;

use bytes::Bytes;
use tokio::sync::broadcast;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tracing::debug;

/// Phase a stream failure happened in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureContext {
    /// Relay selection and local path preparation
    Initialize,
    /// Reading the remote media description
    SdpNegotiation,
    /// Connecting and opening the session
    Start,
    /// Reading from an established connection
    Reading,
}

impl FailureContext {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureContext::Initialize => "initialize",
            FailureContext::SdpNegotiation => "sdp_negotiation",
            FailureContext::Start => "start",
            FailureContext::Reading => "reading",
        }
    }
}

impl fmt::Display for FailureContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Events emitted by a media stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// Local media description is ready
    Initialized,

    /// The connection is up and queued messages are being sent
    Started,

    /// Teardown began
    WillEnd,

    /// The stream is gone, either torn down locally or closed by the peer
    Ended,

    Failed {
        context: FailureContext,
        reason: String,
    },

    MessageDelivered {
        message_id: String,
    },

    MessageNotDelivered {
        message_id: String,
        code: u16,
        reason: String,
    },

    MessageReceived {
        content: Bytes,
        content_type: String,
        /// CPIM headers when the message came wrapped, empty otherwise
        headers: Vec<(String, String)>,
    },
}

impl StreamEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            StreamEvent::Initialized => "initialized",
            StreamEvent::Started => "started",
            StreamEvent::WillEnd => "will_end",
            StreamEvent::Ended => "ended",
            StreamEvent::Failed { .. } => "failed",
            StreamEvent::MessageDelivered { .. } => "message_delivered",
            StreamEvent::MessageNotDelivered { .. } => "message_not_delivered",
            StreamEvent::MessageReceived { .. } => "message_received",
        }
    }
}

/// Event stream type
pub type EventStream = BroadcastStream<StreamEvent>;

/// Simple event iterator that doesn't require StreamExt
pub struct EventIterator {
    stream: EventStream,
}

impl EventIterator {
    pub fn new(stream: EventStream) -> Self {
        Self { stream }
    }

    /// Get the next event (async); events a slow reader missed are skipped
    pub async fn next(&mut self) -> Option<StreamEvent> {
        use tokio_stream::StreamExt;
        loop {
            match self.stream.next().await? {
                Ok(event) => return Some(event),
                Err(BroadcastStreamRecvError::Lagged(missed)) => {
                    debug!(missed, "Event reader lagged behind");
                }
            }
        }
    }
}

/// Event emitter shared by the parts of one stream
#[derive(Clone)]
pub struct EventEmitter {
    sender: broadcast::Sender<StreamEvent>,
}

impl EventEmitter {
    /// Create a new event emitter with the specified capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn emit(&self, event: StreamEvent) {
        tracing::debug!(event = event.kind(), "Stream event");
        // Nobody listening is fine
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> EventStream {
        BroadcastStream::new(self.sender.subscribe())
    }

    pub fn subscribe_simple(&self) -> EventIterator {
        EventIterator::new(self.subscribe())
    }

    /// Plain broadcast receiver, handy for `try_recv` polling
    pub fn receiver(&self) -> broadcast::Receiver<StreamEvent> {
        self.sender.subscribe()
    }

    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventEmitter {
    fn default() -> Self {
        Self::new(1000)
    }
}

impl fmt::Debug for EventEmitter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventEmitter")
            .field("receivers", &self.receiver_count())
            .finish()
    }
}
