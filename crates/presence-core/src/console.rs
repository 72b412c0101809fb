//! Human-readable rendering of subscription events
//!
//! [`ConsoleRenderer`] is a [`SubscriptionEventHandler`] that turns each
//! event into one line (NOTIFY bodies span several) and pushes it onto an
//! output queue. Whoever owns the receiving end decides where the lines go.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::events::{SubscriptionEvent, SubscriptionEventHandler};

/// Text for one event, `None` for events that are not shown
pub fn render(event: &SubscriptionEvent) -> Option<String> {
    let line = match event {
        SubscriptionEvent::Started { target } => {
            format!("Subscribing to {} for the presence event", target)
        }
        SubscriptionEvent::ResolutionFailed { error, .. } => format!("DNS lookup failed: {}", error),
        SubscriptionEvent::Succeeded { route } => format!("Subscription succeeded at {}", route),
        SubscriptionEvent::Pending { route } => format!("Subscription is pending at {}", route),
        SubscriptionEvent::Unsubscribed { route, code, reason } => {
            let status = match (code, reason) {
                (Some(code), Some(reason)) => format!(": {} {}", code, reason),
                (Some(code), None) => format!(": {}", code),
                (None, _) => String::new(),
            };
            format!("Unsubscribed from {}{}", route, status)
        }
        SubscriptionEvent::FailingOver { route, .. } => format!("Retrying subscription at {}", route),
        SubscriptionEvent::RetryScheduled { delay, .. } => {
            format!("Resubscribing in {:.1} seconds", delay.as_secs_f64())
        }
        SubscriptionEvent::NotifyReceived { body, .. } => format!("Received NOTIFY:\n{}", body),
        SubscriptionEvent::Stopped { .. } => return None,
    };
    Some(line)
}

/// Renders events onto an unbounded line queue
#[derive(Debug, Clone)]
pub struct ConsoleRenderer {
    output: mpsc::UnboundedSender<String>,
}

impl ConsoleRenderer {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<String>) {
        let (output, lines) = mpsc::unbounded_channel();
        (Self { output }, lines)
    }

    /// Render into an existing queue
    pub fn with_output(output: mpsc::UnboundedSender<String>) -> Self {
        Self { output }
    }
}

#[async_trait]
impl SubscriptionEventHandler for ConsoleRenderer {
    async fn on_subscription_event(&self, event: SubscriptionEvent) {
        if let Some(line) = render(&event) {
            if self.output.send(line).is_err() {
                tracing::debug!(event = event.kind(), "Console output closed, dropping line");
            }
        }
    }
}
