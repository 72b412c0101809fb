//! Lifecycle events of a presence subscription
//!
//! Every state transition of a [`SubscriptionSession`](crate::subscription::SubscriptionSession)
//! produces one [`SubscriptionEvent`]. Events are handed to a
//! [`SubscriptionEventHandler`] in the order the transitions happen; the
//! session itself never renders anything.
//!
//! # Basic Event Handler
//!
//! ```rust
//! use sipim_presence_core::events::SubscriptionEventHandler;
//! use sipim_presence_core::route::Route;
//! use async_trait::async_trait;
//!
//! struct PrintingHandler;
//!
//! #[async_trait]
//! impl SubscriptionEventHandler for PrintingHandler {
//!     async fn on_subscription_succeeded(&self, route: &Route) {
//!         println!("subscribed via {}", route);
//!     }
//!
//!     async fn on_unsubscribed(&self, route: &Route, code: Option<u16>, reason: Option<&str>) {
//!         println!("unsubscribed from {} ({:?} {:?})", route, code, reason);
//!     }
//! }
//! ```

use std::time::Duration;

use async_trait::async_trait;

use crate::engine::SipUri;
use crate::error::ResolutionError;
use crate::route::Route;

/// Observable subscription lifecycle events
#[derive(Debug, Clone, PartialEq)]
pub enum SubscriptionEvent {
    /// The session started working on `target`
    Started { target: SipUri },

    /// Route lookup failed; a new lookup runs after `retry_in`
    ResolutionFailed {
        error: ResolutionError,
        retry_in: Duration,
    },

    /// The dialog became active
    Succeeded { route: Route },

    /// The server accepted the subscription but has not authorized it yet
    Pending { route: Route },

    /// The dialog on `route` terminated
    Unsubscribed {
        route: Route,
        code: Option<u16>,
        reason: Option<String>,
    },

    /// A termination was retried immediately on the next resolved route
    FailingOver { route: Route, remaining: usize },

    /// Routes are exhausted or the attempt window expired; a new resolution
    /// cycle runs after `delay`
    RetryScheduled { delay: Duration, wait: f64 },

    /// A NOTIFY with one of the accepted content types arrived
    NotifyReceived { content_type: String, body: String },

    /// The session is finished and will not retry anymore
    Stopped { success: bool },
}

impl SubscriptionEvent {
    /// Short name used in structured logs
    pub fn kind(&self) -> &'static str {
        match self {
            SubscriptionEvent::Started { .. } => "started",
            SubscriptionEvent::ResolutionFailed { .. } => "resolution_failed",
            SubscriptionEvent::Succeeded { .. } => "succeeded",
            SubscriptionEvent::Pending { .. } => "pending",
            SubscriptionEvent::Unsubscribed { .. } => "unsubscribed",
            SubscriptionEvent::FailingOver { .. } => "failing_over",
            SubscriptionEvent::RetryScheduled { .. } => "retry_scheduled",
            SubscriptionEvent::NotifyReceived { .. } => "notify_received",
            SubscriptionEvent::Stopped { .. } => "stopped",
        }
    }
}

/// Receiver of subscription lifecycle events.
///
/// Every method has an empty default so handlers only implement what they
/// render. [`on_subscription_event`](Self::on_subscription_event) is the entry
/// point the session calls; override it to see every event in one place.
#[async_trait]
pub trait SubscriptionEventHandler: Send + Sync {
    async fn on_started(&self, _target: &SipUri) {}

    async fn on_resolution_failed(&self, _error: &ResolutionError, _retry_in: Duration) {}

    async fn on_subscription_succeeded(&self, _route: &Route) {}

    async fn on_subscription_pending(&self, _route: &Route) {}

    async fn on_unsubscribed(&self, _route: &Route, _code: Option<u16>, _reason: Option<&str>) {}

    async fn on_failing_over(&self, _route: &Route, _remaining: usize) {}

    async fn on_retry_scheduled(&self, _delay: Duration, _wait: f64) {}

    async fn on_notify(&self, _content_type: &str, _body: &str) {}

    async fn on_stopped(&self, _success: bool) {}

    /// Dispatch one event to the matching handler method
    async fn on_subscription_event(&self, event: SubscriptionEvent) {
        match &event {
            SubscriptionEvent::Started { target } => self.on_started(target).await,
            SubscriptionEvent::ResolutionFailed { error, retry_in } => {
                self.on_resolution_failed(error, *retry_in).await
            }
            SubscriptionEvent::Succeeded { route } => self.on_subscription_succeeded(route).await,
            SubscriptionEvent::Pending { route } => self.on_subscription_pending(route).await,
            SubscriptionEvent::Unsubscribed { route, code, reason } => {
                self.on_unsubscribed(route, *code, reason.as_deref()).await
            }
            SubscriptionEvent::FailingOver { route, remaining } => {
                self.on_failing_over(route, *remaining).await
            }
            SubscriptionEvent::RetryScheduled { delay, wait } => {
                self.on_retry_scheduled(*delay, *wait).await
            }
            SubscriptionEvent::NotifyReceived { content_type, body } => {
                self.on_notify(content_type, body).await
            }
            SubscriptionEvent::Stopped { success } => self.on_stopped(*success).await,
        }
    }
}

/// Handler that ignores everything
pub struct NoopEventHandler;

#[async_trait]
impl SubscriptionEventHandler for NoopEventHandler {}
