//! Presence subscription lifecycle
//!
//! [`SubscriptionSession`] owns one logical SUBSCRIBE dialog against a
//! resource list server. It resolves routes, subscribes on the first one,
//! fails over to the remaining routes while the attempt window is open, and
//! falls back to a randomized exponential backoff otherwise. Authentication
//! failures (401/403/407) end the session for good.
//!
//! All inputs (resolution results, dialog events, retry timers, stop
//! requests) flow through one queue and are handled one at a time.

mod session;
mod state;

pub use session::{
    SubscriptionConfig, SubscriptionHandle, SubscriptionInput, SubscriptionOutcome,
    SubscriptionSession, ACCEPTED_NOTIFY_TYPES, PRESENCE_EVENT,
};
pub use state::SubscriptionState;
