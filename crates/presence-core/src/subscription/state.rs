//! Subscription lifecycle states

use std::fmt;

/// State of one logical SUBSCRIBE relationship
///
/// ```text
/// Idle -> Resolving -> Subscribing -> Pending/Active -> Terminating -> Terminated
///            ^  |                          |                              |
///            |  +-- lookup failed ---------+---- retryable termination ---+
///            +------------------------ backoff timer ---------------------+
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubscriptionState {
    Idle,
    Resolving,
    Subscribing,
    Pending,
    Active,
    Terminating,
    Terminated,
}

impl SubscriptionState {
    /// A dialog exists and the server has accepted it
    pub fn is_established(&self) -> bool {
        matches!(self, SubscriptionState::Pending | SubscriptionState::Active)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionState::Idle => "idle",
            SubscriptionState::Resolving => "resolving",
            SubscriptionState::Subscribing => "subscribing",
            SubscriptionState::Pending => "pending",
            SubscriptionState::Active => "active",
            SubscriptionState::Terminating => "terminating",
            SubscriptionState::Terminated => "terminated",
        }
    }
}

impl fmt::Display for SubscriptionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_established_states() {
        assert!(SubscriptionState::Pending.is_established());
        assert!(SubscriptionState::Active.is_established());
        assert!(!SubscriptionState::Subscribing.is_established());
        assert!(!SubscriptionState::Terminating.is_established());
    }
}
