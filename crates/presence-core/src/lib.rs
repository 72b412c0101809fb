//! # Presence Core - SIP presence subscriptions against a resource list server
//!
//! This crate keeps one long-lived SUBSCRIBE dialog for the `presence` event
//! alive on behalf of an account:
//! - **Route discovery**: routes come from a [`Resolver`] collaborator
//! - **Failover**: a failed dialog is retried immediately on the next route
//! - **Backoff**: exhausted routes or an expired attempt window trigger a
//!   randomized exponential backoff before the next lookup
//! - **Fatal failures**: 401, 403 and 407 end the subscription for good
//!
//! The SIP stack itself is an [`Engine`] collaborator; this crate never
//! touches sockets.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use sipim_presence_core::{
//!     setup_logging, ConsoleRenderer, Engine, PresenceClientConfig, Resolver,
//!     SubscriptionConfig, SubscriptionSession,
//! };
//!
//! async fn watch(
//!     config: PresenceClientConfig,
//!     engine: Arc<dyn Engine>,
//!     resolver: Arc<dyn Resolver>,
//! ) -> Result<i32, Box<dyn std::error::Error>> {
//!     setup_logging(&config.logging)?;
//!     let subscription = SubscriptionConfig::from_client_config(&config, engine.as_ref(), None, None)?;
//!     let (renderer, mut lines) = ConsoleRenderer::new();
//!     tokio::spawn(async move {
//!         while let Some(line) = lines.recv().await {
//!             println!("{}", line);
//!         }
//!     });
//!
//!     let (handle, task) = SubscriptionSession::spawn(subscription, resolver, engine, Arc::new(renderer));
//!     tokio::signal::ctrl_c().await?;
//!     handle.stop()?;
//!     Ok(task.await?.exit_code())
//! }
//! ```

pub mod backoff;
pub mod config;
pub mod console;
pub mod engine;
pub mod error;
pub mod events;
pub mod logging;
pub mod route;
pub mod subscription;
pub mod target;

// Re-export main types
pub use backoff::{BackoffPolicy, RetryContext};
pub use config::{
    AccountConfig, LogFormat, LogSettings, OutboundProxy, PresenceClientConfig, RetrySettings,
    SipSettings,
};
pub use console::ConsoleRenderer;
pub use engine::{
    DialogEvent, DialogEventKind, DialogEventSender, DialogId, DialogState, Engine, Resolver,
    SipUri, SubscribeRequest, SubscriptionDialog,
};
pub use error::{PresenceError, PresenceResult, ResolutionError};
pub use events::{NoopEventHandler, SubscriptionEvent, SubscriptionEventHandler};
pub use logging::{build_filter, parse_log_level, setup_logging};
pub use route::{Route, RouteSet, TransportProtocol};
pub use subscription::{
    SubscriptionConfig, SubscriptionHandle, SubscriptionInput, SubscriptionOutcome,
    SubscriptionSession, SubscriptionState,
};
pub use target::resolve_target;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
