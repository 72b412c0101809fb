//! The subscription state machine

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::backoff::{BackoffPolicy, RetryContext};
use crate::config::{AccountConfig, PresenceClientConfig, RetrySettings, SipSettings};
use crate::engine::{
    DialogEvent, DialogEventKind, DialogEventSender, DialogId, DialogState, Engine, Resolver,
    SipUri, SubscribeRequest, SubscriptionDialog,
};
use crate::error::{is_authentication_failure, PresenceError, PresenceResult, ResolutionError};
use crate::events::{SubscriptionEvent, SubscriptionEventHandler};
use crate::route::{Route, RouteSet, TransportProtocol};
use crate::target::{account_uri, proxy_uri, resolve_target};

use super::state::SubscriptionState;

/// Event package of every SUBSCRIBE sent by the session
pub const PRESENCE_EVENT: &str = "presence";

/// NOTIFY bodies the session asks for and passes on
pub const ACCEPTED_NOTIFY_TYPES: [&str; 3] = [
    "multipart/related",
    "application/rlmi+xml",
    "application/pidf+xml",
];

/// Everything that can drive a transition, in arrival order
#[derive(Debug)]
pub enum SubscriptionInput {
    /// A route lookup started by resolution attempt `attempt` finished
    ResolutionCompleted {
        attempt: u64,
        result: Result<Vec<Route>, ResolutionError>,
    },
    /// The engine reported something on a dialog
    Dialog(DialogEvent),
    /// A retry delay scheduled during attempt `attempt` elapsed
    RetryTimerFired { attempt: u64 },
    /// The user asked the session to end
    Stop,
}

/// Cloneable handle used to stop a running session
#[derive(Debug, Clone)]
pub struct SubscriptionHandle {
    inputs: mpsc::UnboundedSender<SubscriptionInput>,
}

impl SubscriptionHandle {
    /// Request a graceful stop.
    ///
    /// An established dialog is unsubscribed first; the session finishes
    /// once the engine reports the termination.
    pub fn stop(&self) -> PresenceResult<()> {
        self.inputs
            .send(SubscriptionInput::Stop)
            .map_err(|_| PresenceError::InvalidState {
                expected: "running".to_string(),
                actual: SubscriptionState::Terminated.to_string(),
            })
    }
}

/// Final result of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionOutcome {
    pub success: bool,
}

impl SubscriptionOutcome {
    /// Process exit status for this outcome
    pub fn exit_code(&self) -> i32 {
        if self.success {
            0
        } else {
            1
        }
    }
}

/// What to subscribe to and how
#[derive(Debug, Clone)]
pub struct SubscriptionConfig {
    pub account: AccountConfig,
    pub target: SipUri,
    pub transports: Vec<TransportProtocol>,
    pub retry: RetrySettings,
}

impl SubscriptionConfig {
    pub fn new(account: AccountConfig, target: SipUri) -> Self {
        Self {
            account,
            target,
            transports: SipSettings::default().transports,
            retry: RetrySettings::default(),
        }
    }

    pub fn with_transports(mut self, transports: Vec<TransportProtocol>) -> Self {
        self.transports = transports;
        self
    }

    pub fn with_retry(mut self, retry: RetrySettings) -> Self {
        self.retry = retry;
        self
    }

    /// Select the account and normalize the target from client configuration.
    ///
    /// Fails with the configuration errors that must abort startup, or with
    /// [`PresenceError::MalformedUri`] for an unusable target.
    pub fn from_client_config(
        config: &PresenceClientConfig,
        engine: &dyn Engine,
        account: Option<&str>,
        target: Option<&str>,
    ) -> PresenceResult<Self> {
        let account = config.select_account(account)?;
        let target = resolve_target(engine, account, target)?;
        Ok(Self {
            account: account.clone(),
            target,
            transports: config.sip.transports.clone(),
            retry: config.retry.clone(),
        })
    }
}

/// The dialog the session currently considers its own
struct CurrentDialog {
    id: DialogId,
    route: Route,
    dialog: Option<Box<dyn SubscriptionDialog>>,
    state: Option<DialogState>,
}

/// One logical presence subscription.
///
/// The session is driven by [`run`](Self::run), which handles one
/// [`SubscriptionInput`] at a time. Tests and embedders may instead call
/// [`start`](Self::start) and feed [`handle_input`](Self::handle_input)
/// themselves.
pub struct SubscriptionSession {
    config: SubscriptionConfig,
    resolver: Arc<dyn Resolver>,
    engine: Arc<dyn Engine>,
    handler: Arc<dyn SubscriptionEventHandler>,

    state: SubscriptionState,
    retry: RetryContext,
    backoff: BackoffPolicy,
    dialog: Option<CurrentDialog>,
    retry_timer: Option<JoinHandle<()>>,

    /// Bumped on every resolution start and at finish; older inputs are stale
    attempt: u64,
    stopping: bool,
    /// Also the "subscription succeeded" latch
    success: bool,

    inputs: mpsc::UnboundedSender<SubscriptionInput>,
}

impl SubscriptionSession {
    pub fn new(
        config: SubscriptionConfig,
        resolver: Arc<dyn Resolver>,
        engine: Arc<dyn Engine>,
        handler: Arc<dyn SubscriptionEventHandler>,
    ) -> (Self, mpsc::UnboundedReceiver<SubscriptionInput>) {
        let backoff = BackoffPolicy::new(config.retry.clone());
        Self::with_backoff(config, resolver, engine, handler, backoff)
    }

    /// Same as [`new`](Self::new) with an explicit (e.g. seeded) backoff policy
    pub fn with_backoff(
        config: SubscriptionConfig,
        resolver: Arc<dyn Resolver>,
        engine: Arc<dyn Engine>,
        handler: Arc<dyn SubscriptionEventHandler>,
        backoff: BackoffPolicy,
    ) -> (Self, mpsc::UnboundedReceiver<SubscriptionInput>) {
        let (inputs, receiver) = mpsc::unbounded_channel();
        let retry = RetryContext::new(backoff.settings(), Instant::now());
        let session = Self {
            config,
            resolver,
            engine,
            handler,
            state: SubscriptionState::Idle,
            retry,
            backoff,
            dialog: None,
            retry_timer: None,
            attempt: 0,
            stopping: false,
            success: false,
            inputs,
        };
        (session, receiver)
    }

    /// Start a session on its own task
    pub fn spawn(
        config: SubscriptionConfig,
        resolver: Arc<dyn Resolver>,
        engine: Arc<dyn Engine>,
        handler: Arc<dyn SubscriptionEventHandler>,
    ) -> (SubscriptionHandle, JoinHandle<SubscriptionOutcome>) {
        let (session, receiver) = Self::new(config, resolver, engine, handler);
        let handle = session.handle();
        let task = tokio::spawn(session.run(receiver));
        (handle, task)
    }

    pub fn handle(&self) -> SubscriptionHandle {
        SubscriptionHandle {
            inputs: self.inputs.clone(),
        }
    }

    pub fn config(&self) -> &SubscriptionConfig {
        &self.config
    }

    pub fn state(&self) -> SubscriptionState {
        self.state
    }

    pub fn retry_context(&self) -> &RetryContext {
        &self.retry
    }

    /// Route of the dialog currently in use
    pub fn current_route(&self) -> Option<&Route> {
        self.dialog.as_ref().map(|d| &d.route)
    }

    pub fn current_dialog_id(&self) -> Option<DialogId> {
        self.dialog.as_ref().map(|d| d.id)
    }

    pub fn is_finished(&self) -> bool {
        self.state == SubscriptionState::Terminated
    }

    pub fn outcome(&self) -> SubscriptionOutcome {
        SubscriptionOutcome {
            success: self.success,
        }
    }

    /// Start, then handle inputs until the session finishes
    pub async fn run(
        mut self,
        mut inputs: mpsc::UnboundedReceiver<SubscriptionInput>,
    ) -> SubscriptionOutcome {
        if let Err(e) = self.start().await {
            warn!(error = %e, "Presence subscription could not start");
            self.finish().await;
            return self.outcome();
        }

        while !self.is_finished() {
            match inputs.recv().await {
                Some(input) => self.handle_input(input).await,
                None => break,
            }
        }
        self.outcome()
    }

    /// Leave `Idle` and start the first route lookup
    pub async fn start(&mut self) -> PresenceResult<()> {
        if self.state != SubscriptionState::Idle {
            return Err(PresenceError::InvalidState {
                expected: SubscriptionState::Idle.to_string(),
                actual: self.state.to_string(),
            });
        }

        info!(
            account = %self.config.account.id,
            target = %self.config.target,
            "Starting presence subscription"
        );
        self.emit(SubscriptionEvent::Started {
            target: self.config.target.clone(),
        })
        .await;
        self.begin_resolution();
        Ok(())
    }

    /// Apply one input
    pub async fn handle_input(&mut self, input: SubscriptionInput) {
        if self.is_finished() {
            debug!(?input, "Session finished, ignoring input");
            return;
        }

        match input {
            SubscriptionInput::ResolutionCompleted { attempt, result } => {
                self.on_resolution_completed(attempt, result).await
            }
            SubscriptionInput::Dialog(event) => self.on_dialog_event(event).await,
            SubscriptionInput::RetryTimerFired { attempt } => self.on_retry_timer(attempt),
            SubscriptionInput::Stop => self.stop().await,
        }
    }

    fn set_state(&mut self, state: SubscriptionState) {
        if self.state != state {
            debug!(from = %self.state, to = %state, "Subscription state changed");
            self.state = state;
        }
    }

    async fn emit(&self, event: SubscriptionEvent) {
        debug!(event = event.kind(), "Subscription event");
        self.handler.on_subscription_event(event).await;
    }

    fn begin_resolution(&mut self) {
        self.attempt += 1;
        let attempt = self.attempt;
        self.set_state(SubscriptionState::Resolving);
        self.backoff.open_window(&mut self.retry, Instant::now());

        let lookup_target = match &self.config.account.outbound_proxy {
            Some(proxy) => proxy_uri(proxy),
            None => self.config.target.clone(),
        };
        debug!(attempt, target = %lookup_target, "Looking up routes");

        let resolver = Arc::clone(&self.resolver);
        let transports = self.config.transports.clone();
        let inputs = self.inputs.clone();
        tokio::spawn(async move {
            let result = resolver.lookup_routes(&lookup_target, &transports).await;
            let _ = inputs.send(SubscriptionInput::ResolutionCompleted { attempt, result });
        });
    }

    async fn on_resolution_completed(
        &mut self,
        attempt: u64,
        result: Result<Vec<Route>, ResolutionError>,
    ) {
        if attempt != self.attempt || self.state != SubscriptionState::Resolving || self.stopping {
            debug!(attempt, current = self.attempt, "Dropping stale resolution result");
            return;
        }

        let result = result.and_then(|routes| {
            if routes.is_empty() {
                Err(ResolutionError::NoRoutes {
                    target: self.config.target.to_string(),
                })
            } else {
                Ok(routes)
            }
        });

        match result {
            Err(error) => {
                let delay = self.backoff.resolution_retry_delay();
                warn!(error = %error, retry_in = ?delay, "Route lookup failed");
                self.emit(SubscriptionEvent::ResolutionFailed {
                    error,
                    retry_in: delay,
                })
                .await;
                self.schedule_retry(delay);
            }
            Ok(routes) => {
                debug!(count = routes.len(), "Routes resolved");
                self.retry.replace_routes(RouteSet::from(routes));
                match self.retry.pending_routes_mut().pop_next() {
                    Some(route) => self.subscribe_on(route).await,
                    None => self.back_off().await,
                }
            }
        }
    }

    async fn subscribe_on(&mut self, route: Route) {
        let dialog_id = DialogId::new();
        self.set_state(SubscriptionState::Subscribing);
        info!(dialog_id = %dialog_id, route = %route, "Subscribing");

        let account = &self.config.account;
        let request = SubscribeRequest {
            dialog_id,
            from: account_uri(account),
            password: account.password.clone(),
            target: self.config.target.clone(),
            event: PRESENCE_EVENT.to_string(),
            route: route.clone(),
            expires: account.subscribe_interval,
            accept: ACCEPTED_NOTIFY_TYPES.iter().map(|t| t.to_string()).collect(),
            extra_headers: vec![("Supported".to_string(), "eventlist".to_string())],
        };

        self.dialog = Some(CurrentDialog {
            id: dialog_id,
            route,
            dialog: None,
            state: None,
        });

        let events = DialogEventSender::new(self.inputs.clone());
        let result = match self.engine.create_subscription(request, events) {
            Ok(dialog) => {
                let subscribed = dialog.subscribe().await;
                if let Some(current) = self.dialog.as_mut() {
                    current.dialog = Some(dialog);
                }
                subscribed
            }
            Err(e) => Err(e),
        };

        // Reported like any other termination so it takes the same retry path
        if let Err(error) = result {
            warn!(dialog_id = %dialog_id, error = %error, "SUBSCRIBE could not be sent");
            let code = match &error {
                PresenceError::AuthenticationFailed { code, .. } => Some(*code),
                _ => None,
            };
            let _ = self.inputs.send(SubscriptionInput::Dialog(DialogEvent::terminated(
                dialog_id,
                code,
                Some(error.to_string()),
            )));
        }
    }

    async fn on_dialog_event(&mut self, event: DialogEvent) {
        let is_current = self
            .dialog
            .as_ref()
            .map_or(false, |current| current.id == event.dialog_id);
        if !is_current {
            debug!(dialog_id = %event.dialog_id, "Ignoring event for superseded dialog");
            return;
        }

        match event.kind {
            DialogEventKind::StateChanged { state, code, reason } => match state {
                DialogState::Active => self.on_dialog_active().await,
                DialogState::Pending => self.on_dialog_pending().await,
                DialogState::Terminated => self.on_dialog_terminated(code, reason).await,
            },
            DialogEventKind::Notify { content_type, body } => {
                let base = content_type.split(';').next().unwrap_or("").trim();
                if ACCEPTED_NOTIFY_TYPES
                    .iter()
                    .any(|accepted| accepted.eq_ignore_ascii_case(base))
                {
                    self.emit(SubscriptionEvent::NotifyReceived { content_type, body })
                        .await;
                } else {
                    debug!(content_type = %content_type, "Dropping NOTIFY with unexpected content type");
                }
            }
        }
    }

    /// Record the dialog state; returns the dialog's route
    fn mark_dialog(&mut self, state: DialogState) -> Option<Route> {
        let current = self.dialog.as_mut()?;
        current.state = Some(state);
        Some(current.route.clone())
    }

    async fn on_dialog_active(&mut self) {
        let Some(route) = self.mark_dialog(DialogState::Active) else {
            return;
        };
        if self.stopping {
            return;
        }

        self.set_state(SubscriptionState::Active);
        self.backoff.reset(&mut self.retry, Instant::now());
        if !self.success {
            self.success = true;
            info!(route = %route, "Subscription succeeded");
            self.emit(SubscriptionEvent::Succeeded { route }).await;
        }
    }

    async fn on_dialog_pending(&mut self) {
        let Some(route) = self.mark_dialog(DialogState::Pending) else {
            return;
        };
        if self.stopping {
            return;
        }

        self.set_state(SubscriptionState::Pending);
        self.backoff.reset(&mut self.retry, Instant::now());
        info!(route = %route, "Subscription is pending");
        self.emit(SubscriptionEvent::Pending { route }).await;
    }

    async fn on_dialog_terminated(&mut self, code: Option<u16>, reason: Option<String>) {
        let Some(current) = self.dialog.take() else {
            return;
        };
        let route = current.route;
        info!(route = %route, code = ?code, reason = ?reason, "Unsubscribed");
        self.emit(SubscriptionEvent::Unsubscribed {
            route,
            code,
            reason,
        })
        .await;

        if self.stopping {
            if code.map_or(false, |c| (200..300).contains(&c)) {
                self.success = true;
            }
            self.finish().await;
            return;
        }

        if let Some(code) = code.filter(|c| is_authentication_failure(*c)) {
            warn!(code, "Authentication failed, giving up");
            self.success = false;
            self.finish().await;
            return;
        }

        self.success = false;
        let next = if self.retry.should_back_off(Instant::now()) {
            None
        } else {
            self.retry.pending_routes_mut().pop_next()
        };

        match next {
            Some(route) => {
                let remaining = self.retry.pending_routes().len();
                info!(route = %route, remaining, "Failing over to next route");
                self.emit(SubscriptionEvent::FailingOver {
                    route: route.clone(),
                    remaining,
                })
                .await;
                self.subscribe_on(route).await;
            }
            None => self.back_off().await,
        }
    }

    async fn back_off(&mut self) {
        let delay = self.backoff.next_backoff(&mut self.retry);
        let wait = self.retry.current_wait();
        info!(wait, delay = ?delay, "Backing off before resubscribing");
        self.emit(SubscriptionEvent::RetryScheduled { delay, wait }).await;
        self.schedule_retry(delay);
    }

    /// Wait in `Resolving` for `delay`, then look routes up again
    fn schedule_retry(&mut self, delay: Duration) {
        self.cancel_retry_timer();
        self.set_state(SubscriptionState::Resolving);

        let attempt = self.attempt;
        let inputs = self.inputs.clone();
        self.retry_timer = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = inputs.send(SubscriptionInput::RetryTimerFired { attempt });
        }));
    }

    fn cancel_retry_timer(&mut self) {
        if let Some(timer) = self.retry_timer.take() {
            timer.abort();
        }
    }

    fn on_retry_timer(&mut self, attempt: u64) {
        if attempt != self.attempt || self.stopping {
            debug!(attempt, current = self.attempt, "Dropping stale retry timer");
            return;
        }
        self.retry_timer = None;
        self.begin_resolution();
    }

    async fn stop(&mut self) {
        if self.stopping {
            return;
        }
        self.stopping = true;
        self.cancel_retry_timer();

        let established = self.dialog.as_ref().and_then(|current| {
            match (current.state, current.dialog.as_ref()) {
                (Some(DialogState::Active | DialogState::Pending), Some(dialog)) => Some(dialog),
                _ => None,
            }
        });

        let Some(dialog) = established else {
            info!(state = %self.state, "Stopping presence subscription");
            self.dialog = None;
            self.finish().await;
            return;
        };

        info!(dialog_id = %dialog.id(), "Unsubscribing");
        let unsubscribed = dialog.unsubscribe().await;
        self.set_state(SubscriptionState::Terminating);
        if let Err(e) = unsubscribed {
            warn!(error = %e, "Unsubscribe failed");
            self.finish().await;
        }
    }

    async fn finish(&mut self) {
        if self.is_finished() {
            return;
        }
        self.cancel_retry_timer();
        self.attempt += 1;
        self.dialog = None;
        self.set_state(SubscriptionState::Terminated);
        info!(success = self.success, "Presence subscription stopped");
        self.emit(SubscriptionEvent::Stopped {
            success: self.success,
        })
        .await;
    }
}

impl Drop for SubscriptionSession {
    fn drop(&mut self) {
        self.cancel_retry_timer();
    }
}
