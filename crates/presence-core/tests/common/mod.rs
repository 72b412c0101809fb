//! Mock collaborators shared by the subscription integration tests

#![allow(dead_code)]

use std::collections::VecDeque;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;

use sipim_presence_core::backoff::BackoffPolicy;
use sipim_presence_core::engine::{
    DialogEvent, DialogEventSender, DialogId, DialogState, Engine, Resolver, SipUri,
    SubscribeRequest, SubscriptionDialog,
};
use sipim_presence_core::error::{PresenceError, PresenceResult, ResolutionError};
use sipim_presence_core::events::{SubscriptionEvent, SubscriptionEventHandler};
use sipim_presence_core::route::{Route, TransportProtocol};
use sipim_presence_core::subscription::{SubscriptionConfig, SubscriptionInput, SubscriptionSession};
use sipim_presence_core::AccountConfig;

pub fn route(last_octet: u8) -> Route {
    Route::new(
        IpAddr::V4(Ipv4Addr::new(192, 0, 2, last_octet)),
        5060,
        TransportProtocol::Udp,
    )
}

/// Resolver answering from a script; once the script is used up it keeps
/// returning the fallback result
pub struct StaticResolver {
    script: Mutex<VecDeque<Result<Vec<Route>, ResolutionError>>>,
    fallback: Result<Vec<Route>, ResolutionError>,
    lookups: Mutex<Vec<SipUri>>,
}

impl StaticResolver {
    pub fn new(script: Vec<Result<Vec<Route>, ResolutionError>>) -> Self {
        let fallback = script.last().cloned().unwrap_or_else(|| Ok(vec![route(1)]));
        Self {
            script: Mutex::new(script.into()),
            fallback,
            lookups: Mutex::new(Vec::new()),
        }
    }

    pub fn routes(routes: Vec<Route>) -> Self {
        Self::new(vec![Ok(routes)])
    }

    pub fn lookups(&self) -> Vec<SipUri> {
        self.lookups.lock().unwrap().clone()
    }
}

#[async_trait]
impl Resolver for StaticResolver {
    async fn lookup_routes(
        &self,
        target: &SipUri,
        _transports: &[TransportProtocol],
    ) -> Result<Vec<Route>, ResolutionError> {
        self.lookups.lock().unwrap().push(target.clone());
        let next = self.script.lock().unwrap().pop_front();
        next.unwrap_or_else(|| self.fallback.clone())
    }
}

/// How the mock engine reacts on its own
#[derive(Debug, Clone, Default)]
pub struct EngineBehavior {
    /// State reported right after `subscribe()`
    pub on_subscribe: Option<DialogState>,
    /// Status of the termination reported right after `unsubscribe()`
    pub on_unsubscribe: Option<u16>,
    /// Make `create_subscription` fail with this error
    pub create_error: Option<PresenceError>,
}

#[derive(Default)]
struct EngineLog {
    requests: Vec<SubscribeRequest>,
    senders: Vec<(DialogId, DialogEventSender)>,
    unsubscribed: Vec<DialogId>,
}

/// Engine recording every SUBSCRIBE it is asked for
pub struct MockEngine {
    behavior: EngineBehavior,
    log: Arc<Mutex<EngineLog>>,
}

impl MockEngine {
    pub fn new() -> Self {
        Self::with_behavior(EngineBehavior::default())
    }

    pub fn with_behavior(behavior: EngineBehavior) -> Self {
        Self {
            behavior,
            log: Arc::new(Mutex::new(EngineLog::default())),
        }
    }

    pub fn requests(&self) -> Vec<SubscribeRequest> {
        self.log.lock().unwrap().requests.clone()
    }

    pub fn dialog_ids(&self) -> Vec<DialogId> {
        self.log.lock().unwrap().requests.iter().map(|r| r.dialog_id).collect()
    }

    pub fn last_dialog_id(&self) -> DialogId {
        *self.dialog_ids().last().expect("no dialog created yet")
    }

    pub fn unsubscribed(&self) -> Vec<DialogId> {
        self.log.lock().unwrap().unsubscribed.clone()
    }

    /// Report an event as the engine would
    pub fn report(&self, event: DialogEvent) {
        let log = self.log.lock().unwrap();
        let (_, sender) = log
            .senders
            .iter()
            .find(|(id, _)| *id == event.dialog_id)
            .expect("unknown dialog");
        sender.send(event);
    }

    pub fn report_state(&self, dialog_id: DialogId, state: DialogState) {
        self.report(DialogEvent::state(dialog_id, state));
    }

    pub fn report_terminated(&self, dialog_id: DialogId, code: u16, reason: &str) {
        self.report(DialogEvent::terminated(dialog_id, Some(code), Some(reason.to_string())));
    }
}

#[async_trait]
impl Engine for MockEngine {
    fn create_subscription(
        &self,
        request: SubscribeRequest,
        events: DialogEventSender,
    ) -> PresenceResult<Box<dyn SubscriptionDialog>> {
        if let Some(error) = &self.behavior.create_error {
            return Err(error.clone());
        }

        let dialog = MockDialog {
            id: request.dialog_id,
            route: request.route.clone(),
            events: events.clone(),
            behavior: self.behavior.clone(),
            log: Arc::clone(&self.log),
        };
        let mut log = self.log.lock().unwrap();
        log.senders.push((request.dialog_id, events));
        log.requests.push(request);
        Ok(Box::new(dialog))
    }
}

struct MockDialog {
    id: DialogId,
    route: Route,
    events: DialogEventSender,
    behavior: EngineBehavior,
    log: Arc<Mutex<EngineLog>>,
}

#[async_trait]
impl SubscriptionDialog for MockDialog {
    fn id(&self) -> DialogId {
        self.id
    }

    fn route(&self) -> &Route {
        &self.route
    }

    async fn subscribe(&self) -> PresenceResult<()> {
        if let Some(state) = self.behavior.on_subscribe {
            self.events.send(DialogEvent::state(self.id, state));
        }
        Ok(())
    }

    async fn unsubscribe(&self) -> PresenceResult<()> {
        self.log.lock().unwrap().unsubscribed.push(self.id);
        if let Some(code) = self.behavior.on_unsubscribe {
            self.events
                .send(DialogEvent::terminated(self.id, Some(code), Some("OK".to_string())));
        }
        Ok(())
    }
}

/// Handler keeping every event it sees
#[derive(Default)]
pub struct RecordingHandler {
    events: Mutex<Vec<SubscriptionEvent>>,
}

impl RecordingHandler {
    pub fn events(&self) -> Vec<SubscriptionEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn count(&self, kind: &str) -> usize {
        self.events().iter().filter(|e| e.kind() == kind).count()
    }

    pub fn last(&self) -> Option<SubscriptionEvent> {
        self.events().last().cloned()
    }
}

#[async_trait]
impl SubscriptionEventHandler for RecordingHandler {
    async fn on_subscription_event(&self, event: SubscriptionEvent) {
        self.events.lock().unwrap().push(event);
    }
}

pub fn account() -> AccountConfig {
    AccountConfig::new("alice@example.com").with_password("secret")
}

pub fn target() -> SipUri {
    "sip:alice-buddies@example.com".parse().unwrap()
}

/// A session wired to mocks, driven one input at a time
pub struct Harness {
    pub session: SubscriptionSession,
    pub inputs: mpsc::UnboundedReceiver<SubscriptionInput>,
    pub resolver: Arc<StaticResolver>,
    pub engine: Arc<MockEngine>,
    pub handler: Arc<RecordingHandler>,
}

impl Harness {
    pub fn new(resolver: StaticResolver, engine: MockEngine) -> Self {
        Self::with_config(SubscriptionConfig::new(account(), target()), resolver, engine)
    }

    pub fn with_config(config: SubscriptionConfig, resolver: StaticResolver, engine: MockEngine) -> Self {
        let resolver = Arc::new(resolver);
        let engine = Arc::new(engine);
        let handler = Arc::new(RecordingHandler::default());
        let backoff = BackoffPolicy::with_seed(config.retry.clone(), 0x5eed);
        let (session, inputs) = SubscriptionSession::with_backoff(
            config,
            resolver.clone(),
            engine.clone(),
            handler.clone(),
            backoff,
        );
        Self {
            session,
            inputs,
            resolver,
            engine,
            handler,
        }
    }

    /// Handle the next queued input, waiting for it if necessary
    pub async fn pump(&mut self) {
        let input = self.inputs.recv().await.expect("input channel closed");
        self.session.handle_input(input).await;
    }

    /// Start the session and handle the first resolution result
    pub async fn start_and_resolve(&mut self) {
        self.session.start().await.unwrap();
        self.pump().await;
    }
}
