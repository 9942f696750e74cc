//! Host-side session controller: validates `play_ad` calls, creates the
//! isolated frame, drives the handshake, relays render host events to the
//! registered callbacks, and tears the session down exactly once.

mod callbacks;
mod session;

use std::sync::{Arc, Weak};
use std::time::Duration;

use frame_bus::{FrameBus, FrameMessage};
use parking_lot::{Mutex, RwLock};
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};
use vast_frame_proto::{EnvelopeCodec, Namespace, ProtocolMessage, Quartile};

pub use callbacks::{AdFailure, ErrorCallback, EventCallback, FailureKind};
pub use session::{Outcome, SessionState};

use crate::config::PlayerConfig;
use crate::frame::{BootstrapDocument, Container, FrameSpec, HOST_TOPIC, RenderFrame};
use crate::poll;
use crate::surface::Size;
use crate::telemetry::TARGET_CONTROLLER;
use crate::watchdog::Watchdog;
use callbacks::Callbacks;
use session::Session;

pub const INVALID_CONTAINER: &str = "Invalid container element";
pub const INVALID_SOURCE: &str = "Invalid VAST input";
pub const INVALID_DIMENSIONS: &str = "Invalid player dimensions";
pub const FRAME_UNADDRESSABLE: &str = "render context never became addressable";
pub const FRAME_WRITE_FAILED: &str = "Failed to write frame document";
pub const FRAME_APPEND_FAILED: &str = "Failed to create render frame";

#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("controller requires a Tokio runtime: {0}")]
    NoRuntime(String),
}

/// Plays one ad at a time inside an isolated frame. Owns its live session,
/// which is torn down when the controller is dropped. Callbacks that need to
/// reach back into the controller capture a [`ControllerHandle`].
pub struct AdFrameController {
    shared: Arc<Shared>,
}

struct Shared {
    bus: Arc<dyn FrameBus>,
    runtime: Handle,
    config: PlayerConfig,
    callbacks: RwLock<Callbacks>,
    slot: Mutex<Option<Session>>,
}

/// What a message asks of the controller once the slot lock is released.
enum Dispatch {
    Nothing,
    Impression,
    Quartile(Quartile),
    Success,
    Failure(AdFailure),
}

impl AdFrameController {
    /// Builds a controller bound to the current Tokio runtime.
    pub fn new(bus: Arc<dyn FrameBus>, config: PlayerConfig) -> Result<Self, ControllerError> {
        let runtime =
            Handle::try_current().map_err(|err| ControllerError::NoRuntime(err.to_string()))?;
        Ok(Self {
            shared: Arc::new(Shared {
                bus,
                runtime,
                config,
                callbacks: RwLock::new(Callbacks::default()),
                slot: Mutex::new(None),
            }),
        })
    }

    pub fn on_error<F>(&self, callback: F) -> &Self
    where
        F: Fn(&Namespace, &AdFailure) + Send + Sync + 'static,
    {
        self.shared.callbacks.write().error = Arc::new(callback);
        self
    }

    pub fn on_success<F>(&self, callback: F) -> &Self
    where
        F: Fn(&Namespace) + Send + Sync + 'static,
    {
        self.shared.callbacks.write().success = Arc::new(callback);
        self
    }

    pub fn on_impression<F>(&self, callback: F) -> &Self
    where
        F: Fn(&Namespace) + Send + Sync + 'static,
    {
        self.shared.callbacks.write().impression = Arc::new(callback);
        self
    }

    pub fn on_quartile<F>(&self, quartile: Quartile, callback: F) -> &Self
    where
        F: Fn(&Namespace) + Send + Sync + 'static,
    {
        self.shared
            .callbacks
            .write()
            .set_quartile(quartile, Arc::new(callback));
        self
    }

    pub fn on_q0<F>(&self, callback: F) -> &Self
    where
        F: Fn(&Namespace) + Send + Sync + 'static,
    {
        self.on_quartile(Quartile::Q0, callback)
    }

    pub fn on_q25<F>(&self, callback: F) -> &Self
    where
        F: Fn(&Namespace) + Send + Sync + 'static,
    {
        self.on_quartile(Quartile::Q25, callback)
    }

    pub fn on_q50<F>(&self, callback: F) -> &Self
    where
        F: Fn(&Namespace) + Send + Sync + 'static,
    {
        self.on_quartile(Quartile::Q50, callback)
    }

    pub fn on_q75<F>(&self, callback: F) -> &Self
    where
        F: Fn(&Namespace) + Send + Sync + 'static,
    {
        self.on_quartile(Quartile::Q75, callback)
    }

    pub fn on_q100<F>(&self, callback: F) -> &Self
    where
        F: Fn(&Namespace) + Send + Sync + 'static,
    {
        self.on_quartile(Quartile::Q100, callback)
    }

    /// Starts a session playing `ad_source` (an ad tag URL or an inline ad
    /// response) in a `width`x`height` frame appended to `container`.
    ///
    /// Invalid arguments are reported synchronously through the error
    /// callback and leave any live session alone. Otherwise the live session,
    /// if any, is torn down before the new frame is created. A zero
    /// `deadline` means no deadline. Returns the namespace minted for the
    /// call.
    pub fn play_ad(
        &self,
        ad_source: &str,
        container: Arc<dyn Container>,
        width: u32,
        height: u32,
        deadline: Option<Duration>,
    ) -> Namespace {
        self.shared
            .play_ad(ad_source, container, width, height, deadline)
    }

    /// Namespace of the live session.
    pub fn namespace(&self) -> Option<Namespace> {
        self.shared.namespace()
    }

    /// State of the live session. Sessions leave the slot right after their
    /// terminal callback returns.
    pub fn state(&self) -> Option<SessionState> {
        self.shared.state()
    }

    pub fn watchdog_armed(&self) -> bool {
        self.shared.watchdog_armed()
    }

    /// Whether the live session's render host reported its document loaded.
    pub fn render_host_loaded(&self) -> bool {
        self.shared.render_host_loaded()
    }

    /// Tears down the live session without invoking any callback.
    pub fn shutdown(&self) {
        self.shared.shutdown();
    }

    /// Non-owning handle for use inside callbacks. It never keeps the
    /// controller or its live session alive.
    pub fn handle(&self) -> ControllerHandle {
        ControllerHandle {
            shared: Arc::downgrade(&self.shared),
        }
    }
}

impl Drop for AdFrameController {
    fn drop(&mut self) {
        self.shared.shutdown();
    }
}

/// Weak reference to an [`AdFrameController`]. Every call is a no-op once
/// the controller has been dropped.
#[derive(Clone)]
pub struct ControllerHandle {
    shared: Weak<Shared>,
}

impl ControllerHandle {
    pub fn is_alive(&self) -> bool {
        self.shared.strong_count() > 0
    }

    /// Same as [`AdFrameController::play_ad`]; `None` when the controller
    /// is gone.
    pub fn play_ad(
        &self,
        ad_source: &str,
        container: Arc<dyn Container>,
        width: u32,
        height: u32,
        deadline: Option<Duration>,
    ) -> Option<Namespace> {
        let shared = self.shared.upgrade()?;
        Some(shared.play_ad(ad_source, container, width, height, deadline))
    }

    pub fn namespace(&self) -> Option<Namespace> {
        self.shared.upgrade().and_then(|shared| shared.namespace())
    }

    pub fn state(&self) -> Option<SessionState> {
        self.shared.upgrade().and_then(|shared| shared.state())
    }

    pub fn watchdog_armed(&self) -> bool {
        self.shared
            .upgrade()
            .is_some_and(|shared| shared.watchdog_armed())
    }

    pub fn shutdown(&self) {
        if let Some(shared) = self.shared.upgrade() {
            shared.shutdown();
        }
    }
}

impl Shared {
    fn play_ad(
        self: &Arc<Self>,
        ad_source: &str,
        container: Arc<dyn Container>,
        width: u32,
        height: u32,
        deadline: Option<Duration>,
    ) -> Namespace {
        let namespace = Namespace::generate();
        if let Err(failure) = validate(ad_source, container.as_ref(), width, height) {
            warn!(
                target: TARGET_CONTROLLER,
                namespace = %namespace,
                error = %failure,
                "play_ad rejected"
            );
            let callback = self.callbacks.read().error.clone();
            callback(&namespace, &failure);
            return namespace;
        }
        let deadline = deadline.filter(|deadline| !deadline.is_zero());

        let mut slot = self.slot.lock();
        if let Some(mut previous) = slot.take() {
            info!(
                target: TARGET_CONTROLLER,
                namespace = %previous.namespace(),
                state = previous.state.as_str(),
                "preempting live session"
            );
            previous.teardown();
        }

        let mut session = Session::new(namespace.clone(), ad_source, deadline);
        session.listener = Some(self.spawn_listener(namespace.clone()));
        if let Some(deadline) = deadline {
            let weak = Arc::downgrade(self);
            let expired = namespace.clone();
            session.watchdog = Some(Watchdog::arm(&self.runtime, deadline, move || {
                if let Some(shared) = weak.upgrade() {
                    shared.expire(&expired);
                }
            }));
        }

        let mut early_failure = None;
        match container.append_frame(FrameSpec::player(Size::new(width, height))) {
            Ok(frame) => {
                session.frame = Some(frame.clone());
                session.transition(SessionState::AwaitingHandshake);
                session.construction = Some(self.spawn_construction(
                    namespace.clone(),
                    frame,
                    deadline.unwrap_or(self.config.readiness_ceiling),
                ));
            }
            Err(err) => {
                warn!(target: TARGET_CONTROLLER, namespace = %namespace, error = %err, "frame creation failed");
                early_failure = Some(AdFailure::new(
                    FailureKind::BootstrapFailure,
                    FRAME_APPEND_FAILED,
                ));
            }
        }
        info!(
            target: TARGET_CONTROLLER,
            namespace = %namespace,
            width,
            height,
            deadline = ?deadline,
            "ad session started"
        );
        *slot = Some(session);
        drop(slot);

        if let Some(failure) = early_failure {
            self.fail(&namespace, failure);
        }
        namespace
    }

    fn namespace(&self) -> Option<Namespace> {
        self.slot
            .lock()
            .as_ref()
            .map(|session| session.namespace().clone())
    }

    fn state(&self) -> Option<SessionState> {
        self.slot.lock().as_ref().map(|session| session.state)
    }

    fn watchdog_armed(&self) -> bool {
        self.slot
            .lock()
            .as_ref()
            .is_some_and(|session| session.watchdog_armed())
    }

    fn render_host_loaded(&self) -> bool {
        self.slot
            .lock()
            .as_ref()
            .is_some_and(|session| session.saw_load)
    }

    fn shutdown(&self) {
        let session = self.slot.lock().take();
        if let Some(mut session) = session {
            info!(target: TARGET_CONTROLLER, namespace = %session.namespace(), "ad session shut down");
            session.teardown();
        }
    }
}

fn validate(
    ad_source: &str,
    container: &dyn Container,
    width: u32,
    height: u32,
) -> Result<(), AdFailure> {
    if !container.can_host_children() {
        return Err(AdFailure::new(FailureKind::InvalidInput, INVALID_CONTAINER));
    }
    if ad_source.is_empty() {
        return Err(AdFailure::new(FailureKind::InvalidInput, INVALID_SOURCE));
    }
    if width == 0 || height == 0 {
        return Err(AdFailure::new(FailureKind::InvalidInput, INVALID_DIMENSIONS));
    }
    Ok(())
}

fn timeout_message(deadline: Duration) -> String {
    format!("Ad timeout after {}s", deadline.as_secs_f64())
}

impl Shared {
    fn spawn_listener(self: &Arc<Self>, namespace: Namespace) -> JoinHandle<()> {
        let inbox = self.bus.subscribe(HOST_TOPIC);
        let weak = Arc::downgrade(self);
        self.runtime.spawn(listen(weak, namespace, inbox))
    }

    fn spawn_construction(
        self: &Arc<Self>,
        namespace: Namespace,
        frame: Arc<dyn RenderFrame>,
        ceiling: Duration,
    ) -> JoinHandle<()> {
        let weak = Arc::downgrade(self);
        let interval = self.config.readiness_poll_interval;
        let document = BootstrapDocument {
            namespace: namespace.clone(),
            parent_topic: HOST_TOPIC.to_string(),
            render_host: self.config.render_host.clone(),
        };
        self.runtime.spawn(async move {
            let outcome = match poll::wait_until(interval, ceiling, || frame.is_addressable()).await {
                Ok(checks) => {
                    trace!(target: TARGET_CONTROLLER, namespace = %namespace, checks, "render frame addressable");
                    frame.bootstrap(document).map_err(|err| {
                        warn!(target: TARGET_CONTROLLER, namespace = %namespace, error = %err, "frame bootstrap failed");
                        FRAME_WRITE_FAILED
                    })
                }
                Err(err) => {
                    warn!(target: TARGET_CONTROLLER, namespace = %namespace, error = %err, "render frame never became addressable");
                    Err(FRAME_UNADDRESSABLE)
                }
            };
            if let (Err(message), Some(shared)) = (outcome, weak.upgrade()) {
                shared.fail(
                    &namespace,
                    AdFailure::new(FailureKind::BootstrapFailure, message),
                );
            }
        })
    }

    fn handle_message(&self, namespace: &Namespace, message: ProtocolMessage) {
        let dispatch = {
            let mut slot = self.slot.lock();
            let Some(session) = slot
                .as_mut()
                .filter(|session| session.namespace() == namespace)
            else {
                return;
            };
            if session.state.is_terminal() {
                trace!(target: TARGET_CONTROLLER, namespace = %namespace, kind = message.kind().as_str(), "message after terminal state dropped");
                return;
            }
            self.route(session, message)
        };

        match dispatch {
            Dispatch::Nothing => {}
            Dispatch::Impression => {
                let callback = self.callbacks.read().impression.clone();
                callback(namespace);
            }
            Dispatch::Quartile(quartile) => {
                let callback = self.callbacks.read().quartile(quartile);
                callback(namespace);
            }
            Dispatch::Success => self.succeed(namespace),
            Dispatch::Failure(failure) => self.fail(namespace, failure),
        }
    }

    fn route(&self, session: &mut Session, message: ProtocolMessage) -> Dispatch {
        let state = session.state;
        match message {
            ProtocolMessage::Load => {
                // The render host ships inside the bootstrap document, so
                // there is nothing left to hand over here.
                session.saw_load = true;
                debug!(target: TARGET_CONTROLLER, namespace = %session.namespace(), "render frame document loaded");
                Dispatch::Nothing
            }
            ProtocolMessage::Ready if state == SessionState::AwaitingHandshake => {
                session.transition(SessionState::RenderReady);
                let start = ProtocolMessage::Start {
                    input: session.ad_source().to_string(),
                };
                session.send(self.bus.as_ref(), &start);
                session.transition(SessionState::AdRequested);
                Dispatch::Nothing
            }
            ProtocolMessage::Impression if state.accepts_playback_events() => {
                session.transition(SessionState::Playing);
                Dispatch::Impression
            }
            ProtocolMessage::Quartile { value } if state.accepts_playback_events() => {
                match value.and_then(Quartile::from_percent) {
                    Some(quartile) => {
                        session.transition(SessionState::Playing);
                        Dispatch::Quartile(quartile)
                    }
                    None => {
                        debug!(target: TARGET_CONTROLLER, namespace = %session.namespace(), value = ?value, "quartile outside checkpoints ignored");
                        Dispatch::Nothing
                    }
                }
            }
            ProtocolMessage::Success => Dispatch::Success,
            ProtocolMessage::Error { message, code } => {
                Dispatch::Failure(AdFailure::new(FailureKind::from(code), message))
            }
            other => {
                trace!(
                    target: TARGET_CONTROLLER,
                    namespace = %session.namespace(),
                    kind = other.kind().as_str(),
                    state = state.as_str(),
                    "message not expected in current state"
                );
                Dispatch::Nothing
            }
        }
    }

    /// Marks the session terminal and cancels its watchdog. Returns false if
    /// the session is gone or another outcome got there first.
    fn claim_terminal(&self, namespace: &Namespace, outcome: Outcome) -> bool {
        let mut slot = self.slot.lock();
        match slot.as_mut() {
            Some(session) if session.namespace() == namespace && !session.state.is_terminal() => {
                session.cancel_watchdog();
                session.transition(SessionState::Terminal(outcome))
            }
            _ => false,
        }
    }

    fn succeed(&self, namespace: &Namespace) {
        if !self.claim_terminal(namespace, Outcome::Success) {
            return;
        }
        info!(target: TARGET_CONTROLLER, namespace = %namespace, "ad session succeeded");
        let callback = self.callbacks.read().success.clone();
        callback(namespace);
        self.release(namespace);
    }

    /// Single exit for every failure of a created session: cancels the
    /// watchdog, reports once, tears down.
    fn fail(&self, namespace: &Namespace, failure: AdFailure) {
        let aborted = failure.kind == FailureKind::Timeout;
        if !self.claim_terminal(namespace, Outcome::Error { aborted }) {
            return;
        }
        warn!(
            target: TARGET_CONTROLLER,
            namespace = %namespace,
            kind = failure.kind.as_str(),
            error = %failure,
            "ad session failed"
        );
        let callback = self.callbacks.read().error.clone();
        callback(namespace, &failure);
        self.release(namespace);
    }

    fn expire(&self, namespace: &Namespace) {
        let deadline = {
            let slot = self.slot.lock();
            match slot.as_ref() {
                Some(session) if session.namespace() == namespace && !session.state.is_terminal() => {
                    session.send(self.bus.as_ref(), &ProtocolMessage::Abort);
                    session.deadline()
                }
                _ => return,
            }
        };
        let message = deadline
            .map(timeout_message)
            .unwrap_or_else(|| "Ad timeout".to_string());
        self.fail(namespace, AdFailure::new(FailureKind::Timeout, message));
    }

    /// Drops the session from the slot if it is still the one there.
    fn release(&self, namespace: &Namespace) {
        let session = {
            let mut slot = self.slot.lock();
            if slot
                .as_ref()
                .is_some_and(|session| session.namespace() == namespace)
            {
                slot.take()
            } else {
                None
            }
        };
        if let Some(mut session) = session {
            session.teardown();
        }
    }
}

async fn listen(
    shared: Weak<Shared>,
    namespace: Namespace,
    mut inbox: broadcast::Receiver<FrameMessage>,
) {
    let codec = EnvelopeCodec::new(namespace.clone());
    loop {
        match inbox.recv().await {
            Ok(frame_message) => {
                let Some(message) = codec.decode_bytes(&frame_message.payload) else {
                    continue;
                };
                let Some(controller) = shared.upgrade() else {
                    break;
                };
                controller.handle_message(&namespace, message);
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(target: TARGET_CONTROLLER, namespace = %namespace, skipped, "controller listener lagged");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockContainer;
    use frame_bus::LocalFrameBus;

    #[test_timeout::timeout]
    fn validation_checks_container_source_and_dimensions() {
        let bus = Arc::new(LocalFrameBus::new());
        let ok = MockContainer::new(bus.clone());
        let detached = MockContainer::new(bus).detached();

        assert_eq!(validate("<VAST/>", &ok, 640, 360), Ok(()));
        let err = validate("<VAST/>", &detached, 640, 360).expect_err("detached");
        assert_eq!(err.message, INVALID_CONTAINER);
        let err = validate("", &ok, 640, 360).expect_err("empty source");
        assert_eq!(err.message, INVALID_SOURCE);
        let err = validate("<VAST/>", &ok, 0, 360).expect_err("zero width");
        assert_eq!(err, AdFailure::new(FailureKind::InvalidInput, INVALID_DIMENSIONS));
        assert!(validate("<VAST/>", &ok, 640, 0).is_err());
    }

    #[test_timeout::timeout]
    fn timeout_message_uses_whole_seconds_when_possible() {
        assert_eq!(timeout_message(Duration::from_secs(5)), "Ad timeout after 5s");
        assert_eq!(timeout_message(Duration::from_millis(2500)), "Ad timeout after 2.5s");
    }

    #[test_timeout::timeout]
    fn new_requires_runtime() {
        let bus: Arc<dyn FrameBus> = Arc::new(LocalFrameBus::new());
        assert!(matches!(
            AdFrameController::new(bus, PlayerConfig::default()),
            Err(ControllerError::NoRuntime(_))
        ));
    }
}
