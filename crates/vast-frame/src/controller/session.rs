use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use frame_bus::FrameBus;
use tokio::task::JoinHandle;
use tracing::debug;
use vast_frame_proto::{EnvelopeCodec, Namespace, ProtocolMessage};

use crate::frame::RenderFrame;
use crate::telemetry::TARGET_CONTROLLER;
use crate::watchdog::Watchdog;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    /// `aborted` marks failures forced by the session deadline.
    Error { aborted: bool },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Created,
    AwaitingHandshake,
    RenderReady,
    AdRequested,
    Playing,
    Terminal(Outcome),
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionState::Terminal(_))
    }

    /// Whether impression and quartile events are meaningful right now.
    pub fn accepts_playback_events(self) -> bool {
        matches!(self, SessionState::AdRequested | SessionState::Playing)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SessionState::Created => "created",
            SessionState::AwaitingHandshake => "awaiting_handshake",
            SessionState::RenderReady => "render_ready",
            SessionState::AdRequested => "ad_requested",
            SessionState::Playing => "playing",
            SessionState::Terminal(Outcome::Success) => "terminal_success",
            SessionState::Terminal(Outcome::Error { aborted: false }) => "terminal_error",
            SessionState::Terminal(Outcome::Error { aborted: true }) => "terminal_aborted",
        }
    }
}

/// One `play_ad` invocation. Owns the frame, the inbound listener, the
/// construction task and the watchdog; [`Session::teardown`] releases them.
pub(crate) struct Session {
    codec: EnvelopeCodec,
    ad_source: String,
    deadline: Option<Duration>,
    pub(crate) state: SessionState,
    pub(crate) saw_load: bool,
    pub(crate) frame: Option<Arc<dyn RenderFrame>>,
    pub(crate) watchdog: Option<Watchdog>,
    pub(crate) listener: Option<JoinHandle<()>>,
    pub(crate) construction: Option<JoinHandle<()>>,
    torn_down: bool,
}

impl Session {
    pub(crate) fn new(namespace: Namespace, ad_source: &str, deadline: Option<Duration>) -> Self {
        Self {
            codec: EnvelopeCodec::new(namespace),
            ad_source: ad_source.to_string(),
            deadline,
            state: SessionState::Created,
            saw_load: false,
            frame: None,
            watchdog: None,
            listener: None,
            construction: None,
            torn_down: false,
        }
    }

    pub(crate) fn namespace(&self) -> &Namespace {
        self.codec.namespace()
    }

    pub(crate) fn ad_source(&self) -> &str {
        &self.ad_source
    }

    pub(crate) fn deadline(&self) -> Option<Duration> {
        self.deadline
    }

    pub(crate) fn watchdog_armed(&self) -> bool {
        self.watchdog.as_ref().is_some_and(Watchdog::is_armed)
    }

    /// Moves to `next` unless the session already ended.
    pub(crate) fn transition(&mut self, next: SessionState) -> bool {
        if self.state.is_terminal() {
            return false;
        }
        debug!(
            target: TARGET_CONTROLLER,
            namespace = %self.namespace(),
            from = self.state.as_str(),
            to = next.as_str(),
            "session transition"
        );
        self.state = next;
        true
    }

    pub(crate) fn cancel_watchdog(&mut self) {
        if let Some(mut watchdog) = self.watchdog.take() {
            watchdog.cancel();
        }
    }

    /// Posts `message` to the render frame. Delivery is best-effort: a frame
    /// that is gone or not yet listening just misses it.
    pub(crate) fn send(&self, bus: &dyn FrameBus, message: &ProtocolMessage) {
        let Some(frame) = self.frame.as_ref() else {
            return;
        };
        if let Err(err) = bus.post(frame.topic(), self.codec.encode_bytes(message)) {
            debug!(
                target: TARGET_CONTROLLER,
                namespace = %self.namespace(),
                kind = message.kind().as_str(),
                error = %err,
                "message to render frame dropped"
            );
        }
    }

    /// Releases everything the session holds: watchdog first, then the
    /// listener and construction tasks, then the frame. Runs at most once.
    pub(crate) fn teardown(&mut self) {
        if self.torn_down {
            return;
        }
        self.torn_down = true;
        self.cancel_watchdog();
        if let Some(listener) = self.listener.take() {
            listener.abort();
        }
        if let Some(construction) = self.construction.take() {
            construction.abort();
        }
        if let Some(frame) = self.frame.take() {
            frame.remove();
        }
        self.ad_source.clear();
        self.deadline = None;
        debug!(
            target: TARGET_CONTROLLER,
            namespace = %self.namespace(),
            state = self.state.as_str(),
            "session torn down"
        );
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.teardown();
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("namespace", self.namespace())
            .field("state", &self.state)
            .field("deadline", &self.deadline)
            .field("has_frame", &self.frame.is_some())
            .finish()
    }
}
