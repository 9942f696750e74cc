//! Logic that runs inside the isolated frame: drives the ad SDK against the
//! local surface, relays SDK lifecycle events to the controller, and keeps
//! the surface sized to the area the frame was actually given.

use std::sync::Arc;

use frame_bus::{FrameBus, FrameMessage};
use tokio::runtime::Handle;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};
use vast_frame_proto::{EnvelopeCodec, ErrorCode, Namespace, ProtocolMessage};

use crate::config::RenderHostConfig;
use crate::frame::BootstrapDocument;
use crate::poll;
use crate::sdk::{
    AdEvent, AdEventKind, AdInfo, AdRenderer, AdSdk, AdSource, AdsRequest, SdkEvent,
    SdkEventSender, ViewMode,
};
use crate::surface::{PlaybackPolicy, RenderSurface, Size};
use crate::telemetry::TARGET_RENDER_HOST;

pub const DISPLAY_INIT_FAILED: &str = "ad display container init failed";
pub const REQUEST_FAILED: &str = "ad request failed";
pub const RENDERER_UNAVAILABLE: &str = "ad renderer unavailable";
pub const RENDERER_START_FAILED: &str = "ad renderer start failed";
pub const INELIGIBLE_AD: &str = "Non-linear or audio-only ad ignored";
pub const GENERIC_AD_ERROR: &str = "Ad error";

/// What the frame provides to the render host it launches.
#[derive(Clone)]
pub struct RenderEnvironment {
    pub bus: Arc<dyn FrameBus>,
    /// Topic of the frame's own window.
    pub frame_topic: String,
    pub sdk: Arc<dyn AdSdk>,
    pub surface: Arc<dyn RenderSurface>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RenderState {
    /// Size last pushed to the surface and renderer.
    pub last_applied: Option<Size>,
    pub aborted: bool,
    pub started: bool,
    /// A terminal outcome was posted; SDK events are ignored from here on.
    pub finished: bool,
}

pub struct RenderHost {
    codec: EnvelopeCodec,
    parent_topic: String,
    config: RenderHostConfig,
    bus: Arc<dyn FrameBus>,
    sdk: Arc<dyn AdSdk>,
    surface: Arc<dyn RenderSurface>,
    sdk_events: SdkEventSender,
    renderer: Option<Box<dyn AdRenderer>>,
    state: RenderState,
}

impl RenderHost {
    /// Starts the render host described by `document`. The frame's inbox is
    /// attached before this returns, so nothing the controller sends after
    /// `ready` can be missed.
    pub fn launch(
        runtime: &Handle,
        document: BootstrapDocument,
        env: RenderEnvironment,
    ) -> JoinHandle<()> {
        let inbox = env.bus.subscribe(&env.frame_topic);
        let (sdk_tx, sdk_rx) = mpsc::unbounded_channel();
        let host = RenderHost::new(document, env, sdk_tx);
        runtime.spawn(host.run(inbox, sdk_rx))
    }

    fn new(document: BootstrapDocument, env: RenderEnvironment, sdk_events: SdkEventSender) -> Self {
        Self {
            codec: EnvelopeCodec::new(document.namespace),
            parent_topic: document.parent_topic,
            config: document.render_host,
            bus: env.bus,
            sdk: env.sdk,
            surface: env.surface,
            sdk_events,
            renderer: None,
            state: RenderState::default(),
        }
    }

    pub fn namespace(&self) -> &Namespace {
        self.codec.namespace()
    }

    pub fn state(&self) -> RenderState {
        self.state
    }

    async fn run(
        mut self,
        mut inbox: broadcast::Receiver<FrameMessage>,
        mut sdk_rx: mpsc::UnboundedReceiver<SdkEvent>,
    ) {
        self.boot();
        let mut size_sync = poll::ticker(self.config.size_sync_interval);
        loop {
            tokio::select! {
                received = inbox.recv() => match received {
                    Ok(message) => self.handle_payload(&message.payload),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(target: TARGET_RENDER_HOST, namespace = %self.namespace(), skipped, "render host inbox lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
                Some(event) = sdk_rx.recv() => self.handle_sdk_event(event),
                _ = size_sync.tick() => {
                    self.sync_size();
                }
            }
        }
        debug!(target: TARGET_RENDER_HOST, namespace = %self.namespace(), "render host inbox closed");
    }

    fn boot(&mut self) {
        self.post(ProtocolMessage::Load);
        if let Err(err) = self
            .surface
            .apply_playback_policy(PlaybackPolicy::locked_inline())
        {
            debug!(target: TARGET_RENDER_HOST, error = %err, "playback policy not fully applied");
        }
        self.sync_size();
        self.post(ProtocolMessage::Ready);
    }

    fn handle_payload(&mut self, payload: &[u8]) {
        let Some(message) = self.codec.decode_bytes(payload) else {
            trace!(target: TARGET_RENDER_HOST, "dropping foreign frame message");
            return;
        };
        match message {
            ProtocolMessage::Abort => self.abort(),
            ProtocolMessage::Start { input } => {
                self.sync_size();
                self.start(&input);
            }
            other => {
                trace!(target: TARGET_RENDER_HOST, kind = other.kind().as_str(), "ignoring message not meant for render host");
            }
        }
    }

    fn start(&mut self, input: &str) {
        if self.state.aborted || self.state.finished {
            return;
        }
        if self.state.started {
            debug!(target: TARGET_RENDER_HOST, namespace = %self.namespace(), "duplicate start ignored");
            return;
        }
        self.state.started = true;

        if let Err(err) = self.sdk.bind_display() {
            self.fail_with(ErrorCode::Bootstrap, DISPLAY_INIT_FAILED, &err);
            return;
        }
        let source = match AdSource::classify(input) {
            Ok(source) => source,
            Err(err) => {
                self.fail_with(ErrorCode::Bootstrap, REQUEST_FAILED, &err);
                return;
            }
        };
        let request = AdsRequest::linear(source, self.slot_size());
        debug!(
            target: TARGET_RENDER_HOST,
            namespace = %self.namespace(),
            slot = ?request.linear_slot,
            "requesting ads"
        );
        if let Err(err) = self.sdk.request_ads(request, self.sdk_events.clone()) {
            self.fail_with(ErrorCode::Bootstrap, REQUEST_FAILED, &err);
        }
    }

    fn handle_sdk_event(&mut self, event: SdkEvent) {
        if self.state.aborted || self.state.finished {
            trace!(target: TARGET_RENDER_HOST, event = ?event, "sdk event after shutdown ignored");
            if let SdkEvent::RendererReady(Ok(mut renderer)) = event {
                if let Err(err) = renderer.destroy() {
                    debug!(target: TARGET_RENDER_HOST, error = %err, "late renderer destroy failed");
                }
            }
            return;
        }
        match event {
            SdkEvent::RendererReady(Ok(renderer)) => self.adopt_renderer(renderer),
            SdkEvent::RendererReady(Err(err)) => {
                self.fail_with(ErrorCode::Bootstrap, RENDERER_UNAVAILABLE, &err);
            }
            SdkEvent::Ad(event) => self.relay_ad_event(event),
            SdkEvent::AdError(description) => {
                self.destroy_renderer();
                let message = if description.trim().is_empty() {
                    GENERIC_AD_ERROR.to_string()
                } else {
                    description
                };
                self.finish(ProtocolMessage::error(message, ErrorCode::AdError));
            }
        }
    }

    fn adopt_renderer(&mut self, mut renderer: Box<dyn AdRenderer>) {
        if let Err(err) = renderer.set_volume(0.0) {
            debug!(target: TARGET_RENDER_HOST, error = %err, "renderer refused volume change");
        }
        if let Err(err) = renderer.init(self.slot_size(), ViewMode::Normal) {
            debug!(target: TARGET_RENDER_HOST, error = %err, "renderer init reported failure");
        }
        let started = renderer.start();
        self.renderer = Some(renderer);
        if let Err(err) = started {
            self.fail_with(ErrorCode::Bootstrap, RENDERER_START_FAILED, &err);
        }
    }

    fn relay_ad_event(&mut self, event: AdEvent) {
        if event.kind.is_ad_scoped() && !event.ad.as_ref().is_some_and(AdInfo::is_eligible) {
            debug!(
                target: TARGET_RENDER_HOST,
                namespace = %self.namespace(),
                kind = ?event.kind,
                ad = ?event.ad,
                "rejecting ineligible ad"
            );
            self.destroy_renderer();
            self.finish(ProtocolMessage::error(INELIGIBLE_AD, ErrorCode::IneligibleAd));
            return;
        }
        match event.kind {
            AdEventKind::Impression => self.post(ProtocolMessage::Impression),
            AdEventKind::AllAdsCompleted => self.finish(ProtocolMessage::Success),
            kind => {
                if let Some(quartile) = kind.quartile() {
                    self.post(ProtocolMessage::quartile(quartile));
                }
            }
        }
    }

    fn abort(&mut self) {
        if self.state.aborted {
            return;
        }
        self.state.aborted = true;
        debug!(target: TARGET_RENDER_HOST, namespace = %self.namespace(), "render host aborted");
        self.destroy_renderer();
    }

    /// Re-measures the frame and pushes the size to the surface and renderer
    /// when it changed. Returns whether anything was applied.
    fn sync_size(&mut self) -> bool {
        let measured = self.surface.measure().resolve(self.config.default_size);
        if self.state.last_applied == Some(measured) {
            return false;
        }
        self.state.last_applied = Some(measured);
        if let Err(err) = self.surface.apply_size(measured) {
            debug!(target: TARGET_RENDER_HOST, error = %err, "surface sizing failed");
        }
        if let Some(renderer) = self.renderer.as_mut() {
            if let Err(err) = renderer.resize(measured, ViewMode::Normal) {
                debug!(target: TARGET_RENDER_HOST, error = %err, "renderer resize failed");
            }
        }
        trace!(target: TARGET_RENDER_HOST, width = measured.width, height = measured.height, "surface resized");
        true
    }

    fn slot_size(&self) -> Size {
        self.surface
            .slot_size()
            .filter(|size| !size.is_empty())
            .or(self.state.last_applied)
            .unwrap_or(self.config.default_size)
    }

    fn destroy_renderer(&mut self) {
        if let Some(mut renderer) = self.renderer.take() {
            if let Err(err) = renderer.destroy() {
                debug!(target: TARGET_RENDER_HOST, error = %err, "renderer destroy failed");
            }
        }
    }

    fn fail_with(&mut self, code: ErrorCode, message: &str, cause: &dyn std::error::Error) {
        warn!(
            target: TARGET_RENDER_HOST,
            namespace = %self.namespace(),
            code = code.as_str(),
            error = %cause,
            "{message}"
        );
        self.destroy_renderer();
        self.finish(ProtocolMessage::error(message, code));
    }

    fn finish(&mut self, outcome: ProtocolMessage) {
        self.state.finished = true;
        self.post(outcome);
    }

    fn post(&self, message: ProtocolMessage) {
        // Best-effort: a controller that already detached simply misses it.
        if let Err(err) = self
            .bus
            .post(&self.parent_topic, self.codec.encode_bytes(&message))
        {
            debug!(
                target: TARGET_RENDER_HOST,
                kind = message.kind().as_str(),
                error = %err,
                "render host post dropped"
            );
        }
    }
}
