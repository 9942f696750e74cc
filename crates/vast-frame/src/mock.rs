//! In-memory stand-ins for the host page, the isolated frame, the display
//! surface and the ad SDK. Used by the test suites and for local experiments.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};

use frame_bus::{FrameBus, LocalFrameBus};
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

use crate::frame::{BootstrapDocument, Container, FrameError, FrameSpec, RenderFrame};
use crate::render_host::{RenderEnvironment, RenderHost};
use crate::sdk::{
    AdEvent, AdEventKind, AdInfo, AdRenderer, AdSdk, AdsRequest, SdkError, SdkEvent,
    SdkEventSender, ViewMode,
};
use crate::surface::{Measurements, PlaybackPolicy, RenderSurface, Size, SurfaceError};

static NEXT_FRAME_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, PartialEq)]
pub enum RendererCall {
    Init(Size),
    Start,
    Resize(Size),
    SetVolume(f32),
    Destroy,
}

/// Renderer that records every call made on it. Clones share the record.
#[derive(Debug, Clone, Default)]
pub struct MockRenderer {
    calls: Arc<Mutex<Vec<RendererCall>>>,
    fail_start: bool,
    fail_destroy: bool,
}

impl MockRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_start() -> Self {
        Self {
            fail_start: true,
            ..Self::default()
        }
    }

    pub fn failing_destroy() -> Self {
        Self {
            fail_destroy: true,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<RendererCall> {
        self.calls.lock().clone()
    }

    pub fn destroyed(&self) -> bool {
        self.calls.lock().contains(&RendererCall::Destroy)
    }
}

impl AdRenderer for MockRenderer {
    fn init(&mut self, size: Size, _mode: ViewMode) -> Result<(), SdkError> {
        self.calls.lock().push(RendererCall::Init(size));
        Ok(())
    }

    fn start(&mut self) -> Result<(), SdkError> {
        self.calls.lock().push(RendererCall::Start);
        if self.fail_start {
            return Err(SdkError::Renderer("autoplay blocked".into()));
        }
        Ok(())
    }

    fn resize(&mut self, size: Size, _mode: ViewMode) -> Result<(), SdkError> {
        self.calls.lock().push(RendererCall::Resize(size));
        Ok(())
    }

    fn set_volume(&mut self, volume: f32) -> Result<(), SdkError> {
        self.calls.lock().push(RendererCall::SetVolume(volume));
        Ok(())
    }

    fn destroy(&mut self) -> Result<(), SdkError> {
        self.calls.lock().push(RendererCall::Destroy);
        if self.fail_destroy {
            return Err(SdkError::Renderer("renderer already torn down".into()));
        }
        Ok(())
    }
}

#[derive(Default)]
struct ScriptedSdkState {
    bind_error: Option<SdkError>,
    request_error: Option<SdkError>,
    bind_calls: u32,
    requests: Vec<AdsRequest>,
    events: Option<SdkEventSender>,
}

/// SDK whose decisioning outcome is driven by hand: after `request_ads`,
/// tests push events through [`ScriptedSdk::emit`] and friends.
#[derive(Default)]
pub struct ScriptedSdk {
    state: Mutex<ScriptedSdkState>,
}

impl ScriptedSdk {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_bind(&self, err: SdkError) {
        self.state.lock().bind_error = Some(err);
    }

    pub fn fail_request(&self, err: SdkError) {
        self.state.lock().request_error = Some(err);
    }

    pub fn bind_calls(&self) -> u32 {
        self.state.lock().bind_calls
    }

    pub fn requests(&self) -> Vec<AdsRequest> {
        self.state.lock().requests.clone()
    }

    /// Delivers `event` to the render host that requested ads. Returns false
    /// when no request has been made or the render host is gone.
    pub fn emit(&self, event: SdkEvent) -> bool {
        let sender = self.state.lock().events.clone();
        sender.map(|tx| tx.send(event).is_ok()).unwrap_or(false)
    }

    pub fn grant(&self, renderer: MockRenderer) -> bool {
        self.emit(SdkEvent::RendererReady(Ok(Box::new(renderer))))
    }

    pub fn emit_ad(&self, kind: AdEventKind, ad: Option<AdInfo>) -> bool {
        self.emit(SdkEvent::Ad(AdEvent { kind, ad }))
    }
}

impl AdSdk for ScriptedSdk {
    fn bind_display(&self) -> Result<(), SdkError> {
        let mut state = self.state.lock();
        state.bind_calls += 1;
        match &state.bind_error {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    fn request_ads(&self, request: AdsRequest, events: SdkEventSender) -> Result<(), SdkError> {
        let mut state = self.state.lock();
        if let Some(err) = &state.request_error {
            return Err(err.clone());
        }
        state.requests.push(request);
        state.events = Some(events);
        Ok(())
    }
}

/// Surface whose measurements tests set directly. The ad container reports
/// whatever size was last applied, as a container filling the root would.
pub struct MockSurface {
    measurements: Mutex<Measurements>,
    applied: Mutex<Vec<Size>>,
    policy: Mutex<Option<PlaybackPolicy>>,
}

impl MockSurface {
    pub fn new(frame_size: Size) -> Arc<Self> {
        Arc::new(Self {
            measurements: Mutex::new(Measurements {
                frame_client: Some(frame_size),
                ..Measurements::default()
            }),
            applied: Mutex::new(Vec::new()),
            policy: Mutex::new(None),
        })
    }

    pub fn set_frame_size(&self, size: Size) {
        self.measurements.lock().frame_client = Some(size);
    }

    pub fn set_measurements(&self, measurements: Measurements) {
        *self.measurements.lock() = measurements;
    }

    pub fn applied_sizes(&self) -> Vec<Size> {
        self.applied.lock().clone()
    }

    pub fn applied_policy(&self) -> Option<PlaybackPolicy> {
        *self.policy.lock()
    }
}

impl RenderSurface for MockSurface {
    fn measure(&self) -> Measurements {
        *self.measurements.lock()
    }

    fn slot_size(&self) -> Option<Size> {
        self.applied.lock().last().copied()
    }

    fn apply_size(&self, size: Size) -> Result<(), SurfaceError> {
        self.applied.lock().push(size);
        Ok(())
    }

    fn apply_playback_policy(&self, policy: PlaybackPolicy) -> Result<(), SurfaceError> {
        *self.policy.lock() = Some(policy);
        Ok(())
    }
}

/// Frame living on a [`LocalFrameBus`]. Becomes addressable after a
/// configurable number of readiness checks and, unless built as manual,
/// launches a real [`RenderHost`] when bootstrapped.
pub struct MockFrame {
    topic: String,
    spec: FrameSpec,
    bus: Arc<LocalFrameBus>,
    sdk: Arc<ScriptedSdk>,
    surface: Arc<MockSurface>,
    launch_render_host: bool,
    broken_document: bool,
    checks_until_addressable: AtomicU32,
    document: Mutex<Option<BootstrapDocument>>,
    render_host: Mutex<Option<JoinHandle<()>>>,
    removed: AtomicBool,
}

impl MockFrame {
    pub fn spec(&self) -> FrameSpec {
        self.spec
    }

    pub fn sdk(&self) -> &Arc<ScriptedSdk> {
        &self.sdk
    }

    pub fn surface(&self) -> &Arc<MockSurface> {
        &self.surface
    }

    pub fn document(&self) -> Option<BootstrapDocument> {
        self.document.lock().clone()
    }

    pub fn is_removed(&self) -> bool {
        self.removed.load(Ordering::SeqCst)
    }
}

impl RenderFrame for MockFrame {
    fn topic(&self) -> &str {
        &self.topic
    }

    fn is_addressable(&self) -> bool {
        if self.is_removed() {
            return false;
        }
        self.checks_until_addressable
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_err()
    }

    fn bootstrap(&self, document: BootstrapDocument) -> Result<(), FrameError> {
        if self.is_removed() {
            return Err(FrameError::NotAddressable);
        }
        if self.broken_document {
            return Err(FrameError::Bootstrap("document.write refused".into()));
        }
        *self.document.lock() = Some(document.clone());
        if self.launch_render_host {
            let runtime = Handle::try_current()
                .map_err(|err| FrameError::Bootstrap(err.to_string()))?;
            let bus: Arc<dyn FrameBus> = self.bus.clone();
            let task = RenderHost::launch(
                &runtime,
                document,
                RenderEnvironment {
                    bus,
                    frame_topic: self.topic.clone(),
                    sdk: self.sdk.clone(),
                    surface: self.surface.clone(),
                },
            );
            *self.render_host.lock() = Some(task);
        }
        Ok(())
    }

    fn remove(&self) {
        self.removed.store(true, Ordering::SeqCst);
        if let Some(task) = self.render_host.lock().take() {
            task.abort();
        }
        self.bus.release(&self.topic);
    }
}

/// Host page element collecting every frame appended to it.
pub struct MockContainer {
    bus: Arc<LocalFrameBus>,
    can_host: bool,
    launch_render_host: bool,
    broken_document: bool,
    checks_until_addressable: u32,
    frames: Mutex<Vec<Arc<MockFrame>>>,
    live_at_append: Mutex<Vec<usize>>,
}

impl MockContainer {
    pub fn new(bus: Arc<LocalFrameBus>) -> Self {
        Self {
            bus,
            can_host: true,
            launch_render_host: true,
            broken_document: false,
            checks_until_addressable: 0,
            frames: Mutex::new(Vec::new()),
            live_at_append: Mutex::new(Vec::new()),
        }
    }

    /// Element that cannot take children.
    pub fn detached(mut self) -> Self {
        self.can_host = false;
        self
    }

    /// Frames record their bootstrap document but run no render host; tests
    /// play the render host's part on the bus themselves.
    pub fn manual(mut self) -> Self {
        self.launch_render_host = false;
        self
    }

    /// Frames refuse the bootstrap document.
    pub fn broken_document(mut self) -> Self {
        self.broken_document = true;
        self
    }

    /// Frames report not addressable for the first `checks` readiness checks.
    pub fn slow_document(mut self, checks: u32) -> Self {
        self.checks_until_addressable = checks;
        self
    }

    pub fn into_shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn frames(&self) -> Vec<Arc<MockFrame>> {
        self.frames.lock().clone()
    }

    pub fn last_frame(&self) -> Option<Arc<MockFrame>> {
        self.frames.lock().last().cloned()
    }

    pub fn live_frames(&self) -> usize {
        self.frames
            .lock()
            .iter()
            .filter(|frame| !frame.is_removed())
            .count()
    }

    /// For each append, how many earlier frames were still attached.
    pub fn live_frames_at_append(&self) -> Vec<usize> {
        self.live_at_append.lock().clone()
    }
}

impl Container for MockContainer {
    fn can_host_children(&self) -> bool {
        self.can_host
    }

    fn append_frame(&self, spec: FrameSpec) -> Result<Arc<dyn RenderFrame>, FrameError> {
        if !self.can_host {
            return Err(FrameError::Container("element has no child list".into()));
        }
        let live = self.live_frames();
        self.live_at_append.lock().push(live);
        let id = NEXT_FRAME_ID.fetch_add(1, Ordering::Relaxed);
        let frame = Arc::new(MockFrame {
            topic: format!("frame-{id}"),
            spec,
            bus: self.bus.clone(),
            sdk: ScriptedSdk::new(),
            surface: MockSurface::new(spec.size),
            launch_render_host: self.launch_render_host,
            broken_document: self.broken_document,
            checks_until_addressable: AtomicU32::new(self.checks_until_addressable),
            document: Mutex::new(None),
            render_host: Mutex::new(None),
            removed: AtomicBool::new(false),
        });
        self.frames.lock().push(frame.clone());
        Ok(frame)
    }
}
