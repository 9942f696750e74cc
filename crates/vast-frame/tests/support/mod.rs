#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use frame_bus::{FrameBus, FrameMessage, LocalFrameBus};
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::time::Instant;
use vast_frame::mock::MockFrame;
use vast_frame::{
    AdFrameController, FailureKind, HOST_TOPIC, Namespace, PlayerConfig, ProtocolMessage,
    Quartile,
};
use vast_frame_proto::EnvelopeCodec;

pub const TAG_URL: &str = "https://ads.example/tag";

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Error(FailureKind, String),
    Success,
    Impression,
    Quartile(Quartile),
}

#[derive(Debug, Clone)]
pub struct Recorded {
    pub namespace: Namespace,
    pub event: Event,
    pub at: Instant,
}

/// Collects every callback invocation in order.
#[derive(Clone, Default)]
pub struct Recorder {
    entries: Arc<Mutex<Vec<Recorded>>>,
}

impl Recorder {
    pub fn attach(&self, controller: &AdFrameController) {
        let recorder = self.clone();
        controller.on_error(move |namespace, failure| {
            recorder.push(namespace, Event::Error(failure.kind, failure.message.clone()));
        });
        let recorder = self.clone();
        controller.on_success(move |namespace| recorder.push(namespace, Event::Success));
        let recorder = self.clone();
        controller.on_impression(move |namespace| recorder.push(namespace, Event::Impression));
        for quartile in Quartile::ALL {
            let recorder = self.clone();
            controller.on_quartile(quartile, move |namespace| {
                recorder.push(namespace, Event::Quartile(quartile));
            });
        }
    }

    fn push(&self, namespace: &Namespace, event: Event) {
        self.entries.lock().push(Recorded {
            namespace: namespace.clone(),
            event,
            at: Instant::now(),
        });
    }

    pub fn entries(&self) -> Vec<Recorded> {
        self.entries.lock().clone()
    }

    pub fn events(&self) -> Vec<Event> {
        self.entries.lock().iter().map(|entry| entry.event.clone()).collect()
    }

    pub fn errors(&self) -> Vec<(FailureKind, String)> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                Event::Error(kind, message) => Some((kind, message)),
                _ => None,
            })
            .collect()
    }
}

pub struct Fixture {
    pub bus: Arc<LocalFrameBus>,
    pub controller: AdFrameController,
    pub recorder: Recorder,
}

impl Fixture {
    pub fn new() -> Self {
        let bus = Arc::new(LocalFrameBus::new());
        let controller =
            AdFrameController::new(bus.clone(), PlayerConfig::default()).expect("tokio runtime");
        let recorder = Recorder::default();
        recorder.attach(&controller);
        Self {
            bus,
            controller,
            recorder,
        }
    }

    pub fn host_listeners(&self) -> usize {
        self.bus.listener_count(HOST_TOPIC)
    }
}

/// Plays the render host's side of the protocol by hand.
pub struct FakeRenderHost {
    codec: EnvelopeCodec,
    bus: Arc<LocalFrameBus>,
    inbox: broadcast::Receiver<FrameMessage>,
}

impl FakeRenderHost {
    /// Attaches to a frame whose bootstrap document has been written.
    pub fn attach(bus: &Arc<LocalFrameBus>, frame: &MockFrame) -> Self {
        let document = frame.document().expect("frame bootstrapped");
        Self {
            codec: EnvelopeCodec::new(document.namespace),
            bus: bus.clone(),
            inbox: bus.subscribe(vast_frame::RenderFrame::topic(frame)),
        }
    }

    pub fn namespace(&self) -> &Namespace {
        self.codec.namespace()
    }

    pub fn post(&self, message: ProtocolMessage) {
        self.bus
            .post(HOST_TOPIC, self.codec.encode_bytes(&message))
            .expect("controller listening");
    }

    /// Messages the controller sent to the frame so far.
    pub fn received(&mut self) -> Vec<ProtocolMessage> {
        let mut out = Vec::new();
        while let Ok(message) = self.inbox.try_recv() {
            if let Some(decoded) = self.codec.decode_bytes(&message.payload) {
                out.push(decoded);
            }
        }
        out
    }
}

/// Lets every spawned task run until idle.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}
