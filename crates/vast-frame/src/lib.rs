//! Plays a VAST ad inside an isolated render frame and reports its lifecycle
//! back to the embedding page.
//!
//! [`AdFrameController`] is the host-side entry point. Each `play_ad` call
//! creates a fresh frame whose [`render_host::RenderHost`] drives the ad SDK
//! and talks back over a [`frame_bus::FrameBus`] using namespaced envelopes.

pub mod config;
pub mod controller;
pub mod frame;
pub mod mock;
pub mod poll;
pub mod render_host;
pub mod sdk;
pub mod surface;
pub mod telemetry;
pub mod watchdog;

pub use config::{PlayerConfig, RenderHostConfig};
pub use controller::{
    AdFailure, AdFrameController, ControllerError, ControllerHandle, ErrorCallback, EventCallback,
    FailureKind, Outcome, SessionState,
};
pub use frame::{BootstrapDocument, Container, FrameError, FrameSpec, RenderFrame, HOST_TOPIC};
pub use render_host::{RenderEnvironment, RenderHost};
pub use surface::{RenderSurface, Size};
pub use vast_frame_proto::{Namespace, ProtocolMessage, Quartile};
