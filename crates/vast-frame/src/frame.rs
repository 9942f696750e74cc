//! Handles to the host page container and the isolated render frames the
//! controller creates inside it.

use std::sync::Arc;

use thiserror::Error;
use vast_frame_proto::Namespace;

use crate::config::RenderHostConfig;
use crate::surface::Size;

/// Topic every controller listens on; render hosts post to it.
pub const HOST_TOPIC: &str = "host";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("container cannot host a frame: {0}")]
    Container(String),
    #[error("frame document unavailable")]
    NotAddressable,
    #[error("failed to write frame document: {0}")]
    Bootstrap(String),
}

/// How the controller wants the frame element laid out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameSpec {
    pub size: Size,
    pub allow_autoplay: bool,
    pub borderless: bool,
}

impl FrameSpec {
    pub fn player(size: Size) -> Self {
        Self {
            size,
            allow_autoplay: true,
            borderless: true,
        }
    }
}

/// Everything a freshly constructed frame needs to run its render host. The
/// render host logic ships with the document itself; nothing is injected
/// into the frame afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrapDocument {
    pub namespace: Namespace,
    /// Where the render host posts its events.
    pub parent_topic: String,
    pub render_host: RenderHostConfig,
}

/// Element in the host page that can receive child frames.
pub trait Container: Send + Sync {
    fn can_host_children(&self) -> bool;
    fn append_frame(&self, spec: FrameSpec) -> Result<Arc<dyn RenderFrame>, FrameError>;
}

/// Isolated rendering context owned by exactly one session.
pub trait RenderFrame: Send + Sync {
    /// Topic addressing this frame's window.
    fn topic(&self) -> &str;
    /// Whether the frame document exists and can be written.
    fn is_addressable(&self) -> bool;
    fn bootstrap(&self, document: BootstrapDocument) -> Result<(), FrameError>;
    /// Detaches the frame from its container and releases its bus topic.
    /// Idempotent.
    fn remove(&self);
}
