use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    pub const ZERO: Size = Size {
        width: 0,
        height: 0,
    };

    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Raw size readings taken inside the render frame, most precise first.
/// A zero dimension means the source had nothing to report for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Measurements {
    pub frame_client: Option<Size>,
    pub frame_offset: Option<Size>,
    pub window_inner: Option<Size>,
    pub document_client: Option<Size>,
    pub body_client: Option<Size>,
}

impl Measurements {
    /// Resolves the allocated area. The frame element is trusted only when it
    /// reports both dimensions; otherwise each dimension falls back through
    /// the window, document, and body readings to `default`.
    pub fn resolve(&self, default: Size) -> Size {
        let frame = [self.frame_client, self.frame_offset];
        let width = first_nonzero(&frame, |size| size.width);
        let height = first_nonzero(&frame, |size| size.height);
        if let (Some(width), Some(height)) = (width, height) {
            return Size::new(width, height);
        }

        let viewport = [self.window_inner, self.document_client, self.body_client];
        Size::new(
            first_nonzero(&viewport, |size| size.width).unwrap_or(default.width),
            first_nonzero(&viewport, |size| size.height).unwrap_or(default.height),
        )
    }
}

fn first_nonzero(sources: &[Option<Size>], dimension: impl Fn(&Size) -> u32) -> Option<u32> {
    sources
        .iter()
        .flatten()
        .map(dimension)
        .find(|value| *value > 0)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaybackPolicy {
    pub muted: bool,
    pub controls: bool,
    pub fullscreen: bool,
}

impl PlaybackPolicy {
    /// Muted content surface with no controls and no way into fullscreen.
    pub const fn locked_inline() -> Self {
        Self {
            muted: true,
            controls: false,
            fullscreen: false,
        }
    }
}

#[derive(Debug, Error)]
pub enum SurfaceError {
    #[error("surface element missing: {0}")]
    MissingElement(&'static str),
    #[error("surface rejected layout: {0}")]
    Layout(String),
}

/// Layout access for the display surface inside the render frame.
pub trait RenderSurface: Send + Sync {
    fn measure(&self) -> Measurements;
    /// Size the ad container currently reports, if it has been laid out.
    fn slot_size(&self) -> Option<Size>;
    /// Pins the surface root to exactly `size` pixels with the ad container
    /// and content surface filling it.
    fn apply_size(&self, size: Size) -> Result<(), SurfaceError>;
    fn apply_playback_policy(&self, policy: PlaybackPolicy) -> Result<(), SurfaceError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    const DEFAULT: Size = Size::new(640, 360);

    #[test_timeout::timeout]
    fn frame_client_wins_when_complete() {
        let measurements = Measurements {
            frame_client: Some(Size::new(300, 250)),
            frame_offset: Some(Size::new(302, 252)),
            window_inner: Some(Size::new(800, 600)),
            ..Measurements::default()
        };
        assert_eq!(measurements.resolve(DEFAULT), Size::new(300, 250));
    }

    #[test_timeout::timeout]
    fn frame_offset_fills_missing_client_dimension() {
        let measurements = Measurements {
            frame_client: Some(Size::new(0, 250)),
            frame_offset: Some(Size::new(320, 0)),
            ..Measurements::default()
        };
        assert_eq!(measurements.resolve(DEFAULT), Size::new(320, 250));
    }

    #[test_timeout::timeout]
    fn falls_back_through_viewport_sources() {
        let measurements = Measurements {
            frame_client: Some(Size::new(300, 0)),
            window_inner: Some(Size::new(0, 0)),
            document_client: Some(Size::new(728, 0)),
            body_client: Some(Size::new(100, 90)),
            ..Measurements::default()
        };
        assert_eq!(measurements.resolve(DEFAULT), Size::new(728, 90));
    }

    #[test_timeout::timeout]
    fn uses_default_when_nothing_reports() {
        assert_eq!(Measurements::default().resolve(DEFAULT), DEFAULT);
        let partial = Measurements {
            body_client: Some(Size::new(0, 480)),
            ..Measurements::default()
        };
        assert_eq!(partial.resolve(DEFAULT), Size::new(640, 480));
    }
}
