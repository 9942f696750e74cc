use std::fmt;
use std::sync::Arc;

use vast_frame_proto::{ErrorCode, Namespace, Quartile};

pub type EventCallback = Arc<dyn Fn(&Namespace) + Send + Sync>;
pub type ErrorCallback = Arc<dyn Fn(&Namespace, &AdFailure) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// Rejected before any frame was created.
    InvalidInput,
    /// The frame or the SDK inside it could not be brought up.
    BootstrapFailure,
    /// The SDK reported a decisioning or playback error.
    AdError,
    /// The SDK granted a non-linear or audio-only ad.
    IneligibleAd,
    /// The session deadline elapsed first.
    Timeout,
}

impl FailureKind {
    pub fn as_str(self) -> &'static str {
        match self {
            FailureKind::InvalidInput => "invalid_input",
            FailureKind::BootstrapFailure => "bootstrap_failure",
            FailureKind::AdError => "ad_error",
            FailureKind::IneligibleAd => "ineligible_ad",
            FailureKind::Timeout => "timeout",
        }
    }
}

impl From<Option<ErrorCode>> for FailureKind {
    fn from(code: Option<ErrorCode>) -> Self {
        match code {
            Some(ErrorCode::Bootstrap) => FailureKind::BootstrapFailure,
            Some(ErrorCode::IneligibleAd) => FailureKind::IneligibleAd,
            Some(ErrorCode::AdError) | None => FailureKind::AdError,
        }
    }
}

/// Payload handed to the error callback.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct AdFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl AdFailure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

#[derive(Clone)]
pub(crate) struct Callbacks {
    pub(crate) error: ErrorCallback,
    pub(crate) success: EventCallback,
    pub(crate) impression: EventCallback,
    pub(crate) quartiles: [EventCallback; 5],
}

impl Callbacks {
    pub(crate) fn quartile(&self, quartile: Quartile) -> EventCallback {
        self.quartiles[slot(quartile)].clone()
    }

    pub(crate) fn set_quartile(&mut self, quartile: Quartile, callback: EventCallback) {
        self.quartiles[slot(quartile)] = callback;
    }
}

fn slot(quartile: Quartile) -> usize {
    match quartile {
        Quartile::Q0 => 0,
        Quartile::Q25 => 1,
        Quartile::Q50 => 2,
        Quartile::Q75 => 3,
        Quartile::Q100 => 4,
    }
}

fn noop() -> EventCallback {
    Arc::new(|_: &Namespace| {})
}

impl Default for Callbacks {
    fn default() -> Self {
        Self {
            error: Arc::new(|_: &Namespace, _: &AdFailure| {}),
            success: noop(),
            impression: noop(),
            quartiles: [noop(), noop(), noop(), noop(), noop()],
        }
    }
}

impl fmt::Debug for Callbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callbacks").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test_timeout::timeout]
    fn render_host_codes_map_to_failure_kinds() {
        assert_eq!(FailureKind::from(Some(ErrorCode::Bootstrap)), FailureKind::BootstrapFailure);
        assert_eq!(FailureKind::from(Some(ErrorCode::IneligibleAd)), FailureKind::IneligibleAd);
        assert_eq!(FailureKind::from(Some(ErrorCode::AdError)), FailureKind::AdError);
        assert_eq!(FailureKind::from(None), FailureKind::AdError);
    }

    #[test_timeout::timeout]
    fn failure_displays_its_message() {
        let failure = AdFailure::new(FailureKind::Timeout, "Ad timeout after 5s");
        assert_eq!(failure.to_string(), "Ad timeout after 5s");
    }
}
