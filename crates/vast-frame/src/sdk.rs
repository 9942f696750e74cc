//! Interface to the external ad decisioning/rendering SDK. The render host
//! only drives it through these traits; selection, decoding, and drawing
//! stay inside the SDK.

use std::fmt;

use thiserror::Error;
use tokio::sync::mpsc;
use url::Url;
use vast_frame_proto::Quartile;

use crate::surface::Size;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SdkError {
    #[error("display container init failed: {0}")]
    Init(String),
    #[error("ad request failed: {0}")]
    Request(String),
    #[error("ad renderer failed: {0}")]
    Renderer(String),
    #[error("invalid ad tag url: {0}")]
    InvalidTag(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewMode {
    Normal,
    Fullscreen,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdSource {
    /// Remote locator the SDK fetches the ad response from.
    TagUrl(Url),
    /// Ad response document passed in directly.
    InlineResponse(String),
}

impl AdSource {
    pub fn classify(input: &str) -> Result<Self, SdkError> {
        let remote = input
            .split_once("://")
            .map(|(scheme, _)| {
                scheme.eq_ignore_ascii_case("http") || scheme.eq_ignore_ascii_case("https")
            })
            .unwrap_or(false);
        if !remote {
            return Ok(AdSource::InlineResponse(input.to_string()));
        }
        Url::parse(input)
            .map(AdSource::TagUrl)
            .map_err(|err| SdkError::InvalidTag(err.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdsRequest {
    pub source: AdSource,
    pub linear_slot: Size,
    pub non_linear_slot: Size,
    pub autoplay: bool,
    pub muted_autoplay: bool,
}

impl AdsRequest {
    /// Linear-only request declaring muted autoplay.
    pub fn linear(source: AdSource, slot: Size) -> Self {
        Self {
            source,
            linear_slot: slot,
            non_linear_slot: Size::ZERO,
            autoplay: true,
            muted_autoplay: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AdInfo {
    pub linear: bool,
    pub content_type: Option<String>,
}

impl AdInfo {
    pub fn linear_video(content_type: &str) -> Self {
        Self {
            linear: true,
            content_type: Some(content_type.to_string()),
        }
    }

    pub fn is_audio_only(&self) -> bool {
        self.content_type
            .as_deref()
            .map(|content_type| content_type.starts_with("audio"))
            .unwrap_or(false)
    }

    pub fn is_eligible(&self) -> bool {
        self.linear && !self.is_audio_only()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdEventKind {
    Impression,
    Started,
    FirstQuartile,
    Midpoint,
    ThirdQuartile,
    Complete,
    AllAdsCompleted,
}

impl AdEventKind {
    pub fn quartile(self) -> Option<Quartile> {
        match self {
            AdEventKind::Started => Some(Quartile::Q0),
            AdEventKind::FirstQuartile => Some(Quartile::Q25),
            AdEventKind::Midpoint => Some(Quartile::Q50),
            AdEventKind::ThirdQuartile => Some(Quartile::Q75),
            AdEventKind::Complete => Some(Quartile::Q100),
            AdEventKind::Impression | AdEventKind::AllAdsCompleted => None,
        }
    }

    /// Events describing one specific ad, subject to the eligibility check.
    pub fn is_ad_scoped(self) -> bool {
        !matches!(self, AdEventKind::AllAdsCompleted)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdEvent {
    pub kind: AdEventKind,
    pub ad: Option<AdInfo>,
}

pub enum SdkEvent {
    /// Decisioning finished and the SDK granted a renderer, or failed to.
    RendererReady(Result<Box<dyn AdRenderer>, SdkError>),
    Ad(AdEvent),
    /// Decisioning or playback error, with the SDK's description.
    AdError(String),
}

impl fmt::Debug for SdkEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SdkEvent::RendererReady(Ok(_)) => f.write_str("RendererReady(Ok)"),
            SdkEvent::RendererReady(Err(err)) => write!(f, "RendererReady(Err({err}))"),
            SdkEvent::Ad(event) => f.debug_tuple("Ad").field(event).finish(),
            SdkEvent::AdError(message) => f.debug_tuple("AdError").field(message).finish(),
        }
    }
}

pub type SdkEventSender = mpsc::UnboundedSender<SdkEvent>;

/// Playback handle the SDK grants once an ad has been selected.
pub trait AdRenderer: Send {
    fn init(&mut self, size: Size, mode: ViewMode) -> Result<(), SdkError>;
    fn start(&mut self) -> Result<(), SdkError>;
    fn resize(&mut self, size: Size, mode: ViewMode) -> Result<(), SdkError>;
    fn set_volume(&mut self, volume: f32) -> Result<(), SdkError>;
    fn destroy(&mut self) -> Result<(), SdkError>;
}

pub trait AdSdk: Send + Sync {
    /// Binds the ad display container and the content surface, then
    /// initializes the container.
    fn bind_display(&self) -> Result<(), SdkError>;
    /// Starts decisioning for `request`. Outcomes arrive on `events`.
    fn request_ads(&self, request: AdsRequest, events: SdkEventSender) -> Result<(), SdkError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test_timeout::timeout]
    fn classifies_http_locators_case_insensitively() {
        let source = AdSource::classify("HTTPS://ads.example/tag?sz=640x360").expect("url");
        assert!(matches!(source, AdSource::TagUrl(url) if url.host_str() == Some("ads.example")));
        assert!(matches!(
            AdSource::classify("http://ads.example/vast.xml"),
            Ok(AdSource::TagUrl(_))
        ));
    }

    #[test_timeout::timeout]
    fn inline_documents_stay_inline() {
        let xml = "<VAST version=\"3.0\" xmlns:x=\"http://example.com\"></VAST>";
        assert_eq!(
            AdSource::classify(xml),
            Ok(AdSource::InlineResponse(xml.to_string()))
        );
        assert!(matches!(
            AdSource::classify("ftp://ads.example/tag"),
            Ok(AdSource::InlineResponse(_))
        ));
    }

    #[test_timeout::timeout]
    fn eligibility_requires_linear_video() {
        assert!(AdInfo::linear_video("video/mp4").is_eligible());
        assert!(!AdInfo::linear_video("audio/mpeg").is_eligible());
        assert!(!AdInfo {
            linear: false,
            content_type: Some("video/mp4".into()),
        }
        .is_eligible());
        assert!(AdInfo {
            linear: true,
            content_type: None,
        }
        .is_eligible());
    }

    #[test_timeout::timeout]
    fn quartile_signals_map_to_checkpoints() {
        assert_eq!(AdEventKind::Started.quartile(), Some(Quartile::Q0));
        assert_eq!(AdEventKind::Midpoint.quartile(), Some(Quartile::Q50));
        assert_eq!(AdEventKind::Complete.quartile(), Some(Quartile::Q100));
        assert_eq!(AdEventKind::Impression.quartile(), None);
        assert!(!AdEventKind::AllAdsCompleted.is_ad_scoped());
    }
}
