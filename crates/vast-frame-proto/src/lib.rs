//! Wire protocol shared by the ad session controller and the render host
//! that runs inside the isolated frame. Kept free of runtime dependencies so
//! either side can embed it.

mod envelope;
mod message;

use std::fmt;

pub use envelope::EnvelopeCodec;
pub use message::{ErrorCode, MessageKind, ProtocolMessage, Quartile, DEFAULT_ERROR_MESSAGE};
pub(crate) use message::WireMessage;

pub const NAMESPACE_PREFIX: &str = "svp";

/// Per-session routing credential. Every envelope starts with it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Namespace(String);

impl Namespace {
    pub fn generate() -> Self {
        Self(format!(
            "{NAMESPACE_PREFIX}-{}:",
            uuid::Uuid::new_v4().simple()
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test_timeout::timeout]
    fn generated_namespaces_are_prefixed_and_unique() {
        let first = Namespace::generate();
        let second = Namespace::generate();
        assert_ne!(first, second);
        assert!(first.as_str().starts_with("svp-"));
        assert!(first.as_str().ends_with(':'));
        assert_eq!(first.as_str().len(), "svp-".len() + 32 + 1);
    }
}
