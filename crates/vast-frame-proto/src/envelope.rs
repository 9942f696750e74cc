use bytes::Bytes;

use crate::{Namespace, ProtocolMessage, WireMessage};

/// Stamps outgoing messages with a session namespace and accepts only
/// incoming messages carrying exactly that namespace.
///
/// Anything that fails to decode is treated as traffic for somebody else:
/// `decode` returns `None` and never an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvelopeCodec {
    namespace: Namespace,
}

impl EnvelopeCodec {
    pub fn new(namespace: Namespace) -> Self {
        Self { namespace }
    }

    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    pub fn encode(&self, message: &ProtocolMessage) -> String {
        // WireMessage holds only strings and JSON values, serialization cannot fail.
        let body = serde_json::to_string(&message.to_wire()).unwrap_or_default();
        format!("{}{}", self.namespace.as_str(), body)
    }

    pub fn encode_bytes(&self, message: &ProtocolMessage) -> Bytes {
        Bytes::from(self.encode(message))
    }

    pub fn decode(&self, raw: &str) -> Option<ProtocolMessage> {
        let body = raw.strip_prefix(self.namespace.as_str())?;
        let wire: WireMessage = serde_json::from_str(body).ok()?;
        ProtocolMessage::from_wire(wire)
    }

    pub fn decode_bytes(&self, raw: &[u8]) -> Option<ProtocolMessage> {
        std::str::from_utf8(raw).ok().and_then(|text| self.decode(text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ErrorCode, Quartile};

    fn codec() -> EnvelopeCodec {
        EnvelopeCodec::new(Namespace::generate())
    }

    #[test_timeout::timeout]
    fn encodes_namespace_prefix_and_typed_body() {
        let codec = codec();
        let raw = codec.encode(&ProtocolMessage::Start {
            input: "https://ads.example/tag".into(),
        });
        let body = raw
            .strip_prefix(codec.namespace().as_str())
            .expect("namespace prefix");
        let value: serde_json::Value = serde_json::from_str(body).expect("json body");
        assert_eq!(value["type"], "start");
        assert_eq!(value["data"]["input"], "https://ads.example/tag");
    }

    #[test_timeout::timeout]
    fn decodes_messages_for_its_own_namespace() {
        let codec = codec();
        let raw = codec.encode(&ProtocolMessage::error("X", ErrorCode::AdError));
        assert_eq!(
            codec.decode(&raw),
            Some(ProtocolMessage::Error {
                message: "X".into(),
                code: Some(ErrorCode::AdError),
            })
        );
        let quartile = codec.encode(&ProtocolMessage::quartile(Quartile::Q75));
        assert_eq!(
            codec.decode_bytes(quartile.as_bytes()),
            Some(ProtocolMessage::Quartile { value: Some(75) })
        );
    }

    #[test_timeout::timeout]
    fn drops_messages_from_other_sessions() {
        let mine = codec();
        let theirs = codec();
        let raw = theirs.encode(&ProtocolMessage::Success);
        assert_eq!(mine.decode(&raw), None);
    }

    #[test_timeout::timeout]
    fn drops_malformed_payloads() {
        let codec = codec();
        let ns = codec.namespace().as_str().to_string();
        for body in [
            "",
            "not json",
            "{\"data\":{}}",
            "{\"type\":7}",
            "{\"type\":\"teleport\"}",
            "[\"ready\"]",
            "null",
        ] {
            assert_eq!(codec.decode(&format!("{ns}{body}")), None, "body {body:?}");
        }
        assert_eq!(codec.decode("{\"type\":\"ready\"}"), None);
        assert_eq!(codec.decode_bytes(&[0xff, 0xfe, 0x00]), None);
    }

    #[test_timeout::timeout]
    fn accepts_unit_messages_without_data() {
        let codec = codec();
        let raw = format!("{}{{\"type\":\"impression\"}}", codec.namespace());
        assert_eq!(codec.decode(&raw), Some(ProtocolMessage::Impression));
    }
}
