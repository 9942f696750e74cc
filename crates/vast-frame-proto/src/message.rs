use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

pub const DEFAULT_ERROR_MESSAGE: &str = "Unknown error from render host";

/// Messages exchanged between a session controller and its render host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolMessage {
    /// Render host document constructed.
    Load,
    /// Render host is listening and sized; it may be started.
    Ready,
    Start { input: String },
    Abort,
    Impression,
    /// Raw progress value as reported; see [`Quartile::from_percent`].
    Quartile { value: Option<i64> },
    Success,
    Error {
        message: String,
        code: Option<ErrorCode>,
    },
}

impl ProtocolMessage {
    pub fn kind(&self) -> MessageKind {
        match self {
            ProtocolMessage::Load => MessageKind::Load,
            ProtocolMessage::Ready => MessageKind::Ready,
            ProtocolMessage::Start { .. } => MessageKind::Start,
            ProtocolMessage::Abort => MessageKind::Abort,
            ProtocolMessage::Impression => MessageKind::Impression,
            ProtocolMessage::Quartile { .. } => MessageKind::Quartile,
            ProtocolMessage::Success => MessageKind::Success,
            ProtocolMessage::Error { .. } => MessageKind::Error,
        }
    }

    pub fn quartile(quartile: Quartile) -> Self {
        ProtocolMessage::Quartile {
            value: Some(quartile.percent()),
        }
    }

    pub fn error(message: impl Into<String>, code: ErrorCode) -> Self {
        ProtocolMessage::Error {
            message: message.into(),
            code: Some(code),
        }
    }

    pub(crate) fn to_wire(&self) -> WireMessage {
        let data = match self {
            ProtocolMessage::Start { input } => json!({ "input": input }),
            ProtocolMessage::Quartile { value } => json!({ "value": value }),
            ProtocolMessage::Error { message, code } => {
                let mut data = Map::new();
                data.insert("message".into(), Value::String(message.clone()));
                if let Some(code) = code {
                    data.insert("code".into(), Value::String(code.as_str().into()));
                }
                Value::Object(data)
            }
            _ => Value::Object(Map::new()),
        };
        WireMessage {
            kind: self.kind().as_str().to_string(),
            data,
        }
    }

    pub(crate) fn from_wire(wire: WireMessage) -> Option<Self> {
        let kind = MessageKind::parse(&wire.kind)?;
        let data = match wire.data {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        let message = match kind {
            MessageKind::Load => ProtocolMessage::Load,
            MessageKind::Ready => ProtocolMessage::Ready,
            MessageKind::Start => ProtocolMessage::Start {
                input: data.get("input")?.as_str()?.to_string(),
            },
            MessageKind::Abort => ProtocolMessage::Abort,
            MessageKind::Impression => ProtocolMessage::Impression,
            MessageKind::Quartile => ProtocolMessage::Quartile {
                value: data.get("value").and_then(Value::as_i64),
            },
            MessageKind::Success => ProtocolMessage::Success,
            MessageKind::Error => ProtocolMessage::Error {
                message: data
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or(DEFAULT_ERROR_MESSAGE)
                    .to_string(),
                code: data
                    .get("code")
                    .and_then(Value::as_str)
                    .and_then(ErrorCode::parse),
            },
        };
        Some(message)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    Load,
    Ready,
    Start,
    Abort,
    Impression,
    Quartile,
    Success,
    Error,
}

impl MessageKind {
    pub fn as_str(self) -> &'static str {
        match self {
            MessageKind::Load => "load",
            MessageKind::Ready => "ready",
            MessageKind::Start => "start",
            MessageKind::Abort => "abort",
            MessageKind::Impression => "impression",
            MessageKind::Quartile => "quartile",
            MessageKind::Success => "success",
            MessageKind::Error => "error",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        let kind = match value {
            "load" => MessageKind::Load,
            "ready" => MessageKind::Ready,
            "start" => MessageKind::Start,
            "abort" => MessageKind::Abort,
            "impression" => MessageKind::Impression,
            "quartile" => MessageKind::Quartile,
            "success" => MessageKind::Success,
            "error" => MessageKind::Error,
            _ => return None,
        };
        Some(kind)
    }
}

/// Classifies render host failures so the controller can report them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    Bootstrap,
    AdError,
    IneligibleAd,
}

impl ErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::Bootstrap => "bootstrap",
            ErrorCode::AdError => "ad_error",
            ErrorCode::IneligibleAd => "ineligible_ad",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "bootstrap" => Some(ErrorCode::Bootstrap),
            "ad_error" => Some(ErrorCode::AdError),
            "ineligible_ad" => Some(ErrorCode::IneligibleAd),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Quartile {
    Q0,
    Q25,
    Q50,
    Q75,
    Q100,
}

impl Quartile {
    pub const ALL: [Quartile; 5] = [
        Quartile::Q0,
        Quartile::Q25,
        Quartile::Q50,
        Quartile::Q75,
        Quartile::Q100,
    ];

    pub fn percent(self) -> i64 {
        match self {
            Quartile::Q0 => 0,
            Quartile::Q25 => 25,
            Quartile::Q50 => 50,
            Quartile::Q75 => 75,
            Quartile::Q100 => 100,
        }
    }

    pub fn from_percent(value: i64) -> Option<Self> {
        Quartile::ALL
            .into_iter()
            .find(|quartile| quartile.percent() == value)
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct WireMessage {
    #[serde(rename = "type")]
    pub(crate) kind: String,
    #[serde(default)]
    pub(crate) data: Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test_timeout::timeout]
    fn quartile_accepts_only_checkpoints() {
        for value in [0, 25, 50, 75, 100] {
            let quartile = Quartile::from_percent(value).expect("checkpoint");
            assert_eq!(quartile.percent(), value);
        }
        for value in [-25, 1, 33, 99, 101, 125] {
            assert_eq!(Quartile::from_percent(value), None, "value {value}");
        }
    }

    #[test_timeout::timeout]
    fn unit_messages_carry_empty_data() {
        let wire = ProtocolMessage::Ready.to_wire();
        assert_eq!(wire.kind, "ready");
        assert_eq!(wire.data, json!({}));
    }

    #[test_timeout::timeout]
    fn error_without_message_gets_default() {
        let wire = WireMessage {
            kind: "error".into(),
            data: json!({ "detail": "ignored" }),
        };
        assert_eq!(
            ProtocolMessage::from_wire(wire),
            Some(ProtocolMessage::Error {
                message: DEFAULT_ERROR_MESSAGE.into(),
                code: None,
            })
        );
    }

    #[test_timeout::timeout]
    fn start_without_input_is_rejected() {
        let wire = WireMessage {
            kind: "start".into(),
            data: Value::Null,
        };
        assert_eq!(ProtocolMessage::from_wire(wire), None);
    }

    #[test_timeout::timeout]
    fn unknown_kind_is_rejected() {
        let wire = WireMessage {
            kind: "pause".into(),
            data: json!({}),
        };
        assert_eq!(ProtocolMessage::from_wire(wire), None);
    }

    #[test_timeout::timeout]
    fn non_integer_quartile_value_is_kept_as_absent() {
        let wire = WireMessage {
            kind: "quartile".into(),
            data: json!({ "value": "fifty" }),
        };
        assert_eq!(
            ProtocolMessage::from_wire(wire),
            Some(ProtocolMessage::Quartile { value: None })
        );
    }
}
