//! Typed messages and their array encoding.

use crate::{ErrorPayload, MessageKind, MessageName, WireError};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Caller-generated request identifier (UUID v4 string).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(String);

impl RequestId {
    /// Generate a fresh identifier.
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for RequestId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for RequestId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Status token of a terminal message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    Success,
    Error,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Success => "SUCCESS",
            Status::Error => "ERROR",
        }
    }

    fn parse(value: &Value) -> Option<Self> {
        match value.as_str()? {
            "SUCCESS" => Some(Status::Success),
            "ERROR" => Some(Status::Error),
            _ => None,
        }
    }
}

/// Result carried by a terminal message.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Success(Vec<Value>),
    Error(ErrorPayload),
}

impl Outcome {
    pub fn status(&self) -> Status {
        match self {
            Outcome::Success(_) => Status::Success,
            Outcome::Error(_) => Status::Error,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success(_))
    }
}

/// Named message as seen by a handler.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    /// Message name.
    pub name: MessageName,
    /// Request id, present for RPC requests only.
    pub id: Option<RequestId>,
    /// Remaining positional arguments.
    pub args: Vec<Value>,
}

impl Envelope {
    /// Decode the positional argument at `index`.
    pub fn arg<T: DeserializeOwned>(&self, index: usize) -> Result<T, WireError> {
        let value = self
            .args
            .get(index)
            .ok_or(WireError::MissingArgument(index))?;
        serde_json::from_value(value.clone())
            .map_err(|source| WireError::InvalidArgument { index, source })
    }

    /// Decode an optional positional argument; absent and `null` are `None`.
    pub fn opt_arg<T: DeserializeOwned>(&self, index: usize) -> Result<Option<T>, WireError> {
        match self.args.get(index) {
            None | Some(Value::Null) => Ok(None),
            Some(value) => serde_json::from_value(value.clone())
                .map(Some)
                .map_err(|source| WireError::InvalidArgument { index, source }),
        }
    }
}

/// One message on a pipe.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// `[name, id, ...args]`
    Request {
        name: MessageName,
        id: RequestId,
        args: Vec<Value>,
    },
    /// `[name, ...args]`
    Event { name: MessageName, args: Vec<Value> },
    /// `[id, status, ...]`
    Response { id: RequestId, outcome: Outcome },
}

impl Message {
    pub fn success(id: RequestId, result: Vec<Value>) -> Self {
        Message::Response {
            id,
            outcome: Outcome::Success(result),
        }
    }

    pub fn error(id: RequestId, payload: ErrorPayload) -> Self {
        Message::Response {
            id,
            outcome: Outcome::Error(payload),
        }
    }

    /// Short label for logs.
    pub fn label(&self) -> String {
        match self {
            Message::Request { name, id, .. } => format!("{} #{}", name, id),
            Message::Event { name, .. } => name.to_string(),
            Message::Response { id, outcome } => format!("#{} {}", id, outcome.status().as_str()),
        }
    }

    /// Array encoding.
    pub fn to_wire(&self) -> Value {
        let mut items = Vec::new();
        match self {
            Message::Request { name, id, args } => {
                items.push(Value::String(name.as_str().to_string()));
                items.push(Value::String(id.as_str().to_string()));
                items.extend(args.iter().cloned());
            }
            Message::Event { name, args } => {
                items.push(Value::String(name.as_str().to_string()));
                items.extend(args.iter().cloned());
            }
            Message::Response { id, outcome } => {
                items.push(Value::String(id.as_str().to_string()));
                items.push(Value::String(outcome.status().as_str().to_string()));
                match outcome {
                    Outcome::Success(result) => items.extend(result.iter().cloned()),
                    Outcome::Error(payload) => items.push(
                        serde_json::to_value(payload).unwrap_or_else(|_| {
                            Value::String(payload.message.clone())
                        }),
                    ),
                }
            }
        }
        Value::Array(items)
    }

    /// Parse the array encoding.
    ///
    /// A head that names a known message is a request or an event depending
    /// on the name. Any other head followed by `SUCCESS`/`ERROR` is a
    /// terminal message for that request id.
    pub fn from_wire(value: Value) -> Result<Self, WireError> {
        let Value::Array(mut items) = value else {
            return Err(WireError::Malformed("expected a JSON array".to_string()));
        };
        if items.is_empty() {
            return Err(WireError::Malformed("empty message".to_string()));
        }

        let head = match items.remove(0) {
            Value::String(head) => head,
            other => {
                return Err(WireError::Malformed(format!(
                    "message head must be a string, got {}",
                    other
                )))
            }
        };

        if let Ok(name) = head.parse::<MessageName>() {
            return match name.kind() {
                MessageKind::Event => Ok(Message::Event { name, args: items }),
                MessageKind::Request => {
                    if items.is_empty() {
                        return Err(WireError::Malformed(format!(
                            "request {} without an id",
                            name
                        )));
                    }
                    match items.remove(0) {
                        Value::String(id) if !id.is_empty() => Ok(Message::Request {
                            name,
                            id: RequestId::from(id),
                            args: items,
                        }),
                        other => Err(WireError::Malformed(format!(
                            "request {} has invalid id {}",
                            name, other
                        ))),
                    }
                }
            };
        }

        let status = items.first().and_then(Status::parse);
        match status {
            Some(status) => {
                items.remove(0);
                let id = RequestId::from(head);
                let outcome = match status {
                    Status::Success => Outcome::Success(items),
                    Status::Error => {
                        Outcome::Error(ErrorPayload::from_wire_value(items.into_iter().next()))
                    }
                };
                Ok(Message::Response { id, outcome })
            }
            None => Err(WireError::UnknownMessage(head)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;
    use serde_json::json;

    #[test]
    fn test_request_wire_shape() {
        let message = Message::Request {
            name: MessageName::SecretDecrypt,
            id: RequestId::from("req-1"),
            args: vec![json!("resource-1")],
        };

        assert_eq!(
            message.to_wire(),
            json!(["secret.decrypt", "req-1", "resource-1"])
        );
    }

    #[test]
    fn test_terminal_wire_shape() {
        let ok = Message::success(RequestId::from("req-1"), vec![json!({"a": 1})]);
        assert_eq!(ok.to_wire(), json!(["req-1", "SUCCESS", {"a": 1}]));

        let err = Message::error(
            RequestId::from("req-2"),
            ErrorPayload::new(ErrorKind::CryptoError, "decrypt failed"),
        );
        assert_eq!(
            err.to_wire(),
            json!(["req-2", "ERROR", {"kind": "crypto_error", "message": "decrypt failed"}])
        );
    }

    #[test]
    fn test_parse_request() {
        let parsed = Message::from_wire(json!(["form.fill", "abc", "", "myp@ss", "https://x"]))
            .unwrap();

        match parsed {
            Message::Request { name, id, args } => {
                assert_eq!(name, MessageName::FormFill);
                assert_eq!(id.as_str(), "abc");
                assert_eq!(args.len(), 3);
            }
            other => panic!("expected request, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_event_has_no_id() {
        let parsed = Message::from_wire(json!(["auth.login-failed", "bad passphrase"])).unwrap();
        assert_eq!(
            parsed,
            Message::Event {
                name: MessageName::AuthLoginFailed,
                args: vec![json!("bad passphrase")],
            }
        );
    }

    #[test]
    fn test_parse_terminal_messages() {
        let ok = Message::from_wire(json!(["req-9", "SUCCESS"])).unwrap();
        assert_eq!(ok, Message::success(RequestId::from("req-9"), vec![]));

        let err = Message::from_wire(json!(["req-9", "ERROR", "legacy message"])).unwrap();
        match err {
            Message::Response {
                outcome: Outcome::Error(payload),
                ..
            } => assert_eq!(payload.message, "legacy message"),
            other => panic!("expected error response, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(Message::from_wire(json!({"not": "an array"})).is_err());
        assert!(Message::from_wire(json!([])).is_err());
        assert!(Message::from_wire(json!([42, "SUCCESS"])).is_err());
        assert!(Message::from_wire(json!(["secret.decrypt"])).is_err());
        assert!(matches!(
            Message::from_wire(json!(["nobody.knows", "arg"])),
            Err(WireError::UnknownMessage(_))
        ));
    }

    #[test]
    fn test_envelope_args() {
        let envelope = Envelope {
            name: MessageName::TagsUpdateResourceTags,
            id: Some(RequestId::from("r")),
            args: vec![json!("resource-1"), json!([{"slug": "x"}]), Value::Null],
        };

        let resource_id: String = envelope.arg(0).unwrap();
        assert_eq!(resource_id, "resource-1");
        assert!(matches!(
            envelope.arg::<u64>(0),
            Err(WireError::InvalidArgument { index: 0, .. })
        ));
        assert!(matches!(
            envelope.arg::<String>(5),
            Err(WireError::MissingArgument(5))
        ));
        assert_eq!(envelope.opt_arg::<String>(2).unwrap(), None);
        assert_eq!(envelope.opt_arg::<String>(3).unwrap(), None);
    }

    #[test]
    fn test_request_id_uniqueness() {
        let a = RequestId::new();
        let b = RequestId::new();
        assert_ne!(a, b);
        assert!(uuid::Uuid::parse_str(a.as_str()).is_ok());
    }
}
