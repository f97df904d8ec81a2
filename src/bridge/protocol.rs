//! Host/worker message shapes
//!
//! Requests travel as `{type: "rpc", id, method, payload}`, replies as
//! `{type: "rpc-result", id, result | error}`. Payloads stay JSON on the wire
//! so a host in another process can speak the same protocol; both ends convert
//! to the typed structs below at the edge.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::codec::OscArg;
use crate::constants::DEFAULT_LISTEN_PORT;
use crate::error::BridgeError;
use crate::network::{normalize_port, ListenerStatus};
use crate::recorder::{coerce, BufferedItem, Drained, PushContext, RecordingConfig};

/// Methods the recorder worker answers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecorderMethod {
    StartListener,
    StopListener,
    SetRecordingConfig,
    DrainBuffer,
    ClearQueues,
}

impl RecorderMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecorderMethod::StartListener => "start-listener",
            RecorderMethod::StopListener => "stop-listener",
            RecorderMethod::SetRecordingConfig => "set-recording-config",
            RecorderMethod::DrainBuffer => "drain-buffer",
            RecorderMethod::ClearQueues => "clear-queues",
        }
    }
}

impl fmt::Display for RecorderMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecorderMethod {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "start-listener" => Ok(RecorderMethod::StartListener),
            "stop-listener" => Ok(RecorderMethod::StopListener),
            "set-recording-config" => Ok(RecorderMethod::SetRecordingConfig),
            "drain-buffer" => Ok(RecorderMethod::DrainBuffer),
            "clear-queues" => Ok(RecorderMethod::ClearQueues),
            other => Err(BridgeError::UnknownMethod(other.to_string())),
        }
    }
}

/// Outbound call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcEnvelope {
    pub id: u64,
    pub method: String,
    #[serde(default)]
    pub payload: Value,
}

/// Reply to one call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcReply {
    pub id: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RpcReply {
    pub fn from_result(id: u64, result: Result<Value, BridgeError>) -> Self {
        match result {
            Ok(value) => Self {
                id,
                result: Some(value),
                error: None,
            },
            Err(e) => Self {
                id,
                result: None,
                error: Some(e.to_string()),
            },
        }
    }

    pub fn into_result(self) -> Result<Value, BridgeError> {
        match self.error {
            Some(error) => Err(BridgeError::Remote(error)),
            None => Ok(self.result.unwrap_or(Value::Null)),
        }
    }
}

/// Host to worker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum WorkerMessage {
    Rpc(RpcEnvelope),
    PushOsc { payload: PushOscPayload },
    Shutdown,
}

/// Worker to host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum WorkerEvent {
    RpcResult(RpcReply),
    ListenStatus { payload: ListenerStatus },
}

/// Externally injected sample
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PushOscPayload {
    pub address: String,
    pub value: f64,
    pub args: Vec<OscArg>,
    pub host: Option<String>,
    pub source_port: Option<u16>,
    pub listen_port: Option<u16>,
    pub timestamp: Option<i64>,
}

impl PushOscPayload {
    pub fn into_parts(self) -> (String, f64, PushContext) {
        let context = PushContext {
            args: self.args,
            host: self.host,
            source_port: self.source_port,
            listen_port: self.listen_port,
            timestamp: self.timestamp.filter(|t| *t > 0),
        };
        (self.address, self.value, context)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StartListenerPayload {
    #[serde(deserialize_with = "coerce::deserialize_number")]
    pub port: Option<f64>,
}

impl StartListenerPayload {
    pub fn port(&self) -> u16 {
        normalize_port(self.port, DEFAULT_LISTEN_PORT)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DrainPayload {
    #[serde(deserialize_with = "coerce::deserialize_number")]
    pub limit: Option<f64>,
}

impl DrainPayload {
    /// Requested item count, floored; the engine clamps it to its chunk size
    pub fn limit(&self) -> Option<usize> {
        self.limit
            .filter(|l| l.is_finite())
            .map(|l| l.floor().max(0.0) as usize)
    }
}

/// Typed request
#[derive(Debug, Clone, PartialEq)]
pub enum RecorderRequest {
    StartListener(StartListenerPayload),
    StopListener,
    SetRecordingConfig(RecordingConfig),
    DrainBuffer(DrainPayload),
    ClearQueues,
}

impl RecorderRequest {
    pub fn method(&self) -> RecorderMethod {
        match self {
            RecorderRequest::StartListener(_) => RecorderMethod::StartListener,
            RecorderRequest::StopListener => RecorderMethod::StopListener,
            RecorderRequest::SetRecordingConfig(_) => RecorderMethod::SetRecordingConfig,
            RecorderRequest::DrainBuffer(_) => RecorderMethod::DrainBuffer,
            RecorderRequest::ClearQueues => RecorderMethod::ClearQueues,
        }
    }

    pub fn payload(&self) -> Value {
        let value = match self {
            RecorderRequest::StartListener(p) => serde_json::to_value(p),
            RecorderRequest::SetRecordingConfig(p) => serde_json::to_value(p),
            RecorderRequest::DrainBuffer(p) => serde_json::to_value(p),
            RecorderRequest::StopListener | RecorderRequest::ClearQueues => {
                return Value::Object(Default::default())
            }
        };
        value.unwrap_or(Value::Null)
    }

    /// Parse a method name and JSON payload
    pub fn parse(method: &str, payload: &Value) -> Result<Self, BridgeError> {
        let method: RecorderMethod = method.parse()?;
        let payload = if payload.is_null() {
            Value::Object(Default::default())
        } else {
            payload.clone()
        };
        let invalid = |e: serde_json::Error| BridgeError::InvalidPayload {
            method: method.to_string(),
            reason: e.to_string(),
        };

        Ok(match method {
            RecorderMethod::StartListener => {
                RecorderRequest::StartListener(serde_json::from_value(payload).map_err(invalid)?)
            }
            RecorderMethod::StopListener => RecorderRequest::StopListener,
            RecorderMethod::SetRecordingConfig => RecorderRequest::SetRecordingConfig(
                serde_json::from_value(payload).map_err(invalid)?,
            ),
            RecorderMethod::DrainBuffer => {
                RecorderRequest::DrainBuffer(serde_json::from_value(payload).map_err(invalid)?)
            }
            RecorderMethod::ClearQueues => RecorderRequest::ClearQueues,
        })
    }
}

/// Reply of `start-listener` / `stop-listener`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListenerReply {
    pub ok: bool,
    pub port: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Reply of `set-recording-config` / `clear-queues`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ack {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Ack {
    pub fn ok() -> Self {
        Self { ok: true, error: None }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            ok: false,
            error: Some(error.into()),
        }
    }
}

/// Reply of `drain-buffer`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DrainReply {
    pub ok: bool,
    pub items: Vec<BufferedItem>,
    pub remaining: usize,
    #[serde(default)]
    pub dropped: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<Drained> for DrainReply {
    fn from(drained: Drained) -> Self {
        Self {
            ok: true,
            items: drained.items,
            remaining: drained.remaining,
            dropped: drained.dropped,
            error: None,
        }
    }
}

impl DrainReply {
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            ok: false,
            items: Vec::new(),
            remaining: 0,
            dropped: 0,
            error: Some(error.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_method_names() {
        for method in [
            RecorderMethod::StartListener,
            RecorderMethod::StopListener,
            RecorderMethod::SetRecordingConfig,
            RecorderMethod::DrainBuffer,
            RecorderMethod::ClearQueues,
        ] {
            assert_eq!(method.as_str().parse::<RecorderMethod>().unwrap(), method);
        }
        assert_eq!(
            "reboot".parse::<RecorderMethod>(),
            Err(BridgeError::UnknownMethod("reboot".into()))
        );
    }

    #[test]
    fn test_envelope_wire_shape() {
        let message = WorkerMessage::Rpc(RpcEnvelope {
            id: 3,
            method: "drain-buffer".into(),
            payload: json!({ "limit": 10 }),
        });
        let wire = serde_json::to_value(&message).unwrap();
        assert_eq!(
            wire,
            json!({ "type": "rpc", "id": 3, "method": "drain-buffer", "payload": { "limit": 10 } })
        );

        let reply = WorkerEvent::RpcResult(RpcReply::from_result(
            3,
            Err(BridgeError::UnknownMethod("x".into())),
        ));
        let wire = serde_json::to_value(&reply).unwrap();
        assert_eq!(wire["type"], "rpc-result");
        assert_eq!(wire["error"], "Unknown recorder RPC method: x");
        assert!(wire.get("result").is_none());
    }

    #[test]
    fn test_parse_requests() {
        let request = RecorderRequest::parse("start-listener", &json!({ "port": 70000 })).unwrap();
        match request {
            RecorderRequest::StartListener(p) => assert_eq!(p.port(), 65535),
            other => panic!("unexpected {other:?}"),
        }

        let request = RecorderRequest::parse("start-listener", &Value::Null).unwrap();
        assert_eq!(
            request,
            RecorderRequest::StartListener(StartListenerPayload::default())
        );

        let request = RecorderRequest::parse(
            "set-recording-config",
            &json!({ "armed": true, "playing": true, "fps": 24, "startWallMs": 1000 }),
        )
        .unwrap();
        match request {
            RecorderRequest::SetRecordingConfig(config) => {
                assert!(config.armed && config.playing);
                assert_eq!(config.fps, Some(24.0));
                assert_eq!(config.start_wall_ms, Some(1000.0));
                assert_eq!(config.project_length, None);
            }
            other => panic!("unexpected {other:?}"),
        }

        let err = RecorderRequest::parse("drain-buffer", &json!("everything")).unwrap_err();
        assert!(matches!(err, BridgeError::InvalidPayload { .. }));
    }

    #[test]
    fn test_parse_coerces_loose_values() {
        let request = RecorderRequest::parse(
            "set-recording-config",
            &json!({ "armed": 1, "playing": "yes", "fps": "30", "startPlayhead": null }),
        )
        .unwrap();
        match request {
            RecorderRequest::SetRecordingConfig(config) => {
                assert!(config.armed && config.playing);
                assert_eq!(config.fps, Some(30.0));
                assert_eq!(config.start_playhead, None);
            }
            other => panic!("unexpected {other:?}"),
        }

        let request =
            RecorderRequest::parse("set-recording-config", &json!({ "armed": 0, "playing": "" }))
                .unwrap();
        match request {
            RecorderRequest::SetRecordingConfig(config) => assert!(!config.armed && !config.playing),
            other => panic!("unexpected {other:?}"),
        }

        match RecorderRequest::parse("start-listener", &json!({ "port": "9005" })).unwrap() {
            RecorderRequest::StartListener(p) => assert_eq!(p.port(), 9005),
            other => panic!("unexpected {other:?}"),
        }

        match RecorderRequest::parse("drain-buffer", &json!({ "limit": "many" })).unwrap() {
            RecorderRequest::DrainBuffer(p) => assert_eq!(p.limit(), None),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_drain_limit() {
        assert_eq!(DrainPayload { limit: Some(12.9) }.limit(), Some(12));
        assert_eq!(DrainPayload { limit: Some(-4.0) }.limit(), Some(0));
        assert_eq!(DrainPayload { limit: Some(f64::NAN) }.limit(), None);
        assert_eq!(DrainPayload::default().limit(), None);
    }

    #[test]
    fn test_request_payload_roundtrip() {
        let request = RecorderRequest::DrainBuffer(DrainPayload { limit: Some(5.0) });
        let parsed =
            RecorderRequest::parse(request.method().as_str(), &request.payload()).unwrap();
        assert_eq!(parsed, request);
    }

    #[test]
    fn test_reply_into_result() {
        let ok = RpcReply::from_result(1, Ok(json!({ "ok": true })));
        assert_eq!(ok.into_result().unwrap(), json!({ "ok": true }));

        let err = RpcReply {
            id: 2,
            result: None,
            error: Some("boom".into()),
        };
        assert_eq!(err.into_result(), Err(BridgeError::Remote("boom".into())));
    }
}
