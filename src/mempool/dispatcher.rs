//! Inbound frame classification.
//!
//! [`classify`] never fails: whatever arrives maps to one of the [`Frame`]
//! variants and the caller decides what to do with it.

use crate::errors::{AppError, Result};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

/// Typed view of one inbound text frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// `{"id":1,"result":"<subscription id>"}`
    SubscriptionAck { id: String },
    /// `{"method":"eth_subscription","params":{"subscription":..,"result":"<hash>"}}`
    Notification {
        tx_hash: String,
        subscription: Option<String>,
    },
    /// Peer-reported JSON-RPC error object.
    ProtocolError { message: String },
    Unparseable,
}

#[derive(Debug, Deserialize)]
struct RpcErrorObject {
    #[serde(default)]
    code: Option<i64>,
    #[serde(default)]
    message: Option<String>,
}

/// Map a raw frame onto a [`Frame`]. Shape errors become
/// [`Frame::Unparseable`].
pub fn classify(raw: &str) -> Frame {
    match parse_frame(raw) {
        Ok(frame) => frame,
        Err(e) => {
            debug!(error = %e, "[DISPATCH] unparseable frame");
            Frame::Unparseable
        }
    }
}

/// Strict variant of [`classify`]: frames that fit no known shape are
/// reported as [`AppError::Parse`].
pub fn parse_frame(raw: &str) -> Result<Frame> {
    let parsed = match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => map,
        Ok(_) => return Err(AppError::Parse("frame is not a JSON object".into())),
        Err(e) => return Err(AppError::Parse(format!("frame is not valid JSON: {e}"))),
    };

    if let Some(err) = parsed.get("error").filter(|e| !e.is_null()) {
        return Ok(Frame::ProtocolError {
            message: describe_error(err),
        });
    }

    if let Some(params) = parsed.get("params") {
        let Some(Value::String(hash)) = params.get("result") else {
            return Err(AppError::Parse("params without a string result".into()));
        };
        let subscription = params
            .get("subscription")
            .and_then(Value::as_str)
            .map(str::to_string);
        return Ok(Frame::Notification {
            tx_hash: hash.clone(),
            subscription,
        });
    }

    match parsed.get("result") {
        Some(Value::String(id)) => Ok(Frame::SubscriptionAck { id: id.clone() }),
        _ => Err(AppError::Parse("unexpected frame shape".into())),
    }
}

fn describe_error(err: &Value) -> String {
    match serde_json::from_value::<RpcErrorObject>(err.clone()) {
        Ok(RpcErrorObject {
            code: Some(code),
            message: Some(msg),
        }) => format!("{code}: {msg}"),
        Ok(RpcErrorObject {
            message: Some(msg), ..
        }) => msg,
        _ => err.to_string(),
    }
}

/// Record a frame that carries no event. Used by the supervisor so
/// dropped frames always leave a trace.
pub fn record_dropped(frame: &Frame) {
    match frame {
        Frame::ProtocolError { message } => warn!(%message, "[DISPATCH] peer reported an error"),
        Frame::Unparseable => debug!("[DISPATCH] dropped unparseable frame"),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ack_frame() {
        let f = classify(r#"{"jsonrpc":"2.0","id":1,"result":"0x9cef478923ff08bf67fde6c64013158d"}"#);
        assert_eq!(
            f,
            Frame::SubscriptionAck {
                id: "0x9cef478923ff08bf67fde6c64013158d".into()
            }
        );
    }

    #[test]
    fn notification_frame() {
        let f = classify(
            r#"{"jsonrpc":"2.0","method":"eth_subscription","params":{"subscription":"0xsub","result":"0xhash"}}"#,
        );
        assert_eq!(
            f,
            Frame::Notification {
                tx_hash: "0xhash".into(),
                subscription: Some("0xsub".into())
            }
        );
    }

    #[test]
    fn error_frame() {
        let f = classify(
            r#"{"jsonrpc":"2.0","id":1,"error":{"code":-32601,"message":"method not found"}}"#,
        );
        assert_eq!(
            f,
            Frame::ProtocolError {
                message: "-32601: method not found".into()
            }
        );
    }

    #[test]
    fn malformed_frames_are_unparseable() {
        for raw in [
            "",
            "not json",
            "[1,2,3]",
            r#"{"jsonrpc":"2.0","id":1,"result":{"hash":"0x1"}}"#,
            r#"{"jsonrpc":"2.0","params":{"result":42}}"#,
            r#"{"jsonrpc":"2.0","id":1,"result":"0xsub","params":{"subscription":"x"}}"#,
            r#"{"jsonrpc":"2.0"}"#,
        ] {
            assert_eq!(classify(raw), Frame::Unparseable, "frame {raw:?}");
        }
    }

    #[test]
    fn strict_parse_reports_parse_errors() {
        for raw in ["not json", "[1,2,3]", r#"{"params":{"result":7}}"#, r#"{"id":1}"#] {
            let err = parse_frame(raw).unwrap_err();
            assert!(matches!(err, AppError::Parse(_)), "frame {raw:?}");
            assert!(!err.is_fatal());
        }
        assert_eq!(
            parse_frame(r#"{"id":1,"result":"0xsub"}"#).unwrap(),
            Frame::SubscriptionAck { id: "0xsub".into() }
        );
    }

    #[test]
    fn null_error_field_is_ignored() {
        let f = classify(r#"{"jsonrpc":"2.0","id":1,"result":"0xsub","error":null}"#);
        assert_eq!(f, Frame::SubscriptionAck { id: "0xsub".into() });
    }

    #[test]
    fn interleaved_garbage_keeps_notification_order() {
        let frames = [
            r#"{"params":{"subscription":"s","result":"0x01"}}"#,
            "{{{",
            r#"{"params":{"subscription":"s","result":"0x02"}}"#,
            r#"{"error":{"message":"rate limited"}}"#,
            r#"{"params":{"subscription":"s","result":"0x03"}}"#,
            "null",
            r#"{"params":{"subscription":"s","result":"0x04"}}"#,
        ];
        let hashes: Vec<String> = frames
            .iter()
            .filter_map(|raw| match classify(raw) {
                Frame::Notification { tx_hash, .. } => Some(tx_hash),
                _ => None,
            })
            .collect();
        assert_eq!(hashes, vec!["0x01", "0x02", "0x03", "0x04"]);
    }
}
