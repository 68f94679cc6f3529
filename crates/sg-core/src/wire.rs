//! The JSON wire frame spoken between controllers, the bridge, and the
//! companion app, plus the fixed status-code table.

use serde::{Deserialize, Serialize};

/// Longest `message` body the protocol relays. Longer bodies are refused
/// with status 405.
pub const MAX_MESSAGE_LEN: usize = 1950;

/// Sentinel `message` on the connection-assignment frame: "the id you
/// should remember follows in clientId".
pub const MSG_TARGET_ID: &str = "targetId";
/// `message` carried by an app-initiated bind request.
pub const MSG_BIND_REQUEST: &str = "DGLAB";

/// One protocol frame. Unknown `type` values are carried, not rejected.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WireFrame {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(rename = "clientId", default)]
    pub client_id: String,
    #[serde(rename = "targetId", default)]
    pub target_id: String,
    #[serde(default)]
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel: Option<u8>,
}

/// Boundary classification of a frame's `type` field. Every inbound frame
/// is converted to this before any dispatch logic runs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameKind {
    Bind,
    Msg,
    Heartbeat,
    Break,
    Error,
    Other,
}

impl WireFrame {
    pub fn new(kind: &str, client_id: &str, target_id: &str, message: &str) -> Self {
        Self {
            kind: kind.to_string(),
            client_id: client_id.to_string(),
            target_id: target_id.to_string(),
            message: message.to_string(),
            channel: None,
        }
    }

    pub fn bind(client_id: &str, target_id: &str, message: &str) -> Self {
        Self::new("bind", client_id, target_id, message)
    }

    pub fn msg(client_id: &str, target_id: &str, message: &str) -> Self {
        Self::new("msg", client_id, target_id, message)
    }

    pub fn heartbeat(client_id: &str, target_id: &str) -> Self {
        Self::new("heartbeat", client_id, target_id, "200")
    }

    pub fn break_frame(client_id: &str, target_id: &str, message: &str) -> Self {
        Self::new("break", client_id, target_id, message)
    }

    pub fn error(client_id: &str, target_id: &str, message: &str) -> Self {
        Self::new("error", client_id, target_id, message)
    }

    pub fn frame_kind(&self) -> FrameKind {
        match self.kind.as_str() {
            "bind" => FrameKind::Bind,
            "msg" => FrameKind::Msg,
            "heartbeat" => FrameKind::Heartbeat,
            "break" => FrameKind::Break,
            "error" => FrameKind::Error,
            _ => FrameKind::Other,
        }
    }
}

/// Human-readable description for a protocol status code. Unrecognised
/// codes render rather than fail, to stay forward-compatible with protocol
/// extensions.
pub fn describe_status(code: &str) -> String {
    match code {
        "200" => "ok".to_string(),
        "209" => "peer disconnected".to_string(),
        "210" => "no valid id in QR payload".to_string(),
        "211" => "server did not dispatch an app id".to_string(),
        "400" => "id already bound".to_string(),
        "401" => "target not found".to_string(),
        "402" => "not yet bound".to_string(),
        "403" => "message not valid structured data".to_string(),
        "404" => "recipient offline".to_string(),
        "405" => "message exceeds 1950 characters".to_string(),
        "500" => "internal error".to_string(),
        other => format!("unknown error: {other}"),
    }
}

/// All codes the table describes, in ascending order.
pub const STATUS_CODES: [&str; 11] = [
    "200", "209", "210", "211", "400", "401", "402", "403", "404", "405", "500",
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serde_roundtrip_with_renames() {
        let frame = WireFrame::bind("abc", "", MSG_TARGET_ID);
        let json = serde_json::to_string(&frame).unwrap();
        assert!(json.contains("\"clientId\":\"abc\""), "{json}");
        assert!(json.contains("\"type\":\"bind\""), "{json}");
        assert!(!json.contains("channel"), "{json}");

        let back: WireFrame = serde_json::from_str(&json).unwrap();
        assert_eq!(back, frame);
    }

    #[test]
    fn missing_fields_default() {
        let frame: WireFrame = serde_json::from_str(r#"{"type":"heartbeat"}"#).unwrap();
        assert_eq!(frame.client_id, "");
        assert_eq!(frame.message, "");
    }

    #[test]
    fn kind_classification() {
        assert_eq!(WireFrame::msg("a", "b", "x").frame_kind(), FrameKind::Msg);
        assert_eq!(
            WireFrame::new("wobble", "a", "b", "x").frame_kind(),
            FrameKind::Other
        );
    }

    #[test]
    fn status_table() {
        assert_eq!(describe_status("200"), "ok");
        assert_eq!(describe_status("404"), "recipient offline");
        assert_eq!(describe_status("999"), "unknown error: 999");
    }
}
