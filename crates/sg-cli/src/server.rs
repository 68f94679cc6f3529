use std::sync::Arc;

use rmcp::handler::server::router::tool::ToolRouter;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::model::*;
use rmcp::{ErrorData as McpError, ServerHandler, tool, tool_handler, tool_router};
use schemars::JsonSchema;
use serde::Deserialize;

use sg_core::{Channel, ParsedWaveform, StrengthMode, unix_millis_to_iso8601};

use crate::gateway::{Gateway, WaveformSource};

#[derive(Clone)]
pub struct SgServer {
    gateway: Arc<Gateway>,
    tool_router: ToolRouter<Self>,
}

impl SgServer {
    pub fn new(gateway: Arc<Gateway>) -> Self {
        Self {
            gateway,
            tool_router: Self::tool_router(),
        }
    }

    fn session_json(session: &sg_bridge::DeviceSession) -> serde_json::Value {
        let mut json = serde_json::to_value(session).unwrap_or_default();
        json["last_active"] = serde_json::json!(unix_millis_to_iso8601(session.last_active));
        json["created_at"] = serde_json::json!(unix_millis_to_iso8601(session.created_at));
        json
    }

    fn waveform_json(waveform: &ParsedWaveform) -> serde_json::Value {
        serde_json::json!({
            "name": waveform.name,
            "tag": waveform.tag,
            "sections": waveform.sections.len(),
            "frames": waveform.frames.len(),
            "duration_ms": waveform.frames.len() * 100,
            "created_at": unix_millis_to_iso8601(waveform.created_at),
        })
    }

    fn parse_channel(s: &str) -> Result<Channel, McpError> {
        Channel::parse(s).ok_or_else(|| {
            McpError::invalid_params(format!("channel must be 'a' or 'b', got '{s}'"), None)
        })
    }
}

// --- Tool parameter types ---

#[derive(Debug, Deserialize, JsonSchema)]
struct DeviceRequest {
    /// Device id or alias
    device: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct SetAliasRequest {
    /// Device id or alias
    device: String,
    /// Human-friendly name for the device (matched case-insensitively)
    alias: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct FindRequest {
    /// Alias to search for, case-insensitive
    alias: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct StrengthRequest {
    /// Device id or alias
    device: String,
    /// Output channel: "a" or "b"
    channel: String,
    /// How to apply the value: "set", "increase" or "decrease"
    mode: String,
    /// Strength value (absolute for set, delta otherwise)
    value: u32,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct PulseRequest {
    /// Device id or alias
    device: String,
    /// Output channel: "a" or "b"
    channel: String,
    /// Name of a saved waveform to play
    waveform: Option<String>,
    /// Inline waveform text, parsed on the fly instead of a saved name
    text: Option<String>,
    /// Keep replaying the waveform until cleared
    repeat: Option<bool>,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct ClearRequest {
    /// Device id or alias
    device: String,
    /// Output channel: "a" or "b"
    channel: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct WaveformSaveRequest {
    /// Name to store the waveform under (last write wins)
    name: String,
    /// Waveform text in the editor format
    text: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct WaveformNameRequest {
    /// Waveform name
    name: String,
}

#[tool_router]
impl SgServer {
    #[tool(
        description = "Register a new device and get its pairing details. Returns the device id, the controller id the companion app must bind to, and the WebSocket URL the app should connect to. Show the controller id and URL to the user so they can scan in from the app; the device stays unbound until the app completes the handshake."
    )]
    async fn device_connect(&self) -> Result<CallToolResult, McpError> {
        let info = self.gateway.connect_device();
        let result = serde_json::json!({
            "device_id": info.device_id,
            "controller_id": info.controller_id,
            "ws_url": info.ws_url,
            "bound": false,
        });
        Ok(CallToolResult::success(vec![Content::text(
            serde_json::to_string_pretty(&result).unwrap_or_default(),
        )]))
    }

    #[tool(
        description = "List all known devices with their connection state, strength levels and aliases, oldest first."
    )]
    async fn device_list(&self) -> Result<CallToolResult, McpError> {
        let devices: Vec<serde_json::Value> = self
            .gateway
            .list_devices()
            .iter()
            .map(Self::session_json)
            .collect();
        let result = serde_json::json!({
            "devices": devices,
            "count": devices.len(),
        });
        Ok(CallToolResult::success(vec![Content::text(
            serde_json::to_string_pretty(&result).unwrap_or_default(),
        )]))
    }

    #[tool(
        description = "Get one device's live status: whether an app is bound, current strength and limits per channel, and its alias. Accepts a device id or a unique alias."
    )]
    async fn device_status(
        &self,
        Parameters(req): Parameters<DeviceRequest>,
    ) -> Result<CallToolResult, McpError> {
        let session = self
            .gateway
            .device_status(&req.device)
            .map_err(|e| McpError::invalid_params(e, None))?;
        Ok(CallToolResult::success(vec![Content::text(
            serde_json::to_string_pretty(&Self::session_json(&session)).unwrap_or_default(),
        )]))
    }

    #[tool(
        description = "Give a device a human-friendly alias. Aliases are matched case-insensitively and can be used anywhere a device id is accepted, as long as they are unique."
    )]
    async fn device_set_alias(
        &self,
        Parameters(req): Parameters<SetAliasRequest>,
    ) -> Result<CallToolResult, McpError> {
        let session = self
            .gateway
            .set_alias(&req.device, &req.alias)
            .map_err(|e| McpError::invalid_params(e, None))?;
        Ok(CallToolResult::success(vec![Content::text(
            serde_json::to_string_pretty(&Self::session_json(&session)).unwrap_or_default(),
        )]))
    }

    #[tool(description = "Find devices by alias, case-insensitive. Returns all matches.")]
    async fn device_find(
        &self,
        Parameters(req): Parameters<FindRequest>,
    ) -> Result<CallToolResult, McpError> {
        let devices: Vec<serde_json::Value> = self
            .gateway
            .find_devices(&req.alias)
            .iter()
            .map(Self::session_json)
            .collect();
        let result = serde_json::json!({
            "devices": devices,
            "count": devices.len(),
        });
        Ok(CallToolResult::success(vec![Content::text(
            serde_json::to_string_pretty(&result).unwrap_or_default(),
        )]))
    }

    #[tool(
        description = "Disconnect a device and forget its session. If an app is bound it is notified and its connection is closed."
    )]
    async fn device_disconnect(
        &self,
        Parameters(req): Parameters<DeviceRequest>,
    ) -> Result<CallToolResult, McpError> {
        self.gateway
            .disconnect_device(&req.device)
            .map_err(|e| McpError::invalid_params(e, None))?;
        let result = serde_json::json!({ "disconnected": true });
        Ok(CallToolResult::success(vec![Content::text(
            serde_json::to_string_pretty(&result).unwrap_or_default(),
        )]))
    }

    #[tool(
        description = "Change a channel's strength on a bound device. Mode 'set' applies the value absolutely; 'increase'/'decrease' adjust by the value. The device enforces its own hard limits; read them from device_status and stay well below. Fails if no app is bound."
    )]
    async fn device_strength(
        &self,
        Parameters(req): Parameters<StrengthRequest>,
    ) -> Result<CallToolResult, McpError> {
        let channel = Self::parse_channel(&req.channel)?;
        let mode = StrengthMode::parse(&req.mode).ok_or_else(|| {
            McpError::invalid_params(
                format!(
                    "mode must be 'set', 'increase' or 'decrease', got '{}'",
                    req.mode
                ),
                None,
            )
        })?;
        self.gateway
            .send_strength(&req.device, channel, mode, req.value)
            .map_err(|e| McpError::invalid_params(e, None))?;
        let result = serde_json::json!({
            "sent": true,
            "channel": channel.letter().to_string(),
        });
        Ok(CallToolResult::success(vec![Content::text(
            serde_json::to_string_pretty(&result).unwrap_or_default(),
        )]))
    }

    #[tool(
        description = "Play a waveform on a device channel. Provide either 'waveform' (the name of a saved waveform) or 'text' (inline waveform text). With repeat=true the waveform loops until device_clear is called or the pairing breaks. Fails if no app is bound."
    )]
    async fn device_pulse(
        &self,
        Parameters(req): Parameters<PulseRequest>,
    ) -> Result<CallToolResult, McpError> {
        let channel = Self::parse_channel(&req.channel)?;
        let source = match (req.waveform, req.text) {
            (Some(name), None) => WaveformSource::Named(name),
            (None, Some(text)) => WaveformSource::Inline(text),
            _ => {
                return Err(McpError::invalid_params(
                    "provide exactly one of 'waveform' or 'text'".to_string(),
                    None,
                ));
            }
        };
        let repeat = req.repeat.unwrap_or(false);
        let frames = self
            .gateway
            .send_waveform(&req.device, channel, source, repeat)
            .map_err(|e| McpError::invalid_params(e, None))?;
        let result = serde_json::json!({
            "sent": true,
            "channel": channel.letter().to_string(),
            "frames": frames,
            "duration_ms": frames * 100,
            "repeat": repeat,
        });
        Ok(CallToolResult::success(vec![Content::text(
            serde_json::to_string_pretty(&result).unwrap_or_default(),
        )]))
    }

    #[tool(
        description = "Stop output on a device channel: cancels any repeating waveform and clears the device's pulse queue. Fails if no app is bound."
    )]
    async fn device_clear(
        &self,
        Parameters(req): Parameters<ClearRequest>,
    ) -> Result<CallToolResult, McpError> {
        let channel = Self::parse_channel(&req.channel)?;
        self.gateway
            .clear_waveform(&req.device, channel)
            .map_err(|e| McpError::invalid_params(e, None))?;
        let result = serde_json::json!({
            "cleared": true,
            "channel": channel.letter().to_string(),
        });
        Ok(CallToolResult::success(vec![Content::text(
            serde_json::to_string_pretty(&result).unwrap_or_default(),
        )]))
    }

    #[tool(
        description = "Parse waveform text and save it under a name for later playback with device_pulse. Waveform text format: 'tag:freqA,freqB,extra=startFreq,endFreq,duration,mode,enabled/str-shape,...+section+...' with up to 3 sections. Returns a summary with the synthesized frame count. Saving under an existing name replaces it."
    )]
    async fn waveform_save(
        &self,
        Parameters(req): Parameters<WaveformSaveRequest>,
    ) -> Result<CallToolResult, McpError> {
        let waveform = self
            .gateway
            .save_waveform(&req.text, &req.name)
            .map_err(|e| McpError::invalid_params(e.to_string(), None))?;
        Ok(CallToolResult::success(vec![Content::text(
            serde_json::to_string_pretty(&Self::waveform_json(&waveform)).unwrap_or_default(),
        )]))
    }

    #[tool(description = "List all saved waveforms with their frame counts, oldest first.")]
    async fn waveform_list(&self) -> Result<CallToolResult, McpError> {
        let waveforms: Vec<serde_json::Value> = self
            .gateway
            .list_waveforms()
            .iter()
            .map(Self::waveform_json)
            .collect();
        let result = serde_json::json!({
            "waveforms": waveforms,
            "count": waveforms.len(),
        });
        Ok(CallToolResult::success(vec![Content::text(
            serde_json::to_string_pretty(&result).unwrap_or_default(),
        )]))
    }

    #[tool(
        description = "Get a saved waveform: its summary, the original text, and the synthesized device frames."
    )]
    async fn waveform_get(
        &self,
        Parameters(req): Parameters<WaveformNameRequest>,
    ) -> Result<CallToolResult, McpError> {
        let waveform = self
            .gateway
            .get_waveform(&req.name)
            .ok_or_else(|| McpError::invalid_params(format!("no waveform '{}'", req.name), None))?;
        let mut result = Self::waveform_json(&waveform);
        result["text"] = serde_json::json!(waveform.source);
        result["frame_data"] = serde_json::json!(waveform.frames);
        Ok(CallToolResult::success(vec![Content::text(
            serde_json::to_string_pretty(&result).unwrap_or_default(),
        )]))
    }

    #[tool(description = "Delete a saved waveform by name.")]
    async fn waveform_delete(
        &self,
        Parameters(req): Parameters<WaveformNameRequest>,
    ) -> Result<CallToolResult, McpError> {
        if !self.gateway.delete_waveform(&req.name) {
            return Err(McpError::invalid_params(
                format!("no waveform '{}'", req.name),
                None,
            ));
        }
        let result = serde_json::json!({ "deleted": true });
        Ok(CallToolResult::success(vec![Content::text(
            serde_json::to_string_pretty(&result).unwrap_or_default(),
        )]))
    }
}

#[tool_handler]
impl ServerHandler for SgServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(
                "You control electrostimulation devices through their companion app.\n\n\
                 PAIRING:\n\
                 1. Call device_connect to register a device. Give the user the returned \
                    controller id and WebSocket URL so they can connect from the companion app.\n\
                 2. Poll device_status until 'bound' is true. No control is possible before that.\n\
                 3. Use device_set_alias so the user can refer to devices by name.\n\n\
                 CONTROL:\n\
                 - device_strength changes output intensity per channel. The device enforces \
                   hard limits (shown in device_status as limit_a/limit_b); never try to exceed \
                   them and ramp up gradually from low values.\n\
                 - device_pulse plays a waveform, saved or inline; repeat=true loops it until \
                   device_clear.\n\
                 - Strength and feedback telemetry from the device land in device_status \
                   automatically.\n\n\
                 SAFETY:\n\
                 - Always start at low strength and increase in small steps, confirming with \
                   the user between steps.\n\
                 - On any sign of discomfort call device_clear and set strength to 0 immediately.\n\
                 - If a device shows bound=false, the app has disconnected; stop issuing control \
                   calls and re-pair."
                    .into(),
            ),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use sg_bridge::{ChannelTransport, TransportEvent};
    use tokio::sync::mpsc;

    use crate::gateway::GatewayConfig;

    fn make_server() -> SgServer {
        SgServer::new(Arc::new(Gateway::new(GatewayConfig::default())))
    }

    fn text_from_result(result: &CallToolResult) -> String {
        result
            .content
            .iter()
            .filter_map(|c| match &c.raw {
                RawContent::Text(t) => Some(t.text.clone()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("")
    }

    fn parse_result(result: &CallToolResult) -> serde_json::Value {
        let text = text_from_result(result);
        serde_json::from_str(&text).expect("handler should return valid JSON")
    }

    /// Connect a fake companion app and bind it to the given controller id.
    fn pair_app(
        server: &SgServer,
        controller_id: &str,
    ) -> (String, mpsc::UnboundedReceiver<TransportEvent>) {
        let bridge = server.gateway.bridge();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let app_id = bridge.accept(Arc::new(ChannelTransport::new(tx)));
        assert_eq!(bridge.bind(&app_id, controller_id, &app_id), "200");
        while rx.try_recv().is_ok() {}
        (app_id, rx)
    }

    fn next_message(rx: &mut mpsc::UnboundedReceiver<TransportEvent>) -> String {
        loop {
            match rx.try_recv().expect("expected transport event") {
                TransportEvent::Frame(f) => return f.message,
                TransportEvent::Close => continue,
            }
        }
    }

    async fn connect(server: &SgServer) -> (String, String) {
        let json = parse_result(&server.device_connect().await.unwrap());
        (
            json["device_id"].as_str().unwrap().to_string(),
            json["controller_id"].as_str().unwrap().to_string(),
        )
    }

    #[tokio::test]
    async fn connect_then_status_and_list() {
        let server = make_server();
        let json = parse_result(&server.device_connect().await.unwrap());
        assert_eq!(json["bound"], false);
        assert!(json["ws_url"].as_str().unwrap().starts_with("ws://"));
        let device_id = json["device_id"].as_str().unwrap().to_string();

        let status = parse_result(
            &server
                .device_status(Parameters(DeviceRequest {
                    device: device_id.clone(),
                }))
                .await
                .unwrap(),
        );
        assert_eq!(status["device_id"], device_id);
        assert_eq!(status["connected"], true);
        assert_eq!(status["bound"], false);

        let list = parse_result(&server.device_list().await.unwrap());
        assert_eq!(list["count"], 1);
    }

    #[tokio::test]
    async fn status_of_unknown_device_is_invalid_params() {
        let server = make_server();
        let err = server
            .device_status(Parameters(DeviceRequest {
                device: "nope".to_string(),
            }))
            .await
            .unwrap_err();
        assert!(err.message.contains("no device"));
    }

    #[tokio::test]
    async fn alias_set_and_find() {
        let server = make_server();
        let (device_id, _) = connect(&server).await;

        let json = parse_result(
            &server
                .device_set_alias(Parameters(SetAliasRequest {
                    device: device_id.clone(),
                    alias: "Left Cuff".to_string(),
                }))
                .await
                .unwrap(),
        );
        assert_eq!(json["alias"], "Left Cuff");

        let found = parse_result(
            &server
                .device_find(Parameters(FindRequest {
                    alias: "left cuff".to_string(),
                }))
                .await
                .unwrap(),
        );
        assert_eq!(found["count"], 1);
        assert_eq!(found["devices"][0]["device_id"], device_id);

        // The alias now resolves as a device reference.
        let status = parse_result(
            &server
                .device_status(Parameters(DeviceRequest {
                    device: "LEFT CUFF".to_string(),
                }))
                .await
                .unwrap(),
        );
        assert_eq!(status["device_id"], device_id);
    }

    #[tokio::test]
    async fn strength_requires_binding_and_valid_params() {
        let server = make_server();
        let (device_id, controller_id) = connect(&server).await;

        let err = server
            .device_strength(Parameters(StrengthRequest {
                device: device_id.clone(),
                channel: "a".to_string(),
                mode: "set".to_string(),
                value: 10,
            }))
            .await
            .unwrap_err();
        assert!(err.message.contains("not bound"));

        let (_app_id, mut app_rx) = pair_app(&server, &controller_id);

        let err = server
            .device_strength(Parameters(StrengthRequest {
                device: device_id.clone(),
                channel: "c".to_string(),
                mode: "set".to_string(),
                value: 10,
            }))
            .await
            .unwrap_err();
        assert!(err.message.contains("channel"));

        let json = parse_result(
            &server
                .device_strength(Parameters(StrengthRequest {
                    device: device_id,
                    channel: "a".to_string(),
                    mode: "set".to_string(),
                    value: 10,
                }))
                .await
                .unwrap(),
        );
        assert_eq!(json["sent"], true);
        assert_eq!(next_message(&mut app_rx), "strength-1+2+10");
    }

    #[tokio::test]
    async fn pulse_saved_and_inline() {
        let server = make_server();
        let (device_id, controller_id) = connect(&server).await;
        let (_app_id, mut app_rx) = pair_app(&server, &controller_id);

        let saved = parse_result(
            &server
                .waveform_save(Parameters(WaveformSaveRequest {
                    name: "steady".to_string(),
                    text: "w:0,1,8=10,20,4,1,1/50.00-0,70.00-1".to_string(),
                }))
                .await
                .unwrap(),
        );
        assert!(saved["frames"].as_u64().unwrap() > 0);

        let json = parse_result(
            &server
                .device_pulse(Parameters(PulseRequest {
                    device: device_id.clone(),
                    channel: "a".to_string(),
                    waveform: Some("steady".to_string()),
                    text: None,
                    repeat: None,
                }))
                .await
                .unwrap(),
        );
        assert_eq!(json["repeat"], false);
        assert_eq!(
            json["duration_ms"].as_u64().unwrap(),
            json["frames"].as_u64().unwrap() * 100
        );
        assert!(next_message(&mut app_rx).starts_with("pulse-A:["));

        let json = parse_result(
            &server
                .device_pulse(Parameters(PulseRequest {
                    device: device_id.clone(),
                    channel: "b".to_string(),
                    waveform: None,
                    text: Some("x:0,1,4=30,30,2,1,1/20.00-0".to_string()),
                    repeat: None,
                }))
                .await
                .unwrap(),
        );
        assert_eq!(json["sent"], true);
        assert!(next_message(&mut app_rx).starts_with("pulse-B:["));

        // Exactly one source must be given.
        let err = server
            .device_pulse(Parameters(PulseRequest {
                device: device_id,
                channel: "a".to_string(),
                waveform: Some("steady".to_string()),
                text: Some("x:0,1,4=30,30,2,1,1/20.00-0".to_string()),
                repeat: None,
            }))
            .await
            .unwrap_err();
        assert!(err.message.contains("exactly one"));
    }

    #[tokio::test]
    async fn clear_stops_channel() {
        let server = make_server();
        let (device_id, controller_id) = connect(&server).await;
        let (_app_id, mut app_rx) = pair_app(&server, &controller_id);

        let json = parse_result(
            &server
                .device_clear(Parameters(ClearRequest {
                    device: device_id,
                    channel: "b".to_string(),
                }))
                .await
                .unwrap(),
        );
        assert_eq!(json["cleared"], true);
        assert_eq!(next_message(&mut app_rx), "clear-2");
    }

    #[tokio::test]
    async fn waveform_crud() {
        let server = make_server();

        let err = server
            .waveform_save(Parameters(WaveformSaveRequest {
                name: "bad".to_string(),
                text: "not a waveform".to_string(),
            }))
            .await
            .unwrap_err();
        assert!(err.message.contains("waveform"));

        server
            .waveform_save(Parameters(WaveformSaveRequest {
                name: "one".to_string(),
                text: "a:0,1,8=10,20,4,1,1/50.00-0".to_string(),
            }))
            .await
            .unwrap();

        let list = parse_result(&server.waveform_list().await.unwrap());
        assert_eq!(list["count"], 1);

        let got = parse_result(
            &server
                .waveform_get(Parameters(WaveformNameRequest {
                    name: "one".to_string(),
                }))
                .await
                .unwrap(),
        );
        assert_eq!(got["name"], "one");
        assert!(got["text"].as_str().unwrap().starts_with("a:"));
        assert!(got["frame_data"].as_array().unwrap().len() > 0);

        server
            .waveform_delete(Parameters(WaveformNameRequest {
                name: "one".to_string(),
            }))
            .await
            .unwrap();
        let err = server
            .waveform_delete(Parameters(WaveformNameRequest {
                name: "one".to_string(),
            }))
            .await
            .unwrap_err();
        assert!(err.message.contains("no waveform"));
    }

    #[tokio::test]
    async fn disconnect_notifies_bound_app() {
        let server = make_server();
        let (device_id, controller_id) = connect(&server).await;
        let (_app_id, mut app_rx) = pair_app(&server, &controller_id);

        let json = parse_result(
            &server
                .device_disconnect(Parameters(DeviceRequest {
                    device: device_id.clone(),
                }))
                .await
                .unwrap(),
        );
        assert_eq!(json["disconnected"], true);
        assert_eq!(next_message(&mut app_rx), "209");

        let err = server
            .device_status(Parameters(DeviceRequest { device: device_id }))
            .await
            .unwrap_err();
        assert!(err.message.contains("no device"));
    }

    #[tokio::test]
    async fn tool_registration() {
        let server = make_server();
        let info = server.get_info();
        assert!(info.instructions.is_some());
        assert!(info.capabilities.tools.is_some());
    }
}
