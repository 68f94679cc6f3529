//! Gateway glue: the narrow tool-layer API over the bridge, session store,
//! and waveform library.
//!
//! Owns the background tasks: the event pump relaying bridge events into
//! the session store (the bridge never mutates sessions itself), the
//! eviction listener closing bridge endpoints for dead sessions, the
//! heartbeat sweep, and the session TTL sweep. All of them die with the
//! gateway.

use std::time::Duration;

use sg_bridge::{
    Bridge, BridgeEvent, ConnectionDelta, DEFAULT_HEARTBEAT_INTERVAL_MS, DEFAULT_SESSION_TTL_MS,
    DEFAULT_SWEEP_INTERVAL_MS, DeviceSession, SessionStore, SweepHandle, WaveformStore,
};
use sg_core::{Channel, CodecError, ParsedWaveform, StrengthMode, parse_waveform};

#[derive(Clone, Debug)]
pub struct GatewayConfig {
    pub session_ttl_ms: u64,
    pub sweep_interval_ms: u64,
    pub heartbeat_interval_ms: u64,
    /// Host:port the companion app should dial, as seen from its network.
    pub public_host: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            session_ttl_ms: DEFAULT_SESSION_TTL_MS,
            sweep_interval_ms: DEFAULT_SWEEP_INTERVAL_MS,
            heartbeat_interval_ms: DEFAULT_HEARTBEAT_INTERVAL_MS,
            public_host: "127.0.0.1:9960".to_string(),
        }
    }
}

/// Everything an AI client needs to get a device paired.
#[derive(Clone, Debug)]
pub struct ConnectInfo {
    pub device_id: String,
    /// Bridge identity the companion app must bind to.
    pub controller_id: String,
    /// WebSocket URL the companion app should connect to.
    pub ws_url: String,
}

/// Where a pulse command takes its frames from.
pub enum WaveformSource {
    /// A waveform previously saved in the library.
    Named(String),
    /// Inline waveform text, parsed on the fly and not saved.
    Inline(String),
}

pub struct Gateway {
    bridge: Bridge,
    sessions: SessionStore,
    waveforms: WaveformStore,
    public_host: String,
    _heartbeat: SweepHandle,
    _session_sweep: SweepHandle,
    _event_pump: SweepHandle,
    _eviction_pump: SweepHandle,
}

impl Gateway {
    /// Build the gateway and spawn its background tasks. Must run inside a
    /// tokio runtime.
    pub fn new(config: GatewayConfig) -> Self {
        let (bridge, mut events) = Bridge::new();
        let (sessions, mut evictions) = SessionStore::new(config.session_ttl_ms);
        let waveforms = WaveformStore::new();

        let heartbeat =
            bridge.start_heartbeat(Duration::from_millis(config.heartbeat_interval_ms));
        let session_sweep =
            sessions.start_sweeper(Duration::from_millis(config.sweep_interval_ms));

        let pump_sessions = sessions.clone();
        let event_pump = SweepHandle::new(tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                relay_event(&pump_sessions, event);
            }
        }));

        let eviction_bridge = bridge.clone();
        let eviction_pump = SweepHandle::new(tokio::spawn(async move {
            while let Some(session) = evictions.recv().await {
                if let Some(client_id) = session.client_id {
                    tracing::info!(
                        device_id = %session.device_id,
                        %client_id,
                        "closing bridge endpoint for evicted session"
                    );
                    eviction_bridge.remove_endpoint(&client_id);
                }
            }
        }));

        Self {
            bridge,
            sessions,
            waveforms,
            public_host: config.public_host,
            _heartbeat: heartbeat,
            _session_sweep: session_sweep,
            _event_pump: event_pump,
            _eviction_pump: eviction_pump,
        }
    }

    pub fn bridge(&self) -> &Bridge {
        &self.bridge
    }

    // --- Devices ---

    /// Create a session plus an addressable controller identity, before any
    /// app has scanned in.
    pub fn connect_device(&self) -> ConnectInfo {
        let session = self.sessions.create();
        let controller_id = self.bridge.create_virtual_endpoint();
        self.sessions.update_connection_state(
            &session.device_id,
            ConnectionDelta {
                connected: Some(true),
                client_id: Some(controller_id.clone()),
                ..Default::default()
            },
        );
        ConnectInfo {
            device_id: session.device_id,
            controller_id,
            ws_url: format!("ws://{}/ws", self.public_host),
        }
    }

    /// Resolve a device reference: exact session id first, then a unique
    /// alias match.
    pub fn resolve(&self, device: &str) -> Result<DeviceSession, String> {
        if let Some(session) = self.sessions.get(device) {
            return Ok(session);
        }
        let matches = self.sessions.find_by_alias(device);
        match matches.len() {
            0 => Err(format!("no device '{device}'")),
            1 => Ok(matches.into_iter().next().unwrap()),
            n => {
                let ids: Vec<String> = matches.into_iter().map(|s| s.device_id).collect();
                Err(format!(
                    "alias '{device}' matches {n} devices: {}",
                    ids.join(", ")
                ))
            }
        }
    }

    pub fn list_devices(&self) -> Vec<DeviceSession> {
        self.sessions.list()
    }

    pub fn find_devices(&self, alias: &str) -> Vec<DeviceSession> {
        self.sessions.find_by_alias(alias)
    }

    pub fn set_alias(&self, device: &str, alias: &str) -> Result<DeviceSession, String> {
        let session = self.resolve(device)?;
        if !self.sessions.set_alias(&session.device_id, alias) {
            return Err(format!("no device '{device}'"));
        }
        self.sessions
            .get(&session.device_id)
            .ok_or_else(|| format!("no device '{device}'"))
    }

    pub fn is_bound(&self, bridge_id: &str) -> bool {
        self.bridge.is_bound(bridge_id)
    }

    /// Live view of a session: the `bound` flag re-checked against the
    /// bridge so a stale session cannot claim a pairing it lost.
    pub fn device_status(&self, device: &str) -> Result<DeviceSession, String> {
        let mut session = self.resolve(device)?;
        session.bound = session
            .client_id
            .as_deref()
            .is_some_and(|id| self.bridge.is_bound(id));
        Ok(session)
    }

    /// Tear a session down, closing its bridge endpoint (which breaks and
    /// notifies a bound app).
    pub fn disconnect_device(&self, device: &str) -> Result<(), String> {
        let session = self.resolve(device)?;
        if let Some(removed) = self.sessions.delete(&session.device_id)
            && let Some(client_id) = removed.client_id
        {
            self.bridge.remove_endpoint(&client_id);
        }
        Ok(())
    }

    // --- Control ---

    fn controller_of(&self, device: &str) -> Result<(DeviceSession, String), String> {
        let session = self.resolve(device)?;
        let Some(client_id) = session.client_id.clone() else {
            return Err(format!("device '{device}' has no bridge identity"));
        };
        Ok((session, client_id))
    }

    pub fn send_strength(
        &self,
        device: &str,
        channel: Channel,
        mode: StrengthMode,
        value: u32,
    ) -> Result<(), String> {
        let (session, client_id) = self.controller_of(device)?;
        if !self.bridge.send_strength(&client_id, channel, mode, value) {
            return Err("device is not bound to an app".to_string());
        }
        self.sessions.touch(&session.device_id);
        Ok(())
    }

    /// Send a waveform's frames to the device. Returns the frame count.
    pub fn send_waveform(
        &self,
        device: &str,
        channel: Channel,
        source: WaveformSource,
        repeat: bool,
    ) -> Result<usize, String> {
        let waveform = match source {
            WaveformSource::Named(name) => self
                .waveforms
                .get(&name)
                .ok_or_else(|| format!("no waveform '{name}'"))?,
            WaveformSource::Inline(text) => {
                parse_waveform(&text, "inline").map_err(|e| e.to_string())?
            }
        };
        let (session, client_id) = self.controller_of(device)?;
        if !self
            .bridge
            .send_waveform(&client_id, channel, &waveform.frames, repeat)
        {
            return Err("device is not bound to an app".to_string());
        }
        self.sessions.touch(&session.device_id);
        Ok(waveform.frames.len())
    }

    pub fn clear_waveform(&self, device: &str, channel: Channel) -> Result<(), String> {
        let (session, client_id) = self.controller_of(device)?;
        if !self.bridge.clear_waveform(&client_id, channel) {
            return Err("device is not bound to an app".to_string());
        }
        self.sessions.touch(&session.device_id);
        Ok(())
    }

    // --- Waveform library ---

    pub fn save_waveform(&self, text: &str, name: &str) -> Result<ParsedWaveform, CodecError> {
        let waveform = parse_waveform(text, name)?;
        self.waveforms.save(waveform.clone());
        Ok(waveform)
    }

    pub fn list_waveforms(&self) -> Vec<ParsedWaveform> {
        self.waveforms.list()
    }

    pub fn get_waveform(&self, name: &str) -> Option<ParsedWaveform> {
        self.waveforms.get(name)
    }

    pub fn delete_waveform(&self, name: &str) -> bool {
        self.waveforms.delete(name)
    }
}

/// Apply one bridge event to the session it concerns. Sessions that no
/// longer exist fail closed.
fn relay_event(sessions: &SessionStore, event: BridgeEvent) {
    match event {
        BridgeEvent::StrengthUpdate {
            controller_id,
            report,
        } => {
            if let Some(session) = sessions.get_by_bridge_id(&controller_id) {
                sessions.update_strength(&session.device_id, report);
            }
        }
        BridgeEvent::BindChange {
            controller_id,
            app_id,
        } => {
            if let Some(session) = sessions.get_by_bridge_id(&controller_id) {
                sessions.update_connection_state(
                    &session.device_id,
                    ConnectionDelta {
                        bound: Some(app_id.is_some()),
                        app_id: Some(app_id),
                        ..Default::default()
                    },
                );
            }
        }
        BridgeEvent::Feedback {
            controller_id,
            index,
        } => {
            tracing::info!(%controller_id, index, "device feedback");
            if let Some(session) = sessions.get_by_bridge_id(&controller_id) {
                sessions.touch(&session.device_id);
            }
        }
    }
}
