//! The protocol bridge: connection identities, the bind handshake, frame
//! relay, telemetry interception, and disconnect cleanup.
//!
//! Per-endpoint state machine: `unknown → {controller, app}` on a
//! successful bind, `unbound` on partner loss, gone on removal. All
//! failures surface as protocol status codes on reply frames; nothing in
//! here retries and nothing is fatal. A torn pairing always requires a
//! fresh handshake.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;
use uuid::Uuid;

use sg_core::wire::{MSG_BIND_REQUEST, MSG_TARGET_ID};
use sg_core::{
    Channel, FrameKind, MAX_MESSAGE_LEN, StrengthMode, StrengthReport, WireFrame, clear_command,
    parse_feedback, parse_strength_report, pulse_commands, strength_command,
};

use crate::endpoint::{Endpoint, Role};
use crate::pairing::Pairing;
use crate::sweep::SweepHandle;
use crate::transport::{NullTransport, Transport};

/// Default heartbeat sweep period.
pub const DEFAULT_HEARTBEAT_INTERVAL_MS: u64 = 60_000;

/// Duration one device frame covers during playback.
const FRAME_DURATION_MS: u64 = 100;

/// Telemetry and pairing changes the bridge surfaces to the embedding code,
/// keyed by the bound controller id. The bridge itself never touches the
/// session store.
#[derive(Clone, Debug, PartialEq)]
pub enum BridgeEvent {
    StrengthUpdate {
        controller_id: String,
        report: StrengthReport,
    },
    Feedback {
        controller_id: String,
        index: u32,
    },
    BindChange {
        controller_id: String,
        app_id: Option<String>,
    },
}

struct Inner {
    endpoints: HashMap<String, Endpoint>,
    pairing: Pairing,
    /// Waveform repeat timers, keyed by controller endpoint id. Dropping a
    /// handle aborts the task, so replacement and removal are structural.
    repeat_timers: HashMap<String, SweepHandle>,
}

#[derive(Clone)]
pub struct Bridge {
    inner: Arc<Mutex<Inner>>,
    events: mpsc::UnboundedSender<BridgeEvent>,
}

impl Bridge {
    /// Create a bridge and the receiving end of its event stream.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<BridgeEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        (
            Self {
                inner: Arc::new(Mutex::new(Inner {
                    endpoints: HashMap::new(),
                    pairing: Pairing::new(),
                    repeat_timers: HashMap::new(),
                })),
                events,
            },
            rx,
        )
    }

    fn emit(&self, event: BridgeEvent) {
        let _ = self.events.send(event);
    }

    /// Register a freshly accepted connection and immediately tell it its
    /// assigned id.
    pub fn accept(&self, transport: Arc<dyn Transport>) -> String {
        let id = Uuid::new_v4().to_string();
        let endpoint = Endpoint::new(id.clone(), Role::Unknown, transport);
        endpoint
            .transport
            .send(&WireFrame::bind(&id, "", MSG_TARGET_ID));
        self.inner
            .lock()
            .unwrap()
            .endpoints
            .insert(id.clone(), endpoint);
        tracing::debug!(%id, "accepted connection");
        id
    }

    /// Register a controller endpoint with no real transport, so an AI
    /// session has an addressable identity before any app has scanned in.
    pub fn create_virtual_endpoint(&self) -> String {
        let id = Uuid::new_v4().to_string();
        let endpoint = Endpoint::new(id.clone(), Role::Controller, Arc::new(NullTransport::new()));
        self.inner
            .lock()
            .unwrap()
            .endpoints
            .insert(id.clone(), endpoint);
        tracing::debug!(%id, "created virtual controller endpoint");
        id
    }

    pub fn contains(&self, id: &str) -> bool {
        self.inner.lock().unwrap().endpoints.contains_key(id)
    }

    pub fn is_bound(&self, id: &str) -> bool {
        self.inner.lock().unwrap().pairing.is_paired(id)
    }

    pub fn endpoint_count(&self) -> usize {
        self.inner.lock().unwrap().endpoints.len()
    }

    /// Pair `controller_id` with `app_id`. On failure only the initiator
    /// hears about it: `401` if either id is unknown, `400` if either is
    /// already on any side of a pair.
    pub fn bind(&self, initiator: &str, controller_id: &str, app_id: &str) -> &'static str {
        let mut inner = self.inner.lock().unwrap();

        let code = if !inner.endpoints.contains_key(controller_id)
            || !inner.endpoints.contains_key(app_id)
        {
            "401"
        } else if inner.pairing.is_paired(controller_id) || inner.pairing.is_paired(app_id) {
            "400"
        } else {
            "200"
        };

        if code != "200" {
            if let Some(ep) = inner.endpoints.get(initiator) {
                ep.transport
                    .send(&WireFrame::bind(controller_id, app_id, code));
            }
            tracing::info!(controller_id, app_id, code, "bind refused");
            return code;
        }

        inner.pairing.insert(controller_id, app_id);
        if let Some(ep) = inner.endpoints.get_mut(controller_id) {
            ep.role = Role::Controller;
        }
        if let Some(ep) = inner.endpoints.get_mut(app_id) {
            ep.role = Role::App;
        }
        let result = WireFrame::bind(controller_id, app_id, "200");
        for id in [controller_id, app_id] {
            if let Some(ep) = inner.endpoints.get(id) {
                ep.transport.send(&result);
            }
        }
        drop(inner);

        tracing::info!(controller_id, app_id, "bound");
        self.emit(BridgeEvent::BindChange {
            controller_id: controller_id.to_string(),
            app_id: Some(app_id.to_string()),
        });
        "200"
    }

    /// Validate and dispatch one raw inbound text frame from `from`.
    /// Unparseable input earns a `403` reply; everything else is classified
    /// at this boundary and dispatched.
    pub fn handle_frame(&self, from: &str, text: &str) {
        let frame: WireFrame = match serde_json::from_str(text) {
            Ok(f) => f,
            Err(_) => {
                let inner = self.inner.lock().unwrap();
                if let Some(ep) = inner.endpoints.get(from) {
                    ep.transport.send(&WireFrame::error(from, "", "403"));
                }
                return;
            }
        };

        match frame.frame_kind() {
            FrameKind::Bind if frame.message == MSG_BIND_REQUEST => {
                self.bind(from, &frame.client_id, &frame.target_id);
            }
            FrameKind::Bind => {
                tracing::debug!(from, message = %frame.message, "ignoring bind frame");
            }
            FrameKind::Heartbeat => {
                let mut inner = self.inner.lock().unwrap();
                if let Some(ep) = inner.endpoints.get_mut(from) {
                    ep.touch();
                }
            }
            _ => self.route(from, frame),
        }
    }

    /// Relay `frame` to the sender's bound partner, intercepting app-origin
    /// telemetry on the way. Failures reply to the sender: `402` unpaired,
    /// `405` oversized, `404` partner gone or dead.
    pub fn route(&self, from: &str, frame: WireFrame) {
        let mut inner = self.inner.lock().unwrap();

        let from_role = match inner.endpoints.get_mut(from) {
            Some(ep) => {
                ep.touch();
                ep.role
            }
            // Fail closed: a removed endpoint cannot route.
            None => return,
        };

        let reply = |inner: &Inner, code: &str, target: &str| {
            if let Some(ep) = inner.endpoints.get(from) {
                ep.transport.send(&WireFrame::msg(from, target, code));
            }
        };

        let Some(partner) = inner.pairing.partner_of(from).map(str::to_string) else {
            reply(&inner, "402", "");
            return;
        };

        // Telemetry interception: surfaced to the embedding code, then the
        // frame is forwarded unchanged.
        if from_role == Role::App && frame.frame_kind() == FrameKind::Msg {
            let controller = inner
                .pairing
                .controller_of(from)
                .unwrap_or(&partner)
                .to_string();
            if let Some(report) = parse_strength_report(&frame.message) {
                self.emit(BridgeEvent::StrengthUpdate {
                    controller_id: controller,
                    report,
                });
            } else if let Some(index) = parse_feedback(&frame.message) {
                self.emit(BridgeEvent::Feedback {
                    controller_id: controller,
                    index,
                });
            }
        }

        if frame.message.len() > MAX_MESSAGE_LEN {
            reply(&inner, "405", &partner);
            return;
        }

        let delivered = match inner.endpoints.get(&partner) {
            Some(ep) if ep.transport.is_live() => ep.transport.send(&frame),
            _ => false,
        };
        if !delivered {
            reply(&inner, "404", &partner);
        }
    }

    /// Send a strength command to the app bound to `controller_id`.
    pub fn send_strength(
        &self,
        controller_id: &str,
        channel: Channel,
        mode: StrengthMode,
        value: u32,
    ) -> bool {
        let body = strength_command(channel, mode, value);
        self.send_to_partner(controller_id, &body)
    }

    /// Send waveform frames to the app bound to `controller_id`, chunked to
    /// respect the message limit. With `repeat`, a per-endpoint timer
    /// re-sends the whole waveform every playback period until cleared or
    /// the endpoint is removed; a new call replaces any previous timer.
    pub fn send_waveform(
        &self,
        controller_id: &str,
        channel: Channel,
        frames: &[String],
        repeat: bool,
    ) -> bool {
        if frames.is_empty() {
            return false;
        }
        let bodies = pulse_commands(channel, frames);
        let mut ok = true;
        for body in &bodies {
            ok &= self.send_to_partner(controller_id, body);
        }
        if !ok {
            return false;
        }

        let mut inner = self.inner.lock().unwrap();
        if repeat {
            let period = Duration::from_millis(frames.len() as u64 * FRAME_DURATION_MS);
            let task_inner = Arc::clone(&self.inner);
            let id = controller_id.to_string();
            let handle = tokio::spawn(async move {
                loop {
                    tokio::time::sleep(period).await;
                    let guard = task_inner.lock().unwrap();
                    let Some(app) = guard.pairing.partner_of(&id).map(str::to_string) else {
                        break;
                    };
                    let Some(ep) = guard.endpoints.get(&app) else {
                        break;
                    };
                    let mut delivered = true;
                    for body in &bodies {
                        delivered &= ep.transport.send(&WireFrame::msg(&id, &app, body));
                    }
                    if !delivered {
                        break;
                    }
                }
            });
            inner
                .repeat_timers
                .insert(controller_id.to_string(), SweepHandle::new(handle));
        } else {
            inner.repeat_timers.remove(controller_id);
        }
        true
    }

    /// Cancel any repeat timer for `controller_id` and tell the app to
    /// clear the channel's waveform queue.
    pub fn clear_waveform(&self, controller_id: &str, channel: Channel) -> bool {
        self.inner
            .lock()
            .unwrap()
            .repeat_timers
            .remove(controller_id);
        self.send_to_partner(controller_id, &clear_command(channel))
    }

    fn send_to_partner(&self, from: &str, body: &str) -> bool {
        let inner = self.inner.lock().unwrap();
        let Some(partner) = inner.pairing.partner_of(from).map(str::to_string) else {
            return false;
        };
        match inner.endpoints.get(&partner) {
            Some(ep) if ep.transport.is_live() => {
                ep.transport.send(&WireFrame::msg(from, &partner, body))
            }
            _ => false,
        }
    }

    /// Remove an endpoint on transport close/error or explicit teardown:
    /// cancel its repeat timer, notify and force-close a bound partner, and
    /// clear the pairing in both directions.
    pub fn remove_endpoint(&self, id: &str) {
        let mut inner = self.inner.lock().unwrap();
        inner.repeat_timers.remove(id);

        let mut bind_change = None;
        if let Some((controller, app)) = inner.pairing.remove(id) {
            let partner = if id == controller { &app } else { &controller };
            if let Some(ep) = inner.endpoints.get(partner) {
                ep.transport
                    .send(&WireFrame::break_frame(&controller, &app, "209"));
                ep.transport.close();
            }
            bind_change = Some(controller);
        }

        if let Some(ep) = inner.endpoints.remove(id) {
            ep.transport.close();
        }
        drop(inner);

        tracing::debug!(%id, "removed endpoint");
        if let Some(controller_id) = bind_change {
            self.emit(BridgeEvent::BindChange {
                controller_id,
                app_id: None,
            });
        }
    }

    /// Start the global heartbeat sweep: every endpoint periodically
    /// receives a heartbeat addressed to its current partner (empty target
    /// if unbound). Fire-and-forget.
    pub fn start_heartbeat(&self, interval: Duration) -> SweepHandle {
        let inner = Arc::clone(&self.inner);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            ticker.tick().await; // immediate first tick
            loop {
                ticker.tick().await;
                let guard = inner.lock().unwrap();
                for (id, ep) in &guard.endpoints {
                    let target = guard.pairing.partner_of(id).unwrap_or("");
                    ep.transport.send(&WireFrame::heartbeat(id, target));
                }
            }
        });
        SweepHandle::new(handle)
    }
}
