//! The AI-facing device session registry.
//!
//! Sessions are tracked independently of bridge-level endpoint bookkeeping:
//! `client_id` is a weak reference into the bridge's endpoint set, lookup
//! only. Expiry is checked lazily at read time in addition to the periodic
//! sweep; evicted and deleted sessions are reported on the eviction channel
//! so the embedding code can close any bridge endpoint they referenced.
//! The store itself never touches a transport.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::mpsc;
use uuid::Uuid;

use sg_core::{StrengthReport, now_millis};

use crate::sweep::SweepHandle;

/// Default idle time before a session expires (1 hour).
pub const DEFAULT_SESSION_TTL_MS: u64 = 3_600_000;
/// Default eviction sweep period (5 minutes).
pub const DEFAULT_SWEEP_INTERVAL_MS: u64 = 300_000;

/// Default per-channel strength limit for a fresh session.
const DEFAULT_LIMIT: u32 = 200;

#[derive(Clone, Debug, Serialize)]
pub struct DeviceSession {
    pub device_id: String,
    /// Bridge endpoint id of the session's controller, once connected.
    pub client_id: Option<String>,
    /// Bridge endpoint id of the bound companion app, once paired.
    pub app_id: Option<String>,
    pub connected: bool,
    pub bound: bool,
    pub strength_a: u32,
    pub strength_b: u32,
    pub limit_a: u32,
    pub limit_b: u32,
    /// Free text, stored verbatim, compared case-insensitively.
    pub alias: Option<String>,
    pub last_active: u64,
    pub created_at: u64,
    /// Creation order tie-breaker.
    #[serde(skip)]
    pub(crate) seq: u64,
}

/// Partial update applied by `update_connection_state`.
#[derive(Clone, Debug, Default)]
pub struct ConnectionDelta {
    pub connected: Option<bool>,
    pub bound: Option<bool>,
    pub client_id: Option<String>,
    /// `Some(None)` clears the bound app id on partner loss.
    pub app_id: Option<Option<String>>,
}

struct Inner {
    sessions: HashMap<String, DeviceSession>,
    next_seq: u64,
}

#[derive(Clone)]
pub struct SessionStore {
    inner: Arc<Mutex<Inner>>,
    ttl_ms: u64,
    evictions: mpsc::UnboundedSender<DeviceSession>,
}

impl SessionStore {
    /// Create a store and the receiving end of its eviction stream.
    pub fn new(ttl_ms: u64) -> (Self, mpsc::UnboundedReceiver<DeviceSession>) {
        let (evictions, rx) = mpsc::unbounded_channel();
        (
            Self {
                inner: Arc::new(Mutex::new(Inner {
                    sessions: HashMap::new(),
                    next_seq: 0,
                })),
                ttl_ms,
                evictions,
            },
            rx,
        )
    }

    fn expired(&self, session: &DeviceSession, now: u64) -> bool {
        now.saturating_sub(session.last_active) > self.ttl_ms
    }

    /// New session: zero strength, 200/200 limits, timestamps now.
    pub fn create(&self) -> DeviceSession {
        let now = now_millis();
        let mut inner = self.inner.lock().unwrap();
        let seq = inner.next_seq;
        inner.next_seq += 1;
        let session = DeviceSession {
            device_id: Uuid::new_v4().to_string(),
            client_id: None,
            app_id: None,
            connected: false,
            bound: false,
            strength_a: 0,
            strength_b: 0,
            limit_a: DEFAULT_LIMIT,
            limit_b: DEFAULT_LIMIT,
            alias: None,
            last_active: now,
            created_at: now,
            seq,
        };
        inner
            .sessions
            .insert(session.device_id.clone(), session.clone());
        session
    }

    /// Fetch by device id. An idle-expired session is evicted on the spot
    /// and reads as absent.
    pub fn get(&self, device_id: &str) -> Option<DeviceSession> {
        let now = now_millis();
        let mut inner = self.inner.lock().unwrap();
        if let Some(session) = inner.sessions.get(device_id) {
            if self.expired(session, now) {
                let dead = inner.sessions.remove(device_id).unwrap();
                let _ = self.evictions.send(dead);
                return None;
            }
            return Some(session.clone());
        }
        None
    }

    /// Fetch by bridge endpoint id (the session's `client_id`).
    pub fn get_by_bridge_id(&self, bridge_id: &str) -> Option<DeviceSession> {
        let device_id = {
            let inner = self.inner.lock().unwrap();
            inner
                .sessions
                .values()
                .find(|s| s.client_id.as_deref() == Some(bridge_id))
                .map(|s| s.device_id.clone())?
        };
        self.get(&device_id)
    }

    /// Evict everything expired, then return the remainder in creation
    /// order.
    pub fn list(&self) -> Vec<DeviceSession> {
        self.evict_expired();
        let inner = self.inner.lock().unwrap();
        let mut sessions: Vec<DeviceSession> = inner.sessions.values().cloned().collect();
        sessions.sort_by_key(|s| s.seq);
        sessions
    }

    /// Store the alias verbatim (original casing) and refresh activity.
    pub fn set_alias(&self, device_id: &str, alias: &str) -> bool {
        self.mutate(device_id, |s| s.alias = Some(alias.to_string()))
    }

    /// All non-expired sessions whose alias equals `query`
    /// case-insensitively, in creation order. Aliases are not unique.
    pub fn find_by_alias(&self, query: &str) -> Vec<DeviceSession> {
        self.list()
            .into_iter()
            .filter(|s| {
                s.alias
                    .as_deref()
                    .is_some_and(|a| a.eq_ignore_ascii_case(query))
            })
            .collect()
    }

    pub fn update_connection_state(&self, device_id: &str, delta: ConnectionDelta) -> bool {
        self.mutate(device_id, |s| {
            if let Some(connected) = delta.connected {
                s.connected = connected;
            }
            if let Some(bound) = delta.bound {
                s.bound = bound;
            }
            if let Some(client_id) = delta.client_id {
                s.client_id = Some(client_id);
            }
            if let Some(app_id) = delta.app_id {
                s.app_id = app_id;
            }
        })
    }

    pub fn update_strength(&self, device_id: &str, report: StrengthReport) -> bool {
        self.mutate(device_id, |s| {
            s.strength_a = report.a;
            s.strength_b = report.b;
            s.limit_a = report.limit_a;
            s.limit_b = report.limit_b;
        })
    }

    pub fn touch(&self, device_id: &str) -> bool {
        self.mutate(device_id, |_| {})
    }

    /// Remove a session explicitly, returning it so the caller can close
    /// any bridge endpoint it referenced.
    pub fn delete(&self, device_id: &str) -> Option<DeviceSession> {
        self.inner.lock().unwrap().sessions.remove(device_id)
    }

    /// Apply `f` and refresh `last_active`. Absent or expired sessions fail
    /// closed.
    fn mutate(&self, device_id: &str, f: impl FnOnce(&mut DeviceSession)) -> bool {
        let now = now_millis();
        let mut inner = self.inner.lock().unwrap();
        match inner.sessions.get_mut(device_id) {
            Some(session) if !self.expired(session, now) => {
                f(session);
                session.last_active = now;
                true
            }
            Some(_) => {
                let dead = inner.sessions.remove(device_id).unwrap();
                let _ = self.evictions.send(dead);
                false
            }
            None => false,
        }
    }

    fn evict_expired(&self) {
        let now = now_millis();
        let mut inner = self.inner.lock().unwrap();
        let dead_ids: Vec<String> = inner
            .sessions
            .values()
            .filter(|s| self.expired(s, now))
            .map(|s| s.device_id.clone())
            .collect();
        for id in dead_ids {
            if let Some(dead) = inner.sessions.remove(&id) {
                tracing::info!(device_id = %id, "session expired");
                let _ = self.evictions.send(dead);
            }
        }
    }

    /// Start the periodic eviction sweep. Runs until the handle is stopped
    /// or dropped, after which no further eviction occurs (beyond the lazy
    /// read-time checks).
    pub fn start_sweeper(&self, interval: Duration) -> SweepHandle {
        let store = self.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                store.evict_expired();
            }
        });
        SweepHandle::new(handle)
    }
}
