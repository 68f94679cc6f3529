//! Stateful substrate of the stimgate gateway.
//!
//! Owns the raw device-protocol connections: assigns connection identities,
//! runs the bind handshake pairing a controller identity with the mobile
//! companion app, relays control/telemetry frames between the pair, and
//! intercepts specific telemetry into events. Alongside it live the
//! AI-facing session store with lazy+active TTL eviction and the in-memory
//! waveform library.
//!
//! The bridge never mutates a session directly; it only emits
//! [`BridgeEvent`]s that the embedding code relays into the
//! [`SessionStore`].

pub mod bridge;
pub mod endpoint;
pub mod pairing;
pub mod session;
pub mod sweep;
pub mod transport;
pub mod waveforms;

pub use bridge::{Bridge, BridgeEvent, DEFAULT_HEARTBEAT_INTERVAL_MS};
pub use endpoint::{Endpoint, Role};
pub use pairing::Pairing;
pub use session::{
    ConnectionDelta, DEFAULT_SESSION_TTL_MS, DEFAULT_SWEEP_INTERVAL_MS, DeviceSession,
    SessionStore,
};
pub use sweep::SweepHandle;
pub use transport::{ChannelTransport, NullTransport, Transport, TransportEvent};
pub use waveforms::WaveformStore;
