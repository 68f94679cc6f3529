//! Waveform codec and wire-protocol vocabulary for the stimgate gateway.
//!
//! Turns a human-authored multi-section pulse description into the device's
//! native 16-hex-character control frames via piecewise-linear frequency
//! remapping and point interpolation, and defines the JSON wire frame,
//! status codes, telemetry bodies, and control-command bodies spoken over
//! the pairing/relay protocol.
//!
//! Zero I/O: pure transforms with no opinions about transport or state.

pub mod commands;
pub mod frames;
pub mod freq;
pub mod telemetry;
pub mod time;
pub mod waveform;
pub mod wire;

pub use commands::{Channel, StrengthMode, clear_command, pulse_commands, strength_command};
pub use frames::{is_valid_frame, waveform_frames};
pub use freq::{lerp, remap_frequency};
pub use telemetry::{StrengthReport, parse_feedback, parse_strength_report};
pub use time::{now_millis, unix_millis_to_iso8601};
pub use waveform::{
    CodecError, ParsedWaveform, ShapePoint, WaveformMeta, WaveformSection, encode_waveform,
    parse_waveform,
};
pub use wire::{FrameKind, MAX_MESSAGE_LEN, WireFrame, describe_status};
