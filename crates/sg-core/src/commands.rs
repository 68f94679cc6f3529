//! Outbound control bodies, controller → app.

use serde::{Deserialize, Serialize};

use crate::wire::MAX_MESSAGE_LEN;

/// A device output channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Channel {
    A,
    B,
}

impl Channel {
    /// Numeric form used in `strength-` and `clear-` bodies.
    pub fn number(self) -> u8 {
        match self {
            Channel::A => 1,
            Channel::B => 2,
        }
    }

    /// Letter form used in `pulse-` bodies.
    pub fn letter(self) -> char {
        match self {
            Channel::A => 'A',
            Channel::B => 'B',
        }
    }

    /// Parse "a"/"A"/"1" or "b"/"B"/"2".
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "a" | "A" | "1" => Some(Channel::A),
            "b" | "B" | "2" => Some(Channel::B),
            _ => None,
        }
    }
}

/// How a strength command applies its value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum StrengthMode {
    Decrease,
    Increase,
    Set,
}

impl StrengthMode {
    pub fn number(self) -> u8 {
        match self {
            StrengthMode::Decrease => 0,
            StrengthMode::Increase => 1,
            StrengthMode::Set => 2,
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "decrease" | "0" => Some(StrengthMode::Decrease),
            "increase" | "1" => Some(StrengthMode::Increase),
            "set" | "2" => Some(StrengthMode::Set),
            _ => None,
        }
    }
}

/// `strength-<channel 1|2>+<mode 0|1|2>+<value>`
pub fn strength_command(channel: Channel, mode: StrengthMode, value: u32) -> String {
    format!("strength-{}+{}+{}", channel.number(), mode.number(), value)
}

/// `clear-<channel 1|2>`
pub fn clear_command(channel: Channel) -> String {
    format!("clear-{}", channel.number())
}

/// Frames per `pulse-` body. Each frame serialises as `"…16 hex…",` (19
/// characters); 100 frames keeps the body comfortably under the protocol's
/// 1950-character message limit.
pub const PULSE_CHUNK_FRAMES: usize = 100;

/// `pulse-<A|B>:<json array of 16-hex frames>`, chunked so no single body
/// exceeds [`MAX_MESSAGE_LEN`].
pub fn pulse_commands(channel: Channel, frames: &[String]) -> Vec<String> {
    frames
        .chunks(PULSE_CHUNK_FRAMES)
        .map(|chunk| {
            let array = serde_json::to_string(chunk).unwrap_or_else(|_| "[]".to_string());
            let body = format!("pulse-{}:{}", channel.letter(), array);
            debug_assert!(body.len() <= MAX_MESSAGE_LEN);
            body
        })
        .collect()
}
