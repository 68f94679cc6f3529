//! App-origin telemetry bodies.
//!
//! The companion app reports its channel strengths and soft limits as
//! `strength-<A>+<B>+<limitA>+<limitB>` and user feedback-button presses as
//! `feedback-<index>`. Both are intercepted by the bridge before being
//! forwarded unchanged.

use std::sync::LazyLock;

use regex::Regex;

static STRENGTH_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^strength-(\d+)\+(\d+)\+(\d+)\+(\d+)$").unwrap());

static FEEDBACK_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^feedback-(\d+)$").unwrap());

/// A parsed strength telemetry body.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StrengthReport {
    pub a: u32,
    pub b: u32,
    pub limit_a: u32,
    pub limit_b: u32,
}

/// Parse a `strength-<A>+<B>+<limitA>+<limitB>` body. Anything else,
/// including the wrong field count, parses to nothing.
pub fn parse_strength_report(body: &str) -> Option<StrengthReport> {
    let caps = STRENGTH_RE.captures(body)?;
    let field = |i: usize| caps.get(i)?.as_str().parse::<u32>().ok();
    Some(StrengthReport {
        a: field(1)?,
        b: field(2)?,
        limit_a: field(3)?,
        limit_b: field(4)?,
    })
}

/// Parse a `feedback-<index>` body.
pub fn parse_feedback(body: &str) -> Option<u32> {
    FEEDBACK_RE.captures(body)?.get(1)?.as_str().parse().ok()
}
