//! Device frame synthesis.
//!
//! A section's shape-point list is one repeating "pulse element" where each
//! point covers a 100 ms slot. The element replays whole times until it
//! reaches or exceeds the section's declared duration and is never
//! truncated mid-element, so actual playback may run slightly longer than
//! requested. Each slot expands to 4 sub-samples at 25 ms resolution, and
//! every 4 consecutive sub-samples pack into one frame: 4 hex byte pairs of
//! frequency followed by 4 of strength, 16 lowercase hex characters total.

use crate::freq::{lerp, remap_frequency};
use crate::waveform::WaveformSection;

/// Sub-samples per 100 ms shape slot (25 ms resolution).
const SUBSAMPLES_PER_SLOT: usize = 4;
/// Sub-samples per packed frame.
const SUBSAMPLES_PER_FRAME: usize = 4;

/// One 25 ms sub-sample: device frequency and integer strength.
#[derive(Clone, Copy, Debug, PartialEq)]
struct SubSample {
    freq: u8,
    strength: u8,
}

/// Raw frequency for one sub-sample, before remapping.
///
/// Mode 1: fixed at the start frequency. Mode 2: linear across the
/// section's total span. Mode 3: linear across the current element only,
/// resetting every repeat. Mode 4: fixed within an element, stepped between
/// elements by element-position fraction.
fn raw_freq(
    section: &WaveformSection,
    repeat: usize,
    repeats: usize,
    sub_in_element: usize,
    subs_per_element: usize,
    sub_global: usize,
    subs_total: usize,
) -> f64 {
    let span = |i: usize, n: usize| if n > 1 { i as f64 / (n - 1) as f64 } else { 0.0 };
    match section.mode {
        2 => lerp(section.start_freq, section.end_freq, span(sub_global, subs_total)),
        3 => lerp(
            section.start_freq,
            section.end_freq,
            span(sub_in_element, subs_per_element),
        ),
        4 => lerp(section.start_freq, section.end_freq, span(repeat, repeats)),
        _ => section.start_freq,
    }
}

fn section_subsamples(section: &WaveformSection) -> Vec<SubSample> {
    let len = section.points.len();
    if len == 0 {
        return Vec::new();
    }

    // Whole-element replays to cover the declared duration, round-up policy.
    let repeats = (section.duration as usize).div_ceil(len).max(1);
    let subs_per_element = len * SUBSAMPLES_PER_SLOT;
    let subs_total = repeats * subs_per_element;

    let mut out = Vec::with_capacity(subs_total);
    for repeat in 0..repeats {
        for slot in 0..len {
            let here = section.points[slot].strength;
            // Strength interpolates toward the next point, wrapping within
            // the element.
            let next = section.points[(slot + 1) % len].strength;
            for k in 0..SUBSAMPLES_PER_SLOT {
                let strength = lerp(here, next, k as f64 / SUBSAMPLES_PER_SLOT as f64);
                let sub_in_element = slot * SUBSAMPLES_PER_SLOT + k;
                let sub_global = repeat * subs_per_element + sub_in_element;
                let raw = raw_freq(
                    section,
                    repeat,
                    repeats,
                    sub_in_element,
                    subs_per_element,
                    sub_global,
                    subs_total,
                );
                out.push(SubSample {
                    freq: remap_frequency(raw),
                    strength: strength.round().clamp(0.0, 100.0) as u8,
                });
            }
        }
    }
    out
}

fn pack_frame(subs: &[SubSample]) -> String {
    debug_assert_eq!(subs.len(), SUBSAMPLES_PER_FRAME);
    let mut s = String::with_capacity(16);
    for sub in subs {
        s.push_str(&format!("{:02x}", sub.freq));
    }
    for sub in subs {
        s.push_str(&format!("{:02x}", sub.strength));
    }
    s
}

/// Synthesise the device frames for a sequence of sections, in order.
pub fn waveform_frames(sections: &[WaveformSection]) -> Vec<String> {
    let mut frames = Vec::new();
    for section in sections {
        let subs = section_subsamples(section);
        for chunk in subs.chunks(SUBSAMPLES_PER_FRAME) {
            if chunk.len() == SUBSAMPLES_PER_FRAME {
                frames.push(pack_frame(chunk));
            }
        }
    }
    frames
}

/// A frame is well-formed iff it is exactly 16 hex characters,
/// case-insensitive.
pub fn is_valid_frame(frame: &str) -> bool {
    frame.len() == 16 && frame.chars().all(|c| c.is_ascii_hexdigit())
}
