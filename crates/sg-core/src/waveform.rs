//! Waveform text codec.
//!
//! Grammar:
//! `<tag>:<g1>,<g2>,<g3>=<section1>+section+<section2>+section+<section3>`
//! where each section is `<header>/<shapeList>`, a header is
//! `startFreq,endFreq,durationUnits,freqMode,enabledFlag`, and a shape list
//! is comma-separated `<strength>-<shapeType>` pairs (strength 0-100 with
//! two decimals, shape type 0-4). The three global header fields are owned
//! by the device's companion app; we carry them opaquely.
//!
//! Section 1 is always kept regardless of its enabled flag; sections 2 and
//! 3 survive only when their flag is nonzero. Parsing never saves a partial
//! result; any structural problem aborts with a located format error.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::frames::waveform_frames;
use crate::time::now_millis;

/// Separator between sections in the textual form.
const SECTION_SEP: &str = "+section+";
/// Maximum number of sections a waveform may carry.
pub const MAX_SECTIONS: usize = 3;
/// Longest declared section duration, in 100 ms units (five minutes of
/// playback). Synthesis allocates one frame per unit, so the duration
/// field bounds memory use and must itself be bounded.
pub const MAX_SECTION_DURATION: u32 = 3000;

#[derive(Debug)]
pub enum CodecError {
    /// Malformed waveform text. The message names where parsing failed.
    Format(String),
}

impl fmt::Display for CodecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CodecError::Format(msg) => write!(f, "waveform format error: {msg}"),
        }
    }
}

impl std::error::Error for CodecError {}

pub type Result<T> = std::result::Result<T, CodecError>;

fn format_err<T>(msg: impl Into<String>) -> Result<T> {
    Err(CodecError::Format(msg.into()))
}

/// One point of a section's repeating pulse element.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ShapePoint {
    /// Strength 0.0-100.0 (two decimals in the textual form).
    pub strength: f64,
    /// Shape type 0-4.
    pub shape_type: u8,
}

/// One parsed waveform section.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WaveformSection {
    /// Position in the source text, 0-2.
    pub index: usize,
    pub enabled: bool,
    /// Start frequency in raw editor units.
    pub start_freq: f64,
    /// End frequency in raw editor units.
    pub end_freq: f64,
    /// Declared duration in 100 ms units.
    pub duration: u32,
    /// Frequency mode 1-4 (fixed / section-linear / element-linear / stepped).
    pub mode: u8,
    pub points: Vec<ShapePoint>,
}

/// Header summary across all three section slots, with absent slots zeroed.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct WaveformMeta {
    /// The three opaque global header fields.
    pub global: [f64; 3],
    pub start_freq: [f64; 3],
    pub end_freq: [f64; 3],
    pub duration: [u32; 3],
    pub mode: [u8; 3],
    pub section2_enabled: bool,
    pub section3_enabled: bool,
}

/// A fully parsed waveform plus its derived device frames.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ParsedWaveform {
    /// Library key. Saving under an existing name overwrites.
    pub name: String,
    /// The tag preceding the first `:` in the source text.
    pub tag: String,
    pub meta: WaveformMeta,
    /// Surviving sections, in source order.
    pub sections: Vec<WaveformSection>,
    /// Original source text, verbatim.
    pub source: String,
    /// Derived device frames, 16 lowercase hex chars each.
    pub frames: Vec<String>,
    /// Creation time, Unix milliseconds.
    pub created_at: u64,
}

fn parse_num(s: &str, what: &str) -> Result<f64> {
    match s.trim().parse::<f64>() {
        Ok(v) if v.is_finite() => Ok(v),
        _ => format_err(format!("{what}: invalid number '{}'", s.trim())),
    }
}

fn parse_header(header: &str, index: usize) -> Result<WaveformSection> {
    let fields: Vec<&str> = header.split(',').collect();
    if fields.len() != 5 {
        return format_err(format!(
            "section {} header has {} fields, expected 5",
            index + 1,
            fields.len()
        ));
    }
    let ctx = |i: usize| format!("section {} header field {}", index + 1, i + 1);
    let start_freq = parse_num(fields[0], &ctx(0))?;
    let end_freq = parse_num(fields[1], &ctx(1))?;
    let duration = parse_num(fields[2], &ctx(2))? as u32;
    let mode = parse_num(fields[3], &ctx(3))? as u8;
    let enabled = parse_num(fields[4], &ctx(4))? != 0.0;
    if !(1..=4).contains(&mode) {
        return format_err(format!(
            "section {} frequency mode {mode} out of range 1-4",
            index + 1
        ));
    }
    if duration > MAX_SECTION_DURATION {
        return format_err(format!(
            "section {} duration {duration} exceeds {MAX_SECTION_DURATION}",
            index + 1
        ));
    }
    Ok(WaveformSection {
        index,
        enabled,
        start_freq,
        end_freq,
        duration,
        mode,
        points: Vec::new(),
    })
}

fn parse_points(list: &str, index: usize) -> Result<Vec<ShapePoint>> {
    let mut points = Vec::new();
    for (i, raw) in list.split(',').enumerate() {
        let Some((strength, shape)) = raw.split_once('-') else {
            return format_err(format!(
                "section {} shape point {} lacks '-' separator",
                index + 1,
                i + 1
            ));
        };
        let strength = parse_num(strength, &format!("section {} point {}", index + 1, i + 1))?;
        if !(0.0..=100.0).contains(&strength) {
            return format_err(format!(
                "section {} point {} strength {strength} out of range 0-100",
                index + 1,
                i + 1
            ));
        }
        let shape_type =
            parse_num(shape, &format!("section {} point {} shape", index + 1, i + 1))? as u8;
        if shape_type > 4 {
            return format_err(format!(
                "section {} point {} shape type {shape_type} out of range 0-4",
                index + 1,
                i + 1
            ));
        }
        points.push(ShapePoint {
            strength,
            shape_type,
        });
    }
    Ok(points)
}

/// Parse waveform text into a [`ParsedWaveform`], synthesising its device
/// frames. Fails with a located [`CodecError::Format`] on any structural
/// problem; never produces a partial result.
pub fn parse_waveform(text: &str, name: &str) -> Result<ParsedWaveform> {
    let Some((tag, body)) = text.split_once(':') else {
        return format_err("missing ':' tag separator");
    };

    let raw_sections: Vec<&str> = body.split(SECTION_SEP).take(MAX_SECTIONS).collect();

    // Section 1 carries the global header before its own, joined with '='.
    let Some((global_str, first_section)) = raw_sections[0].split_once('=') else {
        return format_err("section 1 lacks '=' global header separator");
    };
    let global_fields: Vec<&str> = global_str.split(',').collect();
    if global_fields.len() != 3 {
        return format_err(format!(
            "global header has {} fields, expected 3",
            global_fields.len()
        ));
    }
    let mut global = [0.0f64; 3];
    for (i, f) in global_fields.iter().enumerate() {
        global[i] = parse_num(f, &format!("global header field {}", i + 1))?;
    }

    let mut meta = WaveformMeta {
        global,
        ..WaveformMeta::default()
    };
    let mut sections = Vec::new();

    for (index, raw) in std::iter::once(first_section)
        .chain(raw_sections.iter().skip(1).copied())
        .enumerate()
    {
        let Some((header, shapes)) = raw.split_once('/') else {
            return format_err(format!("section {} lacks '/' separator", index + 1));
        };
        let mut section = parse_header(header, index)?;
        section.points = parse_points(shapes, index)?;
        if section.points.is_empty() {
            return format_err(format!("section {} has no shape points", index + 1));
        }

        meta.start_freq[index] = section.start_freq;
        meta.end_freq[index] = section.end_freq;
        meta.duration[index] = section.duration;
        meta.mode[index] = section.mode;
        match index {
            1 => meta.section2_enabled = section.enabled,
            2 => meta.section3_enabled = section.enabled,
            _ => {}
        }

        // Section 1 is kept unconditionally; later sections only if enabled.
        if index == 0 || section.enabled {
            sections.push(section);
        }
    }

    if sections.is_empty() {
        return format_err("no sections survive filtering");
    }

    let frames = waveform_frames(&sections);

    Ok(ParsedWaveform {
        name: name.to_string(),
        tag: tag.to_string(),
        meta,
        sections,
        source: text.to_string(),
        frames,
        created_at: now_millis(),
    })
}

/// Format a header number: integers without a fractional part, everything
/// else as-is.
fn fmt_num(v: f64) -> String {
    if v.fract() == 0.0 && v.abs() < 1e15 {
        format!("{}", v as i64)
    } else {
        format!("{v}")
    }
}

fn encode_section(section: &WaveformSection) -> String {
    let header = format!(
        "{},{},{},{},{}",
        fmt_num(section.start_freq),
        fmt_num(section.end_freq),
        section.duration,
        section.mode,
        if section.enabled { 1 } else { 0 },
    );
    let points = section
        .points
        .iter()
        .map(|p| format!("{:.2}-{}", p.strength, p.shape_type))
        .collect::<Vec<_>>()
        .join(",");
    format!("{header}/{points}")
}

/// Reconstruct waveform text from the parsed structure (not from frames).
///
/// Formatting may differ from the original source; structure may not:
/// re-parsing the result preserves section count and each section's
/// start/end frequency, duration, and mode.
pub fn encode_waveform(waveform: &ParsedWaveform) -> String {
    let global = format!(
        "{},{},{}",
        fmt_num(waveform.meta.global[0]),
        fmt_num(waveform.meta.global[1]),
        fmt_num(waveform.meta.global[2]),
    );
    let sections = waveform
        .sections
        .iter()
        .map(encode_section)
        .collect::<Vec<_>>()
        .join(SECTION_SEP);
    format!("{}:{}={}", waveform.tag, global, sections)
}
