//! Piecewise-linear frequency remapping between the waveform text's raw
//! units and the device's playable range.
//!
//! The device accepts frequencies in `[10, 240]`; authored waveforms use a
//! 0-100-ish editor scale. The conversion runs two fixed piecewise-linear
//! passes whose segment tables come from the device's companion app and
//! must be reproduced exactly.

/// One linear segment: `y = slope * x + intercept` for `x < x_max`.
/// The last segment of a table is open-ended.
struct Segment {
    x_max: f64,
    slope: f64,
    intercept: f64,
}

const fn seg(x_max: f64, slope: f64, intercept: f64) -> Segment {
    Segment {
        x_max,
        slope,
        intercept,
    }
}

/// Raw editor units → intermediate scale.
const RAW_TO_INTERMEDIATE: [Segment; 7] = [
    seg(40.0, 1.0, 10.0),
    seg(55.0, 2.0, -30.0),
    seg(59.0, 5.0, -195.0),
    seg(69.0, 10.0, -490.0),
    seg(75.0, 33.0, -2099.0),
    seg(79.0, 50.0, -3350.0),
    seg(f64::INFINITY, 100.0, -7300.0),
];

/// Intermediate scale → device output units.
const INTERMEDIATE_TO_OUTPUT: [Segment; 3] = [
    seg(100.0, 1.0, 0.0),
    seg(660.0, 0.2, 80.0),
    seg(f64::INFINITY, 0.1, 140.0),
];

/// Minimum playable device frequency.
pub const FREQ_MIN: u8 = 10;
/// Maximum playable device frequency.
pub const FREQ_MAX: u8 = 240;

fn apply(table: &[Segment], x: f64) -> f64 {
    for s in table {
        if x < s.x_max {
            return s.slope * x + s.intercept;
        }
    }
    // Unreachable: the last segment is open-ended.
    let s = &table[table.len() - 1];
    s.slope * x + s.intercept
}

/// Remap a raw waveform frequency into the device's `[10, 240]` range.
///
/// Rounded to the nearest integer after both passes; any finite input
/// clamps into range.
pub fn remap_frequency(raw: f64) -> u8 {
    let intermediate = apply(&RAW_TO_INTERMEDIATE, raw);
    let out = apply(&INTERMEDIATE_TO_OUTPUT, intermediate);
    out.round().clamp(FREQ_MIN as f64, FREQ_MAX as f64) as u8
}

/// Linear interpolation from `a` toward `b` by `t` in `[0, 1]`.
pub fn lerp(a: f64, b: f64, t: f64) -> f64 {
    a + (b - a) * t
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn anchor_points() {
        assert_eq!(remap_frequency(0.0), 10);
        assert_eq!(remap_frequency(10.0), 20);
        assert_eq!(remap_frequency(40.0), 50);
    }

    #[test]
    fn segment_boundaries_are_continuous_in_first_pass() {
        // Adjacent raw→intermediate segments agree at their shared x.
        for (a, b) in RAW_TO_INTERMEDIATE
            .iter()
            .zip(RAW_TO_INTERMEDIATE.iter().skip(1))
        {
            let x = a.x_max;
            let ya = a.slope * x + a.intercept;
            let yb = b.slope * x + b.intercept;
            assert!((ya - yb).abs() < 1e-9, "discontinuity at x={x}");
        }
    }

    #[test]
    fn extreme_inputs_clamp() {
        assert_eq!(remap_frequency(-1000.0), 10);
        assert_eq!(remap_frequency(1e9), 240);
        assert_eq!(remap_frequency(100.0), 240);
    }

    #[test]
    fn lerp_endpoints() {
        assert_eq!(lerp(10.0, 20.0, 0.0), 10.0);
        assert_eq!(lerp(10.0, 20.0, 1.0), 20.0);
        assert_eq!(lerp(10.0, 20.0, 0.5), 15.0);
    }

    proptest! {
        #[test]
        fn always_in_device_range(raw in -1e6f64..1e6f64) {
            let f = remap_frequency(raw);
            prop_assert!((FREQ_MIN..=FREQ_MAX).contains(&f));
        }

        #[test]
        fn monotone_on_sane_inputs(a in 0f64..100f64, b in 0f64..100f64) {
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            prop_assert!(remap_frequency(lo) <= remap_frequency(hi));
        }
    }
}
