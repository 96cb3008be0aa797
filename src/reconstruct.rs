//! Turns raw counter values fetched from the capture buffer into absolute,
//! monotonic timestamps.
//!
//! The hardware counters are 16 or 32 bits wide and wrap silently. The
//! buffer carries no end-of-data marker: unfilled slots simply read as zero.

use crate::capture::Prescaler;

/// Width of one raw counter value in the capture buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleWidth {
    Bits16,
    Bits32,
}

impl SampleWidth {
    pub fn bits(&self) -> u32 {
        match self {
            SampleWidth::Bits16 => 16,
            SampleWidth::Bits32 => 32,
        }
    }

    /// Number of distinct counter values, added once per detected wrap.
    pub fn range(&self) -> u64 {
        1u64 << self.bits()
    }

    /// Footprint of one entry in 16-bit buffer words.
    pub fn words(&self) -> usize {
        match self {
            SampleWidth::Bits16 => 1,
            SampleWidth::Bits32 => 2,
        }
    }

    pub fn bytes(&self) -> usize {
        self.words() * 2
    }
}

/// Drop unfilled slots from the end of a fetched block.
///
/// Only trailing zeros go; a zero at the start of the data is a legitimate
/// time origin and stays.
pub fn trim_trailing_zeros(raw: &[u32]) -> &[u32] {
    let end = raw.iter().rposition(|&tick| tick != 0).map_or(0, |i| i + 1);
    &raw[..end]
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Unwrapped {
    pub ticks: Vec<u64>,
    pub rollovers: usize,
}

/// Restore monotonicity across counter wraps.
///
/// Whenever a raw value is smaller than its predecessor the counter has
/// wrapped: one full range is added to it and to everything after it.
pub fn unwrap_rollovers(raw: &[u32], width: SampleWidth) -> Unwrapped {
    let mut ticks = Vec::with_capacity(raw.len());
    let mut rollovers = 0;
    let mut offset = 0u64;
    let mut previous: Option<u32> = None;

    for &value in raw {
        if previous.is_some_and(|p| value < p) {
            rollovers += 1;
            offset += width.range();
        }
        ticks.push(u64::from(value) + offset);
        previous = Some(value);
    }

    Unwrapped { ticks, rollovers }
}

/// Scale corrected tick counts to seconds.
pub fn ticks_to_seconds(ticks: &[u64], clock_hz: f64, prescaler: Prescaler) -> Vec<f64> {
    let tick_rate = clock_hz / f64::from(prescaler.divisor());
    ticks.iter().map(|&t| t as f64 / tick_rate).collect()
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Reconstruction {
    /// Tick counts after rollover correction.
    pub ticks: Vec<u64>,
    /// Absolute timestamps in seconds.
    pub timestamps: Vec<f64>,
    pub rollovers: usize,
}

impl Reconstruction {
    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    /// Time between the first and last event, in seconds.
    pub fn span(&self) -> f64 {
        match (self.timestamps.first(), self.timestamps.last()) {
            (Some(first), Some(last)) => last - first,
            _ => 0.0,
        }
    }
}

/// Trim, unwrap and scale one channel's raw ticks.
pub fn reconstruct(
    raw: &[u32],
    width: SampleWidth,
    clock_hz: f64,
    prescaler: Prescaler,
) -> Reconstruction {
    profile_scope!("reconstruct");

    let trimmed = trim_trailing_zeros(raw);
    if trimmed.is_empty() {
        return Reconstruction::default();
    }
    let Unwrapped { ticks, rollovers } = unwrap_rollovers(trimmed, width);
    if rollovers > 0 {
        log::debug!(
            "Corrected {} counter rollover(s) over {} samples",
            rollovers,
            ticks.len()
        );
    }
    let timestamps = ticks_to_seconds(&ticks, clock_hz, prescaler);
    Reconstruction {
        ticks,
        timestamps,
        rollovers,
    }
}

/// Shift both series so the first event of `reference` lands at zero.
pub fn zero_reference(reference: &mut [f64], other: &mut [f64]) {
    let Some(&origin) = reference.first() else {
        return;
    };
    for t in reference.iter_mut().chain(other.iter_mut()) {
        *t -= origin;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    const CLOCK: f64 = 64e6;

    #[test]
    fn test_single_channel_rising_edge_scenario() {
        let raw = [100, 500, 65600, 300, 1200];
        let result = reconstruct(&raw, SampleWidth::Bits16, CLOCK, Prescaler::Div1);
        assert_eq!(result.ticks, vec![100, 500, 65600, 65836, 66736]);
        assert_eq!(result.rollovers, 1);
        let expected: Vec<f64> = result.ticks.iter().map(|&t| t as f64 / CLOCK).collect();
        assert_eq!(result.timestamps, expected);
    }

    #[test]
    fn test_trim_only_removes_trailing_zeros() {
        assert_eq!(trim_trailing_zeros(&[0, 5, 9, 0, 0]), &[0, 5, 9]);
        assert_eq!(trim_trailing_zeros(&[0, 0, 0]), &[] as &[u32]);
        assert_eq!(trim_trailing_zeros(&[]), &[] as &[u32]);
        assert_eq!(trim_trailing_zeros(&[3, 0, 4]), &[3, 0, 4]);
    }

    #[test]
    fn test_leading_zero_is_the_time_origin() {
        let result = reconstruct(
            &[0, 640, 1280, 0, 0],
            SampleWidth::Bits32,
            CLOCK,
            Prescaler::Div1,
        );
        assert_eq!(result.ticks, vec![0, 640, 1280]);
        assert_eq!(result.timestamps[0], 0.0);
        assert!((result.timestamps[2] - 20e-6).abs() < 1e-15);
    }

    #[test]
    fn test_empty_channel_yields_empty_sequence() {
        let result = reconstruct(&[0; 16], SampleWidth::Bits16, CLOCK, Prescaler::Div1);
        assert!(result.is_empty());
        assert_eq!(result.rollovers, 0);
        assert_eq!(result.span(), 0.0);
    }

    #[test]
    fn test_prescaler_scales_time() {
        let result = reconstruct(&[64, 128], SampleWidth::Bits16, CLOCK, Prescaler::Div64);
        assert!((result.timestamps[0] - 64e-6).abs() < 1e-15);
        assert!((result.timestamps[1] - 128e-6).abs() < 1e-15);
    }

    #[test]
    fn test_interior_zero_counts_as_wrap() {
        let result = unwrap_rollovers(&[65000, 0, 10], SampleWidth::Bits16);
        assert_eq!(result.ticks, vec![65000, 65536, 65546]);
        assert_eq!(result.rollovers, 1);
    }

    fn synthetic_ticks(rng: &mut StdRng, width: SampleWidth, len: usize) -> (Vec<u32>, usize) {
        let mask = width.range() - 1;
        let mut absolute = rng.gen_range(1..1000u64);
        let mut raw = Vec::with_capacity(len);
        let mut decreasing = 0;
        for _ in 0..len {
            // keep zero reserved for unfilled slots
            if absolute & mask == 0 {
                absolute += 1;
            }
            let value = (absolute & mask) as u32;
            if raw.last().is_some_and(|&p| value < p) {
                decreasing += 1;
            }
            raw.push(value);
            absolute += rng.gen_range(1..(mask / 2));
        }
        (raw, decreasing)
    }

    #[test]
    fn test_rollover_correctness_on_random_sequences() {
        let mut rng = StdRng::seed_from_u64(0x5eed);
        for width in [SampleWidth::Bits16, SampleWidth::Bits32] {
            for _ in 0..200 {
                let len = rng.gen_range(1..64);
                let (raw, decreasing) = synthetic_ticks(&mut rng, width, len);
                let result = reconstruct(&raw, width, CLOCK, Prescaler::Div1);
                if result.is_empty() {
                    continue;
                }

                assert_eq!(result.rollovers, decreasing);
                assert!(result.timestamps.windows(2).all(|w| w[0] <= w[1]));
                assert!(result.ticks.windows(2).all(|w| w[0] <= w[1]));

                let first = result.ticks[0];
                let last = result.ticks[result.ticks.len() - 1];
                let expected_span = (last - first) as f64 / CLOCK;
                assert!((result.span() - expected_span).abs() <= 1e-9 * expected_span.max(1.0));
            }
        }
    }

    #[test]
    fn test_trailing_padding_does_not_change_result() {
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..100 {
            let len = rng.gen_range(1..32);
            let (raw, _) = synthetic_ticks(&mut rng, SampleWidth::Bits16, len);
            let baseline = reconstruct(&raw, SampleWidth::Bits16, CLOCK, Prescaler::Div8);

            let mut padded = raw.clone();
            padded.extend(std::iter::repeat(0).take(rng.gen_range(1..50)));
            let result = reconstruct(&padded, SampleWidth::Bits16, CLOCK, Prescaler::Div8);
            assert_eq!(result, baseline);
        }
    }

    #[test]
    fn test_zero_reference_scenario() {
        let mut a = ticks_to_seconds(&[1000, 2000], CLOCK, Prescaler::Div1);
        let mut b = ticks_to_seconds(&[1500, 2500], CLOCK, Prescaler::Div1);
        zero_reference(&mut a, &mut b);

        let close = |x: f64, y: f64| (x - y).abs() < 1e-15;
        assert_eq!(a[0], 0.0);
        assert!(close(a[1], 1000.0 / CLOCK));
        assert!(close(b[0], 500.0 / CLOCK));
        assert!(close(b[1], 1500.0 / CLOCK));
    }

    #[test]
    fn test_zero_reference_with_empty_reference_is_noop() {
        let mut b = vec![1.0, 2.0];
        zero_reference(&mut [], &mut b);
        assert_eq!(b, vec![1.0, 2.0]);
    }
}
