//! Region histograms used for exposure feedback.

use crate::frame::{RawFrame, Region};
use serde::{Deserialize, Serialize};

/// Samples are 12-bit; anything above is counted in the top bin.
const BINS: usize = 4096;
const DISPLAY_RANGE: f32 = 255.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistogramParams {
    pub threshold_low: u16,
    pub threshold_high: u16,
    /// Share of samples discarded from each tail before taking the bounds.
    pub discard_fraction: f32,
}

impl Default for HistogramParams {
    fn default() -> Self {
        Self {
            threshold_low: 0,
            threshold_high: (BINS - 1) as u16,
            discard_fraction: 0.01,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExposureStats {
    pub origin: u16,
    pub top: u16,
    /// Gain that maps `origin..=top` onto 0..=255; zero for an empty range.
    pub scale: f32,
}

pub fn histogram(frame: &RawFrame, region: Region, params: &HistogramParams) -> ExposureStats {
    let region = region.clamp_to(frame.width(), frame.height());
    let mut bins = vec![0u64; BINS];
    let mut total = 0u64;

    for y in region.y..region.y + region.height {
        for &sample in &frame.row(y)[region.x..region.x + region.width] {
            if sample < params.threshold_low || sample > params.threshold_high {
                continue;
            }
            bins[(sample as usize).min(BINS - 1)] += 1;
            total += 1;
        }
    }

    if total == 0 {
        return ExposureStats {
            origin: params.threshold_low,
            top: params.threshold_low,
            scale: 0.0,
        };
    }

    let cut = (total as f64 * params.discard_fraction.clamp(0.0, 0.5) as f64) as u64;
    let origin = bound(bins.iter().enumerate(), cut);
    let top = bound(bins.iter().enumerate().rev(), cut);
    let scale = if top > origin {
        DISPLAY_RANGE / (top - origin) as f32
    } else {
        0.0
    };

    ExposureStats { origin, top, scale }
}

/// First bin, in iteration order, past which more than `cut` samples have been seen.
fn bound<'a>(bins: impl Iterator<Item = (usize, &'a u64)>, cut: u64) -> u16 {
    let mut seen = 0;
    for (value, &count) in bins {
        seen += count;
        if seen > cut {
            return value as u16;
        }
    }
    0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(width: usize, height: usize) -> RawFrame {
        let pixels = (0..width * height).map(|i| i as u16).collect();
        RawFrame::new(width, height, pixels).unwrap()
    }

    #[test]
    fn no_discard_gives_min_and_max() {
        let frame = ramp(10, 10);
        let params = HistogramParams { discard_fraction: 0.0, ..Default::default() };
        let stats = histogram(&frame, frame.full_region(), &params);
        assert_eq!((stats.origin, stats.top), (0, 99));
        assert!((stats.scale - 255.0 / 99.0).abs() < 1e-6);
    }

    #[test]
    fn tails_are_discarded() {
        let frame = ramp(10, 10);
        let params = HistogramParams { discard_fraction: 0.05, ..Default::default() };
        let stats = histogram(&frame, frame.full_region(), &params);
        assert_eq!((stats.origin, stats.top), (5, 94));
    }

    #[test]
    fn thresholds_exclude_samples() {
        let frame = ramp(10, 10);
        let params = HistogramParams {
            threshold_low: 20,
            threshold_high: 29,
            discard_fraction: 0.0,
        };
        let stats = histogram(&frame, frame.full_region(), &params);
        assert_eq!((stats.origin, stats.top), (20, 29));
    }

    #[test]
    fn region_restricts_samples() {
        let frame = ramp(10, 10);
        let roi = Region { x: 2, y: 3, width: 2, height: 2 };
        let params = HistogramParams { discard_fraction: 0.0, ..Default::default() };
        let stats = histogram(&frame, roi, &params);
        assert_eq!((stats.origin, stats.top), (32, 43));
    }

    #[test]
    fn flat_or_empty_region_has_zero_scale() {
        let flat = RawFrame::filled(4, 4, 100);
        let stats = histogram(&flat, flat.full_region(), &HistogramParams::default());
        assert_eq!((stats.origin, stats.top, stats.scale), (100, 100, 0.0));

        let empty = Region { x: 4, y: 4, width: 1, height: 1 };
        assert_eq!(histogram(&flat, empty, &HistogramParams::default()).scale, 0.0);
    }
}
