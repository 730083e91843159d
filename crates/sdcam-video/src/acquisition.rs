//! Acquisition loop: capture, statistics, render, publish, pace.
//!
//! The loop runs on its own thread and is stopped cooperatively. The stop flag
//! is polled once per completed iteration, after the pacing sleep, so a
//! blocked `acquire` is never interrupted: shutdown takes up to one frame
//! period plus the pacing interval.

use crate::display::{DisplayQueue, DisplayStats, Publish};
use crate::error::{Error, Result};
use crate::frame::{DisplayFrame, RawFrame, Region};
use crate::render::render;
use crate::source::FrameSource;
use crate::stats::{histogram, ExposureStats, HistogramParams};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AcquisitionConfig {
    /// Pause after each published frame.
    pub frame_interval_ms: u64,
    /// Integer display gain applied after the 12-to-8-bit shift.
    pub gain: u8,
    pub roi: Region,
    pub roi_histogram: HistogramParams,
    pub frame_histogram: HistogramParams,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            frame_interval_ms: 40,
            gain: 1,
            roi: Region { x: 480, y: 320, width: 320, height: 320 },
            roi_histogram: HistogramParams::default(),
            frame_histogram: HistogramParams::default(),
        }
    }
}

/// Statistics derived from one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Exposure {
    pub roi: ExposureStats,
    pub frame: ExposureStats,
}

/// One loop iteration without the thread around it.
pub struct FramePipeline {
    config: AcquisitionConfig,
}

impl FramePipeline {
    pub fn new(config: AcquisitionConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AcquisitionConfig {
        &self.config
    }

    pub fn process(&self, raw: &RawFrame) -> (Exposure, DisplayFrame) {
        let exposure = Exposure {
            roi: histogram(raw, self.config.roi, &self.config.roi_histogram),
            frame: histogram(raw, raw.full_region(), &self.config.frame_histogram),
        };
        (exposure, render(raw, self.config.gain))
    }

    pub fn run_once<S: FrameSource + ?Sized>(&self, source: &mut S, display: &mut DisplayQueue) -> Result<Publish> {
        let raw = source.acquire()?;
        let (exposure, bitmap) = self.process(&raw);
        log::debug!(
            "exposure roi {}..{} x{:.3}, frame {}..{} x{:.3}",
            exposure.roi.origin,
            exposure.roi.top,
            exposure.roi.scale,
            exposure.frame.origin,
            exposure.frame.top,
            exposure.frame.scale
        );
        Ok(display.publish(bitmap))
    }
}

/// Cloneable stop request, settable from any thread.
#[derive(Debug, Clone, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    pub fn request_stop(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_stop_requested(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

pub struct Acquisition {
    stop: StopSignal,
    handle: JoinHandle<DisplayStats>,
}

impl Acquisition {
    pub fn spawn<S: FrameSource + 'static>(source: S, display: DisplayQueue, config: AcquisitionConfig) -> Result<Self> {
        let stop = StopSignal::default();
        let flag = stop.clone();
        let handle = thread::Builder::new()
            .name("sdcam-acquisition".to_string())
            .spawn(move || run(source, display, FramePipeline::new(config), flag))?;
        Ok(Self { stop, handle })
    }

    pub fn request_stop(&self) {
        log::info!("acquisition pending to finish");
        self.stop.request_stop();
    }

    pub fn stop_signal(&self) -> StopSignal {
        self.stop.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Block until the loop has exited and its source is released.
    pub fn join(self) -> Result<DisplayStats> {
        self.handle.join().map_err(|_| Error::Panicked)
    }
}

fn run<S: FrameSource>(mut source: S, mut display: DisplayQueue, pipeline: FramePipeline, stop: StopSignal) -> DisplayStats {
    let interval = Duration::from_millis(pipeline.config().frame_interval_ms);
    log::info!("acquisition started");

    loop {
        if let Err(e) = pipeline.run_once(&mut source, &mut display) {
            log::error!("frame acquisition failed: {e}");
        }
        if !interval.is_zero() {
            thread::sleep(interval);
        }
        if stop.is_stop_requested() {
            break;
        }
    }

    if let Err(e) = source.deinit() {
        log::error!("capture source deinit failed: {e}");
    }
    let stats = display.stats();
    log::info!(
        "acquisition stopped: {} published, {} dropped, {} overflow episodes",
        stats.published,
        stats.dropped,
        stats.overflow_episodes
    );
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::display::display_queue;
    use crate::source::TestPattern;

    fn small_config() -> AcquisitionConfig {
        AcquisitionConfig {
            frame_interval_ms: 0,
            roi: Region { x: 0, y: 0, width: 4, height: 2 },
            ..Default::default()
        }
    }

    #[test]
    fn process_renders_and_measures() {
        let pipeline = FramePipeline::new(small_config());
        let raw = RawFrame::new(4, 2, vec![0x000, 0x100, 0x200, 0x300, 0x400, 0x500, 0x600, 0x700]).unwrap();
        let (exposure, bitmap) = pipeline.process(&raw);
        assert_eq!(bitmap.pixels, vec![0x00, 0x10, 0x20, 0x30, 0x40, 0x50, 0x60, 0x70]);
        assert_eq!((exposure.frame.origin, exposure.frame.top), (0x000, 0x700));
        assert_eq!(exposure.roi, exposure.frame);
    }

    #[test]
    fn stop_is_honoured_after_current_iteration() {
        let (display, rx) = display_queue(4);
        let acq = Acquisition::spawn(TestPattern::new(8, 4, Duration::from_millis(5)), display, small_config()).unwrap();
        while rx.is_empty() {
            thread::sleep(Duration::from_millis(1));
        }
        acq.request_stop();
        let stats = acq.join().unwrap();
        assert!((1..=4).contains(&stats.published));
        assert!(stats.dropped == 0 || stats.overflow_episodes == 1);
    }
}
