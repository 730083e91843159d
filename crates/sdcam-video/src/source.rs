//! Capture sources.

use crate::error::Result;
use crate::frame::RawFrame;
use std::thread;
use std::time::Duration;

/// Blocking frame capture primitive.
pub trait FrameSource: Send {
    /// Block until the next frame boundary and return the captured buffer.
    fn acquire(&mut self) -> Result<RawFrame>;

    /// Release whatever the source holds (sockets, shared memory).
    fn deinit(&mut self) -> Result<()> {
        Ok(())
    }
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn acquire(&mut self) -> Result<RawFrame> {
        (**self).acquire()
    }

    fn deinit(&mut self) -> Result<()> {
        (**self).deinit()
    }
}

const RAMP_PERIOD: usize = 128;
const RAMP_STEP: u16 = 32;
const MARKER: u16 = 0x0FF0;
const MARKER_START: usize = 1000;

/// Synthetic 12-bit ramp with a bright marker column that advances one column per frame.
pub struct TestPattern {
    width: usize,
    height: usize,
    base: Vec<u16>,
    marker: usize,
    period: Duration,
}

impl TestPattern {
    pub fn new(width: usize, height: usize, period: Duration) -> Self {
        let row: Vec<u16> = (0..width).map(|x| (x % RAMP_PERIOD) as u16 * RAMP_STEP).collect();
        Self {
            width,
            height,
            base: row.iter().copied().cycle().take(width * height).collect(),
            marker: MARKER_START.min(width.saturating_sub(1)),
            period,
        }
    }

    pub fn marker(&self) -> usize {
        self.marker
    }
}

impl Default for TestPattern {
    fn default() -> Self {
        Self::new(1280, 960, Duration::from_millis(40))
    }
}

impl FrameSource for TestPattern {
    fn acquire(&mut self) -> Result<RawFrame> {
        if !self.period.is_zero() {
            thread::sleep(self.period);
        }

        let (width, height) = (self.width, self.height);
        let mut pixels = self.base.clone();
        if width > 0 {
            for y in 0..height {
                pixels[y * width + self.marker] = MARKER;
            }
            self.marker = if self.marker + 1 < width { self.marker + 1 } else { 0 };
        }
        RawFrame::new(width, height, pixels)
    }
}
