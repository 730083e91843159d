use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Raw capture buffer: row-major 12-bit samples stored in `u16`.
#[derive(Debug, Clone, PartialEq)]
pub struct RawFrame {
    width: usize,
    height: usize,
    pixels: Vec<u16>,
}

impl RawFrame {
    pub fn new(width: usize, height: usize, pixels: Vec<u16>) -> Result<Self> {
        let expected = width * height;
        if pixels.len() != expected {
            return Err(Error::Geometry {
                width,
                height,
                expected,
                actual: pixels.len(),
            });
        }
        Ok(Self { width, height, pixels })
    }

    pub fn filled(width: usize, height: usize, value: u16) -> Self {
        Self {
            width,
            height,
            pixels: vec![value; width * height],
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn pixels(&self) -> &[u16] {
        &self.pixels
    }

    pub fn row(&self, y: usize) -> &[u16] {
        &self.pixels[y * self.width..(y + 1) * self.width]
    }

    pub fn full_region(&self) -> Region {
        Region {
            x: 0,
            y: 0,
            width: self.width,
            height: self.height,
        }
    }
}

/// 8-bit intensity bitmap handed to the display consumer.
#[derive(Debug, Clone, PartialEq)]
pub struct DisplayFrame {
    pub width: usize,
    pub height: usize,
    pub pixels: Vec<u8>,
}

impl DisplayFrame {
    pub fn mean(&self) -> f32 {
        if self.pixels.is_empty() {
            return 0.0;
        }
        let sum: u64 = self.pixels.iter().map(|&p| p as u64).sum();
        sum as f32 / self.pixels.len() as f32
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Region {
    pub x: usize,
    pub y: usize,
    pub width: usize,
    pub height: usize,
}

impl Region {
    /// Intersection with a `width` x `height` frame.
    pub fn clamp_to(&self, width: usize, height: usize) -> Region {
        let x = self.x.min(width);
        let y = self.y.min(height);
        Region {
            x,
            y,
            width: self.width.min(width - x),
            height: self.height.min(height - y),
        }
    }

    pub fn area(&self) -> usize {
        self.width * self.height
    }
}
