use crate::frame::{DisplayFrame, RawFrame};

/// Reduce 12-bit samples to 8 bits and apply the integer display gain.
///
/// The gain multiply wraps, so saturated regions roll over instead of clipping.
pub fn render(frame: &RawFrame, gain: u8) -> DisplayFrame {
    let pixels = frame
        .pixels()
        .iter()
        .map(|&p| ((p >> 4) as u8).wrapping_mul(gain))
        .collect();
    DisplayFrame {
        width: frame.width(),
        height: frame.height(),
        pixels,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shifts_to_eight_bits() {
        let frame = RawFrame::new(4, 1, vec![0, 0x0010, 0x0800, 0x0FFF]).unwrap();
        assert_eq!(render(&frame, 1).pixels, vec![0, 1, 0x80, 0xFF]);
    }

    #[test]
    fn gain_wraps() {
        let frame = RawFrame::new(2, 1, vec![0x0100, 0x0900]).unwrap();
        assert_eq!(render(&frame, 2).pixels, vec![0x20, 0x20]);
    }
}
