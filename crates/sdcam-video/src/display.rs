//! Bounded, lossy hand-off of rendered frames to the display consumer.
//!
//! The producer never blocks: when the consumer falls behind and the queue is
//! full, new frames are dropped. The overflow warning is edge-triggered, one
//! line per overflow episode rather than one per dropped frame.

use crate::frame::DisplayFrame;
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, TrySendError};
use std::time::Duration;

pub const DISPLAY_QUEUE_CAPACITY: usize = 20;

/// Notification sent once per queued frame; the frame itself is taken from the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameReady;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Publish {
    Queued,
    Dropped,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DisplayStats {
    pub published: u64,
    pub dropped: u64,
    pub overflow_episodes: u64,
}

/// Producer half.
pub struct DisplayQueue {
    frames: crossbeam_channel::Sender<DisplayFrame>,
    ready: crossbeam_channel::Sender<FrameReady>,
    overflow: bool,
    disconnected: bool,
    stats: DisplayStats,
}

/// Consumer half.
pub struct DisplayReceiver {
    frames: Receiver<DisplayFrame>,
    ready: Receiver<FrameReady>,
}

/// A zero `capacity` is raised to one; a rendezvous channel would drop every frame.
pub fn display_queue(capacity: usize) -> (DisplayQueue, DisplayReceiver) {
    let capacity = capacity.max(1);
    let (tx_frame, rx_frame) = bounded(capacity);
    let (tx_ready, rx_ready) = bounded(capacity);
    (
        DisplayQueue {
            frames: tx_frame,
            ready: tx_ready,
            overflow: false,
            disconnected: false,
            stats: DisplayStats::default(),
        },
        DisplayReceiver {
            frames: rx_frame,
            ready: rx_ready,
        },
    )
}

impl DisplayQueue {
    pub fn publish(&mut self, frame: DisplayFrame) -> Publish {
        match self.frames.try_send(frame) {
            Ok(()) => {
                self.overflow = false;
                self.stats.published += 1;
                // a full notification channel means the consumer already has wake-ups pending
                let _ = self.ready.try_send(FrameReady);
                Publish::Queued
            }
            Err(TrySendError::Full(_)) => {
                self.stats.dropped += 1;
                if !self.overflow {
                    log::warn!("display queue full ({} frames), dropping frames", self.frames.len());
                    self.overflow = true;
                    self.stats.overflow_episodes += 1;
                }
                Publish::Dropped
            }
            Err(TrySendError::Disconnected(_)) => {
                self.stats.dropped += 1;
                if !self.disconnected {
                    log::debug!("display consumer gone, frames discarded");
                    self.disconnected = true;
                }
                Publish::Dropped
            }
        }
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn is_overflowing(&self) -> bool {
        self.overflow
    }

    pub fn stats(&self) -> DisplayStats {
        self.stats
    }
}

impl DisplayReceiver {
    /// Frame-ready notifications, suitable for `select!`.
    pub fn ready(&self) -> &Receiver<FrameReady> {
        &self.ready
    }

    pub fn try_take(&self) -> Option<DisplayFrame> {
        self.frames.try_recv().ok()
    }

    /// Wait for the next notification, then take the frame it announced.
    pub fn take_timeout(&self, timeout: Duration) -> Option<DisplayFrame> {
        if let Err(RecvTimeoutError::Disconnected) = self.ready.recv_timeout(timeout) {
            log::trace!("display producer gone");
        }
        self.try_take()
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}
