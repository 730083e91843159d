//! Frame acquisition: capture sources, exposure statistics, display publishing.

pub mod error;
pub mod frame;
pub mod stats;
pub mod render;
pub mod source;
pub mod display;
pub mod acquisition;

pub use error::{Error, Result};
pub use frame::{DisplayFrame, RawFrame, Region};
pub use stats::{ExposureStats, HistogramParams};
pub use source::{FrameSource, TestPattern};
pub use display::{display_queue, DisplayQueue, DisplayReceiver, DisplayStats, FrameReady, Publish, DISPLAY_QUEUE_CAPACITY};
pub use acquisition::{Acquisition, AcquisitionConfig, Exposure, FramePipeline, StopSignal};
