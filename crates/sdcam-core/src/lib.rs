//! Core functionalities: register transactions, camera SPI bridge, command serialization.

pub mod error;
pub mod codec;
pub mod transport;
pub mod bridge;
pub mod camera;
pub mod queue;
pub mod trace;
pub mod loopback;

pub use error::{Error, Result};
pub use codec::{Frame, Opcode, SYNC_WORD};
pub use transport::{Transport, UdpTransport, WordOrder};
pub use bridge::RegisterBridge;
pub use camera::{READ_FLAG, SPI_CSR, SPI_DR, WRITE_FLAG};
pub use queue::{CommandQueue, CommandWorker, DeviceBridge, Reply};
pub use trace::{Direction, TraceEntry, TraceStore};
pub use loopback::{LoopbackTransport, Transaction};
