//! Raw MMR read/write transactions over a [`Transport`].

use crate::codec::{self, Frame};
use crate::error::{Error, Result};
use crate::trace::{Direction, TraceStore};
use crate::transport::Transport;
use parking_lot::Mutex;
use std::sync::Arc;

const DEFAULT_TRACE_DEPTH: usize = 256;

/// Executes register transactions one round trip at a time.
///
/// A bridge must not be driven from two threads at once; the command queue
/// gives a single worker exclusive ownership of it.
pub struct RegisterBridge<T> {
    transport: T,
    trace: Arc<Mutex<TraceStore>>,
}

impl<T: Transport> RegisterBridge<T> {
    pub fn new(transport: T) -> Self {
        Self::with_trace(transport, Arc::new(Mutex::new(TraceStore::new(DEFAULT_TRACE_DEPTH))))
    }

    pub fn with_trace(transport: T, trace: Arc<Mutex<TraceStore>>) -> Self {
        Self { transport, trace }
    }

    /// Shared handle to the frames exchanged so far.
    pub fn trace(&self) -> Arc<Mutex<TraceStore>> {
        Arc::clone(&self.trace)
    }

    pub fn into_inner(self) -> T {
        self.transport
    }

    /// Read one register.
    ///
    /// The fourth word of the response is returned even when its checksum does
    /// not match; the mismatch is only logged.
    pub fn read_register(&mut self, address: u16) -> Result<u16> {
        let response = self.exchange(codec::encode_read(address))?;
        response.payload().ok_or(Error::ShortResponse {
            expected: 4,
            actual: response.len(),
        })
    }

    pub fn write_register(&mut self, address: u16, data: u16) -> Result<()> {
        self.exchange(codec::encode_write(address, data))?;
        Ok(())
    }

    pub fn close(&mut self) -> Result<()> {
        self.transport.close()
    }

    fn exchange(&mut self, request: Frame) -> Result<Frame> {
        log::trace!("tx {}", request.to_hex());
        self.trace.lock().push(Direction::Tx, request.words());

        let response = Frame::from_words(self.transport.send_and_receive(request.words())?);

        log::trace!("rx {}", response.to_hex());
        self.trace.lock().push(Direction::Rx, response.words());

        if let Err(e) = codec::verify(&response) {
            log::error!("response to {}: {e}", request.to_hex());
        }
        if !codec::answers(&request, &response) {
            log::error!("response {} does not answer request {}", response.to_hex(), request.to_hex());
        }
        Ok(response)
    }
}
