//! In-process stand-in for the device: an MMR file plus an emulated SPI sensor.

use crate::camera::{READ_FLAG, SPI_CSR, SPI_DR, WRITE_FLAG};
use crate::codec::{self, Frame, Opcode, SYNC_WORD};
use crate::error::{Error, Result};
use crate::transport::Transport;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::io;
use std::sync::Arc;

/// Register transaction as decoded by the loopback device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transaction {
    Read(u16),
    Write(u16, u16),
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Spi {
    Idle,
    Command,
    WriteData(u16),
    ReadClock(u16),
    Done,
}

struct Inner {
    registers: HashMap<u16, u16>,
    camera: HashMap<u16, u16>,
    spi: Spi,
    log: Vec<Transaction>,
    exchanges: usize,
    fail_at: Option<usize>,
    corrupt: bool,
}

/// Clones share one device, so a test can keep a handle after moving a clone
/// into a bridge or a command worker.
#[derive(Clone)]
pub struct LoopbackTransport {
    inner: Arc<Mutex<Inner>>,
}

impl LoopbackTransport {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                registers: HashMap::new(),
                camera: HashMap::new(),
                spi: Spi::Idle,
                log: Vec::new(),
                exchanges: 0,
                fail_at: None,
                corrupt: false,
            })),
        }
    }

    /// Every transaction decoded so far, in arrival order.
    pub fn transactions(&self) -> Vec<Transaction> {
        self.inner.lock().log.clone()
    }

    pub fn clear_transactions(&self) {
        self.inner.lock().log.clear();
    }

    pub fn register(&self, address: u16) -> Option<u16> {
        self.inner.lock().registers.get(&address).copied()
    }

    pub fn camera_register(&self, address: u16) -> Option<u16> {
        self.inner.lock().camera.get(&address).copied()
    }

    pub fn set_camera_register(&self, address: u16, value: u16) {
        self.inner.lock().camera.insert(address, value);
    }

    /// Make the `n`th exchange (zero-based, counted from creation) fail with an I/O error.
    pub fn fail_exchange(&self, n: usize) {
        self.inner.lock().fail_at = Some(n);
    }

    /// Flip a bit in the checksum of every following response.
    pub fn set_corrupt(&self, corrupt: bool) {
        self.inner.lock().corrupt = corrupt;
    }
}

impl Default for LoopbackTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Inner {
    fn write(&mut self, address: u16, data: u16) {
        if address == SPI_CSR {
            self.spi = if data & 1 != 0 { Spi::Command } else { Spi::Idle };
        } else if address == SPI_DR {
            let reg = data & !(READ_FLAG | WRITE_FLAG);
            match self.spi {
                Spi::Command if data & READ_FLAG != 0 => self.spi = Spi::ReadClock(reg),
                Spi::Command => self.spi = Spi::WriteData(reg),
                Spi::WriteData(target) => {
                    self.camera.insert(target, data);
                    self.spi = Spi::Done;
                }
                Spi::ReadClock(target) => {
                    // the clocking word is swallowed, DR now holds the sensor value
                    let value = self.camera.get(&target).copied().unwrap_or(0);
                    self.registers.insert(SPI_DR, value);
                    self.spi = Spi::Done;
                    return;
                }
                Spi::Idle | Spi::Done => {}
            }
        }
        self.registers.insert(address, data);
    }
}

impl Transport for LoopbackTransport {
    fn send_and_receive(&mut self, request: &[u16]) -> Result<Vec<u16>> {
        let mut inner = self.inner.lock();
        let n = inner.exchanges;
        inner.exchanges += 1;
        if inner.fail_at == Some(n) {
            return Err(Error::Io(io::Error::new(io::ErrorKind::Other, "injected failure")));
        }

        let frame = Frame::from_words(request.to_vec());
        if !codec::validate(&frame) {
            log::warn!("loopback: dropping corrupt request {}", frame.to_hex());
            return Ok(request.to_vec());
        }

        let (opcode, address, value) = match (frame.opcode(), frame.address(), frame.len()) {
            (Some(Opcode::ReadMmr), Some(address), 4) => {
                inner.log.push(Transaction::Read(address));
                let value = inner.registers.get(&address).copied().unwrap_or(0);
                (Opcode::ReadMmr, address, value)
            }
            (Some(Opcode::WriteMmr), Some(address), 5) => {
                let data = frame.payload().unwrap_or_default();
                inner.log.push(Transaction::Write(address, data));
                inner.write(address, data);
                (Opcode::WriteMmr, address, data)
            }
            _ => {
                log::warn!("loopback: unknown request {}", frame.to_hex());
                return Ok(request.to_vec());
            }
        };

        let mut response = vec![SYNC_WORD, opcode.code(), address, value];
        let mut sum = codec::checksum(&response);
        if inner.corrupt {
            sum ^= 0x0001;
        }
        response.push(sum);
        Ok(response)
    }
}
