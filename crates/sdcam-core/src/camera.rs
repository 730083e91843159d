//! Camera sensor registers, reached by bit-banging SPI through two MMR registers.
//!
//! One SPI access is bracketed by chip-select:
//!
//! ```text
//! write: CSR=1, DR=WRITE_FLAG|addr, DR=data, CSR=0
//! read:  CSR=1, DR=READ_FLAG|addr,  DR=0,    CSR=0, read DR
//! ```
//!
//! The camera's SPI state machine is corrupted by any other register traffic
//! inside the bracket, so these methods must run inside a single queued command.

use crate::bridge::RegisterBridge;
use crate::error::Result;
use crate::transport::Transport;

/// Chip-select control register.
pub const SPI_CSR: u16 = 0x0060;
/// SPI data register.
pub const SPI_DR: u16 = 0x0061;

pub const WRITE_FLAG: u16 = 0x0040;
pub const READ_FLAG: u16 = 0x0080;

impl<T: Transport> RegisterBridge<T> {
    pub fn write_camera_register(&mut self, addr: u16, data: u16) -> Result<()> {
        self.spi_cycle(|bridge| {
            bridge.write_register(SPI_DR, WRITE_FLAG | addr)?;
            bridge.write_register(SPI_DR, data)
        })
    }

    pub fn read_camera_register(&mut self, addr: u16) -> Result<u16> {
        self.spi_cycle(|bridge| {
            bridge.write_register(SPI_DR, READ_FLAG | addr)?;
            // dummy word clocks the register value into DR
            bridge.write_register(SPI_DR, 0)
        })?;
        self.read_register(SPI_DR)
    }

    fn spi_cycle<F>(&mut self, body: F) -> Result<()>
    where
        F: FnOnce(&mut Self) -> Result<()>,
    {
        self.write_register(SPI_CSR, 1)?;
        if let Err(e) = body(self) {
            // best effort, the original error is what the caller needs
            if let Err(release) = self.write_register(SPI_CSR, 0) {
                log::warn!("chip-select release failed: {release}");
            }
            return Err(e);
        }
        self.write_register(SPI_CSR, 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loopback::{LoopbackTransport, Transaction};

    #[test]
    fn write_sequence_is_exact() {
        let device = LoopbackTransport::new();
        let mut bridge = RegisterBridge::new(device.clone());
        bridge.write_camera_register(0x0012, 0x00AB).unwrap();
        assert_eq!(
            device.transactions(),
            vec![
                Transaction::Write(SPI_CSR, 1),
                Transaction::Write(SPI_DR, WRITE_FLAG | 0x0012),
                Transaction::Write(SPI_DR, 0x00AB),
                Transaction::Write(SPI_CSR, 0),
            ]
        );
    }

    #[test]
    fn read_sequence_is_exact() {
        let device = LoopbackTransport::new();
        let mut bridge = RegisterBridge::new(device.clone());
        bridge.read_camera_register(0x0012).unwrap();
        assert_eq!(
            device.transactions(),
            vec![
                Transaction::Write(SPI_CSR, 1),
                Transaction::Write(SPI_DR, READ_FLAG | 0x0012),
                Transaction::Write(SPI_DR, 0),
                Transaction::Write(SPI_CSR, 0),
                Transaction::Read(SPI_DR),
            ]
        );
    }

    #[test]
    fn read_back_through_emulated_sensor() {
        let device = LoopbackTransport::new();
        let mut bridge = RegisterBridge::new(device.clone());
        bridge.write_camera_register(0x0003, 0x005A).unwrap();
        device.clear_transactions();
        assert_eq!(bridge.read_camera_register(0x0003).unwrap(), 0x005A);
        assert_eq!(device.camera_register(0x0003), Some(0x005A));
        assert_eq!(device.transactions().len(), 5);
    }

    #[test]
    fn failed_cycle_releases_chip_select() {
        let device = LoopbackTransport::new();
        device.fail_exchange(2);
        let mut bridge = RegisterBridge::new(device.clone());
        assert!(bridge.write_camera_register(0x0001, 1).is_err());
        assert_eq!(
            device.transactions(),
            vec![
                Transaction::Write(SPI_CSR, 1),
                Transaction::Write(SPI_DR, WRITE_FLAG | 0x0001),
                Transaction::Write(SPI_CSR, 0),
            ]
        );
    }
}
