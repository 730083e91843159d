//! Datagram transport carrying one request frame and one response frame per exchange.

use crate::error::{Error, Result};
use std::io;
use std::net::{SocketAddr, UdpSocket};
use std::time::Duration;

/// Largest UDP payload read back from the device.
const MAX_DATAGRAM: usize = 1472;

pub trait Transport: Send {
    /// Send one request and block until its response arrives.
    fn send_and_receive(&mut self, request: &[u16]) -> Result<Vec<u16>>;

    /// Release the underlying resource. Further exchanges may fail.
    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn send_and_receive(&mut self, request: &[u16]) -> Result<Vec<u16>> {
        (**self).send_and_receive(request)
    }

    fn close(&mut self) -> Result<()> {
        (**self).close()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WordOrder {
    #[default]
    Little,
    Big,
}

impl std::str::FromStr for WordOrder {
    type Err = ();

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "little" | "le" => Ok(Self::Little),
            "big" | "be" => Ok(Self::Big),
            _ => Err(()),
        }
    }
}

impl WordOrder {
    pub fn encode(&self, words: &[u16]) -> Vec<u8> {
        words
            .iter()
            .flat_map(|w| match self {
                Self::Little => w.to_le_bytes(),
                Self::Big => w.to_be_bytes(),
            })
            .collect()
    }

    /// Trailing odd byte, if any, is ignored.
    pub fn decode(&self, bytes: &[u8]) -> Vec<u16> {
        bytes
            .chunks_exact(2)
            .map(|pair| match self {
                Self::Little => u16::from_le_bytes([pair[0], pair[1]]),
                Self::Big => u16::from_be_bytes([pair[0], pair[1]]),
            })
            .collect()
    }
}

/// UDP socket connected to the device's command port.
pub struct UdpTransport {
    socket: UdpSocket,
    order: WordOrder,
    buf: Box<[u8; MAX_DATAGRAM]>,
}

impl UdpTransport {
    pub fn connect(local: SocketAddr, remote: SocketAddr, timeout: Duration, order: WordOrder) -> Result<Self> {
        let socket = UdpSocket::bind(local)?;
        socket.connect(remote)?;
        socket.set_read_timeout(Some(timeout))?;
        log::info!("UDP transport {} -> {}", socket.local_addr()?, remote);
        Ok(Self {
            socket,
            order,
            buf: Box::new([0u8; MAX_DATAGRAM]),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    pub fn set_timeout(&mut self, timeout: Duration) -> Result<()> {
        Ok(self.socket.set_read_timeout(Some(timeout))?)
    }

    /// Discard datagrams that arrived after an earlier exchange timed out, so
    /// they are not taken as the reply to the next request.
    fn drain_stale(&mut self) -> Result<()> {
        self.socket.set_nonblocking(true)?;
        let mut stale = 0usize;
        let drained = loop {
            match self.socket.recv(&mut self.buf[..]) {
                Ok(_) => stale += 1,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break Ok(()),
                // ICMP unreachable from an earlier send, reported once
                Err(e) if e.kind() == io::ErrorKind::ConnectionRefused => continue,
                Err(e) => break Err(e),
            }
        };
        self.socket.set_nonblocking(false)?;
        drained?;
        if stale > 0 {
            log::warn!("discarded {stale} late datagram(s)");
        }
        Ok(())
    }
}

impl Transport for UdpTransport {
    fn send_and_receive(&mut self, request: &[u16]) -> Result<Vec<u16>> {
        self.drain_stale()?;
        self.socket.send(&self.order.encode(request))?;
        let n = match self.socket.recv(&mut self.buf[..]) {
            Ok(n) => n,
            Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {
                return Err(Error::Timeout)
            }
            Err(e) => return Err(e.into()),
        };
        if n % 2 != 0 {
            log::warn!("odd-length datagram ({n} bytes), trailing byte ignored");
        }
        Ok(self.order.decode(&self.buf[..n]))
    }
}
