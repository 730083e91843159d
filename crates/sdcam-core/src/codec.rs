//! Register-transaction frames.
//!
//! Every frame is a run of 16-bit words:
//!
//! ```text
//! read  request: [0x55AA, READ_OP,  address,       checksum]
//! write request: [0x55AA, WRITE_OP, address, data, checksum]
//! ```
//!
//! `checksum` is the XOR of every word before it. Responses carry the same
//! trailer and are checked with [`validate`].

use crate::error::{Error, Result};

pub const SYNC_WORD: u16 = 0x55AA;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opcode {
    ReadMmr,
    WriteMmr,
}

impl Opcode {
    pub const fn code(self) -> u16 {
        match self {
            Self::ReadMmr => 0x0001,
            Self::WriteMmr => 0x0002,
        }
    }

    /// Number of words in a request carrying this opcode.
    pub const fn request_len(self) -> usize {
        match self {
            Self::ReadMmr => 4,
            Self::WriteMmr => 5,
        }
    }

    pub fn from_code(code: u16) -> Option<Self> {
        match code {
            0x0001 => Some(Self::ReadMmr),
            0x0002 => Some(Self::WriteMmr),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    words: Vec<u16>,
}

impl Frame {
    pub fn from_words(words: Vec<u16>) -> Self {
        Self { words }
    }

    pub fn words(&self) -> &[u16] {
        &self.words
    }

    pub fn into_words(self) -> Vec<u16> {
        self.words
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    pub fn opcode(&self) -> Option<Opcode> {
        self.words.get(1).copied().and_then(Opcode::from_code)
    }

    pub fn address(&self) -> Option<u16> {
        self.words.get(2).copied()
    }

    /// The fourth word: write data in a request, the register value in a read response.
    pub fn payload(&self) -> Option<u16> {
        self.words.get(3).copied()
    }

    pub fn checksum(&self) -> Option<u16> {
        self.words.last().copied()
    }

    /// Big-endian hex dump of the words, for trace logging.
    pub fn to_hex(&self) -> String {
        let bytes: Vec<u8> = self.words.iter().flat_map(|w| w.to_be_bytes()).collect();
        hex::encode_upper(bytes)
    }
}

/// XOR-reduce of `words`.
pub fn checksum(words: &[u16]) -> u16 {
    words.iter().fold(0, |acc, w| acc ^ w)
}

fn seal(mut words: Vec<u16>) -> Frame {
    let sum = checksum(&words);
    words.push(sum);
    Frame { words }
}

pub fn encode_read(address: u16) -> Frame {
    seal(vec![SYNC_WORD, Opcode::ReadMmr.code(), address])
}

pub fn encode_write(address: u16, data: u16) -> Frame {
    seal(vec![SYNC_WORD, Opcode::WriteMmr.code(), address, data])
}

/// Whether `response` carries the opcode and address of `request`.
pub fn answers(request: &Frame, response: &Frame) -> bool {
    response.opcode() == request.opcode() && response.address() == request.address()
}

/// True iff the last word equals the XOR of all preceding words.
pub fn validate(frame: &Frame) -> bool {
    verify(frame).is_ok()
}

/// Like [`validate`], but reports the mismatch as an [`Error::ChecksumMismatch`].
pub fn verify(frame: &Frame) -> Result<()> {
    let Some((&actual, body)) = frame.words.split_last() else {
        return Err(Error::ShortResponse { expected: 1, actual: 0 });
    };
    let expected = checksum(body);
    if expected == actual {
        Ok(())
    } else {
        Err(Error::ChecksumMismatch { expected, actual })
    }
}
