use std::fmt;
use std::io::{self, Read};
use thiserror::Error;

pub const ROM_BANK_SIZE: usize = 0x2000;
pub const CHIP_HEADER_SIZE: usize = 0x10;

// Low byte of the big-endian bank number in a CHIP packet header
const CHIP_BANK_OFFSET: usize = 0x0B;
const LOAD_ADDRESS_SIZE: usize = 2;

#[derive(Debug, Error)]
pub enum AttachError {
    #[error("Short read of {what}: expected {expected} bytes, got {got}")]
    ShortRead {
        what: &'static str,
        expected: usize,
        got: usize,
    },

    #[error("Unsupported bank number {0} (only a single 8KB bank is supported)")]
    UnsupportedBank(u8),

    #[error("Expansion port conflict: {0} collides with {1}")]
    ExportConflict(String, String),

    #[error(transparent)]
    Io(#[from] io::Error),
}

/// One 8KB ROM bank
#[derive(Clone, PartialEq, Eq)]
pub struct CartImage {
    bytes: Box<[u8; ROM_BANK_SIZE]>,
}

impl fmt::Debug for CartImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CartImage")
            .field("len", &ROM_BANK_SIZE)
            .field("reset_vector", &self.reset_vector())
            .finish()
    }
}

impl CartImage {
    pub fn blank() -> Self {
        Self {
            bytes: Box::new([0; ROM_BANK_SIZE]),
        }
    }

    /// Exactly one bank worth of bytes
    pub fn from_slice(data: &[u8]) -> Result<Self, AttachError> {
        if data.len() != ROM_BANK_SIZE {
            return Err(AttachError::ShortRead {
                what: "ROM bank",
                expected: ROM_BANK_SIZE,
                got: data.len(),
            });
        }
        let mut image = Self::blank();
        image.bytes.copy_from_slice(data);
        Ok(image)
    }

    /// Raw binary dump.
    ///
    /// A file whose length has bit 1 set carries a two-byte load address in
    /// front of the data, which is skipped. Trailing bytes past the bank are
    /// ignored.
    pub fn from_bin(raw: &[u8]) -> Result<Self, AttachError> {
        let start = if raw.len() & LOAD_ADDRESS_SIZE != 0 {
            LOAD_ADDRESS_SIZE
        } else {
            0
        };
        let body = &raw[start..];
        if body.len() < ROM_BANK_SIZE {
            return Err(AttachError::ShortRead {
                what: "ROM bank",
                expected: ROM_BANK_SIZE,
                got: body.len(),
            });
        }
        Self::from_slice(&body[..ROM_BANK_SIZE])
    }

    /// CHIP packet positioned at its header
    pub fn from_crt_chip<R: Read + ?Sized>(reader: &mut R) -> Result<Self, AttachError> {
        let mut header = [0u8; CHIP_HEADER_SIZE];
        read_full(reader, &mut header, "chip header")?;

        let bank = header[CHIP_BANK_OFFSET];
        if bank > 0 {
            return Err(AttachError::UnsupportedBank(bank));
        }

        let mut image = Self::blank();
        read_full(reader, &mut image.bytes[..], "ROM bank")?;
        Ok(image)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..]
    }

    pub fn read(&self, offset: u16) -> u8 {
        self.bytes[offset as usize % ROM_BANK_SIZE]
    }

    /// Little-endian word at $FFFC as seen through ultimax
    pub fn reset_vector(&self) -> u16 {
        u16::from_le_bytes([self.bytes[0x1FFC], self.bytes[0x1FFD]])
    }
}

fn read_full<R: Read + ?Sized>(
    reader: &mut R,
    buf: &mut [u8],
    what: &'static str,
) -> Result<(), AttachError> {
    let mut got = 0;
    while got < buf.len() {
        match reader.read(&mut buf[got..]) {
            Ok(0) => break,
            Ok(n) => got += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    if got < buf.len() {
        return Err(AttachError::ShortRead {
            what,
            expected: buf.len(),
            got,
        });
    }
    Ok(())
}
