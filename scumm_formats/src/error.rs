use std::fmt;

use thiserror::Error;

/// Four-character block identifier as stored in the resource stream.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct FourCc(pub [u8; 4]);

impl FourCc {
    pub const fn new(tag: &[u8; 4]) -> Self {
        FourCc(*tag)
    }

    pub fn as_u32(self) -> u32 {
        u32::from_be_bytes(self.0)
    }
}

impl fmt::Display for FourCc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for &byte in &self.0 {
            if byte.is_ascii_graphic() || byte == b' ' {
                write!(f, "{}", byte as char)?;
            } else {
                write!(f, "\\x{byte:02x}")?;
            }
        }
        Ok(())
    }
}

impl fmt::Debug for FourCc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FourCc({self})")
    }
}

/// Structural problems found while decoding asset data.
///
/// These never abort the interpreter on their own; the engine turns them
/// into a failure status visible to scripts.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormatError {
    #[error("unexpected end of data reading {what} at offset {offset}")]
    Truncated { what: &'static str, offset: usize },
    #[error("unrecognised sound wrapper {0}")]
    UnknownWrapper(FourCc),
    #[error("expected {expected} block at offset {offset}, found {found}")]
    UnexpectedTag {
        expected: FourCc,
        found: FourCc,
        offset: usize,
    },
    #[error("block {tag} at offset {offset} declares a negative length ({declared})")]
    NegativeLength {
        tag: FourCc,
        offset: usize,
        declared: i64,
    },
    #[error("block {tag} at offset {offset} has odd length {len}")]
    OddLength { tag: FourCc, offset: usize, len: usize },
    #[error("block {tag} at offset {offset} needs {len} bytes but only {remaining} remain in its parent")]
    Overrun {
        tag: FourCc,
        offset: usize,
        len: usize,
        remaining: usize,
    },
    #[error("required {0} block is missing")]
    MissingBlock(FourCc),
    #[error("unsupported codec tag {0:#06x}")]
    UnsupportedCodec(u16),
    #[error("invalid {field} value {value}")]
    InvalidField { field: &'static str, value: i64 },
    #[error("song {0} is not present in the spool index")]
    UnknownSong(u32),
}
