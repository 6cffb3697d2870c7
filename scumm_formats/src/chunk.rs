use byteorder::{BigEndian, ByteOrder, LittleEndian, ReadBytesExt};

use crate::error::{FormatError, FourCc};

/// Bounds-checked cursor over a borrowed byte slice.
///
/// `base` is the absolute offset of `data[0]` inside the enclosing resource so
/// that diagnostics point at the real position in the asset.
#[derive(Debug, Clone)]
pub struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
    base: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self::with_base(data, 0)
    }

    pub fn with_base(data: &'a [u8], base: usize) -> Self {
        ByteReader { data, pos: 0, base }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn absolute_position(&self) -> usize {
        self.base + self.pos
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    fn truncated(&self, what: &'static str) -> FormatError {
        FormatError::Truncated {
            what,
            offset: self.absolute_position(),
        }
    }

    fn tail(&self) -> &'a [u8] {
        &self.data[self.pos..]
    }

    pub fn read_u8(&mut self, what: &'static str) -> Result<u8, FormatError> {
        let value = self.tail().read_u8().map_err(|_| self.truncated(what))?;
        self.pos += 1;
        Ok(value)
    }

    pub fn read_u16_le(&mut self, what: &'static str) -> Result<u16, FormatError> {
        let value = self
            .tail()
            .read_u16::<LittleEndian>()
            .map_err(|_| self.truncated(what))?;
        self.pos += 2;
        Ok(value)
    }

    pub fn read_i16_le(&mut self, what: &'static str) -> Result<i16, FormatError> {
        let value = self
            .tail()
            .read_i16::<LittleEndian>()
            .map_err(|_| self.truncated(what))?;
        self.pos += 2;
        Ok(value)
    }

    pub fn read_u32_le(&mut self, what: &'static str) -> Result<u32, FormatError> {
        let value = self
            .tail()
            .read_u32::<LittleEndian>()
            .map_err(|_| self.truncated(what))?;
        self.pos += 4;
        Ok(value)
    }

    pub fn read_u32_be(&mut self, what: &'static str) -> Result<u32, FormatError> {
        let value = self
            .tail()
            .read_u32::<BigEndian>()
            .map_err(|_| self.truncated(what))?;
        self.pos += 4;
        Ok(value)
    }

    pub fn read_tag(&mut self, what: &'static str) -> Result<FourCc, FormatError> {
        let bytes = self.read_bytes(4, what)?;
        Ok(FourCc([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    pub fn read_bytes(&mut self, len: usize, what: &'static str) -> Result<&'a [u8], FormatError> {
        if self.remaining() < len {
            return Err(self.truncated(what));
        }
        let bytes = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(bytes)
    }

    pub fn skip(&mut self, len: usize, what: &'static str) -> Result<(), FormatError> {
        self.read_bytes(len, what).map(|_| ())
    }
}

/// Peek the first tag of a resource without consuming anything.
pub fn peek_tag(data: &[u8]) -> Result<FourCc, FormatError> {
    ByteReader::new(data).read_tag("resource tag")
}

/// How a block header encodes its length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockLayout {
    /// SCUMM/IFF style: big-endian length that includes the 8-byte header.
    Inclusive,
    /// RIFF style: little-endian length of the payload only.
    Riff,
}

/// One validated block inside a parent payload.
#[derive(Debug, Clone, Copy)]
pub struct Block<'a> {
    pub tag: FourCc,
    /// Absolute offset of the block header inside the resource.
    pub offset: usize,
    /// Absolute offset of the first payload byte.
    pub body_offset: usize,
    pub body: &'a [u8],
}

/// Iterates the blocks packed back to back inside `parent`.
///
/// Every declared length is validated: it must be non-negative, even and fit
/// inside what remains of the parent. The first violation is yielded as an
/// error and ends the iteration.
pub struct Blocks<'a> {
    reader: ByteReader<'a>,
    layout: BlockLayout,
    failed: bool,
}

impl<'a> Blocks<'a> {
    pub fn new(parent: &'a [u8], base: usize, layout: BlockLayout) -> Self {
        Blocks {
            reader: ByteReader::with_base(parent, base),
            layout,
            failed: false,
        }
    }

    fn next_block(&mut self) -> Result<Block<'a>, FormatError> {
        let offset = self.reader.absolute_position();
        let tag = self.reader.read_tag("block tag")?;
        let len = match self.layout {
            BlockLayout::Inclusive => {
                let declared = self.reader.read_u32_be("block length")? as i64;
                let body = declared - 8;
                if body < 0 {
                    return Err(FormatError::NegativeLength {
                        tag,
                        offset,
                        declared: body,
                    });
                }
                body as usize
            }
            BlockLayout::Riff => self.reader.read_u32_le("block length")? as usize,
        };

        if len % 2 != 0 {
            return Err(FormatError::OddLength { tag, offset, len });
        }
        let remaining = self.reader.remaining();
        if len > remaining {
            return Err(FormatError::Overrun {
                tag,
                offset,
                len,
                remaining,
            });
        }

        let body_offset = self.reader.absolute_position();
        let body = self.reader.read_bytes(len, "block body")?;
        Ok(Block {
            tag,
            offset,
            body_offset,
            body,
        })
    }
}

impl<'a> Iterator for Blocks<'a> {
    type Item = Result<Block<'a>, FormatError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.reader.is_empty() {
            return None;
        }
        let item = self.next_block();
        if item.is_err() {
            self.failed = true;
        }
        Some(item)
    }
}

/// Read the outer block header of a resource and return its validated body.
pub fn outer_block(data: &[u8], layout: BlockLayout) -> Result<Block<'_>, FormatError> {
    let mut blocks = Blocks::new(data, 0, layout);
    match blocks.next() {
        Some(block) => block,
        None => Err(FormatError::Truncated {
            what: "outer block",
            offset: 0,
        }),
    }
}

pub fn write_u32_be(buf: &mut Vec<u8>, value: u32) {
    let mut bytes = [0u8; 4];
    BigEndian::write_u32(&mut bytes, value);
    buf.extend_from_slice(&bytes);
}

pub fn write_u32_le(buf: &mut Vec<u8>, value: u32) {
    let mut bytes = [0u8; 4];
    LittleEndian::write_u32(&mut bytes, value);
    buf.extend_from_slice(&bytes);
}

/// Append a SCUMM-style block (`tag`, big-endian inclusive length, body).
pub fn push_block(buf: &mut Vec<u8>, tag: &[u8; 4], body: &[u8]) {
    buf.extend_from_slice(tag);
    write_u32_be(buf, body.len() as u32 + 8);
    buf.extend_from_slice(body);
}
