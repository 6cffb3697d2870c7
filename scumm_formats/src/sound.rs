use std::ops::Range;

use serde::Serialize;

use crate::chunk::{BlockLayout, Blocks, ByteReader, outer_block, peek_tag};
use crate::error::{FormatError, FourCc};
use crate::riff::parse_wave;
use crate::sound_code::{SoundCodeEvent, parse_sound_code};

/// FourCC helper constants.
const TAG_WSOU: FourCc = FourCc::new(b"WSOU");
const TAG_RIFF: FourCc = FourCc::new(b"RIFF");
const TAG_XSOU: FourCc = FourCc::new(b"XSOU");
const TAG_XSHD: FourCc = FourCc::new(b"XSHD");
const TAG_XDAT: FourCc = FourCc::new(b"XDAT");
const TAG_XSH2: FourCc = FourCc::new(b"XSH2");
const TAG_SBNG: FourCc = FourCc::new(b"SBNG");
const TAG_DIGI: FourCc = FourCc::new(b"DIGI");
const TAG_TALK: FourCc = FourCc::new(b"TALK");
const TAG_MRAW: FourCc = FourCc::new(b"MRAW");
const TAG_HSHD: FourCc = FourCc::new(b"HSHD");
const TAG_SDAT: FourCc = FourCc::new(b"SDAT");

/// Playback rate used by legacy `DIGI`/`TALK` resources whose header leaves
/// the rate at zero.
pub const DEFAULT_DIGI_RATE: u32 = 11025;

/// Wrapper family a sound resource was stored in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SoundKind {
    Wave,
    Xsou,
    Digi,
    Talk,
    Mraw,
}

/// Byte span inside the resource blob.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Span {
    pub offset: usize,
    pub len: usize,
}

impl Span {
    pub fn range(self) -> Range<usize> {
        self.offset..self.offset + self.len
    }
}

/// Everything the channel mixer needs to start a digital sound.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SoundHeader {
    pub kind: SoundKind,
    pub frequency: u32,
    pub bits_per_sample: u16,
    pub channels: u16,
    /// Whole sample frames in the PCM span.
    pub sample_count: u32,
    pub data: Span,
    /// Priority override carried by the asset, if any.
    pub priority: Option<u8>,
    pub code: Vec<SoundCodeEvent>,
}

impl SoundHeader {
    pub fn bytes_per_frame(&self) -> usize {
        (self.bits_per_sample as usize / 8) * self.channels as usize
    }

    pub fn pcm<'a>(&self, blob: &'a [u8]) -> &'a [u8] {
        &blob[self.data.range()]
    }

    pub fn has_code(&self) -> bool {
        !self.code.is_empty()
    }
}

/// Identify the wrapper of `blob` and extract its playback parameters.
pub fn parse_sound(blob: &[u8]) -> Result<SoundHeader, FormatError> {
    let tag = peek_tag(blob)?;
    match tag {
        TAG_WSOU => parse_wsou(blob),
        TAG_RIFF => {
            let layout = parse_wave(blob, 0)?;
            wave_header(blob, layout)
        }
        TAG_XSOU => parse_xsou(blob),
        TAG_DIGI => parse_digi(blob, SoundKind::Digi),
        TAG_TALK => parse_digi(blob, SoundKind::Talk),
        TAG_MRAW => parse_digi(blob, SoundKind::Mraw),
        other => Err(FormatError::UnknownWrapper(other)),
    }
}

/// Wrap a bare RIFF stream in a `WSOU` block the way the resource loader
/// stores them.
pub fn wrap_riff(riff: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(riff.len() + 8);
    crate::chunk::push_block(&mut out, b"WSOU", riff);
    out
}

fn parse_wsou(blob: &[u8]) -> Result<SoundHeader, FormatError> {
    let outer = outer_block(blob, BlockLayout::Inclusive)?;
    let layout = parse_wave(outer.body, outer.body_offset)?;
    wave_header(blob, layout)
}

fn wave_header(blob: &[u8], layout: crate::riff::WaveLayout) -> Result<SoundHeader, FormatError> {
    let code = match layout.code {
        Some((offset, len)) => parse_sound_code(&blob[offset..offset + len], offset)?,
        None => Vec::new(),
    };
    let format = layout.format;
    let frame = (format.bits_per_sample as usize / 8) * format.channels as usize;
    Ok(SoundHeader {
        kind: SoundKind::Wave,
        frequency: format.sample_rate,
        bits_per_sample: format.bits_per_sample,
        channels: format.channels,
        sample_count: (layout.data_len / frame) as u32,
        data: Span {
            offset: layout.data_offset,
            len: layout.data_len,
        },
        priority: None,
        code,
    })
}

/// `XSOU` layout:
///
/// - `XSHD`: u16 version, u16 bits, u16 channels, u16 reserved, u32 rate
/// - `XDAT`: raw PCM
/// - `XSH2` (optional): u32 priority
/// - `SBNG` (optional): sound code
fn parse_xsou(blob: &[u8]) -> Result<SoundHeader, FormatError> {
    let outer = outer_block(blob, BlockLayout::Inclusive)?;

    let mut header = None;
    let mut data = None;
    let mut priority = None;
    let mut code = Vec::new();
    for block in Blocks::new(outer.body, outer.body_offset, BlockLayout::Inclusive) {
        let block = block?;
        match block.tag {
            TAG_XSHD => {
                let mut reader = ByteReader::with_base(block.body, block.body_offset);
                let _version = reader.read_u16_le("XSHD version")?;
                let bits = reader.read_u16_le("XSHD bits")?;
                let channels = reader.read_u16_le("XSHD channels")?;
                let _reserved = reader.read_u16_le("XSHD reserved")?;
                let rate = reader.read_u32_le("XSHD rate")?;
                header = Some((bits, channels, rate));
            }
            TAG_XDAT => {
                data = Some(Span {
                    offset: block.body_offset,
                    len: block.body.len(),
                })
            }
            TAG_XSH2 => {
                let mut reader = ByteReader::with_base(block.body, block.body_offset);
                let value = reader.read_u32_le("XSH2 priority")?;
                priority = Some(value.min(255) as u8);
            }
            TAG_SBNG => code = parse_sound_code(block.body, block.body_offset)?,
            _ => {}
        }
    }

    let (bits, channels, rate) = header.ok_or(FormatError::MissingBlock(TAG_XSHD))?;
    let data = data.ok_or(FormatError::MissingBlock(TAG_XDAT))?;
    validate_pcm(bits, channels, rate)?;
    let frame = (bits as usize / 8) * channels as usize;
    Ok(SoundHeader {
        kind: SoundKind::Xsou,
        frequency: rate,
        bits_per_sample: bits,
        channels,
        sample_count: (data.len / frame) as u32,
        data,
        priority,
        code,
    })
}

/// Legacy `DIGI`/`TALK`/`MRAW` layout:
///
/// - `HSHD`: u16 reserved, u16 priority, u16 reserved, u16 rate
/// - `SDAT`: unsigned 8-bit mono PCM
/// - `SBNG` (optional): sound code
fn parse_digi(blob: &[u8], kind: SoundKind) -> Result<SoundHeader, FormatError> {
    let outer = outer_block(blob, BlockLayout::Inclusive)?;

    let mut rate = None;
    let mut priority = None;
    let mut data = None;
    let mut code = Vec::new();
    for block in Blocks::new(outer.body, outer.body_offset, BlockLayout::Inclusive) {
        let block = block?;
        match block.tag {
            TAG_HSHD => {
                let mut reader = ByteReader::with_base(block.body, block.body_offset);
                let _reserved = reader.read_u16_le("HSHD reserved")?;
                let prio = reader.read_u16_le("HSHD priority")?;
                let _reserved = reader.read_u16_le("HSHD reserved")?;
                let value = reader.read_u16_le("HSHD rate")? as u32;
                rate = Some(if value == 0 { DEFAULT_DIGI_RATE } else { value });
                if prio != 0 {
                    priority = Some(prio.min(255) as u8);
                }
            }
            TAG_SDAT => {
                data = Some(Span {
                    offset: block.body_offset,
                    len: block.body.len(),
                })
            }
            TAG_SBNG => code = parse_sound_code(block.body, block.body_offset)?,
            _ => {}
        }
    }

    let rate = rate.ok_or(FormatError::MissingBlock(TAG_HSHD))?;
    let data = data.ok_or(FormatError::MissingBlock(TAG_SDAT))?;
    Ok(SoundHeader {
        kind,
        frequency: rate,
        bits_per_sample: 8,
        channels: 1,
        sample_count: data.len as u32,
        data,
        priority,
        code,
    })
}

fn validate_pcm(bits: u16, channels: u16, rate: u32) -> Result<(), FormatError> {
    if bits != 8 && bits != 16 {
        return Err(FormatError::InvalidField {
            field: "bits per sample",
            value: bits as i64,
        });
    }
    if channels == 0 || channels > 2 {
        return Err(FormatError::InvalidField {
            field: "channel count",
            value: channels as i64,
        });
    }
    if rate == 0 {
        return Err(FormatError::InvalidField {
            field: "sample rate",
            value: 0,
        });
    }
    Ok(())
}

/// Builders for hand-made sound resources, used by tests across the workspace.
pub mod build {
    use crate::chunk::push_block;
    use crate::sound_code::{SoundCodeEvent, encode_sound_code};

    /// `DIGI` resource with 8-bit mono PCM.
    pub fn digi(rate: u16, priority: u16, pcm: &[u8], code: &[SoundCodeEvent]) -> Vec<u8> {
        legacy(b"DIGI", rate, priority, pcm, code)
    }

    /// `TALK` resource with 8-bit mono PCM.
    pub fn talk(rate: u16, pcm: &[u8], code: &[SoundCodeEvent]) -> Vec<u8> {
        legacy(b"TALK", rate, 0, pcm, code)
    }

    fn legacy(tag: &[u8; 4], rate: u16, priority: u16, pcm: &[u8], code: &[SoundCodeEvent]) -> Vec<u8> {
        let mut hshd = Vec::new();
        hshd.extend_from_slice(&0u16.to_le_bytes());
        hshd.extend_from_slice(&priority.to_le_bytes());
        hshd.extend_from_slice(&0u16.to_le_bytes());
        hshd.extend_from_slice(&rate.to_le_bytes());

        let mut body = Vec::new();
        push_block(&mut body, b"HSHD", &hshd);
        push_block(&mut body, b"SDAT", pcm);
        if !code.is_empty() {
            push_block(&mut body, b"SBNG", &encode_sound_code(code));
        }
        let mut out = Vec::new();
        push_block(&mut out, tag, &body);
        out
    }

    /// `XSOU` resource.
    pub fn xsou(rate: u32, bits: u16, channels: u16, pcm: &[u8], priority: Option<u32>) -> Vec<u8> {
        let mut xshd = Vec::new();
        xshd.extend_from_slice(&1u16.to_le_bytes());
        xshd.extend_from_slice(&bits.to_le_bytes());
        xshd.extend_from_slice(&channels.to_le_bytes());
        xshd.extend_from_slice(&0u16.to_le_bytes());
        xshd.extend_from_slice(&rate.to_le_bytes());

        let mut body = Vec::new();
        push_block(&mut body, b"XSHD", &xshd);
        push_block(&mut body, b"XDAT", pcm);
        if let Some(priority) = priority {
            push_block(&mut body, b"XSH2", &priority.to_le_bytes());
        }
        let mut out = Vec::new();
        push_block(&mut out, b"XSOU", &body);
        out
    }
}
