use crate::chunk::{BlockLayout, Blocks, ByteReader};
use crate::error::{FormatError, FourCc};

const TAG_RIFF: FourCc = FourCc::new(b"RIFF");
const TAG_WAVE: FourCc = FourCc::new(b"WAVE");
const TAG_FMT: FourCc = FourCc::new(b"fmt ");
const TAG_DATA: FourCc = FourCc::new(b"data");
const TAG_SBNG: FourCc = FourCc::new(b"SBNG");

const WAVE_FORMAT_PCM: u16 = 0x0001;

/// PCM parameters from a `fmt ` chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaveFormat {
    pub channels: u16,
    pub sample_rate: u32,
    pub bits_per_sample: u16,
}

/// Offsets of the interesting spans of a RIFF/WAVE stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaveLayout {
    pub format: WaveFormat,
    pub data_offset: usize,
    pub data_len: usize,
    pub code: Option<(usize, usize)>,
}

/// Parse a `RIFF`/`WAVE` stream located at absolute offset `base`.
pub fn parse_wave(data: &[u8], base: usize) -> Result<WaveLayout, FormatError> {
    let mut reader = ByteReader::with_base(data, base);
    let tag = reader.read_tag("RIFF tag")?;
    if tag != TAG_RIFF {
        return Err(FormatError::UnexpectedTag {
            expected: TAG_RIFF,
            found: tag,
            offset: base,
        });
    }
    let riff_len = reader.read_u32_le("RIFF length")? as usize;
    let remaining = reader.remaining();
    if riff_len < 4 {
        return Err(FormatError::NegativeLength {
            tag,
            offset: base,
            declared: riff_len as i64 - 4,
        });
    }
    if riff_len > remaining {
        return Err(FormatError::Overrun {
            tag,
            offset: base,
            len: riff_len,
            remaining,
        });
    }
    let form_offset = reader.absolute_position();
    let form = reader.read_tag("WAVE form type")?;
    if form != TAG_WAVE {
        return Err(FormatError::UnexpectedTag {
            expected: TAG_WAVE,
            found: form,
            offset: form_offset,
        });
    }

    let body_start = reader.position();
    let body_end = 8 + riff_len;
    let body = &data[body_start..body_end];

    let mut format = None;
    let mut samples = None;
    let mut code = None;
    for block in Blocks::new(body, base + body_start, BlockLayout::Riff) {
        let block = block?;
        match block.tag {
            TAG_FMT => format = Some(parse_fmt(block.body, block.body_offset)?),
            TAG_DATA => samples = Some((block.body_offset, block.body.len())),
            TAG_SBNG => code = Some((block.body_offset, block.body.len())),
            _ => {}
        }
    }

    let format = format.ok_or(FormatError::MissingBlock(TAG_FMT))?;
    let (data_offset, data_len) = samples.ok_or(FormatError::MissingBlock(TAG_DATA))?;
    Ok(WaveLayout {
        format,
        data_offset,
        data_len,
        code,
    })
}

fn parse_fmt(body: &[u8], base: usize) -> Result<WaveFormat, FormatError> {
    let mut reader = ByteReader::with_base(body, base);
    let codec = reader.read_u16_le("fmt codec")?;
    if codec != WAVE_FORMAT_PCM {
        return Err(FormatError::UnsupportedCodec(codec));
    }
    let channels = reader.read_u16_le("fmt channels")?;
    let sample_rate = reader.read_u32_le("fmt sample rate")?;
    let _byte_rate = reader.read_u32_le("fmt byte rate")?;
    let _block_align = reader.read_u16_le("fmt block align")?;
    let bits_per_sample = reader.read_u16_le("fmt bits per sample")?;

    if channels == 0 || channels > 2 {
        return Err(FormatError::InvalidField {
            field: "channel count",
            value: channels as i64,
        });
    }
    if bits_per_sample != 8 && bits_per_sample != 16 {
        return Err(FormatError::InvalidField {
            field: "bits per sample",
            value: bits_per_sample as i64,
        });
    }
    if sample_rate == 0 {
        return Err(FormatError::InvalidField {
            field: "sample rate",
            value: 0,
        });
    }

    Ok(WaveFormat {
        channels,
        sample_rate,
        bits_per_sample,
    })
}
