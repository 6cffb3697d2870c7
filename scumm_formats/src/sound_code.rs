//! Embedded sound bytecode (`SBNG` payload).
//!
//! The payload is a list of events terminated by a zero size word:
//!
//! ```text
//! event := u16 size | u32 timestamp | op*       (size covers the whole event)
//! op    := u16 size | u16 opcode | u16 var | i16 value
//! ```
//!
//! Timestamps are sample positions; events must be in non-decreasing order.
//! All fields are little-endian.

use serde::Serialize;

use crate::chunk::ByteReader;
use crate::error::{FormatError, FourCc};

const EVENT_HEADER_LEN: usize = 6;
const OP_LEN: usize = 8;

/// One timed group of sound-code operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SoundCodeEvent {
    pub timestamp: u32,
    pub ops: Vec<SoundCodeOp>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SoundCodeOp {
    pub opcode: u16,
    pub var: u16,
    pub value: i16,
}

/// Parse an `SBNG` payload located at absolute offset `base`.
pub fn parse_sound_code(body: &[u8], base: usize) -> Result<Vec<SoundCodeEvent>, FormatError> {
    let tag = FourCc::new(b"SBNG");
    let mut reader = ByteReader::with_base(body, base);
    let mut events: Vec<SoundCodeEvent> = Vec::new();

    while !reader.is_empty() {
        let offset = reader.absolute_position();
        let size = reader.read_u16_le("sound code event size")? as usize;
        if size == 0 {
            break;
        }
        if size < EVENT_HEADER_LEN || size % 2 != 0 {
            return Err(FormatError::InvalidField {
                field: "sound code event size",
                value: size as i64,
            });
        }
        let remaining = reader.remaining() + 2;
        if size > remaining {
            return Err(FormatError::Overrun {
                tag,
                offset,
                len: size,
                remaining,
            });
        }

        let timestamp = reader.read_u32_le("sound code timestamp")?;
        if let Some(previous) = events.last() {
            if timestamp < previous.timestamp {
                return Err(FormatError::InvalidField {
                    field: "sound code timestamp",
                    value: timestamp as i64,
                });
            }
        }

        let op_bytes = reader.read_bytes(size - EVENT_HEADER_LEN, "sound code ops")?;
        let ops = parse_ops(op_bytes, offset + EVENT_HEADER_LEN)?;
        events.push(SoundCodeEvent { timestamp, ops });
    }

    Ok(events)
}

fn parse_ops(bytes: &[u8], base: usize) -> Result<Vec<SoundCodeOp>, FormatError> {
    let mut reader = ByteReader::with_base(bytes, base);
    let mut ops = Vec::new();
    while !reader.is_empty() {
        let size = reader.read_u16_le("sound code op size")? as usize;
        if size == 0 {
            break;
        }
        if size < OP_LEN {
            return Err(FormatError::InvalidField {
                field: "sound code op size",
                value: size as i64,
            });
        }
        let opcode = reader.read_u16_le("sound code opcode")?;
        let var = reader.read_u16_le("sound code variable")?;
        let value = reader.read_i16_le("sound code value")?;
        reader.skip(size - OP_LEN, "sound code op padding")?;
        ops.push(SoundCodeOp { opcode, var, value });
    }
    Ok(ops)
}

/// Serialise events back into the `SBNG` payload layout.
pub fn encode_sound_code(events: &[SoundCodeEvent]) -> Vec<u8> {
    let mut out = Vec::new();
    for event in events {
        let size = EVENT_HEADER_LEN + event.ops.len() * OP_LEN;
        out.extend_from_slice(&(size as u16).to_le_bytes());
        out.extend_from_slice(&event.timestamp.to_le_bytes());
        for op in &event.ops {
            out.extend_from_slice(&(OP_LEN as u16).to_le_bytes());
            out.extend_from_slice(&op.opcode.to_le_bytes());
            out.extend_from_slice(&op.var.to_le_bytes());
            out.extend_from_slice(&op.value.to_le_bytes());
        }
    }
    out.extend_from_slice(&0u16.to_le_bytes());
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_encoded_events() {
        let events = vec![
            SoundCodeEvent {
                timestamp: 0,
                ops: vec![SoundCodeOp {
                    opcode: 16,
                    var: 0,
                    value: 3,
                }],
            },
            SoundCodeEvent {
                timestamp: 4410,
                ops: vec![
                    SoundCodeOp {
                        opcode: 32,
                        var: 5,
                        value: -7,
                    },
                    SoundCodeOp {
                        opcode: 96,
                        var: 5,
                        value: 0,
                    },
                ],
            },
        ];
        let bytes = encode_sound_code(&events);
        assert_eq!(parse_sound_code(&bytes, 0).unwrap(), events);
    }

    #[test]
    fn rejects_event_running_past_payload() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&30u16.to_le_bytes());
        bytes.extend_from_slice(&0u32.to_le_bytes());
        assert!(matches!(
            parse_sound_code(&bytes, 0).unwrap_err(),
            FormatError::Overrun { len: 30, .. }
        ));
    }

    #[test]
    fn rejects_timestamps_going_backwards() {
        let events = vec![
            SoundCodeEvent {
                timestamp: 100,
                ops: Vec::new(),
            },
            SoundCodeEvent {
                timestamp: 50,
                ops: Vec::new(),
            },
        ];
        let bytes = encode_sound_code(&events);
        assert!(matches!(
            parse_sound_code(&bytes, 0).unwrap_err(),
            FormatError::InvalidField {
                field: "sound code timestamp",
                ..
            }
        ));
    }
}
