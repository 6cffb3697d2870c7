use serde::Serialize;

use crate::error::{VmError, VmResult};

/// Tag OR-ed into array handles stored in variables from HE 80 on.
pub const ARRAY_MAGIC: i32 = 0x3353_9000;
const MAGIC_MASK: i32 = !0xfff;

/// Index into the array store. Id 0 is never allocated.
pub type ArrayId = u16;

/// A variable slot's contents: plain integer or array handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Value {
    Scalar(i32),
    Array(ArrayId),
}

impl Default for Value {
    fn default() -> Self {
        Value::Scalar(0)
    }
}

impl Value {
    /// Integer form pushed on the operand stack.
    pub fn encode(self, version: u16) -> i32 {
        match self {
            Value::Scalar(value) => value,
            Value::Array(id) if version >= 80 => id as i32 | ARRAY_MAGIC,
            Value::Array(id) => id as i32,
        }
    }

    /// Interpret an integer written by a script. From HE 80 on, tagged
    /// integers become array handles; earlier versions keep everything
    /// scalar and resolve handles lazily.
    pub fn decode(raw: i32, version: u16) -> Value {
        if version >= 80 && raw != 0 && raw & MAGIC_MASK == ARRAY_MAGIC {
            Value::Array((raw & 0xfff) as ArrayId)
        } else {
            Value::Scalar(raw)
        }
    }

    /// Resolve a value used as an array reference.
    pub fn array_id(self, version: u16) -> VmResult<ArrayId> {
        match self {
            Value::Array(id) => Ok(id),
            Value::Scalar(0) => Err(VmError::ZeroArray),
            Value::Scalar(raw) if version < 80 => {
                u16::try_from(raw).map_err(|_| VmError::InvalidArray(raw))
            }
            Value::Scalar(raw) => Err(VmError::MissingMagic(raw)),
        }
    }

    pub fn is_zero(self) -> bool {
        self == Value::Scalar(0)
    }
}

/// Resolve a raw stack integer as an array handle.
pub fn array_handle(raw: i32, version: u16) -> VmResult<ArrayId> {
    Value::decode(raw, version).array_id(version)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handles_carry_magic_from_he80() {
        assert_eq!(Value::Array(7).encode(90), 7 | ARRAY_MAGIC);
        assert_eq!(Value::Array(7).encode(72), 7);
        assert_eq!(Value::decode(7 | ARRAY_MAGIC, 90), Value::Array(7));
        assert_eq!(Value::decode(7 | ARRAY_MAGIC, 72), Value::Scalar(7 | ARRAY_MAGIC));
    }

    #[test]
    fn scalars_resolve_only_before_he80() {
        assert_eq!(Value::Scalar(3).array_id(72), Ok(3));
        assert_eq!(Value::Scalar(3).array_id(90), Err(VmError::MissingMagic(3)));
        assert_eq!(Value::Scalar(0).array_id(72), Err(VmError::ZeroArray));
        assert_eq!(Value::Scalar(-4).array_id(60), Err(VmError::InvalidArray(-4)));
    }
}
