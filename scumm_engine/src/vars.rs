use serde::Serialize;

use crate::error::{VmError, VmResult};
use crate::value::Value;

/// Well-known global variable numbers the interpreter writes on its own.
pub mod well_known {
    pub const LAST_SOUND: u16 = 23;
    pub const RANDOM_NR: u16 = 118;
    pub const TIMEDATE_YEAR: u16 = 119;
    pub const TIMEDATE_MONTH: u16 = 120;
    pub const TIMEDATE_DAY: u16 = 121;
    pub const TIMEDATE_HOUR: u16 = 122;
    pub const TIMEDATE_MINUTE: u16 = 123;
    pub const TIMEDATE_SECOND: u16 = 124;
    pub const SOUND_CHANNEL: u16 = 138;
    pub const OPERATION_FAILURE: u16 = 139;
}

/// Locals per script slot.
pub const NUM_LOCALS: usize = 25;

/// Decoded variable reference. The encoding depends on the HE version:
/// bit 15 selects bit variables before HE 80 and room variables after.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarRef {
    Global(u16),
    Room(u16),
    Bit(u16),
    Local(u16),
}

impl VarRef {
    pub fn decode(var: u16, version: u16) -> VmResult<VarRef> {
        if var & 0xf000 == 0 {
            return Ok(VarRef::Global(var));
        }
        if var & 0x8000 != 0 {
            return Ok(if version >= 80 {
                VarRef::Room(var & 0xfff)
            } else {
                VarRef::Bit(var & 0x7fff)
            });
        }
        if var & 0x4000 != 0 {
            return Ok(VarRef::Local(var & 0xfff));
        }
        Err(VmError::InvalidVariable(var))
    }
}

/// Global, room and bit variable banks. Locals live with their script slot.
#[derive(Debug, Clone, Serialize)]
pub struct VarTable {
    globals: Vec<Value>,
    room: Vec<Value>,
    #[serde(skip)]
    bits: Vec<bool>,
}

impl VarTable {
    pub fn new(globals: usize, room: usize, bits: usize) -> Self {
        VarTable {
            globals: vec![Value::default(); globals],
            room: vec![Value::default(); room],
            bits: vec![false; bits],
        }
    }

    pub fn global(&self, index: u16) -> VmResult<Value> {
        self.globals
            .get(index as usize)
            .copied()
            .ok_or(VmError::InvalidVariable(index))
    }

    pub fn set_global(&mut self, index: u16, value: Value) -> VmResult<()> {
        let slot = self
            .globals
            .get_mut(index as usize)
            .ok_or(VmError::InvalidVariable(index))?;
        *slot = value;
        Ok(())
    }

    pub fn room(&self, index: u16) -> VmResult<Value> {
        self.room
            .get(index as usize)
            .copied()
            .ok_or(VmError::InvalidVariable(index | 0x8000))
    }

    pub fn set_room(&mut self, index: u16, value: Value) -> VmResult<()> {
        let slot = self
            .room
            .get_mut(index as usize)
            .ok_or(VmError::InvalidVariable(index | 0x8000))?;
        *slot = value;
        Ok(())
    }

    pub fn bit(&self, index: u16) -> VmResult<bool> {
        self.bits
            .get(index as usize)
            .copied()
            .ok_or(VmError::InvalidVariable(index | 0x8000))
    }

    pub fn set_bit(&mut self, index: u16, value: bool) -> VmResult<()> {
        let slot = self
            .bits
            .get_mut(index as usize)
            .ok_or(VmError::InvalidVariable(index | 0x8000))?;
        *slot = value;
        Ok(())
    }

    pub fn clear_room(&mut self) {
        self.room.iter_mut().for_each(|value| *value = Value::default());
    }

    pub fn globals(&self) -> &[Value] {
        &self.globals
    }

    /// Room and bit bank sizes.
    pub fn bank_sizes(&self) -> (usize, usize) {
        (self.room.len(), self.bits.len())
    }

    /// Scalar shortcut used for the interpreter's own bookkeeping vars.
    pub fn set_scalar(&mut self, index: u16, value: i32) {
        if let Some(slot) = self.globals.get_mut(index as usize) {
            *slot = Value::Scalar(value);
        }
    }

    pub fn scalar(&self, index: u16) -> i32 {
        match self.globals.get(index as usize) {
            Some(Value::Scalar(value)) => *value,
            _ => 0,
        }
    }
}
