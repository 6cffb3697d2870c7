#![allow(dead_code)]

use scumm_engine::opcodes::{Op, OpcodeTable};

/// Hand assembler for small test programs.
pub struct Program {
    table: OpcodeTable,
    pub code: Vec<u8>,
}

impl Program {
    pub fn new(version: u16) -> Self {
        Program {
            table: OpcodeTable::for_version(version).expect("supported version"),
            code: Vec::new(),
        }
    }

    pub fn op(mut self, op: Op) -> Self {
        let opcode = self
            .table
            .opcode_of(op)
            .unwrap_or_else(|| panic!("{op:?} missing from HE {}", self.table.version()));
        self.code.push(opcode);
        self
    }

    pub fn byte(mut self, value: u8) -> Self {
        self.code.push(value);
        self
    }

    pub fn word(mut self, value: u16) -> Self {
        self.code.extend_from_slice(&value.to_le_bytes());
        self
    }

    pub fn push(self, value: i16) -> Self {
        self.op(Op::PushWord).word(value as u16)
    }

    pub fn write_var(self, var: u16) -> Self {
        self.op(Op::WriteWordVar).word(var)
    }

    /// Jump back to the start of the `len` bytes ending after this jump.
    pub fn loop_back(self, len: usize) -> Self {
        self.op(Op::Jump).word((-(len as i16)) as u16)
    }

    pub fn end(self) -> Vec<u8> {
        self.op(Op::StopObjectCode).code
    }

    pub fn unused_opcode(&self) -> u8 {
        (0..=u8::MAX)
            .find(|&opcode| self.table.get(opcode).is_none())
            .expect("a free opcode")
    }
}

/// Unsigned 8-bit ramp.
pub fn pcm(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 256) as u8).collect()
}
