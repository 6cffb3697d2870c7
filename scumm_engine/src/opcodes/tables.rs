use std::fmt;

use thiserror::Error;

use super::Op;

pub const SUPPORTED_VERSIONS: [u16; 8] = [60, 70, 71, 72, 80, 90, 99, 100];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("HE version {0} is not supported (expected one of 60, 70, 71, 72, 80, 90, 99, 100)")]
pub struct UnsupportedVersion(pub u16);

/// One version's changes relative to its parent.
struct Patch {
    version: u16,
    set: &'static [(u8, Op)],
    clear: &'static [u8],
}

const V60: Patch = Patch {
    version: 60,
    set: &[
        (0x00, Op::PushByte),
        (0x01, Op::PushWord),
        (0x02, Op::PushByteVar),
        (0x03, Op::PushWordVar),
        (0x06, Op::ByteArrayRead),
        (0x07, Op::WordArrayRead),
        (0x0a, Op::ByteArrayIndexedRead),
        (0x0b, Op::WordArrayIndexedRead),
        (0x0c, Op::Dup),
        (0x0d, Op::Not),
        (0x0e, Op::Eq),
        (0x0f, Op::Neq),
        (0x10, Op::Gt),
        (0x11, Op::Lt),
        (0x12, Op::Le),
        (0x13, Op::Ge),
        (0x14, Op::Add),
        (0x15, Op::Sub),
        (0x16, Op::Mul),
        (0x17, Op::Div),
        (0x18, Op::Land),
        (0x19, Op::Lor),
        (0x1a, Op::Pop),
        (0x42, Op::WriteByteVar),
        (0x43, Op::WriteWordVar),
        (0x46, Op::ByteArrayWrite),
        (0x47, Op::WordArrayWrite),
        (0x4a, Op::ByteArrayIndexedWrite),
        (0x4b, Op::WordArrayIndexedWrite),
        (0x4e, Op::ByteVarInc),
        (0x4f, Op::WordVarInc),
        (0x52, Op::ByteArrayInc),
        (0x53, Op::WordArrayInc),
        (0x56, Op::ByteVarDec),
        (0x57, Op::WordVarDec),
        (0x5a, Op::ByteArrayDec),
        (0x5b, Op::WordArrayDec),
        (0x5c, Op::If),
        (0x5d, Op::IfNot),
        (0x5e, Op::StartScript),
        (0x5f, Op::StartScriptQuick),
        (0x65, Op::StopObjectCode),
        (0x66, Op::StopObjectCode),
        (0x6a, Op::FreezeUnfreeze),
        (0x6c, Op::BreakHere),
        (0x73, Op::Jump),
        (0x74, Op::StartSound),
        (0x75, Op::StopSound),
        (0x7c, Op::StopScript),
        (0x87, Op::Random),
        (0x88, Op::RandomRange),
        (0x8b, Op::IsScriptRunning),
        (0x98, Op::IsSoundRunning),
        (0x9b, Op::ResourceRoutines),
        (0xa4, Op::ArrayOps),
        (0xa7, Op::Pop),
        (0xad, Op::IsAnyOf),
        (0xae, Op::SystemOps),
        (0xb0, Op::Delay),
        (0xb1, Op::DelaySeconds),
        (0xb2, Op::DelayMinutes),
        (0xbc, Op::DimArray),
        (0xbd, Op::Dummy),
        (0xbf, Op::StartScriptQuick2),
        (0xc0, Op::Dim2DimArray),
        (0xc4, Op::Abs),
        (0xca, Op::DelayFrames),
        (0xcb, Op::PickOneOf),
        (0xcc, Op::PickOneOfDefault),
        (0xd0, Op::GetDateTime),
        (0xd1, Op::LocalizeArrayToScript),
        (0xd4, Op::Shuffle),
        (0xd5, Op::JumpToScript),
        (0xd6, Op::Band),
        (0xd7, Op::Bor),
        (0xd8, Op::IsRoomScriptRunning),
        (0xe3, Op::PickVarRandom),
        (0xea, Op::RedimArray),
    ],
    clear: &[],
};

const V70: Patch = Patch {
    version: 70,
    set: &[(0x74, Op::SoundOps), (0xee, Op::GetStringLen)],
    clear: &[],
};

const V71: Patch = Patch {
    version: 71,
    set: &[
        (0xec, Op::CopyString),
        (0xef, Op::AppendString),
        (0xf0, Op::ConcatString),
        (0xf1, Op::CompareString),
        (0xf6, Op::GetCharIndexInString),
    ],
    clear: &[],
};

const V72: Patch = Patch {
    version: 72,
    set: &[
        (0x02, Op::PushDWord),
        (0x04, Op::GetScriptString),
        (0x1b, Op::IsAnyOf),
        (0x58, Op::GetTimer),
        (0x59, Op::SetTimer),
        (0x5a, Op::GetSoundPosition),
        (0x63, Op::GetArrayDimSize),
        (0x64, Op::GetNumFreeArrays),
        (0xf8, Op::GetResourceSize),
    ],
    clear: &[0x06, 0x0a, 0x42, 0x46, 0x4a, 0x4e, 0x52, 0x56],
};

const V80: Patch = Patch {
    version: 80,
    set: &[
        (0x45, Op::CreateSound),
        (0x48, Op::StringToInt),
        (0x49, Op::GetSoundVar),
    ],
    clear: &[],
};

const V90: Patch = Patch {
    version: 90,
    set: &[
        (0x0a, Op::DupN),
        (0x1d, Op::Min),
        (0x1e, Op::Max),
        (0x1f, Op::Sin),
        (0x20, Op::Cos),
        (0x21, Op::Sqrt),
        (0x22, Op::AngleFromDelta),
        (0x23, Op::AngleFromLine),
        (0x24, Op::Distance),
        (0x2b, Op::PriorityStartScript),
        (0x2c, Op::PriorityChainScript),
        (0x30, Op::Mod),
        (0x31, Op::Shl),
        (0x32, Op::Shr),
        (0x33, Op::Xor),
        (0x36, Op::Cond),
        (0x37, Op::Dim2Dim2Array),
        (0x38, Op::Redim2DimArray),
        (0x3a, Op::SortArray),
    ],
    clear: &[],
};

const V99: Patch = Patch {
    version: 99,
    set: &[],
    clear: &[],
};

/// HE 100 renumbers everything, so it is a complete table rather than a
/// patch on top of HE 99.
const V100: Patch = Patch {
    version: 100,
    set: &[
        (0x01, Op::Add),
        (0x03, Op::SortArray),
        (0x04, Op::ArrayOps),
        (0x05, Op::Band),
        (0x06, Op::Bor),
        (0x07, Op::BreakHere),
        (0x08, Op::DelayFrames),
        (0x09, Op::Shl),
        (0x0a, Op::Shr),
        (0x0b, Op::Xor),
        (0x11, Op::JumpToScript),
        (0x17, Op::CreateSound),
        (0x19, Op::Pop),
        (0x1b, Op::WordVarDec),
        (0x1c, Op::WordArrayDec),
        (0x1e, Op::Dim2DimArray),
        (0x1f, Op::DimArray),
        (0x20, Op::Div),
        (0x28, Op::Dup),
        (0x29, Op::DupN),
        (0x2b, Op::StopObjectCode),
        (0x2c, Op::StopObjectCode),
        (0x2d, Op::Eq),
        (0x2f, Op::FreezeUnfreeze),
        (0x30, Op::Ge),
        (0x31, Op::GetDateTime),
        (0x33, Op::Gt),
        (0x34, Op::ResourceRoutines),
        (0x35, Op::If),
        (0x36, Op::IfNot),
        (0x38, Op::IsAnyOf),
        (0x39, Op::WordVarInc),
        (0x3a, Op::WordArrayInc),
        (0x3b, Op::Jump),
        (0x3d, Op::Land),
        (0x3e, Op::Le),
        (0x3f, Op::LocalizeArrayToScript),
        (0x40, Op::WordArrayRead),
        (0x41, Op::WordArrayIndexedRead),
        (0x42, Op::Lor),
        (0x43, Op::Lt),
        (0x44, Op::Mod),
        (0x45, Op::Mul),
        (0x46, Op::Neq),
        (0x47, Op::Dim2Dim2Array),
        (0x49, Op::Redim2DimArray),
        (0x4a, Op::Not),
        (0x53, Op::Pop),
        (0x59, Op::PriorityChainScript),
        (0x5a, Op::PriorityStartScript),
        (0x5c, Op::PushByte),
        (0x5d, Op::PushDWord),
        (0x5e, Op::GetScriptString),
        (0x5f, Op::PushWord),
        (0x60, Op::PushWordVar),
        (0x64, Op::RedimArray),
        (0x66, Op::StopObjectCode),
        (0x73, Op::Shuffle),
        (0x74, Op::Delay),
        (0x75, Op::DelayMinutes),
        (0x76, Op::DelaySeconds),
        (0x77, Op::SoundOps),
        (0x7c, Op::StartScript),
        (0x7d, Op::StartScriptQuick),
        (0x80, Op::StopScript),
        (0x82, Op::StopSound),
        (0x84, Op::WriteWordVar),
        (0x85, Op::WordArrayWrite),
        (0x86, Op::WordArrayIndexedWrite),
        (0x87, Op::Sub),
        (0x88, Op::SystemOps),
        (0x8a, Op::SetTimer),
        (0x93, Op::Abs),
        (0xa0, Op::AngleFromDelta),
        (0xa1, Op::AngleFromLine),
        (0xa3, Op::Distance),
        (0xa6, Op::Cond),
        (0xa7, Op::Cos),
        (0xb4, Op::GetNumFreeArrays),
        (0xb5, Op::GetArrayDimSize),
        (0xb6, Op::IsResourceLoaded),
        (0xb7, Op::GetResourceSize),
        (0xbc, Op::IsAnyOf),
        (0xbf, Op::Max),
        (0xc0, Op::Min),
        (0xc3, Op::IsRoomScriptRunning),
        (0xc9, Op::PickOneOf),
        (0xca, Op::PickOneOfDefault),
        (0xcb, Op::PickVarRandom),
        (0xd0, Op::Random),
        (0xd1, Op::RandomRange),
        (0xd6, Op::IsScriptRunning),
        (0xd7, Op::Sin),
        (0xd8, Op::GetSoundPosition),
        (0xd9, Op::IsSoundRunning),
        (0xda, Op::GetSoundVar),
        (0xdc, Op::Sqrt),
        (0xde, Op::StartScriptQuick2),
        (0xe0, Op::CompareString),
        (0xe1, Op::CopyString),
        (0xe2, Op::AppendString),
        (0xe3, Op::ConcatString),
        (0xe4, Op::GetStringLen),
        (0xe6, Op::StringToInt),
        (0xe7, Op::GetCharIndexInString),
        (0xea, Op::GetTimer),
    ],
    clear: &[],
};

const LINEAGE: [&Patch; 7] = [&V60, &V70, &V71, &V72, &V80, &V90, &V99];

/// 256-entry opcode map for one HE version.
#[derive(Clone)]
pub struct OpcodeTable {
    version: u16,
    ops: [Option<Op>; 256],
}

impl OpcodeTable {
    pub fn for_version(version: u16) -> Result<Self, UnsupportedVersion> {
        if !SUPPORTED_VERSIONS.contains(&version) {
            return Err(UnsupportedVersion(version));
        }
        let mut table = OpcodeTable {
            version,
            ops: [None; 256],
        };
        if version == 100 {
            table.apply(&V100);
            return Ok(table);
        }
        for patch in LINEAGE.iter().take_while(|patch| patch.version <= version) {
            table.apply(patch);
        }
        Ok(table)
    }

    fn apply(&mut self, patch: &Patch) {
        for &opcode in patch.clear {
            self.ops[opcode as usize] = None;
        }
        for &(opcode, op) in patch.set {
            self.ops[opcode as usize] = Some(op);
        }
    }

    pub fn version(&self) -> u16 {
        self.version
    }

    pub fn get(&self, opcode: u8) -> Option<Op> {
        self.ops[opcode as usize]
    }

    pub fn opcode_of(&self, op: Op) -> Option<u8> {
        self.ops
            .iter()
            .position(|entry| *entry == Some(op))
            .map(|index| index as u8)
    }

    pub fn len(&self) -> usize {
        self.ops.iter().filter(|entry| entry.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for OpcodeTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpcodeTable")
            .field("version", &self.version)
            .field("ops", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn later_versions_inherit_and_override() {
        let v60 = OpcodeTable::for_version(60).unwrap();
        let v72 = OpcodeTable::for_version(72).unwrap();
        let v90 = OpcodeTable::for_version(90).unwrap();

        assert_eq!(v60.get(0x02), Some(Op::PushByteVar));
        assert_eq!(v72.get(0x02), Some(Op::PushDWord));
        assert_eq!(v72.get(0x14), Some(Op::Add));

        assert_eq!(v60.get(0x0a), Some(Op::ByteArrayIndexedRead));
        assert_eq!(v72.get(0x0a), None);
        assert_eq!(v90.get(0x0a), Some(Op::DupN));

        assert_eq!(v60.get(0x74), Some(Op::StartSound));
        assert_eq!(v90.get(0x74), Some(Op::SoundOps));
    }

    #[test]
    fn he99_matches_he90() {
        let v90 = OpcodeTable::for_version(90).unwrap();
        let v99 = OpcodeTable::for_version(99).unwrap();
        for opcode in 0..=255u8 {
            assert_eq!(v90.get(opcode), v99.get(opcode));
        }
    }

    #[test]
    fn he100_is_renumbered() {
        let v100 = OpcodeTable::for_version(100).unwrap();
        assert_eq!(v100.get(0x01), Some(Op::Add));
        assert_eq!(v100.get(0x14), None);
        assert_eq!(v100.opcode_of(Op::SoundOps), Some(0x77));
        assert_eq!(v100.opcode_of(Op::PushByte), Some(0x5c));
    }

    #[test]
    fn rejects_unknown_versions() {
        assert!(matches!(
            OpcodeTable::for_version(73),
            Err(UnsupportedVersion(73))
        ));
    }
}
