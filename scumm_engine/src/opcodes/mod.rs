//! Opcode identifiers and per-version dispatch tables.

pub mod subops;
mod tables;

use serde::Serialize;

pub use tables::{OpcodeTable, UnsupportedVersion, SUPPORTED_VERSIONS};

/// Everything the interpreter knows how to execute. Which byte maps to which
/// operation depends on the HE version; see [`OpcodeTable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Op {
    // Stack and immediates
    PushByte,
    PushWord,
    PushDWord,
    PushByteVar,
    PushWordVar,
    GetScriptString,
    Dup,
    DupN,
    Pop,

    // Arithmetic and logic
    Not,
    Eq,
    Neq,
    Gt,
    Lt,
    Le,
    Ge,
    Add,
    Sub,
    Mul,
    Div,
    Land,
    Lor,
    Band,
    Bor,
    Abs,
    Min,
    Max,
    Mod,
    Shl,
    Shr,
    Xor,
    Cond,
    IsAnyOf,
    Sin,
    Cos,
    Sqrt,
    AngleFromDelta,
    AngleFromLine,
    Distance,

    // Variables and array elements
    WriteByteVar,
    WriteWordVar,
    ByteArrayRead,
    WordArrayRead,
    ByteArrayIndexedRead,
    WordArrayIndexedRead,
    ByteArrayWrite,
    WordArrayWrite,
    ByteArrayIndexedWrite,
    WordArrayIndexedWrite,
    ByteVarInc,
    WordVarInc,
    ByteArrayInc,
    WordArrayInc,
    ByteVarDec,
    WordVarDec,
    ByteArrayDec,
    WordArrayDec,

    // Control flow and scripts
    If,
    IfNot,
    Jump,
    StartScript,
    StartScriptQuick,
    StartScriptQuick2,
    JumpToScript,
    PriorityStartScript,
    PriorityChainScript,
    StopScript,
    StopObjectCode,
    BreakHere,
    IsScriptRunning,
    IsRoomScriptRunning,
    Delay,
    DelaySeconds,
    DelayMinutes,
    DelayFrames,
    FreezeUnfreeze,

    // Randomness
    Random,
    RandomRange,
    PickOneOf,
    PickOneOfDefault,
    Shuffle,
    PickVarRandom,

    // Arrays
    DimArray,
    Dim2DimArray,
    Dim2Dim2Array,
    RedimArray,
    Redim2DimArray,
    ArrayOps,
    GetArrayDimSize,
    GetNumFreeArrays,
    SortArray,
    LocalizeArrayToScript,

    // Strings held in arrays
    CopyString,
    AppendString,
    ConcatString,
    CompareString,
    GetStringLen,
    StringToInt,
    GetCharIndexInString,

    // Sound
    StartSound,
    StopSound,
    SoundOps,
    IsSoundRunning,
    GetSoundPosition,
    GetSoundVar,
    CreateSound,

    // Resources and system
    ResourceRoutines,
    IsResourceLoaded,
    GetResourceSize,
    GetTimer,
    SetTimer,
    GetDateTime,
    SystemOps,
    Dummy,
}

/// Sub-op numbering family a version uses for its multi-function opcodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    /// HE 60 to 71: numbering inherited from v6.
    Classic,
    /// HE 72 to 99.
    He72,
    /// HE 100: renumbered sub-ops.
    He100,
}

impl Dialect {
    pub fn for_version(version: u16) -> Dialect {
        match version {
            0..=71 => Dialect::Classic,
            72..=99 => Dialect::He72,
            _ => Dialect::He100,
        }
    }
}
