use thiserror::Error;

use crate::resource::ResourceType;

/// Script-integrity violations. Any of these halts the interpreter; none of
/// them are recoverable from inside a script.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum VmError {
    #[error("invalid opcode 0x{opcode:02x} for HE version {version}")]
    InvalidOpcode { opcode: u8, version: u16 },

    #[error("{op}: unknown sub-op {subop}")]
    InvalidSubOp { op: &'static str, subop: i32 },

    #[error("operand stack underflow")]
    StackUnderflow,

    #[error("operand stack overflow ({limit} entries)")]
    StackOverflow { limit: usize },

    #[error("too many items {count} in list, max {max}")]
    TooManyItems { count: i32, max: usize },

    #[error("invalid variable {0:#06x}")]
    InvalidVariable(u16),

    #[error("no script is running")]
    NoScript,

    #[error("local variable {0} read outside of a script")]
    LocalOutsideScript(u16),

    #[error("can't define bit variable as array pointer")]
    BitVarAsArray,

    #[error("reference to zeroed array pointer")]
    ZeroArray,

    #[error("array handle {0:#x} is missing its tag")]
    MissingMagic(i32),

    #[error("invalid array {0}")]
    InvalidArray(i32),

    #[error("out of array pointers, {0} max")]
    OutOfArrays(usize),

    #[error("array {id} out of bounds: [{down}][{across}] in {dims}")]
    ArrayBounds {
        id: i32,
        down: i32,
        across: i32,
        dims: String,
    },

    #[error("invalid array dimensions {0}")]
    InvalidDims(String),

    #[error("array type {0} is not valid here")]
    InvalidArrayType(i32),

    #[error("redim mismatch for array {id}: {old} bytes vs {new}")]
    RedimMismatch { id: i32, old: usize, new: usize },

    #[error("array block shapes differ: {0} vs {1}")]
    ShapeMismatch(String, String),

    #[error("invalid array limits {0}")]
    InvalidLimits(String),

    #[error("invalid array math operation {0}")]
    InvalidMathOp(i32),

    #[error("must DIM a two dimensional array before assigning")]
    MustDimFirst,

    #[error("array {0} sort requires a single column")]
    SortColumn(i32),

    #[error("string stack overflow")]
    StringStackOverflow,

    #[error("string stack underflow")]
    StringStackUnderflow,

    #[error("divide by zero")]
    DivideByZero,

    #[error("modulus by zero")]
    ModulusByZero,

    #[error("pickOneOf: {index} out of range (0, {max})")]
    PickOutOfRange { index: i32, max: i32 },

    #[error("invalid timer {0}")]
    InvalidTimer(i32),

    #[error("invalid sound channel {0}")]
    InvalidChannel(i32),

    #[error("invalid sound variable {0}")]
    InvalidSoundVar(i32),

    #[error("script {0} is not available")]
    UnknownScript(i32),

    #[error("no free script slot")]
    NoFreeSlot,

    #[error("script nesting deeper than {0}")]
    NestingTooDeep(usize),

    #[error("script {script} exceeded {budget} instructions")]
    RunawayScript { script: i32, budget: u32 },

    #[error("bytecode ran past the end of script {script} at {offset:#x}")]
    CodeOverrun { script: i32, offset: usize },

    #[error("{kind:?} {id} failed to load: {reason}")]
    ResourceLoad {
        kind: ResourceType,
        id: i32,
        reason: String,
    },

    #[error("script {script} at {offset:#06x} (opcode 0x{opcode:02x}): {source}")]
    InScript {
        script: i32,
        offset: usize,
        opcode: u8,
        #[source]
        source: Box<VmError>,
    },
}

impl VmError {
    /// The violation itself, without the script location wrapper.
    pub fn root(&self) -> &VmError {
        match self {
            VmError::InScript { source, .. } => source.root(),
            other => other,
        }
    }
}

pub type VmResult<T> = Result<T, VmError>;
