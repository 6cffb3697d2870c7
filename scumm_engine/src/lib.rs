//! HE-era SCUMM bytecode interpreter: array store, variable and stack
//! machine, versioned opcode dispatch, resource cache and the digital sound
//! channel mixer.

pub mod arrays;
pub mod cli;
pub mod config;
pub mod error;
pub mod opcodes;
pub mod resource;
pub mod runtime;
pub mod script;
pub mod session;
pub mod sound;
pub mod stack;
pub mod value;
pub mod vars;
pub mod vm;

pub use config::EngineConfig;
pub use error::{VmError, VmResult};
pub use session::{Session, SessionReport};
pub use vm::{Halt, Vm};
