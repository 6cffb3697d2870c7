pub mod chunk;
pub mod error;
pub mod riff;
pub mod sound;
pub mod sound_code;
pub mod spool;

pub use error::{FormatError, FourCc};
pub use sound::{SoundHeader, SoundKind, Span, parse_sound, wrap_riff};
pub use sound_code::{SoundCodeEvent, SoundCodeOp, parse_sound_code};
pub use spool::{SpoolEntry, SpoolFile, SpoolIndex};
