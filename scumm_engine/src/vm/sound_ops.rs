//! Sound opcodes. soundOps builds a request across several sub-ops and
//! submits it on the END sub-op.

use log::{debug, warn};

use super::Vm;
use crate::error::{VmError, VmResult};
use crate::opcodes::subops::{classic, he100, he72};
use crate::opcodes::Dialect;
use crate::sound::{SoundFlags, SoundRequest};
use crate::vars::well_known;

impl Vm {
    /// Fresh request for `sound` on the channel scripts selected through
    /// the sound channel variable.
    fn reset_sound_request(&mut self, sound: i32) {
        self.sound_request = SoundRequest {
            channel: self.vars.scalar(well_known::SOUND_CHANNEL),
            ..SoundRequest::new(sound)
        };
    }

    fn submit_sound(&mut self, request: SoundRequest) -> VmResult<()> {
        self.vars.set_scalar(well_known::LAST_SOUND, request.sound);
        let outcome = self
            .sound
            .start(self.resources.as_mut(), request, self.clock_us)?;
        if let Some(outcome) = outcome {
            self.note_sound_outcome(request.sound, &outcome);
        }
        Ok(())
    }

    pub(super) fn start_sound(&mut self) -> VmResult<()> {
        let offset = self.pop()?;
        let sound = self.pop()?;
        self.reset_sound_request(sound);
        let mut request = self.sound_request;
        if offset != 0 {
            request.offset = offset;
            request.flags.insert(SoundFlags::OFFSET);
        }
        self.submit_sound(request)
    }

    pub(super) fn sound_ops(&mut self) -> VmResult<()> {
        let subop = self.fetch_subop()?;
        match self.dialect {
            Dialect::He100 => self.he100_sound_ops(subop),
            _ => self.classic_sound_ops(subop),
        }
    }

    fn set_sound_var(&mut self) -> VmResult<()> {
        let value = self.pop()?;
        let var = self.pop()?;
        let sound = self.pop()?;
        self.sound.set_var(sound, var, value)
    }

    fn flag_sound(&mut self, flag: SoundFlags) {
        self.sound_request.flags.insert(flag);
    }

    fn classic_sound_ops(&mut self, subop: i32) -> VmResult<()> {
        match subop {
            classic::SOUND_SOFT => self.flag_sound(SoundFlags::SOFT),
            classic::SOUND_VARIABLE => self.set_sound_var()?,
            classic::SOUND_VOLUME => {
                let volume = self.pop()?;
                let sound = self.pop()?;
                let request = SoundRequest {
                    volume,
                    flags: SoundFlags::VOL,
                    ..SoundRequest::new(sound)
                };
                if !self.sound.modify_sound(&request) {
                    debug!("soundOps volume: sound {sound} is not playing");
                }
            }
            classic::SOUND_QUICK_START => self.flag_sound(SoundFlags::QUICK_START),
            classic::SOUND_APPEND => self.flag_sound(SoundFlags::APPEND),
            classic::SOUND_NOP => {}
            classic::SOUND_FREQUENCY => {
                self.sound_request.frequency_shift = self.pop()?;
                self.flag_sound(SoundFlags::FREQUENCY);
            }
            classic::SOUND_CHANNEL => self.sound_request.channel = self.pop()?,
            classic::SOUND_OFFSET => {
                self.sound_request.offset = self.pop()?;
                self.flag_sound(SoundFlags::OFFSET);
            }
            classic::SOUND_START => {
                let sound = self.pop()?;
                self.reset_sound_request(sound);
            }
            classic::SOUND_LOOP => self.flag_sound(SoundFlags::LOOP),
            classic::SOUND_END => {
                let request = self.sound_request;
                self.sound_request.flags = SoundFlags::default();
                self.submit_sound(request)?;
            }
            _ => {
                return Err(VmError::InvalidSubOp {
                    op: "soundOps",
                    subop,
                })
            }
        }
        Ok(())
    }

    fn he100_sound_ops(&mut self, subop: i32) -> VmResult<()> {
        match subop {
            he100::AT => {
                self.sound_request.offset = self.pop()?;
                self.flag_sound(SoundFlags::OFFSET);
            }
            he100::LOAD => {
                let name = self.pop_script_string()?;
                let sound = self.pop()?;
                debug!(
                    "soundOps load: sound {sound} from {}",
                    String::from_utf8_lossy(&name)
                );
            }
            he100::NOW => self.flag_sound(SoundFlags::QUICK_START),
            he100::VARIABLE => self.set_sound_var()?,
            he100::END => {
                let request = self.sound_request;
                self.sound_request.flags = SoundFlags::default();
                if self.sound_modify {
                    if !self.sound.modify_sound(&request) {
                        debug!("soundOps modify: sound {} is not playing", request.sound);
                    }
                } else {
                    self.submit_sound(request)?;
                }
            }
            he100::SOUND_ADD => self.flag_sound(SoundFlags::APPEND),
            he100::SOUND_CHANNEL => self.sound_request.channel = self.pop()?,
            he100::SOUND_FREQUENCY => {
                self.sound_request.frequency_shift = self.pop()?;
                self.flag_sound(SoundFlags::FREQUENCY);
            }
            he100::SOUND_LOOPING => self.flag_sound(SoundFlags::LOOP),
            he100::SOUND_MODIFY | he100::SOUND_START => {
                let sound = self.pop()?;
                self.reset_sound_request(sound);
                self.sound_modify = subop == he100::SOUND_MODIFY;
            }
            he100::SOUND_PAN => {
                self.sound_request.pan = self.pop()?;
                self.flag_sound(SoundFlags::PAN);
            }
            he100::SOUND_SOFT => self.flag_sound(SoundFlags::SOFT),
            he100::SOUND_VOLUME => {
                self.sound_request.volume = self.pop()?;
                self.flag_sound(SoundFlags::VOL);
            }
            _ => {
                return Err(VmError::InvalidSubOp {
                    op: "soundOps",
                    subop,
                })
            }
        }
        Ok(())
    }

    /// Assemble a sound resource at runtime: INIT picks the target, NEW
    /// empties it and ADD appends another sound's samples.
    pub(super) fn create_sound(&mut self) -> VmResult<()> {
        let subop = self.fetch_subop()?;
        let (init, new, add, end) = match self.dialect {
            Dialect::He100 => (he100::INIT, he100::NEW, he100::SOUND_ADD, he100::END),
            _ => (
                he72::CREATE_INIT,
                he72::CREATE_NEW,
                he72::CREATE_ADD,
                he72::CREATE_END,
            ),
        };
        let source = if subop == init {
            self.create_target = self.pop()?;
            return Ok(());
        } else if subop == new {
            -1
        } else if subop == add {
            self.pop()?
        } else if subop == end {
            return Ok(());
        } else {
            return Err(VmError::InvalidSubOp {
                op: "createSound",
                subop,
            });
        };

        let target = self.create_target;
        let result = self
            .sound
            .create_sound(self.resources.as_mut(), target, source);
        if let Err(err) = &result {
            warn!("createSound {target} from {source}: {err:#}");
        }
        self.vars
            .set_scalar(well_known::OPERATION_FAILURE, result.is_err() as i32);
        Ok(())
    }
}
