//! Frame driver around the interpreter: boots the game script, steps the
//! machine one frame at a time and collects a JSON-friendly summary.

use std::collections::BTreeMap;

use log::{debug, info};
use serde::Serialize;

use crate::arrays::ArrayKind;
use crate::error::VmResult;
use crate::script::SlotStatus;
use crate::sound::{ChannelSnapshot, SoundEvent};
use crate::value::ArrayId;
use crate::vm::{Halt, SystemRequest, Vm};

#[derive(Debug, Clone, Serialize)]
pub struct ScriptSummary {
    pub slot: usize,
    pub number: i32,
    pub status: SlotStatus,
    pub pc: usize,
    pub cycle: i32,
    pub delay: i32,
    pub frozen: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ArraySummary {
    pub id: ArrayId,
    pub kind: ArrayKind,
    pub rows: usize,
    pub cols: usize,
    pub owner: Option<usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionReport {
    pub version: u16,
    pub frames: u64,
    pub clock_us: u64,
    pub executed: u64,
    pub halt: Option<Halt>,
    pub restarts: u32,
    pub requests: Vec<SystemRequest>,
    pub sound_events: Vec<SoundEvent>,
    pub channels: Vec<ChannelSnapshot>,
    pub scripts: Vec<ScriptSummary>,
    /// Non-zero global variables, by index.
    pub globals: BTreeMap<u16, i32>,
    pub arrays: Vec<ArraySummary>,
    pub error: Option<String>,
}

pub struct Session {
    vm: Vm,
    boot_script: i32,
    boot_args: Vec<i32>,
    frame_us: u64,
    frames: u64,
    restarts: u32,
}

impl Session {
    pub fn new(vm: Vm, frame_us: u64, boot_script: i32, boot_args: Vec<i32>) -> Self {
        Session {
            vm,
            boot_script,
            boot_args,
            frame_us,
            frames: 0,
            restarts: 0,
        }
    }

    pub fn vm(&self) -> &Vm {
        &self.vm
    }

    pub fn vm_mut(&mut self) -> &mut Vm {
        &mut self.vm
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn restarts(&self) -> u32 {
        self.restarts
    }

    /// Start the boot script with its arguments.
    pub fn boot(&mut self) -> VmResult<()> {
        info!(
            "booting script {} (HE {}) with args {:?}",
            self.boot_script,
            self.vm.version(),
            self.boot_args
        );
        self.vm
            .run_script(self.boot_script, false, false, &self.boot_args, 0)
    }

    /// One engine frame: time, scripts, queued sounds, then sound upkeep.
    /// A restart requested during the frame reboots before returning.
    pub fn run_frame(&mut self) -> VmResult<Option<Halt>> {
        if let Some(Halt::Quit) = self.vm.halt() {
            return Ok(Some(Halt::Quit));
        }
        self.vm.advance_clock(self.frame_us);
        self.vm.run_all_scripts()?;
        self.vm.process_sound_queues()?;
        self.vm.handle_sound_frame()?;
        self.frames += 1;

        match self.vm.halt() {
            Some(Halt::Restart) => {
                self.restarts += 1;
                info!("restart requested in frame {}", self.frames);
                self.vm.reset();
                self.boot()?;
                Ok(None)
            }
            halt => Ok(halt),
        }
    }

    /// Run up to `frames` frames, stopping early on quit.
    pub fn run(&mut self, frames: u64) -> VmResult<Option<Halt>> {
        for _ in 0..frames {
            if let Some(halt) = self.run_frame()? {
                debug!("halted with {halt:?} after {} frames", self.frames);
                return Ok(Some(halt));
            }
        }
        Ok(self.vm.halt())
    }

    pub fn report(&self) -> SessionReport {
        let vm = &self.vm;
        let version = vm.version();
        let scripts = vm
            .scripts()
            .iter()
            .filter(|(_, slot)| slot.is_live())
            .map(|(index, slot)| ScriptSummary {
                slot: index,
                number: slot.number,
                status: slot.status,
                pc: slot.pc,
                cycle: slot.cycle,
                delay: slot.delay,
                frozen: slot.is_frozen(),
            })
            .collect();
        let globals = vm
            .vars()
            .globals()
            .iter()
            .enumerate()
            .filter(|(_, value)| !value.is_zero())
            .map(|(index, value)| (index as u16, value.encode(version)))
            .collect();
        let arrays = vm
            .arrays()
            .iter()
            .map(|(id, array)| ArraySummary {
                id,
                kind: array.declared_kind(),
                rows: array.dims().rows(),
                cols: array.dims().cols(),
                owner: array.owner(),
            })
            .collect();

        SessionReport {
            version,
            frames: self.frames,
            clock_us: vm.clock_us(),
            executed: vm.executed(),
            halt: vm.halt(),
            restarts: self.restarts,
            requests: vm.requests().to_vec(),
            sound_events: vm.sound().events().to_vec(),
            channels: vm.sound().snapshot(vm.clock_us()),
            scripts,
            globals,
            arrays,
            error: None,
        }
    }
}
