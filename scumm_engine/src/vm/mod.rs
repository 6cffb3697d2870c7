//! The bytecode interpreter: machine state, the fetch/dispatch loop and
//! script scheduling. Opcode handlers live in the submodules, grouped by the
//! part of the machine they touch.

mod array_ops;
mod math;
mod random_ops;
mod script_ops;
mod sound_ops;
mod stack_ops;
mod string_ops;
mod system_ops;

use anyhow::Result;
use log::{debug, trace, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;

use crate::arrays::ArrayStore;
use crate::config::EngineConfig;
use crate::error::{VmError, VmResult};
use crate::opcodes::{Dialect, Op, OpcodeTable};
use crate::resource::{ResourceManager, ResourceType};
use crate::script::{ScriptSlot, ScriptTable, SlotStatus};
use crate::sound::backend::MixerBackend;
use crate::sound::{SoundEngine, SoundRequest, TriggerOutcome, DYNAMIC_CHANNEL};
use crate::stack::{OperandStack, ScriptStringStack};
use crate::value::Value;
use crate::vars::{well_known, VarRef, VarTable};

pub use system_ops::SystemRequest;

/// Highest HE timer number.
pub const NUM_TIMERS: usize = 15;

/// Default list limit for script arguments.
const MAX_ARGS: usize = 25;

const JIFFY_US: u64 = 1_000_000 / 60;

/// Why the interpreter stopped taking instructions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Halt {
    Quit,
    Restart,
}

pub struct Vm {
    version: u16,
    dialect: Dialect,
    table: OpcodeTable,
    stack: OperandStack,
    strings: ScriptStringStack,
    vars: VarTable,
    arrays: ArrayStore,
    scripts: ScriptTable,
    /// Slot whose code is executing, innermost when scripts nest.
    current: Option<usize>,
    depth: usize,
    yielded: bool,
    resources: Box<dyn ResourceManager>,
    sound: SoundEngine,
    rng: StdRng,
    clock_us: u64,
    jiffy_carry_us: u64,
    timers: [u64; NUM_TIMERS + 1],
    halt: Option<Halt>,
    requests: Vec<SystemRequest>,
    budget: u32,
    nesting_limit: usize,
    local_vars: usize,
    global_scripts: i32,
    callback_script: i32,
    /// soundOps builder state.
    sound_request: SoundRequest,
    sound_modify: bool,
    create_target: i32,
    /// HE 100 resourceRoutines type selection.
    resource_kind: Option<ResourceType>,
    resource_id: i32,
    executed: u64,
}

impl Vm {
    pub fn new(
        config: &EngineConfig,
        resources: Box<dyn ResourceManager>,
        backend: Box<dyn MixerBackend>,
    ) -> Result<Self> {
        config.validate()?;
        let table = OpcodeTable::for_version(config.version)?;
        let mut vars = VarTable::new(config.global_vars, config.room_vars, config.bit_vars);
        vars.set_scalar(well_known::SOUND_CHANNEL, DYNAMIC_CHANNEL);
        debug!(
            "HE {} interpreter: {} opcodes, {} script slots, {} arrays",
            config.version,
            table.len(),
            config.script_slots,
            config.array_slots
        );
        Ok(Vm {
            version: config.version,
            dialect: Dialect::for_version(config.version),
            table,
            stack: OperandStack::new(config.stack_depth),
            strings: ScriptStringStack::default(),
            vars,
            arrays: ArrayStore::new(config.array_slots),
            scripts: ScriptTable::new(config.script_slots),
            current: None,
            depth: 0,
            yielded: false,
            resources,
            sound: SoundEngine::new(config.sound.clone(), backend, config.seed ^ 0x50_4e44),
            rng: StdRng::seed_from_u64(config.seed),
            clock_us: 0,
            jiffy_carry_us: 0,
            timers: [0; NUM_TIMERS + 1],
            halt: None,
            requests: Vec::new(),
            budget: config.instruction_budget,
            nesting_limit: config.nesting_limit,
            local_vars: config.local_vars,
            global_scripts: config.global_scripts,
            callback_script: config.sound.callback_script,
            sound_request: SoundRequest::new(0),
            sound_modify: false,
            create_target: 0,
            resource_kind: None,
            resource_id: 0,
            executed: 0,
        })
    }

    pub fn version(&self) -> u16 {
        self.version
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    pub fn table(&self) -> &OpcodeTable {
        &self.table
    }

    pub fn vars(&self) -> &VarTable {
        &self.vars
    }

    pub fn arrays(&self) -> &ArrayStore {
        &self.arrays
    }

    pub fn scripts(&self) -> &ScriptTable {
        &self.scripts
    }

    pub fn sound(&self) -> &SoundEngine {
        &self.sound
    }

    pub fn sound_mut(&mut self) -> &mut SoundEngine {
        &mut self.sound
    }

    pub fn resources_mut(&mut self) -> &mut dyn ResourceManager {
        self.resources.as_mut()
    }

    pub fn stack(&self) -> &OperandStack {
        &self.stack
    }

    pub fn clock_us(&self) -> u64 {
        self.clock_us
    }

    pub fn halt(&self) -> Option<Halt> {
        self.halt
    }

    pub fn requests(&self) -> &[SystemRequest] {
        &self.requests
    }

    /// Instructions executed since the interpreter was created.
    pub fn executed(&self) -> u64 {
        self.executed
    }

    /// Drop all script, variable, array and sound state, keeping the
    /// configuration and the resource cache.
    pub fn reset(&mut self) {
        let globals = self.vars.globals().len();
        let (room, bits) = self.vars.bank_sizes();
        self.vars = VarTable::new(globals, room, bits);
        self.vars.set_scalar(well_known::SOUND_CHANNEL, DYNAMIC_CHANNEL);
        self.arrays = ArrayStore::new(self.arrays.capacity());
        self.scripts = ScriptTable::new(self.scripts.len());
        self.stack.clear();
        self.strings = ScriptStringStack::default();
        self.current = None;
        self.depth = 0;
        self.yielded = false;
        self.halt = None;
        self.sound.stop_all(self.clock_us);
        self.timers = [self.clock_us / 1000; NUM_TIMERS + 1];
    }

    /// Move simulated time forward and wake scripts whose delay expired.
    pub fn advance_clock(&mut self, micros: u64) {
        self.clock_us += micros;
        let total = self.jiffy_carry_us + micros;
        let jiffies = total / JIFFY_US;
        self.jiffy_carry_us = total % JIFFY_US;
        if jiffies > 0 {
            self.scripts.decrease_delays(jiffies as i32);
        }
    }

    // Variables

    pub fn read_var(&self, var: u16) -> VmResult<Value> {
        match VarRef::decode(var, self.version)? {
            VarRef::Global(index) => self.vars.global(index),
            VarRef::Room(index) => self.vars.room(index),
            VarRef::Bit(index) => Ok(Value::Scalar(self.vars.bit(index)? as i32)),
            VarRef::Local(index) => {
                let slot = self.current_slot().map_err(|_| VmError::LocalOutsideScript(index))?;
                if index as usize >= self.local_vars {
                    return Err(VmError::InvalidVariable(var));
                }
                Ok(Value::decode(slot.locals[index as usize], self.version))
            }
        }
    }

    pub fn write_var(&mut self, var: u16, value: Value) -> VmResult<()> {
        match VarRef::decode(var, self.version)? {
            VarRef::Global(index) => self.vars.set_global(index, value),
            VarRef::Room(index) => self.vars.set_room(index, value),
            VarRef::Bit(index) => self.vars.set_bit(index, !value.is_zero()),
            VarRef::Local(index) => {
                if index as usize >= self.local_vars {
                    return Err(VmError::InvalidVariable(var));
                }
                let version = self.version;
                let slot = self.current_slot_mut().map_err(|_| VmError::LocalOutsideScript(index))?;
                slot.locals[index as usize] = value.encode(version);
                Ok(())
            }
        }
    }

    fn read_var_raw(&self, var: u16) -> VmResult<i32> {
        Ok(self.read_var(var)?.encode(self.version))
    }

    fn write_var_raw(&mut self, var: u16, raw: i32) -> VmResult<()> {
        self.write_var(var, Value::decode(raw, self.version))
    }

    // Operand stack and code stream

    fn push(&mut self, value: i32) -> VmResult<()> {
        self.stack.push(value)
    }

    fn pop(&mut self) -> VmResult<i32> {
        self.stack.pop()
    }

    fn pop_list(&mut self, max: usize) -> VmResult<Vec<i32>> {
        self.stack.pop_list(max)
    }

    fn current_slot(&self) -> VmResult<&ScriptSlot> {
        self.current
            .and_then(|index| self.scripts.get(index))
            .ok_or(VmError::NoScript)
    }

    fn current_slot_mut(&mut self) -> VmResult<&mut ScriptSlot> {
        match self.current {
            Some(index) => self.scripts.get_mut(index).ok_or(VmError::NoScript),
            None => Err(VmError::NoScript),
        }
    }

    fn fetch_u8(&mut self) -> VmResult<u8> {
        self.current_slot_mut()?.fetch_u8()
    }

    fn fetch_u16(&mut self) -> VmResult<u16> {
        self.current_slot_mut()?.fetch_u16()
    }

    fn fetch_i16(&mut self) -> VmResult<i16> {
        self.current_slot_mut()?.fetch_i16()
    }

    fn fetch_i32(&mut self) -> VmResult<i32> {
        self.current_slot_mut()?.fetch_i32()
    }

    fn fetch_cstr(&mut self) -> VmResult<Vec<u8>> {
        self.current_slot_mut()?.fetch_cstr()
    }

    fn fetch_subop(&mut self) -> VmResult<i32> {
        Ok(self.fetch_u8()? as i32)
    }

    /// Stop executing the current slot for this frame.
    fn yield_slot(&mut self) {
        self.yielded = true;
    }

    // Scheduling

    /// Start `number` in a fresh slot and run it until it yields.
    pub fn run_script(
        &mut self,
        number: i32,
        freeze_resistant: bool,
        recursive: bool,
        args: &[i32],
        cycle: i32,
    ) -> VmResult<()> {
        if number == 0 {
            return Ok(());
        }
        if !recursive {
            self.stop_script(number);
        }
        let code = self
            .resources
            .get(ResourceType::Script, number)
            .map_err(|err| {
                warn!("script {number}: {err:#}");
                VmError::UnknownScript(number)
            })?;
        let index = self
            .scripts
            .spawn(number, code, args, if cycle == 0 { 1 } else { cycle })?;
        if let Some(slot) = self.scripts.get_mut(index) {
            slot.freeze_resistant = freeze_resistant;
            slot.recursive = recursive;
        }
        debug!("script {number} started in slot {index} with {args:?}");
        self.run_slot(index)
    }

    /// Kill every instance of `number`.
    pub fn stop_script(&mut self, number: i32) {
        for index in self.scripts.find(number) {
            self.kill_slot(index);
        }
    }

    pub fn is_script_running(&self, number: i32) -> bool {
        self.scripts.is_running(number)
    }

    fn kill_slot(&mut self, index: usize) {
        let freed = self.arrays.nuke_owned_by(index);
        if let Some(slot) = self.scripts.get(index) {
            debug!(
                "script {} in slot {index} stopped ({freed} local arrays freed)",
                slot.number
            );
        }
        if self.current == Some(index) {
            self.yield_slot();
        }
        self.scripts.kill(index);
    }

    fn run_slot(&mut self, index: usize) -> VmResult<()> {
        if self.depth >= self.nesting_limit {
            return Err(VmError::NestingTooDeep(self.nesting_limit));
        }
        let saved_current = self.current.replace(index);
        let saved_yield = std::mem::replace(&mut self.yielded, false);
        self.depth += 1;
        if let Some(slot) = self.scripts.get_mut(index) {
            slot.did_exec = true;
        }
        let result = self.execute(index);
        self.depth -= 1;
        self.current = saved_current;
        self.yielded = saved_yield;
        result
    }

    fn execute(&mut self, index: usize) -> VmResult<()> {
        let Some(serial) = self.scripts.get(index).map(ScriptSlot::serial) else {
            return Ok(());
        };
        let mut steps = 0u32;
        while !self.yielded && self.halt.is_none() {
            let Some(slot) = self.scripts.get_mut(index) else {
                break;
            };
            if slot.serial() != serial || slot.status != SlotStatus::Running {
                break;
            }
            let (number, offset) = (slot.number, slot.pc);
            let opcode = slot.fetch_u8()?;
            steps += 1;
            if steps > self.budget {
                return Err(VmError::RunawayScript {
                    script: number,
                    budget: self.budget,
                });
            }
            self.executed += 1;
            self.step(opcode).map_err(|source| match source {
                nested @ VmError::InScript { .. } => nested,
                source => VmError::InScript {
                    script: number,
                    offset,
                    opcode,
                    source: Box::new(source),
                },
            })?;
        }
        Ok(())
    }

    /// Give every runnable slot one turn, lowest cycle first.
    pub fn run_all_scripts(&mut self) -> VmResult<()> {
        self.scripts.clear_did_exec();
        for index in self.scripts.runnable() {
            if self.halt.is_some() {
                break;
            }
            let still_due = self.scripts.get(index).is_some_and(|slot| {
                slot.status == SlotStatus::Running && !slot.is_frozen() && !slot.did_exec
            });
            if still_due {
                self.run_slot(index)?;
            }
        }
        Ok(())
    }

    /// Start every sound queued by scripts this frame.
    pub fn process_sound_queues(&mut self) -> VmResult<()> {
        let outcomes = self
            .sound
            .process_queue(self.resources.as_mut(), self.clock_us)?;
        for (sound, outcome) in outcomes {
            self.note_sound_outcome(sound, &outcome);
        }
        Ok(())
    }

    /// Run sound code, retire finished channels and dispatch end-of-sound
    /// callbacks to the callback script.
    pub fn handle_sound_frame(&mut self) -> VmResult<()> {
        let callbacks = self.sound.handle_frame(self.clock_us);
        if self.callback_script == 0 {
            return Ok(());
        }
        for callback in callbacks {
            trace!("sound callback {callback:?}");
            let args = [callback.sound, callback.channel as i32, callback.reason.code()];
            self.run_script(self.callback_script, false, true, &args, 0)?;
        }
        Ok(())
    }

    fn note_sound_outcome(&mut self, sound: i32, outcome: &TriggerOutcome) {
        let failed = matches!(outcome, TriggerOutcome::Failed { .. });
        if failed {
            warn!("sound {sound} could not be played");
        }
        self.vars
            .set_scalar(well_known::OPERATION_FAILURE, failed as i32);
    }

    // Dispatch

    fn step(&mut self, opcode: u8) -> VmResult<()> {
        let op = self.table.get(opcode).ok_or(VmError::InvalidOpcode {
            opcode,
            version: self.version,
        })?;
        trace!("0x{opcode:02x} {op:?}");
        match op {
            Op::PushByte => {
                let value = self.fetch_u8()? as i32;
                self.push(value)
            }
            Op::PushWord => {
                let value = self.fetch_i16()? as i32;
                self.push(value)
            }
            Op::PushDWord => {
                let value = self.fetch_i32()?;
                self.push(value)
            }
            Op::PushByteVar => {
                let var = self.fetch_u8()? as u16;
                self.push_var(var)
            }
            Op::PushWordVar => {
                let var = self.fetch_u16()?;
                self.push_var(var)
            }
            Op::GetScriptString => self.get_script_string(),
            Op::Dup => self.dup(),
            Op::DupN => self.dup_n(),
            Op::Pop => self.pop().map(|_| ()),

            Op::Not => self.unary(|a| Ok((a == 0) as i32)),
            Op::Abs => self.unary(|a| Ok(a.wrapping_abs())),
            Op::Eq => self.binary(|b, a| Ok((b == a) as i32)),
            Op::Neq => self.binary(|b, a| Ok((b != a) as i32)),
            Op::Gt => self.binary(|b, a| Ok((b > a) as i32)),
            Op::Lt => self.binary(|b, a| Ok((b < a) as i32)),
            Op::Le => self.binary(|b, a| Ok((b <= a) as i32)),
            Op::Ge => self.binary(|b, a| Ok((b >= a) as i32)),
            Op::Add => self.binary(|b, a| Ok(b.wrapping_add(a))),
            Op::Sub => self.binary(|b, a| Ok(b.wrapping_sub(a))),
            Op::Mul => self.binary(|b, a| Ok(b.wrapping_mul(a))),
            Op::Div => self.binary(|b, a| {
                if a == 0 {
                    return Err(VmError::DivideByZero);
                }
                Ok(b.wrapping_div(a))
            }),
            Op::Mod => self.binary(|b, a| {
                if a == 0 {
                    return Err(VmError::ModulusByZero);
                }
                Ok(b.wrapping_rem(a))
            }),
            Op::Land => self.binary(|b, a| Ok((b != 0 && a != 0) as i32)),
            Op::Lor => self.binary(|b, a| Ok((b != 0 || a != 0) as i32)),
            Op::Band => self.binary(|b, a| Ok(b & a)),
            Op::Bor => self.binary(|b, a| Ok(b | a)),
            Op::Xor => self.binary(|b, a| Ok(b ^ a)),
            Op::Shl => self.binary(|b, a| Ok(b.wrapping_shl(a as u32))),
            Op::Shr => self.binary(|b, a| Ok(b.wrapping_shr(a as u32))),
            Op::Min => self.binary(|b, a| Ok(a.min(b))),
            Op::Max => self.binary(|b, a| Ok(a.max(b))),
            Op::Cond => self.cond(),
            Op::IsAnyOf => self.is_any_of(),
            Op::Sin => self.unary(|a| Ok(math::sin(a))),
            Op::Cos => self.unary(|a| Ok(math::cos(a))),
            Op::Sqrt => self.unary(|a| Ok(math::sqrt(a))),
            Op::AngleFromDelta => self.angle_from_delta(),
            Op::AngleFromLine => self.angle_from_line(),
            Op::Distance => self.distance(),

            Op::WriteByteVar => {
                let var = self.fetch_u8()? as u16;
                self.write_var_from_stack(var)
            }
            Op::WriteWordVar => {
                let var = self.fetch_u16()?;
                self.write_var_from_stack(var)
            }
            Op::ByteVarInc => {
                let var = self.fetch_u8()? as u16;
                self.add_to_var(var, 1)
            }
            Op::WordVarInc => {
                let var = self.fetch_u16()?;
                self.add_to_var(var, 1)
            }
            Op::ByteVarDec => {
                let var = self.fetch_u8()? as u16;
                self.add_to_var(var, -1)
            }
            Op::WordVarDec => {
                let var = self.fetch_u16()?;
                self.add_to_var(var, -1)
            }
            Op::ByteArrayRead => {
                let var = self.fetch_u8()? as u16;
                self.array_read(var, false)
            }
            Op::WordArrayRead => {
                let var = self.fetch_u16()?;
                self.array_read(var, false)
            }
            Op::ByteArrayIndexedRead => {
                let var = self.fetch_u8()? as u16;
                self.array_read(var, true)
            }
            Op::WordArrayIndexedRead => {
                let var = self.fetch_u16()?;
                self.array_read(var, true)
            }
            Op::ByteArrayWrite => {
                let var = self.fetch_u8()? as u16;
                self.array_write(var, false)
            }
            Op::WordArrayWrite => {
                let var = self.fetch_u16()?;
                self.array_write(var, false)
            }
            Op::ByteArrayIndexedWrite => {
                let var = self.fetch_u8()? as u16;
                self.array_write(var, true)
            }
            Op::WordArrayIndexedWrite => {
                let var = self.fetch_u16()?;
                self.array_write(var, true)
            }
            Op::ByteArrayInc => {
                let var = self.fetch_u8()? as u16;
                self.array_add(var, 1)
            }
            Op::WordArrayInc => {
                let var = self.fetch_u16()?;
                self.array_add(var, 1)
            }
            Op::ByteArrayDec => {
                let var = self.fetch_u8()? as u16;
                self.array_add(var, -1)
            }
            Op::WordArrayDec => {
                let var = self.fetch_u16()?;
                self.array_add(var, -1)
            }

            Op::If => self.branch(true),
            Op::IfNot => self.branch(false),
            Op::Jump => {
                let offset = self.fetch_i16()?;
                self.current_slot_mut()?.jump(offset)
            }
            Op::StartScript => self.start_script(),
            Op::StartScriptQuick => self.start_script_quick(false),
            Op::StartScriptQuick2 => self.start_script_quick(true),
            Op::JumpToScript => self.jump_to_script(),
            Op::PriorityStartScript => self.priority_start_script(false),
            Op::PriorityChainScript => self.priority_start_script(true),
            Op::StopScript => self.stop_script_op(),
            Op::StopObjectCode => self.stop_object_code(),
            Op::BreakHere => {
                self.yield_slot();
                Ok(())
            }
            Op::IsScriptRunning => {
                let number = self.pop()?;
                let running = self.scripts.is_running(number);
                self.push(running as i32)
            }
            Op::IsRoomScriptRunning => {
                let number = self.pop()?;
                let running = number >= self.global_scripts && self.scripts.is_running(number);
                self.push(running as i32)
            }
            Op::Delay => {
                let jiffies = self.pop()? as u16 as i32;
                self.delay(jiffies)
            }
            Op::DelaySeconds => {
                let seconds = self.pop()?;
                self.delay(seconds.saturating_mul(60))
            }
            Op::DelayMinutes => {
                let minutes = self.pop()? as u16 as i32;
                self.delay(minutes.saturating_mul(3600))
            }
            Op::DelayFrames => self.delay_frames(),
            Op::FreezeUnfreeze => self.freeze_unfreeze(),

            Op::Random => self.random(),
            Op::RandomRange => self.random_range(),
            Op::PickOneOf => self.pick_one_of(false),
            Op::PickOneOfDefault => self.pick_one_of(true),
            Op::Shuffle => self.shuffle(),
            Op::PickVarRandom => self.pick_var_random(),

            Op::DimArray => self.dim_array(),
            Op::Dim2DimArray => self.dim2dim_array(),
            Op::Dim2Dim2Array => self.dim2dim2_array(),
            Op::RedimArray => self.redim_array(),
            Op::Redim2DimArray => self.redim2dim_array(),
            Op::ArrayOps => self.array_ops(),
            Op::GetArrayDimSize => self.get_array_dim_size(),
            Op::GetNumFreeArrays => {
                let free = self.arrays.num_free() as i32;
                self.push(free)
            }
            Op::SortArray => self.sort_array(),
            Op::LocalizeArrayToScript => self.localize_array(),

            Op::CopyString => self.copy_string(),
            Op::AppendString => self.append_string(),
            Op::ConcatString => self.concat_string(),
            Op::CompareString => self.compare_string(),
            Op::GetStringLen => self.get_string_len(),
            Op::StringToInt => self.string_to_int(),
            Op::GetCharIndexInString => self.get_char_index_in_string(),

            Op::StartSound => self.start_sound(),
            Op::StopSound => {
                let sound = self.pop()?;
                self.sound.stop(sound, self.clock_us);
                Ok(())
            }
            Op::SoundOps => self.sound_ops(),
            Op::IsSoundRunning => {
                let sound = self.pop()?;
                let running = sound != 0 && self.sound.is_running(sound);
                self.push(running as i32)
            }
            Op::GetSoundPosition => {
                let sound = self.pop()?;
                let position = self.sound.position(sound, self.clock_us);
                self.push(position)
            }
            Op::GetSoundVar => {
                let var = self.pop()?;
                let sound = self.pop()?;
                let value = self.sound.var(sound, var)?;
                self.push(value)
            }
            Op::CreateSound => self.create_sound(),

            Op::ResourceRoutines => self.resource_routines(),
            Op::IsResourceLoaded => self.is_resource_loaded(),
            Op::GetResourceSize => self.get_resource_size(),
            Op::GetTimer => self.get_timer(),
            Op::SetTimer => self.set_timer(),
            Op::GetDateTime => self.get_date_time(),
            Op::SystemOps => self.system_ops(),
            Op::Dummy => Ok(()),
        }
    }
}
