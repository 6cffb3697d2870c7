use std::rc::Rc;

use byteorder::{ByteOrder, LittleEndian};
use serde::Serialize;

use crate::error::{VmError, VmResult};
use crate::vars::NUM_LOCALS;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotStatus {
    Dead,
    Running,
    Paused,
}

/// One running (or suspended) script invocation.
#[derive(Debug, Clone, Serialize)]
pub struct ScriptSlot {
    pub number: i32,
    pub status: SlotStatus,
    /// Frozen while non-zero.
    pub freeze_count: u8,
    #[serde(skip)]
    pub code: Rc<[u8]>,
    pub pc: usize,
    pub locals: [i32; NUM_LOCALS],
    /// Remaining delay in 60 Hz jiffies.
    pub delay: i32,
    /// Countdown used by delayFrames.
    pub delay_frames: i32,
    pub freeze_resistant: bool,
    pub recursive: bool,
    pub cycle: i32,
    /// Already ran this frame.
    #[serde(skip)]
    pub did_exec: bool,
    /// Start order, used to break cycle ties.
    serial: u64,
}

impl Default for ScriptSlot {
    fn default() -> Self {
        ScriptSlot {
            number: 0,
            status: SlotStatus::Dead,
            freeze_count: 0,
            code: Rc::from(Vec::new()),
            pc: 0,
            locals: [0; NUM_LOCALS],
            delay: 0,
            delay_frames: 0,
            freeze_resistant: false,
            recursive: false,
            cycle: 1,
            did_exec: false,
            serial: 0,
        }
    }
}

impl ScriptSlot {
    pub fn is_live(&self) -> bool {
        self.status != SlotStatus::Dead
    }

    pub fn is_frozen(&self) -> bool {
        self.freeze_count > 0
    }

    /// Unique per spawn, so a slot reused by another script can be told
    /// apart from the one that was running there before.
    pub fn serial(&self) -> u64 {
        self.serial
    }

    fn overrun(&self) -> VmError {
        VmError::CodeOverrun {
            script: self.number,
            offset: self.pc,
        }
    }

    fn take(&mut self, len: usize) -> VmResult<&[u8]> {
        let start = self.pc;
        let end = start.checked_add(len).ok_or_else(|| self.overrun())?;
        if end > self.code.len() {
            return Err(self.overrun());
        }
        self.pc = end;
        Ok(&self.code[start..end])
    }

    pub fn fetch_u8(&mut self) -> VmResult<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn fetch_u16(&mut self) -> VmResult<u16> {
        Ok(LittleEndian::read_u16(self.take(2)?))
    }

    pub fn fetch_i16(&mut self) -> VmResult<i16> {
        Ok(LittleEndian::read_i16(self.take(2)?))
    }

    pub fn fetch_i32(&mut self) -> VmResult<i32> {
        Ok(LittleEndian::read_i32(self.take(4)?))
    }

    /// Inline NUL-terminated string; the terminator is consumed but not
    /// returned.
    pub fn fetch_cstr(&mut self) -> VmResult<Vec<u8>> {
        let rest = self.code.get(self.pc..).ok_or_else(|| self.overrun())?;
        let len = rest.iter().position(|&b| b == 0).ok_or_else(|| self.overrun())?;
        let bytes = rest[..len].to_vec();
        self.pc += len + 1;
        Ok(bytes)
    }

    /// Relative jump from the current position.
    pub fn jump(&mut self, offset: i16) -> VmResult<()> {
        let target = self.pc as i64 + offset as i64;
        if target < 0 || target as usize > self.code.len() {
            return Err(VmError::CodeOverrun {
                script: self.number,
                offset: target.max(0) as usize,
            });
        }
        self.pc = target as usize;
        Ok(())
    }
}

/// Fixed pool of script slots.
#[derive(Debug, Clone, Serialize)]
pub struct ScriptTable {
    slots: Vec<ScriptSlot>,
    next_serial: u64,
}

impl ScriptTable {
    pub fn new(count: usize) -> Self {
        ScriptTable {
            slots: (0..count).map(|_| ScriptSlot::default()).collect(),
            next_serial: 1,
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&ScriptSlot> {
        self.slots.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut ScriptSlot> {
        self.slots.get_mut(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &ScriptSlot)> {
        self.slots.iter().enumerate()
    }

    /// Claim a dead slot and initialise it for `number`.
    pub fn spawn(&mut self, number: i32, code: Rc<[u8]>, locals: &[i32], cycle: i32) -> VmResult<usize> {
        let index = self
            .slots
            .iter()
            .position(|slot| !slot.is_live())
            .ok_or(VmError::NoFreeSlot)?;
        let mut slot = ScriptSlot {
            number,
            status: SlotStatus::Running,
            code,
            cycle,
            serial: self.next_serial,
            ..ScriptSlot::default()
        };
        for (dst, &value) in slot.locals.iter_mut().zip(locals) {
            *dst = value;
        }
        self.next_serial += 1;
        self.slots[index] = slot;
        Ok(index)
    }

    /// Live slots running `number`.
    pub fn find(&self, number: i32) -> Vec<usize> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.is_live() && slot.number == number)
            .map(|(index, _)| index)
            .collect()
    }

    pub fn is_running(&self, number: i32) -> bool {
        self.slots
            .iter()
            .any(|slot| slot.is_live() && slot.number == number)
    }

    pub fn kill(&mut self, index: usize) {
        if let Some(slot) = self.slots.get_mut(index) {
            *slot = ScriptSlot::default();
        }
    }

    pub fn clear_did_exec(&mut self) {
        for slot in self.slots.iter_mut() {
            slot.did_exec = false;
        }
    }

    /// Slots due to run this frame: running, not frozen, not yet run, lowest
    /// cycle first and then in start order.
    pub fn runnable(&self) -> Vec<usize> {
        let mut order: Vec<usize> = self
            .slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.status == SlotStatus::Running && !slot.is_frozen() && !slot.did_exec)
            .map(|(index, _)| index)
            .collect();
        order.sort_by_key(|&index| (self.slots[index].cycle, self.slots[index].serial));
        order
    }

    /// Count down paused slots; wake the ones whose delay ran out.
    pub fn decrease_delays(&mut self, jiffies: i32) {
        for slot in self.slots.iter_mut().filter(|slot| slot.status == SlotStatus::Paused) {
            slot.delay -= jiffies;
            if slot.delay <= 0 {
                slot.delay = 0;
                slot.status = SlotStatus::Running;
            }
        }
    }

    /// Freeze every live slot other than `current`. Freeze-resistant slots
    /// are skipped unless `force` is set.
    pub fn freeze(&mut self, current: Option<usize>, force: bool) {
        for (index, slot) in self.slots.iter_mut().enumerate() {
            if Some(index) == current || !slot.is_live() {
                continue;
            }
            if force || !slot.freeze_resistant {
                slot.freeze_count = slot.freeze_count.saturating_add(1);
            }
        }
    }

    pub fn unfreeze(&mut self) {
        for slot in self.slots.iter_mut().filter(|slot| slot.is_live()) {
            slot.freeze_count = slot.freeze_count.saturating_sub(1);
        }
    }
}
