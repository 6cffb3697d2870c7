//! Starting, stopping, pausing and freezing scripts.

use super::{Vm, MAX_ARGS};
use crate::error::VmResult;
use crate::opcodes::subops::{he100, he72};
use crate::opcodes::Dialect;
use crate::script::SlotStatus;

/// How a started script runs: BAK makes it freeze resistant, REC lets it
/// run alongside other instances of itself.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct StartFlags {
    freeze_resistant: bool,
    recursive: bool,
}

impl StartFlags {
    /// Bit 0 is BAK, bit 1 is REC.
    fn from_bits(bits: i32) -> Self {
        StartFlags {
            freeze_resistant: bits & 1 != 0,
            recursive: bits & 2 != 0,
        }
    }
}

impl Vm {
    /// HE 72 and later encode the flags as a sub-op byte.
    fn fetch_start_flags(&mut self) -> VmResult<StartFlags> {
        let code = self.fetch_subop()?;
        let (rec, bak, bakrec) = match self.dialect {
            Dialect::He100 => (he100::REC, he100::BAK, he100::BAKREC),
            _ => (he72::SCRIPT_REC, he72::SCRIPT_BAK, he72::SCRIPT_BAKREC),
        };
        Ok(StartFlags {
            freeze_resistant: code == bak || code == bakrec,
            recursive: code == rec || code == bakrec,
        })
    }

    /// Pop the argument list and script number, then the flags.
    fn pop_start(&mut self) -> VmResult<(i32, Vec<i32>, StartFlags)> {
        let args = self.pop_list(MAX_ARGS)?;
        let script = self.pop()?;
        let flags = match self.dialect {
            Dialect::Classic => StartFlags::from_bits(self.pop()?),
            _ => self.fetch_start_flags()?,
        };
        Ok((script, args, flags))
    }

    pub(super) fn start_script(&mut self) -> VmResult<()> {
        let (script, args, flags) = self.pop_start()?;
        self.run_script(script, flags.freeze_resistant, flags.recursive, &args, 0)
    }

    pub(super) fn start_script_quick(&mut self, recursive: bool) -> VmResult<()> {
        let args = self.pop_list(MAX_ARGS)?;
        let script = self.pop()?;
        self.run_script(script, false, recursive, &args, 0)
    }

    /// Replace the current script with another one.
    pub(super) fn jump_to_script(&mut self) -> VmResult<()> {
        let (script, args, flags) = self.pop_start()?;
        self.stop_object_code()?;
        self.run_script(script, flags.freeze_resistant, flags.recursive, &args, 0)
    }

    /// Start with an explicit cycle; `chain` ends the caller first.
    pub(super) fn priority_start_script(&mut self, chain: bool) -> VmResult<()> {
        let args = self.pop_list(MAX_ARGS)?;
        let cycle = self.pop()?;
        let script = self.pop()?;
        let flags = self.fetch_start_flags()?;
        if chain {
            self.stop_object_code()?;
        }
        self.run_script(script, flags.freeze_resistant, flags.recursive, &args, cycle)
    }

    pub(super) fn stop_script_op(&mut self) -> VmResult<()> {
        match self.pop()? {
            0 => self.stop_object_code(),
            script => {
                self.stop_script(script);
                Ok(())
            }
        }
    }

    /// End the current script.
    pub(super) fn stop_object_code(&mut self) -> VmResult<()> {
        let index = self.current.ok_or(crate::error::VmError::NoScript)?;
        self.kill_slot(index);
        Ok(())
    }

    /// Pause the current script for `jiffies` 60 Hz ticks.
    pub(super) fn delay(&mut self, jiffies: i32) -> VmResult<()> {
        let slot = self.current_slot_mut()?;
        slot.delay = jiffies;
        slot.status = SlotStatus::Paused;
        self.yield_slot();
        Ok(())
    }

    /// Re-execute this opcode on each of the next N frames. N is popped on
    /// the first pass only.
    pub(super) fn delay_frames(&mut self) -> VmResult<()> {
        let remaining = if self.current_slot()?.delay_frames == 0 {
            self.pop()?
        } else {
            self.current_slot()?.delay_frames - 1
        };
        let slot = self.current_slot_mut()?;
        slot.delay_frames = remaining;
        if remaining != 0 {
            slot.pc -= 1;
            self.yield_slot();
        }
        Ok(())
    }

    /// Non-zero freezes every other script; 0x80 and up also freezes the
    /// freeze-resistant ones. Zero thaws one level.
    pub(super) fn freeze_unfreeze(&mut self) -> VmResult<()> {
        let level = self.pop()?;
        if level != 0 {
            self.scripts.freeze(self.current, level >= 0x80);
        } else {
            self.scripts.unfreeze();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::opcodes::Op;
    use crate::script::SlotStatus;
    use crate::vm::tests::{global, vm_with, Asm};
    use crate::vm::Vm;

    /// Store local 0 into `var`, then idle a frame per loop.
    fn reporter(version: u16, var: u16) -> Vec<u8> {
        Asm::new(version)
            .push_var(0x4000)
            .write_var(var)
            .op(Op::BreakHere)
            .end()
    }

    /// Increment `var` once per frame forever.
    fn ticker(version: u16, var: u16) -> Vec<u8> {
        Asm::new(version)
            .op(Op::WordVarInc)
            .word(var)
            .op(Op::BreakHere)
            .op(Op::Jump)
            .word((-7i16) as u16)
            .code
    }

    fn start(vm: &mut Vm, code: Vec<u8>) {
        vm.resources_mut()
            .insert(crate::resource::ResourceType::Script, 1, code);
        vm.run_script(1, false, false, &[], 0).unwrap();
    }

    #[test]
    fn start_script_passes_arguments_and_flags() {
        let mut vm = vm_with(60, &[(2, reporter(60, 30))]);
        let code = Asm::new(60)
            .push(3)
            .push(2)
            .push(41)
            .push(1)
            .op(Op::StartScript)
            .end();
        start(&mut vm, code);
        assert_eq!(global(&vm, 30), 41);
        let index = vm.scripts().find(2)[0];
        let slot = vm.scripts().get(index).unwrap();
        assert!(slot.freeze_resistant && slot.recursive);

        let mut vm = vm_with(72, &[(2, reporter(72, 30))]);
        let code = Asm::new(72)
            .push(2)
            .push(42)
            .push(1)
            .op(Op::StartScript)
            .byte(199)
            .end();
        start(&mut vm, code);
        assert_eq!(global(&vm, 30), 42);
        let index = vm.scripts().find(2)[0];
        let slot = vm.scripts().get(index).unwrap();
        assert!(slot.freeze_resistant && !slot.recursive);
    }

    #[test]
    fn only_recursive_starts_stack_up() {
        let twice = |flags: u8| {
            Asm::new(90)
                .push(2)
                .push(0)
                .op(Op::StartScript)
                .byte(flags)
                .push(2)
                .push(0)
                .op(Op::StartScript)
                .byte(flags)
                .end()
        };
        let mut vm = vm_with(90, &[(2, reporter(90, 30))]);
        start(&mut vm, twice(0));
        assert_eq!(vm.scripts().find(2).len(), 1);

        let mut vm = vm_with(90, &[(2, reporter(90, 30))]);
        start(&mut vm, twice(195));
        assert_eq!(vm.scripts().find(2).len(), 2);
    }

    #[test]
    fn jump_to_script_ends_the_caller() {
        let target = Asm::new(72).push(7).write_var(51).end();
        let mut vm = vm_with(72, &[(2, target)]);
        let code = Asm::new(72)
            .push(2)
            .push(0)
            .op(Op::JumpToScript)
            .byte(0)
            .push(99)
            .write_var(50)
            .end();
        start(&mut vm, code);
        assert_eq!(global(&vm, 51), 7);
        assert_eq!(global(&vm, 50), 0);
        assert!(!vm.is_script_running(1));
    }

    #[test]
    fn stop_script_zero_ends_the_current_one() {
        let code = Asm::new(72)
            .push(0)
            .op(Op::StopScript)
            .push(1)
            .write_var(50)
            .end();
        let mut vm = vm_with(72, &[]);
        start(&mut vm, code);
        assert_eq!(global(&vm, 50), 0);
        assert!(!vm.is_script_running(1));
    }

    #[test]
    fn priority_start_records_the_cycle() {
        let mut vm = vm_with(90, &[(2, reporter(90, 30)), (3, reporter(90, 31))]);
        let code = Asm::new(90)
            .push(2)
            .push(5)
            .push(0)
            .op(Op::PriorityStartScript)
            .byte(0)
            .push(3)
            .push(2)
            .push(0)
            .op(Op::PriorityStartScript)
            .byte(0)
            .end();
        start(&mut vm, code);
        let cycle = |vm: &Vm, number| {
            let index = vm.scripts().find(number)[0];
            vm.scripts().get(index).unwrap().cycle
        };
        assert_eq!(cycle(&vm, 2), 5);
        assert_eq!(cycle(&vm, 3), 2);
    }

    #[test]
    fn delay_pauses_until_the_clock_catches_up() {
        let code = Asm::new(72)
            .push(2)
            .op(Op::Delay)
            .push(1)
            .write_var(50)
            .end();
        let mut vm = vm_with(72, &[]);
        start(&mut vm, code);
        let index = vm.scripts().find(1)[0];
        assert_eq!(vm.scripts().get(index).unwrap().status, SlotStatus::Paused);

        vm.advance_clock(16_667);
        vm.run_all_scripts().unwrap();
        assert_eq!(global(&vm, 50), 0);

        vm.advance_clock(16_667);
        vm.run_all_scripts().unwrap();
        assert_eq!(global(&vm, 50), 1);
    }

    #[test]
    fn delay_frames_reruns_the_opcode() {
        let code = Asm::new(90)
            .push(3)
            .op(Op::DelayFrames)
            .push(1)
            .write_var(50)
            .end();
        let mut vm = vm_with(90, &[]);
        start(&mut vm, code);
        for _ in 0..2 {
            vm.run_all_scripts().unwrap();
            assert_eq!(global(&vm, 50), 0);
        }
        vm.run_all_scripts().unwrap();
        assert_eq!(global(&vm, 50), 1);
        assert!(vm.stack().is_empty());
    }

    #[test]
    fn freeze_respects_resistance_unless_forced() {
        let mut vm = vm_with(72, &[(2, ticker(72, 40)), (3, ticker(72, 41))]);
        vm.run_script(2, false, false, &[], 0).unwrap();
        vm.run_script(3, true, false, &[], 0).unwrap();

        start(&mut vm, Asm::new(72).push(1).op(Op::FreezeUnfreeze).end());
        vm.run_all_scripts().unwrap();
        assert_eq!((global(&vm, 40), global(&vm, 41)), (1, 2));

        start(&mut vm, Asm::new(72).push(0x80).op(Op::FreezeUnfreeze).end());
        vm.run_all_scripts().unwrap();
        assert_eq!((global(&vm, 40), global(&vm, 41)), (1, 2));

        start(&mut vm, Asm::new(72).push(0).op(Op::FreezeUnfreeze).end());
        vm.run_all_scripts().unwrap();
        assert_eq!((global(&vm, 40), global(&vm, 41)), (1, 3));
    }

    #[test]
    fn room_scripts_are_told_apart() {
        let mut vm = vm_with(72, &[(2, reporter(72, 30))]);
        let global_scripts = vm.global_scripts;
        vm.resources_mut().insert(
            crate::resource::ResourceType::Script,
            global_scripts + 1,
            reporter(72, 31),
        );
        vm.run_script(2, false, false, &[], 0).unwrap();
        vm.run_script(global_scripts + 1, false, false, &[], 0).unwrap();
        let code = Asm::new(72)
            .push(2)
            .op(Op::IsRoomScriptRunning)
            .write_var(50)
            .push(global_scripts + 1)
            .op(Op::IsRoomScriptRunning)
            .write_var(51)
            .push(2)
            .op(Op::IsScriptRunning)
            .write_var(52)
            .end();
        start(&mut vm, code);
        assert_eq!(
            [50, 51, 52].map(|var| global(&vm, var)),
            [0, 1, 1]
        );
    }
}
