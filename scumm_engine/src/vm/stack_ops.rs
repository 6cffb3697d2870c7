//! Operand stack, arithmetic, variables and single-element array access.

use super::{math, Vm};
use crate::error::{VmError, VmResult};
use crate::opcodes::subops::{he100, he72};
use crate::opcodes::Dialect;
use crate::value::ArrayId;

impl Vm {
    /// Longest operand list an opcode may pop.
    pub(super) fn list_limit(&self) -> usize {
        if self.version >= 72 {
            128
        } else {
            100
        }
    }

    pub(super) fn push_var(&mut self, var: u16) -> VmResult<()> {
        let value = self.read_var_raw(var)?;
        self.push(value)
    }

    pub(super) fn dup(&mut self) -> VmResult<()> {
        let top = self.stack.peek()?;
        self.push(top)
    }

    /// Duplicate the top `n` entries, `n` taken from the code stream.
    pub(super) fn dup_n(&mut self) -> VmResult<()> {
        let count = self.fetch_u16()? as i32;
        self.push(count)?;
        let list = self.pop_list(16)?;
        for _ in 0..2 {
            for &value in &list {
                self.push(value)?;
            }
        }
        Ok(())
    }

    pub(super) fn unary(&mut self, f: impl FnOnce(i32) -> VmResult<i32>) -> VmResult<()> {
        let a = self.pop()?;
        let result = f(a)?;
        self.push(result)
    }

    /// Pop `a`, then `b`, and push `f(b, a)`.
    pub(super) fn binary(&mut self, f: impl FnOnce(i32, i32) -> VmResult<i32>) -> VmResult<()> {
        let a = self.pop()?;
        let b = self.pop()?;
        let result = f(b, a)?;
        self.push(result)
    }

    pub(super) fn cond(&mut self) -> VmResult<()> {
        let a = self.pop()?;
        let b = self.pop()?;
        let c = self.pop()?;
        self.push(if c != 0 { b } else { a })
    }

    pub(super) fn is_any_of(&mut self) -> VmResult<()> {
        let list = self.pop_list(self.list_limit())?;
        let value = self.pop()?;
        self.push(list.contains(&value) as i32)
    }

    pub(super) fn angle_from_delta(&mut self) -> VmResult<()> {
        let dy = self.pop()?;
        let dx = self.pop()?;
        self.push(math::angle(dx, dy))
    }

    pub(super) fn angle_from_line(&mut self) -> VmResult<()> {
        let y2 = self.pop()?;
        let x2 = self.pop()?;
        let y1 = self.pop()?;
        let x1 = self.pop()?;
        self.push(math::angle(x2.wrapping_sub(x1), y2.wrapping_sub(y1)))
    }

    pub(super) fn distance(&mut self) -> VmResult<()> {
        let subop = self.fetch_subop()?;
        let (two_d, three_d) = match self.dialect {
            Dialect::He100 => (he100::DIST_2D, he100::DIST_3D),
            _ => (he72::DIST_2D, he72::DIST_3D),
        };
        let axes = if subop == two_d {
            2
        } else if subop == three_d {
            3
        } else {
            return Err(VmError::InvalidSubOp {
                op: "distance",
                subop,
            });
        };
        // popped as (second point, first point), last axis first
        let mut second = vec![0; axes];
        let mut first = vec![0; axes];
        for value in second.iter_mut().rev() {
            *value = self.pop()?;
        }
        for value in first.iter_mut().rev() {
            *value = self.pop()?;
        }
        let deltas: Vec<i32> = second
            .iter()
            .zip(&first)
            .map(|(b, a)| b.wrapping_sub(*a))
            .collect();
        self.push(math::distance(&deltas))
    }

    pub(super) fn write_var_from_stack(&mut self, var: u16) -> VmResult<()> {
        let value = self.pop()?;
        self.write_var_raw(var, value)
    }

    pub(super) fn add_to_var(&mut self, var: u16, delta: i32) -> VmResult<()> {
        let value = self.read_var_raw(var)?;
        self.write_var_raw(var, value.wrapping_add(delta))
    }

    /// Array held in variable `var`.
    pub(super) fn array_of(&self, var: u16) -> VmResult<ArrayId> {
        self.read_var(var)?.array_id(self.version)
    }

    pub(super) fn array_read(&mut self, var: u16, indexed: bool) -> VmResult<()> {
        let across = self.pop()?;
        let down = if indexed { self.pop()? } else { 0 };
        let id = self.array_of(var)?;
        let value = self.arrays.read(id, down, across)?;
        self.push(value)
    }

    pub(super) fn array_write(&mut self, var: u16, indexed: bool) -> VmResult<()> {
        let value = self.pop()?;
        let across = self.pop()?;
        let down = if indexed { self.pop()? } else { 0 };
        let id = self.array_of(var)?;
        self.arrays.write(id, down, across, value)
    }

    pub(super) fn array_add(&mut self, var: u16, delta: i32) -> VmResult<()> {
        let across = self.pop()?;
        let id = self.array_of(var)?;
        let value = self.arrays.read(id, 0, across)?;
        self.arrays.write(id, 0, across, value.wrapping_add(delta))
    }

    /// `if`/`ifNot`: the offset is always consumed.
    pub(super) fn branch(&mut self, when: bool) -> VmResult<()> {
        let offset = self.fetch_i16()?;
        let condition = self.pop()? != 0;
        if condition == when {
            self.current_slot_mut()?.jump(offset)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::error::VmError;
    use crate::opcodes::Op;
    use crate::vm::tests::{global, run, Asm};

    #[test]
    fn comparisons_use_push_order() {
        let code = Asm::new(72)
            .push(3)
            .push(5)
            .op(Op::Lt)
            .write_var(1)
            .push(3)
            .push(5)
            .op(Op::Ge)
            .write_var(2)
            .push(-7)
            .op(Op::Abs)
            .write_var(3)
            .end();
        let vm = run(72, code).unwrap();
        assert_eq!(global(&vm, 1), 1);
        assert_eq!(global(&vm, 2), 0);
        assert_eq!(global(&vm, 3), 7);
    }

    #[test]
    fn he90_math_family() {
        let code = Asm::new(90)
            .push(17)
            .push(5)
            .op(Op::Mod)
            .write_var(1)
            .push(1)
            .push(4)
            .op(Op::Shl)
            .write_var(2)
            .push(0)
            .push(11)
            .push(22)
            .op(Op::Cond)
            .write_var(3)
            .push(9)
            .push(4)
            .op(Op::Min)
            .write_var(4)
            .push(0)
            .push(0)
            .push(3)
            .push(4)
            .op(Op::Distance)
            .byte(28)
            .write_var(5)
            .push(0)
            .push(0)
            .push(0)
            .push(10)
            .op(Op::AngleFromLine)
            .write_var(6)
            .end();
        let vm = run(90, code).unwrap();
        assert_eq!(global(&vm, 1), 2);
        assert_eq!(global(&vm, 2), 16);
        assert_eq!(global(&vm, 3), 22);
        assert_eq!(global(&vm, 4), 4);
        assert_eq!(global(&vm, 5), 5);
        assert_eq!(global(&vm, 6), 90);
    }

    #[test]
    fn dup_n_repeats_the_top_entries() {
        let code = Asm::new(90)
            .push(1)
            .push(2)
            .op(Op::DupN)
            .word(2)
            .write_var(4)
            .write_var(3)
            .write_var(2)
            .write_var(1)
            .end();
        let vm = run(90, code).unwrap();
        assert_eq!(
            [1, 2, 3, 4].map(|var| global(&vm, var)),
            [1, 2, 1, 2]
        );
    }

    #[test]
    fn is_any_of_scans_the_list() {
        let code = Asm::new(60)
            .push(4)
            .push(1)
            .push(4)
            .push(9)
            .push(3)
            .op(Op::IsAnyOf)
            .write_var(1)
            .end();
        let vm = run(60, code).unwrap();
        assert_eq!(global(&vm, 1), 1);
    }

    #[test]
    fn branches_skip_forward() {
        // if (0) skips the next push/write pair
        let skipped = Asm::new(72).push(42).write_var(1).code.len() as u16;
        let code = Asm::new(72)
            .push(0)
            .op(Op::If)
            .word(skipped)
            .push(42)
            .write_var(1)
            .push(0)
            .op(Op::IfNot)
            .word(skipped)
            .push(42)
            .write_var(2)
            .end();
        let vm = run(72, code).unwrap();
        assert_eq!(global(&vm, 1), 42);
        assert_eq!(global(&vm, 2), 0);
    }

    #[test]
    fn stack_underflow_is_fatal() {
        let code = Asm::new(72).op(Op::Add).end();
        let err = run(72, code).err().unwrap();
        assert_eq!(err.root(), &VmError::StackUnderflow);
    }
}
