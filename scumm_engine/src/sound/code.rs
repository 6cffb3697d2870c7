//! Runtime for the timed operations embedded in sound resources.
//!
//! Opcode families: 0 nop, 16 talk state, 32 set, 48 add, 56 sub, 64 mul,
//! 80 div, 96 inc, 104 dec. Bit 1 set on an opcode means the value field
//! names a sound variable instead of holding a literal.

use log::warn;
use rand::Rng;
use scumm_formats::SoundCodeOp;

use super::NUM_SOUND_VARS;

pub const OP_NOP: u16 = 0;
pub const OP_TALK_STATE: u16 = 16;
pub const OP_SET: u16 = 32;
pub const OP_ADD: u16 = 48;
pub const OP_SUB: u16 = 56;
pub const OP_MUL: u16 = 64;
pub const OP_DIV: u16 = 80;
pub const OP_INC: u16 = 96;
pub const OP_DEC: u16 = 104;
pub const OP_INDIRECT: u16 = 2;

/// Sound variable holding the mouth shape for talkie lip-sync.
pub const TALK_STATE_VAR: usize = 19;
pub const TALK_STATE_MAX: i32 = 13;

/// Observable side effect of running sound code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodeEffect {
    TalkState(i32),
}

/// Execute `ops` against a channel's variables.
pub fn run_ops<R: Rng + ?Sized>(
    sound: i32,
    ops: &[SoundCodeOp],
    vars: &mut [i32; NUM_SOUND_VARS],
    rng: &mut R,
) -> Vec<CodeEffect> {
    let mut effects = Vec::new();
    for op in ops {
        let family = op.opcode & !OP_INDIRECT;
        let value = if op.opcode & OP_INDIRECT != 0 {
            match vars.get(op.value as usize) {
                Some(&value) if op.value >= 0 => value,
                _ => {
                    warn!("sound {sound}: indirect read of invalid var {}", op.value);
                    continue;
                }
            }
        } else {
            op.value as i32
        };

        if family == OP_NOP {
            continue;
        }
        if family == OP_TALK_STATE {
            let state = if value <= 0 {
                rng.gen_range(1..=10)
            } else {
                value.min(TALK_STATE_MAX)
            };
            vars[TALK_STATE_VAR] = state;
            effects.push(CodeEffect::TalkState(state));
            continue;
        }

        let Some(slot) = vars.get_mut(op.var as usize) else {
            warn!("sound {sound}: sound code writes invalid var {}", op.var);
            continue;
        };
        match family {
            OP_SET => *slot = value,
            OP_ADD => *slot = slot.wrapping_add(value),
            OP_SUB => *slot = slot.wrapping_sub(value),
            OP_MUL => *slot = slot.wrapping_mul(value),
            OP_DIV => {
                let divisor = if value == 0 {
                    warn!("sound {sound}: divide by zero in sound code");
                    1
                } else {
                    value
                };
                *slot = slot.wrapping_div(divisor);
            }
            OP_INC => *slot = slot.wrapping_add(1),
            OP_DEC => *slot = slot.wrapping_sub(1),
            other => warn!("sound {sound}: unknown sound code op {other}"),
        }
    }
    effects
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn op(opcode: u16, var: u16, value: i16) -> SoundCodeOp {
        SoundCodeOp { opcode, var, value }
    }

    #[test]
    fn arithmetic_updates_vars() {
        let mut vars = [0; NUM_SOUND_VARS];
        let mut rng = StdRng::seed_from_u64(1);
        run_ops(
            5,
            &[
                op(OP_SET, 3, 10),
                op(OP_ADD, 3, 5),
                op(OP_MUL, 3, 2),
                op(OP_SUB, 3, 6),
                op(OP_INC, 4, 0),
                op(OP_SET | OP_INDIRECT, 5, 3),
                op(OP_DIV, 5, 0),
            ],
            &mut vars,
            &mut rng,
        );
        assert_eq!(vars[3], 24);
        assert_eq!(vars[4], 1);
        assert_eq!(vars[5], 24);
    }

    #[test]
    fn talk_state_is_clamped_or_randomised() {
        let mut vars = [0; NUM_SOUND_VARS];
        let mut rng = StdRng::seed_from_u64(9);
        let effects = run_ops(1, &[op(OP_TALK_STATE, 0, 40)], &mut vars, &mut rng);
        assert_eq!(effects, vec![CodeEffect::TalkState(TALK_STATE_MAX)]);

        let effects = run_ops(1, &[op(OP_TALK_STATE, 0, -1)], &mut vars, &mut rng);
        let CodeEffect::TalkState(state) = effects[0];
        assert!((1..=10).contains(&state));
        assert_eq!(vars[TALK_STATE_VAR], state);
    }

    #[test]
    fn invalid_vars_are_skipped() {
        let mut vars = [0; NUM_SOUND_VARS];
        let mut rng = StdRng::seed_from_u64(1);
        run_ops(1, &[op(OP_SET, 99, 1), op(OP_SET, 0, 7)], &mut vars, &mut rng);
        assert_eq!(vars[0], 7);
    }
}
