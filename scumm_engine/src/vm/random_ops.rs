//! Random numbers and the pick/shuffle family.

use rand::Rng;

use super::Vm;
use crate::arrays::{ArrayKind, Rect};
use crate::error::{VmError, VmResult};
use crate::vars::well_known;

impl Vm {
    fn note_random(&mut self, value: i32) -> VmResult<()> {
        self.vars.set_scalar(well_known::RANDOM_NR, value);
        self.push(value)
    }

    /// `0..=|max|`.
    pub(super) fn random(&mut self) -> VmResult<()> {
        let max = self.pop()?.unsigned_abs();
        let value = self.rng.gen_range(0..=max) as i32;
        self.note_random(value)
    }

    pub(super) fn random_range(&mut self) -> VmResult<()> {
        let max = self.pop()?;
        let min = self.pop()?;
        let (low, high) = if min <= max { (min, max) } else { (max, min) };
        let value = self.rng.gen_range(low..=high);
        self.note_random(value)
    }

    pub(super) fn pick_one_of(&mut self, with_default: bool) -> VmResult<()> {
        let default = if with_default { Some(self.pop()?) } else { None };
        let list = self.pop_list(self.list_limit())?;
        let index = self.pop()?;
        let picked = usize::try_from(index).ok().and_then(|i| list.get(i)).copied();
        match (picked, default) {
            (Some(value), _) => self.push(value),
            (None, Some(default)) => self.push(default),
            (None, None) => Err(VmError::PickOutOfRange {
                index,
                max: list.len() as i32 - 1,
            }),
        }
    }

    pub(super) fn shuffle(&mut self) -> VmResult<()> {
        let to = self.pop()?;
        let from = self.pop()?;
        let var = self.fetch_u16()?;
        let id = self.array_of(var)?;
        self.arrays.shuffle(id, from, to, &mut self.rng)
    }

    /// Draw from a list without repeats. The deck lives in an array held by
    /// the variable named in the code stream: element 0 is the cursor and
    /// elements 1..=n the shuffled entries.
    pub(super) fn pick_var_random(&mut self) -> VmResult<()> {
        let list = self.pop_list(self.list_limit())?;
        let var = self.fetch_u16()?;
        let num = list.len() as i32;

        if self.read_var(var)?.is_zero() {
            let kind = if self.version >= 72 {
                ArrayKind::Dword
            } else {
                ArrayKind::Int
            };
            let id = self.define_array(var, kind, Rect::row(num))?;
            for (offset, &value) in list.iter().enumerate() {
                self.arrays.write(id, 0, offset as i32 + 1, value)?;
            }
            self.arrays.shuffle(id, 1, num, &mut self.rng)?;
            self.arrays.write(id, 0, 0, 2)?;
            let first = self.arrays.read(id, 0, 1)?;
            return self.push(first);
        }

        let id = self.array_of(var)?;
        let mut cursor = self.arrays.read(id, 0, 0)?;
        let last = self.arrays.get(id)?.dims().across_max;
        if last < cursor {
            let previous = self.arrays.read(id, 0, cursor - 1)?;
            self.arrays.shuffle(id, 1, last, &mut self.rng)?;
            cursor = 1;
            // A new deck must not open with the card that closed the old one.
            let opening = self.arrays.read(id, 0, 1)?;
            if last >= 3 && opening == previous {
                let second = self.arrays.read(id, 0, 2)?;
                self.arrays.write(id, 0, 1, second)?;
                self.arrays.write(id, 0, 2, opening)?;
            }
        }
        self.arrays.write(id, 0, 0, cursor + 1)?;
        let value = self.arrays.read(id, 0, cursor)?;
        self.push(value)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use crate::error::VmError;
    use crate::opcodes::Op;
    use crate::vars::well_known;
    use crate::vm::tests::{global, run, vm_with, Asm};

    #[test]
    fn random_stays_in_range_and_sets_the_var() {
        let mut asm = Asm::new(72);
        for var in 1..=20u16 {
            asm = asm.push(10).push(12).op(Op::RandomRange).write_var(var);
        }
        let vm = run(72, asm.end()).unwrap();
        for var in 1..=20u16 {
            assert!((10..=12).contains(&global(&vm, var)));
        }
        assert_eq!(global(&vm, well_known::RANDOM_NR), global(&vm, 20));
    }

    #[test]
    fn pick_one_of_checks_the_index() {
        let code = Asm::new(72)
            .push(1)
            .push(7)
            .push(8)
            .push(9)
            .push(3)
            .op(Op::PickOneOf)
            .write_var(1)
            .push(5)
            .push(7)
            .push(8)
            .push(2)
            .push(-1)
            .op(Op::PickOneOfDefault)
            .write_var(2)
            .end();
        let vm = run(72, code).unwrap();
        assert_eq!(global(&vm, 1), 8);
        assert_eq!(global(&vm, 2), -1);

        let code = Asm::new(72).push(3).push(7).push(1).op(Op::PickOneOf).end();
        let err = run(72, code).err().unwrap();
        assert_eq!(err.root(), &VmError::PickOutOfRange { index: 3, max: 0 });
    }

    fn draw_from(version: u16, cards: &[i32], draws: u16) -> Vec<u8> {
        let mut asm = Asm::new(version);
        for draw in 0..draws {
            for &card in cards {
                asm = asm.push(card);
            }
            asm = asm
                .push(cards.len() as i32)
                .op(Op::PickVarRandom)
                .word(100)
                .write_var(200 + draw);
        }
        asm.end()
    }

    fn draw_program(version: u16, draws: u16) -> Vec<u8> {
        draw_from(version, &[10, 20, 30, 40], draws)
    }

    fn seeded_draws(version: u16, cards: &[i32], draws: u16, seed: u64) -> Vec<i32> {
        let mut vm = vm_with(version, &[(1, draw_from(version, cards, draws))]);
        vm.rng = rand::SeedableRng::seed_from_u64(seed);
        vm.run_script(1, false, false, &[], 0).unwrap();
        (0..draws).map(|draw| global(&vm, 200 + draw)).collect()
    }

    #[test]
    fn pick_var_random_deals_a_full_deck_before_repeating() {
        for version in [60, 90] {
            let vm = run(version, draw_program(version, 9)).unwrap();
            let draws: Vec<i32> = (0..9).map(|draw| global(&vm, 200 + draw)).collect();
            let first: BTreeSet<i32> = draws[..4].iter().copied().collect();
            assert_eq!(first, BTreeSet::from([10, 20, 30, 40]), "HE {version}");
            assert!(draws.iter().all(|draw| first.contains(draw)));
            let second: BTreeSet<i32> = draws[4..8].iter().copied().collect();
            assert_eq!(second, first, "HE {version}: {draws:?}");
            for pair in draws.windows(2) {
                assert_ne!(pair[0], pair[1], "HE {version}: {draws:?}");
            }
        }
    }

    #[test]
    fn every_deck_deals_each_card_once() {
        let cards = [10, 20, 30];
        for seed in 0..200 {
            let draws = seeded_draws(90, &cards, 9, seed);
            for deck in draws.chunks(3) {
                let dealt: BTreeSet<i32> = deck.iter().copied().collect();
                assert_eq!(dealt, BTreeSet::from(cards), "seed {seed}: {draws:?}");
            }
            for pair in draws.windows(2) {
                assert_ne!(pair[0], pair[1], "seed {seed}: {draws:?}");
            }
        }
    }

    #[test]
    fn single_card_deck_keeps_dealing_it() {
        for version in [60, 90] {
            assert_eq!(seeded_draws(version, &[42], 3, 7), vec![42, 42, 42]);
        }
    }

    #[test]
    fn reshuffles_vary_over_trials() {
        let mut openings = BTreeSet::new();
        for seed in 0..64 {
            let mut vm = vm_with(90, &[(1, draw_program(90, 1))]);
            vm.rng = rand::SeedableRng::seed_from_u64(seed);
            vm.run_script(1, false, false, &[], 0).unwrap();
            openings.insert(global(&vm, 200));
        }
        assert_eq!(openings.len(), 4);
    }
}
