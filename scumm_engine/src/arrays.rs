//! Typed 2-D arrays addressed by small integer handles.
//!
//! Every array is a rectangle `[down_min..=down_max][across_min..=across_max]`
//! stored row-major. Element `(down, across)` lives at
//! `(across_max - across_min + 1) * (down - down_min) + (across - across_min)`.

use std::fmt;

use rand::seq::SliceRandom;
use rand::Rng;
use serde::Serialize;

use crate::error::{VmError, VmResult};
use crate::value::ArrayId;

/// Element type as encoded in the array header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ArrayKind {
    Bit = 1,
    Nibble = 2,
    Byte = 3,
    String = 4,
    Int = 5,
    Dword = 6,
}

impl ArrayKind {
    pub fn from_code(code: i32) -> VmResult<Self> {
        Ok(match code {
            1 => ArrayKind::Bit,
            2 => ArrayKind::Nibble,
            3 => ArrayKind::Byte,
            4 => ArrayKind::String,
            5 => ArrayKind::Int,
            6 => ArrayKind::Dword,
            other => return Err(VmError::InvalidArrayType(other)),
        })
    }

    pub fn code(self) -> i32 {
        self as i32
    }

    /// Bit and nibble arrays are stored one element per byte.
    pub fn storage(self) -> ArrayKind {
        match self {
            ArrayKind::Bit | ArrayKind::Nibble => ArrayKind::Byte,
            other => other,
        }
    }

    pub fn element_size(self) -> usize {
        match self.storage() {
            ArrayKind::Int => 2,
            ArrayKind::Dword => 4,
            _ => 1,
        }
    }

    /// Narrow `value` to what this element type can hold.
    pub fn store_truncated(self, value: i32) -> i32 {
        match self.storage() {
            ArrayKind::Int => value as i16 as i32,
            ArrayKind::Dword => value,
            _ => value as u8 as i32,
        }
    }
}

/// Largest backing store a single array may have.
pub const MAX_ARRAY_BYTES: usize = 64 << 20;

fn span(min: i32, max: i32) -> usize {
    (i64::from(max) - i64::from(min) + 1).max(0) as usize
}

fn checked_size(kind: ArrayKind, dims: &Rect) -> VmResult<usize> {
    if dims.down_min < 0 || dims.across_min < 0 || !dims.is_ordered() {
        return Err(VmError::InvalidDims(dims.to_string()));
    }
    dims.storage_bytes(kind)
        .ok_or_else(|| VmError::InvalidDims(dims.to_string()))
}

/// Inclusive rectangle of array indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Rect {
    pub down_min: i32,
    pub down_max: i32,
    pub across_min: i32,
    pub across_max: i32,
}

impl Rect {
    pub fn new(down_min: i32, down_max: i32, across_min: i32, across_max: i32) -> Self {
        Rect {
            down_min,
            down_max,
            across_min,
            across_max,
        }
    }

    /// Single row `[0][0..=across_max]`.
    pub fn row(across_max: i32) -> Self {
        Rect::new(0, 0, 0, across_max)
    }

    pub fn rows(&self) -> usize {
        span(self.down_min, self.down_max)
    }

    pub fn cols(&self) -> usize {
        span(self.across_min, self.across_max)
    }

    pub fn len(&self) -> usize {
        self.rows().saturating_mul(self.cols())
    }

    /// Bytes needed to store this rectangle as `kind`, if that fits under
    /// [`MAX_ARRAY_BYTES`].
    pub fn storage_bytes(&self, kind: ArrayKind) -> Option<usize> {
        self.rows()
            .checked_mul(self.cols())?
            .checked_mul(kind.element_size())
            .filter(|&bytes| bytes <= MAX_ARRAY_BYTES)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn same_shape(&self, other: &Rect) -> bool {
        self.rows() == other.rows() && self.cols() == other.cols()
    }

    pub fn is_ordered(&self) -> bool {
        self.down_min <= self.down_max && self.across_min <= self.across_max
    }

    pub fn contains(&self, other: &Rect) -> bool {
        other.down_min >= self.down_min
            && other.down_max <= self.down_max
            && other.across_min >= self.across_min
            && other.across_max <= self.across_max
    }

    /// Cells in row-major order.
    pub fn cells(&self) -> impl Iterator<Item = (i32, i32)> + '_ {
        (self.down_min..=self.down_max)
            .flat_map(move |down| (self.across_min..=self.across_max).map(move |across| (down, across)))
    }
}

impl fmt::Display for Rect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}..{}][{}..{}]",
            self.down_min, self.down_max, self.across_min, self.across_max
        )
    }
}

/// Element-wise operation for [`ArrayStore::block_op`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockOp {
    Add,
    Sub,
    And,
    Or,
    Xor,
}

impl BlockOp {
    pub fn from_code(code: i32) -> VmResult<Self> {
        Ok(match code {
            1 => BlockOp::Add,
            2 => BlockOp::Sub,
            3 => BlockOp::And,
            4 => BlockOp::Or,
            5 => BlockOp::Xor,
            other => return Err(VmError::InvalidMathOp(other)),
        })
    }

    fn apply(self, lhs: i32, rhs: i32) -> i32 {
        match self {
            BlockOp::Add => lhs.wrapping_add(rhs),
            BlockOp::Sub => lhs.wrapping_sub(rhs),
            BlockOp::And => lhs & rhs,
            BlockOp::Or => lhs | rhs,
            BlockOp::Xor => lhs ^ rhs,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Array {
    /// Storage type; bit and nibble arrays hold bytes.
    kind: ArrayKind,
    declared: ArrayKind,
    dims: Rect,
    /// Script slot that frees this array when it finishes.
    owner: Option<usize>,
    #[serde(skip)]
    data: Vec<u8>,
}

impl Array {
    fn new(kind: ArrayKind, dims: Rect, bytes: usize) -> Self {
        Array {
            kind: kind.storage(),
            declared: kind,
            dims,
            owner: None,
            data: vec![0; bytes],
        }
    }

    pub fn kind(&self) -> ArrayKind {
        self.kind
    }

    /// Type the script asked for when it defined the array.
    pub fn declared_kind(&self) -> ArrayKind {
        self.declared
    }

    pub fn dims(&self) -> Rect {
        self.dims
    }

    pub fn owner(&self) -> Option<usize> {
        self.owner
    }

    pub fn byte_len(&self) -> usize {
        self.data.len()
    }

    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    /// Bytes up to (not including) the first NUL.
    pub fn c_string(&self) -> &[u8] {
        let end = self.data.iter().position(|&b| b == 0).unwrap_or(self.data.len());
        &self.data[..end]
    }

    fn index(&self, down: i32, across: i32) -> Option<usize> {
        let dims = &self.dims;
        if down < dims.down_min
            || down > dims.down_max
            || across < dims.across_min
            || across > dims.across_max
        {
            return None;
        }
        let pitch = dims.cols();
        Some(pitch * (down - dims.down_min) as usize + (across - dims.across_min) as usize)
    }

    fn load(&self, index: usize) -> i32 {
        match self.kind.element_size() {
            1 => self.data[index] as i32,
            2 => {
                let at = index * 2;
                i16::from_le_bytes([self.data[at], self.data[at + 1]]) as i32
            }
            _ => {
                let at = index * 4;
                i32::from_le_bytes([
                    self.data[at],
                    self.data[at + 1],
                    self.data[at + 2],
                    self.data[at + 3],
                ])
            }
        }
    }

    fn store(&mut self, index: usize, value: i32) {
        match self.kind.element_size() {
            1 => self.data[index] = value as u8,
            2 => {
                let at = index * 2;
                self.data[at..at + 2].copy_from_slice(&(value as i16).to_le_bytes());
            }
            _ => {
                let at = index * 4;
                self.data[at..at + 4].copy_from_slice(&value.to_le_bytes());
            }
        }
    }

    pub fn get(&self, down: i32, across: i32) -> Option<i32> {
        self.index(down, across).map(|index| self.load(index))
    }

    fn row_bytes(&self, down: i32, across_min: i32, cols: usize) -> std::ops::Range<usize> {
        let size = self.kind.element_size();
        let start = self.index(down, across_min).unwrap_or(0) * size;
        start..start + cols * size
    }
}

/// Fixed-capacity table of arrays. Handle 0 is reserved.
#[derive(Debug, Clone, Default)]
pub struct ArrayStore {
    slots: Vec<Option<Array>>,
}

impl ArrayStore {
    pub fn new(capacity: usize) -> Self {
        ArrayStore {
            slots: vec![None; capacity + 1],
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len().saturating_sub(1)
    }

    /// Allocate a zero-filled array in the lowest free slot.
    pub fn allocate(&mut self, kind: ArrayKind, dims: Rect) -> VmResult<ArrayId> {
        let bytes = checked_size(kind, &dims)?;
        let slot = (1..self.slots.len())
            .find(|&id| self.slots[id].is_none())
            .ok_or(VmError::OutOfArrays(self.capacity()))?;
        self.slots[slot] = Some(Array::new(kind, dims, bytes));
        Ok(slot as ArrayId)
    }

    pub fn nuke(&mut self, id: ArrayId) {
        if let Some(slot) = self.slots.get_mut(id as usize) {
            *slot = None;
        }
    }

    /// Tie `id` to a script slot so it is released with that script.
    pub fn localize(&mut self, id: ArrayId, slot: usize) -> VmResult<()> {
        self.get_mut(id)?.owner = Some(slot);
        Ok(())
    }

    /// Free every array owned by `slot`. Returns how many were released.
    pub fn nuke_owned_by(&mut self, slot: usize) -> usize {
        let mut freed = 0;
        for entry in self.slots.iter_mut() {
            if entry.as_ref().is_some_and(|array| array.owner == Some(slot)) {
                *entry = None;
                freed += 1;
            }
        }
        freed
    }

    pub fn num_free(&self) -> usize {
        self.slots.iter().skip(1).filter(|slot| slot.is_none()).count()
    }

    pub fn contains(&self, id: ArrayId) -> bool {
        matches!(self.slots.get(id as usize), Some(Some(_)))
    }

    pub fn get(&self, id: ArrayId) -> VmResult<&Array> {
        if id == 0 {
            return Err(VmError::ZeroArray);
        }
        self.slots
            .get(id as usize)
            .and_then(|slot| slot.as_ref())
            .ok_or(VmError::InvalidArray(id as i32))
    }

    fn get_mut(&mut self, id: ArrayId) -> VmResult<&mut Array> {
        if id == 0 {
            return Err(VmError::ZeroArray);
        }
        self.slots
            .get_mut(id as usize)
            .and_then(|slot| slot.as_mut())
            .ok_or(VmError::InvalidArray(id as i32))
    }

    pub fn iter(&self) -> impl Iterator<Item = (ArrayId, &Array)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(id, slot)| slot.as_ref().map(|array| (id as ArrayId, array)))
    }

    pub fn read(&self, id: ArrayId, down: i32, across: i32) -> VmResult<i32> {
        let array = self.get(id)?;
        array.get(down, across).ok_or_else(|| VmError::ArrayBounds {
            id: id as i32,
            down,
            across,
            dims: array.dims.to_string(),
        })
    }

    pub fn write(&mut self, id: ArrayId, down: i32, across: i32, value: i32) -> VmResult<()> {
        let array = self.get_mut(id)?;
        let index = array.index(down, across).ok_or_else(|| VmError::ArrayBounds {
            id: id as i32,
            down,
            across,
            dims: array.dims.to_string(),
        })?;
        array.store(index, value);
        Ok(())
    }

    /// Reinterpret an array under new bounds and type. The byte size must
    /// not change.
    pub fn redim(&mut self, id: ArrayId, kind: ArrayKind, dims: Rect) -> VmResult<()> {
        let new = checked_size(kind, &dims)?;
        let array = self.get_mut(id)?;
        if new != array.data.len() {
            return Err(VmError::RedimMismatch {
                id: id as i32,
                old: array.data.len(),
                new,
            });
        }
        array.kind = kind.storage();
        array.declared = kind;
        array.dims = dims;
        Ok(())
    }

    /// Validate that `rect` is ordered and inside the array's bounds.
    pub fn check_limits(&self, id: ArrayId, rect: &Rect) -> VmResult<()> {
        let array = self.get(id)?;
        if !rect.is_ordered() || !array.dims.contains(rect) {
            return Err(VmError::InvalidLimits(format!(
                "{rect} for array {id} {}",
                array.dims
            )));
        }
        Ok(())
    }

    /// Copy `src_rect` of `src` into `dst_rect` of `dst`. Overlapping
    /// regions of the same array copy as if through a temporary buffer.
    pub fn copy_block(&mut self, dst: ArrayId, dst_rect: Rect, src: ArrayId, src_rect: Rect) -> VmResult<()> {
        self.check_limits(dst, &dst_rect)?;
        self.check_limits(src, &src_rect)?;
        if !dst_rect.same_shape(&src_rect) {
            return Err(VmError::ShapeMismatch(dst_rect.to_string(), src_rect.to_string()));
        }

        let rows = dst_rect.rows() as i32;
        let cols = dst_rect.cols();

        if dst == src {
            let array = self.get_mut(dst)?;
            let forward = dst_rect.down_min <= src_rect.down_min;
            for step in 0..rows {
                let row = if forward { step } else { rows - 1 - step };
                let from = array.row_bytes(src_rect.down_min + row, src_rect.across_min, cols);
                let to = array.row_bytes(dst_rect.down_min + row, dst_rect.across_min, cols);
                array.data.copy_within(from, to.start);
            }
            return Ok(());
        }

        let src_kind = self.get(src)?.kind;
        let dst_kind = self.get(dst)?.kind;
        if src_kind == dst_kind {
            let rows_data: Vec<Vec<u8>> = {
                let array = self.get(src)?;
                (0..rows)
                    .map(|row| array.data[array.row_bytes(src_rect.down_min + row, src_rect.across_min, cols)].to_vec())
                    .collect()
            };
            let array = self.get_mut(dst)?;
            for (row, bytes) in rows_data.iter().enumerate() {
                let range = array.row_bytes(dst_rect.down_min + row as i32, dst_rect.across_min, cols);
                array.data[range].copy_from_slice(bytes);
            }
        } else {
            let values = self.snapshot(src, &src_rect)?;
            self.fill_rect(dst, &dst_rect, &values)?;
        }
        Ok(())
    }

    /// `dst[i] = a2[i] OP a1[i]` over three same-shaped rectangles. Operands
    /// are read in full before anything is written.
    pub fn block_op(
        &mut self,
        dst: (ArrayId, Rect),
        a1: (ArrayId, Rect),
        a2: (ArrayId, Rect),
        op: BlockOp,
    ) -> VmResult<()> {
        for (id, rect) in [&dst, &a1, &a2] {
            self.check_limits(*id, rect)?;
        }
        if !dst.1.same_shape(&a1.1) {
            return Err(VmError::ShapeMismatch(dst.1.to_string(), a1.1.to_string()));
        }
        if !dst.1.same_shape(&a2.1) {
            return Err(VmError::ShapeMismatch(dst.1.to_string(), a2.1.to_string()));
        }

        let lhs = self.snapshot(a2.0, &a2.1)?;
        let rhs = self.snapshot(a1.0, &a1.1)?;
        let values: Vec<i32> = lhs.iter().zip(&rhs).map(|(&l, &r)| op.apply(l, r)).collect();
        self.fill_rect(dst.0, &dst.1, &values)
    }

    fn snapshot(&self, id: ArrayId, rect: &Rect) -> VmResult<Vec<i32>> {
        rect.cells().map(|(down, across)| self.read(id, down, across)).collect()
    }

    fn fill_rect(&mut self, id: ArrayId, rect: &Rect, values: &[i32]) -> VmResult<()> {
        for ((down, across), &value) in rect.cells().zip(values) {
            self.write(id, down, across, value)?;
        }
        Ok(())
    }

    /// Permute row 0 across `from..=to` in place.
    pub fn shuffle<R: Rng + ?Sized>(&mut self, id: ArrayId, from: i32, to: i32, rng: &mut R) -> VmResult<()> {
        if to < from {
            return Ok(());
        }
        let rect = Rect::new(0, 0, from, to);
        self.check_limits(id, &rect)?;
        let mut values = self.snapshot(id, &rect)?;
        values.shuffle(rng);
        self.fill_rect(id, &rect, &values)
    }

    /// Stable sort of rows `down_min..=down_max` keyed on the single column
    /// `rect.across_min`. `order <= 0` sorts ascending.
    pub fn sort_rows(&mut self, id: ArrayId, rect: Rect, order: i32) -> VmResult<()> {
        if rect.across_min != rect.across_max {
            return Err(VmError::SortColumn(id as i32));
        }
        self.check_limits(id, &rect)?;
        let array = self.get_mut(id)?;
        let dims = array.dims;
        let full = Rect::new(rect.down_min, rect.down_max, dims.across_min, dims.across_max);
        let cols = full.cols();

        let mut rows: Vec<(i32, Vec<u8>)> = (rect.down_min..=rect.down_max)
            .map(|down| {
                let key = array.get(down, rect.across_min).unwrap_or(0);
                let range = array.row_bytes(down, dims.across_min, cols);
                (key, array.data[range].to_vec())
            })
            .collect();
        if order <= 0 {
            rows.sort_by_key(|(key, _)| *key);
        } else {
            rows.sort_by(|a, b| b.0.cmp(&a.0));
        }
        for (offset, (_, bytes)) in rows.into_iter().enumerate() {
            let range = array.row_bytes(rect.down_min + offset as i32, dims.across_min, cols);
            array.data[range].copy_from_slice(&bytes);
        }
        Ok(())
    }

    /// NUL-terminated contents of a string array.
    pub fn c_string(&self, id: ArrayId) -> VmResult<Vec<u8>> {
        Ok(self.get(id)?.c_string().to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn row_values(store: &ArrayStore, id: ArrayId, down: i32) -> Vec<i32> {
        let dims = store.get(id).unwrap().dims();
        (dims.across_min..=dims.across_max)
            .map(|across| store.read(id, down, across).unwrap())
            .collect()
    }

    #[test]
    fn int_array_round_trip_and_bounds() {
        let mut store = ArrayStore::new(8);
        let id = store.allocate(ArrayKind::Int, Rect::row(9)).unwrap();
        store.write(id, 0, 3, 1234).unwrap();
        assert_eq!(store.read(id, 0, 3).unwrap(), 1234);
        assert!(matches!(
            store.read(id, 0, 10),
            Err(VmError::ArrayBounds { across: 10, .. })
        ));
    }

    #[test]
    fn writes_truncate_to_element_type() {
        let mut store = ArrayStore::new(4);
        let bytes = store.allocate(ArrayKind::Byte, Rect::row(1)).unwrap();
        let ints = store.allocate(ArrayKind::Int, Rect::row(1)).unwrap();
        store.write(bytes, 0, 0, 0x1ff).unwrap();
        store.write(bytes, 0, 1, -1).unwrap();
        store.write(ints, 0, 0, 0x18000).unwrap();
        assert_eq!(store.read(bytes, 0, 0).unwrap(), 0xff);
        assert_eq!(store.read(bytes, 0, 1).unwrap(), 0xff);
        assert_eq!(store.read(ints, 0, 0).unwrap(), -32768);
    }

    #[test]
    fn bit_arrays_use_byte_storage() {
        let mut store = ArrayStore::new(2);
        let id = store.allocate(ArrayKind::Bit, Rect::row(3)).unwrap();
        assert_eq!(store.get(id).unwrap().kind(), ArrayKind::Byte);
        assert_eq!(store.get(id).unwrap().byte_len(), 4);
    }

    #[test]
    fn allocation_uses_lowest_free_slot_and_runs_out() {
        let mut store = ArrayStore::new(2);
        let a = store.allocate(ArrayKind::Byte, Rect::row(0)).unwrap();
        let b = store.allocate(ArrayKind::Byte, Rect::row(0)).unwrap();
        assert_eq!((a, b), (1, 2));
        assert_eq!(
            store.allocate(ArrayKind::Byte, Rect::row(0)),
            Err(VmError::OutOfArrays(2))
        );
        store.nuke(a);
        assert_eq!(store.num_free(), 1);
        assert_eq!(store.allocate(ArrayKind::Dword, Rect::row(0)).unwrap(), 1);
    }

    #[test]
    fn localized_arrays_die_with_their_script() {
        let mut store = ArrayStore::new(4);
        let kept = store.allocate(ArrayKind::Int, Rect::row(3)).unwrap();
        let local = store.allocate(ArrayKind::Int, Rect::row(3)).unwrap();
        store.localize(local, 5).unwrap();
        assert_eq!(store.get(local).unwrap().owner(), Some(5));
        assert_eq!(store.nuke_owned_by(4), 0);
        assert_eq!(store.nuke_owned_by(5), 1);
        assert!(store.contains(kept));
        assert!(!store.contains(local));
        assert_eq!(store.localize(local, 5), Err(VmError::InvalidArray(local as i32)));
    }

    #[test]
    fn rejects_inverted_dimensions() {
        let mut store = ArrayStore::new(2);
        assert!(matches!(
            store.allocate(ArrayKind::Int, Rect::new(2, 1, 0, 0)),
            Err(VmError::InvalidDims(_))
        ));
        assert!(matches!(
            store.allocate(ArrayKind::Int, Rect::new(-1, 1, 0, 0)),
            Err(VmError::InvalidDims(_))
        ));
    }

    #[test]
    fn oversized_dimensions_are_rejected_not_allocated() {
        let mut store = ArrayStore::new(2);
        let huge = Rect::new(0, i32::MAX, 0, i32::MAX);
        assert_eq!(huge.rows(), 1 << 31);
        assert_eq!(huge.storage_bytes(ArrayKind::Dword), None);
        assert!(matches!(
            store.allocate(ArrayKind::Dword, huge),
            Err(VmError::InvalidDims(_))
        ));
        assert!(matches!(
            store.allocate(ArrayKind::Byte, Rect::row(i32::MAX)),
            Err(VmError::InvalidDims(_))
        ));

        let id = store.allocate(ArrayKind::Byte, Rect::row(7)).unwrap();
        assert!(matches!(
            store.redim(id, ArrayKind::Int, huge),
            Err(VmError::InvalidDims(_))
        ));
        assert_eq!(store.get(id).unwrap().dims(), Rect::row(7));
    }

    #[test]
    fn redim_preserves_byte_size() {
        let mut store = ArrayStore::new(2);
        let id = store.allocate(ArrayKind::Byte, Rect::row(7)).unwrap();
        for across in 0..8 {
            store.write(id, 0, across, across + 1).unwrap();
        }
        store.redim(id, ArrayKind::Int, Rect::new(0, 1, 0, 1)).unwrap();
        assert_eq!(store.read(id, 0, 0).unwrap(), 0x0201);
        assert_eq!(store.read(id, 1, 1).unwrap(), 0x0807);
        assert_eq!(
            store.redim(id, ArrayKind::Dword, Rect::row(3)),
            Err(VmError::RedimMismatch {
                id: id as i32,
                old: 8,
                new: 16
            })
        );
    }

    #[test]
    fn copy_between_arrays_of_different_types() {
        let mut store = ArrayStore::new(4);
        let src = store.allocate(ArrayKind::Dword, Rect::row(3)).unwrap();
        let dst = store.allocate(ArrayKind::Byte, Rect::row(3)).unwrap();
        for across in 0..4 {
            store.write(src, 0, across, 0x100 + across).unwrap();
        }
        store
            .copy_block(dst, Rect::new(0, 0, 1, 3), src, Rect::new(0, 0, 0, 2))
            .unwrap();
        assert_eq!(row_values(&store, dst, 0), vec![0, 0, 1, 2]);
    }

    #[test]
    fn copy_rejects_shape_mismatch() {
        let mut store = ArrayStore::new(4);
        let a = store.allocate(ArrayKind::Int, Rect::new(0, 1, 0, 3)).unwrap();
        let b = store.allocate(ArrayKind::Int, Rect::new(0, 1, 0, 3)).unwrap();
        assert!(matches!(
            store.copy_block(a, Rect::new(0, 1, 0, 1), b, Rect::new(0, 0, 0, 3)),
            Err(VmError::ShapeMismatch(..))
        ));
    }

    #[test]
    fn overlapping_copy_behaves_like_memmove() {
        let mut store = ArrayStore::new(2);
        let id = store.allocate(ArrayKind::Int, Rect::row(5)).unwrap();
        for across in 0..6 {
            store.write(id, 0, across, across + 10).unwrap();
        }
        store
            .copy_block(id, Rect::new(0, 0, 2, 5), id, Rect::new(0, 0, 0, 3))
            .unwrap();
        assert_eq!(row_values(&store, id, 0), vec![10, 11, 10, 11, 12, 13]);

        store
            .copy_block(id, Rect::new(0, 0, 0, 3), id, Rect::new(0, 0, 2, 5))
            .unwrap();
        assert_eq!(row_values(&store, id, 0), vec![10, 11, 12, 13, 12, 13]);
    }

    #[test]
    fn overlapping_rows_copy_downwards() {
        let mut store = ArrayStore::new(2);
        let id = store.allocate(ArrayKind::Byte, Rect::new(0, 2, 0, 1)).unwrap();
        for down in 0..3 {
            for across in 0..2 {
                store.write(id, down, across, down * 10 + across).unwrap();
            }
        }
        store
            .copy_block(id, Rect::new(1, 2, 0, 1), id, Rect::new(0, 1, 0, 1))
            .unwrap();
        assert_eq!(row_values(&store, id, 0), vec![0, 1]);
        assert_eq!(row_values(&store, id, 1), vec![0, 1]);
        assert_eq!(row_values(&store, id, 2), vec![10, 11]);
    }

    #[test]
    fn block_op_reads_operands_before_writing() {
        let mut store = ArrayStore::new(4);
        let a = store.allocate(ArrayKind::Dword, Rect::row(2)).unwrap();
        let b = store.allocate(ArrayKind::Dword, Rect::row(2)).unwrap();
        for across in 0..3 {
            store.write(a, 0, across, across + 1).unwrap();
            store.write(b, 0, across, 100).unwrap();
        }
        // dst aliases a1: every element must see the original a1 value.
        store
            .block_op((a, Rect::row(2)), (a, Rect::row(2)), (b, Rect::row(2)), BlockOp::Sub)
            .unwrap();
        assert_eq!(row_values(&store, a, 0), vec![99, 98, 97]);
        assert_eq!(BlockOp::from_code(9), Err(VmError::InvalidMathOp(9)));
    }

    #[test]
    fn check_limits_rejects_outside_rectangles() {
        let mut store = ArrayStore::new(2);
        let id = store.allocate(ArrayKind::Int, Rect::new(0, 3, 0, 3)).unwrap();
        assert!(store.check_limits(id, &Rect::new(1, 2, 1, 2)).is_ok());
        assert!(store.check_limits(id, &Rect::new(0, 4, 0, 0)).is_err());
        assert!(store.check_limits(id, &Rect::new(2, 1, 0, 0)).is_err());
    }

    #[test]
    fn shuffle_keeps_the_same_elements() {
        let mut store = ArrayStore::new(2);
        let id = store.allocate(ArrayKind::Dword, Rect::row(9)).unwrap();
        for across in 0..10 {
            store.write(id, 0, across, across).unwrap();
        }
        let mut rng = StdRng::seed_from_u64(7);
        store.shuffle(id, 2, 7, &mut rng).unwrap();
        let values = row_values(&store, id, 0);
        assert_eq!(&values[..2], &[0, 1]);
        assert_eq!(&values[8..], &[8, 9]);
        let mut middle = values[2..8].to_vec();
        middle.sort();
        assert_eq!(middle, vec![2, 3, 4, 5, 6, 7]);
    }

    #[test]
    fn sorts_rows_by_column() {
        let mut store = ArrayStore::new(2);
        let id = store.allocate(ArrayKind::Int, Rect::new(0, 3, 0, 1)).unwrap();
        for (down, key) in [5, 1, 4, 2].into_iter().enumerate() {
            store.write(id, down as i32, 0, key).unwrap();
            store.write(id, down as i32, 1, key * 100).unwrap();
        }
        store.sort_rows(id, Rect::new(0, 3, 0, 0), 0).unwrap();
        let keys: Vec<i32> = (0..4).map(|down| store.read(id, down, 0).unwrap()).collect();
        assert_eq!(keys, vec![1, 2, 4, 5]);
        assert_eq!(store.read(id, 0, 1).unwrap(), 100);

        store.sort_rows(id, Rect::new(1, 3, 0, 0), 1).unwrap();
        let keys: Vec<i32> = (0..4).map(|down| store.read(id, down, 0).unwrap()).collect();
        assert_eq!(keys, vec![1, 5, 4, 2]);
        assert_eq!(
            store.sort_rows(id, Rect::new(0, 3, 0, 1), 0),
            Err(VmError::SortColumn(id as i32))
        );
    }

    #[test]
    fn zero_and_missing_handles_are_errors() {
        let store = ArrayStore::new(2);
        assert_eq!(store.read(0, 0, 0), Err(VmError::ZeroArray));
        assert_eq!(store.read(2, 0, 0), Err(VmError::InvalidArray(2)));
    }
}
