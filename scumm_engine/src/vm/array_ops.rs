//! Array definition, reshaping and the block operations behind `arrayOps`.

use log::debug;

use super::Vm;
use crate::arrays::{ArrayKind, BlockOp, Rect};
use crate::error::{VmError, VmResult};
use crate::opcodes::subops::{classic, he100, he72};
use crate::opcodes::Dialect;
use crate::value::{array_handle, ArrayId, Value};
use crate::vars::VarRef;

/// What a dim sub-op asks for.
enum Dim {
    Define(ArrayKind),
    Undim,
}

/// Most arguments a formatted string can take.
const FORMAT_ARGS: usize = 31;

impl Vm {
    fn dim_subop(&self, subop: i32) -> Option<Dim> {
        use ArrayKind::*;
        let kind = match (self.dialect, subop) {
            (Dialect::Classic, classic::DIM_INT) => Int,
            (Dialect::Classic, classic::DIM_BIT) => Bit,
            (Dialect::Classic, classic::DIM_NIBBLE) => Nibble,
            (Dialect::Classic, classic::DIM_BYTE) => Byte,
            (Dialect::Classic, classic::DIM_STRING) => String,
            (Dialect::Classic, classic::UNDIM) => return Some(Dim::Undim),
            (Dialect::He72, he72::DIM_BIT) => Bit,
            (Dialect::He72, he72::DIM_NIBBLE) => Nibble,
            (Dialect::He72, he72::DIM_BYTE) => Byte,
            (Dialect::He72, he72::DIM_INT) => Int,
            (Dialect::He72, he72::DIM_DWORD) => Dword,
            (Dialect::He72, he72::DIM_STRING) => String,
            (Dialect::He72, he72::UNDIM) => return Some(Dim::Undim),
            (Dialect::He100, he100::BIT) => Bit,
            (Dialect::He100, he100::NIBBLE) => Nibble,
            (Dialect::He100, he100::BYTE) => Byte,
            (Dialect::He100, he100::INT) => Int,
            (Dialect::He100, he100::DWORD) => Dword,
            (Dialect::He100, he100::STRING) => String,
            (Dialect::He100, he100::UNDIM_ARRAY) => return Some(Dim::Undim),
            _ => return None,
        };
        Some(Dim::Define(kind))
    }

    fn redim_kind(&self, op: &'static str, subop: i32) -> VmResult<ArrayKind> {
        match self.dim_subop(subop) {
            Some(Dim::Define(kind @ (ArrayKind::Byte | ArrayKind::Int | ArrayKind::Dword))) => Ok(kind),
            _ => Err(VmError::InvalidSubOp { op, subop }),
        }
    }

    /// Pop a rectangle pushed as downMin, downMax, acrossMin, acrossMax.
    pub(super) fn pop_rect(&mut self) -> VmResult<Rect> {
        let across_max = self.pop()?;
        let across_min = self.pop()?;
        let down_max = self.pop()?;
        let down_min = self.pop()?;
        Ok(Rect::new(down_min, down_max, across_min, across_max))
    }

    /// Allocate an array and store its handle in `var`, freeing whatever
    /// array the variable held before. Arrays defined into locals belong
    /// to the running script.
    pub(super) fn define_array(&mut self, var: u16, kind: ArrayKind, dims: Rect) -> VmResult<ArrayId> {
        let target = VarRef::decode(var, self.version)?;
        if let VarRef::Bit(_) = target {
            return Err(VmError::BitVarAsArray);
        }
        if let Ok(old) = self.read_var(var)?.array_id(self.version) {
            self.arrays.nuke(old);
        }
        let id = self.arrays.allocate(kind, dims)?;
        if let VarRef::Local(_) = target {
            if let Some(slot) = self.current {
                self.arrays.localize(id, slot)?;
            }
        }
        self.write_var(var, Value::Array(id))?;
        debug!("array {id} = {kind:?} {dims} in var {var:#06x}");
        Ok(id)
    }

    /// Allocate an array not stored in any variable.
    pub(super) fn temp_array(&mut self, kind: ArrayKind, dims: Rect) -> VmResult<ArrayId> {
        self.arrays.allocate(kind, dims)
    }

    pub(super) fn nuke_array(&mut self, var: u16) -> VmResult<()> {
        if let Ok(id) = self.read_var(var)?.array_id(self.version) {
            self.arrays.nuke(id);
        }
        self.write_var(var, Value::Scalar(0))
    }

    /// Store `bytes` as a fresh NUL-terminated string array in `var`.
    pub(super) fn define_string(&mut self, var: u16, bytes: &[u8]) -> VmResult<ArrayId> {
        let id = self.define_array(var, ArrayKind::String, Rect::row(bytes.len() as i32))?;
        self.write_bytes(id, 0, bytes)?;
        Ok(id)
    }

    pub(super) fn write_bytes(&mut self, id: ArrayId, at: i32, bytes: &[u8]) -> VmResult<()> {
        for (offset, &byte) in bytes.iter().enumerate() {
            self.arrays.write(id, 0, at + offset as i32, byte as i32)?;
        }
        Ok(())
    }

    pub(super) fn dim_array(&mut self) -> VmResult<()> {
        let subop = self.fetch_subop()?;
        let dim = self.dim_subop(subop).ok_or(VmError::InvalidSubOp {
            op: "dimArray",
            subop,
        })?;
        let var = self.fetch_u16()?;
        match dim {
            Dim::Undim => self.nuke_array(var),
            Dim::Define(kind) => {
                let across_max = self.pop()?;
                self.define_array(var, kind, Rect::row(across_max)).map(|_| ())
            }
        }
    }

    pub(super) fn dim2dim_array(&mut self) -> VmResult<()> {
        let subop = self.fetch_subop()?;
        let Some(Dim::Define(kind)) = self.dim_subop(subop) else {
            return Err(VmError::InvalidSubOp {
                op: "dim2dimArray",
                subop,
            });
        };
        let across_max = self.pop()?;
        let down_max = self.pop()?;
        let var = self.fetch_u16()?;
        self.define_array(var, kind, Rect::new(0, down_max, 0, across_max))
            .map(|_| ())
    }

    /// Fully bounded 2-D define. A leading 2 means across bounds were
    /// pushed last.
    pub(super) fn dim2dim2_array(&mut self) -> VmResult<()> {
        let subop = self.fetch_subop()?;
        let Some(Dim::Define(kind)) = self.dim_subop(subop) else {
            return Err(VmError::InvalidSubOp {
                op: "dim2dim2Array",
                subop,
            });
        };
        let dims = if self.pop()? == 2 {
            self.pop_rect()?
        } else {
            let down_max = self.pop()?;
            let down_min = self.pop()?;
            let across_max = self.pop()?;
            let across_min = self.pop()?;
            Rect::new(down_min, down_max, across_min, across_max)
        };
        let var = self.fetch_u16()?;
        self.define_array(var, kind, dims).map(|_| ())
    }

    pub(super) fn redim_array(&mut self) -> VmResult<()> {
        let mut across_max = self.pop()?;
        let mut down_max = self.pop()?;
        if self.dialect == Dialect::Classic && across_max == 0 {
            std::mem::swap(&mut across_max, &mut down_max);
        }
        let subop = self.fetch_subop()?;
        let kind = self.redim_kind("redimArray", subop)?;
        let var = self.fetch_u16()?;
        let id = self.array_of(var)?;
        self.arrays
            .redim(id, kind, Rect::new(0, down_max, 0, across_max))
    }

    pub(super) fn redim2dim_array(&mut self) -> VmResult<()> {
        let across_max = self.pop()?;
        let across_min = self.pop()?;
        let down_max = self.pop()?;
        let down_min = self.pop()?;
        let subop = self.fetch_subop()?;
        let kind = self.redim_kind("redim2dimArray", subop)?;
        let var = self.fetch_u16()?;
        let id = self.array_of(var)?;
        self.arrays.redim(
            id,
            kind,
            Rect::new(down_min, down_max, across_min, across_max),
        )
    }

    pub(super) fn get_array_dim_size(&mut self) -> VmResult<()> {
        let subop = self.fetch_subop()?;
        let var = self.fetch_u16()?;
        let dims = match self.read_var(var)?.array_id(self.version) {
            Ok(id) if self.arrays.contains(id) => self.arrays.get(id)?.dims(),
            _ => return self.push(0),
        };
        let across_count = dims.across_max - dims.across_min + 1;
        let down_count = dims.down_max - dims.down_min + 1;
        let value = match (self.dialect, subop) {
            (Dialect::He100, he100::INIT | he100::NIBBLE) => across_count,
            (Dialect::He100, he100::BIT) => down_count,
            (Dialect::He100, he100::BYTE) => dims.across_min,
            (Dialect::He100, he100::INT) => dims.across_max,
            (Dialect::He100, he100::DWORD) => dims.down_min,
            (Dialect::He100, he100::STRING) => dims.down_max,
            (Dialect::He100, _) => {
                return Err(VmError::InvalidSubOp {
                    op: "getArrayDimSize",
                    subop,
                })
            }
            (_, he72::DIMSIZE_ACROSS | he72::DIMSIZE_ACROSS_ALT) => across_count,
            (_, he72::DIMSIZE_DOWN) => down_count,
            (_, he72::DIMSIZE_ACROSS_MIN) => dims.across_min,
            (_, he72::DIMSIZE_ACROSS_MAX) => dims.across_max,
            (_, he72::DIMSIZE_DOWN_MIN) => dims.down_min,
            (_, he72::DIMSIZE_DOWN_MAX) => dims.down_max,
            _ => {
                return Err(VmError::InvalidSubOp {
                    op: "getArrayDimSize",
                    subop,
                })
            }
        };
        self.push(value)
    }

    /// Sort rows by one column. A bound of -1 stands for the array's own.
    pub(super) fn sort_array(&mut self) -> VmResult<()> {
        let subop = self.fetch_subop()?;
        let expected = match self.dialect {
            Dialect::He100 => he100::SORT,
            _ => he72::SORT,
        };
        if subop != expected {
            return Err(VmError::InvalidSubOp {
                op: "sortArray",
                subop,
            });
        }
        let var = self.fetch_u16()?;
        let order = self.pop()?;
        let requested = self.pop_rect()?;
        let id = self.array_of(var)?;
        let dims = self.arrays.get(id)?.dims();
        let or = |value: i32, fallback: i32| if value == -1 { fallback } else { value };
        let rect = Rect::new(
            or(requested.down_min, dims.down_min),
            or(requested.down_max, dims.down_max),
            or(requested.across_min, dims.across_min),
            or(requested.across_max, dims.across_max),
        );
        self.arrays.sort_rows(id, rect, order)
    }

    pub(super) fn localize_array(&mut self) -> VmResult<()> {
        let raw = self.pop()?;
        let id = array_handle(raw, self.version)?;
        let slot = self.current.ok_or(VmError::NoScript)?;
        self.arrays.localize(id, slot)
    }

    pub(super) fn array_ops(&mut self) -> VmResult<()> {
        let subop = self.fetch_subop()?;
        let var = self.fetch_u16()?;
        match self.dialect {
            Dialect::Classic => self.classic_array_ops(subop, var),
            _ => self.he_array_ops(subop, var),
        }
    }

    fn classic_array_ops(&mut self, subop: i32, var: u16) -> VmResult<()> {
        match subop {
            classic::ARRAY_STRING => {
                let at = self.pop()?;
                let text = self.fetch_cstr()?;
                let id = self.define_array(var, ArrayKind::String, Rect::row(text.len() as i32 + 1))?;
                self.write_bytes(id, at, &text)
            }
            classic::ARRAY_INT_LIST => {
                let start = self.pop()?;
                let count = self.pop()?;
                if self.read_var(var)?.is_zero() {
                    self.define_array(var, ArrayKind::Int, Rect::row(start + count))?;
                }
                self.assign_int_list(var, start, count)
            }
            classic::ARRAY_2DIM_LIST => {
                let across = self.pop()?;
                let list = self.pop_list(self.list_limit())?;
                if self.read_var(var)?.is_zero() {
                    return Err(VmError::MustDimFirst);
                }
                let down = self.pop()?;
                let id = self.array_of(var)?;
                for (offset, &value) in list.iter().enumerate().rev() {
                    self.arrays.write(id, down, across + offset as i32, value)?;
                }
                Ok(())
            }
            _ => Err(VmError::InvalidSubOp {
                op: "arrayOps",
                subop,
            }),
        }
    }

    /// Pop `count` values into `start..start + count`, last pushed first.
    fn assign_int_list(&mut self, var: u16, start: i32, count: i32) -> VmResult<()> {
        let id = self.array_of(var)?;
        for offset in (0..count.max(0)).rev() {
            let value = self.pop()?;
            self.arrays.write(id, 0, start + offset, value)?;
        }
        Ok(())
    }

    fn he_array_ops(&mut self, subop: i32, var: u16) -> VmResult<()> {
        let renumbered = self.dialect == Dialect::He100;
        let is = |he72_code: i32, he100_code: i32| subop == if renumbered { he100_code } else { he72_code };

        if is(he72::ARRAY_STRING, he100::STRING) {
            let text = self.pop_script_string()?;
            self.define_string(var, &text).map(|_| ())
        } else if is(he72::ARRAY_FORMATTED_STRING, he100::FORMATTED_STRING) {
            let text = self.format_script_string()?;
            self.define_string(var, &text).map(|_| ())
        } else if is(he72::ARRAY_COMPLEX_ASSIGNMENT, he100::COMPLEX_ARRAY_ASSIGNMENT) {
            let list = self.pop_list(self.list_limit())?;
            let rect = self.pop_rect()?;
            let id = self.dword_target(var, rect)?;
            self.arrays.check_limits(id, &rect)?;
            if !list.is_empty() {
                for ((down, across), &value) in rect.cells().zip(list.iter().cycle()) {
                    self.arrays.write(id, down, across, value)?;
                }
            }
            Ok(())
        } else if is(he72::ARRAY_COMPLEX_COPY, he100::COMPLEX_ARRAY_COPY) {
            let src_rect = self.pop_rect()?;
            let src_var = self.fetch_u16()?;
            let dst_rect = self.pop_rect()?;
            let dst = self.array_of(var)?;
            let src = self.array_of(src_var)?;
            self.arrays.copy_block(dst, dst_rect, src, src_rect)
        } else if is(he72::ARRAY_RANGE_ASSIGNMENT, he100::RANGE_ARRAY_ASSIGNMENT) {
            let end = self.pop()?;
            let start = self.pop()?;
            let rect = self.pop_rect()?;
            let id = self.dword_target(var, rect)?;
            self.arrays.check_limits(id, &rect)?;
            let step = if start <= end { 1 } else { -1 };
            let span = (start as i64 - end as i64).unsigned_abs() + 1;
            let values = (0..span).map(|i| (start as i64 + i as i64 * step) as i32).cycle();
            for ((down, across), value) in rect.cells().zip(values) {
                self.arrays.write(id, down, across, value)?;
            }
            Ok(())
        } else if is(he72::ARRAY_COMPLEX_MATH, he100::COMPLEX_ARRAY_MATH) {
            let a2_var = self.fetch_u16()?;
            let a1_var = self.fetch_u16()?;
            let op = BlockOp::from_code(self.pop()?)?;
            let a1_rect = self.pop_rect()?;
            let a2_rect = self.pop_rect()?;
            let dst_rect = self.pop_rect()?;
            let dst = self.dword_target(var, dst_rect)?;
            let a1 = self.array_of(a1_var)?;
            let a2 = self.array_of(a2_var)?;
            self.arrays
                .block_op((dst, dst_rect), (a1, a1_rect), (a2, a2_rect), op)
        } else if is(he72::ARRAY_INT_LIST, he100::ASSIGN_INT_LIST) {
            let start = self.pop()?;
            let count = self.pop()?;
            if self.read_var(var)?.is_zero() {
                self.define_array(var, ArrayKind::Dword, Rect::row(start + count - 1))?;
            }
            self.assign_int_list(var, start, count)
        } else if is(he72::ARRAY_2DIM_LIST, he100::ASSIGN_2DIM_LIST) {
            let list = self.pop_list(self.list_limit())?;
            if self.read_var(var)?.is_zero() {
                return Err(VmError::MustDimFirst);
            }
            let down = self.pop()?;
            let id = self.array_of(var)?;
            for (across, &value) in list.iter().enumerate().rev() {
                self.arrays.write(id, down, across as i32, value)?;
            }
            Ok(())
        } else {
            Err(VmError::InvalidSubOp {
                op: "arrayOps",
                subop,
            })
        }
    }

    /// The array in `var`, defined as a dword array over `rect` if the
    /// variable is still empty.
    fn dword_target(&mut self, var: u16, rect: Rect) -> VmResult<ArrayId> {
        if self.read_var(var)?.is_zero() {
            return self.define_array(var, ArrayKind::Dword, rect);
        }
        self.array_of(var)
    }

    /// Expand a `%c %d %s %x` template popped via the script string rules.
    /// Arguments are popped before the template: a count `n`, then `n + 1`
    /// values, first pushed first used.
    pub(super) fn format_script_string(&mut self) -> VmResult<Vec<u8>> {
        let last = self.pop()?;
        if last >= FORMAT_ARGS as i32 {
            return Err(VmError::TooManyItems {
                count: last + 1,
                max: FORMAT_ARGS,
            });
        }
        let mut args = vec![0; (last + 1).max(0) as usize];
        for slot in args.iter_mut().rev() {
            *slot = self.pop()?;
        }
        let template = self.pop_script_string()?;

        let mut args = args.into_iter();
        let mut next = move || args.next().unwrap_or(0);
        let mut out = Vec::with_capacity(template.len());
        let mut chars = template.iter().copied().peekable();
        while let Some(chr) = chars.next() {
            if chr != b'%' {
                out.push(chr);
                continue;
            }
            match chars.peek().copied() {
                Some(b'b') => {
                    chars.next();
                }
                Some(b'c') => {
                    chars.next();
                    out.push(next() as u8);
                }
                Some(b'd') => {
                    chars.next();
                    out.extend_from_slice(next().to_string().as_bytes());
                }
                Some(b'x') => {
                    chars.next();
                    out.extend_from_slice(format!("{:x}", next()).as_bytes());
                }
                Some(b's') => {
                    chars.next();
                    let raw = next();
                    if let Ok(id) = array_handle(raw, self.version) {
                        if let Ok(array) = self.arrays.get(id) {
                            out.extend_from_slice(array.c_string());
                        }
                    }
                }
                _ => out.push(b'%'),
            }
        }
        Ok(out)
    }
}
