//! String arrays and the inline script string stack.
//!
//! Opcodes that build a new string allocate a temporary string array that
//! no variable refers to and push its handle; scripts keep it alive by
//! storing the handle.

use super::Vm;
use crate::arrays::{ArrayKind, Rect};
use crate::error::VmResult;
use crate::value::{array_handle, ArrayId, Value};

/// Stack value selecting the script string stack instead of an array.
pub const STRING_STACK: i32 = -1;

impl Vm {
    pub(super) fn get_script_string(&mut self) -> VmResult<()> {
        let text = self.fetch_cstr()?;
        self.strings.push(&text)
    }

    /// Pop a string argument: -1 takes the newest inline string, anything
    /// else names a string array.
    pub(super) fn pop_script_string(&mut self) -> VmResult<Vec<u8>> {
        let raw = self.pop()?;
        if raw == STRING_STACK {
            return self.strings.pop();
        }
        self.string_of(raw)
    }

    fn string_array(&self, raw: i32) -> VmResult<ArrayId> {
        array_handle(raw, self.version)
    }

    fn string_of(&self, raw: i32) -> VmResult<Vec<u8>> {
        let id = self.string_array(raw)?;
        self.arrays.c_string(id)
    }

    fn push_handle(&mut self, id: ArrayId) -> VmResult<()> {
        let raw = Value::Array(id).encode(self.version);
        self.push(raw)
    }

    /// New disconnected string array with room for `size` characters plus
    /// a terminator.
    fn setup_string_array(&mut self, size: i32) -> VmResult<ArrayId> {
        self.temp_array(ArrayKind::String, Rect::row(size.max(0)))
    }

    /// Copy `src[src_offs..=len]` onto the end of the C string in `dst`.
    /// A `len` of -1 copies all of `src`.
    fn append_substring(&mut self, dst: ArrayId, src: i32, src_offs: i32, len: i32) -> VmResult<()> {
        let src = self.string_array(src)?;
        let source_len = self.arrays.get(src)?.c_string().len() as i32;
        // -1 takes the whole string up to its terminator
        let (src_offs, count) = if len == -1 {
            (0, source_len)
        } else {
            (src_offs, len - src_offs + 1)
        };
        let dst_offs = self.arrays.get(dst)?.c_string().len() as i32;
        for i in 0..count.max(0) {
            let byte = self.arrays.read(src, 0, src_offs + i)?;
            self.arrays.write(dst, 0, dst_offs + i, byte)?;
        }
        self.arrays.write(dst, 0, dst_offs + count.max(0), 0)
    }

    pub(super) fn get_string_len(&mut self) -> VmResult<()> {
        let raw = self.pop()?;
        let len = self.string_of(raw)?.len() as i32;
        self.push(len)
    }

    pub(super) fn copy_string(&mut self) -> VmResult<()> {
        let src = self.pop()?;
        let size = self.string_of(src)?.len() as i32 + 1;
        let dst = self.setup_string_array(size)?;
        self.append_substring(dst, src, -1, -1)?;
        self.push_handle(dst)
    }

    /// Substring `src[src_offs..=len]` as a new string.
    pub(super) fn append_string(&mut self) -> VmResult<()> {
        let len = self.pop()?;
        let src_offs = self.pop()?;
        let src = self.pop()?;
        let dst = self.setup_string_array(len - src_offs + 2)?;
        self.append_substring(dst, src, src_offs, len)?;
        self.push_handle(dst)
    }

    pub(super) fn concat_string(&mut self) -> VmResult<()> {
        let src2 = self.pop()?;
        let src1 = self.pop()?;
        let size = (self.string_of(src1)?.len() + self.string_of(src2)?.len()) as i32 + 1;
        let dst = self.setup_string_array(size)?;
        self.append_substring(dst, src1, 0, -1)?;
        self.append_substring(dst, src2, 0, -1)?;
        self.push_handle(dst)
    }

    /// 0 when equal, -1 when the first string sorts after the second,
    /// 1 otherwise.
    pub(super) fn compare_string(&mut self) -> VmResult<()> {
        let second = self.pop()?;
        let first = self.pop()?;
        let a = self.string_of(first)?;
        let b = self.string_of(second)?;
        let result = match a.cmp(&b) {
            std::cmp::Ordering::Equal => 0,
            std::cmp::Ordering::Greater => -1,
            std::cmp::Ordering::Less => 1,
        };
        self.push(result)
    }

    pub(super) fn string_to_int(&mut self) -> VmResult<()> {
        let raw = self.pop()?;
        let value = atoi(&self.string_of(raw)?);
        self.push(value)
    }

    /// Search for a character between `pos` and `end`, scanning backwards
    /// when `end` is not past `pos`. Pushes the index or -1.
    pub(super) fn get_char_index_in_string(&mut self) -> VmResult<()> {
        let value = self.pop()?;
        let mut end = self.pop()?;
        let mut pos = self.pop()?;
        let raw = self.pop()?;
        let id = self.string_array(raw)?;
        if end >= 0 {
            end = end.min(self.arrays.get(id)?.c_string().len() as i32);
        } else {
            end = 0;
        }
        pos = pos.max(0);

        let forward = end > pos;
        while if forward { end >= pos } else { end <= pos } {
            if self.arrays.read(id, 0, pos)? == value {
                return self.push(pos);
            }
            pos += if forward { 1 } else { -1 };
        }
        self.push(-1)
    }
}

/// C `atoi`: optional leading blanks and sign, then digits.
fn atoi(bytes: &[u8]) -> i32 {
    let mut iter = bytes
        .iter()
        .copied()
        .skip_while(|b| b.is_ascii_whitespace())
        .peekable();
    let negative = match iter.peek() {
        Some(b'-') => {
            iter.next();
            true
        }
        Some(b'+') => {
            iter.next();
            false
        }
        _ => false,
    };
    let mut value: i32 = 0;
    for digit in iter.take_while(u8::is_ascii_digit) {
        value = value.wrapping_mul(10).wrapping_add((digit - b'0') as i32);
    }
    if negative {
        value.wrapping_neg()
    } else {
        value
    }
}
