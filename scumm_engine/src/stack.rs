use crate::error::{VmError, VmResult};

/// Bounded integer operand stack shared by all scripts.
#[derive(Debug, Clone)]
pub struct OperandStack {
    values: Vec<i32>,
    limit: usize,
}

impl OperandStack {
    pub fn new(limit: usize) -> Self {
        OperandStack {
            values: Vec::with_capacity(limit),
            limit,
        }
    }

    pub fn push(&mut self, value: i32) -> VmResult<()> {
        if self.values.len() >= self.limit {
            return Err(VmError::StackOverflow { limit: self.limit });
        }
        self.values.push(value);
        Ok(())
    }

    pub fn pop(&mut self) -> VmResult<i32> {
        self.values.pop().ok_or(VmError::StackUnderflow)
    }

    pub fn peek(&self) -> VmResult<i32> {
        self.values.last().copied().ok_or(VmError::StackUnderflow)
    }

    /// Pop a count followed by that many values. The returned list is in
    /// push order.
    pub fn pop_list(&mut self, max: usize) -> VmResult<Vec<i32>> {
        let count = self.pop()?;
        if count < 0 || count as usize > max {
            return Err(VmError::TooManyItems { count, max });
        }
        let mut list = vec![0; count as usize];
        for slot in list.iter_mut().rev() {
            *slot = self.pop()?;
        }
        Ok(list)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn clear(&mut self) {
        self.values.clear();
    }
}

/// Byte stack of NUL-terminated strings pushed inline by scripts.
///
/// The buffer always starts with a single NUL sentinel so that popping the
/// last string can find its start.
#[derive(Debug, Clone)]
pub struct ScriptStringStack {
    buffer: Vec<u8>,
}

pub const STRING_STACK_LIMIT: usize = 4096;

impl Default for ScriptStringStack {
    fn default() -> Self {
        ScriptStringStack { buffer: vec![0] }
    }
}

impl ScriptStringStack {
    pub fn push(&mut self, bytes: &[u8]) -> VmResult<()> {
        if self.buffer.len() + bytes.len() >= STRING_STACK_LIMIT {
            return Err(VmError::StringStackOverflow);
        }
        self.buffer.extend_from_slice(bytes);
        self.buffer.push(0);
        Ok(())
    }

    pub fn pop(&mut self) -> VmResult<Vec<u8>> {
        if self.buffer.len() == 1 {
            return Err(VmError::StringStackUnderflow);
        }
        let end = self.buffer.len() - 1;
        let start = self.buffer[..end]
            .iter()
            .rposition(|&b| b == 0)
            .map(|pos| pos + 1)
            .unwrap_or(0);
        let string = self.buffer[start..end].to_vec();
        self.buffer.truncate(start);
        Ok(string)
    }

    pub fn depth(&self) -> usize {
        self.buffer.iter().skip(1).filter(|&&b| b == 0).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_comes_back_in_push_order() {
        let mut stack = OperandStack::new(16);
        for value in [7, 1, 2, 3, 3] {
            stack.push(value).unwrap();
        }
        assert_eq!(stack.pop_list(25).unwrap(), vec![1, 2, 3]);
        assert_eq!(stack.pop().unwrap(), 7);
        assert_eq!(stack.pop(), Err(VmError::StackUnderflow));
    }

    #[test]
    fn list_count_is_capped() {
        let mut stack = OperandStack::new(8);
        stack.push(30).unwrap();
        assert_eq!(
            stack.pop_list(25),
            Err(VmError::TooManyItems { count: 30, max: 25 })
        );
    }

    #[test]
    fn overflow_is_reported() {
        let mut stack = OperandStack::new(2);
        stack.push(1).unwrap();
        stack.push(2).unwrap();
        assert_eq!(stack.push(3), Err(VmError::StackOverflow { limit: 2 }));
    }

    #[test]
    fn strings_pop_in_lifo_order() {
        let mut strings = ScriptStringStack::default();
        strings.push(b"first").unwrap();
        strings.push(b"second").unwrap();
        assert_eq!(strings.depth(), 2);
        assert_eq!(strings.pop().unwrap(), b"second");
        assert_eq!(strings.pop().unwrap(), b"first");
        assert_eq!(strings.pop(), Err(VmError::StringStackUnderflow));
    }

    #[test]
    fn empty_strings_round_trip() {
        let mut strings = ScriptStringStack::default();
        strings.push(b"").unwrap();
        assert_eq!(strings.pop().unwrap(), b"");
        assert_eq!(strings.depth(), 0);
    }

    #[test]
    fn string_stack_has_a_ceiling() {
        let mut strings = ScriptStringStack::default();
        let chunk = vec![b'x'; 1000];
        for _ in 0..4 {
            strings.push(&chunk).unwrap();
        }
        assert_eq!(strings.push(&chunk), Err(VmError::StringStackOverflow));
    }
}
