//! Fixed-capacity text buffer holding one session's aggregated context.

/// Default context buffer capacity (16 KiB).
pub const DEFAULT_CONTEXT_CAPACITY: usize = 16 * 1024;

/// A text buffer that never grows past its capacity.
///
/// Writes that would overflow are truncated on a UTF-8 character boundary.
/// The buffer is built up completely and then swapped into a session record,
/// so readers only ever see a finished snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextBuffer {
    text: String,
    capacity: usize,
}

impl ContextBuffer {
    /// Create an empty buffer with the given capacity in bytes.
    pub fn new(capacity: usize) -> Self {
        Self {
            text: String::new(),
            capacity,
        }
    }

    /// Create a buffer holding as much of `content` as fits.
    pub fn from_capture(capacity: usize, content: &str) -> Self {
        let mut buffer = Self::new(capacity);
        buffer.push_truncated(content);
        buffer
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Logical length of the valid data, in bytes.
    pub fn len(&self) -> usize {
        self.text.len()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Bytes that can still be appended.
    pub fn remaining(&self) -> usize {
        self.capacity.saturating_sub(self.text.len())
    }

    /// Append `s` only if all of it fits. Returns whether it was appended.
    pub fn push_whole(&mut self, s: &str) -> bool {
        if s.len() > self.remaining() {
            return false;
        }
        self.text.push_str(s);
        true
    }

    /// Append as much of `s` as fits. Returns the number of bytes appended.
    pub fn push_truncated(&mut self, s: &str) -> usize {
        let end = floor_char_boundary(s, self.remaining());
        self.text.push_str(&s[..end]);
        end
    }

    /// Copy this buffer into one with a (possibly smaller) capacity.
    pub fn fit_to(&self, capacity: usize) -> Self {
        if capacity == self.capacity {
            return self.clone();
        }
        Self::from_capture(capacity, &self.text)
    }
}

/// Largest index `<= max` that falls on a char boundary of `s`.
pub fn floor_char_boundary(s: &str, max: usize) -> usize {
    if max >= s.len() {
        return s.len();
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    end
}
