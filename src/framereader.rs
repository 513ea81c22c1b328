//! Component B — Frame reader.
//!
//! An incremental, timeout-governed parser over a fixed-capacity buffer that
//! preserves unread bytes across calls, so the caller can hand back leftover
//! bytes from one call as the starting point for the next (§4.B). This is
//! the explicit, stateful replacement for `serial.c`'s static call-scoped
//! buffers (`get_sentence`'s `static char buf[256]`) that §9's design notes
//! call for: a small object owned by the verb, not hidden global state.

use crate::error::Result;
use crate::transport::IoSource;

/// A fixed-capacity residual buffer plus the primitives of §4.B.
///
/// `filled` always indicates how many leading bytes of `buf` are valid,
/// carried over from the previous call — exactly the "residual bytes already
/// present" the spec requires be considered before a new read.
pub struct FrameReader {
    buf: Vec<u8>,
    cap: usize,
    filled: usize,
}

impl FrameReader {
    pub fn new(capacity: usize) -> Self {
        FrameReader {
            buf: vec![0u8; capacity],
            cap: capacity,
            filled: 0,
        }
    }

    /// The bytes currently held in the buffer (already-read, unconsumed).
    pub fn residual(&self) -> &[u8] {
        &self.buf[..self.filled]
    }

    pub fn filled(&self) -> usize {
        self.filled
    }

    /// Discard everything currently buffered (used between independent
    /// command/response exchanges, where a stray leftover byte would
    /// otherwise corrupt the next read).
    pub fn clear(&mut self) {
        self.filled = 0;
    }

    /// Seed the buffer with bytes a caller already has in hand (e.g. moving
    /// state between two `FrameReader` instances, or in tests).
    pub fn inject(&mut self, bytes: &[u8]) {
        let n = bytes.len().min(self.cap);
        self.buf[..n].copy_from_slice(&bytes[..n]);
        self.filled = n;
    }

    /// Read until `buf` is full or a single underlying read times out.
    /// Returns the number of bytes appended (not the new total fill level).
    pub fn read_repeat(&mut self, transport: &mut impl IoSource, timeout_ms: u64) -> Result<usize> {
        let mut total = 0usize;
        loop {
            if self.filled >= self.cap {
                break;
            }
            let n = transport.read(&mut self.buf[self.filled..self.cap], timeout_ms)?;
            if n == 0 {
                break;
            }
            self.filled += n;
            total += n;
        }
        Ok(total)
    }

    /// Read until `needle` appears in the buffer. On success the buffer is
    /// shifted so the match starts at offset 0, and the number of bytes from
    /// the match to the current fill level (inclusive of `needle`) is
    /// returned. Returns `Ok(0)` on timeout (needle not found before a
    /// read call returns nothing).
    pub fn read_until(&mut self, transport: &mut impl IoSource, needle: &[u8], timeout_ms: u64) -> Result<usize> {
        loop {
            if let Some(idx) = find(&self.buf[..self.filled], needle) {
                self.buf.copy_within(idx..self.filled, 0);
                self.filled -= idx;
                return Ok(self.filled);
            }

            // Keep only the last |needle| bytes once the buffer holds more
            // than that — a match can never start earlier than that tail.
            if self.filled > needle.len() {
                let keep_from = self.filled - needle.len();
                self.buf.copy_within(keep_from..self.filled, 0);
                self.filled = needle.len();
            }

            let space = self.cap - self.filled;
            if space == 0 {
                return Ok(0);
            }
            let n = transport.read(&mut self.buf[self.filled..self.cap], timeout_ms)?;
            if n == 0 {
                return Ok(0);
            }
            self.filled += n;
        }
    }

    /// Compose `read_until(start)` then continue reading until `end` is
    /// found. Returns the captured frame length (including both markers),
    /// or `0` if either stage times out.
    pub fn read_delimited(
        &mut self,
        transport: &mut impl IoSource,
        start: &[u8],
        end: &[u8],
        timeout_ms: u64,
    ) -> Result<usize> {
        let n = self.read_until(transport, start, timeout_ms)?;
        if n == 0 {
            return Ok(0);
        }
        loop {
            if let Some(idx) = find(&self.buf[..self.filled], end) {
                return Ok(idx + end.len());
            }
            let space = self.cap - self.filled;
            if space == 0 {
                return Ok(0);
            }
            let n = transport.read(&mut self.buf[self.filled..self.cap], timeout_ms)?;
            if n == 0 {
                return Ok(0);
            }
            self.filled += n;
        }
    }

    /// Drop the first `n` bytes, moving any trailing bytes (e.g. the start
    /// of the next sentence) to the front of the buffer.
    pub fn consume(&mut self, n: usize) {
        let n = n.min(self.filled);
        self.buf.copy_within(n..self.filled, 0);
        self.filled -= n;
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn find_locates_substring() {
        assert_eq!(find(b"abc$LOG108,xyz", b"$LOG108,"), Some(3));
        assert_eq!(find(b"no match here", b"$LOG"), None);
    }

    #[test]
    fn consume_shifts_remaining_bytes() {
        let mut fr = FrameReader::new(16);
        fr.inject(b"0123456789");
        fr.consume(4);
        assert_eq!(fr.residual(), b"456789");
    }
}
