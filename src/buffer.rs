//! Growable byte region with separate read/write cursors and a reclaimable
//! prepend zone (spec.md §3/§4.1, component C1).
//!
//! No abstraction like this exists in the teacher repo — `HttpConnection`
//! there just does `Vec<u8>::extend_from_slice` / `Vec::drain` directly. The
//! three-region/no-geometric-growth discipline is new here, grounded
//! directly on spec.md's stated rationale (bound peak memory for slow
//! clients at the cost of more reallocations).

use std::io::{self, Read, Write};
use std::os::fd::AsRawFd;

const DEFAULT_CAPACITY: usize = 1024;
const OVERFLOW_SCRATCH: usize = 64 * 1024;

#[derive(Debug)]
pub struct Buffer {
    data: Vec<u8>,
    read_pos: usize,
    write_pos: usize,
}

impl Default for Buffer {
    fn default() -> Self {
        Self::new()
    }
}

impl Buffer {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Buffer {
            data: vec![0u8; capacity],
            read_pos: 0,
            write_pos: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    pub fn readable_bytes(&self) -> usize {
        self.write_pos - self.read_pos
    }

    pub fn writable_bytes(&self) -> usize {
        self.data.len() - self.write_pos
    }

    pub fn prependable_bytes(&self) -> usize {
        self.read_pos
    }

    pub fn is_empty(&self) -> bool {
        self.readable_bytes() == 0
    }

    /// The readable region `[read_pos, write_pos)`.
    pub fn peek(&self) -> &[u8] {
        &self.data[self.read_pos..self.write_pos]
    }

    /// Caller guarantees `n <= writable_bytes()`.
    pub fn has_written(&mut self, n: usize) {
        debug_assert!(n <= self.writable_bytes());
        self.write_pos += n;
    }

    fn ensure_writable(&mut self, need: usize) {
        if self.writable_bytes() >= need {
            return;
        }
        if self.prependable_bytes() + self.writable_bytes() >= need {
            // Compaction: slide the readable region down to offset 0.
            let readable = self.readable_bytes();
            self.data.copy_within(self.read_pos..self.write_pos, 0);
            self.read_pos = 0;
            self.write_pos = readable;
        } else {
            // Grow by exactly the shortfall. No geometric doubling: this
            // keeps peak memory tight for many idle slow-client buffers, at
            // the cost of more reallocations for any one fast-growing one.
            let shortfall = need - self.writable_bytes();
            self.data.resize(self.data.len() + shortfall, 0);
        }
    }

    pub fn append(&mut self, bytes: &[u8]) {
        self.ensure_writable(bytes.len());
        let start = self.write_pos;
        self.data[start..start + bytes.len()].copy_from_slice(bytes);
        self.has_written(bytes.len());
    }

    /// Advances `read_pos` by `n`. Resets both cursors to 0 if the read
    /// cursor catches up to the write cursor (trivial compaction).
    pub fn consume(&mut self, n: usize) {
        debug_assert!(n <= self.readable_bytes());
        self.read_pos += n;
        if self.read_pos == self.write_pos {
            self.read_pos = 0;
            self.write_pos = 0;
        }
    }

    /// Consumes up to (and not including) `ptr`, a pointer previously
    /// obtained from `peek()` (e.g. the position of a located CRLF).
    pub fn consume_until(&mut self, ptr: *const u8) {
        let base = self.data[self.read_pos..].as_ptr();
        let offset = (ptr as usize) - (base as usize);
        self.consume(offset);
    }

    /// Returns the whole readable region as an owned `String` and resets the
    /// buffer to empty. Non-UTF8 bytes are replaced per `String::from_utf8_lossy`.
    pub fn drain_to_string(&mut self) -> String {
        let s = String::from_utf8_lossy(self.peek()).into_owned();
        self.read_pos = 0;
        self.write_pos = 0;
        s
    }

    /// Single scatter read into `[writable region, 64 KiB stack overflow]`.
    /// Drains whatever the kernel has in one syscall without the caller
    /// needing to size the buffer ahead of time, while bounding per-call
    /// stack use. Returns `(n, None)` on success (including EOF, `n == 0`)
    /// or `(0, Some(errno))` on error — including `WouldBlock`, which the
    /// caller must check for before treating it as a hard error.
    pub fn fill_from_fd<T: Read + AsRawFd>(&mut self, fd: &mut T) -> (usize, Option<io::Error>) {
        if self.writable_bytes() == 0 {
            self.ensure_writable(DEFAULT_CAPACITY);
        }

        let mut overflow = [0u8; OVERFLOW_SCRATCH];
        let write_start = self.write_pos;
        let write_end = self.data.len();

        match read_vectored_mut(fd, &mut self.data[write_start..write_end], &mut overflow) {
            Ok((n, used_overflow)) => {
                let direct = (write_end - write_start).min(n);
                self.has_written(direct);
                if used_overflow > 0 {
                    self.append(&overflow[..used_overflow]);
                }
                (n, None)
            }
            Err(e) => (0, Some(e)),
        }
    }

    /// Writes from the readable region; advances `read_pos` by the amount
    /// actually written.
    pub fn flush_to_fd<T: Write>(&mut self, fd: &mut T) -> (usize, Option<io::Error>) {
        match fd.write(self.peek()) {
            Ok(n) => {
                self.consume(n);
                (n, None)
            }
            Err(e) => (0, Some(e)),
        }
    }
}

/// Performs one `readv`-style scatter read into `primary` then `overflow`,
/// using the platform's vectored read so it is genuinely one syscall.
fn read_vectored_mut<T: Read + AsRawFd>(
    fd: &mut T,
    primary: &mut [u8],
    overflow: &mut [u8],
) -> io::Result<(usize, usize)> {
    use std::io::IoSliceMut;
    let primary_cap = primary.len();
    let mut bufs = [IoSliceMut::new(primary), IoSliceMut::new(overflow)];
    let n = fd.read_vectored(&mut bufs)?;
    let overflow_used = n.saturating_sub(primary_cap);
    Ok((n, overflow_used))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invariants_hold_at_rest() {
        let buf = Buffer::new();
        assert!(buf.read_pos <= buf.write_pos);
        assert!(buf.write_pos <= buf.capacity());
    }

    #[test]
    fn append_then_consume_round_trips() {
        let mut buf = Buffer::new();
        buf.append(b"hello world");
        assert_eq!(buf.peek(), b"hello world");
        buf.consume(b"hello world".len());
        assert_eq!(buf.readable_bytes(), 0);
        assert_eq!(buf.read_pos, 0);
        assert_eq!(buf.write_pos, 0);
    }

    #[test]
    fn drain_to_string_matches_prior_appends() {
        let mut buf = Buffer::new();
        buf.append(b"foo");
        buf.append(b"bar");
        assert_eq!(buf.drain_to_string(), "foobar");
        assert_eq!(buf.readable_bytes(), 0);
    }

    #[test]
    fn consume_until_uses_pointer_offset() {
        let mut buf = Buffer::new();
        buf.append(b"GET / HTTP/1.1\r\nHost: x\r\n\r\n");
        let pos = buf
            .peek()
            .windows(2)
            .position(|w| w == b"\r\n")
            .unwrap();
        let ptr = unsafe { buf.peek().as_ptr().add(pos) };
        buf.consume_until(ptr);
        assert_eq!(buf.peek(), b"\r\nHost: x\r\n\r\n");
    }

    #[test]
    fn growth_compacts_before_reallocating() {
        let mut buf = Buffer::with_capacity(16);
        buf.append(b"0123456789"); // 10 bytes, 6 writable left
        buf.consume(8); // read_pos=8, write_pos=10, prependable=8
        let cap_before = buf.capacity();
        buf.append(b"abcdefgh"); // needs 8, prependable(8)+writable(6)=14 >= 8
        assert_eq!(buf.capacity(), cap_before, "should compact, not realloc");
        assert_eq!(buf.peek(), b"89abcdefgh");
    }

    #[test]
    fn growth_reallocates_by_exact_shortfall_when_compaction_insufficient() {
        let mut buf = Buffer::with_capacity(8);
        buf.append(b"12345678"); // full
        buf.consume(8); // resets to 0/0
        buf.append(b"1234"); // write_pos=4
        // ask for more than remaining capacity and more than compaction can give
        buf.append(b"567890ABCDEF"); // 12 bytes, writable was 4
        assert_eq!(buf.peek(), b"1234567890ABCDEF");
    }
}
