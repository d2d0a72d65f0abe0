//! Scatter-gather helpers over an ordered list of byte slices.
//!
//! `WriteMessage`/`ReadMessage` accept payloads and wire messages as a list
//! of segments rather than a single contiguous buffer, so callers can hand
//! in vectored I/O without an up-front copy. A segment list with zero
//! segments has total length zero and behaves like an empty payload.
#![forbid(unsafe_code)]

/// An ordered, read-only list of byte segments.
#[derive(Clone, Copy)]
pub struct Segments<'a> {
    segs: &'a [&'a [u8]],
}

impl<'a> Segments<'a> {
    /// Wrap a slice of byte slices.
    pub fn new(segs: &'a [&'a [u8]]) -> Self {
        Self { segs }
    }

    /// Total length across every segment.
    pub fn total_len(&self) -> usize {
        self.segs.iter().map(|s| s.len()).sum()
    }

    /// Copy every byte, in order, into `dest`. `dest` must be at least
    /// [`Segments::total_len`] bytes; returns the number of bytes written.
    pub fn copy_to(&self, dest: &mut [u8]) -> usize {
        let mut written = 0;
        for seg in self.segs {
            let end = written + seg.len();
            dest[written..end].copy_from_slice(seg);
            written = end;
        }
        written
    }

    /// Coalesce into an owned buffer. Used when a primitive needs
    /// contiguous input and the segment count is more than one.
    pub fn to_vec(&self) -> Vec<u8> {
        let mut out = vec![0u8; self.total_len()];
        self.copy_to(&mut out);
        out
    }

    /// A cursor over these segments for sequential, possibly
    /// boundary-crossing, reads.
    pub fn cursor(&self) -> SegCursor<'a> {
        SegCursor {
            segs: self.segs,
            seg_idx: 0,
            byte_idx: 0,
        }
    }
}

/// Sequential reader over a [`Segments`] that can peel off `n` bytes at a
/// time even when `n` crosses a segment boundary.
pub struct SegCursor<'a> {
    segs: &'a [&'a [u8]],
    seg_idx: usize,
    byte_idx: usize,
}

impl<'a> SegCursor<'a> {
    /// Bytes remaining, from the current position to the end of the list.
    pub fn remaining_len(&self) -> usize {
        let mut total = self.segs.get(self.seg_idx).map_or(0, |s| s.len() - self.byte_idx);
        for seg in self.segs.iter().skip(self.seg_idx + 1) {
            total += seg.len();
        }
        total
    }

    /// Read exactly `n` bytes, advancing the cursor. Returns `None` if fewer
    /// than `n` bytes remain.
    pub fn read(&mut self, n: usize) -> Option<Vec<u8>> {
        if self.remaining_len() < n {
            return None;
        }
        let mut out = Vec::with_capacity(n);
        let mut remaining = n;
        while remaining > 0 {
            let seg = self.segs[self.seg_idx];
            let avail = seg.len() - self.byte_idx;
            let take = avail.min(remaining);
            out.extend_from_slice(&seg[self.byte_idx..self.byte_idx + take]);
            self.byte_idx += take;
            remaining -= take;
            if self.byte_idx == seg.len() {
                self.seg_idx += 1;
                self.byte_idx = 0;
            }
        }
        Some(out)
    }

    /// Read every remaining byte.
    pub fn read_rest(&mut self) -> Vec<u8> {
        let n = self.remaining_len();
        self.read(n).unwrap_or_default()
    }
}
