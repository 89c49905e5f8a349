//! Sparse time → byte-offset index over a timeline's datagram stream.
//!
//! Entry `i` describes the datagram that starts **at or before** grid time
//! `i * interval`.  Pointing at the datagram that comes *after* a grid time
//! would let a request fall between the entry and its datagram, and the
//! stream can only be walked forwards:
//!
//! ```text
//! time axis --------------------------------->
//!             ENTRY <-- REQUEST
//!               |
//!  DATAGRAM <---
//! ```
//!
//! So a lookup is `t / interval` (clamped to the last entry) followed by a
//! forward scan of at most one interval's worth of datagrams.

use std::io::{Read, Write};
use std::path::Path;

use crate::error::{Error, Result};
use crate::header::{read_u32, read_u64};

/// One index record: where a datagram starts, in time and in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexEntry {
    pub time: u64,
    pub byte: u64,
}

impl IndexEntry {
    pub const ENCODED_LEN: u64 = 16;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimelineIndex {
    interval: u32,
    entries: Vec<IndexEntry>,
}

impl TimelineIndex {
    /// Interval, in samples, between two grid points.
    pub fn interval(&self) -> u32 {
        self.interval
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }

    /// The entry at or before `time`.  Times past the last grid point map to
    /// the last entry.
    pub fn entry_before(&self, time: u64) -> IndexEntry {
        let slot = (time / u64::from(self.interval)) as usize;
        let slot = slot.min(self.entries.len() - 1);
        self.entries[slot]
    }

    /// Byte offset from which a forward scan reaches `time`.
    pub fn find_offset(&self, time: u64) -> u64 {
        self.entry_before(time).byte
    }

    /// Size of the encoded index block.
    pub fn encoded_len(&self) -> u64 {
        8 + IndexEntry::ENCODED_LEN * self.entries.len() as u64
    }

    pub fn write_to<W: Write>(&self, w: &mut W) -> std::io::Result<u64> {
        let count = u32::try_from(self.entries.len()).map_err(|_| {
            std::io::Error::new(std::io::ErrorKind::InvalidInput, "too many index entries")
        })?;
        w.write_all(&count.to_be_bytes())?;
        w.write_all(&self.interval.to_be_bytes())?;
        for e in &self.entries {
            w.write_all(&e.time.to_be_bytes())?;
            w.write_all(&e.byte.to_be_bytes())?;
        }
        Ok(self.encoded_len())
    }

    /// Load and sanity-check an index block of at most `available` bytes.
    pub fn read_from<R: Read>(r: &mut R, path: &Path, available: u64) -> Result<Self> {
        let count = read_u32(r, path)?;
        let interval = read_u32(r, path)?;
        if interval == 0 {
            return Err(Error::format(path, "index interval is zero"));
        }
        if count == 0 {
            return Err(Error::format(path, "index has no entries"));
        }
        let needed = 8 + IndexEntry::ENCODED_LEN * u64::from(count);
        if needed > available {
            return Err(Error::format(
                path,
                format!("index claims {count} entries ({needed} bytes) but only {available} bytes follow"),
            ));
        }
        let count = count as usize;
        let mut entries: Vec<IndexEntry> = Vec::with_capacity(count);
        for i in 0..count {
            let time = read_u64(r, path)?;
            let byte = read_u64(r, path)?;
            if let Some(prev) = entries.last() {
                if time < prev.time || byte < prev.byte {
                    return Err(Error::format(
                        path,
                        format!("index entry {i} goes backwards ({time}, {byte}) after ({}, {})", prev.time, prev.byte),
                    ));
                }
            }
            if time > i as u64 * u64::from(interval) {
                return Err(Error::format(
                    path,
                    format!("index entry {i} at time {time} lies after its grid point"),
                ));
            }
            entries.push(IndexEntry { time, byte });
        }
        Ok(Self { interval, entries })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Writer-side builder
// ─────────────────────────────────────────────────────────────────────────────

/// Accumulates index entries while datagrams are appended.
#[derive(Debug)]
pub struct IndexBuilder {
    interval: u32,
    entries: Vec<IndexEntry>,
    prev: IndexEntry,
}

impl IndexBuilder {
    /// `first_byte` is the byte position of the datagram zone, i.e. where the
    /// datagram starting at time 0 will be written.
    pub fn new(interval: u32, first_byte: u64) -> Result<Self> {
        if interval == 0 {
            return Err(Error::invalid_argument("index interval must be at least one sample"));
        }
        let first = IndexEntry { time: 0, byte: first_byte };
        Ok(Self {
            interval,
            entries: vec![first],
            prev: first,
        })
    }

    /// Register the start of the datagram about to be written.
    ///
    /// Every grid point strictly before `time` that has no entry yet gets one
    /// pointing at the *previous* datagram start.  Returns the entry count.
    pub fn feed(&mut self, byte: u64, time: u64) -> usize {
        let mut next_grid = self.entries.len() as u64 * u64::from(self.interval);
        while next_grid < time {
            self.entries.push(self.prev);
            next_grid += u64::from(self.interval);
        }
        self.prev = IndexEntry { time, byte };
        self.entries.len()
    }

    pub fn interval(&self) -> u32 {
        self.interval
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Close the index at the end of the stream so grid points covered by the
    /// last datagram also get entries.
    pub fn finish(mut self, end_time: u64) -> TimelineIndex {
        let mut next_grid = self.entries.len() as u64 * u64::from(self.interval);
        while next_grid < end_time {
            self.entries.push(self.prev);
            next_grid += u64::from(self.interval);
        }
        TimelineIndex {
            interval: self.interval,
            entries: self.entries,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    /// Datagrams of the given durations, each `size` bytes long, starting at byte 100.
    fn build(interval: u32, durations: &[u64], size: u64) -> TimelineIndex {
        let mut b = IndexBuilder::new(interval, 100).unwrap();
        let (mut byte, mut time) = (100u64, 0u64);
        for &d in durations {
            b.feed(byte, time);
            byte += size;
            time += d;
        }
        b.finish(time)
    }

    #[test]
    fn test_entries_point_at_or_before_grid() {
        let idx = build(10, &[4, 4, 4, 4, 4, 4, 4, 4], 20);
        for (i, e) in idx.entries().iter().enumerate() {
            assert!(e.time <= i as u64 * 10, "entry {i}: {e:?}");
        }
        // grid 10 → datagram starting at 8 (third), byte 140
        assert_eq!(idx.entries()[1], IndexEntry { time: 8, byte: 140 });
        // grid 20 → datagram starting at 20 is only registered once a later start passes 20
        assert_eq!(idx.entries()[2], IndexEntry { time: 20, byte: 200 });
    }

    #[test]
    fn test_long_datagram_repeats_entry() {
        let idx = build(10, &[35, 1, 1], 20);
        assert_eq!(idx.len(), 4);
        for e in &idx.entries()[..4] {
            assert_eq!(e.byte, 100);
        }
    }

    #[test]
    fn test_entry_before_clamps() {
        let idx = build(10, &[5, 5, 5], 20);
        let last = *idx.entries().last().unwrap();
        assert_eq!(idx.entry_before(10_000), last);
        assert_eq!(idx.find_offset(0), 100);
    }

    #[test]
    fn test_finish_covers_last_datagram() {
        // three datagrams of 5 samples: grid 10 falls inside the last one
        let idx = build(10, &[5, 5, 5], 20);
        assert_eq!(idx.len(), 2);
        assert_eq!(idx.entry_before(12), IndexEntry { time: 10, byte: 140 });
    }

    #[test]
    fn test_zero_interval_rejected() {
        assert!(IndexBuilder::new(0, 0).is_err());
    }

    #[test]
    fn test_disk_form() {
        let idx = build(7, &[3, 3, 3, 3, 3, 3], 13);
        let mut buf = Vec::new();
        let n = idx.write_to(&mut buf).unwrap();
        assert_eq!(n, buf.len() as u64);
        let back = TimelineIndex::read_from(&mut Cursor::new(&buf), Path::new("t"), n).unwrap();
        assert_eq!(back, idx);
    }

    #[test]
    fn test_backwards_entry_rejected() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&2u32.to_be_bytes());
        buf.extend_from_slice(&10u32.to_be_bytes());
        for (t, b) in [(0u64, 500u64), (5, 400)] {
            buf.extend_from_slice(&t.to_be_bytes());
            buf.extend_from_slice(&b.to_be_bytes());
        }
        assert!(TimelineIndex::read_from(&mut Cursor::new(&buf), Path::new("t"), buf.len() as u64).is_err());
    }

    #[test]
    fn test_entry_count_beyond_the_file() {
        let idx = build(7, &[3, 3, 3], 13);
        let mut buf = Vec::new();
        idx.write_to(&mut buf).unwrap();
        buf[..4].copy_from_slice(&u32::MAX.to_be_bytes());
        let err = TimelineIndex::read_from(&mut Cursor::new(&buf), Path::new("t"), buf.len() as u64).unwrap_err();
        assert!(matches!(err, Error::Format { .. }), "{err}");
    }
}
