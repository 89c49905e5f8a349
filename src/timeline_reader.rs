//! Random-access reader for finalized timeline files.
//!
//! A time request is answered in two steps: the index gives the byte offset
//! of a datagram starting at or before the request, then datagram framings
//! are skipped forwards until the datagram containing the request is found.
//! The forward scan is bounded by the index interval.
//!
//! The file handle sits behind a [`Mutex`], so one reader can be shared
//! between threads; independent readers over the same file never interfere.

use std::{
    fs::File,
    io::{BufReader, Seek, SeekFrom},
    path::{Path, PathBuf},
    sync::Mutex,
};

use crate::{
    datagram::{rescale, Datagram},
    error::{Error, IoContext, Result},
    header::{read_header, read_history, read_u32, read_u64, FileKind},
    index::TimelineIndex,
    unitfile::Unit,
};

/// Datagrams returned by a span query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Span {
    pub datagrams: Vec<Datagram>,
    /// Distance from the requested time back to the start of the first
    /// returned datagram.
    pub offset: u64,
}

impl Span {
    /// Sum of the returned datagram durations.
    pub fn duration(&self) -> u64 {
        self.datagrams.iter().map(Datagram::duration).sum()
    }
}

/// Where a lookup landed: the containing datagram's byte and start time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Position {
    pub byte: u64,
    pub time: u64,
}

#[derive(Debug)]
pub struct TimelineReader {
    path: PathBuf,
    file: Mutex<BufReader<File>>,
    history: String,
    sample_rate: u32,
    num_datagrams: u64,
    datagrams_pos: u64,
    index_pos: u64,
    index: TimelineIndex,
    total_duration: u64,
}

impl TimelineReader {
    /// Open a timeline, validate its header and load the index.
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| {
            Error::config(format!("cannot open timeline {}: {e}", path.display()))
        })?;
        let file_len = file
            .metadata()
            .io_context(|| format!("reading metadata of {}", path.display()))?
            .len();
        let mut r = BufReader::new(file);

        read_header(&mut r, FileKind::Timeline, path)?;
        let history = read_history(&mut r, path)?;
        let sample_rate = read_u32(&mut r, path)?;
        let num_datagrams = read_u64(&mut r, path)?;
        let datagrams_pos = read_u64(&mut r, path)?;
        let index_pos = read_u64(&mut r, path)?;

        if sample_rate == 0 {
            return Err(Error::format(path, "sample rate is zero"));
        }
        if datagrams_pos == 0 || index_pos < datagrams_pos {
            return Err(Error::format(
                path,
                format!("index at byte {index_pos} precedes datagram zone at {datagrams_pos}; was the writer closed?"),
            ));
        }
        if index_pos > file_len {
            return Err(Error::format(
                path,
                format!("index position {index_pos} is past the end of the file ({file_len} bytes)"),
            ));
        }

        r.seek(SeekFrom::Start(index_pos))
            .io_context(|| format!("seeking to index of {}", path.display()))?;
        let index = TimelineIndex::read_from(&mut r, path, file_len - index_pos)?;
        if index.entries()[0].byte != datagrams_pos {
            return Err(Error::format(path, "first index entry does not point at the datagram zone"));
        }

        // The last entry is at most one interval from the end; finish the
        // total duration from there.
        let last = index.entry_before(u64::MAX);
        r.seek(SeekFrom::Start(last.byte))
            .io_context(|| format!("seeking in {}", path.display()))?;
        let (mut byte, mut time) = (last.byte, last.time);
        while byte < index_pos {
            let (duration, size) = Datagram::skip_from(&mut r, path)?;
            byte += size;
            time = time
                .checked_add(duration)
                .ok_or_else(|| Error::format(path, "datagram durations overflow the timeline"))?;
        }
        if byte != index_pos {
            return Err(Error::format(path, "last datagram overlaps the index block"));
        }

        Ok(Self {
            path: path.to_path_buf(),
            file: Mutex::new(r),
            history,
            sample_rate,
            num_datagrams,
            datagrams_pos,
            index_pos,
            index,
            total_duration: time,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn processing_history(&self) -> &str {
        &self.history
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn num_datagrams(&self) -> u64 {
        self.num_datagrams
    }

    pub fn datagrams_pos(&self) -> u64 {
        self.datagrams_pos
    }

    pub fn index(&self) -> &TimelineIndex {
        &self.index
    }

    /// Sum of all datagram durations, in timeline samples.
    pub fn total_duration(&self) -> u64 {
        self.total_duration
    }

    /// Byte offset of the datagram starting at or before `time`, according
    /// to the index alone.
    pub fn find_offset(&self, time: u64) -> u64 {
        self.index.find_offset(time)
    }

    /// Position of the datagram whose `[start, start + duration)` contains
    /// `time`.
    pub fn locate(&self, time: u64) -> Result<Position> {
        let mut f = self.lock();
        self.locate_locked(&mut f, time)
    }

    /// The datagram containing `time` (timeline samples).
    pub fn datagram_at(&self, time: u64) -> Result<Datagram> {
        let mut f = self.lock();
        let pos = self.locate_locked(&mut f, time)?;
        Datagram::read_from(&mut *f, &self.path, self.index_pos - pos.byte)
    }

    /// Like [`datagram_at`](Self::datagram_at) with `time` and the returned
    /// duration expressed at `rate`.
    pub fn datagram_at_rate(&self, time: u64, rate: u32) -> Result<Datagram> {
        check_rate(rate)?;
        let d = self.datagram_at(rescale(time, rate, self.sample_rate))?;
        let duration = rescale(d.duration(), self.sample_rate, rate);
        Ok(d.with_duration(duration))
    }

    /// Datagrams covering `[time, time + span)`; at least one is returned.
    pub fn datagrams_in_span(&self, time: u64, span: u64) -> Result<Span> {
        self.datagrams_in_span_at_rate(time, span, self.sample_rate)
    }

    /// Span query with times and durations expressed at `rate`.
    pub fn datagrams_in_span_at_rate(&self, time: u64, span: u64, rate: u32) -> Result<Span> {
        check_rate(rate)?;
        let target = rescale(time, rate, self.sample_rate);
        let end = rescale(time.saturating_add(span), rate, self.sample_rate);
        self.read_run(target, rate, |read, t| read > 0 && t >= end)
    }

    /// `count` datagrams starting with the one containing `time`; at least
    /// one is returned even when `count` is zero.
    pub fn datagrams_by_count(&self, time: u64, count: usize) -> Result<Span> {
        let count = count.max(1);
        self.read_run(time, self.sample_rate, |read, _| read >= count)
    }

    /// The audio/parameter datagrams backing one unit.
    ///
    /// Sentinel units have no extent and map to an empty span, including the
    /// end sentinel of the last utterance, which sits at the total duration.
    pub fn unit_datagrams(&self, unit: &Unit) -> Result<Span> {
        if unit.is_sentinel() {
            return Ok(Span {
                datagrams: Vec::new(),
                offset: 0,
            });
        }
        let span = u64::try_from(unit.duration).unwrap_or(0);
        self.datagrams_in_span(unit.start, span)
    }

    /// Sequential scan over every datagram, independent of this reader's
    /// handle.
    pub fn iter(&self) -> Result<DatagramIter> {
        let file = File::open(&self.path)
            .io_context(|| format!("reopening {}", self.path.display()))?;
        let mut r = BufReader::new(file);
        r.seek(SeekFrom::Start(self.datagrams_pos))
            .io_context(|| format!("seeking in {}", self.path.display()))?;
        Ok(DatagramIter {
            reader: r,
            path: self.path.clone(),
            byte: self.datagrams_pos,
            end: self.index_pos,
        })
    }

    // ── Internals ─────────────────────────────────────────────────────────────

    fn lock(&self) -> std::sync::MutexGuard<'_, BufReader<File>> {
        self.file.lock().expect("timeline reader mutex poisoned")
    }

    /// Leaves `f` positioned at the start of the containing datagram.
    fn locate_locked(&self, f: &mut BufReader<File>, target: u64) -> Result<Position> {
        if target >= self.total_duration {
            return Err(Error::OutOfRange {
                requested: target,
                total: self.total_duration,
            });
        }
        let entry = self.index.entry_before(target);
        let (mut byte, mut time) = (entry.byte, entry.time);
        f.seek(SeekFrom::Start(byte))
            .io_context(|| format!("seeking in {}", self.path.display()))?;
        loop {
            if byte >= self.index_pos {
                return Err(Error::format(
                    &self.path,
                    format!("ran into the index while looking for time {target}"),
                ));
            }
            let (duration, size) = Datagram::skip_from(f, &self.path)?;
            if time.saturating_add(duration) > target {
                f.seek(SeekFrom::Start(byte))
                    .io_context(|| format!("seeking in {}", self.path.display()))?;
                return Ok(Position { byte, time });
            }
            byte += size;
            time += duration;
        }
    }

    /// Read datagrams from the one containing `target` (timeline samples)
    /// until `done(read_so_far, time_after_last)` holds or the stream ends.
    fn read_run(
        &self,
        target: u64,
        rate: u32,
        done: impl Fn(usize, u64) -> bool,
    ) -> Result<Span> {
        let mut f = self.lock();
        let start = self.locate_locked(&mut f, target)?;
        let (mut byte, mut time) = (start.byte, start.time);
        let mut datagrams = Vec::new();
        while byte < self.index_pos {
            let d = Datagram::read_from(&mut *f, &self.path, self.index_pos - byte)?;
            byte += d.encoded_len();
            time = time.saturating_add(d.duration());
            let duration = rescale(d.duration(), self.sample_rate, rate);
            datagrams.push(d.with_duration(duration));
            if done(datagrams.len(), time) {
                break;
            }
        }
        Ok(Span {
            datagrams,
            offset: rescale(target - start.time, self.sample_rate, rate),
        })
    }
}

fn check_rate(rate: u32) -> Result<()> {
    if rate == 0 {
        return Err(Error::invalid_argument("requested sample rate must be positive"));
    }
    Ok(())
}

/// Iterator returned by [`TimelineReader::iter`].
pub struct DatagramIter {
    reader: BufReader<File>,
    path: PathBuf,
    byte: u64,
    end: u64,
}

impl Iterator for DatagramIter {
    type Item = Result<Datagram>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.byte >= self.end {
            return None;
        }
        match Datagram::read_from(&mut self.reader, &self.path, self.end - self.byte) {
            Ok(d) => {
                self.byte += d.encoded_len();
                Some(Ok(d))
            }
            Err(e) => {
                self.byte = self.end;
                Some(Err(e))
            }
        }
    }
}
