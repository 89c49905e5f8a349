//! Sequential timeline writer.
//!
//! The header is written up front with fixed-width placeholders for the
//! values only known at the end (datagram count, datagram-zone position,
//! index position).  [`TimelineWriter::close`] appends the index after the
//! datagrams and seeks back to overwrite just those placeholders, so the
//! format stays single-pass writable.
//!
//! | Field            | Type  | Notes |
//! |------------------|-------|-------|
//! | header           | 12 B  | kind = timeline |
//! | history          | u16 + UTF-8 | free-text processing history |
//! | sample rate      | u32   | |
//! | num datagrams    | u64   | placeholder |
//! | datagram zone    | u64   | placeholder |
//! | index position   | u64   | placeholder |
//! | datagrams…       |       | see [`Datagram`] |
//! | index            |       | see [`TimelineIndex`](crate::index::TimelineIndex) |

use std::{
    fs::File,
    io::{BufWriter, Seek, SeekFrom, Write},
    path::{Path, PathBuf},
};

use tracing::{debug, info};

use crate::{
    datagram::{rescale, Datagram},
    error::{Error, IoContext, Result},
    header::{write_header, write_history, FileKind, HEADER_LEN},
    index::IndexBuilder,
};

/// Width of the three backpatched header fields.
const PLACEHOLDER_LEN: u64 = 24;

/// Longest datagram accepted, in index intervals.  Every interval a datagram
/// spans costs one index entry, so this also bounds index growth per feed.
pub const MAX_DATAGRAM_INTERVALS: u64 = 1 << 16;

/// What a finished timeline contains.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimelineSummary {
    pub num_datagrams: u64,
    pub total_duration: u64,
    pub index_entries: usize,
}

/// Owns the output file for the whole build step.  Dropping the writer
/// without calling [`close`](Self::close) leaves an unusable file.
pub struct TimelineWriter {
    out: BufWriter<File>,
    path: PathBuf,
    sample_rate: u32,
    placeholder_pos: u64,
    datagrams_pos: u64,
    byte_pos: u64,
    time: u64,
    num_datagrams: u64,
    index: IndexBuilder,
}

impl TimelineWriter {
    /// Create `path` (truncating any previous file) and write the header.
    ///
    /// `index_interval_secs` is the index density: one entry per that many
    /// seconds of timeline.
    pub fn create(
        path: &Path,
        processing_history: &str,
        sample_rate: u32,
        index_interval_secs: f64,
    ) -> Result<Self> {
        if sample_rate == 0 {
            return Err(Error::invalid_argument("timeline sample rate must be positive"));
        }
        if !(index_interval_secs > 0.0) {
            return Err(Error::invalid_argument(format!(
                "index interval must be positive, got {index_interval_secs}"
            )));
        }
        let interval = (index_interval_secs * f64::from(sample_rate)).round();
        if interval < 1.0 || interval > f64::from(u32::MAX) {
            return Err(Error::invalid_argument(format!(
                "index interval of {index_interval_secs} s at {sample_rate} Hz is not a usable sample count"
            )));
        }

        let file = File::options()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)
            .io_context(|| format!("creating timeline {}", path.display()))?;
        let mut out = BufWriter::new(file);

        write_header(&mut out, FileKind::Timeline)
            .io_context(|| format!("writing header of {}", path.display()))?;
        let history_len = write_history(&mut out, processing_history)?;
        out.write_all(&sample_rate.to_be_bytes())
            .and_then(|_| out.write_all(&[0u8; PLACEHOLDER_LEN as usize]))
            .io_context(|| format!("writing header of {}", path.display()))?;

        let placeholder_pos = HEADER_LEN + history_len + 4;
        let datagrams_pos = placeholder_pos + PLACEHOLDER_LEN;
        debug!(
            path = %path.display(),
            sample_rate,
            interval_samples = interval as u32,
            datagrams_pos,
            "opened timeline"
        );

        Ok(Self {
            out,
            path: path.to_path_buf(),
            sample_rate,
            placeholder_pos,
            datagrams_pos,
            byte_pos: datagrams_pos,
            time: 0,
            num_datagrams: 0,
            index: IndexBuilder::new(interval as u32, datagrams_pos)?,
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Cumulative duration written so far, in timeline samples.
    pub fn time_pointer(&self) -> u64 {
        self.time
    }

    /// Byte position where the next datagram goes.
    pub fn byte_pointer(&self) -> u64 {
        self.byte_pos
    }

    pub fn num_datagrams(&self) -> u64 {
        self.num_datagrams
    }

    pub fn datagrams_pos(&self) -> u64 {
        self.datagrams_pos
    }

    /// Append one datagram whose duration is expressed at `datagram_rate`.
    pub fn feed(&mut self, datagram: &Datagram, datagram_rate: u32) -> Result<()> {
        if datagram_rate == 0 {
            return Err(Error::invalid_argument("datagram sample rate must be positive"));
        }
        let duration = rescale(datagram.duration(), datagram_rate, self.sample_rate);
        let max_duration = u64::from(self.index.interval()) * MAX_DATAGRAM_INTERVALS;
        if duration > max_duration {
            return Err(Error::invalid_argument(format!(
                "datagram of {duration} samples is longer than the {max_duration} samples a datagram may span"
            )));
        }
        let end = self.time.checked_add(duration).ok_or_else(|| {
            Error::invalid_argument(format!(
                "datagram of {duration} samples overflows the timeline at time {}",
                self.time
            ))
        })?;

        self.index.feed(self.byte_pos, self.time);

        let written = if duration == datagram.duration() {
            datagram.write_to(&mut self.out)
        } else {
            datagram.clone().with_duration(duration).write_to(&mut self.out)
        }
        .io_context(|| format!("appending datagram {} to {}", self.num_datagrams, self.path.display()))?;

        self.byte_pos += written;
        self.time = end;
        self.num_datagrams += 1;
        Ok(())
    }

    /// Append several datagrams sharing one sample rate.
    pub fn feed_all(&mut self, datagrams: &[Datagram], datagram_rate: u32) -> Result<()> {
        for d in datagrams {
            self.feed(d, datagram_rate)?;
        }
        Ok(())
    }

    /// Write the index, backpatch the header and close the file.
    pub fn close(self) -> Result<TimelineSummary> {
        let Self {
            mut out,
            path,
            placeholder_pos,
            datagrams_pos,
            byte_pos,
            time,
            num_datagrams,
            index,
            ..
        } = self;

        let index = index.finish(time);
        let index_pos = byte_pos;
        index
            .write_to(&mut out)
            .io_context(|| format!("writing index of {}", path.display()))?;

        let mut file = out
            .into_inner()
            .map_err(|e| Error::io(format!("flushing {}", path.display()), e.into_error()))?;
        file.seek(SeekFrom::Start(placeholder_pos))
            .and_then(|_| file.write_all(&num_datagrams.to_be_bytes()))
            .and_then(|_| file.write_all(&datagrams_pos.to_be_bytes()))
            .and_then(|_| file.write_all(&index_pos.to_be_bytes()))
            .and_then(|_| file.sync_all())
            .io_context(|| format!("backpatching header of {}", path.display()))?;

        let summary = TimelineSummary {
            num_datagrams,
            total_duration: time,
            index_entries: index.len(),
        };
        info!(
            path = %path.display(),
            datagrams = summary.num_datagrams,
            total_samples = summary.total_duration,
            index_entries = summary.index_entries,
            "closed timeline"
        );
        Ok(summary)
    }
}
