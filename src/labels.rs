//! Phone / half-phone label files and pause clean-up.
//!
//! A label file is a free-form header terminated by a line starting with
//! `#`, followed by one line per segment:
//!
//! ```text
//! separator ;
//! nfields 1
//! #
//! 0.21000 125 _
//! 0.30000 125 h
//! 0.41250 125 E 0.75
//! ```
//!
//! Columns are the segment end time in seconds, a unit index (any integer;
//! kept as-is) and the symbol.  Anything after the symbol is kept as extra
//! fields; the first one is read as a cost by the SCost step.  Start times
//! are implicit: the first segment starts at 0, every other one where its
//! predecessor ends.

use std::collections::HashSet;
use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use crate::batch::{BatchReport, Progress};
use crate::error::{Error, Result};

/// `end [unit_index] symbol [extra…]`
static RE_LABEL_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*([-+]?[0-9]*\.?[0-9]+(?:[eE][-+]?[0-9]+)?)\s+(?:(-?\d+)\s+)?(\S+)(?:\s+(.*?))?\s*$").unwrap()
});

#[derive(Debug, Clone, PartialEq)]
pub struct Label {
    pub start: f64,
    pub end: f64,
    pub unit_index: i32,
    pub name: String,
    pub extra: Vec<String>,
}

impl Label {
    pub fn new(start: f64, end: f64, name: impl Into<String>) -> Self {
        Self {
            start,
            end,
            unit_index: 0,
            name: name.into(),
            extra: Vec::new(),
        }
    }

    pub fn duration(&self) -> f64 {
        self.end - self.start
    }

    /// The first extra field read as a cost, if present and numeric.
    pub fn cost(&self) -> Option<f32> {
        self.extra.first().and_then(|s| s.parse().ok())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LabelFile {
    /// Header lines, including the terminating `#` line.
    pub header: Vec<String>,
    pub labels: Vec<Label>,
}

impl LabelFile {
    pub fn new(labels: Vec<Label>) -> Self {
        Self {
            header: vec!["#".to_string()],
            labels,
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::config(format!("cannot read labels {}: {e}", path.display())))?;
        Self::parse(&text, path)
    }

    /// Parse label text; `path` is only used in error messages.
    pub fn parse(text: &str, path: &Path) -> Result<Self> {
        let mut lines = text.lines().enumerate();
        let mut header = Vec::new();
        loop {
            let Some((_, line)) = lines.next() else {
                return Err(Error::format(path, "label header is not terminated by a '#' line"));
            };
            header.push(line.to_string());
            if line.starts_with('#') {
                break;
            }
        }

        let mut labels: Vec<Label> = Vec::new();
        for (n, line) in lines {
            if line.trim().is_empty() {
                continue;
            }
            let caps = RE_LABEL_LINE
                .captures(line)
                .ok_or_else(|| Error::format(path, format!("line {}: malformed label '{line}'", n + 1)))?;
            let end: f64 = caps[1]
                .parse()
                .map_err(|_| Error::format(path, format!("line {}: bad time '{}'", n + 1, &caps[1])))?;
            let unit_index = match caps.get(2) {
                Some(m) => m.as_str().parse().map_err(|_| {
                    Error::format(path, format!("line {}: bad unit index '{}'", n + 1, m.as_str()))
                })?,
                None => 0,
            };
            let start = labels.last().map_or(0.0, |l| l.end);
            if end < start {
                return Err(Error::format(
                    path,
                    format!("line {}: label ends at {end} s before it starts at {start} s", n + 1),
                ));
            }
            let extra = caps
                .get(4)
                .map(|m| m.as_str().split_whitespace().map(str::to_string).collect())
                .unwrap_or_default();
            labels.push(Label {
                start,
                end,
                unit_index,
                name: caps[3].to_string(),
                extra,
            });
        }
        Ok(Self { header, labels })
    }

    pub fn to_text(&self) -> String {
        let mut out = String::new();
        for h in &self.header {
            out.push_str(h);
            out.push('\n');
        }
        for l in &self.labels {
            out.push_str(&format!("{:.5} {} {}", l.end, l.unit_index, l.name));
            for x in &l.extra {
                out.push(' ');
                out.push_str(x);
            }
            out.push('\n');
        }
        out
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.to_text())
            .map_err(|e| Error::io(format!("writing labels {}", path.display()), e))
    }

    /// End time of the last label.
    pub fn total_duration(&self) -> f64 {
        self.labels.last().map_or(0.0, |l| l.end)
    }

    pub fn end_times(&self) -> Vec<f64> {
        self.labels.iter().map(|l| l.end).collect()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Pause clean-up
// ─────────────────────────────────────────────────────────────────────────────

/// How pause labels are recognised and cleaned.
#[derive(Debug, Clone)]
pub struct PausePolicy {
    /// Canonical pause symbol.
    pub symbol: String,
    /// Other spellings rewritten to `symbol`.
    pub aliases: HashSet<String>,
    /// Interior pauses shorter than this many seconds are deleted.
    pub min_duration: f64,
}

impl Default for PausePolicy {
    fn default() -> Self {
        Self {
            symbol: "_".to_string(),
            aliases: ["pau", "sil", "ssil", "SIL", "h#", "#"].iter().map(|s| s.to_string()).collect(),
            min_duration: 0.04,
        }
    }
}

impl PausePolicy {
    pub fn is_pause(&self, name: &str) -> bool {
        name == self.symbol || self.aliases.contains(name)
    }
}

/// Label times are saved with five decimals; pause lengths are compared on
/// that grid so a saved file cleans the same way it was cleaned.
const TICKS_PER_SECOND: f64 = 1e5;

fn ticks(seconds: f64) -> i64 {
    (seconds * TICKS_PER_SECOND).round() as i64
}

/// What [`clean_pauses`] changed.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PauseEdits {
    pub renamed: usize,
    pub merged: usize,
    pub deleted: usize,
}

impl PauseEdits {
    pub fn is_empty(&self) -> bool {
        self.renamed + self.merged + self.deleted == 0
    }
}

/// Canonicalise pause symbols, merge adjacent pauses and delete short
/// interior pauses, splitting their time evenly between both neighbours.
///
/// Pauses in the first or last position are never deleted.  Running this
/// twice changes nothing the second time.
pub fn clean_pauses(labels: &mut Vec<Label>, policy: &PausePolicy) -> PauseEdits {
    let mut edits = PauseEdits::default();

    for l in labels.iter_mut() {
        if l.name != policy.symbol && policy.aliases.contains(&l.name) {
            l.name = policy.symbol.clone();
            edits.renamed += 1;
        }
    }

    let mut i = 0;
    while i + 1 < labels.len() {
        if labels[i].name == policy.symbol && labels[i + 1].name == policy.symbol {
            let next = labels.remove(i + 1);
            labels[i].end = next.end;
            edits.merged += 1;
        } else {
            i += 1;
        }
    }

    let mut i = 1;
    while i + 1 < labels.len() {
        let l = &labels[i];
        if l.name == policy.symbol && ticks(l.end) - ticks(l.start) < ticks(policy.min_duration) {
            let pause = labels.remove(i);
            let split = pause.start + pause.duration() / 2.0;
            labels[i - 1].end = split;
            labels[i].start = split;
            edits.deleted += 1;
        } else {
            i += 1;
        }
    }

    edits
}

/// Clean every basename's label file from `in_dir` into `out_dir`.
///
/// A basename whose file cannot be read or parsed is recorded as failed and
/// skipped; the rest of the batch still runs.
pub fn clean_pause_labels(
    basenames: &[String],
    in_dir: &Path,
    out_dir: &Path,
    ext: &str,
    policy: &PausePolicy,
) -> Result<BatchReport> {
    std::fs::create_dir_all(out_dir)
        .map_err(|e| Error::config(format!("cannot create {}: {e}", out_dir.display())))?;

    let mut report = BatchReport::default();
    let mut progress = Progress::new("pause-labels", basenames.len());
    for basename in basenames {
        let outcome = (|| -> Result<PauseEdits> {
            let mut file = LabelFile::load(&in_dir.join(format!("{basename}{ext}")))?;
            let edits = clean_pauses(&mut file.labels, policy);
            file.save(&out_dir.join(format!("{basename}{ext}")))?;
            Ok(edits)
        })();
        if let Ok(edits) = &outcome {
            if !edits.is_empty() {
                debug!(basename = %basename, ?edits, "cleaned pauses");
            }
        }
        report.record(basename, outcome);
        progress.advance();
    }
    report.log_summary("pause-labels");
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(spec: &[(f64, &str)]) -> Vec<Label> {
        let mut start = 0.0;
        spec.iter()
            .map(|&(end, name)| {
                let l = Label::new(start, end, name);
                start = end;
                l
            })
            .collect()
    }

    fn names(ls: &[Label]) -> Vec<&str> {
        ls.iter().map(|l| l.name.as_str()).collect()
    }

    #[test]
    fn test_parse_label_file() {
        let text = "separator ;\nnfields 1\n#\n0.21 125 _\n0.30000 125 h\n\n0.4125 125 E 0.75\n";
        let f = LabelFile::parse(text, Path::new("a.lab")).unwrap();
        assert_eq!(f.header.len(), 3);
        assert_eq!(names(&f.labels), vec!["_", "h", "E"]);
        assert_eq!(f.labels[1].start, 0.21);
        assert_eq!(f.labels[1].end, 0.3);
        assert_eq!(f.labels[2].cost(), Some(0.75));
        assert_eq!(f.labels[0].cost(), None);
        assert_eq!(f.total_duration(), 0.4125);
    }

    #[test]
    fn test_two_column_lines() {
        let f = LabelFile::parse("#\n0.1 a\n0.2 b\n", Path::new("a.lab")).unwrap();
        assert_eq!(names(&f.labels), vec!["a", "b"]);
        assert_eq!(f.labels[0].unit_index, 0);
    }

    #[test]
    fn test_header_must_terminate() {
        assert!(LabelFile::parse("separator ;\n0.1 125 a\n", Path::new("a.lab")).is_err());
    }

    #[test]
    fn test_time_going_backwards() {
        assert!(LabelFile::parse("#\n0.3 125 a\n0.2 125 b\n", Path::new("a.lab")).is_err());
    }

    #[test]
    fn test_text_parses_back() {
        let text = "#\n0.21000 125 _\n0.30000 125 h\n0.41250 125 E 0.75\n";
        let f = LabelFile::parse(text, Path::new("a.lab")).unwrap();
        assert_eq!(f.to_text(), text);
    }

    #[test]
    fn test_pause_aliases_are_canonicalised() {
        let mut ls = labels(&[(0.2, "pau"), (0.3, "a"), (0.5, "sil")]);
        let edits = clean_pauses(&mut ls, &PausePolicy::default());
        assert_eq!(names(&ls), vec!["_", "a", "_"]);
        assert_eq!(edits.renamed, 2);
    }

    #[test]
    fn test_adjacent_pauses_merge() {
        let mut ls = labels(&[(0.1, "a"), (0.2, "_"), (0.3, "sil"), (0.4, "b")]);
        let edits = clean_pauses(&mut ls, &PausePolicy::default());
        assert_eq!(names(&ls), vec!["a", "_", "b"]);
        assert_eq!(ls[1].start, 0.1);
        assert_eq!(ls[1].end, 0.3);
        assert_eq!(edits.merged, 1);
    }

    #[test]
    fn test_short_interior_pause_is_split_between_neighbours() {
        let mut ls = labels(&[(0.1, "a"), (0.12, "_"), (0.3, "b")]);
        let edits = clean_pauses(&mut ls, &PausePolicy::default());
        assert_eq!(names(&ls), vec!["a", "b"]);
        assert!((ls[0].end - 0.11).abs() < 1e-12);
        assert_eq!(ls[1].start, ls[0].end);
        assert_eq!(ls[1].end, 0.3);
        assert_eq!(edits.deleted, 1);
    }

    #[test]
    fn test_edge_pauses_are_kept() {
        let mut ls = labels(&[(0.01, "_"), (0.2, "a"), (0.21, "_")]);
        let edits = clean_pauses(&mut ls, &PausePolicy::default());
        assert_eq!(names(&ls), vec!["_", "a", "_"]);
        assert!(edits.is_empty());
    }

    #[test]
    fn test_cleaning_is_idempotent() {
        let mut ls = labels(&[
            (0.05, "sil"),
            (0.06, "_"),
            (0.2, "a"),
            (0.21, "pau"),
            (0.4, "b"),
            (0.41, "_"),
            (0.42, "_"),
            (0.5, "c"),
            (0.9, "_"),
        ]);
        let policy = PausePolicy::default();
        let first = clean_pauses(&mut ls, &policy);
        assert!(!first.is_empty());
        let snapshot = ls.clone();
        let second = clean_pauses(&mut ls, &policy);
        assert!(second.is_empty(), "second pass edited: {second:?}");
        assert_eq!(ls, snapshot);
        for w in ls.windows(2) {
            assert_eq!(w[0].end, w[1].start);
        }
        assert_eq!(ls.last().unwrap().end, 0.9);
    }

    #[test]
    fn test_pause_at_threshold_is_kept() {
        // 0.15 - 0.11 is a hair under 0.04 in f64
        let mut ls = labels(&[(0.11, "a"), (0.15, "_"), (0.3, "b")]);
        let edits = clean_pauses(&mut ls, &PausePolicy::default());
        assert_eq!(names(&ls), vec!["a", "_", "b"]);
        assert!(edits.is_empty());
    }

    #[test]
    fn test_saved_labels_clean_the_same_way_twice() {
        let dir = tempfile::tempdir().unwrap();
        let (in_dir, out_dir) = (dir.path().join("lab"), dir.path().join("out"));
        std::fs::create_dir_all(&in_dir).unwrap();
        std::fs::write(in_dir.join("a.lab"), "#\n0.110004 125 a\n0.150005 125 _\n0.3 125 b\n").unwrap();
        let basenames = vec!["a".to_string()];
        let policy = PausePolicy::default();

        clean_pause_labels(&basenames, &in_dir, &out_dir, ".lab", &policy).unwrap();
        let first = std::fs::read_to_string(out_dir.join("a.lab")).unwrap();
        clean_pause_labels(&basenames, &out_dir, &out_dir, ".lab", &policy).unwrap();
        let second = std::fs::read_to_string(out_dir.join("a.lab")).unwrap();

        assert_eq!(first, second);
        let cleaned = LabelFile::parse(&second, Path::new("a.lab")).unwrap();
        assert_eq!(names(&cleaned.labels), vec!["a", "_", "b"]);
    }

    #[test]
    fn test_batch_skips_unreadable_basename() {
        let dir = tempfile::tempdir().unwrap();
        let (in_dir, out_dir) = (dir.path().join("lab"), dir.path().join("out"));
        std::fs::create_dir_all(&in_dir).unwrap();
        std::fs::write(in_dir.join("a.lab"), "#\n0.1 125 a\n0.11 125 pau\n0.3 125 b\n").unwrap();
        std::fs::write(in_dir.join("c.lab"), "#\n0.1 125 c\n").unwrap();
        let basenames = vec!["a".to_string(), "b".to_string(), "c".to_string()];

        let report = clean_pause_labels(&basenames, &in_dir, &out_dir, ".lab", &PausePolicy::default()).unwrap();
        assert_eq!(report.succeeded, vec!["a", "c"]);
        assert_eq!(report.skipped(), vec!["b"]);

        let cleaned = LabelFile::load(&out_dir.join("a.lab")).unwrap();
        assert_eq!(names(&cleaned.labels), vec!["a", "b"]);
        assert!(out_dir.join("c.lab").exists());
    }
}
