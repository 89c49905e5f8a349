//! Common file header shared by timeline, unit and SCost files.
//!
//! Layout (all integers big-endian):
//!
//! | Offset | Size | Field     |
//! |--------|------|-----------|
//! | 0      | 4    | magic `0x4D415259` (`"MARY"`) |
//! | 4      | 4    | format version |
//! | 8      | 4    | file kind |
//!
//! Timeline files follow the header with a length-prefixed processing-history
//! string (see [`write_history`] / [`read_history`]).

use std::io::{Read, Write};
use std::path::Path;

use crate::error::{Error, Result};

/// `"MARY"` in ASCII.
pub const MAGIC: u32 = 0x4D41_5259;

/// Format version written by this crate.
pub const VERSION: u32 = 40;

/// Size of the common header on disk.
pub const HEADER_LEN: u64 = 12;

/// What a file contains; stored as the third header word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Timeline,
    Units,
    Scost,
}

impl FileKind {
    pub fn code(self) -> u32 {
        match self {
            FileKind::Timeline => 300,
            FileKind::Units => 400,
            FileKind::Scost => 900,
        }
    }

    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            300 => Some(FileKind::Timeline),
            400 => Some(FileKind::Units),
            900 => Some(FileKind::Scost),
            _ => None,
        }
    }
}

impl std::fmt::Display for FileKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            FileKind::Timeline => "timeline",
            FileKind::Units => "unit file",
            FileKind::Scost => "scost file",
        };
        f.write_str(name)
    }
}

/// Write the 12-byte header for `kind`.
pub fn write_header<W: Write>(w: &mut W, kind: FileKind) -> std::io::Result<()> {
    w.write_all(&MAGIC.to_be_bytes())?;
    w.write_all(&VERSION.to_be_bytes())?;
    w.write_all(&kind.code().to_be_bytes())
}

/// Read and validate the header, requiring it to declare `expected`.
///
/// `path` is only used for error messages.
pub fn read_header<R: Read>(r: &mut R, expected: FileKind, path: &Path) -> Result<u32> {
    let mut buf = [0u8; HEADER_LEN as usize];
    r.read_exact(&mut buf)
        .map_err(|_| Error::format(path, "file too short for header"))?;

    let magic = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]);
    if magic != MAGIC {
        return Err(Error::format(path, format!("bad magic 0x{magic:08X}")));
    }
    let version = u32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]);
    if version > VERSION {
        return Err(Error::format(
            path,
            format!("unsupported format version {version} (newest known is {VERSION})"),
        ));
    }
    let code = u32::from_be_bytes([buf[8], buf[9], buf[10], buf[11]]);
    match FileKind::from_code(code) {
        Some(kind) if kind == expected => Ok(version),
        Some(kind) => Err(Error::format(path, format!("expected a {expected}, found a {kind}"))),
        None => Err(Error::format(path, format!("unknown file kind {code}"))),
    }
}

/// Write the processing-history text as `u16` byte length + UTF-8.
pub fn write_history<W: Write>(w: &mut W, history: &str) -> Result<u64> {
    let bytes = history.as_bytes();
    let len = u16::try_from(bytes.len()).map_err(|_| {
        Error::invalid_argument(format!(
            "processing history is {} bytes; at most {} fit the header",
            bytes.len(),
            u16::MAX
        ))
    })?;
    w.write_all(&len.to_be_bytes())
        .and_then(|_| w.write_all(bytes))
        .map_err(|e| Error::io("writing processing history", e))?;
    Ok(2 + bytes.len() as u64)
}

/// Inverse of [`write_history`].
pub fn read_history<R: Read>(r: &mut R, path: &Path) -> Result<String> {
    let len = read_u16(r, path)? as usize;
    let mut buf = vec![0u8; len];
    r.read_exact(&mut buf)
        .map_err(|_| Error::format(path, "truncated processing history"))?;
    String::from_utf8(buf).map_err(|_| Error::format(path, "processing history is not valid UTF-8"))
}

// ─────────────────────────────────────────────────────────────────────────────
// Big-endian field readers
// ─────────────────────────────────────────────────────────────────────────────

macro_rules! be_reader {
    ($name:ident, $ty:ty, $n:expr) => {
        pub(crate) fn $name<R: Read>(r: &mut R, path: &Path) -> Result<$ty> {
            let mut buf = [0u8; $n];
            r.read_exact(&mut buf).map_err(|e| {
                if e.kind() == std::io::ErrorKind::UnexpectedEof {
                    Error::format(path, concat!("unexpected end of file reading ", stringify!($ty)))
                } else {
                    Error::io(format!("reading {}", path.display()), e)
                }
            })?;
            Ok(<$ty>::from_be_bytes(buf))
        }
    };
}

be_reader!(read_u16, u16, 2);
be_reader!(read_u32, u32, 4);
be_reader!(read_i32, i32, 4);
be_reader!(read_u64, u64, 8);
be_reader!(read_i64, i64, 8);
be_reader!(read_f32, f32, 4);
