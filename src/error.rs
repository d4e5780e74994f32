//! The typed error and event taxonomy shared by the parser, the decoders and the prefetch planner.

use std::fmt;

pub type Result<T> = std::result::Result<T, Error>;
pub type PassiveResult = Result<()>;
pub type UnitResult = PassiveResult;

pub use std::io::Error as IoError;
pub use std::io::Result as IoResult;

/// One of the fixed set of ways that parsing or decoding can fail.
///
/// This set is intentionally closed: new failure modes should be mapped onto
/// the closest existing code rather than growing the enum, so host
/// applications can match on it exhaustively.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum ErrorCode {
    BufferTooSmall,
    InvalidMagic,
    TruncatedFile,
    MalformedHeader,
    PartNotFound,
    UnsupportedPartType,
    UnsupportedCompression,
    MissingDataWindow,
    MalformedOffsetTable,
    MalformedChunk,
    DecompressionFailed,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorCode::BufferTooSmall => "BUFFER_TOO_SMALL",
            ErrorCode::InvalidMagic => "INVALID_MAGIC",
            ErrorCode::TruncatedFile => "TRUNCATED_FILE",
            ErrorCode::MalformedHeader => "MALFORMED_HEADER",
            ErrorCode::PartNotFound => "PART_NOT_FOUND",
            ErrorCode::UnsupportedPartType => "UNSUPPORTED_PART_TYPE",
            ErrorCode::UnsupportedCompression => "UNSUPPORTED_COMPRESSION",
            ErrorCode::MissingDataWindow => "MISSING_DATA_WINDOW",
            ErrorCode::MalformedOffsetTable => "MALFORMED_OFFSET_TABLE",
            ErrorCode::MalformedChunk => "MALFORMED_CHUNK",
            ErrorCode::DecompressionFailed => "DECOMPRESSION_FAILED",
        };

        f.write_str(name)
    }
}

/// A labelled scalar attached to an [`Error`] or [`Event`], e.g. `("part_id", 2)`.
#[derive(Debug, Clone, PartialEq)]
pub enum Detail {
    Int(i64),
    UInt(u64),
    Text(String),
}

impl From<i64> for Detail { fn from(v: i64) -> Self { Detail::Int(v) } }
impl From<i32> for Detail { fn from(v: i32) -> Self { Detail::Int(v as i64) } }
impl From<u64> for Detail { fn from(v: u64) -> Self { Detail::UInt(v) } }
impl From<usize> for Detail { fn from(v: usize) -> Self { Detail::UInt(v as u64) } }
impl From<&str> for Detail { fn from(v: &str) -> Self { Detail::Text(v.to_owned()) } }
impl From<String> for Detail { fn from(v: String) -> Self { Detail::Text(v) } }

pub type Details = Vec<(&'static str, Detail)>;

/// A parse or decode failure. Carries a typed [`ErrorCode`] plus a human-readable
/// message and a small bag of labelled scalars (part id, chunk index, offsets, sizes, ...).
#[derive(Debug, Clone)]
pub struct Error {
    pub code: ErrorCode,
    pub message: String,
    pub details: Details,
}

impl Error {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self { code, message: message.into(), details: Vec::new() }
    }

    pub fn with(mut self, key: &'static str, value: impl Into<Detail>) -> Self {
        self.details.push((key, value.into()));
        self
    }

    /// Shorthand for a [`ErrorCode::MalformedHeader`], the catch-all for structural problems
    /// found while walking attribute records or the offset table.
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::MalformedHeader, message)
    }

    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::UnsupportedCompression, message)
    }

    pub fn truncated(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::TruncatedFile, message)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)?;

        for (key, value) in &self.details {
            write!(f, " [{}={:?}]", key, value)?;
        }

        Ok(())
    }
}

impl std::error::Error for Error {}

/// Enable using the `?` operator on `io::Result`.
impl From<IoError> for Error {
    fn from(error: IoError) -> Self {
        Error::new(ErrorCode::TruncatedFile, error.to_string())
    }
}

#[inline]
pub fn usize_to_i32(value: usize) -> Result<i32> {
    i32::try_from(value).map_err(|_| Error::invalid("value too large for i32"))
}

#[inline]
pub fn usize_to_u16(value: usize) -> Result<u16> {
    u16::try_from(value).map_err(|_| Error::invalid("value too large for u16"))
}

#[inline]
pub fn u64_to_usize(value: u64) -> Result<usize> {
    usize::try_from(value).map_err(|_| Error::new(ErrorCode::BufferTooSmall, "value too large for this platform's usize"))
}

/// The phase an [`Event`] was raised in.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Phase { Parse, Decode }

/// The severity of an [`Event`].
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Level { Info, Warn, Error }

/// A structured progress or diagnostic event raised while parsing or decoding.
/// Consumers should not assume synchronous delivery across threads; the driver
/// only guarantees that events it raises itself are emitted in decode order.
#[derive(Debug, Clone)]
pub struct Event {
    pub phase: Phase,
    pub level: Level,
    pub code: &'static str,
    pub message: String,
    pub metrics: Details,
}

impl Event {
    pub fn new(phase: Phase, level: Level, code: &'static str, message: impl Into<String>) -> Self {
        Self { phase, level, code, message: message.into(), metrics: Vec::new() }
    }

    pub fn with(mut self, key: &'static str, value: impl Into<Detail>) -> Self {
        self.metrics.push((key, value.into()));
        self
    }

    pub fn emit(self) {
        let level_marker = match self.level {
            Level::Info => log::Level::Info,
            Level::Warn => log::Level::Warn,
            Level::Error => log::Level::Error,
        };

        log::log!(level_marker, "{:?}.{} {} {:?}", self.phase, self.code, self.message, self.metrics);
    }
}
