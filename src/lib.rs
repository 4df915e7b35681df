#![deny(unsafe_code)]
//! Record-level parsing and validation for chunked binary media formats:
//! AIFF/AIFF-C, WAVE (RIFF/RIFX/RF64), TIFF, JPEG and JPEG 2000 (JP2).
//!
//! Each format is a sequence of self-describing records (chunks, boxes,
//! marker segments, directory entries). The parser walks them, extracts a
//! property tree and reports whether the input is well-formed and valid,
//! keeping as much information as it can when it is not.
//!
//! ```no_run
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let data = std::fs::read("sound.aiff")?;
//! let kind = zenchunk_parse::FormatKind::detect(&data).ok_or("unknown format")?;
//! let result = zenchunk_parse::analyze(kind, &data)?;
//! println!("well-formed: {:?}, valid: {:?}", result.well_formed(), result.valid());
//! print!("{}", result.properties());
//! # Ok(()) }
//! ```

// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use fallible_collections::TryReserveError;
use log::debug;
use std::convert::TryInto as _;
use std::io::{Read, Seek};

#[macro_use]
mod macros;

mod codes;
mod cursor;
mod engine;
mod header;
mod property;
mod report;
mod validity;

mod iff;
mod aiff;
mod wave;
mod tiff;
mod jpeg;
mod jp2;

pub use crate::codes::{marker_name, FourCC, RecordId};
pub use crate::cursor::{ByteSource, ChecksumSink, Endian, Forward, NoChecksum, Seekable};
pub use crate::engine::{Codec, ParseState};
pub use crate::property::{Date, PropertyNode, Scalar};
pub use crate::report::{Message, ParseResult, Severity, Tristate};
pub use enough::{Stop, StopReason, Unstoppable};

use crate::cursor::ByteCursor;
use crate::engine::{Context, Phase, Record};

/// A trait to indicate a type can be infallibly converted to `u64`.
/// This should only be implemented for infallible conversions, so only unsigned types are valid.
pub(crate) trait ToU64 {
    fn to_u64(self) -> u64;
}

/// Statically verify that the platform `usize` can fit within a `u64`.
impl ToU64 for usize {
    fn to_u64(self) -> u64 {
        const _: () = assert!(std::mem::size_of::<usize>() <= std::mem::size_of::<u64>());
        self.try_into().ok().unwrap_or(u64::MAX)
    }
}

/// A trait to indicate a type can be infallibly converted to `usize`.
pub(crate) trait ToUsize {
    fn to_usize(self) -> usize;
}

macro_rules! impl_to_usize_from {
    ( $from_type:ty ) => {
        impl ToUsize for $from_type {
            fn to_usize(self) -> usize {
                const _: () = assert!(std::mem::size_of::<$from_type>() <= std::mem::size_of::<usize>());
                self.try_into().ok().unwrap_or(usize::MAX)
            }
        }
    };
}

impl_to_usize_from!(u8);
impl_to_usize_from!(u16);
impl_to_usize_from!(u32);

#[doc(hidden)]
pub type TryVec<T> = fallible_collections::TryVec<T>;

/// Describes parser failures.
///
/// Structural problems found while walking records end up as messages in
/// the [`ParseResult`]; only [terminal](Error::is_terminal) errors are
/// returned to the caller.
#[derive(Debug)]
pub enum Error {
    /// Parse error caused by corrupt or malformed data.
    InvalidData(&'static str),
    /// Parse error caused by limited parser support rather than invalid data.
    Unsupported(&'static str),
    /// Reflect `std::io::ErrorKind::UnexpectedEof` for short data.
    UnexpectedEOF,
    /// A read went past the declared length of the current record.
    RecordExhausted,
    /// Identifier bytes outside printable ASCII.
    InvalidIdentifier,
    /// Propagate underlying errors from `std::io`.
    Io(std::io::Error),
    /// Out of memory
    OutOfMemory,
    /// Resource limit exceeded during parsing
    ResourceLimitExceeded(&'static str),
    /// Operation was stopped/cancelled
    Stopped(enough::StopReason),
}

impl Error {
    /// Whether the analysis as a whole cannot complete.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Io(_) | Self::OutOfMemory | Self::ResourceLimitExceeded(_) | Self::Stopped(_))
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let msg = match self {
            Self::InvalidData(s) | Self::Unsupported(s) | Self::ResourceLimitExceeded(s) => s,
            Self::UnexpectedEOF => "premature end of file",
            Self::RecordExhausted => "read past the declared record length",
            Self::InvalidIdentifier => "invalid identifier",
            Self::Io(err) => return err.fmt(f),
            Self::OutOfMemory => "OOM",
            Self::Stopped(reason) => return write!(f, "Stopped: {}", reason),
        };
        f.write_str(msg)
    }
}

impl std::error::Error for Error {}

impl From<bitreader::BitReaderError> for Error {
    #[cold]
    #[cfg_attr(debug_assertions, track_caller)]
    fn from(err: bitreader::BitReaderError) -> Self {
        log::warn!("bitreader: {err}");
        debug_assert!(!matches!(err, bitreader::BitReaderError::TooManyBitsForType { .. })); // bug
        Self::InvalidData("truncated bits")
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::UnexpectedEof => Self::UnexpectedEOF,
            std::io::ErrorKind::OutOfMemory => Self::OutOfMemory,
            _ => Self::Io(err),
        }
    }
}

impl From<std::num::TryFromIntError> for Error {
    fn from(_: std::num::TryFromIntError) -> Self {
        Self::Unsupported("integer conversion failed")
    }
}

impl From<Error> for std::io::Error {
    fn from(err: Error) -> Self {
        let kind = match err {
            Error::InvalidData(_) | Error::InvalidIdentifier => std::io::ErrorKind::InvalidData,
            Error::UnexpectedEOF => std::io::ErrorKind::UnexpectedEof,
            Error::Io(io_err) => return io_err,
            _ => std::io::ErrorKind::Other,
        };
        Self::new(kind, err)
    }
}

impl From<TryReserveError> for Error {
    fn from(_: TryReserveError) -> Self {
        Self::OutOfMemory
    }
}

impl From<enough::StopReason> for Error {
    fn from(reason: enough::StopReason) -> Self {
        Self::Stopped(reason)
    }
}

/// Result shorthand using our Error enum.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Resource limits and parsing options.
///
/// # Examples
///
/// ```
/// use zenchunk_parse::ParseConfig;
///
/// // Strict limits for untrusted input
/// let config = ParseConfig::default()
///     .with_peak_memory_limit(16_000_000)
///     .with_max_records(10_000);
///
/// // No limits
/// let config = ParseConfig::unlimited();
/// ```
#[derive(Debug, Clone)]
pub struct ParseConfig {
    /// Maximum number of records dispatched in one parse.
    /// Default: 1,000,000
    pub max_records: Option<u32>,

    /// Maximum container nesting. Always bounded, since containers recurse.
    /// Default: 32
    pub max_nesting_depth: u32,

    /// Maximum number of TIFF image file directories, Exif and GPS included.
    /// Default: 1,024
    pub max_ifds: Option<u32>,

    /// Maximum bytes buffered at once for text and embedded payloads.
    /// Default: 256MB
    pub peak_memory_limit: Option<u64>,

    /// Tolerate missing pad bytes and non-zero reserved fields, reporting them as info.
    /// Default: false
    pub lenient: bool,
}

impl Default for ParseConfig {
    fn default() -> Self {
        Self {
            max_records: Some(1_000_000),
            max_nesting_depth: 32,
            max_ifds: Some(1_024),
            peak_memory_limit: Some(256_000_000),
            lenient: false,
        }
    }
}

impl ParseConfig {
    /// No resource limits; nesting stays bounded.
    pub fn unlimited() -> Self {
        Self {
            max_records: None,
            max_nesting_depth: 256,
            max_ifds: None,
            peak_memory_limit: None,
            lenient: false,
        }
    }

    pub fn with_max_records(mut self, records: u32) -> Self {
        self.max_records = Some(records);
        self
    }

    pub fn with_max_nesting_depth(mut self, depth: u32) -> Self {
        self.max_nesting_depth = depth;
        self
    }

    pub fn with_max_ifds(mut self, ifds: u32) -> Self {
        self.max_ifds = Some(ifds);
        self
    }

    /// Set the peak memory limit in bytes
    pub fn with_peak_memory_limit(mut self, bytes: u64) -> Self {
        self.peak_memory_limit = Some(bytes);
        self
    }

    /// Enable lenient parsing mode
    pub fn lenient(mut self, lenient: bool) -> Self {
        self.lenient = lenient;
        self
    }
}

pub(crate) struct ResourceTracker<'a> {
    config: &'a ParseConfig,
    current_memory: u64,
    peak_memory: u64,
    records: u32,
    ifds: u32,
}

impl<'a> ResourceTracker<'a> {
    pub(crate) fn new(config: &'a ParseConfig) -> Self {
        Self { config, current_memory: 0, peak_memory: 0, records: 0, ifds: 0 }
    }

    pub(crate) fn reserve(&mut self, bytes: u64) -> Result<()> {
        self.current_memory = self.current_memory.saturating_add(bytes);
        self.peak_memory = self.peak_memory.max(self.current_memory);

        if let Some(limit) = self.config.peak_memory_limit {
            if self.peak_memory > limit {
                return Err(Error::ResourceLimitExceeded("peak memory limit exceeded"));
            }
        }

        Ok(())
    }

    pub(crate) fn release(&mut self, bytes: u64) {
        self.current_memory = self.current_memory.saturating_sub(bytes);
    }

    pub(crate) fn count_record(&mut self) -> Result<()> {
        self.records = self.records.saturating_add(1);
        if let Some(limit) = self.config.max_records {
            if self.records > limit {
                return Err(Error::ResourceLimitExceeded("record count limit exceeded"));
            }
        }
        Ok(())
    }

    pub(crate) fn count_ifd(&mut self) -> Result<()> {
        self.ifds = self.ifds.saturating_add(1);
        if let Some(limit) = self.config.max_ifds {
            if self.ifds > limit {
                return Err(Error::ResourceLimitExceeded("IFD count limit exceeded"));
            }
        }
        Ok(())
    }
}

/// The formats this crate understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FormatKind {
    Aiff,
    Wave,
    Tiff,
    Jpeg,
    Jpeg2000,
}

impl FormatKind {
    /// Guess the format from the first bytes of a file (12 are enough).
    pub fn detect(data: &[u8]) -> Option<Self> {
        match data {
            [b'F', b'O', b'R', b'M', _, _, _, _, b'A', b'I', b'F', b'F' | b'C', ..] => Some(Self::Aiff),
            [b'R', b'I', b'F', b'F' | b'X', _, _, _, _, b'W', b'A', b'V', b'E', ..]
            | [b'R', b'F', b'6', b'4', _, _, _, _, b'W', b'A', b'V', b'E', ..] => Some(Self::Wave),
            [b'I', b'I', 42, 0, ..] | [b'M', b'M', 0, 42, ..] => Some(Self::Tiff),
            [0xFF, 0xD8, ..] => Some(Self::Jpeg),
            [0, 0, 0, 12, b'j', b'P', b' ', b' ', 0x0D, 0x0A, 0x87, 0x0A, ..] => Some(Self::Jpeg2000),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Aiff => "AIFF",
            Self::Wave => "WAVE",
            Self::Tiff => "TIFF",
            Self::Jpeg => "JPEG",
            Self::Jpeg2000 => "JPEG 2000",
        }
    }

    /// Formats that jump to absolute offsets and need a seekable source.
    fn needs_seeking(self) -> bool {
        self == Self::Tiff
    }
}

impl std::fmt::Display for FormatKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Analyse an in-memory file with the default limits.
pub fn analyze(kind: FormatKind, data: &[u8]) -> Result<ParseResult> {
    Analyzer::new().analyze(kind, data)
}

/// Analyse an in-memory file with resource limits and cancellation support.
///
/// * `config` - Resource limits and parsing options
/// * `stop` - Cancellation token (use [`Unstoppable`] if not needed)
pub fn analyze_with_config(kind: FormatKind, data: &[u8], config: &ParseConfig, stop: &dyn Stop) -> Result<ParseResult> {
    Analyzer::new().with_config(config.clone()).with_stop(stop).analyze(kind, data)
}

/// Analyse a seekable source, e.g. a file.
pub fn analyze_reader<R: Read + Seek>(kind: FormatKind, reader: R) -> Result<ParseResult> {
    Analyzer::new().analyze_reader(kind, reader)
}

/// Analyse a source that can only be read once, front to back.
pub fn analyze_stream<R: Read>(kind: FormatKind, reader: R) -> Result<ParseResult> {
    Analyzer::new().analyze_stream(kind, reader)
}

/// Configurable entry point, for when a checksum sink or a stop token is needed.
///
/// ```
/// use zenchunk_parse::{Analyzer, FormatKind};
///
/// let mut bytes_seen = 0usize;
/// let mut count = |chunk: &[u8]| bytes_seen += chunk.len();
/// let result = Analyzer::new()
///     .with_checksum(&mut count)
///     .analyze(FormatKind::Jpeg, &[0xFF, 0xD8, 0xFF, 0xD9])?;
/// assert!(result.well_formed().is_true());
/// assert_eq!(bytes_seen, 4);
/// # Ok::<(), zenchunk_parse::Error>(())
/// ```
pub struct Analyzer<'a> {
    config: ParseConfig,
    stop: &'a dyn Stop,
    checksum: Option<&'a mut dyn ChecksumSink>,
}

impl Default for Analyzer<'_> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a> Analyzer<'a> {
    pub fn new() -> Self {
        Self { config: ParseConfig::default(), stop: &Unstoppable, checksum: None }
    }

    pub fn with_config(mut self, config: ParseConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_stop(mut self, stop: &'a dyn Stop) -> Self {
        self.stop = stop;
        self
    }

    /// Every byte read is handed to `sink`, skipped data included.
    pub fn with_checksum(mut self, sink: &'a mut dyn ChecksumSink) -> Self {
        self.checksum = Some(sink);
        self
    }

    pub fn analyze(self, kind: FormatKind, data: &[u8]) -> Result<ParseResult> {
        self.run(kind, &mut Seekable::new(std::io::Cursor::new(data)))
    }

    pub fn analyze_reader<R: Read + Seek>(self, kind: FormatKind, reader: R) -> Result<ParseResult> {
        self.run(kind, &mut Seekable::new(reader))
    }

    /// Formats with absolute offsets (TIFF) are buffered in memory first,
    /// within the peak memory limit.
    pub fn analyze_stream<R: Read>(self, kind: FormatKind, reader: R) -> Result<ParseResult> {
        if !kind.needs_seeking() {
            return self.run(kind, &mut Forward::new(reader));
        }
        let limit = self.config.peak_memory_limit.unwrap_or(u64::MAX);
        let mut data = std::vec::Vec::new();
        reader.take(limit.saturating_add(1)).read_to_end(&mut data)?;
        if data.len().to_u64() > limit {
            return Err(Error::ResourceLimitExceeded("peak memory limit exceeded"));
        }
        debug!("buffered {} bytes of {kind} stream", data.len());
        self.run(kind, &mut Seekable::new(std::io::Cursor::new(&data[..])))
    }

    fn run(self, kind: FormatKind, source: &mut dyn ByteSource) -> Result<ParseResult> {
        let Self { config, stop, checksum } = self;
        let mut no_checksum = NoChecksum;
        let checksum = match checksum {
            Some(sink) => sink,
            None => &mut no_checksum as &mut dyn ChecksumSink,
        };
        let mut cursor = ByteCursor::new(source, checksum);
        let state = ParseState::new(Endian::Big, cursor.source_len());
        let mut cx = Context::new(&config, stop, state);
        let mut file = Record::file(&mut cursor);

        if file.remaining_or_source() == Some(0) {
            cx.report.info("Zero-length file", Some(0));
        }
        match kind {
            FormatKind::Aiff => aiff::parse(&mut file, &mut cx)?,
            FormatKind::Wave => wave::parse(&mut file, &mut cx)?,
            FormatKind::Tiff => tiff::parse(&mut file, &mut cx)?,
            FormatKind::Jpeg => jpeg::parse(&mut file, &mut cx)?,
            FormatKind::Jpeg2000 => jp2::parse(&mut file, &mut cx)?,
        }
        cx.advance(Phase::Done);
        let finished = cx.phase() == Phase::Done;
        let Context { report, state, .. } = cx;
        let mut result = report.finish(kind, state);
        if !result.signature_matched() {
            result.seal_unrecognized();
            return Ok(result);
        }
        if finished {
            let rules = match kind {
                FormatKind::Aiff => aiff::RULES,
                FormatKind::Wave => wave::RULES,
                FormatKind::Tiff => tiff::RULES,
                FormatKind::Jpeg => jpeg::RULES,
                FormatKind::Jpeg2000 => jp2::RULES,
            };
            validity::check(rules, &mut result);
        }
        result.seal();
        Ok(result)
    }
}

#[test]
fn detect_by_magic() {
    assert_eq!(FormatKind::detect(b"FORM\0\0\0\x04AIFC"), Some(FormatKind::Aiff));
    assert_eq!(FormatKind::detect(b"RIFX\0\0\0\x04WAVE"), Some(FormatKind::Wave));
    assert_eq!(FormatKind::detect(b"RF64\xff\xff\xff\xffWAVE"), Some(FormatKind::Wave));
    assert_eq!(FormatKind::detect(b"MM\0*\0\0\0\x08"), Some(FormatKind::Tiff));
    assert_eq!(FormatKind::detect(&[0xFF, 0xD8, 0xFF]), Some(FormatKind::Jpeg));
    assert_eq!(
        FormatKind::detect(&[0, 0, 0, 12, b'j', b'P', b' ', b' ', 0x0D, 0x0A, 0x87, 0x0A]),
        Some(FormatKind::Jpeg2000)
    );
    assert_eq!(FormatKind::detect(b"FORM\0\0\0\x04ILBM"), None);
    assert_eq!(FormatKind::detect(b""), None);
}

#[test]
fn terminal_errors() {
    assert!(Error::OutOfMemory.is_terminal());
    assert!(Error::Stopped(StopReason::Cancelled).is_terminal());
    assert!(!Error::UnexpectedEOF.is_terminal());
    assert!(!Error::RecordExhausted.is_terminal());
    assert!(!Error::InvalidData("x").is_terminal());
}

#[test]
fn record_limit() {
    let config = ParseConfig::default().with_max_records(2);
    let mut tracker = ResourceTracker::new(&config);
    assert!(tracker.count_record().is_ok());
    assert!(tracker.count_record().is_ok());
    assert!(matches!(tracker.count_record(), Err(Error::ResourceLimitExceeded(_))));
}
