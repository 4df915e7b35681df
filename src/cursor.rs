// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Byte sources and the position-tracking cursor that every record read goes through.

use byteorder::{BigEndian, LittleEndian, ReadBytesExt};
use log::trace;
use std::io::{Read, Seek, SeekFrom};

use crate::codes::{is_identifier_byte, FourCC};
use crate::{Error, Result, ToU64, TryVec};

/// Byte order of multi-byte fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Endian {
    #[default]
    Big,
    Little,
}

/// Observes every byte read through a [`ByteCursor`], e.g. to compute a content digest.
pub trait ChecksumSink {
    fn update(&mut self, bytes: &[u8]);

    /// When `false` the cursor may seek over skipped data instead of reading it.
    fn is_active(&self) -> bool {
        true
    }
}

/// A [`ChecksumSink`] that ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoChecksum;

impl ChecksumSink for NoChecksum {
    fn update(&mut self, _bytes: &[u8]) {}

    fn is_active(&self) -> bool {
        false
    }
}

impl<F: FnMut(&[u8])> ChecksumSink for F {
    fn update(&mut self, bytes: &[u8]) {
        self(bytes)
    }
}

/// Where the bytes come from.
///
/// Sources must be positioned at the start of the file. Offsets are absolute.
pub trait ByteSource: Read {
    /// Move to an absolute offset. Only meaningful when [`is_seekable`](Self::is_seekable).
    fn seek_to(&mut self, offset: u64) -> Result<()>;

    fn is_seekable(&self) -> bool;

    /// Total length of the source, when it can be known up front.
    fn total_len(&mut self) -> Option<u64>;
}

/// A randomly accessible source (file, in-memory buffer).
pub struct Seekable<R> {
    inner: R,
}

impl<R: Read + Seek> Seekable<R> {
    pub fn new(inner: R) -> Self {
        Self { inner }
    }
}

impl<R: Read> Read for Seekable<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.inner.read(buf)
    }
}

impl<R: Read + Seek> ByteSource for Seekable<R> {
    fn seek_to(&mut self, offset: u64) -> Result<()> {
        self.inner.seek(SeekFrom::Start(offset))?;
        Ok(())
    }

    fn is_seekable(&self) -> bool {
        true
    }

    fn total_len(&mut self) -> Option<u64> {
        let current = self.inner.stream_position().ok()?;
        let end = self.inner.seek(SeekFrom::End(0)).ok()?;
        self.inner.seek(SeekFrom::Start(current)).ok()?;
        Some(end)
    }
}

/// A source that can only be read once, front to back (pipes, sockets).
pub struct Forward<R> {
    inner: R,
}

impl<R: Read> Forward<R> {
    pub fn new(inner: R) -> Self {
        Self { inner }
    }
}

impl<R: Read> Read for Forward<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.inner.read(buf)
    }
}

impl<R: Read> ByteSource for Forward<R> {
    fn seek_to(&mut self, _offset: u64) -> Result<()> {
        Err(Error::Unsupported("seek on a forward-only source"))
    }

    fn is_seekable(&self) -> bool {
        false
    }

    fn total_len(&mut self) -> Option<u64> {
        None
    }
}

/// Reads primitives from a [`ByteSource`] while keeping an exact position counter.
///
/// Every successful read advances [`position`](Self::position) by the number of
/// bytes consumed and hands those bytes to the checksum sink.
pub struct ByteCursor<'a> {
    source: &'a mut dyn ByteSource,
    checksum: &'a mut dyn ChecksumSink,
    position: u64,
    len: Option<u64>,
}

impl<'a> ByteCursor<'a> {
    pub fn new(source: &'a mut dyn ByteSource, checksum: &'a mut dyn ChecksumSink) -> Self {
        let len = source.total_len();
        Self { source, checksum, position: 0, len }
    }

    /// Bytes consumed so far, which is also the absolute offset of the next read.
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Length of the source, if known.
    pub fn source_len(&self) -> Option<u64> {
        self.len
    }

    pub fn u8(&mut self) -> Result<u8> {
        Ok(self.read_u8()?)
    }

    pub fn i8(&mut self) -> Result<i8> {
        Ok(self.read_i8()?)
    }

    pub fn u16(&mut self, order: Endian) -> Result<u16> {
        Ok(match order {
            Endian::Big => self.read_u16::<BigEndian>()?,
            Endian::Little => self.read_u16::<LittleEndian>()?,
        })
    }

    pub fn i16(&mut self, order: Endian) -> Result<i16> {
        Ok(match order {
            Endian::Big => self.read_i16::<BigEndian>()?,
            Endian::Little => self.read_i16::<LittleEndian>()?,
        })
    }

    pub fn u32(&mut self, order: Endian) -> Result<u32> {
        Ok(match order {
            Endian::Big => self.read_u32::<BigEndian>()?,
            Endian::Little => self.read_u32::<LittleEndian>()?,
        })
    }

    pub fn i32(&mut self, order: Endian) -> Result<i32> {
        Ok(match order {
            Endian::Big => self.read_i32::<BigEndian>()?,
            Endian::Little => self.read_i32::<LittleEndian>()?,
        })
    }

    pub fn u64(&mut self, order: Endian) -> Result<u64> {
        Ok(match order {
            Endian::Big => self.read_u64::<BigEndian>()?,
            Endian::Little => self.read_u64::<LittleEndian>()?,
        })
    }

    pub fn f32(&mut self, order: Endian) -> Result<f32> {
        Ok(match order {
            Endian::Big => self.read_f32::<BigEndian>()?,
            Endian::Little => self.read_f32::<LittleEndian>()?,
        })
    }

    pub fn f64(&mut self, order: Endian) -> Result<f64> {
        Ok(match order {
            Endian::Big => self.read_f64::<BigEndian>()?,
            Endian::Little => self.read_f64::<LittleEndian>()?,
        })
    }

    /// Raw bytes interpreted as an identifier. Control characters and
    /// anything outside printable ASCII are rejected.
    pub fn fixed_chars<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut chars = [0; N];
        self.read_exact(&mut chars)?;
        if !chars.iter().all(|&b| is_identifier_byte(b)) {
            return Err(Error::InvalidIdentifier);
        }
        Ok(chars)
    }

    pub fn fourcc(&mut self) -> Result<FourCC> {
        self.fixed_chars::<4>().map(FourCC::new)
    }

    /// Four bytes taken as-is, without identifier validation.
    pub fn raw_fourcc(&mut self) -> Result<FourCC> {
        let mut value = [0; 4];
        self.read_exact(&mut value)?;
        Ok(FourCC::new(value))
    }

    /// 80-bit IEEE 754 extended precision value.
    ///
    /// Layout (big-endian): sign and 15-bit biased exponent, then a 64-bit
    /// significand with an explicit integer bit.
    pub fn extended_f80(&mut self, order: Endian) -> Result<f64> {
        let (sign_exponent, significand) = match order {
            Endian::Big => {
                let se = self.u16(order)?;
                (se, self.u64(order)?)
            },
            Endian::Little => {
                let significand = self.u64(order)?;
                (self.u16(order)?, significand)
            },
        };
        Ok(f80_to_f64(sign_exponent, significand))
    }

    /// Fail with `UnexpectedEOF` when the source is known to hold fewer than
    /// `len` more bytes.
    pub fn ensure_available(&self, len: u64) -> Result<()> {
        match self.len {
            Some(total) if self.position.saturating_add(len) > total => Err(Error::UnexpectedEOF),
            _ => Ok(()),
        }
    }

    /// Read exactly `len` bytes into a new buffer.
    pub fn bytes(&mut self, len: u64) -> Result<TryVec<u8>> {
        self.ensure_available(len)?;
        let mut buf = std::vec::Vec::new();
        buf.try_reserve_exact(usize::try_from(len)?)
            .map_err(|_| Error::OutOfMemory)?;
        let read = (&mut *self).take(len).read_to_end(&mut buf)?;
        if read.to_u64() != len {
            return Err(Error::UnexpectedEOF);
        }
        Ok(buf.into())
    }

    /// Advance by `count` bytes. Reads through the data when a checksum is being
    /// computed or the source cannot seek.
    pub fn skip(&mut self, count: u64) -> Result<()> {
        if count == 0 {
            return Ok(());
        }
        if self.checksum.is_active() || !self.source.is_seekable() {
            let copied = std::io::copy(&mut (&mut *self).take(count), &mut std::io::sink())?;
            if copied != count {
                return Err(Error::UnexpectedEOF);
            }
            return Ok(());
        }
        let target = self
            .position
            .checked_add(count)
            .ok_or(Error::InvalidData("skip past the addressable range"))?;
        if let Some(len) = self.len {
            if target > len {
                self.source.seek_to(len)?;
                self.position = len;
                return Err(Error::UnexpectedEOF);
            }
        }
        self.source.seek_to(target)?;
        self.position = target;
        Ok(())
    }

    /// Skip everything up to the end of the source.
    pub fn skip_to_end(&mut self) -> Result<u64> {
        let start = self.position;
        std::io::copy(self, &mut std::io::sink())?;
        Ok(self.position - start)
    }

    /// Move to an absolute offset. Forward-only sources can only move forward.
    pub fn seek(&mut self, offset: u64) -> Result<()> {
        if offset == self.position {
            return Ok(());
        }
        if !self.source.is_seekable() {
            if offset < self.position {
                return Err(Error::Unsupported("backward seek on a forward-only source"));
            }
            return self.skip(offset - self.position);
        }
        if let Some(len) = self.len {
            if offset > len {
                return Err(Error::UnexpectedEOF);
            }
        }
        trace!("seek {} -> {offset}", self.position);
        self.source.seek_to(offset)?;
        self.position = offset;
        Ok(())
    }
}

impl Read for ByteCursor<'_> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let bytes_read = self.source.read(buf)?;
        self.position = self
            .position
            .checked_add(bytes_read.to_u64())
            .ok_or(Error::Unsupported("total bytes read too large for offset type"))?;
        self.checksum.update(&buf[..bytes_read]);
        Ok(bytes_read)
    }
}

/// Convert an 80-bit extended value (split into its sign/exponent word and significand).
pub(crate) fn f80_to_f64(sign_exponent: u16, significand: u64) -> f64 {
    let negative = sign_exponent & 0x8000 != 0;
    let exponent = i32::from(sign_exponent & 0x7fff);
    let magnitude = if exponent == 0 && significand == 0 {
        0.0
    } else if exponent == 0x7fff {
        if significand << 1 == 0 { f64::INFINITY } else { f64::NAN }
    } else {
        // value = significand * 2^(exponent - bias - 63); split the scaling so
        // neither factor overflows on its own
        let scale = exponent - 16383 - 63;
        let half = scale / 2;
        significand as f64 * 2f64.powi(half) * 2f64.powi(scale - half)
    };
    if negative { -magnitude } else { magnitude }
}

/// Text with every non-printable byte replaced by `.`; trailing NULs are dropped.
pub(crate) fn printable(raw: &[u8]) -> String {
    let end = raw.iter().rposition(|&b| b != 0).map_or(0, |last| last + 1);
    raw[..end]
        .iter()
        .map(|&b| match b {
            b'\t' | b'\n' | b'\r' => b as char,
            b if is_identifier_byte(b) => b as char,
            _ => '.',
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    struct Counter(u64);

    impl ChecksumSink for Counter {
        fn update(&mut self, bytes: &[u8]) {
            self.0 += bytes.len() as u64;
        }
    }

    #[test]
    fn position_tracks_reads_in_both_orders() {
        let data = [0x12, 0x34, 0x56, 0x78, 0x9a, 0xbc, 0xde, 0xf0, 0xff];
        let mut source = Seekable::new(Cursor::new(&data[..]));
        let mut sink = NoChecksum;
        let mut cursor = ByteCursor::new(&mut source, &mut sink);
        assert_eq!(cursor.source_len(), Some(9));
        assert_eq!(cursor.u16(Endian::Big).unwrap(), 0x1234);
        assert_eq!(cursor.u16(Endian::Little).unwrap(), 0x7856);
        assert_eq!(cursor.position(), 4);
        assert_eq!(cursor.u32(Endian::Little).unwrap(), 0xf0de_bc9a);
        assert_eq!(cursor.i8().unwrap(), -1);
        assert_eq!(cursor.position(), 9);
        assert!(matches!(cursor.u8(), Err(Error::UnexpectedEOF)));
    }

    #[test]
    fn bytes_past_source_end_fail_before_reading() {
        let data = b"\x05hello\x00";
        let mut source = Seekable::new(Cursor::new(&data[..]));
        let mut sink = NoChecksum;
        let mut cursor = ByteCursor::new(&mut source, &mut sink);
        assert!(matches!(ByteCursor::bytes(&mut cursor, 0x7fff_fff0), Err(Error::UnexpectedEOF)));
        assert_eq!(cursor.position(), 0);
        assert_eq!(&*ByteCursor::bytes(&mut cursor, 7).unwrap(), &data[..]);
    }

    #[test]
    fn fixed_chars_rejects_control_characters() {
        let data = b"CO\x01M";
        let mut source = Seekable::new(Cursor::new(&data[..]));
        let mut sink = NoChecksum;
        let mut cursor = ByteCursor::new(&mut source, &mut sink);
        assert!(matches!(cursor.fourcc(), Err(Error::InvalidIdentifier)));
    }

    #[test]
    fn extended_float_sample_rates() {
        // 44100 and 8000 Hz as stored in AIFF COMM chunks
        assert_eq!(f80_to_f64(0x400e, 0xac44_0000_0000_0000), 44100.0);
        assert_eq!(f80_to_f64(0x400b, 0xfa00_0000_0000_0000), 8000.0);
        assert_eq!(f80_to_f64(0, 0), 0.0);
        assert_eq!(f80_to_f64(0xc000, 0x8000_0000_0000_0000), -2.0);
        assert!(f80_to_f64(0x7fff, 0).is_infinite());
    }

    #[test]
    fn forward_source_skips_and_refuses_backward_seek() {
        let data = [0u8; 16];
        let mut source = Forward::new(&data[..]);
        let mut sink = Counter(0);
        let mut cursor = ByteCursor::new(&mut source, &mut sink);
        cursor.skip(10).unwrap();
        cursor.seek(12).unwrap();
        assert_eq!(cursor.position(), 12);
        assert!(matches!(cursor.seek(4), Err(Error::Unsupported(_))));
        assert!(matches!(cursor.skip(8), Err(Error::UnexpectedEOF)));
        drop(cursor);
        assert_eq!(sink.0, 16);
    }

    #[test]
    fn seekable_skip_past_end_is_eof() {
        let data = [0u8; 4];
        let mut source = Seekable::new(Cursor::new(&data[..]));
        let mut sink = NoChecksum;
        let mut cursor = ByteCursor::new(&mut source, &mut sink);
        assert!(matches!(cursor.skip(5), Err(Error::UnexpectedEOF)));
        assert_eq!(cursor.position(), 4);
    }

    #[test]
    fn printable_replaces_garbage() {
        assert_eq!(printable(b"ab\x01c\xff\0\0"), "ab.c.");
        assert_eq!(printable(b"line\r\n"), "line\r\n");
    }
}
