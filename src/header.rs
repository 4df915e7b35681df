// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use log::trace;

use crate::codes::{FourCC, RecordId};
use crate::cursor::Endian;
use crate::engine::Record;
use crate::{Error, Result};

/// Identifier and declared payload length of one record, read once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RecordHeader {
    pub id: RecordId,
    /// Declared payload length, excluding the header itself and any pad byte.
    pub length: u64,
    /// Absolute offset of the first header byte.
    pub offset: u64,
    pub header_len: u64,
    /// Alignment bytes following the payload.
    pub pad: u64,
    /// The payload runs to the end of the enclosing record (or source).
    pub open_ended: bool,
}

impl RecordHeader {
    /// Pseudo header covering a whole source.
    pub(crate) fn file(offset: u64, len: Option<u64>) -> Self {
        Self {
            id: RecordId::FourCC(FourCC::default()),
            length: len.map_or(0, |len| len.saturating_sub(offset)),
            offset,
            header_len: 0,
            pad: 0,
            open_ended: len.is_none(),
        }
    }

    pub(crate) fn payload_offset(&self) -> u64 {
        self.offset + self.header_len
    }

    pub(crate) fn payload_end(&self) -> u64 {
        self.payload_offset().saturating_add(self.length)
    }
}

/// Smallest possible IFF/RIFF chunk.
pub(crate) const CHUNK_HEADER_LEN: u64 = 8;

/// IFF/RIFF chunk header: four character id, u32 length, odd lengths padded.
pub(crate) fn read_chunk_header(rec: &mut Record<'_, '_>, order: Endian) -> Result<RecordHeader> {
    let offset = rec.position();
    let id = rec.fourcc()?;
    let length = u64::from(rec.u32(order)?);
    let head = RecordHeader {
        id: id.into(),
        length,
        offset,
        header_len: CHUNK_HEADER_LEN,
        pad: length & 1,
        open_ended: false,
    };
    trace!("{head:?}");
    Ok(head)
}

/// ISO box header as used by JP2: u32 size, type, optional u64 size.
/// A size of 0 means "to the end of the enclosing data".
pub(crate) fn read_box_header(rec: &mut Record<'_, '_>) -> Result<RecordHeader> {
    let offset = rec.position();
    let size = u64::from(rec.be_u32()?);
    let id = rec.fourcc()?;
    let (header_len, size, open_ended) = match size {
        0 => (8, 0, true),
        1 => (16, rec.u64(Endian::Big)?, false),
        size => (8, size, false),
    };
    if !open_ended && size < header_len {
        return Err(Error::InvalidData("box size smaller than its header"));
    }
    let length = if open_ended {
        rec.remaining_or_source().unwrap_or(0)
    } else {
        size - header_len
    };
    let head = RecordHeader { id: id.into(), length, offset, header_len, pad: 0, open_ended };
    trace!("{head:?}");
    Ok(head)
}

/// Markers that stand alone, without a length field.
pub(crate) fn is_standalone_marker(marker: u8) -> bool {
    matches!(marker, 0x01 | 0xD0..=0xD9)
}

/// JPEG marker segment header after the `0xFF` prefix and fill bytes have
/// been consumed: `prefix_len` counts those bytes plus the marker byte.
pub(crate) fn marker_header(rec: &mut Record<'_, '_>, offset: u64, marker: u8) -> Result<RecordHeader> {
    let prefix_len = rec.position() - offset;
    if is_standalone_marker(marker) {
        return Ok(RecordHeader {
            id: RecordId::Marker(marker),
            length: 0,
            offset,
            header_len: prefix_len,
            pad: 0,
            open_ended: false,
        });
    }
    let length = rec.be_u16()?;
    if length < 2 {
        return Err(Error::InvalidData("marker segment length below 2"));
    }
    Ok(RecordHeader {
        id: RecordId::Marker(marker),
        length: u64::from(length - 2),
        offset,
        header_len: prefix_len + 2,
        pad: 0,
        open_ended: false,
    })
}

/// Size of one TIFF directory entry after its tag.
pub(crate) const IFD_ENTRY_BODY_LEN: u64 = 10;

/// TIFF directory entry: u16 tag followed by a 10 byte body.
pub(crate) fn read_entry_header(rec: &mut Record<'_, '_>, order: Endian) -> Result<RecordHeader> {
    let offset = rec.position();
    let tag = rec.u16(order)?;
    Ok(RecordHeader {
        id: RecordId::Tag(tag),
        length: IFD_ENTRY_BODY_LEN,
        offset,
        header_len: 2,
        pad: 0,
        open_ended: false,
    })
}
