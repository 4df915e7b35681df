// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! TIFF: an 8 byte header and a chain of image file directories (IFDs)
//! reached through absolute offsets.
//!
//! IFDs are visited from a worklist. The primary chain is followed through
//! each IFD's next-offset field (0 ends it); SubIFD, Exif, GPS and
//! Interoperability pointers queue further directories. An offset that
//! was already visited is reported and not followed again.

use log::{debug, trace};
use std::borrow::Cow;

use crate::codes::{FourCC, RecordId};
use crate::cursor::{ByteCursor, Endian, NoChecksum, Seekable};
use crate::engine::{walk, Context, Dispatch, ParseState, Phase, Record, WalkEnd, Worklist};
use crate::header::{read_entry_header, RecordHeader};
use crate::property::{PropertyNode, Scalar};
use crate::validity::{Findings, Rule};
use crate::{Result, ToU64, ToUsize};

const TAG_IMAGE_WIDTH: u16 = 256;
const TAG_IMAGE_LENGTH: u16 = 257;
const TAG_COMPRESSION: u16 = 259;
const TAG_PHOTOMETRIC: u16 = 262;
const TAG_STRIP_OFFSETS: u16 = 273;
const TAG_STRIP_BYTE_COUNTS: u16 = 279;
const TAG_TILE_OFFSETS: u16 = 324;
const TAG_TILE_BYTE_COUNTS: u16 = 325;
const TAG_SUB_IFDS: u16 = 330;
const TAG_EXIF_IFD: u16 = 34665;
const TAG_GPS_IFD: u16 = 34853;
const TAG_INTEROP_IFD: u16 = 40965;

/// Numeric values kept per entry; longer arrays are only counted.
const MAX_KEPT_VALUES: u32 = 1 << 16;

/// Names used for property nodes. Anything else is `Tag<number>`.
const TAG_NAMES: &[(u16, &str)] = &[
    (254, "NewSubfileType"),
    (255, "SubfileType"),
    (TAG_IMAGE_WIDTH, "ImageWidth"),
    (TAG_IMAGE_LENGTH, "ImageLength"),
    (258, "BitsPerSample"),
    (TAG_COMPRESSION, "Compression"),
    (TAG_PHOTOMETRIC, "PhotometricInterpretation"),
    (266, "FillOrder"),
    (269, "DocumentName"),
    (270, "ImageDescription"),
    (271, "Make"),
    (272, "Model"),
    (TAG_STRIP_OFFSETS, "StripOffsets"),
    (274, "Orientation"),
    (277, "SamplesPerPixel"),
    (278, "RowsPerStrip"),
    (TAG_STRIP_BYTE_COUNTS, "StripByteCounts"),
    (282, "XResolution"),
    (283, "YResolution"),
    (284, "PlanarConfiguration"),
    (296, "ResolutionUnit"),
    (305, "Software"),
    (306, "DateTime"),
    (315, "Artist"),
    (317, "Predictor"),
    (320, "ColorMap"),
    (322, "TileWidth"),
    (323, "TileLength"),
    (TAG_TILE_OFFSETS, "TileOffsets"),
    (TAG_TILE_BYTE_COUNTS, "TileByteCounts"),
    (TAG_SUB_IFDS, "SubIFDs"),
    (338, "ExtraSamples"),
    (339, "SampleFormat"),
    (513, "JPEGInterchangeFormat"),
    (514, "JPEGInterchangeFormatLength"),
    (529, "YCbCrCoefficients"),
    (530, "YCbCrSubSampling"),
    (531, "YCbCrPositioning"),
    (532, "ReferenceBlackWhite"),
    (700, "XMP"),
    (33432, "Copyright"),
    (33723, "IPTC"),
    (34377, "Photoshop"),
    (TAG_EXIF_IFD, "ExifIFD"),
    (34675, "ICCProfile"),
    (TAG_GPS_IFD, "GPSInfo"),
    (TAG_INTEROP_IFD, "InteroperabilityIFD"),
];

const COMPRESSION_SCHEMES: &[(i64, &str)] = &[
    (1, "uncompressed"),
    (2, "CCITT modified Huffman RLE"),
    (3, "CCITT Group 3 fax"),
    (4, "CCITT Group 4 fax"),
    (5, "LZW"),
    (6, "JPEG (old-style)"),
    (7, "JPEG"),
    (8, "Deflate"),
    (32773, "PackBits"),
    (32946, "Deflate (PKZIP)"),
    (34712, "JPEG 2000"),
    (34887, "LERC"),
    (34925, "LZMA"),
    (50000, "Zstandard"),
    (50001, "WebP"),
];

const PHOTOMETRIC: &[i64] = &[0, 1, 2, 3, 4, 5, 6, 8, 9, 10, 32803, 32844, 32845, 34892];

/// Field types of TIFF 6.0 (1-12) plus the IFD type (13) of the TIFF tech notes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FieldType {
    Byte,
    Ascii,
    Short,
    Long,
    Rational,
    SByte,
    Undefined,
    SShort,
    SLong,
    SRational,
    Float,
    Double,
    Ifd,
}

impl FieldType {
    fn from_code(code: u16) -> Option<Self> {
        Some(match code {
            1 => Self::Byte,
            2 => Self::Ascii,
            3 => Self::Short,
            4 => Self::Long,
            5 => Self::Rational,
            6 => Self::SByte,
            7 => Self::Undefined,
            8 => Self::SShort,
            9 => Self::SLong,
            10 => Self::SRational,
            11 => Self::Float,
            12 => Self::Double,
            13 => Self::Ifd,
            _ => return None,
        })
    }

    fn size(self) -> u64 {
        match self {
            Self::Byte | Self::Ascii | Self::SByte | Self::Undefined => 1,
            Self::Short | Self::SShort => 2,
            Self::Long | Self::SLong | Self::Float | Self::Ifd => 4,
            Self::Rational | Self::SRational | Self::Double => 8,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Self::Byte => "BYTE",
            Self::Ascii => "ASCII",
            Self::Short => "SHORT",
            Self::Long => "LONG",
            Self::Rational => "RATIONAL",
            Self::SByte => "SBYTE",
            Self::Undefined => "UNDEFINED",
            Self::SShort => "SSHORT",
            Self::SLong => "SLONG",
            Self::SRational => "SRATIONAL",
            Self::Float => "FLOAT",
            Self::Double => "DOUBLE",
            Self::Ifd => "IFD",
        }
    }
}

/// What a queued offset points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum IfdKind {
    /// Position in the main chain: IFD0, IFD1, ...
    Primary(u32),
    Sub,
    Exif,
    Gps,
    Interop,
}

impl IfdKind {
    fn node_name(self) -> Cow<'static, str> {
        match self {
            Self::Primary(n) => Cow::Owned(format!("IFD{n}")),
            Self::Sub => Cow::Borrowed("SubIFD"),
            Self::Exif => Cow::Borrowed("ExifIFD"),
            Self::Gps => Cow::Borrowed("GPSIFD"),
            Self::Interop => Cow::Borrowed("InteroperabilityIFD"),
        }
    }

    /// The kind reached through this IFD's next-offset field.
    fn next(self) -> Self {
        match self {
            Self::Primary(n) => Self::Primary(n.saturating_add(1)),
            other => other,
        }
    }

    /// Whether tag numbers mean the baseline TIFF tags here.
    fn uses_baseline_tags(self) -> bool {
        matches!(self, Self::Primary(_) | Self::Sub)
    }
}

pub(crate) fn parse(file: &mut Record<'_, '_>, cx: &mut Context<'_>) -> Result<()> {
    let first = match read_header(file) {
        Ok(Ok((order, first))) => {
            cx.report.signature_matched();
            cx.advance(Phase::SignatureChecked);
            cx.state.byte_order = order;
            cx.report.put("ByteOrder", if order == Endian::Little { "little-endian" } else { "big-endian" });
            first
        },
        Ok(Err(problem)) => {
            cx.abort(problem, 0);
            return Ok(());
        },
        Err(e) if e.is_terminal() => return Err(e),
        Err(e) => {
            cx.abort(format!("TIFF header: {e}"), 0);
            return Ok(());
        },
    };
    cx.advance(Phase::HeaderParsed);
    cx.advance(Phase::IteratingTopLevel);
    walk_ifds(file, cx, first)?;
    Ok(())
}

/// Byte order mark, magic number and first IFD offset.
fn read_header(file: &mut Record<'_, '_>) -> Result<Result<(Endian, u64), Cow<'static, str>>> {
    let mark = file.fixed_chars::<2>()?;
    let order = match &mark {
        b"II" => Endian::Little,
        b"MM" => Endian::Big,
        _ => return Ok(Err(Cow::Owned(format!("Unrecognized byte order mark {mark:?}")))),
    };
    match file.u16(order)? {
        42 => {},
        43 => return Ok(Err(Cow::Borrowed("BigTIFF is not supported"))),
        magic => return Ok(Err(Cow::Owned(format!("Unrecognized TIFF magic number {magic}")))),
    }
    let first = u64::from(file.u32(order)?);
    Ok(Ok((order, first)))
}

/// Parse a TIFF structure embedded in another file (e.g. JPEG Exif).
/// Offsets in messages are relative to the start of `data`.
pub(crate) fn parse_embedded(data: &[u8], cx: &mut Context<'_>) -> Result<bool> {
    let mut source = Seekable::new(std::io::Cursor::new(data));
    let mut no_checksum = NoChecksum;
    let mut cursor = ByteCursor::new(&mut source, &mut no_checksum);
    let mut file = Record::file(&mut cursor);
    let (order, first) = match read_header(&mut file) {
        Ok(Ok(header)) => header,
        Ok(Err(problem)) => {
            cx.report.malformed(format!("Embedded TIFF: {problem}"), 0);
            return Ok(false);
        },
        Err(e) if e.is_terminal() => return Err(e),
        Err(e) => {
            cx.report.malformed_error(&e, "Embedded TIFF header", 0);
            return Ok(false);
        },
    };
    let saved = cx.state.clone();
    cx.state = ParseState::new(order, Some(data.len().to_u64()));
    let outcome = walk_ifds(&mut file, cx, first);
    cx.state = saved;
    outcome
}

fn walk_ifds(file: &mut Record<'_, '_>, cx: &mut Context<'_>, first: u64) -> Result<bool> {
    if first == 0 {
        cx.report.malformed("No image file directory", 4);
        return Ok(false);
    }
    let mut ok = true;
    let mut work = Worklist::new();
    work.push(first, IfdKind::Primary(0));
    while let Some((offset, kind)) = work.pop() {
        cx.check_stop()?;
        cx.tracker.count_ifd()?;
        ok &= read_ifd(file, cx, offset, kind, &mut work)?;
    }
    Ok(ok)
}

/// Read one IFD at `offset`, queueing the directories it points at.
fn read_ifd(
    file: &mut Record<'_, '_>,
    cx: &mut Context<'_>,
    offset: u64,
    kind: IfdKind,
    work: &mut Worklist<IfdKind>,
) -> Result<bool> {
    trace!("{kind:?} at {offset}");
    if offset % 2 == 1 {
        cx.report.info(format!("{} offset {offset} is not word aligned", kind.node_name()), Some(offset));
    }
    if cx.state.source_len.is_some_and(|len| offset.saturating_add(2) > len) {
        cx.report.malformed(format!("{} offset {offset} lies outside the file", kind.node_name()), offset);
        return Ok(false);
    }
    if let Err(e) = file.seek(offset) {
        if e.is_terminal() {
            return Err(e);
        }
        cx.report.malformed_error(&e, format_args!("{} at {offset}", kind.node_name()), offset);
        return Ok(false);
    }
    let order = cx.state.byte_order;
    let count = match file.u16(order) {
        Ok(count) => count,
        Err(e) if e.is_terminal() => return Err(e),
        Err(e) => {
            cx.report.malformed_error(&e, format_args!("{} entry count", kind.node_name()), offset);
            return Ok(false);
        },
    };

    cx.report.open(kind.node_name());
    cx.report.put("Offset", offset);
    cx.report.put("NumberOfEntries", count);
    // Problems with the entries drop the node; a bad next pointer does not.
    let mut ok = true;
    let mut chain_ok = true;
    if count == 0 {
        cx.report.malformed(format!("{} has no entries", kind.node_name()), offset);
        ok = false;
    }
    let head = RecordHeader {
        id: RecordId::FourCC(FourCC::new(*b"IFD ")),
        length: u64::from(count) * 12,
        offset,
        header_len: 2,
        pad: 0,
        open_ended: false,
    };
    let mut entries = Entries { kind, last_tag: None, work };
    let mut body = file.child(head);
    match walk(&mut entries, &mut body, cx) {
        Ok(WalkEnd::Abandoned) => ok = false,
        Ok(_) => {},
        Err(e) if e.is_terminal() => return Err(e),
        Err(e) => {
            cx.report.malformed_error(&e, kind.node_name(), body.position());
            ok = false;
        },
    }
    if body.remaining().unwrap_or(0) > 0 && body.skip_remaining().is_err() {
        ok = false;
    }
    drop(body);

    match file.u32(order) {
        Ok(0) => {},
        Ok(next) => {
            let next = u64::from(next);
            cx.report.put("NextIFDOffset", next);
            if !entries.work.push(next, kind.next()) {
                cx.report.malformed(format!("IFD cycle: offset {next} was already visited"), head.payload_end());
                chain_ok = false;
            }
        },
        Err(e) if e.is_terminal() => return Err(e),
        Err(e) => {
            cx.report.malformed_error(&e, format_args!("{} next offset", kind.node_name()), head.payload_end());
            chain_ok = false;
        },
    }
    cx.report.close(ok);
    Ok(ok && chain_ok)
}

struct Entries<'w> {
    kind: IfdKind,
    last_tag: Option<u16>,
    work: &'w mut Worklist<IfdKind>,
}

impl Dispatch for Entries<'_> {
    type Kind = u16;

    fn read_header(&mut self, rec: &mut Record<'_, '_>, cx: &mut Context<'_>) -> Result<RecordHeader> {
        read_entry_header(rec, cx.state.byte_order)
    }

    /// Every tag has the same entry layout, so none is skipped as unknown.
    fn lookup(&self, id: RecordId) -> Option<u16> {
        match id {
            RecordId::Tag(tag) => Some(tag),
            _ => None,
        }
    }

    fn node_name(&self, tag: u16, _head: &RecordHeader) -> Cow<'static, str> {
        let known = self
            .kind
            .uses_baseline_tags()
            .then(|| TAG_NAMES.iter().find(|&&(t, _)| t == tag))
            .flatten();
        match known {
            Some(&(_, name)) => Cow::Borrowed(name),
            None => Cow::Owned(format!("Tag{tag}")),
        }
    }

    fn read(&mut self, tag: u16, rec: &mut Record<'_, '_>, cx: &mut Context<'_>) -> Result<bool> {
        let order = cx.state.byte_order;
        if self.last_tag.is_some_and(|last| tag <= last) {
            cx.report.invalid(format!("Tag {tag} is out of ascending order"), Some(rec.head.offset));
        }
        self.last_tag = Some(tag);

        let raw_type = rec.u16(order)?;
        let count = rec.u32(order)?;
        cx.report.put("Tag", tag);
        cx.report.put("Count", count);
        let Some(field_type) = FieldType::from_code(raw_type) else {
            cx.report.info(format!("Tag {tag} has unknown field type {raw_type}"), Some(rec.head.offset));
            cx.report.put("Type", raw_type);
            rec.skip(4)?;
            return Ok(true);
        };
        cx.report.put("Type", field_type.name());

        let total = u64::from(count) * field_type.size();
        let values = if total <= 4 {
            let values = read_values(rec, cx, field_type, count)?;
            rec.skip(4 - total)?;
            values
        } else {
            let offset = u64::from(rec.u32(order)?);
            cx.report.put("ValueOffset", offset);
            if offset % 2 == 1 {
                cx.report.info(format!("Value offset {offset} of tag {tag} is not word aligned"), Some(rec.head.offset));
            }
            let inside = match (offset.checked_add(total), cx.state.source_len) {
                (Some(end), Some(len)) => end <= len,
                (Some(_), None) => true,
                (None, _) => false,
            };
            if !inside {
                cx.report.invalid(format!("Value of tag {tag} at offset {offset} lies outside the file"), Some(rec.head.offset));
                return Ok(true);
            }
            rec.detour(offset, total, |view| read_values(view, cx, field_type, count))?
        };
        if tag == TAG_COMPRESSION && self.kind.uses_baseline_tags() {
            if let Some(name) = values.numbers.first().and_then(|&code| compression_name(code)) {
                cx.report.put("Scheme", name);
            }
        }
        if let Some(node) = values.node {
            let single = count == 1 || field_type == FieldType::Ascii;
            cx.report.put(if single { "Value" } else { "Values" }, node);
        }

        let pointed = match tag {
            TAG_SUB_IFDS if self.kind.uses_baseline_tags() => Some(IfdKind::Sub),
            TAG_EXIF_IFD if self.kind.uses_baseline_tags() => Some(IfdKind::Exif),
            TAG_GPS_IFD if self.kind.uses_baseline_tags() => Some(IfdKind::Gps),
            TAG_INTEROP_IFD if self.kind == IfdKind::Exif => Some(IfdKind::Interop),
            _ if field_type == FieldType::Ifd => Some(IfdKind::Sub),
            _ => None,
        };
        if let Some(target) = pointed {
            for &offset in &values.numbers {
                if offset == 0 {
                    continue;
                }
                if !self.work.push(offset, target) {
                    cx.report.malformed(format!("IFD cycle: tag {tag} points back to offset {offset}"), rec.head.offset);
                    continue;
                }
                debug!("tag {tag} queues {target:?} at {offset}");
            }
        }
        Ok(true)
    }
}

struct Values {
    node: Option<PropertyNode>,
    /// Unsigned integer values, for offsets and counts.
    numbers: Vec<u64>,
}

fn read_values(rec: &mut Record<'_, '_>, cx: &mut Context<'_>, field_type: FieldType, count: u32) -> Result<Values> {
    let order = cx.state.byte_order;
    if count == 0 {
        return Ok(Values { node: None, numbers: Vec::new() });
    }
    match field_type {
        FieldType::Ascii => {
            let text = cx.read_text(rec, u64::from(count))?;
            return Ok(Values { node: Some(text.into()), numbers: Vec::new() });
        },
        FieldType::Undefined | FieldType::Byte | FieldType::SByte if count > 4 => {
            let len = u64::from(count);
            rec.ensure_available(len)?;
            cx.tracker.reserve(len)?;
            let raw = rec.bytes(len);
            cx.tracker.release(len);
            let raw = raw?;
            let numbers = if field_type == FieldType::Byte { raw.iter().map(|&b| u64::from(b)).collect() } else { Vec::new() };
            return Ok(Values { node: Some(PropertyNode::Scalar(Scalar::Bytes(raw.to_vec()))), numbers });
        },
        _ => {},
    }
    if count > MAX_KEPT_VALUES {
        cx.report.info(format!("{count} values are too many to list"), Some(rec.position()));
        rec.skip(u64::from(count) * field_type.size())?;
        return Ok(Values { node: None, numbers: Vec::new() });
    }
    rec.ensure_available(u64::from(count) * field_type.size())?;
    let reserved = u64::from(count) * 16;
    cx.tracker.reserve(reserved)?;
    let mut items = Vec::with_capacity(count.to_usize());
    let mut numbers = Vec::new();
    let mut read_all = || -> Result<()> {
        for _ in 0..count {
            let item: PropertyNode = match field_type {
                FieldType::Byte | FieldType::Undefined | FieldType::Ascii => {
                    let v = rec.u8()?;
                    numbers.push(u64::from(v));
                    v.into()
                },
                FieldType::Short => {
                    let v = rec.u16(order)?;
                    numbers.push(u64::from(v));
                    v.into()
                },
                FieldType::Long | FieldType::Ifd => {
                    let v = rec.u32(order)?;
                    numbers.push(u64::from(v));
                    v.into()
                },
                FieldType::SByte => rec.i8()?.into(),
                FieldType::SShort => rec.i16(order)?.into(),
                FieldType::SLong => rec.i32(order)?.into(),
                FieldType::Rational => {
                    let num = rec.u32(order)?;
                    let den = rec.u32(order)?;
                    format!("{num}/{den}").into()
                },
                FieldType::SRational => {
                    let num = rec.i32(order)?;
                    let den = rec.i32(order)?;
                    format!("{num}/{den}").into()
                },
                FieldType::Float => f64::from(rec.f32(order)?).into(),
                FieldType::Double => rec.f64(order)?.into(),
            };
            items.push(item);
        }
        Ok(())
    };
    let outcome = read_all();
    cx.tracker.release(reserved);
    outcome?;
    let node = if items.len() == 1 { items.pop() } else { Some(PropertyNode::Array(items)) };
    Ok(Values { node, numbers })
}

/// Integer values of an entry, whether it holds one value or many.
fn entry_numbers(ifd: &PropertyNode, name: &str) -> Option<Vec<i64>> {
    let entry = ifd.get(name)?;
    if let Some(value) = entry.get("Value") {
        return value.as_i64().map(|v| vec![v]);
    }
    let values = entry.get("Values")?;
    match values {
        PropertyNode::Scalar(Scalar::Bytes(raw)) => Some(raw.iter().map(|&b| i64::from(b)).collect()),
        _ => Some(values.items().iter().filter_map(PropertyNode::as_i64).collect()),
    }
}

fn image_ifds(tree: &PropertyNode) -> impl Iterator<Item = (&str, &PropertyNode)> {
    tree.entries()
        .iter()
        .filter(|(name, _)| name.starts_with("IFD") || name == "SubIFD")
        .map(|(name, node)| (&**name, node))
}

fn primary_fields(tree: &PropertyNode, _: &ParseState, findings: &mut Findings) {
    let Some(ifd0) = tree.get("IFD0") else {
        findings.invalid("No primary image file directory");
        return;
    };
    for name in ["ImageWidth", "ImageLength", "PhotometricInterpretation"] {
        if ifd0.get(name).is_none() {
            findings.invalid(format!("Required tag {name} missing from IFD0"));
        }
    }
}

fn strips_or_tiles(tree: &PropertyNode, _: &ParseState, findings: &mut Findings) {
    for (name, ifd) in image_ifds(tree) {
        let strips = ifd.get("StripOffsets").is_some();
        let tiles = ifd.get("TileOffsets").is_some();
        if strips && tiles {
            findings.invalid(format!("{name} defines both strips and tiles"));
        }
        for (offsets, counts) in [("StripOffsets", "StripByteCounts"), ("TileOffsets", "TileByteCounts")] {
            let n_offsets = ifd.get(offsets).and_then(|e| e.get("Count")).and_then(PropertyNode::as_i64);
            let n_counts = ifd.get(counts).and_then(|e| e.get("Count")).and_then(PropertyNode::as_i64);
            match (n_offsets, n_counts) {
                (Some(a), Some(b)) if a != b => {
                    findings.invalid(format!("{name}: {a} {offsets} but {b} {counts}"));
                },
                (Some(_), None) => findings.invalid(format!("{name}: {offsets} without {counts}")),
                _ => {},
            }
        }
    }
}

fn known_enumerations(tree: &PropertyNode, _: &ParseState, findings: &mut Findings) {
    for (name, ifd) in image_ifds(tree) {
        if let Some(value) = entry_numbers(ifd, "Compression").and_then(|v| v.first().copied()) {
            if !COMPRESSION_SCHEMES.iter().any(|&(code, _)| code == value) {
                findings.invalid(format!("{name}: unknown Compression {value}"));
            }
        }
        if let Some(value) = entry_numbers(ifd, "PhotometricInterpretation").and_then(|v| v.first().copied()) {
            if !PHOTOMETRIC.contains(&value) {
                findings.invalid(format!("{name}: unknown PhotometricInterpretation {value}"));
            }
        }
    }
}

fn image_data_inside_file(tree: &PropertyNode, state: &ParseState, findings: &mut Findings) {
    let Some(len) = state.source_len.and_then(|len| i64::try_from(len).ok()) else {
        return;
    };
    for (name, ifd) in image_ifds(tree) {
        for (offsets, counts) in [("StripOffsets", "StripByteCounts"), ("TileOffsets", "TileByteCounts")] {
            let (Some(offsets_v), Some(counts_v)) = (entry_numbers(ifd, offsets), entry_numbers(ifd, counts)) else {
                continue;
            };
            let outside = offsets_v
                .iter()
                .zip(&counts_v)
                .filter(|&(&offset, &count)| offset.saturating_add(count) > len)
                .count();
            if outside > 0 {
                findings.invalid(format!("{name}: {outside} {offsets} entries point outside the file"));
            }
        }
    }
}

pub(crate) const RULES: &[Rule] = &[primary_fields, strips_or_tiles, known_enumerations, image_data_inside_file];

fn compression_name(code: u64) -> Option<&'static str> {
    COMPRESSION_SCHEMES
        .iter()
        .find(|&&(c, _)| u64::try_from(c) == Ok(code))
        .map(|&(_, name)| name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::Severity;
    use crate::{analyze, FormatKind, Tristate};

    /// Little-endian TIFF builder: header, then IFDs appended in order.
    struct Builder {
        data: Vec<u8>,
    }

    impl Builder {
        fn new() -> Self {
            Self { data: b"II\x2a\x00\x08\x00\x00\x00".to_vec() }
        }

        /// Append an IFD; entries are (tag, type, count, value). Returns the offset of its next-IFD field.
        fn ifd(&mut self, entries: &[(u16, u16, u32, u32)]) -> usize {
            self.data.extend_from_slice(&(entries.len() as u16).to_le_bytes());
            for &(tag, ty, count, value) in entries {
                self.data.extend_from_slice(&tag.to_le_bytes());
                self.data.extend_from_slice(&ty.to_le_bytes());
                self.data.extend_from_slice(&count.to_le_bytes());
                self.data.extend_from_slice(&value.to_le_bytes());
            }
            let next = self.data.len();
            self.data.extend_from_slice(&[0; 4]);
            next
        }

        fn set_next(&mut self, at: usize, offset: u32) {
            self.data[at..at + 4].copy_from_slice(&offset.to_le_bytes());
        }
    }

    fn minimal(strip_offset: u32, strip_len: u32) -> Vec<(u16, u16, u32, u32)> {
        vec![
            (256, 3, 1, 4),
            (257, 3, 1, 1),
            (259, 3, 1, 1),
            (262, 3, 1, 1),
            (273, 4, 1, strip_offset),
            (279, 4, 1, strip_len),
        ]
    }

    #[test]
    fn single_ifd() {
        let mut b = Builder::new();
        b.ifd(&minimal(8, 4));
        let result = analyze(FormatKind::Tiff, &b.data).unwrap();
        assert_eq!(result.well_formed(), Tristate::True, "{:?}", result.messages());
        assert_eq!(result.valid(), Tristate::True, "{:?}", result.messages());
        let ifd0 = result.properties().get("IFD0").unwrap();
        assert_eq!(ifd0.path(&["ImageWidth", "Value"]).and_then(PropertyNode::as_i64), Some(4));
        assert_eq!(ifd0.path(&["Compression", "Type"]).and_then(PropertyNode::as_str), Some("SHORT"));
        assert_eq!(ifd0.path(&["Compression", "Scheme"]).and_then(PropertyNode::as_str), Some("uncompressed"));
        assert_eq!(result.state().byte_order, Endian::Little);
    }

    #[test]
    fn ifd_cycle_is_reported_once() {
        let mut b = Builder::new();
        let next = b.ifd(&minimal(8, 4));
        b.set_next(next, 8);
        let result = analyze(FormatKind::Tiff, &b.data).unwrap();
        assert_eq!(result.well_formed(), Tristate::False);
        let cycles = result.messages().iter().filter(|m| m.text.contains("IFD cycle")).count();
        assert_eq!(cycles, 1);
    }

    #[test]
    fn exif_pointer_back_to_ifd0_keeps_ifd0() {
        let mut entries = minimal(8, 4);
        entries.push((TAG_EXIF_IFD, 4, 1, 8));
        let mut b = Builder::new();
        b.ifd(&entries);
        let result = analyze(FormatKind::Tiff, &b.data).unwrap();
        assert_eq!(result.well_formed(), Tristate::False);
        assert!(result.messages().iter().any(|m| m.text.contains("IFD cycle")), "{:?}", result.messages());
        assert!(!result.messages().iter().any(|m| m.text.contains("No primary image file directory")));
        let ifd0 = result.properties().get("IFD0").unwrap();
        assert_eq!(ifd0.path(&["ImageWidth", "Value"]).and_then(PropertyNode::as_i64), Some(4));
    }

    #[test]
    fn chained_ifds() {
        let mut b = Builder::new();
        let next = b.ifd(&minimal(8, 4));
        let second = b.data.len() as u32;
        b.set_next(next, second);
        b.ifd(&minimal(8, 2));
        let result = analyze(FormatKind::Tiff, &b.data).unwrap();
        assert_eq!(result.well_formed(), Tristate::True, "{:?}", result.messages());
        assert!(result.properties().get("IFD1").is_some());
    }

    #[test]
    fn strips_outside_the_file() {
        let mut b = Builder::new();
        b.ifd(&minimal(1000, 4));
        let result = analyze(FormatKind::Tiff, &b.data).unwrap();
        assert_eq!(result.well_formed(), Tristate::True);
        assert_eq!(result.valid(), Tristate::False);
        assert!(result.messages_of(Severity::Invalid).any(|m| m.text.contains("outside the file")));
    }

    #[test]
    fn out_of_order_tags() {
        let mut entries = minimal(8, 4);
        entries.swap(0, 1);
        let mut b = Builder::new();
        b.ifd(&entries);
        let result = analyze(FormatKind::Tiff, &b.data).unwrap();
        assert_eq!(result.valid(), Tristate::False);
        assert!(result.messages().iter().any(|m| m.text.contains("ascending")));
    }

    #[test]
    fn out_of_line_ascii_value() {
        let mut b = Builder::new();
        let mut entries = minimal(8, 4);
        // header 8 + count 2 + 7 entries * 12 + next 4 = 98
        entries.push((305, 2, 6, 98));
        b.ifd(&entries);
        b.data.extend_from_slice(b"tool\0\0");
        let result = analyze(FormatKind::Tiff, &b.data).unwrap();
        assert_eq!(result.well_formed(), Tristate::True, "{:?}", result.messages());
        let software = result.properties().path(&["IFD0", "Software", "Value"]);
        assert_eq!(software.and_then(PropertyNode::as_str), Some("tool"));
    }

    #[test]
    fn bad_byte_order_mark() {
        let result = analyze(FormatKind::Tiff, b"XX\x2a\x00\x08\x00\x00\x00").unwrap();
        assert!(!result.signature_matched());
        assert_eq!(result.well_formed(), Tristate::False);
    }
}
