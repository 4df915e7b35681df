// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! JPEG (ITU-T T.81) marker segments.
//!
//! After SOI the file is a flat sequence of marker segments. Every SOS is
//! followed by entropy-coded data that has no length field; it is scanned
//! byte by byte up to the next marker that is not RSTn or a stuffed zero.
//! EOI ends the walk.

use arrayvec::ArrayVec;
use bitreader::BitReader;
use log::{debug, trace};

use crate::codes::RecordId;
use crate::cursor::printable;
use crate::engine::{fixed_length, min_length, walk, Codec, Context, Dispatch, ParseState, Phase, Record, WalkEnd};
use crate::header::{marker_header, RecordHeader};
use crate::property::PropertyNode;
use crate::tiff;
use crate::validity::{first_index, Findings, Rule};
use crate::{Error, Result};

const SOI: u8 = 0xD8;
const EOI: u8 = 0xD9;

/// Longest NUL-terminated identifier looked for at the start of an APPn segment.
const MAX_IDENTIFIER_LEN: u64 = 64;

const XMP_NAMESPACE: &[u8] = b"http://ns.adobe.com/xap/1.0/";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Segment {
    Frame(u8),
    HuffmanTables,
    ArithmeticConditioning,
    QuantizationTables,
    Scan,
    RestartInterval,
    NumberOfLines,
    Expand,
    Comment,
    Application(u8),
    Restart,
    Temporary,
    StartOfImage,
}

impl Segment {
    fn from_marker(marker: u8) -> Option<Self> {
        Some(match marker {
            0xC4 => Self::HuffmanTables,
            0xCC => Self::ArithmeticConditioning,
            0xC8 => return None,
            0xC0..=0xCF => Self::Frame(marker),
            0xD0..=0xD7 => Self::Restart,
            SOI => Self::StartOfImage,
            0xDA => Self::Scan,
            0xDB => Self::QuantizationTables,
            0xDC => Self::NumberOfLines,
            0xDD => Self::RestartInterval,
            0xDF => Self::Expand,
            0xE0..=0xEF => Self::Application(marker - 0xE0),
            0xFE => Self::Comment,
            0x01 => Self::Temporary,
            _ => return None,
        })
    }
}

/// Coding process named by a SOFn marker.
fn coding_process(marker: u8) -> &'static str {
    match marker {
        0xC0 => "Baseline DCT",
        0xC1 => "Extended sequential DCT, Huffman coding",
        0xC2 => "Progressive DCT, Huffman coding",
        0xC3 => "Lossless, Huffman coding",
        0xC5 => "Differential sequential DCT, Huffman coding",
        0xC6 => "Differential progressive DCT, Huffman coding",
        0xC7 => "Differential lossless, Huffman coding",
        0xC9 => "Extended sequential DCT, arithmetic coding",
        0xCA => "Progressive DCT, arithmetic coding",
        0xCB => "Lossless, arithmetic coding",
        0xCD => "Differential sequential DCT, arithmetic coding",
        0xCE => "Differential progressive DCT, arithmetic coding",
        0xCF => "Differential lossless, arithmetic coding",
        _ => "unknown",
    }
}

fn is_arithmetic(marker: u8) -> bool {
    marker >= 0xC9
}

fn is_lossless(marker: u8) -> bool {
    matches!(marker, 0xC3 | 0xC7 | 0xCB | 0xCF)
}

/// High and low nibble of one byte.
fn nibbles(byte: u8) -> Result<(u8, u8)> {
    let bytes = [byte];
    let mut bits = BitReader::new(&bytes);
    Ok((bits.read_u8(4)?, bits.read_u8(4)?))
}

pub(crate) fn parse(file: &mut Record<'_, '_>, cx: &mut Context<'_>) -> Result<()> {
    let signature = file.u8().and_then(|first| Ok([first, file.u8()?]));
    match signature {
        Ok([0xFF, SOI]) => {},
        Ok(found) => {
            cx.abort(format!("Unrecognized signature {:02X}{:02X}", found[0], found[1]), 0);
            return Ok(());
        },
        Err(e) if e.is_terminal() => return Err(e),
        Err(_) => {
            cx.abort("File too short for a signature", 0);
            return Ok(());
        },
    }
    cx.report.signature_matched();
    cx.advance(Phase::SignatureChecked);
    cx.advance(Phase::HeaderParsed);
    cx.advance(Phase::IteratingTopLevel);

    let mut segments = Segments::default();
    match walk(&mut segments, file, cx) {
        Ok(WalkEnd::Sentinel(eoi)) => {
            let end = file.position();
            if file.skip_remaining().is_ok() && file.position() > end {
                cx.report.info(format!("{} bytes of data after EOI", file.position() - end), Some(end));
            }
            debug!("EOI at {}", eoi.offset);
        },
        Ok(WalkEnd::Exhausted) => {
            cx.report.malformed("premature end of file: no EOI marker", file.position());
        },
        Ok(WalkEnd::Abandoned) => debug!("marker walk abandoned"),
        Err(e) if e.is_terminal() => return Err(e),
        Err(e) => cx.report.malformed_error(&e, "Marker segments", file.position()),
    }
    Ok(())
}

/// Top-level marker dispatcher. Tracks whether entropy-coded data follows.
#[derive(Default)]
struct Segments {
    in_scan: bool,
}

impl Segments {
    /// Consume entropy-coded data up to the next real marker and return the
    /// offset of its first `0xFF`.
    fn skip_entropy_coded(&mut self, rec: &mut Record<'_, '_>, cx: &mut Context<'_>) -> Result<(u64, u8)> {
        let start = rec.position();
        let mut restarts = 0u32;
        let found = loop {
            if rec.u8()? != 0xFF {
                continue;
            }
            let at = rec.position() - 1;
            let mut next = rec.u8()?;
            while next == 0xFF {
                next = rec.u8()?;
            }
            match next {
                0x00 => {},
                0xD0..=0xD7 => restarts += 1,
                marker => break (at, marker),
            }
        };
        self.in_scan = false;
        let length = found.0 - start;
        trace!("{length} bytes of entropy-coded data, {restarts} restarts");
        cx.report.open("EntropyCodedData");
        cx.report.put("Offset", start);
        cx.report.put("Length", length);
        cx.report.put("RestartMarkers", restarts);
        cx.report.close(true);
        Ok(found)
    }

    /// Find the next marker outside a scan, reporting stray bytes.
    fn next_marker(rec: &mut Record<'_, '_>, cx: &mut Context<'_>) -> Result<(u64, u8)> {
        let start = rec.position();
        let mut first = rec.u8()?;
        while first != 0xFF {
            first = rec.u8()?;
        }
        let at = rec.position() - 1;
        if at > start {
            cx.report.malformed(format!("{} bytes of data outside any marker segment", at - start), start);
        }
        let mut marker = rec.u8()?;
        while marker == 0xFF {
            marker = rec.u8()?;
        }
        if marker == 0x00 {
            return Err(Error::InvalidData("stuffed zero byte outside a scan"));
        }
        Ok((at, marker))
    }
}

impl Dispatch for Segments {
    type Kind = Segment;

    fn read_header(&mut self, rec: &mut Record<'_, '_>, cx: &mut Context<'_>) -> Result<RecordHeader> {
        let (offset, marker) = if self.in_scan {
            self.skip_entropy_coded(rec, cx)?
        } else {
            Self::next_marker(rec, cx)?
        };
        marker_header(rec, offset, marker)
    }

    fn lookup(&self, id: RecordId) -> Option<Segment> {
        match id {
            RecordId::Marker(marker) => Segment::from_marker(marker),
            _ => None,
        }
    }

    fn is_sentinel(&self, head: &RecordHeader) -> bool {
        head.id == RecordId::Marker(EOI)
    }

    fn continue_after_failure(&self) -> bool {
        true
    }

    fn read(&mut self, kind: Segment, rec: &mut Record<'_, '_>, cx: &mut Context<'_>) -> Result<bool> {
        match kind {
            Segment::Frame(marker) => read_frame(rec, cx, marker),
            Segment::HuffmanTables => read_dht(rec, cx),
            Segment::ArithmeticConditioning => read_dac(rec, cx),
            Segment::QuantizationTables => read_dqt(rec, cx),
            Segment::Scan => {
                self.in_scan = true;
                read_sos(rec, cx)
            },
            Segment::RestartInterval => {
                if !fixed_length(rec, cx, 2) {
                    return Ok(false);
                }
                cx.report.put("Interval", rec.be_u16()?);
                Ok(true)
            },
            Segment::NumberOfLines => {
                if !fixed_length(rec, cx, 2) {
                    return Ok(false);
                }
                cx.report.put("NumberOfLines", rec.be_u16()?);
                Ok(true)
            },
            Segment::Expand => {
                if !fixed_length(rec, cx, 1) {
                    return Ok(false);
                }
                let (horizontal, vertical) = nibbles(rec.u8()?)?;
                cx.report.put("ExpandHorizontally", horizontal);
                cx.report.put("ExpandVertically", vertical);
                Ok(true)
            },
            Segment::Comment => {
                let text = cx.read_rest_text(rec)?;
                cx.report.put("Text", text);
                Ok(true)
            },
            Segment::Application(n) => read_app(rec, cx, n),
            Segment::Restart => {
                cx.report.malformed(format!("'{}' outside an entropy-coded segment", rec.head.id), rec.head.offset);
                Ok(false)
            },
            Segment::Temporary => Ok(true),
            Segment::StartOfImage => {
                cx.report.malformed("SOI marker inside the image", rec.head.offset);
                Ok(false)
            },
        }
    }
}

fn read_frame(rec: &mut Record<'_, '_>, cx: &mut Context<'_>, marker: u8) -> Result<bool> {
    if !min_length(rec, cx, 6) {
        return Ok(false);
    }
    let precision = rec.u8()?;
    let lines = rec.be_u16()?;
    let samples_per_line = rec.be_u16()?;
    let components = rec.u8()?;
    if !fixed_length(rec, cx, 6 + 3 * u64::from(components)) {
        return Ok(false);
    }
    cx.report.put("Process", coding_process(marker));
    cx.report.put("SamplePrecision", precision);
    cx.report.put("NumberOfLines", lines);
    cx.report.put("SamplesPerLine", samples_per_line);
    cx.report.put("NumberOfComponents", components);
    let mut list = Vec::with_capacity(usize::from(components));
    for _ in 0..components {
        let id = rec.u8()?;
        let (horizontal, vertical) = nibbles(rec.u8()?)?;
        let table = rec.u8()?;
        list.push(PropertyNode::Composite(vec![
            ("Identifier".into(), id.into()),
            ("HorizontalSampling".into(), horizontal.into()),
            ("VerticalSampling".into(), vertical.into()),
            ("QuantizationTable".into(), table.into()),
        ]));
    }
    cx.report.put("Components", PropertyNode::List(list));
    if lines == 0 {
        cx.report.info("Number of lines is defined by a later DNL segment", Some(rec.head.offset));
    }
    cx.state.codec = Some(Codec::new(u32::from(marker), coding_process(marker)));
    Ok(true)
}

fn read_dht(rec: &mut Record<'_, '_>, cx: &mut Context<'_>) -> Result<bool> {
    let mut tables = Vec::new();
    while rec.remaining().unwrap_or(0) > 0 {
        let at = rec.position();
        let (class, id) = nibbles(rec.u8()?)?;
        if class > 1 || id > 3 {
            cx.report.malformed(format!("Huffman table class {class}, id {id} out of range"), at);
            return Ok(false);
        }
        let counts = rec.bytes(16)?;
        let codes: u64 = counts.iter().map(|&n| u64::from(n)).sum();
        rec.skip(codes)?;
        tables.push(PropertyNode::Composite(vec![
            ("Class".into(), (if class == 0 { "DC" } else { "AC" }).into()),
            ("Identifier".into(), id.into()),
            ("NumberOfCodes".into(), codes.into()),
        ]));
    }
    cx.report.put("Tables", PropertyNode::List(tables));
    Ok(true)
}

fn read_dqt(rec: &mut Record<'_, '_>, cx: &mut Context<'_>) -> Result<bool> {
    let mut tables = Vec::new();
    while rec.remaining().unwrap_or(0) > 0 {
        let at = rec.position();
        let (precision, id) = nibbles(rec.u8()?)?;
        if precision > 1 || id > 3 {
            cx.report.malformed(format!("Quantization table precision {precision}, id {id} out of range"), at);
            return Ok(false);
        }
        rec.skip(if precision == 0 { 64 } else { 128 })?;
        tables.push(PropertyNode::Composite(vec![
            ("Precision".into(), (if precision == 0 { 8u8 } else { 16 }).into()),
            ("Identifier".into(), id.into()),
        ]));
    }
    cx.report.put("Tables", PropertyNode::List(tables));
    Ok(true)
}

fn read_dac(rec: &mut Record<'_, '_>, cx: &mut Context<'_>) -> Result<bool> {
    if rec.head.length % 2 != 0 {
        cx.report.malformed(format!("DAC length {} is not a multiple of 2", rec.head.length), rec.head.offset);
        return Ok(false);
    }
    let mut tables = Vec::new();
    while rec.remaining().unwrap_or(0) > 0 {
        let (class, id) = nibbles(rec.u8()?)?;
        let value = rec.u8()?;
        tables.push(PropertyNode::Composite(vec![
            ("Class".into(), (if class == 0 { "DC" } else { "AC" }).into()),
            ("Identifier".into(), id.into()),
            ("Value".into(), value.into()),
        ]));
    }
    cx.report.put("Conditioning", PropertyNode::List(tables));
    Ok(true)
}

/// Component selector with its DC and AC entropy table selectors.
struct ScanComponent {
    selector: u8,
    dc_table: u8,
    ac_table: u8,
}

fn read_sos(rec: &mut Record<'_, '_>, cx: &mut Context<'_>) -> Result<bool> {
    if !min_length(rec, cx, 1) {
        return Ok(false);
    }
    let count = rec.u8()?;
    if !(1..=4).contains(&count) {
        cx.report.malformed(format!("Scan has {count} components, expected 1 to 4"), rec.head.offset);
        return Ok(false);
    }
    if !fixed_length(rec, cx, 4 + 2 * u64::from(count)) {
        return Ok(false);
    }
    let mut components = ArrayVec::<ScanComponent, 4>::new();
    for _ in 0..count {
        let selector = rec.u8()?;
        let (dc_table, ac_table) = nibbles(rec.u8()?)?;
        components.push(ScanComponent { selector, dc_table, ac_table });
    }
    let spectral_start = rec.u8()?;
    let spectral_end = rec.u8()?;
    let (approximation_high, approximation_low) = nibbles(rec.u8()?)?;

    cx.report.put("NumberOfComponents", count);
    let list = components
        .iter()
        .map(|c| {
            PropertyNode::Composite(vec![
                ("Selector".into(), c.selector.into()),
                ("DCTable".into(), c.dc_table.into()),
                ("ACTable".into(), c.ac_table.into()),
            ])
        })
        .collect();
    cx.report.put("Components", PropertyNode::List(list));
    cx.report.put("SpectralSelectionStart", spectral_start);
    cx.report.put("SpectralSelectionEnd", spectral_end);
    cx.report.put("SuccessiveApproximationHigh", approximation_high);
    cx.report.put("SuccessiveApproximationLow", approximation_low);
    Ok(true)
}

/// Bytes up to a NUL (consumed, not returned) or the end of the record.
fn read_identifier(rec: &mut Record<'_, '_>) -> Result<Vec<u8>> {
    let mut id = Vec::new();
    while rec.remaining().unwrap_or(0) > 0 && (id.len() as u64) < MAX_IDENTIFIER_LEN {
        match rec.u8()? {
            0 => break,
            b => id.push(b),
        }
    }
    Ok(id)
}

fn read_app(rec: &mut Record<'_, '_>, cx: &mut Context<'_>, n: u8) -> Result<bool> {
    if n == 14 {
        return read_adobe(rec, cx);
    }
    let id = read_identifier(rec)?;
    cx.report.put("Identifier", printable(&id));
    match (n, &id[..]) {
        (0, b"JFIF") => read_jfif(rec, cx),
        (0, b"JFXX") => read_jfxx(rec, cx),
        (1, b"Exif") => read_exif(rec, cx),
        (1, XMP_NAMESPACE) => {
            let packet = cx.read_rest_text(rec)?;
            cx.report.put("Length", packet.len() as u64);
            cx.report.put("XMP", packet);
            Ok(true)
        },
        (2, b"ICC_PROFILE") => read_icc(rec, cx),
        _ => {
            cx.report.put("Length", rec.head.length);
            rec.skip_remaining()?;
            Ok(true)
        },
    }
}

fn read_jfif(rec: &mut Record<'_, '_>, cx: &mut Context<'_>) -> Result<bool> {
    if !min_length(rec, cx, 14) {
        return Ok(false);
    }
    let major = rec.u8()?;
    let minor = rec.u8()?;
    let units = rec.u8()?;
    let x_density = rec.be_u16()?;
    let y_density = rec.be_u16()?;
    let thumb_width = rec.u8()?;
    let thumb_height = rec.u8()?;
    let thumbnail = 3 * u64::from(thumb_width) * u64::from(thumb_height);
    if !fixed_length(rec, cx, 14 + thumbnail) {
        return Ok(false);
    }
    cx.state.bump_version(u32::from(major) * 100 + u32::from(minor));
    cx.report.put("Version", format!("{major}.{minor:02}"));
    cx.report.put(
        "DensityUnits",
        match units {
            0 => "aspect ratio",
            1 => "dots per inch",
            2 => "dots per centimeter",
            _ => "unknown",
        },
    );
    cx.report.put("XDensity", x_density);
    cx.report.put("YDensity", y_density);
    cx.report.put("ThumbnailWidth", thumb_width);
    cx.report.put("ThumbnailHeight", thumb_height);
    rec.skip(thumbnail)?;
    Ok(true)
}

fn read_jfxx(rec: &mut Record<'_, '_>, cx: &mut Context<'_>) -> Result<bool> {
    let code = rec.u8()?;
    let format = match code {
        0x10 => "JPEG",
        0x11 => "1 byte per pixel, palette",
        0x13 => "3 bytes per pixel, RGB",
        _ => {
            cx.report.malformed(format!("Unknown JFXX extension code 0x{code:02X}"), rec.head.offset);
            return Ok(false);
        },
    };
    cx.report.put("ThumbnailFormat", format);
    cx.report.put("ThumbnailLength", rec.remaining().unwrap_or(0));
    rec.skip_remaining()?;
    Ok(true)
}

fn read_exif(rec: &mut Record<'_, '_>, cx: &mut Context<'_>) -> Result<bool> {
    // "Exif" is followed by two NULs; the first ended the identifier.
    if rec.u8()? != 0 {
        cx.report.info("Exif identifier is not padded with a second NUL", Some(rec.head.offset));
    }
    let len = rec.remaining().unwrap_or(0);
    cx.report.put("Length", len);
    rec.ensure_available(len)?;
    cx.tracker.reserve(len)?;
    let data = rec.bytes(len);
    let ok = match data {
        Ok(data) => tiff::parse_embedded(&data, cx),
        Err(e) => Err(e),
    };
    cx.tracker.release(len);
    ok
}

fn read_icc(rec: &mut Record<'_, '_>, cx: &mut Context<'_>) -> Result<bool> {
    let sequence = rec.u8()?;
    let total = rec.u8()?;
    if sequence == 0 || sequence > total {
        cx.report.malformed(format!("ICC chunk {sequence} of {total}"), rec.head.offset);
        return Ok(false);
    }
    cx.report.put("ChunkNumber", sequence);
    cx.report.put("NumberOfChunks", total);
    cx.report.put("Length", rec.remaining().unwrap_or(0));
    if sequence == 1 && rec.remaining().unwrap_or(0) >= 128 {
        cx.report.put("ProfileSize", rec.be_u32()?);
        cx.report.put("PreferredCMM", rec.raw_fourcc()?.to_string());
        let version = rec.be_u32()?;
        cx.report.put("ProfileVersion", format!("{}.{}", version >> 24, (version >> 20) & 0xF));
        cx.report.put("DeviceClass", rec.raw_fourcc()?.to_string());
        cx.report.put("ColorSpace", rec.raw_fourcc()?.to_string());
    }
    rec.skip_remaining()?;
    Ok(true)
}

/// APP14 "Adobe": version, two flag words and the colour transform.
fn read_adobe(rec: &mut Record<'_, '_>, cx: &mut Context<'_>) -> Result<bool> {
    let id = read_identifier_fixed::<5>(rec)?;
    if id != *b"Adobe" {
        cx.report.put("Identifier", printable(&id));
        cx.report.put("Length", rec.head.length);
        rec.skip_remaining()?;
        return Ok(true);
    }
    cx.report.put("Identifier", "Adobe");
    if !fixed_length(rec, cx, 12) {
        return Ok(false);
    }
    cx.report.put("Version", rec.be_u16()?);
    cx.report.put("Flags0", rec.be_u16()?);
    cx.report.put("Flags1", rec.be_u16()?);
    let transform = rec.u8()?;
    cx.report.put(
        "ColorTransform",
        match transform {
            0 => "unknown (RGB or CMYK)",
            1 => "YCbCr",
            2 => "YCCK",
            _ => "reserved",
        },
    );
    Ok(true)
}

/// First `N` payload bytes, or fewer when the segment is shorter.
fn read_identifier_fixed<const N: usize>(rec: &mut Record<'_, '_>) -> Result<Vec<u8>> {
    let len = rec.remaining().unwrap_or(0).min(N as u64);
    Ok(rec.bytes(len)?.to_vec())
}

/// Segment nodes whose name starts with `prefix`, with their positions.
fn nodes_with_prefix<'t>(tree: &'t PropertyNode, prefix: &'t str) -> impl Iterator<Item = (usize, &'t PropertyNode)> + 't {
    tree.entries()
        .iter()
        .enumerate()
        .filter(move |(_, (name, _))| name.starts_with(prefix))
        .map(|(i, (_, node))| (i, node))
}

fn frame_before_scan(tree: &PropertyNode, _: &ParseState, findings: &mut Findings) {
    let Some(scan) = first_index(tree, "SOS") else {
        return;
    };
    if !nodes_with_prefix(tree, "SOF").any(|(i, _)| i < scan) {
        findings.invalid("Scan without a preceding frame header");
    }
}

fn huffman_tables_defined(tree: &PropertyNode, state: &ParseState, findings: &mut Findings) {
    let Some(codec) = &state.codec else {
        return;
    };
    let Ok(marker) = u8::try_from(codec.code) else {
        return;
    };
    if is_arithmetic(marker) || first_index(tree, "SOS").is_none() {
        return;
    }
    if first_index(tree, "DHT").is_none() {
        findings.invalid(format!("{} image defines no Huffman tables", codec.name));
    }
}

fn quantization_tables_defined(tree: &PropertyNode, state: &ParseState, findings: &mut Findings) {
    let Some(scan) = first_index(tree, "SOS") else {
        return;
    };
    if state.codec.as_ref().and_then(|c| u8::try_from(c.code).ok()).is_some_and(is_lossless) {
        return;
    }
    let defined: Vec<i64> = nodes_with_prefix(tree, "DQT")
        .filter(|&(i, _)| i < scan)
        .flat_map(|(_, dqt)| dqt.get("Tables").map(PropertyNode::items).unwrap_or_default())
        .filter_map(|table| table.get("Identifier").and_then(PropertyNode::as_i64))
        .collect();
    for (_, frame) in nodes_with_prefix(tree, "SOF").filter(|&(i, _)| i < scan) {
        let components = frame.get("Components").map(PropertyNode::items).unwrap_or_default();
        for component in components {
            let Some(table) = component.get("QuantizationTable").and_then(PropertyNode::as_i64) else {
                continue;
            };
            if !defined.contains(&table) {
                findings.invalid(format!("Quantization table {table} is used before it is defined"));
            }
        }
    }
}

fn jfif_follows_soi(tree: &PropertyNode, _: &ParseState, findings: &mut Findings) {
    let misplaced = tree.entries().iter().enumerate().any(|(i, (name, node))| {
        i > 0 && name == "APP0" && node.get("Identifier").and_then(PropertyNode::as_str) == Some("JFIF")
    });
    if misplaced {
        findings.invalid("JFIF APP0 segment does not directly follow SOI");
    }
}

pub(crate) const RULES: &[Rule] = &[frame_before_scan, huffman_tables_defined, quantization_tables_defined, jfif_follows_soi];

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::Severity;
    use crate::{analyze, FormatKind, Tristate};

    fn segment(marker: u8, payload: &[u8]) -> Vec<u8> {
        let mut out = vec![0xFF, marker];
        out.extend_from_slice(&((payload.len() + 2) as u16).to_be_bytes());
        out.extend_from_slice(payload);
        out
    }

    fn baseline(entropy: &[u8]) -> Vec<u8> {
        let mut file = vec![0xFF, SOI];
        file.extend(segment(0xE0, b"JFIF\0\x01\x02\x01\x00\x48\x00\x48\x00\x00"));
        let mut dqt = vec![0x00];
        dqt.extend_from_slice(&[1; 64]);
        file.extend(segment(0xDB, &dqt));
        file.extend(segment(0xC0, &[8, 0, 16, 0, 16, 1, 1, 0x11, 0]));
        let mut dht = vec![0x00];
        dht.extend_from_slice(&[0, 1, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0]);
        dht.push(0);
        file.extend(segment(0xC4, &dht));
        file.extend(segment(0xDA, &[1, 1, 0x00, 0, 63, 0]));
        file.extend_from_slice(entropy);
        file.extend_from_slice(&[0xFF, EOI]);
        file
    }

    #[test]
    fn baseline_image() {
        let result = analyze(FormatKind::Jpeg, &baseline(&[0x12, 0xFF, 0x00, 0x34, 0xFF, 0xD0, 0x56])).unwrap();
        assert_eq!(result.well_formed(), Tristate::True, "{:?}", result.messages());
        assert_eq!(result.valid(), Tristate::True, "{:?}", result.messages());
        let tree = result.properties();
        assert_eq!(tree.path(&["APP0", "Version"]).and_then(PropertyNode::as_str), Some("1.02"));
        assert_eq!(tree.path(&["SOF0", "SamplesPerLine"]).and_then(PropertyNode::as_i64), Some(16));
        let entropy = tree.get("EntropyCodedData").unwrap();
        assert_eq!(entropy.get("Length").and_then(PropertyNode::as_i64), Some(7));
        assert_eq!(entropy.get("RestartMarkers").and_then(PropertyNode::as_i64), Some(1));
        assert_eq!(result.state().version(), 102);
        assert_eq!(result.state().codec.as_ref().map(|c| c.code), Some(0xC0));
    }

    #[test]
    fn missing_eoi() {
        let mut file = baseline(&[1, 2, 3]);
        file.truncate(file.len() - 2);
        let result = analyze(FormatKind::Jpeg, &file).unwrap();
        assert_eq!(result.well_formed(), Tristate::False);
        assert!(result.messages().iter().any(|m| m.text.contains("premature end of file")));
    }

    #[test]
    fn frame_length_must_match_components() {
        let mut file = vec![0xFF, SOI];
        file.extend(segment(0xC0, &[8, 0, 16, 0, 16, 2, 1, 0x11, 0]));
        file.extend_from_slice(&[0xFF, EOI]);
        let result = analyze(FormatKind::Jpeg, &file).unwrap();
        assert_eq!(result.well_formed(), Tristate::False);
        assert!(result.properties().get("SOF0").is_none());
        assert!(result.messages().iter().any(|m| m.text.contains("must be 12 bytes long")));
    }

    #[test]
    fn scan_without_frame_is_invalid() {
        let mut file = vec![0xFF, SOI];
        file.extend(segment(0xDA, &[1, 1, 0x00, 0, 63, 0]));
        file.extend_from_slice(&[0xFF, EOI]);
        let result = analyze(FormatKind::Jpeg, &file).unwrap();
        assert_eq!(result.well_formed(), Tristate::True, "{:?}", result.messages());
        assert!(result.messages_of(Severity::Invalid).any(|m| m.text.contains("preceding frame")));
    }

    #[test]
    fn fill_bytes_and_unknown_markers() {
        let mut file = vec![0xFF, SOI, 0xFF, 0xFF];
        file.extend(segment(0xF7, &[1, 2, 3]));
        file.extend(segment(0xFE, b"hello"));
        file.extend_from_slice(&[0xFF, EOI]);
        let result = analyze(FormatKind::Jpeg, &file).unwrap();
        assert_eq!(result.well_formed(), Tristate::True, "{:?}", result.messages());
        assert_eq!(result.messages_of(Severity::Info).count(), 1);
        assert_eq!(result.properties().path(&["COM", "Text"]).and_then(PropertyNode::as_str), Some("hello"));
    }

    #[test]
    fn not_a_jpeg() {
        let result = analyze(FormatKind::Jpeg, b"GIF89a").unwrap();
        assert!(!result.signature_matched());
    }

    #[test]
    fn exif_segment() {
        let mut exif = b"Exif\0\0".to_vec();
        exif.extend_from_slice(b"II\x2a\0\x08\0\0\0");
        exif.extend_from_slice(&[1, 0]);
        exif.extend_from_slice(&[0x10, 0x01, 2, 0, 4, 0, 0, 0, b'c', b'a', b'm', 0]);
        exif.extend_from_slice(&[0, 0, 0, 0]);
        let mut file = vec![0xFF, SOI];
        file.extend(segment(0xE1, &exif));
        file.extend_from_slice(&[0xFF, EOI]);
        let result = analyze(FormatKind::Jpeg, &file).unwrap();
        assert_eq!(result.well_formed(), Tristate::True, "{:?}", result.messages());
        let model = result.properties().path(&["APP1", "IFD0", "Model", "Value"]);
        assert_eq!(model.and_then(PropertyNode::as_str), Some("cam"));
        assert_eq!(result.state().byte_order, crate::Endian::Big);
    }
}
