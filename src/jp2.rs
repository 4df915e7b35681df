// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! JPEG 2000 part 1 (JP2) boxes.

use log::debug;

use crate::codes::{FourCC, RecordId};
use crate::engine::{
    dispatch, fixed_length, min_length, walk, walk_container, Codec, Context, Dispatch, ParseState, Phase, Record,
    WalkEnd,
};
use crate::header::{read_box_header, RecordHeader};
use crate::property::PropertyNode;
use crate::validity::{first_index, Findings, Rule};
use crate::Result;

record_kinds! {
    pub(crate) enum TopBox {
        FileType => b"ftyp",
        Header => b"jp2h",
        Codestream => b"jp2c",
        IntellectualProperty => b"jp2i",
        Xml => b"xml ",
        Uuid => b"uuid",
        UuidInfo => b"uinf",
    }
}

record_kinds! {
    pub(crate) enum HeaderBox {
        ImageHeader => b"ihdr",
        BitsPerComponent => b"bpcc",
        ColourSpecification => b"colr",
        Palette => b"pclr",
        ComponentMapping => b"cmap",
        ChannelDefinition => b"cdef",
        Resolution => b"res ",
    }
}

record_kinds! {
    pub(crate) enum ResolutionBox {
        Capture => b"resc",
        Display => b"resd",
    }
}

record_kinds! {
    pub(crate) enum UuidInfoBox {
        UuidList => b"ulst",
        Url => b"url ",
    }
}

const SIGNATURE_BOX: FourCC = FourCC::new(*b"jP  ");
const SIGNATURE: u32 = 0x0D0A_870A;
const FILE_TYPE: FourCC = FourCC::new(*b"ftyp");
/// Wavelet compression, the only type JP2 allows in `ihdr`.
const COMPRESSION_WAVELET: i64 = 7;
const BITS_VARY: i64 = 255;

const SOC: u16 = 0xFF4F;
const SIZ: u16 = 0xFF51;

pub(crate) fn parse(file: &mut Record<'_, '_>, cx: &mut Context<'_>) -> Result<()> {
    match read_signature(file) {
        Ok(true) => {},
        Ok(false) => {
            cx.abort("No JPEG 2000 signature box", 0);
            return Ok(());
        },
        Err(e) if e.is_terminal() => return Err(e),
        Err(e) => {
            cx.abort(format!("Signature box: {e}"), 0);
            return Ok(());
        },
    }
    cx.report.signature_matched();
    cx.advance(Phase::SignatureChecked);

    let mut boxes = TopLevel::default();
    let ftyp = match read_box_header(file) {
        Ok(head) => head,
        Err(e) if e.is_terminal() => return Err(e),
        Err(e) => {
            cx.report.malformed_error(&e, "Box after the signature", file.position());
            return Ok(());
        },
    };
    if ftyp.id != RecordId::FourCC(FILE_TYPE) {
        cx.report.malformed(format!("'ftyp' must follow the signature box, found '{}'", ftyp.id), ftyp.offset);
    }
    dispatch(&mut boxes, file, ftyp, cx)?;
    cx.advance(Phase::HeaderParsed);

    cx.advance(Phase::IteratingTopLevel);
    match walk(&mut boxes, file, cx) {
        Ok(WalkEnd::Abandoned) => debug!("box walk abandoned"),
        Ok(_) => {},
        Err(e) if e.is_terminal() => return Err(e),
        Err(e) => cx.report.malformed_error(&e, "Top-level boxes", file.position()),
    }
    Ok(())
}

/// Twelve bytes: length 12, `jP  `, then `<CR><LF><0x87><LF>`.
fn read_signature(file: &mut Record<'_, '_>) -> Result<bool> {
    let head = read_box_header(file)?;
    if head.id != RecordId::FourCC(SIGNATURE_BOX) || head.length != 4 {
        return Ok(false);
    }
    Ok(file.be_u32()? == SIGNATURE)
}

#[derive(Default)]
struct TopLevel {
    seen_file_type: bool,
}

impl Dispatch for TopLevel {
    type Kind = TopBox;

    fn read_header(&mut self, rec: &mut Record<'_, '_>, _cx: &mut Context<'_>) -> Result<RecordHeader> {
        read_box_header(rec)
    }

    fn lookup(&self, id: RecordId) -> Option<TopBox> {
        TopBox::lookup(id)
    }

    fn continue_after_failure(&self) -> bool {
        true
    }

    fn read(&mut self, kind: TopBox, rec: &mut Record<'_, '_>, cx: &mut Context<'_>) -> Result<bool> {
        match kind {
            TopBox::FileType => {
                if std::mem::replace(&mut self.seen_file_type, true) {
                    cx.report.malformed("More than one 'ftyp' box", rec.head.offset);
                    return Ok(false);
                }
                read_ftyp(rec, cx)
            },
            TopBox::Header => walk_container(&mut HeaderBoxes, rec, cx),
            TopBox::Codestream => read_codestream(rec, cx),
            TopBox::IntellectualProperty => {
                cx.report.put("Length", rec.head.length);
                rec.skip_remaining()?;
                Ok(true)
            },
            TopBox::Xml => {
                let text = cx.read_rest_text(rec)?;
                cx.report.put("Text", text);
                Ok(true)
            },
            TopBox::Uuid => {
                if !min_length(rec, cx, 16) {
                    return Ok(false);
                }
                cx.report.put("UUID", uuid_string(&rec.bytes(16)?));
                cx.report.put("Length", rec.remaining().unwrap_or(0));
                rec.skip_remaining()?;
                Ok(true)
            },
            TopBox::UuidInfo => walk_container(&mut UuidInfoBoxes, rec, cx),
        }
    }
}

fn uuid_string(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(36);
    for (i, b) in bytes.iter().enumerate() {
        if matches!(i, 4 | 6 | 8 | 10) {
            out.push('-');
        }
        out.push_str(&format!("{b:02x}"));
    }
    out
}

fn read_ftyp(rec: &mut Record<'_, '_>, cx: &mut Context<'_>) -> Result<bool> {
    if !min_length(rec, cx, 8) {
        return Ok(false);
    }
    let list_len = rec.head.length - 8;
    if list_len % 4 != 0 {
        cx.report.malformed(
            format!("'ftyp' compatibility list of {list_len} bytes is not a multiple of 4"),
            rec.head.offset,
        );
        return Ok(false);
    }
    let brand = rec.raw_fourcc()?;
    let minor = rec.be_u32()?;
    cx.report.put("Brand", brand.to_string());
    cx.report.put("MinorVersion", minor);
    let mut compatible = Vec::new();
    for _ in 0..list_len / 4 {
        compatible.push(PropertyNode::from(rec.raw_fourcc()?.to_string()));
    }
    cx.report.put("Compatibility", PropertyNode::List(compatible));
    Ok(true)
}

struct HeaderBoxes;

impl Dispatch for HeaderBoxes {
    type Kind = HeaderBox;

    fn read_header(&mut self, rec: &mut Record<'_, '_>, _cx: &mut Context<'_>) -> Result<RecordHeader> {
        read_box_header(rec)
    }

    fn lookup(&self, id: RecordId) -> Option<HeaderBox> {
        HeaderBox::lookup(id)
    }

    fn read(&mut self, kind: HeaderBox, rec: &mut Record<'_, '_>, cx: &mut Context<'_>) -> Result<bool> {
        match kind {
            HeaderBox::ImageHeader => read_ihdr(rec, cx),
            HeaderBox::BitsPerComponent => {
                let depths = rec.bytes(rec.remaining().unwrap_or(0))?;
                let list = depths.iter().map(|&d| PropertyNode::from(bit_depth(d))).collect();
                cx.report.put("BitDepths", PropertyNode::List(list));
                Ok(true)
            },
            HeaderBox::ColourSpecification => read_colr(rec, cx),
            HeaderBox::Palette => read_pclr(rec, cx),
            HeaderBox::ComponentMapping => read_cmap(rec, cx),
            HeaderBox::ChannelDefinition => read_cdef(rec, cx),
            HeaderBox::Resolution => walk_container(&mut ResolutionBoxes, rec, cx),
        }
    }
}

/// Bit depth byte: low seven bits hold depth minus one, the top bit marks signed values.
fn bit_depth(raw: u8) -> String {
    let depth = (raw & 0x7F) + 1;
    if raw & 0x80 != 0 { format!("{depth} signed") } else { format!("{depth} unsigned") }
}

fn read_ihdr(rec: &mut Record<'_, '_>, cx: &mut Context<'_>) -> Result<bool> {
    if !fixed_length(rec, cx, 14) {
        return Ok(false);
    }
    let height = rec.be_u32()?;
    let width = rec.be_u32()?;
    let components = rec.be_u16()?;
    let bpc = rec.u8()?;
    let compression = rec.u8()?;
    let unknown_colourspace = rec.u8()?;
    let ipr = rec.u8()?;
    cx.report.put("Height", height);
    cx.report.put("Width", width);
    cx.report.put("NumberOfComponents", components);
    cx.report.put("BitsPerComponent", bpc);
    if i64::from(bpc) != BITS_VARY {
        cx.report.put("BitDepth", bit_depth(bpc));
    }
    cx.report.put("CompressionType", compression);
    cx.report.put("ColourspaceUnknown", unknown_colourspace != 0);
    cx.report.put("IntellectualProperty", ipr != 0);
    Ok(true)
}

fn read_colr(rec: &mut Record<'_, '_>, cx: &mut Context<'_>) -> Result<bool> {
    if !min_length(rec, cx, 3) {
        return Ok(false);
    }
    let method = rec.u8()?;
    let precedence = rec.i8()?;
    let approximation = rec.u8()?;
    cx.report.put("Method", method);
    cx.report.put("Precedence", precedence);
    cx.report.put("Approximation", approximation);
    match method {
        1 => {
            if !fixed_length(rec, cx, 7) {
                return Ok(false);
            }
            let space = rec.be_u32()?;
            let name = match space {
                16 => "sRGB",
                17 => "greyscale",
                18 => "sYCC",
                _ => {
                    cx.report.info(format!("Enumerated colourspace {space} is not defined by JP2"), Some(rec.head.offset));
                    "unknown"
                },
            };
            cx.report.put("EnumeratedColourspace", space);
            cx.report.put("Colourspace", name);
        },
        2 => {
            cx.report.put("ICCProfileLength", rec.remaining().unwrap_or(0));
            rec.skip_remaining()?;
        },
        _ => {
            cx.report.info(format!("Colour specification method {method} is not defined by JP2"), Some(rec.head.offset));
            rec.skip_remaining()?;
        },
    }
    Ok(true)
}

fn read_pclr(rec: &mut Record<'_, '_>, cx: &mut Context<'_>) -> Result<bool> {
    if !min_length(rec, cx, 3) {
        return Ok(false);
    }
    let entries = rec.be_u16()?;
    let columns = rec.u8()?;
    let depths = rec.bytes(u64::from(columns))?;
    // Each value takes whole bytes.
    let row: u64 = depths.iter().map(|&d| u64::from((d & 0x7F) / 8 + 1)).sum();
    let table = u64::from(entries) * row;
    if !fixed_length(rec, cx, 3 + u64::from(columns) + table) {
        return Ok(false);
    }
    cx.report.put("NumberOfEntries", entries);
    cx.report.put("NumberOfColumns", columns);
    let list = depths.iter().map(|&d| PropertyNode::from(bit_depth(d))).collect();
    cx.report.put("BitDepths", PropertyNode::List(list));
    rec.skip(table)?;
    Ok(true)
}

fn read_cmap(rec: &mut Record<'_, '_>, cx: &mut Context<'_>) -> Result<bool> {
    if rec.head.length % 4 != 0 {
        cx.report.malformed(format!("'cmap' length {} is not a multiple of 4", rec.head.length), rec.head.offset);
        return Ok(false);
    }
    let mut list = Vec::new();
    while rec.remaining().unwrap_or(0) > 0 {
        let component = rec.be_u16()?;
        let mapping = rec.u8()?;
        let column = rec.u8()?;
        list.push(PropertyNode::Composite(vec![
            ("Component".into(), component.into()),
            ("MappingType".into(), (if mapping == 0 { "direct" } else { "palette" }).into()),
            ("PaletteColumn".into(), column.into()),
        ]));
    }
    cx.report.put("Mappings", PropertyNode::List(list));
    Ok(true)
}

fn read_cdef(rec: &mut Record<'_, '_>, cx: &mut Context<'_>) -> Result<bool> {
    if !min_length(rec, cx, 2) {
        return Ok(false);
    }
    let count = rec.be_u16()?;
    if !fixed_length(rec, cx, 2 + 6 * u64::from(count)) {
        return Ok(false);
    }
    let mut list = Vec::with_capacity(usize::from(count));
    for _ in 0..count {
        let channel = rec.be_u16()?;
        let kind = rec.be_u16()?;
        let association = rec.be_u16()?;
        list.push(PropertyNode::Composite(vec![
            ("Channel".into(), channel.into()),
            (
                "Type".into(),
                match kind {
                    0 => "colour",
                    1 => "opacity",
                    2 => "premultiplied opacity",
                    _ => "unspecified",
                }
                .into(),
            ),
            ("Association".into(), association.into()),
        ]));
    }
    cx.report.put("Channels", PropertyNode::List(list));
    Ok(true)
}

struct ResolutionBoxes;

impl Dispatch for ResolutionBoxes {
    type Kind = ResolutionBox;

    fn read_header(&mut self, rec: &mut Record<'_, '_>, _cx: &mut Context<'_>) -> Result<RecordHeader> {
        read_box_header(rec)
    }

    fn lookup(&self, id: RecordId) -> Option<ResolutionBox> {
        ResolutionBox::lookup(id)
    }

    /// Capture and display resolution share one layout.
    fn read(&mut self, _kind: ResolutionBox, rec: &mut Record<'_, '_>, cx: &mut Context<'_>) -> Result<bool> {
        if !fixed_length(rec, cx, 10) {
            return Ok(false);
        }
        let v_num = rec.be_u16()?;
        let v_den = rec.be_u16()?;
        let h_num = rec.be_u16()?;
        let h_den = rec.be_u16()?;
        let v_exp = rec.i8()?;
        let h_exp = rec.i8()?;
        if v_den == 0 || h_den == 0 {
            cx.report.malformed("Resolution with a zero denominator", rec.head.offset);
            return Ok(false);
        }
        let resolution = |num: u16, den: u16, exp: i8| f64::from(num) / f64::from(den) * 10f64.powi(i32::from(exp));
        cx.report.put("VerticalGridPointsPerMetre", resolution(v_num, v_den, v_exp));
        cx.report.put("HorizontalGridPointsPerMetre", resolution(h_num, h_den, h_exp));
        Ok(true)
    }
}

struct UuidInfoBoxes;

impl Dispatch for UuidInfoBoxes {
    type Kind = UuidInfoBox;

    fn read_header(&mut self, rec: &mut Record<'_, '_>, _cx: &mut Context<'_>) -> Result<RecordHeader> {
        read_box_header(rec)
    }

    fn lookup(&self, id: RecordId) -> Option<UuidInfoBox> {
        UuidInfoBox::lookup(id)
    }

    fn read(&mut self, kind: UuidInfoBox, rec: &mut Record<'_, '_>, cx: &mut Context<'_>) -> Result<bool> {
        match kind {
            UuidInfoBox::UuidList => {
                if !min_length(rec, cx, 2) {
                    return Ok(false);
                }
                let count = rec.be_u16()?;
                if !fixed_length(rec, cx, 2 + 16 * u64::from(count)) {
                    return Ok(false);
                }
                let mut list = Vec::with_capacity(usize::from(count));
                for _ in 0..count {
                    list.push(PropertyNode::from(uuid_string(&rec.bytes(16)?)));
                }
                cx.report.put("UUIDs", PropertyNode::List(list));
                Ok(true)
            },
            UuidInfoBox::Url => {
                if !min_length(rec, cx, 4) {
                    return Ok(false);
                }
                let version = rec.u8()?;
                let flags = rec.bytes(3)?;
                cx.report.put("Version", version);
                cx.report.put("Flags", flags.to_vec());
                let location = cx.read_rest_text(rec)?;
                cx.report.put("Location", location);
                Ok(true)
            },
        }
    }
}

/// SOC and SIZ of the contiguous codestream; everything after is skipped.
fn read_codestream(rec: &mut Record<'_, '_>, cx: &mut Context<'_>) -> Result<bool> {
    cx.report.put("Length", rec.remaining_or_source().unwrap_or(0));
    if rec.be_u16()? != SOC {
        cx.report.malformed("Codestream does not start with SOC", rec.head.payload_offset());
        return Ok(false);
    }
    if rec.be_u16()? != SIZ {
        cx.report.malformed("SOC is not followed by SIZ", rec.head.payload_offset() + 2);
        return Ok(false);
    }
    let siz_len = rec.be_u16()?;
    let profile = rec.be_u16()?;
    let mut grid = [0u32; 8];
    for value in &mut grid {
        *value = rec.be_u32()?;
    }
    let [width, height, x_offset, y_offset, tile_width, tile_height, _, _] = grid;
    let components = rec.be_u16()?;
    if u64::from(siz_len) != 38 + 3 * u64::from(components) {
        cx.report.malformed(
            format!("SIZ length {siz_len} does not match {components} components"),
            rec.head.payload_offset() + 4,
        );
        return Ok(false);
    }
    let mut depths = Vec::with_capacity(usize::from(components));
    for _ in 0..components {
        let depth = rec.u8()?;
        rec.skip(2)?;
        depths.push(PropertyNode::from(bit_depth(depth)));
    }
    cx.report.put("Profile", profile);
    cx.report.put("Width", width.saturating_sub(x_offset));
    cx.report.put("Height", height.saturating_sub(y_offset));
    cx.report.put("TileWidth", tile_width);
    cx.report.put("TileHeight", tile_height);
    cx.report.put("NumberOfComponents", components);
    cx.report.put("BitDepths", PropertyNode::List(depths));
    cx.state.codec = Some(Codec::new(u32::from(SOC), "JPEG 2000 codestream"));
    rec.skip_remaining()?;
    Ok(true)
}

fn header_box(tree: &PropertyNode, _: &ParseState, findings: &mut Findings) {
    let Some(header) = first_index(tree, "jp2h") else {
        findings.invalid("No 'jp2h' header box");
        return;
    };
    if first_index(tree, "jp2c").is_some_and(|codestream| codestream < header) {
        findings.invalid("'jp2c' codestream box precedes the 'jp2h' header box");
    }
}

fn header_contents(tree: &PropertyNode, _: &ParseState, findings: &mut Findings) {
    let Some(header) = tree.get("jp2h") else {
        return;
    };
    if header.entries().first().is_none_or(|(name, _)| name != "ihdr") {
        findings.invalid("'ihdr' is not the first box in 'jp2h'");
    }
    if header.get("colr").is_none() {
        findings.invalid("No 'colr' colour specification box");
    }
    let Some(ihdr) = header.get("ihdr") else {
        return;
    };
    let varying = ihdr.get("BitsPerComponent").and_then(PropertyNode::as_i64) == Some(BITS_VARY);
    match (varying, header.get("bpcc").is_some()) {
        (true, false) => findings.invalid("Bit depths vary but there is no 'bpcc' box"),
        (false, true) => findings.invalid("'bpcc' box present although all components share one bit depth"),
        _ => {},
    }
    if let Some(compression) = ihdr.get("CompressionType").and_then(PropertyNode::as_i64) {
        if compression != COMPRESSION_WAVELET {
            findings.invalid(format!("'ihdr' compression type {compression}, expected 7"));
        }
    }
}

fn jp2_brand(tree: &PropertyNode, _: &ParseState, findings: &mut Findings) {
    let Some(ftyp) = tree.get("ftyp") else {
        findings.invalid("No 'ftyp' file type box");
        return;
    };
    let brand = ftyp.get("Brand").and_then(PropertyNode::as_str) == Some("jp2 ");
    let compatible = ftyp
        .get("Compatibility")
        .is_some_and(|list| list.items().iter().any(|item| item.as_str() == Some("jp2 ")));
    if !brand && !compatible {
        findings.invalid("Neither the brand nor the compatibility list names 'jp2 '");
    }
}

fn component_count(tree: &PropertyNode, _: &ParseState, findings: &mut Findings) {
    let header = tree.path(&["jp2h", "ihdr", "NumberOfComponents"]).and_then(PropertyNode::as_i64);
    let codestream = tree.path(&["jp2c", "NumberOfComponents"]).and_then(PropertyNode::as_i64);
    if let (Some(header), Some(codestream)) = (header, codestream) {
        if header != codestream {
            findings.invalid(format!("'ihdr' declares {header} components, the codestream {codestream}"));
        }
    }
}

pub(crate) const RULES: &[Rule] = &[header_box, header_contents, jp2_brand, component_count];

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::Severity;
    use crate::{analyze, FormatKind, Tristate};

    fn boxed(kind: &[u8; 4], payload: &[u8]) -> Vec<u8> {
        let mut out = ((payload.len() + 8) as u32).to_be_bytes().to_vec();
        out.extend_from_slice(kind);
        out.extend_from_slice(payload);
        out
    }

    fn ihdr(components: u16, bpc: u8) -> Vec<u8> {
        let mut payload = Vec::new();
        payload.extend_from_slice(&64u32.to_be_bytes());
        payload.extend_from_slice(&32u32.to_be_bytes());
        payload.extend_from_slice(&components.to_be_bytes());
        payload.extend_from_slice(&[bpc, 7, 0, 0]);
        boxed(b"ihdr", &payload)
    }

    fn codestream(components: u16) -> Vec<u8> {
        let mut cs = vec![0xFF, 0x4F, 0xFF, 0x51];
        cs.extend_from_slice(&(38 + 3 * components).to_be_bytes());
        cs.extend_from_slice(&0u16.to_be_bytes());
        for value in [32u32, 64, 0, 0, 32, 64, 0, 0] {
            cs.extend_from_slice(&value.to_be_bytes());
        }
        cs.extend_from_slice(&components.to_be_bytes());
        for _ in 0..components {
            cs.extend_from_slice(&[7, 1, 1]);
        }
        cs.extend_from_slice(&[0xFF, 0xD9]);
        cs
    }

    fn jp2(header: &[u8], components: u16) -> Vec<u8> {
        let mut file = boxed(b"jP  ", &[0x0D, 0x0A, 0x87, 0x0A]);
        file.extend(boxed(b"ftyp", b"jp2 \0\0\0\0jp2 "));
        file.extend(boxed(b"jp2h", header));
        file.extend(boxed(b"jp2c", &codestream(components)));
        file
    }

    fn srgb() -> Vec<u8> {
        boxed(b"colr", &[1, 0, 0, 0, 0, 0, 16])
    }

    #[test]
    fn minimal_file() {
        let mut header = ihdr(3, 7);
        header.extend(srgb());
        let result = analyze(FormatKind::Jpeg2000, &jp2(&header, 3)).unwrap();
        assert_eq!(result.well_formed(), Tristate::True, "{:?}", result.messages());
        assert_eq!(result.valid(), Tristate::True, "{:?}", result.messages());
        let tree = result.properties();
        assert_eq!(tree.path(&["jp2h", "ihdr", "Width"]).and_then(PropertyNode::as_i64), Some(32));
        assert_eq!(tree.path(&["jp2h", "colr", "Colourspace"]).and_then(PropertyNode::as_str), Some("sRGB"));
        assert_eq!(tree.path(&["jp2c", "Width"]).and_then(PropertyNode::as_i64), Some(32));
        assert_eq!(result.state().codec.as_ref().map(|c| c.code), Some(0xFF4F));
    }

    #[test]
    fn component_mismatch_and_missing_colr() {
        let result = analyze(FormatKind::Jpeg2000, &jp2(&ihdr(1, 7), 3)).unwrap();
        assert_eq!(result.well_formed(), Tristate::True, "{:?}", result.messages());
        let invalid: Vec<_> = result.messages_of(Severity::Invalid).map(|m| m.text.as_str()).collect();
        assert_eq!(invalid.len(), 2, "{invalid:?}");
    }

    #[test]
    fn varying_depth_needs_bpcc() {
        let mut header = ihdr(3, 255);
        header.extend(srgb());
        let result = analyze(FormatKind::Jpeg2000, &jp2(&header, 3)).unwrap();
        assert!(result.messages_of(Severity::Invalid).any(|m| m.text.contains("bpcc")));

        header.extend(boxed(b"bpcc", &[7, 7, 0x87]));
        let result = analyze(FormatKind::Jpeg2000, &jp2(&header, 3)).unwrap();
        assert_eq!(result.valid(), Tristate::True, "{:?}", result.messages());
    }

    #[test]
    fn ftyp_list_must_be_whole_entries() {
        let mut file = boxed(b"jP  ", &[0x0D, 0x0A, 0x87, 0x0A]);
        file.extend(boxed(b"ftyp", b"jp2 \0\0\0\0jp2"));
        let result = analyze(FormatKind::Jpeg2000, &file).unwrap();
        assert_eq!(result.well_formed(), Tristate::False);
        assert!(result.properties().get("ftyp").is_none());
    }

    #[test]
    fn open_ended_codestream() {
        let mut header = ihdr(1, 7);
        header.extend(srgb());
        let mut file = jp2(&header, 1);
        let at = file.len() - codestream(1).len() - 8;
        file[at..at + 4].copy_from_slice(&[0, 0, 0, 0]);
        let result = analyze(FormatKind::Jpeg2000, &file).unwrap();
        assert_eq!(result.well_formed(), Tristate::True, "{:?}", result.messages());
        assert_eq!(result.properties().path(&["jp2c", "NumberOfComponents"]).and_then(PropertyNode::as_i64), Some(1));
    }

    #[test]
    fn wrong_signature() {
        let result = analyze(FormatKind::Jpeg2000, &boxed(b"jP  ", &[0x0D, 0x0A, 0x87, 0x0B])).unwrap();
        assert!(!result.signature_matched());
        assert_eq!(result.well_formed(), Tristate::False);
    }
}
