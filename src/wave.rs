// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! WAVE in RIFF (little-endian), RIFX (big-endian) or RF64 files.

use log::debug;
use std::borrow::Cow;

use crate::codes::RecordId;
use crate::cursor::Endian;
use crate::engine::{fixed_length, min_length, walk_container, Codec, Context, Dispatch, ParseState, Record};
use crate::header::{read_chunk_header, RecordHeader};
use crate::iff;
use crate::property::PropertyNode;
use crate::validity::{count, first_index, Findings, Rule};
use crate::Result;

record_kinds! {
    pub(crate) enum WaveChunk {
        Format => b"fmt ",
        Fact => b"fact",
        Data => b"data",
        Cue => b"cue ",
        Playlist => b"plst",
        Sampler => b"smpl",
        Instrument => b"inst",
        List => b"LIST",
        Broadcast => b"bext",
        Ixml => b"iXML",
        Axml => b"axml",
        DataSize64 => b"ds64",
    }
}

record_kinds! {
    /// `LIST` `INFO` entries; all plain text.
    pub(crate) enum InfoChunk {
        ArchivalLocation => b"IARL",
        Artist => b"IART",
        Commissioned => b"ICMS",
        Comments => b"ICMT",
        Copyright => b"ICOP",
        CreationDate => b"ICRD",
        Cropped => b"ICRP",
        Dimensions => b"IDIM",
        DotsPerInch => b"IDPI",
        Engineer => b"IENG",
        Genre => b"IGNR",
        Keywords => b"IKEY",
        Lightness => b"ILGT",
        Medium => b"IMED",
        Name => b"INAM",
        PaletteSetting => b"IPLT",
        Product => b"IPRD",
        Subject => b"ISBJ",
        Software => b"ISFT",
        Sharpness => b"ISHP",
        Source => b"ISRC",
        SourceForm => b"ISRF",
        Technician => b"ITCH",
        TrackNumber => b"ITRK",
    }
}

record_kinds! {
    /// `LIST` `adtl` (associated data) entries.
    pub(crate) enum AdtlChunk {
        Label => b"labl",
        Note => b"note",
        LabeledText => b"ltxt",
    }
}

const WAVE_FORMAT_PCM: u16 = 0x0001;
const WAVE_FORMAT_EXTENSIBLE: u16 = 0xFFFE;

const FORMAT_CODES: &[(u16, &str)] = &[
    (0x0001, "PCM"),
    (0x0002, "Microsoft ADPCM"),
    (0x0003, "IEEE float"),
    (0x0006, "ITU G.711 A-law"),
    (0x0007, "ITU G.711 u-law"),
    (0x0011, "IMA ADPCM"),
    (0x0016, "ITU G.723 ADPCM"),
    (0x0031, "GSM 6.10"),
    (0x0040, "ITU G.721 ADPCM"),
    (0x0050, "MPEG"),
    (0x0055, "MPEG Layer 3"),
    (0x0092, "Dolby AC-3 SPDIF"),
    (0x00FF, "AAC"),
    (0x0161, "Windows Media Audio"),
    (0x2000, "Dolby AC-3"),
    (WAVE_FORMAT_EXTENSIBLE, "Extensible"),
];

fn format_name(code: u16) -> Cow<'static, str> {
    match FORMAT_CODES.iter().find(|&&(known, _)| known == code) {
        Some(&(_, name)) => Cow::Borrowed(name),
        None => Cow::Owned(format!("unknown ({code:#06x})")),
    }
}

pub(crate) fn parse(file: &mut Record<'_, '_>, cx: &mut Context<'_>) -> Result<()> {
    iff::parse_form(
        file,
        cx,
        &[(b"RIFF", Endian::Little), (b"RIFX", Endian::Big), (b"RF64", Endian::Little)],
        &[b"WAVE"],
        &mut Chunks::default(),
        |form, chunks, cx| {
            cx.report.put("Container", form.id.to_string());
            chunks.rf64 = form.id == b"RF64";
        },
    )
}

/// Chunk header in the file's byte order.
fn chunk_header(rec: &mut Record<'_, '_>, cx: &Context<'_>) -> Result<RecordHeader> {
    read_chunk_header(rec, cx.state.byte_order)
}

#[derive(Default)]
struct Chunks {
    rf64: bool,
    /// 64-bit `data` length from `ds64`.
    data_size: Option<u64>,
}

impl Dispatch for Chunks {
    type Kind = WaveChunk;

    fn read_header(&mut self, rec: &mut Record<'_, '_>, cx: &mut Context<'_>) -> Result<RecordHeader> {
        let mut head = chunk_header(rec, cx)?;
        if let (Some(size), Some(WaveChunk::Data)) = (self.data_size, WaveChunk::lookup(head.id)) {
            if head.length == u64::from(iff::SIZE_IN_DS64) {
                head.length = size;
                head.pad = size & 1;
            }
        }
        Ok(head)
    }

    fn lookup(&self, id: RecordId) -> Option<WaveChunk> {
        WaveChunk::lookup(id)
    }

    fn continue_after_failure(&self) -> bool {
        true
    }

    fn read(&mut self, kind: WaveChunk, rec: &mut Record<'_, '_>, cx: &mut Context<'_>) -> Result<bool> {
        match kind {
            WaveChunk::Format => read_fmt(rec, cx),
            WaveChunk::Fact => {
                if !min_length(rec, cx, 4) {
                    return Ok(false);
                }
                let samples = rec.u32(cx.state.byte_order)?;
                cx.report.put("SampleLength", samples);
                rec.skip_remaining()?;
                Ok(true)
            },
            WaveChunk::Data => {
                cx.report.put("DataLength", rec.head.length);
                rec.skip_remaining()?;
                Ok(true)
            },
            WaveChunk::Cue => read_cue(rec, cx),
            WaveChunk::Playlist => read_plst(rec, cx),
            WaveChunk::Sampler => read_smpl(rec, cx),
            WaveChunk::Instrument => read_inst(rec, cx),
            WaveChunk::List => read_list(rec, cx),
            WaveChunk::Broadcast => read_bext(rec, cx),
            WaveChunk::Ixml | WaveChunk::Axml => iff::text(rec, cx),
            WaveChunk::DataSize64 if self.rf64 => {
                self.data_size = read_ds64(rec, cx)?;
                Ok(self.data_size.is_some())
            },
            WaveChunk::DataSize64 => {
                cx.report.invalid("'ds64' chunk outside an RF64 file", Some(rec.head.offset));
                rec.skip_remaining()?;
                Ok(true)
            },
        }
    }
}

fn read_fmt(rec: &mut Record<'_, '_>, cx: &mut Context<'_>) -> Result<bool> {
    if !min_length(rec, cx, 14) {
        return Ok(false);
    }
    let o = cx.state.byte_order;
    let code = rec.u16(o)?;
    let channels = rec.u16(o)?;
    let sample_rate = rec.u32(o)?;
    let byte_rate = rec.u32(o)?;
    let block_align = rec.u16(o)?;
    cx.report.put("FormatCode", code);
    cx.report.put("Format", format_name(code).into_owned());
    cx.report.put("NumberOfChannels", channels);
    cx.report.put("SampleRate", sample_rate);
    cx.report.put("ByteRate", byte_rate);
    cx.report.put("BlockAlign", block_align);

    let mut codec = Codec::new(u32::from(code), format_name(code));
    if rec.remaining() >= Some(2) {
        let bits = rec.u16(o)?;
        cx.report.put("BitsPerSample", bits);
    }
    if rec.remaining() >= Some(2) {
        let extra = u64::from(rec.u16(o)?);
        let left = rec.remaining().unwrap_or(0);
        if extra > left {
            cx.report.malformed(format!("fmt extension of {extra} bytes exceeds the {left} bytes left"), rec.position());
            return Ok(false);
        }
        if code == WAVE_FORMAT_EXTENSIBLE && extra >= 22 {
            let valid_bits = rec.u16(o)?;
            let channel_mask = rec.u32(o)?;
            let sub_code = rec.u16(o)?;
            // remainder of the subformat GUID
            rec.skip(14)?;
            cx.report.put("ValidBitsPerSample", valid_bits);
            cx.report.put("ChannelMask", channel_mask);
            cx.report.put("SubFormat", format_name(sub_code).into_owned());
            codec = Codec::new(u32::from(sub_code), format_name(sub_code));
        } else if code == WAVE_FORMAT_EXTENSIBLE {
            cx.report.malformed("WAVE_FORMAT_EXTENSIBLE needs a 22 byte extension", rec.position());
            return Ok(false);
        }
    }
    if rec.remaining().unwrap_or(0) > 0 {
        debug!("{} bytes of format-specific fmt data", rec.remaining().unwrap_or(0));
        rec.skip_remaining()?;
    }
    cx.state.codec = Some(codec);
    Ok(true)
}

fn read_cue(rec: &mut Record<'_, '_>, cx: &mut Context<'_>) -> Result<bool> {
    let o = cx.state.byte_order;
    let count = rec.u32(o)?;
    if count == 0 {
        return Ok(true);
    }
    let mut points = Vec::new();
    for _ in 0..count {
        let id = rec.u32(o)?;
        let position = rec.u32(o)?;
        let chunk = rec.raw_fourcc()?;
        let chunk_start = rec.u32(o)?;
        let block_start = rec.u32(o)?;
        let sample_offset = rec.u32(o)?;
        points.push(PropertyNode::Composite(vec![
            ("ID".into(), id.into()),
            ("Position".into(), position.into()),
            ("DataChunkID".into(), chunk.to_string().into()),
            ("ChunkStart".into(), chunk_start.into()),
            ("BlockStart".into(), block_start.into()),
            ("SampleOffset".into(), sample_offset.into()),
        ]));
    }
    cx.report.put("CuePoints", PropertyNode::List(points));
    Ok(true)
}

fn read_plst(rec: &mut Record<'_, '_>, cx: &mut Context<'_>) -> Result<bool> {
    let o = cx.state.byte_order;
    let count = rec.u32(o)?;
    if count == 0 {
        return Ok(true);
    }
    let mut segments = Vec::new();
    for _ in 0..count {
        let cue = rec.u32(o)?;
        let length = rec.u32(o)?;
        let loops = rec.u32(o)?;
        segments.push(PropertyNode::Composite(vec![
            ("CuePointID".into(), cue.into()),
            ("Length".into(), length.into()),
            ("NumberOfRepeats".into(), loops.into()),
        ]));
    }
    cx.report.put("Segments", PropertyNode::List(segments));
    Ok(true)
}

fn read_smpl(rec: &mut Record<'_, '_>, cx: &mut Context<'_>) -> Result<bool> {
    if !min_length(rec, cx, 36) {
        return Ok(false);
    }
    let o = cx.state.byte_order;
    for name in ["Manufacturer", "Product", "SamplePeriod", "MIDIUnityNote", "MIDIPitchFraction", "SMPTEFormat", "SMPTEOffset"] {
        let value = rec.u32(o)?;
        cx.report.put(name, value);
    }
    let loop_count = rec.u32(o)?;
    let sampler_data = rec.u32(o)?;
    let mut loops = Vec::new();
    for _ in 0..loop_count {
        let id = rec.u32(o)?;
        let kind = rec.u32(o)?;
        let start = rec.u32(o)?;
        let end = rec.u32(o)?;
        let fraction = rec.u32(o)?;
        let play_count = rec.u32(o)?;
        let kind = match kind {
            0 => "forward".into(),
            1 => "alternating".into(),
            2 => "backward".into(),
            n => format!("unknown ({n})"),
        };
        loops.push(PropertyNode::Composite(vec![
            ("ID".into(), id.into()),
            ("Type".into(), kind.into()),
            ("Start".into(), start.into()),
            ("End".into(), end.into()),
            ("Fraction".into(), fraction.into()),
            ("PlayCount".into(), play_count.into()),
        ]));
    }
    if !loops.is_empty() {
        cx.report.put("SampleLoops", PropertyNode::List(loops));
    }
    cx.report.put("SamplerDataLength", sampler_data);
    rec.skip(u64::from(sampler_data))?;
    Ok(true)
}

fn read_inst(rec: &mut Record<'_, '_>, cx: &mut Context<'_>) -> Result<bool> {
    if !fixed_length(rec, cx, 7) {
        return Ok(false);
    }
    let note = rec.u8()?;
    cx.report.put("UnshiftedNote", note);
    for name in ["FineTune", "Gain"] {
        let value = rec.i8()?;
        cx.report.put(name, value);
    }
    for name in ["LowNote", "HighNote", "LowVelocity", "HighVelocity"] {
        let value = rec.u8()?;
        cx.report.put(name, value);
    }
    Ok(true)
}

fn read_list(rec: &mut Record<'_, '_>, cx: &mut Context<'_>) -> Result<bool> {
    if !min_length(rec, cx, 4) {
        return Ok(false);
    }
    let list_type = rec.fourcc()?;
    cx.report.put("ListType", list_type.to_string());
    match &list_type.value {
        b"INFO" => walk_container(&mut InfoList, rec, cx),
        b"adtl" => walk_container(&mut AdtlList, rec, cx),
        _ => {
            cx.report.info(format!("Skipped LIST of unknown type '{list_type}'"), Some(rec.head.offset));
            rec.skip_remaining()?;
            Ok(true)
        },
    }
}

struct InfoList;

impl Dispatch for InfoList {
    type Kind = InfoChunk;

    fn read_header(&mut self, rec: &mut Record<'_, '_>, cx: &mut Context<'_>) -> Result<RecordHeader> {
        chunk_header(rec, cx)
    }

    fn lookup(&self, id: RecordId) -> Option<InfoChunk> {
        InfoChunk::lookup(id)
    }

    fn read(&mut self, _kind: InfoChunk, rec: &mut Record<'_, '_>, cx: &mut Context<'_>) -> Result<bool> {
        iff::text(rec, cx)
    }
}

struct AdtlList;

impl Dispatch for AdtlList {
    type Kind = AdtlChunk;

    fn read_header(&mut self, rec: &mut Record<'_, '_>, cx: &mut Context<'_>) -> Result<RecordHeader> {
        chunk_header(rec, cx)
    }

    fn lookup(&self, id: RecordId) -> Option<AdtlChunk> {
        AdtlChunk::lookup(id)
    }

    fn read(&mut self, kind: AdtlChunk, rec: &mut Record<'_, '_>, cx: &mut Context<'_>) -> Result<bool> {
        let o = cx.state.byte_order;
        if !min_length(rec, cx, if kind == AdtlChunk::LabeledText { 20 } else { 4 }) {
            return Ok(false);
        }
        let cue = rec.u32(o)?;
        cx.report.put("CuePointID", cue);
        if kind == AdtlChunk::LabeledText {
            let length = rec.u32(o)?;
            let purpose = rec.raw_fourcc()?;
            cx.report.put("SampleLength", length);
            cx.report.put("Purpose", purpose.to_string());
            for name in ["Country", "Language", "Dialect", "CodePage"] {
                let value = rec.u16(o)?;
                cx.report.put(name, value);
            }
        }
        iff::text(rec, cx)
    }
}

fn read_bext(rec: &mut Record<'_, '_>, cx: &mut Context<'_>) -> Result<bool> {
    if !min_length(rec, cx, 602) {
        return Ok(false);
    }
    let o = cx.state.byte_order;
    for (name, len) in [("Description", 256), ("Originator", 32), ("OriginatorReference", 32), ("OriginationDate", 10), ("OriginationTime", 8)] {
        let text = cx.read_text(rec, len)?;
        cx.report.put(name, text);
    }
    let time_low = rec.u32(o)?;
    let time_high = rec.u32(o)?;
    cx.report.put("TimeReference", (u64::from(time_high) << 32) | u64::from(time_low));
    let version = rec.u16(o)?;
    cx.report.put("Version", version);
    cx.state.bump_version(u32::from(version));
    let umid = rec.bytes(64)?;
    if umid.iter().any(|&b| b != 0) {
        cx.report.put("UMID", umid.to_vec());
    }
    let reserved = if version >= 1 {
        for name in ["LoudnessValue", "LoudnessRange", "MaxTruePeakLevel", "MaxMomentaryLoudness", "MaxShortTermLoudness"] {
            let value = rec.i16(o)?;
            cx.report.put(name, value);
        }
        180
    } else {
        190
    };
    let reserved = rec.bytes(reserved)?;
    if reserved.iter().any(|&b| b != 0) {
        let text = "Non-zero reserved bytes in bext";
        if cx.config.lenient {
            cx.report.info(text, Some(rec.position()));
        } else {
            cx.report.malformed(text, rec.position());
            return Ok(false);
        }
    }
    let history = cx.read_rest_text(rec)?;
    if !history.is_empty() {
        cx.report.put("CodingHistory", history);
    }
    Ok(true)
}

/// The 64-bit sizes of an RF64 file. Returns the `data` length.
fn read_ds64(rec: &mut Record<'_, '_>, cx: &mut Context<'_>) -> Result<Option<u64>> {
    if !min_length(rec, cx, 28) {
        return Ok(None);
    }
    let o = cx.state.byte_order;
    let riff_size = rec.u64(o)?;
    let data_size = rec.u64(o)?;
    let samples = rec.u64(o)?;
    cx.report.put("RiffSize", riff_size);
    cx.report.put("DataSize", data_size);
    cx.report.put("SampleCount", samples);
    let table = rec.u32(o)?;
    let mut sizes = Vec::new();
    for _ in 0..table {
        let id = rec.raw_fourcc()?;
        let size = rec.u64(o)?;
        sizes.push(PropertyNode::Composite(vec![("ChunkID".into(), id.to_string().into()), ("Size".into(), size.into())]));
    }
    if !sizes.is_empty() {
        cx.report.put("ChunkSizes", PropertyNode::List(sizes));
    }
    rec.skip_remaining()?;
    Ok(Some(data_size))
}

fn format_before_data(tree: &PropertyNode, _: &ParseState, findings: &mut Findings) {
    match count(tree, "fmt ") {
        0 => findings.invalid("Missing fmt chunk"),
        1 => {
            if let (Some(fmt), Some(data)) = (first_index(tree, "fmt "), first_index(tree, "data")) {
                if fmt > data {
                    findings.invalid("fmt chunk follows the data chunk");
                }
            }
        },
        n => findings.invalid(format!("{n} fmt chunks; exactly one is allowed")),
    }
}

fn data_present(tree: &PropertyNode, _: &ParseState, findings: &mut Findings) {
    if count(tree, "data") == 0 {
        findings.invalid("Missing data chunk");
    }
}

fn fact_for_compressed(tree: &PropertyNode, _: &ParseState, findings: &mut Findings) {
    let Some(code) = tree.path(&["fmt ", "FormatCode"]).and_then(PropertyNode::as_i64) else {
        return;
    };
    let pcm = code == i64::from(WAVE_FORMAT_PCM)
        || (code == i64::from(WAVE_FORMAT_EXTENSIBLE)
            && tree.path(&["fmt ", "SubFormat"]).and_then(PropertyNode::as_str) == Some("PCM"));
    if !pcm && count(tree, "fact") == 0 {
        findings.invalid("Missing fact chunk for a non-PCM format");
    }
}

fn pcm_block_align(tree: &PropertyNode, _: &ParseState, findings: &mut Findings) {
    let Some(fmt) = tree.get("fmt ") else {
        return;
    };
    let field = |name| fmt.get(name).and_then(PropertyNode::as_i64);
    if field("FormatCode") != Some(i64::from(WAVE_FORMAT_PCM)) {
        return;
    }
    if let (Some(channels), Some(bits), Some(align)) = (field("NumberOfChannels"), field("BitsPerSample"), field("BlockAlign")) {
        let expected = channels * ((bits + 7) / 8);
        if align != expected {
            findings.invalid(format!("Block align {align} does not match {channels} channels of {bits} bits"));
        }
    }
}

pub(crate) const RULES: &[Rule] = &[format_before_data, data_present, fact_for_compressed, pcm_block_align];

#[cfg(test)]
mod tests {
    use crate::property::PropertyNode;
    use crate::{analyze, FormatKind, Tristate};

    fn chunk_le(id: &[u8; 4], payload: &[u8]) -> Vec<u8> {
        let mut out = id.to_vec();
        out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        out.extend_from_slice(payload);
        if payload.len() % 2 == 1 {
            out.push(0);
        }
        out
    }

    fn riff(chunks: &[Vec<u8>]) -> Vec<u8> {
        let mut body = b"WAVE".to_vec();
        for c in chunks {
            body.extend_from_slice(c);
        }
        chunk_le(b"RIFF", &body)
    }

    fn fmt_pcm(channels: u16, bits: u16, align: u16) -> Vec<u8> {
        let mut p = 1u16.to_le_bytes().to_vec();
        p.extend_from_slice(&channels.to_le_bytes());
        p.extend_from_slice(&8000u32.to_le_bytes());
        p.extend_from_slice(&(8000 * u32::from(align)).to_le_bytes());
        p.extend_from_slice(&align.to_le_bytes());
        p.extend_from_slice(&bits.to_le_bytes());
        chunk_le(b"fmt ", &p)
    }

    #[test]
    fn pcm_file() {
        let data = riff(&[fmt_pcm(2, 16, 4), chunk_le(b"data", &[0; 8])]);
        let result = analyze(FormatKind::Wave, &data).unwrap();
        assert_eq!(result.well_formed(), Tristate::True, "{:?}", result.messages());
        assert_eq!(result.valid(), Tristate::True, "{:?}", result.messages());
        assert_eq!(result.properties().shape(), "{Container,fmt :{FormatCode,Format,NumberOfChannels,SampleRate,ByteRate,BlockAlign,BitsPerSample},data:{DataLength}}");
        assert_eq!(result.state().codec.as_ref().map(|c| c.code), Some(1));
    }

    #[test]
    fn bad_block_align_is_invalid_not_malformed() {
        let data = riff(&[fmt_pcm(2, 16, 3), chunk_le(b"data", &[0; 6])]);
        let result = analyze(FormatKind::Wave, &data).unwrap();
        assert_eq!(result.well_formed(), Tristate::True);
        assert_eq!(result.valid(), Tristate::False);
    }

    #[test]
    fn info_list() {
        let mut list = b"INFO".to_vec();
        list.extend(chunk_le(b"INAM", b"Song\0"));
        list.extend(chunk_le(b"IART", b"Band"));
        let data = riff(&[fmt_pcm(1, 8, 1), chunk_le(b"LIST", &list), chunk_le(b"data", &[0; 2])]);
        let result = analyze(FormatKind::Wave, &data).unwrap();
        assert_eq!(result.well_formed(), Tristate::True, "{:?}", result.messages());
        let list = result.properties().get("LIST").unwrap();
        assert_eq!(list.path(&["INAM", "Text"]).and_then(PropertyNode::as_str), Some("Song"));
        assert_eq!(list.path(&["IART", "Text"]).and_then(PropertyNode::as_str), Some("Band"));
    }

    #[test]
    fn overflowing_list_child_abandons_the_list() {
        let mut list = b"INFO".to_vec();
        list.extend(chunk_le(b"INAM", b"ok"));
        // declares 100 bytes inside a list that has 4 left
        list.extend_from_slice(b"IART");
        list.extend_from_slice(&100u32.to_le_bytes());
        list.extend_from_slice(b"Band");
        let data = riff(&[fmt_pcm(1, 8, 1), chunk_le(b"LIST", &list), chunk_le(b"data", &[0; 2])]);
        let result = analyze(FormatKind::Wave, &data).unwrap();
        assert_eq!(result.well_formed(), Tristate::False);
        assert!(result.properties().get("LIST").is_none());
        // the parent's boundary held: the next top-level chunk is intact
        assert_eq!(result.properties().path(&["data", "DataLength"]).and_then(PropertyNode::as_i64), Some(2));
    }

    #[test]
    fn rifx_is_big_endian() {
        let mut fmt = 1u16.to_be_bytes().to_vec();
        fmt.extend_from_slice(&1u16.to_be_bytes());
        fmt.extend_from_slice(&22050u32.to_be_bytes());
        fmt.extend_from_slice(&22050u32.to_be_bytes());
        fmt.extend_from_slice(&1u16.to_be_bytes());
        fmt.extend_from_slice(&8u16.to_be_bytes());
        let mut body = b"WAVE".to_vec();
        body.extend_from_slice(b"fmt ");
        body.extend_from_slice(&16u32.to_be_bytes());
        body.extend_from_slice(&fmt);
        body.extend_from_slice(b"data\0\0\0\0");
        let mut data = b"RIFX".to_vec();
        data.extend_from_slice(&(body.len() as u32).to_be_bytes());
        data.extend_from_slice(&body);
        let result = analyze(FormatKind::Wave, &data).unwrap();
        assert_eq!(result.well_formed(), Tristate::True, "{:?}", result.messages());
        assert_eq!(result.properties().path(&["fmt ", "SampleRate"]).and_then(PropertyNode::as_i64), Some(22050));
    }

    #[test]
    fn compressed_without_fact() {
        let mut p = 0x0011u16.to_le_bytes().to_vec();
        p.extend_from_slice(&[1, 0, 0x40, 0x1f, 0, 0, 0, 0x10, 0, 0, 0, 1, 4, 0]);
        let data = riff(&[chunk_le(b"fmt ", &p), chunk_le(b"data", &[0; 4])]);
        let result = analyze(FormatKind::Wave, &data).unwrap();
        assert_eq!(result.well_formed(), Tristate::True, "{:?}", result.messages());
        assert_eq!(result.valid(), Tristate::False);
        assert_eq!(result.properties().path(&["fmt ", "Format"]).and_then(PropertyNode::as_str), Some("IMA ADPCM"));
    }

    fn ds64(riff_size: u64, data_size: u64) -> Vec<u8> {
        let mut p = riff_size.to_le_bytes().to_vec();
        p.extend_from_slice(&data_size.to_le_bytes());
        p.extend_from_slice(&(data_size / 2).to_le_bytes());
        p.extend_from_slice(&0u32.to_le_bytes());
        chunk_le(b"ds64", &p)
    }

    #[test]
    fn rf64_sizes_come_from_ds64() {
        let mut body = b"WAVE".to_vec();
        body.extend(ds64(60, 6));
        body.extend(fmt_pcm(1, 16, 2));
        body.extend_from_slice(b"data");
        body.extend_from_slice(&u32::MAX.to_le_bytes());
        body.extend_from_slice(&[0; 6]);
        let mut data = b"RF64".to_vec();
        data.extend_from_slice(&u32::MAX.to_le_bytes());
        data.extend_from_slice(&body);
        let result = analyze(FormatKind::Wave, &data).unwrap();
        assert_eq!(result.well_formed(), Tristate::True, "{:?}", result.messages());
        assert_eq!(result.valid(), Tristate::True, "{:?}", result.messages());
        assert_eq!(result.properties().path(&["ds64", "DataSize"]).and_then(PropertyNode::as_i64), Some(6));
        assert_eq!(result.properties().path(&["data", "DataLength"]).and_then(PropertyNode::as_i64), Some(6));
    }

    #[test]
    fn ds64_outside_rf64_is_invalid() {
        let data = riff(&[ds64(60, 6), fmt_pcm(1, 16, 2), chunk_le(b"data", &[0; 6])]);
        let result = analyze(FormatKind::Wave, &data).unwrap();
        assert_eq!(result.well_formed(), Tristate::True, "{:?}", result.messages());
        assert_eq!(result.valid(), Tristate::False);
        assert!(result.messages().iter().any(|m| m.text == "'ds64' chunk outside an RF64 file"));
        assert!(result.properties().path(&["ds64", "DataSize"]).is_none());
        assert_eq!(result.properties().path(&["data", "DataLength"]).and_then(PropertyNode::as_i64), Some(6));
    }
}
