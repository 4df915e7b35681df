// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! AIFF and AIFF-C.
//!
//! Chunk headers and every chunk field are big-endian. The `sowt`
//! compression type only changes the byte order of the samples, which is
//! tracked in [`ParseState::byte_order`].

use crate::codes::RecordId;
use crate::cursor::Endian;
use crate::engine::{fixed_length, min_length, Codec, Context, Dispatch, ParseState, Record};
use crate::header::{read_chunk_header, RecordHeader};
use crate::iff;
use crate::property::{Date, PropertyNode};
use crate::validity::{count, Findings, Rule};
use crate::Result;

record_kinds! {
    pub(crate) enum AiffChunk {
        Common => b"COMM",
        SoundData => b"SSND",
        FormatVersion => b"FVER",
        Marker => b"MARK",
        Instrument => b"INST",
        Comments => b"COMT",
        Name => b"NAME",
        Author => b"AUTH",
        Copyright => b"(c) ",
        Annotation => b"ANNO",
        AudioRecording => b"AESD",
        Application => b"APPL",
        Midi => b"MIDI",
        Saxel => b"SAXL",
    }
}

/// The only AIFF-C format version ever published (May 23, 1990).
const AIFC_VERSION_1: u32 = 0xA280_5140;

/// Compression types with their conventional names.
const COMPRESSION_TYPES: &[(&[u8; 4], &str)] = &[
    (b"NONE", "not compressed"),
    (b"twos", "PCM, big-endian"),
    (b"sowt", "PCM, little-endian"),
    (b"raw ", "PCM, offset binary"),
    (b"in24", "24-bit PCM"),
    (b"in32", "32-bit PCM"),
    (b"fl32", "32-bit floating point"),
    (b"FL32", "32-bit floating point"),
    (b"fl64", "64-bit floating point"),
    (b"FL64", "64-bit floating point"),
    (b"ulaw", "CCITT G.711 u-law"),
    (b"ULAW", "CCITT G.711 u-law"),
    (b"alaw", "CCITT G.711 A-law"),
    (b"ALAW", "CCITT G.711 A-law"),
    (b"ima4", "IMA 4:1"),
    (b"MAC3", "MACE 3-to-1"),
    (b"MAC6", "MACE 6-to-1"),
    (b"G722", "CCITT G.722 ADPCM"),
    (b"G726", "CCITT G.726 ADPCM"),
    (b"G728", "CCITT G.728 LD-CELP"),
    (b"GSM ", "GSM 06.10"),
    (b"SDX2", "SDX2 2:1 square-root-delta"),
    (b"QDMC", "QDesign Music"),
    (b"Qclp", "Qualcomm PureVoice"),
];

/// Speaker labels for the channel counts with a defined layout.
pub(crate) fn channel_locations(channels: u16) -> Vec<&'static str> {
    match channels {
        1 => vec!["CENTER"],
        2 => vec!["LEFT", "RIGHT"],
        3 => vec!["LEFT", "RIGHT", "CENTER"],
        4 => vec!["FRONT LEFT", "FRONT RIGHT", "REAR LEFT", "REAR RIGHT"],
        6 => vec!["LEFT", "LEFT CENTER", "CENTER", "RIGHT", "RIGHT CENTER", "SURROUND"],
        n => vec!["UNKNOWN"; usize::from(n)],
    }
}

fn endian_name(order: Endian) -> &'static str {
    match order {
        Endian::Big => "big-endian",
        Endian::Little => "little-endian",
    }
}

pub(crate) fn parse(file: &mut Record<'_, '_>, cx: &mut Context<'_>) -> Result<()> {
    let mut chunks = Chunks { aifc: false };
    iff::parse_form(file, cx, &[(b"FORM", Endian::Big)], &[b"AIFF", b"AIFC"], &mut chunks, |form, chunks, cx| {
        cx.report.put("FormType", form.form_type.to_string());
        if form.form_type == b"AIFC" {
            chunks.aifc = true;
            cx.state.bump_version(1);
        }
    })
}

struct Chunks {
    aifc: bool,
}

impl Dispatch for Chunks {
    type Kind = AiffChunk;

    fn read_header(&mut self, rec: &mut Record<'_, '_>, _: &mut Context<'_>) -> Result<RecordHeader> {
        read_chunk_header(rec, Endian::Big)
    }

    fn lookup(&self, id: RecordId) -> Option<AiffChunk> {
        AiffChunk::lookup(id)
    }

    fn continue_after_failure(&self) -> bool {
        true
    }

    fn read(&mut self, kind: AiffChunk, rec: &mut Record<'_, '_>, cx: &mut Context<'_>) -> Result<bool> {
        match kind {
            AiffChunk::Common => read_comm(rec, cx, self.aifc),
            AiffChunk::SoundData => read_ssnd(rec, cx),
            AiffChunk::FormatVersion => read_fver(rec, cx),
            AiffChunk::Marker => read_mark(rec, cx),
            AiffChunk::Instrument => read_inst(rec, cx),
            AiffChunk::Comments => read_comt(rec, cx),
            AiffChunk::Name | AiffChunk::Author | AiffChunk::Copyright | AiffChunk::Annotation => iff::text(rec, cx),
            AiffChunk::AudioRecording => read_aesd(rec, cx),
            AiffChunk::Application => read_appl(rec, cx),
            AiffChunk::Midi => {
                cx.report.put("DataLength", rec.head.length);
                rec.skip_remaining()?;
                Ok(true)
            },
            AiffChunk::Saxel => read_saxl(rec, cx),
        }
    }
}

fn read_comm(rec: &mut Record<'_, '_>, cx: &mut Context<'_>, aifc: bool) -> Result<bool> {
    let size_ok = if aifc { min_length(rec, cx, 23) } else { fixed_length(rec, cx, 18) };
    if !size_ok {
        return Ok(false);
    }
    let channels = rec.be_u16()?;
    let frames = rec.be_u32()?;
    let sample_size = rec.be_u16()?;
    let sample_rate = rec.extended_f80(Endian::Big)?;

    cx.report.put("NumberOfChannels", channels);
    cx.report.put("NumberOfSampleFrames", frames);
    cx.report.put("SampleSize", sample_size);
    cx.report.put("SampleRate", sample_rate);
    cx.report.put(
        "ChannelLocations",
        PropertyNode::Array(channel_locations(channels).into_iter().map(PropertyNode::from).collect()),
    );

    if !aifc {
        cx.state.codec = Some(Codec::new(0, "not compressed"));
        return Ok(true);
    }
    let code = rec.raw_fourcc()?;
    let name = rec.padded_pascal_string()?;
    let known = COMPRESSION_TYPES.iter().find(|(known, _)| code == *known).map(|&(_, label)| label);
    let label = match known {
        Some(label) => label.to_owned(),
        None => {
            cx.report.info(format!("Unrecognized compression type '{code}'"), Some(rec.head.payload_offset() + 18));
            if name.is_empty() { format!("unknown ({code})") } else { name.clone() }
        },
    };
    cx.report.put("CompressionType", code.to_string());
    cx.report.put("CompressionName", name);
    cx.report.put("Compression", label.clone());
    cx.state.byte_order = if code == b"sowt" { Endian::Little } else { Endian::Big };
    cx.state.codec = Some(Codec::from_fourcc(code, label));
    Ok(true)
}

fn read_ssnd(rec: &mut Record<'_, '_>, cx: &mut Context<'_>) -> Result<bool> {
    if !min_length(rec, cx, 8) {
        return Ok(false);
    }
    let offset = rec.be_u32()?;
    let block_size = rec.be_u32()?;
    let data_length = rec.head.length - 8;
    if u64::from(offset) > data_length {
        cx.report.malformed(
            format!("SSND offset {offset} lies beyond its {data_length} bytes of sound data"),
            rec.head.payload_offset(),
        );
        return Ok(false);
    }
    cx.report.put("Offset", offset);
    cx.report.put("BlockSize", block_size);
    cx.report.put("DataLength", data_length);
    cx.report.put("ByteOrder", endian_name(cx.state.byte_order));
    rec.skip_remaining()?;
    Ok(true)
}

fn read_fver(rec: &mut Record<'_, '_>, cx: &mut Context<'_>) -> Result<bool> {
    if !fixed_length(rec, cx, 4) {
        return Ok(false);
    }
    let timestamp = rec.be_u32()?;
    if timestamp != AIFC_VERSION_1 {
        cx.report.info(format!("Unknown AIFF-C version timestamp {timestamp:#010x}"), Some(rec.head.payload_offset()));
    }
    cx.report.put("Timestamp", Date::from_mac_seconds(timestamp));
    Ok(true)
}

fn read_mark(rec: &mut Record<'_, '_>, cx: &mut Context<'_>) -> Result<bool> {
    let count = rec.be_u16()?;
    if count == 0 {
        return Ok(true);
    }
    let mut markers = Vec::with_capacity(usize::from(count.min(1024)));
    for _ in 0..count {
        let id = rec.i16(Endian::Big)?;
        let position = rec.be_u32()?;
        let name = rec.padded_pascal_string()?;
        markers.push(PropertyNode::Composite(vec![
            ("ID".into(), id.into()),
            ("Position".into(), position.into()),
            ("Name".into(), name.into()),
        ]));
    }
    cx.report.put("Markers", PropertyNode::List(markers));
    Ok(true)
}

fn loop_node(rec: &mut Record<'_, '_>) -> Result<PropertyNode> {
    let play_mode = rec.i16(Endian::Big)?;
    let begin = rec.i16(Endian::Big)?;
    let end = rec.i16(Endian::Big)?;
    let mode = match play_mode {
        0 => "NoLooping",
        1 => "ForwardLooping",
        2 => "ForwardBackwardLooping",
        _ => "unknown",
    };
    Ok(PropertyNode::Composite(vec![
        ("PlayMode".into(), mode.into()),
        ("BeginLoop".into(), begin.into()),
        ("EndLoop".into(), end.into()),
    ]))
}

fn read_inst(rec: &mut Record<'_, '_>, cx: &mut Context<'_>) -> Result<bool> {
    if !fixed_length(rec, cx, 20) {
        return Ok(false);
    }
    for name in ["BaseNote", "Detune", "LowNote", "HighNote", "LowVelocity", "HighVelocity"] {
        let value = rec.i8()?;
        cx.report.put(name, value);
    }
    let gain = rec.i16(Endian::Big)?;
    cx.report.put("Gain", gain);
    let sustain = loop_node(rec)?;
    cx.report.put("SustainLoop", sustain);
    let release = loop_node(rec)?;
    cx.report.put("ReleaseLoop", release);
    Ok(true)
}

fn read_comt(rec: &mut Record<'_, '_>, cx: &mut Context<'_>) -> Result<bool> {
    let count = rec.be_u16()?;
    if count == 0 {
        return Ok(true);
    }
    let mut comments = Vec::new();
    for _ in 0..count {
        let timestamp = rec.be_u32()?;
        let marker = rec.i16(Endian::Big)?;
        let len = rec.be_u16()?;
        let text = cx.read_text(rec, u64::from(len))?;
        if len % 2 == 1 && rec.remaining().unwrap_or(0) > 0 {
            rec.skip(1)?;
        }
        comments.push(PropertyNode::Composite(vec![
            ("Timestamp".into(), Date::from_mac_seconds(timestamp).into()),
            ("MarkerID".into(), marker.into()),
            ("Text".into(), text.into()),
        ]));
    }
    cx.report.put("Comments", PropertyNode::List(comments));
    Ok(true)
}

fn read_aesd(rec: &mut Record<'_, '_>, cx: &mut Context<'_>) -> Result<bool> {
    if !fixed_length(rec, cx, 24) {
        return Ok(false);
    }
    let data = rec.bytes(24)?;
    // Channel status byte 0, bit 0: professional use.
    let professional = data.first().is_some_and(|b| b & 1 != 0);
    cx.report.put("Professional", professional);
    cx.report.put("ChannelStatus", data.to_vec());
    Ok(true)
}

fn read_appl(rec: &mut Record<'_, '_>, cx: &mut Context<'_>) -> Result<bool> {
    if !min_length(rec, cx, 4) {
        return Ok(false);
    }
    let signature = rec.raw_fourcc()?;
    cx.report.put("ApplicationSignature", signature.to_string());
    // Apple II applications start their data with their name.
    if (signature == b"pdos" || signature == b"stoc") && rec.remaining().unwrap_or(0) > 0 {
        let name = rec.pascal_string()?;
        cx.report.put("ApplicationName", name);
    }
    cx.report.put("DataLength", rec.remaining().unwrap_or(0));
    rec.skip_remaining()?;
    Ok(true)
}

fn read_saxl(rec: &mut Record<'_, '_>, cx: &mut Context<'_>) -> Result<bool> {
    let count = rec.be_u16()?;
    if count == 0 {
        return Ok(true);
    }
    let mut saxels = Vec::new();
    for _ in 0..count {
        let id = rec.i16(Endian::Big)?;
        let size = rec.be_u16()?;
        rec.skip(u64::from(size))?;
        if size % 2 == 1 && rec.remaining().unwrap_or(0) > 0 {
            rec.skip(1)?;
        }
        saxels.push(PropertyNode::Composite(vec![("ID".into(), id.into()), ("Size".into(), size.into())]));
    }
    cx.report.put("Saxels", PropertyNode::List(saxels));
    Ok(true)
}

fn one_common_chunk(tree: &PropertyNode, _: &ParseState, findings: &mut Findings) {
    match count(tree, "COMM") {
        0 => findings.invalid("Missing COMM chunk"),
        1 => {},
        n => findings.invalid(format!("{n} COMM chunks; exactly one is allowed")),
    }
}

fn sound_data_present(tree: &PropertyNode, _: &ParseState, findings: &mut Findings) {
    let frames = tree.path(&["COMM", "NumberOfSampleFrames"]).and_then(PropertyNode::as_i64).unwrap_or(0);
    match count(tree, "SSND") {
        0 if frames > 0 => findings.invalid(format!("Missing SSND chunk for {frames} sample frames")),
        0 | 1 => {},
        n => findings.invalid(format!("{n} SSND chunks; at most one is allowed")),
    }
}

fn aifc_has_version(tree: &PropertyNode, state: &ParseState, findings: &mut Findings) {
    if state.version() >= 1 && count(tree, "FVER") == 0 {
        findings.invalid("AIFF-C file without an FVER chunk");
    }
}

fn sample_size_in_range(tree: &PropertyNode, _: &ParseState, findings: &mut Findings) {
    for comm in tree.children("COMM") {
        if let Some(size) = comm.get("SampleSize").and_then(PropertyNode::as_i64) {
            if !(1..=32).contains(&size) {
                findings.invalid(format!("Sample size {size} outside 1..=32"));
            }
        }
    }
}

pub(crate) const RULES: &[Rule] = &[one_common_chunk, sound_data_present, aifc_has_version, sample_size_in_range];

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::Severity;
    use crate::{analyze, FormatKind, Tristate};

    const RATE_44100: [u8; 10] = [0x40, 0x0e, 0xac, 0x44, 0, 0, 0, 0, 0, 0];

    fn chunk(id: &[u8; 4], payload: &[u8]) -> Vec<u8> {
        let mut out = id.to_vec();
        out.extend_from_slice(&(payload.len() as u32).to_be_bytes());
        out.extend_from_slice(payload);
        if payload.len() % 2 == 1 {
            out.push(0);
        }
        out
    }

    fn form(form_type: &[u8; 4], chunks: &[Vec<u8>]) -> Vec<u8> {
        let mut body = form_type.to_vec();
        for c in chunks {
            body.extend_from_slice(c);
        }
        chunk(b"FORM", &body)
    }

    fn comm(channels: u16, frames: u32) -> Vec<u8> {
        let mut payload = channels.to_be_bytes().to_vec();
        payload.extend_from_slice(&frames.to_be_bytes());
        payload.extend_from_slice(&16u16.to_be_bytes());
        payload.extend_from_slice(&RATE_44100);
        chunk(b"COMM", &payload)
    }

    fn ssnd(data: usize) -> Vec<u8> {
        let mut payload = vec![0; 8];
        payload.resize(8 + data, 0x55);
        chunk(b"SSND", &payload)
    }

    fn locations(result: &crate::ParseResult) -> Vec<String> {
        let node = result.properties().path(&["COMM", "ChannelLocations"]).unwrap();
        node.items().iter().map(|n| n.as_str().unwrap().to_owned()).collect()
    }

    #[test]
    fn channel_assignment() {
        for (channels, expected) in [
            (2, vec!["LEFT", "RIGHT"]),
            (3, vec!["LEFT", "RIGHT", "CENTER"]),
            (5, vec!["UNKNOWN"; 5]),
        ] {
            let data = form(b"AIFF", &[comm(channels, 0)]);
            let result = analyze(FormatKind::Aiff, &data).unwrap();
            assert_eq!(result.well_formed(), Tristate::True);
            assert_eq!(locations(&result), expected);
        }
    }

    #[test]
    fn common_chunk_fields() {
        let data = form(b"AIFF", &[comm(1, 4), ssnd(8)]);
        let result = analyze(FormatKind::Aiff, &data).unwrap();
        assert_eq!(result.valid(), Tristate::True, "{:?}", result.messages());
        let comm = result.properties().get("COMM").unwrap();
        assert_eq!(comm.get("SampleRate").and_then(PropertyNode::as_f64), Some(44100.0));
        assert_eq!(comm.get("NumberOfSampleFrames").and_then(PropertyNode::as_i64), Some(4));
        let ssnd = result.properties().get("SSND").unwrap();
        assert_eq!(ssnd.get("DataLength").and_then(PropertyNode::as_i64), Some(8));
        assert_eq!(ssnd.get("ByteOrder").and_then(PropertyNode::as_str), Some("big-endian"));
    }

    #[test]
    fn wrong_size_comm_leaves_no_properties() {
        let mut payload = comm(2, 0)[8..].to_vec();
        payload.extend_from_slice(&[0, 0]);
        let data = form(b"AIFF", &[chunk(b"COMM", &payload), chunk(b"NAME", b"tone")]);
        let result = analyze(FormatKind::Aiff, &data).unwrap();
        assert_eq!(result.well_formed(), Tristate::False);
        assert!(result.properties().get("COMM").is_none());
        // the sibling after the bad chunk is still read
        assert_eq!(result.properties().path(&["NAME", "Text"]).and_then(PropertyNode::as_str), Some("tone"));
    }

    #[test]
    fn sowt_switches_sample_byte_order() {
        let mut payload = comm(2, 1)[8..].to_vec();
        payload.extend_from_slice(b"sowt");
        payload.extend_from_slice(b"\x0Bnot swapped");
        let data = form(b"AIFC", &[chunk(b"FVER", &AIFC_VERSION_1.to_be_bytes()), chunk(b"COMM", &payload), ssnd(4)]);
        let result = analyze(FormatKind::Aiff, &data).unwrap();
        assert_eq!(result.well_formed(), Tristate::True, "{:?}", result.messages());
        assert_eq!(result.state().byte_order, Endian::Little);
        assert_eq!(result.state().version(), 1);
        let ssnd = result.properties().get("SSND").unwrap();
        assert_eq!(ssnd.get("ByteOrder").and_then(PropertyNode::as_str), Some("little-endian"));
        assert_eq!(result.properties().path(&["COMM", "CompressionName"]).and_then(PropertyNode::as_str), Some("not swapped"));
    }

    #[test]
    fn aifc_without_fver_is_invalid() {
        let mut payload = comm(1, 0)[8..].to_vec();
        payload.extend_from_slice(b"NONE\x00\x00");
        let data = form(b"AIFC", &[chunk(b"COMM", &payload)]);
        let result = analyze(FormatKind::Aiff, &data).unwrap();
        assert_eq!(result.well_formed(), Tristate::True, "{:?}", result.messages());
        assert_eq!(result.valid(), Tristate::False);
        assert!(result.messages_of(Severity::Invalid).any(|m| m.text.contains("FVER")));
    }

    #[test]
    fn markers_and_comments() {
        let mut mark = 2u16.to_be_bytes().to_vec();
        mark.extend_from_slice(&[0, 1, 0, 0, 0, 10, 3, b'o', b'n', b'e']);
        mark.extend_from_slice(&[0, 2, 0, 0, 0, 20, 2, b'b', b'2', 0]);
        let mut comt = 1u16.to_be_bytes().to_vec();
        comt.extend_from_slice(&[0, 0, 0, 0, 0, 1, 0, 3, b'h', b'e', b'y', 0]);
        let data = form(b"AIFF", &[comm(1, 0), chunk(b"MARK", &mark), chunk(b"COMT", &comt)]);
        let result = analyze(FormatKind::Aiff, &data).unwrap();
        assert_eq!(result.well_formed(), Tristate::True, "{:?}", result.messages());
        let markers = result.properties().path(&["MARK", "Markers"]).unwrap();
        assert_eq!(markers.items().len(), 2);
        assert_eq!(markers.items()[1].get("Name").and_then(PropertyNode::as_str), Some("b2"));
        let comments = result.properties().path(&["COMT", "Comments"]).unwrap();
        assert_eq!(comments.items()[0].get("Text").and_then(PropertyNode::as_str), Some("hey"));
    }

    #[test]
    fn marker_name_padding_follows_the_length_byte() {
        // "ab\0" prints as "ab", but 1 + 3 bytes is already even.
        let mut mark = 2u16.to_be_bytes().to_vec();
        mark.extend_from_slice(&[0, 1, 0, 0, 0, 10, 3, b'a', b'b', 0]);
        mark.extend_from_slice(&[0, 2, 0, 0, 0, 20, 1, b'c']);
        let data = form(b"AIFF", &[comm(1, 0), chunk(b"MARK", &mark)]);
        let result = analyze(FormatKind::Aiff, &data).unwrap();
        assert_eq!(result.well_formed(), Tristate::True, "{:?}", result.messages());
        let markers = result.properties().path(&["MARK", "Markers"]).unwrap();
        assert_eq!(markers.items()[0].get("Name").and_then(PropertyNode::as_str), Some("ab"));
        assert_eq!(markers.items()[1].get("ID").and_then(PropertyNode::as_i64), Some(2));
        assert_eq!(markers.items()[1].get("Position").and_then(PropertyNode::as_i64), Some(20));
        assert_eq!(markers.items()[1].get("Name").and_then(PropertyNode::as_str), Some("c"));
    }

    #[test]
    fn missing_sound_data() {
        let data = form(b"AIFF", &[comm(2, 100)]);
        let result = analyze(FormatKind::Aiff, &data).unwrap();
        assert_eq!(result.well_formed(), Tristate::True);
        assert_eq!(result.valid(), Tristate::False);
    }
}
