// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Pieces shared by the IFF family (AIFF `FORM` and RIFF/RIFX `WAVE`).

use log::debug;

use crate::codes::FourCC;
use crate::cursor::Endian;
use crate::engine::{walk, Context, Dispatch, Phase, Record, WalkEnd};
use crate::header::{RecordHeader, CHUNK_HEADER_LEN};
use crate::{Error, Result};

/// The outer chunk of an IFF file.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Form {
    pub id: FourCC,
    pub form_type: FourCC,
}

/// RF64 writes this in 32-bit size fields whose real value lives in `ds64`.
pub(crate) const SIZE_IN_DS64: u32 = u32::MAX;

/// Check the outer chunk id against `signatures`, each with the byte order
/// it implies for chunk lengths. Aborts the parse on a mismatch.
pub(crate) fn read_signature(
    file: &mut Record<'_, '_>,
    cx: &mut Context<'_>,
    signatures: &[(&[u8; 4], Endian)],
) -> Result<Option<(FourCC, Endian)>> {
    let id = match file.raw_fourcc() {
        Ok(id) => id,
        Err(Error::UnexpectedEOF) => {
            cx.abort("File too short for a signature", 0);
            return Ok(None);
        },
        Err(e) => return Err(e),
    };
    match signatures.iter().find(|(code, _)| id == *code) {
        Some(&(_, order)) => {
            cx.report.signature_matched();
            cx.advance(Phase::SignatureChecked);
            Ok(Some((id, order)))
        },
        None => {
            cx.abort(format!("Unrecognized signature '{id}'"), 0);
            Ok(None)
        },
    }
}

/// Read an IFF file: signature, outer length and form type, then every
/// chunk inside with `chunks`.
pub(crate) fn parse_form<D: Dispatch>(
    file: &mut Record<'_, '_>,
    cx: &mut Context<'_>,
    signatures: &[(&[u8; 4], Endian)],
    form_types: &[&[u8; 4]],
    chunks: &mut D,
    on_form: impl FnOnce(&Form, &mut D, &mut Context<'_>),
) -> Result<()> {
    let Some((id, order)) = read_signature(file, cx, signatures)? else {
        return Ok(());
    };
    let (length, form_type) = match file.u32(order).and_then(|length| Ok((length, file.raw_fourcc()?))) {
        Ok(fields) => fields,
        Err(e) if e.is_terminal() => return Err(e),
        Err(e) => {
            cx.abort(format!("'{id}' header: {e}"), file.position());
            return Ok(());
        },
    };
    if !form_types.iter().any(|t| form_type == *t) {
        cx.abort(format!("Unexpected form type '{form_type}'"), 8);
        return Ok(());
    }
    let form = Form { id, form_type };
    cx.state.byte_order = order;
    on_form(&form, chunks, cx);
    cx.advance(Phase::HeaderParsed);

    // An RF64 form runs to the end of the file.
    let open_ended = id == b"RF64" && length == SIZE_IN_DS64;
    let length = match (open_ended, cx.state.source_len) {
        (true, Some(len)) => len.saturating_sub(CHUNK_HEADER_LEN),
        _ => u64::from(length),
    };
    if length < 4 {
        cx.report.malformed(format!("'{id}' length {length} is too small for its form type"), 4);
        return Ok(());
    }
    if let (false, Some(len)) = (open_ended, cx.state.source_len) {
        if length + CHUNK_HEADER_LEN > len {
            cx.report.malformed(
                format!("'{id}' declares {length} bytes but the file holds {}", len.saturating_sub(CHUNK_HEADER_LEN)),
                4,
            );
        }
    }
    let head = RecordHeader {
        id: id.into(),
        length,
        offset: 0,
        header_len: CHUNK_HEADER_LEN,
        pad: if open_ended { 0 } else { length & 1 },
        open_ended,
    };
    cx.advance(Phase::IteratingTopLevel);
    // The form type has been read already; the view starts at the first chunk.
    let mut body = file.child(head);
    if body.remaining_or_source() == Some(0) {
        cx.report.info(format!("'{form_type}' form contains no chunks"), Some(12));
    }
    match walk(chunks, &mut body, cx) {
        Ok(WalkEnd::Abandoned) => debug!("'{id}' walk abandoned"),
        Ok(_) => {},
        Err(e) if e.is_terminal() => return Err(e),
        Err(e) => cx.report.malformed_error(&e, format_args!("'{id}'"), body.position()),
    }
    drop(body);

    if head.pad > 0 && file.skip(head.pad).is_err() {
        cx.report.info(format!("No pad byte after the odd-length '{id}' chunk"), None);
    }
    let end = file.position();
    if file.skip_remaining().is_ok() && file.position() > end {
        cx.report.info(format!("{} bytes of data after the '{id}' chunk", file.position() - end), Some(end));
    }
    Ok(())
}

/// Text payload (names, annotations, INFO strings).
pub(crate) fn text(rec: &mut Record<'_, '_>, cx: &mut Context<'_>) -> Result<bool> {
    let text = cx.read_rest_text(rec)?;
    cx.report.put("Text", text);
    Ok(true)
}
