// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The record walking machinery shared by every format.
//!
//! A format plugs in by implementing [`Dispatch`]: a header reader, a static
//! identifier table and one handler per known record kind. [`walk`] then
//! iterates a byte-counted (or open-ended) sequence of records, hands each
//! one to its handler through a bounded [`Record`] view and enforces that
//! exactly the declared number of bytes is consumed before the next sibling
//! is read.

use enough::Stop;
use log::{debug, trace};
use std::borrow::Cow;
use std::collections::{HashSet, VecDeque};
use std::fmt;

use crate::codes::{FourCC, RecordId};
use crate::cursor::{printable, ByteCursor, Endian};
use crate::header::RecordHeader;
use crate::report::Report;
use crate::{Error, ParseConfig, ResourceTracker, Result, TryVec};

/// Compression scheme or coding process in effect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Codec {
    /// Raw code as found in the file (four character codes are packed big-endian).
    pub code: u32,
    pub name: Cow<'static, str>,
}

impl Codec {
    pub fn new(code: u32, name: impl Into<Cow<'static, str>>) -> Self {
        Self { code, name: name.into() }
    }

    pub fn from_fourcc(code: FourCC, name: impl Into<Cow<'static, str>>) -> Self {
        Self::new(code.to_u32(), name)
    }
}

/// Mutable context of one parse: what earlier records said about how to read later ones.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ParseState {
    /// Byte order of data fields. Some records change it mid-stream.
    pub byte_order: Endian,
    version: u32,
    pub codec: Option<Codec>,
    /// Total length of the source, when known.
    pub source_len: Option<u64>,
}

impl ParseState {
    pub fn new(byte_order: Endian, source_len: Option<u64>) -> Self {
        Self { byte_order, source_len, ..Self::default() }
    }

    /// Highest format revision whose features have been seen.
    pub fn version(&self) -> u32 {
        self.version
    }

    /// Versions only move up.
    pub fn bump_version(&mut self, version: u32) {
        if version > self.version {
            trace!("version {} -> {version}", self.version);
            self.version = version;
        }
    }
}

/// Where a walk is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) enum Phase {
    Initial,
    SignatureChecked,
    HeaderParsed,
    IteratingTopLevel,
    Done,
    Aborted,
}

/// Everything a handler may touch besides the bytes of its own record.
pub(crate) struct Context<'s> {
    pub(crate) state: ParseState,
    pub(crate) report: Report,
    pub(crate) tracker: ResourceTracker<'s>,
    pub(crate) config: &'s ParseConfig,
    stop: &'s dyn Stop,
    phase: Phase,
    depth: u32,
}

impl<'s> Context<'s> {
    pub(crate) fn new(config: &'s ParseConfig, stop: &'s dyn Stop, state: ParseState) -> Self {
        Self {
            state,
            report: Report::new(),
            tracker: ResourceTracker::new(config),
            config,
            stop,
            phase: Phase::Initial,
            depth: 0,
        }
    }

    pub(crate) fn phase(&self) -> Phase {
        self.phase
    }

    pub(crate) fn advance(&mut self, next: Phase) {
        if next > self.phase && self.phase != Phase::Aborted {
            debug!("{:?} -> {next:?}", self.phase);
            self.phase = next;
        }
    }

    /// Give up on the input: report why and stop all further work.
    pub(crate) fn abort(&mut self, text: impl Into<String>, offset: u64) {
        self.report.malformed(text, offset);
        debug!("{:?} -> Aborted", self.phase);
        self.phase = Phase::Aborted;
    }

    /// Read `len` bytes as sanitized text, within the memory limit.
    pub(crate) fn read_text(&mut self, rec: &mut Record<'_, '_>, len: u64) -> Result<String> {
        rec.ensure_available(len)?;
        self.tracker.reserve(len)?;
        let raw = rec.bytes(len);
        self.tracker.release(len);
        Ok(printable(&raw?))
    }

    /// The rest of the record as sanitized text.
    pub(crate) fn read_rest_text(&mut self, rec: &mut Record<'_, '_>) -> Result<String> {
        let len = rec.remaining_or_source().unwrap_or(0);
        rec.ensure_available(len)?;
        self.tracker.reserve(len)?;
        let raw = rec.rest();
        self.tracker.release(len);
        Ok(printable(&raw?))
    }

    pub(crate) fn check_stop(&self) -> Result<()> {
        self.stop.check()?;
        Ok(())
    }

    fn enter(&mut self) -> Result<()> {
        if self.depth >= self.config.max_nesting_depth {
            return Err(Error::InvalidData("records nested too deeply"));
        }
        self.depth += 1;
        Ok(())
    }

    fn leave(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }
}

/// A view of the cursor limited to one record's payload.
///
/// Reads that would cross the end of the record fail with
/// [`Error::RecordExhausted`] instead of touching the next record.
pub(crate) struct Record<'c, 'a> {
    cursor: &'c mut ByteCursor<'a>,
    pub(crate) head: RecordHeader,
    end: Option<u64>,
}

macro_rules! bounded_reads {
    ($($name:ident($($order:ident)?) -> $ty:ty, $size:expr;)*) => {
        $(pub(crate) fn $name(&mut self $(, $order: Endian)?) -> Result<$ty> {
            self.need($size)?;
            self.cursor.$name($($order)?)
        })*
    };
}

impl<'c, 'a> Record<'c, 'a> {
    /// The whole source, from the current position to its end.
    pub(crate) fn file(cursor: &'c mut ByteCursor<'a>) -> Self {
        let head = RecordHeader::file(cursor.position(), cursor.source_len());
        Self { cursor, head, end: None }
    }

    /// Narrow this view to a child record. The child never extends past the parent.
    pub(crate) fn child(&mut self, head: RecordHeader) -> Record<'_, 'a> {
        let end = match (self.end, head.open_ended) {
            (parent, true) => parent,
            (Some(parent), false) => Some(head.payload_end().min(parent)),
            (None, false) => Some(head.payload_end()),
        };
        Record { cursor: &mut *self.cursor, head, end }
    }

    pub(crate) fn position(&self) -> u64 {
        self.cursor.position()
    }

    /// Bytes left before the end of the record; `None` when it runs to the end of the source.
    pub(crate) fn remaining(&self) -> Option<u64> {
        self.end.map(|end| end.saturating_sub(self.cursor.position()))
    }

    /// Like [`remaining`](Self::remaining), falling back to the source length.
    pub(crate) fn remaining_or_source(&self) -> Option<u64> {
        self.remaining().or_else(|| {
            self.cursor
                .source_len()
                .map(|len| len.saturating_sub(self.cursor.position()))
        })
    }

    fn need(&self, count: u64) -> Result<()> {
        match self.remaining() {
            Some(left) if left < count => Err(Error::RecordExhausted),
            _ => Ok(()),
        }
    }

    bounded_reads! {
        u8() -> u8, 1;
        i8() -> i8, 1;
        u16(order) -> u16, 2;
        i16(order) -> i16, 2;
        u32(order) -> u32, 4;
        i32(order) -> i32, 4;
        u64(order) -> u64, 8;
        f32(order) -> f32, 4;
        f64(order) -> f64, 8;
        extended_f80(order) -> f64, 10;
        fourcc() -> FourCC, 4;
        raw_fourcc() -> FourCC, 4;
    }

    pub(crate) fn be_u16(&mut self) -> Result<u16> {
        self.u16(Endian::Big)
    }

    pub(crate) fn be_u32(&mut self) -> Result<u32> {
        self.u32(Endian::Big)
    }

    pub(crate) fn fixed_chars<const N: usize>(&mut self) -> Result<[u8; N]> {
        self.need(N as u64)?;
        self.cursor.fixed_chars::<N>()
    }

    pub(crate) fn pascal_string(&mut self) -> Result<String> {
        self.need(1)?;
        let len = self.cursor.u8()?;
        let raw = self.bytes(u64::from(len))?;
        Ok(printable(&raw))
    }

    /// A Pascal string padded to an even total length. The pad depends on the
    /// raw length byte, not on the sanitized text.
    pub(crate) fn padded_pascal_string(&mut self) -> Result<String> {
        self.need(1)?;
        let len = self.cursor.u8()?;
        let raw = self.bytes(u64::from(len))?;
        if len % 2 == 0 && self.remaining().unwrap_or(0) > 0 {
            self.skip(1)?;
        }
        Ok(printable(&raw))
    }

    pub(crate) fn bytes(&mut self, count: u64) -> Result<TryVec<u8>> {
        self.need(count)?;
        self.cursor.bytes(count)
    }

    /// Fail with `UnexpectedEOF` when `count` bytes cannot be read from the
    /// record, or from the source when its length is known.
    pub(crate) fn ensure_available(&self, count: u64) -> Result<()> {
        self.need(count)?;
        self.cursor.ensure_available(count)
    }

    /// Everything left in the record.
    pub(crate) fn rest(&mut self) -> Result<TryVec<u8>> {
        match self.remaining() {
            Some(left) => self.cursor.bytes(left),
            None => {
                let mut buf = std::vec::Vec::new();
                std::io::Read::read_to_end(&mut *self.cursor, &mut buf)?;
                Ok(buf.into())
            },
        }
    }

    pub(crate) fn skip(&mut self, count: u64) -> Result<()> {
        self.need(count)?;
        self.cursor.skip(count)
    }

    /// Explicitly drop whatever the handler did not read.
    pub(crate) fn skip_remaining(&mut self) -> Result<()> {
        match self.remaining() {
            Some(left) => self.cursor.skip(left),
            None => self.cursor.skip_to_end().map(drop),
        }
    }

    /// Jump to an absolute offset inside this record (or anywhere, for the file view).
    pub(crate) fn seek(&mut self, offset: u64) -> Result<()> {
        if let Some(end) = self.end {
            if offset > end {
                return Err(Error::RecordExhausted);
            }
        }
        self.cursor.seek(offset)
    }

    /// Read `len` bytes at an absolute offset elsewhere in the source, then
    /// come back. The detour does not count as consumption of this record.
    pub(crate) fn detour<T>(
        &mut self,
        offset: u64,
        len: u64,
        read: impl FnOnce(&mut Record<'_, 'a>) -> Result<T>,
    ) -> Result<T> {
        let back = self.cursor.position();
        self.cursor.seek(offset)?;
        let head = RecordHeader { offset, header_len: 0, length: len, pad: 0, open_ended: false, ..self.head };
        let mut view = Record { cursor: &mut *self.cursor, head, end: Some(offset.saturating_add(len)) };
        let out = read(&mut view);
        self.cursor.seek(back)?;
        out
    }
}

/// How one level of records is read and handled.
pub(crate) trait Dispatch {
    type Kind: Copy + fmt::Debug;

    /// Read the next header from `rec`.
    fn read_header(&mut self, rec: &mut Record<'_, '_>, cx: &mut Context<'_>) -> Result<RecordHeader>;

    /// Static identifier table lookup. `None` means "unknown, skip it".
    fn lookup(&self, id: RecordId) -> Option<Self::Kind>;

    /// Decode one payload. `Ok(false)` means the payload was inconsistent and
    /// has already been reported.
    fn read(&mut self, kind: Self::Kind, rec: &mut Record<'_, '_>, cx: &mut Context<'_>) -> Result<bool>;

    /// Name of the property node a record produces.
    fn node_name(&self, _kind: Self::Kind, head: &RecordHeader) -> Cow<'static, str> {
        Cow::Owned(head.id.to_string())
    }

    /// A record that ends the sequence (it is not dispatched).
    fn is_sentinel(&self, _head: &RecordHeader) -> bool {
        false
    }

    /// Whether siblings are still read after a record fails. Nested
    /// containers give up on the rest of their payload instead.
    fn continue_after_failure(&self) -> bool {
        false
    }
}

/// Remaining-byte budget of a container, charged before each child is parsed.
pub(crate) struct Container {
    budget: Option<u64>,
}

impl Container {
    pub(crate) fn new(rec: &Record<'_, '_>) -> Self {
        Self { budget: rec.remaining() }
    }

    /// Read the next child header, or `None` once the budget is exactly spent
    /// (or an open-ended container reaches the end of the source).
    pub(crate) fn next_child_header<D: Dispatch + ?Sized>(
        &mut self,
        d: &mut D,
        rec: &mut Record<'_, '_>,
        cx: &mut Context<'_>,
    ) -> Result<Option<RecordHeader>> {
        if self.budget == Some(0) {
            return Ok(None);
        }
        let start = rec.position();
        let mut head = match d.read_header(rec, cx) {
            Ok(head) => head,
            Err(Error::UnexpectedEOF) if self.budget.is_none() && rec.position() == start => return Ok(None),
            Err(e) => return Err(e),
        };
        let Some(budget) = self.budget else {
            return Ok(Some(head));
        };
        let used = rec.position() - start;
        let body = if head.open_ended { budget.saturating_sub(used) } else { head.length };
        let needed = used
            .checked_add(body)
            .ok_or(Error::InvalidData("record length overflows"))?;
        if needed > budget {
            return Err(Error::InvalidData("record overruns its container"));
        }
        let mut total = needed;
        if head.pad > 0 {
            if needed + head.pad > budget {
                if cx.config.lenient {
                    cx.report.info(format!("Record '{}' has no room for its pad byte", head.id), Some(head.offset));
                } else {
                    cx.report.malformed(format!("Record '{}' has no room for its pad byte", head.id), head.offset);
                }
                head.pad = 0;
            } else {
                total += head.pad;
            }
        }
        self.budget = Some(budget - total);
        Ok(Some(head))
    }
}

/// How a walk over one level of records ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WalkEnd {
    /// Budget spent, or the end of an open-ended source reached.
    Exhausted,
    /// A terminal record was read; its header is returned undispatched.
    Sentinel(RecordHeader),
    /// Something broke and the rest of this level was skipped.
    Abandoned,
}

/// Iterate the records inside `rec`.
pub(crate) fn walk<D: Dispatch + ?Sized>(d: &mut D, rec: &mut Record<'_, '_>, cx: &mut Context<'_>) -> Result<WalkEnd> {
    cx.enter()?;
    let end = walk_level(d, rec, cx);
    cx.leave();
    end
}

/// Iterate a nested container, returning `false` when any part of it failed.
pub(crate) fn walk_container<D: Dispatch + ?Sized>(
    d: &mut D,
    rec: &mut Record<'_, '_>,
    cx: &mut Context<'_>,
) -> Result<bool> {
    match walk(d, rec, cx) {
        Ok(WalkEnd::Exhausted) => Ok(true),
        Ok(WalkEnd::Sentinel(_)) => Ok(true),
        Ok(WalkEnd::Abandoned) => Ok(false),
        Err(e) if e.is_terminal() => Err(e),
        Err(e) => {
            cx.report.malformed_error(&e, format_args!("Record '{}'", rec.head.id), rec.position());
            Ok(false)
        },
    }
}

fn walk_level<D: Dispatch + ?Sized>(d: &mut D, rec: &mut Record<'_, '_>, cx: &mut Context<'_>) -> Result<WalkEnd> {
    let mut container = Container::new(rec);
    loop {
        let head = match container.next_child_header(d, rec, cx) {
            Ok(Some(head)) => head,
            Ok(None) => return Ok(WalkEnd::Exhausted),
            Err(e) if e.is_terminal() => return Err(e),
            Err(e) => {
                cx.report.malformed_error(&e, "Record header", rec.position());
                abandon(rec)?;
                return Ok(WalkEnd::Abandoned);
            },
        };
        if d.is_sentinel(&head) {
            return Ok(WalkEnd::Sentinel(head));
        }
        let ok = dispatch(d, rec, head, cx)?;
        if head.pad > 0 {
            if let Err(e) = rec.skip(head.pad) {
                if e.is_terminal() {
                    return Err(e);
                }
                if cx.config.lenient {
                    cx.report.info(format!("Missing pad byte after '{}'", head.id), Some(rec.position()));
                } else {
                    cx.report.malformed_error(&e, format_args!("Pad byte after '{}'", head.id), rec.position());
                }
            }
        }
        if !ok && !d.continue_after_failure() {
            debug!("abandoning the rest of '{}' after a failed child", rec.head.id);
            abandon(rec)?;
            return Ok(WalkEnd::Abandoned);
        }
    }
}

/// Skip the rest of a container that can no longer be trusted.
fn abandon(rec: &mut Record<'_, '_>) -> Result<()> {
    match rec.skip_remaining() {
        Err(e) if e.is_terminal() => Err(e),
        _ => Ok(()),
    }
}

/// Hand one record to its handler and reconcile the cursor afterwards.
pub(crate) fn dispatch<D: Dispatch + ?Sized>(
    d: &mut D,
    parent: &mut Record<'_, '_>,
    head: RecordHeader,
    cx: &mut Context<'_>,
) -> Result<bool> {
    cx.check_stop()?;
    cx.tracker.count_record()?;
    let mut rec = parent.child(head);

    let Some(kind) = d.lookup(head.id) else {
        debug!("{head:?} (skipped)");
        cx.report.info(
            format!("Skipped unknown record '{}' ({} bytes)", head.id, head.length),
            Some(head.offset),
        );
        return reconcile(&mut rec, cx, true, false);
    };

    trace!("{kind:?} at {}", head.offset);
    cx.report.open(d.node_name(kind, &head));
    let ok = match d.read(kind, &mut rec, cx) {
        Ok(ok) => ok,
        Err(e) if e.is_terminal() => return Err(e),
        Err(e) => {
            cx.report.malformed_error(&e, format_args!("Record '{}'", head.id), rec.position());
            false
        },
    };
    cx.report.close(ok);
    reconcile(&mut rec, cx, ok, true)
}

/// Make sure exactly the declared length has been consumed.
fn reconcile(rec: &mut Record<'_, '_>, cx: &mut Context<'_>, ok: bool, strict: bool) -> Result<bool> {
    let unread = rec.remaining().unwrap_or(0);
    let mut ok = ok;
    if unread > 0 {
        debug!("Dropping {unread} bytes in '{}'", rec.head.id);
        if ok && strict {
            cx.report.malformed(
                format!("{unread} unread bytes at the end of record '{}'", rec.head.id),
                rec.position(),
            );
            ok = false;
        }
    }
    if let Err(e) = rec.skip_remaining() {
        if e.is_terminal() {
            return Err(e);
        }
        cx.report.malformed_error(&e, format_args!("Record '{}'", rec.head.id), rec.position());
        return Ok(false);
    }
    Ok(ok)
}

/// Reject any declared length other than `expected`.
pub(crate) fn fixed_length(rec: &Record<'_, '_>, cx: &mut Context<'_>, expected: u64) -> bool {
    if rec.head.length == expected {
        return true;
    }
    cx.report.malformed(
        format!("'{}' must be {expected} bytes long, not {}", rec.head.id, rec.head.length),
        rec.head.offset,
    );
    false
}

/// Reject declared lengths below `minimum`.
pub(crate) fn min_length(rec: &Record<'_, '_>, cx: &mut Context<'_>, minimum: u64) -> bool {
    if rec.head.length >= minimum {
        return true;
    }
    cx.report.malformed(
        format!("'{}' must be at least {minimum} bytes long, not {}", rec.head.id, rec.head.length),
        rec.head.offset,
    );
    false
}

/// Pending structures reached through indirect offsets, with a guard against
/// offset chains that loop back on themselves.
pub(crate) struct Worklist<K> {
    pending: VecDeque<(u64, K)>,
    visited: HashSet<u64>,
}

impl<K> Worklist<K> {
    pub(crate) fn new() -> Self {
        Self { pending: VecDeque::new(), visited: HashSet::new() }
    }

    /// Queue `offset` unless it was seen before; returns `false` for a revisit.
    pub(crate) fn push(&mut self, offset: u64, kind: K) -> bool {
        if !self.visited.insert(offset) {
            return false;
        }
        self.pending.push_back((offset, kind));
        true
    }

    pub(crate) fn pop(&mut self) -> Option<(u64, K)> {
        self.pending.pop_front()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cursor::{NoChecksum, Seekable};
    use crate::header::read_chunk_header;
    use crate::property::PropertyNode;
    use crate::report::{ParseResult, Severity};
    use crate::FormatKind;

    record_kinds! {
        pub(crate) enum TestChunk {
            Flip => b"FLIP",
            Value => b"VALU",
            Nest => b"NEST",
        }
    }

    /// Chunk lengths and values follow whatever byte order is in effect.
    struct Chunks;

    impl Dispatch for Chunks {
        type Kind = TestChunk;

        fn read_header(&mut self, rec: &mut Record<'_, '_>, cx: &mut Context<'_>) -> Result<RecordHeader> {
            read_chunk_header(rec, cx.state.byte_order)
        }

        fn lookup(&self, id: RecordId) -> Option<TestChunk> {
            TestChunk::lookup(id)
        }

        fn read(&mut self, kind: TestChunk, rec: &mut Record<'_, '_>, cx: &mut Context<'_>) -> Result<bool> {
            match kind {
                TestChunk::Flip => {
                    cx.state.byte_order = Endian::Little;
                    Ok(true)
                },
                TestChunk::Value => {
                    let value = rec.u16(cx.state.byte_order)?;
                    cx.report.put("Value", value);
                    Ok(true)
                },
                TestChunk::Nest => walk_container(self, rec, cx),
            }
        }
    }

    fn chunk(id: &[u8; 4], payload: &[u8]) -> Vec<u8> {
        let mut out = id.to_vec();
        out.extend_from_slice(&(payload.len() as u32).to_be_bytes());
        out.extend_from_slice(payload);
        out
    }

    fn walk_bytes(data: &[u8], config: &ParseConfig) -> (ParseResult, WalkEnd) {
        let mut source = Seekable::new(std::io::Cursor::new(data));
        let mut sink = NoChecksum;
        let mut cursor = ByteCursor::new(&mut source, &mut sink);
        let state = ParseState::new(Endian::Big, Some(data.len() as u64));
        let mut cx = Context::new(config, &enough::Unstoppable, state);
        let mut file = Record::file(&mut cursor);
        let end = walk(&mut Chunks, &mut file, &mut cx).unwrap();
        (cx.report.finish(FormatKind::Aiff, cx.state), end)
    }

    #[test]
    fn byte_order_change_applies_to_later_records() {
        let mut data = chunk(b"VALU", &[1, 2]);
        data.extend(chunk(b"FLIP", &[]));
        data.extend_from_slice(b"VALU\x02\0\0\0\x02\x01");
        let (result, end) = walk_bytes(&data, &ParseConfig::default());
        assert_eq!(end, WalkEnd::Exhausted);
        assert!(result.messages().is_empty(), "{:?}", result.messages());
        let values: Vec<_> = result
            .properties()
            .children("VALU")
            .filter_map(|node| node.get("Value").and_then(PropertyNode::as_i64))
            .collect();
        assert_eq!(values, [0x0102, 0x0102]);
        assert_eq!(result.state().byte_order, Endian::Little);
    }

    #[test]
    fn nesting_depth_is_bounded() {
        let inner = chunk(b"NEST", &chunk(b"VALU", &[0, 1]));
        let data = chunk(b"NEST", &chunk(b"NEST", &inner));
        let (result, _) = walk_bytes(&data, &ParseConfig::default().with_max_nesting_depth(2));
        assert!(result.messages_of(Severity::Malformed).any(|m| m.text.contains("nested too deeply")));
        assert!(result.properties().get("NEST").is_none());
    }

    #[test]
    fn child_may_not_overrun_its_parent() {
        let mut nest = chunk(b"NEST", b"VALU\0\0\0\x04\0\0");
        nest.extend(chunk(b"VALU", &[0, 7]));
        let (result, end) = walk_bytes(&nest, &ParseConfig::default());
        assert_eq!(end, WalkEnd::Abandoned);
        assert!(result.messages().iter().any(|m| m.text.contains("overruns its container")));
        assert!(result.properties().get("VALU").is_none());
    }

    #[test]
    fn unread_bytes_are_reported() {
        let data = chunk(b"VALU", &[0, 1, 2, 3]);
        let (result, _) = walk_bytes(&data, &ParseConfig::default());
        let malformed: Vec<_> = result.messages_of(Severity::Malformed).collect();
        assert_eq!(malformed.len(), 1);
        assert!(malformed[0].text.contains("2 unread bytes"));
    }

    #[test]
    fn worklist_refuses_cycles() {
        let mut work = Worklist::new();
        assert!(work.push(8, "ifd0"));
        assert!(work.push(100, "exif"));
        assert!(!work.push(8, "ifd0 again"));
        assert_eq!(work.pop(), Some((8, "ifd0")));
        assert_eq!(work.pop(), Some((100, "exif")));
        assert_eq!(work.pop(), None);
        assert!(!work.push(100, "exif again"));
    }

    #[test]
    fn versions_only_increase() {
        let mut state = ParseState::default();
        state.bump_version(2);
        state.bump_version(1);
        assert_eq!(state.version(), 2);
    }
}
