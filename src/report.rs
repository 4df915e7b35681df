// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use log::{debug, warn};
use std::borrow::Cow;
use std::fmt;

use crate::engine::ParseState;
use crate::property::PropertyNode;
use crate::{Error, FormatKind};

/// A flag that can only get weaker: once `False`, it stays `False`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Tristate {
    #[default]
    Undetermined,
    True,
    False,
}

impl Tristate {
    fn degrade(&mut self) {
        *self = Self::False;
    }

    fn settle(&mut self) {
        if *self == Self::Undetermined {
            *self = Self::True;
        }
    }

    pub fn is_true(self) -> bool {
        self == Self::True
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// The structure is broken; clears the well-formed flag.
    Malformed,
    /// Structurally sound but semantically inconsistent; clears the valid flag.
    Invalid,
    /// Nothing wrong, just worth knowing.
    Info,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub severity: Severity,
    pub text: String,
    pub offset: Option<u64>,
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self.severity {
            Severity::Malformed => "error",
            Severity::Invalid => "invalid",
            Severity::Info => "info",
        };
        match self.offset {
            Some(offset) => write!(f, "{label}: {} (offset {offset})", self.text),
            None => write!(f, "{label}: {}", self.text),
        }
    }
}

type Entries = Vec<(Cow<'static, str>, PropertyNode)>;

/// Collects findings and properties while a parse is running.
pub(crate) struct Report {
    open: Vec<(Cow<'static, str>, Entries)>,
    messages: Vec<Message>,
    well_formed: Tristate,
    valid: Tristate,
    signature_matched: bool,
}

impl Report {
    pub(crate) fn new() -> Self {
        Self {
            open: vec![(Cow::Borrowed(""), Vec::new())],
            messages: Vec::new(),
            well_formed: Tristate::Undetermined,
            valid: Tristate::Undetermined,
            signature_matched: false,
        }
    }

    pub(crate) fn signature_matched(&mut self) {
        self.signature_matched = true;
    }

    pub(crate) fn malformed(&mut self, text: impl Into<String>, offset: u64) {
        let text = text.into();
        debug!("malformed at {offset}: {text}");
        self.well_formed.degrade();
        self.push(Severity::Malformed, text, Some(offset));
    }

    pub(crate) fn invalid(&mut self, text: impl Into<String>, offset: Option<u64>) {
        self.valid.degrade();
        self.push(Severity::Invalid, text.into(), offset);
    }

    pub(crate) fn info(&mut self, text: impl Into<String>, offset: Option<u64>) {
        self.push(Severity::Info, text.into(), offset);
    }

    /// Record a structural error returned by a reader.
    pub(crate) fn malformed_error(&mut self, err: &Error, context: impl fmt::Display, offset: u64) {
        self.malformed(format!("{context}: {err}"), offset);
    }

    fn push(&mut self, severity: Severity, text: String, offset: Option<u64>) {
        self.messages.push(Message { severity, text, offset });
    }

    /// Add a property to the innermost open node.
    pub(crate) fn put(&mut self, name: impl Into<Cow<'static, str>>, node: impl Into<PropertyNode>) {
        if let Some((_, entries)) = self.open.last_mut() {
            entries.push((name.into(), node.into()));
        }
    }

    /// Start collecting the properties of a record.
    pub(crate) fn open(&mut self, name: impl Into<Cow<'static, str>>) {
        self.open.push((name.into(), Vec::new()));
    }

    /// Finish the innermost record. A discarded record leaves no properties behind.
    pub(crate) fn close(&mut self, keep: bool) {
        if self.open.len() < 2 {
            warn!("unbalanced property close");
            return;
        }
        if let Some((name, entries)) = self.open.pop() {
            if keep {
                self.put(name, PropertyNode::Composite(entries));
            }
        }
    }

    pub(crate) fn finish(mut self, format: FormatKind, state: ParseState) -> ParseResult {
        while self.open.len() > 1 {
            self.close(true);
        }
        let root = self.open.pop().map(|(_, entries)| entries).unwrap_or_default();
        ParseResult {
            format,
            well_formed: self.well_formed,
            valid: self.valid,
            messages: self.messages,
            properties: PropertyNode::Composite(root),
            signature_matched: self.signature_matched,
            state,
        }
    }
}

/// Outcome of analysing one input.
///
/// Always carries the best-effort property tree, even when the input is not
/// well-formed.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseResult {
    format: FormatKind,
    well_formed: Tristate,
    valid: Tristate,
    messages: Vec<Message>,
    properties: PropertyNode,
    signature_matched: bool,
    state: ParseState,
}

impl ParseResult {
    pub fn format(&self) -> FormatKind {
        self.format
    }

    pub fn well_formed(&self) -> Tristate {
        self.well_formed
    }

    pub fn valid(&self) -> Tristate {
        self.valid
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Root of the property tree; a composite with one node per top-level record.
    pub fn properties(&self) -> &PropertyNode {
        &self.properties
    }

    pub fn signature_matched(&self) -> bool {
        self.signature_matched
    }

    /// Parse state as it stood when the walk ended (byte order, version, codec).
    pub fn state(&self) -> &ParseState {
        &self.state
    }

    pub fn messages_of(&self, severity: Severity) -> impl Iterator<Item = &Message> {
        self.messages.iter().filter(move |m| m.severity == severity)
    }

    /// Append a finding made after the walk. Only validity can change here.
    pub(crate) fn note(&mut self, message: Message) {
        match message.severity {
            Severity::Invalid => self.valid.degrade(),
            Severity::Malformed => {
                warn!("structural finding after the walk: {message}");
                self.well_formed.degrade();
            },
            Severity::Info => {},
        }
        self.messages.push(message);
    }

    /// Resolve undetermined flags once every check has run. Not well-formed implies not valid.
    pub(crate) fn seal(&mut self) {
        if self.well_formed == Tristate::False {
            self.valid.degrade();
        }
        self.well_formed.settle();
        self.valid.settle();
    }

    /// Parse stopped at the signature; nothing can be determined.
    pub(crate) fn seal_unrecognized(&mut self) {
        self.well_formed.degrade();
        self.valid.degrade();
    }
}

#[test]
fn flags_only_get_weaker() {
    let mut report = Report::new();
    report.malformed("truncated", 10);
    report.info("note", None);
    let mut result = report.finish(FormatKind::Aiff, ParseState::default());
    result.seal();
    assert_eq!(result.well_formed(), Tristate::False);
    assert_eq!(result.valid(), Tristate::False);
    result.seal();
    assert_eq!(result.well_formed(), Tristate::False);
    assert_eq!(result.messages().len(), 2);
}

#[test]
fn discarded_records_leave_no_properties() {
    let mut report = Report::new();
    report.open("good");
    report.put("a", 1u8);
    report.close(true);
    report.open("bad");
    report.put("b", 2u8);
    report.close(false);
    let result = report.finish(FormatKind::Wave, ParseState::default());
    assert_eq!(result.properties().shape(), "{good:{a}}");
}
