// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The property tree handed to report writers.

use std::borrow::Cow;
use std::fmt;

/// Seconds between 1904-01-01 (Mac epoch) and 1970-01-01.
const MAC_EPOCH_OFFSET: i64 = 2_082_844_800;

/// A point in time, stored as seconds since the Unix epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Date {
    pub unix_seconds: i64,
}

impl Date {
    /// Timestamps in AIFF chunks count seconds from 1904-01-01.
    pub fn from_mac_seconds(seconds: u32) -> Self {
        Self { unix_seconds: i64::from(seconds) - MAC_EPOCH_OFFSET }
    }
}

/// Leaf values.
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Integer(i32),
    Long(i64),
    Double(f64),
    String(String),
    Bytes(Vec<u8>),
    Date(Date),
}

/// A node of the property tree.
///
/// `Array` and `List` hold the same thing; `List` marks a collection whose
/// length came from the data (entries, markers, comments) rather than a
/// fixed shape.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyNode {
    Scalar(Scalar),
    Array(Vec<PropertyNode>),
    List(Vec<PropertyNode>),
    Composite(Vec<(Cow<'static, str>, PropertyNode)>),
}

impl PropertyNode {
    pub fn composite() -> Self {
        Self::Composite(Vec::new())
    }

    /// First child called `name`, if this is a composite.
    pub fn get(&self, name: &str) -> Option<&PropertyNode> {
        self.entries().iter().find(|(n, _)| n == name).map(|(_, node)| node)
    }

    /// Every child called `name`, in order.
    pub fn children<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a PropertyNode> + 'a {
        self.entries().iter().filter(move |(n, _)| n == name).map(|(_, node)| node)
    }

    /// Named children of a composite; empty for anything else.
    pub fn entries(&self) -> &[(Cow<'static, str>, PropertyNode)] {
        match self {
            Self::Composite(entries) => entries,
            _ => &[],
        }
    }

    /// Follow a path of child names.
    pub fn path(&self, names: &[&str]) -> Option<&PropertyNode> {
        names.iter().try_fold(self, |node, name| node.get(*name))
    }

    /// Elements of an array or list.
    pub fn items(&self) -> &[PropertyNode] {
        match self {
            Self::Array(items) | Self::List(items) => items,
            _ => &[],
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            Self::Scalar(Scalar::Integer(v)) => Some(i64::from(v)),
            Self::Scalar(Scalar::Long(v)) => Some(v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            Self::Scalar(Scalar::Double(v)) => Some(v),
            _ => self.as_i64().map(|v| v as f64),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Scalar(Scalar::String(s)) => Some(s),
            _ => None,
        }
    }

    /// Structure without values: names and node kinds only.
    pub fn shape(&self) -> String {
        let mut out = String::new();
        self.write_shape(&mut out);
        out
    }

    fn write_shape(&self, out: &mut String) {
        match self {
            Self::Scalar(_) => out.push('*'),
            Self::Array(items) | Self::List(items) => {
                out.push(if matches!(self, Self::Array(_)) { '[' } else { '<' });
                for item in items {
                    item.write_shape(out);
                }
                out.push(if matches!(self, Self::Array(_)) { ']' } else { '>' });
            },
            Self::Composite(entries) => {
                out.push('{');
                for (i, (name, node)) in entries.iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    out.push_str(name);
                    if !matches!(node, Self::Scalar(_)) {
                        out.push(':');
                        node.write_shape(out);
                    }
                }
                out.push('}');
            },
        }
    }

    fn fmt_indented(&self, f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
        match self {
            Self::Scalar(value) => writeln!(f, "{value}"),
            Self::Array(items) | Self::List(items) => {
                writeln!(f)?;
                for item in items {
                    write!(f, "{:width$}- ", "", width = depth * 2)?;
                    item.fmt_indented(f, depth + 1)?;
                }
                Ok(())
            },
            Self::Composite(entries) => {
                if depth > 0 {
                    writeln!(f)?;
                }
                for (name, node) in entries {
                    write!(f, "{:width$}{name}: ", "", width = depth * 2)?;
                    node.fmt_indented(f, depth + 1)?;
                }
                Ok(())
            },
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integer(v) => fmt::Display::fmt(v, f),
            Self::Long(v) => fmt::Display::fmt(v, f),
            Self::Double(v) => fmt::Display::fmt(v, f),
            Self::String(v) => fmt::Display::fmt(v, f),
            Self::Bytes(v) => {
                for b in v.iter().take(32) {
                    write!(f, "{b:02x}")?;
                }
                if v.len() > 32 {
                    write!(f, "... ({} bytes)", v.len())?;
                }
                Ok(())
            },
            Self::Date(d) => write!(f, "@{}", d.unix_seconds),
        }
    }
}

impl fmt::Display for PropertyNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_indented(f, 0)
    }
}

macro_rules! scalar_from {
    ($($from:ty => $variant:ident),* $(,)?) => {
        $(impl From<$from> for PropertyNode {
            fn from(value: $from) -> Self {
                Self::Scalar(Scalar::$variant(value.into()))
            }
        })*
    };
}

scalar_from! {
    u8 => Integer,
    i8 => Integer,
    u16 => Integer,
    i16 => Integer,
    i32 => Integer,
    u32 => Long,
    i64 => Long,
    f64 => Double,
    String => String,
    &str => String,
    Vec<u8> => Bytes,
    Date => Date,
}

impl From<bool> for PropertyNode {
    fn from(value: bool) -> Self {
        Self::Scalar(Scalar::String(if value { "true" } else { "false" }.into()))
    }
}

impl From<u64> for PropertyNode {
    fn from(value: u64) -> Self {
        match i64::try_from(value) {
            Ok(v) => Self::Scalar(Scalar::Long(v)),
            Err(_) => Self::Scalar(Scalar::String(value.to_string())),
        }
    }
}

#[test]
fn tree_queries() {
    let tree = PropertyNode::Composite(vec![
        ("COMM".into(), PropertyNode::Composite(vec![("NumberOfChannels".into(), 2u16.into())])),
        ("MARK".into(), PropertyNode::List(vec![PropertyNode::composite(), PropertyNode::composite()])),
        ("COMM".into(), PropertyNode::composite()),
    ]);
    assert_eq!(tree.path(&["COMM", "NumberOfChannels"]).and_then(PropertyNode::as_i64), Some(2));
    assert_eq!(tree.children("COMM").count(), 2);
    assert_eq!(tree.get("MARK").map(|m| m.items().len()), Some(2));
    assert_eq!(tree.shape(), "{COMM:{NumberOfChannels},MARK:<{}{}>,COMM:{}}");
}

#[test]
fn mac_epoch_dates() {
    assert_eq!(Date::from_mac_seconds(2_082_844_800).unix_seconds, 0);
    assert_eq!(Date::from_mac_seconds(0).unix_seconds, -2_082_844_800);
}
