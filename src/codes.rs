// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::fmt;

/// A four character code, as used for IFF chunk ids and JP2 box types.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct FourCC {
    pub value: [u8; 4],
}

impl FourCC {
    pub const fn new(value: [u8; 4]) -> Self {
        Self { value }
    }

    pub const fn to_u32(self) -> u32 {
        u32::from_be_bytes(self.value)
    }
}

/// Bytes accepted inside a fixed-width identifier.
pub(crate) const fn is_identifier_byte(b: u8) -> bool {
    b >= 0x20 && b <= 0x7e
}

impl From<u32> for FourCC {
    fn from(number: u32) -> Self {
        Self { value: number.to_be_bytes() }
    }
}

impl From<[u8; 4]> for FourCC {
    fn from(value: [u8; 4]) -> Self {
        Self { value }
    }
}

impl PartialEq<&[u8; 4]> for FourCC {
    fn eq(&self, other: &&[u8; 4]) -> bool {
        self.value.eq(*other)
    }
}

impl fmt::Debug for FourCC {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "'{self}'")
    }
}

impl fmt::Display for FourCC {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for &b in &self.value {
            if is_identifier_byte(b) {
                write!(f, "{}", b as char)?;
            } else {
                write!(f, "\\x{b:02x}")?;
            }
        }
        Ok(())
    }
}

/// The identifier of a record, in whichever width its format uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordId {
    /// IFF/RIFF chunk id or JP2 box type.
    FourCC(FourCC),
    /// JPEG marker byte (the byte following `0xFF`).
    Marker(u8),
    /// TIFF tag number.
    Tag(u16),
}

impl RecordId {
    pub fn fourcc(self) -> Option<FourCC> {
        match self {
            Self::FourCC(code) => Some(code),
            _ => None,
        }
    }
}

impl From<FourCC> for RecordId {
    fn from(code: FourCC) -> Self {
        Self::FourCC(code)
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::FourCC(code) => fmt::Display::fmt(&code, f),
            Self::Marker(marker) => f.write_str(&marker_name(marker)),
            Self::Tag(tag) => write!(f, "{tag}"),
        }
    }
}

/// Mnemonic of a JPEG / JPEG 2000 codestream marker, per ITU-T T.81 table B.1.
pub fn marker_name(marker: u8) -> std::borrow::Cow<'static, str> {
    use std::borrow::Cow;
    Cow::Borrowed(match marker {
        0x01 => "TEM",
        0xC4 => "DHT",
        0xC8 => "JPG",
        0xCC => "DAC",
        0xC0..=0xCF => return Cow::Owned(format!("SOF{}", marker - 0xC0)),
        0xD0..=0xD7 => return Cow::Owned(format!("RST{}", marker - 0xD0)),
        0xD8 => "SOI",
        0xD9 => "EOI",
        0xDA => "SOS",
        0xDB => "DQT",
        0xDC => "DNL",
        0xDD => "DRI",
        0xDE => "DHP",
        0xDF => "EXP",
        0xE0..=0xEF => return Cow::Owned(format!("APP{}", marker - 0xE0)),
        0xFE => "COM",
        _ => return Cow::Owned(format!("0x{marker:02X}")),
    })
}

#[test]
fn fourcc_display_escapes_control_bytes() {
    assert_eq!(FourCC::new(*b"fmt ").to_string(), "fmt ");
    assert_eq!(FourCC::new([b'a', 0, b'b', 0x7f]).to_string(), "a\\x00b\\x7f");
    assert_eq!(RecordId::from(FourCC::new(*b"data")).fourcc(), Some(FourCC::new(*b"data")));
    assert_eq!(RecordId::Tag(256).fourcc(), None);
}

#[test]
fn marker_mnemonics() {
    assert_eq!(marker_name(0xC2), "SOF2");
    assert_eq!(marker_name(0xC4), "DHT");
    assert_eq!(marker_name(0xE1), "APP1");
    assert_eq!(marker_name(0xD3), "RST3");
    assert_eq!(RecordId::Marker(0xFE).to_string(), "COM");
    assert_eq!(RecordId::Tag(256).to_string(), "256");
}
