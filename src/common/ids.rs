//! 128-bit interface identifiers.
//!
//! Identifiers are written as string literals in the canonical
//! `xxxxxxxx-xxxx-xxxx-xxxx-xxxxxxxxxxxx` form (optionally wrapped in braces)
//! and parsed at compile time, so a typo fails the build instead of minting a
//! random contract at runtime.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Binary layout matches the platform `GUID` structure.
#[repr(C)]
#[derive(Copy, Clone, Eq, PartialEq, Hash)]
pub struct Guid {
    pub data1: u32,
    pub data2: u16,
    pub data3: u16,
    pub data4: [u8; 8],
}

#[derive(Debug, Error, Eq, PartialEq)]
#[error("malformed interface identifier {0:?}")]
pub struct GuidParseError(pub String);

impl Guid {
    pub const fn from_u128(value: u128) -> Self {
        Self {
            data1: (value >> 96) as u32,
            data2: (value >> 80) as u16,
            data3: (value >> 64) as u16,
            data4: (value as u64).to_be_bytes(),
        }
    }

    /// Parse an identifier literal; panics (at compile time in const context)
    /// when the text is malformed.
    pub const fn parse(text: &str) -> Self {
        match Self::try_parse(text.as_bytes()) {
            Some(guid) => guid,
            None => panic!("malformed interface identifier"),
        }
    }

    const fn try_parse(bytes: &[u8]) -> Option<Self> {
        let (start, end) = if bytes.len() == 38 && bytes[0] == b'{' && bytes[37] == b'}' {
            (1, 37)
        } else if bytes.len() == 36 {
            (0, 36)
        } else {
            return None;
        };

        let mut value: u128 = 0;
        let mut i = start;
        while i < end {
            let pos = i - start;
            let b = bytes[i];
            if pos == 8 || pos == 13 || pos == 18 || pos == 23 {
                if b != b'-' {
                    return None;
                }
            } else {
                let digit = match b {
                    b'0'..=b'9' => b - b'0',
                    b'a'..=b'f' => b - b'a' + 10,
                    b'A'..=b'F' => b - b'A' + 10,
                    _ => return None,
                };
                value = (value << 4) | digit as u128;
            }
            i += 1;
        }
        Some(Self::from_u128(value))
    }
}

impl FromStr for Guid {
    type Err = GuidParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::try_parse(s.trim().as_bytes()).ok_or_else(|| GuidParseError(s.to_string()))
    }
}

impl fmt::Display for Guid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let d = &self.data4;
        write!(
            f,
            "{:08x}-{:04x}-{:04x}-{:02x}{:02x}-{:02x}{:02x}{:02x}{:02x}{:02x}{:02x}",
            self.data1, self.data2, self.data3, d[0], d[1], d[2], d[3], d[4], d[5], d[6], d[7]
        )
    }
}

impl fmt::Debug for Guid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{{}}}", self)
    }
}
