//! Text encodings supported by the file store.
//!
//! Decoding never fails from the caller's point of view: bytes that are not
//! valid in the requested encoding are decoded again as Latin-1, which maps
//! every byte to exactly one code point.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Character encoding for reading and writing sandboxed text files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Encoding {
    #[default]
    Utf8,
    /// ISO-8859-1. Total over bytes, so it doubles as the decode fallback.
    Latin1,
}

impl Encoding {
    /// Canonical lowercase name (`utf-8`, `latin-1`).
    pub fn name(self) -> &'static str {
        match self {
            Encoding::Utf8 => "utf-8",
            Encoding::Latin1 => "latin-1",
        }
    }

    /// Decode `bytes`, returning `None` when they are invalid in this encoding.
    pub fn decode(self, bytes: &[u8]) -> Option<String> {
        match self {
            Encoding::Utf8 => std::str::from_utf8(bytes).ok().map(str::to_owned),
            Encoding::Latin1 => Some(bytes.iter().map(|&b| char::from(b)).collect()),
        }
    }

    /// Encode `text` into bytes.
    pub fn encode(self, text: &str) -> Result<Vec<u8>, EncodeError> {
        match self {
            Encoding::Utf8 => Ok(text.as_bytes().to_vec()),
            Encoding::Latin1 => text
                .chars()
                .enumerate()
                .map(|(index, ch)| {
                    u8::try_from(u32::from(ch)).map_err(|_| EncodeError {
                        ch,
                        index,
                        encoding: self,
                    })
                })
                .collect(),
        }
    }
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Encoding {
    type Err = UnknownEncoding;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "utf-8" | "utf8" => Ok(Encoding::Utf8),
            "latin-1" | "latin1" | "iso-8859-1" | "iso8859-1" => Ok(Encoding::Latin1),
            _ => Err(UnknownEncoding(s.to_string())),
        }
    }
}

impl TryFrom<String> for Encoding {
    type Error = UnknownEncoding;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Encoding> for String {
    fn from(value: Encoding) -> Self {
        value.name().to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown encoding {0:?} (expected utf-8 or latin-1)")]
pub struct UnknownEncoding(pub String);

/// A character that has no representation in the target encoding.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cannot encode {ch:?} at char {index} as {encoding}")]
pub struct EncodeError {
    pub ch: char,
    pub index: usize,
    pub encoding: Encoding,
}

/// Text decoded from disk plus the encoding that actually succeeded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decoded {
    pub text: String,
    pub encoding: Encoding,
    pub fell_back: bool,
}

/// Decode with `requested`, retrying once as Latin-1 on failure.
pub fn decode_with_fallback(bytes: &[u8], requested: Encoding) -> Decoded {
    if let Some(text) = requested.decode(bytes) {
        return Decoded {
            text,
            encoding: requested,
            fell_back: false,
        };
    }
    let text: String = bytes.iter().map(|&b| char::from(b)).collect();
    Decoded {
        text,
        encoding: Encoding::Latin1,
        fell_back: true,
    }
}

/// Number of newline-delimited segments (`"a\nb"` and `"a\nb\n"` count 2 and 3).
pub fn line_count(text: &str) -> usize {
    text.bytes().filter(|&b| b == b'\n').count() + 1
}
