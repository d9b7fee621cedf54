//! Error types for the feed wire protocol.

use std::fmt;

/// Errors produced while decoding a binary data frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireError {
    TooShort { need: usize, have: usize },
    UnknownFrameCode(u8),
    UnknownPayloadKind(u8),
    Utf8(&'static str),
}

impl fmt::Display for WireError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TooShort { need, have } => {
                write!(f, "frame too short: need at least {need} bytes, have {have}")
            }
            Self::UnknownFrameCode(c) => write!(f, "unknown frame code: {c}"),
            Self::UnknownPayloadKind(k) => write!(f, "unknown payload kind: {k}"),
            Self::Utf8(field) => write!(f, "{field}: not valid utf-8"),
        }
    }
}

impl std::error::Error for WireError {}
