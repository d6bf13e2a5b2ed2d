// Copyright 2022-2023 Andrew D. Straw.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT
// or http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

pub type Result<T> = std::result::Result<T, Error>;

/// The error type for decoding EBML streams.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("format error: {0}")]
    Format(#[from] FormatError),
    /// The stream ended before a declared length was satisfied.
    #[error("stream truncated: expected {expected} bytes, got {got}")]
    Truncated { expected: u64, got: u64 },
    /// A schema cannot be turned into a decoding table.
    #[error("unsupported shape for {type_name}: {reason}")]
    UnsupportedShape {
        type_name: &'static str,
        reason: String,
    },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Malformed input detected while decoding.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum FormatError {
    #[error("invalid vint marker byte {0:#04x}")]
    InvalidVintMarker(u8),
    #[error("element id is zero")]
    ZeroId,
    #[error("element 0x{id:X} declares {size} bytes but only {available} remain in its parent")]
    SizeExceedsParent { id: u64, size: u64, available: u64 },
    #[error("unsupported integer width {0}")]
    IntegerWidth(u64),
    #[error("unsupported float width {0}")]
    FloatWidth(u64),
    #[error("integer value does not fit in {target}")]
    IntegerOverflow { target: &'static str },
    #[error("element of {size} bytes exceeds the {max} byte buffer limit")]
    BufferTooLarge { size: u64, max: u64 },
    #[error("invalid UTF-8 string: {0}")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),
    #[error("date is out of range")]
    DateOutOfRange,
    #[error("element has no declared size")]
    Unbounded,
    #[error("element nesting depth {depth} exceeds the limit")]
    TooDeep { depth: u32 },
    #[error("mandatory field {field} of {type_name} is missing")]
    MissingField {
        type_name: &'static str,
        field: &'static str,
    },
}

impl From<Error> for std::io::Error {
    fn from(err: Error) -> Self {
        match err {
            Error::Io(e) => e,
            Error::Truncated { .. } => std::io::Error::new(std::io::ErrorKind::UnexpectedEof, err),
            other => std::io::Error::new(std::io::ErrorKind::InvalidData, other),
        }
    }
}
