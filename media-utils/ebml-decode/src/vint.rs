// Copyright 2017-2022 Brian Langenberger
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Variable-width integers used for element ids and element sizes.
//!
//! The position of the highest set bit in the leading byte gives the total
//! width (1 to 8 bytes). Ids keep this marker bit as part of their value so
//! that ids of different widths never collide. Sizes have it stripped.

use bitstream_io::BitRead;

use crate::error::{Error, FormatError, Result};

type BitReader<R> = bitstream_io::BitReader<R, bitstream_io::BigEndian>;

/// The longest vint the format allows.
pub const MAX_VINT_WIDTH: u8 = 8;

/// Which masking rule applies when decoding a vint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VintKind {
    /// Element id, marker bit retained.
    Id,
    /// Element size, marker bit cleared.
    Size,
}

/// Total encoded width in bytes of the vint starting with `first`.
pub fn vint_width(first: u8) -> Result<u8> {
    if first == 0 {
        return Err(FormatError::InvalidVintMarker(first).into());
    }
    Ok(first.leading_zeros() as u8 + 1)
}

/// Decode one vint from the front of `bytes`, returning the value and the
/// number of bytes it occupied.
pub fn decode_vint(bytes: &[u8], kind: VintKind) -> Result<(u64, u8)> {
    let first = *bytes.first().ok_or(Error::Truncated {
        expected: 1,
        got: 0,
    })?;
    let width = vint_width(first)?;
    if bytes.len() < usize::from(width) {
        return Err(Error::Truncated {
            expected: width.into(),
            got: bytes.len() as u64,
        });
    }

    let mut r = BitReader::new(&bytes[..usize::from(width)]);
    // `vint_width` already checked the marker, so this only re-reads it.
    let zeros = r.read_unary1()?;
    debug_assert_eq!(zeros + 1, u32::from(width));
    let bits = 7 * u32::from(width);
    let value: u64 = r.read(bits)?;
    let value = match kind {
        VintKind::Id => (1 << bits) | value,
        VintKind::Size => value,
    };
    Ok((value, width))
}

/// Width of an element id, if `id` carries a valid length marker.
///
/// Used to validate ids written by hand in a schema.
pub fn id_width(id: u64) -> Option<u8> {
    if id == 0 {
        return None;
    }
    let width = (64 - id.leading_zeros()).div_ceil(8);
    let top = (id >> (8 * (width - 1))) as u8;
    match vint_width(top) {
        Ok(w) if u32::from(w) == width => Some(w),
        _ => None,
    }
}
