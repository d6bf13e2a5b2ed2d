// Copyright 2022-2023 Andrew D. Straw.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT
// or http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Readers for leaf elements.
//!
//! Each reader consumes the whole payload of the element it is given.

use chrono::{DateTime, Utc};

use crate::cursor::Element;
use crate::error::{FormatError, Result};

/// Nanoseconds from the Unix epoch to 2001-01-01T00:00:00 UTC, the origin
/// of EBML dates.
const EBML_EPOCH_UNIX_NANOS: i64 = 978_307_200_000_000_000;

/// Types which can be read from a single element.
///
/// Implement this for a custom type to take over decoding of an element
/// entirely, for example to parse a binary payload into a struct.
pub trait FromElement: Sized {
    fn from_element(elem: Element<'_>) -> Result<Self>;
}

fn read_be(elem: &mut Element<'_>) -> Result<(u64, u64)> {
    let len = elem.payload_len()?;
    if !(1..=8).contains(&len) {
        return Err(FormatError::IntegerWidth(len).into());
    }
    let mut buf = [0u8; 8];
    elem.read_exact_payload(&mut buf[8 - len as usize..])?;
    Ok((u64::from_be_bytes(buf), len))
}

/// Big-endian unsigned integer of 1 to 8 bytes.
pub fn read_uint(mut elem: Element<'_>) -> Result<u64> {
    read_be(&mut elem).map(|(v, _)| v)
}

/// Big-endian two's complement integer of 1 to 8 bytes.
pub fn read_int(mut elem: Element<'_>) -> Result<i64> {
    let (v, len) = read_be(&mut elem)?;
    let shift = 64 - 8 * len as u32;
    Ok(((v << shift) as i64) >> shift)
}

/// IEEE-754 float of 4 or 8 bytes.
pub fn read_float(mut elem: Element<'_>) -> Result<f64> {
    match elem.payload_len()? {
        4 => {
            let mut buf = [0u8; 4];
            elem.read_exact_payload(&mut buf)?;
            Ok(f32::from_be_bytes(buf).into())
        }
        8 => {
            let mut buf = [0u8; 8];
            elem.read_exact_payload(&mut buf)?;
            Ok(f64::from_be_bytes(buf))
        }
        len => Err(FormatError::FloatWidth(len).into()),
    }
}

pub fn read_bool(elem: Element<'_>) -> Result<bool> {
    Ok(read_uint(elem)? != 0)
}

/// Signed nanoseconds since 2001-01-01T00:00:00 UTC.
///
/// Payloads shorter than 8 bytes are sign extended like [read_int], so a
/// single `0xFF` byte is one nanosecond before the epoch.
pub fn read_date(elem: Element<'_>) -> Result<DateTime<Utc>> {
    let nanos = read_int(elem)?;
    let unix_nanos = EBML_EPOCH_UNIX_NANOS
        .checked_add(nanos)
        .ok_or(FormatError::DateOutOfRange)?;
    Ok(DateTime::from_timestamp_nanos(unix_nanos))
}

/// The raw payload.
///
/// Payloads larger than [crate::DecoderOptions::max_buffer_size] are rejected
/// before allocating.
pub fn read_bytes(mut elem: Element<'_>) -> Result<Vec<u8>> {
    let len = elem.payload_len()?;
    let max = elem.options().max_buffer_size;
    if len > max {
        return Err(FormatError::BufferTooLarge { size: len, max }.into());
    }
    let len = usize::try_from(len).map_err(|_| FormatError::BufferTooLarge { size: len, max })?;
    let mut buf = vec![0u8; len];
    elem.read_exact_payload(&mut buf)?;
    Ok(buf)
}

/// UTF-8 text.
pub fn read_string(elem: Element<'_>) -> Result<String> {
    let buf = read_bytes(elem)?;
    String::from_utf8(buf).map_err(|e| FormatError::InvalidUtf8(e).into())
}

impl FromElement for u64 {
    fn from_element(elem: Element<'_>) -> Result<Self> {
        read_uint(elem)
    }
}

impl FromElement for i64 {
    fn from_element(elem: Element<'_>) -> Result<Self> {
        read_int(elem)
    }
}

macro_rules! impl_narrow {
    ( $reader:ident => $( $t:ty ),* ) => {
        $(
            impl FromElement for $t {
                fn from_element(elem: Element<'_>) -> Result<Self> {
                    <$t>::try_from($reader(elem)?).map_err(|_| {
                        FormatError::IntegerOverflow {
                            target: stringify!($t),
                        }
                        .into()
                    })
                }
            }
        )*
    };
}

impl_narrow!(read_uint => u32, u16, u8);
impl_narrow!(read_int => i32, i16, i8);

impl FromElement for f64 {
    fn from_element(elem: Element<'_>) -> Result<Self> {
        read_float(elem)
    }
}

impl FromElement for f32 {
    fn from_element(elem: Element<'_>) -> Result<Self> {
        Ok(read_float(elem)? as f32)
    }
}

impl FromElement for bool {
    fn from_element(elem: Element<'_>) -> Result<Self> {
        read_bool(elem)
    }
}

impl FromElement for String {
    fn from_element(elem: Element<'_>) -> Result<Self> {
        read_string(elem)
    }
}

impl FromElement for Vec<u8> {
    fn from_element(elem: Element<'_>) -> Result<Self> {
        read_bytes(elem)
    }
}

impl FromElement for DateTime<Utc> {
    fn from_element(elem: Element<'_>) -> Result<Self> {
        read_date(elem)
    }
}

impl<T: FromElement> FromElement for Option<T> {
    fn from_element(elem: Element<'_>) -> Result<Self> {
        T::from_element(elem).map(Some)
    }
}
