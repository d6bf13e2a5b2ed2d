// Copyright 2022-2023 Andrew D. Straw.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT
// or http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use std::io::{Read, Seek};

use tracing::{trace, warn};

use crate::cursor::Element;
use crate::error::{FormatError, Result};
use crate::options::DecoderOptions;
use crate::schema::{shape_of, Schema, Shape};
use crate::source::{Seekable, Source, Streaming};

/// Decode the payload of `elem` as a `T`, consuming all of it.
pub(crate) fn decode_element<T: Schema>(mut elem: Element<'_>) -> Result<T> {
    let shape = shape_of::<T>()?;
    let mut value = T::default();
    let mut seen = vec![false; shape.fields().len()];
    decode_container(&shape, &mut value, &mut elem, 0, &[], &mut seen)?;

    if elem.options().require_mandatory_fields {
        for (field, seen) in shape.fields().iter().zip(seen) {
            if !seen && !field.is_optional() {
                return Err(FormatError::MissingField {
                    type_name: shape.type_name(),
                    field: field.name(),
                }
                .into());
            }
        }
    }
    Ok(value)
}

/// Read every child of `elem`.
///
/// At `depth` 0 `elem` is the container of `T` itself. Otherwise `elem` is a
/// wrapper element and only the fields in `within`, whose paths share the
/// first `depth` ids, can match.
fn decode_container<T: Schema>(
    shape: &Shape<T>,
    value: &mut T,
    elem: &mut Element<'_>,
    depth: usize,
    within: &[usize],
    seen: &mut [bool],
) -> Result<()> {
    while let Some((id, child)) = elem.next_with_empty()? {
        let empty = child.remaining() == Some(0);
        if empty {
            warn!("empty element 0x{id:X} at depth {}", child.depth());
        }
        let matched: Vec<usize> = if depth == 0 {
            shape.by_head(id).map(<[usize]>::to_vec).unwrap_or_default()
        } else {
            within
                .iter()
                .copied()
                .filter(|&idx| shape.path(idx)[depth] == id)
                .collect()
        };

        match matched[..] {
            [] => {
                trace!(
                    "skipping unknown element 0x{id:X} in {} at depth {}",
                    shape.type_name(),
                    child.depth()
                );
                child.skip()?;
            }
            // Paths never prefix one another, so a complete path is the only
            // match for its id.
            // An empty element counts as present but keeps the default.
            [idx] if shape.path(idx).len() == depth + 1 => {
                seen[idx] = true;
                if !empty {
                    shape.fields()[idx].decode(value, child)?;
                }
            }
            _ => {
                let mut wrapper = child;
                decode_container(shape, value, &mut wrapper, depth + 1, &matched, seen)?;
            }
        }
    }
    Ok(())
}

impl Element<'_> {
    /// Decode this element's payload into `T`.
    pub fn decode<T: Schema>(self) -> Result<T> {
        decode_element(self)
    }
}

/// Owns a byte source and decodes values from it.
///
/// ```
/// ebml_decode::ebml_schema! {
///     pub struct Header {
///         pub doc_type: String => scalar("4282"),
///     }
/// }
///
/// ebml_decode::ebml_schema! {
///     pub struct Doc {
///         pub header: Option<Header> => nested("1A45DFA3"),
///     }
/// }
///
/// let data = [0x1A, 0x45, 0xDF, 0xA3, 0x87, 0x42, 0x82, 0x84, b'w', b'e', b'b', b'm'];
/// let mut decoder = ebml_decode::Decoder::new(&data[..]);
/// let doc: Doc = decoder.decode()?;
/// assert_eq!(doc.header.unwrap().doc_type, "webm");
/// # Ok::<(), ebml_decode::Error>(())
/// ```
pub struct Decoder<S> {
    src: S,
    /// absolute end of the stream, if it was measured
    end: Option<u64>,
    opts: DecoderOptions,
}

impl<R: Read> Decoder<Streaming<R>> {
    /// Decode from a forward-only reader. Skipped elements are read and
    /// discarded.
    pub fn new(rdr: R) -> Self {
        Self::from_source(Streaming::new(rdr))
    }
}

impl<R: Read + Seek> Decoder<Seekable<R>> {
    /// Decode from a seekable reader, starting at its current position.
    ///
    /// The stream length is measured here and bounds the root element unless
    /// [DecoderOptions::track_stream_len] is switched off.
    pub fn new_seekable(rdr: R) -> Result<Self> {
        let mut src = Seekable::new(rdr);
        let len = src.remaining_len()?;
        let end = Some(src.position() + len);
        Ok(Self {
            src,
            end,
            opts: DecoderOptions::default(),
        })
    }
}

impl<S: Source> Decoder<S> {
    /// Decode from an existing [Source]. The root is read until the stream
    /// ends.
    pub fn from_source(src: S) -> Self {
        Self {
            src,
            end: None,
            opts: DecoderOptions::default(),
        }
    }

    pub fn with_options(mut self, opts: DecoderOptions) -> Self {
        self.opts = opts;
        self
    }

    pub fn options(&self) -> &DecoderOptions {
        &self.opts
    }

    /// The top level of the stream as an element whose children are the
    /// top-level elements.
    pub fn root(&mut self) -> Element<'_> {
        let end = if self.opts.track_stream_len {
            self.end
        } else {
            None
        };
        Element::root(&mut self.src, end, self.opts)
    }

    /// Decode the remainder of the stream into `T`.
    pub fn decode<T: Schema>(&mut self) -> Result<T> {
        self.root().decode()
    }

    pub fn into_source(self) -> S {
        self.src
    }
}

/// Decode a `T` from a forward-only reader with default options.
pub fn from_reader<T: Schema, R: Read>(rdr: R) -> Result<T> {
    Decoder::new(rdr).decode()
}

/// Decode a `T` from a seekable reader with default options.
pub fn from_seekable_reader<T: Schema, R: Read + Seek>(rdr: R) -> Result<T> {
    Decoder::new_seekable(rdr)?.decode()
}

/// Decode a `T` from a byte slice with default options.
pub fn from_slice<T: Schema>(buf: &[u8]) -> Result<T> {
    from_seekable_reader(std::io::Cursor::new(buf))
}
