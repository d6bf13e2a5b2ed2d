// Copyright 2022-2023 Andrew D. Straw.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT
// or http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Decoder for EBML, the binary container format underlying Matroska and
//! WebM.
//!
//! Target structures are declared with [ebml_schema!], which maps element
//! ids (or `>` separated id paths through wrapper elements) to fields.
//! Elements whose ids are not mapped are skipped. For containers too large
//! to hold in memory, iterate them directly with [Element::next] and decode
//! only the children of interest with [Element::decode].

pub use cursor::Element;
pub use de::{from_reader, from_seekable_reader, from_slice, Decoder};
pub use error::{Error, FormatError, Result};
pub use options::{DecoderOptions, DEFAULT_MAX_BUFFER_SIZE, DEFAULT_MAX_DEPTH};
pub use primitive::FromElement;
pub use schema::{shape_of, FieldKind, FieldSpec, Schema, Shape};
pub use source::{Seekable, Source, Streaming};

mod cursor;
mod de;
mod error;
mod options;
pub mod primitive;
mod schema;
mod source;
pub mod vint;
