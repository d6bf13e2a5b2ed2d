// Copyright 2022-2023 Andrew D. Straw.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT
// or http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use serde::{Deserialize, Serialize};

/// The default value for [DecoderOptions::max_buffer_size] (1 MiB).
pub const DEFAULT_MAX_BUFFER_SIZE: u64 = 1 << 20;

/// The default value for [DecoderOptions::max_depth].
pub const DEFAULT_MAX_DEPTH: u32 = 256;

fn default_max_buffer_size() -> u64 {
    DEFAULT_MAX_BUFFER_SIZE
}

fn default_max_depth() -> u32 {
    DEFAULT_MAX_DEPTH
}

fn default_true() -> bool {
    true
}

/// Settings which control how strictly a stream is decoded.
///
/// These can be embedded into a larger TOML or JSON configuration. Missing
/// keys take their default values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DecoderOptions {
    /// Largest string or binary payload which will be allocated, in bytes.
    ///
    /// Larger declared sizes are rejected before any allocation happens.
    /// Defaults to [DEFAULT_MAX_BUFFER_SIZE].
    #[serde(default = "default_max_buffer_size")]
    pub max_buffer_size: u64,
    /// Deepest element nesting accepted. Top-level elements are at depth 1.
    ///
    /// Decoding recurses once per level, so this bounds stack use for
    /// self-referential structures. Defaults to [DEFAULT_MAX_DEPTH].
    #[serde(default = "default_max_depth")]
    pub max_depth: u32,
    /// Fail when a field not marked optional never appears in its container.
    ///
    /// Real files frequently omit elements which are nominally mandatory, so
    /// this is off by default.
    #[serde(default)]
    pub require_mandatory_fields: bool,
    /// For seekable sources, bound the root element by the measured stream
    /// length. When false the root is read until the stream ends.
    #[serde(default = "default_true")]
    pub track_stream_len: bool,
}

impl Default for DecoderOptions {
    fn default() -> Self {
        Self {
            max_buffer_size: default_max_buffer_size(),
            max_depth: default_max_depth(),
            require_mandatory_fields: false,
            track_stream_len: default_true(),
        }
    }
}
