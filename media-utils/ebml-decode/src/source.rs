// Copyright 2022-2023 Andrew D. Straw.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT
// or http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Buffered byte sources that count their read position.
//!
//! Two capability tiers exist. [Streaming] wraps any [Read] and can only skip
//! by discarding bytes. [Seekable] wraps a [Read] + [Seek] and seeks past
//! anything not already buffered.

use std::io::{self, BufRead, BufReader, Read, Seek, SeekFrom};

use crate::error::{Error, Result};

/// A buffered stream which tracks how many bytes have been consumed.
pub trait Source: BufRead {
    /// Number of bytes consumed since the source was created.
    fn position(&self) -> u64;

    /// Discard the next `n` bytes.
    fn skip_bytes(&mut self, n: u64) -> Result<()>;

    fn is_seekable(&self) -> bool;

    /// Fill `buf` completely, failing with [Error::Truncated] at end of
    /// stream.
    fn read_full(&mut self, buf: &mut [u8]) -> Result<()> {
        let mut got = 0;
        while got < buf.len() {
            match self.read(&mut buf[got..]) {
                Ok(0) => {
                    return Err(Error::Truncated {
                        expected: buf.len() as u64,
                        got: got as u64,
                    })
                }
                Ok(n) => got += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(Error::Io(e)),
            }
        }
        Ok(())
    }

    /// Discard everything up to the end of the stream, returning the count.
    fn drain(&mut self) -> Result<u64> {
        let mut count = 0;
        loop {
            let amt = self.fill_buf()?.len();
            if amt == 0 {
                return Ok(count);
            }
            self.consume(amt);
            count += amt as u64;
        }
    }
}

/// Discard exactly `n` bytes through the buffer.
fn discard<B: BufRead + ?Sized>(rdr: &mut B, n: u64) -> Result<()> {
    let mut left = n;
    while left > 0 {
        let available = rdr.fill_buf()?.len();
        if available == 0 {
            return Err(Error::Truncated {
                expected: n,
                got: n - left,
            });
        }
        let amt = usize::try_from(left).map_or(available, |left| left.min(available));
        rdr.consume(amt);
        left -= amt as u64;
    }
    Ok(())
}

/// A forward-only source. Skipping reads and drops bytes.
pub struct Streaming<R> {
    inner: BufReader<R>,
    position: u64,
}

impl<R: Read> Streaming<R> {
    pub fn new(rdr: R) -> Self {
        Self {
            inner: BufReader::new(rdr),
            position: 0,
        }
    }

    /// Return the wrapped reader. Data still buffered is lost.
    pub fn into_inner(self) -> R {
        self.inner.into_inner()
    }
}

impl<R: Read> Read for Streaming<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.position += n as u64;
        Ok(n)
    }
}

impl<R: Read> BufRead for Streaming<R> {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        self.inner.fill_buf()
    }
    fn consume(&mut self, amt: usize) {
        self.inner.consume(amt);
        self.position += amt as u64;
    }
}

impl<R: Read> Source for Streaming<R> {
    fn position(&self) -> u64 {
        self.position
    }
    fn skip_bytes(&mut self, n: u64) -> Result<()> {
        discard(self, n)
    }
    fn is_seekable(&self) -> bool {
        false
    }
}

/// A source supporting random access. Skips larger than the buffered data
/// become a relative seek.
///
/// A seek never goes past the end of the stream. The stream length is
/// measured on the first seek (or by [Seekable::remaining_len]) and a skip
/// beyond it fails with [Error::Truncated], as discarding would.
pub struct Seekable<R> {
    inner: BufReader<R>,
    position: u64,
    /// end of the stream in `position` coordinates, once measured
    end: Option<u64>,
}

impl<R: Read + Seek> Seekable<R> {
    pub fn new(rdr: R) -> Self {
        Self {
            inner: BufReader::new(rdr),
            position: 0,
            end: None,
        }
    }

    /// Number of bytes between the current position and the end of the
    /// stream.
    pub fn remaining_len(&mut self) -> io::Result<u64> {
        let here = self.inner.stream_position()?;
        let end = self.inner.seek(SeekFrom::End(0))?;
        self.inner.seek(SeekFrom::Start(here))?;
        let len = end.saturating_sub(here);
        self.end = Some(self.position + len);
        Ok(len)
    }

    fn stream_end(&mut self) -> io::Result<u64> {
        match self.end {
            Some(end) => Ok(end),
            None => Ok(self.position + self.remaining_len()?),
        }
    }

    /// Return the wrapped reader. Data still buffered is lost.
    pub fn into_inner(self) -> R {
        self.inner.into_inner()
    }
}

impl<R: Read> Read for Seekable<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.position += n as u64;
        Ok(n)
    }
}

impl<R: Read> BufRead for Seekable<R> {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        self.inner.fill_buf()
    }
    fn consume(&mut self, amt: usize) {
        self.inner.consume(amt);
        self.position += amt as u64;
    }
}

impl<R: Read + Seek> Source for Seekable<R> {
    fn position(&self) -> u64 {
        self.position
    }
    fn skip_bytes(&mut self, n: u64) -> Result<()> {
        let buffered = self.inner.buffer().len() as u64;
        if n <= buffered {
            return discard(self, n);
        }
        let available = self.stream_end()?.saturating_sub(self.position);
        if n > available {
            return Err(Error::Truncated {
                expected: n,
                got: available,
            });
        }
        let offset = i64::try_from(n)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "skip too large"))?;
        tracing::trace!("seeking {n} bytes past position {}", self.position);
        self.inner.seek_relative(offset)?;
        self.position += n;
        Ok(())
    }
    fn is_seekable(&self) -> bool {
        true
    }
}
