// Copyright 2022-2023 Andrew D. Straw.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT
// or http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use crate::error::{Error, FormatError, Result};
use crate::options::DecoderOptions;
use crate::source::Source;
use crate::vint::{self, VintKind};

/// A bounded view of one element's payload.
///
/// Children are opened with [Element::next]. A child mutably borrows its
/// parent, so the parent cannot advance while the child is alive. Whatever
/// the child leaves unread is skipped when the parent opens its next child.
///
/// Positions are absolute offsets into the underlying [Source], so a child
/// dropped in the middle of one of its own children is still skipped in
/// full.
pub struct Element<'a> {
    src: &'a mut dyn Source,
    opts: DecoderOptions,
    id: u64,
    /// absolute end of the payload, `None` for an unbounded root
    end: Option<u64>,
    size: Option<u64>,
    /// absolute end of the most recently opened child
    open_child_end: Option<u64>,
    depth: u32,
}

impl<'a> Element<'a> {
    pub(crate) fn root(src: &'a mut dyn Source, end: Option<u64>, opts: DecoderOptions) -> Self {
        let size = end.map(|end| end.saturating_sub(src.position()));
        Element {
            src,
            opts,
            id: 0,
            end,
            size,
            open_child_end: None,
            depth: 0,
        }
    }

    /// The element id, including its length marker. Zero for the root.
    #[inline]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Nesting depth. The root is at depth 0.
    #[inline]
    pub fn depth(&self) -> u32 {
        self.depth
    }

    #[inline]
    pub fn options(&self) -> &DecoderOptions {
        &self.opts
    }

    /// Absolute stream offset of the next unread byte.
    #[inline]
    pub fn position(&self) -> u64 {
        self.src.position()
    }

    /// Bytes of this element not yet consumed from the stream, or `None` for
    /// an unbounded root.
    pub fn remaining(&self) -> Option<u64> {
        self.end
            .map(|end| end.saturating_sub(self.src.position()))
    }

    /// Declared payload size, or `None` for an unbounded root.
    ///
    /// Any open child is skipped first.
    pub fn size(&mut self) -> Result<Option<u64>> {
        self.settle()?;
        Ok(self.size)
    }

    /// Open the next child element.
    ///
    /// Returns `Ok(None)` at the end of this element's payload, or at the
    /// clean end of the stream for an unbounded root. Elements declaring a
    /// size of zero are logged and passed over.
    pub fn next(&mut self) -> Result<Option<(u64, Element<'_>)>> {
        self.settle()?;
        loop {
            let Some((id, size)) = self.read_header()? else {
                return Ok(None);
            };
            if size == 0 {
                tracing::warn!("empty element 0x{id:X} at depth {}", self.depth + 1);
                continue;
            }
            return Ok(Some((id, self.open_child(id, size))));
        }
    }

    /// Like [Element::next], but empty children are returned too.
    pub(crate) fn next_with_empty(&mut self) -> Result<Option<(u64, Element<'_>)>> {
        self.settle()?;
        let Some((id, size)) = self.read_header()? else {
            return Ok(None);
        };
        Ok(Some((id, self.open_child(id, size))))
    }

    /// Read up to `buf.len()` payload bytes, clamped to what remains.
    ///
    /// Returns the count read. Fails with [Error::Truncated] if the stream
    /// ends first.
    pub fn read_into(&mut self, buf: &mut [u8]) -> Result<usize> {
        self.settle()?;
        let n = self.clamp(buf.len());
        self.src.read_full(&mut buf[..n])?;
        Ok(n)
    }

    /// Discard everything left in this element, including nested elements.
    pub fn skip(mut self) -> Result<()> {
        self.skip_remaining()
    }

    pub(crate) fn skip_remaining(&mut self) -> Result<()> {
        // Skipping to our own end also covers any open child.
        self.open_child_end = None;
        match self.remaining() {
            Some(0) => {}
            Some(n) => {
                tracing::trace!("skipping element 0x{:X}: {n} bytes", self.id);
                self.src.skip_bytes(n)?;
            }
            None => {
                self.src.drain()?;
            }
        }
        Ok(())
    }

    /// The full payload length for a primitive read.
    pub(crate) fn payload_len(&mut self) -> Result<u64> {
        self.settle()?;
        self.remaining()
            .ok_or_else(|| FormatError::Unbounded.into())
    }

    /// Fill `buf` from the payload. The caller checks the length first.
    pub(crate) fn read_exact_payload(&mut self, buf: &mut [u8]) -> Result<()> {
        self.src.read_full(buf)
    }

    fn clamp(&self, wanted: usize) -> usize {
        match self.remaining() {
            Some(remaining) => usize::try_from(remaining).map_or(wanted, |r| r.min(wanted)),
            None => wanted,
        }
    }

    fn open_child(&mut self, id: u64, size: u64) -> Element<'_> {
        let end = self.src.position() + size;
        self.open_child_end = Some(end);
        Element {
            src: &mut *self.src,
            opts: self.opts,
            id,
            end: Some(end),
            size: Some(size),
            open_child_end: None,
            depth: self.depth + 1,
        }
    }

    fn settle(&mut self) -> Result<()> {
        if let Some(child_end) = self.open_child_end.take() {
            let pos = self.src.position();
            if child_end > pos {
                self.src.skip_bytes(child_end - pos)?;
            }
        }
        Ok(())
    }

    fn read_header(&mut self) -> Result<Option<(u64, u64)>> {
        match self.remaining() {
            Some(0) => return Ok(None),
            Some(_) => {}
            None => {
                if self.src.fill_buf()?.is_empty() {
                    return Ok(None);
                }
            }
        }
        let (id, _) = self.read_vint(VintKind::Id)?;
        if id == 0 {
            return Err(FormatError::ZeroId.into());
        }
        let (size, _) = self.read_vint(VintKind::Size)?;
        if let Some(available) = self.remaining() {
            if size > available {
                if self.depth == 0 {
                    // The root is bounded by the stream length, not a
                    // declared size.
                    return Err(Error::Truncated {
                        expected: size,
                        got: available,
                    });
                }
                return Err(FormatError::SizeExceedsParent {
                    id,
                    size,
                    available,
                }
                .into());
            }
        }
        if self.depth >= self.opts.max_depth {
            return Err(FormatError::TooDeep {
                depth: self.depth + 1,
            }
            .into());
        }
        Ok(Some((id, size)))
    }

    fn read_vint(&mut self, kind: VintKind) -> Result<(u64, u8)> {
        let mut buf = [0u8; vint::MAX_VINT_WIDTH as usize];
        self.read_header_bytes(&mut buf[..1])?;
        let width = usize::from(vint::vint_width(buf[0])?);
        self.read_header_bytes(&mut buf[1..width])?;
        vint::decode_vint(&buf[..width], kind)
    }

    fn read_header_bytes(&mut self, buf: &mut [u8]) -> Result<()> {
        if let Some(remaining) = self.remaining() {
            let wanted = buf.len() as u64;
            if wanted > remaining {
                return Err(Error::Truncated {
                    expected: wanted,
                    got: remaining,
                });
            }
        }
        self.src.read_full(buf)
    }
}

impl std::io::Read for Element<'_> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.settle()?;
        let n = self.clamp(buf.len());
        if n == 0 {
            return Ok(0);
        }
        let got = self.src.read(&mut buf[..n])?;
        if got == 0 && self.end.is_some() {
            return Err(std::io::ErrorKind::UnexpectedEof.into());
        }
        Ok(got)
    }
}

impl std::fmt::Debug for Element<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Element")
            .field("id", &format_args!("0x{:X}", self.id))
            .field("size", &self.size)
            .field("remaining", &self.remaining())
            .field("depth", &self.depth)
            .finish()
    }
}

#[cfg(test)]
mod test {
    use std::collections::VecDeque;
    use std::io::Read;

    use super::*;
    use crate::source::{Seekable, Streaming};

    use test_log::test;

    /// Implements [std::io::Read] by handing out at most `chunk` bytes per
    /// call.
    struct SplitReader {
        bufs: VecDeque<Vec<u8>>,
    }

    impl SplitReader {
        fn new(buf: &[u8], chunk: usize) -> Self {
            Self {
                bufs: buf.chunks(chunk).map(|c| c.to_vec()).collect(),
            }
        }
    }

    impl std::io::Read for SplitReader {
        fn read(&mut self, outbuf: &mut [u8]) -> std::io::Result<usize> {
            if let Some(inbuf) = self.bufs.pop_front() {
                let sz = inbuf.len().min(outbuf.len());
                outbuf[..sz].copy_from_slice(&inbuf[..sz]);
                if sz < inbuf.len() {
                    self.bufs.push_front(inbuf[sz..].to_vec());
                }
                Ok(sz)
            } else {
                Ok(0)
            }
        }
    }

    // 0xA0 { 0xA1 [1 2 3], 0xA2 { 0xA3 [9] } }, 0xA4 [7]
    const NESTED: &[u8] = &[
        0xA0, 0x88, 0xA1, 0x83, 1, 2, 3, 0xA2, 0x83, 0xA3, 0x81, 9, 0xA4, 0x81, 7,
    ];

    fn root_of(src: &mut dyn Source) -> Element<'_> {
        Element::root(src, None, DecoderOptions::default())
    }

    #[test]
    fn iterate_siblings_and_children() -> Result<()> {
        let mut src = Streaming::new(NESTED);
        let mut root = root_of(&mut src);

        let (id, mut outer) = root.next()?.unwrap();
        assert_eq!(id, 0xA0);
        assert_eq!(outer.size()?, Some(8));

        let (id, mut a1) = outer.next()?.unwrap();
        assert_eq!(id, 0xA1);
        let mut buf = [0u8; 8];
        assert_eq!(a1.read_into(&mut buf)?, 3);
        assert_eq!(&buf[..3], &[1, 2, 3]);
        assert_eq!(a1.remaining(), Some(0));

        let (id, mut a2) = outer.next()?.unwrap();
        assert_eq!(id, 0xA2);
        let (id, a3) = a2.next()?.unwrap();
        assert_eq!(id, 0xA3);
        assert_eq!(a3.depth(), 3);
        assert!(outer.next()?.is_none());

        let (id, mut a4) = root.next()?.unwrap();
        assert_eq!(id, 0xA4);
        assert_eq!(a4.read_into(&mut buf)?, 1);
        assert_eq!(buf[0], 7);
        assert!(root.next()?.is_none());
        Ok(())
    }

    #[test]
    fn unread_children_are_skipped() -> Result<()> {
        for chunk in 1..NESTED.len() {
            let mut src = Streaming::new(SplitReader::new(NESTED, chunk));
            let mut root = root_of(&mut src);
            {
                let (_, mut outer) = root.next()?.unwrap();
                let (_, mut a1) = outer.next()?.unwrap();
                let mut one = [0u8; 1];
                a1.read_into(&mut one)?;
                // `a1` and `outer` are dropped with bytes left unread.
            }
            let (id, mut a4) = root.next()?.unwrap();
            assert_eq!(id, 0xA4);
            let mut buf = [0u8; 1];
            a4.read_into(&mut buf)?;
            assert_eq!(buf[0], 7);
        }
        Ok(())
    }

    #[test]
    fn skip_drains_to_zero_on_both_tiers() -> Result<()> {
        // 16 KiB payload, larger than the read buffer so the seekable source
        // seeks while the streaming one discards.
        let mut big = vec![0xA0, 0x20, 0x40, 0x00];
        big.extend_from_slice(&vec![0x55; 0x4000]);
        big.extend_from_slice(&[0xA4, 0x81, 7]);

        let mut streaming = Streaming::new(SplitReader::new(&big, 7));
        let mut seekable = Seekable::new(std::io::Cursor::new(big.clone()));
        let sources: [&mut dyn Source; 2] = [&mut streaming, &mut seekable];
        for src in sources {
            let mut root = root_of(src);
            let (_, mut child) = root.next()?.unwrap();
            assert_eq!(child.remaining(), Some(0x4000));
            child.skip_remaining()?;
            assert_eq!(child.remaining(), Some(0));
            assert_eq!(root.position(), 4 + 0x4000);
            let (id, _) = root.next()?.unwrap();
            assert_eq!(id, 0xA4);
        }
        Ok(())
    }

    #[test]
    fn empty_elements_are_passed_over() -> Result<()> {
        let data = [0xA1, 0x80, 0xA2, 0x81, 5];
        let mut src = Streaming::new(&data[..]);
        let mut root = root_of(&mut src);
        let (id, _) = root.next()?.unwrap();
        assert_eq!(id, 0xA2);
        assert!(root.next()?.is_none());
        Ok(())
    }

    #[test]
    fn nesting_limit() -> Result<()> {
        let opts = DecoderOptions {
            max_depth: 2,
            ..Default::default()
        };
        let mut src = Streaming::new(NESTED);
        let mut root = Element::root(&mut src, None, opts);
        let (_, mut outer) = root.next()?.unwrap();
        // depth 2 is allowed
        let (_, a1) = outer.next()?.unwrap();
        a1.skip()?;
        let (_, mut a2) = outer.next()?.unwrap();
        assert!(matches!(
            a2.next(),
            Err(Error::Format(FormatError::TooDeep { depth: 3 }))
        ));
        Ok(())
    }

    #[test]
    fn empty_children_on_request() -> Result<()> {
        let data = [0xA1, 0x80, 0xA2, 0x81, 5];
        let mut src = Streaming::new(&data[..]);
        let mut root = root_of(&mut src);
        let (id, empty) = root.next_with_empty()?.unwrap();
        assert_eq!(id, 0xA1);
        assert_eq!(empty.remaining(), Some(0));
        let (id, _) = root.next_with_empty()?.unwrap();
        assert_eq!(id, 0xA2);
        assert!(root.next_with_empty()?.is_none());
        Ok(())
    }

    #[test]
    fn child_larger_than_parent_is_rejected() {
        // parent holds 3 bytes, child claims 5
        let data = [0xA0, 0x83, 0xA1, 0x85, 0];
        let mut src = Streaming::new(&data[..]);
        let mut root = root_of(&mut src);
        let (_, mut outer) = root.next().unwrap().unwrap();
        let err = outer.next().unwrap_err();
        assert!(matches!(
            err,
            Error::Format(FormatError::SizeExceedsParent {
                id: 0xA1,
                size: 5,
                available: 1
            })
        ));
    }

    #[test]
    fn truncated_payload() {
        // declares 10 bytes, only 5 follow
        let data = [0xA1, 0x8A, 1, 2, 3, 4, 5];
        let mut src = Streaming::new(&data[..]);
        let mut root = root_of(&mut src);
        let (_, mut child) = root.next().unwrap().unwrap();
        let mut buf = [0u8; 10];
        assert!(matches!(
            child.read_into(&mut buf),
            Err(Error::Truncated {
                expected: 10,
                got: 5
            })
        ));
    }

    #[test]
    fn header_cut_short_is_truncated() {
        let data = [0x1A, 0x45];
        let mut src = Streaming::new(&data[..]);
        let mut root = root_of(&mut src);
        assert!(matches!(root.next(), Err(Error::Truncated { .. })));
    }

    #[test]
    fn header_overrunning_parent_is_truncated() {
        // the parent holds a single byte, which starts a two byte id
        let data = [0xA0, 0x81, 0x42, 0x86];
        let mut src = Streaming::new(&data[..]);
        let mut root = root_of(&mut src);
        let (_, mut outer) = root.next().unwrap().unwrap();
        assert!(matches!(
            outer.next(),
            Err(Error::Truncated {
                expected: 1,
                got: 0
            })
        ));
    }

    #[test]
    fn invalid_marker_is_format_error() {
        let data = [0x00, 0x81, 0x00];
        let mut src = Streaming::new(&data[..]);
        let mut root = root_of(&mut src);
        assert!(matches!(
            root.next(),
            Err(Error::Format(FormatError::InvalidVintMarker(0)))
        ));
    }

    #[test]
    fn io_read_stops_at_element_end() -> Result<()> {
        let mut src = Streaming::new(NESTED);
        let mut root = root_of(&mut src);
        let (_, mut outer) = root.next()?.unwrap();
        let (_, mut a1) = outer.next()?.unwrap();
        let mut payload = Vec::new();
        a1.read_to_end(&mut payload)?;
        assert_eq!(payload, vec![1, 2, 3]);
        Ok(())
    }

    #[test]
    fn bounded_root() -> Result<()> {
        let mut src = Seekable::new(std::io::Cursor::new(NESTED.to_vec()));
        let len = src.remaining_len()?;
        let mut root = Element::root(&mut src, Some(len), DecoderOptions::default());
        assert_eq!(root.size()?, Some(NESTED.len() as u64));
        root.next()?.unwrap().1.skip()?;
        root.next()?.unwrap();
        assert!(root.next()?.is_none());
        assert_eq!(root.remaining(), Some(0));
        Ok(())
    }

    #[test]
    fn child_overrunning_bounded_root_is_truncated() -> Result<()> {
        let data = [0xA1, 0x8A, 1, 2, 3, 4, 5];
        let mut src = Seekable::new(std::io::Cursor::new(data.to_vec()));
        let len = src.remaining_len()?;
        let mut root = Element::root(&mut src, Some(len), DecoderOptions::default());
        assert!(matches!(
            root.next(),
            Err(Error::Truncated {
                expected: 10,
                got: 5
            })
        ));
        Ok(())
    }
}
