#![allow(dead_code)]

use std::collections::VecDeque;

/// Encode `size` as a size vint of the smallest possible width.
pub fn size_vint(size: u64) -> Vec<u8> {
    let width = (1..=8u32)
        .find(|w| size < (1u64 << (7 * w)) - 1)
        .expect("size too large");
    let marked = size | (1u64 << (7 * width));
    marked.to_be_bytes()[8 - width as usize..].to_vec()
}

/// Encode an element. `id` is written with its marker bits as given.
pub fn element(id: u64, payload: &[u8]) -> Vec<u8> {
    let id_len = ebml_decode::vint::id_width(id).expect("invalid id") as usize;
    let mut out = id.to_be_bytes()[8 - id_len..].to_vec();
    out.extend(size_vint(payload.len() as u64));
    out.extend_from_slice(payload);
    out
}

pub fn master(id: u64, children: &[Vec<u8>]) -> Vec<u8> {
    element(id, &children.concat())
}

pub fn uint(id: u64, value: u64) -> Vec<u8> {
    let bytes = value.to_be_bytes();
    let skip = (value.leading_zeros() / 8).min(7) as usize;
    element(id, &bytes[skip..])
}

pub fn float(id: u64, value: f64) -> Vec<u8> {
    element(id, &value.to_be_bytes())
}

pub fn string(id: u64, value: &str) -> Vec<u8> {
    element(id, value.as_bytes())
}

/// Implements [std::io::Read] by handing out at most `chunk` bytes per call.
pub struct SplitReader {
    bufs: VecDeque<Vec<u8>>,
}

impl SplitReader {
    pub fn new(buf: &[u8], chunk: usize) -> Self {
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
