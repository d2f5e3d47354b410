//! Signature scanning for zlib streams embedded in a save body.
//!
//! Save bodies have no directory of stream offsets, so every `0x78 xx` pair
//! with a plausible FLG byte is a candidate. Most candidates are noise; a
//! candidate only becomes a [`Stream`] once it inflates to its end marker.

use flate2::{Decompress, FlushDecompress, Status};
use std::iter::FusedIterator;
use std::ops::Range;
use tracing::debug;

/// CMF byte: deflate with a 32K window.
pub const ZLIB_CMF: u8 = 0x78;

/// FLG bytes for the four compression levels zlib writes.
pub const ZLIB_FLG: [u8; 4] = [0x01, 0x5E, 0x9C, 0xDA];

const MIN_OUTPUT_CHUNK: usize = 4096;

/// One complete zlib stream found in a body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stream {
    pub start: usize,
    pub end: usize,
    pub decompressed: Vec<u8>,
}

impl Stream {
    /// Bytes a replacement must occupy.
    pub fn slot_len(&self) -> usize {
        self.end - self.start
    }

    pub fn range(&self) -> Range<usize> {
        self.start..self.end
    }
}

/// Outcome of trying to inflate from a candidate offset.
#[derive(Debug, PartialEq, Eq)]
pub enum Inflate {
    /// The stream reached its end marker after `consumed` input bytes.
    Complete { consumed: usize, payload: Vec<u8> },
    /// Input ran out before the end marker.
    Truncated,
    /// Not a valid stream at this offset.
    Rejected,
}

pub fn has_signature(window: &[u8]) -> bool {
    matches!(window, [ZLIB_CMF, flg, ..] if ZLIB_FLG.contains(flg))
}

/// Inflate one zlib stream from the front of `input`, ignoring whatever
/// follows it.
pub fn try_inflate(input: &[u8]) -> Inflate {
    let mut decoder = Decompress::new(true);
    let mut out: Vec<u8> = Vec::with_capacity(MIN_OUTPUT_CHUNK);

    loop {
        if out.len() == out.capacity() {
            out.reserve(out.capacity().max(MIN_OUTPUT_CHUNK));
        }

        let consumed = decoder.total_in() as usize;
        let produced = decoder.total_out();
        let status =
            match decoder.decompress_vec(&input[consumed..], &mut out, FlushDecompress::None) {
                Ok(status) => status,
                Err(_) => return Inflate::Rejected,
            };

        match status {
            Status::StreamEnd => {
                return Inflate::Complete {
                    consumed: decoder.total_in() as usize,
                    payload: out,
                };
            }
            Status::Ok | Status::BufError => {
                let stalled = decoder.total_in() as usize == consumed
                    && decoder.total_out() == produced
                    && out.len() < out.capacity();
                if stalled {
                    return Inflate::Truncated;
                }
            }
        }
    }
}

/// Greedy left-to-right scan over `body`.
///
/// After a stream is accepted the cursor jumps to its end, so bytes inside
/// an accepted stream are never examined again.
pub fn scan(body: &[u8]) -> StreamScanner<'_> {
    StreamScanner { body, cursor: 0 }
}

pub struct StreamScanner<'a> {
    body: &'a [u8],
    cursor: usize,
}

impl<'a> Iterator for StreamScanner<'a> {
    type Item = Stream;

    fn next(&mut self) -> Option<Stream> {
        while self.cursor + 2 < self.body.len() {
            let start = self.cursor;
            if has_signature(&self.body[start..]) {
                if let Inflate::Complete { consumed, payload } = try_inflate(&self.body[start..]) {
                    let end = start + consumed;
                    debug!(
                        start,
                        end,
                        decompressed = payload.len(),
                        "found zlib stream"
                    );
                    self.cursor = end;
                    return Some(Stream {
                        start,
                        end,
                        decompressed: payload,
                    });
                }
            }
            self.cursor += 1;
        }
        None
    }
}

impl FusedIterator for StreamScanner<'_> {}
