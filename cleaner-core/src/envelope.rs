use crate::{CleanerError, Result};

/// Tag at offset 0 of saves that carry a header.
pub const MAGIC_AZP: &[u8; 4] = b"AZP\x01";

const HEADER_LEN_OFFSET: usize = 4;

/// A save split into its opaque header and the body that holds the streams.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Envelope<'a> {
    pub has_magic: bool,
    pub header: &'a [u8],
    pub body: &'a [u8],
}

impl<'a> Envelope<'a> {
    /// Saves without the magic tag are all body.
    pub fn split(raw: &'a [u8]) -> Result<Self> {
        if !raw.starts_with(MAGIC_AZP) {
            return Ok(Envelope {
                has_magic: false,
                header: &[],
                body: raw,
            });
        }

        let field = raw
            .get(HEADER_LEN_OFFSET..HEADER_LEN_OFFSET + 4)
            .ok_or_else(|| {
                CleanerError::Envelope(format!(
                    "file is {} bytes, too short to hold the header length",
                    raw.len()
                ))
            })?;
        let header_len = u32::from_le_bytes([field[0], field[1], field[2], field[3]]) as usize;

        if header_len > raw.len() {
            return Err(CleanerError::Envelope(format!(
                "header length {} exceeds file length {}",
                header_len,
                raw.len()
            )));
        }

        let (header, body) = raw.split_at(header_len);
        Ok(Envelope {
            has_magic: true,
            header,
            body,
        })
    }

    pub fn assemble(&self, body: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.header.len() + body.len());
        out.extend_from_slice(self.header);
        out.extend_from_slice(body);
        out
    }
}
