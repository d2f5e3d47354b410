use flate2::{write::ZlibEncoder, Compression};
use std::borrow::Cow;
use std::io::Write;
use std::ops::Range;
use tracing::warn;

use crate::{Result, Template};

const START_MARKER: &[u8] = b"ConsoleInfo";
const END_MARKER: &[u8] = b"Console_end";
const FLAG_MARKER: &[u8] = b"WasDC";

/// Line ranges of `buf`, each including its `\n` when present.
fn line_spans(buf: &[u8]) -> impl Iterator<Item = Range<usize>> + '_ {
    let mut pos = 0;
    std::iter::from_fn(move || {
        if pos >= buf.len() {
            return None;
        }
        let start = pos;
        let end = buf[start..]
            .iter()
            .position(|&b| b == b'\n')
            .map_or(buf.len(), |n| start + n + 1);
        pos = end;
        Some(start..end)
    })
}

fn is_end_line(line: &[u8]) -> bool {
    line.starts_with(END_MARKER)
        && matches!(line.get(END_MARKER.len()), Some(b' ' | b'\t'))
        && line.ends_with(b"\n")
}

fn is_flag_line(line: &[u8]) -> bool {
    line.strip_prefix(FLAG_MARKER)
        .is_some_and(|rest| rest.iter().all(u8::is_ascii_whitespace))
}

/// Span from the first `ConsoleInfo` line through the newline of the first
/// `Console_end` line after it.
pub fn marker_region(payload: &[u8]) -> Option<Range<usize>> {
    let mut start = None;
    for span in line_spans(payload) {
        let line = &payload[span.clone()];
        match start {
            None if line.starts_with(START_MARKER) => start = Some(span.start),
            Some(region_start) if is_end_line(line) => return Some(region_start..span.end),
            _ => {}
        }
    }
    None
}

pub fn has_flag_line(payload: &[u8]) -> bool {
    line_spans(payload).any(|span| is_flag_line(&payload[span]))
}

/// The clean block held by an unmodified payload, if it has one.
pub fn capture(payload: &[u8]) -> Option<Template> {
    marker_region(payload).map(|region| Template::new(payload[region].to_vec()))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Applied<'a> {
    /// Borrowed unless an edit was made.
    pub payload: Cow<'a, [u8]>,
    pub flag_lines_removed: usize,
    pub region_replaced: bool,
}

impl Applied<'_> {
    pub fn changed(&self) -> bool {
        self.flag_lines_removed > 0 || self.region_replaced
    }
}

/// Drop every `WasDC` line, then swap the marker region for `template`.
///
/// A region that already equals the template is left alone, so a cleaned
/// payload comes back borrowed and unchanged.
pub fn apply<'a>(payload: &'a [u8], template: &Template) -> Applied<'a> {
    let mut edited = Cow::Borrowed(payload);

    let flag_lines_removed = line_spans(payload)
        .filter(|span| is_flag_line(&payload[span.clone()]))
        .count();
    if flag_lines_removed > 0 {
        let mut kept = Vec::with_capacity(payload.len());
        for span in line_spans(payload) {
            let line = &payload[span];
            if !is_flag_line(line) {
                kept.extend_from_slice(line);
            }
        }
        edited = Cow::Owned(kept);
    }

    let mut region_replaced = false;
    if let Some(region) = marker_region(&edited) {
        if edited[region.clone()] != *template.as_bytes() {
            let mut out = edited.into_owned();
            out.splice(region, template.as_bytes().iter().copied());
            edited = Cow::Owned(out);
            region_replaced = true;
        }
    }

    Applied {
        payload: edited,
        flag_lines_removed,
        region_replaced,
    }
}

/// Recompressed stream sized to its original slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Refit {
    pub bytes: Vec<u8>,
    pub compressed_len: usize,
}

impl Refit {
    pub fn truncated(&self) -> bool {
        self.compressed_len > self.bytes.len()
    }

    pub fn padding(&self) -> usize {
        self.bytes.len().saturating_sub(self.compressed_len)
    }
}

/// Compress `payload` and force the result to exactly `slot_len` bytes:
/// zero padding when it is shorter, truncation when it is longer.
pub fn refit(payload: &[u8], slot_len: usize) -> Result<Refit> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(payload)?;
    let mut bytes = encoder.finish()?;
    let compressed_len = bytes.len();

    if compressed_len > slot_len {
        // Lossy: the cut stream no longer decodes.
        warn!(
            compressed_len,
            slot_len,
            "recompressed stream does not fit its slot, truncating"
        );
        bytes.truncate(slot_len);
    } else {
        bytes.resize(slot_len, 0);
    }

    Ok(Refit {
        bytes,
        compressed_len,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{cheated_payload, clean_payload, inflate, zlib, CLEAN_BLOCK};

    fn clean_template() -> Template {
        Template::new(CLEAN_BLOCK.to_vec())
    }

    #[test]
    fn line_spans_keep_terminators() {
        let buf = b"a\nbc\n\nd";
        let lines: Vec<&[u8]> = line_spans(buf).map(|s| &buf[s]).collect();
        let expected: [&[u8]; 4] = [b"a\n", b"bc\n", b"\n", b"d"];
        assert_eq!(lines, expected);
    }

    #[test]
    fn capture_takes_exact_block() {
        let template = capture(&clean_payload()).unwrap();
        assert_eq!(template.as_bytes(), CLEAN_BLOCK);
    }

    #[test]
    fn capture_uses_first_block_only() {
        let mut payload = clean_payload();
        payload.extend_from_slice(b"ConsoleInfo  2 2 2 \nConsole_end  1 \n");
        assert_eq!(capture(&payload).unwrap().as_bytes(), CLEAN_BLOCK);
    }

    #[test]
    fn capture_needs_terminated_end_line() {
        assert!(capture(b"ConsoleInfo  0 0.4 0 \nConsole_end  6160").is_none());
        assert!(capture(b"ConsoleInfo  0 0.4 0 \nno end here\n").is_none());
        assert!(capture(b"Console_end  6160 \nConsoleInfo  0 \n").is_none());
    }

    #[test]
    fn capture_is_case_sensitive() {
        assert!(capture(b"consoleinfo  0 \nconsole_end  1 \n").is_none());
    }

    #[test]
    fn end_marker_needs_separator() {
        assert!(capture(b"ConsoleInfo 0\nConsole_endX 1\n").is_none());
        assert!(capture(b"ConsoleInfo 0\nConsole_end\t1\n").is_some());
    }

    #[test]
    fn flag_line_detection_is_line_anchored() {
        assert!(has_flag_line(b"a\nWasDC\nb\n"));
        assert!(has_flag_line(b"a\nWasDC \t\r\n"));
        assert!(has_flag_line(b"a\nWasDC"));
        assert!(!has_flag_line(b"a\n WasDC\n"));
        assert!(!has_flag_line(b"a\nWasDC 1\n"));
        assert!(!has_flag_line(b"a\nWasDCx\n"));
    }

    #[test]
    fn apply_cleans_cheated_payload() {
        let payload = cheated_payload();
        let applied = apply(&payload, &clean_template());

        assert!(applied.changed());
        assert_eq!(applied.flag_lines_removed, 1);
        assert!(applied.region_replaced);
        assert_eq!(
            &applied.payload[..],
            &b"Version 3\nPlayer Sergeant\n\
               ConsoleInfo  0 0.4 0 \nConsole_end  6160 \n\
               Money 999999\n"[..]
        );
    }

    #[test]
    fn apply_removes_every_flag_line() {
        let payload = b"WasDC\nkeep\nWasDC  \nkeep too\n";
        let applied = apply(payload, &clean_template());
        assert_eq!(applied.flag_lines_removed, 2);
        assert!(!applied.region_replaced);
        assert_eq!(&applied.payload[..], b"keep\nkeep too\n");
    }

    #[test]
    fn apply_replaces_region_with_unexpected_interior() {
        let payload = b"x\nConsoleInfo 5\nextra 1\nextra 2\n\nConsole_end  1 \ny\n";
        let applied = apply(payload, &clean_template());
        let mut expected = b"x\n".to_vec();
        expected.extend_from_slice(CLEAN_BLOCK);
        expected.extend_from_slice(b"y\n");
        assert_eq!(applied.payload.into_owned(), expected);
    }

    #[test]
    fn clean_payload_passes_through_borrowed() {
        let payload = clean_payload();
        let applied = apply(&payload, &clean_template());
        assert!(!applied.changed());
        assert!(matches!(applied.payload, Cow::Borrowed(_)));
        assert_eq!(&applied.payload[..], &payload[..]);
    }

    #[test]
    fn payload_without_markers_is_untouched() {
        let applied = apply(b"nothing to see\n", &clean_template());
        assert!(!applied.changed());
    }

    #[test]
    fn apply_is_idempotent() {
        let template = clean_template();
        let payload = cheated_payload();
        let once = apply(&payload, &template).payload.into_owned();
        let twice = apply(&once, &template);
        assert!(!twice.changed());
    }

    #[test]
    fn refit_pads_with_zeros() {
        let payload = clean_payload();
        let slot = 200;
        let fitted = refit(&payload, slot).unwrap();

        assert_eq!(fitted.bytes.len(), slot);
        assert!(!fitted.truncated());
        assert_eq!(fitted.padding(), slot - fitted.compressed_len);
        assert!(fitted.bytes[fitted.compressed_len..].iter().all(|&b| b == 0));
        assert_eq!(inflate(&fitted.bytes[..fitted.compressed_len]), payload);
    }

    #[test]
    fn refit_exact_fit_has_no_padding() {
        let payload = clean_payload();
        let natural = zlib(&payload).len();
        let fitted = refit(&payload, natural).unwrap();
        assert_eq!(fitted.bytes, zlib(&payload));
        assert_eq!(fitted.padding(), 0);
        assert!(!fitted.truncated());
    }

    #[test]
    fn refit_truncates_oversized_output() {
        let fitted = refit(&cheated_payload(), 6).unwrap();
        assert_eq!(fitted.bytes.len(), 6);
        assert!(fitted.truncated());
        assert_eq!(&fitted.bytes[..2], &[0x78, 0x9C]);
    }
}
