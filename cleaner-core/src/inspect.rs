use std::fmt::Write;

use crate::{has_flag_line, marker_region, scan, Envelope, Result};

/// Human-readable layout of a save: envelope split plus one line per stream.
pub fn describe_save(raw: &[u8]) -> Result<String> {
    let envelope = Envelope::split(raw)?;
    let mut out = String::new();

    let _ = writeln!(
        out,
        "file: {} bytes, magic: {}, header: {} bytes, body: {} bytes",
        raw.len(),
        if envelope.has_magic { "AZP" } else { "none" },
        envelope.header.len(),
        envelope.body.len()
    );

    let base = envelope.header.len();
    let mut count = 0usize;
    for (index, stream) in scan(envelope.body).enumerate() {
        count += 1;
        let region = marker_region(&stream.decompressed)
            .map(|r| format!("{} bytes", r.len()))
            .unwrap_or_else(|| "-".to_string());
        let _ = writeln!(
            out,
            "stream {:>3}: 0x{:08X}..0x{:08X} slot {:>7} -> {:>8} bytes, ConsoleInfo: {}, WasDC: {}",
            index,
            base + stream.start,
            base + stream.end,
            stream.slot_len(),
            stream.decompressed.len(),
            region,
            if has_flag_line(&stream.decompressed) { "yes" } else { "no" },
        );
    }
    let _ = writeln!(out, "streams: {count}");

    Ok(out)
}
