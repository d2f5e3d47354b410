use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::{apply, capture, refit, scan, unix_timestamp, Envelope, Result, Template};

/// Extensions the game writes saves with.
pub const SAVE_EXTENSIONS: [&str; 2] = ["nsv", "dat"];

/// A save rebuilt in memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Patched {
    pub bytes: Vec<u8>,
    pub streams: usize,
    pub modified: usize,
    pub truncated: usize,
}

impl Patched {
    pub fn changed(&self) -> bool {
        self.modified > 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchReport {
    pub path: PathBuf,
    pub streams: usize,
    pub modified: usize,
    pub truncated: usize,
    pub backup: Option<PathBuf>,
}

impl PatchReport {
    /// Whether the save on disk was overwritten.
    pub fn written(&self) -> bool {
        self.backup.is_some()
    }
}

/// Rebuild `raw` with every stream cleaned against `template`.
///
/// Edited streams are refitted into their original slot and everything else
/// is copied through, so the output always has the input's length.
pub fn patch_bytes(raw: &[u8], template: &Template) -> Result<Patched> {
    let envelope = Envelope::split(raw)?;
    let body = envelope.body;

    let mut new_body = Vec::with_capacity(body.len());
    let mut cursor = 0usize;
    let mut streams = 0usize;
    let mut modified = 0usize;
    let mut truncated = 0usize;

    for stream in scan(body) {
        streams += 1;
        new_body.extend_from_slice(&body[cursor..stream.start]);

        let applied = apply(&stream.decompressed, template);
        if applied.changed() {
            let fitted = refit(&applied.payload, stream.slot_len())?;
            debug!(
                start = stream.start,
                slot = stream.slot_len(),
                compressed = fitted.compressed_len,
                flag_lines_removed = applied.flag_lines_removed,
                region_replaced = applied.region_replaced,
                "patched stream"
            );
            if fitted.truncated() {
                truncated += 1;
            }
            modified += 1;
            new_body.extend_from_slice(&fitted.bytes);
        } else {
            new_body.extend_from_slice(&body[stream.range()]);
        }
        cursor = stream.end;
    }
    new_body.extend_from_slice(&body[cursor..]);

    Ok(Patched {
        bytes: envelope.assemble(&new_body),
        streams,
        modified,
        truncated,
    })
}

/// `<file name>.bak_<timestamp>` next to `path`.
pub fn backup_path(path: &Path, timestamp: u64) -> PathBuf {
    let mut name = path
        .file_name()
        .map(OsString::from)
        .unwrap_or_default();
    name.push(format!(".bak_{timestamp}"));
    path.with_file_name(name)
}

/// Clean one save in place. The original is copied to a backup first, and
/// nothing is written when no stream needed a change.
pub fn patch_file(path: &Path, template: &Template) -> Result<PatchReport> {
    let raw = fs::read(path)?;
    let patched = patch_bytes(&raw, template)?;

    let mut report = PatchReport {
        path: path.to_path_buf(),
        streams: patched.streams,
        modified: patched.modified,
        truncated: patched.truncated,
        backup: None,
    };

    if !patched.changed() {
        info!(path = %path.display(), streams = patched.streams, "no changes needed");
        return Ok(report);
    }

    let backup = backup_path(path, unix_timestamp());
    fs::copy(path, &backup)?;
    info!(backup = %backup.display(), "backed up original save");

    fs::write(path, &patched.bytes)?;
    info!(
        path = %path.display(),
        modified = patched.modified,
        truncated = patched.truncated,
        "patched save"
    );

    report.backup = Some(backup);
    Ok(report)
}

pub fn is_save_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| SAVE_EXTENSIONS.iter().any(|s| ext.eq_ignore_ascii_case(s)))
        .unwrap_or(false)
}

/// Patch a single save, or every save under a directory.
pub fn patch_path(path: &Path, template: &Template) -> Result<Vec<PatchReport>> {
    if !path.is_dir() {
        return Ok(vec![patch_file(path, template)?]);
    }

    // Backups written below must not be walked.
    let mut saves = Vec::new();
    for entry in WalkDir::new(path).sort_by_file_name() {
        let entry = entry?;
        if entry.file_type().is_file() && is_save_file(entry.path()) {
            saves.push(entry.into_path());
        }
    }

    saves
        .iter()
        .map(|save| patch_file(save, template))
        .collect()
}

/// First clean block found in any stream of `raw`.
pub fn capture_from_bytes(raw: &[u8]) -> Result<Option<Template>> {
    let envelope = Envelope::split(raw)?;
    Ok(scan(envelope.body).find_map(|stream| capture(&stream.decompressed)))
}

pub fn capture_from_file(path: &Path) -> Result<Option<Template>> {
    let raw = fs::read(path)?;
    let template = capture_from_bytes(&raw)?;
    match &template {
        Some(t) => info!(path = %path.display(), len = t.len(), "captured clean block"),
        None => info!(path = %path.display(), "no ConsoleInfo block found"),
    }
    Ok(template)
}
