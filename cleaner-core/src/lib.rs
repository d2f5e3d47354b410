//! Cleaner for Brigade E5 save files.
//!
//! A save is an optional `AZP\x01` header followed by a body that holds zlib
//! streams at unknown offsets. Cleaning finds those streams by signature,
//! rewrites the `ConsoleInfo` block and drops the `WasDC` flag line, then
//! recompresses each edited stream into exactly the bytes it used to occupy.

use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

mod envelope;
mod inspect;
mod patch;
pub mod stream;
mod template;
mod transaction;

pub use envelope::{Envelope, MAGIC_AZP};
pub use inspect::describe_save;
pub use patch::{apply, capture, has_flag_line, marker_region, refit, Applied, Refit};
pub use stream::{scan, Stream, StreamScanner};
pub use template::{Template, TemplateStore, DEFAULT_TEMPLATE};
pub use transaction::{
    backup_path, capture_from_bytes, capture_from_file, is_save_file, patch_bytes, patch_file,
    patch_path, PatchReport, Patched, SAVE_EXTENSIONS,
};

#[derive(Debug, Error)]
pub enum CleanerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("directory walk error: {0}")]
    Walk(#[from] walkdir::Error),
    #[error("malformed save envelope: {0}")]
    Envelope(String),
    #[error("template error: {0}")]
    Template(String),
    #[error("template file is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, CleanerError>;

pub(crate) fn unix_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
