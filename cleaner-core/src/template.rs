use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use tracing::{info, warn};

use crate::{capture, unix_timestamp, CleanerError, Result};

/// Clean block written by an unmodified game, used until a capture replaces it.
pub const DEFAULT_TEMPLATE: &[u8] = b"ConsoleInfo  0 0.4 0 \nConsole_end  6160 \n";

/// Last-known-clean bytes for the `ConsoleInfo` .. `Console_end` region.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    block: Vec<u8>,
}

impl Template {
    pub fn new(block: Vec<u8>) -> Self {
        Self { block }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.block
    }

    pub fn len(&self) -> usize {
        self.block.len()
    }

    pub fn is_empty(&self) -> bool {
        self.block.is_empty()
    }
}

impl Default for Template {
    fn default() -> Self {
        Self::new(DEFAULT_TEMPLATE.to_vec())
    }
}

/// Sidecar record that lets a captured template outlive the process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateStore {
    pub block: Vec<u8>,
    /// File name of the save the block was captured from.
    pub source: Option<String>,
    pub captured_at: u64,
}

impl TemplateStore {
    pub fn new(template: &Template, source: Option<&Path>) -> Self {
        Self {
            block: template.as_bytes().to_vec(),
            source: source
                .and_then(Path::file_name)
                .map(|name| name.to_string_lossy().into_owned()),
            captured_at: unix_timestamp(),
        }
    }

    /// A stored block must still read as a single marker region.
    pub fn template(&self) -> Result<Template> {
        match capture(&self.block) {
            Some(template) if template.len() == self.block.len() => Ok(template),
            _ => Err(CleanerError::Template(
                "stored block is not a ConsoleInfo .. Console_end region".to_string(),
            )),
        }
    }

    /// `Ok(None)` when nothing has been captured yet.
    pub fn load(path: &Path) -> Result<Option<Self>> {
        let data = match fs::read_to_string(path) {
            Ok(data) => data,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        let store: TemplateStore = serde_json::from_str(&data)?;
        Ok(Some(store))
    }

    pub fn load_or_default(path: &Path) -> Result<Template> {
        match Self::load(path)? {
            Some(store) => {
                let template = store.template()?;
                info!(
                    path = %path.display(),
                    source = store.source.as_deref().unwrap_or("unknown"),
                    "using captured template"
                );
                Ok(template)
            }
            None => {
                warn!(
                    path = %path.display(),
                    "no captured template, using the built-in clean block"
                );
                Ok(Template::default())
            }
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let data = serde_json::to_string_pretty(self)?;
        fs::write(path, data)?;
        Ok(())
    }
}
