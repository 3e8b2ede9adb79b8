// ── Persisted JSON documents ──
//
// Small key-value documents (device identity, button map) stored as one
// pretty-printed JSON file each. Loading overlays the file's keys onto the
// serialized defaults, so keys added in later releases never break old
// files, and a corrupt file degrades to defaults with a warning.

use std::fs;
use std::io;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::error::StoreError;

/// One JSON document bound to a file on disk.
#[derive(Debug, Clone)]
pub struct JsonDocument<T> {
    path: PathBuf,
    _doc: PhantomData<fn() -> T>,
}

impl<T> JsonDocument<T>
where
    T: Serialize + DeserializeOwned + Default,
{
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            _doc: PhantomData,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the document, falling back to `T::default()` when the file is
    /// missing or unreadable.
    pub fn load(&self) -> T {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "no document on disk, using defaults");
                return T::default();
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "cannot read document, using defaults");
                return T::default();
            }
        };

        match self.merge(&raw) {
            Ok(doc) => doc,
            Err(reason) => {
                warn!(path = %self.path.display(), %reason, "malformed document, using defaults");
                T::default()
            }
        }
    }

    /// Write the document atomically: serialize to a sibling temp file,
    /// then rename it over the target.
    pub fn save(&self, doc: &T) -> Result<(), StoreError> {
        let json = serde_json::to_string_pretty(doc).map_err(|source| StoreError::Serialize {
            path: self.path.clone(),
            source,
        })?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| self.io_err(e))?;
        }

        let tmp = self.tmp_path();
        fs::write(&tmp, json.as_bytes()).map_err(|e| self.io_err(e))?;
        fs::rename(&tmp, &self.path).map_err(|e| {
            let _ = fs::remove_file(&tmp);
            self.io_err(e)
        })?;

        debug!(path = %self.path.display(), "document saved");
        Ok(())
    }

    /// Delete the file. Returns `Ok(false)` if there was nothing to delete.
    pub fn remove(&self) -> Result<bool, StoreError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(self.io_err(e)),
        }
    }

    // ── Helpers ──────────────────────────────────────────────────────

    fn merge(&self, raw: &str) -> Result<T, String> {
        let Value::Object(overlay) = serde_json::from_str::<Value>(raw).map_err(|e| e.to_string())?
        else {
            return Err("top-level value is not an object".into());
        };

        let mut base = match serde_json::to_value(T::default()) {
            Ok(Value::Object(map)) => map,
            Ok(_) | Err(_) => Map::new(),
        };
        for (key, value) in overlay {
            base.insert(key, value);
        }

        serde_json::from_value(Value::Object(base)).map_err(|e| e.to_string())
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(std::ffi::OsStr::to_os_string)
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    fn io_err(&self, source: io::Error) -> StoreError {
        StoreError::Io {
            path: self.path.clone(),
            source,
        }
    }
}
