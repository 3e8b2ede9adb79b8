// ── Joystick button mapping ──
//
// Logical actions resolve to a fixed set of physical keys. `enter_car` and
// `reset_car` share the same physical trigger, so setting either one sets
// both. Every mutation is written to disk before it becomes visible.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::StoreError;
use crate::store::JsonDocument;

pub const ENTER_RESET_BUTTON: &str = "enter_reset_button";

/// Logical action -> physical key.
const ACTIONS: &[(&str, &str)] = &[
    ("enter_car", ENTER_RESET_BUTTON),
    ("reset_car", ENTER_RESET_BUTTON),
];

/// Persisted physical key assignments (`joystick.json`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ButtonMapping {
    #[serde(default)]
    pub enter_reset_button: Option<u32>,
}

impl ButtonMapping {
    fn slot(&self, key: &str) -> Option<u32> {
        match key {
            ENTER_RESET_BUTTON => self.enter_reset_button,
            _ => None,
        }
    }

    fn slot_mut(&mut self, key: &str) -> Option<&mut Option<u32>> {
        match key {
            ENTER_RESET_BUTTON => Some(&mut self.enter_reset_button),
            _ => None,
        }
    }

    /// Physical key -> assigned button index.
    pub fn entries(&self) -> BTreeMap<String, Option<u32>> {
        BTreeMap::from([(ENTER_RESET_BUTTON.to_owned(), self.enter_reset_button)])
    }
}

/// Resolve a logical action to its physical key.
pub fn physical_key(action: &str) -> Option<&'static str> {
    ACTIONS
        .iter()
        .find(|(name, _)| *name == action)
        .map(|(_, key)| *key)
}

/// Button assignments backed by `joystick.json`.
#[derive(Debug)]
pub struct InputMapping {
    doc: JsonDocument<ButtonMapping>,
    current: Mutex<ButtonMapping>,
}

impl InputMapping {
    /// Open the mapping file, loading whatever is on disk.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let doc = JsonDocument::new(path);
        let current = Mutex::new(doc.load());
        Self { doc, current }
    }

    /// Recognized logical action names.
    pub fn actions() -> impl Iterator<Item = &'static str> {
        ACTIONS.iter().map(|(name, _)| *name)
    }

    /// Assign (or clear, with `None`) the button for `action`.
    ///
    /// Returns `Ok(false)` and leaves the mapping untouched when `action` is
    /// not recognized.
    pub fn set_button(&self, action: &str, button: Option<u32>) -> Result<bool, StoreError> {
        let Some(key) = physical_key(action) else {
            debug!(%action, "ignoring unknown joystick action");
            return Ok(false);
        };

        let mut current = self.lock();
        let mut next = current.clone();
        if let Some(slot) = next.slot_mut(key) {
            *slot = button;
        }
        self.doc.save(&next)?;
        *current = next;

        info!(%action, key, ?button, "joystick button updated");
        Ok(true)
    }

    pub fn get_button(&self, action: &str) -> Option<u32> {
        let key = physical_key(action)?;
        self.lock().slot(key)
    }

    /// Copy of the physical key assignments.
    pub fn get_all(&self) -> BTreeMap<String, Option<u32>> {
        self.lock().entries()
    }

    /// Re-read the file, discarding in-memory state.
    pub fn reload(&self) {
        *self.lock() = self.doc.load();
    }

    pub fn path(&self) -> &std::path::Path {
        self.doc.path()
    }

    fn lock(&self) -> MutexGuard<'_, ButtonMapping> {
        self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
