//! # Inventory Persistence
//!
//! The only state that outlives a session is the entity's inventory. The
//! registry loads it on spawn and saves it on despawn through an
//! [`InventoryStore`].
//!
//! [`TomlInventoryStore`] keeps one file per entity:
//!
//! ```toml
//! selected = 0
//!
//! [[stacks]]
//! slot = 0
//! kind = "cobblestone"
//! count = 32
//! ```

use crate::error::PersistError;
use marionette_core::EntityId;
use marionette_world::{BlockKind, Inventory, ItemStack};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Loads and saves entity inventories.
pub trait InventoryStore: Send + Sync {
    /// Stored inventory, `None` if the entity has never been saved.
    ///
    /// # Errors
    ///
    /// Returns `PersistError` if stored data exists but cannot be read.
    fn load(&self, entity: EntityId) -> Result<Option<Inventory>, PersistError>;

    /// Stores an inventory, replacing any previous one.
    ///
    /// # Errors
    ///
    /// Returns `PersistError` if the inventory cannot be written.
    fn save(&self, entity: EntityId, inventory: &Inventory) -> Result<(), PersistError>;
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredStack {
    slot: usize,
    kind: BlockKind,
    count: u32,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoredInventory {
    #[serde(default)]
    selected: usize,
    #[serde(default)]
    stacks: Vec<StoredStack>,
}

impl From<&Inventory> for StoredInventory {
    fn from(inventory: &Inventory) -> Self {
        Self {
            selected: inventory.selected_slot(),
            stacks: inventory
                .stacks()
                .map(|(slot, stack)| StoredStack {
                    slot,
                    kind: stack.kind,
                    count: stack.count,
                })
                .collect(),
        }
    }
}

impl StoredInventory {
    fn into_inventory(self) -> Result<Inventory, String> {
        let mut inventory = Inventory::new();
        for stack in self.stacks {
            inventory
                .put(stack.slot, Some(ItemStack::new(stack.kind, stack.count)))
                .map_err(|e| e.to_string())?;
        }
        inventory.select(self.selected).map_err(|e| e.to_string())?;
        Ok(inventory)
    }
}

/// One TOML file per entity under a directory.
#[derive(Debug, Clone)]
pub struct TomlInventoryStore {
    dir: PathBuf,
}

impl TomlInventoryStore {
    /// Store rooted at `dir`; the directory is created on first save.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// File used for `entity`.
    #[must_use]
    pub fn path_for(&self, entity: EntityId) -> PathBuf {
        self.dir.join(format!("entity-{}.toml", entity.raw()))
    }
}

impl InventoryStore for TomlInventoryStore {
    fn load(&self, entity: EntityId) -> Result<Option<Inventory>, PersistError> {
        let path = self.path_for(entity);
        let contents = match fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(io_error(&path, &e)),
        };
        let decode = |reason: String| PersistError::Decode {
            path: path.display().to_string(),
            reason,
        };
        let stored: StoredInventory =
            toml::from_str(&contents).map_err(|e| decode(e.to_string()))?;
        stored.into_inventory().map(Some).map_err(decode)
    }

    fn save(&self, entity: EntityId, inventory: &Inventory) -> Result<(), PersistError> {
        let path = self.path_for(entity);
        let contents = toml::to_string_pretty(&StoredInventory::from(inventory))
            .map_err(|e| PersistError::Encode(e.to_string()))?;
        write_atomic(&path, &contents).map_err(|e| io_error(&path, &e))?;
        tracing::debug!(entity = %entity, path = %path.display(), "inventory_saved");
        Ok(())
    }
}

fn io_error(path: &Path, err: &io::Error) -> PersistError {
    PersistError::Io {
        path: path.display().to_string(),
        reason: err.to_string(),
    }
}

/// Writes through a sibling temp file so a crash never leaves half a file.
fn write_atomic(path: &Path, contents: &str) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)?;
    if let Err(err) = fs::rename(&tmp_path, path) {
        let _ = fs::remove_file(&tmp_path);
        return Err(err);
    }
    Ok(())
}
