//! World registry.
//!
//! Worlds are sub-directories of the world root. The active one is whatever
//! the property file's `level-name` points at; [`WorldRegistry`] is the only
//! thing that writes it, and only ever for a directory that exists.
mod properties;

pub use properties::{LEVEL_NAME_KEY, PropertyFile, escape_value, lookup, unescape_value, upsert};

use crate::config::ServerConfig;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Component, MAIN_SEPARATOR_STR, Path, PathBuf};
use std::sync::Mutex;

/// World used when the property file names none
pub const DEFAULT_WORLD: &str = "default";

/// A world registered by a tenant
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorldRecord {
    pub display_name: String,
    pub folder_name: String,
}

impl WorldRecord {
    pub fn new(display_name: impl Into<String>, folder_name: impl Into<String>) -> Self {
        Self {
            display_name: display_name.into(),
            folder_name: folder_name.into(),
        }
    }
}

/// Whether `world` can name a single directory directly under the world root
pub fn is_valid_world_name(world: &str) -> bool {
    !world.is_empty()
        && world != "."
        && world != ".."
        && !world.contains(['/', '\\'])
        && !world.contains('\0')
}

/// Lists, validates and activates worlds.
///
/// # Example
///
/// ```no_run
/// use mc_steward::world::WorldRegistry;
///
/// let registry = WorldRegistry::new("/srv/mc/worlds", "worlds", "/srv/mc/server.properties");
/// for world in registry.list_available().unwrap() {
///     println!("{}", world);
/// }
/// registry.set_active("castle").unwrap();
/// assert_eq!(registry.get_active().unwrap(), "castle");
/// ```
pub struct WorldRegistry {
    world_root: PathBuf,
    level_prefix: Vec<String>,
    properties: PropertyFile,
    write_lock: Mutex<()>,
}

impl WorldRegistry {
    /// `world_root` is where worlds live on disk; `level_prefix` is the same
    /// directory as the server sees it from its working directory.
    pub fn new(
        world_root: impl Into<PathBuf>,
        level_prefix: impl AsRef<Path>,
        properties_path: impl Into<PathBuf>,
    ) -> Self {
        let level_prefix = level_prefix
            .as_ref()
            .components()
            .filter_map(|component| match component {
                Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
                _ => None,
            })
            .collect();

        Self {
            world_root: world_root.into(),
            level_prefix,
            properties: PropertyFile::new(properties_path),
            write_lock: Mutex::new(()),
        }
    }

    pub fn from_config(config: &ServerConfig) -> Self {
        Self::new(
            config.world_root_path(),
            &config.world_root,
            config.properties_path(),
        )
    }

    pub fn world_root(&self) -> &Path {
        &self.world_root
    }

    pub fn properties(&self) -> &PropertyFile {
        &self.properties
    }

    /// Folder names of every world directory present on disk
    pub fn list_available(&self) -> Result<BTreeSet<String>> {
        let entries = std::fs::read_dir(&self.world_root).map_err(|e| {
            Error::ConfigValidation(format!(
                "World root '{}' is not readable: {}",
                self.world_root.display(),
                e
            ))
        })?;

        Ok(entries
            .flatten()
            .filter(|entry| entry.file_type().is_ok_and(|ty| ty.is_dir()))
            .filter_map(|entry| entry.file_name().into_string().ok())
            .filter(|name| is_valid_world_name(name))
            .collect())
    }

    pub fn is_available(&self, world: &str) -> bool {
        is_valid_world_name(world) && self.world_root.join(world).is_dir()
    }

    /// `level-name` value for `world`, using the host's path separator
    pub fn level_name_for(&self, world: &str) -> String {
        let mut parts: Vec<&str> = self.level_prefix.iter().map(String::as_str).collect();
        parts.push(world);
        parts.join(MAIN_SEPARATOR_STR)
    }

    /// World folder named by a `level-name` value written with either separator
    pub fn world_from_level_name(&self, level_name: &str) -> String {
        let normalized = level_name.replace('\\', "/");
        let mut parts: Vec<&str> = normalized.split('/').filter(|p| !p.is_empty()).collect();
        let prefix_matches = parts.len() == self.level_prefix.len() + 1
            && parts.iter().zip(&self.level_prefix).all(|(a, b)| a == b);
        if prefix_matches {
            parts.pop().unwrap_or_default().to_string()
        } else {
            normalized
        }
    }

    /// Make `world` the active world.
    ///
    /// Fails with [`Error::InvalidWorld`] unless the directory exists; the
    /// property file is left untouched in that case.
    #[tracing::instrument(skip(self))]
    pub fn set_active(&self, world: &str) -> Result<String> {
        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| Error::Other("Failed to lock world registry".to_string()))?;

        if !self.is_available(world) {
            tracing::warn!("Rejecting unknown world");
            return Err(Error::InvalidWorld(world.to_string()));
        }

        self.properties
            .set(LEVEL_NAME_KEY, &self.level_name_for(world))?;
        tracing::info!("Active world updated");
        Ok(world.to_string())
    }

    /// The active world, writing the default back if the key is missing
    pub fn get_active(&self) -> Result<String> {
        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| Error::Other("Failed to lock world registry".to_string()))?;

        match self.properties.get(LEVEL_NAME_KEY)? {
            Some(level_name) => Ok(self.world_from_level_name(&level_name)),
            None => {
                tracing::info!(
                    path = %self.properties.path().display(),
                    "No level-name set, writing default"
                );
                self.properties
                    .set(LEVEL_NAME_KEY, &self.level_name_for(DEFAULT_WORLD))?;
                Ok(DEFAULT_WORLD.to_string())
            }
        }
    }
}
