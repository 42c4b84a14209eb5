//! File-backed tag registry.
//!
//! Tags are stored as a TOML array of tables:
//!
//! ```toml
//! [[tags]]
//! id = "T1"
//! name = "Kitchen"
//! interactive = true
//! ```
//!
//! The whole file is read on open and rewritten on every change.  Writes go
//! to a temporary sibling first and are renamed into place, so a crash never
//! leaves a half-written registry behind.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use serde::{Deserialize, Serialize};
use tagwake_core::Identity;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::application::manage_tags::TagRegistry;

/// Error type for registry operations.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("I/O error accessing tag registry at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse tag registry: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to serialize tag registry: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// A tag with this id is already registered.
    #[error("tag exists for {0}")]
    Duplicate(String),

    #[error("invalid tag: {0}")]
    InvalidTag(String),
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct TagFile {
    #[serde(default)]
    tags: Vec<Identity>,
}

/// [`TagRegistry`] persisted to a TOML file.
pub struct FileTagRegistry {
    path: PathBuf,
    tags: RwLock<HashMap<String, Identity>>,
}

impl FileTagRegistry {
    /// Loads the registry at `path`.  A missing file is an empty registry.
    ///
    /// Entries with an empty id are skipped; for repeated ids the first entry
    /// wins.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Io`] or [`RegistryError::Parse`].
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, RegistryError> {
        let path = path.into();
        let file = match std::fs::read_to_string(&path) {
            Ok(content) => toml::from_str::<TagFile>(&content)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no tag registry yet");
                TagFile::default()
            }
            Err(source) => return Err(RegistryError::Io { path, source }),
        };

        let mut tags = HashMap::with_capacity(file.tags.len());
        for tag in file.tags {
            if tag.id().trim().is_empty() {
                warn!(tag = %tag, "skipping registry entry without id");
                continue;
            }
            if tags.contains_key(tag.id()) {
                warn!(tag = %tag, "skipping duplicate registry entry");
                continue;
            }
            tags.insert(tag.id().to_string(), tag);
        }
        info!(path = %path.display(), tags = tags.len(), "tag registry loaded");

        Ok(Self {
            path,
            tags: RwLock::new(tags),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Registers a new tag and writes the file.
    ///
    /// # Errors
    ///
    /// - [`RegistryError::InvalidTag`] for an empty id or name.
    /// - [`RegistryError::Duplicate`] if the id is already registered.
    /// - [`RegistryError::Io`] / [`RegistryError::Serialize`] if the write fails;
    ///   the registry is left unchanged.
    pub fn create_tag(&self, id: &str, name: &str, interactive: bool) -> Result<Identity, RegistryError> {
        if id.trim().is_empty() {
            return Err(RegistryError::InvalidTag("id is empty".to_string()));
        }
        if name.trim().is_empty() {
            return Err(RegistryError::InvalidTag(format!("name for {id} is empty")));
        }
        let tag = Identity::new(id, name, interactive);
        self.persist_tag(tag.clone())?;
        Ok(tag)
    }

    /// Stores an already built identity and writes the file.
    ///
    /// # Errors
    ///
    /// Same as [`FileTagRegistry::create_tag`].
    pub fn persist_tag(&self, tag: Identity) -> Result<(), RegistryError> {
        let mut tags = self.tags.write().expect("lock poisoned");
        if tags.contains_key(tag.id()) {
            return Err(RegistryError::Duplicate(tag.id().to_string()));
        }

        let id = tag.id().to_string();
        tags.insert(id.clone(), tag);
        if let Err(e) = self.save(&tags) {
            tags.remove(&id);
            return Err(e);
        }
        info!(id = %id, "tag registered");
        Ok(())
    }

    fn save(&self, tags: &HashMap<String, Identity>) -> Result<(), RegistryError> {
        let mut sorted: Vec<Identity> = tags.values().cloned().collect();
        sorted.sort_by(|a, b| a.id().cmp(b.id()));
        let content = toml::to_string_pretty(&TagFile { tags: sorted })?;

        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir).map_err(|source| RegistryError::Io {
                path: dir.to_path_buf(),
                source,
            })?;
        }
        let tmp = self.path.with_extension("toml.tmp");
        std::fs::write(&tmp, content).map_err(|source| RegistryError::Io {
            path: tmp.clone(),
            source,
        })?;
        std::fs::rename(&tmp, &self.path).map_err(|source| RegistryError::Io {
            path: self.path.clone(),
            source,
        })
    }
}

impl TagRegistry for FileTagRegistry {
    fn get_tag(&self, id: &str) -> Option<Identity> {
        self.tags.read().expect("lock poisoned").get(id).cloned()
    }

    fn list_tags(&self) -> Vec<Identity> {
        let mut tags: Vec<Identity> = self.tags.read().expect("lock poisoned").values().cloned().collect();
        tags.sort_by(|a, b| a.display_name().cmp(b.display_name()));
        tags
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn temp_path() -> (PathBuf, PathBuf) {
        let dir = std::env::temp_dir().join(format!("tagwake_registry_{}", Uuid::new_v4()));
        let path = dir.join("tags.toml");
        (dir, path)
    }

    #[test]
    fn test_open_missing_file_is_empty() {
        let (_dir, path) = temp_path();

        let registry = FileTagRegistry::open(&path).unwrap();

        assert!(registry.list_tags().is_empty());
        assert_eq!(registry.path(), path.as_path());
    }

    #[test]
    fn test_create_tag_persists_across_reopen() {
        // Arrange
        let (dir, path) = temp_path();
        let registry = FileTagRegistry::open(&path).unwrap();

        // Act
        registry.create_tag("T1", "Kitchen", true).unwrap();
        let reopened = FileTagRegistry::open(&path).unwrap();

        // Assert
        let tag = reopened.get_tag("T1").unwrap();
        assert_eq!(tag.display_name(), "Kitchen");
        assert!(tag.is_interactive());

        // Cleanup
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_create_duplicate_tag_is_rejected() {
        // Arrange
        let (dir, path) = temp_path();
        let registry = FileTagRegistry::open(&path).unwrap();
        registry.create_tag("T1", "Kitchen", true).unwrap();

        // Act
        let result = registry.create_tag("T1", "Hallway", false);

        // Assert
        assert!(matches!(result, Err(RegistryError::Duplicate(id)) if id == "T1"));
        assert_eq!(registry.get_tag("T1").unwrap().display_name(), "Kitchen");

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_list_tags_sorted_by_name() {
        let (dir, path) = temp_path();
        let registry = FileTagRegistry::open(&path).unwrap();
        registry.create_tag("T1", "Porch", true).unwrap();
        registry.create_tag("T2", "Kitchen", true).unwrap();

        let names: Vec<String> = registry
            .list_tags()
            .iter()
            .map(|t| t.display_name().to_string())
            .collect();

        assert_eq!(names, vec!["Kitchen", "Porch"]);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_create_tag_rejects_empty_id() {
        let (_dir, path) = temp_path();
        let registry = FileTagRegistry::open(&path).unwrap();

        assert!(matches!(registry.create_tag(" ", "Nameless", true), Err(RegistryError::InvalidTag(_))));
    }

    #[test]
    fn test_open_skips_entries_without_id_and_duplicates() {
        // Arrange
        let (dir, path) = temp_path();
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(
            &path,
            r#"
[[tags]]
id = "T1"
name = "Kitchen"
interactive = true

[[tags]]
id = ""
name = "Broken"

[[tags]]
id = "T1"
name = "Shadow"
"#,
        )
        .unwrap();

        // Act
        let registry = FileTagRegistry::open(&path).unwrap();

        // Assert
        let tags = registry.list_tags();
        assert_eq!(tags.len(), 1);
        assert_eq!(tags[0].display_name(), "Kitchen");

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_open_malformed_file_is_parse_error() {
        let (dir, path) = temp_path();
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(&path, "[[[ not toml").unwrap();

        let result = FileTagRegistry::open(&path);

        assert!(matches!(result, Err(RegistryError::Parse(_))));
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_missing_interactive_flag_defaults_to_false() {
        let (dir, path) = temp_path();
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(&path, "[[tags]]\nid = \"T2\"\nname = \"Porch\"\n").unwrap();

        let registry = FileTagRegistry::open(&path).unwrap();

        assert!(!registry.get_tag("T2").unwrap().is_interactive());
        std::fs::remove_dir_all(&dir).ok();
    }
}
