//! Store configuration for a host context.

use crate::error::{KvError, KvResult};
use crate::session::OpenOptions;
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct StoreConfig {
    /// Directory relative store paths resolve against
    #[serde(default = "default_base_dir")]
    pub base_dir: PathBuf,

    /// Store opened when the context is created
    #[serde(default)]
    pub default_store: Option<String>,

    /// Options used for the default store
    #[serde(default)]
    pub open: OpenOptions,
}

fn default_base_dir() -> PathBuf {
    PathBuf::from(".")
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            base_dir: default_base_dir(),
            default_store: None,
            open: OpenOptions::default(),
        }
    }
}

impl StoreConfig {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            ..Default::default()
        }
    }

    pub fn default_store(mut self, name: impl Into<String>) -> Self {
        self.default_store = Some(name.into());
        self
    }

    pub fn open_options(mut self, options: OpenOptions) -> Self {
        self.open = options;
        self
    }

    /// Resolve a store name against the base directory. Absolute paths are
    /// used as given.
    pub fn resolve_path(&self, name: &str) -> KvResult<PathBuf> {
        if name.is_empty() {
            return Err(KvError::invalid_argument("store path must not be empty"));
        }
        let path = Path::new(name);
        if path.is_absolute() {
            Ok(path.to_path_buf())
        } else {
            Ok(self.base_dir.join(path))
        }
    }
}
