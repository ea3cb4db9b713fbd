//! Configuration file parsing for otter-store.toml.

use otter_store::StoreConfig;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Config file names searched for, in order
const CONFIG_NAMES: &[&str] = &["otter-store.toml", ".otter-store.toml"];

/// Main configuration structure.
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    /// Store settings
    #[serde(default)]
    pub store: StoreConfig,
}

/// Load configuration from a file or search for a default config file.
///
/// A relative `base_dir` in the file is taken relative to the file itself.
pub fn load_config(path: Option<&Path>) -> anyhow::Result<Config> {
    let config_path = match path {
        Some(path) if !path.exists() => {
            anyhow::bail!("Config file {} does not exist", path.display())
        }
        Some(path) => Some(path.to_path_buf()),
        None => find_config_file(),
    };

    let Some(path) = config_path else {
        return Ok(Config::default());
    };

    let content = std::fs::read_to_string(&path)?;
    let mut config: Config = toml::from_str(&content)
        .map_err(|e| anyhow::anyhow!("Failed to parse {}: {}", path.display(), e))?;

    if config.store.base_dir.is_relative()
        && let Some(parent) = path.parent()
    {
        config.store.base_dir = parent.join(&config.store.base_dir);
    }
    tracing::debug!(path = %path.display(), "Loaded config");
    Ok(config)
}

/// Search for a configuration file in the current directory and its parents.
fn find_config_file() -> Option<PathBuf> {
    let cwd = std::env::current_dir().ok()?;
    find_config_in_ancestors(&cwd)
}

fn find_config_in_ancestors(start: &Path) -> Option<PathBuf> {
    let mut dir = Some(start);
    while let Some(current) = dir {
        for name in CONFIG_NAMES {
            let path = current.join(name);
            if path.exists() {
                return Some(path);
            }
        }
        dir = current.parent();
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.store.base_dir, PathBuf::from("."));
        assert!(config.store.default_store.is_none());
    }

    #[test]
    fn test_parse_config() {
        let toml = r#"
[store]
base_dir = "data"
default_store = "main"

[store.open]
create_if_missing = false
blockCacheSizeBytes = 1048576
sync = true
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.store.base_dir, PathBuf::from("data"));
        assert_eq!(config.store.default_store.as_deref(), Some("main"));
        assert!(!config.store.open.create_if_missing);
        assert_eq!(config.store.open.block_cache_size_bytes, Some(1 << 20));
        assert!(config.store.open.sync);
    }

    #[test]
    fn test_load_resolves_base_dir_against_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("otter-store.toml");
        std::fs::write(&path, "[store]\nbase_dir = \"stores\"\n").unwrap();

        let config = load_config(Some(&path)).unwrap();
        assert_eq!(config.store.base_dir, dir.path().join("stores"));
    }

    #[test]
    fn test_find_in_ancestors() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("a").join("b");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(dir.path().join(".otter-store.toml"), "").unwrap();

        assert_eq!(
            find_config_in_ancestors(&nested),
            Some(dir.path().join(".otter-store.toml"))
        );
    }

    #[test]
    fn test_missing_explicit_config_fails() {
        let dir = TempDir::new().unwrap();
        assert!(load_config(Some(&dir.path().join("nope.toml"))).is_err());
    }
}
