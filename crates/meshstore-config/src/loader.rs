use std::path::{Path, PathBuf};

use meshstore_common::{Error, Result};
use tracing::info;

use crate::model::MeshConfig;

/// Resolves a `MeshConfig` from a directory on disk. File-loading mechanics
/// (search path, YAML-over-TOML precedence) are ambient developer
/// convenience; callers may just as well build a `MeshConfig` value in code
/// and hand it directly to `StoreFactory`.
pub struct ConfigLoader {
    config_dir: PathBuf,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self {
            config_dir: Self::default_config_dir(),
        }
    }

    pub fn default_config_dir() -> PathBuf {
        dirs::config_dir()
            .map(|c| c.join("meshstore"))
            .unwrap_or_else(|| PathBuf::from(".meshstore"))
    }

    pub fn with_dir(config_dir: impl Into<PathBuf>) -> Self {
        Self {
            config_dir: config_dir.into(),
        }
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    /// Loads `mesh.yml` if present, else `mesh.toml`, else returns defaults.
    pub fn load(&self) -> Result<MeshConfig> {
        let yaml_path = self.config_dir.join("mesh.yml");
        let toml_path = self.config_dir.join("mesh.toml");

        if yaml_path.exists() {
            info!("loading mesh store config from {}", yaml_path.display());
            let contents = std::fs::read_to_string(&yaml_path)?;
            serde_yaml::from_str(&contents)
                .map_err(|e| Error::Configuration(format!("failed to parse YAML config: {e}")))
        } else if toml_path.exists() {
            info!("loading mesh store config from {}", toml_path.display());
            let contents = std::fs::read_to_string(&toml_path)?;
            toml::from_str(&contents)
                .map_err(|e| Error::Configuration(format!("failed to parse TOML config: {e}")))
        } else {
            info!("no mesh store config file found, using defaults");
            Ok(MeshConfig::default())
        }
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn temp_dir(label: &str) -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock should be after unix epoch")
            .as_nanos();
        std::env::temp_dir().join(format!(
            "meshstore-config-test-{}-{}-{}",
            label,
            std::process::id(),
            nanos
        ))
    }

    #[test]
    fn load_returns_default_when_no_config_exists() {
        let dir = temp_dir("default");
        fs::create_dir_all(&dir).expect("failed to create temp dir");

        let loader = ConfigLoader::with_dir(&dir);
        let config = loader.load().expect("load should succeed");

        assert_eq!(config.vector_dimension, 384);

        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn load_prefers_yaml_over_toml_when_both_exist() {
        let dir = temp_dir("yaml-precedence");
        fs::create_dir_all(&dir).expect("failed to create temp dir");

        fs::write(
            dir.join("mesh.yml"),
            "storeType: embeddedFile\nvectorDimension: 512\n",
        )
        .expect("failed to write yaml config");
        fs::write(
            dir.join("mesh.toml"),
            "storeType = \"inMemory\"\nvectorDimension = 8\n",
        )
        .expect("failed to write toml config");

        let loader = ConfigLoader::with_dir(&dir);
        let config = loader.load().expect("load should succeed");

        assert_eq!(config.vector_dimension, 512);

        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn load_reads_toml_when_yaml_missing() {
        let dir = temp_dir("toml");
        fs::create_dir_all(&dir).expect("failed to create temp dir");

        fs::write(dir.join("mesh.toml"), "storeType = \"inMemory\"\n")
            .expect("failed to write toml config");

        let loader = ConfigLoader::with_dir(&dir);
        let config = loader.load().expect("load should succeed");

        assert_eq!(config.store_type, crate::model::StoreType::InMemory);

        let _ = fs::remove_dir_all(dir);
    }
}
