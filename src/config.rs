use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::{
    results::RenderConfig,
    sampling::{GridSampler, DEFAULT_MAX_PICK_ATTEMPTS},
    spatial::BoundingBox,
};

fn default_dataset() -> PathBuf {
    PathBuf::from("data/cities.geojson")
}

fn default_bounding_box() -> BoundingBox {
    BoundingBox::great_britain()
}

fn default_max_pick_attempts() -> usize {
    DEFAULT_MAX_PICK_ATTEMPTS
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Survey definition, normally read from a YAML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SurveyConfig {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Replays the same sample and order; entropy when omitted.
    #[serde(default)]
    pub seed: Option<u64>,
    #[serde(default = "default_dataset")]
    pub dataset: PathBuf,
    #[serde(default = "default_bounding_box")]
    pub bounding_box: BoundingBox,
    #[serde(default = "default_max_pick_attempts")]
    pub max_pick_attempts: usize,
    #[serde(default)]
    pub render: RenderConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl SurveyConfig {
    pub fn great_britain() -> Self {
        Self {
            name: "great_britain".to_string(),
            description: None,
            seed: None,
            dataset: default_dataset(),
            bounding_box: default_bounding_box(),
            max_pick_attempts: default_max_pick_attempts(),
            render: RenderConfig::default(),
            logging: LoggingConfig::default(),
        }
    }

    pub fn sampler(&self) -> GridSampler {
        GridSampler::new(self.bounding_box).with_max_pick_attempts(self.max_pick_attempts)
    }
}

/// Resolves config files, and the dataset paths inside them, against a
/// base directory.
pub struct ConfigLoader {
    base_dir: PathBuf,
}

impl ConfigLoader {
    pub fn new(base_dir: impl AsRef<Path>) -> Self {
        Self {
            base_dir: base_dir.as_ref().to_path_buf(),
        }
    }

    pub fn load(&self, file: impl AsRef<Path>) -> Result<SurveyConfig> {
        let path = self.base_dir.join(file);
        let data = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read survey config {}", path.display()))?;
        let mut config: SurveyConfig = serde_yaml::from_str(&data)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        config.dataset = self.base_dir.join(&config.dataset);
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_takes_defaults() {
        let config: SurveyConfig = serde_yaml::from_str("name: minimal\n").unwrap();

        assert_eq!(config.bounding_box, BoundingBox::great_britain());
        assert_eq!(config.max_pick_attempts, 20);
        assert_eq!(config.render, RenderConfig::default());
        assert_eq!(config.logging.level, "info");
        assert!(config.seed.is_none());
    }

    #[test]
    fn test_loader_resolves_dataset_against_base_dir() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("survey.yaml"),
            "name: local\nseed: 3\ndataset: cities.geojson\n",
        )
        .unwrap();

        let config = ConfigLoader::new(dir.path()).load("survey.yaml").unwrap();

        assert_eq!(config.seed, Some(3));
        assert_eq!(config.dataset, dir.path().join("cities.geojson"));
    }

    #[test]
    fn test_loader_rejects_inverted_box() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("bad.yaml"),
            "name: bad\nbounding_box:\n  north_west: { lat: 1.0, lng: 0.0 }\n  south_east: { lat: 2.0, lng: 1.0 }\n",
        )
        .unwrap();

        let err = ConfigLoader::new(dir.path()).load("bad.yaml").unwrap_err();
        assert!(format!("{err:#}").contains("latitude"));
    }
}
