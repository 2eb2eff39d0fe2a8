//! Aggregation of a finished survey into the heatmap renderer's input

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    dataset::{CityId, DataSet},
    sampling::Granularity,
    session::Answer,
};

/// A labeled city as the renderer wants it: `[lat, lng, value]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(into = "(f64, f64, u8)", from = "(f64, f64, u8)")]
pub struct WeightedPoint {
    pub lat: f64,
    pub lng: f64,
    pub value: u8,
}

impl From<WeightedPoint> for (f64, f64, u8) {
    fn from(point: WeightedPoint) -> Self {
        (point.lat, point.lng, point.value)
    }
}

impl From<(f64, f64, u8)> for WeightedPoint {
    fn from((lat, lng, value): (f64, f64, u8)) -> Self {
        Self { lat, lng, value }
    }
}

fn default_opacity() -> f64 {
    0.65
}

fn default_cell_size() -> u32 {
    5
}

fn default_exponent() -> u32 {
    2
}

fn default_max() -> f64 {
    1.0
}

/// Fixed options for the inverse-distance-weighted layer. Serialized with
/// the renderer's option names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderConfig {
    #[serde(default = "default_opacity")]
    pub opacity: f64,
    #[serde(rename = "cellSize", alias = "cell_size", default = "default_cell_size")]
    pub cell_size: u32,
    #[serde(rename = "exp", alias = "exponent", default = "default_exponent")]
    pub exponent: u32,
    #[serde(default = "default_max")]
    pub max: f64,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            opacity: default_opacity(),
            cell_size: default_cell_size(),
            exponent: default_exponent(),
            max: default_max(),
        }
    }
}

/// Everything the external renderer needs to draw one survey.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeatmapPayload {
    pub survey: String,
    pub granularity: Granularity,
    pub completed_at: DateTime<Utc>,
    pub options: RenderConfig,
    pub points: Vec<WeightedPoint>,
}

impl HeatmapPayload {
    pub fn south_share(&self) -> f64 {
        if self.points.is_empty() {
            return 0.0;
        }
        let south = self.points.iter().filter(|p| p.value == 1).count();
        south as f64 / self.points.len() as f64
    }
}

pub struct ResultAggregator<'a> {
    dataset: &'a DataSet,
}

impl<'a> ResultAggregator<'a> {
    pub fn new(dataset: &'a DataSet) -> Self {
        Self { dataset }
    }

    /// One point per labeled city, in queue order. No deduplication.
    pub fn aggregate(&self, labeled: &[(CityId, Answer)]) -> Vec<WeightedPoint> {
        labeled
            .iter()
            .map(|(id, answer)| {
                let position = self.dataset[*id].position;
                WeightedPoint {
                    lat: position.lat,
                    lng: position.lng,
                    value: answer.weight(),
                }
            })
            .collect()
    }
}

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("result export io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("result export serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Writes a finished payload as pretty JSON for an external renderer.
pub struct ResultWriter {
    path: PathBuf,
}

impl ResultWriter {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn write(&self, payload: &HeatmapPayload) -> Result<PathBuf, ExportError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let json = serde_json::to_string_pretty(payload)?;
        fs::write(&self.path, json)?;
        tracing::info!(path = %self.path.display(), points = payload.points.len(), "result written");
        Ok(self.path.clone())
    }
}
