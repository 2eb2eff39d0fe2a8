//! City collection and its one-shot loader

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::spatial::LatLng;

/// Dense index of a city inside its [`DataSet`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CityId(usize);

impl CityId {
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct City {
    pub id: CityId,
    pub name: String,
    pub position: LatLng,
}

#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("failed to read dataset {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("dataset is not a GeoJSON feature collection: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("feature {index} has no `{field}` property")]
    MissingField { index: usize, field: &'static str },
}

/// Immutable set of cities, loaded once per process.
#[derive(Debug, Clone, Default)]
pub struct DataSet {
    cities: Vec<City>,
}

#[derive(Deserialize)]
struct FeatureCollection {
    features: Vec<Feature>,
}

#[derive(Deserialize)]
struct Feature {
    #[serde(default)]
    properties: FeatureProperties,
}

#[derive(Default, Deserialize)]
struct FeatureProperties {
    city: Option<String>,
    name: Option<String>,
    lat: Option<f64>,
    lng: Option<f64>,
}

impl DataSet {
    pub fn from_cities<I, S>(cities: I) -> Self
    where
        I: IntoIterator<Item = (S, LatLng)>,
        S: Into<String>,
    {
        let cities = cities
            .into_iter()
            .enumerate()
            .map(|(index, (name, position))| City {
                id: CityId(index),
                name: name.into(),
                position,
            })
            .collect();
        Self { cities }
    }

    /// Parse a GeoJSON `FeatureCollection` whose features carry `city`,
    /// `lat` and `lng` properties. `name` stands in when `city` is absent.
    /// A feature missing any of them rejects the whole collection.
    pub fn from_geojson_str(text: &str) -> Result<Self, DatasetError> {
        let collection: FeatureCollection = serde_json::from_str(text)?;
        let mut cities = Vec::with_capacity(collection.features.len());
        for (index, feature) in collection.features.into_iter().enumerate() {
            let props = feature.properties;
            let lat = props.lat.ok_or(DatasetError::MissingField { index, field: "lat" })?;
            let lng = props.lng.ok_or(DatasetError::MissingField { index, field: "lng" })?;
            let name = props
                .city
                .or(props.name)
                .ok_or(DatasetError::MissingField { index, field: "city" })?;
            cities.push((name, LatLng::new(lat, lng)));
        }
        Ok(Self::from_cities(cities))
    }

    pub fn len(&self) -> usize {
        self.cities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cities.is_empty()
    }

    pub fn get(&self, id: CityId) -> Option<&City> {
        self.cities.get(id.index())
    }

    pub fn iter(&self) -> impl Iterator<Item = &City> {
        self.cities.iter()
    }

    pub fn ids(&self) -> impl Iterator<Item = CityId> + '_ {
        self.cities.iter().map(|city| city.id)
    }
}

impl std::ops::Index<CityId> for DataSet {
    type Output = City;

    fn index(&self, id: CityId) -> &City {
        &self.cities[id.index()]
    }
}

/// Reads the dataset from disk. Nothing downstream can run until the
/// returned future resolves into a [`DataSet`].
pub struct DatasetLoader {
    path: PathBuf,
}

impl DatasetLoader {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn load(&self) -> Result<DataSet, DatasetError> {
        let text = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|source| DatasetError::Io {
                path: self.path.clone(),
                source,
            })?;
        let dataset = DataSet::from_geojson_str(&text)?;
        tracing::info!(
            path = %self.path.display(),
            cities = dataset.len(),
            "dataset loaded"
        );
        Ok(dataset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TWO_CITIES: &str = r#"{
        "type": "FeatureCollection",
        "features": [
            {"type": "Feature", "properties": {"city": "York", "lat": 53.96, "lng": -1.08}},
            {"type": "Feature", "properties": {"city": "Bath", "lat": 51.38, "lng": -2.36}}
        ]
    }"#;

    #[test]
    fn parses_feature_properties() {
        let dataset = DataSet::from_geojson_str(TWO_CITIES).unwrap();

        assert_eq!(dataset.len(), 2);
        let bath = &dataset[dataset.ids().nth(1).unwrap()];
        assert_eq!(bath.name, "Bath");
        assert_eq!(bath.position, LatLng::new(51.38, -2.36));
    }

    #[test]
    fn missing_coordinate_fails_the_load() {
        let text = r#"{"features": [
            {"properties": {"city": "York", "lat": 53.96, "lng": -1.08}},
            {"properties": {"city": "Nowhere", "lat": 51.0}}
        ]}"#;

        let err = DataSet::from_geojson_str(text).unwrap_err();
        assert!(matches!(
            err,
            DatasetError::MissingField { index: 1, field: "lng" }
        ));
    }

    #[test]
    fn name_property_backs_up_city() {
        let text = r#"{"features": [
            {"properties": {"city": "York", "name": "York Minster", "lat": 53.96, "lng": -1.08}},
            {"properties": {"name": "Bath", "lat": 51.38, "lng": -2.36}}
        ]}"#;

        let dataset = DataSet::from_geojson_str(text).unwrap();
        let names: Vec<_> = dataset.iter().map(|city| city.name.as_str()).collect();
        assert_eq!(names, vec!["York", "Bath"]);
    }

    #[test]
    fn rejects_non_collection() {
        assert!(matches!(
            DataSet::from_geojson_str("[1, 2, 3]"),
            Err(DatasetError::Parse(_))
        ));
    }

    #[tokio::test]
    async fn loader_reports_missing_file() {
        let loader = DatasetLoader::new("does/not/exist.geojson");
        let err = loader.load().await.unwrap_err();
        assert!(matches!(err, DatasetError::Io { .. }));
    }
}
