//! Spatial model - geographic extent and the sampling grid laid over it

use std::num::NonZeroU32;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A geographic coordinate in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

impl LatLng {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    pub fn is_finite(&self) -> bool {
        self.lat.is_finite() && self.lng.is_finite()
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum SpatialError {
    #[error("{corner} corner has a non-finite coordinate ({lat}, {lng})")]
    NonFinite {
        corner: &'static str,
        lat: f64,
        lng: f64,
    },
    #[error("north-west latitude {north} must be greater than south-east latitude {south}")]
    InvertedLatitude { north: f64, south: f64 },
    #[error("south-east longitude {east} must be greater than north-west longitude {west}")]
    InvertedLongitude { west: f64, east: f64 },
}

/// Rectangle over which the survey samples, given by its north-west and
/// south-east corners.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawBoundingBox")]
pub struct BoundingBox {
    north_west: LatLng,
    south_east: LatLng,
}

#[derive(Deserialize)]
struct RawBoundingBox {
    north_west: LatLng,
    south_east: LatLng,
}

impl TryFrom<RawBoundingBox> for BoundingBox {
    type Error = SpatialError;

    fn try_from(raw: RawBoundingBox) -> Result<Self, Self::Error> {
        BoundingBox::new(raw.north_west, raw.south_east)
    }
}

impl BoundingBox {
    pub fn new(north_west: LatLng, south_east: LatLng) -> Result<Self, SpatialError> {
        for (corner, point) in [("north-west", north_west), ("south-east", south_east)] {
            if !point.is_finite() {
                return Err(SpatialError::NonFinite {
                    corner,
                    lat: point.lat,
                    lng: point.lng,
                });
            }
        }
        if north_west.lat <= south_east.lat {
            return Err(SpatialError::InvertedLatitude {
                north: north_west.lat,
                south: south_east.lat,
            });
        }
        if south_east.lng <= north_west.lng {
            return Err(SpatialError::InvertedLongitude {
                west: north_west.lng,
                east: south_east.lng,
            });
        }
        Ok(Self {
            north_west,
            south_east,
        })
    }

    /// Mainland Great Britain plus Northern Ireland and the outer isles.
    pub fn great_britain() -> Self {
        Self {
            north_west: LatLng::new(58.602350107374626, -13.348446523591717),
            south_east: LatLng::new(49.79435954086905, 3.5757293368531573),
        }
    }

    pub fn north_west(&self) -> LatLng {
        self.north_west
    }

    pub fn south_east(&self) -> LatLng {
        self.south_east
    }

    /// East-west extent in degrees of longitude.
    pub fn x_range(&self) -> f64 {
        self.south_east.lng - self.north_west.lng
    }

    /// North-south extent in degrees of latitude.
    pub fn y_range(&self) -> f64 {
        self.north_west.lat - self.south_east.lat
    }
}

/// Sampling grid over a bounding box.
///
/// Both axes use a window of `range / N`, but the Y axis gets
/// `ceil(N * x_range / y_range)` centres. On a box wider than it is tall
/// this packs the latitude centres closer than the window height, so
/// neighbouring windows overlap along Y and tile exactly along X.
#[derive(Debug, Clone)]
pub struct Grid {
    box_size_x: f64,
    box_size_y: f64,
    demarcations_x: Vec<f64>,
    demarcations_y: Vec<f64>,
}

impl Grid {
    pub fn new(bounds: &BoundingBox, granularity: NonZeroU32) -> Self {
        let n = granularity.get();
        let x_range = bounds.x_range();
        let y_range = bounds.y_range();

        let count_x = n as usize;
        let count_y = (f64::from(n) * (x_range / y_range)).ceil() as usize;

        let origin_x = bounds.north_west().lng;
        let origin_y = bounds.south_east().lat;
        let demarcations_x = (0..count_x)
            .map(|i| origin_x + x_range * (i as f64 / count_x as f64))
            .collect();
        let demarcations_y = (0..count_y)
            .map(|j| origin_y + y_range * (j as f64 / count_y as f64))
            .collect();

        Self {
            box_size_x: x_range / f64::from(n),
            box_size_y: y_range / f64::from(n),
            demarcations_x,
            demarcations_y,
        }
    }

    pub fn box_size_x(&self) -> f64 {
        self.box_size_x
    }

    pub fn box_size_y(&self) -> f64 {
        self.box_size_y
    }

    pub fn demarcations_x(&self) -> &[f64] {
        &self.demarcations_x
    }

    pub fn demarcations_y(&self) -> &[f64] {
        &self.demarcations_y
    }

    pub fn window_count(&self) -> usize {
        self.demarcations_x.len() * self.demarcations_y.len()
    }

    /// Windows in row-major order: every X centre for the first Y centre,
    /// then the next Y centre, and so on.
    pub fn windows(&self) -> impl Iterator<Item = Window> + '_ {
        self.demarcations_y.iter().flat_map(move |&y| {
            self.demarcations_x.iter().map(move |&x| Window {
                center: LatLng::new(y, x),
                half_width: self.box_size_x / 2.0,
                half_height: self.box_size_y / 2.0,
            })
        })
    }
}

/// One sampling window centred on a pair of demarcations.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Window {
    pub center: LatLng,
    pub half_width: f64,
    pub half_height: f64,
}

impl Window {
    /// Inclusive on every edge.
    pub fn contains(&self, point: LatLng) -> bool {
        point.lng >= self.center.lng - self.half_width
            && point.lng <= self.center.lng + self.half_width
            && point.lat >= self.center.lat - self.half_height
            && point.lat <= self.center.lat + self.half_height
    }
}
