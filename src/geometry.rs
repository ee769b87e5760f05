//! Geometry primitives for mapping raw mesh vertices into geographic coordinates
//!
//! This module provides the 4×4 transform chain helpers, the WGS84 ellipsoid
//! conversion between earth-centered-earth-fixed (ECEF) cartesian coordinates
//! and geographic longitude/latitude/height, and the bounding-rectangle
//! accumulation used to pick one representative position per feature.

use geo::{Coord, Rect};
use glam::{DMat4, DVec3};

/// WGS84 semi-major axis in meters
pub const WGS84_RADIUS_EQUATOR: f64 = 6_378_137.0;

/// WGS84 semi-minor axis in meters
pub const WGS84_RADIUS_POLAR: f64 = 6_356_752.314_245_179;

/// WGS84 first eccentricity squared
const E_SQ: f64 = 1.0 - (WGS84_RADIUS_POLAR * WGS84_RADIUS_POLAR)
    / (WGS84_RADIUS_EQUATOR * WGS84_RADIUS_EQUATOR);

/// WGS84 second eccentricity squared
const E_PRIME_SQ: f64 = E_SQ / (1.0 - E_SQ);

/// Fixed rotation converting glTF's y-up convention to the z-up geographic
/// frame: `(x, y, z)` maps to `(x, -z, y)`.
///
/// Batched 3D model content embeds y-up glTF assets while the surrounding
/// tileset transforms operate in the z-up ECEF frame, so every embedded mesh
/// passes through this rotation.
pub const Y_UP_TO_Z_UP: DMat4 = DMat4::from_cols_array(&[
    1.0, 0.0, 0.0, 0.0, //
    0.0, 0.0, 1.0, 0.0, //
    0.0, -1.0, 0.0, 0.0, //
    0.0, 0.0, 0.0, 1.0,
]);

/// Geographic position on the WGS84 ellipsoid
///
/// Longitude and latitude are stored in radians; heights are meters. Degrees
/// only appear at the output boundary (see [`Cartographic::longitude_degrees`]
/// and [`Cartographic::latitude_degrees`]).
#[derive(Clone, Copy, Debug, PartialEq, Default)]
pub struct Cartographic {
    /// Longitude in radians
    pub longitude: f64,
    /// Latitude in radians
    pub latitude: f64,
    /// Height in meters (meaning depends on the producer; the indexer stores
    /// a vertical extent here, see the walker/indexer docs)
    pub height: f64,
}

impl Cartographic {
    /// Create a position from radians and meters
    pub fn new(longitude: f64, latitude: f64, height: f64) -> Self {
        Self {
            longitude,
            latitude,
            height,
        }
    }

    /// Create a position from degrees and meters
    pub fn from_degrees(longitude: f64, latitude: f64, height: f64) -> Self {
        Self {
            longitude: longitude.to_radians(),
            latitude: latitude.to_radians(),
            height,
        }
    }

    /// Longitude in degrees
    #[inline]
    pub fn longitude_degrees(&self) -> f64 {
        self.longitude.to_degrees()
    }

    /// Latitude in degrees
    #[inline]
    pub fn latitude_degrees(&self) -> f64 {
        self.latitude.to_degrees()
    }

    /// Convert to an ECEF cartesian coordinate
    pub fn to_cartesian(&self) -> DVec3 {
        let sin_lat = self.latitude.sin();
        let cos_lat = self.latitude.cos();
        let n = WGS84_RADIUS_EQUATOR / (1.0 - E_SQ * sin_lat * sin_lat).sqrt();

        DVec3::new(
            (n + self.height) * cos_lat * self.longitude.cos(),
            (n + self.height) * cos_lat * self.longitude.sin(),
            (n * (1.0 - E_SQ) + self.height) * sin_lat,
        )
    }

    /// Convert an ECEF cartesian coordinate to a geographic position
    ///
    /// Uses Bowring's closed-form approximation for the geodetic latitude,
    /// which is accurate to well below a millimeter for terrestrial points.
    pub fn from_cartesian(cartesian: DVec3) -> Self {
        let p = cartesian.x.hypot(cartesian.y);
        let theta = (cartesian.z * WGS84_RADIUS_EQUATOR).atan2(p * WGS84_RADIUS_POLAR);
        let (sin_theta, cos_theta) = theta.sin_cos();

        let latitude = (cartesian.z + E_PRIME_SQ * WGS84_RADIUS_POLAR * sin_theta.powi(3))
            .atan2(p - E_SQ * WGS84_RADIUS_EQUATOR * cos_theta.powi(3));
        let longitude = cartesian.y.atan2(cartesian.x);

        let sin_lat = latitude.sin();
        // h = p·cosφ + z·sinφ − a·sqrt(1 − e²·sin²φ), stable at the poles
        let height = p * latitude.cos() + cartesian.z * sin_lat
            - WGS84_RADIUS_EQUATOR * (1.0 - E_SQ * sin_lat * sin_lat).sqrt();

        Self {
            longitude,
            latitude,
            height,
        }
    }
}

/// Geographic bounding rectangle accumulated over a set of positions
///
/// Bounds are stored in radians as a planar min/max over longitude (x) and
/// latitude (y). There is no antimeridian splitting: a feature whose points
/// straddle ±180° produces a rectangle spanning the long way around.
#[derive(Clone, Copy, Debug, Default)]
pub struct Rectangle {
    bounds: Option<Rect<f64>>,
}

impl Rectangle {
    /// Create an empty rectangle
    pub fn new() -> Self {
        Self::default()
    }

    /// Expand the rectangle to cover the given position
    pub fn extend(&mut self, position: &Cartographic) {
        let coord = Coord {
            x: position.longitude,
            y: position.latitude,
        };
        match &mut self.bounds {
            Some(rect) => {
                let min = rect.min();
                let max = rect.max();
                *rect = Rect::new(
                    Coord {
                        x: min.x.min(coord.x),
                        y: min.y.min(coord.y),
                    },
                    Coord {
                        x: max.x.max(coord.x),
                        y: max.y.max(coord.y),
                    },
                );
            }
            None => {
                self.bounds = Some(Rect::new(coord, coord));
            }
        }
    }

    /// Whether any position has been accumulated
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bounds.is_none()
    }

    /// Western bound in radians, if any position was accumulated
    pub fn west(&self) -> Option<f64> {
        self.bounds.map(|r| r.min().x)
    }

    /// Southern bound in radians
    pub fn south(&self) -> Option<f64> {
        self.bounds.map(|r| r.min().y)
    }

    /// Eastern bound in radians
    pub fn east(&self) -> Option<f64> {
        self.bounds.map(|r| r.max().x)
    }

    /// Northern bound in radians
    pub fn north(&self) -> Option<f64> {
        self.bounds.map(|r| r.max().y)
    }

    /// Midpoint of the rectangle with height zero; the caller decides what
    /// height to attach. Returns `None` for an empty rectangle.
    pub fn center(&self) -> Option<Cartographic> {
        self.bounds.map(|r| {
            let c = r.center();
            Cartographic::new(c.x, c.y, 0.0)
        })
    }
}

/// Compose a parent world transform with an optional local transform
///
/// Absent local transforms behave as the identity, so a plain tileset with no
/// `transform` fields walks through unchanged.
#[inline]
pub fn compose(parent: &DMat4, local: Option<&DMat4>) -> DMat4 {
    match local {
        Some(local) => *parent * *local,
        None => *parent,
    }
}

/// Translation matrix compensating for a relative-to-center offset declared
/// by a batch payload's feature table (`RTC_CENTER`)
#[inline]
pub fn rtc_translation(center: Option<DVec3>) -> DMat4 {
    match center {
        Some(center) => DMat4::from_translation(center),
        None => DMat4::IDENTITY,
    }
}
