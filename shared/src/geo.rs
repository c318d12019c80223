use serde::{Deserialize, Serialize};

/// Mean Earth radius used by every distance computation in the workspace.
pub const EARTH_RADIUS_KM: f64 = 6371.0088;

/// WGS84 coordinate pair in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

impl LatLng {
    pub const fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Finite and inside the valid latitude/longitude ranges.
    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lng.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lng)
    }

    /// Great-circle distance in kilometres (haversine).
    pub fn distance_km(&self, other: &LatLng) -> f64 {
        let d_lat = (other.lat - self.lat).to_radians();
        let d_lng = (other.lng - self.lng).to_radians();
        let a = (d_lat / 2.0).sin().powi(2)
            + self.lat.to_radians().cos()
                * other.lat.to_radians().cos()
                * (d_lng / 2.0).sin().powi(2);
        2.0 * EARTH_RADIUS_KM * a.sqrt().min(1.0).asin()
    }
}

/// Axis-aligned geographic rectangle, south-west to north-east.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub south: f64,
    pub west: f64,
    pub north: f64,
    pub east: f64,
}

impl Bounds {
    pub const fn new(south: f64, west: f64, north: f64, east: f64) -> Self {
        Self {
            south,
            west,
            north,
            east,
        }
    }

    /// Bounds of the given half-extent in degrees around a center.
    pub fn around(center: LatLng, half_lat: f64, half_lng: f64) -> Self {
        Self {
            south: center.lat - half_lat,
            west: center.lng - half_lng,
            north: center.lat + half_lat,
            east: center.lng + half_lng,
        }
    }

    pub const fn south_west(&self) -> LatLng {
        LatLng::new(self.south, self.west)
    }

    pub const fn north_east(&self) -> LatLng {
        LatLng::new(self.north, self.east)
    }

    pub fn center(&self) -> LatLng {
        LatLng::new(
            (self.south + self.north) / 2.0,
            (self.west + self.east) / 2.0,
        )
    }

    /// Haversine length of the south-west to north-east diagonal.
    pub fn diagonal_km(&self) -> f64 {
        self.south_west().distance_km(&self.north_east())
    }

    pub fn contains(&self, point: &LatLng) -> bool {
        point.lat >= self.south
            && point.lat <= self.north
            && point.lng >= self.west
            && point.lng <= self.east
    }

    /// Grow each side by `ratio` of the span on that axis.
    pub fn pad(&self, ratio: f64) -> Self {
        let lat_pad = (self.north - self.south).abs() * ratio;
        let lng_pad = (self.east - self.west).abs() * ratio;
        Self {
            south: self.south - lat_pad,
            west: self.west - lng_pad,
            north: self.north + lat_pad,
            east: self.east + lng_pad,
        }
    }

    /// Same span, moved so that `center` is in the middle.
    pub fn recentered(&self, center: LatLng) -> Self {
        let half_lat = (self.north - self.south).abs() / 2.0;
        let half_lng = (self.east - self.west).abs() / 2.0;
        Self::around(center, half_lat, half_lng)
    }
}
