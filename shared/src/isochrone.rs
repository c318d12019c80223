use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::feature::FeatureId;
use crate::nearby::IsochroneWire;

/// Walking speed (km/h) the backend uses when it computes isochrone polygons.
pub const REFERENCE_WALKING_SPEED_KMH: f64 = 5.0;

/// Per-user isochrone preferences echoed back by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UserSettings {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_walking_speed", alias = "walking_speed_kmh")]
    pub walking_speed: f64,
}

fn default_walking_speed() -> f64 {
    REFERENCE_WALKING_SPEED_KMH
}

impl Default for UserSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            walking_speed: REFERENCE_WALKING_SPEED_KMH,
        }
    }
}

impl UserSettings {
    /// Multiplier applied to backend travel times so labels match the user's
    /// walking speed. Geometry is left as computed by the backend.
    pub fn time_scale(&self, reference_speed_kmh: f64) -> f64 {
        let speed = self.walking_speed;
        if !self.enabled || !speed.is_finite() || speed <= 0.0 || reference_speed_kmh <= 0.0 {
            return 1.0;
        }
        if (speed - reference_speed_kmh).abs() < 1e-9 {
            return 1.0;
        }
        reference_speed_kmh / speed
    }
}

/// Reachability polygons for one origin feature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IsochronePayload {
    pub geojson: Value,
    /// Three ascending travel-time thresholds in seconds.
    pub ranges: [f64; 3],
    pub user_settings: UserSettings,
    pub feature_id: FeatureId,
}

impl IsochronePayload {
    /// Returns `None` unless the wire block carries at least three finite ranges.
    pub fn from_wire(wire: IsochroneWire, feature_id: FeatureId) -> Option<Self> {
        let mut ranges: Vec<f64> = wire
            .ranges_s
            .iter()
            .copied()
            .filter(|r| r.is_finite() && *r > 0.0)
            .collect();
        if ranges.len() < 3 {
            return None;
        }
        ranges.sort_by(f64::total_cmp);
        Some(Self {
            geojson: wire.geojson,
            ranges: [ranges[0], ranges[1], ranges[2]],
            user_settings: wire.user_settings,
            feature_id,
        })
    }

    /// Polygon features of the GeoJSON, with their backend travel time when present.
    pub fn polygons(&self) -> impl Iterator<Item = (&Value, Option<f64>)> {
        self.geojson
            .get("features")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .map(|feature| {
                let value = feature
                    .get("properties")
                    .and_then(|p| p.get("value"))
                    .and_then(Value::as_f64);
                (feature, value)
            })
    }
}

/// Ranked time-band membership of a polygon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum TimeBand {
    First,
    Second,
    Third,
}

impl TimeBand {
    pub fn classify(time_s: f64, ranges: &[f64; 3]) -> Self {
        if time_s <= ranges[0] {
            Self::First
        } else if time_s <= ranges[1] {
            Self::Second
        } else {
            Self::Third
        }
    }

    pub const fn index(self) -> usize {
        match self {
            Self::First => 0,
            Self::Second => 1,
            Self::Third => 2,
        }
    }
}
