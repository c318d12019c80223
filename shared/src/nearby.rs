use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::feature::{Feature, FeatureId, FeatureProperties};
use crate::geo::LatLng;
use crate::isochrone::UserSettings;

/// Progress of the backend job computing the nearby list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NearbyProgress {
    #[serde(default)]
    pub done: u32,
    #[serde(default)]
    pub total: u32,
}

/// One entry of the nearby feed. Items are feature-like but may omit geometry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NearbyItem {
    pub id: FeatureId,
    #[serde(default, rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub lat: Option<f64>,
    #[serde(default)]
    pub lng: Option<f64>,
    #[serde(default)]
    pub distance_km: Option<f64>,
    #[serde(default)]
    pub duration_s: Option<f64>,
}

impl NearbyItem {
    pub fn position(&self) -> Option<LatLng> {
        let point = LatLng::new(self.lat?, self.lng?);
        point.is_valid().then_some(point)
    }

    /// Feature representation used to enrich the feature cache.
    pub fn to_feature(&self) -> Option<Feature> {
        Some(Feature {
            id: self.id,
            geometry: self.position()?,
            properties: FeatureProperties {
                kind: self.kind.clone(),
                title: self.title.clone(),
                ..FeatureProperties::default()
            },
        })
    }
}

/// Isochrone block as delivered by the nearby endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IsochroneWire {
    pub geojson: Value,
    #[serde(default)]
    pub ranges_s: Vec<f64>,
    #[serde(default)]
    pub user_settings: UserSettings,
}

/// One poll response of the nearby endpoint.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct NearbyResponse {
    #[serde(default)]
    pub items: Vec<NearbyItem>,
    #[serde(default)]
    pub running: bool,
    #[serde(default)]
    pub partial: bool,
    #[serde(default)]
    pub stale: bool,
    #[serde(default)]
    pub progress: Option<NearbyProgress>,
    #[serde(default)]
    pub isochrones: Option<IsochroneWire>,
}

impl NearbyResponse {
    /// Whether the backend job is not finished yet and a later poll may return more.
    pub fn is_pending(&self) -> bool {
        self.items.is_empty() || self.running || self.partial || self.stale
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_running_response_with_defaults() {
        let response: NearbyResponse = serde_json::from_value(json!({
            "items": [],
            "running": true,
            "progress": { "done": 2, "total": 10 }
        }))
        .expect("response should decode");
        assert!(response.is_pending());
        assert_eq!(response.progress, Some(NearbyProgress { done: 2, total: 10 }));
        assert!(response.isochrones.is_none());
    }

    #[test]
    fn finished_response_with_items_is_not_pending() {
        let response: NearbyResponse = serde_json::from_value(json!({
            "items": [{ "id": 7, "type": "poi", "title": "Bakery", "lat": 47.1, "lng": 8.2 }]
        }))
        .expect("response should decode");
        assert!(!response.is_pending());
        let feature = response.items[0].to_feature().expect("item has coordinates");
        assert_eq!(feature.geometry, LatLng::new(47.1, 8.2));
    }
}
