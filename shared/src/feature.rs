use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::geo::LatLng;

pub type FeatureId = i64;

/// A geolocated point entity (charging site, point of interest, service spot).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feature {
    pub id: FeatureId,
    pub geometry: LatLng,
    pub properties: FeatureProperties,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FeatureProperties {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub recommended: bool,
    /// Domain attributes (power, opening hours, address, ...).
    #[serde(flatten)]
    pub attributes: Map<String, Value>,
}

impl FeatureProperties {
    /// Build from a raw GeoJSON `properties` object. Keys consumed by the typed
    /// fields are removed from the attribute map.
    pub fn from_map(mut map: Map<String, Value>) -> Self {
        map.remove("id");
        let kind = take_string(&mut map, "type");
        let title = take_string(&mut map, "title")
            .or_else(|| take_string(&mut map, "name"))
            .unwrap_or_default();
        let recommended = ["recommended", "is_recommended", "isRecommended"]
            .iter()
            .filter_map(|key| map.remove(*key))
            .any(|value| truthy(&value));
        Self {
            kind: kind.unwrap_or_default(),
            title,
            recommended,
            attributes: map,
        }
    }

    /// Additive merge: incoming values fill in or refresh fields, but null or
    /// empty incoming values never replace what is already known.
    /// Returns whether anything changed.
    pub fn merge_from(&mut self, incoming: &FeatureProperties) -> bool {
        let mut changed = false;
        if !incoming.kind.is_empty() && incoming.kind != self.kind {
            self.kind = incoming.kind.clone();
            changed = true;
        }
        if !incoming.title.is_empty() && incoming.title != self.title {
            self.title = incoming.title.clone();
            changed = true;
        }
        if incoming.recommended && !self.recommended {
            self.recommended = true;
            changed = true;
        }
        for (key, value) in &incoming.attributes {
            if is_blank(value) {
                continue;
            }
            if self.attributes.get(key) != Some(value) {
                self.attributes.insert(key.clone(), value.clone());
                changed = true;
            }
        }
        changed
    }
}

impl Feature {
    /// Parse a single GeoJSON point feature. Returns `None` when the id or the
    /// geometry is missing or malformed.
    pub fn from_geojson(value: &Value) -> Option<Self> {
        let properties = value
            .get("properties")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();
        let id = properties
            .get("id")
            .and_then(as_feature_id)
            .or_else(|| value.get("id").and_then(as_feature_id))?;

        let geometry = value.get("geometry")?;
        if let Some(kind) = geometry.get("type").and_then(Value::as_str)
            && kind != "Point"
        {
            return None;
        }
        let coords = geometry.get("coordinates")?.as_array()?;
        let lng = coords.first()?.as_f64()?;
        let lat = coords.get(1)?.as_f64()?;
        let point = LatLng::new(lat, lng);
        if !point.is_valid() {
            return None;
        }

        Some(Self {
            id,
            geometry: point,
            properties: FeatureProperties::from_map(properties),
        })
    }
}

/// Result of parsing a FeatureCollection: usable features plus the number of
/// entries skipped because their id or geometry was malformed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedFeatures {
    pub features: Vec<Feature>,
    pub skipped: usize,
}

pub fn parse_feature_collection(value: &Value) -> ParsedFeatures {
    let Some(entries) = value.get("features").and_then(Value::as_array) else {
        return ParsedFeatures::default();
    };
    let mut parsed = ParsedFeatures {
        features: Vec::with_capacity(entries.len()),
        skipped: 0,
    };
    for entry in entries {
        match Feature::from_geojson(entry) {
            Some(feature) => parsed.features.push(feature),
            None => parsed.skipped += 1,
        }
    }
    parsed
}

fn as_feature_id(value: &Value) -> Option<FeatureId> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn take_string(map: &mut Map<String, Value>, key: &str) -> Option<String> {
    match map.remove(key)? {
        Value::String(s) => Some(s),
        Value::Null => None,
        other => Some(other.to_string()),
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|v| v != 0.0),
        Value::String(s) => matches!(s.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"),
        _ => false,
    }
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_point_feature_with_properties() {
        let value = json!({
            "type": "Feature",
            "geometry": { "type": "Point", "coordinates": [8.54, 47.37] },
            "properties": {
                "id": 42,
                "type": "charging_site",
                "title": "Hub Zurich",
                "is_recommended": "1",
                "power_kw": 150
            }
        });
        let feature = Feature::from_geojson(&value).expect("feature should parse");
        assert_eq!(feature.id, 42);
        assert_eq!(feature.geometry, LatLng::new(47.37, 8.54));
        assert_eq!(feature.properties.kind, "charging_site");
        assert_eq!(feature.properties.title, "Hub Zurich");
        assert!(feature.properties.recommended);
        assert_eq!(feature.properties.attributes.get("power_kw"), Some(&json!(150)));
        assert!(!feature.properties.attributes.contains_key("id"));
    }

    #[test]
    fn skips_malformed_entries_without_aborting_batch() {
        let value = json!({
            "type": "FeatureCollection",
            "features": [
                { "geometry": { "type": "Point", "coordinates": [8.0, 47.0] }, "properties": { "id": 1 } },
                { "geometry": { "type": "Point", "coordinates": [8.0] }, "properties": { "id": 2 } },
                { "geometry": { "type": "Point", "coordinates": [8.0, 95.0] }, "properties": { "id": 3 } },
                { "geometry": null, "properties": { "id": 4 } },
                { "geometry": { "type": "Point", "coordinates": [9.0, 46.0] }, "properties": { "title": "no id" } },
                { "geometry": { "type": "Point", "coordinates": [9.0, 46.0] }, "properties": { "id": "5" } }
            ]
        });
        let parsed = parse_feature_collection(&value);
        let ids: Vec<_> = parsed.features.iter().map(|f| f.id).collect();
        assert_eq!(ids, vec![1, 5]);
        assert_eq!(parsed.skipped, 4);
    }

    #[test]
    fn merge_never_drops_known_fields() {
        let mut known = FeatureProperties::from_map(
            json!({ "type": "poi", "title": "Cafe", "phone": "123", "rating": 4 })
                .as_object()
                .cloned()
                .unwrap_or_default(),
        );
        let sparse = FeatureProperties::from_map(
            json!({ "type": "poi", "title": "", "phone": null, "hours": "8-18" })
                .as_object()
                .cloned()
                .unwrap_or_default(),
        );
        assert!(known.merge_from(&sparse));
        assert_eq!(known.title, "Cafe");
        assert_eq!(known.attributes.get("phone"), Some(&json!("123")));
        assert_eq!(known.attributes.get("rating"), Some(&json!(4)));
        assert_eq!(known.attributes.get("hours"), Some(&json!("8-18")));
    }

    #[test]
    fn merge_is_idempotent() {
        let incoming = FeatureProperties::from_map(
            json!({ "type": "poi", "title": "Cafe", "hours": "8-18" })
                .as_object()
                .cloned()
                .unwrap_or_default(),
        );
        let mut props = FeatureProperties::default();
        assert!(props.merge_from(&incoming));
        let once = props.clone();
        assert!(!props.merge_from(&incoming));
        assert_eq!(props, once);
    }
}
