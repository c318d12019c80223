use serde::{Deserialize, Deserializer, Serialize};

use crate::feature::FeatureId;
use crate::geo::LatLng;

/// Cache key form of a user query: trimmed and lowercased.
pub fn normalize_query(query: &str) -> String {
    query.trim().to_lowercase()
}

/// Internal confidence is already on a 0..100 scale.
pub fn internal_confidence(raw: f64) -> f64 {
    if raw.is_nan() {
        return 0.0;
    }
    raw.clamp(0.0, 100.0)
}

/// Geocoder importance is clamped to 0..150 and mapped onto 0..100.
pub fn external_confidence(importance: f64) -> f64 {
    if importance.is_nan() {
        return 0.0;
    }
    (importance.clamp(0.0, 150.0) / 1.5).clamp(0.0, 100.0)
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct InternalSearchResponse {
    #[serde(default)]
    pub results: Vec<InternalHit>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InternalHit {
    pub id: FeatureId,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub type_label: String,
    #[serde(default)]
    pub confidence: f64,
    #[serde(deserialize_with = "lenient_f64")]
    pub lat: f64,
    #[serde(deserialize_with = "lenient_f64")]
    pub lng: f64,
    #[serde(default)]
    pub is_recommended: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GeocoderAddress {
    #[serde(default)]
    pub country_code: Option<String>,
}

/// One hit of the external geocoding provider (Nominatim-style `jsonv2`).
#[derive(Debug, Clone, Deserialize)]
pub struct GeocoderHit {
    #[serde(alias = "displayName")]
    pub display_name: String,
    #[serde(deserialize_with = "lenient_f64")]
    pub lat: f64,
    #[serde(deserialize_with = "lenient_f64")]
    pub lon: f64,
    #[serde(default)]
    pub importance: f64,
    #[serde(default)]
    pub address: GeocoderAddress,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InternalCandidate {
    pub id: FeatureId,
    pub title: String,
    pub address: String,
    pub type_label: String,
    pub confidence: f64,
    pub lat: f64,
    pub lng: f64,
    pub recommended: bool,
}

impl InternalCandidate {
    pub fn from_hit(hit: InternalHit) -> Option<Self> {
        LatLng::new(hit.lat, hit.lng).is_valid().then(|| Self {
            id: hit.id,
            title: hit.title,
            address: hit.address,
            type_label: hit.type_label,
            confidence: internal_confidence(hit.confidence),
            lat: hit.lat,
            lng: hit.lng,
            recommended: hit.is_recommended,
        })
    }

    pub const fn position(&self) -> LatLng {
        LatLng::new(self.lat, self.lng)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternalCandidate {
    pub display_name: String,
    pub lat: f64,
    pub lng: f64,
    pub confidence: f64,
    /// Lowercase ISO 3166-1 alpha-2 code.
    pub country: Option<String>,
}

impl ExternalCandidate {
    pub fn from_hit(hit: GeocoderHit) -> Option<Self> {
        LatLng::new(hit.lat, hit.lon).is_valid().then(|| Self {
            display_name: hit.display_name,
            lat: hit.lat,
            lng: hit.lon,
            confidence: external_confidence(hit.importance),
            country: hit.address.country_code.map(|c| c.to_ascii_lowercase()),
        })
    }

    pub const fn position(&self) -> LatLng {
        LatLng::new(self.lat, self.lng)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum SearchCandidate {
    Internal(InternalCandidate),
    External(ExternalCandidate),
}

impl SearchCandidate {
    pub const fn position(&self) -> LatLng {
        match self {
            Self::Internal(c) => c.position(),
            Self::External(c) => c.position(),
        }
    }

    pub const fn confidence(&self) -> f64 {
        match self {
            Self::Internal(c) => c.confidence,
            Self::External(c) => c.confidence,
        }
    }
}

fn lenient_f64<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum NumberOrString {
        Number(f64),
        String(String),
    }

    match NumberOrString::deserialize(deserializer)? {
        NumberOrString::Number(n) => Ok(n),
        NumberOrString::String(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}
