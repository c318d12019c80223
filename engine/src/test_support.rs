use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use serde_json::json;
use tokio::sync::oneshot;
use waypoint_shared::{
    Bounds, Feature, FeatureId, FeatureProperties, GeocoderAddress, GeocoderHit, InternalHit,
    IsochroneWire, LatLng, NearbyItem, NearbyProgress, NearbyResponse, ParsedFeatures,
    UserSettings,
};

use crate::backend::{Backend, GeocodeRequest};
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::viewport::{MapView, ViewportQuery};

type Scripted<T> = Result<T, String>;

/// Scripted in-memory backend. Unscripted calls succeed with empty data.
#[derive(Default)]
pub struct MockBackend {
    features: Mutex<VecDeque<Scripted<ParsedFeatures>>>,
    feature_gates: Mutex<VecDeque<oneshot::Receiver<()>>>,
    feature_queries: Mutex<Vec<ViewportQuery>>,
    nearby: Mutex<HashMap<FeatureId, VecDeque<Scripted<NearbyResponse>>>>,
    nearby_gates: Mutex<HashMap<FeatureId, oneshot::Receiver<()>>>,
    internal: Mutex<HashMap<String, Scripted<Vec<InternalHit>>>>,
    geocoder: Mutex<HashMap<String, Scripted<Vec<GeocoderHit>>>>,
    geocode_requests: Mutex<Vec<GeocodeRequest>>,
    details: Mutex<HashMap<FeatureId, Scripted<FeatureProperties>>>,
    feature_calls: AtomicU32,
    nearby_calls: AtomicU32,
    internal_calls: AtomicU32,
    geocode_calls: AtomicU32,
    detail_calls: AtomicU32,
}

impl MockBackend {
    pub fn script_features(&self, result: Scripted<ParsedFeatures>) {
        self.features.lock().unwrap().push_back(result);
    }

    /// The next feature request waits until the returned sender fires or drops.
    pub fn gate_next_features(&self) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        self.feature_gates.lock().unwrap().push_back(rx);
        tx
    }

    pub fn script_nearby(&self, origin_id: FeatureId, response: NearbyResponse) {
        self.script_nearby_result(origin_id, Ok(response));
    }

    pub fn script_nearby_result(&self, origin_id: FeatureId, result: Scripted<NearbyResponse>) {
        self.nearby
            .lock()
            .unwrap()
            .entry(origin_id)
            .or_default()
            .push_back(result);
    }

    /// The first nearby request for `origin_id` waits on the returned sender.
    pub fn gate_nearby(&self, origin_id: FeatureId) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        self.nearby_gates.lock().unwrap().insert(origin_id, rx);
        tx
    }

    pub fn script_internal(&self, query: &str, result: Scripted<Vec<InternalHit>>) {
        self.internal.lock().unwrap().insert(query.to_string(), result);
    }

    pub fn script_geocoder(&self, query: &str, result: Scripted<Vec<GeocoderHit>>) {
        self.geocoder.lock().unwrap().insert(query.to_string(), result);
    }

    pub fn script_detail(&self, id: FeatureId, result: Scripted<FeatureProperties>) {
        self.details.lock().unwrap().insert(id, result);
    }

    pub fn feature_queries(&self) -> Vec<ViewportQuery> {
        self.feature_queries.lock().unwrap().clone()
    }

    pub fn geocode_requests(&self) -> Vec<GeocodeRequest> {
        self.geocode_requests.lock().unwrap().clone()
    }

    pub fn feature_calls(&self) -> u32 {
        self.feature_calls.load(Ordering::SeqCst)
    }

    pub fn nearby_calls(&self) -> u32 {
        self.nearby_calls.load(Ordering::SeqCst)
    }

    pub fn internal_calls(&self) -> u32 {
        self.internal_calls.load(Ordering::SeqCst)
    }

    pub fn geocode_calls(&self) -> u32 {
        self.geocode_calls.load(Ordering::SeqCst)
    }

    pub fn detail_calls(&self) -> u32 {
        self.detail_calls.load(Ordering::SeqCst)
    }
}

fn scripted<T>(result: Scripted<T>) -> Result<T, EngineError> {
    result.map_err(EngineError::Backend)
}

impl Backend for MockBackend {
    async fn fetch_features(&self, query: &ViewportQuery) -> Result<ParsedFeatures, EngineError> {
        self.feature_calls.fetch_add(1, Ordering::SeqCst);
        self.feature_queries.lock().unwrap().push(query.clone());
        let gate = self.feature_gates.lock().unwrap().pop_front();
        if let Some(gate) = gate {
            let _ = gate.await;
        }
        let next = self.features.lock().unwrap().pop_front();
        scripted(next.unwrap_or_else(|| Ok(ParsedFeatures::default())))
    }

    async fn fetch_nearby(
        &self,
        origin_id: FeatureId,
        _kind: &str,
        _limit: usize,
    ) -> Result<NearbyResponse, EngineError> {
        self.nearby_calls.fetch_add(1, Ordering::SeqCst);
        let gate = self.nearby_gates.lock().unwrap().remove(&origin_id);
        if let Some(gate) = gate {
            let _ = gate.await;
        }
        let next = self
            .nearby
            .lock()
            .unwrap()
            .get_mut(&origin_id)
            .and_then(VecDeque::pop_front);
        scripted(next.unwrap_or_else(|| Ok(NearbyResponse::default())))
    }

    async fn search_internal(&self, query: &str, _limit: usize) -> Result<Vec<InternalHit>, EngineError> {
        self.internal_calls.fetch_add(1, Ordering::SeqCst);
        let scripted_hits = self.internal.lock().unwrap().get(query).cloned();
        scripted(scripted_hits.unwrap_or_else(|| Ok(Vec::new())))
    }

    async fn geocode(&self, request: &GeocodeRequest) -> Result<Vec<GeocoderHit>, EngineError> {
        self.geocode_calls.fetch_add(1, Ordering::SeqCst);
        self.geocode_requests.lock().unwrap().push(request.clone());
        let scripted_hits = self.geocoder.lock().unwrap().get(&request.query).cloned();
        scripted(scripted_hits.unwrap_or_else(|| Ok(Vec::new())))
    }

    async fn fetch_detail(&self, _kind: &str, id: FeatureId) -> Result<FeatureProperties, EngineError> {
        self.detail_calls.fetch_add(1, Ordering::SeqCst);
        let detail = self.details.lock().unwrap().get(&id).cloned();
        scripted(detail.unwrap_or_else(|| Ok(FeatureProperties::default())))
    }
}

/// Defaults with polling delays short enough for tests.
pub fn test_config() -> EngineConfig {
    EngineConfig {
        nearby_retry_delay: Duration::from_millis(1),
        ..EngineConfig::default()
    }
}

/// Zoom-12 view roughly 45 x 45 km around `center`.
pub fn view_at(center: LatLng) -> MapView {
    MapView {
        bounds: Bounds::around(center, 0.2, 0.3),
        zoom: 12.0,
    }
}

pub fn feature(id: FeatureId, lat: f64, lng: f64) -> Feature {
    Feature {
        id,
        geometry: LatLng::new(lat, lng),
        properties: FeatureProperties {
            kind: "charging_site".to_string(),
            title: format!("Site {id}"),
            ..FeatureProperties::default()
        },
    }
}

pub fn parsed(features: Vec<Feature>) -> ParsedFeatures {
    ParsedFeatures {
        features,
        skipped: 0,
    }
}

pub fn pending_nearby(done: u32, total: u32) -> NearbyResponse {
    NearbyResponse {
        running: true,
        progress: Some(NearbyProgress { done, total }),
        ..NearbyResponse::default()
    }
}

pub fn ready_nearby(items: Vec<NearbyItem>) -> NearbyResponse {
    NearbyResponse {
        items,
        ..NearbyResponse::default()
    }
}

pub fn nearby_items(count: usize) -> Vec<NearbyItem> {
    (0..count)
        .map(|i| NearbyItem {
            id: 1000 + i as FeatureId,
            kind: "poi".to_string(),
            title: format!("Nearby {i}"),
            lat: Some(48.0 + i as f64 * 0.001),
            lng: Some(11.0),
            distance_km: Some(0.1 * (i + 1) as f64),
            duration_s: Some(60.0 * (i + 1) as f64),
        })
        .collect()
}

/// Three-band isochrone block at 5/10/15 minutes.
pub fn isochrone_wire(walking_speed: f64) -> IsochroneWire {
    IsochroneWire {
        geojson: json!({
            "type": "FeatureCollection",
            "features": [
                { "type": "Feature", "properties": { "value": 300.0 }, "geometry": null },
                { "type": "Feature", "properties": { "value": 600.0 }, "geometry": null },
                { "type": "Feature", "properties": { "value": 900.0 }, "geometry": null }
            ]
        }),
        ranges_s: vec![300.0, 600.0, 900.0],
        user_settings: UserSettings {
            enabled: true,
            walking_speed,
        },
    }
}

pub fn internal_hit(id: FeatureId, title: &str, confidence: f64) -> InternalHit {
    InternalHit {
        id,
        title: title.to_string(),
        address: String::new(),
        type_label: "Charging".to_string(),
        confidence,
        lat: 48.1,
        lng: 11.5,
        is_recommended: false,
    }
}

pub fn geocoder_hit(display_name: &str, importance: f64, country: &str) -> GeocoderHit {
    GeocoderHit {
        display_name: display_name.to_string(),
        lat: 48.2,
        lon: 11.6,
        importance,
        address: GeocoderAddress {
            country_code: Some(country.to_string()),
        },
    }
}

pub fn with_isochrones(mut response: NearbyResponse) -> NearbyResponse {
    response.isochrones = Some(isochrone_wire(5.0));
    response
}
