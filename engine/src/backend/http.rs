use serde_json::Value;
use tracing::{debug, warn};
use waypoint_shared::{
    FeatureId, FeatureProperties, GeocoderHit, InternalHit, InternalSearchResponse, NearbyResponse,
    ParsedFeatures, parse_feature_collection,
};

use super::{Backend, GeocodeRequest};
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::search::bias_countries;
use crate::viewport::ViewportQuery;

const USER_AGENT: &str = "waypoint-engine/0.1";

/// `reqwest` implementation of [`Backend`] against the REST endpoints and a
/// Nominatim-compatible geocoder.
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: reqwest::Client,
    api_base_url: String,
    geocoder_url: String,
}

impl HttpBackend {
    pub fn new(config: &EngineConfig) -> Self {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(config.http_timeout)
            .connect_timeout(config.http_connect_timeout)
            .build()
            .or_else(|e| {
                warn!(
                    error = %e,
                    "failed to build configured HTTP client, retrying without custom user-agent"
                );
                reqwest::Client::builder()
                    .timeout(config.http_timeout)
                    .connect_timeout(config.http_connect_timeout)
                    .build()
            })
            .unwrap_or_else(|e| {
                warn!(error = %e, "failed to build timeout-configured HTTP client, using defaults");
                reqwest::Client::new()
            });
        Self::with_client(client, config)
    }

    pub fn with_client(client: reqwest::Client, config: &EngineConfig) -> Self {
        Self {
            client,
            api_base_url: config.api_base_url.trim_end_matches('/').to_string(),
            geocoder_url: config.geocoder_url.clone(),
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{path}", self.api_base_url)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        endpoint: &'static str,
        request: reqwest::RequestBuilder,
    ) -> Result<T, EngineError> {
        let resp = request.send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(EngineError::Status {
                endpoint,
                status: status.as_u16(),
            });
        }
        let bytes = resp.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

impl Backend for HttpBackend {
    async fn fetch_features(&self, query: &ViewportQuery) -> Result<ParsedFeatures, EngineError> {
        let request = self
            .client
            .get(self.endpoint("features"))
            .query(&feature_params(query));
        let body: Value = self.get_json("features", request).await?;
        let parsed = parse_feature_collection(&body);
        if parsed.skipped > 0 {
            debug!(skipped = parsed.skipped, "skipped malformed features");
        }
        Ok(parsed)
    }

    async fn fetch_nearby(
        &self,
        origin_id: FeatureId,
        kind: &str,
        limit: usize,
    ) -> Result<NearbyResponse, EngineError> {
        let request = self.client.get(self.endpoint("nearby")).query(&[
            ("origin_id", origin_id.to_string()),
            ("type", kind.to_string()),
            ("limit", limit.to_string()),
        ]);
        self.get_json("nearby", request).await
    }

    async fn search_internal(&self, query: &str, limit: usize) -> Result<Vec<InternalHit>, EngineError> {
        let request = self
            .client
            .get(self.endpoint("search"))
            .query(&[("q", query.to_string()), ("limit", limit.to_string())]);
        let response: InternalSearchResponse = self.get_json("search", request).await?;
        Ok(response.results)
    }

    async fn geocode(&self, request: &GeocodeRequest) -> Result<Vec<GeocoderHit>, EngineError> {
        let builder = self
            .client
            .get(&self.geocoder_url)
            .query(&geocode_params(request));
        self.get_json("geocoder", builder).await
    }

    async fn fetch_detail(&self, kind: &str, id: FeatureId) -> Result<FeatureProperties, EngineError> {
        let request = self.client.get(self.endpoint(&format!("{kind}/{id}")));
        let body: Value = self.get_json("detail", request).await?;
        let map = body
            .get("properties")
            .and_then(Value::as_object)
            .or_else(|| body.as_object())
            .cloned()
            .ok_or_else(|| EngineError::Backend(format!("detail for {kind}/{id} is not an object")))?;
        Ok(FeatureProperties::from_map(map))
    }
}

fn feature_params(query: &ViewportQuery) -> Vec<(&'static str, String)> {
    let mut params = vec![
        ("lat", query.center.lat.to_string()),
        ("lng", query.center.lng.to_string()),
        ("limit", query.limit.to_string()),
    ];
    if let Some(radius_km) = query.radius_km {
        params.push(("radius_km", format!("{radius_km:.3}")));
    }
    if !query.included_types.is_empty() {
        params.push(("types", query.included_types.join(",")));
    }
    params
}

/// Nominatim treats `countrycodes` as a filter, so the bias list carries the
/// neighbours that external ranking still rewards.
fn geocode_params(request: &GeocodeRequest) -> Vec<(&'static str, String)> {
    let mut params = vec![
        ("q", request.query.clone()),
        ("format", "jsonv2".to_string()),
        ("addressdetails", "1".to_string()),
        ("limit", request.limit.to_string()),
    ];
    if !request.country_bias.is_empty() {
        params.push(("countrycodes", bias_countries(&request.country_bias).join(",")));
    }
    if let Some(viewbox) = request.viewbox {
        params.push((
            "viewbox",
            format!(
                "{},{},{},{}",
                viewbox.west, viewbox.north, viewbox.east, viewbox.south
            ),
        ));
    }
    params
}
