mod http;

use std::future::Future;

use waypoint_shared::{
    Bounds, FeatureId, FeatureProperties, GeocoderHit, InternalHit, NearbyResponse, ParsedFeatures,
};

use crate::error::EngineError;
use crate::viewport::ViewportQuery;

pub use http::HttpBackend;

/// Request sent to the external geocoding provider.
#[derive(Debug, Clone, PartialEq)]
pub struct GeocodeRequest {
    pub query: String,
    /// Lowercase ISO country code used as bias.
    pub country_bias: String,
    pub viewbox: Option<Bounds>,
    pub limit: usize,
}

/// Remote collaborators the engine talks to: the feature backend and the
/// external geocoder.
pub trait Backend: Send + Sync + 'static {
    fn fetch_features(
        &self,
        query: &ViewportQuery,
    ) -> impl Future<Output = Result<ParsedFeatures, EngineError>> + Send;

    fn fetch_nearby(
        &self,
        origin_id: FeatureId,
        kind: &str,
        limit: usize,
    ) -> impl Future<Output = Result<NearbyResponse, EngineError>> + Send;

    fn search_internal(
        &self,
        query: &str,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<InternalHit>, EngineError>> + Send;

    fn geocode(
        &self,
        request: &GeocodeRequest,
    ) -> impl Future<Output = Result<Vec<GeocoderHit>, EngineError>> + Send;

    /// Type-specific detail endpoint; the result is merged into the cached feature.
    fn fetch_detail(
        &self,
        kind: &str,
        id: FeatureId,
    ) -> impl Future<Output = Result<FeatureProperties, EngineError>> + Send;
}
