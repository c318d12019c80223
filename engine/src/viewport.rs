use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::task::AbortHandle;
use tracing::debug;
use waypoint_shared::{Bounds, Feature, LatLng};

use crate::backend::Backend;
use crate::config::{EngineConfig, HYSTERESIS_RADIUS_SHARE, RADIUS_MARGIN};
use crate::error::EngineError;
use crate::feature_cache::CenterFilter;

/// Current pan/zoom state of the map.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MapView {
    pub bounds: Bounds,
    pub zoom: f64,
}

impl MapView {
    pub fn center(&self) -> LatLng {
        self.bounds.center()
    }

    /// Same zoom and span, centered elsewhere.
    pub fn recentered(&self, center: LatLng) -> Self {
        Self {
            bounds: self.bounds.recentered(center),
            zoom: self.zoom,
        }
    }
}

/// Radius query derived from the current bounds. A fallback query carries no
/// radius and a large limit.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewportQuery {
    pub center: LatLng,
    pub radius_km: Option<f64>,
    pub included_types: Vec<String>,
    pub limit: usize,
}

impl ViewportQuery {
    pub fn fallback(&self, limit: usize) -> Self {
        Self {
            center: self.center,
            radius_km: None,
            included_types: self.included_types.clone(),
            limit,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FetchDecision {
    Fetch,
    BelowMinZoom { zoom: f64, min_zoom: u8 },
    WithinHysteresis { moved_km: f64, threshold_km: f64 },
}

/// Raw result of one radius fetch, before it is applied to engine state.
#[derive(Debug)]
pub enum FetchResult {
    Loaded {
        features: Vec<Feature>,
        skipped: usize,
        fallback: bool,
    },
    PrimaryFailed(EngineError),
    FallbackFailed(EngineError),
}

/// How a fetch ended, as seen by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    Rendered {
        fetched: usize,
        visible: usize,
        fallback: bool,
    },
    /// Primary request failed; the previous visible set stays on screen.
    Retained,
    /// Fallback request failed; an explicit empty set was rendered.
    Empty,
    /// A newer fetch started before this one finished.
    Superseded,
}

/// The single in-flight radius request.
#[derive(Debug)]
pub struct FetchSession {
    pub id: u64,
    pub center: LatLng,
    pub radius_km: f64,
    pub started_at: DateTime<Utc>,
    abort: Option<AbortHandle>,
}

impl FetchSession {
    pub fn elapsed_ms(&self) -> i64 {
        (Utc::now() - self.started_at).num_milliseconds()
    }

    fn cancel(self) {
        if let Some(abort) = self.abort {
            abort.abort();
        }
    }
}

/// Decides whether a view change needs a network request and tracks the last
/// completed fetch and the visible subset.
#[derive(Debug)]
pub struct ViewportController {
    view: MapView,
    min_radius_km: f64,
    max_radius_km: f64,
    hysteresis_km: f64,
    min_fetch_zoom: u8,
    fetch_limit: usize,
    included_types: Vec<String>,
    last_search_center: Option<LatLng>,
    last_search_radius_km: Option<f64>,
    last_completed_at: Option<DateTime<Utc>>,
    session: Option<FetchSession>,
    next_session_id: u64,
    visible: Arc<[Feature]>,
}

impl ViewportController {
    pub fn new(config: &EngineConfig, view: MapView) -> Self {
        Self {
            view,
            min_radius_km: config.min_radius_km,
            max_radius_km: config.max_radius_km,
            hysteresis_km: config.hysteresis_km,
            min_fetch_zoom: config.min_fetch_zoom,
            fetch_limit: config.fetch_limit,
            included_types: config.included_types.clone(),
            last_search_center: None,
            last_search_radius_km: None,
            last_completed_at: None,
            session: None,
            next_session_id: 0,
            visible: Arc::from(Vec::new()),
        }
    }

    pub fn view(&self) -> MapView {
        self.view
    }

    pub fn set_view(&mut self, view: MapView) {
        self.view = view;
    }

    pub fn visible(&self) -> Arc<[Feature]> {
        Arc::clone(&self.visible)
    }

    pub fn set_visible(&mut self, visible: Arc<[Feature]>) {
        self.visible = visible;
    }

    pub fn last_search_center(&self) -> Option<LatLng> {
        self.last_search_center
    }

    pub fn last_search_radius_km(&self) -> Option<f64> {
        self.last_search_radius_km
    }

    pub fn last_completed_at(&self) -> Option<DateTime<Utc>> {
        self.last_completed_at
    }

    pub fn has_completed_fetch(&self) -> bool {
        self.last_completed_at.is_some()
    }

    pub fn center_filter(&self) -> Option<CenterFilter> {
        Some(CenterFilter {
            center: self.last_search_center?,
            radius_km: self.last_search_radius_km?,
        })
    }

    /// Half the viewport diagonal with a margin, clamped to the configured range.
    pub fn compute_radius_km(&self, bounds: &Bounds) -> f64 {
        let radius = bounds.diagonal_km() / 2.0 * RADIUS_MARGIN;
        if !radius.is_finite() {
            return self.max_radius_km;
        }
        radius.clamp(self.min_radius_km, self.max_radius_km)
    }

    pub fn should_fetch(&self, center: LatLng, zoom: f64) -> FetchDecision {
        if zoom < f64::from(self.min_fetch_zoom) {
            return FetchDecision::BelowMinZoom {
                zoom,
                min_zoom: self.min_fetch_zoom,
            };
        }
        let (Some(last_center), Some(last_radius)) =
            (self.last_search_center, self.last_search_radius_km)
        else {
            return FetchDecision::Fetch;
        };
        let moved_km = last_center.distance_km(&center);
        let threshold_km = self.hysteresis_km.max(HYSTERESIS_RADIUS_SHARE * last_radius);
        if moved_km < threshold_km {
            FetchDecision::WithinHysteresis {
                moved_km,
                threshold_km,
            }
        } else {
            FetchDecision::Fetch
        }
    }

    /// Start a new session at `center`, cancelling whatever was in flight.
    pub fn begin_session(&mut self, center: LatLng) -> (u64, ViewportQuery) {
        if let Some(previous) = self.session.take() {
            debug!(session = previous.id, "cancelling superseded radius fetch");
            previous.cancel();
        }
        self.next_session_id += 1;
        let radius_km = self.compute_radius_km(&self.view.bounds);
        let id = self.next_session_id;
        self.session = Some(FetchSession {
            id,
            center,
            radius_km,
            started_at: Utc::now(),
            abort: None,
        });
        let query = ViewportQuery {
            center,
            radius_km: Some(radius_km),
            included_types: self.included_types.clone(),
            limit: self.fetch_limit,
        };
        (id, query)
    }

    pub fn attach_abort(&mut self, session_id: u64, abort: AbortHandle) {
        match self.session.as_mut() {
            Some(session) if session.id == session_id => session.abort = Some(abort),
            _ => abort.abort(),
        }
    }

    pub fn is_current_session(&self, session_id: u64) -> bool {
        self.session
            .as_ref()
            .is_some_and(|session| session.id == session_id)
    }

    pub fn in_flight(&self) -> Option<&FetchSession> {
        self.session.as_ref()
    }

    /// Close the session and hand it back. `None` if it was superseded.
    pub fn finish_session(&mut self, session_id: u64) -> Option<FetchSession> {
        if !self.is_current_session(session_id) {
            return None;
        }
        self.session.take()
    }

    /// Returns when the previous fetch completed, if one did.
    pub fn record_completion(&mut self, center: LatLng, radius_km: f64) -> Option<DateTime<Utc>> {
        self.last_search_center = Some(center);
        self.last_search_radius_km = Some(radius_km);
        self.last_completed_at.replace(Utc::now())
    }
}

/// Primary radius query, with the unfiltered fallback when it comes back empty.
pub async fn run_fetch<B: Backend>(
    backend: &B,
    query: &ViewportQuery,
    fallback_limit: usize,
) -> FetchResult {
    let primary = match backend.fetch_features(query).await {
        Ok(parsed) => parsed,
        Err(e) => return FetchResult::PrimaryFailed(e),
    };
    if !primary.features.is_empty() {
        return FetchResult::Loaded {
            features: primary.features,
            skipped: primary.skipped,
            fallback: false,
        };
    }

    let radius_km = query.radius_km.unwrap_or(f64::INFINITY);
    debug!(
        lat = query.center.lat,
        lng = query.center.lng,
        radius_km,
        "radius fetch returned no features, running fallback query"
    );
    match backend.fetch_features(&query.fallback(fallback_limit)).await {
        Ok(parsed) => {
            let total = parsed.features.len();
            let features: Vec<Feature> = parsed
                .features
                .into_iter()
                .filter(|feature| query.center.distance_km(&feature.geometry) <= radius_km)
                .collect();
            debug!(total, kept = features.len(), "filtered fallback features by distance");
            FetchResult::Loaded {
                features,
                skipped: primary.skipped + parsed.skipped,
                fallback: true,
            }
        }
        Err(e) => FetchResult::FallbackFailed(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn controller(min_fetch_zoom: u8) -> ViewportController {
        let config = EngineConfig {
            min_fetch_zoom,
            ..EngineConfig::default()
        };
        let view = MapView {
            bounds: Bounds::around(LatLng::new(48.0, 11.0), 0.2, 0.3),
            zoom: 12.0,
        };
        ViewportController::new(&config, view)
    }

    /// Point `km` kilometres north of `origin`.
    fn north_of(origin: LatLng, km: f64) -> LatLng {
        LatLng::new(origin.lat + km / 111.195, origin.lng)
    }

    #[test]
    fn radius_is_half_diagonal_with_margin() {
        let vp = controller(9);
        let bounds = Bounds::new(48.0, 11.0, 48.2, 11.3);
        let expected = bounds.diagonal_km() / 2.0 * 1.1;
        assert!((vp.compute_radius_km(&bounds) - expected).abs() < 1e-9);
    }

    #[test]
    fn radius_is_clamped() {
        let vp = controller(9);
        let tiny = Bounds::new(48.0, 11.0, 48.0001, 11.0001);
        assert_eq!(vp.compute_radius_km(&tiny), 1.0);
        let continent = Bounds::new(35.0, -10.0, 60.0, 30.0);
        assert_eq!(vp.compute_radius_km(&continent), 150.0);
    }

    #[test]
    fn first_fetch_is_always_allowed() {
        let vp = controller(9);
        assert_eq!(vp.should_fetch(LatLng::new(48.0, 11.0), 12.0), FetchDecision::Fetch);
    }

    #[test]
    fn zoomed_out_view_does_not_fetch() {
        let vp = controller(9);
        assert!(matches!(
            vp.should_fetch(LatLng::new(48.0, 11.0), 8.0),
            FetchDecision::BelowMinZoom { min_zoom: 9, .. }
        ));
    }

    #[test]
    fn hysteresis_scales_with_last_radius() {
        let mut vp = controller(9);
        let origin = LatLng::new(48.0, 11.0);
        vp.record_completion(origin, 50.0);

        match vp.should_fetch(north_of(origin, 15.0), 12.0) {
            FetchDecision::WithinHysteresis { threshold_km, .. } => {
                assert!((threshold_km - 20.0).abs() < 1e-9);
            }
            other => panic!("expected hysteresis skip, got {other:?}"),
        }
        assert_eq!(vp.should_fetch(north_of(origin, 25.0), 12.0), FetchDecision::Fetch);
    }

    #[test]
    fn small_radius_uses_absolute_hysteresis_floor() {
        let mut vp = controller(9);
        let origin = LatLng::new(48.0, 11.0);
        vp.record_completion(origin, 2.0);
        assert!(matches!(
            vp.should_fetch(north_of(origin, 1.5), 12.0),
            FetchDecision::WithinHysteresis { .. }
        ));
        assert_eq!(vp.should_fetch(north_of(origin, 2.5), 12.0), FetchDecision::Fetch);
    }

    #[test]
    fn new_session_supersedes_previous() {
        let mut vp = controller(9);
        let (first, query) = vp.begin_session(LatLng::new(48.0, 11.0));
        assert_eq!(query.radius_km, Some(vp.compute_radius_km(&vp.view().bounds)));
        let (second, _) = vp.begin_session(LatLng::new(48.1, 11.0));
        assert!(!vp.is_current_session(first));
        assert!(vp.finish_session(first).is_none());
        let closed = vp.finish_session(second).expect("second session is current");
        assert_eq!(closed.id, second);
        assert!(closed.elapsed_ms() >= 0);
        assert!(vp.in_flight().is_none());
    }

    #[test]
    fn completion_reports_previous_completion_time() {
        let mut vp = controller(9);
        let origin = LatLng::new(48.0, 11.0);
        assert!(!vp.has_completed_fetch());
        assert_eq!(vp.record_completion(origin, 10.0), None);
        let first = vp.last_completed_at().expect("completion recorded");
        let previous = vp.record_completion(north_of(origin, 30.0), 10.0);
        assert_eq!(previous, Some(first));
        assert!(vp.last_completed_at().is_some_and(|latest| latest >= first));
    }

    #[test]
    fn fallback_query_drops_radius() {
        let query = ViewportQuery {
            center: LatLng::new(48.0, 11.0),
            radius_km: Some(12.0),
            included_types: vec!["poi".to_string()],
            limit: 500,
        };
        let fallback = query.fallback(5000);
        assert_eq!(fallback.radius_km, None);
        assert_eq!(fallback.limit, 5000);
        assert_eq!(fallback.included_types, query.included_types);
    }
}
