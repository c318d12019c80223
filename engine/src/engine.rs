use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{RwLock, broadcast};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use waypoint_shared::{Feature, FeatureId, IsochronePayload, LatLng, NearbyItem, SearchCandidate};

use crate::backend::Backend;
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::events::{EngineEvent, EventBus};
use crate::feature_cache::FeatureCache;
use crate::generation::{Generation, RequestGeneration};
use crate::highlight::{HighlightSync, HighlightView, SortMode};
use crate::isochrone::{ApplyOutcome, IsochroneOverlay, IsochroneView};
use crate::nearby::{NearbyClient, NearbyMeta, NearbyRequest, PollOutcome};
use crate::retry::RetryPolicy;
use crate::search::{SearchEngine, SearchResults};
use crate::viewport::{
    FetchDecision, FetchOutcome, FetchResult, MapView, ViewportController, ViewportQuery, run_fetch,
};

/// Result of applying a pan/zoom.
#[derive(Debug)]
pub struct ViewUpdate {
    pub decision: FetchDecision,
    /// Present when the change started a radius fetch.
    pub fetch: Option<JoinHandle<FetchOutcome>>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SelectionOutcome {
    Cleared,
    Completed {
        items: usize,
        done: bool,
        isochrone: Option<ApplyOutcome>,
    },
    /// Another selection was made before the nearby feed settled.
    Superseded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnrichOutcome {
    Merged { changed: bool },
    UnknownFeature,
    /// Detail request failed; the cached feature is untouched.
    Failed,
}

#[derive(Debug)]
pub enum SearchResolution {
    Internal {
        id: FeatureId,
        fetch: FetchOutcome,
        /// Nearby feed and overlay for the chosen feature.
        selection: JoinHandle<Result<SelectionOutcome, EngineError>>,
    },
    External {
        position: LatLng,
    },
    NoResults,
}

/// Owns every piece of map state and coordinates the async workflows on it.
///
/// Cheap to clone; clones share state.
pub struct MapEngine<B> {
    config: Arc<EngineConfig>,
    backend: Arc<B>,
    cache: Arc<FeatureCache>,
    generation: Arc<RequestGeneration>,
    viewport: Arc<RwLock<ViewportController>>,
    highlight: Arc<RwLock<HighlightSync>>,
    overlay: Arc<RwLock<IsochroneOverlay>>,
    search: Arc<SearchEngine>,
    events: EventBus,
}

impl<B> Clone for MapEngine<B> {
    fn clone(&self) -> Self {
        Self {
            config: Arc::clone(&self.config),
            backend: Arc::clone(&self.backend),
            cache: Arc::clone(&self.cache),
            generation: Arc::clone(&self.generation),
            viewport: Arc::clone(&self.viewport),
            highlight: Arc::clone(&self.highlight),
            overlay: Arc::clone(&self.overlay),
            search: Arc::clone(&self.search),
            events: self.events.clone(),
        }
    }
}

impl<B: Backend> MapEngine<B> {
    pub fn new(config: EngineConfig, backend: B, view: MapView) -> Self {
        Self {
            viewport: Arc::new(RwLock::new(ViewportController::new(&config, view))),
            highlight: Arc::new(RwLock::new(HighlightSync::new())),
            overlay: Arc::new(RwLock::new(IsochroneOverlay::new(
                config.reference_walking_speed_kmh,
            ))),
            search: Arc::new(SearchEngine::new(&config)),
            events: EventBus::new(config.event_buffer),
            cache: Arc::new(FeatureCache::new()),
            generation: Arc::new(RequestGeneration::new()),
            backend: Arc::new(backend),
            config: Arc::new(config),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn cache(&self) -> &FeatureCache {
        &self.cache
    }

    pub fn current_generation(&self) -> Generation {
        self.generation.current()
    }

    pub async fn view(&self) -> MapView {
        self.viewport.read().await.view()
    }

    pub async fn visible(&self) -> Arc<[Feature]> {
        self.viewport.read().await.visible()
    }

    pub async fn active_id(&self) -> Option<FeatureId> {
        self.highlight.read().await.active_id()
    }

    pub async fn highlight_view(&self) -> HighlightView {
        let visible = self.visible().await;
        let highlight = self.highlight.read().await;
        let active_position = highlight.active_id().and_then(|id| self.cache.position(id));
        highlight.render(&visible, active_position)
    }

    pub async fn isochrone_view(&self) -> IsochroneView {
        self.overlay.read().await.view()
    }

    // ---- viewport ----

    /// Apply a pan/zoom. Either starts a radius fetch or recomputes the visible
    /// subset from the cache.
    pub async fn on_view_changed(&self, view: MapView) -> ViewUpdate {
        let decision = {
            let mut viewport = self.viewport.write().await;
            viewport.set_view(view);
            viewport.should_fetch(view.center(), view.zoom)
        };
        match decision {
            FetchDecision::Fetch => ViewUpdate {
                decision,
                fetch: Some(self.spawn_fetch(view.center()).await),
            },
            FetchDecision::BelowMinZoom { zoom, min_zoom } => {
                debug!(zoom, min_zoom, "zoomed out past fetch floor, using cache only");
                self.refresh_visible().await;
                ViewUpdate {
                    decision,
                    fetch: None,
                }
            }
            FetchDecision::WithinHysteresis {
                moved_km,
                threshold_km,
            } => {
                debug!(moved_km, threshold_km, "pan within hysteresis, using cache only");
                self.refresh_visible().await;
                ViewUpdate {
                    decision,
                    fetch: None,
                }
            }
        }
    }

    /// Keep zoom and span, move the center.
    pub async fn recenter(&self, center: LatLng) -> ViewUpdate {
        let view = self.view().await.recentered(center);
        self.on_view_changed(view).await
    }

    /// Run a radius fetch in the background. Starting another fetch aborts it.
    pub async fn spawn_fetch(&self, center: LatLng) -> JoinHandle<FetchOutcome> {
        let (session_id, query) = self.viewport.write().await.begin_session(center);
        let engine = self.clone();
        let handle = tokio::spawn(async move { engine.complete_fetch(session_id, query).await });
        self.viewport
            .write()
            .await
            .attach_abort(session_id, handle.abort_handle());
        handle
    }

    /// Radius fetch at `center`, bypassing the hysteresis check.
    pub async fn fetch(&self, center: LatLng) -> FetchOutcome {
        let (session_id, query) = self.viewport.write().await.begin_session(center);
        self.complete_fetch(session_id, query).await
    }

    async fn complete_fetch(&self, session_id: u64, query: ViewportQuery) -> FetchOutcome {
        let result = run_fetch(self.backend.as_ref(), &query, self.config.fallback_limit).await;

        let (first_load, elapsed_ms, since_previous_ms) = {
            let mut viewport = self.viewport.write().await;
            let Some(session) = viewport.finish_session(session_id) else {
                debug!(session = session_id, "discarding superseded radius fetch");
                return FetchOutcome::Superseded;
            };
            let previous = if matches!(result, FetchResult::Loaded { .. }) {
                let radius_km = query.radius_km.unwrap_or(self.config.max_radius_km);
                viewport.record_completion(query.center, radius_km)
            } else {
                viewport.last_completed_at()
            };
            (
                !viewport.has_completed_fetch(),
                session.elapsed_ms(),
                previous.map(|at| (Utc::now() - at).num_milliseconds()),
            )
        };

        match result {
            FetchResult::Loaded {
                features,
                skipped,
                fallback,
            } => {
                let fetched = features.len();
                if skipped > 0 {
                    warn!(skipped, "skipped malformed features in radius response");
                }
                let changed = self.cache.upsert_many(features);
                let visible = self.refresh_visible().await;
                info!(
                    fetched,
                    changed,
                    visible,
                    fallback,
                    elapsed_ms,
                    since_previous_ms,
                    cached = self.cache.len(),
                    "radius fetch applied"
                );
                FetchOutcome::Rendered {
                    fetched,
                    visible,
                    fallback,
                }
            }
            FetchResult::PrimaryFailed(e) => {
                warn!(error = %e, elapsed_ms, since_previous_ms, "radius fetch failed, keeping previous features");
                if first_load {
                    self.events.emit(EngineEvent::InitialLoadFailed {
                        message: e.to_string(),
                    });
                }
                FetchOutcome::Retained
            }
            FetchResult::FallbackFailed(e) => {
                warn!(error = %e, "fallback fetch failed, rendering no features");
                self.publish_visible(Arc::from(Vec::new())).await;
                FetchOutcome::Empty
            }
        }
    }

    /// Recompute the visible subset from the cache and publish it.
    pub async fn refresh_visible(&self) -> usize {
        let (bounds, filter) = {
            let viewport = self.viewport.read().await;
            (viewport.view().bounds, viewport.center_filter())
        };
        let visible: Arc<[Feature]> = self.cache.select_visible(&bounds, filter).into();
        self.publish_visible(visible).await
    }

    async fn publish_visible(&self, visible: Arc<[Feature]>) -> usize {
        self.viewport.write().await.set_visible(Arc::clone(&visible));
        self.events
            .emit(EngineEvent::VisibleFeaturesChanged(Arc::clone(&visible)));

        let reset_view = {
            let mut highlight = self.highlight.write().await;
            if highlight.reconcile(&visible) {
                self.generation.advance();
                let mut overlay = self.overlay.write().await;
                overlay.on_selection(None);
                Some(overlay.view())
            } else {
                None
            }
        };
        if let Some(overlay_view) = reset_view {
            debug!("active feature left the visible set, clearing selection");
            self.events.emit(EngineEvent::ActiveFeatureChanged(None));
            self.events
                .emit(EngineEvent::IsochroneStateChanged(Arc::new(overlay_view)));
        }
        self.publish_highlight().await;
        visible.len()
    }

    async fn publish_highlight(&self) {
        let view = self.highlight_view().await;
        self.events.emit(EngineEvent::HighlightChanged(Arc::new(view)));
    }

    // ---- selection ----

    /// Make `id` the active feature without loading anything for it. Returns
    /// the generation responses for this selection must carry.
    ///
    /// The generation, highlight and overlay change together under the
    /// highlight guard; the latest generation always belongs to the active id.
    pub async fn activate(&self, id: Option<FeatureId>) -> Generation {
        let (issued, changed, overlay_view) = {
            let mut highlight = self.highlight.write().await;
            let issued = self.generation.advance();
            let changed = highlight.set_active(id);
            let mut overlay = self.overlay.write().await;
            overlay.on_selection(id);
            (issued, changed, overlay.view())
        };
        if changed {
            self.events.emit(EngineEvent::ActiveFeatureChanged(id));
        }
        self.publish_highlight().await;
        self.events
            .emit(EngineEvent::IsochroneStateChanged(Arc::new(overlay_view)));
        issued
    }

    /// Select a feature and load its nearby feed and isochrones. Intermediate
    /// poll responses are published as they arrive.
    pub async fn select_feature(&self, id: Option<FeatureId>) -> Result<SelectionOutcome, EngineError> {
        let issued = self.activate(id).await;
        let Some(origin_id) = id else {
            return Ok(SelectionOutcome::Cleared);
        };

        let request = NearbyRequest {
            origin_id,
            kind: self
                .cache
                .get(origin_id)
                .map(|feature| feature.properties.kind)
                .unwrap_or_default(),
            limit: self.config.nearby_limit,
        };
        let policy = RetryPolicy::new(self.config.nearby_max_attempts, self.config.nearby_retry_delay);
        let client = NearbyClient::new(self.backend.as_ref(), &self.generation, policy);
        let events = &self.events;

        let outcome = client
            .poll(&request, issued, |response, attempt| {
                events.emit(EngineEvent::NearbyResult {
                    origin_id,
                    items: Arc::from(response.items.clone()),
                    meta: NearbyMeta {
                        generation: issued,
                        attempt,
                        progress: response.progress,
                        done: false,
                        empty: false,
                    },
                });
            })
            .await;

        let poll = match outcome {
            Ok(PollOutcome::Finished(poll)) => poll,
            Ok(PollOutcome::Abandoned) => return Ok(SelectionOutcome::Superseded),
            Err(e) => {
                warn!(origin_id, error = %e, "nearby request failed");
                self.finish_overlay_without_payload(issued).await;
                return Err(e);
            }
        };
        if !self.generation.is_current(issued) {
            debug!(origin_id, "selection changed after nearby feed settled");
            return Ok(SelectionOutcome::Superseded);
        }

        self.cache
            .upsert_many(poll.items.iter().filter_map(NearbyItem::to_feature));
        let item_count = poll.items.len();
        let items: Arc<[NearbyItem]> = Arc::from(poll.items);
        self.events.emit(EngineEvent::NearbyResult {
            origin_id,
            items,
            meta: NearbyMeta {
                generation: issued,
                attempt: poll.attempts,
                progress: poll.progress,
                done: true,
                empty: item_count == 0,
            },
        });

        let payload = poll
            .isochrones
            .and_then(|wire| IsochronePayload::from_wire(wire, origin_id));
        let isochrone = match payload {
            Some(payload) => Some(self.apply_isochrone(issued, payload).await),
            None => {
                self.finish_overlay_without_payload(issued).await;
                None
            }
        };

        Ok(SelectionOutcome::Completed {
            items: item_count,
            done: poll.done,
            isochrone,
        })
    }

    /// Hand an isochrone payload to the overlay. Payloads from a superseded
    /// selection are dropped without touching the overlay.
    pub async fn apply_isochrone(&self, issued: Generation, payload: IsochronePayload) -> ApplyOutcome {
        let (outcome, view) = {
            let mut overlay = self.overlay.write().await;
            let outcome = overlay.apply(issued, self.generation.current(), payload);
            (outcome, overlay.view())
        };
        match outcome {
            ApplyOutcome::Discarded => {
                debug!(issued = issued.value(), "discarding stale isochrone payload");
            }
            ApplyOutcome::Applied | ApplyOutcome::Deferred => {
                self.events
                    .emit(EngineEvent::IsochroneStateChanged(Arc::new(view)));
            }
        }
        outcome
    }

    async fn finish_overlay_without_payload(&self, issued: Generation) {
        let (changed, view) = {
            let mut overlay = self.overlay.write().await;
            let changed = overlay.finish_without_payload(issued, self.generation.current());
            (changed, overlay.view())
        };
        if changed {
            self.events
                .emit(EngineEvent::IsochroneStateChanged(Arc::new(view)));
        }
    }

    pub async fn lock_overlay(&self) -> bool {
        self.update_overlay(IsochroneOverlay::lock).await
    }

    pub async fn unlock_overlay(&self) -> bool {
        self.update_overlay(IsochroneOverlay::unlock).await
    }

    async fn update_overlay(&self, op: fn(&mut IsochroneOverlay) -> bool) -> bool {
        let (changed, view) = {
            let mut overlay = self.overlay.write().await;
            let changed = op(&mut *overlay);
            (changed, overlay.view())
        };
        if changed {
            self.events
                .emit(EngineEvent::IsochroneStateChanged(Arc::new(view)));
        }
        changed
    }

    /// Drop the selection, overlay and lock, and invalidate everything in flight.
    pub async fn teardown(&self) {
        let (cleared, view) = {
            let mut highlight = self.highlight.write().await;
            self.generation.advance();
            let cleared = highlight.clear();
            let mut overlay = self.overlay.write().await;
            overlay.teardown();
            (cleared, overlay.view())
        };
        if cleared {
            self.events.emit(EngineEvent::ActiveFeatureChanged(None));
        }
        self.events
            .emit(EngineEvent::IsochroneStateChanged(Arc::new(view)));
        self.publish_highlight().await;
    }

    pub async fn set_sort(&self, mode: SortMode) {
        self.highlight.write().await.set_sort(mode);
        self.publish_highlight().await;
    }

    pub async fn clear_search_address(&self) {
        self.highlight.write().await.clear_search_address();
        self.publish_highlight().await;
    }

    // ---- enrichment ----

    /// Fetch the type-specific detail record and merge it into the cache.
    pub async fn enrich(&self, id: FeatureId) -> EnrichOutcome {
        let Some(feature) = self.cache.get(id) else {
            return EnrichOutcome::UnknownFeature;
        };
        let properties = match self.backend.fetch_detail(&feature.properties.kind, id).await {
            Ok(properties) => properties,
            Err(e) => {
                warn!(id, kind = %feature.properties.kind, error = %e, "feature enrichment failed");
                return EnrichOutcome::Failed;
            }
        };
        let changed = self.cache.merge_properties(id, &properties).unwrap_or(false);
        if changed && self.visible().await.iter().any(|f| f.id == id) {
            self.refresh_visible().await;
        }
        EnrichOutcome::Merged { changed }
    }

    // ---- search ----

    /// Live suggestions: both providers side by side.
    pub async fn suggest(&self, query: &str) -> Result<SearchResults, EngineError> {
        let view = self.view().await;
        self.search
            .search(self.backend.as_ref(), query, Some(view.center()), Some(view.bounds))
            .await
    }

    /// Resolve a committed search to one candidate and move the map to it.
    pub async fn commit_search(&self, query: &str) -> Result<SearchResolution, EngineError> {
        let results = self.suggest(query).await?;
        let Some(candidate) = results.choose() else {
            info!(query = %results.query, "search returned no results");
            self.events.emit(EngineEvent::SearchNoResults {
                query: results.query,
            });
            return Ok(SearchResolution::NoResults);
        };

        let resolution = match &candidate {
            SearchCandidate::Internal(internal) => {
                let center = internal.position();
                {
                    let mut viewport = self.viewport.write().await;
                    let view = viewport.view().recentered(center);
                    viewport.set_view(view);
                }
                let fetch = self.fetch(center).await;
                let engine = self.clone();
                let id = internal.id;
                let selection = tokio::spawn(async move { engine.select_feature(Some(id)).await });
                SearchResolution::Internal {
                    id,
                    fetch,
                    selection,
                }
            }
            SearchCandidate::External(external) => {
                let position = external.position();
                let update = self.recenter(position).await;
                if let Some(handle) = update.fetch
                    && let Err(e) = handle.await
                {
                    debug!(error = %e, "fetch after external search did not complete");
                }
                self.highlight.write().await.place_search_address(position);
                self.events.emit(EngineEvent::SearchAddressPlaced(position));
                self.publish_highlight().await;
                SearchResolution::External { position }
            }
        };

        info!(
            query = %results.query,
            confidence = candidate.confidence(),
            internal = matches!(candidate, SearchCandidate::Internal(_)),
            "search resolved"
        );
        self.events.emit(EngineEvent::SearchResolved(candidate));
        Ok(resolution)
    }
}
