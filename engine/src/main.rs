use tokio::signal;
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::EnvFilter;
use waypoint_engine::highlight::search_address_color;
use waypoint_engine::{
    EngineConfig, EngineEvent, HttpBackend, MapEngine, MapView, SearchResolution,
};
use waypoint_shared::{Bounds, LatLng};

/// Half-span of the probe viewport in degrees, roughly a city-sized view.
const PROBE_HALF_LAT: f64 = 0.1;
const PROBE_HALF_LNG: f64 = 0.15;
const PROBE_ZOOM: f64 = 12.0;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let mut args = std::env::args().skip(1);
    let center = match (args.next(), args.next()) {
        (Some(lat), Some(lng)) => match (lat.parse::<f64>(), lng.parse::<f64>()) {
            (Ok(lat), Ok(lng)) if LatLng::new(lat, lng).is_valid() => LatLng::new(lat, lng),
            _ => {
                tracing::error!(%lat, %lng, "invalid coordinates");
                return;
            }
        },
        _ => {
            tracing::error!("usage: waypoint-probe <lat> <lng> [search query]");
            return;
        }
    };
    let query = args.collect::<Vec<_>>().join(" ");

    let config = EngineConfig::from_env();
    tracing::info!(
        api = %config.api_base_url,
        geocoder = %config.geocoder_url,
        country = %config.locale.country,
        "starting waypoint probe"
    );
    let backend = HttpBackend::new(&config);
    let view = MapView {
        bounds: Bounds::around(center, PROBE_HALF_LAT, PROBE_HALF_LNG),
        zoom: PROBE_ZOOM,
    };
    let engine = MapEngine::new(config, backend, view);

    let mut rx = engine.subscribe();
    let logger = tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => log_event(&event),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "event logger fell behind");
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    let update = engine.on_view_changed(view).await;
    if let Some(handle) = update.fetch {
        match handle.await {
            Ok(outcome) => tracing::info!(?outcome, "initial fetch finished"),
            Err(e) => tracing::warn!(error = %e, "initial fetch task failed"),
        }
    }

    if !query.trim().is_empty() {
        match engine.commit_search(&query).await {
            Ok(SearchResolution::Internal { id, selection, .. }) => {
                tracing::info!(id, "waiting for nearby feed of selected feature");
                tokio::select! {
                    result = selection => match result {
                        Ok(Ok(outcome)) => tracing::info!(?outcome, "selection settled"),
                        Ok(Err(e)) => tracing::warn!(error = %e, "nearby feed failed"),
                        Err(e) => tracing::warn!(error = %e, "selection task failed"),
                    },
                    () = shutdown_signal() => {}
                }
            }
            Ok(SearchResolution::External { position }) => {
                tracing::info!(lat = position.lat, lng = position.lng, "search address placed");
            }
            Ok(SearchResolution::NoResults) => tracing::info!(%query, "no search results"),
            Err(e) => tracing::error!(error = %e, "search failed"),
        }
    }

    drop(engine);
    logger.abort();
    tracing::info!("probe finished");
}

fn log_event(event: &EngineEvent) {
    match event {
        EngineEvent::VisibleFeaturesChanged(features) => {
            tracing::info!(count = features.len(), "visible features changed");
        }
        EngineEvent::ActiveFeatureChanged(id) => tracing::info!(?id, "active feature changed"),
        EngineEvent::HighlightChanged(view) => {
            tracing::debug!(entries = view.list.len(), active = ?view.active_id, "highlight changed");
        }
        EngineEvent::IsochroneStateChanged(view) => {
            tracing::info!(state = ?view.state, locked = view.show_unlock, "isochrone overlay changed");
        }
        EngineEvent::NearbyResult {
            origin_id,
            items,
            meta,
        } => tracing::info!(
            origin_id,
            items = items.len(),
            attempt = meta.attempt,
            done = meta.done,
            empty = meta.empty,
            "nearby result"
        ),
        EngineEvent::SearchResolved(candidate) => {
            tracing::info!(confidence = candidate.confidence(), ?candidate, "search resolved");
        }
        EngineEvent::SearchNoResults { query } => tracing::info!(%query, "search without results"),
        EngineEvent::SearchAddressPlaced(position) => {
            tracing::info!(
                lat = position.lat,
                lng = position.lng,
                color = %search_address_color(),
                "search address marker placed"
            );
        }
        EngineEvent::InitialLoadFailed { message } => {
            tracing::error!(%message, "initial feature load failed");
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to install Ctrl+C handler");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
