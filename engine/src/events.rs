use std::sync::Arc;

use tokio::sync::broadcast;
use waypoint_shared::{Feature, FeatureId, LatLng, NearbyItem, SearchCandidate};

use crate::highlight::HighlightView;
use crate::isochrone::IsochroneView;
use crate::nearby::NearbyMeta;

/// State changes published to the presentation layer.
#[derive(Debug, Clone)]
pub enum EngineEvent {
    VisibleFeaturesChanged(Arc<[Feature]>),
    ActiveFeatureChanged(Option<FeatureId>),
    HighlightChanged(Arc<HighlightView>),
    IsochroneStateChanged(Arc<IsochroneView>),
    NearbyResult {
        origin_id: FeatureId,
        items: Arc<[NearbyItem]>,
        meta: NearbyMeta,
    },
    SearchResolved(SearchCandidate),
    SearchNoResults {
        query: String,
    },
    SearchAddressPlaced(LatLng),
    /// The very first radius fetch failed; later failures keep stale data silently.
    InitialLoadFailed {
        message: String,
    },
}

#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<EngineEvent>,
}

impl EventBus {
    pub fn new(buffer: usize) -> Self {
        let (tx, _) = broadcast::channel(buffer.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.tx.subscribe()
    }

    /// Fire and forget; having no subscriber is not an error.
    pub fn emit(&self, event: EngineEvent) {
        let _ = self.tx.send(event);
    }
}
