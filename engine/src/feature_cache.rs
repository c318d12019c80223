use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use waypoint_shared::{Bounds, Feature, FeatureId, FeatureProperties, LatLng};

use crate::config::{VISIBLE_BOUNDS_PADDING, VISIBLE_RADIUS_MARGIN};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertResult {
    Inserted,
    Updated,
    Unchanged,
}

/// Circle of the last completed radius fetch, used to hide points that were only
/// ever fetched for a different viewport.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CenterFilter {
    pub center: LatLng,
    pub radius_km: f64,
}

/// Session-lifetime feature store. Grows monotonically; entries are merged,
/// never replaced by a poorer copy.
#[derive(Debug, Default)]
pub struct FeatureCache {
    features: DashMap<FeatureId, Feature>,
}

impl FeatureCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upsert(&self, feature: Feature) -> UpsertResult {
        match self.features.entry(feature.id) {
            Entry::Occupied(mut occupied) => {
                if occupied.get_mut().properties.merge_from(&feature.properties) {
                    UpsertResult::Updated
                } else {
                    UpsertResult::Unchanged
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(feature);
                UpsertResult::Inserted
            }
        }
    }

    /// Returns how many entries were inserted or changed.
    pub fn upsert_many(&self, features: impl IntoIterator<Item = Feature>) -> usize {
        features
            .into_iter()
            .map(|feature| self.upsert(feature))
            .filter(|result| *result != UpsertResult::Unchanged)
            .count()
    }

    /// Enrichment merge for an already cached feature. Returns `None` when the
    /// id is unknown, otherwise whether anything changed.
    pub fn merge_properties(&self, id: FeatureId, properties: &FeatureProperties) -> Option<bool> {
        self.features
            .get_mut(&id)
            .map(|mut feature| feature.properties.merge_from(properties))
    }

    pub fn get(&self, id: FeatureId) -> Option<Feature> {
        self.features.get(&id).map(|entry| entry.value().clone())
    }

    pub fn position(&self, id: FeatureId) -> Option<LatLng> {
        self.features.get(&id).map(|entry| entry.geometry)
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Features inside the padded viewport and, when a filter is given, within
    /// its radius plus a small margin. Sorted by id.
    pub fn select_visible(&self, bounds: &Bounds, filter: Option<CenterFilter>) -> Vec<Feature> {
        let padded = bounds.pad(VISIBLE_BOUNDS_PADDING);
        let mut visible: Vec<Feature> = self
            .features
            .iter()
            .filter(|entry| padded.contains(&entry.geometry))
            .filter(|entry| {
                filter.is_none_or(|f| {
                    f.center.distance_km(&entry.geometry) <= f.radius_km * VISIBLE_RADIUS_MARGIN
                })
            })
            .map(|entry| entry.value().clone())
            .collect();
        visible.sort_unstable_by_key(|feature| feature.id);
        visible
    }
}
