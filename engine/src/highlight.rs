use std::cmp::Ordering;

use waypoint_shared::colors::{
    MARKER_ACTIVE, MARKER_DEFAULT, MARKER_RECOMMENDED, MARKER_SEARCH_ADDRESS, rgb_hex,
};
use waypoint_shared::{Feature, FeatureId, LatLng};

/// List ordering directive.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum SortMode {
    /// Recommended first, then by title.
    #[default]
    Default,
    DistanceFromActive,
    /// Set when an external search result was chosen.
    DistanceFromAddress(LatLng),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerVariant {
    Default,
    Recommended,
    Active,
}

impl MarkerVariant {
    pub fn color(self) -> String {
        let (r, g, b) = match self {
            Self::Default => MARKER_DEFAULT,
            Self::Recommended => MARKER_RECOMMENDED,
            Self::Active => MARKER_ACTIVE,
        };
        rgb_hex(r, g, b)
    }
}

pub fn search_address_color() -> String {
    let (r, g, b) = MARKER_SEARCH_ADDRESS;
    rgb_hex(r, g, b)
}

#[derive(Debug, Clone, PartialEq)]
pub struct MarkerState {
    pub id: FeatureId,
    pub position: LatLng,
    pub variant: MarkerVariant,
    pub color: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ListEntry {
    pub id: FeatureId,
    pub title: String,
    pub active: bool,
    pub recommended: bool,
    pub distance_km: Option<f64>,
}

/// What the presentation layer needs to draw markers and the list.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct HighlightView {
    pub active_id: Option<FeatureId>,
    pub markers: Vec<MarkerState>,
    pub list: Vec<ListEntry>,
    pub search_address: Option<LatLng>,
}

/// Single source of truth for the selected feature.
#[derive(Debug, Clone, Default)]
pub struct HighlightSync {
    active_id: Option<FeatureId>,
    sort: SortMode,
    search_address: Option<LatLng>,
}

impl HighlightSync {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn active_id(&self) -> Option<FeatureId> {
        self.active_id
    }

    pub fn sort(&self) -> SortMode {
        self.sort
    }

    pub fn search_address(&self) -> Option<LatLng> {
        self.search_address
    }

    /// Returns whether the active id changed.
    pub fn set_active(&mut self, id: Option<FeatureId>) -> bool {
        if self.active_id == id {
            return false;
        }
        self.active_id = id;
        true
    }

    pub fn clear(&mut self) -> bool {
        self.set_active(None)
    }

    /// Reset to no selection when the active feature left the visible set.
    pub fn reconcile(&mut self, visible: &[Feature]) -> bool {
        match self.active_id {
            Some(id) if !visible.iter().any(|f| f.id == id) => {
                self.active_id = None;
                true
            }
            _ => false,
        }
    }

    /// A new directive replaces any previous one, including address sorting.
    pub fn set_sort(&mut self, mode: SortMode) {
        self.sort = mode;
    }

    pub fn place_search_address(&mut self, position: LatLng) {
        self.search_address = Some(position);
        self.sort = SortMode::DistanceFromAddress(position);
    }

    pub fn clear_search_address(&mut self) {
        self.search_address = None;
        if matches!(self.sort, SortMode::DistanceFromAddress(_)) {
            self.sort = SortMode::Default;
        }
    }

    /// `active_position` is the active feature's coordinates when known, even if
    /// it is not part of `visible`.
    pub fn render(&self, visible: &[Feature], active_position: Option<LatLng>) -> HighlightView {
        let markers = visible
            .iter()
            .map(|feature| {
                let variant = if Some(feature.id) == self.active_id {
                    MarkerVariant::Active
                } else if feature.properties.recommended {
                    MarkerVariant::Recommended
                } else {
                    MarkerVariant::Default
                };
                MarkerState {
                    id: feature.id,
                    position: feature.geometry,
                    variant,
                    color: variant.color(),
                }
            })
            .collect();

        let origin = match self.sort {
            SortMode::Default => None,
            SortMode::DistanceFromActive => active_position,
            SortMode::DistanceFromAddress(address) => Some(address),
        };

        let mut list: Vec<ListEntry> = visible
            .iter()
            .map(|feature| ListEntry {
                id: feature.id,
                title: feature.properties.title.clone(),
                active: Some(feature.id) == self.active_id,
                recommended: feature.properties.recommended,
                distance_km: origin.map(|o| o.distance_km(&feature.geometry)),
            })
            .collect();

        if origin.is_some() {
            list.sort_by(|a, b| {
                a.distance_km
                    .partial_cmp(&b.distance_km)
                    .unwrap_or(Ordering::Equal)
                    .then(a.id.cmp(&b.id))
            });
        } else {
            list.sort_by(|a, b| {
                b.recommended
                    .cmp(&a.recommended)
                    .then_with(|| a.title.cmp(&b.title))
                    .then(a.id.cmp(&b.id))
            });
        }

        HighlightView {
            active_id: self.active_id,
            markers,
            list,
            search_address: self.search_address,
        }
    }
}

#[cfg(test)]
mod tests {
    use waypoint_shared::FeatureProperties;

    use super::*;

    fn feature(id: FeatureId, title: &str, lat: f64, recommended: bool) -> Feature {
        Feature {
            id,
            geometry: LatLng::new(lat, 8.0),
            properties: FeatureProperties {
                kind: "poi".to_string(),
                title: title.to_string(),
                recommended,
                ..FeatureProperties::default()
            },
        }
    }

    fn visible() -> Vec<Feature> {
        vec![
            feature(1, "Charlie", 47.0, false),
            feature(2, "Alpha", 47.3, false),
            feature(3, "Bravo", 47.1, true),
        ]
    }

    #[test]
    fn active_marker_and_list_entry_follow_selection() {
        let mut sync = HighlightSync::new();
        assert!(sync.set_active(Some(2)));
        assert!(!sync.set_active(Some(2)));

        let view = sync.render(&visible(), None);
        let active: Vec<_> = view
            .markers
            .iter()
            .filter(|m| m.variant == MarkerVariant::Active)
            .map(|m| m.id)
            .collect();
        assert_eq!(active, vec![2]);
        let recommended = view.markers.iter().find(|m| m.id == 3).expect("marker 3");
        assert_eq!(recommended.variant, MarkerVariant::Recommended);
        assert_eq!(recommended.color, "#27ae60");
        assert_ne!(search_address_color(), MarkerVariant::Active.color());
        let active_entries: Vec<_> = view.list.iter().filter(|e| e.active).map(|e| e.id).collect();
        assert_eq!(active_entries, vec![2]);
    }

    #[test]
    fn default_sort_puts_recommended_first() {
        let sync = HighlightSync::new();
        let ids: Vec<_> = sync.render(&visible(), None).list.iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![3, 2, 1]);
    }

    #[test]
    fn sorts_by_distance_from_active_feature() {
        let mut sync = HighlightSync::new();
        sync.set_active(Some(1));
        sync.set_sort(SortMode::DistanceFromActive);
        let ids: Vec<_> = sync
            .render(&visible(), Some(LatLng::new(47.0, 8.0)))
            .list
            .iter()
            .map(|e| e.id)
            .collect();
        assert_eq!(ids, vec![1, 3, 2]);
    }

    #[test]
    fn address_sort_lasts_until_new_directive() {
        let mut sync = HighlightSync::new();
        sync.place_search_address(LatLng::new(47.35, 8.0));
        let ids: Vec<_> = sync.render(&visible(), None).list.iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![2, 3, 1]);

        sync.set_sort(SortMode::Default);
        let ids: Vec<_> = sync.render(&visible(), None).list.iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![3, 2, 1]);
        assert_eq!(sync.search_address(), Some(LatLng::new(47.35, 8.0)));
    }

    #[test]
    fn resets_when_active_feature_leaves_visible_set() {
        let mut sync = HighlightSync::new();
        sync.set_active(Some(99));
        assert!(sync.reconcile(&visible()));
        assert_eq!(sync.active_id(), None);
        assert!(!sync.reconcile(&visible()));
    }
}
