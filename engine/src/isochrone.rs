//! Reachability overlay for the selected feature.
//!
//! The machine is pure data: callers feed it selections, payloads tagged with
//! the generation they were requested under, and lock/unlock commands, then
//! publish [`IsochroneOverlay::view`] to whoever draws the map.

use serde_json::Value;
use waypoint_shared::colors::{band_color, rgb_hex, rgba_css};
use waypoint_shared::{FeatureId, IsochronePayload, TimeBand};

use crate::generation::Generation;

const BAND_FILL_OPACITY: f64 = 0.35;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverlayState {
    Idle,
    Loading,
    Displayed,
    Locked,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LockState {
    pub locked: bool,
    pub locked_payload: Option<IsochronePayload>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    Applied,
    /// Current but held back because the overlay is locked; shown on unlock.
    Deferred,
    /// Tagged with a superseded generation or a different feature.
    Discarded,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StyledPolygon {
    pub band: TimeBand,
    pub color: String,
    /// Translucent fill so nested bands stay readable.
    pub fill: String,
    pub backend_time_s: Option<f64>,
    /// Backend time rescaled to the user's walking speed.
    pub displayed_time_s: Option<f64>,
    pub feature: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LegendEntry {
    pub band: TimeBand,
    pub color: String,
    pub minutes: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OverlayRender {
    pub feature_id: FeatureId,
    pub polygons: Vec<StyledPolygon>,
    pub legend: [LegendEntry; 3],
}

/// Published overlay state.
#[derive(Debug, Clone, PartialEq)]
pub struct IsochroneView {
    pub state: OverlayState,
    pub show_unlock: bool,
    pub render: Option<OverlayRender>,
}

#[derive(Debug, Clone)]
pub struct IsochroneOverlay {
    state: OverlayState,
    active_feature: Option<FeatureId>,
    displayed: Option<IsochronePayload>,
    lock: LockState,
    /// Latest current payload that arrived while locked.
    pending: Option<IsochronePayload>,
    awaiting_payload: bool,
    reference_speed_kmh: f64,
}

impl IsochroneOverlay {
    pub fn new(reference_speed_kmh: f64) -> Self {
        Self {
            state: OverlayState::Idle,
            active_feature: None,
            displayed: None,
            lock: LockState::default(),
            pending: None,
            awaiting_payload: false,
            reference_speed_kmh,
        }
    }

    pub fn state(&self) -> OverlayState {
        self.state
    }

    pub fn lock_state(&self) -> &LockState {
        &self.lock
    }

    pub fn displayed(&self) -> Option<&IsochronePayload> {
        if self.lock.locked {
            self.lock.locked_payload.as_ref()
        } else {
            self.displayed.as_ref()
        }
    }

    /// A new selection was made (the caller already bumped the generation).
    /// Clears the overlay right away unless it is locked.
    pub fn on_selection(&mut self, feature: Option<FeatureId>) {
        self.active_feature = feature;
        self.pending = None;
        self.awaiting_payload = feature.is_some();
        if self.lock.locked {
            return;
        }
        self.displayed = None;
        self.state = if feature.is_some() {
            OverlayState::Loading
        } else {
            OverlayState::Idle
        };
    }

    pub fn apply(
        &mut self,
        issued: Generation,
        current: Generation,
        payload: IsochronePayload,
    ) -> ApplyOutcome {
        if issued != current || Some(payload.feature_id) != self.active_feature {
            return ApplyOutcome::Discarded;
        }
        self.awaiting_payload = false;
        if self.lock.locked {
            self.pending = Some(payload);
            return ApplyOutcome::Deferred;
        }
        self.displayed = Some(payload);
        self.state = OverlayState::Displayed;
        ApplyOutcome::Applied
    }

    /// The request for the current selection finished without isochrone data.
    pub fn finish_without_payload(&mut self, issued: Generation, current: Generation) -> bool {
        if issued != current {
            return false;
        }
        self.awaiting_payload = false;
        if self.state != OverlayState::Loading {
            return false;
        }
        self.state = OverlayState::Idle;
        true
    }

    pub fn lock(&mut self) -> bool {
        if self.state != OverlayState::Displayed {
            return false;
        }
        self.lock = LockState {
            locked: true,
            locked_payload: self.displayed.clone(),
        };
        self.state = OverlayState::Locked;
        true
    }

    /// Drop the lock and fall back to whatever belongs to the active feature.
    pub fn unlock(&mut self) -> bool {
        if !self.lock.locked {
            return false;
        }
        let locked_payload = std::mem::take(&mut self.lock).locked_payload;

        if let Some(pending) = self.pending.take() {
            self.displayed = Some(pending);
            self.state = OverlayState::Displayed;
        } else if let Some(payload) =
            locked_payload.filter(|p| Some(p.feature_id) == self.active_feature)
        {
            self.displayed = Some(payload);
            self.state = OverlayState::Displayed;
        } else {
            self.displayed = None;
            self.state = if self.awaiting_payload {
                OverlayState::Loading
            } else {
                OverlayState::Idle
            };
        }
        true
    }

    pub fn teardown(&mut self) {
        self.state = OverlayState::Idle;
        self.active_feature = None;
        self.displayed = None;
        self.pending = None;
        self.awaiting_payload = false;
        self.lock = LockState::default();
    }

    pub fn view(&self) -> IsochroneView {
        IsochroneView {
            state: self.state,
            show_unlock: self.lock.locked,
            render: self
                .displayed()
                .map(|payload| render_payload(payload, self.reference_speed_kmh)),
        }
    }
}

/// Style polygons by time band and build the legend. Only the labels follow the
/// user's walking speed; the polygon geometry is drawn as delivered.
pub fn render_payload(payload: &IsochronePayload, reference_speed_kmh: f64) -> OverlayRender {
    let scale = payload.user_settings.time_scale(reference_speed_kmh);
    let polygons = payload
        .polygons()
        .map(|(feature, backend_time_s)| {
            let band = backend_time_s
                .map(|t| TimeBand::classify(t, &payload.ranges))
                .unwrap_or(TimeBand::Third);
            let (r, g, b) = band_color(band);
            StyledPolygon {
                band,
                color: rgb_hex(r, g, b),
                fill: rgba_css(r, g, b, BAND_FILL_OPACITY),
                backend_time_s,
                displayed_time_s: backend_time_s.map(|t| t * scale),
                feature: feature.clone(),
            }
        })
        .collect();

    let legend = [TimeBand::First, TimeBand::Second, TimeBand::Third].map(|band| {
        let (r, g, b) = band_color(band);
        LegendEntry {
            band,
            color: rgb_hex(r, g, b),
            minutes: (payload.ranges[band.index()] * scale / 60.0).round() as u32,
        }
    });

    OverlayRender {
        feature_id: payload.feature_id,
        polygons,
        legend,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use waypoint_shared::UserSettings;

    use super::*;
    use crate::generation::RequestGeneration;

    const REFERENCE: f64 = 5.0;

    fn payload(feature_id: FeatureId) -> IsochronePayload {
        IsochronePayload {
            geojson: json!({
                "type": "FeatureCollection",
                "features": [
                    { "type": "Feature", "properties": { "value": 300.0 }, "geometry": null },
                    { "type": "Feature", "properties": { "value": 600.0 }, "geometry": null },
                    { "type": "Feature", "properties": { "value": 900.0 }, "geometry": null }
                ]
            }),
            ranges: [300.0, 600.0, 900.0],
            user_settings: UserSettings::default(),
            feature_id,
        }
    }

    #[test]
    fn selection_clears_overlay_and_loads() {
        let generation = RequestGeneration::new();
        let mut overlay = IsochroneOverlay::new(REFERENCE);

        let g1 = generation.advance();
        overlay.on_selection(Some(1));
        assert_eq!(overlay.state(), OverlayState::Loading);
        assert_eq!(overlay.apply(g1, generation.current(), payload(1)), ApplyOutcome::Applied);
        assert_eq!(overlay.state(), OverlayState::Displayed);

        generation.advance();
        overlay.on_selection(Some(2));
        assert_eq!(overlay.state(), OverlayState::Loading);
        assert!(overlay.view().render.is_none());
    }

    #[test]
    fn stale_generation_is_discarded_silently() {
        let generation = RequestGeneration::new();
        let mut overlay = IsochroneOverlay::new(REFERENCE);
        let mut stale = generation.current();
        for _ in 0..5 {
            stale = generation.current();
            generation.advance();
        }
        overlay.on_selection(Some(1));
        assert_eq!(generation.current().value(), 5);
        assert_eq!(stale.value(), 4);

        let before = overlay.view();
        assert_eq!(
            overlay.apply(stale, generation.current(), payload(1)),
            ApplyOutcome::Discarded
        );
        assert_eq!(overlay.view(), before);
    }

    #[test]
    fn lock_survives_selection_changes() {
        let generation = RequestGeneration::new();
        let mut overlay = IsochroneOverlay::new(REFERENCE);
        let g1 = generation.advance();
        overlay.on_selection(Some(1));
        overlay.apply(g1, generation.current(), payload(1));
        assert!(overlay.lock());
        assert!(overlay.view().show_unlock);

        let g2 = generation.advance();
        overlay.on_selection(Some(2));
        assert_eq!(overlay.state(), OverlayState::Locked);
        assert_eq!(overlay.displayed().map(|p| p.feature_id), Some(1));

        assert_eq!(overlay.apply(g2, generation.current(), payload(2)), ApplyOutcome::Deferred);
        assert_eq!(overlay.displayed().map(|p| p.feature_id), Some(1));

        assert!(overlay.unlock());
        assert_eq!(overlay.state(), OverlayState::Displayed);
        assert_eq!(overlay.displayed().map(|p| p.feature_id), Some(2));
        assert!(!overlay.view().show_unlock);
    }

    #[test]
    fn unlock_without_fresh_data_waits_for_active_feature() {
        let generation = RequestGeneration::new();
        let mut overlay = IsochroneOverlay::new(REFERENCE);
        let g1 = generation.advance();
        overlay.on_selection(Some(1));
        overlay.apply(g1, generation.current(), payload(1));
        overlay.lock();

        generation.advance();
        overlay.on_selection(Some(2));
        overlay.unlock();
        assert_eq!(overlay.state(), OverlayState::Loading);
        assert!(overlay.displayed().is_none());

        generation.advance();
        overlay.on_selection(None);
        assert_eq!(overlay.state(), OverlayState::Idle);
    }

    #[test]
    fn unlock_after_empty_response_goes_idle() {
        let generation = RequestGeneration::new();
        let mut overlay = IsochroneOverlay::new(REFERENCE);
        let g1 = generation.advance();
        overlay.on_selection(Some(1));
        overlay.apply(g1, generation.current(), payload(1));
        overlay.lock();

        let g2 = generation.advance();
        overlay.on_selection(Some(2));
        assert!(!overlay.finish_without_payload(g2, generation.current()));
        overlay.unlock();
        assert_eq!(overlay.state(), OverlayState::Idle);
    }

    #[test]
    fn unlock_keeps_payload_of_still_active_feature() {
        let generation = RequestGeneration::new();
        let mut overlay = IsochroneOverlay::new(REFERENCE);
        let g1 = generation.advance();
        overlay.on_selection(Some(1));
        overlay.apply(g1, generation.current(), payload(1));
        overlay.lock();
        overlay.unlock();
        assert_eq!(overlay.state(), OverlayState::Displayed);
        assert_eq!(overlay.displayed().map(|p| p.feature_id), Some(1));
    }

    #[test]
    fn lock_requires_displayed_overlay() {
        let mut overlay = IsochroneOverlay::new(REFERENCE);
        assert!(!overlay.lock());
        overlay.on_selection(Some(1));
        assert!(!overlay.lock());
        assert!(!overlay.unlock());
    }

    #[test]
    fn teardown_returns_to_idle() {
        let generation = RequestGeneration::new();
        let mut overlay = IsochroneOverlay::new(REFERENCE);
        let g1 = generation.advance();
        overlay.on_selection(Some(1));
        overlay.apply(g1, generation.current(), payload(1));
        overlay.lock();
        overlay.teardown();
        assert_eq!(overlay.state(), OverlayState::Idle);
        assert_eq!(overlay.lock_state(), &LockState::default());
    }

    #[test]
    fn renders_bands_and_legend() {
        let render = render_payload(&payload(1), REFERENCE);
        let bands: Vec<_> = render.polygons.iter().map(|p| p.band).collect();
        assert_eq!(bands, vec![TimeBand::First, TimeBand::Second, TimeBand::Third]);
        let minutes: Vec<_> = render.legend.iter().map(|l| l.minutes).collect();
        assert_eq!(minutes, vec![5, 10, 15]);
        assert_ne!(render.polygons[0].color, render.polygons[2].color);
    }

    #[test]
    fn slower_walking_speed_rescales_labels_not_geometry() {
        let mut slow = payload(1);
        slow.user_settings = UserSettings {
            enabled: true,
            walking_speed: 4.0,
        };
        let render = render_payload(&slow, REFERENCE);
        assert_eq!(render.polygons[0].backend_time_s, Some(300.0));
        assert_eq!(render.polygons[0].displayed_time_s, Some(375.0));
        assert_eq!(render.polygons[0].band, TimeBand::First);
        assert_eq!(render.polygons[0].feature, slow.geojson["features"][0]);
        let minutes: Vec<_> = render.legend.iter().map(|l| l.minutes).collect();
        assert_eq!(minutes, vec![6, 13, 19]);
    }
}
