use std::time::Duration;

use waypoint_shared::{LatLng, REFERENCE_WALKING_SPEED_KMH};

pub const DEFAULT_API_BASE_URL: &str = "http://localhost:8080/wp-json/waypoint/v1";
pub const DEFAULT_GEOCODER_URL: &str = "https://nominatim.openstreetmap.org/search";

pub const DEFAULT_MIN_RADIUS_KM: f64 = 1.0;
pub const DEFAULT_MAX_RADIUS_KM: f64 = 150.0;
pub const RADIUS_MARGIN: f64 = 1.1;
pub const DEFAULT_HYSTERESIS_KM: f64 = 2.0;
/// Share of the last radius the center must move before a new fetch.
pub const HYSTERESIS_RADIUS_SHARE: f64 = 0.4;
pub const DEFAULT_MIN_FETCH_ZOOM: u8 = 9;
pub const DEFAULT_FETCH_LIMIT: usize = 500;
pub const DEFAULT_FALLBACK_LIMIT: usize = 5000;
pub const VISIBLE_BOUNDS_PADDING: f64 = 0.2;
pub const VISIBLE_RADIUS_MARGIN: f64 = 1.1;

pub const DEFAULT_NEARBY_LIMIT: usize = 10;
pub const DEFAULT_NEARBY_MAX_ATTEMPTS: u32 = 4;
pub const DEFAULT_NEARBY_RETRY_DELAY_MS: u64 = 2000;

pub const SEARCH_MIN_EXTERNAL_CHARS: usize = 3;
pub const DEFAULT_INTERNAL_SEARCH_LIMIT: usize = 10;
pub const EXTERNAL_SEARCH_LIMIT: usize = 10;
pub const EXTERNAL_KEEP_TOP: usize = 5;
pub const DEFAULT_USER_COUNTRY: &str = "de";

pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_HTTP_CONNECT_TIMEOUT_SECS: u64 = 3;
pub const DEFAULT_EVENT_BUFFER: usize = 256;

/// Where the user is assumed to be, for geocoder bias and external ranking.
#[derive(Debug, Clone, PartialEq)]
pub struct UserLocale {
    /// Lowercase ISO 3166-1 alpha-2 code.
    pub country: String,
    pub position: Option<LatLng>,
}

impl Default for UserLocale {
    fn default() -> Self {
        Self {
            country: DEFAULT_USER_COUNTRY.to_string(),
            position: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub api_base_url: String,
    pub geocoder_url: String,
    pub min_radius_km: f64,
    pub max_radius_km: f64,
    pub hysteresis_km: f64,
    pub min_fetch_zoom: u8,
    pub fetch_limit: usize,
    pub fallback_limit: usize,
    pub included_types: Vec<String>,
    pub nearby_limit: usize,
    pub nearby_max_attempts: u32,
    pub nearby_retry_delay: Duration,
    pub internal_search_limit: usize,
    pub reference_walking_speed_kmh: f64,
    pub locale: UserLocale,
    pub http_timeout: Duration,
    pub http_connect_timeout: Duration,
    pub event_buffer: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            geocoder_url: DEFAULT_GEOCODER_URL.to_string(),
            min_radius_km: DEFAULT_MIN_RADIUS_KM,
            max_radius_km: DEFAULT_MAX_RADIUS_KM,
            hysteresis_km: DEFAULT_HYSTERESIS_KM,
            min_fetch_zoom: DEFAULT_MIN_FETCH_ZOOM,
            fetch_limit: DEFAULT_FETCH_LIMIT,
            fallback_limit: DEFAULT_FALLBACK_LIMIT,
            included_types: Vec::new(),
            nearby_limit: DEFAULT_NEARBY_LIMIT,
            nearby_max_attempts: DEFAULT_NEARBY_MAX_ATTEMPTS,
            nearby_retry_delay: Duration::from_millis(DEFAULT_NEARBY_RETRY_DELAY_MS),
            internal_search_limit: DEFAULT_INTERNAL_SEARCH_LIMIT,
            reference_walking_speed_kmh: REFERENCE_WALKING_SPEED_KMH,
            locale: UserLocale::default(),
            http_timeout: Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS),
            http_connect_timeout: Duration::from_secs(DEFAULT_HTTP_CONNECT_TIMEOUT_SECS),
            event_buffer: DEFAULT_EVENT_BUFFER,
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let min_radius_km = env_positive_f64("WAYPOINT_MIN_RADIUS_KM").unwrap_or(defaults.min_radius_km);
        let max_radius_km = env_positive_f64("WAYPOINT_MAX_RADIUS_KM")
            .filter(|max| *max >= min_radius_km)
            .unwrap_or_else(|| defaults.max_radius_km.max(min_radius_km));

        Self {
            api_base_url: env_string("WAYPOINT_API_BASE_URL").unwrap_or(defaults.api_base_url),
            geocoder_url: env_string("WAYPOINT_GEOCODER_URL").unwrap_or(defaults.geocoder_url),
            min_radius_km,
            max_radius_km,
            hysteresis_km: env_positive_f64("WAYPOINT_HYSTERESIS_KM")
                .unwrap_or(defaults.hysteresis_km),
            min_fetch_zoom: std::env::var("WAYPOINT_MIN_FETCH_ZOOM")
                .ok()
                .and_then(|value| value.trim().parse::<u8>().ok())
                .unwrap_or(defaults.min_fetch_zoom),
            fetch_limit: env_positive_usize("WAYPOINT_FETCH_LIMIT").unwrap_or(defaults.fetch_limit),
            fallback_limit: env_positive_usize("WAYPOINT_FALLBACK_LIMIT")
                .unwrap_or(defaults.fallback_limit),
            included_types: std::env::var("WAYPOINT_INCLUDED_TYPES")
                .map(|value| {
                    value
                        .split(',')
                        .map(str::trim)
                        .filter(|kind| !kind.is_empty())
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or(defaults.included_types),
            nearby_limit: env_positive_usize("WAYPOINT_NEARBY_LIMIT").unwrap_or(defaults.nearby_limit),
            nearby_max_attempts: std::env::var("WAYPOINT_NEARBY_MAX_ATTEMPTS")
                .ok()
                .and_then(|value| value.trim().parse::<u32>().ok())
                .filter(|value| *value > 0)
                .unwrap_or(defaults.nearby_max_attempts),
            nearby_retry_delay: std::env::var("WAYPOINT_NEARBY_RETRY_DELAY_MS")
                .ok()
                .and_then(|value| value.trim().parse::<u64>().ok())
                .map(Duration::from_millis)
                .unwrap_or(defaults.nearby_retry_delay),
            internal_search_limit: env_positive_usize("WAYPOINT_INTERNAL_SEARCH_LIMIT")
                .unwrap_or(defaults.internal_search_limit),
            reference_walking_speed_kmh: env_positive_f64("WAYPOINT_REFERENCE_WALKING_SPEED_KMH")
                .unwrap_or(defaults.reference_walking_speed_kmh),
            locale: UserLocale {
                country: env_string("WAYPOINT_USER_COUNTRY")
                    .map(|c| c.to_ascii_lowercase())
                    .unwrap_or(defaults.locale.country),
                position: user_position_from_env(),
            },
            http_timeout: env_positive_u64("WAYPOINT_HTTP_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.http_timeout),
            http_connect_timeout: env_positive_u64("WAYPOINT_HTTP_CONNECT_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.http_connect_timeout),
            event_buffer: env_positive_usize("WAYPOINT_EVENT_BUFFER").unwrap_or(defaults.event_buffer),
        }
    }
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn env_positive_f64(key: &str) -> Option<f64> {
    std::env::var(key)
        .ok()
        .and_then(|value| value.trim().parse::<f64>().ok())
        .filter(|value| value.is_finite() && *value > 0.0)
}

fn env_positive_u64(key: &str) -> Option<u64> {
    std::env::var(key)
        .ok()
        .and_then(|value| value.trim().parse::<u64>().ok())
        .filter(|value| *value > 0)
}

fn env_positive_usize(key: &str) -> Option<usize> {
    std::env::var(key)
        .ok()
        .and_then(|value| value.trim().parse::<usize>().ok())
        .filter(|value| *value > 0)
}

fn user_position_from_env() -> Option<LatLng> {
    let lat = std::env::var("WAYPOINT_USER_LAT").ok()?.trim().parse::<f64>().ok()?;
    let lng = std::env::var("WAYPOINT_USER_LNG").ok()?.trim().parse::<f64>().ok()?;
    let position = LatLng::new(lat, lng);
    position.is_valid().then_some(position)
}
