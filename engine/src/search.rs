use dashmap::DashMap;
use futures::future::OptionFuture;
use tracing::{debug, warn};
use waypoint_shared::{
    Bounds, ExternalCandidate, InternalCandidate, LatLng, SearchCandidate, normalize_query,
};

use crate::backend::{Backend, GeocodeRequest};
use crate::config::{
    EXTERNAL_KEEP_TOP, EXTERNAL_SEARCH_LIMIT, EngineConfig, SEARCH_MIN_EXTERNAL_CHARS, UserLocale,
};
use crate::error::EngineError;

const HOME_COUNTRY_WEIGHT: u32 = 100;
const NEIGHBOUR_COUNTRY_WEIGHT: u32 = 50;

/// Countries whose results are still preferred when the user is in the key country.
const COUNTRY_NEIGHBOURS: &[(&str, &[&str])] = &[
    ("de", &["at", "ch", "nl", "be", "lu", "fr", "dk", "pl", "cz"]),
    ("at", &["de", "ch", "it", "si", "hu", "sk", "cz", "li"]),
    ("ch", &["de", "at", "fr", "it", "li"]),
    ("fr", &["be", "lu", "de", "ch", "it", "es", "mc", "ad"]),
    ("nl", &["de", "be"]),
    ("be", &["nl", "de", "lu", "fr"]),
    ("lu", &["be", "de", "fr"]),
    ("it", &["fr", "ch", "at", "si", "sm", "va"]),
    ("es", &["fr", "pt", "ad"]),
    ("pt", &["es"]),
    ("pl", &["de", "cz", "sk", "lt"]),
    ("cz", &["de", "at", "sk", "pl"]),
    ("dk", &["de", "se"]),
];

/// Distance bands (upper bound in km, score) for external pre-ranking.
const DISTANCE_BANDS: &[(f64, u32)] = &[
    (10.0, 50),
    (50.0, 40),
    (100.0, 30),
    (500.0, 20),
    (1000.0, 10),
];

pub fn country_priority_weight(user_country: &str, candidate_country: Option<&str>) -> u32 {
    let Some(candidate) = candidate_country else {
        return 0;
    };
    if candidate.eq_ignore_ascii_case(user_country) {
        return HOME_COUNTRY_WEIGHT;
    }
    let is_neighbour = COUNTRY_NEIGHBOURS
        .iter()
        .find(|(country, _)| country.eq_ignore_ascii_case(user_country))
        .is_some_and(|(_, neighbours)| {
            neighbours
                .iter()
                .any(|n| n.eq_ignore_ascii_case(candidate))
        });
    if is_neighbour { NEIGHBOUR_COUNTRY_WEIGHT } else { 0 }
}

/// The user's country followed by its neighbours, for geocoder biasing.
pub fn bias_countries(user_country: &str) -> Vec<&str> {
    let neighbours = COUNTRY_NEIGHBOURS
        .iter()
        .find(|(country, _)| country.eq_ignore_ascii_case(user_country))
        .map_or(&[][..], |(_, neighbours)| *neighbours);
    std::iter::once(user_country)
        .chain(neighbours.iter().copied())
        .collect()
}

pub fn distance_band_score(distance_km: f64) -> u32 {
    DISTANCE_BANDS
        .iter()
        .find(|(limit, _)| distance_km < *limit)
        .map_or(0, |(_, score)| *score)
}

pub fn external_score(candidate: &ExternalCandidate, locale: &UserLocale, origin: Option<LatLng>) -> u32 {
    let country = country_priority_weight(&locale.country, candidate.country.as_deref());
    let distance = origin
        .map(|o| distance_band_score(o.distance_km(&candidate.position())))
        .unwrap_or(0);
    country + distance
}

/// Score external candidates and keep the best few. Ties keep provider order.
pub fn rank_external(
    mut candidates: Vec<ExternalCandidate>,
    locale: &UserLocale,
    origin: Option<LatLng>,
) -> Vec<ExternalCandidate> {
    candidates.sort_by_cached_key(|c| std::cmp::Reverse(external_score(c, locale, origin)));
    candidates.truncate(EXTERNAL_KEEP_TOP);
    candidates
}

/// Pick the candidate a committed search resolves to.
///
/// The internal candidate wins on an exact title/address match, on high
/// confidence with a clear lead, or on a short query with a wide lead. Otherwise
/// the external candidate wins if there is one.
pub fn choose(
    best_internal: Option<&InternalCandidate>,
    best_external: Option<&ExternalCandidate>,
    normalized_query: &str,
) -> Option<SearchCandidate> {
    if let Some(internal) = best_internal {
        let external_confidence = best_external.map_or(0.0, |e| e.confidence);
        let lead = internal.confidence - external_confidence;
        let exact = normalize_query(&internal.title) == normalized_query
            || normalize_query(&internal.address) == normalized_query;
        let confident = internal.confidence >= 85.0 && lead >= 10.0;
        let short_and_clear = normalized_query.chars().count() <= 3
            && internal.confidence >= 75.0
            && lead >= 20.0;
        if exact || confident || short_and_clear {
            return Some(SearchCandidate::Internal(internal.clone()));
        }
    }
    if let Some(external) = best_external {
        return Some(SearchCandidate::External(external.clone()));
    }
    best_internal.map(|internal| SearchCandidate::Internal(internal.clone()))
}

/// Both providers' candidates for one query; live suggestion lists show them
/// side by side.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SearchResults {
    pub query: String,
    /// Highest confidence first.
    pub internal: Vec<InternalCandidate>,
    /// Pre-ranked, at most five.
    pub external: Vec<ExternalCandidate>,
}

impl SearchResults {
    pub fn best_internal(&self) -> Option<&InternalCandidate> {
        self.internal.first()
    }

    pub fn best_external(&self) -> Option<&ExternalCandidate> {
        self.external.first()
    }

    pub fn is_empty(&self) -> bool {
        self.internal.is_empty() && self.external.is_empty()
    }

    pub fn choose(&self) -> Option<SearchCandidate> {
        choose(self.best_internal(), self.best_external(), &self.query)
    }
}

/// Fused internal + geocoder search with per-session memoization.
#[derive(Debug)]
pub struct SearchEngine {
    internal_cache: DashMap<String, Vec<InternalCandidate>>,
    external_cache: DashMap<String, Vec<ExternalCandidate>>,
    locale: UserLocale,
    internal_limit: usize,
}

impl SearchEngine {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            internal_cache: DashMap::new(),
            external_cache: DashMap::new(),
            locale: config.locale.clone(),
            internal_limit: config.internal_search_limit,
        }
    }

    pub fn locale(&self) -> &UserLocale {
        &self.locale
    }

    /// `origin` is the reference point for distance ranking when the user's own
    /// position is unknown, usually the map center.
    pub async fn search<B: Backend>(
        &self,
        backend: &B,
        query: &str,
        origin: Option<LatLng>,
        viewbox: Option<Bounds>,
    ) -> Result<SearchResults, EngineError> {
        let normalized = normalize_query(query);
        if normalized.is_empty() {
            return Ok(SearchResults::default());
        }

        let want_external = normalized.chars().count() >= SEARCH_MIN_EXTERNAL_CHARS;
        let internal_fut = self.search_internal(backend, &normalized);
        let external_fut: OptionFuture<_> = want_external
            .then(|| self.search_external(backend, &normalized, viewbox))
            .into();
        let (internal, external) = tokio::join!(internal_fut, external_fut);

        let (internal, external) = match (internal, external) {
            (Ok(internal), None) => (internal, Vec::new()),
            (Ok(internal), Some(Ok(external))) => (internal, external),
            (Ok(internal), Some(Err(e))) => {
                warn!(error = %e, query = %normalized, "external search failed, using internal results only");
                (internal, Vec::new())
            }
            (Err(e), Some(Ok(external))) => {
                warn!(error = %e, query = %normalized, "internal search failed, using geocoder results only");
                (Vec::new(), external)
            }
            (Err(e), None) => return Err(e),
            (Err(internal_err), Some(Err(external_err))) => {
                return Err(EngineError::SearchUnavailable {
                    internal: internal_err.to_string(),
                    external: external_err.to_string(),
                });
            }
        };

        let origin = self.locale.position.or(origin);
        Ok(SearchResults {
            query: normalized,
            internal,
            external: rank_external(external, &self.locale, origin),
        })
    }

    async fn search_internal<B: Backend>(
        &self,
        backend: &B,
        normalized: &str,
    ) -> Result<Vec<InternalCandidate>, EngineError> {
        if let Some(cached) = self.internal_cache.get(normalized) {
            debug!(query = %normalized, "internal search cache hit");
            return Ok(cached.clone());
        }
        let hits = backend.search_internal(normalized, self.internal_limit).await?;
        let mut candidates: Vec<InternalCandidate> = hits
            .into_iter()
            .filter_map(InternalCandidate::from_hit)
            .collect();
        candidates.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
        self.internal_cache
            .insert(normalized.to_string(), candidates.clone());
        Ok(candidates)
    }

    async fn search_external<B: Backend>(
        &self,
        backend: &B,
        normalized: &str,
        viewbox: Option<Bounds>,
    ) -> Result<Vec<ExternalCandidate>, EngineError> {
        if let Some(cached) = self.external_cache.get(normalized) {
            debug!(query = %normalized, "external search cache hit");
            return Ok(cached.clone());
        }
        let request = GeocodeRequest {
            query: normalized.to_string(),
            country_bias: self.locale.country.clone(),
            viewbox,
            limit: EXTERNAL_SEARCH_LIMIT,
        };
        let hits = backend.geocode(&request).await?;
        let candidates: Vec<ExternalCandidate> = hits
            .into_iter()
            .filter_map(ExternalCandidate::from_hit)
            .collect();
        self.external_cache
            .insert(normalized.to_string(), candidates.clone());
        Ok(candidates)
    }
}
