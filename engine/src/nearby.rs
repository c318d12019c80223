use std::sync::atomic::{AtomicU32, Ordering};

use tracing::debug;
use waypoint_shared::{FeatureId, IsochroneWire, NearbyItem, NearbyProgress, NearbyResponse};

use crate::backend::Backend;
use crate::error::EngineError;
use crate::generation::{Generation, RequestGeneration};
use crate::retry::{RetryOutcome, RetryPolicy, retry_bounded};

/// Rendering hints attached to every nearby result event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NearbyMeta {
    pub generation: Generation,
    pub attempt: u32,
    pub progress: Option<NearbyProgress>,
    /// No further update will follow for this origin.
    pub done: bool,
    /// Final and empty: show the "nothing nearby" state.
    pub empty: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NearbyRequest {
    pub origin_id: FeatureId,
    pub kind: String,
    pub limit: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NearbyPoll {
    pub items: Vec<NearbyItem>,
    /// The backend reported the job as finished.
    pub done: bool,
    pub progress: Option<NearbyProgress>,
    pub isochrones: Option<IsochroneWire>,
    pub attempts: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    Finished(NearbyPoll),
    /// The selection changed while polling.
    Abandoned,
}

/// Bounded polling against the nearby job, gated by the request generation.
pub struct NearbyClient<'a, B> {
    backend: &'a B,
    generation: &'a RequestGeneration,
    policy: RetryPolicy,
}

impl<'a, B: Backend> NearbyClient<'a, B> {
    pub fn new(backend: &'a B, generation: &'a RequestGeneration, policy: RetryPolicy) -> Self {
        Self {
            backend,
            generation,
            policy,
        }
    }

    /// Poll until the backend job settles, attempts run out, or `issued` is
    /// superseded. `on_progress` sees every intermediate response that is still
    /// current and is followed by another attempt, with its attempt number.
    ///
    /// When attempts run out, the most recent response that carried items wins
    /// over a trailing empty one.
    pub async fn poll<F>(
        &self,
        request: &NearbyRequest,
        issued: Generation,
        mut on_progress: F,
    ) -> Result<PollOutcome, EngineError>
    where
        F: FnMut(&NearbyResponse, u32),
    {
        let backend = self.backend;
        let generation = self.generation;
        let kind = request.kind.as_str();
        let origin_id = request.origin_id;
        let limit = request.limit;
        let attempt_cell = AtomicU32::new(0);
        let attempt_seen = &attempt_cell;
        let mut last_with_items: Option<NearbyResponse> = None;

        let outcome = retry_bounded(
            self.policy,
            move |attempt| {
                attempt_seen.store(attempt, Ordering::Relaxed);
                backend.fetch_nearby(origin_id, kind, limit)
            },
            |response: &NearbyResponse, more_attempts| {
                let pending = response.is_pending();
                if pending && !response.items.is_empty() {
                    last_with_items = Some(response.clone());
                }
                if pending && more_attempts {
                    on_progress(response, attempt_seen.load(Ordering::Relaxed));
                }
                pending
            },
            || generation.is_current(issued),
            move || generation.advanced(),
        )
        .await?;

        Ok(match outcome {
            RetryOutcome::Settled { value, attempts } => PollOutcome::Finished(NearbyPoll {
                done: true,
                progress: value.progress,
                items: value.items,
                isochrones: value.isochrones,
                attempts,
            }),
            RetryOutcome::Exhausted { last, attempts } => {
                let last = match last_with_items {
                    Some(with_items) if last.items.is_empty() => NearbyResponse {
                        isochrones: last.isochrones.or(with_items.isochrones),
                        ..with_items
                    },
                    _ => last,
                };
                debug!(origin_id, attempts, items = last.items.len(), "nearby polling exhausted");
                PollOutcome::Finished(NearbyPoll {
                    done: false,
                    progress: last.progress,
                    items: last.items,
                    isochrones: last.isochrones,
                    attempts,
                })
            }
            RetryOutcome::Abandoned { attempts } => {
                debug!(origin_id, attempts, "nearby polling abandoned after selection change");
                PollOutcome::Abandoned
            }
        })
    }
}
