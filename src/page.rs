//! Page regions and the handlers bound to them.
//!
//! A [`Page`] is the in-memory stand-in for the three DOM regions the UI
//! owns. Rendering and handler binding happen in the same step: the
//! affordances returned by the result renderer are exactly the ones that can
//! be clicked until the next render replaces them.

use crate::client::{CaseApi, ClientError};
use crate::payload::ResultPayload;
use crate::render::{Affordance, ItemAction, RenderError, ThumbnailUpdate, render_query, render_results};
use parking_lot::Mutex;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Region {
    Results,
    QuerySet,
    Thumbnail,
}

impl Region {
    pub const ALL: [Region; 3] = [Region::Results, Region::QuerySet, Region::Thumbnail];

    /// Element id of the region in the page shell.
    pub fn element_id(self) -> &'static str {
        match self {
            Region::Results => "result",
            Region::QuerySet => "queryset",
            Region::Thumbnail => "query-thumbnail",
        }
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.element_id())
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Page {
    results: String,
    queryset: String,
    thumbnail: String,
    bound: Vec<Affordance>,
    renders: u64,
}

impl Page {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn region(&self, region: Region) -> &str {
        match region {
            Region::Results => &self.results,
            Region::QuerySet => &self.queryset,
            Region::Thumbnail => &self.thumbnail,
        }
    }

    pub fn affordances(&self) -> &[Affordance] {
        &self.bound
    }

    pub fn affordance(&self, case_id: &str) -> Option<&Affordance> {
        self.bound.iter().find(|affordance| affordance.case_id == case_id)
    }

    /// How many payloads have been applied to this page.
    pub fn renders(&self) -> u64 {
        self.renders
    }

    /// Re-renders every region from `payload` and rebinds the affordances.
    ///
    /// Nothing is touched unless both fragments render.
    pub fn apply(&mut self, payload: &ResultPayload) -> Result<(), RenderError> {
        let results = render_results(payload)?;
        let query = render_query(payload)?;
        self.results = results.markup;
        self.bound = results.affordances;
        self.queryset = query.markup;
        if let ThumbnailUpdate::Replace(markup) = query.thumbnail {
            self.thumbnail = markup;
        }
        self.renders += 1;
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum InteractionError {
    #[error("no affordance is bound for case {case_id:?}")]
    Unbound { case_id: String },
    #[error(transparent)]
    Api(#[from] ClientError),
    #[error(transparent)]
    Render(#[from] RenderError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The response was rendered into the page.
    Applied,
    /// A newer request was issued while this one was in flight; its response was dropped.
    Stale,
}

/// Owns the page and turns clicks into backend round-trips.
///
/// Every round-trip takes a ticket before its request goes out. A response
/// only reaches the page while its ticket is still the newest one issued, so
/// the last request wins no matter in which order responses arrive.
pub struct InteractionBinder<A> {
    api: A,
    page: Mutex<Page>,
    tickets: AtomicU64,
}

impl<A: CaseApi> InteractionBinder<A> {
    pub fn new(api: A) -> Self {
        Self::with_page(api, Page::new())
    }

    pub fn with_page(api: A, page: Page) -> Self {
        Self {
            api,
            page: Mutex::new(page),
            tickets: AtomicU64::new(0),
        }
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    pub fn snapshot(&self) -> Page {
        self.page.lock().clone()
    }

    /// Renders a payload that did not come from a click, e.g. the first search.
    pub fn show(&self, payload: &ResultPayload) -> Result<(), RenderError> {
        self.tickets.fetch_add(1, Ordering::AcqRel);
        self.page.lock().apply(payload)
    }

    /// Runs the handler bound to the like/unlike affordance of `case_id`.
    pub async fn click(&self, case_id: &str) -> Result<Outcome, InteractionError> {
        let action = self.bound_action(case_id)?;
        info!(case_id, %action, "case affordance clicked");
        self.round_trip(self.api.mutate(action, case_id)).await
    }

    pub async fn search(&self, input: &str) -> Result<Outcome, InteractionError> {
        info!(input, "running search");
        self.round_trip(self.api.query(input)).await
    }

    pub async fn apply_weights(&self, weights: &[f64]) -> Result<Outcome, InteractionError> {
        info!(count = weights.len(), "applying query weights");
        self.round_trip(self.api.apply_weights(weights)).await
    }

    fn bound_action(&self, case_id: &str) -> Result<ItemAction, InteractionError> {
        self.page
            .lock()
            .affordance(case_id)
            .map(|affordance| affordance.action)
            .ok_or_else(|| InteractionError::Unbound {
                case_id: case_id.to_string(),
            })
    }

    async fn round_trip<F>(&self, request: F) -> Result<Outcome, InteractionError>
    where
        F: Future<Output = Result<ResultPayload, ClientError>>,
    {
        let ticket = self.tickets.fetch_add(1, Ordering::AcqRel) + 1;
        let payload = match request.await {
            Ok(payload) => payload,
            Err(err) => {
                warn!(ticket, error = %err, "backend call failed; page left unchanged");
                return Err(err.into());
            }
        };
        let mut page = self.page.lock();
        // Checked under the page lock so a newer response cannot land in between.
        let newest = self.tickets.load(Ordering::Acquire);
        if ticket != newest {
            debug!(ticket, newest, "dropping stale response");
            return Ok(Outcome::Stale);
        }
        page.apply(&payload)?;
        debug!(ticket, cases = payload.result.len(), "page re-rendered");
        Ok(Outcome::Applied)
    }
}
