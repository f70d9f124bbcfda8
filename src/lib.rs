//! Rendering and interaction glue for the archseek case search UI.
//!
//! A [`ResultPayload`] from the case backend becomes two HTML fragments: the
//! result cards with their like/unlike affordances, and the query-weight
//! sliders. [`InteractionBinder`] keeps a [`Page`] of rendered regions and
//! turns affordance clicks into backend round-trips.

pub mod client;
pub mod page;
pub mod payload;
pub mod render;
#[cfg(feature = "web")]
pub mod web;

pub use client::{Asset, CaseApi, ClientConfig, ClientError, HttpCaseApi};
pub use page::{InteractionBinder, InteractionError, Outcome, Page, Region};
pub use payload::{CaseEntry, QueryTerm, ResultPayload, Scalar};
pub use render::{
    Affordance, Fragments, ItemAction, QueryFragment, RenderError, ResultFragment,
    ThumbnailUpdate, render_fragments, render_query, render_results,
};
