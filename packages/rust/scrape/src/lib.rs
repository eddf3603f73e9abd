//! Web acquisition for SchoolForge: polite fetching, selector-driven
//! extraction, and the source registry.
//!
//! The crate is deliberately I/O-light at its seams: [`Fetcher`] owns all
//! network access, while [`extract`] and [`SourceRegistry::search_results`]
//! operate on already-fetched HTML so they stay trivially testable.

pub mod extract;
pub mod fetch;
pub mod sources;

pub use extract::{Extraction, extract};
pub use fetch::{Fetcher, RetryPolicy, with_retry};
pub use sources::{SourceRegistry, builtin_sources, default_selectors};
