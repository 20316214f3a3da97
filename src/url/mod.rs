//! URL handling for the crawler
//!
//! This module provides canonicalization (the dedup identity of a page),
//! query-string canonicalization, host keys and domain splitting, and the
//! [`WebUrl`] record that travels through the frontier.

mod domain;
mod normalize;
mod query;
mod web_url;

// Re-export main functions
pub use domain::{host_key, split_domain};
pub use normalize::{normalize_url, normalize_url_with, NormalizeOptions};
pub use query::canonicalize_query;
pub use web_url::{DocId, WebUrl};
