//! URL handling module for Site-Mirror
//!
//! This module provides URL canonicalization (the dedup identity of a task)
//! and the domain key used to decide whether a link stays on the crawled site.

mod domain;
mod normalize;

// Re-export main functions
pub use domain::{domain_key, is_same_site, output_folder_name};
pub use normalize::{canonicalize, canonicalize_with_base};
