//! Utility functions and helpers.
//!
//! - `url`: link canonicalization
//! - `html`: HTML fragment sanitizing
//! - `hash`: content fingerprints
//! - `http`: HTTP client construction

pub mod hash;
pub mod html;
pub mod http;
pub mod url;

pub use hash::{Fingerprint, fingerprint};
pub use html::clean;
pub use url::normalize;
