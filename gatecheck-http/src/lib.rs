//! HTTP action player for the Gatecheck benchmarker
//!
//! This crate executes single described HTTP interactions against the service
//! under test, with per-actor cookie isolation, conditional caching for static
//! assets, and pluggable response verification.

pub mod cache;
pub mod client;
pub mod config;
pub mod errors;
pub mod types;

// Re-export main types for convenience
pub use cache::{CacheEntry, CacheSet};
pub use client::{CheckAction, CheckFunc, Checker, PlayedResponse};
pub use config::HttpConfig;
pub use errors::{CheckError, CheckResult};
pub use types::HttpMethod;

// Re-export the wire-level types callbacks are written against
pub use bytes::Bytes;
pub use reqwest::header::HeaderMap;
pub use reqwest::StatusCode;
