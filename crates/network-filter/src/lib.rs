//! Network-filter crate: target URL validation and SSRF defense.
//!
//! Feature flags:
//! - `metrics`: rejection counters via `outpost-metrics`

pub mod error;
pub mod guard;
pub mod ip;
pub mod resolve;
pub mod types;

pub use {
    error::{Error, Result},
    guard::{GuardPolicy, SsrfGuard},
    resolve::{Resolve, StaticResolver, SystemResolver},
    types::*,
};
