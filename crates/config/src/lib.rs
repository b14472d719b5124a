//! Gateway configuration: defaults, optional `outpost.toml`, environment
//! overrides and validation.

pub mod env;
pub mod error;
pub mod loader;
pub mod schema;

pub use {
    error::{Error, Result},
    loader::{CONFIG_FILENAME, load, load_file},
    schema::*,
};
