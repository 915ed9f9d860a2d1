// src/config/mod.rs

//! Task catalog configuration.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Load a catalog from disk (`loader.rs`).
//! - Validate it before anything runs (`validate.rs`).

pub mod duration;
pub mod loader;
pub mod model;
pub mod validate;

pub use duration::parse_duration;
pub use loader::{default_config_path, load_and_validate, load_from_path, load_from_str};
pub use model::{ConfigFile, ConfigSection, ProbeConfig, RawConfigFile, TaskConfig};
