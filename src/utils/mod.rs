//! Environment helpers shared by the config layer.

pub mod env;

pub use env::{get_env_with_prefix, parse_env};
