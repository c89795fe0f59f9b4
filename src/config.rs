//! Layered settings for the catalog.
//!
//! Precedence (highest wins): explicit overrides from the command line,
//! environment variables (`TUNEDEX__` prefix, `__` as nested separator),
//! an optional TOML file, struct defaults.

mod load;
mod schema;

pub use load::{default_config_path, resolve_config_path};
pub use schema::*;
