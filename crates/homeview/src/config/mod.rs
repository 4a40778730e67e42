//! Configuration file parsing and structures.
//!
//! homeview reads TOML files which may import each other. Files are merged
//! field by field with first-wins semantics; conflicts and invalid values are
//! collected and reported together.

// Private module - the public surface is re-exported below
#[allow(clippy::module_inception)]
mod config;
mod diagnostics;
mod partial;

pub use config::*;
pub use diagnostics::format_diagnostics;
pub use diagnostics::Diagnostic;
pub use diagnostics::LoadError;
