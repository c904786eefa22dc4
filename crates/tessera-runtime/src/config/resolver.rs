//! Configuration resolver trait for layered overrides.
//!
//! ```text
//! ConfigLoader.load()  →  TesseraConfig (base)
//!                              │
//!                     ConfigResolver.apply()
//!                              │
//!                              ▼
//!                     TesseraConfig (final)
//! ```

use super::TesseraConfig;

/// Applies overrides (CLI flags, programmatic settings) to a loaded
/// configuration.
///
/// Only values the caller actually set should be applied.
pub trait ConfigResolver {
    /// Applies overrides to `config`.
    fn apply(&self, config: &mut TesseraConfig);
}

/// Resolver that makes no changes.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpResolver;

impl ConfigResolver for NoOpResolver {
    fn apply(&self, _config: &mut TesseraConfig) {}
}
