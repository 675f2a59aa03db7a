//! Runtime configuration.
//!
//! Configuration is per thread, matching the rest of the engine: every
//! reactive structure lives on the thread that created it.
//!
//! `Config` deserializes from any serde format, with missing fields taking
//! their defaults, so embedders can keep it in their own settings files.

use serde::{Deserialize, Serialize};

/// Tunables for the reactive runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Emit invariant warnings and run the circular-update guard.
    ///
    /// Defaults to on in debug builds and off in release builds.
    pub diagnostics: bool,

    /// How many times one watcher may be re-queued within a single flush
    /// before the flush is aborted as a probable infinite update loop.
    pub max_update_count: u32,

    /// Defer flushes through the host's deferred-callback primitive.
    ///
    /// When false, the queue is flushed synchronously on the first enqueue.
    pub async_flush: bool,
}

impl Config {
    /// Default circular-update threshold.
    pub const MAX_UPDATE_COUNT: u32 = 100;

    /// Set the diagnostics flag.
    pub fn with_diagnostics(mut self, enabled: bool) -> Self {
        self.diagnostics = enabled;
        self
    }

    /// Set the circular-update threshold.
    pub fn with_max_update_count(mut self, limit: u32) -> Self {
        self.max_update_count = limit;
        self
    }

    /// Choose between deferred and synchronous flushing.
    pub fn with_async_flush(mut self, enabled: bool) -> Self {
        self.async_flush = enabled;
        self
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            diagnostics: cfg!(debug_assertions),
            max_update_count: Self::MAX_UPDATE_COUNT,
            async_flush: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_overrides_defaults() {
        let config = Config::default()
            .with_diagnostics(true)
            .with_max_update_count(5)
            .with_async_flush(false);

        assert!(config.diagnostics);
        assert_eq!(config.max_update_count, 5);
        assert!(!config.async_flush);
    }

    #[test]
    fn partial_json_fills_in_defaults() {
        let config: Config = serde_json::from_str(r#"{"max_update_count": 7}"#).unwrap();
        assert_eq!(config.max_update_count, 7);
        assert!(config.async_flush);
        assert_eq!(config.diagnostics, Config::default().diagnostics);
    }

    #[test]
    fn default_limit_matches_constant() {
        assert_eq!(Config::default().max_update_count, 100);
        assert!(Config::default().async_flush);
    }
}
