//! Engine configuration.

/// Environment variable consulted by [`EngineConfig::from_env_or_default`].
pub const MAX_DEPTH_ENV: &str = "REWALK_MAX_DEPTH";

/// Frame limit applied when nothing else is configured.
pub const DEFAULT_MAX_DEPTH: usize = 10_000;

/// Tunables for an [`Engine`](crate::engine::Engine).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    /// Maximum number of frames a single traversal may hold. Each struct,
    /// pointer, slice and union on the current path takes one frame.
    pub max_depth: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self { max_depth: DEFAULT_MAX_DEPTH }
    }
}

impl EngineConfig {
    /// Builds a configuration from the environment or an explicit override.
    ///
    /// Checks in order:
    /// 1. Environment variable `REWALK_MAX_DEPTH`
    /// 2. Explicit override
    /// 3. Falls back to [`DEFAULT_MAX_DEPTH`]
    pub fn from_env_or_default(max_depth: Option<&str>) -> Self {
        if let Ok(value) = std::env::var(MAX_DEPTH_ENV) {
            return Self::parse(&value);
        }

        if let Some(value) = max_depth {
            return Self::parse(value);
        }

        Self::default()
    }

    fn parse(s: &str) -> Self {
        match s.trim().parse::<usize>() {
            Ok(max_depth) if max_depth > 0 => Self { max_depth },
            _ => {
                tracing::warn!(
                    "Invalid max depth '{}', defaulting to {}",
                    s,
                    DEFAULT_MAX_DEPTH
                );
                Self::default()
            }
        }
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse() {
        assert_eq!(EngineConfig::parse("64").max_depth, 64);
        assert_eq!(EngineConfig::parse(" 12 ").max_depth, 12);
        assert_eq!(EngineConfig::parse("0"), EngineConfig::default());
        assert_eq!(EngineConfig::parse("deep"), EngineConfig::default());
    }

    #[test]
    fn test_override_without_env() {
        // Only meaningful when the variable is not set in the test environment.
        if std::env::var(MAX_DEPTH_ENV).is_err() {
            assert_eq!(EngineConfig::from_env_or_default(Some("32")).max_depth, 32);
            assert_eq!(EngineConfig::from_env_or_default(None), EngineConfig::default());
        }
    }
}
