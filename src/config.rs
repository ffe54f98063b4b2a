//! Engine configuration: defaults, overridden by a small env-var layer, the
//! way the teacher's own config loader favors an explicit precedence chain
//! over a generic config-merging crate. No file-based layer: the engine has
//! exactly two tunables and a TOML file would be more ceremony than either
//! is worth.

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Per-`check` Z3 timeout, in milliseconds. Surfaces as
    /// `CheckStatus::Unknown` rather than hanging (§5, §7).
    pub z3_timeout_ms: u64,
    /// Default search root for knowledge-base definition files when a
    /// caller passes bare relative paths to `load_definitions`.
    pub definitions_path: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            z3_timeout_ms: 30_000,
            definitions_path: "definitions".to_string(),
        }
    }
}

/// Load configuration with the following precedence:
/// 1. Defaults
/// 2. Env `LICENTIA_Z3_TIMEOUT_MS` / `LICENTIA_DEFINITIONS_PATH` overrides
pub fn load() -> EngineConfig {
    let mut cfg = EngineConfig::default();

    if let Ok(v) = std::env::var("LICENTIA_Z3_TIMEOUT_MS") {
        if let Ok(ms) = v.parse::<u64>() {
            cfg.z3_timeout_ms = ms;
        }
    }

    if let Ok(path) = std::env::var("LICENTIA_DEFINITIONS_PATH") {
        cfg.definitions_path = path;
    }

    cfg
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_stable() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.z3_timeout_ms, 30_000);
        assert_eq!(cfg.definitions_path, "definitions");
    }
}
