/// Interpreter knobs. `Default` is the production setting; `from_env`
/// applies `IRX_NO_IC`, `IRX_MAX_DEPTH` and `IRX_LOG_DEOPTS` on top of it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterpConfig {
    /// Per-call-site method caches
    pub inline_caches: bool,
    /// Activations deeper than this raise `SystemStackError`
    pub max_depth: usize,
    /// Emit a `warn` event for every guard failure instead of `debug`
    pub log_deopts: bool,
}

pub const DEFAULT_MAX_DEPTH: usize = 1024;

impl Default for InterpConfig {
    fn default() -> Self {
        Self {
            inline_caches: true,
            max_depth: DEFAULT_MAX_DEPTH,
            log_deopts: false,
        }
    }
}

fn env_flag(name: &str) -> bool {
    std::env::var(name)
        .ok()
        .map(|v| matches!(v.as_str(), "1" | "true" | "TRUE"))
        .unwrap_or(false)
}

impl InterpConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if env_flag("IRX_NO_IC") {
            config.inline_caches = false;
        }
        if let Some(depth) = std::env::var("IRX_MAX_DEPTH").ok().and_then(|v| v.trim().parse::<usize>().ok())
            && depth > 0
        {
            config.max_depth = depth;
        }
        if env_flag("IRX_LOG_DEOPTS") {
            config.log_deopts = true;
        }
        config
    }

    pub fn without_caches(mut self) -> Self {
        self.inline_caches = false;
        self
    }

    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builders_override_defaults() {
        let config = InterpConfig::default().without_caches().with_max_depth(8);
        assert!(!config.inline_caches);
        assert_eq!(config.max_depth, 8);
        assert!(!config.log_deopts);
    }
}
