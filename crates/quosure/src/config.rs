use serde::{Deserialize, Serialize};

/// How a quosure holds on to the environment it was captured in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureMode {
    /// Keep a reference to the live frames. Bindings changed after capture
    /// are visible when the quosure is evaluated.
    #[default]
    Live,
    /// Copy every non-base frame of the chain at capture time.
    Snapshot,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Maximum number of nested evaluations before `DepthExceeded`. The
    /// default fits a 2 MiB thread stack; raise it only on larger stacks.
    pub max_depth: usize,
    pub capture_mode: CaptureMode,
    /// Log every marker rewrite at debug level.
    pub trace_substitution: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_depth: 128,
            capture_mode: CaptureMode::Live,
            trace_substitution: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: Config = serde_json::from_str(r#"{ "capture_mode": "snapshot" }"#).unwrap();
        assert_eq!(config.capture_mode, CaptureMode::Snapshot);
        assert_eq!(config.max_depth, 128);
        assert!(!config.trace_substitution);
    }
}
