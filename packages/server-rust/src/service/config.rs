use serde::Deserialize;

/// Configuration for the policy-backed service module.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PolbackConfig {
    /// Identifier of this node, attached to lifecycle log lines.
    pub node_id: String,
    /// Reject implementations that leave any declared operation unbound.
    /// Off by default: partial bindings are allowed and surface only when
    /// the unbound operation is called.
    pub require_complete_bindings: bool,
    /// Upper bound on concurrently running invocations. `None` disables load shedding.
    pub max_concurrent_invocations: Option<u32>,
    /// Capacity of the change-notification broadcast channel.
    pub event_channel_capacity: usize,
    /// Perform a reload as part of `start()`.
    pub reload_on_start: bool,
    pub logging: LoggingConfig,
}

impl Default for PolbackConfig {
    fn default() -> Self {
        Self {
            node_id: String::new(),
            require_complete_bindings: false,
            max_concurrent_invocations: None,
            event_channel_capacity: 64,
            reload_on_start: true,
            logging: LoggingConfig::default(),
        }
    }
}

impl PolbackConfig {
    /// Parses a JSON document; absent fields take their defaults.
    ///
    /// # Errors
    ///
    /// Returns the underlying `serde_json` error for malformed input.
    pub fn from_json_str(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// Log output settings consumed by [`crate::logging::init_tracing`].
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is not set.
    pub filter: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
            json: false,
        }
    }
}
