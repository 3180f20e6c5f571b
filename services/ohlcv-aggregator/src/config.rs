use std::env;
use std::time::Duration;

use crate::backpressure::OverflowPolicy;

/// Aggregator configuration derived from environment variables.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregatorConfig {
    /// Instrument label, used in logs only.
    pub symbol: String,
    /// Window duration; also the tick period.
    pub window: Duration,
    /// How far before the live window a trade may still revise a bar.
    pub stale_window: Duration,

    // ── Feed queue ─────────────────────────────────────────────────
    pub frame_queue_capacity: usize,
    pub overflow_policy: OverflowPolicy,

    // ── Lifetime / retention ───────────────────────────────────────
    /// Stop after this long. `None` ⇒ run until Ctrl-C or feed end.
    pub run_for: Option<Duration>,
    /// Drop bars that no late trade can reach any more.
    pub evict_stale_bars: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            symbol: "BTC-USD".to_string(),
            window: Duration::from_secs(30),
            stale_window: Duration::from_secs(3600),
            frame_queue_capacity: 10_000,
            overflow_policy: OverflowPolicy::Block,
            run_for: None,
            evict_stale_bars: false,
        }
    }
}

impl AggregatorConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build from any variable source (the process environment, a map in
    /// tests). Unset or blank variables fall back to defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| {
            lookup(name)
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
        };
        let defaults = Self::default();

        let cfg = Self {
            symbol: get("AGG_SYMBOL").unwrap_or(defaults.symbol),
            window: parse_secs(&get, "AGG_WINDOW_SECS")?.unwrap_or(defaults.window),
            stale_window: parse_secs(&get, "AGG_STALE_WINDOW_SECS")?
                .unwrap_or(defaults.stale_window),
            frame_queue_capacity: parse_num(&get, "AGG_FRAME_QUEUE_CAPACITY")?
                .unwrap_or(defaults.frame_queue_capacity),
            overflow_policy: match get("AGG_OVERFLOW_POLICY") {
                Some(raw) => raw.parse().map_err(|reason| ConfigError::Invalid {
                    name: "AGG_OVERFLOW_POLICY",
                    reason,
                })?,
                None => defaults.overflow_policy,
            },
            run_for: parse_secs(&get, "AGG_RUN_FOR_SECS")?,
            evict_stale_bars: match get("AGG_EVICT_STALE_BARS") {
                Some(raw) => parse_bool("AGG_EVICT_STALE_BARS", &raw)?,
                None => defaults.evict_stale_bars,
            },
        };

        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.window.is_zero() {
            return Err(ConfigError::Invalid {
                name: "AGG_WINDOW_SECS",
                reason: "window must be at least one second".to_string(),
            });
        }
        if self.frame_queue_capacity == 0 {
            return Err(ConfigError::Invalid {
                name: "AGG_FRAME_QUEUE_CAPACITY",
                reason: "capacity must be positive".to_string(),
            });
        }
        Ok(())
    }
}

fn parse_num<G>(get: &G, name: &'static str) -> Result<Option<usize>, ConfigError>
where
    G: Fn(&str) -> Option<String>,
{
    get(name)
        .map(|raw| {
            raw.parse::<usize>().map_err(|e| ConfigError::Invalid {
                name,
                reason: format!("`{raw}`: {e}"),
            })
        })
        .transpose()
}

fn parse_secs<G>(get: &G, name: &'static str) -> Result<Option<Duration>, ConfigError>
where
    G: Fn(&str) -> Option<String>,
{
    get(name)
        .map(|raw| {
            raw.parse::<u64>()
                .map(Duration::from_secs)
                .map_err(|e| ConfigError::Invalid {
                    name,
                    reason: format!("`{raw}`: {e}"),
                })
        })
        .transpose()
}

fn parse_bool(name: &'static str, raw: &str) -> Result<bool, ConfigError> {
    match raw.to_lowercase().as_str() {
        "1" | "true" | "yes" | "y" | "on" => Ok(true),
        "0" | "false" | "no" | "n" | "off" => Ok(false),
        other => Err(ConfigError::Invalid {
            name,
            reason: format!("`{other}` is not a boolean"),
        }),
    }
}
