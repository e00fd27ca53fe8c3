use std::time::Duration;

use serde_json::{Map, Value};

/// Knobs for the router core. All optional with defaults; numeric overrides
/// are clamped to sane ranges rather than rejected.
#[derive(Debug, Clone, PartialEq)]
pub struct RouterConfig {
    pub request_limit: usize,
    pub request_window: Duration,
    pub cache_capacity: usize,
    pub history_capacity: usize,
    pub max_input_length: usize,
    pub classify_retry_attempts: usize,
    pub classify_retry_delay: Duration,
    pub request_timeout: Duration,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            request_limit: 10,
            request_window: Duration::from_secs(60),
            cache_capacity: 2000,
            history_capacity: 2000,
            max_input_length: 1500,
            classify_retry_attempts: 3,
            classify_retry_delay: Duration::from_secs_f64(0.3),
            request_timeout: Duration::from_secs(30),
        }
    }
}

impl RouterConfig {
    pub fn from_overrides(overrides: &Map<String, Value>) -> Self {
        Self {
            request_limit: value_as_f64(overrides.get("request_limit"), 10.0, 1.0, 10_000.0)
                .round() as usize,
            request_window: Duration::from_secs_f64(value_as_f64(
                overrides.get("request_window_seconds"),
                60.0,
                1.0,
                3600.0,
            )),
            cache_capacity: value_as_f64(overrides.get("cache_capacity"), 2000.0, 1.0, 100_000.0)
                .round() as usize,
            history_capacity: value_as_f64(
                overrides.get("history_capacity"),
                2000.0,
                1.0,
                100_000.0,
            )
            .round() as usize,
            max_input_length: value_as_f64(
                overrides.get("max_input_length"),
                1500.0,
                1.0,
                100_000.0,
            )
            .round() as usize,
            classify_retry_attempts: value_as_f64(
                overrides.get("classify_retry_attempts"),
                3.0,
                1.0,
                10.0,
            )
            .round() as usize,
            classify_retry_delay: Duration::from_secs_f64(value_as_f64(
                overrides.get("classify_retry_delay_seconds"),
                0.3,
                0.0,
                30.0,
            )),
            request_timeout: Duration::from_secs_f64(value_as_f64(
                overrides.get("request_timeout_seconds"),
                30.0,
                1.0,
                300.0,
            )),
        }
    }
}

fn value_as_f64(value: Option<&Value>, default: f64, min: f64, max: f64) -> f64 {
    let parsed = value.and_then(|row| match row {
        Value::Number(num) => num.as_f64(),
        Value::String(text) => text.trim().parse::<f64>().ok(),
        _ => None,
    });
    parsed.unwrap_or(default).clamp(min, max)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::{json, Map, Value};

    use super::RouterConfig;

    fn overrides(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn defaults_match_documented_values() {
        let config = RouterConfig::default();
        assert_eq!(config.request_limit, 10);
        assert_eq!(config.request_window, Duration::from_secs(60));
        assert_eq!(config.cache_capacity, 2000);
        assert_eq!(config.history_capacity, 2000);
        assert_eq!(config.max_input_length, 1500);
        assert_eq!(config.classify_retry_attempts, 3);
        assert_eq!(config.classify_retry_delay, Duration::from_secs_f64(0.3));
    }

    #[test]
    fn empty_overrides_reproduce_defaults() {
        assert_eq!(
            RouterConfig::from_overrides(&Map::new()),
            RouterConfig::default()
        );
    }

    #[test]
    fn overrides_accept_numbers_and_strings() {
        let config = RouterConfig::from_overrides(&overrides(json!({
            "request_limit": 5,
            "request_window_seconds": "120",
            "classify_retry_attempts": 1,
        })));
        assert_eq!(config.request_limit, 5);
        assert_eq!(config.request_window, Duration::from_secs(120));
        assert_eq!(config.classify_retry_attempts, 1);
    }

    #[test]
    fn out_of_range_overrides_are_clamped() {
        let config = RouterConfig::from_overrides(&overrides(json!({
            "request_limit": 0,
            "classify_retry_attempts": 99,
            "classify_retry_delay_seconds": -4.0,
        })));
        assert_eq!(config.request_limit, 1);
        assert_eq!(config.classify_retry_attempts, 10);
        assert_eq!(config.classify_retry_delay, Duration::ZERO);
    }

    #[test]
    fn unparseable_override_falls_back_to_default() {
        let config = RouterConfig::from_overrides(&overrides(json!({
            "request_limit": "plenty",
            "cache_capacity": null,
        })));
        assert_eq!(config.request_limit, 10);
        assert_eq!(config.cache_capacity, 2000);
    }
}
