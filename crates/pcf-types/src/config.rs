use serde::{Deserialize, Serialize};

/// Well-known name of the page-wide event channel
pub const DEFAULT_CHANNEL_NAME: &str = "PCFEventBus";
pub const DEFAULT_MAX_DISPATCH_DEPTH: usize = 8;
pub const DEFAULT_DEBOUNCE_DELAY_MS: u64 = 300;
/// Dataverse rejects `ExecuteMultiple` batches above this size
pub const DEFAULT_MAX_BATCH_SIZE: usize = 1000;
pub const DEFAULT_PAGE_SIZE: usize = 50;
pub const DEFAULT_GRID_ROW_COUNT: usize = 1000;

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub event_bus: EventBusConfig,
    #[serde(default)]
    pub debounce: DebounceConfig,
    #[serde(default)]
    pub web_api: WebApiConfig,
    #[serde(default)]
    pub grid: GridConfig,
}

/// How a dispatch reacts when one subscriber fails
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchPolicy {
    /// Log the failure and keep notifying the remaining subscribers
    #[default]
    Isolate,
    /// Stop at the first failure; later subscribers are skipped
    FailFast,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct EventBusConfig {
    #[serde(default = "default_channel_name")]
    pub channel_name: String,
    #[serde(default)]
    pub dispatch_policy: DispatchPolicy,
    /// Nested publishes deeper than this are rejected
    #[serde(default = "default_max_dispatch_depth")]
    pub max_dispatch_depth: usize,
}

impl Default for EventBusConfig {
    fn default() -> Self {
        Self {
            channel_name: default_channel_name(),
            dispatch_policy: DispatchPolicy::default(),
            max_dispatch_depth: DEFAULT_MAX_DISPATCH_DEPTH,
        }
    }
}

fn default_channel_name() -> String {
    DEFAULT_CHANNEL_NAME.to_string()
}

fn default_max_dispatch_depth() -> usize {
    DEFAULT_MAX_DISPATCH_DEPTH
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct DebounceConfig {
    #[serde(default = "default_debounce_delay_ms")]
    pub delay_ms: u64,
}

impl Default for DebounceConfig {
    fn default() -> Self {
        Self {
            delay_ms: DEFAULT_DEBOUNCE_DELAY_MS,
        }
    }
}

fn default_debounce_delay_ms() -> u64 {
    DEFAULT_DEBOUNCE_DELAY_MS
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct WebApiConfig {
    /// Base URI of the OData endpoint, e.g. `https://org.crm.dynamics.com/api/data/v9.2/`
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub base_url: String,
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
}

impl Default for WebApiConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

fn default_max_batch_size() -> usize {
    DEFAULT_MAX_BATCH_SIZE
}

fn default_page_size() -> usize {
    DEFAULT_PAGE_SIZE
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct GridConfig {
    #[serde(default = "default_grid_row_count")]
    pub row_count: usize,
    #[serde(default = "default_row_height")]
    pub row_height: u32,
    #[serde(default = "default_viewport_height")]
    pub viewport_height: u32,
    /// Extra rows rendered above and below the visible window
    #[serde(default = "default_overscan")]
    pub overscan: usize,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            row_count: DEFAULT_GRID_ROW_COUNT,
            row_height: default_row_height(),
            viewport_height: default_viewport_height(),
            overscan: default_overscan(),
        }
    }
}

fn default_grid_row_count() -> usize {
    DEFAULT_GRID_ROW_COUNT
}

fn default_row_height() -> u32 {
    44
}

fn default_viewport_height() -> u32 {
    500
}

fn default_overscan() -> usize {
    4
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_object_uses_defaults() {
        let config: Config = serde_json::from_str("{}").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.event_bus.channel_name, "PCFEventBus");
        assert_eq!(config.debounce.delay_ms, 300);
        assert_eq!(config.web_api.max_batch_size, 1000);
        assert_eq!(config.grid.row_count, 1000);
    }

    #[test]
    fn test_partial_sections() {
        let raw = r#"{
            "event_bus": { "dispatch_policy": "fail_fast" },
            "web_api": { "base_url": "https://example.crm.dynamics.com/api/data/v9.2/" }
        }"#;

        let config: Config = serde_json::from_str(raw).unwrap();
        assert_eq!(config.event_bus.dispatch_policy, DispatchPolicy::FailFast);
        assert_eq!(config.event_bus.max_dispatch_depth, DEFAULT_MAX_DISPATCH_DEPTH);
        assert_eq!(config.web_api.page_size, DEFAULT_PAGE_SIZE);
    }
}
