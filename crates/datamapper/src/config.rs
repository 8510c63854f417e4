//! Mapper configuration.
//!
//! [`Config`] carries the process-wide defaults held by the
//! [`Registry`](crate::Registry); [`ModelConfig`] holds per-model overrides
//! that are merged over it when a model descriptor is built.

use serde::{Deserialize, Serialize};

/// A `(field, direction)` default ordering entry. `None` means ascending.
pub type OrderSpec = (String, Option<String>);

/// Mapper-wide configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Prefix prepended to every derived table name.
    pub prefix: String,
    /// Prefix for join tables. Empty falls back to `prefix`.
    pub join_prefix: String,
    /// Wrapped around every recorded validation message.
    pub error_prefix: String,
    pub error_suffix: String,
    pub created_field: String,
    pub updated_field: String,
    /// `chrono` format string for timestamps.
    pub timestamp_format: String,
    /// Stamp local time instead of UTC.
    pub local_time: bool,
    /// Stamp Unix epoch seconds instead of a formatted string.
    pub unix_timestamp: bool,
    /// Wrap `save`/`delete` in a transaction.
    pub auto_transaction: bool,
    pub auto_populate_has_one: bool,
    pub auto_populate_has_many: bool,
    /// Key the result collection by id instead of position.
    pub all_array_uses_ids: bool,
    /// Result sets larger than this are freed right after materialization.
    pub free_result_threshold: usize,
    pub default_order_by: Vec<OrderSpec>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            prefix: String::new(),
            join_prefix: String::new(),
            error_prefix: String::new(),
            error_suffix: String::new(),
            created_field: "created".to_string(),
            updated_field: "updated".to_string(),
            timestamp_format: "%Y-%m-%d %H:%M:%S %z".to_string(),
            local_time: false,
            unix_timestamp: false,
            auto_transaction: false,
            auto_populate_has_one: false,
            auto_populate_has_many: false,
            all_array_uses_ids: false,
            free_result_threshold: 100,
            default_order_by: Vec::new(),
        }
    }
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn with_join_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.join_prefix = prefix.into();
        self
    }

    /// Set the text wrapped around each validation message (e.g. `<p>`, `</p>`).
    pub fn with_error_delimiters(
        mut self,
        prefix: impl Into<String>,
        suffix: impl Into<String>,
    ) -> Self {
        self.error_prefix = prefix.into();
        self.error_suffix = suffix.into();
        self
    }

    pub fn with_created_field(mut self, field: impl Into<String>) -> Self {
        self.created_field = field.into();
        self
    }

    pub fn with_updated_field(mut self, field: impl Into<String>) -> Self {
        self.updated_field = field.into();
        self
    }

    pub fn with_timestamp_format(mut self, format: impl Into<String>) -> Self {
        self.timestamp_format = format.into();
        self
    }

    pub fn with_local_time(mut self, local: bool) -> Self {
        self.local_time = local;
        self
    }

    pub fn with_unix_timestamp(mut self, unix: bool) -> Self {
        self.unix_timestamp = unix;
        self
    }

    pub fn with_auto_transaction(mut self, enabled: bool) -> Self {
        self.auto_transaction = enabled;
        self
    }

    pub fn with_auto_populate_has_one(mut self, enabled: bool) -> Self {
        self.auto_populate_has_one = enabled;
        self
    }

    pub fn with_auto_populate_has_many(mut self, enabled: bool) -> Self {
        self.auto_populate_has_many = enabled;
        self
    }

    pub fn with_all_array_uses_ids(mut self, enabled: bool) -> Self {
        self.all_array_uses_ids = enabled;
        self
    }

    pub fn with_free_result_threshold(mut self, rows: usize) -> Self {
        self.free_result_threshold = rows;
        self
    }

    /// Append a default ordering entry (`None` direction means ascending).
    pub fn with_default_order_by(mut self, field: impl Into<String>, dir: Option<&str>) -> Self {
        self.default_order_by
            .push((field.into(), dir.map(str::to_string)));
        self
    }

    /// Apply per-model overrides on top of this configuration.
    pub fn merged(&self, overrides: &ModelConfig) -> Config {
        let mut out = self.clone();
        macro_rules! apply {
            ($($field:ident),* $(,)?) => {
                $(if let Some(v) = &overrides.$field { out.$field = v.clone(); })*
            };
        }
        apply!(
            prefix,
            join_prefix,
            error_prefix,
            error_suffix,
            created_field,
            updated_field,
            timestamp_format,
            local_time,
            unix_timestamp,
            auto_transaction,
            auto_populate_has_one,
            auto_populate_has_many,
            all_array_uses_ids,
            free_result_threshold,
        );
        out
    }
}

/// Per-model configuration overrides. Unset fields inherit from [`Config`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    pub prefix: Option<String>,
    pub join_prefix: Option<String>,
    pub error_prefix: Option<String>,
    pub error_suffix: Option<String>,
    pub created_field: Option<String>,
    pub updated_field: Option<String>,
    pub timestamp_format: Option<String>,
    pub local_time: Option<bool>,
    pub unix_timestamp: Option<bool>,
    pub auto_transaction: Option<bool>,
    pub auto_populate_has_one: Option<bool>,
    pub auto_populate_has_many: Option<bool>,
    pub all_array_uses_ids: Option<bool>,
    pub free_result_threshold: Option<usize>,
}

impl ModelConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    pub fn with_join_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.join_prefix = Some(prefix.into());
        self
    }

    pub fn with_created_field(mut self, field: impl Into<String>) -> Self {
        self.created_field = Some(field.into());
        self
    }

    pub fn with_updated_field(mut self, field: impl Into<String>) -> Self {
        self.updated_field = Some(field.into());
        self
    }

    pub fn with_unix_timestamp(mut self, unix: bool) -> Self {
        self.unix_timestamp = Some(unix);
        self
    }

    pub fn with_auto_transaction(mut self, enabled: bool) -> Self {
        self.auto_transaction = Some(enabled);
        self
    }

    pub fn with_auto_populate_has_one(mut self, enabled: bool) -> Self {
        self.auto_populate_has_one = Some(enabled);
        self
    }

    pub fn with_auto_populate_has_many(mut self, enabled: bool) -> Self {
        self.auto_populate_has_many = Some(enabled);
        self
    }

    pub fn with_all_array_uses_ids(mut self, enabled: bool) -> Self {
        self.all_array_uses_ids = Some(enabled);
        self
    }

    pub fn with_free_result_threshold(mut self, rows: usize) -> Self {
        self.free_result_threshold = Some(rows);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = Config::default();
        assert_eq!(config.created_field, "created");
        assert_eq!(config.updated_field, "updated");
        assert_eq!(config.free_result_threshold, 100);
        assert!(!config.auto_transaction);
    }

    #[test]
    fn model_overrides_win() {
        let base = Config::new().with_prefix("app_").with_auto_transaction(true);
        let merged = base.merged(
            &ModelConfig::new()
                .with_prefix("legacy_")
                .with_updated_field("modified"),
        );
        assert_eq!(merged.prefix, "legacy_");
        assert_eq!(merged.updated_field, "modified");
        assert!(merged.auto_transaction);
        assert_eq!(merged.created_field, "created");
    }
}
