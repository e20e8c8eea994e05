//! Typed view over the key/value `config` table.
//!
//! Each row stores one JSON value. Known keys deserialize into [`Settings`];
//! unknown keys (UI flags added by newer frontends) are kept verbatim in
//! `extra` and round-trip through the API untouched.

use flame_common::OrderingStrategy;
use flame_common::search::SearchSettings;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::FlameError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    pub use_ordering: OrderingStrategy,
    pub pin_apps_by_default: bool,
    pub pin_bookmarks_by_default: bool,
    pub pin_categories_by_default: bool,

    pub docker_apps: bool,
    pub docker_host: String,
    pub kubernetes_apps: bool,
    pub unpin_stopped_apps: bool,

    pub default_search_provider: String,
    pub secondary_search_provider: String,
    pub search_same_tab: bool,
    pub apps_same_tab: bool,
    pub bookmarks_same_tab: bool,

    pub hide_apps: bool,
    pub hide_bookmarks: bool,
    pub hide_search: bool,
    pub hide_header: bool,
    pub hide_empty_categories: bool,
    pub custom_title: String,
    pub default_theme: String,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            use_ordering: OrderingStrategy::CreatedAt,
            pin_apps_by_default: true,
            pin_bookmarks_by_default: true,
            pin_categories_by_default: true,
            docker_apps: false,
            docker_host: "localhost".to_string(),
            kubernetes_apps: false,
            unpin_stopped_apps: false,
            default_search_provider: "l".to_string(),
            secondary_search_provider: "d".to_string(),
            search_same_tab: false,
            apps_same_tab: false,
            bookmarks_same_tab: false,
            hide_apps: false,
            hide_bookmarks: false,
            hide_search: false,
            hide_header: false,
            hide_empty_categories: true,
            custom_title: "Flame".to_string(),
            default_theme: "tron".to_string(),
            extra: Map::new(),
        }
    }
}

impl Settings {
    /// Build settings from stored rows. A row whose value does not fit its
    /// key's type is ignored and the default is used instead.
    pub fn from_entries<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = (String, Value)>,
    {
        let mut merged = Self::default().to_map();
        for (key, value) in entries {
            if let Err(e) = Self::check_value(&key, &value) {
                tracing::warn!(key = %key, error = %e, "ignoring stored config value");
                continue;
            }
            merged.insert(key, value);
        }
        serde_json::from_value(Value::Object(merged)).unwrap_or_default()
    }

    /// Reject a patch if any known key carries a value of the wrong type.
    pub fn validate_patch(patch: &Map<String, Value>) -> Result<(), FlameError> {
        for (key, value) in patch {
            Self::check_value(key, value)?;
        }
        Ok(())
    }

    fn check_value(key: &str, value: &Value) -> Result<(), FlameError> {
        let mut candidate = Self::default().to_map();
        candidate.insert(key.to_string(), value.clone());
        serde_json::from_value::<Self>(Value::Object(candidate))
            .map(|_| ())
            .map_err(|e| FlameError::InvalidSetting {
                key: key.to_string(),
                reason: e.to_string(),
            })
    }

    pub fn to_map(&self) -> Map<String, Value> {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        }
    }

    /// Value for `key`, known or extra.
    pub fn get(&self, key: &str) -> Option<Value> {
        self.to_map().remove(key)
    }

    pub fn search(&self) -> SearchSettings {
        SearchSettings {
            default_provider: self.default_search_provider.clone(),
            secondary_provider: self.secondary_search_provider.clone(),
            same_tab: self.search_same_tab,
        }
    }

    pub fn integrations_enabled(&self) -> bool {
        self.docker_apps || self.kubernetes_apps
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_defaults_serialize_with_camel_case_keys() {
        let map = Settings::default().to_map();
        assert_eq!(map["useOrdering"], json!("createdAt"));
        assert_eq!(map["pinAppsByDefault"], json!(true));
        assert_eq!(map["dockerHost"], json!("localhost"));
        assert_eq!(map["defaultSearchProvider"], json!("l"));
        assert_eq!(map["hideEmptyCategories"], json!(true));
    }

    #[test]
    fn test_from_entries_overlays_stored_values() {
        let settings = Settings::from_entries(vec![
            ("useOrdering".to_string(), json!("orderId")),
            ("dockerApps".to_string(), json!(true)),
            ("showTime".to_string(), json!(true)),
        ]);
        assert_eq!(settings.use_ordering, OrderingStrategy::OrderId);
        assert!(settings.docker_apps);
        assert_eq!(settings.extra.get("showTime"), Some(&json!(true)));
        assert_eq!(settings.get("showTime"), Some(json!(true)));
    }

    #[test]
    fn test_from_entries_ignores_mistyped_values() {
        let settings = Settings::from_entries(vec![
            ("pinAppsByDefault".to_string(), json!("yes")),
            ("customTitle".to_string(), json!("Home")),
        ]);
        assert!(settings.pin_apps_by_default);
        assert_eq!(settings.custom_title, "Home");
    }

    #[test]
    fn test_validate_patch() {
        let mut patch = Map::new();
        patch.insert("useOrdering".to_string(), json!("name"));
        patch.insert("weatherApiKey".to_string(), json!("abc"));
        assert!(Settings::validate_patch(&patch).is_ok());

        patch.insert("useOrdering".to_string(), json!("random"));
        let err = Settings::validate_patch(&patch).unwrap_err();
        assert!(matches!(err, FlameError::InvalidSetting { ref key, .. } if key == "useOrdering"));
    }

    #[test]
    fn test_search_settings_projection() {
        let settings = Settings {
            default_search_provider: "g".to_string(),
            search_same_tab: true,
            ..Default::default()
        };
        let search = settings.search();
        assert_eq!(search.default_provider, "g");
        assert_eq!(search.secondary_provider, "d");
        assert!(search.same_tab);
    }
}
