//! Datasource settings.

use numalens_core::{LensError, LensResult};
use serde::{Deserialize, Serialize};
use tracing::debug;

const DEFAULT_NAMESPACE: &str = "default";

/// Per-datasource configuration. When `namespaced` is set every query is pinned
/// to `namespace`, whatever the query itself asks for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub namespaced: bool,
    pub namespace: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self { namespaced: false, namespace: DEFAULT_NAMESPACE.to_string() }
    }
}

impl Settings {
    pub fn pinned(namespace: impl Into<String>) -> Self {
        Self { namespaced: true, namespace: namespace.into() }
    }

    /// Load settings from the datasource JSON blob; empty input yields defaults.
    pub fn from_json(bytes: &[u8]) -> LensResult<Self> {
        if bytes.iter().all(|b| b.is_ascii_whitespace()) {
            debug!("no settings found, using defaults");
            return Ok(Self::default());
        }
        let settings: Settings = serde_json::from_slice(bytes)
            .map_err(|e| LensError::Validation(format!("could not unmarshal settings json: {}", e)))?;
        debug!(namespaced = settings.namespaced, namespace = %settings.namespace, "parsed settings");
        Ok(settings)
    }

    pub fn pinned_namespace(&self) -> Option<&str> {
        if self.namespaced { Some(self.namespace.as_str()) } else { None }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_settings_use_defaults() {
        let s = Settings::from_json(b"").expect("defaults");
        assert!(!s.namespaced);
        assert_eq!(s.namespace, "default");
        assert_eq!(s.pinned_namespace(), None);
    }

    #[test]
    fn partial_settings_fill_defaults() {
        let s = Settings::from_json(br#"{"namespaced":true}"#).expect("ok");
        assert_eq!(s.pinned_namespace(), Some("default"));
        let s = Settings::from_json(br#"{"namespaced":true,"namespace":"team-a"}"#).expect("ok");
        assert_eq!(s.pinned_namespace(), Some("team-a"));
    }

    #[test]
    fn malformed_settings_are_rejected() {
        let e = Settings::from_json(b"{not json").unwrap_err();
        assert!(matches!(e, LensError::Validation(_)));
    }
}
