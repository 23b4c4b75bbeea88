//! Engine configuration
//!
//! Settings are plain data loaded from JSON. Every field has a default, so
//! an empty object (`{}`) is a valid configuration.

use crate::trace::TraceLevel;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Errors raised while loading settings
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to read settings: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse settings: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid setting `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Trace side channel configuration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TraceSettings {
    pub level: TraceLevel,
    /// Prefix trace lines with the program address
    pub addresses: bool,
}

impl Default for TraceSettings {
    fn default() -> Self {
        Self {
            level: TraceLevel::None,
            addresses: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Errors reported before validation gives up
    pub max_errors: usize,
    /// Actions a single run may record
    pub max_actions: usize,
    /// Redirects a single run may record
    pub max_redirects: usize,
    /// Distinct variables a script may declare
    pub max_variables: usize,
    /// Longest value a variable can hold, in bytes
    pub max_variable_size: usize,
    /// Backtracking steps allowed for one `:matches` comparison
    pub max_match_iterations: usize,
    /// CPU time limit, both per run and cumulative, in milliseconds
    pub max_cpu_time_ms: Option<u32>,
    /// Cumulative usage older than this is forgotten
    pub resource_usage_timeout_secs: u64,
    /// How long to wait for the binary lock when recording usage
    pub lock_timeout_ms: u64,
    /// Enabled extensions by name; `None` enables everything registered
    pub extensions: Option<Vec<String>>,
    /// Extensions only available to global scripts
    pub global_extensions: Vec<String>,
    /// Separator between user and detail for the subaddress extension
    pub subaddress_separator: String,
    /// Header fields editheader may never add or delete
    pub editheader_protected: Vec<String>,
    /// Longest header field editheader will add, in bytes
    pub editheader_max_header_size: usize,
    pub trace: TraceSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            max_errors: 10,
            max_actions: 32,
            max_redirects: 4,
            max_variables: 255,
            max_variable_size: 4096,
            max_match_iterations: 100_000,
            max_cpu_time_ms: None,
            resource_usage_timeout_secs: 3600,
            lock_timeout_ms: 250,
            extensions: None,
            global_extensions: Vec::new(),
            subaddress_separator: "+".to_string(),
            editheader_protected: vec!["received".to_string(), "auto-submitted".to_string()],
            editheader_max_header_size: 2048,
            trace: TraceSettings::default(),
        }
    }
}

impl Settings {
    /// Parse settings from a JSON document
    pub fn from_json(json: &str) -> Result<Self, SettingsError> {
        let settings: Settings = serde_json::from_str(json)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Read settings from a JSON file
    pub fn from_file(path: &Path) -> Result<Self, SettingsError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.max_errors == 0 {
            return Err(SettingsError::Invalid {
                field: "max_errors",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.subaddress_separator.is_empty() {
            return Err(SettingsError::Invalid {
                field: "subaddress_separator",
                reason: "must not be empty".to_string(),
            });
        }
        if self.max_match_iterations == 0 {
            return Err(SettingsError::Invalid {
                field: "max_match_iterations",
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    /// Whether the named extension may be used at all
    pub fn extension_enabled(&self, name: &str) -> bool {
        match &self.extensions {
            Some(list) => list.iter().any(|e| e.eq_ignore_ascii_case(name)),
            None => true,
        }
    }

    /// Whether the named extension is reserved for global scripts
    pub fn extension_global(&self, name: &str) -> bool {
        self.global_extensions
            .iter()
            .any(|e| e.eq_ignore_ascii_case(name))
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }

    pub fn editheader_is_protected(&self, field: &str) -> bool {
        self.editheader_protected
            .iter()
            .any(|h| h.eq_ignore_ascii_case(field))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_json_gives_defaults() {
        let settings = Settings::from_json("{}").unwrap();
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.max_match_iterations, 100_000);
        assert!(settings.extension_enabled("fileinto"));
    }

    #[test]
    fn test_partial_override() {
        let settings = Settings::from_json(
            r#"{
                "max_redirects": 1,
                "extensions": ["fileinto", "Variables"],
                "global_extensions": ["editheader"],
                "trace": { "level": "matching", "addresses": true }
            }"#,
        )
        .unwrap();

        assert_eq!(settings.max_redirects, 1);
        assert!(settings.extension_enabled("variables"));
        assert!(!settings.extension_enabled("regex"));
        assert!(settings.extension_global("EDITHEADER"));
        assert_eq!(settings.trace.level, TraceLevel::Matching);
        assert!(settings.trace.addresses);
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(matches!(
            Settings::from_json(r#"{"max_errors": 0}"#),
            Err(SettingsError::Invalid { field: "max_errors", .. })
        ));
        assert!(matches!(
            Settings::from_json(r#"{"subaddress_separator": ""}"#),
            Err(SettingsError::Invalid { .. })
        ));
        assert!(matches!(
            Settings::from_json("{not json"),
            Err(SettingsError::Parse(_))
        ));
    }

    #[test]
    fn test_protected_headers_case_insensitive() {
        let settings = Settings::default();
        assert!(settings.editheader_is_protected("Received"));
        assert!(!settings.editheader_is_protected("X-Spam"));
    }
}
