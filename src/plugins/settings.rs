//! Typed plugin settings with validation.
//!
//! Each plugin declares its settings; the lifecycle manager resolves the
//! declared defaults against config-file overrides at load time. An invalid
//! override is logged and the default kept, so a typo in the config never
//! disables a plugin.

use std::collections::HashMap;
use tracing::warn;

/// A resolved setting value.
#[derive(Debug, Clone, PartialEq)]
pub enum SettingValue {
    Text(String),
    Number(i64),
    Boolean(bool),
}

impl SettingValue {
    #[allow(dead_code)] // accessor surface for text settings
    pub fn as_str(&self) -> Option<&str> {
        match self {
            SettingValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            SettingValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    #[allow(dead_code)] // accessor surface for boolean settings
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            SettingValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }
}

/// Resolved settings for one plugin, keyed by setting key.
pub type SettingsMap = HashMap<String, SettingValue>;

/// The type and constraints of a single setting.
#[derive(Debug, Clone)]
pub enum SettingKind {
    /// Free text with optional length bounds.
    Text {
        min_len: Option<usize>,
        max_len: Option<usize>,
    },
    /// An integer with optional bounds.
    Number {
        min_value: Option<i64>,
        max_value: Option<i64>,
    },
    /// A flag.
    Boolean,
    /// One of a fixed set of strings.
    Options(Vec<&'static str>),
}

/// A single setting declaration.
#[derive(Debug, Clone)]
pub struct PluginSetting {
    /// Key used in the settings map and the config file.
    pub key: &'static str,
    /// Human-readable label.
    pub label: &'static str,
    /// Type and constraints.
    pub kind: SettingKind,
    /// Default used when no override is given.
    pub default: SettingValue,
}

impl PluginSetting {
    /// Validate a raw override value against this setting's constraints.
    ///
    /// Returns the parsed value, or a description of what was wrong.
    pub fn validate(&self, value: &toml::Value) -> Result<SettingValue, String> {
        match &self.kind {
            SettingKind::Text { min_len, max_len } => {
                let s = value
                    .as_str()
                    .ok_or_else(|| "not a string".to_string())?
                    .trim();
                if let Some(min) = min_len {
                    if s.chars().count() < *min {
                        return Err(format!("needs to be at least {min} characters long"));
                    }
                }
                if let Some(max) = max_len {
                    if s.chars().count() > *max {
                        return Err(format!("needs to be at most {max} characters long"));
                    }
                }
                Ok(SettingValue::Text(s.to_string()))
            }
            SettingKind::Number {
                min_value,
                max_value,
            } => {
                let n = value
                    .as_integer()
                    .ok_or_else(|| "not a valid integer".to_string())?;
                if let Some(min) = min_value {
                    if n < *min {
                        return Err(format!("needs a value of at least {min}"));
                    }
                }
                if let Some(max) = max_value {
                    if n > *max {
                        return Err(format!("needs a value of at most {max}"));
                    }
                }
                Ok(SettingValue::Number(n))
            }
            SettingKind::Boolean => value
                .as_bool()
                .map(SettingValue::Boolean)
                .ok_or_else(|| "not a boolean".to_string()),
            SettingKind::Options(options) => {
                let s = value.as_str().ok_or_else(|| "not a string".to_string())?;
                if options.contains(&s) {
                    Ok(SettingValue::Text(s.to_string()))
                } else {
                    Err(format!("must be one of {options:?}"))
                }
            }
        }
    }
}

/// Resolve a plugin's settings: declared defaults overlaid with validated
/// config-file overrides.
pub fn resolve_settings(
    plugin_id: &str,
    spec: &[PluginSetting],
    overrides: Option<&toml::value::Table>,
) -> SettingsMap {
    let mut settings: SettingsMap = spec
        .iter()
        .map(|s| (s.key.to_string(), s.default.clone()))
        .collect();

    let Some(overrides) = overrides else {
        return settings;
    };

    for (key, raw) in overrides {
        let Some(setting) = spec.iter().find(|s| s.key == key) else {
            warn!(plugin = %plugin_id, key = %key, "unknown setting override ignored");
            continue;
        };
        match setting.validate(raw) {
            Ok(value) => {
                settings.insert(key.clone(), value);
            }
            Err(reason) => {
                warn!(
                    plugin = %plugin_id,
                    key = %key,
                    reason = %reason,
                    "invalid setting override, keeping default"
                );
            }
        }
    }

    settings
}
