//! Config validation: unknown-key detection with Levenshtein suggestions.
//!
//! Two-pass parse: the raw TOML is walked as a `toml::Value` and every key is
//! compared against the key tree of the built-in defaults. Unknown keys only
//! produce warnings, so an old config file never stops the monitor.

use std::collections::HashSet;

use super::MonitorConfig;

/// A non-fatal config warning (typo, stale key).
#[derive(Debug, Clone)]
pub struct ValidationWarning {
    pub field: String,
    pub message: String,
    pub suggestion: Option<String>,
}

impl std::fmt::Display for ValidationWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(ref s) = self.suggestion {
            write!(f, " (did you mean '{s}'?)")?;
        }
        Ok(())
    }
}

/// Every dotted key path a `MonitorConfig` understands.
///
/// Derived from the serialized defaults so new fields never need to be
/// registered by hand.
pub fn known_config_keys() -> HashSet<String> {
    toml::Value::try_from(MonitorConfig::default())
        .map(|v| walk_toml_keys(&v, "").into_iter().collect())
        .unwrap_or_default()
}

/// Collect the dotted path of every key in a TOML tree.
pub fn walk_toml_keys(value: &toml::Value, prefix: &str) -> Vec<String> {
    let mut keys = Vec::new();
    if let Some(table) = value.as_table() {
        for (k, v) in table {
            let path = if prefix.is_empty() {
                k.clone()
            } else {
                format!("{prefix}.{k}")
            };
            keys.push(path.clone());
            if v.is_table() {
                keys.extend(walk_toml_keys(v, &path));
            }
        }
    }
    keys
}

fn levenshtein(a: &str, b: &str) -> usize {
    let b_len = b.chars().count();
    if a.is_empty() {
        return b_len;
    }
    if b_len == 0 {
        return a.chars().count();
    }

    let mut prev: Vec<usize> = (0..=b_len).collect();
    let mut curr = vec![0; b_len + 1];

    for (i, ca) in a.chars().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.chars().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b_len]
}

/// Suggest the closest known key for an unknown key, if within edit distance 3.
pub fn suggest_correction(unknown: &str, known: &HashSet<String>) -> Option<String> {
    known
        .iter()
        .map(|k| (k, levenshtein(unknown, k)))
        .filter(|(_, dist)| *dist <= 3)
        .min_by(|(ka, da), (kb, db)| da.cmp(db).then_with(|| ka.cmp(kb)))
        .map(|(k, _)| k.clone())
}

/// Parse a raw TOML string and return warnings for any unknown config keys.
pub fn validate_unknown_keys(raw_toml: &str) -> Vec<ValidationWarning> {
    let Ok(value) = raw_toml.parse::<toml::Value>() else {
        // parse errors are reported by serde later
        return Vec::new();
    };

    let known = known_config_keys();
    walk_toml_keys(&value, "")
        .into_iter()
        .filter(|key| !known.contains(key))
        .map(|key| ValidationWarning {
            suggestion: suggest_correction(&key, &known),
            message: format!("Unknown config key '{key}'"),
            field: key,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_levenshtein_basics() {
        assert_eq!(levenshtein("alpha", "alpha"), 0);
        assert_eq!(levenshtein("ema_alpa", "ema_alpha"), 1);
        assert_eq!(levenshtein("", "abc"), 3);
        assert_eq!(levenshtein("abc", ""), 3);
    }

    #[test]
    fn test_known_keys_cover_sections() {
        let keys = known_config_keys();
        assert!(keys.contains("energy_detector.ema_alpha"));
        assert!(keys.contains("trend_detector.required_windows"));
        assert!(keys.contains("alerts.temperature_critical"));
        assert!(keys.contains("cycle.detection_mode"));
    }

    #[test]
    fn test_typo_key_produces_warning_with_suggestion() {
        let toml_str = r#"
[energy_detector]
ema_alpa = 0.02
"#;
        let warnings = validate_unknown_keys(toml_str);
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].field, "energy_detector.ema_alpa");
        assert_eq!(
            warnings[0].suggestion.as_deref(),
            Some("energy_detector.ema_alpha")
        );
    }

    #[test]
    fn test_valid_config_produces_no_warnings() {
        let toml_str = r#"
[cycle]
min_temperature_samples = 60

[alerts]
vibration_warning = 2.5
"#;
        assert!(validate_unknown_keys(toml_str).is_empty());
    }
}
