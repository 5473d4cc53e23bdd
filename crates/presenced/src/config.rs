use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use presence_core::{
    DEFAULT_DESCRIPTOR_LEN, DEFAULT_MATCH_THRESHOLD, MAX_CHECKOUT_MINUTES, MINIMUM_CHECKOUT_MINUTES,
};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config value: {0}")]
    Invalid(String),
}

/// Which D-Bus bus the daemon registers on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BusKind {
    Session,
    System,
}

/// Daemon configuration: optional TOML file, then `PRESENCE_*` environment overrides.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Path to the SQLite database file.
    pub db_path: PathBuf,
    /// Similarity required for a positive match.
    pub match_threshold: f32,
    /// Minimum minutes between a check-in and the following check-out.
    pub min_checkout_minutes: i64,
    /// Expected descriptor length. 0 accepts any length.
    pub descriptor_len: usize,
    /// Minimum detector confidence accepted with a submission. 0 disables the check.
    pub min_detection_score: f32,
    pub bus: BusKind,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: default_data_dir().join("attendance.db"),
            match_threshold: DEFAULT_MATCH_THRESHOLD,
            min_checkout_minutes: MINIMUM_CHECKOUT_MINUTES,
            descriptor_len: DEFAULT_DESCRIPTOR_LEN,
            min_detection_score: 0.80,
            bus: BusKind::Session,
        }
    }
}

impl Config {
    /// Load the file named by `PRESENCE_CONFIG` (if set), then apply environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let base = match std::env::var("PRESENCE_CONFIG") {
            Ok(path) => Self::from_file(Path::new(&path))?,
            Err(_) => Self::default(),
        };
        Ok(base.with_overrides(|key| std::env::var(key).ok()))
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Check that scores are finite and within `[0, 1]` and that the
    /// checkout window is within `0..=MAX_CHECKOUT_MINUTES`.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !is_score(self.match_threshold) {
            return Err(ConfigError::Invalid(format!(
                "match_threshold must be within [0, 1], got {}",
                self.match_threshold
            )));
        }
        if !is_score(self.min_detection_score) {
            return Err(ConfigError::Invalid(format!(
                "min_detection_score must be within [0, 1], got {}",
                self.min_detection_score
            )));
        }
        if !is_checkout_window(self.min_checkout_minutes) {
            return Err(ConfigError::Invalid(format!(
                "min_checkout_minutes must be within 0..={MAX_CHECKOUT_MINUTES}, got {}",
                self.min_checkout_minutes
            )));
        }
        Ok(())
    }

    /// Apply `PRESENCE_*` overrides looked up through `var`.
    /// Unparseable or out-of-range values are ignored with a warning.
    pub fn with_overrides(mut self, var: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(path) = var("PRESENCE_DB_PATH") {
            self.db_path = PathBuf::from(path);
        }
        override_checked(&var, "PRESENCE_MATCH_THRESHOLD", &mut self.match_threshold, |v| {
            is_score(*v)
        });
        override_checked(
            &var,
            "PRESENCE_MIN_CHECKOUT_MINUTES",
            &mut self.min_checkout_minutes,
            |v| is_checkout_window(*v),
        );
        override_checked(&var, "PRESENCE_DESCRIPTOR_LEN", &mut self.descriptor_len, |_| true);
        override_checked(
            &var,
            "PRESENCE_MIN_DETECTION_SCORE",
            &mut self.min_detection_score,
            |v| is_score(*v),
        );
        if let Some(bus) = var("PRESENCE_BUS") {
            match bus.as_str() {
                "session" => self.bus = BusKind::Session,
                "system" => self.bus = BusKind::System,
                other => tracing::warn!(value = other, "ignoring unknown PRESENCE_BUS"),
            }
        }
        self
    }
}

fn override_checked<T: std::str::FromStr>(
    var: &impl Fn(&str) -> Option<String>,
    key: &str,
    slot: &mut T,
    accept: impl Fn(&T) -> bool,
) {
    let Some(raw) = var(key) else {
        return;
    };
    match raw.trim().parse::<T>() {
        Ok(v) if accept(&v) => *slot = v,
        Ok(_) => tracing::warn!(key, value = %raw, "ignoring out-of-range override"),
        Err(_) => tracing::warn!(key, value = %raw, "ignoring unparseable override"),
    }
}

fn is_score(v: f32) -> bool {
    v.is_finite() && (0.0..=1.0).contains(&v)
}

fn is_checkout_window(minutes: i64) -> bool {
    (0..=MAX_CHECKOUT_MINUTES).contains(&minutes)
}

fn default_data_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("presence")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.match_threshold, 0.80);
        assert_eq!(config.min_checkout_minutes, 5);
        assert_eq!(config.descriptor_len, 128);
        assert_eq!(config.bus, BusKind::Session);
        assert!(config.db_path.ends_with("presence/attendance.db"));
    }

    #[test]
    fn test_toml_partial_keeps_defaults() {
        let config = Config::from_toml_str(
            r#"
            db_path = "/var/lib/presence/attendance.db"
            match_threshold = 0.6
            bus = "system"
            "#,
        )
        .unwrap();
        assert_eq!(config.db_path, PathBuf::from("/var/lib/presence/attendance.db"));
        assert_eq!(config.match_threshold, 0.6);
        assert_eq!(config.bus, BusKind::System);
        assert_eq!(config.min_checkout_minutes, 5);
    }

    #[test]
    fn test_toml_rejects_bad_types() {
        assert!(matches!(
            Config::from_toml_str("match_threshold = \"high\""),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_env_overrides() {
        let config = Config::default().with_overrides(vars(&[
            ("PRESENCE_DB_PATH", "/tmp/x.db"),
            ("PRESENCE_MATCH_THRESHOLD", "0.9"),
            ("PRESENCE_MIN_CHECKOUT_MINUTES", "10"),
            ("PRESENCE_DESCRIPTOR_LEN", "0"),
            ("PRESENCE_BUS", "system"),
        ]));
        assert_eq!(config.db_path, PathBuf::from("/tmp/x.db"));
        assert_eq!(config.match_threshold, 0.9);
        assert_eq!(config.min_checkout_minutes, 10);
        assert_eq!(config.descriptor_len, 0);
        assert_eq!(config.bus, BusKind::System);
    }

    #[test]
    fn test_bad_override_ignored() {
        let config = Config::default().with_overrides(vars(&[
            ("PRESENCE_MATCH_THRESHOLD", "very"),
            ("PRESENCE_BUS", "carrier-pigeon"),
        ]));
        assert_eq!(config.match_threshold, 0.80);
        assert_eq!(config.bus, BusKind::Session);
    }

    #[test]
    fn test_toml_rejects_out_of_range_scores() {
        for text in [
            "match_threshold = nan",
            "match_threshold = 1.5",
            "min_detection_score = -0.1",
        ] {
            assert!(
                matches!(Config::from_toml_str(text), Err(ConfigError::Invalid(_))),
                "{text}"
            );
        }
        assert!(Config::from_toml_str("match_threshold = 1.0").is_ok());
        assert!(Config::from_toml_str("min_detection_score = 0.0").is_ok());
    }

    #[test]
    fn test_toml_rejects_out_of_range_checkout_window() {
        assert!(matches!(
            Config::from_toml_str("min_checkout_minutes = 9223372036854775807"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            Config::from_toml_str("min_checkout_minutes = -1"),
            Err(ConfigError::Invalid(_))
        ));
        let config = Config::from_toml_str("min_checkout_minutes = 1440").unwrap();
        assert_eq!(config.min_checkout_minutes, 1440);
    }

    #[test]
    fn test_out_of_range_overrides_ignored() {
        for (threshold, score) in [("NaN", "nan"), ("1.5", "inf"), ("-1", "-0.5")] {
            let config = Config::default().with_overrides(vars(&[
                ("PRESENCE_MATCH_THRESHOLD", threshold),
                ("PRESENCE_MIN_DETECTION_SCORE", score),
            ]));
            assert_eq!(config.match_threshold, 0.80, "{threshold}");
            assert_eq!(config.min_detection_score, 0.80, "{score}");
            assert!(config.validate().is_ok());
        }
    }

    #[test]
    fn test_huge_checkout_override_ignored() {
        let config = Config::default().with_overrides(vars(&[(
            "PRESENCE_MIN_CHECKOUT_MINUTES",
            "9223372036854775807",
        )]));
        assert_eq!(config.min_checkout_minutes, 5);

        let config = Config::default()
            .with_overrides(vars(&[("PRESENCE_MIN_CHECKOUT_MINUTES", "-10")]));
        assert_eq!(config.min_checkout_minutes, 5);

        let config = Config::default()
            .with_overrides(vars(&[("PRESENCE_MIN_CHECKOUT_MINUTES", "1440")]));
        assert_eq!(config.min_checkout_minutes, 1440);
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            Config::from_file(Path::new("/nonexistent/presence.toml")),
            Err(ConfigError::Read { .. })
        ));
    }
}
