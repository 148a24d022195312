//! Pipeline configuration (pipeline.toml).

use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("validation error for field `{field}`: {message}")]
    ValidationError { field: String, message: String },
}

/// Full pipeline configuration. Every section and field has a default, so an
/// empty or absent config file yields a runnable configuration pointing at
/// `data/` and `output/`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub inputs: InputPaths,
    pub output: OutputConfig,
    pub control: ControlConfig,
    pub windows: WindowConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct InputPaths {
    pub play_by_play: PathBuf,
    pub schedule: PathBuf,
    pub teams: PathBuf,
    pub coaches: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub dir: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ControlConfig {
    /// Target number of sampled control events. Clamped to the number of
    /// eligible events at run time.
    pub sample_size: usize,
    /// Seed for the control sampler and perspective draw. Unseeded runs draw
    /// from OS entropy.
    pub seed: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    /// Offset for past/future point-differential lookups, in seconds.
    pub offset_secs: i64,
    /// Half-width of the contamination window around each timeout, in seconds.
    pub exclusion_secs: i64,
    /// Rows closer than this to either end of a quarter are trimmed from the
    /// final table, in seconds.
    pub quarter_trim_secs: i64,
}

impl Default for InputPaths {
    fn default() -> Self {
        Self {
            play_by_play: PathBuf::from("data/play_by_play.csv"),
            schedule: PathBuf::from("data/schedule.csv"),
            teams: PathBuf::from("data/teams.csv"),
            coaches: PathBuf::from("data/coaches.csv"),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("output"),
        }
    }
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            // Approximate number of play-by-play events worth keeping as
            // controls for one season.
            sample_size: 300_000,
            seed: None,
        }
    }
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            offset_secs: 3 * 60,
            exclusion_secs: 60,
            quarter_trim_secs: 3 * 60,
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            inputs: InputPaths::default(),
            output: OutputConfig::default(),
            control: ControlConfig::default(),
            windows: WindowConfig::default(),
        }
    }
}

/// Seconds in a regulation NBA period.
pub const PERIOD_SECONDS: i64 = 12 * 60;

impl PipelineConfig {
    /// Load and validate a config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|_| ConfigError::FileNotFound {
            path: path.to_path_buf(),
        })?;
        let config: PipelineConfig =
            toml::from_str(&text).map_err(|e| ConfigError::ParseError {
                path: path.to_path_buf(),
                source: e,
            })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.control.sample_size == 0 {
            return Err(ConfigError::ValidationError {
                field: "control.sample_size".into(),
                message: "must be greater than 0".into(),
            });
        }
        if self.windows.offset_secs <= 0 {
            return Err(ConfigError::ValidationError {
                field: "windows.offset_secs".into(),
                message: format!("must be > 0, got {}", self.windows.offset_secs),
            });
        }
        if self.windows.exclusion_secs < 0 {
            return Err(ConfigError::ValidationError {
                field: "windows.exclusion_secs".into(),
                message: format!("must be >= 0, got {}", self.windows.exclusion_secs),
            });
        }
        let trim = self.windows.quarter_trim_secs;
        if !(0..=PERIOD_SECONDS / 2).contains(&trim) {
            return Err(ConfigError::ValidationError {
                field: "windows.quarter_trim_secs".into(),
                message: format!("must be between 0 and {}, got {trim}", PERIOD_SECONDS / 2),
            });
        }
        Ok(())
    }

    pub fn timeouts_csv(&self) -> PathBuf {
        self.output.dir.join("timeouts.csv")
    }

    pub fn nontimeouts_raw_csv(&self) -> PathBuf {
        self.output.dir.join("nontimeouts_raw.csv")
    }

    pub fn nontimeouts_csv(&self) -> PathBuf {
        self.output.dir.join("nontimeouts.csv")
    }

    pub fn analysis_csv(&self) -> PathBuf {
        self.output.dir.join("nba_timeouts_analysis.csv")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = PipelineConfig::default();
        config.validate().expect("defaults should validate");
        assert_eq!(config.control.sample_size, 300_000);
        assert_eq!(config.windows.offset_secs, 180);
        assert_eq!(config.windows.exclusion_secs, 60);
        assert_eq!(config.windows.quarter_trim_secs, 180);
        assert_eq!(config.analysis_csv(), PathBuf::from("output/nba_timeouts_analysis.csv"));
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let tmp = std::env::temp_dir().join("nba_timeouts_config_partial");
        let _ = std::fs::remove_dir_all(&tmp);
        std::fs::create_dir_all(&tmp).unwrap();
        let path = tmp.join("pipeline.toml");
        std::fs::write(
            &path,
            r#"
[inputs]
play_by_play = "season/pbp.csv"

[control]
sample_size = 500
seed = 7
"#,
        )
        .unwrap();

        let config = PipelineConfig::load(&path).expect("should load");
        assert_eq!(config.inputs.play_by_play, PathBuf::from("season/pbp.csv"));
        assert_eq!(config.inputs.schedule, PathBuf::from("data/schedule.csv"));
        assert_eq!(config.control.sample_size, 500);
        assert_eq!(config.control.seed, Some(7));
        assert_eq!(config.windows.offset_secs, 180);

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn rejects_zero_sample_size() {
        let mut config = PipelineConfig::default();
        config.control.sample_size = 0;
        let err = config.validate().unwrap_err();
        match err {
            ConfigError::ValidationError { field, .. } => {
                assert_eq!(field, "control.sample_size");
            }
            other => panic!("expected ValidationError, got: {other}"),
        }
    }

    #[test]
    fn rejects_oversized_quarter_trim() {
        let mut config = PipelineConfig::default();
        config.windows.quarter_trim_secs = PERIOD_SECONDS;
        let err = config.validate().unwrap_err();
        match err {
            ConfigError::ValidationError { field, .. } => {
                assert_eq!(field, "windows.quarter_trim_secs");
            }
            other => panic!("expected ValidationError, got: {other}"),
        }
    }

    #[test]
    fn missing_file_is_an_error() {
        let err = PipelineConfig::load(Path::new("/nonexistent/pipeline.toml")).unwrap_err();
        match err {
            ConfigError::FileNotFound { path } => {
                assert!(path.ends_with("pipeline.toml"));
            }
            other => panic!("expected FileNotFound, got: {other}"),
        }
    }

    #[test]
    fn parse_error_for_invalid_toml() {
        let tmp = std::env::temp_dir().join("nba_timeouts_config_invalid");
        let _ = std::fs::remove_dir_all(&tmp);
        std::fs::create_dir_all(&tmp).unwrap();
        let path = tmp.join("pipeline.toml");
        std::fs::write(&path, "not valid [[[ toml").unwrap();

        let err = PipelineConfig::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { .. }));

        let _ = std::fs::remove_dir_all(&tmp);
    }
}
