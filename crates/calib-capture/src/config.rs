//! Session configuration and JSON helpers.

use std::{fs, path::Path, time::Duration};

use calib_capture_core::ReadinessBackoff;
use serde::{Deserialize, Serialize};

#[derive(thiserror::Error, Debug)]
pub enum ConfigIoError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Invalid(#[from] ConfigError),
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("rows and cols must be >= 2")]
    InvalidSize,
    #[error("square_length must be > 0")]
    InvalidSquareLength,
    #[error("marker_length must be in (0, square_length)")]
    InvalidMarkerLength,
    #[error("unknown marker dictionary `{0}`")]
    UnknownDictionary(String),
    #[error("board needs {needed} markers, dictionary has {available}")]
    NotEnoughDictionaryCodes { needed: usize, available: usize },
    #[error("board_image_side must be > 0")]
    InvalidBoardImageSide,
    #[error("tick_interval_ms must be > 0")]
    InvalidTickInterval,
    #[error("thumbnail max_side must be > 0")]
    InvalidThumbnailSide,
}

/// Printed ChArUco board parameters.
///
/// `rows`/`cols` are **square counts**; refined corners live on the
/// `(rows - 1) * (cols - 1)` inner intersections. Lengths are in meters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BoardSpec {
    pub rows: u32,
    pub cols: u32,
    pub square_length: f32,
    pub marker_length: f32,
    pub dictionary: String,
}

impl Default for BoardSpec {
    fn default() -> Self {
        Self {
            rows: 5,
            cols: 7,
            square_length: 0.04,
            marker_length: 0.02,
            dictionary: "DICT_4X4_50".to_string(),
        }
    }
}

impl BoardSpec {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.rows < 2 || self.cols < 2 {
            return Err(ConfigError::InvalidSize);
        }
        if !self.square_length.is_finite() || self.square_length <= 0.0 {
            return Err(ConfigError::InvalidSquareLength);
        }
        if !self.marker_length.is_finite()
            || self.marker_length <= 0.0
            || self.marker_length >= self.square_length
        {
            return Err(ConfigError::InvalidMarkerLength);
        }
        let available = dictionary_capacity(&self.dictionary)
            .ok_or_else(|| ConfigError::UnknownDictionary(self.dictionary.clone()))?;
        let needed = self.marker_count();
        if available < needed {
            return Err(ConfigError::NotEnoughDictionaryCodes { needed, available });
        }
        Ok(())
    }

    /// Number of inner chessboard corners, i.e. the valid corner id range.
    #[inline]
    pub fn inner_corner_count(&self) -> usize {
        (self.rows.saturating_sub(1) as usize) * (self.cols.saturating_sub(1) as usize)
    }

    /// Markers sit on every other square.
    #[inline]
    pub fn marker_count(&self) -> usize {
        (self.rows as usize * self.cols as usize) / 2
    }

    /// True when every id addresses an inner corner of this board.
    pub fn accepts_ids(&self, ids: &[u32]) -> bool {
        let n = self.inner_corner_count();
        ids.iter().all(|&id| (id as usize) < n)
    }
}

/// Code capacity of the predefined ArUco / AprilTag dictionaries.
pub fn dictionary_capacity(name: &str) -> Option<usize> {
    match name {
        "DICT_ARUCO_ORIGINAL" => return Some(1024),
        "DICT_APRILTAG_16h5" => return Some(30),
        "DICT_APRILTAG_25h9" => return Some(35),
        "DICT_APRILTAG_36h10" => return Some(2320),
        "DICT_APRILTAG_36h11" => return Some(587),
        _ => {}
    }
    let rest = name.strip_prefix("DICT_")?;
    let (bits, count) = rest.split_once('_')?;
    if !matches!(bits, "4X4" | "5X5" | "6X6" | "7X7") {
        return None;
    }
    match count {
        "50" | "100" | "250" | "1000" => count.parse().ok(),
        _ => None,
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThumbnailConfig {
    /// Longest side of stored sample images; `None` keeps the full frame.
    pub max_side: Option<u32>,
}

fn default_board_image_side() -> u32 {
    600
}

fn default_tick_interval_ms() -> u64 {
    16
}

/// Configuration of one capture session.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default)]
    pub board: BoardSpec,
    #[serde(default = "default_board_image_side")]
    pub board_image_side: u32,
    #[serde(default)]
    pub engine_backoff: ReadinessBackoff,
    #[serde(default)]
    pub thumbnail: ThumbnailConfig,
    /// Re-solve after every accepted sample to show a live reprojection error.
    #[serde(default)]
    pub solve_on_capture: bool,
    #[serde(default)]
    pub solve_timeout_ms: Option<u64>,
    /// Tick cadence used when no external display signal is supplied.
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            board: BoardSpec::default(),
            board_image_side: default_board_image_side(),
            engine_backoff: ReadinessBackoff::default(),
            thumbnail: ThumbnailConfig::default(),
            solve_on_capture: false,
            solve_timeout_ms: None,
            tick_interval_ms: default_tick_interval_ms(),
        }
    }
}

impl SessionConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.board.validate()?;
        if self.board_image_side == 0 {
            return Err(ConfigError::InvalidBoardImageSide);
        }
        if self.tick_interval_ms == 0 {
            return Err(ConfigError::InvalidTickInterval);
        }
        if self.thumbnail.max_side == Some(0) {
            return Err(ConfigError::InvalidThumbnailSide);
        }
        Ok(())
    }

    #[inline]
    pub fn solve_timeout(&self) -> Option<Duration> {
        self.solve_timeout_ms.map(Duration::from_millis)
    }

    #[inline]
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    /// Load and validate a JSON config from disk.
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, ConfigIoError> {
        let raw = fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Write this config to disk as pretty JSON.
    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), ConfigIoError> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_board_is_valid() {
        let cfg = SessionConfig::default();
        cfg.validate().expect("default config");
        assert_eq!(cfg.board.inner_corner_count(), 24);
        assert_eq!(cfg.board.marker_count(), 17);
        assert_eq!(cfg.board_image_side, 600);
    }

    #[test]
    fn board_validation_rejects_bad_geometry() {
        let mut b = BoardSpec {
            rows: 1,
            ..BoardSpec::default()
        };
        assert_eq!(b.validate(), Err(ConfigError::InvalidSize));

        b.rows = 5;
        b.marker_length = 0.04;
        assert_eq!(b.validate(), Err(ConfigError::InvalidMarkerLength));

        b.marker_length = 0.02;
        b.square_length = f32::NAN;
        assert_eq!(b.validate(), Err(ConfigError::InvalidSquareLength));
    }

    #[test]
    fn board_validation_checks_dictionary() {
        let mut b = BoardSpec {
            dictionary: "DICT_9X9_50".to_string(),
            ..BoardSpec::default()
        };
        assert!(matches!(b.validate(), Err(ConfigError::UnknownDictionary(_))));

        b.dictionary = "DICT_APRILTAG_16h5".to_string();
        b.rows = 10;
        b.cols = 10;
        assert_eq!(
            b.validate(),
            Err(ConfigError::NotEnoughDictionaryCodes {
                needed: 50,
                available: 30
            })
        );
    }

    #[test]
    fn accepts_ids_checks_inner_corner_range() {
        let b = BoardSpec::default();
        assert!(b.accepts_ids(&[0, 5, 23]));
        assert!(!b.accepts_ids(&[0, 24]));
        assert!(b.accepts_ids(&[]));
    }

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let cfg: SessionConfig =
            serde_json::from_str(r#"{ "solve_on_capture": true, "thumbnail": { "max_side": 320 } }"#)
                .expect("parse");
        assert!(cfg.solve_on_capture);
        assert_eq!(cfg.thumbnail.max_side, Some(320));
        assert_eq!(cfg.board, BoardSpec::default());
        assert_eq!(cfg.tick_interval(), Duration::from_millis(16));
        assert_eq!(cfg.solve_timeout(), None);
    }

    #[test]
    fn json_file_round_trip_validates() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("session.json");
        let cfg = SessionConfig {
            solve_timeout_ms: Some(1500),
            ..SessionConfig::default()
        };
        cfg.write_json(&path).expect("write");
        assert_eq!(SessionConfig::load_json(&path).expect("load"), cfg);

        fs::write(&path, r#"{ "tick_interval_ms": 0 }"#).expect("overwrite");
        assert!(matches!(
            SessionConfig::load_json(&path),
            Err(ConfigIoError::Invalid(ConfigError::InvalidTickInterval))
        ));
    }
}
