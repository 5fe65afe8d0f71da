//! Arena configuration.
//!
//! [`ArenaConfig`] is plain serde data so it can be loaded from JSON next to
//! a run. Missing fields take their [`Default`] values.
//!
//! ```
//! use arena_engine::config::ArenaConfig;
//!
//! let config = ArenaConfig::from_json_str(r#"{ "width": 40.0, "height": 30.0, "seed": 7 }"#).unwrap();
//! assert_eq!(config.x_divisions, 10);
//! assert_eq!(config.seed, 7);
//!
//! assert!(ArenaConfig::from_json_str(r#"{ "width": -1.0 }"#).is_err());
//! ```

use serde::{Deserialize, Serialize};

use crate::ArenaError;

// ---------------------------------------------------------------------------
// WindowDimensions
// ---------------------------------------------------------------------------

/// Display size, in pixels, announced to renderers at initialization.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WindowDimensions {
    pub display_width: f64,
    pub display_height: f64,
}

// ---------------------------------------------------------------------------
// ArenaConfig
// ---------------------------------------------------------------------------

/// Everything needed to build an [`Arena`](crate::scheduler::Arena).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArenaConfig {
    /// Arena width in logical units. Must be positive and finite.
    pub width: f64,
    /// Arena height in logical units. Must be positive and finite.
    pub height: f64,
    /// Grid columns.
    pub x_divisions: usize,
    /// Grid rows.
    pub y_divisions: usize,
    /// Seed for every random draw the arena makes.
    pub seed: u64,
    /// Workers for the parallel phases. `1` runs them inline.
    pub worker_threads: usize,
    /// Asset filename for a backdrop covering the whole arena.
    pub background: Option<String>,
    /// Display size to announce in the initialization batch.
    pub window: Option<WindowDimensions>,
}

impl Default for ArenaConfig {
    /// A 10 x 10 arena on a 10 x 10 grid, seed 0, single-threaded.
    fn default() -> Self {
        Self {
            width: 10.0,
            height: 10.0,
            x_divisions: 10,
            y_divisions: 10,
            seed: 0,
            worker_threads: 1,
            background: None,
            window: None,
        }
    }
}

impl ArenaConfig {
    /// Parse and validate a JSON configuration.
    pub fn from_json_str(text: &str) -> Result<Self, ArenaError> {
        let config: ArenaConfig = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations that cannot describe a usable arena.
    pub fn validate(&self) -> Result<(), ArenaError> {
        let positive = |name: &str, v: f64| {
            if v > 0.0 && v.is_finite() {
                Ok(())
            } else {
                Err(ArenaError::InvalidConfig {
                    detail: format!("{name} must be positive and finite, got {v}"),
                })
            }
        };
        positive("width", self.width)?;
        positive("height", self.height)?;
        if self.x_divisions == 0 || self.y_divisions == 0 {
            return Err(ArenaError::InvalidConfig {
                detail: format!(
                    "grid divisions must be at least 1, got {} x {}",
                    self.x_divisions, self.y_divisions
                ),
            });
        }
        if self.worker_threads == 0 {
            return Err(ArenaError::InvalidConfig {
                detail: "worker_threads must be at least 1".to_string(),
            });
        }
        if let Some(name) = &self.background {
            if name.is_empty() {
                return Err(ArenaError::InvalidConfig {
                    detail: "background filename is empty".to_string(),
                });
            }
        }
        if let Some(window) = &self.window {
            positive("display_width", window.display_width)?;
            positive("display_height", window.display_height)?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_valid() {
        ArenaConfig::default().validate().unwrap();
    }

    #[test]
    fn rejects_bad_dimensions() {
        for (w, h) in [(0.0, 1.0), (1.0, -2.0), (f64::NAN, 1.0), (1.0, f64::INFINITY)] {
            let config = ArenaConfig {
                width: w,
                height: h,
                ..Default::default()
            };
            assert!(
                matches!(config.validate(), Err(ArenaError::InvalidConfig { .. })),
                "{w} x {h} should be rejected"
            );
        }
    }

    #[test]
    fn rejects_zero_divisions_and_workers() {
        let no_cols = ArenaConfig {
            x_divisions: 0,
            ..Default::default()
        };
        assert!(no_cols.validate().is_err());

        let no_workers = ArenaConfig {
            worker_threads: 0,
            ..Default::default()
        };
        assert!(no_workers.validate().is_err());
    }

    #[test]
    fn rejects_bad_window_and_background() {
        let window = ArenaConfig {
            window: Some(WindowDimensions {
                display_width: 0.0,
                display_height: 600.0,
            }),
            ..Default::default()
        };
        assert!(window.validate().is_err());

        let background = ArenaConfig {
            background: Some(String::new()),
            ..Default::default()
        };
        assert!(background.validate().is_err());
    }

    #[test]
    fn json_roundtrip_and_defaults() {
        let config = ArenaConfig {
            width: 25.0,
            height: 12.5,
            worker_threads: 4,
            background: Some("grass.png".into()),
            window: Some(WindowDimensions {
                display_width: 1000.0,
                display_height: 500.0,
            }),
            ..Default::default()
        };
        let json = serde_json::to_string(&config).unwrap();
        assert_eq!(ArenaConfig::from_json_str(&json).unwrap(), config);

        let partial = ArenaConfig::from_json_str(r#"{ "seed": 99 }"#).unwrap();
        assert_eq!(partial.seed, 99);
        assert_eq!(partial.width, 10.0);
    }

    #[test]
    fn malformed_json_is_a_parse_error() {
        assert!(matches!(
            ArenaConfig::from_json_str("{ width: "),
            Err(ArenaError::ConfigParse(_))
        ));
    }
}
