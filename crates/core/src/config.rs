//! Console configuration shared between the host and scripts.
//!
//! Defaults are exported to scripts as globals before a script loads; the
//! values the script leaves behind are read back after the load and on every
//! explicit reload.

use crate::{MAX_HEIGHT, MAX_WIDTH};
use std::time::Duration;
use thiserror::Error;

/// Largest accepted pixel multiplier.
pub const MAX_SCALE: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("width {0} out of range (1..={max})", max = MAX_WIDTH)]
    Width(i64),
    #[error("height {0} out of range (1..={max})", max = MAX_HEIGHT)]
    Height(i64),
    #[error("scale {0} out of range (1..={max})", max = MAX_SCALE)]
    Scale(i64),
    #[error("delay {0} must not be negative")]
    Delay(i64),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub title: String,
    /// Grid width in cells
    pub width: usize,
    /// Grid height in cells
    pub height: usize,
    /// Window pixel multiplier
    pub scale: usize,
    pub debug: bool,
    /// Minimum time between two step passes
    pub delay: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            title: "cel7 ce".to_string(),
            width: 24,
            height: 16,
            scale: 4,
            debug: false,
            delay: Duration::ZERO,
        }
    }
}

impl Config {
    /// Build a config from raw script numbers, truncating toward zero.
    pub fn from_globals(
        title: String,
        width: f64,
        height: f64,
        scale: f64,
        delay_ms: Option<f64>,
        debug: bool,
    ) -> Result<Config, ConfigError> {
        let width = width as i64;
        let height = height as i64;
        let scale = scale as i64;
        if !(1..=MAX_WIDTH as i64).contains(&width) {
            return Err(ConfigError::Width(width));
        }
        if !(1..=MAX_HEIGHT as i64).contains(&height) {
            return Err(ConfigError::Height(height));
        }
        if !(1..=MAX_SCALE as i64).contains(&scale) {
            return Err(ConfigError::Scale(scale));
        }
        let delay = match delay_ms.map(|d| d as i64) {
            Some(d) if d < 0 => return Err(ConfigError::Delay(d)),
            Some(d) => Duration::from_millis(d as u64),
            None => Duration::ZERO,
        };
        Ok(Config {
            title,
            width: width as usize,
            height: height as usize,
            scale: scale as usize,
            debug,
            delay,
        })
    }

    /// Check the ranges of a config assembled on the host side.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=MAX_WIDTH).contains(&self.width) {
            return Err(ConfigError::Width(self.width as i64));
        }
        if !(1..=MAX_HEIGHT).contains(&self.height) {
            return Err(ConfigError::Height(self.height as i64));
        }
        if !(1..=MAX_SCALE).contains(&self.scale) {
            return Err(ConfigError::Scale(self.scale as i64));
        }
        Ok(())
    }

    /// True if the grid or scale differs, i.e. the host must rebuild its surface.
    pub fn geometry_differs(&self, other: &Config) -> bool {
        self.width != other.width || self.height != other.height || self.scale != other.scale
    }

    /// Window size in pixels including scale.
    pub fn window_size(&self) -> (usize, usize) {
        let (w, h) = crate::display::buffer_size(self.width, self.height);
        (w * self.scale, h * self.scale)
    }
}
