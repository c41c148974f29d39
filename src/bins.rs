//! Bin assignment
//!
//! The grid is a fixed sequence of bin right endpoints
//! `start + w, start + 2w, ..., end` on the absolute-hours axis. Bin `i`
//! covers `(start + i*w, start + (i+1)*w]`, except the first bin, which also
//! takes `h == start`. Pre-anchor and post-anchor observations fold onto the
//! same axis through `|h|`.

use crate::config::GridConfig;
use crate::error::PanelError;

/// Distance in bin steps within which a value counts as on a grid point
const GRID_TOLERANCE: f64 = 1e-9;

/// Fixed temporal grid shared by all variables
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BinGrid {
    start: f64,
    end: f64,
    width: f64,
    len: usize,
}

impl Default for BinGrid {
    fn default() -> Self {
        Self::from_config(&GridConfig::default()).unwrap_or(Self {
            start: 8.0,
            end: 720.0,
            width: 2.0,
            len: 356,
        })
    }
}

impl BinGrid {
    /// Grid over `[start, end)` with bins of `width` hours
    pub fn new(start: f64, end: f64, width: f64) -> Result<Self, PanelError> {
        let config = GridConfig {
            window_start_hours: start,
            window_end_hours: end,
            bin_width_hours: width,
            ..Default::default()
        };
        Self::from_config(&config)
    }

    pub fn from_config(config: &GridConfig) -> Result<Self, PanelError> {
        config.validate()?;
        Ok(Self {
            start: config.window_start_hours,
            end: config.window_end_hours,
            width: config.bin_width_hours,
            len: config.bin_count(),
        })
    }

    /// Number of bins
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn window_start(&self) -> f64 {
        self.start
    }

    pub fn window_end(&self) -> f64 {
        self.end
    }

    pub fn width(&self) -> f64 {
        self.width
    }

    /// Right endpoint (hours) of bin `idx`
    pub fn end_hours(&self, idx: usize) -> f64 {
        self.start + (idx as f64 + 1.0) * self.width
    }

    /// All right endpoints, ascending
    pub fn endpoints(&self) -> impl Iterator<Item = f64> + '_ {
        (0..self.len).map(move |idx| self.end_hours(idx))
    }

    /// Index of the bin whose right endpoint equals `hours`, if any
    pub fn index_of_endpoint(&self, hours: f64) -> Option<usize> {
        let steps = (hours - self.start) / self.width;
        let rounded = steps.round();
        if (steps - rounded).abs() > GRID_TOLERANCE || rounded < 1.0 || rounded > self.len as f64 {
            return None;
        }
        Some(rounded as usize - 1)
    }

    /// Map signed relative hours to a bin index, or `None` when out of window
    ///
    /// `h = |relative_hours|`; `h < start` and `h >= end` are out of window.
    /// Otherwise the bin is the one ending at `start + w * ceil((h - start) / w)`.
    pub fn assign(&self, relative_hours: f64) -> Option<usize> {
        if !relative_hours.is_finite() {
            return None;
        }
        let h = relative_hours.abs();
        if h < self.start || h >= self.end {
            return None;
        }

        let raw = (h - self.start) / self.width;
        // Snap float noise on a grid point so it stays in the bin ending there
        let steps = if (raw - raw.round()).abs() <= GRID_TOLERANCE {
            raw.round()
        } else {
            raw.ceil()
        };
        // h == start gives 0 steps; it belongs to the first bin
        let steps = (steps as usize).clamp(1, self.len);
        Some(steps - 1)
    }

    /// Like [`assign`](Self::assign) but returns the right endpoint in hours
    pub fn assign_endpoint(&self, relative_hours: f64) -> Option<f64> {
        self.assign(relative_hours).map(|idx| self.end_hours(idx))
    }
}
