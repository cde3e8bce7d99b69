// src/processing/sanitize.rs
use crate::config::ChvConfig;

/// Masks invalid input values to NaN before stacking.
#[derive(Debug, Clone, PartialEq)]
pub struct Sanitizer {
    sentinels: Vec<f32>,
    low: f32,
    high: f32,
}

impl Sanitizer {
    pub fn new(sentinels: Vec<f32>, valid_range: [f32; 2]) -> Self {
        let [low, high] = valid_range;
        Self {
            sentinels,
            low,
            high,
        }
    }

    pub fn from_config(config: &ChvConfig) -> Self {
        Self::new(config.sentinels.clone(), config.valid_range)
    }

    /// Declared nodata, then sentinels, then anything outside `[low, high]`.
    /// NaN stays NaN and infinities fall outside the range.
    #[inline]
    pub fn clean(&self, value: f32, nodata: Option<f64>) -> f32 {
        if value.is_nan() {
            return f32::NAN;
        }
        if let Some(nodata) = nodata {
            // compared at band precision
            if value == nodata as f32 {
                return f32::NAN;
            }
        }
        if self.sentinels.contains(&value) || value < self.low || value > self.high {
            return f32::NAN;
        }
        value
    }

    /// Sanitize a whole layer in place on the calling thread. Tasks already
    /// run on pool workers, so this must not fork into the pool again.
    pub fn apply(&self, data: &mut [f32], nodata: Option<f64>) {
        let nodata = nodata.filter(|v| !v.is_nan());
        data.iter_mut().for_each(|value| {
            *value = self.clean(*value, nodata);
        });
    }
}

impl Default for Sanitizer {
    fn default() -> Self {
        Self::from_config(&ChvConfig::default())
    }
}
