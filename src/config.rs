// src/config.rs
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ChvError, Result};

/// Run configuration, loaded from JSON and overridden from the command line.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct ChvConfig {
    #[serde(default = "default_input_root")]
    pub input_root: PathBuf,
    /// Defaults to `{input_root}/CHV`
    #[serde(default)]
    pub output_root: Option<PathBuf>,
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default = "default_block_height")]
    pub block_height: usize,
    #[serde(default = "default_sentinels")]
    pub sentinels: Vec<f32>,
    #[serde(default = "default_valid_range")]
    pub valid_range: [f32; 2],
    #[serde(default = "default_task_timeout_secs")]
    pub task_timeout_secs: Option<u64>,
    #[serde(default)]
    pub output: OutputParams,
    #[serde(default)]
    pub strict_catalog: bool,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct OutputParams {
    #[serde(default = "default_compress")]
    pub compress: String,
    #[serde(default = "default_compress_level")]
    pub compress_level: u8,
    #[serde(default = "default_true")]
    pub tiled: bool,
}

impl Default for OutputParams {
    fn default() -> Self {
        Self {
            compress: default_compress(),
            compress_level: default_compress_level(),
            tiled: default_true(),
        }
    }
}

fn default_input_root() -> PathBuf {
    PathBuf::from(".")
}

fn default_workers() -> usize {
    4
}

fn default_block_height() -> usize {
    200
}

fn default_sentinels() -> Vec<f32> {
    vec![-9999.0, 9999.0]
}

fn default_valid_range() -> [f32; 2] {
    [-2000.0, 2000.0]
}

fn default_task_timeout_secs() -> Option<u64> {
    Some(3600)
}

fn default_compress() -> String {
    "DEFLATE".to_string()
}

fn default_compress_level() -> u8 {
    6
}

fn default_true() -> bool {
    true
}

impl Default for ChvConfig {
    fn default() -> Self {
        Self {
            input_root: default_input_root(),
            output_root: None,
            workers: default_workers(),
            block_height: default_block_height(),
            sentinels: default_sentinels(),
            valid_range: default_valid_range(),
            task_timeout_secs: default_task_timeout_secs(),
            output: OutputParams::default(),
            strict_catalog: false,
        }
    }
}

impl ChvConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| ChvError::io(path, e))?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn output_root(&self) -> PathBuf {
        self.output_root
            .clone()
            .unwrap_or_else(|| self.input_root.join("CHV"))
    }

    pub fn task_timeout(&self) -> Option<Duration> {
        self.task_timeout_secs.map(Duration::from_secs)
    }

    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return Err(ChvError::InvalidConfig("workers must be at least 1".into()));
        }
        if self.block_height == 0 {
            return Err(ChvError::InvalidConfig(
                "block_height must be at least 1".into(),
            ));
        }
        let [low, high] = self.valid_range;
        if !low.is_finite() || !high.is_finite() || low > high {
            return Err(ChvError::InvalidConfig(format!(
                "valid_range [{low}, {high}] is not a finite closed range"
            )));
        }
        if self.task_timeout_secs == Some(0) {
            return Err(ChvError::InvalidConfig(
                "task_timeout_secs must be positive or null".into(),
            ));
        }
        Ok(())
    }

    /// GTiff creation options for output rasters.
    pub fn creation_options(&self) -> Vec<String> {
        let mut options = Vec::new();
        let compress = self.output.compress.to_uppercase();

        if compress != "NONE" {
            options.push(format!("COMPRESS={compress}"));
            match compress.as_str() {
                "DEFLATE" => options.push(format!("ZLEVEL={}", self.output.compress_level.min(9))),
                "ZSTD" => options.push(format!("ZSTD_LEVEL={}", self.output.compress_level.min(22))),
                _ => {}
            }
        }

        if self.output.tiled {
            options.push("TILED=YES".to_string());
        }

        options
    }
}
