// src/processing/stack.rs
use std::path::Path;

use tracing::{debug, info, warn};

use super::sanitize::Sanitizer;
use crate::catalog::IndexName;
use crate::error::{ChvError, Result};
use crate::io::{read_layer, GeoInfo, Layer};

/// Sanitized layers of one task sharing a grid, stored index-major
/// (`K x H x W`).
#[derive(Debug, Clone)]
pub struct LayerStack {
    indices: Vec<IndexName>,
    data: Vec<f32>,
    geo_info: GeoInfo,
}

impl LayerStack {
    /// Start a stack from its first layer, which fixes the grid and the
    /// georeferencing of the output.
    fn first(index: IndexName, layer: Layer) -> Self {
        Self {
            indices: vec![index],
            data: layer.data,
            geo_info: layer.geo_info,
        }
    }

    /// Build a stack directly from row-major layers of `width x height`.
    pub fn from_layers(
        geo_info: GeoInfo,
        layers: Vec<(IndexName, Vec<f32>)>,
    ) -> Result<Option<Self>> {
        let mut stack: Option<Self> = None;
        for (index, data) in layers {
            let layer = Layer {
                data,
                nodata: None,
                geo_info: geo_info.clone(),
            };
            match stack.as_mut() {
                None => stack = Some(Self::first(index, layer)),
                Some(stack) => stack.push(index, layer, Path::new(""))?,
            }
        }
        Ok(stack)
    }

    fn push(&mut self, index: IndexName, layer: Layer, path: &Path) -> Result<()> {
        let (width, height) = self.geo_info.shape();
        let (found_width, found_height) = layer.geo_info.shape();
        if (width, height) != (found_width, found_height) || layer.data.len() != width * height {
            return Err(ChvError::ShapeMismatch {
                path: path.to_path_buf(),
                width,
                height,
                found_width,
                found_height,
            });
        }
        if layer.geo_info.geo_transform != self.geo_info.geo_transform
            || layer.geo_info.projection != self.geo_info.projection
        {
            warn!(
                path = %path.display(),
                "layer has the reference shape but different georeferencing"
            );
        }
        self.indices.push(index);
        self.data.extend(layer.data);
        Ok(())
    }

    pub fn indices(&self) -> &[IndexName] {
        &self.indices
    }

    pub fn depth(&self) -> usize {
        self.indices.len()
    }

    pub fn width(&self) -> usize {
        self.geo_info.width
    }

    pub fn height(&self) -> usize {
        self.geo_info.height
    }

    pub fn geo_info(&self) -> &GeoInfo {
        &self.geo_info
    }

    /// Row-major plane of layer `k`.
    pub fn layer(&self, k: usize) -> &[f32] {
        let plane = self.width() * self.height();
        &self.data[k * plane..(k + 1) * plane]
    }

    /// Values of every layer at `(row, col)`, in stack order.
    pub fn pixel(&self, row: usize, col: usize) -> impl Iterator<Item = f32> + '_ {
        let plane = self.width() * self.height();
        let offset = row * self.width() + col;
        self.data[offset..].iter().step_by(plane).copied()
    }
}

/// Load and sanitize every index layer a task names. Missing files are
/// skipped; `None` means no layer was found at all.
pub fn load_stack<F>(
    indices: &[IndexName],
    path_for: F,
    sanitizer: &Sanitizer,
) -> Result<Option<LayerStack>>
where
    F: Fn(&IndexName) -> std::path::PathBuf,
{
    let mut stack: Option<LayerStack> = None;

    for index in indices {
        let path = path_for(index);
        if !path.exists() {
            warn!(index = %index, path = %path.display(), "layer not found, skipping");
            continue;
        }

        let mut layer = read_layer(&path)?;
        sanitizer.apply(&mut layer.data, layer.nodata);
        debug!(
            index = %index,
            width = layer.geo_info.width,
            height = layer.geo_info.height,
            "layer loaded"
        );

        match stack.as_mut() {
            None => stack = Some(LayerStack::first(index.clone(), layer)),
            Some(stack) => stack.push(index.clone(), layer, &path)?,
        }
    }

    if let Some(stack) = &stack {
        info!(
            layers = stack.depth(),
            width = stack.width(),
            height = stack.height(),
            "stack loaded"
        );
    }
    Ok(stack)
}
