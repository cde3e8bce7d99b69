// src/io/reader.rs
use gdal::Dataset;
use std::path::Path;

use crate::error::Result;

/// Georeferencing copied from a sample layer onto the output raster.
#[derive(Debug, Clone, PartialEq)]
pub struct GeoInfo {
    pub projection: String,
    pub geo_transform: [f64; 6],
    pub width: usize,
    pub height: usize,
}

impl GeoInfo {
    pub fn shape(&self) -> (usize, usize) {
        (self.width, self.height)
    }
}

/// Band 1 of one input raster, row-major.
#[derive(Debug, Clone)]
pub struct Layer {
    pub data: Vec<f32>,
    pub nodata: Option<f64>,
    pub geo_info: GeoInfo,
}

pub fn read_layer(path: &Path) -> Result<Layer> {
    let dataset = Dataset::open(path)?;
    let (width, height) = dataset.raster_size();
    let projection = dataset.projection();
    let geo_transform = dataset.geo_transform()?;

    let band = dataset.rasterband(1)?;
    let nodata = band.no_data_value();
    let buffer = band.read_as::<f32>((0, 0), (width, height), (width, height), None)?;
    let (_, data) = buffer.into_shape_and_vec();

    Ok(Layer {
        data,
        nodata,
        geo_info: GeoInfo {
            projection,
            geo_transform,
            width,
            height,
        },
    })
}
