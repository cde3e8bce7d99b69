// src/io/writer.rs
use gdal::raster::{Buffer, RasterCreationOptions};
use gdal::{Dataset, DriverManager, Metadata};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

use super::reader::GeoInfo;
use crate::error::{ChvError, Result};

/// Band description stamped on every output raster.
pub const CHV_BAND_DESCRIPTION: &str = "CHV";

/// Append-only float32 GTiff writer. Blocks of full-width rows must arrive
/// in increasing, contiguous order; every row is written exactly once.
///
/// Dropping the writer before [`ChvWriter::finish`] removes the partial file.
pub struct ChvWriter {
    dataset: Option<Dataset>,
    path: PathBuf,
    width: usize,
    height: usize,
    next_row: usize,
}

impl ChvWriter {
    pub fn create(path: &Path, geo_info: &GeoInfo, options: &[String]) -> Result<Self> {
        let driver = DriverManager::get_driver_by_name("GTiff")?;
        let creation_options = RasterCreationOptions::from_iter(options.iter().map(String::as_str));

        let dataset = driver.create_with_band_type_with_options::<f32, _>(
            path,
            geo_info.width,
            geo_info.height,
            1,
            &creation_options,
        )?;

        // From here on a failure must not leave the half-made file behind.
        let mut writer = Self {
            dataset: Some(dataset),
            path: path.to_path_buf(),
            width: geo_info.width,
            height: geo_info.height,
            next_row: 0,
        };
        writer.stamp(geo_info)?;
        Ok(writer)
    }

    fn dataset_mut(&mut self) -> &mut Dataset {
        self.dataset
            .as_mut()
            .expect("dataset is only taken by finish(), which consumes the writer")
    }

    fn stamp(&mut self, geo_info: &GeoInfo) -> Result<()> {
        let dataset = self.dataset_mut();
        if !geo_info.projection.is_empty() {
            dataset.set_projection(&geo_info.projection)?;
        }
        dataset.set_geo_transform(&geo_info.geo_transform)?;

        let mut band = dataset.rasterband(1)?;
        band.set_no_data_value(Some(f64::NAN))?;
        band.set_description(CHV_BAND_DESCRIPTION)?;
        Ok(())
    }

    /// Windowed write of `data` (`rows x width`) at `(0, row_offset)`.
    pub fn write_block(&mut self, row_offset: usize, rows: usize, data: Vec<f32>) -> Result<()> {
        if row_offset + rows > self.height {
            return Err(ChvError::BlockOutOfBounds {
                row_offset,
                rows,
                height: self.height,
            });
        }
        if row_offset != self.next_row {
            return Err(ChvError::BlockOrder {
                expected: self.next_row,
                got: row_offset,
            });
        }
        debug_assert_eq!(data.len(), rows * self.width);

        let width = self.width;
        let mut buffer = Buffer::new((width, rows), data);
        let band_window = (0, row_offset as isize);
        {
            let dataset = self.dataset_mut();
            let mut band = dataset.rasterband(1)?;
            band.write(band_window, (width, rows), &mut buffer)?;
        }
        self.next_row += rows;
        Ok(())
    }

    /// Flush and close the raster, then check it landed on disk with content.
    pub fn finish(mut self) -> Result<PathBuf> {
        if self.next_row != self.height {
            return Err(ChvError::IncompleteOutput {
                path: self.path.clone(),
                written: self.next_row,
                height: self.height,
            });
        }

        if let Some(mut dataset) = self.dataset.take() {
            dataset.flush_cache()?;
            drop(dataset);
        }

        let size = fs::metadata(&self.path)
            .map_err(|e| ChvError::io(&self.path, e))?
            .len();
        if size == 0 {
            return Err(ChvError::EmptyOutput(self.path.clone()));
        }

        // Finished: disarm the cleanup in Drop.
        Ok(std::mem::take(&mut self.path))
    }
}

impl Drop for ChvWriter {
    fn drop(&mut self) {
        drop(self.dataset.take());
        if self.path.as_os_str().is_empty() {
            return;
        }
        if let Err(e) = fs::remove_file(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %self.path.display(), error = %e, "failed to remove partial output");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn geo(width: usize, height: usize) -> GeoInfo {
        GeoInfo {
            projection: String::new(),
            geo_transform: [0.0, 10.0, 0.0, 0.0, 0.0, -10.0],
            width,
            height,
        }
    }

    #[test]
    fn test_blocks_must_be_contiguous_and_in_bounds() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chv.tif");
        let mut writer = ChvWriter::create(&path, &geo(2, 3), &[]).unwrap();

        assert!(matches!(
            writer.write_block(1, 1, vec![0.0; 2]),
            Err(ChvError::BlockOrder {
                expected: 0,
                got: 1
            })
        ));
        writer.write_block(0, 2, vec![1.0; 4]).unwrap();
        assert!(matches!(
            writer.write_block(2, 2, vec![0.0; 4]),
            Err(ChvError::BlockOutOfBounds {
                row_offset: 2,
                rows: 2,
                height: 3
            })
        ));
        writer.write_block(2, 1, vec![2.0; 2]).unwrap();

        let output = writer.finish().unwrap();
        assert_eq!(output, path);
        assert!(fs::metadata(&path).unwrap().len() > 0);
    }

    #[test]
    fn test_unfinished_output_is_removed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chv.tif");
        let mut writer = ChvWriter::create(&path, &geo(2, 2), &[]).unwrap();
        writer.write_block(0, 1, vec![1.0; 2]).unwrap();
        assert!(path.exists());

        assert!(matches!(
            writer.finish(),
            Err(ChvError::IncompleteOutput {
                written: 1,
                height: 2,
                ..
            })
        ));
        assert!(!path.exists());
    }
}
