// src/processing/reducer.rs
use std::ops::Range;

use itertools::{Itertools, MinMaxResult};
use serde::Serialize;

use super::stack::LayerStack;

/// Reduction of one pixel stack.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Chv {
    Value(f32),
    Missing,
}

impl Chv {
    /// Raster encoding: missing is NaN.
    pub fn to_f32(self) -> f32 {
        match self {
            Chv::Value(v) => v,
            Chv::Missing => f32::NAN,
        }
    }
}

/// Trait for per-pixel stack reducers
pub trait PixelReducer: Send + Sync {
    /// Reduce the values of one pixel across the stack. NaN entries are
    /// missing and must not contribute.
    fn reduce(&self, values: &mut dyn Iterator<Item = f32>) -> Chv;

    /// Return the name of the reduction
    fn name(&self) -> &str;
}

/// Convex hull volume of a one-dimensional point set: its range.
#[derive(Debug, Clone, Default)]
pub struct RangeReducer;

impl PixelReducer for RangeReducer {
    fn reduce(&self, values: &mut dyn Iterator<Item = f32>) -> Chv {
        match values.filter(|v| !v.is_nan()).minmax_by(f32::total_cmp) {
            MinMaxResult::MinMax(min, max) => Chv::Value(max - min),
            MinMaxResult::NoElements | MinMaxResult::OneElement(_) => Chv::Missing,
        }
    }

    fn name(&self) -> &str {
        "CHV"
    }
}

/// Contiguous row bands `[r0, r1)` covering `0..height`, in increasing order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockPlan {
    height: usize,
    block_height: usize,
}

impl BlockPlan {
    pub fn new(height: usize, block_height: usize) -> Self {
        Self {
            height,
            block_height: block_height.max(1),
        }
    }

    pub fn len(&self) -> usize {
        self.height.div_ceil(self.block_height)
    }

    pub fn is_empty(&self) -> bool {
        self.height == 0
    }

    pub fn blocks(&self) -> impl Iterator<Item = Range<usize>> + '_ {
        (0..self.height)
            .step_by(self.block_height)
            .map(move |r0| r0..(r0 + self.block_height).min(self.height))
    }
}

/// Reduce rows `rows` of the stack into a `rows.len() x width` block.
pub fn reduce_block<R: PixelReducer + ?Sized>(
    reducer: &R,
    stack: &LayerStack,
    rows: Range<usize>,
) -> Vec<f32> {
    let width = stack.width();
    let mut block = Vec::with_capacity(rows.len() * width);
    for row in rows {
        for col in 0..width {
            block.push(reducer.reduce(&mut stack.pixel(row, col)).to_f32());
        }
    }
    block
}

/// Summary of one output raster.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ChvStats {
    pub pixels: u64,
    pub valid: u64,
    pub min: Option<f32>,
    pub max: Option<f32>,
    pub mean: Option<f64>,
    #[serde(skip)]
    sum: f64,
}

impl ChvStats {
    pub fn update(&mut self, block: &[f32]) {
        self.pixels += block.len() as u64;
        for &v in block.iter().filter(|v| !v.is_nan()) {
            self.valid += 1;
            self.sum += f64::from(v);
            self.min = Some(self.min.map_or(v, |m| m.min(v)));
            self.max = Some(self.max.map_or(v, |m| m.max(v)));
        }
        self.mean = (self.valid > 0).then(|| self.sum / self.valid as f64);
    }

    /// Percentage of output pixels holding a value.
    pub fn valid_ratio(&self) -> f64 {
        if self.pixels == 0 {
            0.0
        } else {
            self.valid as f64 / self.pixels as f64 * 100.0
        }
    }

    /// No valid pixel, or every valid pixel within `1e-4` of the others.
    pub fn is_degenerate(&self) -> bool {
        match (self.min, self.max) {
            (Some(min), Some(max)) => max - min < 1e-4,
            _ => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::IndexName;
    use crate::io::GeoInfo;

    fn reduce(values: &[f32]) -> Chv {
        RangeReducer.reduce(&mut values.iter().copied())
    }

    fn stack(width: usize, height: usize, layers: Vec<Vec<f32>>) -> LayerStack {
        let geo_info = GeoInfo {
            projection: String::new(),
            geo_transform: [0.0, 1.0, 0.0, 0.0, 0.0, -1.0],
            width,
            height,
        };
        let layers: Vec<(IndexName, Vec<f32>)> = layers
            .into_iter()
            .enumerate()
            .map(|(k, data)| (IndexName::new(format!("I{k}")), data))
            .collect();
        LayerStack::from_layers(geo_info, layers).unwrap().unwrap()
    }

    #[test]
    fn test_range_of_valid_values() {
        assert_eq!(reduce(&[10.0, 25.0, f32::NAN]), Chv::Value(15.0));
        assert_eq!(reduce(&[-3.5, 7.25, 0.0, 1.0]), Chv::Value(10.75));
        assert_eq!(reduce(&[4.0, 4.0]), Chv::Value(0.0));
    }

    #[test]
    fn test_fewer_than_two_values_is_missing() {
        assert_eq!(reduce(&[]), Chv::Missing);
        assert_eq!(reduce(&[5.0]), Chv::Missing);
        assert_eq!(reduce(&[f32::NAN, 5.0, f32::NAN]), Chv::Missing);
        assert!(Chv::Missing.to_f32().is_nan());
    }

    #[test]
    fn test_range_is_exact_and_non_negative() {
        let values = [1999.999, -1999.999, 0.1, 0.2];
        match reduce(&values) {
            Chv::Value(v) => {
                assert_eq!(v, 1999.999f32 - -1999.999f32);
                assert!(v >= 0.0);
            }
            Chv::Missing => panic!("expected a value"),
        }
    }

    #[test]
    fn test_block_plan() {
        let plan = BlockPlan::new(450, 200);
        assert_eq!(plan.len(), 3);
        assert_eq!(plan.blocks().collect::<Vec<_>>(), vec![0..200, 200..400, 400..450]);

        let plan = BlockPlan::new(400, 200);
        assert_eq!(plan.len(), 2);
        assert_eq!(plan.blocks().last(), Some(200..400));

        let plan = BlockPlan::new(3, 200);
        assert_eq!(plan.blocks().collect::<Vec<_>>(), vec![0..3]);

        let plan = BlockPlan::new(0, 200);
        assert!(plan.is_empty());
        assert_eq!(plan.len(), 0);
        assert_eq!(plan.blocks().count(), 0);
    }

    #[test]
    fn test_block_partition_matches_single_pass() {
        let (width, height) = (5, 7);
        let n = width * height;
        let layers: Vec<Vec<f32>> = vec![
            (0..n).map(|i| i as f32).collect(),
            (0..n).map(|i| if i % 3 == 0 { f32::NAN } else { (i * 7 % 11) as f32 }).collect(),
            (0..n).map(|i| if i % 5 == 0 { f32::NAN } else { -(i as f32) / 2.0 }).collect(),
        ];
        let stack = stack(width, height, layers);

        let whole = reduce_block(&RangeReducer, &stack, 0..height);
        for block_height in [1, 2, 3, 6, 7, 200] {
            let blocked: Vec<f32> = BlockPlan::new(height, block_height)
                .blocks()
                .flat_map(|rows| reduce_block(&RangeReducer, &stack, rows))
                .collect();
            assert_eq!(blocked.len(), whole.len());
            for (a, b) in blocked.iter().zip(&whole) {
                assert!(a.to_bits() == b.to_bits() || (a.is_nan() && b.is_nan()));
            }
        }
    }

    #[test]
    fn test_reduce_block_scenario() {
        // 3 layers 4x4: (0,0) = [10, 25, NaN], (0,1) has a single value
        let mut a = vec![f32::NAN; 16];
        let mut b = vec![f32::NAN; 16];
        let c = vec![f32::NAN; 16];
        a[0] = 10.0;
        b[0] = 25.0;
        a[1] = 5.0;
        let stack = stack(4, 4, vec![a, b, c]);

        let block = reduce_block(&RangeReducer, &stack, 0..1);
        assert_eq!(block.len(), 4);
        assert_eq!(block[0], 15.0);
        assert!(block[1].is_nan());
    }

    #[test]
    fn test_stats() {
        let mut stats = ChvStats::default();
        assert_eq!((stats.pixels, stats.valid), (0, 0));
        assert_eq!((stats.min, stats.max, stats.mean), (None, None, None));
        assert_eq!(stats.valid_ratio(), 0.0);

        stats.update(&[1.0, f32::NAN, 3.0]);
        stats.update(&[f32::NAN, 5.0]);
        assert_eq!(stats.pixels, 5);
        assert_eq!(stats.valid, 3);
        assert_eq!(stats.min, Some(1.0));
        assert_eq!(stats.max, Some(5.0));
        assert_eq!(stats.mean, Some(3.0));
        assert!((stats.valid_ratio() - 60.0).abs() < 1e-9);
        assert!(!stats.is_degenerate());

        let mut flat = ChvStats::default();
        flat.update(&[f32::NAN, f32::NAN]);
        assert!(flat.is_degenerate());
        assert_eq!(flat.mean, None);
    }
}
