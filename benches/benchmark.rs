use chv_calc::catalog::IndexName;
use chv_calc::config::ChvConfig;
use chv_calc::io::GeoInfo;
use chv_calc::pipeline::{self, PhaseSelection};
use chv_calc::processing::{reduce_block, BlockPlan, LayerStack, RangeReducer, Sanitizer};
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use std::path::Path;

/// Synthetic stack of `depth` layers with a sprinkling of sentinels
fn synthetic_stack(width: usize, height: usize, depth: usize) -> LayerStack {
    let sanitizer = Sanitizer::default();
    let geo_info = GeoInfo {
        projection: String::new(),
        geo_transform: [0.0, 2.0, 0.0, 0.0, 0.0, -2.0],
        width,
        height,
    };

    let layers = (0..depth)
        .map(|k| {
            let mut data: Vec<f32> = (0..width * height)
                .map(|i| {
                    if (i + k) % 17 == 0 {
                        -9999.0
                    } else {
                        ((i * (k + 3)) % 4000) as f32 - 2000.0
                    }
                })
                .collect();
            sanitizer.apply(&mut data, None);
            (IndexName::new(format!("I{k}")), data)
        })
        .collect();

    LayerStack::from_layers(geo_info, layers)
        .expect("layers share the grid")
        .expect("stack is not empty")
}

/// Benchmark the block reduction in isolation
fn benchmark_block_reduction(c: &mut Criterion) {
    let stack = synthetic_stack(1024, 1024, 12);

    c.bench_function("chv_block_200_rows", |b| {
        b.iter(|| reduce_block(&RangeReducer, black_box(&stack), 0..200))
    });

    c.bench_function("chv_full_grid_blocked", |b| {
        b.iter(|| {
            for rows in BlockPlan::new(stack.height(), 200).blocks() {
                black_box(reduce_block(&RangeReducer, &stack, rows));
            }
        })
    });
}

/// Benchmark a full run against a real catalog
/// Note: This requires an input tree at data/chv (MTs/ and STMs/)
fn benchmark_full_run(c: &mut Criterion) {
    let input = Path::new("data/chv");
    if !input.join("MTs").exists() {
        println!("Skipping full run benchmark - no catalog at {}", input.display());
        return;
    }

    let mut config = ChvConfig::default();
    config.input_root = input.to_path_buf();
    config.output_root = Some(input.join("bench_output"));

    c.bench_function("chv_mt_phase", |b| {
        b.iter(|| pipeline::run(black_box(&config), PhaseSelection::Mt))
    });
}

criterion_group!(benches, benchmark_block_reduction, benchmark_full_run);
criterion_main!(benches);
