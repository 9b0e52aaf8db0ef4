use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use datawizard::preprocessing::{EncodingMethod, MissingStrategy, Pipeline, PipelinePlan, ScalerType};
use polars::prelude::*;
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;

fn create_mixed_data(n_rows: usize) -> DataFrame {
    let mut rng = ChaCha8Rng::seed_from_u64(7);
    let colors = ["red", "green", "blue", "yellow"];

    let a: Vec<Option<f64>> = (0..n_rows)
        .map(|_| if rng.gen_bool(0.05) { None } else { Some(rng.gen::<f64>() * 100.0) })
        .collect();
    let b: Vec<f64> = (0..n_rows).map(|_| rng.gen::<f64>()).collect();
    let c: Vec<Option<&str>> = (0..n_rows)
        .map(|_| if rng.gen_bool(0.02) { None } else { colors.choose(&mut rng).copied() })
        .collect();
    let n: Vec<i64> = (0..n_rows).map(|_| rng.gen_range(0..20)).collect();

    df!("a" => a, "b" => b, "color" => c, "n" => n).unwrap()
}

fn full_plan() -> PipelinePlan {
    PipelinePlan::new()
        .with_missing("a", MissingStrategy::Median)
        .with_missing("color", MissingStrategy::Mode)
        .with_scaling(ScalerType::Standard, ["a", "b", "n"])
        .with_encoding("color", EncodingMethod::OneHot)
        .with_drop_duplicates(true)
}

fn bench_pipeline(c: &mut Criterion) {
    let mut group = c.benchmark_group("pipeline");
    group.sample_size(20);

    let plan = full_plan();
    for n_rows in [1_000, 10_000, 100_000].iter() {
        let df = create_mixed_data(*n_rows);
        group.bench_with_input(BenchmarkId::new("run", n_rows), &df, |bench, df| {
            bench.iter(|| Pipeline::run(black_box(df), black_box(&plan)).unwrap())
        });
    }
    group.finish();
}

fn bench_replay(c: &mut Criterion) {
    let df = create_mixed_data(10_000);
    let steps = Pipeline::run(&df, &full_plan()).unwrap().steps;
    c.bench_function("pipeline/replay_10000", |bench| {
        bench.iter(|| Pipeline::replay(black_box(&df), black_box(&steps)).unwrap())
    });
}

criterion_group!(benches, bench_pipeline, bench_replay);
criterion_main!(benches);
