//! Benchmarks for prebake planning.
//!
//! Run with: cargo bench
//!
//! Results include 95% confidence intervals via Criterion.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use prebake::core::catalog::Catalog;
use prebake::core::parser::parse_config;
use prebake::core::planner;
use prebake::core::selector::{self, PlatformFilter};
use prebake::core::types::{BuildOption, PipelineConfig};
use std::fmt::Write;

/// A pipeline with `platforms` capable platforms, each declaring four
/// configurations, and `tools` prebuilt tools.
fn pipeline(platforms: usize, tools: usize) -> PipelineConfig {
    let mut yaml = String::from("version: \"1.0\"\nname: bench-index\nprebuilt_tools:\n");
    for t in 0..tools {
        writeln!(yaml, "  - tool{t}/1.0.{t}").unwrap();
    }
    yaml.push_str("platforms:\n");
    for p in 0..platforms {
        writeln!(yaml, "  p{p}:\n    build_tools: true\n    configs:").unwrap();
        for c in ["Release", "Debug", "RelWithDebInfo", "MinSizeRel"] {
            writeln!(
                yaml,
                "      {c}: {{ profile: p{p}-{c}, settings: {{ build_type: {c} }} }}"
            )
            .unwrap();
        }
    }
    parse_config(&yaml).unwrap()
}

fn catalog(dir: &std::path::Path, tools: usize) -> Catalog {
    for t in 0..tools {
        let root = dir.join(format!("tool{t}"));
        std::fs::create_dir_all(root.join("all")).unwrap();
        std::fs::write(
            root.join("config.yml"),
            format!("versions:\n  \"1.0.{t}\":\n    folder: all\n"),
        )
        .unwrap();
    }
    Catalog::new(dir)
}

fn bench_plan(c: &mut Criterion) {
    let dir = tempfile::tempdir().unwrap();
    let catalog = catalog(dir.path(), 16);

    let mut group = c.benchmark_group("plan");
    for platforms in [1, 4, 16] {
        let config = pipeline(platforms, 16);
        let selected = selector::select_platforms(&config, &PlatformFilter::All);
        group.bench_with_input(
            BenchmarkId::from_parameter(platforms),
            &selected,
            |b, selected| {
                b.iter(|| {
                    let plan = planner::plan(black_box(&config), &catalog, selected).unwrap();
                    black_box(plan.pair_count());
                });
            },
        );
    }
    group.finish();
}

fn bench_pair_fingerprint(c: &mut Criterion) {
    let config = pipeline(1, 1);
    let platform = &config.platforms["p0"];
    let tool = config.prebuilt_tools[0].spec().unwrap();
    let build = &platform.configs["Release"];
    let folder = std::path::Path::new("recipes/tool0/all");

    c.bench_function("pair_fingerprint", |b| {
        b.iter(|| {
            black_box(planner::pair_fingerprint(
                black_box(platform),
                &tool,
                "Release",
                build,
                folder,
            ));
        });
    });
}

fn bench_option_parse(c: &mut Criterion) {
    let inputs = [
        "shared=True",
        "cmake:with_openssl=False",
        "*:fPIC=True",
        "boost/*:without_python=True",
    ];
    c.bench_function("build_option_parse", |b| {
        b.iter(|| {
            for input in &inputs {
                let option: BuildOption = black_box(input).parse().unwrap();
                black_box(option);
            }
        });
    });
}

fn bench_select(c: &mut Criterion) {
    let config = pipeline(64, 1);
    let mut group = c.benchmark_group("select_platforms");
    for filter in ["all", "p32", "missing"] {
        let parsed: PlatformFilter = filter.parse().unwrap();
        group.bench_with_input(BenchmarkId::from_parameter(filter), &parsed, |b, parsed| {
            b.iter(|| black_box(selector::select_platforms(&config, parsed)));
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_plan,
    bench_pair_fingerprint,
    bench_option_parse,
    bench_select
);
criterion_main!(benches);
