use command_gateway::budget::estimator::heuristic_estimate;
use command_gateway::budget::{HeuristicEstimator, TokenEstimator};
use command_gateway::commands::parse_response;
use command_gateway::validation::CommandValidator;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

fn sample_prompt(kind: &str, repeat: usize) -> String {
    let unit = match kind {
        "prose" => "Please clone the billing service and run its integration tests. ",
        "code" => "fn main() { let x = vec![1, 2, 3]; println!(\"{:?}\", x); }\n",
        "json" => "{\"action\": \"shell_exec\", \"parameters\": {\"command\": \"ls\"}}\n",
        _ => "x ",
    };
    unit.repeat(repeat)
}

fn bench_estimate(c: &mut Criterion) {
    let mut group = c.benchmark_group("estimate");
    for kind in ["prose", "code", "json"] {
        let text = sample_prompt(kind, 200);
        group.bench_with_input(BenchmarkId::new("heuristic", kind), &text, |b, text| {
            b.iter(|| heuristic_estimate(black_box(text)))
        });

        let estimator = HeuristicEstimator::default();
        group.bench_with_input(BenchmarkId::new("memoized", kind), &text, |b, text| {
            b.iter(|| estimator.estimate(black_box(text)))
        });
    }
    group.finish();
}

fn bench_parse_and_validate(c: &mut Criterion) {
    let commands: Vec<String> = (0..20)
        .map(|i| {
            format!(
                r#"{{"action": "file_read", "parameters": {{"path": "src/module_{}.rs"}}, "confidence": 0.9}}"#,
                i
            )
        })
        .collect();
    let raw = format!("```json\n{{\"commands\": [{}], \"reasoning\": \"read\"}}\n```", commands.join(","));
    let validator = CommandValidator::default();

    c.bench_function("parse_and_validate_20_commands", |b| {
        b.iter(|| {
            let parsed = parse_response(black_box(&raw));
            validator.validate_commands(&parsed.commands)
        })
    });
}

criterion_group!(benches, bench_estimate, bench_parse_and_validate);
criterion_main!(benches);
