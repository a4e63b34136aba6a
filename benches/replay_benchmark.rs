use std::collections::BTreeMap;

use criterion::{Criterion, black_box, criterion_group, criterion_main};
use scenario_pilot::{ElementTarget, VerificationSpec, evaluate, resolve};

fn sample_snapshot(rows: usize) -> String {
    let mut page = String::from("- heading \"Orders\" [level=1] [ref=e1]\n");
    for i in 0..rows {
        page.push_str(&format!(
            "  - row \"Order {i}\" [ref=r{i}]:\n    - cell \"Pending\" [ref=c{i}]\n    - button \"Cancel order {i}\" [ref=b{i}] [cursor=pointer]\n"
        ));
    }
    page.push_str("- button \"Load more\" [ref=e999]\n");
    page
}

fn benchmark_replay(c: &mut Criterion) {
    let page = sample_snapshot(200);
    let memory = BTreeMap::new();
    let spec = VerificationSpec {
        match_patterns: vec!["Shipped".to_string(), r"Load\s+more".to_string()],
        not_match_patterns: vec!["error".to_string(), "failed to load".to_string()],
        memory_checks: vec![],
    };
    let target = ElementTarget {
        description: "Load more button",
        role: Some("button"),
        text: Some("Load more"),
    };

    c.bench_function("verify_evaluate", |b| {
        b.iter(|| {
            let verdict = evaluate(black_box(&spec), black_box(&page), &memory);
            assert!(verdict.success);
        })
    });

    c.bench_function("resolve_element", |b| {
        b.iter(|| {
            let found = resolve(black_box(&target), black_box(&page));
            assert_eq!(found.as_deref(), Some("e999"));
        })
    });
}

criterion_group!(benches, benchmark_replay);
criterion_main!(benches);
