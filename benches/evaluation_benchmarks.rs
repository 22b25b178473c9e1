// Benchmarks for the evaluation hot path: bucketing, rule matching with a
// rollout, and a prerequisite chain, all against an in-memory store.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use flagship::eval::bucket_user;
use flagship::model::{
    Clause, FlagRule, Operator, Prerequisite, Rollout, RolloutKind, Target, VariationOrRollout,
    WeightedVariation,
};
use flagship::{
    evaluate, DataStore, Flag, FullDataSet, InMemoryDataStore, ItemDescriptor, User, Value,
};

fn string_variations(values: &[&str]) -> Vec<Value> {
    values.iter().map(|v| Value::String(v.to_string())).collect()
}

fn populated_store() -> InMemoryDataStore {
    let simple = Flag {
        key: "simple".to_string(),
        version: 1,
        on: true,
        variations: vec![Value::Bool(true), Value::Bool(false)],
        fallthrough: VariationOrRollout::fixed(0),
        off_variation: Some(1),
        salt: "salt".to_string(),
        ..Flag::default()
    };

    let targeted = Flag {
        key: "targeted".to_string(),
        version: 1,
        on: true,
        variations: string_variations(&["special", "normal"]),
        targets: vec![Target {
            variation: 0,
            values: (0..100).map(|i| format!("user-{i}")).collect(),
        }],
        fallthrough: VariationOrRollout::fixed(1),
        salt: "salt".to_string(),
        ..Flag::default()
    };

    let rolled = Flag {
        key: "rolled".to_string(),
        version: 1,
        on: true,
        variations: string_variations(&["a", "b"]),
        rules: vec![FlagRule {
            id: "by-domain".to_string(),
            clauses: vec![Clause {
                attribute: "email".to_string(),
                op: Operator::EndsWith,
                values: vec![Value::String("@acme.com".to_string())],
                negate: false,
            }],
            variation_or_rollout: VariationOrRollout {
                variation: None,
                rollout: Some(Rollout {
                    kind: RolloutKind::Rollout,
                    bucket_by: None,
                    variations: vec![
                        WeightedVariation {
                            variation: 0,
                            weight: 60_000,
                            untracked: false,
                        },
                        WeightedVariation {
                            variation: 1,
                            weight: 40_000,
                            untracked: false,
                        },
                    ],
                }),
            },
            track_events: false,
        }],
        fallthrough: VariationOrRollout::fixed(1),
        salt: "salt".to_string(),
        ..Flag::default()
    };

    let gated = Flag {
        key: "gated".to_string(),
        version: 1,
        on: true,
        variations: string_variations(&["open", "closed"]),
        fallthrough: VariationOrRollout::fixed(0),
        off_variation: Some(1),
        prerequisites: vec![Prerequisite {
            key: "simple".to_string(),
            variation: 0,
        }],
        salt: "salt".to_string(),
        ..Flag::default()
    };

    let store = InMemoryDataStore::new();
    store
        .init(FullDataSet {
            flags: [simple, targeted, rolled, gated]
                .into_iter()
                .map(|f| (f.key.clone(), ItemDescriptor::flag(f)))
                .collect(),
            segments: vec![],
        })
        .expect("init in-memory store");
    store
}

fn bench_bucket_user(c: &mut Criterion) {
    let user = User::builder("user-key-17").secondary("alternate").build();
    c.bench_function("bucket_user", |b| {
        b.iter(|| bucket_user(black_box(&user), black_box("flag-key"), "salt", None))
    });
}

fn bench_evaluate_fallthrough(c: &mut Criterion) {
    let store = populated_store();
    let user = User::with_key("user-42");
    c.bench_function("evaluate_fallthrough", |b| {
        b.iter(|| evaluate(&store, black_box("simple"), black_box(&user)))
    });
}

fn bench_evaluate_target_match(c: &mut Criterion) {
    let store = populated_store();
    let user = User::with_key("user-99");
    c.bench_function("evaluate_target_match", |b| {
        b.iter(|| evaluate(&store, black_box("targeted"), black_box(&user)))
    });
}

fn bench_evaluate_rule_rollout(c: &mut Criterion) {
    let store = populated_store();
    let user = User::builder("user-42").email("user-42@acme.com").build();
    c.bench_function("evaluate_rule_rollout", |b| {
        b.iter(|| evaluate(&store, black_box("rolled"), black_box(&user)))
    });
}

fn bench_evaluate_prerequisite_chain(c: &mut Criterion) {
    let store = populated_store();
    let user = User::with_key("user-42");
    c.bench_function("evaluate_prerequisite_chain", |b| {
        b.iter(|| evaluate(&store, black_box("gated"), black_box(&user)))
    });
}

criterion_group!(
    benches,
    bench_bucket_user,
    bench_evaluate_fallthrough,
    bench_evaluate_target_match,
    bench_evaluate_rule_rollout,
    bench_evaluate_prerequisite_chain
);
criterion_main!(benches);
