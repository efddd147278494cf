use criterion::{black_box, criterion_group, criterion_main, Criterion};

use chrono::{DateTime, Duration};
use proctor_core::model::{OptionKey, TestDefinition, TestQuestion};
use proctor_core::report::SubmitTrigger;
use proctor_core::scoring::{percentage, score, StandardMarking};
use proctor_core::session::{FrozenSession, TestSession};

fn make_definition(n: usize) -> TestDefinition {
    TestDefinition {
        code: "bench".into(),
        title: "Bench".into(),
        duration_minutes: 180,
        questions: (0..n)
            .map(|i| TestQuestion {
                id: format!("q{i}"),
                text: format!("Question {i}"),
                options: ["a".into(), "b".into(), "c".into(), "d".into()],
                correct_option: OptionKey::ALL[i % 4],
                marks: 4,
                explanation: None,
            })
            .collect(),
    }
}

fn make_snapshot(definition: &TestDefinition) -> FrozenSession {
    let start = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
    let mut session = TestSession::start(definition, "bench-user", start).unwrap();
    for i in 0..definition.question_count() {
        // Three in four answered, half of those correct.
        if i % 4 != 3 {
            session.state.select_option(i, OptionKey::ALL[(i / 2) % 4]);
        }
    }
    session
        .freeze(definition, start + Duration::minutes(95))
        .unwrap()
}

fn bench_score(c: &mut Criterion) {
    let mut group = c.benchmark_group("score");

    for n in [10usize, 90, 1000] {
        let definition = make_definition(n);
        let snapshot = make_snapshot(&definition);
        group.bench_function(format!("questions={n}"), |b| {
            b.iter(|| {
                score(
                    black_box(&definition),
                    black_box(&snapshot),
                    SubmitTrigger::Manual,
                    &StandardMarking,
                )
            })
        });
    }

    group.finish();
}

fn bench_percentage(c: &mut Criterion) {
    c.bench_function("percentage", |b| {
        b.iter(|| percentage(black_box(217), black_box(360)))
    });
}

criterion_group!(benches, bench_score, bench_percentage);
criterion_main!(benches);
