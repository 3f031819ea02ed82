use std::{sync::Arc, time::Duration};

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use entgraph::{Client, Context, SqliteDriver, Step, Token, User, neighbors};

const SAMPLE_SIZE: usize = 20;
const WARM_UP: Duration = Duration::from_millis(300);
const MEASURE: Duration = Duration::from_millis(500);
const TOKENS_PER_USER: &[usize] = &[1, 10, 100];

struct Seeded {
    client: Client,
    user: User,
    token: Token,
    tokens: usize,
}

fn seed(tokens: usize) -> Seeded {
    let ctx = Context::background();
    let driver = SqliteDriver::open_in_memory().expect("driver");
    let client = Client::new(Arc::new(driver), Vec::new()).expect("client");
    client.schema().create(&ctx).expect("schema");
    let user = client
        .user()
        .create()
        .set_email(format!("bench-{tokens}@example.com"))
        .set_tenant("bench")
        .save(&ctx)
        .expect("user");
    let builders = (0..tokens)
        .map(|idx| {
            client
                .token()
                .create()
                .set_value(format!("token-{idx}"))
                .set_user(&user)
        })
        .collect();
    let mut created = client
        .token()
        .create_bulk(builders)
        .save(&ctx)
        .expect("tokens");
    Seeded {
        client,
        user,
        token: created.remove(0),
        tokens,
    }
}

fn bench_query_tokens(c: &mut Criterion) {
    let ctx = Context::background();
    let mut group = c.benchmark_group("query_tokens");
    group.sample_size(SAMPLE_SIZE);
    group.warm_up_time(WARM_UP);
    group.measurement_time(MEASURE);
    for &tokens in TOKENS_PER_USER {
        let seeded = seed(tokens);
        group.bench_with_input(BenchmarkId::from_parameter(tokens), &seeded, |b, seeded| {
            b.iter(|| {
                let found = seeded
                    .client
                    .user()
                    .query_tokens(&seeded.user)
                    .expect("step")
                    .all(&ctx)
                    .expect("tokens");
                assert_eq!(found.len(), seeded.tokens);
            });
        });
    }
    group.finish();
}

fn bench_query_user(c: &mut Criterion) {
    let ctx = Context::background();
    let seeded = seed(10);
    let mut group = c.benchmark_group("query_user");
    group.sample_size(SAMPLE_SIZE);
    group.warm_up_time(WARM_UP);
    group.measurement_time(MEASURE);
    group.bench_function("only", |b| {
        b.iter(|| {
            seeded
                .client
                .token()
                .query_user(&seeded.token)
                .expect("step")
                .only(&ctx)
                .expect("user")
        });
    });
    group.finish();
}

fn bench_compile_step(c: &mut Criterion) {
    let seeded = seed(1);
    let registry = seeded.client.config().registry();
    c.bench_function("compile_step", |b| {
        b.iter(|| {
            let (step, _) = Step::resolve(registry, &seeded.user, "tokens").expect("resolve");
            neighbors(&step).expect("selector")
        });
    });
}

criterion_group!(
    benches,
    bench_query_tokens,
    bench_query_user,
    bench_compile_step
);
criterion_main!(benches);
