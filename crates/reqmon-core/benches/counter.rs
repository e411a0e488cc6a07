use criterion::{black_box, criterion_group, criterion_main, Criterion};
use reqmon::collector::{Counter, HTTP_COUNTER_NAME};
use reqmon::config::MonitoringConfig;
use reqmon::models::{Period, Range, RequestSample};
use reqmon::report::render;
use std::sync::Arc;
use std::time::Duration;

fn filled_counter(requests: usize) -> Counter {
    let counter = Counter::new(HTTP_COUNTER_NAME, "dbweb.png");
    for i in 0..requests {
        let sample = RequestSample::timed(Duration::from_millis((i % 250) as u64));
        counter.add_request(&format!("/page/{i} GET"), &sample);
    }
    counter
}

fn bench_add_request(c: &mut Criterion) {
    let counter = Counter::new(HTTP_COUNTER_NAME, "dbweb.png");
    let sample = RequestSample::timed(Duration::from_millis(12));
    c.bench_function("add_request_same_name", |b| {
        b.iter(|| counter.add_request(black_box("/orders GET"), black_box(&sample)));
    });
}

fn bench_bind_context(c: &mut Criterion) {
    let counter = Arc::new(Counter::new(HTTP_COUNTER_NAME, "dbweb.png"));
    c.bench_function("bind_context_finish", |b| {
        b.iter(|| counter.bind_context(black_box("/orders GET")).finish());
    });
}

fn bench_render(c: &mut Criterion) {
    let counter = filled_counter(1_000);
    let config = MonitoringConfig::default();
    let range = Range::period(Period::Day);
    c.bench_function("render_1k_requests", |b| {
        b.iter(|| render(black_box(&counter), &range, &config));
    });
}

criterion_group!(benches, bench_add_request, bench_bind_context, bench_render);
criterion_main!(benches);
