use baggage::{Factory, FactoryBuilder};
use baggage_core::b3::B3SinglePropagation;
use baggage_core::{Propagation, TraceContext};
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use std::collections::HashMap;

fn carrier() -> HashMap<String, String> {
    let mut map = HashMap::new();
    map.insert(
        "b3".to_owned(),
        "00000000000000010000000000000002-0000000000000003-1".to_owned(),
    );
    map.insert("user-id".to_owned(), "romeo".to_owned());
    map.insert("baggage-country-code".to_owned(), "FO".to_owned());
    map
}

fn factory() -> Factory {
    FactoryBuilder::new(B3SinglePropagation)
        .add_field("user-id")
        .add_prefixed_fields("baggage-", ["country-code"])
        .build()
        .unwrap()
}

fn bench_extract(c: &mut Criterion) {
    let propagation = factory().create();
    let wire = carrier();
    c.bench_function("extract_two_fields", |b| {
        b.iter(|| black_box(propagation.extract(black_box(&wire))))
    });
}

fn bench_inject(c: &mut Criterion) {
    let factory = factory();
    let propagation = factory.create();
    let context = factory.decorate(&TraceContext::builder().trace_id(1).span_id(2).build());
    baggage::set_in(&context, "user-id", "romeo");
    baggage::set_in(&context, "country-code", "FO");
    c.bench_function("inject_two_fields", |b| {
        b.iter(|| {
            let mut out = HashMap::new();
            propagation.inject(black_box(&context), &mut out);
            black_box(out)
        })
    });
}

criterion_group!(benches, bench_extract, bench_inject);
criterion_main!(benches);
