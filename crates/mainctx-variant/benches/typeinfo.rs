use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use mainctx_variant::info;
use mainctx_variant::type_string;

const TYPES: &[&str] = &["i", "a{sv}", "(su(qx)ni)", "a(ysa{sv}(ii)mx)"];

fn bench_validate(c: &mut Criterion) {
    let mut group = c.benchmark_group("type_string_validate");

    for ty in TYPES {
        group.bench_with_input(BenchmarkId::from_parameter(ty), ty, |b, ty| {
            b.iter(|| type_string::validate(black_box(ty)));
        });
    }

    group.finish();
}

fn bench_get_interned(c: &mut Criterion) {
    let mut group = c.benchmark_group("typeinfo_get_interned");

    for ty in TYPES {
        // keep one reference so lookups hit the intern table
        let _held = info::get(ty).ok();
        group.bench_with_input(BenchmarkId::from_parameter(ty), ty, |b, ty| {
            b.iter(|| info::get(black_box(ty)));
        });
    }

    group.finish();
}

fn bench_get_cold(c: &mut Criterion) {
    c.bench_function("typeinfo_get_cold", |b| {
        b.iter(|| drop(info::get(black_box("(yqa(tds)msv)"))));
    });
}

criterion_group!(benches, bench_validate, bench_get_interned, bench_get_cold);
criterion_main!(benches);
