//! Performance benchmarks for ride_core using Criterion.rs.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use ride_core::booking::{Booking, BookingId};
use ride_core::pricing::PricingEngine;
use ride_core::test_helpers::{snapshot, test_booking_request};

fn bench_quote_all(c: &mut Criterion) {
    let engine = PricingEngine::default();
    let mut group = c.benchmark_group("quote_all");
    for distance in [0.5_f64, 10.0, 50.0] {
        group.bench_with_input(
            BenchmarkId::from_parameter(distance),
            &distance,
            |b, &distance| {
                b.iter(|| black_box(engine.quote_all(black_box(distance), 20.0)));
            },
        );
    }
    group.finish();
}

fn bench_snapshot_apply(c: &mut Criterion) {
    let snapshots = [
        snapshot("B1", "REQUESTED", None),
        snapshot("B1", "ASSIGNED", Some("D9")),
        snapshot("B1", "REQUESTED", None),
        snapshot("B1", "IN_PROGRESS", Some("D9")),
    ];
    c.bench_function("booking_apply_snapshots", |b| {
        b.iter(|| {
            let mut booking = Booking::requested(BookingId::new("B1"), test_booking_request());
            for snap in &snapshots {
                black_box(booking.apply_snapshot(snap));
            }
        });
    });
}

criterion_group!(benches, bench_quote_all, bench_snapshot_apply);
criterion_main!(benches);
