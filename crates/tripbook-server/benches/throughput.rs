//! Command throughput benchmarks for the reservation server.
//!
//! These benchmarks measure request handling without socket overhead:
//! - read commands rendering the trip list
//! - reservations serialized through one trip lock
//! - the same reservations spread across many trips from several threads
//!
//! Run with:
//! ```bash
//! cargo bench --bench throughput
//! ```

#![allow(clippy::expect_used)]

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use std::hint::black_box;
use std::sync::Arc;
use std::thread;
use tripbook_server::store::memory::Snapshot;
use tripbook_server::tcp::handlers::handle_command;
use tripbook_server::{AppState, MemoryStore, Trip};

/// Create state holding `count` trips with plenty of seats.
fn create_state(count: u32) -> Arc<AppState> {
    let trips = (1..=count)
        .map(|id| Trip {
            id,
            attraction_name: format!("Attraction {id}"),
            transport_company: "BusCo".to_string(),
            departure_time: format!("{:02}:00", id % 24),
            price: 25.5,
            available_seats: u32::MAX / 2,
        })
        .collect();
    let store = MemoryStore::from_snapshot(Snapshot {
        trips,
        ..Snapshot::default()
    })
    .expect("Failed to build benchmark store");

    Arc::new(AppState::with_store(Arc::new(store), 64).expect("Failed to initialize benchmark AppState"))
}

/// Benchmark read-only commands.
fn bench_reads(c: &mut Criterion) {
    let mut group = c.benchmark_group("reads");

    for count in [10_u32, 100, 1_000] {
        let state = create_state(count);
        group.throughput(Throughput::Elements(u64::from(count)));
        group.bench_with_input(BenchmarkId::new("get_trips", count), &state, |b, state| {
            b.iter(|| black_box(handle_command(black_box("GET_TRIPS"), None, state)));
        });
        group.bench_with_input(BenchmarkId::new("search", count), &state, |b, state| {
            b.iter(|| {
                black_box(handle_command(
                    black_box("SEARCH_TRIPS#Attraction 1#08:00#12:00"),
                    None,
                    state,
                ))
            });
        });
    }

    group.finish();
}

/// Benchmark reservations on one trip and across many trips.
fn bench_reservations(c: &mut Criterion) {
    let mut group = c.benchmark_group("reservations");

    let state = create_state(1);
    group.bench_function("single_trip", |b| {
        b.iter(|| {
            black_box(handle_command(
                black_box("MAKE_RESERVATION#Alice#555-1234#1#1"),
                None,
                &state,
            ))
        });
    });

    let threads = 4_u32;
    let per_thread = 100_u32;
    let state = create_state(threads);
    group.throughput(Throughput::Elements(u64::from(threads * per_thread)));
    group.bench_function(BenchmarkId::new("parallel_trips", threads), |b| {
        b.iter(|| {
            thread::scope(|scope| {
                for trip_id in 1..=threads {
                    let state = &state;
                    scope.spawn(move || {
                        let command = format!("MAKE_RESERVATION#Customer{trip_id}#555#{trip_id}#1");
                        for _ in 0..per_thread {
                            black_box(handle_command(&command, None, state));
                        }
                    });
                }
            });
        });
    });

    group.finish();
}

criterion_group!(benches, bench_reads, bench_reservations);
criterion_main!(benches);
