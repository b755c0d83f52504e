//! Queue throughput benchmarks

use criterion::{criterion_group, criterion_main, Criterion};

use sentinel_bus::{PriorityQueue, QUEUE_CAPACITY};
use sentinel_core::{Event, EventPayload, Priority};

fn event(priority: Priority, seq: u64) -> Event {
    Event::new(
        "bench",
        seq,
        priority,
        EventPayload::MaintenanceAlert {
            component_id: "bench".into(),
            message: "tick".into(),
        },
    )
}

fn bench_push_pop(c: &mut Criterion) {
    c.bench_function("queue_push_pop", |b| {
        let mut queue = PriorityQueue::new(QUEUE_CAPACITY);
        let mut seq = 0u64;
        b.iter(|| {
            queue.push(event(Priority::Normal, seq));
            seq += 1;
            criterion::black_box(queue.pop());
        });
    });
}

fn bench_mixed_priorities(c: &mut Criterion) {
    c.bench_function("queue_mixed_priorities", |b| {
        let mut queue = PriorityQueue::new(QUEUE_CAPACITY);
        let mut seq = 0u64;
        b.iter(|| {
            for lane in 0..Priority::LANES {
                queue.push(event(Priority::from_lane(lane).unwrap(), seq));
                seq += 1;
            }
            while criterion::black_box(queue.pop()).is_some() {}
        });
    });
}

criterion_group!(benches, bench_push_pop, bench_mixed_priorities);
criterion_main!(benches);
