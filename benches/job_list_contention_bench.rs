/*
This benchmark measures how the shared JobList behaves under contention:
several producer threads add Jobs while one consumer drains, as the
network ports and see-think do against sense-act.
*/

use criterion::{
    criterion_group,
    criterion_main,
    Criterion,
    BenchmarkId,
};

use nubot_runtime::jobs::{Job, JobList};
use std::{
    sync::Arc,
    thread,
    hint::black_box,
};

//Number of producer threads adding to the same JobList
const PRODUCER_COUNTS: &[usize] = &[1, 2, 4, 8];

//Jobs each producer adds per iteration
const JOBS_PER_PRODUCER: usize = 5_000;

fn bench_job_list_contention(c: &mut Criterion) {
    let mut group = c.benchmark_group("job_list_add_drain");

    for &producers in PRODUCER_COUNTS {
        group.bench_with_input(
            BenchmarkId::from_parameter(producers),
            &producers,
            |b, &producers| {
                let list = Arc::new(JobList::new());

                b.iter(|| {
                    let mut handles = Vec::with_capacity(producers);
                    for p in 0..producers {
                        let list = Arc::clone(&list);
                        handles.push(thread::spawn(move || {
                            for i in 0..JOBS_PER_PRODUCER {
                                list.add(Job::freeze(black_box((p * JOBS_PER_PRODUCER + i) as f64)));
                            }
                        }));
                    }

                    //Consumer drains concurrently until every producer is done
                    let mut drained = 0;
                    while handles.iter().any(|h| !h.is_finished()) {
                        drained += list.drain().len();
                    }
                    for h in handles {
                        let _ = h.join();
                    }
                    drained += list.drain().len();
                    black_box(drained)
                });
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_job_list_contention);
criterion_main!(benches);
