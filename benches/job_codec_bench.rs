/*This benchmark measures encode and decode cost of a realistic JobList
batch (mixed motion, vision and behaviour Jobs) as sent over the job port. */
use criterion::{
    criterion_group,
    criterion_main,
    BenchmarkId,
    Criterion,
};
use nubot_runtime::jobs::{decode_jobs, encode_jobs, Job};

use std::hint::black_box;

//Batch sizes seen on the job port: a single command up to a busy cycle
const BATCH_SIZES: &[usize] = &[1, 8, 64];

fn batch(size: usize) -> Vec<Job> {
    (0..size)
        .map(|i| {
            let t = i as f64;
            match i % 3 {
                0 => Job::walk(t, 2.0, 0.5, -0.1),
                1 => Job::save_images(t, true, false, "bench_"),
                _ => Job::select_behaviour(t, "striker"),
            }
        })
        .collect()
}

fn bench_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("job_codec_encode");
    for &size in BATCH_SIZES {
        let jobs = batch(size);
        group.bench_with_input(BenchmarkId::from_parameter(size), &jobs, |b, jobs| {
            b.iter(|| black_box(encode_jobs(black_box(jobs))));
        });
    }
    group.finish();
}

fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("job_codec_decode");
    for &size in BATCH_SIZES {
        let bytes = encode_jobs(&batch(size));
        group.bench_with_input(BenchmarkId::from_parameter(size), &bytes, |b, bytes| {
            b.iter(|| {
                let decoded = decode_jobs(black_box(bytes));
                black_box(decoded.map(|jobs| jobs.len()).unwrap_or(0))
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_encode, bench_decode);
criterion_main!(benches);
