/*This benchmark measures the orchestrator-to-loop handoff: one
start_loop / wait_for_loop_completion round trip on a triggered loop
with an empty body, i.e. the scheduling overhead added to every cycle. */
use criterion::{
    criterion_group,
    criterion_main,
    Criterion,
};
use nubot_runtime::threads::{CycleLoop, LoopBody, LoopOptions};

use std::hint::black_box;

struct Idle;

impl LoopBody for Idle {
    fn cycle(&mut self) {
        black_box(());
    }
}

fn bench_cycle_handoff(c: &mut Criterion) {
    let mut lp = match CycleLoop::spawn(LoopOptions::triggered("bench"), Idle) {
        Ok(lp) => lp,
        Err(e) => panic!("failed to spawn loop: {e}"),
    };

    c.bench_function("cycle_loop_round_trip", |b| {
        b.iter(|| {
            let started = lp.start_loop().is_ok();
            let finished = lp.wait_for_loop_completion().is_ok();
            black_box(started && finished)
        });
    });

    lp.stop();
}

criterion_group!(benches, bench_cycle_handoff);
criterion_main!(benches);
