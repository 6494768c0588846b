//! Blackboard registration rules and a decision/actuation pair sharing it.

use std::{
    sync::Arc,
    thread,
    time::{Duration, Instant},
};

use nubot_runtime::{
    Blackboard, BlackboardError, ConfigurationError, Role,
    blackboard::{ActuatorsData, SensorsData},
    jobs::{Job, JobKind, JobList},
};

fn board() -> Blackboard {
    let board = Blackboard::new();
    board.add(Arc::new(SensorsData::new())).unwrap();
    board.add(Arc::new(ActuatorsData::new())).unwrap();
    board.add(Arc::new(JobList::new())).unwrap();
    board
}

#[test]
fn duplicate_role_is_a_configuration_error() {
    let board = board();
    let err = board.add(Arc::new(JobList::new())).unwrap_err();
    assert!(matches!(err, ConfigurationError::DuplicateRole(Role::Jobs)));
}

#[test]
fn unregistered_role_fails_fast() {
    let board = board();
    assert_eq!(
        board.game_info().unwrap_err(),
        BlackboardError::Unregistered(Role::GameInfo)
    );
}

#[test]
fn lookups_after_teardown_fail_but_handles_survive() {
    let board = board();
    let jobs = board.jobs().unwrap();
    board.teardown();

    assert_eq!(board.jobs().unwrap_err(), BlackboardError::TornDown);
    assert_eq!(board.sensors().unwrap_err(), BlackboardError::TornDown);
    jobs.add(Job::freeze(0.0));
    assert_eq!(jobs.len(), 1);
}

#[test]
fn decision_jobs_observed_exactly_once_by_actuation() {
    let board = Arc::new(board());

    let actuation = {
        let jobs = board.jobs().unwrap();
        thread::spawn(move || {
            let mut seen = Vec::new();
            let deadline = Instant::now() + Duration::from_millis(200);
            while Instant::now() < deadline {
                seen.extend(jobs.drain());
                thread::sleep(Duration::from_millis(20));
            }
            seen.extend(jobs.drain());
            seen
        })
    };

    let decision = {
        let jobs = board.jobs().unwrap();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(30));
            jobs.add_motion_job(Job::walk(1.0, 1.0, 0.0, 0.0));
            jobs.add_vision_job(Job::save_images(2.0, true, false, "e2e_"));
            jobs.add_behaviour_job(Job::select_behaviour(3.0, "goalie"));
        })
    };

    decision.join().unwrap();
    let seen = actuation.join().unwrap();

    assert_eq!(seen.len(), 3);
    assert!(matches!(seen[0].kind(), JobKind::Motion(_)));
    assert!(matches!(seen[1].kind(), JobKind::Vision(_)));
    assert!(matches!(seen[2].kind(), JobKind::Behaviour(_)));
    assert!(board.jobs().unwrap().is_empty());
}
