//! Jobs crossing threads and the network: concurrent producers against a
//! draining consumer, and a loopback job port pair.

use std::{
    net::{Ipv4Addr, SocketAddrV4},
    sync::Arc,
    thread,
    time::{Duration, Instant},
};

use nubot_runtime::jobs::{Job, JobKind, JobList, MotionJob};
use nubot_runtime::network::{job_port::JobPort, udp_port::UdpPortOptions};

fn loopback(target_port: u16) -> UdpPortOptions {
    UdpPortOptions {
        bind_address: Ipv4Addr::LOCALHOST,
        port: 0,
        target: SocketAddrV4::new(Ipv4Addr::LOCALHOST, target_port),
    }
}

#[test]
fn concurrent_producers_lose_and_duplicate_nothing() {
    const PRODUCERS: usize = 4;
    const PER_PRODUCER: usize = 500;

    let list = Arc::new(JobList::new());
    let producers: Vec<_> = (0..PRODUCERS)
        .map(|p| {
            let list = Arc::clone(&list);
            thread::spawn(move || {
                for i in 0..PER_PRODUCER {
                    let id = (p * PER_PRODUCER + i) as f64;
                    list.add(Job::freeze(id));
                }
            })
        })
        .collect();

    let mut seen = Vec::with_capacity(PRODUCERS * PER_PRODUCER);
    let deadline = Instant::now() + Duration::from_secs(5);
    while seen.len() < PRODUCERS * PER_PRODUCER && Instant::now() < deadline {
        seen.extend(list.drain().into_iter().map(|job| job.created_ms() as usize));
        thread::yield_now();
    }
    for producer in producers {
        producer.join().unwrap();
    }
    seen.extend(list.drain().into_iter().map(|job| job.created_ms() as usize));

    seen.sort_unstable();
    let expected: Vec<usize> = (0..PRODUCERS * PER_PRODUCER).collect();
    assert_eq!(seen, expected);
}

#[test]
fn each_producer_order_is_preserved() {
    let list = Arc::new(JobList::new());
    let writer = {
        let list = Arc::clone(&list);
        thread::spawn(move || {
            for i in 0..200 {
                list.add(Job::head(f64::from(i), 0.0, 0.0));
            }
        })
    };
    writer.join().unwrap();

    let drained: Vec<f64> = list.drain().iter().map(Job::created_ms).collect();
    assert!(drained.windows(2).all(|w| w[0] < w[1]));
}

#[test]
fn network_jobs_observed_exactly_once() {
    let received = Arc::new(JobList::new());
    let receiver = JobPort::open(loopback(9), Arc::clone(&received)).unwrap();
    let sender = JobPort::open(
        loopback(receiver.udp().port()),
        Arc::new(JobList::new()),
    )
    .unwrap();

    let batch = vec![
        Job::walk(1.0, 2.0, 0.0, 0.0),
        Job::head(2.0, 0.1, -0.3),
        Job::save_images(3.0, true, false, "net_"),
    ];
    sender.send(&batch).unwrap();

    let mut seen = Vec::new();
    let deadline = Instant::now() + Duration::from_millis(200);
    while Instant::now() < deadline {
        seen.extend(received.drain());
        if seen.len() >= batch.len() {
            break;
        }
        thread::sleep(Duration::from_millis(20));
    }
    thread::sleep(Duration::from_millis(40));
    seen.extend(received.drain());

    assert_eq!(seen, batch);
    assert_eq!(receiver.received_jobs(), 3);
    assert!(matches!(
        seen[0].kind(),
        JobKind::Motion(MotionJob::Walk { forward, .. }) if *forward == 2.0
    ));
}

#[test]
fn malformed_datagram_is_dropped_whole() {
    let received = Arc::new(JobList::new());
    let receiver = JobPort::open(loopback(9), Arc::clone(&received)).unwrap();
    let raw = std::net::UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();

    let mut bytes = nubot_runtime::jobs::encode_jobs(&[Job::freeze(1.0), Job::freeze(2.0)]);
    bytes.truncate(bytes.len() - 3);
    raw.send_to(&bytes, (Ipv4Addr::LOCALHOST, receiver.udp().port()))
        .unwrap();

    let deadline = Instant::now() + Duration::from_millis(500);
    while receiver.decode_errors() == 0 && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(10));
    }
    assert_eq!(receiver.decode_errors(), 1);
    assert!(received.is_empty());
}
