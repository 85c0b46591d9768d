// Vector mode: many channel pairs in one segment, addressed by instance index.

use dmxp_gymlink::{GymError, Handoff, InterfaceBuilder, MessageInterface, Mode};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

const COUNT: u32 = 4;

fn unique_name(tag: &str) -> String {
    format!("dmxp_vec_{tag}_{}_{}", std::process::id(), fastrand::u64(..))
}

fn open_vector(name: &str) -> (Arc<MessageInterface>, Arc<MessageInterface>) {
    let engine = InterfaceBuilder::new()
        .with_segment_name(name)
        .creator()
        .engine()
        .with_vector(COUNT)
        .with_wait_timeout(Duration::from_secs(10))
        .build()
        .unwrap();
    let agent = InterfaceBuilder::new()
        .with_segment_name(name)
        .attacher()
        .agent()
        .with_vector(COUNT)
        .with_wait_timeout(Duration::from_secs(10))
        .build()
        .unwrap();
    (Arc::new(engine), Arc::new(agent))
}

fn payload(index: u32, step: u32) -> Vec<u8> {
    let mut msg = vec![index as u8; 8 + index as usize];
    msg[..4].copy_from_slice(&step.to_le_bytes());
    msg
}

#[test]
fn test_instances_are_isolated() {
    let (engine, agent) = open_vector(&unique_name("isolated"));
    assert_eq!(engine.count(), COUNT);
    assert_eq!(agent.mode(), Mode::Vector(COUNT));

    // Interleave sends across instances before anyone reads.
    for step in 0..3u32 {
        for index in (0..COUNT).rev() {
            let mut pair = engine.get_interface(index).unwrap();
            assert_eq!(pair.send(&payload(index, step)).unwrap(), Handoff::Granted);
        }
        for index in 0..COUNT {
            let mut pair = agent.get_interface(index).unwrap();
            assert_eq!(pair.recv().unwrap().unwrap(), payload(index, step));
            assert_eq!(pair.send(&[index as u8]).unwrap(), Handoff::Granted);
        }
        for index in 0..COUNT {
            let mut pair = engine.get_interface(index).unwrap();
            assert_eq!(pair.recv().unwrap().unwrap(), vec![index as u8]);
        }
    }
}

#[test]
fn test_instances_run_concurrently() {
    let (engine, agent) = open_vector(&unique_name("threads"));
    let mut handles = Vec::new();
    for index in 0..COUNT {
        let engine = Arc::clone(&engine);
        handles.push(thread::spawn(move || {
            let mut pair = engine.get_interface(index).unwrap();
            for step in 0..200 {
                assert_eq!(pair.send(&payload(index, step)).unwrap(), Handoff::Granted);
                assert_eq!(pair.recv().unwrap().unwrap(), payload(index, step));
            }
        }));
        let agent = Arc::clone(&agent);
        handles.push(thread::spawn(move || {
            let mut pair = agent.get_interface(index).unwrap();
            for _ in 0..200 {
                let msg = pair.recv().unwrap().unwrap();
                assert_eq!(msg[4..], vec![index as u8; 4 + index as usize][..]);
                assert_eq!(pair.send(&msg).unwrap(), Handoff::Granted);
            }
        }));
    }
    for h in handles {
        h.join().unwrap();
    }
}

#[test]
fn test_index_out_of_range() {
    let (engine, _agent) = open_vector(&unique_name("range"));
    let err = engine.get_interface(COUNT).unwrap_err();
    assert!(matches!(err, GymError::IndexOutOfRange { index: COUNT, count: COUNT }));
    assert!(err.is_fatal());
    assert!(matches!(engine.bind(COUNT + 3), Err(GymError::IndexOutOfRange { .. })));
}

#[test]
fn test_binding_is_exclusive() {
    let (engine, _agent) = open_vector(&unique_name("bind"));
    engine.bind(2).unwrap();
    assert!(engine.is_bound(2));
    assert!(matches!(engine.bind(2), Err(GymError::InstanceInUse(2))));

    assert_eq!(engine.bind_next().unwrap(), 0);
    assert_eq!(engine.bind_next().unwrap(), 1);
    assert_eq!(engine.bind_next().unwrap(), 3);
    assert!(matches!(engine.bind_next(), Err(GymError::IndexOutOfRange { .. })));

    engine.release(2);
    assert!(!engine.is_bound(2));
    assert_eq!(engine.bind_next().unwrap(), 2);
}

#[test]
fn test_attacher_count_must_match() {
    let name = unique_name("count");
    let _engine = InterfaceBuilder::new()
        .with_segment_name(&name)
        .creator()
        .with_vector(COUNT)
        .build()
        .unwrap();
    let err = InterfaceBuilder::new()
        .with_segment_name(&name)
        .attacher()
        .agent()
        .with_vector(COUNT + 1)
        .build()
        .unwrap_err();
    assert!(matches!(err, GymError::LayoutMismatch { .. }), "{err}");
}
