// Cooperative termination through the shared finished flag.

use dmxp_gymlink::{Direction, Handoff, InterfaceBuilder, MessageInterface, SlotState};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

fn unique_name(tag: &str) -> String {
    format!("dmxp_stop_{tag}_{}_{}", std::process::id(), fastrand::u64(..))
}

fn open(name: &str, handle_finish: bool) -> (MessageInterface, MessageInterface) {
    let engine = InterfaceBuilder::new()
        .with_segment_name(name)
        .creator()
        .engine()
        .with_handle_finish(handle_finish)
        .build()
        .unwrap();
    let agent = InterfaceBuilder::new()
        .with_segment_name(name)
        .attacher()
        .agent()
        .with_handle_finish(handle_finish)
        .build()
        .unwrap();
    (engine, agent)
}

#[test]
fn test_finish_wakes_blocked_receiver() {
    let (engine, agent) = open(&unique_name("wake"), true);
    let agent = Arc::new(agent);

    let waiter = {
        let agent = Arc::clone(&agent);
        thread::spawn(move || {
            let start = Instant::now();
            let got = agent.get_interface(0).unwrap().recv().unwrap();
            (got, start.elapsed())
        })
    };

    thread::sleep(Duration::from_millis(100));
    engine.finish();
    let (got, waited) = waiter.join().unwrap();
    assert_eq!(got, None);
    assert!(waited < Duration::from_secs(2), "waiter took {waited:?}");
    assert!(agent.is_finished());
}

#[test]
fn test_send_after_finish_writes_nothing() {
    let (engine, agent) = open(&unique_name("late"), true);
    agent.finish();

    let mut pair = engine.get_interface(0).unwrap();
    assert!(pair.is_finished());
    assert_eq!(pair.send(b"too late").unwrap(), Handoff::Finished);
    assert_eq!(pair.send_begin().unwrap(), Handoff::Finished);
    assert_eq!(pair.slot_state(Direction::EngineToAgent), SlotState::Empty);
    assert_eq!(pair.sequence(Direction::EngineToAgent), 0);
    assert_eq!(pair.recv().unwrap(), None);
}

#[test]
fn test_drop_finishes_when_handled() {
    let (engine, agent) = open(&unique_name("drop"), true);
    drop(agent);
    assert!(engine.is_finished());
}

#[test]
fn test_drop_leaves_flag_when_not_handled() {
    let (engine, agent) = open(&unique_name("keep"), false);
    drop(agent);
    assert!(!engine.is_finished());
}

#[test]
fn test_shutdown_request_is_local() {
    let (engine, agent) = open(&unique_name("local"), true);
    engine.request_shutdown();
    assert!(engine.is_shutdown_requested());
    assert!(!agent.is_shutdown_requested());
    assert!(!agent.is_finished());
}
