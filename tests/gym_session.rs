// Engine session against an agent, both in this process on separate threads.

use dmxp_gymlink::Gym::messages::{recv_message, send_message};
use dmxp_gymlink::Gym::{
    AdapterState, AgentEnv, DataContainer, EnvActMsg, EnvAdapter, EnvStateMsg, GymEnv, Session,
    SimInitAck, SimInitMsg, Space, StepDriver, StepOutcome, TerminationReason, Trigger,
};
use dmxp_gymlink::{Direction, GymError, Handoff, InterfaceBuilder, MessageInterface};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

fn unique_name(tag: &str) -> String {
    format!("dmxp_gym_{tag}_{}_{}", std::process::id(), fastrand::u64(..))
}

fn open(name: &str, count: u32) -> (Arc<MessageInterface>, Arc<MessageInterface>) {
    let engine = InterfaceBuilder::new()
        .with_segment_name(name)
        .creator()
        .engine()
        .with_vector(count)
        .with_wait_timeout(Duration::from_secs(10))
        .build()
        .unwrap();
    let agent = InterfaceBuilder::new()
        .with_segment_name(name)
        .attacher()
        .agent()
        .with_vector(count)
        .with_wait_timeout(Duration::from_secs(10))
        .build()
        .unwrap();
    (Arc::new(engine), Arc::new(agent))
}

/// Counts up by one on action `1` and is over at `target`.
struct Counter {
    value: u64,
    target: u64,
    executed: usize,
}

impl Counter {
    fn new(target: u64) -> Self {
        Self {
            value: 0,
            target,
            executed: 0,
        }
    }
}

impl GymEnv for Counter {
    fn observation_space(&self) -> Option<Space> {
        Some(Space::boxed(0.0, 100.0, vec![1], "uint64"))
    }

    fn action_space(&self) -> Option<Space> {
        Some(Space::discrete(2))
    }

    fn observation(&mut self) -> Option<DataContainer> {
        Some(DataContainer::vector(vec![self.value]))
    }

    fn reward(&mut self) -> f32 {
        1.0
    }

    fn game_over(&mut self) -> bool {
        self.value >= self.target
    }

    fn extra_info(&mut self) -> String {
        format!("value={}", self.value)
    }

    fn execute_actions(&mut self, action: Option<&DataContainer>) -> bool {
        self.executed += 1;
        if action.and_then(DataContainer::as_discrete) == Some(1) {
            self.value += 1;
        }
        true
    }
}

fn obs(value: u64) -> Option<DataContainer> {
    Some(DataContainer::vector(vec![value]))
}

#[test]
fn test_steps_until_agent_closes_on_game_over() {
    let (engine, agent) = open(&unique_name("gameover"), 1);

    let engine_side = thread::spawn(move || {
        let mut session = Session::new(engine);
        let index = session.add_env(7, StepDriver::EventBased).unwrap();
        let mut env = Counter::new(3);
        let mut outcomes = Vec::new();
        loop {
            let outcome = session.notify(index, Trigger::Event, &mut env).unwrap();
            outcomes.push(outcome);
            if outcome != StepOutcome::Stepped {
                break;
            }
        }
        let adapter = session.adapter(index).unwrap();
        assert_eq!(adapter.node_id(), 7);
        assert_eq!(adapter.steps(), 4);
        assert_eq!(adapter.accumulated_reward(), 4.0);
        assert_eq!(adapter.termination_reason(), TerminationReason::GameOver);
        assert_eq!(adapter.state(), AdapterState::Terminated);
        assert_eq!(adapter.last_observation(), obs(3).as_ref());
        assert!(session.is_stopped());
        assert_eq!(
            session.notify(index, Trigger::Event, &mut env).unwrap(),
            StepOutcome::StopRequested
        );
        (outcomes, env.value)
    });

    let mut env = AgentEnv::new(Arc::clone(&agent), 0).unwrap();
    assert_eq!(env.reset().unwrap(), obs(0));
    assert_eq!(env.action_space(), Some(&Space::discrete(2)));
    assert!(env.observation_space().is_some());

    for expected in 1..=3u64 {
        let result = env.step(DataContainer::Discrete(1)).unwrap().unwrap();
        assert_eq!(result.observation, obs(expected));
        assert_eq!(result.info, format!("value={expected}"));
        assert_eq!(result.terminated, expected == 3);
        assert!(!result.truncated);
    }
    assert!(env.is_game_over());
    assert_eq!(env.game_over_reason(), TerminationReason::GameOver);
    env.close().unwrap();

    let (outcomes, value) = engine_side.join().unwrap();
    assert_eq!(
        outcomes,
        vec![
            StepOutcome::Stepped,
            StepOutcome::Stepped,
            StepOutcome::Stepped,
            StepOutcome::StopRequested
        ]
    );
    assert_eq!(value, 3);
}

#[test]
fn test_engine_side_game_over_terminates() {
    let (engine, agent) = open(&unique_name("engineover"), 1);

    let engine_side = thread::spawn(move || {
        let mut adapter =
            EnvAdapter::new(Arc::clone(&engine), 0, 1, StepDriver::EventBased).unwrap();
        let mut env = Counter::new(2);
        let mut outcomes = Vec::new();
        for _ in 0..3 {
            outcomes.push(adapter.notify(Trigger::Event, &mut env).unwrap());
        }
        let sent = engine
            .get_interface(0)
            .unwrap()
            .sequence(Direction::EngineToAgent);
        // Terminated adapters issue no further sends.
        assert_eq!(
            adapter.notify(Trigger::Event, &mut env).unwrap(),
            StepOutcome::Terminated(TerminationReason::GameOver)
        );
        assert_eq!(
            engine.get_interface(0).unwrap().sequence(Direction::EngineToAgent),
            sent
        );
        assert_eq!(adapter.pending_action(), Some(&DataContainer::Discrete(1)));
        (outcomes, env.executed)
    });

    // Agent that never asks to stop.
    let mut pair = agent.get_interface(0).unwrap();
    let init: SimInitMsg = recv_message(&mut pair).unwrap().unwrap();
    assert_eq!(init.act_space, Some(Space::discrete(2)));
    send_message(&mut pair, &SimInitAck { done: true, stop_sim_req: false }).unwrap();
    loop {
        let state: EnvStateMsg = recv_message(&mut pair).unwrap().unwrap();
        send_message(&mut pair, &EnvActMsg::action(DataContainer::Discrete(1))).unwrap();
        if state.is_game_over {
            assert_eq!(state.reason, TerminationReason::GameOver);
            break;
        }
    }
    drop(pair);

    let (outcomes, executed) = engine_side.join().unwrap();
    assert_eq!(
        outcomes,
        vec![
            StepOutcome::Stepped,
            StepOutcome::Stepped,
            StepOutcome::Terminated(TerminationReason::GameOver)
        ]
    );
    assert_eq!(executed, 2);
}

#[test]
fn test_simulation_end_flushes_final_state() {
    let (engine, agent) = open(&unique_name("simend"), 1);

    let engine_side = thread::spawn(move || {
        let mut session = Session::new(engine);
        session
            .add_env(0, StepDriver::time_step(Duration::from_millis(100)))
            .unwrap();
        let mut envs = [Counter::new(1000)];
        let ms = Duration::from_millis;
        let outcomes = vec![
            session.step_all(Trigger::Tick(ms(0)), &mut envs).unwrap()[0],
            session.step_all(Trigger::Tick(ms(50)), &mut envs).unwrap()[0],
            session.step_all(Trigger::Event, &mut envs).unwrap()[0],
            session.step_all(Trigger::Tick(ms(100)), &mut envs).unwrap()[0],
            session.notify_simulation_end(&mut envs).unwrap()[0],
        ];
        let adapter = &session.adapters()[0];
        assert_eq!(adapter.steps(), 3);
        assert_eq!(adapter.termination_reason(), TerminationReason::SimulationEnd);
        // Already terminated: nothing more is sent.
        assert_eq!(
            session.notify_simulation_end(&mut envs).unwrap(),
            vec![StepOutcome::Terminated(TerminationReason::SimulationEnd)]
        );
        session.shutdown();
        outcomes
    });

    let mut env = AgentEnv::new(Arc::clone(&agent), 0).unwrap();
    assert_eq!(env.reset().unwrap(), obs(0));
    let first = env.step(DataContainer::Discrete(1)).unwrap().unwrap();
    assert_eq!(first.observation, obs(1));
    assert!(!first.terminated);
    let last = env.step(DataContainer::Discrete(1)).unwrap().unwrap();
    assert!(last.terminated);
    assert_eq!(last.reason, TerminationReason::SimulationEnd);
    assert_eq!(last.observation, obs(2));

    let outcomes = engine_side.join().unwrap();
    assert_eq!(
        outcomes,
        vec![
            StepOutcome::Stepped,
            StepOutcome::Skipped,
            StepOutcome::Skipped,
            StepOutcome::Stepped,
            StepOutcome::Terminated(TerminationReason::SimulationEnd)
        ]
    );
    assert!(env.is_finished());
    assert_eq!(env.step(DataContainer::Discrete(1)).unwrap(), None);
}

#[test]
fn test_stop_requested_at_handshake() {
    let (engine, agent) = open(&unique_name("handshake"), 1);
    let engine_for_thread = Arc::clone(&engine);

    let engine_side = thread::spawn(move || {
        let mut session = Session::new(engine_for_thread);
        session.add_env(0, StepDriver::EventBased).unwrap();
        let mut envs = [Counter::new(5)];
        let init = session.init(&mut envs).unwrap();
        let after = session.notify(0, Trigger::Event, &mut envs[0]).unwrap();
        let again = session.init(&mut envs).unwrap();
        (init, after, again, session.is_stopped())
    });

    let mut pair = agent.get_interface(0).unwrap();
    let _: SimInitMsg = recv_message(&mut pair).unwrap().unwrap();
    send_message(&mut pair, &SimInitAck { done: false, stop_sim_req: true }).unwrap();

    let (init, after, again, stopped) = engine_side.join().unwrap();
    assert_eq!(init, vec![StepOutcome::StopRequested]);
    assert_eq!(after, StepOutcome::StopRequested);
    assert_eq!(again, vec![StepOutcome::StopRequested]);
    assert!(stopped);
    assert!(engine.is_shutdown_requested());
    // Only the handshake was ever written.
    assert_eq!(pair.sequence(Direction::EngineToAgent), 1);
}

#[test]
fn test_finish_during_step_is_a_stop() {
    let (engine, agent) = open(&unique_name("finish"), 1);

    let engine_side = thread::spawn(move || {
        let mut adapter = EnvAdapter::new(engine, 0, 0, StepDriver::EventBased).unwrap();
        let mut env = Counter::new(5);
        let outcome = adapter.notify(Trigger::Event, &mut env).unwrap();
        (outcome, adapter.is_stop_requested(), adapter.state())
    });

    {
        let mut pair = agent.get_interface(0).unwrap();
        let _: SimInitMsg = recv_message(&mut pair).unwrap().unwrap();
        send_message(&mut pair, &SimInitAck { done: true, stop_sim_req: false }).unwrap();
        let _: EnvStateMsg = recv_message(&mut pair).unwrap().unwrap();
    }
    agent.finish();

    let (outcome, stop_requested, state) = engine_side.join().unwrap();
    assert_eq!(outcome, StepOutcome::StopRequested);
    assert!(stop_requested);
    assert_eq!(state, AdapterState::Terminated);
}

#[test]
fn test_vector_session_fans_out_in_order() {
    let (engine, agent) = open(&unique_name("vector"), 2);

    let engine_side = thread::spawn(move || {
        let mut session = Session::new(engine);
        assert_eq!(session.add_env(10, StepDriver::EventBased).unwrap(), 0);
        assert_eq!(session.add_env(11, StepDriver::EventBased).unwrap(), 1);
        assert!(matches!(
            session.add_env(12, StepDriver::EventBased),
            Err(GymError::IndexOutOfRange { .. })
        ));

        let mut envs = vec![Counter::new(2), Counter::new(2)];
        let mut rounds = Vec::new();
        while !session.is_stopped() && rounds.len() < 10 {
            rounds.push(session.step_all(Trigger::Event, &mut envs).unwrap());
        }
        assert!(matches!(
            session.step_all(Trigger::Event, &mut envs[..1]),
            Err(GymError::Config(_))
        ));
        rounds
    });

    let agents: Vec<_> = (0..2u32)
        .map(|index| {
            let agent = Arc::clone(&agent);
            thread::spawn(move || {
                let mut env = AgentEnv::new(agent, index).unwrap();
                env.reset().unwrap();
                let mut steps = 0;
                while let Some(result) = env.step(DataContainer::Discrete(1)).unwrap() {
                    steps += 1;
                    if result.terminated {
                        break;
                    }
                }
                steps
            })
        })
        .collect();

    let rounds = engine_side.join().unwrap();
    assert_eq!(
        rounds,
        vec![
            vec![StepOutcome::Stepped, StepOutcome::Stepped],
            vec![StepOutcome::Stepped, StepOutcome::Stepped],
            vec![StepOutcome::StopRequested, StepOutcome::StopRequested],
        ]
    );
    let steps: Vec<u32> = agents.into_iter().map(|h| h.join().unwrap()).collect();
    // Instance 0 saw game over; instance 1 was released by the finished flag.
    assert_eq!(steps, vec![2, 1]);
}

#[test]
fn test_adapter_binding() {
    let (engine, _agent) = open(&unique_name("binding"), 1);
    let first = EnvAdapter::new(Arc::clone(&engine), 0, 0, StepDriver::EventBased).unwrap();
    assert!(matches!(
        EnvAdapter::new(Arc::clone(&engine), 0, 1, StepDriver::EventBased),
        Err(GymError::InstanceInUse(0))
    ));
    drop(first);
    let again = EnvAdapter::new(Arc::clone(&engine), 0, 1, StepDriver::EventBased).unwrap();
    assert_eq!(again.state(), AdapterState::Uninitialized);
}

/// Records which observation each executed action answered.
struct Recorder {
    value: u64,
    answered: Vec<(u64, u32)>,
}

impl GymEnv for Recorder {
    fn observation_space(&self) -> Option<Space> {
        Some(Space::boxed(0.0, 100.0, vec![1], "uint64"))
    }

    fn action_space(&self) -> Option<Space> {
        Some(Space::discrete(1000))
    }

    fn observation(&mut self) -> Option<DataContainer> {
        Some(DataContainer::vector(vec![self.value]))
    }

    fn execute_actions(&mut self, action: Option<&DataContainer>) -> bool {
        if let Some(action) = action.and_then(DataContainer::as_discrete) {
            self.answered.push((self.value, action));
        }
        self.value += 1;
        true
    }
}

fn until_replied(mut op: impl FnMut() -> Result<StepOutcome, GymError>) -> (StepOutcome, usize) {
    let mut timeouts = 0;
    loop {
        match op() {
            Err(GymError::PeerTimeout { .. }) => timeouts += 1,
            other => return (other.unwrap(), timeouts),
        }
    }
}

#[test]
fn test_slow_agent_replies_pair_with_their_states() {
    let name = unique_name("slow");
    let engine = Arc::new(
        InterfaceBuilder::new()
            .with_segment_name(&name)
            .creator()
            .engine()
            .with_wait_timeout(Duration::from_millis(150))
            .build()
            .unwrap(),
    );
    let agent = InterfaceBuilder::new()
        .with_segment_name(&name)
        .attacher()
        .agent()
        .with_wait_timeout(Duration::from_secs(10))
        .build()
        .unwrap();

    let engine_side = thread::spawn(move || {
        let mut adapter =
            EnvAdapter::new(Arc::clone(&engine), 0, 0, StepDriver::EventBased).unwrap();
        let mut env = Recorder {
            value: 0,
            answered: Vec::new(),
        };

        let (outcome, timeouts) = until_replied(|| adapter.init(&mut env));
        assert_eq!(outcome, StepOutcome::Initialized);
        assert!(timeouts > 0);
        assert!(!adapter.is_awaiting_reply());

        let (outcome, timeouts) = until_replied(|| adapter.notify(Trigger::Event, &mut env));
        assert_eq!(outcome, StepOutcome::Stepped);
        assert!(timeouts > 0);
        assert_eq!(adapter.steps(), 1);

        for _ in 0..2 {
            assert_eq!(
                adapter.notify(Trigger::Event, &mut env).unwrap(),
                StepOutcome::Stepped
            );
        }
        assert_eq!(adapter.steps(), 3);
        assert_eq!(adapter.accumulated_reward(), 0.0);
        env.answered
    });

    // Agent answering each observation `v` with `v + 100`, slowly at first.
    let mut pair = agent.get_interface(0).unwrap();
    let _: SimInitMsg = recv_message(&mut pair).unwrap().unwrap();
    thread::sleep(Duration::from_millis(400));
    send_message(&mut pair, &SimInitAck { done: true, stop_sim_req: false }).unwrap();
    for step in 0..3 {
        let state: EnvStateMsg = recv_message(&mut pair).unwrap().unwrap();
        let value = state.obs_data.unwrap().as_box().unwrap().to_f64()[0] as u32;
        if step == 0 {
            thread::sleep(Duration::from_millis(400));
        }
        send_message(&mut pair, &EnvActMsg::action(DataContainer::Discrete(value + 100))).unwrap();
    }
    drop(pair);

    let answered = engine_side.join().unwrap();
    assert_eq!(answered, vec![(0, 100), (1, 101), (2, 102)]);
}

#[test]
fn test_close_command_after_finish_writes_nothing() {
    let (engine, agent) = open(&unique_name("closefin"), 1);

    let engine_side = {
        let engine = Arc::clone(&engine);
        thread::spawn(move || {
            let mut pair = engine.get_interface(0).unwrap();
            let init = SimInitMsg {
                obs_space: None,
                act_space: Some(Space::discrete(2)),
            };
            send_message(&mut pair, &init).unwrap();
            let _: SimInitAck = recv_message(&mut pair).unwrap().unwrap();
            let state = EnvStateMsg {
                obs_data: obs(5),
                ..Default::default()
            };
            send_message(&mut pair, &state).unwrap();
        })
    };

    let mut env = AgentEnv::new(Arc::clone(&agent), 0).unwrap();
    assert_eq!(env.reset().unwrap(), obs(5));
    engine_side.join().unwrap();

    engine.finish();
    let sent = agent.get_interface(0).unwrap().sequence(Direction::AgentToEngine);
    assert_eq!(env.send_close_command().unwrap(), Handoff::Finished);
    assert!(env.is_finished());
    assert_eq!(
        agent.get_interface(0).unwrap().sequence(Direction::AgentToEngine),
        sent
    );
    env.close().unwrap();
}
