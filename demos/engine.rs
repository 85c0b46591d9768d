// Engine side of the gym demo: attaches to the agent's segment and drives a
// toy counter simulation on a fixed time step.
//
//   cargo run --example agent    # terminal 1, creates the segment
//   cargo run --example engine   # terminal 2
//
// DMXP_GYM_VECTOR=N runs N independent counters over one segment.
use dmxp_gymlink::Gym::{DataContainer, GymEnv, Session, Space, StepDriver, StepOutcome, Trigger};
use dmxp_gymlink::{GymResult, InterfaceConfig, Role, Side};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

const STEP: Duration = Duration::from_millis(100);
const SIM_END: Duration = Duration::from_secs(60);

struct Counter {
    value: u64,
    target: u64,
}

impl GymEnv for Counter {
    fn observation_space(&self) -> Option<Space> {
        Some(Space::boxed(0.0, self.target as f32, vec![1], "uint64"))
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
        match action.and_then(DataContainer::as_discrete) {
            Some(1) => {
                self.value += 1;
                true
            }
            _ => false,
        }
    }
}

fn run() -> GymResult<()> {
    let config = InterfaceConfig::new("dmxp_gym", Role::Attacher, Side::Engine);
    let config = InterfaceConfig {
        handle_finish: true,
        attach_timeout: Some(Duration::from_secs(10)),
        ..config
    }
    .from_env()?;

    let mut session = Session::open(config)?;
    let weak = Arc::downgrade(session.interface());
    ctrlc::set_handler(move || {
        if let Some(interface) = weak.upgrade() {
            interface.finish();
        }
    })
    .map_err(|e| dmxp_gymlink::GymError::Config(format!("Ctrl+C handler: {e}")))?;

    let count = session.interface().count();
    let mut envs = Vec::with_capacity(count as usize);
    for i in 0..count {
        session.add_env(i, StepDriver::time_step(STEP))?;
        envs.push(Counter {
            value: 0,
            target: 20 + 5 * u64::from(i),
        });
    }

    let mut now = Duration::ZERO;
    while now <= SIM_END && !session.is_stopped() {
        let outcomes = session.step_all(Trigger::Tick(now), &mut envs)?;
        if outcomes
            .iter()
            .all(|o| matches!(o, StepOutcome::Terminated(_) | StepOutcome::StopRequested))
        {
            break;
        }
        now += STEP;
    }

    session.notify_simulation_end(&mut envs)?;
    for adapter in session.adapters() {
        tracing::info!(
            instance = adapter.instance_index(),
            steps = adapter.steps(),
            reward = adapter.accumulated_reward(),
            reason = ?adapter.termination_reason(),
            "episode summary"
        );
    }
    session.shutdown();
    Ok(())
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    if let Err(e) = run() {
        tracing::error!(side = "engine", "{e}");
        eprintln!("engine: {e}");
        std::process::exit(1);
    }
}
