// Agent side of the gym demo: creates the segment and answers every state
// with "increment" until the engine reports game over.
//
// Start this first, then `cargo run --example engine`.
use dmxp_gymlink::Gym::{AgentEnv, DataContainer};
use dmxp_gymlink::{GymError, GymResult, InterfaceConfig, MessageInterface, Role, Side};
use std::sync::Arc;
use std::thread;
use tracing_subscriber::EnvFilter;

fn drive(interface: Arc<MessageInterface>, index: u32) -> GymResult<()> {
    let mut env = AgentEnv::new(interface, index)?;
    let Some(first) = env.reset()? else {
        tracing::warn!(instance = index, "interface finished before the first state");
        return Ok(());
    };
    tracing::info!(
        instance = index,
        obs_space = ?env.observation_space(),
        act_space = ?env.action_space(),
        ?first,
        "episode started"
    );

    let mut total = 0.0f32;
    while let Some(result) = env.step(DataContainer::Discrete(1))? {
        total += result.reward;
        if result.terminated {
            tracing::info!(instance = index, total, reason = ?result.reason, info = %result.info, "episode done");
            break;
        }
    }
    env.close()
}

fn run() -> Result<(), (u32, GymError)> {
    let config = InterfaceConfig {
        handle_finish: true,
        ..InterfaceConfig::new("dmxp_gym", Role::Creator, Side::Agent)
    }
    .from_env()
    .map_err(|e| (0, e))?;

    let interface = Arc::new(MessageInterface::open(config).map_err(|e| (0, e))?);
    let weak = Arc::downgrade(&interface);
    ctrlc::set_handler(move || {
        if let Some(interface) = weak.upgrade() {
            interface.finish();
        }
    })
    .map_err(|e| (0, GymError::Config(format!("Ctrl+C handler: {e}"))))?;

    tracing::info!(segment = interface.segment_name(), "waiting for engine");

    let handles: Vec<_> = (0..interface.count())
        .map(|index| {
            let interface = Arc::clone(&interface);
            thread::spawn(move || drive(interface, index).map_err(|e| (index, e)))
        })
        .collect();

    let mut first_error = None;
    for handle in handles {
        match handle.join() {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                first_error.get_or_insert(err);
            }
            Err(_) => {
                first_error.get_or_insert((0, GymError::Config("agent thread panicked".into())));
            }
        }
    }
    interface.finish();
    first_error.map_or(Ok(()), Err)
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    if let Err((instance, e)) = run() {
        tracing::error!(side = "agent", instance, "{e}");
        eprintln!("agent instance {instance}: {e}");
        std::process::exit(1);
    }
}
