use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;

use super::container::DataContainer;
use super::messages::{
    recv_message, send_message, EnvActMsg, EnvStateMsg, SimInitAck, SimInitMsg, TerminationReason,
};
use super::spaces::Space;
use crate::error::{GymError, GymResult};
use crate::Channel::MessageInterface;

/// The simulation-side model one adapter exposes to the agent.
pub trait GymEnv {
    fn observation_space(&self) -> Option<Space>;

    fn action_space(&self) -> Option<Space>;

    fn observation(&mut self) -> Option<DataContainer>;

    fn reward(&mut self) -> f32 {
        0.0
    }

    fn game_over(&mut self) -> bool {
        false
    }

    fn extra_info(&mut self) -> String {
        String::new()
    }

    /// Apply the agent's action. `None` when the agent replied without one.
    fn execute_actions(&mut self, action: Option<&DataContainer>) -> bool;
}

impl<E: GymEnv + ?Sized> GymEnv for Box<E> {
    fn observation_space(&self) -> Option<Space> {
        (**self).observation_space()
    }

    fn action_space(&self) -> Option<Space> {
        (**self).action_space()
    }

    fn observation(&mut self) -> Option<DataContainer> {
        (**self).observation()
    }

    fn reward(&mut self) -> f32 {
        (**self).reward()
    }

    fn game_over(&mut self) -> bool {
        (**self).game_over()
    }

    fn extra_info(&mut self) -> String {
        (**self).extra_info()
    }

    fn execute_actions(&mut self, action: Option<&DataContainer>) -> bool {
        (**self).execute_actions(action)
    }
}

/// When an adapter exchanges state with the agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepDriver {
    /// Step on simulation ticks at `now >= next_due`, then every `interval`.
    TimeStep { interval: Duration, next_due: Duration },
    /// Step on every external event.
    EventBased,
}

impl StepDriver {
    pub fn time_step(interval: Duration) -> Self {
        StepDriver::TimeStep {
            interval,
            next_due: Duration::ZERO,
        }
    }
}

/// What the simulation reports to an adapter. `Tick` carries simulation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Tick(Duration),
    Event,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdapterState {
    Uninitialized,
    Initialized,
    Stepping,
    Terminated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub enum StepOutcome {
    /// Trigger did not match the driver, or nothing to do.
    Skipped,
    /// Handshake completed.
    Initialized,
    /// State sent, action received and executed.
    Stepped,
    Terminated(TerminationReason),
    /// The agent asked to stop, or the interface was finished.
    StopRequested,
}

/// Reply still owed by the agent after a receive timed out.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Awaiting {
    Ack,
    Act {
        reward: f32,
        is_game_over: bool,
        reason: TerminationReason,
        final_msg: bool,
    },
}

/// Per-instance state machine between a [`GymEnv`] and one channel pair.
///
/// A [`GymError::PeerTimeout`] while waiting for the agent's reply leaves the
/// exchange open: the next call collects that reply before anything new is
/// sent, so actions always pair with the state they answer.
pub struct EnvAdapter {
    interface: Arc<MessageInterface>,
    node_id: u32,
    instance_index: u32,
    driver: StepDriver,
    state: AdapterState,
    last_observation: Option<DataContainer>,
    pending_action: Option<DataContainer>,
    accumulated_reward: f64,
    termination_reason: TerminationReason,
    steps: u64,
    init_sent: bool,
    awaiting: Option<Awaiting>,
    sim_ended: bool,
    stop_requested: bool,
}

impl EnvAdapter {
    /// Bind `instance_index` exclusively and build an adapter over it.
    pub fn new(
        interface: Arc<MessageInterface>,
        instance_index: u32,
        node_id: u32,
        driver: StepDriver,
    ) -> GymResult<Self> {
        interface.bind(instance_index)?;
        Ok(Self::bound(interface, instance_index, node_id, driver))
    }

    /// Bind the lowest free instance.
    pub fn next_free(
        interface: Arc<MessageInterface>,
        node_id: u32,
        driver: StepDriver,
    ) -> GymResult<Self> {
        let index = interface.bind_next()?;
        Ok(Self::bound(interface, index, node_id, driver))
    }

    fn bound(
        interface: Arc<MessageInterface>,
        instance_index: u32,
        node_id: u32,
        driver: StepDriver,
    ) -> Self {
        tracing::debug!(node_id, instance = instance_index, ?driver, "adapter bound");
        Self {
            interface,
            node_id,
            instance_index,
            driver,
            state: AdapterState::Uninitialized,
            last_observation: None,
            pending_action: None,
            accumulated_reward: 0.0,
            termination_reason: TerminationReason::None,
            steps: 0,
            init_sent: false,
            awaiting: None,
            sim_ended: false,
            stop_requested: false,
        }
    }

    /// Send the handshake. Runs at most once per adapter; after a timed-out
    /// acknowledgement a further call only waits for the acknowledgement.
    pub fn init<E: GymEnv + ?Sized>(&mut self, env: &mut E) -> GymResult<StepOutcome> {
        if self.init_sent && self.awaiting != Some(Awaiting::Ack) {
            return Ok(self.settled_outcome());
        }

        if !self.init_sent {
            let msg = SimInitMsg {
                obs_space: env.observation_space(),
                act_space: env.action_space(),
            };
            let handoff = {
                let mut pair = self.interface.get_interface(self.instance_index)?;
                send_message(&mut *pair, &msg)?
            };
            self.init_sent = true;
            if handoff.is_finished() {
                return Ok(self.stop("finished during handshake"));
            }
            self.awaiting = Some(Awaiting::Ack);
        }

        let Some(ack) = self.collect_reply::<SimInitAck>()? else {
            return Ok(self.stop("finished during handshake"));
        };

        tracing::info!(
            node_id = self.node_id,
            instance = self.instance_index,
            done = ack.done,
            "handshake acknowledged"
        );
        if ack.stop_sim_req {
            return Ok(self.stop("stop requested at handshake"));
        }
        self.state = AdapterState::Initialized;
        Ok(StepOutcome::Initialized)
    }

    /// Report a simulation trigger. Steps if the trigger matches the driver.
    ///
    /// While a reply from an earlier timed-out exchange is outstanding, the
    /// call only collects it and returns that exchange's outcome.
    pub fn notify<E: GymEnv + ?Sized>(
        &mut self,
        trigger: Trigger,
        env: &mut E,
    ) -> GymResult<StepOutcome> {
        if self.state == AdapterState::Terminated {
            return Ok(self.settled_outcome());
        }
        if self.awaiting.is_some() {
            return self.resume(env);
        }
        match (&mut self.driver, trigger) {
            (StepDriver::TimeStep { interval, next_due }, Trigger::Tick(now)) => {
                if now < *next_due {
                    return Ok(StepOutcome::Skipped);
                }
                *next_due = now + *interval;
            }
            (StepDriver::EventBased, Trigger::Event) => {}
            _ => return Ok(StepOutcome::Skipped),
        }

        if !self.init_sent {
            let outcome = self.init(env)?;
            if outcome == StepOutcome::StopRequested {
                return Ok(outcome);
            }
        }
        self.exchange_state(env)
    }

    /// Mark the simulation as ended and flush one final state, if a
    /// handshake happened and the episode is still running.
    pub fn notify_simulation_end<E: GymEnv + ?Sized>(
        &mut self,
        env: &mut E,
    ) -> GymResult<StepOutcome> {
        self.sim_ended = true;
        if !self.init_sent {
            return Ok(StepOutcome::Skipped);
        }
        if self.awaiting.is_some() && self.state != AdapterState::Terminated {
            let outcome = self.resume(env)?;
            if !matches!(outcome, StepOutcome::Initialized | StepOutcome::Stepped) {
                return Ok(outcome);
            }
        }
        if self.state == AdapterState::Terminated {
            return Ok(self.settled_outcome());
        }
        self.exchange_state(env)
    }

    /// Whether a reply from a timed-out exchange is still outstanding.
    pub fn is_awaiting_reply(&self) -> bool {
        self.awaiting.is_some()
    }

    fn resume<E: GymEnv + ?Sized>(&mut self, env: &mut E) -> GymResult<StepOutcome> {
        tracing::debug!(node_id = self.node_id, instance = self.instance_index, "collecting late reply");
        match self.awaiting {
            Some(Awaiting::Ack) => self.init(env),
            Some(Awaiting::Act {
                reward,
                is_game_over,
                reason,
                final_msg,
            }) => self.complete_step(env, reward, is_game_over, reason, final_msg),
            None => Ok(StepOutcome::Skipped),
        }
    }

    fn exchange_state<E: GymEnv + ?Sized>(&mut self, env: &mut E) -> GymResult<StepOutcome> {
        let obs_data = env.observation();
        let reward = env.reward();
        let is_game_over = env.game_over() || self.sim_ended;
        let info = env.extra_info();
        let reason = match (is_game_over, self.sim_ended) {
            (false, _) => TerminationReason::None,
            (true, true) => TerminationReason::SimulationEnd,
            (true, false) => TerminationReason::GameOver,
        };
        let msg = EnvStateMsg {
            obs_data,
            reward,
            is_game_over,
            reason,
            info,
        };

        let handoff = {
            let mut pair = self.interface.get_interface(self.instance_index)?;
            send_message(&mut *pair, &msg)?
        };
        self.last_observation = msg.obs_data;
        if handoff.is_finished() {
            return Ok(self.stop("finished during step"));
        }
        let final_msg = self.sim_ended;
        self.awaiting = Some(Awaiting::Act {
            reward,
            is_game_over,
            reason,
            final_msg,
        });
        self.complete_step(env, reward, is_game_over, reason, final_msg)
    }

    fn complete_step<E: GymEnv + ?Sized>(
        &mut self,
        env: &mut E,
        reward: f32,
        is_game_over: bool,
        reason: TerminationReason,
        final_msg: bool,
    ) -> GymResult<StepOutcome> {
        let Some(act) = self.collect_reply::<EnvActMsg>()? else {
            return Ok(self.stop("finished during step"));
        };
        self.steps += 1;
        self.accumulated_reward += f64::from(reward);
        tracing::trace!(
            node_id = self.node_id,
            instance = self.instance_index,
            step = self.steps,
            reward,
            is_game_over,
            "state exchanged"
        );

        if final_msg {
            // Final message: the reply is only an acknowledgement.
            return Ok(self.terminate(TerminationReason::SimulationEnd));
        }
        if act.stop_sim_req {
            self.termination_reason = reason;
            return Ok(self.stop("stop requested by agent"));
        }
        if is_game_over {
            return Ok(self.terminate(TerminationReason::GameOver));
        }

        env.execute_actions(act.act_data.as_ref());
        self.pending_action = act.act_data;
        self.state = AdapterState::Stepping;
        Ok(StepOutcome::Stepped)
    }

    /// Receive the reply owed for the last message sent. A timeout keeps it
    /// owed; any other result, including a decode error, settles it.
    fn collect_reply<M: DeserializeOwned>(&mut self) -> GymResult<Option<M>> {
        let reply = {
            let mut pair = self.interface.get_interface(self.instance_index)?;
            recv_message::<M>(&mut *pair)
        };
        if !matches!(reply, Err(GymError::PeerTimeout { .. })) {
            self.awaiting = None;
        }
        reply
    }

    fn terminate(&mut self, reason: TerminationReason) -> StepOutcome {
        tracing::info!(node_id = self.node_id, instance = self.instance_index, ?reason, "episode terminated");
        self.state = AdapterState::Terminated;
        self.termination_reason = reason;
        StepOutcome::Terminated(reason)
    }

    fn stop(&mut self, why: &'static str) -> StepOutcome {
        tracing::info!(node_id = self.node_id, instance = self.instance_index, why, "adapter stopping");
        self.state = AdapterState::Terminated;
        self.stop_requested = true;
        self.interface.request_shutdown();
        StepOutcome::StopRequested
    }

    fn settled_outcome(&self) -> StepOutcome {
        match self.state {
            AdapterState::Terminated if self.stop_requested => StepOutcome::StopRequested,
            AdapterState::Terminated => StepOutcome::Terminated(self.termination_reason),
            _ => StepOutcome::Skipped,
        }
    }

    pub fn node_id(&self) -> u32 {
        self.node_id
    }

    pub fn instance_index(&self) -> u32 {
        self.instance_index
    }

    pub fn driver(&self) -> StepDriver {
        self.driver
    }

    pub fn state(&self) -> AdapterState {
        self.state
    }

    pub fn last_observation(&self) -> Option<&DataContainer> {
        self.last_observation.as_ref()
    }

    pub fn pending_action(&self) -> Option<&DataContainer> {
        self.pending_action.as_ref()
    }

    pub fn accumulated_reward(&self) -> f64 {
        self.accumulated_reward
    }

    pub fn termination_reason(&self) -> TerminationReason {
        self.termination_reason
    }

    pub fn steps(&self) -> u64 {
        self.steps
    }

    pub fn is_stop_requested(&self) -> bool {
        self.stop_requested
    }
}

impl Drop for EnvAdapter {
    fn drop(&mut self) {
        self.interface.release(self.instance_index);
    }
}

impl std::fmt::Debug for EnvAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnvAdapter")
            .field("node_id", &self.node_id)
            .field("instance_index", &self.instance_index)
            .field("driver", &self.driver)
            .field("state", &self.state)
            .field("steps", &self.steps)
            .field("awaiting", &self.awaiting)
            .field("termination_reason", &self.termination_reason)
            .finish_non_exhaustive()
    }
}
