use std::sync::Arc;

use super::adapter::{EnvAdapter, GymEnv, StepDriver, StepOutcome, Trigger};
use crate::config::InterfaceConfig;
use crate::error::{GymError, GymResult};
use crate::Channel::MessageInterface;

/// Engine-side controller: owns the interface and one adapter per instance.
///
/// Adapters are kept in instance order, and every fan-out call walks them in
/// that order, pairing adapter `i` with `envs[i]`.
pub struct Session {
    interface: Arc<MessageInterface>,
    adapters: Vec<EnvAdapter>,
    stopped: bool,
}

impl Session {
    pub fn new(interface: Arc<MessageInterface>) -> Self {
        Self {
            interface,
            adapters: Vec::new(),
            stopped: false,
        }
    }

    pub fn open(config: InterfaceConfig) -> GymResult<Self> {
        Ok(Self::new(Arc::new(MessageInterface::open(config)?)))
    }

    pub fn interface(&self) -> &Arc<MessageInterface> {
        &self.interface
    }

    /// Bind the next free instance to a new adapter and return its index.
    pub fn add_env(&mut self, node_id: u32, driver: StepDriver) -> GymResult<u32> {
        let adapter = EnvAdapter::next_free(Arc::clone(&self.interface), node_id, driver)?;
        let index = adapter.instance_index();
        let pos = self
            .adapters
            .partition_point(|a| a.instance_index() < index);
        self.adapters.insert(pos, adapter);
        Ok(index)
    }

    pub fn adapter(&self, index: u32) -> Option<&EnvAdapter> {
        self.adapters.iter().find(|a| a.instance_index() == index)
    }

    pub fn adapters(&self) -> &[EnvAdapter] {
        &self.adapters
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped || self.interface.is_shutdown_requested()
    }

    /// Handshake on every adapter.
    pub fn init<E: GymEnv>(&mut self, envs: &mut [E]) -> GymResult<Vec<StepOutcome>> {
        self.fan_out(envs, |adapter, env| adapter.init(env))
    }

    /// Deliver a trigger to the adapter bound at `index`.
    pub fn notify<E: GymEnv + ?Sized>(
        &mut self,
        index: u32,
        trigger: Trigger,
        env: &mut E,
    ) -> GymResult<StepOutcome> {
        if self.is_stopped() {
            return Ok(StepOutcome::StopRequested);
        }
        let count = self.interface.count();
        let adapter = self
            .adapters
            .iter_mut()
            .find(|a| a.instance_index() == index)
            .ok_or(GymError::IndexOutOfRange { index, count })?;
        let outcome = adapter.notify(trigger, env)?;
        self.observe(outcome);
        Ok(outcome)
    }

    /// Deliver one trigger to every adapter in index order.
    pub fn step_all<E: GymEnv>(
        &mut self,
        trigger: Trigger,
        envs: &mut [E],
    ) -> GymResult<Vec<StepOutcome>> {
        self.fan_out(envs, |adapter, env| adapter.notify(trigger, env))
    }

    /// Flush the final message on every adapter that still runs an episode.
    pub fn notify_simulation_end<E: GymEnv>(
        &mut self,
        envs: &mut [E],
    ) -> GymResult<Vec<StepOutcome>> {
        self.fan_out(envs, |adapter, env| adapter.notify_simulation_end(env))
    }

    /// Finish the interface so the peer stops waiting.
    pub fn shutdown(&self) {
        tracing::info!(segment = self.interface.segment_name(), "session shutdown");
        self.interface.finish();
    }

    fn fan_out<E, F>(&mut self, envs: &mut [E], mut op: F) -> GymResult<Vec<StepOutcome>>
    where
        E: GymEnv,
        F: FnMut(&mut EnvAdapter, &mut E) -> GymResult<StepOutcome>,
    {
        if envs.len() != self.adapters.len() {
            return Err(GymError::Config(format!(
                "{} environments given for {} adapters",
                envs.len(),
                self.adapters.len()
            )));
        }
        let mut outcomes = Vec::with_capacity(envs.len());
        for i in 0..self.adapters.len() {
            if self.is_stopped() {
                outcomes.push(StepOutcome::StopRequested);
                continue;
            }
            let outcome = op(&mut self.adapters[i], &mut envs[i])?;
            self.observe(outcome);
            outcomes.push(outcome);
        }
        Ok(outcomes)
    }

    fn observe(&mut self, outcome: StepOutcome) {
        if outcome == StepOutcome::StopRequested && !self.stopped {
            tracing::info!("session stopped by peer");
            self.stopped = true;
        }
    }
}
