use std::sync::Arc;

use super::container::DataContainer;
use super::messages::{
    recv_message, send_message, EnvActMsg, EnvStateMsg, SimInitAck, SimInitMsg, TerminationReason,
};
use super::spaces::Space;
use crate::error::GymResult;
use crate::Channel::Structs::Handoff;
use crate::Channel::MessageInterface;

/// What one agent step returns, shaped like a gym `step` tuple.
#[derive(Debug, Clone, PartialEq)]
pub struct StepResult {
    pub observation: Option<DataContainer>,
    pub reward: f32,
    pub terminated: bool,
    pub truncated: bool,
    pub reason: TerminationReason,
    pub info: String,
}

/// Decision-process side of one instance.
///
/// The engine speaks first: [`reset`](Self::reset) completes the handshake and
/// reads the first state, then each [`step`](Self::step) sends an action and
/// reads the next state. A game-over state is answered with a close command
/// right away, which tells the engine to stop.
pub struct AgentEnv {
    interface: Arc<MessageInterface>,
    instance_index: u32,
    observation_space: Option<Space>,
    action_space: Option<Space>,
    initialized: bool,
    new_state_rx: bool,
    dirty: bool,
    close_sent: bool,
    finished: bool,
    observation: Option<DataContainer>,
    reward: f32,
    game_over: bool,
    reason: TerminationReason,
    info: String,
}

impl AgentEnv {
    pub fn new(interface: Arc<MessageInterface>, instance_index: u32) -> GymResult<Self> {
        interface.bind(instance_index)?;
        Ok(Self {
            interface,
            instance_index,
            observation_space: None,
            action_space: None,
            initialized: false,
            new_state_rx: false,
            dirty: false,
            close_sent: false,
            finished: false,
            observation: None,
            reward: 0.0,
            game_over: false,
            reason: TerminationReason::None,
            info: String::new(),
        })
    }

    /// Receive the engine's spaces and acknowledge. `false` if the interface
    /// finished first.
    pub fn initialize(&mut self) -> GymResult<bool> {
        let mut pair = self.interface.get_interface(self.instance_index)?;
        let Some(init) = recv_message::<SimInitMsg>(&mut *pair)? else {
            self.finished = true;
            return Ok(false);
        };
        self.observation_space = init.obs_space;
        self.action_space = init.act_space;

        let ack = SimInitAck {
            done: true,
            stop_sim_req: false,
        };
        if send_message(&mut *pair, &ack)?.is_finished() {
            self.finished = true;
            return Ok(false);
        }
        self.initialized = true;
        tracing::info!(
            instance = self.instance_index,
            obs_space = ?self.observation_space,
            act_space = ?self.action_space,
            "agent initialized"
        );
        Ok(true)
    }

    /// Start an episode and return its first observation.
    ///
    /// Only the first call starts an episode. A later call ends the running
    /// episode with a close command and returns `None`: a fresh episode needs
    /// a fresh engine on a fresh interface.
    pub fn reset(&mut self) -> GymResult<Option<DataContainer>> {
        if self.dirty {
            if !self.game_over && !self.close_sent && !self.finished {
                self.receive_state()?;
                if !self.close_sent && !self.finished {
                    self.close_episode()?;
                }
            }
            return Ok(None);
        }
        if !self.initialized && !self.initialize()? {
            return Ok(None);
        }
        if !self.receive_state()? {
            return Ok(None);
        }
        Ok(self.observation.clone())
    }

    /// Send `action` and wait for the resulting state. `None` once finished.
    pub fn step(&mut self, action: DataContainer) -> GymResult<Option<StepResult>> {
        if self.send_actions(action)?.is_finished() {
            self.finished = true;
            return Ok(None);
        }
        if !self.receive_state()? {
            return Ok(None);
        }
        self.dirty = true;
        Ok(Some(self.state()))
    }

    pub fn send_actions(&mut self, action: DataContainer) -> GymResult<Handoff> {
        let mut pair = self.interface.get_interface(self.instance_index)?;
        let handoff = send_message(&mut *pair, &EnvActMsg::action(action))?;
        self.new_state_rx = false;
        Ok(handoff)
    }

    /// Ask the engine to stop its simulation.
    ///
    /// `Handoff::Finished` means nothing was written because the interface
    /// already finished.
    pub fn send_close_command(&mut self) -> GymResult<Handoff> {
        let handoff = {
            let mut pair = self.interface.get_interface(self.instance_index)?;
            send_message(&mut *pair, &EnvActMsg::close())?
        };
        self.new_state_rx = false;
        if handoff.is_finished() {
            self.finished = true;
            tracing::debug!(instance = self.instance_index, "interface finished before close command");
        } else {
            self.close_sent = true;
            tracing::info!(instance = self.instance_index, "close command sent");
        }
        Ok(handoff)
    }

    /// Close command for the running episode; `true` if it was delivered.
    fn close_episode(&mut self) -> GymResult<bool> {
        Ok(!self.send_close_command()?.is_finished())
    }

    /// Read the next state unless one is already pending. `false` once finished.
    pub fn receive_state(&mut self) -> GymResult<bool> {
        if self.new_state_rx {
            return Ok(true);
        }
        let msg = {
            let mut pair = self.interface.get_interface(self.instance_index)?;
            recv_message::<EnvStateMsg>(&mut *pair)?
        };
        let Some(msg) = msg else {
            self.finished = true;
            return Ok(false);
        };
        self.observation = msg.obs_data;
        self.reward = msg.reward;
        self.game_over = msg.is_game_over;
        self.reason = msg.reason;
        self.info = msg.info;
        tracing::trace!(
            instance = self.instance_index,
            reward = self.reward,
            game_over = self.game_over,
            "state received"
        );

        if self.game_over {
            tracing::info!(instance = self.instance_index, reason = ?self.reason, "game over");
            self.close_episode()?;
        }
        self.new_state_rx = true;
        Ok(true)
    }

    pub fn state(&self) -> StepResult {
        StepResult {
            observation: self.observation.clone(),
            reward: self.reward,
            terminated: self.game_over,
            truncated: false,
            reason: self.reason,
            info: self.info.clone(),
        }
    }

    /// Answer a pending state with a close command, then release the instance.
    pub fn close(mut self) -> GymResult<()> {
        if self.new_state_rx && !self.close_sent && !self.finished {
            self.close_episode()?;
        }
        Ok(())
    }

    pub fn instance_index(&self) -> u32 {
        self.instance_index
    }

    pub fn observation_space(&self) -> Option<&Space> {
        self.observation_space.as_ref()
    }

    pub fn action_space(&self) -> Option<&Space> {
        self.action_space.as_ref()
    }

    pub fn observation(&self) -> Option<&DataContainer> {
        self.observation.as_ref()
    }

    pub fn reward(&self) -> f32 {
        self.reward
    }

    pub fn is_game_over(&self) -> bool {
        self.game_over
    }

    pub fn game_over_reason(&self) -> TerminationReason {
        self.reason
    }

    pub fn extra_info(&self) -> &str {
        &self.info
    }

    pub fn is_finished(&self) -> bool {
        self.finished || self.interface.is_finished()
    }
}

impl Drop for AgentEnv {
    fn drop(&mut self) {
        self.interface.release(self.instance_index);
    }
}
