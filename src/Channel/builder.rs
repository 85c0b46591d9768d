use std::time::Duration;

use super::MessageInterface;
use super::Structs::{Mode, Role, Side};
use crate::config::InterfaceConfig;
use crate::error::GymResult;

#[derive(Default)]
pub struct InterfaceBuilder {
    config: InterfaceConfig,
}

impl InterfaceBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(mut self, config: InterfaceConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_segment_name(mut self, name: impl Into<String>) -> Self {
        self.config.segment_name = name.into();
        self
    }

    pub fn creator(mut self) -> Self {
        self.config.role = Role::Creator;
        self
    }

    pub fn attacher(mut self) -> Self {
        self.config.role = Role::Attacher;
        self
    }

    pub fn engine(mut self) -> Self {
        self.config.side = Side::Engine;
        self
    }

    pub fn agent(mut self) -> Self {
        self.config.side = Side::Agent;
        self
    }

    pub fn single(mut self) -> Self {
        self.config.mode = Mode::Single;
        self
    }

    pub fn with_vector(mut self, count: u32) -> Self {
        self.config.mode = Mode::Vector(count);
        self
    }

    pub fn with_handle_finish(mut self, handle_finish: bool) -> Self {
        self.config.handle_finish = handle_finish;
        self
    }

    pub fn with_wait_timeout(mut self, timeout: Duration) -> Self {
        self.config.wait_timeout = Some(timeout);
        self
    }

    /// Keep retrying an absent segment for up to `timeout` (attacher only).
    pub fn with_attach_timeout(mut self, timeout: Duration) -> Self {
        self.config.attach_timeout = Some(timeout);
        self
    }

    pub fn config(&self) -> &InterfaceConfig {
        &self.config
    }

    pub fn build(self) -> GymResult<MessageInterface> {
        MessageInterface::open(self.config)
    }
}
