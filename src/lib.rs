//! Shared-memory message interface between a simulation engine and a
//! decision agent, with a gym-style environment loop on top.

// Module naming follows project convention (Core = mapping and allocation, Channel = turn protocol)
#[allow(non_snake_case)]
pub mod Core;
#[allow(non_snake_case)]
pub mod Channel;
#[allow(non_snake_case)]
pub mod Gym;
#[allow(non_snake_case)]
pub mod Debug {
    pub mod StructDebug;
}

pub mod config;
pub mod error;
pub mod ffi;

pub use config::InterfaceConfig;
pub use error::{GymError, GymResult};
pub use Channel::Buffer::{ChannelPair, MessageBuffer, MSG_BUFFER_SIZE};
pub use Channel::Structs::{Direction, Handoff, Mode, Role, Side, SlotState, Turn};
pub use Channel::{InterfaceBuilder, MessageInterface};
