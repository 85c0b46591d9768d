//! Gym-style environment loop on top of the channel layer.

pub mod adapter;
pub mod agent;
pub mod container;
pub mod messages;
pub mod session;
pub mod spaces;

pub use adapter::{AdapterState, EnvAdapter, GymEnv, StepDriver, StepOutcome, Trigger};
pub use agent::{AgentEnv, StepResult};
pub use container::{BoxData, DataContainer};
pub use messages::{EnvActMsg, EnvStateMsg, SimInitAck, SimInitMsg, TerminationReason, SCHEMA_VERSION};
pub use session::Session;
pub use spaces::{Dtype, Space};
