//! Configuration for opening a [`MessageInterface`](crate::Channel::MessageInterface)

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{GymError, GymResult};
use crate::Channel::Structs::{Mode, Role, Side};

pub const ENV_SEGMENT: &str = "DMXP_GYM_SEGMENT";
pub const ENV_VECTOR: &str = "DMXP_GYM_VECTOR";
pub const ENV_WAIT_TIMEOUT_MS: &str = "DMXP_GYM_WAIT_TIMEOUT_MS";
pub const ENV_ATTACH_TIMEOUT_MS: &str = "DMXP_GYM_ATTACH_TIMEOUT_MS";

pub const DEFAULT_SEGMENT_NAME: &str = "dmxp_gym";

/// Everything needed to create or attach an interface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterfaceConfig {
    /// Name under /dev/shm. Must match between creator and attacher.
    pub segment_name: String,

    pub role: Role,

    pub side: Side,

    pub mode: Mode,

    /// Set the shared finished flag when this interface is dropped normally.
    pub handle_finish: bool,

    /// Deadline for a single blocking begin call (None = wait forever)
    pub wait_timeout: Option<Duration>,

    /// How long an attacher keeps retrying while the segment is absent (None = no retry)
    pub attach_timeout: Option<Duration>,
}

impl Default for InterfaceConfig {
    fn default() -> Self {
        Self {
            segment_name: DEFAULT_SEGMENT_NAME.to_string(),
            role: Role::Creator,
            side: Side::Engine,
            mode: Mode::Single,
            handle_finish: true,
            wait_timeout: None,
            attach_timeout: None,
        }
    }
}

impl InterfaceConfig {
    pub fn new(segment_name: impl Into<String>, role: Role, side: Side) -> Self {
        Self {
            segment_name: segment_name.into(),
            role,
            side,
            ..Default::default()
        }
    }

    /// Apply overrides from the process environment.
    ///
    /// `DMXP_GYM_VECTOR=0` or unset keeps the current mode; `N > 0` selects
    /// vector mode with N instances. Timeouts are in milliseconds, `0` disables.
    pub fn from_env(mut self) -> GymResult<Self> {
        if let Ok(name) = std::env::var(ENV_SEGMENT) {
            if !name.is_empty() {
                self.segment_name = name;
            }
        }
        if let Some(count) = parse_env_u64(ENV_VECTOR)? {
            if count > 0 {
                self.mode = Mode::Vector(u32::try_from(count).map_err(|_| {
                    GymError::Config(format!("{ENV_VECTOR}={count} does not fit u32"))
                })?);
            }
        }
        if let Some(ms) = parse_env_u64(ENV_WAIT_TIMEOUT_MS)? {
            self.wait_timeout = (ms > 0).then(|| Duration::from_millis(ms));
        }
        if let Some(ms) = parse_env_u64(ENV_ATTACH_TIMEOUT_MS)? {
            self.attach_timeout = (ms > 0).then(|| Duration::from_millis(ms));
        }
        Ok(self)
    }

    pub fn validate(&self) -> GymResult<()> {
        if self.segment_name.is_empty() {
            return Err(GymError::Config("segment name must not be empty".into()));
        }
        if self.segment_name.trim_start_matches('/').contains('/') {
            return Err(GymError::Config(format!(
                "segment name '{}' must not contain '/'",
                self.segment_name
            )));
        }
        if self.mode.count() == 0 {
            return Err(GymError::Config("vector mode needs at least one instance".into()));
        }
        Ok(())
    }

    pub fn count(&self) -> u32 {
        self.mode.count()
    }
}

fn parse_env_u64(key: &str) -> GymResult<Option<u64>> {
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<u64>()
            .map(Some)
            .map_err(|e| GymError::Config(format!("{key}={raw:?}: {e}"))),
        Err(_) => Ok(None),
    }
}
