// Plain value types shared by the channel layer and its callers

use serde::{Deserialize, Serialize};
use std::fmt;

/// Which process a handle belongs to. Decides which buffer of a pair is outbound.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    /// The simulation process.
    Engine,
    /// The decision-making process.
    Agent,
}

impl Side {
    pub fn peer(self) -> Side {
        match self {
            Side::Engine => Side::Agent,
            Side::Agent => Side::Engine,
        }
    }

    /// Direction this side writes.
    pub fn outbound(self) -> Direction {
        match self {
            Side::Engine => Direction::EngineToAgent,
            Side::Agent => Direction::AgentToEngine,
        }
    }

    /// Direction this side reads.
    pub fn inbound(self) -> Direction {
        self.peer().outbound()
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Engine => f.write_str("engine"),
            Side::Agent => f.write_str("agent"),
        }
    }
}

/// Segment ownership. Independent of [`Side`]: either process may create.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    /// Allocates, initializes and finally unlinks the segment.
    Creator,
    /// Maps an existing segment. Never unlinks it.
    Attacher,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Creator => f.write_str("creator"),
            Role::Attacher => f.write_str("attacher"),
        }
    }
}

/// Number of channel pairs carried by one interface.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Mode {
    Single,
    Vector(u32),
}

impl Mode {
    pub fn count(self) -> u32 {
        match self {
            Mode::Single => 1,
            Mode::Vector(count) => count,
        }
    }
}

/// One of the two buffers in a pair. The discriminant is the slot index within the pair.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(u32)]
pub enum Direction {
    EngineToAgent = 0,
    AgentToEngine = 1,
}

impl Direction {
    pub fn writer(self) -> Side {
        match self {
            Direction::EngineToAgent => Side::Engine,
            Direction::AgentToEngine => Side::Agent,
        }
    }

    pub fn reader(self) -> Side {
        self.writer().peer()
    }
}

/// Value of a direction's state word in shared memory.
///
/// Cycles strictly `Empty -> Writing -> Full -> Reading -> Empty`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(u32)]
pub enum SlotState {
    Empty = 0,
    Writing = 1,
    Full = 2,
    Reading = 3,
}

impl SlotState {
    pub fn from_raw(raw: u32) -> Option<SlotState> {
        match raw {
            0 => Some(SlotState::Empty),
            1 => Some(SlotState::Writing),
            2 => Some(SlotState::Full),
            3 => Some(SlotState::Reading),
            _ => None,
        }
    }
}

/// Whose turn it is on one buffer.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Turn {
    EngineTurn,
    AgentTurn,
}

impl Turn {
    pub fn of(direction: Direction, state: SlotState) -> Turn {
        let holder = match state {
            SlotState::Empty | SlotState::Writing => direction.writer(),
            SlotState::Full | SlotState::Reading => direction.reader(),
        };
        match holder {
            Side::Engine => Turn::EngineTurn,
            Side::Agent => Turn::AgentTurn,
        }
    }
}

/// Result of a blocking begin call.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[must_use]
pub enum Handoff {
    /// The caller now owns the buffer.
    Granted,
    /// The finished flag is set; nothing was acquired.
    Finished,
}

impl Handoff {
    pub fn is_finished(self) -> bool {
        matches!(self, Handoff::Finished)
    }
}
