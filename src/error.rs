// Error taxonomy for the message interface and the environment loop

use std::io;
use std::time::Duration;

use thiserror::Error;

use crate::Channel::Structs::Side;

/// Result alias used across the crate.
pub type GymResult<T> = Result<T, GymError>;

/// Every failure the interface can report.
///
/// Peer-initiated shutdown is not an error: it is reported through
/// `Handoff::Finished` and `StepOutcome::StopRequested`.
#[derive(Debug, Error)]
pub enum GymError {
    /// Payload does not fit the fixed message buffer.
    #[error("payload of {len} bytes exceeds buffer capacity of {capacity} bytes")]
    Oversize { len: usize, capacity: usize },

    /// A begin/end call was made out of turn. The two processes have desynchronized.
    #[error("protocol violation on {side} side, instance {instance}: {op} {detail}")]
    ProtocolViolation {
        side: Side,
        instance: u32,
        op: &'static str,
        detail: String,
    },

    /// Attacher could not find the named segment.
    #[error("shared memory segment '{name}' not found: {source}")]
    SegmentNotFound {
        name: String,
        #[source]
        source: io::Error,
    },

    /// Creator could not allocate or map the named segment.
    #[error("failed to create shared memory segment '{name}': {source}")]
    SegmentCreateFailed {
        name: String,
        #[source]
        source: io::Error,
    },

    /// The mapped segment does not have the layout this build expects.
    #[error("shared memory segment '{name}' layout mismatch: {detail}")]
    LayoutMismatch { name: String, detail: String },

    /// A blocking wait exceeded the configured deadline.
    #[error("{side} side, instance {instance}: no peer activity for {waited:?} during {op}")]
    PeerTimeout {
        side: Side,
        instance: u32,
        op: &'static str,
        waited: Duration,
    },

    #[error("instance index {index} out of range (configured count: {count})")]
    IndexOutOfRange { index: u32, count: u32 },

    #[error("instance {0} is already bound to another environment")]
    InstanceInUse(u32),

    /// Payload schema version or shape does not match.
    #[error("schema error: {0}")]
    Schema(String),

    #[error("codec error: {0}")]
    Codec(#[from] bincode::Error),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl GymError {
    /// Programmer and resource errors that must stop the process.
    ///
    /// `PeerTimeout`, schema and I/O errors are left to the caller, which
    /// usually answers them with an orderly shutdown.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            GymError::Oversize { .. }
                | GymError::ProtocolViolation { .. }
                | GymError::SegmentNotFound { .. }
                | GymError::SegmentCreateFailed { .. }
                | GymError::LayoutMismatch { .. }
                | GymError::IndexOutOfRange { .. }
                | GymError::InstanceInUse(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fatal_classification() {
        assert!(GymError::Oversize { len: 2000, capacity: 1024 }.is_fatal());
        assert!(GymError::IndexOutOfRange { index: 4, count: 4 }.is_fatal());
        assert!(!GymError::Schema("bad".into()).is_fatal());
        assert!(!GymError::PeerTimeout {
            side: Side::Engine,
            instance: 0,
            op: "recv_begin",
            waited: Duration::from_millis(10),
        }
        .is_fatal());
    }

    #[test]
    fn messages_name_side_and_instance() {
        let err = GymError::ProtocolViolation {
            side: Side::Agent,
            instance: 3,
            op: "send_end",
            detail: "without send_begin".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("agent"));
        assert!(msg.contains("instance 3"));
    }
}
