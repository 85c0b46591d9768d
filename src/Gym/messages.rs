//! Messages exchanged between engine and agent, and their wire encoding.
//!
//! Every payload is one schema byte followed by the bincode encoding of the
//! message. A peer built against a different schema is rejected on decode
//! instead of being misread.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::container::DataContainer;
use super::spaces::Space;
use crate::error::{GymError, GymResult};
use crate::Channel::Buffer::{ChannelPair, MessageBuffer, MSG_BUFFER_SIZE};
use crate::Channel::Structs::Handoff;

pub const SCHEMA_VERSION: u8 = 1;

/// Why an episode stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TerminationReason {
    #[default]
    None,
    GameOver,
    SimulationEnd,
}

/// Engine -> agent, first message on a pair.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SimInitMsg {
    pub obs_space: Option<Space>,
    pub act_space: Option<Space>,
}

/// Agent -> engine, reply to [`SimInitMsg`].
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct SimInitAck {
    pub done: bool,
    pub stop_sim_req: bool,
}

/// Engine -> agent, once per step.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct EnvStateMsg {
    pub obs_data: Option<DataContainer>,
    pub reward: f32,
    pub is_game_over: bool,
    pub reason: TerminationReason,
    pub info: String,
}

/// Agent -> engine, reply to [`EnvStateMsg`].
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct EnvActMsg {
    pub act_data: Option<DataContainer>,
    pub stop_sim_req: bool,
}

impl EnvActMsg {
    pub fn action(act_data: DataContainer) -> Self {
        Self {
            act_data: Some(act_data),
            stop_sim_req: false,
        }
    }

    pub fn close() -> Self {
        Self {
            act_data: None,
            stop_sim_req: true,
        }
    }
}

/// Encoded size including the schema byte.
pub fn encoded_len<M: Serialize>(msg: &M) -> GymResult<usize> {
    Ok(1 + bincode::serialized_size(msg)? as usize)
}

pub fn encode<M: Serialize>(msg: &M) -> GymResult<Vec<u8>> {
    let mut out = Vec::with_capacity(encoded_len(msg)?);
    out.push(SCHEMA_VERSION);
    bincode::serialize_into(&mut out, msg)?;
    Ok(out)
}

/// Serialize straight into a message buffer.
pub fn encode_into<M: Serialize>(msg: &M, buf: &mut MessageBuffer) -> GymResult<usize> {
    let len = encoded_len(msg)?;
    if len > buf.capacity() {
        return Err(GymError::Oversize {
            len,
            capacity: buf.capacity(),
        });
    }
    let payload = buf.payload_mut();
    payload[0] = SCHEMA_VERSION;
    let mut cursor = &mut payload[1..len];
    bincode::serialize_into(&mut cursor, msg)?;
    buf.set_len(len)?;
    Ok(len)
}

pub fn decode<M: DeserializeOwned>(bytes: &[u8]) -> GymResult<M> {
    match bytes.split_first() {
        None => Err(GymError::Schema("empty payload".into())),
        Some((&SCHEMA_VERSION, body)) => Ok(bincode::deserialize(body)?),
        Some((&other, _)) => Err(GymError::Schema(format!(
            "payload schema {other}, expected {SCHEMA_VERSION}"
        ))),
    }
}

/// Take the outbound turn, serialize `msg` in place and publish it.
///
/// The encoded size is checked before the turn is taken.
pub fn send_message<M: Serialize>(pair: &mut ChannelPair, msg: &M) -> GymResult<Handoff> {
    let len = encoded_len(msg)?;
    if len > MSG_BUFFER_SIZE {
        return Err(GymError::Oversize {
            len,
            capacity: MSG_BUFFER_SIZE,
        });
    }
    if pair.send_begin()?.is_finished() {
        return Ok(Handoff::Finished);
    }
    encode_into(msg, pair.outbound()?)?;
    pair.send_end()?;
    Ok(Handoff::Granted)
}

/// Wait for the next inbound message and decode it. `None` once finished.
pub fn recv_message<M: DeserializeOwned>(pair: &mut ChannelPair) -> GymResult<Option<M>> {
    if pair.recv_begin()?.is_finished() {
        return Ok(None);
    }
    let decoded = pair.inbound().and_then(decode::<M>);
    pair.recv_end()?;
    decoded.map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Gym::container::BoxData;

    #[test]
    fn schema_byte_leads() {
        let bytes = encode(&SimInitAck {
            done: true,
            stop_sim_req: false,
        })
        .unwrap();
        assert_eq!(bytes[0], SCHEMA_VERSION);
        assert_eq!(bytes.len(), encoded_len(&SimInitAck::default()).unwrap());
    }

    #[test]
    fn wrong_schema_is_rejected() {
        let mut bytes = encode(&EnvActMsg::close()).unwrap();
        bytes[0] = SCHEMA_VERSION + 1;
        assert!(matches!(decode::<EnvActMsg>(&bytes), Err(GymError::Schema(_))));
        assert!(matches!(decode::<EnvActMsg>(&[]), Err(GymError::Schema(_))));
    }

    #[test]
    fn truncated_body_is_codec_error() {
        let msg = EnvStateMsg {
            obs_data: Some(DataContainer::vector(vec![1.0f64, 2.0, 3.0])),
            reward: 1.5,
            is_game_over: false,
            reason: TerminationReason::None,
            info: "step".into(),
        };
        let bytes = encode(&msg).unwrap();
        assert_eq!(decode::<EnvStateMsg>(&bytes).unwrap(), msg);
        assert!(matches!(
            decode::<EnvStateMsg>(&bytes[..bytes.len() - 3]),
            Err(GymError::Codec(_))
        ));
    }

    #[test]
    fn oversize_state_fails_before_encoding() {
        let msg = EnvStateMsg {
            obs_data: Some(DataContainer::Box {
                shape: vec![512],
                data: BoxData::Double(vec![0.0; 512]),
            }),
            ..Default::default()
        };
        let len = encoded_len(&msg).unwrap();
        assert!(len > MSG_BUFFER_SIZE);
    }
}
