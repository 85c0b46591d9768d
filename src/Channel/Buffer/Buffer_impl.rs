use std::sync::atomic::Ordering::{AcqRel, Acquire};
use std::sync::atomic::AtomicU32;
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::layout::ChannelEntry;
use super::Buffer::MessageBuffer;
use crate::error::{GymError, GymResult};
use crate::Channel::Structs::{Direction, Handoff, Side, SlotState, Turn};
use crate::Core::alloc::{ChannelPartition, SharedMemoryAllocator};
use crate::Core::futex::{futex_wait, futex_wake_all};

/// Longest single futex sleep. Bounds how late a missed wake-up, the
/// finished flag or a deadline can be noticed.
const WAIT_SLICE: Duration = Duration::from_millis(50);

/// One logical engine<->agent link: two message buffers plus their state words.
///
/// ### Protocol
/// Each direction cycles `Empty -> Writing -> Full -> Reading -> Empty`.
/// - The writer waits for `Empty` in `send_begin`, fills the buffer, and
///   publishes `Full` with release ordering in `send_end`.
/// - The reader waits for `Full` (acquire) in `recv_begin`, reads, and hands
///   the buffer back with `Empty` in `recv_end`.
///
/// Message N+1 in a direction can therefore never be observed before message
/// N has been committed and released.
pub struct ChannelPair {
    pub(crate) entry: *const ChannelEntry,
    pub(crate) outbound: MessageBuffer,
    pub(crate) inbound: MessageBuffer,
    pub(crate) side: Side,
    pub(crate) instance_index: u32,
    pub(crate) wait_timeout: Option<Duration>,
    sending: bool,
    receiving: bool,
    segment: Arc<SharedMemoryAllocator>,
}

unsafe impl Send for ChannelPair {}

impl ChannelPair {
    pub(crate) fn new(
        segment: Arc<SharedMemoryAllocator>,
        partition: ChannelPartition,
        side: Side,
        wait_timeout: Option<Duration>,
    ) -> Self {
        let out = side.outbound() as usize;
        let inb = side.inbound() as usize;
        unsafe {
            Self {
                entry: partition.entry,
                outbound: MessageBuffer::new(partition.slots[out]),
                inbound: MessageBuffer::new(partition.slots[inb]),
                side,
                instance_index: partition.instance_index,
                wait_timeout,
                sending: false,
                receiving: false,
                segment,
            }
        }
    }

    pub fn instance_index(&self) -> u32 {
        self.instance_index
    }

    pub fn side(&self) -> Side {
        self.side
    }

    pub fn set_wait_timeout(&mut self, timeout: Option<Duration>) {
        self.wait_timeout = timeout;
    }

    /// Wait for this side's turn on the outbound buffer and take it.
    pub fn send_begin(&mut self) -> GymResult<Handoff> {
        if self.sending {
            return Err(self.violation("send_begin", "called twice without send_end".into()));
        }
        let dir = self.side.outbound();
        if self.wait_for(dir, SlotState::Empty, "send_begin")?.is_finished() {
            return Ok(Handoff::Finished);
        }
        self.transition(dir, SlotState::Empty, SlotState::Writing, "send_begin")?;
        self.sending = true;
        Ok(Handoff::Granted)
    }

    /// Outbound buffer, writable between `send_begin` and `send_end`.
    pub fn outbound(&mut self) -> GymResult<&mut MessageBuffer> {
        if !self.sending {
            return Err(self.violation("outbound", "accessed outside send_begin/send_end".into()));
        }
        Ok(&mut self.outbound)
    }

    /// Publish the outbound buffer and hand the turn to the peer.
    pub fn send_end(&mut self) -> GymResult<()> {
        if !self.sending {
            return Err(self.violation("send_end", "called without send_begin".into()));
        }
        let dir = self.side.outbound();
        self.transition(dir, SlotState::Writing, SlotState::Full, "send_end")?;
        self.sending = false;
        let seq = self.entry().sequence[dir as usize].fetch_add(1, AcqRel) + 1;
        futex_wake_all(self.state_word(dir));
        tracing::trace!(
            side = %self.side,
            instance = self.instance_index,
            seq,
            len = self.outbound.len(),
            "message sent"
        );
        Ok(())
    }

    /// Wait until the peer has published the inbound buffer and take it.
    pub fn recv_begin(&mut self) -> GymResult<Handoff> {
        if self.receiving {
            return Err(self.violation("recv_begin", "called twice without recv_end".into()));
        }
        let dir = self.side.inbound();
        if self.wait_for(dir, SlotState::Full, "recv_begin")?.is_finished() {
            return Ok(Handoff::Finished);
        }
        self.transition(dir, SlotState::Full, SlotState::Reading, "recv_begin")?;
        self.receiving = true;
        Ok(Handoff::Granted)
    }

    /// Inbound bytes, readable between `recv_begin` and `recv_end`.
    pub fn inbound(&self) -> GymResult<&[u8]> {
        if !self.receiving {
            return Err(self.violation("inbound", "accessed outside recv_begin/recv_end".into()));
        }
        self.inbound.read()
    }

    /// Release the inbound buffer back to the peer.
    pub fn recv_end(&mut self) -> GymResult<()> {
        if !self.receiving {
            return Err(self.violation("recv_end", "called without recv_begin".into()));
        }
        let dir = self.side.inbound();
        self.transition(dir, SlotState::Reading, SlotState::Empty, "recv_end")?;
        self.receiving = false;
        futex_wake_all(self.state_word(dir));
        Ok(())
    }

    /// `send_begin`, commit, `send_end` in one call.
    ///
    /// The size is checked before the turn is taken, so an oversize payload
    /// leaves both the shared state and the buffer untouched.
    pub fn send(&mut self, bytes: &[u8]) -> GymResult<Handoff> {
        if bytes.len() > self.outbound.capacity() {
            return Err(GymError::Oversize {
                len: bytes.len(),
                capacity: self.outbound.capacity(),
            });
        }
        if self.send_begin()?.is_finished() {
            return Ok(Handoff::Finished);
        }
        self.outbound.commit(bytes)?;
        self.send_end()?;
        Ok(Handoff::Granted)
    }

    /// `recv_begin`, copy, `recv_end` in one call. `None` once finished.
    pub fn recv(&mut self) -> GymResult<Option<Vec<u8>>> {
        if self.recv_begin()?.is_finished() {
            return Ok(None);
        }
        let data = self.inbound()?.to_vec();
        self.recv_end()?;
        Ok(Some(data))
    }

    /// Current turn on one direction of this pair.
    pub fn turn(&self, direction: Direction) -> Turn {
        Turn::of(direction, self.slot_state(direction))
    }

    pub fn slot_state(&self, direction: Direction) -> SlotState {
        let raw = self.state_word(direction).load(Acquire);
        // Unknown values only come from a corrupted segment; report them as Writing
        // so neither side proceeds.
        SlotState::from_raw(raw).unwrap_or(SlotState::Writing)
    }

    /// Completed sends in one direction.
    pub fn sequence(&self, direction: Direction) -> u64 {
        self.entry().sequence[direction as usize].load(Acquire)
    }

    pub fn is_finished(&self) -> bool {
        self.segment.is_finished()
    }

    #[inline]
    fn entry(&self) -> &ChannelEntry {
        unsafe { &*self.entry }
    }

    #[inline]
    fn state_word(&self, direction: Direction) -> &AtomicU32 {
        &self.entry().state[direction as usize]
    }

    /// Block until `direction` holds `want`, the finished flag is raised, or
    /// the deadline passes.
    fn wait_for(&self, direction: Direction, want: SlotState, op: &'static str) -> GymResult<Handoff> {
        let word = self.state_word(direction);
        let start = Instant::now();
        loop {
            if self.segment.finished_word().load(Acquire) != 0 {
                tracing::debug!(side = %self.side, instance = self.instance_index, op, "finished flag observed");
                return Ok(Handoff::Finished);
            }
            let current = word.load(Acquire);
            if current == want as u32 {
                return Ok(Handoff::Granted);
            }
            let slice = match self.wait_timeout {
                Some(limit) => {
                    let waited = start.elapsed();
                    if waited >= limit {
                        tracing::warn!(side = %self.side, instance = self.instance_index, op, ?waited, "peer timeout");
                        return Err(GymError::PeerTimeout {
                            side: self.side,
                            instance: self.instance_index,
                            op,
                            waited,
                        });
                    }
                    (limit - waited).min(WAIT_SLICE)
                }
                None => WAIT_SLICE,
            };
            futex_wait(word, current, Some(slice));
        }
    }

    fn transition(
        &self,
        direction: Direction,
        from: SlotState,
        to: SlotState,
        op: &'static str,
    ) -> GymResult<()> {
        self.state_word(direction)
            .compare_exchange(from as u32, to as u32, AcqRel, Acquire)
            .map(|_| ())
            .map_err(|actual| {
                self.violation(
                    op,
                    format!(
                        "expected {:?} on {:?}, found {:?}",
                        from,
                        direction,
                        SlotState::from_raw(actual)
                    ),
                )
            })
    }

    fn violation(&self, op: &'static str, detail: String) -> GymError {
        tracing::error!(side = %self.side, instance = self.instance_index, op, %detail, "protocol violation");
        GymError::ProtocolViolation {
            side: self.side,
            instance: self.instance_index,
            op,
            detail,
        }
    }
}
