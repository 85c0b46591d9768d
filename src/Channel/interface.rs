use parking_lot::{Mutex, MutexGuard};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::Buffer::ChannelPair;
use super::Structs::{Mode, Role, Side};
use crate::config::InterfaceConfig;
use crate::error::{GymError, GymResult};
use crate::Core::alloc::SharedMemoryAllocator;

/// Owner of one shared memory segment and every [`ChannelPair`] in it.
///
/// In single mode there is exactly one pair at index 0. In vector mode the
/// pairs are addressed by a zero-based instance index. Each pair sits behind
/// its own mutex, so different instances can be driven from different threads.
pub struct MessageInterface {
    segment: Arc<SharedMemoryAllocator>,
    pairs: Vec<Mutex<ChannelPair>>,
    bound: Vec<AtomicBool>,
    config: InterfaceConfig,
    shutdown_requested: AtomicBool,
}

impl MessageInterface {
    /// Create or attach the segment described by `config`.
    pub fn open(config: InterfaceConfig) -> GymResult<Self> {
        config.validate()?;
        let count = config.count();
        let segment = match config.role {
            Role::Creator => SharedMemoryAllocator::create(&config.segment_name, count)?,
            Role::Attacher => SharedMemoryAllocator::attach_with_retry(
                &config.segment_name,
                Some(count),
                config.attach_timeout,
            )?,
        };
        let segment = Arc::new(segment);

        let mut pairs = Vec::with_capacity(count as usize);
        let mut bound = Vec::with_capacity(count as usize);
        for index in 0..count {
            let partition = segment
                .partition(index)
                .ok_or(GymError::IndexOutOfRange { index, count })?;
            pairs.push(Mutex::new(ChannelPair::new(
                Arc::clone(&segment),
                partition,
                config.side,
                config.wait_timeout,
            )));
            bound.push(AtomicBool::new(false));
        }

        tracing::info!(
            segment = %config.segment_name,
            role = %config.role,
            side = %config.side,
            instances = count,
            "message interface ready"
        );

        Ok(Self {
            segment,
            pairs,
            bound,
            config,
            shutdown_requested: AtomicBool::new(false),
        })
    }

    /// Lock the pair at `index`.
    pub fn get_interface(&self, index: u32) -> GymResult<MutexGuard<'_, ChannelPair>> {
        self.pairs
            .get(index as usize)
            .map(|pair| pair.lock())
            .ok_or(GymError::IndexOutOfRange {
                index,
                count: self.count(),
            })
    }

    /// Reserve `index` for a single adapter.
    pub fn bind(&self, index: u32) -> GymResult<()> {
        let slot = self.bound.get(index as usize).ok_or(GymError::IndexOutOfRange {
            index,
            count: self.count(),
        })?;
        slot.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(|_| GymError::InstanceInUse(index))
    }

    pub fn release(&self, index: u32) {
        if let Some(slot) = self.bound.get(index as usize) {
            slot.store(false, Ordering::Release);
        }
    }

    /// Lowest instance index not yet bound, reserved for the caller.
    pub fn bind_next(&self) -> GymResult<u32> {
        for index in 0..self.count() {
            if self.bind(index).is_ok() {
                return Ok(index);
            }
        }
        Err(GymError::IndexOutOfRange {
            index: self.count(),
            count: self.count(),
        })
    }

    pub fn is_bound(&self, index: u32) -> bool {
        self.bound
            .get(index as usize)
            .is_some_and(|b| b.load(Ordering::Acquire))
    }

    /// Set the shared finished flag. Both processes observe it on their next
    /// (or current) wait.
    pub fn finish(&self) {
        self.segment.set_finished();
    }

    pub fn is_finished(&self) -> bool {
        self.segment.is_finished()
    }

    /// Local stop request, raised when the peer asks the simulation to stop.
    pub fn request_shutdown(&self) {
        if !self.shutdown_requested.swap(true, Ordering::AcqRel) {
            tracing::info!(side = %self.config.side, "shutdown requested");
        }
    }

    pub fn is_shutdown_requested(&self) -> bool {
        self.shutdown_requested.load(Ordering::Acquire)
    }

    pub fn count(&self) -> u32 {
        self.pairs.len() as u32
    }

    pub fn mode(&self) -> Mode {
        self.config.mode
    }

    pub fn role(&self) -> Role {
        self.config.role
    }

    pub fn side(&self) -> Side {
        self.config.side
    }

    pub fn segment_name(&self) -> &str {
        &self.config.segment_name
    }

    pub fn config(&self) -> &InterfaceConfig {
        &self.config
    }

    pub(crate) fn segment(&self) -> &SharedMemoryAllocator {
        &self.segment
    }
}

impl Drop for MessageInterface {
    fn drop(&mut self) {
        if self.config.handle_finish && !std::thread::panicking() {
            self.finish();
        }
        tracing::debug!(segment = %self.config.segment_name, role = %self.config.role, "message interface closed");
    }
}

impl std::fmt::Debug for MessageInterface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        crate::Debug::StructDebug::debug_message_interface(self, f)
    }
}
