use crate::error::{GymError, GymResult};
use crate::Channel::Buffer::layout::{
    ChannelEntry, MessageSlot, SegmentHeader, SegmentLayout, LAYOUT_VERSION, MAGIC_NUMBER,
    MAX_INSTANCES, MSG_BUFFER_SIZE,
};
use crate::Channel::Structs::{Direction, Role, SlotState};
use crate::Core::futex::futex_wake_all;
use crate::Core::SharedMemory::SharedMemoryBackend;
use crossbeam_utils::CachePadded;
use std::io;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::{Duration, Instant};
mod debug;
mod getters;

const ATTACH_POLL: Duration = Duration::from_millis(10);

/// Raw pointers to one pair's control words and its two message slots.
///
/// Only valid while the owning [`SharedMemoryAllocator`] is alive.
pub struct ChannelPartition {
    pub entry: *const ChannelEntry,
    pub slots: [*mut MessageSlot; 2],
    pub instance_index: u32,
}

/// Owner of one mapped segment: writes (creator) or validates (attacher) the
/// header and hands out per-instance partitions.
pub struct SharedMemoryAllocator {
    shm: Box<dyn SharedMemoryBackend>,
    header: *mut SegmentHeader,
    layout: SegmentLayout,
    role: Role,
}

impl SharedMemoryAllocator {
    /// Create and initialize a segment carrying `count` channel pairs.
    pub fn create(name: &str, count: u32) -> GymResult<Self> {
        if count == 0 || count > MAX_INSTANCES {
            return Err(GymError::Config(format!(
                "instance count must be in 1..={MAX_INSTANCES}, got {count}"
            )));
        }
        let layout = SegmentLayout::for_count(count);

        // --- Create shared memory ---
        let shm = match crate::Core::SharedMemory::create_shared_memory(layout.total_size, name) {
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                if let Some(pid) = Self::live_creator(name) {
                    tracing::error!(segment = name, creator_pid = pid, "segment name in use");
                    return Err(GymError::SegmentCreateFailed {
                        name: name.to_string(),
                        source: io::Error::new(
                            io::ErrorKind::AlreadyExists,
                            format!("segment is owned by live process {pid}"),
                        ),
                    });
                }
                tracing::warn!(segment = name, "replacing stale shared memory segment");
                crate::Core::SharedMemory::unlink_shared_memory(name)
                    .and_then(|_| {
                        crate::Core::SharedMemory::create_shared_memory(layout.total_size, name)
                    })
            }
            other => other,
        }
        .map_err(|e| {
            tracing::error!(
                segment = name,
                bytes = layout.total_size,
                instances = count,
                error = %e,
                "failed to create shared memory segment"
            );
            GymError::SegmentCreateFailed {
                name: name.to_string(),
                source: e,
            }
        })?;

        let header = shm.as_ptr() as *mut SegmentHeader;
        if (header as usize) % 128 != 0 {
            return Err(GymError::LayoutMismatch {
                name: name.to_string(),
                detail: "shared memory not properly aligned".into(),
            });
        }

        // Initialize header (magic published last)
        unsafe {
            std::ptr::write(
                header,
                SegmentHeader {
                    magic: AtomicU64::new(0),
                    version: LAYOUT_VERSION,
                    channel_count: count,
                    buffer_capacity: MSG_BUFFER_SIZE as u32,
                    creator_pid: std::process::id(),
                    finished: AtomicU32::new(0),
                    attach_count: AtomicU32::new(0),
                },
            );

            for index in 0..count {
                let entry = shm.as_ptr().add(layout.entry_offset(index)) as *mut ChannelEntry;
                std::ptr::write(
                    entry,
                    ChannelEntry {
                        instance_index: index,
                        flags: 0,
                        state: [
                            CachePadded::new(AtomicU32::new(SlotState::Empty as u32)),
                            CachePadded::new(AtomicU32::new(SlotState::Empty as u32)),
                        ],
                        sequence: [
                            CachePadded::new(AtomicU64::new(0)),
                            CachePadded::new(AtomicU64::new(0)),
                        ],
                    },
                );
                // Slots are already zeroed by ftruncate: size 0, empty payload.
            }

            (*header).magic.store(MAGIC_NUMBER, Ordering::Release);
        }

        tracing::info!(
            segment = name,
            instances = count,
            bytes = layout.total_size,
            "created shared memory segment"
        );

        Ok(Self {
            shm,
            header,
            layout,
            role: Role::Creator,
        })
    }

    /// Pid of the process still serving an existing segment called `name`.
    ///
    /// `None` when the segment was never initialized or its creator is gone.
    fn live_creator(name: &str) -> Option<u32> {
        let shm = crate::Core::SharedMemory::attach_shared_memory(
            name,
            std::mem::size_of::<SegmentHeader>(),
        )
        .ok()?;
        let header = shm.as_ptr() as *const SegmentHeader;
        let (magic, pid) = unsafe { ((*header).magic.load(Ordering::Acquire), (*header).creator_pid) };
        (magic == MAGIC_NUMBER && process_alive(pid)).then_some(pid)
    }

    /// Attach to a segment created elsewhere.
    ///
    /// `expected_count` must match the creator's instance count when given.
    pub fn attach(name: &str, expected_count: Option<u32>) -> GymResult<Self> {
        let shm = crate::Core::SharedMemory::attach_shared_memory(
            name,
            std::mem::size_of::<SegmentHeader>(),
        )
        .map_err(|e| GymError::SegmentNotFound {
            name: name.to_string(),
            source: e,
        })?;

        let header = shm.as_ptr() as *mut SegmentHeader;
        if (header as usize) % 128 != 0 {
            return Err(GymError::LayoutMismatch {
                name: name.to_string(),
                detail: "shared memory not properly aligned".into(),
            });
        }

        // Verify magic, version, capacity and size
        let mismatch = |detail: String| GymError::LayoutMismatch {
            name: name.to_string(),
            detail,
        };
        let (version, count, capacity) = unsafe {
            let magic = (*header).magic.load(Ordering::Acquire);
            if magic != MAGIC_NUMBER {
                return Err(mismatch(format!(
                    "invalid magic number {magic:#x} - segment not initialized"
                )));
            }
            (
                (*header).version,
                (*header).channel_count,
                (*header).buffer_capacity,
            )
        };

        if version != LAYOUT_VERSION {
            return Err(mismatch(format!(
                "layout version {version}, expected {LAYOUT_VERSION}"
            )));
        }
        if capacity as usize != MSG_BUFFER_SIZE {
            return Err(mismatch(format!(
                "buffer capacity {capacity}, expected {MSG_BUFFER_SIZE}"
            )));
        }
        if count == 0 || count > MAX_INSTANCES {
            return Err(mismatch(format!("invalid instance count {count}")));
        }
        if let Some(expected) = expected_count {
            if expected != count {
                return Err(mismatch(format!(
                    "segment carries {count} instances, expected {expected}"
                )));
            }
        }
        let layout = SegmentLayout::for_count(count);
        if shm.size() < layout.total_size {
            return Err(mismatch(format!(
                "segment is {} bytes, layout needs {}",
                shm.size(),
                layout.total_size
            )));
        }

        unsafe {
            (*header).attach_count.fetch_add(1, Ordering::AcqRel);
        }
        tracing::info!(segment = name, instances = count, "attached to shared memory segment");

        Ok(Self {
            shm,
            header,
            layout,
            role: Role::Attacher,
        })
    }

    /// [`attach`](Self::attach), retrying while the segment is absent or not
    /// yet initialized, for at most `timeout`.
    pub fn attach_with_retry(
        name: &str,
        expected_count: Option<u32>,
        timeout: Option<Duration>,
    ) -> GymResult<Self> {
        let Some(timeout) = timeout else {
            return Self::attach(name, expected_count);
        };
        let start = Instant::now();
        loop {
            match Self::attach(name, expected_count) {
                Ok(alloc) => return Ok(alloc),
                Err(err) if Self::is_transient(&err) && start.elapsed() < timeout => {
                    tracing::trace!(segment = name, "segment not ready, retrying attach");
                    std::thread::sleep(ATTACH_POLL);
                }
                Err(err) => return Err(err),
            }
        }
    }

    fn is_transient(err: &GymError) -> bool {
        match err {
            GymError::SegmentNotFound { source, .. } => {
                matches!(source.kind(), io::ErrorKind::NotFound | io::ErrorKind::InvalidData)
            }
            GymError::LayoutMismatch { detail, .. } => detail.contains("not initialized"),
            _ => false,
        }
    }

    /// Partition for one instance, or `None` if `index` is out of range.
    pub fn partition(&self, index: u32) -> Option<ChannelPartition> {
        if index >= self.layout.count {
            return None;
        }
        let base = self.shm.as_ptr();
        unsafe {
            Some(ChannelPartition {
                entry: base.add(self.layout.entry_offset(index)) as *const ChannelEntry,
                slots: [
                    base.add(self.layout.slot_offset(index, Direction::EngineToAgent as usize))
                        as *mut MessageSlot,
                    base.add(self.layout.slot_offset(index, Direction::AgentToEngine as usize))
                        as *mut MessageSlot,
                ],
                instance_index: index,
            })
        }
    }

    /// Number of channel pairs in the segment
    pub fn channel_count(&self) -> u32 {
        self.layout.count
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn name(&self) -> &str {
        self.shm.name()
    }

    /// Whether either side has set the finished flag.
    pub fn is_finished(&self) -> bool {
        unsafe { (*self.header).finished.load(Ordering::Acquire) != 0 }
    }

    /// Set the finished flag and wake every waiter on every pair.
    ///
    /// Returns `false` if the flag was already set.
    pub fn set_finished(&self) -> bool {
        let first = unsafe { (*self.header).finished.swap(1, Ordering::AcqRel) == 0 };
        for index in 0..self.layout.count {
            if let Some(partition) = self.partition(index) {
                unsafe {
                    for word in (*partition.entry).state.iter() {
                        futex_wake_all(word);
                    }
                }
            }
        }
        if first {
            tracing::info!(segment = self.name(), role = %self.role, "finished flag set");
        }
        first
    }

    /// Reference to the finished word, for waiters.
    pub(crate) fn finished_word(&self) -> &AtomicU32 {
        unsafe { &(*self.header).finished }
    }
}

// Synchronization of the mapped words is done through atomics and the turn protocol
unsafe impl Send for SharedMemoryAllocator {}
unsafe impl Sync for SharedMemoryAllocator {}

#[cfg(unix)]
fn process_alive(pid: u32) -> bool {
    if pid == 0 {
        return false;
    }
    // Signal 0 only probes; EPERM still means the process exists
    unsafe {
        libc::kill(pid as libc::pid_t, 0) == 0
            || io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
    }
}

#[cfg(not(unix))]
fn process_alive(_pid: u32) -> bool {
    true
}
