use super::*;

/// Read-only accessors for SharedMemoryAllocator
///
/// These expose header fields for debugging, monitoring and tests.
impl SharedMemoryAllocator {
    /// Get a reference to the underlying shared memory backend
    ///
    /// # Safety
    /// The returned reference must not outlive the SharedMemoryAllocator
    pub unsafe fn shm(&self) -> &dyn SharedMemoryBackend {
        &*self.shm
    }

    /// Get the raw pointer to the SegmentHeader
    pub fn header_ptr(&self) -> *const SegmentHeader {
        self.header
    }

    /// Region offsets of this segment
    pub fn layout(&self) -> SegmentLayout {
        self.layout
    }

    /// Pid of the process that created the segment
    pub fn creator_pid(&self) -> u32 {
        unsafe { (*self.header).creator_pid }
    }

    /// How many attach operations the segment has seen
    pub fn attach_count(&self) -> u32 {
        unsafe { (*self.header).attach_count.load(Ordering::Relaxed) }
    }

    /// Check if the allocator is mapped onto an initialized segment
    ///
    /// Returns true if the magic number in the header matches the expected value.
    pub fn is_initialized(&self) -> bool {
        // Safety: We assume the header pointer is valid if the allocator exists
        unsafe {
            !self.header.is_null() && (*self.header).magic.load(Ordering::Acquire) == MAGIC_NUMBER
        }
    }
}
