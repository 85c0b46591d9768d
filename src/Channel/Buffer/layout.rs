use crossbeam_utils::CachePadded;
use std::sync::atomic::{AtomicU32, AtomicU64};

/// Capacity of one message buffer, per direction per instance.
pub const MSG_BUFFER_SIZE: usize = 1024;

/// Upper bound on instances in vector mode.
pub const MAX_INSTANCES: u32 = 4096;

/// "DMXPGYM1"
pub const MAGIC_NUMBER: u64 = 0x444D_5850_4759_4D31;

/// Bumped whenever any struct in this file changes shape.
pub const LAYOUT_VERSION: u32 = 1;

/// The header located at the very beginning of the shared memory region.
///
/// `magic` is stored last by the creator with release ordering, so an
/// attacher that reads the magic with acquire ordering sees a fully
/// initialized header, channel table and slots.
#[repr(C, align(128))]
pub struct SegmentHeader {
    pub magic: AtomicU64,

    /// Version of the memory layout.
    pub version: u32,

    /// Number of channel pairs (1 in single mode).
    pub channel_count: u32,

    /// `MSG_BUFFER_SIZE` of the creator's build.
    pub buffer_capacity: u32,

    pub creator_pid: u32,

    /// Cooperative termination flag. Non-zero once either side finished.
    pub finished: AtomicU32,

    /// Number of attach operations seen, for diagnostics.
    pub attach_count: AtomicU32,
}

/// Control words for one channel pair.
///
/// Each direction owns one futex-able state word holding a
/// [`SlotState`](crate::Channel::Structs::SlotState) discriminant, and a
/// counter of completed sends. Padded so the two processes do not share a
/// cache line when they poll opposite directions.
#[repr(C, align(128))]
pub struct ChannelEntry {
    /// Stable index of this pair.
    pub instance_index: u32,

    pub flags: u32,

    /// State words, indexed by `Direction as usize`.
    pub state: [CachePadded<AtomicU32>; 2],

    /// Completed sends, indexed by `Direction as usize`.
    pub sequence: [CachePadded<AtomicU64>; 2],
}

/// One message in one direction. The size field precedes the payload.
#[repr(C, align(64))]
pub struct MessageSlot {
    pub size: u32,
    pub _reserved: u32,
    pub payload: [u8; MSG_BUFFER_SIZE],
}

#[inline]
pub const fn align_128(n: usize) -> usize {
    (n + 127) & !127
}

/// Byte offsets of every region in a segment carrying `count` pairs.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct SegmentLayout {
    pub count: u32,
    pub entries_offset: usize,
    pub slots_offset: usize,
    pub total_size: usize,
}

impl SegmentLayout {
    pub fn for_count(count: u32) -> Self {
        let entries_offset = align_128(std::mem::size_of::<SegmentHeader>());
        let slots_offset =
            align_128(entries_offset + count as usize * std::mem::size_of::<ChannelEntry>());
        let total_size = align_128(
            slots_offset + count as usize * 2 * std::mem::size_of::<MessageSlot>(),
        );
        Self {
            count,
            entries_offset,
            slots_offset,
            total_size,
        }
    }

    #[inline]
    pub fn entry_offset(&self, index: u32) -> usize {
        self.entries_offset + index as usize * std::mem::size_of::<ChannelEntry>()
    }

    #[inline]
    pub fn slot_offset(&self, index: u32, direction: usize) -> usize {
        self.slots_offset + (index as usize * 2 + direction) * std::mem::size_of::<MessageSlot>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn regions_do_not_overlap() {
        let layout = SegmentLayout::for_count(4);
        assert!(layout.entries_offset >= std::mem::size_of::<SegmentHeader>());
        assert!(layout.slots_offset >= layout.entry_offset(4));
        assert!(layout.slot_offset(3, 1) + std::mem::size_of::<MessageSlot>() <= layout.total_size);
        assert_eq!(layout.total_size % 128, 0);
    }

    #[test]
    fn slots_are_disjoint_per_instance_and_direction() {
        let layout = SegmentLayout::for_count(2);
        let a = layout.slot_offset(0, 1);
        let b = layout.slot_offset(1, 0);
        assert_eq!(b - a, std::mem::size_of::<MessageSlot>());
    }
}
