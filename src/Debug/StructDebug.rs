use std::fmt;

use crate::Channel::Buffer::{ChannelPair, MessageBuffer};
use crate::Channel::MessageInterface;
use crate::Channel::Structs::Direction;
use crate::Core::alloc::{ChannelPartition, SharedMemoryAllocator};

/// Debug function for SharedMemoryAllocator
///
/// Shows the header location, role, instance count and whether the peer
/// side has finished. Never dereferences message payloads.
pub fn debug_shared_memory_allocator(allocator: &SharedMemoryAllocator, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("SharedMemoryAllocator")
        .field("name", &allocator.name())
        .field("role", &allocator.role())
        .field("header", &format_args!("{:p}", allocator.header_ptr()))
        .field("channel_count", &allocator.channel_count())
        .field("bytes", &allocator.layout().total_size)
        .field("creator_pid", &allocator.creator_pid())
        .field("attach_count", &allocator.attach_count())
        .field("initialized", &allocator.is_initialized())
        .field("finished", &allocator.is_finished())
        .finish()
}

/// Debug function for ChannelPartition
pub fn debug_channel_partition(partition: &ChannelPartition, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("ChannelPartition")
        .field("instance_index", &partition.instance_index)
        .field("entry", &format_args!("0x{:x}", partition.entry as usize))
        .field("engine_to_agent", &format_args!("0x{:x}", partition.slots[0] as usize))
        .field("agent_to_engine", &format_args!("0x{:x}", partition.slots[1] as usize))
        .finish()
}

/// Debug function for MessageBuffer
///
/// Safely displays the slot location without reading the payload
pub fn debug_message_buffer(buffer: &MessageBuffer, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("MessageBuffer")
        .field("slot", &format_args!("0x{:x}", buffer.slot as usize))
        .finish_non_exhaustive()
}

/// Debug function for ChannelPair
///
/// Shows both state words and sequence counters as seen right now.
pub fn debug_channel_pair(pair: &ChannelPair, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("ChannelPair")
        .field("side", &pair.side())
        .field("instance_index", &pair.instance_index())
        .field("engine_to_agent", &pair.slot_state(Direction::EngineToAgent))
        .field("agent_to_engine", &pair.slot_state(Direction::AgentToEngine))
        .field("sent_engine_to_agent", &pair.sequence(Direction::EngineToAgent))
        .field("sent_agent_to_engine", &pair.sequence(Direction::AgentToEngine))
        .field("wait_timeout", &pair.wait_timeout)
        .finish_non_exhaustive()
}

pub fn debug_message_interface(interface: &MessageInterface, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("MessageInterface")
        .field("segment", interface.segment())
        .field("side", &interface.side())
        .field("mode", &interface.mode())
        .field("shutdown_requested", &interface.is_shutdown_requested())
        .finish_non_exhaustive()
}

impl fmt::Debug for MessageBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        debug_message_buffer(self, f)
    }
}

impl fmt::Debug for ChannelPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        debug_channel_pair(self, f)
    }
}
