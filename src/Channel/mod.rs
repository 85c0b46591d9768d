mod builder;
mod interface;

pub use builder::InterfaceBuilder;
pub use interface::MessageInterface;

pub mod Buffer {
    pub mod Buffer;
    pub mod Buffer_impl;
    pub mod layout;
    pub use Buffer::MessageBuffer; // re-export for stable path
    pub use Buffer_impl::ChannelPair;
    pub use layout::MSG_BUFFER_SIZE;
}

pub mod Structs {
    pub mod Buffer_Structs;
    pub use Buffer_Structs::{Direction, Handoff, Mode, Role, Side, SlotState, Turn}; // re-export for stable path
}
