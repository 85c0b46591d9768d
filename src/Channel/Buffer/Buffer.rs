// One fixed-capacity message slot in shared memory, seen from one process

use super::layout::{MessageSlot, MSG_BUFFER_SIZE};
use crate::error::{GymError, GymResult};
use std::ptr;

/// Bounds-checked view over one [`MessageSlot`].
///
/// This struct is NOT stored in shared memory. It holds a pointer into the
/// mapping and is not synchronized on its own: callers reach it only through
/// a [`ChannelPair`](super::ChannelPair), whose turn protocol guarantees a
/// single accessor at a time.
pub struct MessageBuffer {
    pub(crate) slot: *mut MessageSlot,
}

unsafe impl Send for MessageBuffer {}

impl MessageBuffer {
    /// # Safety
    /// `slot` must point to a live `MessageSlot` for the lifetime of the view.
    pub unsafe fn new(slot: *mut MessageSlot) -> Self {
        Self { slot }
    }

    #[inline]
    pub const fn capacity(&self) -> usize {
        MSG_BUFFER_SIZE
    }

    /// Size field as last committed, unchecked against capacity.
    #[inline]
    pub fn len(&self) -> usize {
        unsafe { ptr::read_volatile(&(*self.slot).size) as usize }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy `bytes` into the slot and set the size.
    ///
    /// An oversize payload is rejected before anything is written, so the
    /// previous size and contents stay intact.
    pub fn commit(&mut self, bytes: &[u8]) -> GymResult<()> {
        self.check_len(bytes.len())?;
        unsafe {
            ptr::copy_nonoverlapping(bytes.as_ptr(), (*self.slot).payload.as_mut_ptr(), bytes.len());
            ptr::write_volatile(&mut (*self.slot).size, bytes.len() as u32);
        }
        Ok(())
    }

    /// Whole payload area, for serializing in place. Follow with [`set_len`](Self::set_len).
    pub fn payload_mut(&mut self) -> &mut [u8; MSG_BUFFER_SIZE] {
        unsafe { &mut (*self.slot).payload }
    }

    pub fn set_len(&mut self, len: usize) -> GymResult<()> {
        self.check_len(len)?;
        unsafe { ptr::write_volatile(&mut (*self.slot).size, len as u32) };
        Ok(())
    }

    /// Committed bytes. A size field larger than capacity means the peer
    /// wrote garbage and is reported instead of read.
    pub fn read(&self) -> GymResult<&[u8]> {
        let len = self.len();
        self.check_len(len)?;
        unsafe { Ok(&(&(*self.slot).payload)[..len]) }
    }

    #[inline]
    fn check_len(&self, len: usize) -> GymResult<()> {
        if len > MSG_BUFFER_SIZE {
            return Err(GymError::Oversize {
                len,
                capacity: MSG_BUFFER_SIZE,
            });
        }
        Ok(())
    }
}
