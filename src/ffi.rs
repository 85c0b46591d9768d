use crate::config::InterfaceConfig;
use crate::error::GymError;
use crate::Channel::Buffer::MSG_BUFFER_SIZE;
use crate::Channel::Structs::{Mode, Role, Side};
use crate::Channel::MessageInterface;
use std::ffi::{c_char, CStr};
use std::ptr;
use std::time::Duration;

// Error codes
const DMXP_SUCCESS: i32 = 0;
const DMXP_ERROR_NULL_POINTER: i32 = -1;
const DMXP_ERROR_INVALID_ARG: i32 = -2;
const DMXP_ERROR_SEGMENT: i32 = -3;
const DMXP_ERROR_FINISHED: i32 = -4;
const DMXP_ERROR_OVERSIZE: i32 = -5;
const DMXP_ERROR_INTERNAL: i32 = -6;
const DMXP_ERROR_TIMEOUT: i32 = -7;
const DMXP_ERROR_PROTOCOL: i32 = -8;

/// Handle to a message interface (opaque pointer)
pub struct GymInterfaceHandle {
    inner: MessageInterface,
}

fn status_of(err: &GymError) -> i32 {
    match err {
        GymError::Oversize { .. } => DMXP_ERROR_OVERSIZE,
        GymError::PeerTimeout { .. } => DMXP_ERROR_TIMEOUT,
        GymError::ProtocolViolation { .. } => DMXP_ERROR_PROTOCOL,
        GymError::IndexOutOfRange { .. } | GymError::InstanceInUse(_) | GymError::Config(_) => {
            DMXP_ERROR_INVALID_ARG
        }
        GymError::SegmentNotFound { .. }
        | GymError::SegmentCreateFailed { .. }
        | GymError::LayoutMismatch { .. } => DMXP_ERROR_SEGMENT,
        _ => DMXP_ERROR_INTERNAL,
    }
}

/// Create or attach a message interface.
///
/// # Arguments
/// * `name` - NUL-terminated segment name.
/// * `is_creator` - Create (and later unlink) the segment instead of attaching.
/// * `is_agent` - Which side this process plays.
/// * `count` - Number of instances; 0 selects single mode.
/// * `wait_timeout_ms` - Deadline for each blocking call, 0 for none.
///
/// # Returns
/// * Pointer to `GymInterfaceHandle`, or NULL on failure.
#[no_mangle]
pub extern "C" fn dmxp_gym_interface_new(
    name: *const c_char,
    is_creator: bool,
    is_agent: bool,
    count: u32,
    wait_timeout_ms: u64,
) -> *mut GymInterfaceHandle {
    if name.is_null() {
        return ptr::null_mut();
    }
    let name = match unsafe { CStr::from_ptr(name) }.to_str() {
        Ok(name) => name.to_owned(),
        Err(e) => {
            tracing::error!("FFI Error: segment name is not UTF-8: {}", e);
            return ptr::null_mut();
        }
    };

    let config = InterfaceConfig {
        segment_name: name,
        role: if is_creator { Role::Creator } else { Role::Attacher },
        side: if is_agent { Side::Agent } else { Side::Engine },
        mode: if count == 0 { Mode::Single } else { Mode::Vector(count) },
        wait_timeout: (wait_timeout_ms > 0).then(|| Duration::from_millis(wait_timeout_ms)),
        ..Default::default()
    };

    match MessageInterface::open(config) {
        Ok(interface) => Box::into_raw(Box::new(GymInterfaceHandle { inner: interface })),
        Err(e) => {
            tracing::error!("FFI Error: Failed to open interface: {}", e);
            ptr::null_mut()
        }
    }
}

/// Send one message on instance `index`. Blocks until it is this side's turn.
///
/// # Returns
/// * 0 on success, `DMXP_ERROR_FINISHED` once the interface finished,
///   negative error code otherwise.
#[no_mangle]
pub extern "C" fn dmxp_gym_send(
    handle: *mut GymInterfaceHandle,
    index: u32,
    data: *const u8,
    len: usize,
) -> i32 {
    if handle.is_null() || (data.is_null() && len > 0) {
        return DMXP_ERROR_NULL_POINTER;
    }
    let interface = unsafe { &(*handle).inner };
    let slice = if len == 0 {
        &[][..]
    } else {
        unsafe { std::slice::from_raw_parts(data, len) }
    };

    let result = interface
        .get_interface(index)
        .and_then(|mut pair| pair.send(slice));
    match result {
        Ok(handoff) if handoff.is_finished() => DMXP_ERROR_FINISHED,
        Ok(_) => DMXP_SUCCESS,
        Err(e) => {
            tracing::error!("FFI Error: send on instance {} failed: {}", index, e);
            status_of(&e)
        }
    }
}

/// Receive one message on instance `index`. Blocks until the peer has sent.
///
/// # Arguments
/// * `out_buf` - Buffer to write message into.
/// * `out_len` - Input: size of buf, Output: size of message received.
///
/// # Returns
/// * 0 on success.
/// * `DMXP_ERROR_INVALID_ARG` if the buffer is smaller than the buffer
///   capacity; `*out_len` is set to the required size and nothing is consumed.
/// * `DMXP_ERROR_FINISHED` once the interface finished.
#[no_mangle]
pub extern "C" fn dmxp_gym_recv(
    handle: *mut GymInterfaceHandle,
    index: u32,
    out_buf: *mut u8,
    out_len: *mut usize,
) -> i32 {
    if handle.is_null() || out_buf.is_null() || out_len.is_null() {
        return DMXP_ERROR_NULL_POINTER;
    }
    let interface = unsafe { &(*handle).inner };
    let max_len = unsafe { *out_len };
    if max_len < MSG_BUFFER_SIZE {
        unsafe { *out_len = MSG_BUFFER_SIZE };
        return DMXP_ERROR_INVALID_ARG; // Buffer too small
    }

    let result = interface.get_interface(index).and_then(|mut pair| pair.recv());
    match result {
        Ok(Some(data)) => {
            unsafe {
                ptr::copy_nonoverlapping(data.as_ptr(), out_buf, data.len());
                *out_len = data.len();
            }
            DMXP_SUCCESS
        }
        Ok(None) => DMXP_ERROR_FINISHED,
        Err(e) => {
            tracing::error!("FFI Error: recv on instance {} failed: {}", index, e);
            status_of(&e)
        }
    }
}

/// Set the shared finished flag.
#[no_mangle]
pub extern "C" fn dmxp_gym_finish(handle: *mut GymInterfaceHandle) -> i32 {
    if handle.is_null() {
        return DMXP_ERROR_NULL_POINTER;
    }
    unsafe { (*handle).inner.finish() };
    DMXP_SUCCESS
}

/// 1 if finished, 0 if not, negative on error.
#[no_mangle]
pub extern "C" fn dmxp_gym_is_finished(handle: *const GymInterfaceHandle) -> i32 {
    if handle.is_null() {
        return DMXP_ERROR_NULL_POINTER;
    }
    i32::from(unsafe { (*handle).inner.is_finished() })
}

/// Capacity of one message buffer in bytes.
#[no_mangle]
pub extern "C" fn dmxp_gym_buffer_capacity() -> usize {
    MSG_BUFFER_SIZE
}

/// Free an interface handle. Finishes the interface and, for the creator,
/// unlinks the segment.
#[no_mangle]
pub extern "C" fn dmxp_gym_interface_free(handle: *mut GymInterfaceHandle) {
    if !handle.is_null() {
        unsafe {
            let _ = Box::from_raw(handle); // Dropped automatically
        }
    }
}
