#![cfg(target_os = "linux")]

mod channel;
mod error;
mod handle;

pub use channel::IpcChannel;
pub use error::{HandleError, IpcError};
pub use handle::Handle;

// Large enough for any request carrying a path up to PATH_MAX bytes, and for
// any response, once serialized.
pub const IPC_MESSAGE_MAX_SIZE: usize = 8192;

pub fn errno() -> libc::c_int {
    unsafe { *(libc::__errno_location()) }
}
