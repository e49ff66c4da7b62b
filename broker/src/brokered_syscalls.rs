use libc::{c_int, O_CLOEXEC};
use std::ffi::CString;
use warden_ipc::{errno, Handle};
use warden_ipc_messages::BrokerResponse;

// Only called on requests already validated against the policy, so that
// paths have no null byte and flags cannot create files.

pub(crate) fn proxied_open(path: &[u8], flags: c_int) -> (BrokerResponse, Option<Handle>) {
    let path = match CString::new(path) {
        Ok(p) => p,
        Err(_) => return (BrokerResponse::from_errno(libc::EINVAL), None),
    };
    // Our own copy never leaks into processes we might execute. The client
    // chooses whether its copy is close-on-exec when receiving it.
    let res = unsafe { libc::open(path.as_ptr(), flags | O_CLOEXEC) };
    if res < 0 {
        // Returning here is safe and won't leak any file descriptor, open() did not
        // open one if it returned a negative error code
        return (BrokerResponse::from_errno(errno()), None);
    }
    match unsafe { Handle::from_raw(res) } {
        Ok(handle) => (BrokerResponse { result: 0 }, Some(handle)),
        Err(_) => (BrokerResponse::from_errno(libc::EBADF), None),
    }
}

pub(crate) fn proxied_access(path: &[u8], mode: c_int) -> BrokerResponse {
    let path = match CString::new(path) {
        Ok(p) => p,
        Err(_) => return BrokerResponse::from_errno(libc::EINVAL),
    };
    let res = unsafe { libc::access(path.as_ptr(), mode) };
    if res < 0 {
        return BrokerResponse::from_errno(errno());
    }
    BrokerResponse { result: 0 }
}
