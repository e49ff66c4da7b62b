#![cfg(target_os = "linux")]

use libc::c_int;
use serde::{Deserialize, Serialize};
use warden_policy::PolicyRequest;

/// Longest path a request may carry, in bytes, without its null terminator.
pub const MAX_PATH_LEN: usize = libc::PATH_MAX as usize - 1;

// Requests are strictly answered one at a time, in order, with exactly one
// response each. A file descriptor only travels with the response to an
// `Open` whose result is non-negative.
#[derive(Serialize, Deserialize, PartialEq, Eq, Debug, Clone, Copy)]
pub enum BrokerRequest<'a> {
    // Paths are raw bytes, absolute, without any null terminator
    Open { path: &'a [u8], flags: c_int },
    Access { path: &'a [u8], mode: c_int },
}

#[derive(Serialize, Deserialize, PartialEq, Eq, Debug, Clone, Copy)]
pub struct BrokerResponse {
    // Non-negative on success, -errno otherwise
    pub result: c_int,
}

impl<'a> BrokerRequest<'a> {
    pub fn path(&self) -> &'a [u8] {
        match *self {
            BrokerRequest::Open { path, .. } | BrokerRequest::Access { path, .. } => path,
        }
    }

    pub fn as_policy_request(&self) -> PolicyRequest<'a> {
        match *self {
            BrokerRequest::Open { path, flags } => PolicyRequest::FileOpen { path, flags },
            BrokerRequest::Access { path, mode } => PolicyRequest::FileAccess { path, mode },
        }
    }
}

impl BrokerResponse {
    pub fn from_errno(errno: c_int) -> Self {
        Self { result: -errno }
    }
}
