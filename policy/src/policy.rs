use crate::error::PolicyError;
use crate::flags::validate_request;
use crate::path::{parse_pattern, pattern_matches};
use libc::{c_int, F_OK, O_ACCMODE, O_APPEND, O_RDONLY, O_RDWR, O_TRUNC, O_WRONLY, R_OK, W_OK, X_OK};
use log::{info, warn};
use std::ffi::CString;
use std::sync::Arc;

#[derive(Debug, PartialEq, Eq)]
pub enum PolicyVerdict {
    Granted,
    DeniedByPolicy {
        why: String,
    },
    InvalidRequestParameters {
        argument_name: String,
        reason: String,
    },
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum PolicyRequest<'a> {
    FileOpen { path: &'a [u8], flags: c_int },
    FileAccess { path: &'a [u8], mode: c_int },
}

pub type PolicyLogCallback = dyn Fn(&PolicyRequest, &PolicyVerdict) + Send + Sync;

/// Read and write allow-lists of absolute paths. Entries ending with a `/`
/// cover a whole directory tree, others a single path. Built once by the
/// launcher, then handed by value to whoever enforces it.
#[derive(Clone, Default)]
pub struct PathPolicy {
    log_callbacks: Vec<Arc<PolicyLogCallback>>,
    read_allow: Vec<CString>,
    write_allow: Vec<CString>,
}

impl PathPolicy {
    pub fn nothing_allowed() -> Self {
        Self::default()
    }

    pub fn from_lists(read_allow: &[&str], write_allow: &[&str]) -> Result<Self, PolicyError> {
        let mut policy = Self::nothing_allowed();
        for path in read_allow {
            policy.allow_read(path)?;
        }
        for path in write_allow {
            policy.allow_write(path)?;
        }
        Ok(policy)
    }

    // Callbacks receive every verdict, granted or not, and need to be
    // multithread-safe.
    pub fn add_log_callback(&mut self, callback: Box<PolicyLogCallback>) {
        self.log_callbacks.push(Arc::from(callback));
    }

    pub fn allow_read(&mut self, pattern: &str) -> Result<(), PolicyError> {
        let pattern = parse_pattern(pattern)?;
        if !self.read_allow.contains(&pattern) {
            self.read_allow.push(pattern);
        }
        Ok(())
    }

    pub fn allow_write(&mut self, pattern: &str) -> Result<(), PolicyError> {
        let pattern = parse_pattern(pattern)?;
        if !self.write_allow.contains(&pattern) {
            self.write_allow.push(pattern);
        }
        Ok(())
    }

    pub fn read_allow(&self) -> &[CString] {
        &self.read_allow
    }

    pub fn write_allow(&self) -> &[CString] {
        &self.write_allow
    }

    pub fn can_read(&self, path: &[u8]) -> bool {
        self.read_allow.iter().any(|p| pattern_matches(p, path))
    }

    pub fn can_write(&self, path: &[u8]) -> bool {
        self.write_allow.iter().any(|p| pattern_matches(p, path))
    }

    pub fn evaluate_request(&self, req: &PolicyRequest) -> PolicyVerdict {
        let res = match validate_request(req) {
            Err(verdict) => verdict,
            Ok(()) => match *req {
                PolicyRequest::FileOpen { path, flags } => self.check_file_open(path, flags),
                PolicyRequest::FileAccess { path, mode } => self.check_file_access(path, mode),
            },
        };
        self.log_verdict(req, &res);
        res
    }

    fn check_file_open(&self, path: &[u8], flags: c_int) -> PolicyVerdict {
        let (can_read, can_write) = (self.can_read(path), self.can_write(path));
        let requests_read = matches!(flags & O_ACCMODE, O_RDONLY | O_RDWR);
        let requests_write = matches!(flags & O_ACCMODE, O_WRONLY | O_RDWR)
            || (flags & (O_TRUNC | O_APPEND)) != 0;
        if (!can_read && !can_write)
            || (requests_read && !can_read)
            || (requests_write && !can_write)
        {
            let why = format!(
                "requests {} access, but {}",
                match (requests_read, requests_write) {
                    (true, true) => "read-write",
                    (true, false) => "read-only",
                    _ => "write-only",
                },
                describe_access(can_read, can_write)
            );
            PolicyVerdict::DeniedByPolicy { why }
        } else {
            PolicyVerdict::Granted
        }
    }

    fn check_file_access(&self, path: &[u8], mode: c_int) -> PolicyVerdict {
        let (can_read, can_write) = (self.can_read(path), self.can_write(path));
        let why = if !can_read && !can_write {
            // Even F_OK is denied here, or it would tell whether the path exists
            Some(describe_access(can_read, can_write).to_owned())
        } else if (mode & X_OK) != 0 {
            Some("execute permission is never granted".to_owned())
        } else if (mode & R_OK) != 0 && !can_read {
            Some(format!("requests read access, but {}", describe_access(can_read, can_write)))
        } else if (mode & W_OK) != 0 && !can_write {
            Some(format!("requests write access, but {}", describe_access(can_read, can_write)))
        } else {
            debug_assert!(mode == F_OK || (mode & (R_OK | W_OK)) != 0);
            None
        };
        match why {
            Some(why) => PolicyVerdict::DeniedByPolicy { why },
            None => PolicyVerdict::Granted,
        }
    }

    pub(crate) fn log_verdict(&self, request: &PolicyRequest, verdict: &PolicyVerdict) {
        match &verdict {
            PolicyVerdict::Granted => {
                info!("Worker granted access to {}", request);
            }
            PolicyVerdict::DeniedByPolicy { why } => {
                warn!(
                    "Worker tried to access {} but it is not allowed by its policy: {}",
                    request, why
                );
            }
            PolicyVerdict::InvalidRequestParameters {
                argument_name,
                reason,
            } => {
                warn!(
                    "Worker tried to access {} but \"{}\" was unexpected: {}",
                    request, argument_name, reason
                );
            }
        }
        for callback in &self.log_callbacks {
            (callback)(request, verdict);
        }
    }
}

fn describe_access(can_read: bool, can_write: bool) -> &'static str {
    match (can_read, can_write) {
        (true, true) => "can only read and write",
        (true, false) => "can only read",
        (false, true) => "can only write",
        (false, false) => "has no access to that path",
    }
}

impl<'a> core::fmt::Display for PolicyRequest<'a> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> Result<(), core::fmt::Error> {
        match self {
            PolicyRequest::FileOpen { path, flags } => {
                write!(
                    f,
                    "file {} with open flags {:#X}",
                    String::from_utf8_lossy(path),
                    flags
                )
            }
            PolicyRequest::FileAccess { path, mode } => {
                write!(
                    f,
                    "file {} with access mode {:#X}",
                    String::from_utf8_lossy(path),
                    mode
                )
            }
        }
    }
}

impl core::fmt::Debug for PathPolicy {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> Result<(), std::fmt::Error> {
        writeln!(f, "PathPolicy {{")?;
        for path in &self.read_allow {
            writeln!(f, "    {} read", path.to_string_lossy())?;
        }
        for path in &self.write_allow {
            writeln!(f, "    {} write", path.to_string_lossy())?;
        }
        write!(f, "}}")
    }
}

impl PartialEq for PathPolicy {
    fn eq(&self, other: &PathPolicy) -> bool {
        self.read_allow == other.read_allow && self.write_allow == other.write_allow
    }
}

impl Eq for PathPolicy {}
