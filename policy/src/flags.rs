use crate::path::path_is_sane;
use crate::{PolicyRequest, PolicyVerdict};
use libc::{
    c_int, F_OK, O_ACCMODE, O_APPEND, O_ASYNC, O_CLOEXEC, O_CREAT, O_DIRECT, O_DIRECTORY,
    O_DSYNC, O_EXCL, O_LARGEFILE, O_NDELAY, O_NOATIME, O_NOCTTY, O_NOFOLLOW, O_NONBLOCK,
    O_SYNC, O_TMPFILE, O_TRUNC, R_OK, W_OK, X_OK,
};

pub const SUPPORTED_FILE_OPEN_FLAGS: c_int = O_ACCMODE
    | O_APPEND
    | O_ASYNC
    | O_CLOEXEC
    | O_DIRECT
    | O_DIRECTORY
    | O_DSYNC
    | O_EXCL
    | O_LARGEFILE
    | O_NDELAY
    | O_NOATIME
    | O_NOCTTY
    | O_NOFOLLOW
    | O_NONBLOCK
    | O_SYNC
    | O_TRUNC;

const SUPPORTED_ACCESS_MODES: c_int = R_OK | W_OK | X_OK;

/// Rejects requests which are malformed regardless of any path policy: paths
/// not in absolute canonical form, file creation through a two-argument open,
/// contradictory access modes, and flags or modes this broker does not know.
pub fn validate_request(req: &PolicyRequest) -> Result<(), PolicyVerdict> {
    let path = match req {
        PolicyRequest::FileOpen { path, .. } | PolicyRequest::FileAccess { path, .. } => path,
    };
    if !path_is_sane(path) {
        return Err(PolicyVerdict::InvalidRequestParameters {
            argument_name: "path".to_owned(),
            reason: "path is not absolute and in canonical form".to_owned(),
        });
    }
    match *req {
        PolicyRequest::FileOpen { flags, .. } => check_open_flags(flags),
        PolicyRequest::FileAccess { mode, .. } => check_access_mode(mode),
    }
}

fn check_open_flags(flags: c_int) -> Result<(), PolicyVerdict> {
    // O_TMPFILE includes O_DIRECTORY, check it as a whole
    if (flags & O_CREAT) != 0 || (flags & O_TMPFILE) == O_TMPFILE {
        return Err(PolicyVerdict::InvalidRequestParameters {
            argument_name: "flags".to_owned(),
            reason: "file creation is not supported through open(path, flags)".to_owned(),
        });
    }
    if (flags & !SUPPORTED_FILE_OPEN_FLAGS) != 0 {
        return Err(PolicyVerdict::InvalidRequestParameters {
            argument_name: "flags".to_owned(),
            reason: format!(
                "open flag {:#X} not supported",
                flags & !SUPPORTED_FILE_OPEN_FLAGS
            ),
        });
    }
    if (flags & O_ACCMODE) == O_ACCMODE {
        return Err(PolicyVerdict::InvalidRequestParameters {
            argument_name: "flags".to_owned(),
            reason: "more than one of O_RDONLY, O_WRONLY and O_RDWR requested".to_owned(),
        });
    }
    Ok(())
}

fn check_access_mode(mode: c_int) -> Result<(), PolicyVerdict> {
    if mode != F_OK && (mode & !SUPPORTED_ACCESS_MODES) != 0 {
        return Err(PolicyVerdict::InvalidRequestParameters {
            argument_name: "mode".to_owned(),
            reason: format!("access mode {mode:#X} not supported"),
        });
    }
    Ok(())
}
