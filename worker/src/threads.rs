use libc::c_int;
use std::ffi::CStr;
use warden_ipc::{errno, Handle};

const PROC_PATH: &[u8] = b"/proc\0";
const TASK_PATH: &[u8] = b"self/task\0";
const FD_PATH: &[u8] = b"self/fd\0";

fn reset_errno() {
    unsafe {
        *(libc::__errno_location()) = 0;
    }
}

pub(crate) fn open_proc() -> Result<Handle, c_int> {
    let fd = unsafe {
        libc::open(
            PROC_PATH.as_ptr() as *const _,
            libc::O_RDONLY | libc::O_DIRECTORY | libc::O_CLOEXEC,
        )
    };
    if fd < 0 {
        return Err(errno());
    }
    unsafe { Handle::from_raw(fd) }.map_err(|_| libc::EBADF)
}

// Opens a directory under /proc, through the retained handle if there is one
fn open_proc_subdir(proc_fd: Option<&Handle>, subdir: &[u8]) -> Result<c_int, c_int> {
    let transient;
    let proc_fd = match proc_fd {
        Some(h) => h,
        None => {
            transient = open_proc()?;
            &transient
        }
    };
    let fd = unsafe {
        libc::openat(
            proc_fd.as_raw(),
            subdir.as_ptr() as *const _,
            libc::O_RDONLY | libc::O_DIRECTORY | libc::O_CLOEXEC,
        )
    };
    if fd < 0 {
        return Err(errno());
    }
    Ok(fd)
}

// Calls `f` on each entry name except "." and "..", takes ownership of `dir_fd`
fn for_each_entry<F: FnMut(&CStr)>(dir_fd: c_int, mut f: F) -> Result<(), c_int> {
    let dir = unsafe { libc::fdopendir(dir_fd) };
    if dir.is_null() {
        let err = errno();
        unsafe { libc::close(dir_fd) };
        return Err(err);
    }
    let res = loop {
        reset_errno();
        let entry = unsafe { libc::readdir(dir) };
        if entry.is_null() {
            match errno() {
                0 => break Ok(()),
                err => break Err(err),
            }
        }
        let name = unsafe { CStr::from_ptr((*entry).d_name.as_ptr()) };
        if name.to_bytes() != b"." && name.to_bytes() != b".." {
            f(name);
        }
    };
    unsafe { libc::closedir(dir) };
    res
}

/// Number of threads alive in the calling process, read from /proc/self/task.
pub(crate) fn count_threads(proc_fd: Option<&Handle>) -> Result<usize, c_int> {
    let task_fd = open_proc_subdir(proc_fd, TASK_PATH)?;
    let mut count = 0;
    for_each_entry(task_fd, |_| count += 1)?;
    Ok(count)
}

/// Whether any descriptor other than `except` (and the one used to
/// enumerate them) refers to a directory. Errors count as a yes.
pub(crate) fn has_open_directory(proc_fd: Option<&Handle>, except: Option<&Handle>) -> bool {
    let fds_fd = match open_proc_subdir(proc_fd, FD_PATH) {
        Ok(fd) => fd,
        Err(_) => return true,
    };
    let excluded = except.map(|h| h.as_raw());
    let mut found = false;
    let res = for_each_entry(fds_fd, |name| {
        let fd = match name.to_str().ok().and_then(|s| s.parse::<c_int>().ok()) {
            Some(fd) => fd,
            None => return,
        };
        if fd == fds_fd || Some(fd) == excluded {
            return;
        }
        let mut st: libc::stat = unsafe { std::mem::zeroed() };
        if unsafe { libc::fstat(fd, &mut st as *mut libc::stat) } == 0
            && (st.st_mode & libc::S_IFMT) == libc::S_IFDIR
        {
            found = true;
        }
    });
    found || res.is_err()
}
