use crate::errno;
use crate::error::HandleError;
use libc::{c_int, fcntl, FD_CLOEXEC, F_DUPFD_CLOEXEC, F_GETFD, F_SETFD};
use log::error;
use std::os::fd::{AsRawFd, FromRawFd, IntoRawFd, OwnedFd, RawFd};

/// Owned file descriptor, closed when dropped.
#[derive(Debug, Eq, PartialEq, Hash)]
pub struct Handle {
    val: Option<c_int>,
}

impl Handle {
    /// # Safety
    /// `fd` must be an open file descriptor, owned by nothing else.
    pub unsafe fn from_raw(fd: c_int) -> Result<Self, HandleError> {
        if fd < 0 {
            return Err(HandleError::InvalidHandleValue {
                raw_value: fd.into(),
            });
        }
        Ok(Handle { val: Some(fd) })
    }

    pub fn as_raw(&self) -> c_int {
        self.val.unwrap_or(-1)
    }

    pub fn into_raw(mut self) -> c_int {
        self.val.take().unwrap_or(-1)
    }

    pub fn try_clone(&self) -> Result<Self, HandleError> {
        let res = unsafe { fcntl(self.as_raw(), F_DUPFD_CLOEXEC, 0) };
        if res < 0 {
            return Err(HandleError::InternalOsOperationFailed {
                description: "fcntl(F_DUPFD_CLOEXEC) failed",
                raw_handle: self.as_raw(),
                os_code: errno(),
            });
        }
        // Safety: the duplicate was just created and belongs to nobody else
        unsafe { Self::from_raw(res) }
    }

    pub fn set_inheritable(&mut self, allow_inherit: bool) -> Result<(), HandleError> {
        let fd = self.as_raw();
        let current_flags = self.fd_flags()?;
        let res = unsafe {
            fcntl(
                fd,
                F_SETFD,
                (current_flags & !FD_CLOEXEC) | if allow_inherit { 0 } else { FD_CLOEXEC },
            )
        };
        if res < 0 {
            return Err(HandleError::InternalOsOperationFailed {
                description: "fcntl(F_SETFD, FD_CLOEXEC) failed",
                raw_handle: fd,
                os_code: errno(),
            });
        }
        Ok(())
    }

    pub fn is_inheritable(&self) -> Result<bool, HandleError> {
        Ok((self.fd_flags()? & FD_CLOEXEC) == 0)
    }

    fn fd_flags(&self) -> Result<c_int, HandleError> {
        let current_flags = unsafe { fcntl(self.as_raw(), F_GETFD) };
        if current_flags < 0 {
            return Err(HandleError::InternalOsOperationFailed {
                description: "fcntl(F_GETFD) failed",
                raw_handle: self.as_raw(),
                os_code: errno(),
            });
        }
        Ok(current_flags)
    }
}

impl Drop for Handle {
    fn drop(&mut self) {
        if let Some(fd) = self.val.take() {
            let res = unsafe { libc::close(fd) };
            if res < 0 {
                error!("close(fd={}) failed with error {}", fd, errno());
                if cfg!(debug_assertions) {
                    panic!("close(fd={}) failed with error {}", fd, errno());
                }
            }
        }
    }
}

impl AsRawFd for Handle {
    fn as_raw_fd(&self) -> RawFd {
        self.as_raw()
    }
}

impl IntoRawFd for Handle {
    fn into_raw_fd(self) -> RawFd {
        self.into_raw()
    }
}

impl FromRawFd for Handle {
    unsafe fn from_raw_fd(fd: RawFd) -> Self {
        Handle { val: Some(fd) }
    }
}

impl From<OwnedFd> for Handle {
    fn from(fd: OwnedFd) -> Self {
        Handle {
            val: Some(fd.into_raw_fd()),
        }
    }
}

impl From<Handle> for OwnedFd {
    fn from(handle: Handle) -> Self {
        // Safety: ownership moves out of the handle, which won't close it
        unsafe { OwnedFd::from_raw_fd(handle.into_raw()) }
    }
}
