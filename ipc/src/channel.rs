use crate::error::IpcError;
use crate::{errno, Handle};
use core::ptr::null_mut;
use libc::{c_int, c_void};
use serde::{Deserialize, Serialize};

// This call is just a C arithmetic macro translated into rust, in practice it's safe (at least in this libc release)
const CMSG_SIZE: usize = unsafe { libc::CMSG_SPACE(core::mem::size_of::<c_int>() as u32) } as usize;

/// One end of a connected `SOCK_SEQPACKET` Unix socket pair. Each message is
/// a single datagram carrying a serialized payload and at most one file
/// descriptor.
#[derive(Debug)]
pub struct IpcChannel {
    fd: Handle,
}

impl IpcChannel {
    pub fn new() -> Result<(Self, Self), IpcError> {
        // Safety: we must not return in the middle of this block. The file
        // descriptors are owned by this block and this block only.
        // If socketpair() fails, no file descriptors are returned, so no
        // resource is leaked.
        let (fd0, fd1) = unsafe {
            let mut socks: [c_int; 2] = [-1, -1];
            let res = libc::socketpair(
                libc::AF_UNIX,
                libc::SOCK_SEQPACKET | libc::SOCK_CLOEXEC,
                0,
                socks.as_mut_ptr(),
            );
            if res < 0 {
                return Err(IpcError::InternalOsOperationFailed {
                    os_code: errno(),
                    description: "socketpair() failed",
                });
            }
            (Handle::from_raw(socks[0])?, Handle::from_raw(socks[1])?)
        };
        Ok((Self { fd: fd0 }, Self { fd: fd1 }))
    }

    pub fn into_handle(self) -> Handle {
        self.fd
    }

    pub fn as_handle(&self) -> &Handle {
        &self.fd
    }

    pub fn from_handle(handle: Handle) -> Self {
        Self { fd: handle }
    }

    pub fn send<T: Serialize>(
        &mut self,
        msg: &T,
        handle: Option<&Handle>,
        buffer: &mut [u8],
    ) -> Result<(), IpcError> {
        let slice = serialize(msg, buffer)?;
        self.send_bytes(slice, handle)
    }

    /// Sends an already serialized datagram. Never raises SIGPIPE: a closed
    /// peer is reported as an EPIPE error.
    pub fn send_bytes(&mut self, payload: &[u8], handle: Option<&Handle>) -> Result<(), IpcError> {
        let msg_iovec = libc::iovec {
            // mut is not used here, just required because iovec is used by recvmsg too
            iov_base: payload.as_ptr() as *mut c_void,
            iov_len: payload.len(),
        };
        let mut cbuf = [0u8; CMSG_SIZE];
        let mut msg = libc::msghdr {
            msg_name: null_mut(), // socket is already connected, no need for this
            msg_namelen: 0,
            // mut is not actually used here either, just because iovec is used by recvmsg too
            msg_iov: &msg_iovec as *const libc::iovec as *mut libc::iovec,
            msg_iovlen: 1,
            msg_control: cbuf.as_mut_ptr() as *mut c_void,
            msg_controllen: if handle.is_some() { CMSG_SIZE } else { 0 },
            msg_flags: 0, // unused
        };
        if handle.is_none() {
            msg.msg_control = null_mut();
        }
        // Safety: pointers in the iovec{} must point to valid buffers of the indicated length
        // up until the sendmsg() call, pointers into the msghdr must not be directly assigned
        // (they might not be aligned).
        unsafe {
            if let Some(handle) = handle {
                let fd = handle.as_raw();
                let cmsghdr = libc::CMSG_FIRSTHDR(&msg as *const libc::msghdr);
                let (clevel, ctype) = (libc::SOL_SOCKET, libc::SCM_RIGHTS);
                let clen = libc::CMSG_LEN(core::mem::size_of::<c_int>() as u32) as usize;
                core::ptr::copy_nonoverlapping(
                    &clevel as *const c_int,
                    &mut (*cmsghdr).cmsg_level as *mut c_int,
                    1,
                );
                core::ptr::copy_nonoverlapping(
                    &ctype as *const c_int,
                    &mut (*cmsghdr).cmsg_type as *mut c_int,
                    1,
                );
                core::ptr::copy_nonoverlapping(
                    &clen as *const usize,
                    &mut (*cmsghdr).cmsg_len as *mut libc::size_t,
                    1,
                );
                core::ptr::copy_nonoverlapping(
                    &fd as *const c_int,
                    libc::CMSG_DATA(cmsghdr) as *mut c_int,
                    1,
                );
            }
        }
        loop {
            let res = unsafe {
                libc::sendmsg(
                    self.fd.as_raw(),
                    &msg as *const libc::msghdr,
                    libc::MSG_NOSIGNAL,
                )
            };
            if res >= 0 {
                return Ok(());
            }
            let os_code = errno();
            if os_code != libc::EINTR {
                return Err(IpcError::InternalOsOperationFailed {
                    os_code,
                    description: "sendmsg() failed",
                });
            }
        }
    }

    /// Blocks until a message arrives. Returns `Ok(None)` once the peer has
    /// closed its end. A received descriptor is marked close-on-exec only
    /// if `cloexec` is set.
    pub fn recv<'de, T: Deserialize<'de>>(
        &mut self,
        buffer: &'de mut [u8],
        cloexec: bool,
    ) -> Result<Option<(T, Option<Handle>)>, IpcError> {
        match self.recv_bytes(buffer, cloexec)? {
            None => Ok(None),
            Some((read_bytes, handle)) => {
                let msg = deserialize(&buffer[0..read_bytes])?;
                Ok(Some((msg, handle)))
            }
        }
    }

    pub fn recv_bytes(
        &mut self,
        buffer: &mut [u8],
        cloexec: bool,
    ) -> Result<Option<(usize, Option<Handle>)>, IpcError> {
        let msg_iovec = libc::iovec {
            iov_base: buffer.as_mut_ptr() as *mut c_void,
            iov_len: buffer.len(),
        };
        let mut cbuf = [0u8; CMSG_SIZE];
        let mut msg = libc::msghdr {
            msg_name: null_mut(), // socket is already connected, no need for this
            msg_namelen: 0,
            msg_iov: &msg_iovec as *const libc::iovec as *mut libc::iovec, // mut is not used here
            msg_iovlen: 1,
            msg_control: cbuf.as_mut_ptr() as *mut c_void,
            msg_controllen: cbuf.len(),
            msg_flags: 0, // unused
        };
        let flags = if cloexec { libc::MSG_CMSG_CLOEXEC } else { 0 };
        // Safety: pointers in the iovec{} must point to valid buffers of the indicated length
        // up until the recvmsg() call. There must be no early return that leaks a file descriptor
        // received. Any received cmsg header and payload pointers must not be dereferenced directly:
        // they may not be aligned within the reception buffer.
        let (read_bytes, handle) = unsafe {
            let res = loop {
                let res = libc::recvmsg(self.fd.as_raw(), &mut msg as *mut libc::msghdr, flags);
                if res >= 0 || errno() != libc::EINTR {
                    break res;
                }
            };
            if res < 0 {
                // if recvmsg() failed altogether, we can return without leaking a fd
                return Err(IpcError::InternalOsOperationFailed {
                    os_code: errno(),
                    description: "recvmsg() failed",
                });
            }
            // Iterate on ancillary payloads, if any (we allocated just enough space for one
            // file descriptor, so we should never be able to receive more at a time, but
            // iterate and check to match the documented way of using this API)
            let mut handle = Ok(None);
            let mut cmsghdr = libc::CMSG_FIRSTHDR(&msg as *const libc::msghdr);
            while !cmsghdr.is_null() {
                let mut clevel: c_int = -1;
                let mut ctype: c_int = -1;
                core::ptr::copy_nonoverlapping(
                    &(*cmsghdr).cmsg_level as *const c_int,
                    &mut clevel as *mut c_int,
                    1,
                );
                core::ptr::copy_nonoverlapping(
                    &(*cmsghdr).cmsg_type as *const c_int,
                    &mut ctype as *mut c_int,
                    1,
                );
                if (clevel, ctype) != (libc::SOL_SOCKET, libc::SCM_RIGHTS) {
                    // The libc handed us something unexpected other than a file descriptor,
                    // quit with an error in case it could cause a resource leak.
                    handle = Err(IpcError::UnexpectedAncillaryData {
                        level: clevel,
                        kind: ctype,
                    });
                } else {
                    let mut fd: c_int = -1;
                    core::ptr::copy_nonoverlapping(
                        libc::CMSG_DATA(cmsghdr),
                        &mut fd as *mut c_int as *mut libc::c_uchar,
                        core::mem::size_of_val(&fd),
                    );
                    match Handle::from_raw(fd) {
                        Ok(h) => {
                            if handle.is_ok() {
                                // don't overwrite a prior error
                                handle = Ok(Some(h));
                            }
                        }
                        Err(e) => {
                            handle = Err(IpcError::from(e));
                        }
                    };
                }
                cmsghdr = libc::CMSG_NXTHDR(&msg as *const libc::msghdr, cmsghdr);
            }
            (res as usize, handle?)
        };
        // All error conditions below will implictly close any handle received,
        // no leak at this point once outside the unsafe{} block.
        if msg.msg_flags & (libc::MSG_CTRUNC | libc::MSG_TRUNC) != 0 {
            return Err(IpcError::PayloadTooBigToTransmit {
                truncated_len: read_bytes,
            });
        } else if read_bytes == 0 && handle.is_none() {
            return Ok(None);
        }
        Ok(Some((read_bytes, handle)))
    }
}

fn serialize<'a, T: Serialize>(msg: &T, buffer: &'a mut [u8]) -> Result<&'a mut [u8], IpcError> {
    postcard::to_slice(msg, buffer).map_err(|e| IpcError::InternalSerializationError {
        description: match e {
            postcard::Error::WontImplement => "tried to use a feature postcard won't support",
            postcard::Error::NotYetImplemented => "tried to use a feature not supported by postcard",
            postcard::Error::SerializeBufferFull => "message too long",
            postcard::Error::SerializeSeqLengthUnknown => "postcard requires sequence length to be known",
            postcard::Error::SerdeSerCustom => "postcard serde serialization error",
            postcard::Error::CollectStrError => "postcard collect_str error",
            _ => "unknown",
        },
    })
}

fn deserialize<'de, T: Deserialize<'de>>(buffer: &'de [u8]) -> Result<T, IpcError> {
    let (msg, rest) = postcard::take_from_bytes(buffer).map_err(|e| {
        IpcError::InternalDeserializationError {
            payload_len: buffer.len(),
            description: match e {
                postcard::Error::WontImplement => "tried to use a feature postcard won't support",
                postcard::Error::NotYetImplemented => "tried to use a feature not supported by postcard",
                postcard::Error::DeserializeUnexpectedEnd => "postcard expected more data",
                postcard::Error::DeserializeBadVarint => "postcard found a varint that did not terminate",
                postcard::Error::DeserializeBadBool => "postcard found a bool that was neither 0 nor 1",
                postcard::Error::DeserializeBadChar | postcard::Error::DeserializeBadUtf8 => "postcard found an invalid unicode char",
                postcard::Error::DeserializeBadOption => "postcard found an option discriminant that was neither 0 nor 1",
                postcard::Error::DeserializeBadEnum => "postcard found an invalid enum discriminant",
                postcard::Error::DeserializeBadEncoding => "postcard reports invalid encoding",
                postcard::Error::SerdeDeCustom => "postcard serde deserialization error",
                _ => "unknown",
            },
        }
    })?;
    if !rest.is_empty() {
        return Err(IpcError::InternalDeserializationError {
            payload_len: buffer.len(),
            description: "trailing bytes after message",
        });
    }
    Ok(msg)
}
