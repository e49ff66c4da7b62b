use libc::{c_char, c_int, EFAULT, ENAMETOOLONG, ENOMEM, O_CLOEXEC};
use log::{debug, error, warn};
use std::ffi::CStr;
use std::sync::Mutex;
use warden_ipc::{IpcChannel, IPC_MESSAGE_MAX_SIZE};
use warden_ipc_messages::{BrokerRequest, BrokerResponse, MAX_PATH_LEN};
use warden_policy::{validate_request, PathPolicy, PolicyVerdict};

/// Sandboxed side of the file-access broker: forwards `open()` and `access()`
/// calls to the broker process and hands back its answers, as a file
/// descriptor or a negative errno.
///
/// Calls from several threads are serialized, only one request is ever in
/// flight. Once the broker is gone, every call fails with `-ENOMEM`.
pub struct BrokerClient {
    channel: Mutex<Option<IpcChannel>>,
    policy: PathPolicy,
    denial_errno: c_int,
    fast_check_in_client: bool,
}

impl BrokerClient {
    /// `policy` must be the one the broker enforces. With
    /// `fast_check_in_client`, requests it denies are answered locally.
    pub fn new(
        channel: IpcChannel,
        policy: PathPolicy,
        denial_errno: c_int,
        fast_check_in_client: bool,
    ) -> Self {
        Self {
            channel: Mutex::new(Some(channel)),
            policy,
            denial_errno,
            fast_check_in_client,
        }
    }

    pub fn policy(&self) -> &PathPolicy {
        &self.policy
    }

    pub fn denial_errno(&self) -> c_int {
        self.denial_errno
    }

    pub fn fast_check_in_client(&self) -> bool {
        self.fast_check_in_client
    }

    pub fn is_connected(&self) -> bool {
        match self.channel.lock() {
            Ok(guard) => guard.is_some(),
            Err(poisoned) => poisoned.into_inner().is_some(),
        }
    }

    /// Closes the channel, which lets the broker exit. Later calls fail with
    /// `-ENOMEM`.
    pub fn disconnect(&self) {
        let mut guard = match self.channel.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *guard = None;
    }

    /// Returns a new file descriptor, or -errno.
    pub fn open(&self, path: &[u8], flags: c_int) -> c_int {
        let request = BrokerRequest::Open { path, flags };
        if let Some(err) = self.check_locally(&request) {
            return err;
        }
        self.forward(&request, (flags & O_CLOEXEC) != 0)
    }

    /// Returns 0, or -errno.
    pub fn access(&self, path: &[u8], mode: c_int) -> c_int {
        let request = BrokerRequest::Access { path, mode };
        if let Some(err) = self.check_locally(&request) {
            return err;
        }
        self.forward(&request, false)
    }

    /// Same as [`open`](Self::open), with a C string which may be null.
    ///
    /// # Safety
    /// `path` must be null or point to a null-terminated string.
    pub unsafe fn open_ptr(&self, path: *const c_char, flags: c_int) -> c_int {
        if path.is_null() {
            return -EFAULT;
        }
        self.open(CStr::from_ptr(path).to_bytes(), flags)
    }

    /// Same as [`access`](Self::access), with a C string which may be null.
    ///
    /// # Safety
    /// `path` must be null or point to a null-terminated string.
    pub unsafe fn access_ptr(&self, path: *const c_char, mode: c_int) -> c_int {
        if path.is_null() {
            return -EFAULT;
        }
        self.access(CStr::from_ptr(path).to_bytes(), mode)
    }

    // Answers requests which cannot be granted without a round-trip. Must
    // give the same result as the broker would.
    fn check_locally(&self, request: &BrokerRequest) -> Option<c_int> {
        if request.path().len() > MAX_PATH_LEN {
            return Some(-ENAMETOOLONG);
        }
        let policy_request = request.as_policy_request();
        if self.fast_check_in_client {
            if self.policy.evaluate_request(&policy_request) != PolicyVerdict::Granted {
                return Some(-self.denial_errno);
            }
        } else if let Err(verdict) = validate_request(&policy_request) {
            debug!("Rejected {} locally: {:?}", policy_request, verdict);
            return Some(-self.denial_errno);
        }
        None
    }

    fn forward(&self, request: &BrokerRequest, cloexec: bool) -> c_int {
        let mut guard = match self.channel.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let channel = match guard.as_mut() {
            Some(channel) => channel,
            None => return -ENOMEM,
        };
        let mut buffer = vec![0u8; IPC_MESSAGE_MAX_SIZE];
        debug!("Sending request {:?}", request);
        if let Err(e) = channel.send(request, None, &mut buffer) {
            warn!("Unable to send request to broker: {}", e);
            *guard = None;
            return -ENOMEM;
        }
        let (response, handle) = match channel.recv::<BrokerResponse>(&mut buffer, cloexec) {
            Ok(Some(msg)) => msg,
            Ok(None) => {
                warn!("Broker closed its channel");
                *guard = None;
                return -ENOMEM;
            }
            Err(e) => {
                warn!("Unable to receive response from broker: {}", e);
                *guard = None;
                return -ENOMEM;
            }
        };
        debug!("Received response {:?} (with fd: {})", response, handle.is_some());
        match (request, response.result, handle) {
            (BrokerRequest::Open { .. }, res, Some(handle)) if res >= 0 => handle.into_raw(),
            (_, res, None) if res < 0 => res,
            (BrokerRequest::Access { .. }, 0, None) => 0,
            (_, res, handle) => {
                error!(
                    "Unexpected broker response {} (with fd: {}) to {:?}",
                    res,
                    handle.is_some(),
                    request
                );
                *guard = None;
                -ENOMEM
            }
        }
    }
}

impl core::fmt::Debug for BrokerClient {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("BrokerClient")
            .field("connected", &self.is_connected())
            .field("denial_errno", &self.denial_errno)
            .field("fast_check_in_client", &self.fast_check_in_client)
            .finish()
    }
}
