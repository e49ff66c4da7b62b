use crate::brokered_syscalls::{proxied_access, proxied_open};
use crate::{BrokerConfig, BrokerError};
use libc::c_int;
use log::{debug, info, warn};
use warden_ipc::{Handle, IpcChannel, IpcError, IPC_MESSAGE_MAX_SIZE};
use warden_ipc_messages::{BrokerRequest, BrokerResponse, MAX_PATH_LEN};
use warden_policy::{PathPolicy, PolicyVerdict};

/// Unsandboxed side of the file-access broker. Performs the `open()` and
/// `access()` calls its client is allowed to make, and nothing else.
#[derive(Debug)]
pub struct BrokerServer {
    channel: IpcChannel,
    policy: PathPolicy,
    denial_errno: c_int,
}

impl BrokerServer {
    pub fn new(channel: IpcChannel, policy: PathPolicy, denial_errno: c_int) -> Self {
        Self {
            channel,
            policy,
            denial_errno,
        }
    }

    pub fn from_config(channel: IpcChannel, config: &BrokerConfig) -> Self {
        Self::new(channel, config.policy.clone(), config.denial_errno)
    }

    pub fn policy(&self) -> &PathPolicy {
        &self.policy
    }

    pub fn denial_errno(&self) -> c_int {
        self.denial_errno
    }

    fn denial(&self) -> (BrokerResponse, Option<Handle>) {
        (BrokerResponse::from_errno(self.denial_errno), None)
    }

    /// Authoritative check and execution of one request. Any file descriptor
    /// returned is the broker's own copy, to be closed once sent.
    pub fn handle_request(&self, request: &BrokerRequest) -> (BrokerResponse, Option<Handle>) {
        if request.path().len() > MAX_PATH_LEN {
            warn!("Denying request with a {}-byte path", request.path().len());
            return self.denial();
        }
        if self.policy.evaluate_request(&request.as_policy_request()) != PolicyVerdict::Granted {
            return self.denial();
        }
        match *request {
            BrokerRequest::Open { path, flags } => proxied_open(path, flags),
            BrokerRequest::Access { path, mode } => (proxied_access(path, mode), None),
        }
    }

    /// Serves requests until the client closes its end of the channel.
    /// Malformed requests get denied, they never stop the loop.
    pub fn run(mut self) -> Result<(), BrokerError> {
        let mut buf = vec![0u8; IPC_MESSAGE_MAX_SIZE];
        loop {
            let (resp, handle) = match self.channel.recv::<BrokerRequest>(&mut buf, true) {
                Ok(None) => {
                    info!("Broker exiting cleanly, client closed its IPC channel");
                    return Ok(());
                }
                Ok(Some((request, None))) => {
                    debug!("Received request: {:?}", &request);
                    self.handle_request(&request)
                }
                Ok(Some((request, Some(_)))) => {
                    // The unexpected descriptor is closed right away
                    warn!("Denying request sent with a file descriptor: {:?}", &request);
                    self.denial()
                }
                Err(
                    e @ (IpcError::InternalDeserializationError { .. }
                    | IpcError::PayloadTooBigToTransmit { .. }
                    | IpcError::UnexpectedAncillaryData { .. }
                    | IpcError::InvalidHandleValueReceived { .. }),
                ) => {
                    warn!("Denying malformed request: {}", e);
                    self.denial()
                }
                Err(e) => return Err(e.into()),
            };
            debug!("Sending response: {:?} (handle={:?})", &resp, &handle);
            match self.channel.send(&resp, handle.as_ref(), &mut buf) {
                Ok(()) => (),
                Err(IpcError::InternalOsOperationFailed { os_code, .. })
                    if os_code == libc::EPIPE || os_code == libc::ECONNRESET =>
                {
                    info!("Broker exiting, client closed its IPC channel before reading a response");
                    return Ok(());
                }
                Err(e) => return Err(e.into()),
            }
            // Our copy of any descriptor sent is closed here
            drop(handle);
        }
    }
}
