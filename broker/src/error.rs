use libc::c_int;
use warden_ipc::{HandleError, IpcError};
use warden_policy::PolicyError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrokerError {
    CannotBuildPolicy(PolicyError),
    InvalidDenialErrno { errno: c_int },
    SandboxAlreadyEngaged,
    ChannelError(IpcError),
    InternalOsOperationFailed { description: String, os_code: c_int },
    UnexpectedExitStatus { wstatus: c_int },
}

impl core::fmt::Display for BrokerError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::CannotBuildPolicy(e) => write!(f, "invalid path policy: {e}"),
            Self::InvalidDenialErrno { errno } => {
                write!(f, "{errno} is not a valid errno to deny requests with")
            }
            Self::SandboxAlreadyEngaged => write!(
                f,
                "cannot start a broker from a process already running under a syscall filter"
            ),
            Self::ChannelError(e) => write!(f, "IPC channel error: {e}"),
            Self::InternalOsOperationFailed {
                description,
                os_code,
            } => write!(f, "{description} (errno {os_code})"),
            Self::UnexpectedExitStatus { wstatus } => {
                write!(f, "unexpected waitpid() status {wstatus:#X}")
            }
        }
    }
}

impl std::error::Error for BrokerError {}

impl From<HandleError> for BrokerError {
    fn from(err: HandleError) -> Self {
        match err {
            HandleError::InvalidHandleValue { .. } => Self::InternalOsOperationFailed {
                description: "invalid handle value used".to_owned(),
                os_code: 0,
            },
            HandleError::InternalOsOperationFailed {
                description,
                os_code,
                ..
            } => Self::InternalOsOperationFailed {
                description: description.to_owned(),
                os_code,
            },
        }
    }
}

impl From<IpcError> for BrokerError {
    fn from(err: IpcError) -> Self {
        Self::ChannelError(err)
    }
}

impl From<PolicyError> for BrokerError {
    fn from(err: PolicyError) -> Self {
        Self::CannotBuildPolicy(err)
    }
}
