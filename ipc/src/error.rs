use libc::c_int;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandleError {
    InvalidHandleValue {
        raw_value: i64,
    },
    InternalOsOperationFailed {
        description: &'static str,
        raw_handle: c_int,
        os_code: c_int,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IpcError {
    PayloadTooBigToTransmit {
        truncated_len: usize,
    },
    InternalSerializationError {
        description: &'static str,
    },
    InternalDeserializationError {
        description: &'static str,
        payload_len: usize,
    },
    InternalOsOperationFailed {
        description: &'static str,
        os_code: c_int,
    },
    UnexpectedAncillaryData {
        level: c_int,
        kind: c_int,
    },
    InvalidHandleValueReceived {
        raw_value: i64,
    },
}

impl core::fmt::Display for HandleError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::InvalidHandleValue { raw_value } => {
                write!(f, "invalid file descriptor value {raw_value}")
            }
            Self::InternalOsOperationFailed {
                description,
                raw_handle,
                os_code,
            } => write!(f, "{description} on fd {raw_handle} (errno {os_code})"),
        }
    }
}

impl std::error::Error for HandleError {}

impl core::fmt::Display for IpcError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::PayloadTooBigToTransmit { truncated_len } => {
                write!(f, "message truncated after {truncated_len} bytes")
            }
            Self::InternalSerializationError { description } => {
                write!(f, "unable to serialize message: {description}")
            }
            Self::InternalDeserializationError {
                description,
                payload_len,
            } => write!(
                f,
                "unable to deserialize {payload_len}-byte message: {description}"
            ),
            Self::InternalOsOperationFailed {
                description,
                os_code,
            } => write!(f, "{description} (errno {os_code})"),
            Self::UnexpectedAncillaryData { level, kind } => write!(
                f,
                "received unexpected ancillary data (level {level}, type {kind})"
            ),
            Self::InvalidHandleValueReceived { raw_value } => {
                write!(f, "received invalid file descriptor {raw_value}")
            }
        }
    }
}

impl std::error::Error for IpcError {}

impl From<HandleError> for IpcError {
    fn from(e: HandleError) -> Self {
        match e {
            HandleError::InvalidHandleValue { raw_value } => {
                Self::InvalidHandleValueReceived { raw_value }
            }
            HandleError::InternalOsOperationFailed {
                description,
                os_code,
                ..
            } => Self::InternalOsOperationFailed {
                description,
                os_code,
            },
        }
    }
}
