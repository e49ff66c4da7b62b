use crate::BrokerError;
use libc::{c_int, EPERM};
use warden_policy::PathPolicy;

// Largest value the kernel itself ever reports as -errno
const MAX_ERRNO: c_int = 4095;

/// What the launcher decides about a broker and its client, before the
/// broker is started. Immutable afterwards.
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    pub(crate) policy: PathPolicy,
    pub(crate) denial_errno: c_int,
    pub(crate) fast_check_in_client: bool,
}

impl BrokerConfig {
    /// Denies with EPERM and checks requests in the client first, by default.
    pub fn new(policy: PathPolicy) -> Self {
        Self {
            policy,
            denial_errno: EPERM,
            fast_check_in_client: true,
        }
    }

    pub fn from_lists(read_allow: &[&str], write_allow: &[&str]) -> Result<Self, BrokerError> {
        Ok(Self::new(PathPolicy::from_lists(read_allow, write_allow)?))
    }

    /// Errno returned (negated) for every request the policy does not allow,
    /// including malformed ones.
    pub fn with_denial_errno(mut self, errno: c_int) -> Result<Self, BrokerError> {
        if errno <= 0 || errno > MAX_ERRNO {
            return Err(BrokerError::InvalidDenialErrno { errno });
        }
        self.denial_errno = errno;
        Ok(self)
    }

    pub fn with_fast_check_in_client(mut self, enabled: bool) -> Self {
        self.fast_check_in_client = enabled;
        self
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
}
