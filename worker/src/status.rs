use std::ops::{BitOr, BitOrAssign};

/// Set of sandboxing layers in effect (or about to be) for this process.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SandboxStatus(u32);

// Variables set by the setuid helper before it executes us
pub(crate) const HELPER_FD_ENV_NAME: &str = "SANDBOX_HELPER_FD";
pub(crate) const PID_NS_ENV_NAME: &str = "SANDBOX_PID_NS";
pub(crate) const NET_NS_ENV_NAME: &str = "SANDBOX_NET_NS";

impl SandboxStatus {
    /// The privilege-dropping setuid helper launched this process.
    pub const SUID: Self = Self(1 << 0);
    /// Running in a dedicated PID namespace.
    pub const PID_NS: Self = Self(1 << 1);
    /// Running in a dedicated network namespace.
    pub const NET_NS: Self = Self(1 << 2);
    /// A syscall filter is (or will be) installed in promised process kinds.
    pub const SECCOMP_BPF: Self = Self(1 << 3);

    pub const fn empty() -> Self {
        Self(0)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn contains(self, other: Self) -> bool {
        (self.0 & other.0) == other.0
    }

    pub(crate) fn from_helper_environment() -> Self {
        let mut status = Self::empty();
        if std::env::var_os(HELPER_FD_ENV_NAME).is_some() {
            status |= Self::SUID;
            if std::env::var_os(PID_NS_ENV_NAME).is_some() {
                status |= Self::PID_NS;
            }
            if std::env::var_os(NET_NS_ENV_NAME).is_some() {
                status |= Self::NET_NS;
            }
        }
        status
    }
}

impl BitOr for SandboxStatus {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for SandboxStatus {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl core::fmt::Debug for SandboxStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let names = [
            (Self::SUID, "SUID"),
            (Self::PID_NS, "PID_NS"),
            (Self::NET_NS, "NET_NS"),
            (Self::SECCOMP_BPF, "SECCOMP_BPF"),
        ];
        let set: Vec<&str> = names
            .iter()
            .filter(|(bit, _)| self.contains(*bit))
            .map(|(_, name)| *name)
            .collect();
        if set.is_empty() {
            write!(f, "SandboxStatus(none)")
        } else {
            write!(f, "SandboxStatus({})", set.join(" | "))
        }
    }
}
