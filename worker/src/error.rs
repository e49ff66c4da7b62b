use libc::c_int;

// Misuse of the bootstrap API by the calling program: log what happened and
// terminate immediately, without unwinding through the caller.
macro_rules! fatal {
    ($($arg: tt)+) => {{
        log::error!($($arg)+);
        std::process::abort()
    }};
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterError {
    LoadFailed { os_code: c_int },
    Libseccomp { description: String },
}

impl core::fmt::Display for FilterError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::LoadFailed { os_code } => {
                write!(f, "loading the syscall filter failed with errno {os_code}")
            }
            Self::Libseccomp { description } => write!(f, "libseccomp: {description}"),
        }
    }
}

impl std::error::Error for FilterError {}

impl From<libseccomp::error::SeccompError> for FilterError {
    fn from(e: libseccomp::error::SeccompError) -> Self {
        Self::Libseccomp {
            description: e.to_string(),
        }
    }
}
