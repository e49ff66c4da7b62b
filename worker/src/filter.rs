use crate::bootstrap::ProcessKind;
use crate::error::FilterError;
use libc::{c_int, c_long, EFAULT};
use libseccomp::{ScmpAction, ScmpFilterContext, ScmpSyscall};
use log::{debug, info};
use warden_ipc::errno;

/// Compiles and loads the syscall filter of sandboxed processes.
pub trait SyscallFilter: Send {
    /// Whether a filter can actually be loaded in this process. Must not
    /// have side effects.
    fn is_supported(&self) -> bool;

    /// Installs the filter, irreversibly, in the calling process.
    fn install(&self, kind: ProcessKind) -> Result<(), FilterError>;
}

/// Value of the Seccomp field of /proc/self/status: 0 (disabled), 1 (strict)
/// or 2 (filter), or -1 if the kernel has no seccomp support.
pub fn current_seccomp_mode() -> c_int {
    unsafe { libc::prctl(libc::PR_GET_SECCOMP, 0, 0, 0, 0) }
}

// From linux/seccomp.h
const SECCOMP_SET_MODE_FILTER: c_long = 1;

/// Whether this process could load a filter synchronized to all its threads.
///
/// Asks the kernel to load a filter from a null pointer: a kernel able to do
/// it gets as far as reading the program and fails with EFAULT, anything
/// else (ENOSYS, EINVAL for a missing TSYNC, EPERM from a parent filter)
/// means loading a real one would fail too.
pub fn seccomp_filter_loadable() -> bool {
    let res = unsafe {
        libc::syscall(
            libc::SYS_seccomp,
            SECCOMP_SET_MODE_FILTER,
            libc::SECCOMP_FILTER_FLAG_TSYNC,
            std::ptr::null::<libc::sock_fprog>(),
        )
    };
    if res == 0 {
        // Cannot happen with a null program, but nothing tells us what got loaded
        return false;
    }
    let err = errno();
    debug!("seccomp(SECCOMP_SET_MODE_FILTER, NULL) probe failed with errno {}", err);
    err == EFAULT
}

// System calls which a sandboxed process never needs, and which grant access
// to the kernel or to other processes well beyond file access. Names unknown
// on this architecture are skipped.
const SYSCALLS_DENIED_BY_DEFAULT: [&str; 24] = [
    "ptrace",
    "process_vm_readv",
    "process_vm_writev",
    "mount",
    "umount2",
    "pivot_root",
    "chroot",
    "kexec_load",
    "init_module",
    "finit_module",
    "delete_module",
    "reboot",
    "swapon",
    "swapoff",
    "acct",
    "bpf",
    "perf_event_open",
    "keyctl",
    "add_key",
    "request_key",
    "unshare",
    "setns",
    "userfaultfd",
    "quotactl",
];

/// Default filter, compiled by libseccomp: allows everything but a list of
/// system calls, which fail with EPERM. Syscalls from another ABI than the
/// native one kill the process.
#[derive(Debug, Clone)]
pub struct DenylistFilter {
    denied: Vec<String>,
}

impl Default for DenylistFilter {
    fn default() -> Self {
        Self {
            denied: SYSCALLS_DENIED_BY_DEFAULT
                .iter()
                .map(|name| (*name).to_owned())
                .collect(),
        }
    }
}

impl DenylistFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// A filter denying nothing but the given system calls.
    pub fn empty() -> Self {
        Self { denied: vec![] }
    }

    /// Also deny the system call named `name`.
    pub fn deny(mut self, name: &str) -> Self {
        if !self.denied.iter().any(|n| n == name) {
            self.denied.push(name.to_owned());
        }
        self
    }

    pub fn denied_syscalls(&self) -> &[String] {
        &self.denied
    }

    fn build(&self) -> Result<ScmpFilterContext, FilterError> {
        let mut ctx = ScmpFilterContext::new_filter(ScmpAction::Allow)?;
        // All threads, including those started by libraries, get the filter
        ctx.set_ctl_tsync(true)?;
        for name in &self.denied {
            let syscall = match ScmpSyscall::from_name(name) {
                Ok(s) => s,
                Err(_) => {
                    debug!("Syscall {} unknown on this architecture, not denied", name);
                    continue;
                }
            };
            ctx.add_rule(ScmpAction::Errno(libc::EPERM), syscall)?;
        }
        Ok(ctx)
    }
}

impl SyscallFilter for DenylistFilter {
    fn is_supported(&self) -> bool {
        seccomp_filter_loadable()
    }

    fn install(&self, kind: ProcessKind) -> Result<(), FilterError> {
        debug!(
            "Loading syscall filter denying {} syscalls for {:?} process",
            self.denied.len(),
            kind
        );
        let ctx = self.build()?;
        ctx.load()?;
        info!("Syscall filter applied");
        Ok(())
    }
}
