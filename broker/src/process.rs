use crate::{BrokerConfig, BrokerError, BrokerServer};
use libc::{c_int, pid_t};
use log::{debug, error, info, warn};
use std::ffi::CStr;
use std::panic::AssertUnwindSafe;
use warden_ipc::{errno, IpcChannel};
use warden_worker::{current_seccomp_mode, BrokerClient};

// Value of PR_GET_SECCOMP once a filter is installed
const SECCOMP_MODE_FILTER: c_int = 2;

/// Broker server running in a forked child process, and the client
/// connected to it.
///
/// Must be spawned before the calling process installs its own syscall
/// filter. Dropping it closes the channel, which makes the broker exit,
/// and reaps the child.
///
/// The broker is a plain `fork()` of the caller, which then allocates and
/// logs before serving. The caller must be single-threaded when spawning,
/// or at least have no other thread holding the allocator, logger or stdio
/// locks: the child only inherits the calling thread, and would wait forever
/// on a lock taken by one of the others.
#[derive(Debug)]
pub struct BrokerProcess {
    pid: pid_t,
    client: BrokerClient,
    exit_code: Option<c_int>,
}

impl BrokerProcess {
    /// Forks the broker. See the type documentation for the threading
    /// precondition.
    pub fn spawn(config: &BrokerConfig) -> Result<Self, BrokerError> {
        Self::spawn_with_init(config, || true)
    }

    /// Like [`spawn`](Self::spawn), also running `init` in the broker
    /// process before it serves any request. If `init` returns false, the
    /// broker exits with code 1.
    pub fn spawn_with_init<F>(config: &BrokerConfig, init: F) -> Result<Self, BrokerError>
    where
        F: FnOnce() -> bool,
    {
        if current_seccomp_mode() == SECCOMP_MODE_FILTER {
            return Err(BrokerError::SandboxAlreadyEngaged);
        }
        let (client_channel, server_channel) = IpcChannel::new()?;
        let pid = unsafe { libc::fork() };
        if pid < 0 {
            return Err(BrokerError::InternalOsOperationFailed {
                description: "fork() failed".to_owned(),
                os_code: errno(),
            });
        }
        if pid == 0 {
            drop(client_channel);
            run_broker_child(server_channel, config, init);
        }
        drop(server_channel);
        info!("Broker process {} started", pid);
        let client = BrokerClient::new(
            client_channel,
            config.policy.clone(),
            config.denial_errno,
            config.fast_check_in_client,
        );
        Ok(Self {
            pid,
            client,
            exit_code: None,
        })
    }

    pub fn pid(&self) -> pid_t {
        self.pid
    }

    pub fn client(&self) -> &BrokerClient {
        &self.client
    }

    /// Blocks until the broker exits. Returns its exit code, or 128 plus
    /// the signal number if it was killed.
    pub fn wait_for_exit(&mut self) -> Result<c_int, BrokerError> {
        if let Some(code) = self.exit_code {
            return Ok(code);
        }
        let mut wstatus: c_int = 0;
        let res = loop {
            let res = unsafe { libc::waitpid(self.pid, &mut wstatus as *mut _, 0) };
            if res >= 0 || errno() != libc::EINTR {
                break res;
            }
        };
        let code = if res == -1 {
            return Err(BrokerError::InternalOsOperationFailed {
                description: format!("waitpid({}) failed", self.pid),
                os_code: errno(),
            });
        } else if libc::WIFEXITED(wstatus) {
            libc::WEXITSTATUS(wstatus)
        } else if libc::WIFSIGNALED(wstatus) {
            128 + libc::WTERMSIG(wstatus)
        } else {
            return Err(BrokerError::UnexpectedExitStatus { wstatus });
        };
        debug!("Broker process {} exited with code {}", self.pid, code);
        self.exit_code = Some(code);
        Ok(code)
    }

    /// Closes the client side of the channel, then waits for the broker to
    /// exit.
    pub fn close_and_wait(mut self) -> Result<c_int, BrokerError> {
        self.client.disconnect();
        self.wait_for_exit()
    }
}

impl Drop for BrokerProcess {
    fn drop(&mut self) {
        self.client.disconnect();
        if let Err(e) = self.wait_for_exit() {
            warn!("Unable to reap broker process {}: {}", self.pid, e);
        }
    }
}

fn run_broker_child<F>(channel: IpcChannel, config: &BrokerConfig, init: F) -> !
where
    F: FnOnce() -> bool,
{
    close_inherited_fds(channel.as_handle().as_raw());
    let serve = move || {
        if !init() {
            error!("Broker initialization callback failed");
            return 1;
        }
        match BrokerServer::from_config(channel, config).run() {
            Ok(()) => 0,
            Err(e) => {
                error!("Broker exiting: {}", e);
                1
            }
        }
    };
    // Never unwind into the code of the launcher, which we are a copy of
    let code = std::panic::catch_unwind(AssertUnwindSafe(serve)).unwrap_or(2);
    unsafe { libc::_exit(code) }
}

// Anything else than stdio and the channel was opened by the launcher, and
// keeping it would, for instance, keep other channels from reporting
// end-of-stream.
fn close_inherited_fds(keep: c_int) {
    let fds_path = unsafe { CStr::from_ptr(b"/proc/self/fd/\0".as_ptr() as *const _) };
    let fds_fd = unsafe {
        libc::open(
            fds_path.as_ptr(),
            libc::O_RDONLY | libc::O_DIRECTORY | libc::O_CLOEXEC,
        )
    };
    if fds_fd < 0 {
        error!("open(/proc/self/fd/) failed with errno {}", errno());
        return;
    }
    let fds_dir = unsafe { libc::fdopendir(fds_fd) };
    if fds_dir.is_null() {
        error!("fdopendir(/proc/self/fd/) failed with errno {}", errno());
        unsafe { libc::close(fds_fd) };
        return;
    }
    loop {
        unsafe { *(libc::__errno_location()) = 0 };
        let entry = unsafe { libc::readdir(fds_dir) };
        if entry.is_null() {
            if errno() != 0 {
                error!("readdir(/proc/self/fd/) failed with errno {}", errno());
            }
            break;
        }
        let num_str = unsafe { CStr::from_ptr((*entry).d_name.as_ptr()) };
        let fd: c_int = match num_str.to_str().ok().and_then(|s| s.parse().ok()) {
            Some(n) => n,
            None => continue, // "." and ".."
        };
        // Closing the descriptor used by readdir() would break the enumeration
        if fd <= libc::STDERR_FILENO || fd == keep || fd == fds_fd {
            continue;
        }
        // Errors are ignored, nothing else in this process uses these
        unsafe { libc::close(fd) };
    }
    unsafe { libc::closedir(fds_dir) };
}
