use crate::filter::{DenylistFilter, SyscallFilter};
use crate::limits::limit_address_space;
use crate::status::SandboxStatus;
use crate::threads::{count_threads, has_open_directory, open_proc};
use libc::rlim_t;
use log::{debug, info, warn};
use warden_ipc::Handle;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProcessKind {
    Launcher,
    Renderer,
    Worker,
    Plugin,
    Gpu,
    Utility,
}

impl ProcessKind {
    /// Kinds for which a supported syscall filter is guaranteed to be running
    /// once `initialize()` returns.
    pub fn is_promised(self) -> bool {
        matches!(
            self,
            ProcessKind::Renderer | ProcessKind::Worker | ProcessKind::Plugin
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SandboxState {
    Uninitialized,
    PreInitialized,
    Sealed,
}

#[cfg(target_pointer_width = "64")]
const DEFAULT_ADDRESS_SPACE_LIMIT: rlim_t = 1 << 34;
#[cfg(not(target_pointer_width = "64"))]
const DEFAULT_ADDRESS_SPACE_LIMIT: rlim_t = rlim_t::MAX;
#[cfg(target_pointer_width = "64")]
const DEFAULT_DATA_SEGMENT_LIMIT: rlim_t = 1 << 33;
#[cfg(not(target_pointer_width = "64"))]
const DEFAULT_DATA_SEGMENT_LIMIT: rlim_t = 1 << 30;

/// Settings provided by the launcher, consumed once by [`SandboxBootstrap::new`].
pub struct BootstrapConfig {
    address_space_limit: Option<rlim_t>,
    data_segment_limit: Option<rlim_t>,
    exempt_kind: Option<ProcessKind>,
    race_detector: bool,
    filter_disabled: bool,
    filter: Box<dyn SyscallFilter>,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        let filter: Box<dyn SyscallFilter> = Box::new(DenylistFilter::default());
        Self {
            address_space_limit: Some(DEFAULT_ADDRESS_SPACE_LIMIT),
            data_segment_limit: Some(DEFAULT_DATA_SEGMENT_LIMIT),
            exempt_kind: Some(ProcessKind::Gpu),
            race_detector: cfg!(feature = "race-detector"),
            filter_disabled: false,
            filter,
        }
    }
}

impl BootstrapConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lowers RLIMIT_AS to at most `limit` bytes. `None` leaves it untouched.
    pub fn with_address_space_limit(mut self, limit: Option<rlim_t>) -> Self {
        self.address_space_limit = limit;
        self
    }

    /// Lowers RLIMIT_DATA to at most `limit` bytes. `None` leaves it untouched.
    pub fn with_data_segment_limit(mut self, limit: Option<rlim_t>) -> Self {
        self.data_segment_limit = limit;
        self
    }

    /// Process kind allowed to call `initialize()` while multi-threaded (it
    /// then runs without syscall filter). `None` exempts nobody.
    pub fn with_exempt_kind(mut self, kind: Option<ProcessKind>) -> Self {
        self.exempt_kind = kind;
        self
    }

    pub fn with_race_detector(mut self, running_under_race_detector: bool) -> Self {
        self.race_detector = running_under_race_detector;
        self
    }

    pub fn with_filter_disabled(mut self, disabled: bool) -> Self {
        self.filter_disabled = disabled;
        self
    }

    pub fn with_syscall_filter(mut self, filter: Box<dyn SyscallFilter>) -> Self {
        self.filter = filter;
        self
    }
}

impl core::fmt::Debug for BootstrapConfig {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("BootstrapConfig")
            .field("address_space_limit", &self.address_space_limit)
            .field("data_segment_limit", &self.data_segment_limit)
            .field("exempt_kind", &self.exempt_kind)
            .field("race_detector", &self.race_detector)
            .field("filter_disabled", &self.filter_disabled)
            .finish()
    }
}

/// Sets up the restricted execution environment of the calling process.
///
/// Owned by the startup routine of the process. The state only moves forward:
/// `Uninitialized`, then `PreInitialized` (early probes, and a handle to /proc
/// in debug builds), then `Sealed` once `initialize()` has run, after which
/// nothing can be set up again.
#[derive(Debug)]
pub struct SandboxBootstrap {
    config: BootstrapConfig,
    state: SandboxState,
    proc_fd: Option<Handle>,
    seccomp_bpf_supported: bool,
    seccomp_bpf_started: bool,
    exempted: bool,
    status: Option<SandboxStatus>,
}

// Runs on every exit path of initialize()
struct Sealer<'a> {
    bootstrap: &'a mut SandboxBootstrap,
    kind: ProcessKind,
}

impl Drop for Sealer<'_> {
    fn drop(&mut self) {
        self.bootstrap.check_promises(self.kind);
        self.bootstrap.seal();
    }
}

impl SandboxBootstrap {
    pub fn new(config: BootstrapConfig) -> Self {
        Self {
            config,
            state: SandboxState::Uninitialized,
            proc_fd: None,
            seccomp_bpf_supported: false,
            seccomp_bpf_started: false,
            exempted: false,
            status: None,
        }
    }

    pub fn state(&self) -> SandboxState {
        self.state
    }

    pub fn seccomp_bpf_supported(&self) -> bool {
        self.seccomp_bpf_supported
    }

    pub fn seccomp_bpf_started(&self) -> bool {
        self.seccomp_bpf_started
    }

    /// Whether `initialize()` let the exempt kind start multi-threaded.
    pub fn exempted(&self) -> bool {
        self.exempted
    }

    /// Early, side-effect free probing. Must run before any thread is started
    /// and before the broker is spawned. Calling it twice is fatal.
    pub fn preinitialize(&mut self) {
        if self.state != SandboxState::Uninitialized {
            fatal!("Sandbox pre-initialization requested twice");
        }
        match open_proc() {
            // Only kept to help debugging, release builds re-open /proc when needed
            Ok(fd) if cfg!(debug_assertions) => self.proc_fd = Some(fd),
            Ok(_) => (),
            Err(e) => warn!("Unable to open /proc (errno {}), thread counting may fail", e),
        }
        self.seccomp_bpf_supported = self.config.filter.is_supported();
        debug!(
            "Sandbox pre-initialized (syscall filter supported: {})",
            self.seccomp_bpf_supported
        );
        self.state = SandboxState::PreInitialized;
    }

    /// Layers of sandboxing in effect, or promised once `initialize()` runs.
    /// Pre-initializes if needed. Computed once, then never changes.
    pub fn get_status(&mut self) -> SandboxStatus {
        if let Some(status) = self.status {
            return status;
        }
        if self.state == SandboxState::Uninitialized {
            self.preinitialize();
        }
        let mut status = SandboxStatus::from_helper_environment();
        if self.seccomp_filter_should_be_enabled() {
            status |= SandboxStatus::SECCOMP_BPF;
        }
        self.status = Some(status);
        status
    }

    fn seccomp_filter_should_be_enabled(&self) -> bool {
        self.seccomp_bpf_supported && !self.config.filter_disabled && !self.config.race_detector
    }

    /// Restricts the calling process: lowers its memory limits and installs
    /// the syscall filter. Returns whether the filter is now running.
    ///
    /// The process must be single-threaded. Otherwise, unless `kind` is the
    /// exempt kind or a race detector is in use, this aborts the process.
    /// The sandbox is sealed when this returns, whatever the outcome.
    pub fn initialize(&mut self, kind: ProcessKind) -> bool {
        match self.state {
            SandboxState::Sealed => fatal!("Sandbox initialization requested after sealing"),
            SandboxState::Uninitialized => self.preinitialize(),
            SandboxState::PreInitialized => (),
        }
        let sealer = Sealer {
            bootstrap: self,
            kind,
        };
        sealer.bootstrap.initialize_sealed(kind)
    }

    fn initialize_sealed(&mut self, kind: ProcessKind) -> bool {
        let single_threaded = match count_threads(self.proc_fd.as_ref()) {
            Ok(n) => {
                debug!("{} thread(s) running at sandbox initialization", n);
                n == 1
            }
            Err(e) => {
                warn!("Unable to count threads (errno {}), assuming several", e);
                false
            }
        };
        if !single_threaded {
            if self.config.race_detector {
                // Race detectors start their own threads, run unsandboxed
                return false;
            }
            if Some(kind) == self.config.exempt_kind {
                // No promise holds for a process which took the exemption
                self.exempted = true;
                warn!(
                    "{:?} process is multi-threaded, starting without syscall filter",
                    kind
                );
                return false;
            }
            fatal!(
                "Sandbox initialization of {:?} process requested while multi-threaded",
                kind
            );
        }

        if let Err(e) =
            limit_address_space(self.config.address_space_limit, self.config.data_segment_limit)
        {
            warn!("Unable to lower memory limits (errno {})", e);
        }

        if self.seccomp_filter_should_be_enabled() {
            match self.config.filter.install(kind) {
                Ok(()) => self.seccomp_bpf_started = true,
                Err(e) => warn!("Unable to start syscall filter: {}", e),
            }
        }
        info!(
            "{:?} process sandbox initialized (syscall filter running: {})",
            kind, self.seccomp_bpf_started
        );
        self.seccomp_bpf_started
    }

    /// Aborts if the status reported SECCOMP_BPF but a promised process kind
    /// ended up running without filter, unless it was started multi-threaded
    /// as the exempt kind.
    pub fn check_promises(&mut self, kind: ProcessKind) {
        if !kind.is_promised() || self.exempted {
            return;
        }
        if self.get_status().contains(SandboxStatus::SECCOMP_BPF) && !self.seccomp_bpf_started {
            fatal!(
                "Syscall filter was promised to {:?} process but is not running",
                kind
            );
        }
    }

    /// Closes the /proc handle for good. Sealing twice is fatal.
    pub fn seal(&mut self) {
        if self.state == SandboxState::Sealed {
            fatal!("Sandbox sealed twice");
        }
        self.proc_fd = None;
        self.state = SandboxState::Sealed;
    }

    /// Whether the process holds a directory descriptor, other than the one
    /// to /proc used for setup.
    pub fn has_open_directories(&self) -> bool {
        has_open_directory(self.proc_fd.as_ref(), self.proc_fd.as_ref())
    }
}
