use common::common_test_setup;
use libc::EPERM;
use warden_worker::{
    current_seccomp_mode, seccomp_filter_loadable, BootstrapConfig, DenylistFilter, FilterError,
    ProcessKind, SandboxBootstrap, SandboxState, SandboxStatus, SyscallFilter,
};

// Stands in for a kernel that cannot load our filter, or refuses it
struct FakeFilter {
    supported: bool,
}

impl SyscallFilter for FakeFilter {
    fn is_supported(&self) -> bool {
        self.supported
    }

    fn install(&self, _kind: ProcessKind) -> Result<(), FilterError> {
        assert!(self.supported, "install() called on an unsupported filter");
        Err(FilterError::LoadFailed { os_code: EPERM })
    }
}

fn bootstrap_with(filter: Box<dyn SyscallFilter>) -> SandboxBootstrap {
    let config = BootstrapConfig::new()
        .with_race_detector(false)
        .with_syscall_filter(filter);
    SandboxBootstrap::new(config)
}

// Without a filter, the status must say so and nothing is promised
fn expect_degraded(mut bootstrap: SandboxBootstrap, kind: ProcessKind) {
    let status = bootstrap.get_status();
    assert!(!status.contains(SandboxStatus::SECCOMP_BPF), "{:?}", status);
    assert!(!bootstrap.seccomp_bpf_supported());
    assert!(!bootstrap.initialize(kind));
    assert!(!bootstrap.seccomp_bpf_started());
    assert_eq!(bootstrap.state(), SandboxState::Sealed);
}

fn errno_of(res: libc::c_long) -> i32 {
    assert_eq!(res, -1);
    warden_ipc::errno()
}

fn main() {
    common_test_setup();
    let scenario = std::env::args().nth(1).unwrap_or_default();
    match scenario.as_str() {
        "unsupported" => {
            let bootstrap = bootstrap_with(Box::new(FakeFilter { supported: false }));
            expect_degraded(bootstrap, ProcessKind::Renderer);
        }
        "install-fails-unpromised" => {
            let mut bootstrap = bootstrap_with(Box::new(FakeFilter { supported: true }));
            assert!(bootstrap.get_status().contains(SandboxStatus::SECCOMP_BPF));
            assert!(!bootstrap.initialize(ProcessKind::Utility));
        }
        "install-fails-promised" => {
            // Announced, then not delivered: must not go unnoticed
            let mut bootstrap = bootstrap_with(Box::new(FakeFilter { supported: true }));
            assert!(bootstrap.get_status().contains(SandboxStatus::SECCOMP_BPF));
            bootstrap.initialize(ProcessKind::Renderer);
            println!(" [!] Promised filter failed silently");
        }
        "blocked-by-parent-filter" => {
            if !seccomp_filter_loadable() {
                println!(" [.] Syscall filters unavailable here, nothing to check");
                std::process::exit(0);
            }
            DenylistFilter::empty()
                .deny("seccomp")
                .install(ProcessKind::Utility)
                .expect("unable to load the parent filter");
            assert!(!seccomp_filter_loadable());
            let bootstrap = bootstrap_with(Box::new(DenylistFilter::default()));
            expect_degraded(bootstrap, ProcessKind::Renderer);
        }
        "custom-denylist" => {
            if !seccomp_filter_loadable() {
                println!(" [.] Syscall filters unavailable here, nothing to check");
                std::process::exit(0);
            }
            let filter = DenylistFilter::empty()
                .deny("getppid")
                .deny("not_a_real_syscall");
            let mut bootstrap = bootstrap_with(Box::new(filter));
            assert!(bootstrap.get_status().contains(SandboxStatus::SECCOMP_BPF));
            assert!(bootstrap.initialize(ProcessKind::Renderer));
            assert_eq!(current_seccomp_mode(), 2);
            assert_eq!(errno_of(unsafe { libc::syscall(libc::SYS_getppid) }), EPERM);
            assert!(unsafe { libc::getpid() } > 0);
        }
        "default-denylist" => {
            if !seccomp_filter_loadable() {
                println!(" [.] Syscall filters unavailable here, nothing to check");
                std::process::exit(0);
            }
            let mut bootstrap = bootstrap_with(Box::new(DenylistFilter::new()));
            assert!(bootstrap.initialize(ProcessKind::Worker));
            let res = unsafe { libc::unshare(libc::CLONE_NEWUSER) };
            assert_eq!(errno_of(res.into()), EPERM);
            let res = unsafe { libc::syscall(libc::SYS_ptrace, libc::PTRACE_TRACEME, 0, 0, 0) };
            assert_eq!(errno_of(res), EPERM);
        }
        other => panic!("unknown scenario {:?}", other),
    }
    std::process::exit(0);
}
