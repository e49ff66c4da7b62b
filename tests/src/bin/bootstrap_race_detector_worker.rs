use common::common_test_setup;
use std::time::Duration;
use warden_worker::{BootstrapConfig, ProcessKind, SandboxBootstrap, SandboxState, SandboxStatus};

// Race detectors run their own threads: the sandbox starts without filter
// instead of aborting, and does not promise one either
fn main() {
    common_test_setup();
    let mut bootstrap = SandboxBootstrap::new(BootstrapConfig::new().with_race_detector(true));
    assert!(!bootstrap.get_status().contains(SandboxStatus::SECCOMP_BPF));
    let _thread = std::thread::spawn(|| loop {
        std::thread::sleep(Duration::from_secs(60));
    });
    assert!(!bootstrap.initialize(ProcessKind::Renderer));
    assert_eq!(bootstrap.state(), SandboxState::Sealed);
    std::process::exit(0);
}
