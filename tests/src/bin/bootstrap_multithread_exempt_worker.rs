use common::common_test_setup;
use std::time::Duration;
use warden_worker::{BootstrapConfig, ProcessKind, SandboxBootstrap, SandboxState};

fn main() {
    common_test_setup();
    let kind = match std::env::args().nth(1).as_deref() {
        Some("utility") => ProcessKind::Utility,
        // Promised a filter, which the exemption then overrides
        Some("renderer") => ProcessKind::Renderer,
        _ => ProcessKind::Gpu,
    };
    let config = BootstrapConfig::new()
        .with_race_detector(false)
        .with_exempt_kind(Some(kind));
    let mut bootstrap = SandboxBootstrap::new(config);
    bootstrap.preinitialize();
    let _thread = std::thread::spawn(|| loop {
        std::thread::sleep(Duration::from_secs(60));
    });
    assert!(!bootstrap.initialize(kind), "filter started while multi-threaded");
    assert!(!bootstrap.seccomp_bpf_started());
    assert!(bootstrap.exempted());
    assert_eq!(bootstrap.state(), SandboxState::Sealed);
    std::process::exit(0);
}
