use common::common_test_setup;
use warden_worker::{BootstrapConfig, ProcessKind, SandboxBootstrap};

fn main() {
    common_test_setup();
    let mut bootstrap = SandboxBootstrap::new(BootstrapConfig::new().with_filter_disabled(true));
    match std::env::args().nth(1).as_deref() {
        // initialize() already seals
        Some("initialize") => {
            bootstrap.initialize(ProcessKind::Utility);
            bootstrap.initialize(ProcessKind::Utility);
        }
        _ => {
            bootstrap.preinitialize();
            bootstrap.seal();
            bootstrap.seal();
        }
    }
    println!(" [!] Sandbox sealed twice");
    std::process::exit(0);
}
