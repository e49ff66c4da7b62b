use common::common_test_setup;
use warden_worker::{BootstrapConfig, SandboxBootstrap};

fn main() {
    common_test_setup();
    let mut bootstrap = SandboxBootstrap::new(BootstrapConfig::new());
    bootstrap.preinitialize();
    bootstrap.preinitialize();
    println!(" [!] Sandbox pre-initialized twice");
    std::process::exit(0);
}
