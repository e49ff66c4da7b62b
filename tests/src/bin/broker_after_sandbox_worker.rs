use common::{common_test_setup, normalize_result};
use libc::{EPERM, O_RDONLY};
use std::io::Write;
use warden_broker::{BrokerConfig, BrokerError, BrokerProcess};
use warden_worker::{
    current_seccomp_mode, BootstrapConfig, ProcessKind, SandboxBootstrap, SandboxStatus,
};

// Typical launch sequence: probe, start the broker, then lock ourselves down
// and reach files through the broker only
fn main() {
    common_test_setup();
    let mut args = std::env::args().skip(1);
    let allowed = args.next().expect("usage: <allowed file> <denied file>");
    let denied = args.next().expect("usage: <allowed file> <denied file>");

    let mut bootstrap = SandboxBootstrap::new(BootstrapConfig::new().with_race_detector(false));
    bootstrap.preinitialize();
    let config = BrokerConfig::from_lists(&[allowed.as_str()], &[]).unwrap();
    let broker = BrokerProcess::spawn(&config).unwrap();

    let started = bootstrap.initialize(ProcessKind::Renderer);
    assert_eq!(
        started,
        bootstrap.get_status().contains(SandboxStatus::SECCOMP_BPF)
    );

    let client = broker.client();
    assert_eq!(
        normalize_result(client.open(allowed.as_bytes(), O_RDONLY)),
        0
    );
    assert_eq!(client.open(denied.as_bytes(), O_RDONLY), -EPERM);

    if started {
        assert_eq!(current_seccomp_mode(), 2);
        assert!(matches!(
            BrokerProcess::spawn(&config),
            Err(BrokerError::SandboxAlreadyEngaged)
        ));
        let res = unsafe { libc::unshare(libc::CLONE_NEWUSER) };
        assert_eq!(res, -1);
        assert_eq!(warden_ipc::errno(), EPERM, "unshare() was not filtered");
    }

    assert_eq!(broker.close_and_wait().unwrap(), 0);
    println!(" [+] Filter started: {}", started);
    let _ = std::io::stdout().flush();
    std::process::exit(0);
}
