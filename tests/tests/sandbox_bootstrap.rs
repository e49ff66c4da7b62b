#![cfg(target_os = "linux")]

use common::{common_test_setup, run_worker, Fixture, EXIT_CODE_ABORTED};

// Each scenario runs in its own process: the bootstrap needs a process of its
// own, and misuses terminate it.

#[test]
fn single_threaded_initialization() {
    common_test_setup();
    let worker = env!("CARGO_BIN_EXE_bootstrap_single_thread_worker");
    assert_eq!(run_worker(worker, &[]), 0);
}

#[test]
fn multi_threaded_initialization_aborts() {
    common_test_setup();
    let worker = env!("CARGO_BIN_EXE_bootstrap_multithread_worker");
    assert_eq!(run_worker(worker, &[]), EXIT_CODE_ABORTED);
}

#[test]
fn multi_threaded_exempt_kind_runs_unfiltered() {
    common_test_setup();
    let worker = env!("CARGO_BIN_EXE_bootstrap_multithread_exempt_worker");
    assert_eq!(run_worker(worker, &["gpu"]), 0);
    assert_eq!(run_worker(worker, &["utility"]), 0);
    assert_eq!(run_worker(worker, &["renderer"]), 0);
}

#[test]
fn unsupported_filter_degrades_truthfully() {
    common_test_setup();
    let worker = env!("CARGO_BIN_EXE_bootstrap_filter_worker");
    assert_eq!(run_worker(worker, &["unsupported"]), 0);
    assert_eq!(run_worker(worker, &["blocked-by-parent-filter"]), 0);
}

#[test]
fn failed_filter_install_breaks_promises() {
    common_test_setup();
    let worker = env!("CARGO_BIN_EXE_bootstrap_filter_worker");
    assert_eq!(run_worker(worker, &["install-fails-unpromised"]), 0);
    assert_eq!(
        run_worker(worker, &["install-fails-promised"]),
        EXIT_CODE_ABORTED
    );
}

#[test]
fn denylist_filter_is_enforced() {
    common_test_setup();
    let worker = env!("CARGO_BIN_EXE_bootstrap_filter_worker");
    assert_eq!(run_worker(worker, &["default-denylist"]), 0);
    assert_eq!(run_worker(worker, &["custom-denylist"]), 0);
}

#[test]
fn race_detector_runs_unfiltered() {
    common_test_setup();
    let worker = env!("CARGO_BIN_EXE_bootstrap_race_detector_worker");
    assert_eq!(run_worker(worker, &[]), 0);
}

#[test]
fn double_preinitialization_aborts() {
    common_test_setup();
    let worker = env!("CARGO_BIN_EXE_bootstrap_double_preinit_worker");
    assert_eq!(run_worker(worker, &[]), EXIT_CODE_ABORTED);
}

#[test]
fn sealing_twice_aborts() {
    common_test_setup();
    let worker = env!("CARGO_BIN_EXE_bootstrap_seal_twice_worker");
    assert_eq!(run_worker(worker, &["seal"]), EXIT_CODE_ABORTED);
    assert_eq!(run_worker(worker, &["initialize"]), EXIT_CODE_ABORTED);
}

#[test]
fn broker_serves_sandboxed_process() {
    common_test_setup();
    let fixture = Fixture::new();
    fixture.create_file("allowed.txt", b"allowed");
    fixture.create_file("denied.txt", b"denied");
    let worker = env!("CARGO_BIN_EXE_broker_after_sandbox_worker");
    let allowed = fixture.path_str("allowed.txt");
    let denied = fixture.path_str("denied.txt");
    assert_eq!(run_worker(worker, &[allowed.as_str(), denied.as_str()]), 0);
}
