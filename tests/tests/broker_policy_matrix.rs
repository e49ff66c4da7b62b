#![cfg(target_os = "linux")]

use common::{common_test_setup, normalize_result, path_bytes, running_as_root, Fixture};
use libc::{
    c_int, EACCES, ENOENT, EPERM, F_OK, O_CREAT, O_RDONLY, O_RDWR, O_WRONLY, R_OK, W_OK, X_OK,
};
use std::os::unix::fs::PermissionsExt;
use warden_broker::{BrokerConfig, BrokerProcess, PathPolicy};

struct Case {
    path: Vec<u8>,
    open_flags: Vec<(c_int, c_int)>,
    access_modes: Vec<(c_int, c_int)>,
}

// Forking from the test harness is only reliable with a single test per binary
#[test]
fn broker_policy_matrix() {
    common_test_setup();
    let fixture = Fixture::new();
    let read_only = fixture.create_file("ro.txt", b"ro");
    let write_only = fixture.create_file("wo.txt", b"wo");
    let read_write = fixture.create_file("rw.txt", b"rw");
    let unlisted = fixture.create_file("unlisted.txt", b"secret");
    let dir = fixture.create_dir("dir");
    let in_dir = fixture.create_file("dir/a.txt", b"a");
    let sibling = fixture.create_file("dirsibling/a.txt", b"sibling");
    let unreadable = fixture.create_file("dir/unreadable.txt", b"");
    std::fs::set_permissions(&unreadable, std::fs::Permissions::from_mode(0o000)).unwrap();
    let missing = fixture.path("dir/missing.txt");
    let to_create = fixture.path("dir/created.txt");

    let dir_prefix = format!("{}/", fixture.path_str("dir"));
    let (ro_str, wo_str, rw_str) = (
        fixture.path_str("ro.txt"),
        fixture.path_str("wo.txt"),
        fixture.path_str("rw.txt"),
    );
    let policy = PathPolicy::from_lists(
        &[ro_str.as_str(), rw_str.as_str(), dir_prefix.as_str()],
        &[wo_str.as_str(), rw_str.as_str()],
    )
    .unwrap();

    for denial_errno in [EPERM, ENOENT] {
        let deny = -denial_errno;
        let mut cases = vec![
            Case {
                path: path_bytes(&read_only).to_vec(),
                open_flags: vec![(O_RDONLY, 0), (O_WRONLY, deny), (O_RDWR, deny)],
                access_modes: vec![(F_OK, 0), (R_OK, 0), (W_OK, deny), (X_OK, deny)],
            },
            Case {
                path: path_bytes(&write_only).to_vec(),
                open_flags: vec![(O_RDONLY, deny), (O_WRONLY, 0), (O_RDWR, deny)],
                access_modes: vec![(F_OK, 0), (R_OK, deny), (W_OK, 0), (X_OK, deny)],
            },
            Case {
                path: path_bytes(&read_write).to_vec(),
                open_flags: vec![(O_RDONLY, 0), (O_WRONLY, 0), (O_RDWR, 0)],
                access_modes: vec![(F_OK, 0), (R_OK | W_OK, 0), (X_OK, deny)],
            },
            Case {
                path: path_bytes(&unlisted).to_vec(),
                open_flags: vec![(O_RDONLY, deny), (O_WRONLY, deny)],
                access_modes: vec![(F_OK, deny), (R_OK, deny)],
            },
            Case {
                path: path_bytes(&in_dir).to_vec(),
                open_flags: vec![(O_RDONLY, 0), (O_WRONLY, deny)],
                access_modes: vec![(R_OK, 0), (W_OK, deny)],
            },
            Case {
                path: path_bytes(&dir).to_vec(),
                open_flags: vec![(O_RDONLY | libc::O_DIRECTORY, 0)],
                access_modes: vec![(F_OK, 0)],
            },
            Case {
                path: path_bytes(&sibling).to_vec(),
                open_flags: vec![(O_RDONLY, deny)],
                access_modes: vec![(F_OK, deny)],
            },
            Case {
                path: format!("{}../ro.txt", dir_prefix).into_bytes(),
                open_flags: vec![(O_RDONLY, deny)],
                access_modes: vec![(F_OK, deny)],
            },
            Case {
                path: b"ro.txt".to_vec(),
                open_flags: vec![(O_RDONLY, deny)],
                access_modes: vec![(F_OK, deny)],
            },
            Case {
                path: path_bytes(&in_dir).to_vec(),
                open_flags: vec![(O_WRONLY | O_RDWR, deny)],
                access_modes: vec![(0x40, deny), (-1, deny)],
            },
            Case {
                path: path_bytes(&to_create).to_vec(),
                open_flags: vec![(O_RDONLY | O_CREAT, deny)],
                access_modes: vec![],
            },
        ];
        if !running_as_root() {
            cases.push(Case {
                path: path_bytes(&unreadable).to_vec(),
                open_flags: vec![(O_RDONLY, -EACCES)],
                access_modes: vec![(R_OK, -EACCES), (F_OK, 0)],
            });
        }
        if denial_errno == EPERM {
            // With ENOENT as denial errno, this would prove nothing
            cases.push(Case {
                path: path_bytes(&missing).to_vec(),
                open_flags: vec![(O_RDONLY, -ENOENT)],
                access_modes: vec![(F_OK, -ENOENT)],
            });
        }

        let mut results_by_mode = Vec::new();
        for fast in [true, false] {
            let config = BrokerConfig::new(policy.clone())
                .with_denial_errno(denial_errno)
                .unwrap()
                .with_fast_check_in_client(fast);
            let broker = BrokerProcess::spawn(&config).expect("unable to spawn broker");
            let client = broker.client();
            let mut results = Vec::new();
            for case in &cases {
                let shown = String::from_utf8_lossy(&case.path);
                for &(flags, expected) in &case.open_flags {
                    let res = normalize_result(client.open(&case.path, flags));
                    println!("open({}, {:#x}) = {} (fast: {})", shown, flags, res, fast);
                    assert_eq!(
                        res, expected,
                        "open({}, {:#x}) returned {} (fast: {})",
                        shown, flags, res, fast
                    );
                    results.push(res);
                }
                for &(mode, expected) in &case.access_modes {
                    let res = client.access(&case.path, mode);
                    println!("access({}, {}) = {} (fast: {})", shown, mode, res, fast);
                    assert_eq!(
                        res, expected,
                        "access({}, {}) returned {} (fast: {})",
                        shown, mode, res, fast
                    );
                    results.push(res);
                }
            }
            assert!(
                !to_create.exists(),
                "a denied O_CREAT request created its file"
            );
            assert!(client.is_connected());
            assert_eq!(broker.close_and_wait().unwrap(), 0);
            results_by_mode.push(results);
        }
        assert_eq!(
            results_by_mode[0], results_by_mode[1],
            "client-side checks changed the outcome of requests"
        );
    }
}
