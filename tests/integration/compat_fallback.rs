//! Integration tests for the accessor adapter
//!
//! These tests drive both API shapes through the public surface and check
//! that each call reaches exactly one accessor of the library's own shape,
//! with equivalent arguments, and that results and errors pass through.

use procwatch::compat::fake::{FakeLibrary, FakeProcess};
use procwatch::compat::{
    AddressFamily, Connection, ConnectionKind, ConnectionStatus, MemoryInfo, Resource,
    SocketType,
};
use procwatch::{ApiShape, Compat, Error};
use std::time::Duration;

fn established(local: &str, remote: &str) -> Connection {
    Connection {
        fd: Some(7),
        family: AddressFamily::Inet,
        socket_type: SocketType::Stream,
        laddr: Some(local.parse().unwrap()),
        raddr: Some(remote.parse().unwrap()),
        status: ConnectionStatus::Established,
        pid: None,
    }
}

fn table() -> Vec<FakeProcess> {
    vec![
        FakeProcess::new(100, "postgres")
            .with_cpu_percent(12.5)
            .with_memory(64 << 20, 256 << 20)
            .with_connection(established("127.0.0.1:5432", "127.0.0.1:40000")),
        FakeProcess::new(101, "gone").vanishes_on_read(),
    ]
}

fn library(shape: ApiShape) -> FakeLibrary {
    let lib = match shape {
        ApiShape::Modern => FakeLibrary::modern(),
        ApiShape::Legacy => FakeLibrary::legacy(),
    };
    table().into_iter().fold(lib, |lib, p| lib.with_process(p))
}

/// Legacy accessor invoked once with the same interval, value unchanged
#[test]
fn test_cpu_percent_legacy_called_once() {
    let compat = Compat::new(library(ApiShape::Legacy));
    let process = compat.process(100).unwrap();

    let pct = process.cpu_percent(Some(Duration::from_millis(100))).unwrap();
    assert_eq!(pct, 12.5);
    assert_eq!(
        process.inner().call_log(),
        vec!["get_cpu_percent(Some(100ms))".to_string()]
    );
}

#[test]
fn test_cpu_percent_modern_called_once() {
    let compat = Compat::new(library(ApiShape::Modern));
    let process = compat.process(100).unwrap();

    assert_eq!(process.cpu_percent(None).unwrap(), 12.5);
    assert_eq!(
        process.inner().call_log(),
        vec!["cpu_percent(None)".to_string()]
    );
}

#[test]
fn test_same_results_in_both_shapes() {
    for shape in [ApiShape::Modern, ApiShape::Legacy] {
        let compat = Compat::new(library(shape));
        let process = compat.process(100).unwrap();

        assert_eq!(process.shape(), shape);
        assert_eq!(process.name().unwrap(), "postgres");
        assert_eq!(process.cmdline().unwrap(), vec!["/usr/bin/postgres"]);
        assert_eq!(
            process.memory_info().unwrap(),
            MemoryInfo {
                rss: 64 << 20,
                vms: 256 << 20
            }
        );
        assert_eq!(process.memory_info_ex().unwrap().rss, 64 << 20);
        assert_eq!(process.num_threads().unwrap(), 1);
        assert_eq!(process.nice(None).unwrap(), 0);
        assert_eq!(process.nice(Some(5)).unwrap(), 5);
        assert_eq!(process.connections(ConnectionKind::Tcp).unwrap().len(), 1);
        assert!(process.connections(ConnectionKind::Udp).unwrap().is_empty());
        assert_eq!(process.rlimit(Resource::NoFile, None).unwrap().soft, None);

        // every call reached one accessor
        assert_eq!(process.inner().call_log().len(), 10);
    }
}

#[test]
fn test_legacy_call_log_uses_legacy_names() {
    let compat = Compat::new(library(ApiShape::Legacy));
    let process = compat.process(100).unwrap();

    process.cwd().unwrap();
    process.exe().unwrap();
    process.memory_info_ex().unwrap();
    process.memory_maps(true).unwrap();
    process.connections(ConnectionKind::Inet6).unwrap();

    assert_eq!(
        process.inner().call_log(),
        vec![
            "getcwd()",
            "exe_attr()",
            "get_ext_memory_info()",
            "get_memory_maps(true)",
            "get_connections(inet6)",
        ]
    );
}

#[test]
fn test_errors_pass_through_unchanged() {
    for shape in [ApiShape::Modern, ApiShape::Legacy] {
        let compat = Compat::new(library(shape));
        let gone = compat.process(101).unwrap();

        assert!(matches!(gone.cpu_times(), Err(Error::NoSuchProcess(101))));
        assert!(matches!(gone.io_counters(), Err(Error::NoSuchProcess(101))));
    }
}

#[test]
fn test_opening_unknown_pid_fails() {
    let compat = Compat::new(library(ApiShape::Modern));
    assert!(matches!(compat.process(4242), Err(Error::NoSuchProcess(4242))));
}

#[test]
fn test_fallback_stamps_owner_pid() {
    let compat = Compat::new(library(ApiShape::Legacy));
    let conns = compat.net_connections(ConnectionKind::Inet).unwrap();

    assert_eq!(conns.len(), 1);
    assert_eq!(conns[0].pid, Some(100));
    assert_eq!(conns[0].laddr.unwrap().port(), 5432);
}
