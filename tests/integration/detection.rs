//! Integration tests for the detection helpers
//!
//! The scripted tests run everywhere; the live ones read this machine's
//! process table and sockets and are Linux-only.

use procwatch::compat::fake::{FakeLibrary, FakeProcess};
use procwatch::compat::{AddressFamily, Connection, ConnectionStatus, SocketType};
use procwatch::detection::{watch_directory, watch_file_size, watch_process};
use procwatch::{DetectionConfig, Detector};
use serde_json::json;
use std::net::IpAddr;

fn listener(addr: &str) -> Connection {
    Connection {
        fd: Some(3),
        family: AddressFamily::Inet6,
        socket_type: SocketType::Stream,
        laddr: Some(addr.parse().unwrap()),
        raddr: None,
        status: ConnectionStatus::Listen,
        pid: None,
    }
}

#[test]
fn test_mapped_listener_through_process_walk() {
    let lib = FakeLibrary::legacy()
        .with_process(FakeProcess::new(1, "denied").access_denied())
        .with_process(
            FakeProcess::new(2, "haproxy").with_connection(listener("[::ffff:10.0.0.5]:8080")),
        );
    let detector = Detector::new(lib);

    let addr = detector.find_addr_listening_on_port_over_tcp(8080).unwrap();
    assert_eq!(addr, Some("10.0.0.5".parse::<IpAddr>().unwrap()));
}

#[test]
fn test_same_socket_in_two_processes_reported_per_owner() {
    // a listening socket inherited across fork shows up under both pids
    let lib = FakeLibrary::legacy()
        .with_process(FakeProcess::new(10, "nginx").with_connection(listener("[::]:80")))
        .with_process(FakeProcess::new(11, "nginx").with_connection(listener("[::]:80")));
    let detector = Detector::new(lib);

    let addrs = detector.find_addrs_listening_on_port(80, None).unwrap();
    assert_eq!(addrs.len(), 2);
    assert!(addrs.iter().all(|a| *a == "::".parse::<IpAddr>().unwrap()));
}

#[test]
fn test_self_marker_never_matches() {
    let lib = FakeLibrary::modern()
        .with_process(
            FakeProcess::new(5, "python").with_cmdline(&["python", "monasca-setup", "--detect", "rabbitmq"]),
        )
        .with_process(FakeProcess::new(6, "beam.smp").with_cmdline(&["beam.smp", "-s", "rabbit"]));
    let config = DetectionConfig::builder()
        .self_marker("monasca-setup")
        .build()
        .unwrap();
    let detector = Detector::with_config(lib, config);

    let found = detector.find_process_cmdline("rabbit").unwrap().unwrap();
    assert_eq!(found.pid(), 6);
    assert!(detector.find_process_cmdline("--detect").unwrap().is_none());
}

#[test]
fn test_merged_agent_config() {
    let mut config = watch_process(["nova-api"]).service("compute").build().unwrap();
    config.merge(watch_process(["nova-compute"]).service("compute").build().unwrap());
    config.merge(watch_directory("/var/lib/nova/instances").build().unwrap());
    config.merge(watch_file_size("/var/log/nova", ["nova-api.log"]).build().unwrap());

    let value = serde_json::to_value(&config).unwrap();
    assert_eq!(
        value["process"]["instances"][1],
        json!({
            "name": "nova-compute",
            "detailed": true,
            "exact_match": true,
            "search_string": ["nova-compute"],
            "dimensions": {"service": "compute"}
        })
    );
    assert_eq!(value["directory"]["init_config"], json!(null));
    assert_eq!(value["file_size"]["instances"][0]["recursive"], json!(false));
}

#[cfg(target_os = "linux")]
mod live {
    use super::*;
    use procwatch::compat::procfs_backend::ProcfsLibrary;
    use procwatch::compat::sysinfo_backend::SysinfoLibrary;
    use procwatch::compat::ConnectionKind;
    use std::net::TcpListener;
    use std::process::Command;
    use std::sync::mpsc;

    fn listener_owners<L: procwatch::ProcessLibrary>(detector: &Detector<L>, port: u16) -> Vec<Option<u32>> {
        detector
            .compat()
            .net_connections(ConnectionKind::Tcp4)
            .unwrap()
            .into_iter()
            .filter(|c| c.laddr.map(|a| a.port()) == Some(port))
            .map(|c| c.pid)
            .collect()
    }

    #[test]
    fn test_finds_own_listener_with_both_backends() {
        // a second thread shares the fd table of this process
        let (done_tx, done_rx) = mpsc::channel::<()>();
        let worker = std::thread::spawn(move || {
            done_rx.recv().ok();
        });

        let socket = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = socket.local_addr().unwrap().port();
        let loopback: IpAddr = "127.0.0.1".parse().unwrap();
        let me = Some(std::process::id());

        let modern = Detector::new(ProcfsLibrary::new());
        let modern_addrs = modern
            .find_addrs_listening_on_port(port, Some(ConnectionKind::Tcp4))
            .unwrap();
        let modern_first = modern.find_addr_listening_on_port_over_tcp(port).unwrap();
        let modern_owners = listener_owners(&modern, port);

        let legacy = Detector::new(SysinfoLibrary::new());
        let legacy_addrs = legacy
            .find_addrs_listening_on_port(port, Some(ConnectionKind::Tcp4))
            .unwrap();
        let legacy_owners = listener_owners(&legacy, port);

        done_tx.send(()).unwrap();
        worker.join().unwrap();

        assert_eq!(modern_addrs, vec![loopback]);
        assert_eq!(modern_first, Some(loopback));
        assert_eq!(modern_owners, vec![me]);
        assert_eq!(legacy_addrs, vec![loopback]);
        assert_eq!(legacy_owners, vec![me]);
    }

    #[test]
    fn test_finds_child_by_cmdline_and_name() {
        let mut child = Command::new("sleep").arg("31.4159").spawn().unwrap();

        let detector = Detector::new(ProcfsLibrary::new());
        let by_cmdline = detector.find_process_cmdline("sleep 31.4159").unwrap();
        let by_name = detector.find_process_name("sleep").unwrap();

        child.kill().unwrap();
        child.wait().unwrap();

        assert_eq!(by_cmdline.map(|p| p.pid()), Some(child.id()));
        assert!(by_name.is_some());
    }

    #[test]
    fn test_missing_process_is_none() {
        let detector = Detector::new(ProcfsLibrary::new());
        assert!(detector
            .find_process_name("no-such-process-name")
            .unwrap()
            .is_none());
    }
}
