//! Portable backend on the sysinfo crate
//!
//! sysinfo only offers part of the metric surface, under the legacy
//! accessor names: name, command line and executable are captured when the
//! handle is opened, and there is no system-wide connection table, so the
//! adapter walks processes instead. Per-process connections come from procfs
//! on Linux.

use std::cell::RefCell;
use std::path::PathBuf;
use std::thread;
use std::time::Duration;
use sysinfo::{
    CpuRefreshKind, MemoryRefreshKind, Pid, ProcessRefreshKind, ProcessesToUpdate, RefreshKind,
    System, ThreadKind,
};

use super::capability::Capabilities;
use super::library::{ProcessApi, ProcessLibrary};
use super::types::{Connection, ConnectionKind, IoCounters, MemoryInfo};
use crate::error::{Error, Result};

/// Whether sysinfo listed a thread of another process under its own id
fn is_thread(process: &sysinfo::Process) -> bool {
    matches!(process.thread_kind(), Some(ThreadKind::Userland))
}

/// Whether `pid` is a thread id rather than a process id.
///
/// A direct refresh of `/proc/<tid>` does not mark the entry as a thread.
#[cfg(target_os = "linux")]
fn is_foreign_task(pid: u32) -> bool {
    procfs::process::Process::new(pid as i32)
        .and_then(|p| p.status())
        .map(|status| status.tgid as u32 != pid)
        .unwrap_or(false)
}

#[cfg(not(target_os = "linux"))]
fn is_foreign_task(_pid: u32) -> bool {
    false
}

/// Legacy-shaped library over sysinfo
#[derive(Debug, Default)]
pub struct SysinfoLibrary;

impl SysinfoLibrary {
    pub fn new() -> Self {
        Self
    }
}

impl ProcessLibrary for SysinfoLibrary {
    type Handle = SysinfoProcess;

    fn capabilities(&self) -> Capabilities {
        Capabilities::legacy()
    }

    fn pids(&self) -> Result<Vec<u32>> {
        let mut system = System::new();
        system.refresh_processes_specifics(
            ProcessesToUpdate::All,
            true,
            ProcessRefreshKind::nothing().without_tasks(),
        );
        let mut pids: Vec<u32> = system
            .processes()
            .iter()
            .filter(|(_, process)| !is_thread(process))
            .map(|(pid, _)| pid.as_u32())
            .collect();
        pids.sort_unstable();
        Ok(pids)
    }

    fn open(&self, pid: u32) -> Result<SysinfoProcess> {
        let mut system = System::new();
        system.refresh_processes_specifics(
            ProcessesToUpdate::Some(&[Pid::from_u32(pid)]),
            true,
            ProcessRefreshKind::everything(),
        );

        let process = system
            .process(Pid::from_u32(pid))
            .filter(|process| !is_thread(process) && !is_foreign_task(pid))
            .ok_or(Error::NoSuchProcess(pid))?;
        let name = process.name().to_string_lossy().to_string();
        let cmdline = process
            .cmd()
            .iter()
            .map(|s| s.to_string_lossy().to_string())
            .collect();
        let exe = process.exe().map(|p| p.to_path_buf());

        Ok(SysinfoProcess {
            pid,
            name,
            cmdline,
            exe,
            system: RefCell::new(system),
        })
    }

    fn num_cpus(&self) -> Result<usize> {
        let system =
            System::new_with_specifics(RefreshKind::nothing().with_cpu(CpuRefreshKind::everything()));
        match system.cpus().len() {
            0 => Err(Error::not_supported("cpu enumeration on this platform")),
            n => Ok(n),
        }
    }

    fn cpu_percent(&self, interval: Option<Duration>, percpu: bool) -> Result<Vec<f32>> {
        let mut system = System::new_with_specifics(
            RefreshKind::nothing().with_cpu(CpuRefreshKind::nothing().with_cpu_usage()),
        );
        thread::sleep(interval.unwrap_or(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL));
        system.refresh_cpu_usage();

        if percpu {
            Ok(system.cpus().iter().map(|cpu| cpu.cpu_usage()).collect())
        } else {
            Ok(vec![system.global_cpu_usage()])
        }
    }
}

/// Handle on one process, with its own sysinfo view
pub struct SysinfoProcess {
    pid: u32,
    name: String,
    cmdline: Vec<String>,
    exe: Option<PathBuf>,
    system: RefCell<System>,
}

impl std::fmt::Debug for SysinfoProcess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SysinfoProcess")
            .field("pid", &self.pid)
            .field("name", &self.name)
            .finish()
    }
}

impl SysinfoProcess {
    /// Refresh this process and read from it, failing if it is gone
    fn read<T>(&self, f: impl FnOnce(&sysinfo::Process) -> T) -> Result<T> {
        let pid = Pid::from_u32(self.pid);
        let mut system = self.system.borrow_mut();
        system.refresh_processes_specifics(
            ProcessesToUpdate::Some(&[pid]),
            true,
            ProcessRefreshKind::everything(),
        );
        let process = system
            .process(pid)
            .ok_or(Error::NoSuchProcess(self.pid))?;
        Ok(f(process))
    }
}

impl ProcessApi for SysinfoProcess {
    fn pid(&self) -> u32 {
        self.pid
    }

    #[cfg(target_os = "linux")]
    fn get_connections(&self, kind: ConnectionKind) -> Result<Vec<Connection>> {
        use super::procfs_backend::ProcfsLibrary;

        ProcfsLibrary::new().open(self.pid)?.connections(kind)
    }

    #[cfg(not(target_os = "linux"))]
    fn get_connections(&self, _kind: ConnectionKind) -> Result<Vec<Connection>> {
        Err(Error::not_supported("per-process connections on this platform"))
    }

    /// CPU usage since the previous call, or over `interval`
    fn get_cpu_percent(&self, interval: Option<Duration>) -> Result<f32> {
        if let Some(interval) = interval {
            self.read(|_| ())?;
            thread::sleep(interval.max(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL));
        }
        self.read(|p| p.cpu_usage())
    }

    fn get_io_counters(&self) -> Result<IoCounters> {
        self.read(|p| {
            let disk = p.disk_usage();
            IoCounters {
                read_count: 0,
                write_count: 0,
                read_bytes: disk.total_read_bytes,
                write_bytes: disk.total_written_bytes,
            }
        })
    }

    fn get_memory_info(&self) -> Result<MemoryInfo> {
        self.read(|p| MemoryInfo {
            rss: p.memory(),
            vms: p.virtual_memory(),
        })
    }

    fn get_memory_percent(&self) -> Result<f32> {
        let rss = self.read(|p| p.memory())?;
        let mut system = self.system.borrow_mut();
        system.refresh_memory_specifics(MemoryRefreshKind::nothing().with_ram());
        let total = system.total_memory();
        if total == 0 {
            return Ok(0.0);
        }
        Ok((rss as f64 / total as f64 * 100.0) as f32)
    }

    fn get_num_threads(&self) -> Result<usize> {
        self.read(|p| p.tasks().map(|tasks| tasks.len().max(1)))?
            .ok_or_else(|| Error::not_supported("thread count on this platform"))
    }

    fn getcwd(&self) -> Result<PathBuf> {
        self.read(|p| p.cwd().map(|c| c.to_path_buf()))?
            .ok_or(Error::AccessDenied(self.pid))
    }

    fn name_attr(&self) -> Result<String> {
        Ok(self.name.clone())
    }

    fn cmdline_attr(&self) -> Result<Vec<String>> {
        Ok(self.cmdline.clone())
    }

    fn exe_attr(&self) -> Result<PathBuf> {
        self.exe.clone().ok_or(Error::AccessDenied(self.pid))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compat::Compat;

    #[test]
    fn test_reads_own_process_through_legacy_names() {
        let compat = Compat::new(SysinfoLibrary::new());
        assert!(!compat.capabilities().is_modern());

        let me = compat.process(std::process::id()).unwrap();
        assert!(!me.name().unwrap().is_empty());
        assert!(!me.cmdline().unwrap().is_empty());
        assert!(me.memory_info().unwrap().rss > 0);
        assert!(compat.cpu_count(true).unwrap() >= 1);
    }

    #[test]
    fn test_unsupported_accessor_propagates() {
        let compat = Compat::new(SysinfoLibrary::new());
        let me = compat.process(std::process::id()).unwrap();
        assert!(matches!(me.open_files(), Err(Error::NotSupported(_))));
        assert!(matches!(
            compat.cpu_count(false),
            Err(Error::NotSupported(_))
        ));
    }

    #[test]
    fn test_pids_include_self() {
        let pids = SysinfoLibrary::new().pids().unwrap();
        assert!(pids.contains(&std::process::id()));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_threads_are_not_processes() {
        use crate::compat::ConnectionKind;
        use std::sync::mpsc;

        let (tid_tx, tid_rx) = mpsc::channel();
        let (done_tx, done_rx) = mpsc::channel::<()>();
        let worker = std::thread::spawn(move || {
            // SAFETY: gettid has no preconditions
            tid_tx.send(unsafe { libc::gettid() } as u32).unwrap();
            done_rx.recv().ok();
        });
        let tid = tid_rx.recv().unwrap();

        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let lib = SysinfoLibrary::new();
        let pids = lib.pids().unwrap();
        let opened = lib.open(tid);

        let compat = Compat::new(SysinfoLibrary::new());
        let owners: Vec<Option<u32>> = compat
            .net_connections(ConnectionKind::Tcp4)
            .unwrap()
            .into_iter()
            .filter(|c| c.laddr.map(|a| a.port()) == Some(port))
            .map(|c| c.pid)
            .collect();

        done_tx.send(()).unwrap();
        worker.join().unwrap();

        assert!(!pids.contains(&tid));
        assert!(matches!(opened, Err(Error::NoSuchProcess(_))));
        assert_eq!(owners, vec![Some(std::process::id())]);
    }
}
