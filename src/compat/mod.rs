//! Stable accessor surface over introspection libraries
//!
//! [`Compat`] wraps a [`ProcessLibrary`] and [`Process`] wraps one of its
//! handles. Both dispatch every call to the modern or the legacy accessor
//! according to the [`Capabilities`] the library reported when the adapter
//! was built, so callers never deal with the two API shapes themselves.

pub mod capability;
pub mod fake;
pub mod library;
#[cfg(target_os = "linux")]
pub mod procfs_backend;
pub mod sysinfo_backend;
pub mod types;

pub use capability::{ApiShape, Capabilities};
pub use library::{ProcessApi, ProcessLibrary};
pub use types::*;

use log::{debug, warn};
use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Error, Result};

/// Adapter over a process introspection library
pub struct Compat<L: ProcessLibrary> {
    library: L,
    caps: Capabilities,
}

impl<L: ProcessLibrary> Compat<L> {
    /// Wrap `library`, resolving its capabilities once
    pub fn new(library: L) -> Self {
        let caps = library.capabilities();
        debug!("introspection library resolved: {}", caps);
        Self { library, caps }
    }

    pub fn capabilities(&self) -> Capabilities {
        self.caps
    }

    pub fn library(&self) -> &L {
        &self.library
    }

    /// Open a handle on a specific PID
    pub fn process(&self, pid: u32) -> Result<Process<L::Handle>> {
        let handle = self.library.open(pid)?;
        Ok(Process::new(handle, self.caps.shape))
    }

    /// Lazily iterate over the processes running right now.
    ///
    /// PIDs are listed up front and handles are opened one at a time. PIDs
    /// that exit or deny access before their turn are skipped; any other
    /// open error is yielded as is.
    pub fn process_iter(&self) -> Result<ProcessIter<'_, L>> {
        let pids = self.library.pids()?;
        Ok(ProcessIter {
            library: &self.library,
            shape: self.caps.shape,
            pids: pids.into_iter(),
        })
    }

    /// Number of logical (or physical) CPUs
    pub fn cpu_count(&self, logical: bool) -> Result<usize> {
        match self.caps.shape {
            ApiShape::Modern => self.library.cpu_count(logical),
            ApiShape::Legacy if logical => self.library.num_cpus(),
            ApiShape::Legacy => Err(Error::not_supported(
                "physical cpu count on a legacy library",
            )),
        }
    }

    pub fn cpu_times(&self, percpu: bool) -> Result<Vec<SystemCpuTimes>> {
        self.library.cpu_times(percpu)
    }

    pub fn cpu_percent(&self, interval: Option<Duration>, percpu: bool) -> Result<Vec<f32>> {
        self.library.cpu_percent(interval, percpu)
    }

    pub fn cpu_times_percent(
        &self,
        interval: Option<Duration>,
        percpu: bool,
    ) -> Result<Vec<SystemCpuTimes>> {
        self.library.cpu_times_percent(interval, percpu)
    }

    /// System-wide socket connections of `kind`.
    ///
    /// Without a bulk call the process table is walked instead: every
    /// connection is stamped with its owner's PID, vanished and protected
    /// processes are skipped and duplicates are collapsed. The order of the
    /// result is unspecified.
    pub fn net_connections(&self, kind: ConnectionKind) -> Result<Vec<Connection>> {
        if self.caps.bulk_connections {
            return self.library.net_connections(kind);
        }

        let mut seen = HashSet::new();
        for process in self.process_iter()? {
            let process = process?;
            let pid = process.pid();
            match process.connections(kind) {
                Ok(conns) => {
                    for conn in conns {
                        seen.insert(conn.with_pid(pid));
                    }
                }
                Err(e) if e.is_stale() => {
                    debug!("skipping connections of pid {}: {}", pid, e);
                }
                Err(e) => return Err(e),
            }
        }
        Ok(seen.into_iter().collect())
    }
}

/// Iterator returned by [`Compat::process_iter`]
pub struct ProcessIter<'a, L: ProcessLibrary> {
    library: &'a L,
    shape: ApiShape,
    pids: std::vec::IntoIter<u32>,
}

impl<L: ProcessLibrary> Iterator for ProcessIter<'_, L> {
    type Item = Result<Process<L::Handle>>;

    fn next(&mut self) -> Option<Self::Item> {
        for pid in self.pids.by_ref() {
            match self.library.open(pid) {
                Ok(handle) => return Some(Ok(Process::new(handle, self.shape))),
                Err(e) if e.is_stale() => debug!("pid {} vanished before open: {}", pid, e),
                Err(e) => {
                    warn!("cannot open pid {}: {}", pid, e);
                    return Some(Err(e));
                }
            }
        }
        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.pids.len()))
    }
}

/// Handle on one process with a shape-independent accessor surface
#[derive(Debug)]
pub struct Process<H> {
    inner: H,
    shape: ApiShape,
}

impl<H: ProcessApi> Process<H> {
    pub fn new(inner: H, shape: ApiShape) -> Self {
        Self { inner, shape }
    }

    pub fn pid(&self) -> u32 {
        self.inner.pid()
    }

    pub fn shape(&self) -> ApiShape {
        self.shape
    }

    /// The wrapped library handle
    pub fn inner(&self) -> &H {
        &self.inner
    }

    fn legacy_setter<T>(&self, accessor: &str) -> Result<T> {
        Err(Error::not_supported(format!(
            "setting {} on a legacy library (pid={})",
            accessor,
            self.pid()
        )))
    }

    pub fn connections(&self, kind: ConnectionKind) -> Result<Vec<Connection>> {
        match self.shape {
            ApiShape::Modern => self.inner.connections(kind),
            ApiShape::Legacy => self.inner.get_connections(kind),
        }
    }

    /// Current CPU affinity, after applying `cpus` if given.
    ///
    /// The legacy form can only read, so a set request fails there.
    pub fn cpu_affinity(&self, cpus: Option<&[usize]>) -> Result<Vec<usize>> {
        match (self.shape, cpus) {
            (ApiShape::Modern, _) => self.inner.cpu_affinity(cpus),
            (ApiShape::Legacy, None) => self.inner.get_cpu_affinity(),
            (ApiShape::Legacy, Some(_)) => self.legacy_setter("cpu_affinity"),
        }
    }

    pub fn cpu_percent(&self, interval: Option<Duration>) -> Result<f32> {
        match self.shape {
            ApiShape::Modern => self.inner.cpu_percent(interval),
            ApiShape::Legacy => self.inner.get_cpu_percent(interval),
        }
    }

    pub fn cpu_times(&self) -> Result<CpuTimes> {
        match self.shape {
            ApiShape::Modern => self.inner.cpu_times(),
            ApiShape::Legacy => self.inner.get_cpu_times(),
        }
    }

    pub fn memory_info_ex(&self) -> Result<MemoryInfoEx> {
        match self.shape {
            ApiShape::Modern => self.inner.memory_info_ex(),
            ApiShape::Legacy => self.inner.get_ext_memory_info(),
        }
    }

    pub fn io_counters(&self) -> Result<IoCounters> {
        match self.shape {
            ApiShape::Modern => self.inner.io_counters(),
            ApiShape::Legacy => self.inner.get_io_counters(),
        }
    }

    /// Current I/O priority, after applying `set` if given.
    ///
    /// The legacy form can only read, so a set request fails there.
    pub fn ionice(&self, set: Option<IoNice>) -> Result<IoNice> {
        match (self.shape, set) {
            (ApiShape::Modern, _) => self.inner.ionice(set),
            (ApiShape::Legacy, None) => self.inner.get_ionice(),
            (ApiShape::Legacy, Some(_)) => self.legacy_setter("ionice"),
        }
    }

    pub fn memory_info(&self) -> Result<MemoryInfo> {
        match self.shape {
            ApiShape::Modern => self.inner.memory_info(),
            ApiShape::Legacy => self.inner.get_memory_info(),
        }
    }

    pub fn memory_maps(&self, grouped: bool) -> Result<Vec<MemoryMap>> {
        match self.shape {
            ApiShape::Modern => self.inner.memory_maps(grouped),
            ApiShape::Legacy => self.inner.get_memory_maps(grouped),
        }
    }

    pub fn memory_percent(&self) -> Result<f32> {
        match self.shape {
            ApiShape::Modern => self.inner.memory_percent(),
            ApiShape::Legacy => self.inner.get_memory_percent(),
        }
    }

    pub fn nice(&self, value: Option<i32>) -> Result<i32> {
        match self.shape {
            ApiShape::Modern => self.inner.nice(value),
            ApiShape::Legacy => self.inner.get_nice(value),
        }
    }

    pub fn num_ctx_switches(&self) -> Result<CtxSwitches> {
        match self.shape {
            ApiShape::Modern => self.inner.num_ctx_switches(),
            ApiShape::Legacy => self.inner.get_num_ctx_switches(),
        }
    }

    pub fn num_fds(&self) -> Result<usize> {
        match self.shape {
            ApiShape::Modern => self.inner.num_fds(),
            ApiShape::Legacy => self.inner.get_num_fds(),
        }
    }

    pub fn num_threads(&self) -> Result<usize> {
        match self.shape {
            ApiShape::Modern => self.inner.num_threads(),
            ApiShape::Legacy => self.inner.get_num_threads(),
        }
    }

    pub fn open_files(&self) -> Result<Vec<OpenFile>> {
        match self.shape {
            ApiShape::Modern => self.inner.open_files(),
            ApiShape::Legacy => self.inner.get_open_files(),
        }
    }

    /// Current limit of `resource`, after applying `limits` if given.
    ///
    /// The legacy form can only read, so a set request fails there.
    pub fn rlimit(&self, resource: Resource, limits: Option<RLimit>) -> Result<RLimit> {
        match (self.shape, limits) {
            (ApiShape::Modern, _) => self.inner.rlimit(resource, limits),
            (ApiShape::Legacy, None) => self.inner.get_rlimit(resource),
            (ApiShape::Legacy, Some(_)) => self.legacy_setter("rlimit"),
        }
    }

    pub fn threads(&self) -> Result<Vec<ThreadTimes>> {
        match self.shape {
            ApiShape::Modern => self.inner.threads(),
            ApiShape::Legacy => self.inner.get_threads(),
        }
    }

    pub fn cwd(&self) -> Result<PathBuf> {
        match self.shape {
            ApiShape::Modern => self.inner.cwd(),
            ApiShape::Legacy => self.inner.getcwd(),
        }
    }

    pub fn name(&self) -> Result<String> {
        match self.shape {
            ApiShape::Modern => self.inner.name(),
            ApiShape::Legacy => self.inner.name_attr(),
        }
    }

    pub fn cmdline(&self) -> Result<Vec<String>> {
        match self.shape {
            ApiShape::Modern => self.inner.cmdline(),
            ApiShape::Legacy => self.inner.cmdline_attr(),
        }
    }

    pub fn exe(&self) -> Result<PathBuf> {
        match self.shape {
            ApiShape::Modern => self.inner.exe(),
            ApiShape::Legacy => self.inner.exe_attr(),
        }
    }
}
