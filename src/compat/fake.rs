//! In-memory introspection library
//!
//! `FakeLibrary` serves a scripted process table in either API shape. Its
//! handles only answer the accessors of the library's own shape and keep a
//! log of every call, which makes fallback behavior observable in tests.

use std::cell::{Cell, RefCell};
use std::path::PathBuf;
use std::time::Duration;

use super::capability::{ApiShape, Capabilities};
use super::library::{ProcessApi, ProcessLibrary};
use super::types::{
    Connection, ConnectionKind, CpuTimes, CtxSwitches, IoClass, IoCounters, IoNice, MemoryInfo,
    MemoryInfoEx, MemoryMap, OpenFile, RLimit, Resource, SystemCpuTimes, ThreadTimes,
};
use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FakeState {
    Alive,
    /// Gone before it could be opened
    Vanished,
    /// Opens fine, then every read reports it gone
    VanishesOnRead,
    AccessDenied,
    IoError,
    /// Listed, but opening it fails with an I/O error
    OpenIoError,
}

/// Scripted process
#[derive(Debug, Clone)]
pub struct FakeProcess {
    pub pid: u32,
    pub name: String,
    pub cmdline: Vec<String>,
    pub exe: PathBuf,
    pub cwd: PathBuf,
    pub connections: Vec<Connection>,
    pub cpu_percent: f32,
    pub memory: MemoryInfo,
    pub io: IoCounters,
    pub num_threads: usize,
    pub nice: i32,
    state: FakeState,
}

impl FakeProcess {
    pub fn new(pid: u32, name: &str) -> Self {
        Self {
            pid,
            name: name.to_string(),
            cmdline: vec![format!("/usr/bin/{name}")],
            exe: PathBuf::from(format!("/usr/bin/{name}")),
            cwd: PathBuf::from("/"),
            connections: Vec::new(),
            cpu_percent: 0.0,
            memory: MemoryInfo::default(),
            io: IoCounters::default(),
            num_threads: 1,
            nice: 0,
            state: FakeState::Alive,
        }
    }

    pub fn with_cmdline<S: AsRef<str>>(mut self, args: &[S]) -> Self {
        self.cmdline = args.iter().map(|a| a.as_ref().to_string()).collect();
        self
    }

    pub fn with_connection(mut self, conn: Connection) -> Self {
        self.connections.push(conn);
        self
    }

    pub fn with_cpu_percent(mut self, pct: f32) -> Self {
        self.cpu_percent = pct;
        self
    }

    pub fn with_memory(mut self, rss: u64, vms: u64) -> Self {
        self.memory = MemoryInfo { rss, vms };
        self
    }

    pub fn vanished(mut self) -> Self {
        self.state = FakeState::Vanished;
        self
    }

    pub fn vanishes_on_read(mut self) -> Self {
        self.state = FakeState::VanishesOnRead;
        self
    }

    pub fn access_denied(mut self) -> Self {
        self.state = FakeState::AccessDenied;
        self
    }

    pub fn failing_with_io_error(mut self) -> Self {
        self.state = FakeState::IoError;
        self
    }

    pub fn failing_to_open(mut self) -> Self {
        self.state = FakeState::OpenIoError;
        self
    }
}

/// Scripted library
#[derive(Debug)]
pub struct FakeLibrary {
    caps: Capabilities,
    processes: Vec<FakeProcess>,
    bulk: Vec<Connection>,
    logical_cpus: usize,
    physical_cpus: usize,
    capability_queries: Cell<usize>,
}

impl FakeLibrary {
    pub fn with_capabilities(caps: Capabilities) -> Self {
        Self {
            caps,
            processes: Vec::new(),
            bulk: Vec::new(),
            logical_cpus: 1,
            physical_cpus: 1,
            capability_queries: Cell::new(0),
        }
    }

    pub fn modern() -> Self {
        Self::with_capabilities(Capabilities::modern())
    }

    pub fn legacy() -> Self {
        Self::with_capabilities(Capabilities::legacy())
    }

    pub fn with_process(mut self, process: FakeProcess) -> Self {
        self.processes.push(process);
        self
    }

    /// Connection returned by the bulk enumeration call
    pub fn with_bulk_connection(mut self, conn: Connection) -> Self {
        self.bulk.push(conn);
        self
    }

    pub fn with_cpus(mut self, logical: usize, physical: usize) -> Self {
        self.logical_cpus = logical;
        self.physical_cpus = physical;
        self
    }

    /// How many times `capabilities()` was asked
    pub fn capability_queries(&self) -> usize {
        self.capability_queries.get()
    }

    fn require(&self, shape: ApiShape, accessor: &str) -> Result<()> {
        if self.caps.shape == shape {
            Ok(())
        } else {
            Err(Error::not_supported(accessor))
        }
    }
}

impl ProcessLibrary for FakeLibrary {
    type Handle = FakeHandle;

    fn capabilities(&self) -> Capabilities {
        self.capability_queries.set(self.capability_queries.get() + 1);
        self.caps
    }

    fn pids(&self) -> Result<Vec<u32>> {
        Ok(self.processes.iter().map(|p| p.pid).collect())
    }

    fn open(&self, pid: u32) -> Result<FakeHandle> {
        let process = self
            .processes
            .iter()
            .find(|p| p.pid == pid && p.state != FakeState::Vanished)
            .ok_or(Error::NoSuchProcess(pid))?;
        if process.state == FakeState::OpenIoError {
            return Err(Error::Io(std::io::Error::other(format!(
                "simulated open failure (pid={pid})"
            ))));
        }
        Ok(FakeHandle {
            process: process.clone(),
            shape: self.caps.shape,
            log: RefCell::new(Vec::new()),
        })
    }

    fn cpu_count(&self, logical: bool) -> Result<usize> {
        self.require(ApiShape::Modern, "cpu_count")?;
        Ok(if logical {
            self.logical_cpus
        } else {
            self.physical_cpus
        })
    }

    fn net_connections(&self, kind: ConnectionKind) -> Result<Vec<Connection>> {
        if !self.caps.bulk_connections {
            return Err(Error::not_supported("net_connections"));
        }
        Ok(self
            .bulk
            .iter()
            .filter(|c| kind.includes(c.family, c.socket_type))
            .cloned()
            .collect())
    }

    fn num_cpus(&self) -> Result<usize> {
        self.require(ApiShape::Legacy, "num_cpus")?;
        Ok(self.logical_cpus)
    }

    fn cpu_times(&self, percpu: bool) -> Result<Vec<SystemCpuTimes>> {
        let n = if percpu { self.logical_cpus } else { 1 };
        Ok(vec![SystemCpuTimes::default(); n])
    }
}

/// Handle on a scripted process
#[derive(Debug)]
pub struct FakeHandle {
    process: FakeProcess,
    shape: ApiShape,
    log: RefCell<Vec<String>>,
}

impl FakeHandle {
    /// Every call received so far, rendered as `accessor(args)`
    pub fn call_log(&self) -> Vec<String> {
        self.log.borrow().clone()
    }

    /// How many times `accessor` was called
    pub fn calls(&self, accessor: &str) -> usize {
        let prefix = format!("{accessor}(");
        self.log
            .borrow()
            .iter()
            .filter(|c| c.starts_with(&prefix))
            .count()
    }

    fn serve<T>(
        &self,
        shape: ApiShape,
        call: String,
        f: impl FnOnce(&FakeProcess) -> T,
    ) -> Result<T> {
        let accessor = call.split('(').next().unwrap_or_default().to_string();
        self.log.borrow_mut().push(call);
        if self.shape != shape {
            return Err(Error::not_supported(accessor));
        }
        let pid = self.process.pid;
        match self.process.state {
            FakeState::Alive => Ok(f(&self.process)),
            FakeState::Vanished | FakeState::VanishesOnRead => Err(Error::NoSuchProcess(pid)),
            FakeState::AccessDenied => Err(Error::AccessDenied(pid)),
            FakeState::IoError | FakeState::OpenIoError => Err(Error::Io(
                std::io::Error::other(format!("simulated read failure (pid={pid})")),
            )),
        }
    }

    fn modern<T>(&self, call: String, f: impl FnOnce(&FakeProcess) -> T) -> Result<T> {
        self.serve(ApiShape::Modern, call, f)
    }

    fn legacy<T>(&self, call: String, f: impl FnOnce(&FakeProcess) -> T) -> Result<T> {
        self.serve(ApiShape::Legacy, call, f)
    }
}

fn filtered(p: &FakeProcess, kind: ConnectionKind) -> Vec<Connection> {
    p.connections
        .iter()
        .filter(|c| kind.includes(c.family, c.socket_type))
        .cloned()
        .collect()
}

fn default_ionice() -> IoNice {
    IoNice {
        class: IoClass::BestEffort,
        value: 4,
    }
}

fn cpu_times(p: &FakeProcess) -> CpuTimes {
    CpuTimes {
        user: p.cpu_percent as f64,
        ..Default::default()
    }
}

fn memory_ex(p: &FakeProcess) -> MemoryInfoEx {
    MemoryInfoEx {
        rss: p.memory.rss,
        vms: p.memory.vms,
        ..Default::default()
    }
}

impl ProcessApi for FakeHandle {
    fn pid(&self) -> u32 {
        self.process.pid
    }

    fn connections(&self, kind: ConnectionKind) -> Result<Vec<Connection>> {
        self.modern(format!("connections({kind})"), |p| filtered(p, kind))
    }

    fn cpu_affinity(&self, cpus: Option<&[usize]>) -> Result<Vec<usize>> {
        self.modern(format!("cpu_affinity({cpus:?})"), |_| {
            cpus.map(|c| c.to_vec()).unwrap_or_else(|| vec![0])
        })
    }

    fn cpu_percent(&self, interval: Option<Duration>) -> Result<f32> {
        self.modern(format!("cpu_percent({interval:?})"), |p| p.cpu_percent)
    }

    fn cpu_times(&self) -> Result<CpuTimes> {
        self.modern("cpu_times()".into(), cpu_times)
    }

    fn memory_info_ex(&self) -> Result<MemoryInfoEx> {
        self.modern("memory_info_ex()".into(), memory_ex)
    }

    fn io_counters(&self) -> Result<IoCounters> {
        self.modern("io_counters()".into(), |p| p.io)
    }

    fn ionice(&self, set: Option<IoNice>) -> Result<IoNice> {
        self.modern(format!("ionice({set:?})"), |_| {
            set.unwrap_or_else(default_ionice)
        })
    }

    fn memory_info(&self) -> Result<MemoryInfo> {
        self.modern("memory_info()".into(), |p| p.memory)
    }

    fn memory_maps(&self, grouped: bool) -> Result<Vec<MemoryMap>> {
        self.modern(format!("memory_maps({grouped})"), |_| Vec::new())
    }

    fn memory_percent(&self) -> Result<f32> {
        self.modern("memory_percent()".into(), |_| 0.0)
    }

    fn nice(&self, value: Option<i32>) -> Result<i32> {
        self.modern(format!("nice({value:?})"), |p| value.unwrap_or(p.nice))
    }

    fn num_ctx_switches(&self) -> Result<CtxSwitches> {
        self.modern("num_ctx_switches()".into(), |_| CtxSwitches::default())
    }

    fn num_fds(&self) -> Result<usize> {
        self.modern("num_fds()".into(), |p| p.connections.len() + 3)
    }

    fn num_threads(&self) -> Result<usize> {
        self.modern("num_threads()".into(), |p| p.num_threads)
    }

    fn open_files(&self) -> Result<Vec<OpenFile>> {
        self.modern("open_files()".into(), |_| Vec::new())
    }

    fn rlimit(&self, resource: Resource, limits: Option<RLimit>) -> Result<RLimit> {
        self.modern(format!("rlimit({resource:?}, {limits:?})"), |_| {
            limits.unwrap_or_default()
        })
    }

    fn threads(&self) -> Result<Vec<ThreadTimes>> {
        self.modern("threads()".into(), |p| {
            vec![ThreadTimes {
                id: p.pid,
                user_time: 0.0,
                system_time: 0.0,
            }]
        })
    }

    fn cwd(&self) -> Result<PathBuf> {
        self.modern("cwd()".into(), |p| p.cwd.clone())
    }

    fn name(&self) -> Result<String> {
        self.modern("name()".into(), |p| p.name.clone())
    }

    fn cmdline(&self) -> Result<Vec<String>> {
        self.modern("cmdline()".into(), |p| p.cmdline.clone())
    }

    fn exe(&self) -> Result<PathBuf> {
        self.modern("exe()".into(), |p| p.exe.clone())
    }

    fn get_connections(&self, kind: ConnectionKind) -> Result<Vec<Connection>> {
        self.legacy(format!("get_connections({kind})"), |p| filtered(p, kind))
    }

    fn get_cpu_affinity(&self) -> Result<Vec<usize>> {
        self.legacy("get_cpu_affinity()".into(), |_| vec![0])
    }

    fn get_cpu_percent(&self, interval: Option<Duration>) -> Result<f32> {
        self.legacy(format!("get_cpu_percent({interval:?})"), |p| p.cpu_percent)
    }

    fn get_cpu_times(&self) -> Result<CpuTimes> {
        self.legacy("get_cpu_times()".into(), cpu_times)
    }

    fn get_ext_memory_info(&self) -> Result<MemoryInfoEx> {
        self.legacy("get_ext_memory_info()".into(), memory_ex)
    }

    fn get_io_counters(&self) -> Result<IoCounters> {
        self.legacy("get_io_counters()".into(), |p| p.io)
    }

    fn get_ionice(&self) -> Result<IoNice> {
        self.legacy("get_ionice()".into(), |_| default_ionice())
    }

    fn get_memory_info(&self) -> Result<MemoryInfo> {
        self.legacy("get_memory_info()".into(), |p| p.memory)
    }

    fn get_memory_maps(&self, grouped: bool) -> Result<Vec<MemoryMap>> {
        self.legacy(format!("get_memory_maps({grouped})"), |_| Vec::new())
    }

    fn get_memory_percent(&self) -> Result<f32> {
        self.legacy("get_memory_percent()".into(), |_| 0.0)
    }

    fn get_nice(&self, value: Option<i32>) -> Result<i32> {
        self.legacy(format!("get_nice({value:?})"), |p| value.unwrap_or(p.nice))
    }

    fn get_num_ctx_switches(&self) -> Result<CtxSwitches> {
        self.legacy("get_num_ctx_switches()".into(), |_| CtxSwitches::default())
    }

    fn get_num_fds(&self) -> Result<usize> {
        self.legacy("get_num_fds()".into(), |p| p.connections.len() + 3)
    }

    fn get_num_threads(&self) -> Result<usize> {
        self.legacy("get_num_threads()".into(), |p| p.num_threads)
    }

    fn get_open_files(&self) -> Result<Vec<OpenFile>> {
        self.legacy("get_open_files()".into(), |_| Vec::new())
    }

    fn get_rlimit(&self, resource: Resource) -> Result<RLimit> {
        self.legacy(format!("get_rlimit({resource:?})"), |_| RLimit::default())
    }

    fn get_threads(&self) -> Result<Vec<ThreadTimes>> {
        self.legacy("get_threads()".into(), |p| {
            vec![ThreadTimes {
                id: p.pid,
                user_time: 0.0,
                system_time: 0.0,
            }]
        })
    }

    fn getcwd(&self) -> Result<PathBuf> {
        self.legacy("getcwd()".into(), |p| p.cwd.clone())
    }

    fn name_attr(&self) -> Result<String> {
        self.legacy("name_attr()".into(), |p| p.name.clone())
    }

    fn cmdline_attr(&self) -> Result<Vec<String>> {
        self.legacy("cmdline_attr()".into(), |p| p.cmdline.clone())
    }

    fn exe_attr(&self) -> Result<PathBuf> {
        self.legacy("exe_attr()".into(), |p| p.exe.clone())
    }
}
