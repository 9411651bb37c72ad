//! Linux backend reading `/proc` through the procfs crate
//!
//! This is the modern-shaped library: every accessor uses its modern name and
//! connections can be enumerated system-wide in one pass over
//! `/proc/net/{tcp,tcp6,udp,udp6}`. Setters go through libc.

use log::debug;
use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};

use procfs::net::{TcpNetEntry, TcpState, UdpNetEntry};
use procfs::process::{FDTarget, MMPermissions, MMapPath};
use procfs::{Current, CurrentSI, ProcError, ProcResult};

use super::capability::Capabilities;
use super::library::{ProcessApi, ProcessLibrary};
use super::types::{
    AddressFamily, Connection, ConnectionKind, ConnectionStatus, CpuTimes, CtxSwitches, IoClass,
    IoCounters, IoNice, MemoryInfo, MemoryInfoEx, MemoryMap, OpenFile, RLimit, Resource,
    SocketType, SystemCpuTimes, ThreadTimes,
};
use crate::error::{Error, Result};

const IOPRIO_WHO_PROCESS: libc::c_int = 1;
const IOPRIO_CLASS_SHIFT: u32 = 13;
const IOPRIO_PRIO_MASK: u32 = (1 << IOPRIO_CLASS_SHIFT) - 1;

/// Modern-shaped library over `/proc`
#[derive(Debug, Default)]
pub struct ProcfsLibrary {
    /// Last system-wide sample, indexed by `percpu`
    last_cpu_times: RefCell<[Option<Vec<SystemCpuTimes>>; 2]>,
}

impl ProcfsLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    fn read_cpu_times(&self, percpu: bool) -> Result<Vec<SystemCpuTimes>> {
        let stats = procfs::KernelStats::current()?;
        let tps = procfs::ticks_per_second() as f64;
        let convert = |t: &procfs::CpuTime| SystemCpuTimes {
            user: t.user as f64 / tps,
            nice: t.nice as f64 / tps,
            system: t.system as f64 / tps,
            idle: t.idle as f64 / tps,
            iowait: t.iowait.unwrap_or(0) as f64 / tps,
            irq: t.irq.unwrap_or(0) as f64 / tps,
            softirq: t.softirq.unwrap_or(0) as f64 / tps,
            steal: t.steal.unwrap_or(0) as f64 / tps,
        };
        if percpu {
            Ok(stats.cpu_time.iter().map(convert).collect())
        } else {
            Ok(vec![convert(&stats.total)])
        }
    }

    /// Two samples `interval` apart, or the previous call's sample and now
    fn sample_pair(
        &self,
        interval: Option<Duration>,
        percpu: bool,
    ) -> Result<(Vec<SystemCpuTimes>, Vec<SystemCpuTimes>)> {
        let before = match interval {
            Some(interval) => {
                let before = self.read_cpu_times(percpu)?;
                thread::sleep(interval);
                before
            }
            // since the previous call, or since boot on the first one
            None => self.last_cpu_times.borrow()[percpu as usize]
                .clone()
                .unwrap_or_default(),
        };
        let after = self.read_cpu_times(percpu)?;
        self.last_cpu_times.borrow_mut()[percpu as usize] = Some(after.clone());

        let before = if before.len() == after.len() {
            before
        } else {
            vec![SystemCpuTimes::default(); after.len()]
        };
        Ok((before, after))
    }
}

impl ProcessLibrary for ProcfsLibrary {
    type Handle = ProcfsProcess;

    fn capabilities(&self) -> Capabilities {
        Capabilities::modern()
    }

    fn pids(&self) -> Result<Vec<u32>> {
        let procs = procfs::process::all_processes()?;
        Ok(procs.filter_map(|p| p.ok()).map(|p| p.pid as u32).collect())
    }

    fn open(&self, pid: u32) -> Result<ProcfsProcess> {
        let proc = procfs::process::Process::new(pid as i32).map_err(|e| Error::from_proc(pid, e))?;
        Ok(ProcfsProcess {
            pid,
            proc,
            last_cpu: Cell::new(None),
        })
    }

    fn cpu_count(&self, logical: bool) -> Result<usize> {
        let info = procfs::CpuInfo::current()?;
        let total = info.num_cores();
        if logical {
            return Ok(total);
        }

        let cores: HashSet<(&str, &str)> = (0..total)
            .filter_map(|cpu| {
                let package = info.get_field(cpu, "physical id")?;
                let core = info.get_field(cpu, "core id")?;
                Some((package, core))
            })
            .collect();
        if cores.is_empty() {
            Err(Error::not_supported("physical cpu topology not exposed by /proc/cpuinfo"))
        } else {
            Ok(cores.len())
        }
    }

    fn net_connections(&self, kind: ConnectionKind) -> Result<Vec<Connection>> {
        let sockets = read_sockets(kind, None)?;
        let owners = socket_owners();
        Ok(sockets
            .into_iter()
            .map(|(inode, mut conn)| {
                if let Some(&(pid, fd)) = owners.get(&inode) {
                    conn.pid = Some(pid);
                    conn.fd = Some(fd);
                }
                conn
            })
            .collect())
    }

    fn cpu_times(&self, percpu: bool) -> Result<Vec<SystemCpuTimes>> {
        self.read_cpu_times(percpu)
    }

    fn cpu_percent(&self, interval: Option<Duration>, percpu: bool) -> Result<Vec<f32>> {
        let (before, after) = self.sample_pair(interval, percpu)?;
        Ok(before
            .iter()
            .zip(after.iter())
            .map(|(b, a)| b.busy_percent_until(a))
            .collect())
    }

    fn cpu_times_percent(
        &self,
        interval: Option<Duration>,
        percpu: bool,
    ) -> Result<Vec<SystemCpuTimes>> {
        let (before, after) = self.sample_pair(interval, percpu)?;
        Ok(before
            .iter()
            .zip(after.iter())
            .map(|(b, a)| b.percent_until(a))
            .collect())
    }
}

/// Handle on one `/proc/<pid>` directory
#[derive(Debug)]
pub struct ProcfsProcess {
    pid: u32,
    proc: procfs::process::Process,
    last_cpu: Cell<Option<(u64, Instant)>>,
}

impl ProcfsProcess {
    fn map<T>(&self, r: ProcResult<T>) -> Result<T> {
        r.map_err(|e| Error::from_proc(self.pid, e))
    }

    fn busy_ticks(&self) -> Result<u64> {
        let stat = self.map(self.proc.stat())?;
        Ok(stat.utime + stat.stime)
    }

    /// Socket inodes held by this process, mapped to their descriptor
    fn socket_fds(&self) -> Result<HashMap<u64, i32>> {
        let mut inodes = HashMap::new();
        for fd in self.map(self.proc.fd())? {
            let Ok(fd) = fd else { continue };
            if let FDTarget::Socket(inode) = fd.target {
                inodes.insert(inode, fd.fd);
            }
        }
        Ok(inodes)
    }
}

impl ProcessApi for ProcfsProcess {
    fn pid(&self) -> u32 {
        self.pid
    }

    fn connections(&self, kind: ConnectionKind) -> Result<Vec<Connection>> {
        let fds = self.socket_fds()?;
        if fds.is_empty() {
            return Ok(Vec::new());
        }
        let sockets = self.map(read_sockets(kind, Some(&self.proc)))?;
        Ok(sockets
            .into_iter()
            .filter_map(|(inode, mut conn)| {
                conn.fd = Some(*fds.get(&inode)?);
                Some(conn)
            })
            .collect())
    }

    fn cpu_affinity(&self, cpus: Option<&[usize]>) -> Result<Vec<usize>> {
        let pid = self.pid as libc::pid_t;
        let size = std::mem::size_of::<libc::cpu_set_t>();

        if let Some(cpus) = cpus {
            let setsize = libc::CPU_SETSIZE as usize;
            if let Some(bad) = cpus.iter().find(|&&c| c >= setsize) {
                return Err(Error::InvalidArgument(format!("cpu {bad} out of range")));
            }
            // SAFETY: cpu_set_t is plain data and every index is below CPU_SETSIZE
            let ret = unsafe {
                let mut set: libc::cpu_set_t = std::mem::zeroed();
                libc::CPU_ZERO(&mut set);
                for &cpu in cpus {
                    libc::CPU_SET(cpu, &mut set);
                }
                libc::sched_setaffinity(pid, size, &set)
            };
            if ret != 0 {
                return Err(Error::from_errno(self.pid, std::io::Error::last_os_error()));
            }
        }

        // SAFETY: the kernel writes at most `size` bytes into `set`
        let (ret, set) = unsafe {
            let mut set: libc::cpu_set_t = std::mem::zeroed();
            let ret = libc::sched_getaffinity(pid, size, &mut set);
            (ret, set)
        };
        if ret != 0 {
            return Err(Error::from_errno(self.pid, std::io::Error::last_os_error()));
        }
        Ok((0..libc::CPU_SETSIZE as usize)
            // SAFETY: index is below CPU_SETSIZE
            .filter(|&cpu| unsafe { libc::CPU_ISSET(cpu, &set) })
            .collect())
    }

    fn cpu_percent(&self, interval: Option<Duration>) -> Result<f32> {
        let tps = procfs::ticks_per_second() as f64;
        let (start_ticks, start) = match interval {
            Some(interval) => {
                let sample = (self.busy_ticks()?, Instant::now());
                thread::sleep(interval);
                sample
            }
            None => match self.last_cpu.get() {
                Some(sample) => sample,
                None => {
                    // first call without an interval has nothing to compare to
                    self.last_cpu.set(Some((self.busy_ticks()?, Instant::now())));
                    return Ok(0.0);
                }
            },
        };

        let ticks = self.busy_ticks()?;
        let now = Instant::now();
        self.last_cpu.set(Some((ticks, now)));

        let elapsed = now.duration_since(start).as_secs_f64();
        if elapsed <= 0.0 {
            return Ok(0.0);
        }
        let busy = ticks.saturating_sub(start_ticks) as f64 / tps;
        Ok((busy / elapsed * 100.0) as f32)
    }

    fn cpu_times(&self) -> Result<CpuTimes> {
        let stat = self.map(self.proc.stat())?;
        let tps = procfs::ticks_per_second() as f64;
        Ok(CpuTimes {
            user: stat.utime as f64 / tps,
            system: stat.stime as f64 / tps,
            children_user: stat.cutime.max(0) as f64 / tps,
            children_system: stat.cstime.max(0) as f64 / tps,
        })
    }

    fn memory_info_ex(&self) -> Result<MemoryInfoEx> {
        let statm = self.map(self.proc.statm())?;
        let page = procfs::page_size();
        Ok(MemoryInfoEx {
            rss: statm.resident * page,
            vms: statm.size * page,
            shared: statm.shared * page,
            text: statm.text * page,
            lib: statm.lib * page,
            data: statm.data * page,
            dirty: statm.dt * page,
        })
    }

    fn io_counters(&self) -> Result<IoCounters> {
        let io = self.map(self.proc.io())?;
        Ok(IoCounters {
            read_count: io.syscr,
            write_count: io.syscw,
            read_bytes: io.read_bytes,
            write_bytes: io.write_bytes,
        })
    }

    fn ionice(&self, set: Option<IoNice>) -> Result<IoNice> {
        let pid = self.pid as libc::c_int;

        if let Some(set) = set {
            if set.value > 7 {
                return Err(Error::InvalidArgument(format!(
                    "ionice value {} out of range 0-7",
                    set.value
                )));
            }
            let prio = (set.class.as_raw() << IOPRIO_CLASS_SHIFT) | set.value as u32;
            // SAFETY: plain syscall with integer arguments
            let ret = unsafe {
                libc::syscall(libc::SYS_ioprio_set, IOPRIO_WHO_PROCESS, pid, prio as libc::c_int)
            };
            if ret < 0 {
                return Err(Error::from_errno(self.pid, std::io::Error::last_os_error()));
            }
        }

        // SAFETY: plain syscall with integer arguments
        let ret = unsafe { libc::syscall(libc::SYS_ioprio_get, IOPRIO_WHO_PROCESS, pid) };
        if ret < 0 {
            return Err(Error::from_errno(self.pid, std::io::Error::last_os_error()));
        }
        let raw = ret as u32;
        let class = IoClass::from_raw(raw >> IOPRIO_CLASS_SHIFT)
            .ok_or_else(|| {
                Error::Procfs(ProcError::Other(format!("unknown ioprio class in {raw:#x}")))
            })?;
        Ok(IoNice {
            class,
            value: (raw & IOPRIO_PRIO_MASK) as u8,
        })
    }

    fn memory_info(&self) -> Result<MemoryInfo> {
        let statm = self.map(self.proc.statm())?;
        let page = procfs::page_size();
        Ok(MemoryInfo {
            rss: statm.resident * page,
            vms: statm.size * page,
        })
    }

    fn memory_maps(&self, grouped: bool) -> Result<Vec<MemoryMap>> {
        let maps = self.map(self.proc.smaps())?;
        let stat = |map: &procfs::process::MemoryMap, key: &str| {
            map.extension.map.get(key).copied().unwrap_or(0)
        };

        let regions = maps.iter().map(|m| MemoryMap {
            path: map_path(&m.pathname),
            addr: Some(format!("{:x}-{:x}", m.address.0, m.address.1)),
            perms: Some(perms_string(m.perms)),
            size: m.address.1 - m.address.0,
            rss: stat(m, "Rss"),
            pss: stat(m, "Pss"),
            swap: stat(m, "Swap"),
        });

        if !grouped {
            return Ok(regions.collect());
        }

        let mut by_path: BTreeMap<String, MemoryMap> = BTreeMap::new();
        for region in regions {
            let entry = by_path.entry(region.path.clone()).or_insert(MemoryMap {
                path: region.path.clone(),
                addr: None,
                perms: None,
                size: 0,
                rss: 0,
                pss: 0,
                swap: 0,
            });
            entry.size += region.size;
            entry.rss += region.rss;
            entry.pss += region.pss;
            entry.swap += region.swap;
        }
        Ok(by_path.into_values().collect())
    }

    fn memory_percent(&self) -> Result<f32> {
        let rss = self.memory_info()?.rss;
        let meminfo = procfs::Meminfo::current()?;
        if meminfo.mem_total == 0 {
            return Ok(0.0);
        }
        Ok((rss as f64 / meminfo.mem_total as f64 * 100.0) as f32)
    }

    fn nice(&self, value: Option<i32>) -> Result<i32> {
        if let Some(value) = value {
            // SAFETY: plain syscall with integer arguments
            let ret = unsafe {
                libc::setpriority(libc::PRIO_PROCESS as _, self.pid as libc::id_t, value)
            };
            if ret != 0 {
                return Err(Error::from_errno(self.pid, std::io::Error::last_os_error()));
            }
        }
        let stat = self.map(self.proc.stat())?;
        Ok(stat.nice as i32)
    }

    fn num_ctx_switches(&self) -> Result<CtxSwitches> {
        let status = self.map(self.proc.status())?;
        Ok(CtxSwitches {
            voluntary: status.voluntary_ctxt_switches.unwrap_or(0),
            involuntary: status.nonvoluntary_ctxt_switches.unwrap_or(0),
        })
    }

    fn num_fds(&self) -> Result<usize> {
        self.map(self.proc.fd_count())
    }

    fn num_threads(&self) -> Result<usize> {
        let stat = self.map(self.proc.stat())?;
        Ok(stat.num_threads.max(0) as usize)
    }

    fn open_files(&self) -> Result<Vec<OpenFile>> {
        let mut files = Vec::new();
        for fd in self.map(self.proc.fd())? {
            let Ok(fd) = fd else { continue };
            if let FDTarget::Path(path) = fd.target {
                if path.is_absolute() && path.is_file() {
                    files.push(OpenFile { path, fd: fd.fd });
                }
            }
        }
        Ok(files)
    }

    fn rlimit(&self, resource: Resource, limits: Option<RLimit>) -> Result<RLimit> {
        let to_raw = |v: Option<u64>| v.unwrap_or(libc::RLIM_INFINITY as u64) as libc::rlim_t;
        let from_raw = |v: libc::rlim_t| (v != libc::RLIM_INFINITY).then_some(v as u64);

        let new = limits.map(|l| libc::rlimit {
            rlim_cur: to_raw(l.soft),
            rlim_max: to_raw(l.hard),
        });
        let mut old = libc::rlimit {
            rlim_cur: 0,
            rlim_max: 0,
        };
        let new_ptr = new
            .as_ref()
            .map_or(std::ptr::null(), |n| n as *const libc::rlimit);

        // prlimit hands back the limit in force before any change
        // SAFETY: both pointers are valid for the duration of the call
        let ret = unsafe {
            libc::prlimit(
                self.pid as libc::pid_t,
                rlimit_resource(resource) as _,
                new_ptr,
                &mut old,
            )
        };
        if ret != 0 {
            return Err(Error::from_errno(self.pid, std::io::Error::last_os_error()));
        }
        Ok(match limits {
            Some(applied) => applied,
            None => RLimit {
                soft: from_raw(old.rlim_cur),
                hard: from_raw(old.rlim_max),
            },
        })
    }

    fn threads(&self) -> Result<Vec<ThreadTimes>> {
        let tps = procfs::ticks_per_second() as f64;
        let mut threads = Vec::new();
        for task in self.map(self.proc.tasks())? {
            let Ok(task) = task else { continue };
            match task.stat() {
                Ok(stat) => threads.push(ThreadTimes {
                    id: task.tid as u32,
                    user_time: stat.utime as f64 / tps,
                    system_time: stat.stime as f64 / tps,
                }),
                Err(e) => debug!("thread {} of pid {} gone: {}", task.tid, self.pid, e),
            }
        }
        Ok(threads)
    }

    fn cwd(&self) -> Result<PathBuf> {
        self.map(self.proc.cwd())
    }

    fn name(&self) -> Result<String> {
        Ok(self.map(self.proc.stat())?.comm)
    }

    fn cmdline(&self) -> Result<Vec<String>> {
        self.map(self.proc.cmdline())
    }

    fn exe(&self) -> Result<PathBuf> {
        self.map(self.proc.exe())
    }
}

fn rlimit_resource(resource: Resource) -> i64 {
    let raw = match resource {
        Resource::Cpu => libc::RLIMIT_CPU,
        Resource::FileSize => libc::RLIMIT_FSIZE,
        Resource::Data => libc::RLIMIT_DATA,
        Resource::Stack => libc::RLIMIT_STACK,
        Resource::Core => libc::RLIMIT_CORE,
        Resource::Rss => libc::RLIMIT_RSS,
        Resource::NProc => libc::RLIMIT_NPROC,
        Resource::NoFile => libc::RLIMIT_NOFILE,
        Resource::MemLock => libc::RLIMIT_MEMLOCK,
        Resource::As => libc::RLIMIT_AS,
        Resource::Locks => libc::RLIMIT_LOCKS,
        Resource::SigPending => libc::RLIMIT_SIGPENDING,
        Resource::MsgQueue => libc::RLIMIT_MSGQUEUE,
        Resource::Nice => libc::RLIMIT_NICE,
        Resource::RtPrio => libc::RLIMIT_RTPRIO,
        Resource::RtTime => libc::RLIMIT_RTTIME,
    };
    raw as i64
}

fn map_path(path: &MMapPath) -> String {
    match path {
        MMapPath::Path(p) => p.to_string_lossy().into_owned(),
        MMapPath::Heap => "[heap]".to_string(),
        MMapPath::Stack => "[stack]".to_string(),
        MMapPath::TStack(tid) => format!("[stack:{tid}]"),
        MMapPath::Vdso => "[vdso]".to_string(),
        MMapPath::Vvar => "[vvar]".to_string(),
        MMapPath::Vsyscall => "[vsyscall]".to_string(),
        MMapPath::Other(other) => other.clone(),
        _ => "[anon]".to_string(),
    }
}

fn perms_string(perms: MMPermissions) -> String {
    let flag = |bit: MMPermissions, c: char| if perms.contains(bit) { c } else { '-' };
    let mut s = String::with_capacity(4);
    s.push(flag(MMPermissions::READ, 'r'));
    s.push(flag(MMPermissions::WRITE, 'w'));
    s.push(flag(MMPermissions::EXECUTE, 'x'));
    s.push(if perms.contains(MMPermissions::SHARED) {
        's'
    } else {
        'p'
    });
    s
}

fn remote(addr: SocketAddr) -> Option<SocketAddr> {
    (!(addr.ip().is_unspecified() && addr.port() == 0)).then_some(addr)
}

fn tcp_status(state: &TcpState) -> ConnectionStatus {
    match state {
        TcpState::Established => ConnectionStatus::Established,
        TcpState::SynSent => ConnectionStatus::SynSent,
        TcpState::FinWait1 => ConnectionStatus::FinWait1,
        TcpState::FinWait2 => ConnectionStatus::FinWait2,
        TcpState::TimeWait => ConnectionStatus::TimeWait,
        TcpState::Close => ConnectionStatus::Close,
        TcpState::CloseWait => ConnectionStatus::CloseWait,
        TcpState::LastAck => ConnectionStatus::LastAck,
        TcpState::Listen => ConnectionStatus::Listen,
        TcpState::Closing => ConnectionStatus::Closing,
        // SynRecv and NewSynRecv
        _ => ConnectionStatus::SynRecv,
    }
}

fn tcp_socket(entry: TcpNetEntry, family: AddressFamily) -> (u64, Connection) {
    let conn = Connection {
        fd: None,
        family,
        socket_type: SocketType::Stream,
        laddr: Some(entry.local_address),
        raddr: remote(entry.remote_address),
        status: tcp_status(&entry.state),
        pid: None,
    };
    (entry.inode, conn)
}

fn udp_socket(entry: UdpNetEntry, family: AddressFamily) -> (u64, Connection) {
    let conn = Connection {
        fd: None,
        family,
        socket_type: SocketType::Datagram,
        laddr: Some(entry.local_address),
        raddr: remote(entry.remote_address),
        status: ConnectionStatus::None,
        pid: None,
    };
    (entry.inode, conn)
}

/// A missing table (IPv6 disabled, say) reads as empty
fn table<T>(r: ProcResult<Vec<T>>) -> ProcResult<Vec<T>> {
    match r {
        Err(ProcError::NotFound(_)) => Ok(Vec::new()),
        other => other,
    }
}

/// Sockets of `kind` with their inodes, from the system tables or from the
/// network namespace seen by `proc`.
fn read_sockets(
    kind: ConnectionKind,
    proc: Option<&procfs::process::Process>,
) -> ProcResult<Vec<(u64, Connection)>> {
    use AddressFamily::{Inet, Inet6};
    use SocketType::{Datagram, Stream};

    let mut out = Vec::new();
    if kind.includes(Inet, Stream) {
        let entries = table(proc.map_or_else(procfs::net::tcp, |p| p.tcp()))?;
        out.extend(entries.into_iter().map(|e| tcp_socket(e, Inet)));
    }
    if kind.includes(Inet6, Stream) {
        let entries = table(proc.map_or_else(procfs::net::tcp6, |p| p.tcp6()))?;
        out.extend(entries.into_iter().map(|e| tcp_socket(e, Inet6)));
    }
    if kind.includes(Inet, Datagram) {
        let entries = table(proc.map_or_else(procfs::net::udp, |p| p.udp()))?;
        out.extend(entries.into_iter().map(|e| udp_socket(e, Inet)));
    }
    if kind.includes(Inet6, Datagram) {
        let entries = table(proc.map_or_else(procfs::net::udp6, |p| p.udp6()))?;
        out.extend(entries.into_iter().map(|e| udp_socket(e, Inet6)));
    }
    Ok(out)
}

/// Socket inode -> (pid, fd) for every process whose fds we may read
fn socket_owners() -> HashMap<u64, (u32, i32)> {
    let mut owners = HashMap::new();
    let Ok(procs) = procfs::process::all_processes() else {
        return owners;
    };
    for proc in procs.flatten() {
        let Ok(fds) = proc.fd() else { continue };
        for fd in fds.flatten() {
            if let FDTarget::Socket(inode) = fd.target {
                owners.insert(inode, (proc.pid as u32, fd.fd));
            }
        }
    }
    owners
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compat::Compat;

    #[test]
    fn test_reads_own_process() {
        let compat = Compat::new(ProcfsLibrary::new());
        let me = compat.process(std::process::id()).unwrap();

        assert!(!me.name().unwrap().is_empty());
        assert!(!me.cmdline().unwrap().is_empty());
        assert!(me.memory_info().unwrap().rss > 0);
        assert!(me.num_threads().unwrap() >= 1);
        assert!(me.num_fds().unwrap() >= 1);
        assert!(me.exe().unwrap().is_absolute());
        assert!(!me.cpu_affinity(None).unwrap().is_empty());
    }

    #[test]
    fn test_open_missing_pid() {
        let lib = ProcfsLibrary::new();
        assert!(matches!(lib.open(999_999_999), Err(Error::NoSuchProcess(_))));
    }

    #[test]
    fn test_cpu_count() {
        let compat = Compat::new(ProcfsLibrary::new());
        assert!(compat.cpu_count(true).unwrap() >= 1);
    }

    #[test]
    fn test_system_cpu_times_from_kernel_stats() {
        let compat = Compat::new(ProcfsLibrary::new());
        let total = compat.cpu_times(false).unwrap();
        assert_eq!(total.len(), 1);
        assert!(total[0].total() > 0.0);

        let percpu = compat.cpu_times(true).unwrap();
        assert!(!percpu.is_empty());

        let pct = compat
            .cpu_percent(Some(Duration::from_millis(20)), false)
            .unwrap();
        assert_eq!(pct.len(), 1);
        assert!((0.0..=100.0).contains(&pct[0]));
    }

    #[test]
    fn test_listening_socket_is_attributed() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let compat = Compat::new(ProcfsLibrary::new());
        let conns = compat.net_connections(ConnectionKind::Tcp).unwrap();
        let mine = conns
            .iter()
            .find(|c| c.laddr.map(|a| a.port()) == Some(port))
            .expect("listener should be visible");
        assert_eq!(mine.status, ConnectionStatus::Listen);
        assert_eq!(mine.pid, Some(std::process::id()));
        assert!(mine.raddr.is_none());

        let me = compat.process(std::process::id()).unwrap();
        let own = me.connections(ConnectionKind::Tcp4).unwrap();
        assert!(own.iter().any(|c| c.laddr.map(|a| a.port()) == Some(port)));
    }

    #[test]
    fn test_perms_string() {
        let perms = MMPermissions::READ | MMPermissions::EXECUTE | MMPermissions::PRIVATE;
        assert_eq!(perms_string(perms), "r-xp");
    }
}
