//! Value types returned by the introspection libraries
//!
//! The adapter hands these through untouched; backends are responsible for
//! filling them in with their own units (seconds for times, bytes for sizes).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::Error;

/// Which sockets a connection query should return
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionKind {
    #[default]
    Inet,
    Inet4,
    Inet6,
    Tcp,
    Tcp4,
    Tcp6,
    Udp,
    Udp4,
    Udp6,
}

impl ConnectionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Inet => "inet",
            Self::Inet4 => "inet4",
            Self::Inet6 => "inet6",
            Self::Tcp => "tcp",
            Self::Tcp4 => "tcp4",
            Self::Tcp6 => "tcp6",
            Self::Udp => "udp",
            Self::Udp4 => "udp4",
            Self::Udp6 => "udp6",
        }
    }

    /// Whether sockets of this family and type belong to the kind
    pub fn includes(&self, family: AddressFamily, socket_type: SocketType) -> bool {
        let family_ok = match self {
            Self::Inet4 | Self::Tcp4 | Self::Udp4 => family == AddressFamily::Inet,
            Self::Inet6 | Self::Tcp6 | Self::Udp6 => family == AddressFamily::Inet6,
            Self::Inet | Self::Tcp | Self::Udp => true,
        };
        let type_ok = match self {
            Self::Tcp | Self::Tcp4 | Self::Tcp6 => socket_type == SocketType::Stream,
            Self::Udp | Self::Udp4 | Self::Udp6 => socket_type == SocketType::Datagram,
            Self::Inet | Self::Inet4 | Self::Inet6 => true,
        };
        family_ok && type_ok
    }
}

impl fmt::Display for ConnectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConnectionKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "inet" => Ok(Self::Inet),
            "inet4" => Ok(Self::Inet4),
            "inet6" => Ok(Self::Inet6),
            "tcp" => Ok(Self::Tcp),
            "tcp4" => Ok(Self::Tcp4),
            "tcp6" => Ok(Self::Tcp6),
            "udp" => Ok(Self::Udp),
            "udp4" => Ok(Self::Udp4),
            "udp6" => Ok(Self::Udp6),
            other => Err(Error::InvalidArgument(format!(
                "unknown connection kind '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AddressFamily {
    #[serde(rename = "AF_INET")]
    Inet,
    #[serde(rename = "AF_INET6")]
    Inet6,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SocketType {
    #[serde(rename = "SOCK_STREAM")]
    Stream,
    #[serde(rename = "SOCK_DGRAM")]
    Datagram,
}

/// Socket state as reported by the kernel, `None` for datagram sockets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConnectionStatus {
    Established,
    SynSent,
    SynRecv,
    #[serde(rename = "FIN_WAIT1")]
    FinWait1,
    #[serde(rename = "FIN_WAIT2")]
    FinWait2,
    TimeWait,
    Close,
    CloseWait,
    LastAck,
    Listen,
    Closing,
    None,
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Established => "ESTABLISHED",
            Self::SynSent => "SYN_SENT",
            Self::SynRecv => "SYN_RECV",
            Self::FinWait1 => "FIN_WAIT1",
            Self::FinWait2 => "FIN_WAIT2",
            Self::TimeWait => "TIME_WAIT",
            Self::Close => "CLOSE",
            Self::CloseWait => "CLOSE_WAIT",
            Self::LastAck => "LAST_ACK",
            Self::Listen => "LISTEN",
            Self::Closing => "CLOSING",
            Self::None => "NONE",
        };
        f.write_str(s)
    }
}

/// One socket, optionally attributed to the process owning it.
///
/// Equality covers every field, so identical sockets seen through two
/// different processes' descriptor tables stay distinct by `pid`/`fd`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Connection {
    pub fd: Option<i32>,
    pub family: AddressFamily,
    pub socket_type: SocketType,
    pub laddr: Option<SocketAddr>,
    pub raddr: Option<SocketAddr>,
    pub status: ConnectionStatus,
    pub pid: Option<u32>,
}

impl Connection {
    /// Attribute the connection to `pid`
    pub fn with_pid(mut self, pid: u32) -> Self {
        self.pid = Some(pid);
        self
    }
}

/// Per-process CPU times in seconds
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct CpuTimes {
    pub user: f64,
    pub system: f64,
    pub children_user: f64,
    pub children_system: f64,
}

/// System-wide CPU times in seconds
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct SystemCpuTimes {
    pub user: f64,
    pub nice: f64,
    pub system: f64,
    pub idle: f64,
    pub iowait: f64,
    pub irq: f64,
    pub softirq: f64,
    pub steal: f64,
}

impl SystemCpuTimes {
    pub fn total(&self) -> f64 {
        self.user
            + self.nice
            + self.system
            + self.idle
            + self.iowait
            + self.irq
            + self.softirq
            + self.steal
    }

    /// Percentage of time spent in each field between `self` and `later`
    pub fn percent_until(&self, later: &SystemCpuTimes) -> SystemCpuTimes {
        let elapsed = later.total() - self.total();
        let pct = |a: f64, b: f64| {
            if elapsed <= 0.0 {
                0.0
            } else {
                ((b - a).max(0.0) / elapsed * 100.0 * 10.0).round() / 10.0
            }
        };
        SystemCpuTimes {
            user: pct(self.user, later.user),
            nice: pct(self.nice, later.nice),
            system: pct(self.system, later.system),
            idle: pct(self.idle, later.idle),
            iowait: pct(self.iowait, later.iowait),
            irq: pct(self.irq, later.irq),
            softirq: pct(self.softirq, later.softirq),
            steal: pct(self.steal, later.steal),
        }
    }

    /// Busy percentage between `self` and `later`
    pub fn busy_percent_until(&self, later: &SystemCpuTimes) -> f32 {
        let elapsed = later.total() - self.total();
        if elapsed <= 0.0 {
            return 0.0;
        }
        let idle = (later.idle + later.iowait) - (self.idle + self.iowait);
        let busy = (elapsed - idle).max(0.0);
        ((busy / elapsed * 100.0 * 10.0).round() / 10.0) as f32
    }
}

/// Resident and virtual memory in bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MemoryInfo {
    pub rss: u64,
    pub vms: u64,
}

/// Extended memory information in bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MemoryInfoEx {
    pub rss: u64,
    pub vms: u64,
    pub shared: u64,
    pub text: u64,
    pub lib: u64,
    pub data: u64,
    pub dirty: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct IoCounters {
    pub read_count: u64,
    pub write_count: u64,
    pub read_bytes: u64,
    pub write_bytes: u64,
}

/// I/O scheduling class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IoClass {
    None,
    RealTime,
    BestEffort,
    Idle,
}

impl IoClass {
    pub fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            0 => Some(Self::None),
            1 => Some(Self::RealTime),
            2 => Some(Self::BestEffort),
            3 => Some(Self::Idle),
            _ => None,
        }
    }

    pub fn as_raw(&self) -> u32 {
        match self {
            Self::None => 0,
            Self::RealTime => 1,
            Self::BestEffort => 2,
            Self::Idle => 3,
        }
    }
}

/// I/O priority: a class plus a level (0-7, lower is higher priority)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IoNice {
    pub class: IoClass,
    pub value: u8,
}

/// One mapped region, or one path when maps are grouped
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryMap {
    pub path: String,
    /// `start-end` range, absent for grouped maps
    pub addr: Option<String>,
    /// Permission string, absent for grouped maps
    pub perms: Option<String>,
    pub size: u64,
    pub rss: u64,
    pub pss: u64,
    pub swap: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CtxSwitches {
    pub voluntary: u64,
    pub involuntary: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OpenFile {
    pub path: PathBuf,
    pub fd: i32,
}

/// CPU times of one thread in seconds
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThreadTimes {
    pub id: u32,
    pub user_time: f64,
    pub system_time: f64,
}

/// Resource governed by an rlimit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Resource {
    Cpu,
    FileSize,
    Data,
    Stack,
    Core,
    Rss,
    NProc,
    NoFile,
    MemLock,
    As,
    Locks,
    SigPending,
    MsgQueue,
    Nice,
    RtPrio,
    RtTime,
}

/// Soft and hard limit, `None` meaning unlimited
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RLimit {
    pub soft: Option<u64>,
    pub hard: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_kind_parse() {
        assert_eq!("tcp".parse::<ConnectionKind>().unwrap(), ConnectionKind::Tcp);
        assert_eq!("INET6".parse::<ConnectionKind>().unwrap(), ConnectionKind::Inet6);
        assert!("unix".parse::<ConnectionKind>().is_err());
        assert_eq!(ConnectionKind::default(), ConnectionKind::Inet);
    }

    #[test]
    fn test_connection_kind_includes() {
        use AddressFamily::*;
        use SocketType::*;

        assert!(ConnectionKind::Inet.includes(Inet6, Datagram));
        assert!(ConnectionKind::Tcp.includes(Inet6, Stream));
        assert!(!ConnectionKind::Tcp.includes(Inet, Datagram));
        assert!(ConnectionKind::Udp4.includes(Inet, Datagram));
        assert!(!ConnectionKind::Udp4.includes(Inet6, Datagram));
        assert!(!ConnectionKind::Tcp6.includes(Inet, Stream));
    }

    #[test]
    fn test_status_names() {
        assert_eq!(ConnectionStatus::Listen.to_string(), "LISTEN");
        assert_eq!(ConnectionStatus::FinWait1.to_string(), "FIN_WAIT1");
        assert_eq!(
            serde_json::to_value(ConnectionStatus::CloseWait).unwrap(),
            serde_json::json!("CLOSE_WAIT")
        );
        assert_eq!(
            serde_json::to_value(ConnectionStatus::FinWait2).unwrap(),
            serde_json::json!("FIN_WAIT2")
        );
    }

    #[test]
    fn test_cpu_percent_between_samples() {
        let before = SystemCpuTimes {
            user: 10.0,
            idle: 90.0,
            ..Default::default()
        };
        let after = SystemCpuTimes {
            user: 15.0,
            idle: 95.0,
            ..Default::default()
        };
        assert_eq!(before.busy_percent_until(&after), 50.0);
        let pct = before.percent_until(&after);
        assert_eq!(pct.user, 50.0);
        assert_eq!(pct.idle, 50.0);
        assert_eq!(before.busy_percent_until(&before), 0.0);
    }
}
