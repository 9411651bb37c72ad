//! Error types for procwatch

use thiserror::Error;

/// Result type alias used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the adapter and the detection helpers
#[derive(Error, Debug)]
pub enum Error {
    /// The process exited (or never existed) while it was being inspected
    #[error("no such process (pid={0})")]
    NoSuchProcess(u32),

    /// The OS refused access to the process
    #[error("access denied (pid={0})")]
    AccessDenied(u32),

    /// Neither the modern nor the legacy form of an accessor is available
    #[error("not supported: {0}")]
    NotSupported(String),

    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// procfs error that is not about a vanished or protected process
    #[cfg(target_os = "linux")]
    #[error("procfs error: {0}")]
    Procfs(#[from] procfs::ProcError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Shorthand for an unsupported accessor
    pub fn not_supported(what: impl Into<String>) -> Self {
        Self::NotSupported(what.into())
    }

    /// True for errors that only mean "this process is gone or off limits".
    ///
    /// Enumeration-based searches skip processes failing with these.
    pub fn is_stale(&self) -> bool {
        matches!(self, Self::NoSuchProcess(_) | Self::AccessDenied(_))
    }

    /// Map a procfs error raised while reading `/proc/<pid>`.
    #[cfg(target_os = "linux")]
    pub(crate) fn from_proc(pid: u32, err: procfs::ProcError) -> Self {
        use procfs::ProcError;

        match err {
            ProcError::NotFound(_) => Self::NoSuchProcess(pid),
            ProcError::PermissionDenied(_) => Self::AccessDenied(pid),
            other => Self::Procfs(other),
        }
    }

    /// Map an `errno` from a libc call targeting `pid`.
    #[cfg(target_os = "linux")]
    pub(crate) fn from_errno(pid: u32, err: std::io::Error) -> Self {
        match err.raw_os_error() {
            Some(libc::ESRCH) => Self::NoSuchProcess(pid),
            Some(libc::EPERM) | Some(libc::EACCES) => Self::AccessDenied(pid),
            _ => Self::Io(err),
        }
    }
}
