//! Detection helpers used by the agent setup
//!
//! Searches over the live process table and socket list, plus the plugin
//! configuration builders in [`plugins`]. [`Detector`] carries a library
//! and a [`DetectionConfig`]; the free functions run the same searches on
//! the platform's default backend with the default config.

pub mod plugins;

use log::{debug, warn};
use std::net::IpAddr;
use std::process::{Command, Stdio};

use crate::compat::{Compat, ConnectionKind, ConnectionStatus, Process, ProcessLibrary};
use crate::config::DetectionConfig;
use crate::error::Result;

pub use plugins::{
    service_api_check, watch_directory, watch_file_size, watch_process,
    watch_process_by_username, Dimensions, PluginConfig, Plugins,
};

/// Backend used when none is chosen explicitly
#[cfg(target_os = "linux")]
pub type SystemLibrary = crate::compat::procfs_backend::ProcfsLibrary;
#[cfg(not(target_os = "linux"))]
pub type SystemLibrary = crate::compat::sysinfo_backend::SysinfoLibrary;

/// Handle type of [`SystemLibrary`]
pub type SystemProcess = Process<<SystemLibrary as ProcessLibrary>::Handle>;

/// Process and socket searches over one introspection library
pub struct Detector<L: ProcessLibrary> {
    compat: Compat<L>,
    config: DetectionConfig,
}

impl Detector<SystemLibrary> {
    /// Detector over the platform's default backend
    pub fn system() -> Self {
        Self::new(SystemLibrary::new())
    }
}

impl<L: ProcessLibrary> Detector<L> {
    pub fn new(library: L) -> Self {
        Self::with_config(library, DetectionConfig::default())
    }

    pub fn with_config(library: L, config: DetectionConfig) -> Self {
        Self {
            compat: Compat::new(library),
            config,
        }
    }

    pub fn compat(&self) -> &Compat<L> {
        &self.compat
    }

    pub fn config(&self) -> &DetectionConfig {
        &self.config
    }

    /// First process matching `pred`, skipping processes that vanish or
    /// deny access while being inspected
    fn find_first<T>(
        &self,
        read: impl Fn(&Process<L::Handle>) -> Result<T>,
        pred: impl Fn(&T) -> bool,
    ) -> Result<Option<Process<L::Handle>>> {
        for process in self.compat.process_iter()? {
            let process = process?;
            match read(&process) {
                Ok(value) if pred(&value) => return Ok(Some(process)),
                Ok(_) => {}
                Err(e) if e.is_stale() => {
                    debug!("skipping pid {}: {}", process.pid(), e);
                }
                Err(e) => return Err(e),
            }
        }
        Ok(None)
    }

    /// First process whose space-joined command line contains `search`.
    ///
    /// Command lines carrying the configured self marker never match.
    pub fn find_process_cmdline(&self, search: &str) -> Result<Option<Process<L::Handle>>> {
        let marker = self.config.self_marker.as_str();
        self.find_first(
            |p| p.cmdline().map(|args| args.join(" ")),
            |cmdline| cmdline.contains(search) && !cmdline.contains(marker),
        )
    }

    /// First process whose name is exactly `name`
    pub fn find_process_name(&self, name: &str) -> Result<Option<Process<L::Handle>>> {
        self.find_first(|p| p.name(), |n| n == name)
    }

    /// Whether `<service_command> <name> status` exits successfully
    pub fn find_process_service(&self, name: &str) -> bool {
        service_status(&self.config.service_command, name)
    }

    /// Local addresses of sockets of `kind` listening on `port`.
    ///
    /// `kind` defaults to the configured connection kind. Addresses come
    /// back in enumeration order with duplicates kept.
    pub fn find_addrs_listening_on_port(
        &self,
        port: u16,
        kind: Option<ConnectionKind>,
    ) -> Result<Vec<IpAddr>> {
        let kind = kind.unwrap_or(self.config.default_connection_kind);
        let addrs = self
            .compat
            .net_connections(kind)?
            .into_iter()
            .filter(|c| c.status == ConnectionStatus::Listen)
            .filter_map(|c| c.laddr)
            .filter(|addr| addr.port() == port)
            .map(|addr| addr.ip())
            .collect();
        Ok(addrs)
    }

    /// First TCP address listening on `port`, IPv4-mapped addresses
    /// reduced to plain IPv4
    pub fn find_addr_listening_on_port_over_tcp(&self, port: u16) -> Result<Option<IpAddr>> {
        let addrs = self.find_addrs_listening_on_port(port, Some(ConnectionKind::Tcp))?;
        Ok(addrs.first().map(IpAddr::to_canonical))
    }

    /// [`service_api_check`] with the configured timeout
    pub fn service_api_check(
        &self,
        name: impl Into<String>,
        url: impl Into<String>,
        pattern: impl Into<String>,
    ) -> plugins::ApiCheck {
        service_api_check(name, url, pattern)
            .timeout_secs(self.config.http_check_timeout.as_secs())
    }
}

/// Run `<command> <name> status`, reporting success of the exit status.
///
/// Output is captured and discarded; a command that cannot be spawned
/// counts as failure.
pub fn service_status(command: &str, name: &str) -> bool {
    match Command::new(command)
        .args([name, "status"])
        .stdin(Stdio::null())
        .output()
    {
        Ok(output) => {
            debug!("{} {} status exited with {}", command, name, output.status);
            output.status.success()
        }
        Err(e) => {
            warn!("cannot run '{} {} status': {}", command, name, e);
            false
        }
    }
}

pub fn find_process_cmdline(search: &str) -> Result<Option<SystemProcess>> {
    Detector::system().find_process_cmdline(search)
}

pub fn find_process_name(name: &str) -> Result<Option<SystemProcess>> {
    Detector::system().find_process_name(name)
}

pub fn find_process_service(name: &str) -> bool {
    service_status(&DetectionConfig::default().service_command, name)
}

pub fn find_addrs_listening_on_port(
    port: u16,
    kind: Option<ConnectionKind>,
) -> Result<Vec<IpAddr>> {
    Detector::system().find_addrs_listening_on_port(port, kind)
}

pub fn find_addr_listening_on_port_over_tcp(port: u16) -> Result<Option<IpAddr>> {
    Detector::system().find_addr_listening_on_port_over_tcp(port)
}
