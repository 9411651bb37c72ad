//! Traits describing an introspection library in either API shape
//!
//! A library implements the accessors of the shape it reports through
//! [`ProcessLibrary::capabilities`]. Every accessor has a default body
//! returning [`Error::NotSupported`], so a backend only writes what it has.

use std::path::PathBuf;
use std::time::Duration;

use super::capability::Capabilities;
use super::types::{
    Connection, ConnectionKind, CpuTimes, CtxSwitches, IoCounters, IoNice, MemoryInfo,
    MemoryInfoEx, MemoryMap, OpenFile, RLimit, Resource, SystemCpuTimes, ThreadTimes,
};
use crate::error::{Error, Result};

fn absent<T>(accessor: &str) -> Result<T> {
    Err(Error::not_supported(accessor))
}

/// System-level half of an introspection library
pub trait ProcessLibrary {
    type Handle: ProcessApi;

    /// API shape and connection strategy of this library
    fn capabilities(&self) -> Capabilities;

    /// PIDs currently in the process table
    fn pids(&self) -> Result<Vec<u32>>;

    /// Open a handle on `pid`, failing with `NoSuchProcess` if it is gone
    fn open(&self, pid: u32) -> Result<Self::Handle>;

    // modern

    fn cpu_count(&self, _logical: bool) -> Result<usize> {
        absent("cpu_count")
    }

    fn net_connections(&self, _kind: ConnectionKind) -> Result<Vec<Connection>> {
        absent("net_connections")
    }

    // legacy

    /// Total core count, with no logical/physical distinction
    fn num_cpus(&self) -> Result<usize> {
        absent("num_cpus")
    }

    // both shapes

    fn cpu_times(&self, _percpu: bool) -> Result<Vec<SystemCpuTimes>> {
        absent("cpu_times")
    }

    fn cpu_percent(&self, _interval: Option<Duration>, _percpu: bool) -> Result<Vec<f32>> {
        absent("cpu_percent")
    }

    fn cpu_times_percent(
        &self,
        _interval: Option<Duration>,
        _percpu: bool,
    ) -> Result<Vec<SystemCpuTimes>> {
        absent("cpu_times_percent")
    }
}

/// Per-process half of an introspection library
pub trait ProcessApi {
    fn pid(&self) -> u32;

    // modern

    fn connections(&self, _kind: ConnectionKind) -> Result<Vec<Connection>> {
        absent("connections")
    }

    /// Set the affinity when `cpus` is given, then return the current one
    fn cpu_affinity(&self, _cpus: Option<&[usize]>) -> Result<Vec<usize>> {
        absent("cpu_affinity")
    }

    fn cpu_percent(&self, _interval: Option<Duration>) -> Result<f32> {
        absent("cpu_percent")
    }

    fn cpu_times(&self) -> Result<CpuTimes> {
        absent("cpu_times")
    }

    fn memory_info_ex(&self) -> Result<MemoryInfoEx> {
        absent("memory_info_ex")
    }

    fn io_counters(&self) -> Result<IoCounters> {
        absent("io_counters")
    }

    /// Set the I/O priority when `set` is given, then return the current one
    fn ionice(&self, _set: Option<IoNice>) -> Result<IoNice> {
        absent("ionice")
    }

    fn memory_info(&self) -> Result<MemoryInfo> {
        absent("memory_info")
    }

    fn memory_maps(&self, _grouped: bool) -> Result<Vec<MemoryMap>> {
        absent("memory_maps")
    }

    fn memory_percent(&self) -> Result<f32> {
        absent("memory_percent")
    }

    /// Set the niceness when `value` is given, then return the current one
    fn nice(&self, _value: Option<i32>) -> Result<i32> {
        absent("nice")
    }

    fn num_ctx_switches(&self) -> Result<CtxSwitches> {
        absent("num_ctx_switches")
    }

    fn num_fds(&self) -> Result<usize> {
        absent("num_fds")
    }

    fn num_threads(&self) -> Result<usize> {
        absent("num_threads")
    }

    fn open_files(&self) -> Result<Vec<OpenFile>> {
        absent("open_files")
    }

    /// Set the limit when `limits` is given, then return the current one
    fn rlimit(&self, _resource: Resource, _limits: Option<RLimit>) -> Result<RLimit> {
        absent("rlimit")
    }

    fn threads(&self) -> Result<Vec<ThreadTimes>> {
        absent("threads")
    }

    fn cwd(&self) -> Result<PathBuf> {
        absent("cwd")
    }

    fn name(&self) -> Result<String> {
        absent("name")
    }

    fn cmdline(&self) -> Result<Vec<String>> {
        absent("cmdline")
    }

    fn exe(&self) -> Result<PathBuf> {
        absent("exe")
    }

    // legacy

    fn get_connections(&self, _kind: ConnectionKind) -> Result<Vec<Connection>> {
        absent("get_connections")
    }

    fn get_cpu_affinity(&self) -> Result<Vec<usize>> {
        absent("get_cpu_affinity")
    }

    fn get_cpu_percent(&self, _interval: Option<Duration>) -> Result<f32> {
        absent("get_cpu_percent")
    }

    fn get_cpu_times(&self) -> Result<CpuTimes> {
        absent("get_cpu_times")
    }

    fn get_ext_memory_info(&self) -> Result<MemoryInfoEx> {
        absent("get_ext_memory_info")
    }

    fn get_io_counters(&self) -> Result<IoCounters> {
        absent("get_io_counters")
    }

    fn get_ionice(&self) -> Result<IoNice> {
        absent("get_ionice")
    }

    fn get_memory_info(&self) -> Result<MemoryInfo> {
        absent("get_memory_info")
    }

    fn get_memory_maps(&self, _grouped: bool) -> Result<Vec<MemoryMap>> {
        absent("get_memory_maps")
    }

    fn get_memory_percent(&self) -> Result<f32> {
        absent("get_memory_percent")
    }

    fn get_nice(&self, _value: Option<i32>) -> Result<i32> {
        absent("get_nice")
    }

    fn get_num_ctx_switches(&self) -> Result<CtxSwitches> {
        absent("get_num_ctx_switches")
    }

    fn get_num_fds(&self) -> Result<usize> {
        absent("get_num_fds")
    }

    fn get_num_threads(&self) -> Result<usize> {
        absent("get_num_threads")
    }

    fn get_open_files(&self) -> Result<Vec<OpenFile>> {
        absent("get_open_files")
    }

    fn get_rlimit(&self, _resource: Resource) -> Result<RLimit> {
        absent("get_rlimit")
    }

    fn get_threads(&self) -> Result<Vec<ThreadTimes>> {
        absent("get_threads")
    }

    fn getcwd(&self) -> Result<PathBuf> {
        absent("getcwd")
    }

    /// Name captured when the handle was opened
    fn name_attr(&self) -> Result<String> {
        absent("name attribute")
    }

    /// Command line captured when the handle was opened
    fn cmdline_attr(&self) -> Result<Vec<String>> {
        absent("cmdline attribute")
    }

    /// Executable path captured when the handle was opened
    fn exe_attr(&self) -> Result<PathBuf> {
        absent("exe attribute")
    }
}
