//! Capability interfaces for host inspection and control.
//!
//! The orchestrator core never shells out or reads host state directly;
//! everything goes through these narrow traits so tests can substitute
//! deterministic fakes. `system::SystemCaps` is the OS-backed implementation.

pub mod system;

use std::net::IpAddr;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::MedicError;

/// One process as reported by the host process table.
///
/// `exe_name` is the exact executable name. Consumers must match on it with
/// equality; substring matching against command lines is how unrelated
/// processes get killed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessInfo {
    pub pid: u32,
    pub exe_name: String,
    /// Seconds since the process started.
    pub run_time_secs: u64,
}

/// Service state as reported by the service manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceState {
    Active,
    Inactive,
    Failed,
    Unknown,
}

impl std::fmt::Display for ServiceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServiceState::Active => write!(f, "active"),
            ServiceState::Inactive => write!(f, "inactive"),
            ServiceState::Failed => write!(f, "failed"),
            ServiceState::Unknown => write!(f, "unknown"),
        }
    }
}

/// Host memory counters in megabytes.
#[derive(Debug, Clone, Copy)]
pub struct MemoryCounters {
    pub total_mb: u64,
    pub available_mb: u64,
}

/// Counters for the volume backing a path.
#[derive(Debug, Clone, Copy)]
pub struct DiskCounters {
    pub total_bytes: u64,
    pub available_bytes: u64,
}

impl DiskCounters {
    pub fn used_percent(&self) -> f64 {
        if self.total_bytes == 0 {
            return 0.0;
        }
        let used = self.total_bytes.saturating_sub(self.available_bytes);
        (used as f64 / self.total_bytes as f64) * 100.0
    }
}

/// Enumerate and terminate host processes.
pub trait ProcessQuery {
    fn processes(&self) -> Result<Vec<ProcessInfo>, MedicError>;

    /// Terminate a single pid previously obtained from `processes()`.
    fn terminate(&self, pid: u32) -> Result<(), MedicError>;
}

/// Query and drive a named service.
pub trait ServiceControl {
    fn state(&self, unit: &str, timeout: Duration) -> Result<ServiceState, MedicError>;
    fn start(&self, unit: &str, timeout: Duration) -> Result<(), MedicError>;
    fn stop(&self, unit: &str, timeout: Duration) -> Result<(), MedicError>;
    fn restart(&self, unit: &str, timeout: Duration) -> Result<(), MedicError>;
}

/// Network reachability checks, all timeout-bounded.
pub trait NetProbe {
    fn resolve(&self, host: &str, timeout: Duration) -> Result<Vec<IpAddr>, MedicError>;

    /// Connect to `host:port`; returns the time the connect took.
    fn tcp_connect(&self, host: &str, port: u16, timeout: Duration)
        -> Result<Duration, MedicError>;
}

/// Memory and disk counters.
pub trait HostStats {
    fn memory(&self) -> Result<MemoryCounters, MedicError>;
    fn disk(&self, path: &Path) -> Result<DiskCounters, MedicError>;
}

/// Is the current process running with elevated privilege?
pub trait PrivilegeCheck {
    fn is_elevated(&self) -> bool;
}

/// The capability bundle handed to probes and remediations.
#[derive(Clone, Copy)]
pub struct CapSet<'a> {
    pub processes: &'a dyn ProcessQuery,
    pub services: &'a dyn ServiceControl,
    pub net: &'a dyn NetProbe,
    pub stats: &'a dyn HostStats,
    pub privilege: &'a dyn PrivilegeCheck,
}
