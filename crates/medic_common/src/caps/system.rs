//! OS-backed capability implementations.
//!
//! External commands run through `run_bounded`, which enforces the
//! caller-supplied timeout by polling the child and killing it at the
//! deadline. Output is read only after exit, so a command that produces
//! unbounded output hits the timeout path instead of blocking forever.

use std::net::{IpAddr, SocketAddr, TcpStream};
use std::path::Path;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use sysinfo::{Disks, System};
use tracing::{debug, warn};

use super::{
    DiskCounters, MemoryCounters, NetProbe, PrivilegeCheck, ProcessInfo, ProcessQuery,
    ServiceControl, ServiceState, HostStats,
};
use crate::error::MedicError;

/// Maximum output length to capture per stream.
const MAX_OUTPUT_BYTES: usize = 64 * 1024;

/// Poll interval while waiting on a child process.
const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Captured result of a bounded external command.
#[derive(Debug, Clone)]
pub struct CmdOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub duration: Duration,
}

impl CmdOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Run a command, killing it if it exceeds `timeout`.
pub fn run_bounded(
    program: &str,
    args: &[&str],
    timeout: Duration,
) -> Result<CmdOutput, MedicError> {
    let started = Instant::now();
    debug!("running: {} {:?} (timeout {:?})", program, args, timeout);

    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| MedicError::ExternalCallFailed(format!("{program}: {e}")))?;

    loop {
        match child.try_wait() {
            Ok(Some(_)) => break,
            Ok(None) => {
                if started.elapsed() > timeout {
                    let _ = child.kill();
                    let _ = child.wait();
                    warn!("command '{}' killed after {:?}", program, timeout);
                    return Err(MedicError::Timeout(timeout.as_millis() as u64));
                }
                std::thread::sleep(POLL_INTERVAL);
            }
            Err(e) => {
                return Err(MedicError::ExternalCallFailed(format!("{program}: {e}")));
            }
        }
    }

    let output = child
        .wait_with_output()
        .map_err(|e| MedicError::ExternalCallFailed(format!("{program}: {e}")))?;

    Ok(CmdOutput {
        exit_code: output.status.code().unwrap_or(-1),
        stdout: truncate_output(&output.stdout),
        stderr: truncate_output(&output.stderr),
        duration: started.elapsed(),
    })
}

fn truncate_output(bytes: &[u8]) -> String {
    let text = String::from_utf8_lossy(bytes);
    if text.len() > MAX_OUTPUT_BYTES {
        let mut cut = MAX_OUTPUT_BYTES;
        while !text.is_char_boundary(cut) {
            cut -= 1;
        }
        format!("{}... (truncated)", &text[..cut])
    } else {
        text.into_owned()
    }
}

/// The real host: sysinfo counters, systemctl, getent, TCP connects.
pub struct SystemCaps;

impl SystemCaps {
    pub fn new() -> Self {
        Self
    }
}

impl Default for SystemCaps {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessQuery for SystemCaps {
    fn processes(&self) -> Result<Vec<ProcessInfo>, MedicError> {
        let mut sys = System::new();
        sys.refresh_processes();

        let mut procs: Vec<ProcessInfo> = sys
            .processes()
            .iter()
            .map(|(pid, proc_)| ProcessInfo {
                pid: pid.as_u32(),
                exe_name: proc_.name().to_string(),
                run_time_secs: proc_.run_time(),
            })
            .collect();

        procs.sort_by_key(|p| p.pid);
        Ok(procs)
    }

    fn terminate(&self, pid: u32) -> Result<(), MedicError> {
        let ret = unsafe { libc::kill(pid as libc::pid_t, libc::SIGTERM) };
        if ret != 0 {
            return Err(MedicError::ExternalCallFailed(format!(
                "kill({pid}): {}",
                std::io::Error::last_os_error()
            )));
        }
        Ok(())
    }
}

impl ServiceControl for SystemCaps {
    fn state(&self, unit: &str, timeout: Duration) -> Result<ServiceState, MedicError> {
        let out = run_bounded("systemctl", &["is-active", unit], timeout)?;
        let state = match out.stdout.trim() {
            "active" | "activating" => ServiceState::Active,
            "inactive" => ServiceState::Inactive,
            "failed" => ServiceState::Failed,
            _ => ServiceState::Unknown,
        };
        Ok(state)
    }

    fn start(&self, unit: &str, timeout: Duration) -> Result<(), MedicError> {
        service_op("start", unit, timeout)
    }

    fn stop(&self, unit: &str, timeout: Duration) -> Result<(), MedicError> {
        service_op("stop", unit, timeout)
    }

    fn restart(&self, unit: &str, timeout: Duration) -> Result<(), MedicError> {
        service_op("restart", unit, timeout)
    }
}

fn service_op(op: &str, unit: &str, timeout: Duration) -> Result<(), MedicError> {
    let out = run_bounded("systemctl", &[op, unit], timeout)?;
    if !out.success() {
        return Err(MedicError::ExternalCallFailed(format!(
            "systemctl {op} {unit}: exit {}: {}",
            out.exit_code,
            out.stderr.trim()
        )));
    }
    Ok(())
}

impl NetProbe for SystemCaps {
    fn resolve(&self, host: &str, timeout: Duration) -> Result<Vec<IpAddr>, MedicError> {
        // getent keeps resolution on the same bounded-command path as
        // everything else; a wedged resolver cannot hang the probe pass.
        let out = run_bounded("getent", &["hosts", host], timeout)?;
        if !out.success() {
            return Err(MedicError::ExternalCallFailed(format!(
                "name lookup for '{host}' failed (exit {})",
                out.exit_code
            )));
        }

        let addrs: Vec<IpAddr> = out
            .stdout
            .lines()
            .filter_map(|line| line.split_whitespace().next())
            .filter_map(|field| field.parse().ok())
            .collect();

        if addrs.is_empty() {
            return Err(MedicError::ExternalCallFailed(format!(
                "name lookup for '{host}' returned no addresses"
            )));
        }
        Ok(addrs)
    }

    fn tcp_connect(
        &self,
        host: &str,
        port: u16,
        timeout: Duration,
    ) -> Result<Duration, MedicError> {
        let addr: IpAddr = match host.parse() {
            Ok(ip) => ip,
            Err(_) => self
                .resolve(host, timeout)?
                .into_iter()
                .next()
                .ok_or_else(|| {
                    MedicError::ExternalCallFailed(format!("no address for '{host}'"))
                })?,
        };

        let started = Instant::now();
        TcpStream::connect_timeout(&SocketAddr::new(addr, port), timeout).map_err(|e| {
            if e.kind() == std::io::ErrorKind::TimedOut {
                MedicError::Timeout(timeout.as_millis() as u64)
            } else {
                MedicError::ExternalCallFailed(format!("connect {addr}:{port}: {e}"))
            }
        })?;
        Ok(started.elapsed())
    }
}

impl HostStats for SystemCaps {
    fn memory(&self) -> Result<MemoryCounters, MedicError> {
        let mut sys = System::new();
        sys.refresh_memory();
        Ok(MemoryCounters {
            total_mb: sys.total_memory() / (1024 * 1024),
            available_mb: sys.available_memory() / (1024 * 1024),
        })
    }

    fn disk(&self, path: &Path) -> Result<DiskCounters, MedicError> {
        let disks = Disks::new_with_refreshed_list();

        // Longest mount point that prefixes the path wins.
        let best = disks
            .iter()
            .filter(|d| path.starts_with(d.mount_point()))
            .max_by_key(|d| d.mount_point().as_os_str().len());

        match best {
            Some(disk) => Ok(DiskCounters {
                total_bytes: disk.total_space(),
                available_bytes: disk.available_space(),
            }),
            None => Err(MedicError::ExternalCallFailed(format!(
                "no mounted volume backs {}",
                path.display()
            ))),
        }
    }
}

impl PrivilegeCheck for SystemCaps {
    fn is_elevated(&self) -> bool {
        unsafe { libc::geteuid() == 0 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_bounded_captures_output() {
        let out = run_bounded("echo", &["medic-ok"], Duration::from_secs(5)).unwrap();
        assert!(out.success());
        assert_eq!(out.stdout.trim(), "medic-ok");
    }

    #[test]
    fn test_run_bounded_nonzero_exit() {
        let out = run_bounded("false", &[], Duration::from_secs(5)).unwrap();
        assert!(!out.success());
    }

    #[test]
    fn test_run_bounded_times_out() {
        let err = run_bounded("sleep", &["5"], Duration::from_millis(100)).unwrap_err();
        assert_eq!(err.kind(), "timeout");
    }

    #[test]
    fn test_run_bounded_missing_program() {
        let err = run_bounded("no-such-binary-medic", &[], Duration::from_secs(1)).unwrap_err();
        assert_eq!(err.kind(), "external-call-failed");
    }

    #[test]
    fn test_is_elevated_does_not_panic() {
        let _ = SystemCaps::new().is_elevated();
    }

    #[test]
    fn test_truncate_output_short() {
        assert_eq!(truncate_output(b"abc"), "abc");
    }
}
