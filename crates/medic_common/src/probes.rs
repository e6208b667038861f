//! Built-in environment probes.
//!
//! Each probe inspects one condition of the sandbox runtime's environment
//! through the capability set: the runtime service, the guest network path,
//! memory ballooning, the data volume, hung client processes, and the
//! runtime configuration file itself. Thresholds come from tool settings.

use std::time::Instant;

use crate::caps::ServiceState;
use crate::error::MedicError;
use crate::probe::{Outcome, Probe, ProbeContext};
use crate::runtime_config::RuntimeConfig;

/// Probes in their canonical registration order.
pub fn default_probes() -> Vec<Box<dyn Probe>> {
    vec![
        Box::new(ServiceRunningProbe),
        Box::new(DnsResolutionProbe),
        Box::new(NetReachabilityProbe),
        Box::new(MemoryPressureProbe),
        Box::new(DiskUsageProbe),
        Box::new(StuckClientsProbe),
        Box::new(RuntimeConfigProbe),
    ]
}

/// Is the runtime service active?
pub struct ServiceRunningProbe;

impl Probe for ServiceRunningProbe {
    fn id(&self) -> &str {
        "service-running"
    }

    fn description(&self) -> &str {
        "Runtime service is active"
    }

    fn run(&self, ctx: &ProbeContext) -> Result<Outcome, MedicError> {
        let unit = &ctx.settings.service_unit;
        let state = ctx.caps.services.state(unit, ctx.call_timeout)?;
        let outcome = match state {
            ServiceState::Active => Outcome::ok(format!("{unit} is active")),
            ServiceState::Inactive => Outcome::failed(format!("{unit} is not running")),
            ServiceState::Failed => Outcome::failed(format!("{unit} entered failed state")),
            ServiceState::Unknown => {
                Outcome::warning(format!("{unit} state could not be determined"))
            }
        };
        Ok(outcome)
    }
}

/// Does a well-known host resolve inside the environment?
pub struct DnsResolutionProbe;

impl Probe for DnsResolutionProbe {
    fn id(&self) -> &str {
        "dns-resolution"
    }

    fn description(&self) -> &str {
        "Name resolution works inside the environment"
    }

    fn run(&self, ctx: &ProbeContext) -> Result<Outcome, MedicError> {
        let host = &ctx.settings.dns_check_host;
        let started = Instant::now();
        let addrs = ctx.caps.net.resolve(host, ctx.call_timeout)?;
        let elapsed_ms = started.elapsed().as_millis() as f64;
        Ok(
            Outcome::ok(format!("{host} resolved to {} address(es)", addrs.len()))
                .with_metric(elapsed_ms),
        )
    }
}

/// Can we open a TCP connection to the configured target?
pub struct NetReachabilityProbe;

impl Probe for NetReachabilityProbe {
    fn id(&self) -> &str {
        "net-reachability"
    }

    fn description(&self) -> &str {
        "Network path out of the environment is open"
    }

    fn run(&self, ctx: &ProbeContext) -> Result<Outcome, MedicError> {
        let host = &ctx.settings.reach_host;
        let port = ctx.settings.reach_port;
        let took = ctx.caps.net.tcp_connect(host, port, ctx.call_timeout)?;
        Ok(
            Outcome::ok(format!("{host}:{port} reachable"))
                .with_metric(took.as_millis() as f64),
        )
    }
}

/// Available memory against the ballooning thresholds.
pub struct MemoryPressureProbe;

impl Probe for MemoryPressureProbe {
    fn id(&self) -> &str {
        "memory-pressure"
    }

    fn description(&self) -> &str {
        "Host memory not exhausted by the runtime balloon"
    }

    fn run(&self, ctx: &ProbeContext) -> Result<Outcome, MedicError> {
        let mem = ctx.caps.stats.memory()?;
        let t = &ctx.settings.thresholds;

        let outcome = if mem.available_mb < t.memory_fail_mb {
            Outcome::failed(format!(
                "only {} MB of {} MB available",
                mem.available_mb, mem.total_mb
            ))
        } else if mem.available_mb < t.memory_warn_mb {
            Outcome::warning(format!(
                "{} MB of {} MB available",
                mem.available_mb, mem.total_mb
            ))
        } else {
            Outcome::ok(format!(
                "{} MB of {} MB available",
                mem.available_mb, mem.total_mb
            ))
        };
        Ok(outcome.with_metric(mem.available_mb as f64))
    }
}

/// Used percentage of the volume backing the runtime's data directory.
pub struct DiskUsageProbe;

impl Probe for DiskUsageProbe {
    fn id(&self) -> &str {
        "disk-usage"
    }

    fn description(&self) -> &str {
        "Data volume below usage thresholds"
    }

    fn run(&self, ctx: &ProbeContext) -> Result<Outcome, MedicError> {
        let disk = ctx.caps.stats.disk(&ctx.settings.data_volume)?;
        let used = disk.used_percent();
        let t = &ctx.settings.thresholds;
        let volume = ctx.settings.data_volume.display();

        let outcome = if used >= t.disk_fail_percent {
            Outcome::failed(format!("{volume} is {used:.0}% full"))
        } else if used >= t.disk_warn_percent {
            Outcome::warning(format!("{volume} is {used:.0}% full"))
        } else {
            Outcome::ok(format!("{volume} is {used:.0}% full"))
        };
        Ok(outcome.with_metric(used))
    }
}

/// Client CLI processes that have been running past the hang threshold.
pub struct StuckClientsProbe;

impl Probe for StuckClientsProbe {
    fn id(&self) -> &str {
        "stuck-clients"
    }

    fn description(&self) -> &str {
        "No client process is hung"
    }

    fn run(&self, ctx: &ProbeContext) -> Result<Outcome, MedicError> {
        let client = &ctx.settings.client_process;
        let hang_secs = ctx.settings.thresholds.client_hang_secs;

        let procs = ctx.caps.processes.processes()?;
        // Exact executable-name match; a substring match would flag
        // unrelated processes that merely contain the client name.
        let hung: Vec<_> = procs
            .iter()
            .filter(|p| p.exe_name == *client && p.run_time_secs > hang_secs)
            .collect();

        if hung.is_empty() {
            return Ok(Outcome::ok(format!("no {client} process past {hang_secs}s")));
        }

        let oldest = hung.iter().map(|p| p.run_time_secs).max().unwrap_or(0);
        let pids: Vec<String> = hung.iter().map(|p| p.pid.to_string()).collect();
        Ok(Outcome::failed(format!(
            "{} {client} process(es) hung (pids {})",
            hung.len(),
            pids.join(", ")
        ))
        .with_metric(oldest as f64))
    }
}

/// Does the runtime configuration file exist and parse cleanly?
pub struct RuntimeConfigProbe;

impl Probe for RuntimeConfigProbe {
    fn id(&self) -> &str {
        "runtime-config"
    }

    fn description(&self) -> &str {
        "Runtime configuration file parses cleanly"
    }

    fn run(&self, ctx: &ProbeContext) -> Result<Outcome, MedicError> {
        let path = &ctx.settings.runtime_config_path;
        if !path.exists() {
            return Ok(Outcome::warning(format!(
                "{} not present; runtime defaults in effect",
                path.display()
            )));
        }

        let config = RuntimeConfig::load(path)?;
        let suspicious = config.suspicious_lines().len();
        if suspicious > 0 {
            return Ok(Outcome::warning(format!(
                "{} line(s) in {} not understood by the runtime",
                suspicious,
                path.display()
            )));
        }
        Ok(Outcome::ok(format!("{} parses cleanly", path.display())))
    }
}
