//! Built-in remediations.
//!
//! Corrective actions for the conditions the built-in probes detect. Each
//! declares up front whether it needs elevation and whether it is
//! destructive; the orchestrator enforces both declarations before apply()
//! ever runs.

use crate::error::MedicError;
use crate::probe::ProbeContext;
use crate::remedy::Remediation;
use crate::runtime_config::RuntimeConfig;

/// Remediations in their canonical catalog order. Service restarts come
/// before config rewrites so a `fix --all` pass heals the service first.
pub fn default_remedies() -> Vec<Box<dyn Remediation>> {
    vec![
        Box::new(RestartServiceRemedy),
        Box::new(ResetNetworkRemedy),
        Box::new(KillStuckClientsRemedy),
        Box::new(CapMemoryRemedy),
    ]
}

/// Restart the runtime service.
pub struct RestartServiceRemedy;

impl Remediation for RestartServiceRemedy {
    fn id(&self) -> &str {
        "restart-service"
    }

    fn description(&self) -> &str {
        "Restart the runtime service"
    }

    fn requires_elevated_privilege(&self) -> bool {
        true
    }

    fn related_probe_ids(&self) -> &[&str] {
        &["service-running", "dns-resolution"]
    }

    fn apply(&self, ctx: &ProbeContext) -> Result<String, MedicError> {
        let unit = &ctx.settings.service_unit;
        ctx.caps.services.restart(unit, ctx.call_timeout)?;
        Ok(format!("{unit} restarted"))
    }
}

/// Restart the runtime service and verify the resolver path came back.
pub struct ResetNetworkRemedy;

impl Remediation for ResetNetworkRemedy {
    fn id(&self) -> &str {
        "reset-network"
    }

    fn description(&self) -> &str {
        "Restart the runtime service and re-check name resolution"
    }

    fn requires_elevated_privilege(&self) -> bool {
        true
    }

    fn related_probe_ids(&self) -> &[&str] {
        &["dns-resolution", "net-reachability"]
    }

    fn apply(&self, ctx: &ProbeContext) -> Result<String, MedicError> {
        let unit = &ctx.settings.service_unit;
        let host = &ctx.settings.dns_check_host;

        ctx.caps.services.restart(unit, ctx.call_timeout)?;
        let addrs = ctx.caps.net.resolve(host, ctx.call_timeout)?;
        Ok(format!(
            "{unit} restarted; {host} resolves to {} address(es)",
            addrs.len()
        ))
    }
}

/// Terminate hung client processes.
pub struct KillStuckClientsRemedy;

impl Remediation for KillStuckClientsRemedy {
    fn id(&self) -> &str {
        "kill-stuck-clients"
    }

    fn description(&self) -> &str {
        "Terminate client processes past the hang threshold"
    }

    fn is_destructive(&self) -> bool {
        true
    }

    fn related_probe_ids(&self) -> &[&str] {
        &["stuck-clients"]
    }

    fn apply(&self, ctx: &ProbeContext) -> Result<String, MedicError> {
        let client = &ctx.settings.client_process;
        let hang_secs = ctx.settings.thresholds.client_hang_secs;

        // Enumerate first, then kill the exact pid set. Matching is on the
        // reported executable name, never on command-line substrings.
        let procs = ctx.caps.processes.processes()?;
        let hung: Vec<u32> = procs
            .iter()
            .filter(|p| p.exe_name == *client && p.run_time_secs > hang_secs)
            .map(|p| p.pid)
            .collect();

        if hung.is_empty() {
            return Ok(format!("no hung {client} processes found"));
        }

        let mut failures = Vec::new();
        for pid in &hung {
            if let Err(e) = ctx.caps.processes.terminate(*pid) {
                failures.push(format!("pid {pid}: {e}"));
            }
        }

        if failures.is_empty() {
            let pids: Vec<String> = hung.iter().map(|p| p.to_string()).collect();
            Ok(format!("terminated {} (pids {})", client, pids.join(", ")))
        } else {
            Err(MedicError::ExternalCallFailed(format!(
                "could not terminate {} of {} process(es): {}",
                failures.len(),
                hung.len(),
                failures.join("; ")
            )))
        }
    }
}

/// Write the configured memory cap into the runtime configuration file.
pub struct CapMemoryRemedy;

impl Remediation for CapMemoryRemedy {
    fn id(&self) -> &str {
        "cap-memory"
    }

    fn description(&self) -> &str {
        "Cap runtime memory in the configuration file"
    }

    fn is_destructive(&self) -> bool {
        // Rewrites a file the runtime owns; the prior version is kept as a
        // timestamped backup.
        true
    }

    fn related_probe_ids(&self) -> &[&str] {
        &["memory-pressure", "runtime-config"]
    }

    fn apply(&self, ctx: &ProbeContext) -> Result<String, MedicError> {
        let path = &ctx.settings.runtime_config_path;
        let cap_mb = ctx.settings.memory_cap_mb;

        let mut config = if path.exists() {
            RuntimeConfig::load(path)?
        } else {
            RuntimeConfig::default()
        };

        config.set("memory", "limit_mb", cap_mb.to_string());
        config.set("memory", "balloon", "true");

        let backup = config.save(path)?;
        let message = match backup {
            Some(backup) => format!(
                "memory capped at {cap_mb} MB in {} (previous version: {})",
                path.display(),
                backup.display()
            ),
            None => format!("memory capped at {cap_mb} MB in new {}", path.display()),
        };
        Ok(message)
    }
}
